//! Geographic bounding boxes with anti-meridian handling.

use geo::{Coord, LineString, Polygon};

/// A WGS84 coordinate pair.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LonLat {
    /// Longitude in degrees, `[-180, 180]`.
    pub lon: f64,
    /// Latitude in degrees, `[-90, 90]`.
    pub lat: f64,
}

impl LonLat {
    /// Creates a coordinate pair.
    #[must_use]
    pub const fn new(lon: f64, lat: f64) -> Self {
        Self { lon, lat }
    }
}

/// A geographic bounding box from south-west `p1` to north-east `p2`.
///
/// `p1.lon > p2.lon` means the box crosses the anti-meridian and must be
/// split with [`BBox::split_antimeridian`] before it is queried.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BBox {
    /// South-west corner.
    pub p1: LonLat,
    /// North-east corner.
    pub p2: LonLat,
}

impl BBox {
    /// Creates a bounding box from two corners.
    #[must_use]
    pub const fn new(p1: LonLat, p2: LonLat) -> Self {
        Self { p1, p2 }
    }

    /// Grows the box by `percentage` of its span on each side.
    #[must_use]
    pub fn extend(&self, percentage: f64) -> Self {
        let lon_delta = (self.p2.lon - self.p1.lon) * percentage;
        let lat_delta = (self.p2.lat - self.p1.lat) * percentage;
        Self {
            p1: LonLat::new(self.p1.lon - lon_delta, self.p1.lat - lat_delta),
            p2: LonLat::new(self.p2.lon + lon_delta, self.p2.lat + lat_delta),
        }
    }

    /// Materializes the box as a closed polygon with `nodes_per_edge`
    /// vertices along each edge.
    ///
    /// A plain 4-corner rectangle under-approximates the box once it is
    /// reprojected; the extra vertices keep intersection queries honest
    /// near the poles.
    ///
    /// # Panics
    ///
    /// Panics if `nodes_per_edge` is zero.
    #[must_use]
    pub fn to_polygon(&self, nodes_per_edge: usize) -> Polygon<f64> {
        assert!(nodes_per_edge > 0, "nodes_per_edge must be positive");

        #[allow(clippy::cast_precision_loss)]
        let steps = nodes_per_edge as f64;
        let lon_step = (self.p2.lon - self.p1.lon) / steps;
        let lat_step = (self.p2.lat - self.p1.lat) / steps;

        let mut ring = Vec::with_capacity(nodes_per_edge * 4 + 1);

        for i in 0..nodes_per_edge {
            #[allow(clippy::cast_precision_loss)]
            let t = i as f64;
            ring.push(Coord {
                x: self.p1.lon + lon_step * t,
                y: self.p1.lat,
            });
        }
        for i in 0..nodes_per_edge {
            #[allow(clippy::cast_precision_loss)]
            let t = i as f64;
            ring.push(Coord {
                x: self.p2.lon,
                y: self.p1.lat + lat_step * t,
            });
        }
        for i in 0..nodes_per_edge {
            #[allow(clippy::cast_precision_loss)]
            let t = i as f64;
            ring.push(Coord {
                x: self.p2.lon - lon_step * t,
                y: self.p2.lat,
            });
        }
        for i in 0..nodes_per_edge {
            #[allow(clippy::cast_precision_loss)]
            let t = i as f64;
            ring.push(Coord {
                x: self.p1.lon,
                y: self.p2.lat - lat_step * t,
            });
        }
        ring.push(Coord {
            x: self.p1.lon,
            y: self.p1.lat,
        });

        Polygon::new(LineString::new(ring), Vec::new())
    }

    /// Splits a box that crosses the anti-meridian into an eastern and a
    /// western half; returns the box unchanged otherwise.
    #[must_use]
    pub fn split_antimeridian(&self) -> Vec<Self> {
        if self.p1.lon > self.p2.lon {
            vec![
                Self::new(self.p1, LonLat::new(180.0, self.p2.lat)),
                Self::new(LonLat::new(-180.0, self.p1.lat), self.p2),
            ]
        } else {
            vec![*self]
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extend_grows_symmetrically() {
        let bbox = BBox::new(LonLat::new(0.0, 0.0), LonLat::new(10.0, 20.0));
        let extended = bbox.extend(0.5);
        assert!((extended.p1.lon - -5.0).abs() < 1e-12);
        assert!((extended.p1.lat - -10.0).abs() < 1e-12);
        assert!((extended.p2.lon - 15.0).abs() < 1e-12);
        assert!((extended.p2.lat - 30.0).abs() < 1e-12);
    }

    #[test]
    fn polygon_has_expected_vertex_count() {
        let bbox = BBox::new(LonLat::new(0.0, 0.0), LonLat::new(8.0, 8.0));
        let polygon = bbox.to_polygon(8);
        // 8 vertices per edge plus the closing point.
        assert_eq!(polygon.exterior().0.len(), 33);

        let corners = bbox.to_polygon(1);
        assert_eq!(corners.exterior().0.len(), 5);
    }

    #[test]
    fn polygon_is_closed() {
        let bbox = BBox::new(LonLat::new(-3.0, -4.0), LonLat::new(5.0, 6.0));
        let polygon = bbox.to_polygon(8);
        let ring = &polygon.exterior().0;
        assert_eq!(ring.first(), ring.last());
    }

    #[test]
    fn antimeridian_box_splits_into_two_halves() {
        let bbox = BBox::new(LonLat::new(170.0, -10.0), LonLat::new(-170.0, 10.0));
        let halves = bbox.split_antimeridian();
        assert_eq!(halves.len(), 2);
        assert_eq!(halves[0].p1.lon, 170.0);
        assert_eq!(halves[0].p2.lon, 180.0);
        assert_eq!(halves[1].p1.lon, -180.0);
        assert_eq!(halves[1].p2.lon, -170.0);
        assert_eq!(halves[0].p2.lat, 10.0);
        assert_eq!(halves[1].p1.lat, -10.0);
    }

    #[test]
    fn regular_box_stays_whole() {
        let bbox = BBox::new(LonLat::new(-10.0, -10.0), LonLat::new(10.0, 10.0));
        assert_eq!(bbox.split_antimeridian(), vec![bbox]);
    }
}
