//! Slippy tile addressing and web-mercator projection.

use openaedmap_geography_models::{BBox, LonLat};

/// Spherical earth radius used by EPSG:3857, in meters.
const EARTH_RADIUS: f64 = 6_378_137.0;

/// Converts a tile corner to WGS84.
///
/// `(x, y)` addresses the north-west corner of the tile in the standard
/// XYZ scheme (y grows southward).
#[must_use]
pub fn tile_to_lonlat(z: u32, x: u32, y: u32) -> LonLat {
    let n = f64::from(z).exp2();
    let lon = f64::from(x) / n * 360.0 - 180.0;
    let lat = (std::f64::consts::PI * (1.0 - 2.0 * f64::from(y) / n))
        .sinh()
        .atan()
        .to_degrees();
    LonLat::new(lon, lat)
}

/// Converts a WGS84 coordinate to the tile containing it.
#[must_use]
pub fn lonlat_to_tile(z: u32, lon: f64, lat: f64) -> (u32, u32) {
    let n = f64::from(z).exp2();
    let x = (lon + 180.0) / 360.0 * n;
    let y = (1.0 - lat.to_radians().tan().asinh() / std::f64::consts::PI) / 2.0 * n;

    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    let clamp = |v: f64| (v.floor().max(0.0) as u32).min((n as u32).saturating_sub(1));
    (clamp(x), clamp(y))
}

/// The WGS84 bounding box of a tile, south-west to north-east.
#[must_use]
pub fn tile_to_bbox(z: u32, x: u32, y: u32) -> BBox {
    let nw = tile_to_lonlat(z, x, y);
    let se = tile_to_lonlat(z, x + 1, y + 1);
    BBox::new(LonLat::new(nw.lon, se.lat), LonLat::new(se.lon, nw.lat))
}

/// Projects a WGS84 coordinate to EPSG:3857 meters (always-xy order).
#[must_use]
pub fn project_mercator(lon: f64, lat: f64) -> (f64, f64) {
    let x = EARTH_RADIUS * lon.to_radians();
    let y = EARTH_RADIUS
        * (std::f64::consts::FRAC_PI_4 + lat.to_radians() / 2.0)
            .tan()
            .ln();
    (x, y)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zoom_zero_covers_the_mercator_world() {
        let bbox = tile_to_bbox(0, 0, 0);
        assert!((bbox.p1.lon - -180.0).abs() < 1e-9);
        assert!((bbox.p2.lon - 180.0).abs() < 1e-9);
        assert!((bbox.p2.lat - 85.051_128_779_806_6).abs() < 1e-6);
        assert!((bbox.p1.lat + 85.051_128_779_806_6).abs() < 1e-6);
    }

    #[test]
    fn bbox_north_west_corner_is_the_tile_corner() {
        let corner = tile_to_lonlat(7, 71, 42);
        let bbox = tile_to_bbox(7, 71, 42);
        assert!((bbox.p1.lon - corner.lon).abs() < 1e-12);
        assert!((bbox.p2.lat - corner.lat).abs() < 1e-12);
    }

    #[test]
    fn tile_lookup_inverts_corner_lookup() {
        for (z, x, y) in [(3, 4, 2), (10, 571, 335), (16, 36_000, 21_000)] {
            let corner = tile_to_lonlat(z, x, y);
            // Nudge into the tile interior; the corner itself is shared.
            let n = f64::from(z).exp2();
            let inside_lon = corner.lon + 1e-6 * 360.0 / n;
            let inside_lat = corner.lat - 1e-6 * 170.0 / n;
            assert_eq!(lonlat_to_tile(z, inside_lon, inside_lat), (x, y));
        }
    }

    #[test]
    fn mercator_projection_matches_known_values() {
        let (x, y) = project_mercator(0.0, 0.0);
        assert!(x.abs() < 1e-9);
        assert!(y.abs() < 1e-6);

        let (x, y) = project_mercator(180.0, 0.0);
        assert!((x - 20_037_508.342_789_244).abs() < 1e-3);
        assert!(y.abs() < 1e-6);

        let (_, y) = project_mercator(0.0, 45.0);
        assert!((y - 5_621_521.486).abs() < 1.0);
    }
}
