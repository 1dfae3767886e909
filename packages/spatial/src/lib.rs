#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions)]

//! Zoom-dependent clustering of AED query results.
//!
//! Tile requests at low and medium zoom collapse nearby AEDs into
//! representative groups so the client renders one symbol with a count
//! instead of hundreds of overlapping markers. The clustering is
//! incremental with a distance threshold and no target cluster count:
//! subclusters grow as points within the threshold are absorbed, and
//! every input point is then labeled with its nearest subcluster via an
//! R-tree over the centroids.

use geo::Point;
use openaedmap_aed_models::{Aed, AedGroup, AedOrGroup, decide_access};
use openaedmap_config::TILE_MAX_Z;
use rstar::RTree;
use rstar::primitives::GeomWithData;

/// Upper bound on the number of points the threshold fit runs on.
/// Larger inputs are down-sampled deterministically.
const MAX_FIT_SAMPLES: usize = 7000;

/// Clustering threshold for a tile zoom, `None` at the maximum zoom
/// where every AED is rendered individually.
#[must_use]
pub fn eps_for_zoom(z: u32) -> Option<f64> {
    (z < TILE_MAX_Z).then(|| 9.6 / f64::from(z).exp2())
}

/// Polygon simplification tolerance for a tile zoom.
#[must_use]
pub fn simplify_tolerance_for_zoom(z: u32) -> Option<f64> {
    (z < TILE_MAX_Z).then(|| 0.5 / f64::from(z).exp2())
}

/// A growing subcluster: centroid is the running mean of its members.
#[derive(Debug)]
struct Subcluster {
    sum_x: f64,
    sum_y: f64,
    count: usize,
}

impl Subcluster {
    fn centroid(&self) -> [f64; 2] {
        #[allow(clippy::cast_precision_loss)]
        let n = self.count as f64;
        [self.sum_x / n, self.sum_y / n]
    }
}

/// Clusters a point set with the given threshold.
///
/// Inputs of one point, or a missing threshold, pass through unchanged.
/// Subclusters with a single member are emitted as their original AED;
/// larger ones become an [`AedGroup`] positioned at the subcluster
/// centroid with the members' aggregated access label.
#[must_use]
pub fn cluster(aeds: Vec<Aed>, eps: Option<f64>) -> Vec<AedOrGroup> {
    let Some(eps) = eps else {
        return aeds.into_iter().map(AedOrGroup::Single).collect();
    };
    if aeds.len() <= 1 {
        return aeds.into_iter().map(AedOrGroup::Single).collect();
    }

    let positions: Vec<[f64; 2]> = aeds
        .iter()
        .map(|aed| [aed.position.x(), aed.position.y()])
        .collect();

    let subclusters = fit(&positions, eps);
    let labels = predict(&positions, &subclusters);

    let mut members: Vec<Vec<&Aed>> = (0..subclusters.len()).map(|_| Vec::new()).collect();
    for (aed, label) in aeds.iter().zip(&labels) {
        members[*label].push(aed);
    }

    let mut result = Vec::with_capacity(subclusters.len());
    for (subcluster, group) in subclusters.iter().zip(members) {
        match group.as_slice() {
            [] => {}
            [single] => result.push(AedOrGroup::Single((*single).clone())),
            _ => {
                let [x, y] = subcluster.centroid();
                let access = decide_access(group.iter().map(|aed| aed.access())).to_string();
                result.push(AedOrGroup::Group(AedGroup {
                    position: Point::new(x, y),
                    count: group.len() as u64,
                    access,
                }));
            }
        }
    }

    result
}

/// Grows subclusters over a deterministically down-sampled prefix of
/// the input.
fn fit(positions: &[[f64; 2]], eps: f64) -> Vec<Subcluster> {
    let mut subclusters: Vec<Subcluster> = Vec::new();

    for index in fit_sample_indices(positions.len()) {
        let [x, y] = positions[index];

        let nearest = subclusters
            .iter_mut()
            .map(|s| {
                let [cx, cy] = s.centroid();
                let dist = (cx - x).hypot(cy - y);
                (dist, s)
            })
            .min_by(|a, b| a.0.total_cmp(&b.0));

        match nearest {
            Some((dist, subcluster)) if dist <= eps => {
                subcluster.sum_x += x;
                subcluster.sum_y += y;
                subcluster.count += 1;
            }
            _ => subclusters.push(Subcluster {
                sum_x: x,
                sum_y: y,
                count: 1,
            }),
        }
    }

    subclusters
}

/// Labels every point with its nearest subcluster centroid.
fn predict(positions: &[[f64; 2]], subclusters: &[Subcluster]) -> Vec<usize> {
    let tree = RTree::bulk_load(
        subclusters
            .iter()
            .enumerate()
            .map(|(i, s)| GeomWithData::new(s.centroid(), i))
            .collect(),
    );

    positions
        .iter()
        .map(|position| {
            tree.nearest_neighbor(position)
                .map_or(0, |centroid| centroid.data)
        })
        .collect()
}

/// Evenly-spaced sample indices: the full range when it fits, otherwise
/// `MAX_FIT_SAMPLES` indices at stride `n / MAX_FIT_SAMPLES`.
fn fit_sample_indices(n: usize) -> Vec<usize> {
    if n <= MAX_FIT_SAMPLES {
        return (0..n).collect();
    }

    #[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    (0..MAX_FIT_SAMPLES)
        .map(|i| ((i as f64) * (n as f64) / (MAX_FIT_SAMPLES as f64)) as usize)
        .collect()
}
