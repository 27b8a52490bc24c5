//! Grid clustering of students and per-cluster pickup sequencing.
//!
//! Cell keys and pickup sequences are computed in parallel. The returned
//! plans are read-only; placing them on vehicles happens on a single thread.

use std::collections::BTreeMap;

use rayon::prelude::*;
use serde::Serialize;
use tracing::debug;

use crate::travel::TravelMatrix;

const MILES_PER_DEGREE: f64 = 69.0;

/// Which vehicles a cluster may draw from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub enum Pool {
    /// Accessibility-equipped vehicles only.
    Accessible,
    /// Any eligible vehicle.
    Any,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct ClusterKey {
    pub pool: Pool,
    pub tier: u32,
    pub cell: (i64, i64),
}

/// One student as seen by the clustering step.
#[derive(Debug, Clone, Copy)]
pub struct ClusterInput {
    /// Matrix index of the student's home.
    pub point: usize,
    pub location: (f64, f64),
    pub tier: u32,
    pub pool: Pool,
}

#[derive(Debug, Clone)]
pub struct ClusterPlan {
    pub key: ClusterKey,
    /// Indices into the clustering input, in pickup order.
    pub members: Vec<usize>,
    pub centroid: (f64, f64),
}

impl ClusterPlan {
    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }
}

/// Grid cell of a location, for square cells of `cell_miles`.
pub fn cell_for(location: (f64, f64), reference_lat: f64, cell_miles: f64) -> (i64, i64) {
    let (lat, lng) = location;
    let y = lat * MILES_PER_DEGREE / cell_miles;
    let x = lng * MILES_PER_DEGREE * reference_lat.to_radians().cos() / cell_miles;
    (y.floor() as i64, x.floor() as i64)
}

/// Buckets students into clusters, sequences each cluster, and returns the
/// clusters in placement priority order.
///
/// Accessible-pool clusters come first since they have the fewest vehicle
/// options, then larger clusters before smaller ones; remaining ties go by
/// key so the order is reproducible.
pub fn build_clusters(
    inputs: &[ClusterInput],
    matrix: &TravelMatrix,
    destination: Option<usize>,
    cell_miles: f64,
) -> Vec<ClusterPlan> {
    if inputs.is_empty() {
        return Vec::new();
    }

    let reference_lat =
        inputs.iter().map(|input| input.location.0).sum::<f64>() / inputs.len() as f64;

    let keys: Vec<ClusterKey> = inputs
        .par_iter()
        .map(|input| ClusterKey {
            pool: input.pool,
            tier: input.tier,
            cell: cell_for(input.location, reference_lat, cell_miles),
        })
        .collect();

    let mut groups: BTreeMap<ClusterKey, Vec<usize>> = BTreeMap::new();
    for (index, key) in keys.into_iter().enumerate() {
        groups.entry(key).or_default().push(index);
    }

    let mut plans: Vec<ClusterPlan> = groups
        .into_par_iter()
        .map(|(key, members)| {
            let centroid = centroid_of(inputs, &members);
            let members = sequence(inputs, members, matrix, destination);
            ClusterPlan {
                key,
                members,
                centroid,
            }
        })
        .collect();

    plans.sort_by(|a, b| {
        a.key
            .pool
            .cmp(&b.key.pool)
            .then_with(|| b.len().cmp(&a.len()))
            .then_with(|| a.key.cmp(&b.key))
    });

    debug!(clusters = plans.len(), students = inputs.len(), "clustered students");
    plans
}

fn centroid_of(inputs: &[ClusterInput], members: &[usize]) -> (f64, f64) {
    let n = members.len().max(1) as f64;
    let (lat, lng) = members.iter().fold((0.0, 0.0), |(lat, lng), &m| {
        (lat + inputs[m].location.0, lng + inputs[m].location.1)
    });
    (lat / n, lng / n)
}

/// Nearest-neighbor pickup chain starting from the member farthest from the
/// destination (or from the first member when there is none).
fn sequence(
    inputs: &[ClusterInput],
    mut remaining: Vec<usize>,
    matrix: &TravelMatrix,
    destination: Option<usize>,
) -> Vec<usize> {
    let mut ordered = Vec::with_capacity(remaining.len());
    if remaining.is_empty() {
        return ordered;
    }

    let start = match destination {
        Some(dest) => farthest(&remaining, |m| matrix.miles(inputs[m].point, dest)),
        None => 0,
    };
    let mut current = remaining.remove(start);
    ordered.push(current);

    while !remaining.is_empty() {
        let from = inputs[current].point;
        let next = nearest(&remaining, |m| matrix.miles(from, inputs[m].point));
        current = remaining.remove(next);
        ordered.push(current);
    }

    ordered
}

fn farthest(candidates: &[usize], distance: impl Fn(usize) -> f64) -> usize {
    let mut best = 0;
    for (pos, &m) in candidates.iter().enumerate().skip(1) {
        if distance(m) > distance(candidates[best]) {
            best = pos;
        }
    }
    best
}

fn nearest(candidates: &[usize], distance: impl Fn(usize) -> f64) -> usize {
    let mut best = 0;
    for (pos, &m) in candidates.iter().enumerate().skip(1) {
        if distance(m) < distance(candidates[best]) {
            best = pos;
        }
    }
    best
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::haversine::HaversineEstimator;

    fn input(point: usize, location: (f64, f64), pool: Pool) -> ClusterInput {
        ClusterInput {
            point,
            location,
            tier: 0,
            pool,
        }
    }

    #[test]
    fn test_cell_for_groups_nearby_points() {
        let a = cell_for((36.1100, -115.1000), 36.1, 1.0);
        let b = cell_for((36.1110, -115.1000), 36.1, 1.0);
        let far = cell_for((36.2000, -115.1000), 36.1, 1.0);
        assert_eq!(a, b);
        assert_ne!(a, far);
    }

    #[test]
    fn test_accessible_clusters_first_then_size() {
        let locations = vec![
            (36.110, -115.100),
            (36.111, -115.100),
            (36.112, -115.100),
            (36.300, -115.100),
            (36.500, -115.100),
        ];
        let matrix = TravelMatrix::build(&HaversineEstimator::default(), &locations).unwrap();
        let inputs = vec![
            input(0, locations[0], Pool::Any),
            input(1, locations[1], Pool::Any),
            input(2, locations[2], Pool::Any),
            input(3, locations[3], Pool::Any),
            input(4, locations[4], Pool::Accessible),
        ];

        let plans = build_clusters(&inputs, &matrix, None, 1.0);
        assert_eq!(plans.len(), 3);
        assert_eq!(plans[0].key.pool, Pool::Accessible);
        assert_eq!(plans[1].len(), 3);
        assert_eq!(plans[2].members, vec![3]);
    }

    #[test]
    fn test_sequence_starts_farthest_from_destination() {
        let locations = vec![
            (36.100, -115.100),
            (36.104, -115.100),
            (36.102, -115.100),
            (36.090, -115.100),
        ];
        let matrix = TravelMatrix::build(&HaversineEstimator::default(), &locations).unwrap();
        let inputs: Vec<_> = (0..3).map(|i| input(i, locations[i], Pool::Any)).collect();

        let plans = build_clusters(&inputs, &matrix, Some(3), 5.0);
        assert_eq!(plans.len(), 1);
        assert_eq!(plans[0].members, vec![1, 2, 0]);
    }

    #[test]
    fn test_tiers_never_share_a_cluster() {
        let locations = vec![(36.1, -115.1), (36.1, -115.1)];
        let matrix = TravelMatrix::build(&HaversineEstimator::default(), &locations).unwrap();
        let mut second = input(1, locations[1], Pool::Any);
        second.tier = 2;
        let inputs = vec![input(0, locations[0], Pool::Any), second];

        let plans = build_clusters(&inputs, &matrix, None, 1.0);
        assert_eq!(plans.len(), 2);
    }
}
