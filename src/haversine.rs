//! Haversine distance estimator (default when no road distances are supplied).
//!
//! Uses great-circle distance scaled by a circuity factor to approximate
//! road miles. Less accurate than a routed matrix but always available.

use rayon::prelude::*;

use crate::traits::TravelEstimator;

/// Typical ratio of road distance to straight-line distance in suburban grids.
const DEFAULT_CIRCUITY: f64 = 1.3;

/// Earth radius in miles.
const EARTH_RADIUS_MILES: f64 = 3958.8;

/// Haversine-based travel estimator.
#[derive(Debug, Clone)]
pub struct HaversineEstimator {
    /// Multiplier from great-circle miles to road miles.
    pub circuity: f64,
}

impl Default for HaversineEstimator {
    fn default() -> Self {
        Self {
            circuity: DEFAULT_CIRCUITY,
        }
    }
}

impl HaversineEstimator {
    pub fn new(circuity: f64) -> Self {
        Self { circuity }
    }

    /// Great-circle distance between two points in miles.
    pub fn haversine_miles(from: (f64, f64), to: (f64, f64)) -> f64 {
        let (lat1, lng1) = from;
        let (lat2, lng2) = to;

        let lat1_rad = lat1.to_radians();
        let lat2_rad = lat2.to_radians();
        let delta_lat = (lat2 - lat1).to_radians();
        let delta_lng = (lng2 - lng1).to_radians();

        let a = (delta_lat / 2.0).sin().powi(2)
            + lat1_rad.cos() * lat2_rad.cos() * (delta_lng / 2.0).sin().powi(2);
        let c = 2.0 * a.sqrt().asin();

        EARTH_RADIUS_MILES * c
    }

    /// Estimated road miles between two points.
    pub fn road_miles(&self, from: (f64, f64), to: (f64, f64)) -> f64 {
        Self::haversine_miles(from, to) * self.circuity
    }
}

impl TravelEstimator for HaversineEstimator {
    fn matrix_for(&self, locations: &[(f64, f64)]) -> Vec<Vec<f64>> {
        locations
            .par_iter()
            .enumerate()
            .map(|(i, from)| {
                locations
                    .iter()
                    .enumerate()
                    .map(|(j, to)| if i == j { 0.0 } else { self.road_miles(*from, *to) })
                    .collect::<Vec<f64>>()
            })
            .collect()
    }
}
