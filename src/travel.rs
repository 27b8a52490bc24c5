//! Travel estimates for a single route leg.

use serde::Serialize;
use thiserror::Error;

use crate::params::OptimizationParameters;
use crate::traits::TravelEstimator;

/// Two stops closer than this are treated as one pickup point.
const SAME_STOP_MILES: f64 = 1e-6;

/// Converts distance to time.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TravelModel {
    pub speed_mph: f64,
    /// Multiplier on driving time (1.0 when traffic is ignored).
    pub traffic_factor: f64,
    pub dwell_minutes: f64,
}

impl TravelModel {
    pub fn from_params(params: &OptimizationParameters) -> Self {
        Self {
            speed_mph: params.free_flow_speed_mph,
            traffic_factor: params.effective_traffic_factor(),
            dwell_minutes: params.stop_dwell_minutes,
        }
    }

    /// Driving time in hours, without stops.
    pub fn drive_hours(&self, miles: f64) -> f64 {
        miles / self.speed_mph * self.traffic_factor
    }

    /// Driving time plus dwell at each stop, in hours.
    pub fn leg_hours(&self, miles: f64, stops: usize) -> f64 {
        self.drive_hours(miles) + self.dwell_minutes * stops as f64 / 60.0
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
#[error("travel estimator returned a {rows}x{columns} matrix for {expected} locations")]
pub struct MatrixShapeError {
    pub expected: usize,
    pub rows: usize,
    pub columns: usize,
}

/// Point-to-point road miles for every location in a run.
#[derive(Debug, Clone)]
pub struct TravelMatrix {
    distances: Vec<Vec<f64>>,
}

impl TravelMatrix {
    pub fn build<E: TravelEstimator>(
        estimator: &E,
        locations: &[(f64, f64)],
    ) -> Result<Self, MatrixShapeError> {
        let distances = estimator.matrix_for(locations);
        let expected = locations.len();
        if let Some(bad) = distances.iter().find(|row| row.len() != expected) {
            return Err(MatrixShapeError {
                expected,
                rows: distances.len(),
                columns: bad.len(),
            });
        }
        if distances.len() != expected {
            return Err(MatrixShapeError {
                expected,
                rows: distances.len(),
                columns: expected,
            });
        }
        Ok(Self { distances })
    }

    pub fn len(&self) -> usize {
        self.distances.len()
    }

    pub fn is_empty(&self) -> bool {
        self.distances.is_empty()
    }

    pub fn miles(&self, from: usize, to: usize) -> f64 {
        self.distances[from][to]
    }

    fn same_stop(&self, a: usize, b: usize) -> bool {
        a == b || self.miles(a, b) <= SAME_STOP_MILES
    }
}

/// Distance and time figures for one leg of one vehicle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct LegEstimate {
    /// Depot to first pickup.
    pub deadhead_miles: f64,
    /// First pickup to the destination (or the last stop).
    pub ride_miles: f64,
    /// Distinct pickup points.
    pub stops: usize,
    /// Time aboard for the first student picked up, dwell included.
    pub ride_minutes: f64,
    /// Driving time for the whole leg. Dwell is excluded so that legs with
    /// unknown stop counts can be compared on the same footing.
    pub duration_hours: f64,
}

impl LegEstimate {
    pub fn total_miles(&self) -> f64 {
        self.deadhead_miles + self.ride_miles
    }
}

/// Estimates a leg that visits `stops` (matrix indices) in order.
pub fn estimate_leg(
    matrix: &TravelMatrix,
    model: &TravelModel,
    stops: &[usize],
    depot: Option<usize>,
    destination: Option<usize>,
) -> LegEstimate {
    let (Some(&first), Some(&last)) = (stops.first(), stops.last()) else {
        return LegEstimate::default();
    };

    let deadhead_miles = depot.map_or(0.0, |depot| matrix.miles(depot, first));

    let mut ride_miles = 0.0;
    let mut distinct = 1;
    for pair in stops.windows(2) {
        ride_miles += matrix.miles(pair[0], pair[1]);
        if !matrix.same_stop(pair[0], pair[1]) {
            distinct += 1;
        }
    }
    if let Some(destination) = destination {
        ride_miles += matrix.miles(last, destination);
    }

    let ride_minutes = model.leg_hours(ride_miles, distinct) * 60.0;
    let duration_hours = model.drive_hours(deadhead_miles + ride_miles);

    LegEstimate {
        deadhead_miles,
        ride_miles,
        stops: distinct,
        ride_minutes,
        duration_hours,
    }
}
