//! Optimization parameters.
//!
//! A typed replacement for the loosely-typed option bags the host UI
//! collects. Values are only trusted after [`crate::validator::validate`]
//! returns no errors.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct OptimizationParameters {
    /// Upper bound on a leg's total distance in miles, deadhead included.
    pub max_route_distance: f64,
    /// Hard seat ceiling, applied on top of each vehicle's own capacity.
    pub max_students_per_bus: u32,
    /// Soft target; routes below it are flagged as under-utilized.
    pub min_students_per_route: u32,
    /// Longest time a student may spend aboard one leg.
    pub max_ride_time_minutes: f64,
    pub consider_traffic_patterns: bool,
    /// When false, accessibility matching is ignored entirely.
    pub consider_special_needs: bool,
    pub fuel_cost_per_gallon: f64,
    pub driver_cost_per_hour: f64,
    /// Duration inflation applied when traffic patterns are considered.
    pub traffic_factor: f64,
    pub free_flow_speed_mph: f64,
    /// Fleet fuel economy used when a vehicle does not report its own.
    pub default_mpg: f64,
    pub stop_dwell_minutes: f64,
    /// Edge length of the square grid cells used to cluster students.
    pub cluster_cell_miles: f64,
    /// Pass budget for the local improvement phase.
    pub max_improvement_passes: u32,
}

impl Default for OptimizationParameters {
    fn default() -> Self {
        Self {
            max_route_distance: 25.0,
            max_students_per_bus: 60,
            min_students_per_route: 15,
            max_ride_time_minutes: 45.0,
            consider_traffic_patterns: true,
            consider_special_needs: true,
            fuel_cost_per_gallon: 3.50,
            driver_cost_per_hour: 25.00,
            traffic_factor: 1.25,
            free_flow_speed_mph: 30.0,
            default_mpg: 7.0,
            stop_dwell_minutes: 0.5,
            cluster_cell_miles: 1.0,
            max_improvement_passes: 10,
        }
    }
}

impl OptimizationParameters {
    /// Parses parameters from JSON. Missing fields take their defaults.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    /// Traffic multiplier actually applied to travel times.
    pub fn effective_traffic_factor(&self) -> f64 {
        if self.consider_traffic_patterns {
            self.traffic_factor
        } else {
            1.0
        }
    }

    /// Seats usable on a vehicle with the given physical capacity.
    pub fn effective_capacity(&self, vehicle_capacity: u32) -> u32 {
        vehicle_capacity.min(self.max_students_per_bus)
    }
}
