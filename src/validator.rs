//! Parameter sanity checks run before any computation.

use thiserror::Error;
use tracing::warn;

use crate::params::OptimizationParameters;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    #[error("{field} must be a finite number")]
    NotFinite { field: &'static str },
    #[error("{field} must be greater than zero (got {value})")]
    NotPositive { field: &'static str, value: f64 },
    #[error("{field} must not be negative (got {value})")]
    Negative { field: &'static str, value: f64 },
    #[error("trafficFactor must be at least 1.0 (got {value})")]
    TrafficFactorBelowOne { value: f64 },
    #[error("minStudentsPerRoute ({min}) must not exceed maxStudentsPerBus ({max})")]
    MinExceedsMax { min: u32, max: u32 },
}

#[derive(Clone, Copy)]
enum Sign {
    Positive,
    NonNegative,
}

/// Checks every parameter and reports all failures together.
///
/// An empty list means the parameters may be used for a run.
pub fn validate(params: &OptimizationParameters) -> Vec<ValidationError> {
    let mut errors = Vec::new();

    let real_fields = [
        ("maxRouteDistance", params.max_route_distance, Sign::Positive),
        ("maxRideTimeMinutes", params.max_ride_time_minutes, Sign::Positive),
        ("fuelCostPerGallon", params.fuel_cost_per_gallon, Sign::NonNegative),
        ("driverCostPerHour", params.driver_cost_per_hour, Sign::NonNegative),
        ("freeFlowSpeedMph", params.free_flow_speed_mph, Sign::Positive),
        ("defaultMpg", params.default_mpg, Sign::Positive),
        ("stopDwellMinutes", params.stop_dwell_minutes, Sign::NonNegative),
        ("clusterCellMiles", params.cluster_cell_miles, Sign::Positive),
    ];

    for (field, value, sign) in real_fields {
        if let Some(error) = check_real(field, value, sign) {
            errors.push(error);
        }
    }

    if !params.traffic_factor.is_finite() {
        errors.push(ValidationError::NotFinite {
            field: "trafficFactor",
        });
    } else if params.traffic_factor < 1.0 {
        errors.push(ValidationError::TrafficFactorBelowOne {
            value: params.traffic_factor,
        });
    }

    if params.max_students_per_bus == 0 {
        errors.push(ValidationError::NotPositive {
            field: "maxStudentsPerBus",
            value: 0.0,
        });
    }

    if params.min_students_per_route > params.max_students_per_bus {
        errors.push(ValidationError::MinExceedsMax {
            min: params.min_students_per_route,
            max: params.max_students_per_bus,
        });
    }

    if !errors.is_empty() {
        warn!(count = errors.len(), "optimization parameters rejected");
    }

    errors
}

fn check_real(field: &'static str, value: f64, sign: Sign) -> Option<ValidationError> {
    if !value.is_finite() {
        return Some(ValidationError::NotFinite { field });
    }
    match sign {
        Sign::Positive if value <= 0.0 => Some(ValidationError::NotPositive { field, value }),
        Sign::NonNegative if value < 0.0 => Some(ValidationError::Negative { field, value }),
        _ => None,
    }
}
