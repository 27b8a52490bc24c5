//! Baseline efficiency analysis of the current route set.
//!
//! The report is a pure function of the recorded routes and vehicles, so the
//! same baseline is produced whether or not an optimization follows it.

use std::collections::HashMap;

use rayon::prelude::*;
use serde::Serialize;
use tracing::{instrument, warn};

use crate::cost::{CostModel, RouteCost};
use crate::params::OptimizationParameters;
use crate::travel::TravelModel;
use crate::traits::{Leg, RouteRecord, Vehicle};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum RouteClassification {
    Nominal,
    /// Fewer riders than `minStudentsPerRoute` on some leg.
    UnderUtilized,
    /// More riders than seats on some leg. Reported, never clamped.
    OverCapacity,
}

/// Upstream data problems found while analyzing a route.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum IntegrityWarning<VehicleId> {
    NegativeDistance { leg: Leg, begin: f64, end: f64 },
    /// A NaN or infinite odometer reading.
    NonFiniteDistance { leg: Leg },
    RidersExceedCapacity { leg: Leg, riders: u32, capacity: u32 },
    UnknownVehicle { leg: Leg, vehicle_id: VehicleId },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LegEfficiency<VehicleId> {
    pub leg: Leg,
    /// Set only when the vehicle exists in the fleet snapshot.
    pub vehicle_id: Option<VehicleId>,
    pub riders: u32,
    pub capacity: Option<u32>,
    /// `riders / capacity`, 0 without a vehicle.
    pub utilization: f64,
    /// `end - begin`; `None` when unrecorded, negative or non-finite.
    pub distance_miles: Option<f64>,
    pub duration_hours: Option<f64>,
    pub cost: Option<RouteCost>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RouteEfficiency<RouteId, VehicleId> {
    pub route_id: RouteId,
    pub legs: Vec<LegEfficiency<VehicleId>>,
    /// Peak leg utilization.
    pub utilization: f64,
    /// Sum of leg distances; `None` if any leg has an invalid reading.
    pub distance_miles: Option<f64>,
    pub classification: RouteClassification,
    pub warnings: Vec<IntegrityWarning<VehicleId>>,
}

impl<RouteId, VehicleId> RouteEfficiency<RouteId, VehicleId> {
    pub fn leg(&self, leg: Leg) -> Option<&LegEfficiency<VehicleId>> {
        self.legs.iter().find(|l| l.leg == leg)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RouteEfficiencyReport<RouteId, VehicleId> {
    /// Active routes, in input order.
    pub routes: Vec<RouteEfficiency<RouteId, VehicleId>>,
    pub total_distance_miles: f64,
    pub average_utilization: f64,
    pub under_utilized: usize,
    pub over_capacity: usize,
    pub integrity_warnings: usize,
    /// Cost of every leg with a usable distance.
    pub total_cost: RouteCost,
}

impl<RouteId: PartialEq, VehicleId> RouteEfficiencyReport<RouteId, VehicleId> {
    pub fn route(&self, route_id: &RouteId) -> Option<&RouteEfficiency<RouteId, VehicleId>> {
        self.routes.iter().find(|r| &r.route_id == route_id)
    }
}

#[instrument(skip_all, fields(routes = routes.len(), vehicles = vehicles.len()))]
pub fn analyze<R, V>(
    routes: &[R],
    vehicles: &[V],
    params: &OptimizationParameters,
) -> RouteEfficiencyReport<R::Id, V::Id>
where
    R: RouteRecord<VehicleId = V::Id>,
    V: Vehicle,
{
    let fleet: HashMap<&V::Id, &V> = vehicles.iter().map(|v| (v.id(), v)).collect();
    let travel = TravelModel::from_params(params);
    let costs = CostModel::from_params(params);

    let analyzed: Vec<RouteEfficiency<R::Id, V::Id>> = routes
        .par_iter()
        .filter(|route| route.is_active())
        .map(|route| analyze_route(route, &fleet, params, &travel, &costs))
        .collect();

    for route in &analyzed {
        for warning in &route.warnings {
            warn!(route = ?route.route_id, ?warning, "route data integrity warning");
        }
    }

    let total_distance_miles = analyzed.iter().filter_map(|r| r.distance_miles).sum();
    let average_utilization = if analyzed.is_empty() {
        0.0
    } else {
        analyzed.iter().map(|r| r.utilization).sum::<f64>() / analyzed.len() as f64
    };
    let total_cost = analyzed
        .iter()
        .flat_map(|r| r.legs.iter())
        .filter_map(|l| l.cost)
        .fold(RouteCost::default(), |acc, c| RouteCost {
            fuel_cost: acc.fuel_cost + c.fuel_cost,
            driver_cost: acc.driver_cost + c.driver_cost,
        });

    RouteEfficiencyReport {
        under_utilized: count_class(&analyzed, RouteClassification::UnderUtilized),
        over_capacity: count_class(&analyzed, RouteClassification::OverCapacity),
        integrity_warnings: analyzed.iter().map(|r| r.warnings.len()).sum(),
        routes: analyzed,
        total_distance_miles,
        average_utilization,
        total_cost,
    }
}

fn count_class<RouteId, VehicleId>(
    routes: &[RouteEfficiency<RouteId, VehicleId>],
    class: RouteClassification,
) -> usize {
    routes.iter().filter(|r| r.classification == class).count()
}

fn analyze_route<R, V>(
    route: &R,
    fleet: &HashMap<&V::Id, &V>,
    params: &OptimizationParameters,
    travel: &TravelModel,
    costs: &CostModel,
) -> RouteEfficiency<R::Id, V::Id>
where
    R: RouteRecord<VehicleId = V::Id>,
    V: Vehicle,
{
    let mut legs = Vec::new();
    let mut warnings = Vec::new();
    let mut invalid = false;

    for leg in Leg::BOTH {
        let recorded_vehicle = route.vehicle_id(leg);
        let odometer = route.odometer(leg);
        let riders = route.riders(leg);
        if recorded_vehicle.is_none() && odometer.is_none() && riders == 0 {
            continue;
        }

        let vehicle = match recorded_vehicle {
            Some(id) => match fleet.get(id) {
                Some(vehicle) => Some(*vehicle),
                None => {
                    warnings.push(IntegrityWarning::UnknownVehicle {
                        leg,
                        vehicle_id: id.clone(),
                    });
                    None
                }
            },
            None => None,
        };

        let capacity = vehicle.map(|v| v.capacity());
        let utilization = match capacity {
            Some(capacity) if capacity > 0 => riders as f64 / capacity as f64,
            _ => 0.0,
        };
        if let Some(capacity) = capacity {
            if riders > capacity {
                warnings.push(IntegrityWarning::RidersExceedCapacity {
                    leg,
                    riders,
                    capacity,
                });
            }
        }

        let distance_miles = match odometer {
            Some((begin, end)) if !(end - begin).is_finite() => {
                invalid = true;
                warnings.push(IntegrityWarning::NonFiniteDistance { leg });
                None
            }
            Some((begin, end)) if end - begin < 0.0 => {
                invalid = true;
                warnings.push(IntegrityWarning::NegativeDistance { leg, begin, end });
                None
            }
            Some((begin, end)) => Some(end - begin),
            None => None,
        };
        let duration_hours = distance_miles.map(|miles| travel.drive_hours(miles));
        let cost = distance_miles
            .zip(duration_hours)
            .map(|(miles, hours)| costs.cost(miles, hours, vehicle.and_then(|v| v.mpg())));

        legs.push(LegEfficiency {
            leg,
            vehicle_id: vehicle.map(|v| v.id().clone()),
            riders,
            capacity,
            utilization,
            distance_miles,
            duration_hours,
            cost,
        });
    }

    let over_capacity = legs
        .iter()
        .any(|l| l.capacity.is_some_and(|capacity| l.riders > capacity));
    // A leg without a vehicle has zero utilization.
    let under_utilized = if legs.is_empty() {
        params.min_students_per_route > 0
    } else {
        legs.iter().any(|l| match l.capacity {
            Some(_) => l.riders < params.min_students_per_route,
            None => params.min_students_per_route > 0,
        })
    };
    let classification = if over_capacity {
        RouteClassification::OverCapacity
    } else if under_utilized {
        RouteClassification::UnderUtilized
    } else {
        RouteClassification::Nominal
    };

    let recorded: Vec<f64> = legs.iter().filter_map(|l| l.distance_miles).collect();
    let distance_miles = if invalid || recorded.is_empty() {
        None
    } else {
        Some(recorded.iter().sum())
    };

    RouteEfficiency {
        route_id: route.id().clone(),
        utilization: legs.iter().map(|l| l.utilization).fold(0.0, f64::max),
        legs,
        distance_miles,
        classification,
        warnings,
    }
}
