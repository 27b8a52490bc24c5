//! Before/after scoring of the candidate plan against the baseline.

use std::collections::{HashMap, HashSet};
use std::hash::Hash;

use serde::Serialize;
use tracing::{debug, info, instrument};

use crate::analyzer::{IntegrityWarning, RouteEfficiency, RouteEfficiencyReport};
use crate::cost::{RouteCost, Savings, percent_of, savings};
use crate::optimizer::{Assignment, AssignmentPlan, UnassignedStudent};
use crate::traits::{Leg, Student, Vehicle, VehicleStatus};

const EPSILON: f64 = 1e-9;

/// Recommendation for one existing route on the planned leg.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OptimizationResult<RouteId, VehicleId> {
    pub route_id: RouteId,
    pub vehicle_id: Option<VehicleId>,
    /// `None` when the recorded distance is missing or invalid.
    pub baseline_cost: Option<RouteCost>,
    pub candidate_cost: Option<RouteCost>,
    /// `baseline - candidate`; negative when the candidate costs more.
    pub savings: Savings,
    pub fuel_savings_percent: Option<f64>,
    pub time_efficiency_gain: Option<f64>,
    pub time_saved_minutes: f64,
    pub has_alternative: bool,
    pub optimization_notes: String,
    pub utilization_before: f64,
    pub utilization_after: f64,
    /// Candidate riders who do not currently ride this route.
    pub reassigned_riders: usize,
}

/// Net gains of the plan over the baseline on one leg.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct EfficiencyGains {
    pub total_time_saved_minutes: f64,
    pub fuel_savings: f64,
    pub total_savings: f64,
    /// Mean candidate utilization minus mean baseline utilization.
    pub capacity_optimization: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OptimizationReport<RouteId, VehicleId, StudentId> {
    pub leg: Leg,
    pub seed: u64,
    pub baseline: RouteEfficiencyReport<RouteId, VehicleId>,
    pub assignments: Vec<Assignment<VehicleId, RouteId, StudentId>>,
    /// Ranked by absolute total savings, largest first.
    pub results: Vec<OptimizationResult<RouteId, VehicleId>>,
    pub efficiency_gains: EfficiencyGains,
    pub confidence_level: f64,
    pub unassigned: Vec<UnassignedStudent<StudentId>>,
    pub cancelled: bool,
    pub improvement_passes: u32,
    /// Assignments on vehicles that run no existing route.
    pub proposed_new_routes: usize,
}

#[instrument(
    skip_all,
    fields(routes = baseline.routes.len(), assignments = plan.assignments.len())
)]
pub fn aggregate<S, V>(
    baseline: RouteEfficiencyReport<S::RouteId, V::Id>,
    plan: AssignmentPlan<V::Id, S::RouteId, S::Id>,
    students: &[S],
    vehicles: &[V],
) -> OptimizationReport<S::RouteId, V::Id, S::Id>
where
    S: Student,
    V: Vehicle,
{
    let results = score_routes(&baseline, &plan, students);
    let efficiency_gains = efficiency_gains(&baseline, &plan, &results);
    let confidence_level = confidence_level(students, vehicles);
    let proposed_new_routes = plan
        .assignments
        .iter()
        .filter(|a| a.route_id.is_none())
        .count();

    info!(
        results = results.len(),
        with_alternative = results.iter().filter(|r| r.has_alternative).count(),
        total_savings = efficiency_gains.total_savings,
        confidence_level,
        proposed_new_routes,
        "scoring finished"
    );

    OptimizationReport {
        leg: plan.leg,
        seed: plan.seed,
        baseline,
        assignments: plan.assignments,
        results,
        efficiency_gains,
        confidence_level,
        unassigned: plan.unassigned,
        cancelled: plan.cancelled,
        improvement_passes: plan.improvement_passes,
        proposed_new_routes,
    }
}

/// One result per baseline route that runs the planned leg, ranked by
/// absolute total savings (descending) then route id.
///
/// Savings are signed: a route that absorbs riders from consolidated routes
/// can cost more than it does today, and that increase is reported as is.
pub fn score_routes<S, VehicleId>(
    baseline: &RouteEfficiencyReport<S::RouteId, VehicleId>,
    plan: &AssignmentPlan<VehicleId, S::RouteId, S::Id>,
    students: &[S],
) -> Vec<OptimizationResult<S::RouteId, VehicleId>>
where
    S: Student,
    VehicleId: Clone + Eq + Hash,
{
    let leg = plan.leg;
    let by_id: HashMap<&S::Id, &S> = students.iter().map(|s| (s.id(), s)).collect();
    let by_route: HashMap<&S::RouteId, &Assignment<VehicleId, S::RouteId, S::Id>> = plan
        .assignments
        .iter()
        .filter_map(|a| a.route_id.as_ref().map(|id| (id, a)))
        .collect();
    let planned_vehicles: HashSet<&VehicleId> =
        plan.assignments.iter().map(|a| &a.vehicle_id).collect();

    let mut results: Vec<OptimizationResult<S::RouteId, VehicleId>> = baseline
        .routes
        .iter()
        .filter_map(|route| {
            let current = route.leg(leg)?;
            let candidate = by_route.get(&route.route_id).copied();

            let reassigned_riders = candidate.map_or(0, |a| {
                a.students_assigned
                    .iter()
                    .filter(|id| {
                        by_id
                            .get(id)
                            .and_then(|s| s.assigned_route(leg))
                            .is_none_or(|assigned| *assigned != route.route_id)
                    })
                    .count()
            });

            let mut result = OptimizationResult {
                route_id: route.route_id.clone(),
                vehicle_id: current.vehicle_id.clone(),
                baseline_cost: current.cost,
                candidate_cost: candidate.map(|a| a.cost),
                savings: Savings::default(),
                fuel_savings_percent: None,
                time_efficiency_gain: None,
                time_saved_minutes: 0.0,
                has_alternative: false,
                optimization_notes: String::new(),
                utilization_before: current.utilization,
                utilization_after: candidate.map_or(0.0, |a| a.capacity_utilization),
                reassigned_riders,
            };

            let Some((baseline_cost, baseline_hours)) = current.cost.zip(current.duration_hours)
            else {
                result.has_alternative = candidate.is_some();
                result.optimization_notes = match invalid_odometer(route, leg) {
                    Some(reading) => format!(
                        "baseline distance invalid ({reading} odometer reading); \
                         savings not computed"
                    ),
                    None => "no baseline odometer reading; savings not computed".to_string(),
                };
                return Some(result);
            };

            let (candidate_cost, candidate_hours) =
                candidate.map_or((RouteCost::default(), 0.0), |a| {
                    (a.cost, a.estimate.duration_hours)
                });
            let saved = savings(&baseline_cost, &candidate_cost);
            let hours_saved = baseline_hours - candidate_hours;
            result.fuel_savings_percent = saved.fuel.percent;
            result.time_efficiency_gain = if baseline_cost.total() != 0.0 {
                percent_of(hours_saved, baseline_hours)
            } else {
                None
            };
            result.time_saved_minutes = hours_saved * 60.0;
            result.savings = saved;

            let Some(a) = candidate else {
                result.has_alternative = true;
                let merged = current
                    .vehicle_id
                    .as_ref()
                    .is_some_and(|v| planned_vehicles.contains(v));
                result.optimization_notes = if merged {
                    "riders merged into another route on the same vehicle".to_string()
                } else if current.riders == 0 {
                    "no riders recorded or planned; route can be retired".to_string()
                } else {
                    "no riders planned for this vehicle; riders absorbed by other routes"
                        .to_string()
                };
                return Some(result);
            };

            let delta = saved.total.amount;
            if reassigned_riders == 0 && delta.abs() <= EPSILON {
                result.optimization_notes =
                    "current route is already at least as efficient; no change recommended"
                        .to_string();
            } else {
                result.has_alternative = true;
                let verdict = if delta >= 0.0 { "instead of" } else { "up from" };
                result.optimization_notes = format!(
                    "{} riders ({} reassigned) at {:.2} {} {:.2}",
                    a.students_assigned.len(),
                    reassigned_riders,
                    candidate_cost.total(),
                    verdict,
                    baseline_cost.total()
                );
            }
            Some(result)
        })
        .collect();

    results.sort_by(|a, b| {
        b.savings
            .total
            .amount
            .abs()
            .total_cmp(&a.savings.total.amount.abs())
            .then_with(|| a.route_id.cmp(&b.route_id))
    });

    debug!(results = results.len(), "scored routes");
    results
}

/// Which kind of bad odometer reading, if any, voided the leg's baseline.
fn invalid_odometer<RouteId, VehicleId>(
    route: &RouteEfficiency<RouteId, VehicleId>,
    leg: Leg,
) -> Option<&'static str> {
    route.warnings.iter().find_map(|w| match w {
        IntegrityWarning::NegativeDistance { leg: l, .. } if *l == leg => Some("negative"),
        IntegrityWarning::NonFiniteDistance { leg: l } if *l == leg => Some("non-finite"),
        _ => None,
    })
}

/// Net change in operating cost on the planned leg.
///
/// Every scored route contributes its signed savings; assignments that map
/// to no scored route (proposed new routes) count as pure added cost. Routes
/// without a usable baseline drop out on both sides.
pub fn efficiency_gains<RouteId, VehicleId, StudentId>(
    baseline: &RouteEfficiencyReport<RouteId, VehicleId>,
    plan: &AssignmentPlan<VehicleId, RouteId, StudentId>,
    results: &[OptimizationResult<RouteId, VehicleId>],
) -> EfficiencyGains
where
    RouteId: Eq + Hash,
{
    let before: Vec<f64> = baseline
        .routes
        .iter()
        .filter_map(|r| r.leg(plan.leg))
        .filter(|l| l.vehicle_id.is_some())
        .map(|l| l.utilization)
        .collect();
    let after: Vec<f64> = plan
        .assignments
        .iter()
        .map(|a| a.capacity_utilization)
        .collect();

    let scored: HashSet<&RouteId> = results.iter().map(|r| &r.route_id).collect();
    let (added_cost, added_hours) = plan
        .assignments
        .iter()
        .filter(|a| a.route_id.as_ref().is_none_or(|id| !scored.contains(id)))
        .fold((RouteCost::default(), 0.0), |(cost, hours), a| {
            (
                RouteCost {
                    fuel_cost: cost.fuel_cost + a.cost.fuel_cost,
                    driver_cost: cost.driver_cost + a.cost.driver_cost,
                },
                hours + a.estimate.duration_hours,
            )
        });

    EfficiencyGains {
        total_time_saved_minutes: results.iter().map(|r| r.time_saved_minutes).sum::<f64>()
            - added_hours * 60.0,
        fuel_savings: results.iter().map(|r| r.savings.fuel.amount).sum::<f64>()
            - added_cost.fuel_cost,
        total_savings: results.iter().map(|r| r.savings.total.amount).sum::<f64>()
            - added_cost.total(),
        capacity_optimization: mean(&after) - mean(&before),
    }
}

fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        0.0
    } else {
        values.iter().sum::<f64>() / values.len() as f64
    }
}

/// Share of active inputs with complete data: students with a home
/// location, vehicles with seats and a known depot.
pub fn confidence_level<S: Student, V: Vehicle>(students: &[S], vehicles: &[V]) -> f64 {
    let active_students = students.iter().filter(|s| s.is_active());
    let active_vehicles = vehicles
        .iter()
        .filter(|v| v.status() == VehicleStatus::Active);

    let (mut complete, mut total) = (0usize, 0usize);
    for student in active_students {
        total += 1;
        if student.home_location().is_some() {
            complete += 1;
        }
    }
    for vehicle in active_vehicles {
        total += 1;
        if vehicle.capacity() > 0 && vehicle.depot_location().is_some() {
            complete += 1;
        }
    }

    if total == 0 {
        0.0
    } else {
        complete as f64 / total as f64
    }
}
