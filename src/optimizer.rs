//! Student-to-vehicle assignment optimizer.
//!
//! Greedy construction over clusters followed by bounded local improvement.
//! Every hard constraint (seat limit, ride time, route distance and, when
//! enabled, accessibility) is checked before a placement or move is
//! accepted, and audited again before the plan is returned.

use std::cmp::Reverse;
use std::collections::{HashMap, HashSet};

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, error, info, instrument, warn};

use crate::cancel::CancelToken;
use crate::cluster::{ClusterInput, Pool, build_clusters};
use crate::cost::{CostModel, RouteCost};
use crate::params::OptimizationParameters;
use crate::travel::{LegEstimate, MatrixShapeError, TravelMatrix, TravelModel, estimate_leg};
use crate::traits::{
    Leg, RouteRecord, Student, TravelEstimator, UnassignedReason, Vehicle, VehicleStatus,
};

/// Slack for floating point comparisons against bounds and costs.
const EPSILON: f64 = 1e-9;

#[derive(Debug, Clone)]
pub struct OptimizeOptions {
    /// The leg being planned.
    pub leg: Leg,
    /// Breaks ties between otherwise identical vehicles.
    pub seed: u64,
    /// School location where AM legs end (and PM legs begin).
    pub destination: Option<(f64, f64)>,
    pub cancel: CancelToken,
}

impl Default for OptimizeOptions {
    fn default() -> Self {
        Self {
            leg: Leg::Am,
            seed: 0,
            destination: None,
            cancel: CancelToken::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Assignment<VehicleId, RouteId, StudentId> {
    pub vehicle_id: VehicleId,
    /// Existing route this vehicle runs on the planned leg; `None` proposes
    /// a new route.
    pub route_id: Option<RouteId>,
    /// Students in pickup order.
    pub students_assigned: Vec<StudentId>,
    /// Assigned riders over effective capacity.
    pub capacity_utilization: f64,
    pub estimate: LegEstimate,
    pub cost: RouteCost,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UnassignedStudent<StudentId> {
    pub student_id: StudentId,
    pub reason: UnassignedReason,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AssignmentPlan<VehicleId, RouteId, StudentId> {
    pub leg: Leg,
    pub seed: u64,
    /// Non-empty vehicle assignments, ordered by vehicle id.
    pub assignments: Vec<Assignment<VehicleId, RouteId, StudentId>>,
    /// Students requiring transport that could not be placed, ordered by id.
    pub unassigned: Vec<UnassignedStudent<StudentId>>,
    /// True if the cancel token tripped before the run finished.
    pub cancelled: bool,
    pub improvement_passes: u32,
    pub total_cost: RouteCost,
}

impl<VehicleId, RouteId, StudentId: Clone> AssignmentPlan<VehicleId, RouteId, StudentId> {
    pub fn unassigned_ids(&self) -> Vec<StudentId> {
        self.unassigned.iter().map(|u| u.student_id.clone()).collect()
    }

    pub fn assigned_count(&self) -> usize {
        self.assignments.iter().map(|a| a.students_assigned.len()).sum()
    }
}

/// A logic defect detected in a finished plan.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum InvariantViolation {
    #[error("vehicle {vehicle} carries {assigned} students, limit is {limit}")]
    CapacityExceeded {
        vehicle: String,
        assigned: usize,
        limit: u32,
    },
    #[error("special-needs student {student} placed on non-accessible vehicle {vehicle}")]
    AccessibilityViolated { student: String, vehicle: String },
    #[error("vehicle {vehicle} ride time {minutes:.1} min exceeds {limit} min")]
    RideTimeExceeded {
        vehicle: String,
        minutes: f64,
        limit: f64,
    },
    #[error("vehicle {vehicle} route distance {miles:.1} mi exceeds {limit} mi")]
    DistanceExceeded {
        vehicle: String,
        miles: f64,
        limit: f64,
    },
    #[error("student {student} placed more than once")]
    DuplicatePlacement { student: String },
    #[error("{assigned} assigned + {unassigned} unassigned != {expected} students requiring transport")]
    ConservationBroken {
        assigned: usize,
        unassigned: usize,
        expected: usize,
    },
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum OptimizeError {
    #[error(transparent)]
    TravelMatrix(#[from] MatrixShapeError),
    #[error(transparent)]
    Invariant(#[from] InvariantViolation),
}

/// A student requiring transport with a known home.
struct Rider<'a, S> {
    student: &'a S,
    location: (f64, f64),
    tier: u32,
    /// Must ride an accessible vehicle.
    restricted: bool,
}

/// An eligible vehicle.
struct Slot<'a, V, RouteId> {
    vehicle: &'a V,
    depot: Option<usize>,
    limit: u32,
    accessible: bool,
    tie_key: u64,
    route_id: Option<RouteId>,
}

impl<V, RouteId> Slot<'_, V, RouteId> {
    fn serves(&self, pool: Pool) -> bool {
        match pool {
            Pool::Accessible => self.accessible,
            Pool::Any => true,
        }
    }
}

#[derive(Debug, Clone, Default)]
struct RouteState {
    /// Rider indices (also matrix indices) in pickup order.
    stops: Vec<usize>,
    tier: Option<u32>,
    estimate: LegEstimate,
    cost: RouteCost,
}

impl RouteState {
    fn remaining(&self, limit: u32) -> u32 {
        limit.saturating_sub(self.stops.len() as u32)
    }

    fn accepts_tier(&self, tier: u32) -> bool {
        self.tier.is_none_or(|t| t == tier)
    }
}

/// Measures candidate stop sequences against the hard bounds.
struct Evaluator<'m> {
    matrix: &'m TravelMatrix,
    travel: TravelModel,
    costs: CostModel,
    destination: Option<usize>,
    max_ride_minutes: f64,
    max_route_distance: f64,
}

impl Evaluator<'_> {
    fn measure(
        &self,
        depot: Option<usize>,
        mpg: Option<f64>,
        stops: &[usize],
    ) -> (LegEstimate, RouteCost) {
        let estimate = estimate_leg(self.matrix, &self.travel, stops, depot, self.destination);
        let cost = self
            .costs
            .cost(estimate.total_miles(), estimate.duration_hours, mpg);
        (estimate, cost)
    }

    fn within_bounds(&self, estimate: &LegEstimate) -> bool {
        estimate.ride_minutes <= self.max_ride_minutes + EPSILON
            && estimate.total_miles() <= self.max_route_distance + EPSILON
    }
}

#[instrument(
    skip_all,
    fields(
        students = students.len(),
        vehicles = vehicles.len(),
        leg = ?options.leg,
        seed = options.seed
    )
)]
pub fn optimize<S, V, R, E>(
    students: &[S],
    vehicles: &[V],
    routes: &[R],
    estimator: &E,
    params: &OptimizationParameters,
    options: &OptimizeOptions,
) -> Result<AssignmentPlan<V::Id, R::Id, S::Id>, OptimizeError>
where
    S: Student<RouteId = R::Id>,
    V: Vehicle,
    R: RouteRecord<VehicleId = V::Id>,
    E: TravelEstimator,
{
    let leg = options.leg;
    let enforce_access = params.consider_special_needs;

    let mut unassigned: Vec<(&S, UnassignedReason)> = Vec::new();
    let mut riders: Vec<Rider<'_, S>> = Vec::new();
    let mut requiring_transport = 0;

    for student in students.iter().filter(|s| s.is_active()) {
        requiring_transport += 1;
        match student.home_location() {
            Some(location) => riders.push(Rider {
                student,
                location,
                tier: student.bell_tier(),
                restricted: enforce_access && student.special_needs(),
            }),
            None => unassigned.push((student, UnassignedReason::MissingLocation)),
        }
    }

    let route_by_vehicle = existing_routes(routes, leg);

    // Matrix layout: riders, then depots, then the destination.
    let mut locations: Vec<(f64, f64)> = riders.iter().map(|r| r.location).collect();
    let mut rng = StdRng::seed_from_u64(options.seed);
    let mut slots: Vec<Slot<'_, V, R::Id>> = Vec::new();
    for vehicle in vehicles {
        let limit = params.effective_capacity(vehicle.capacity());
        if vehicle.status() != VehicleStatus::Active || limit == 0 {
            continue;
        }
        let depot = vehicle.depot_location().map(|location| {
            locations.push(location);
            locations.len() - 1
        });
        slots.push(Slot {
            vehicle,
            depot,
            limit,
            accessible: vehicle.is_accessible(),
            tie_key: rng.random::<u64>(),
            route_id: route_by_vehicle.get(vehicle.id()).map(|id| (*id).clone()),
        });
    }
    let destination = options.destination.map(|location| {
        locations.push(location);
        locations.len() - 1
    });

    let matrix = TravelMatrix::build(estimator, &locations)?;
    let evaluator = Evaluator {
        matrix: &matrix,
        travel: TravelModel::from_params(params),
        costs: CostModel::from_params(params),
        destination,
        max_ride_minutes: params.max_ride_time_minutes,
        max_route_distance: params.max_route_distance,
    };

    let cluster_inputs: Vec<ClusterInput> = riders
        .iter()
        .enumerate()
        .map(|(point, rider)| ClusterInput {
            point,
            location: rider.location,
            tier: rider.tier,
            pool: if rider.restricted { Pool::Accessible } else { Pool::Any },
        })
        .collect();
    let clusters = build_clusters(&cluster_inputs, &matrix, destination, params.cluster_cell_miles);

    let mut states: Vec<RouteState> = vec![RouteState::default(); slots.len()];
    let mut cancelled = false;

    for (cluster_index, cluster) in clusters.iter().enumerate() {
        if options.cancel.is_cancelled() {
            warn!(
                processed = cluster_index,
                clusters = clusters.len(),
                "optimization cancelled during construction"
            );
            cancelled = true;
            for pending in &clusters[cluster_index..] {
                for &member in &pending.members {
                    unassigned.push((riders[member].student, UnassignedReason::Cancelled));
                }
            }
            break;
        }

        let pool = cluster.key.pool;
        let tier = cluster.key.tier;
        let candidates = rank_slots(&slots, &states, pool, tier);
        debug!(
            cluster = ?cluster.key,
            size = cluster.len(),
            centroid = ?cluster.centroid,
            candidates = candidates.len(),
            "placing cluster"
        );

        for &member in &cluster.members {
            let mut placed = false;
            for &slot_index in &candidates {
                let slot = &slots[slot_index];
                let state = &states[slot_index];
                if state.remaining(slot.limit) == 0 || !state.accepts_tier(tier) {
                    continue;
                }
                if let Some((position, estimate, cost)) =
                    cheapest_insertion(&evaluator, slot, state, member)
                {
                    let state = &mut states[slot_index];
                    state.stops.insert(position, member);
                    state.tier = Some(tier);
                    state.estimate = estimate;
                    state.cost = cost;
                    placed = true;
                    break;
                }
            }

            if !placed {
                let reason = failure_reason(&slots, &states, pool, tier);
                unassigned.push((riders[member].student, reason));
            }
        }
    }

    let mut passes = 0;
    if !cancelled {
        let outcome = improve(
            &mut states,
            &slots,
            &riders,
            &evaluator,
            params.max_improvement_passes,
            &options.cancel,
        );
        passes = outcome.0;
        cancelled = outcome.1;
    }

    audit(&states, &slots, &riders, &evaluator, &unassigned, requiring_transport)?;

    let mut assignments: Vec<Assignment<V::Id, R::Id, S::Id>> = slots
        .iter()
        .zip(states.iter())
        .filter(|(_, state)| !state.stops.is_empty())
        .map(|(slot, state)| Assignment {
            vehicle_id: slot.vehicle.id().clone(),
            route_id: slot.route_id.clone(),
            students_assigned: state
                .stops
                .iter()
                .map(|&r| riders[r].student.id().clone())
                .collect(),
            capacity_utilization: state.stops.len() as f64 / slot.limit as f64,
            estimate: state.estimate,
            cost: state.cost,
        })
        .collect();
    assignments.sort_by(|a, b| a.vehicle_id.cmp(&b.vehicle_id));

    let mut unassigned: Vec<UnassignedStudent<S::Id>> = unassigned
        .into_iter()
        .map(|(student, reason)| UnassignedStudent {
            student_id: student.id().clone(),
            reason,
        })
        .collect();
    unassigned.sort_by(|a, b| a.student_id.cmp(&b.student_id));

    let total_cost = assignments.iter().fold(RouteCost::default(), |acc, a| RouteCost {
        fuel_cost: acc.fuel_cost + a.cost.fuel_cost,
        driver_cost: acc.driver_cost + a.cost.driver_cost,
    });

    info!(
        assigned = assignments.iter().map(|a| a.students_assigned.len()).sum::<usize>(),
        unassigned = unassigned.len(),
        vehicles_used = assignments.len(),
        passes,
        cancelled,
        total_cost = total_cost.total(),
        "optimization finished"
    );

    Ok(AssignmentPlan {
        leg,
        seed: options.seed,
        assignments,
        unassigned,
        cancelled,
        improvement_passes: passes,
        total_cost,
    })
}

/// First active route per vehicle on the given leg.
fn existing_routes<R: RouteRecord>(routes: &[R], leg: Leg) -> HashMap<&R::VehicleId, &R::Id> {
    let mut by_vehicle = HashMap::new();
    for route in routes.iter().filter(|r| r.is_active()) {
        if let Some(vehicle_id) = route.vehicle_id(leg) {
            by_vehicle.entry(vehicle_id).or_insert(route.id());
        }
    }
    by_vehicle
}

/// Vehicles able to take a cluster, best first: most remaining seats, then
/// least distance so far, then lowest vehicle id, then the seeded key.
fn rank_slots<V: Vehicle, RouteId>(
    slots: &[Slot<'_, V, RouteId>],
    states: &[RouteState],
    pool: Pool,
    tier: u32,
) -> Vec<usize> {
    let mut ranked: Vec<usize> = (0..slots.len())
        .filter(|&i| {
            slots[i].serves(pool)
                && states[i].accepts_tier(tier)
                && states[i].remaining(slots[i].limit) > 0
        })
        .collect();

    ranked.sort_by(|&a, &b| {
        Reverse(states[a].remaining(slots[a].limit))
            .cmp(&Reverse(states[b].remaining(slots[b].limit)))
            .then_with(|| {
                states[a]
                    .estimate
                    .total_miles()
                    .total_cmp(&states[b].estimate.total_miles())
            })
            .then_with(|| slots[a].vehicle.id().cmp(slots[b].vehicle.id()))
            .then_with(|| slots[a].tie_key.cmp(&slots[b].tie_key))
    });
    ranked
}

/// Cheapest feasible position for `rider` in the route, by added distance.
/// Ties keep the earliest position.
fn cheapest_insertion<V: Vehicle, RouteId>(
    evaluator: &Evaluator<'_>,
    slot: &Slot<'_, V, RouteId>,
    state: &RouteState,
    rider: usize,
) -> Option<(usize, LegEstimate, RouteCost)> {
    let mut best: Option<(usize, LegEstimate, RouteCost)> = None;
    for position in 0..=state.stops.len() {
        let mut candidate = state.stops.clone();
        candidate.insert(position, rider);
        let (estimate, cost) = evaluator.measure(slot.depot, slot.vehicle.mpg(), &candidate);
        if !evaluator.within_bounds(&estimate) {
            continue;
        }
        let better = match &best {
            Some((_, current, _)) => estimate.total_miles() < current.total_miles() - EPSILON,
            None => true,
        };
        if better {
            best = Some((position, estimate, cost));
        }
    }
    best
}

fn failure_reason<V, RouteId>(
    slots: &[Slot<'_, V, RouteId>],
    states: &[RouteState],
    pool: Pool,
    tier: u32,
) -> UnassignedReason {
    if !slots.iter().any(|slot| slot.serves(pool)) {
        return UnassignedReason::NoEligibleVehicle;
    }
    let seats_left = slots.iter().zip(states).any(|(slot, state)| {
        slot.serves(pool) && state.accepts_tier(tier) && state.remaining(slot.limit) > 0
    });
    if seats_left {
        UnassignedReason::ConstraintsExceeded
    } else {
        UnassignedReason::CapacityExhausted
    }
}

// ============================================================================
// Local Improvement
// ============================================================================

/// Runs improvement passes until a pass finds nothing, the budget runs out,
/// or the run is cancelled. Returns (passes run, cancelled).
fn improve<S, V: Vehicle, RouteId>(
    states: &mut [RouteState],
    slots: &[Slot<'_, V, RouteId>],
    riders: &[Rider<'_, S>],
    evaluator: &Evaluator<'_>,
    max_passes: u32,
    cancel: &CancelToken,
) -> (u32, bool) {
    let mut passes = 0;
    while passes < max_passes {
        if cancel.is_cancelled() {
            warn!(passes, "optimization cancelled during local improvement");
            return (passes, true);
        }
        passes += 1;

        let swaps = swap_pass(states, slots, riders, evaluator);
        let mut reversals = 0;
        for (state, slot) in states.iter_mut().zip(slots) {
            if two_opt_improve(state, slot, evaluator) {
                reversals += 1;
            }
        }
        debug!(pass = passes, swaps, reversals, "improvement pass");

        if swaps == 0 && reversals == 0 {
            break;
        }
    }
    (passes, false)
}

/// Pairwise swaps of riders between two routes, each rider taking the
/// other's position. Accepted only on a strict cost decrease with every
/// bound respected. Returns the number of swaps applied.
fn swap_pass<S, V: Vehicle, RouteId>(
    states: &mut [RouteState],
    slots: &[Slot<'_, V, RouteId>],
    riders: &[Rider<'_, S>],
    evaluator: &Evaluator<'_>,
) -> usize {
    let mut applied = 0;
    for a in 0..states.len() {
        for b in a + 1..states.len() {
            let mut i = 0;
            while i < states[a].stops.len() {
                let mut j = 0;
                while j < states[b].stops.len() {
                    let ra = states[a].stops[i];
                    let rb = states[b].stops[j];
                    if swap_allowed(&riders[ra], &riders[rb], &slots[a], &slots[b]) {
                        let mut stops_a = states[a].stops.clone();
                        let mut stops_b = states[b].stops.clone();
                        stops_a[i] = rb;
                        stops_b[j] = ra;

                        let (est_a, cost_a) =
                            evaluator.measure(slots[a].depot, slots[a].vehicle.mpg(), &stops_a);
                        let (est_b, cost_b) =
                            evaluator.measure(slots[b].depot, slots[b].vehicle.mpg(), &stops_b);
                        let before = states[a].cost.total() + states[b].cost.total();
                        let after = cost_a.total() + cost_b.total();

                        if after < before - EPSILON
                            && evaluator.within_bounds(&est_a)
                            && evaluator.within_bounds(&est_b)
                        {
                            states[a].stops = stops_a;
                            states[a].estimate = est_a;
                            states[a].cost = cost_a;
                            states[b].stops = stops_b;
                            states[b].estimate = est_b;
                            states[b].cost = cost_b;
                            applied += 1;
                        }
                    }
                    j += 1;
                }
                i += 1;
            }
        }
    }
    applied
}

fn swap_allowed<S, V, RouteId>(
    ra: &Rider<'_, S>,
    rb: &Rider<'_, S>,
    slot_a: &Slot<'_, V, RouteId>,
    slot_b: &Slot<'_, V, RouteId>,
) -> bool {
    if ra.tier != rb.tier {
        return false;
    }
    if ra.restricted && !slot_b.accessible {
        return false;
    }
    if rb.restricted && !slot_a.accessible {
        return false;
    }
    true
}

/// 2-opt: reverse a segment of the pickup order to reduce cost.
/// Returns true if an improvement was made.
fn two_opt_improve<V: Vehicle, RouteId>(
    state: &mut RouteState,
    slot: &Slot<'_, V, RouteId>,
    evaluator: &Evaluator<'_>,
) -> bool {
    let n = state.stops.len();
    if n < 2 {
        return false;
    }

    for i in 0..n - 1 {
        for j in i + 1..n {
            let mut candidate = state.stops.clone();
            candidate[i..=j].reverse();

            let (estimate, cost) = evaluator.measure(slot.depot, slot.vehicle.mpg(), &candidate);
            if cost.total() < state.cost.total() - EPSILON && evaluator.within_bounds(&estimate) {
                state.stops = candidate;
                state.estimate = estimate;
                state.cost = cost;
                return true;
            }
        }
    }

    false
}

// ============================================================================
// Audit
// ============================================================================

fn audit<S: Student, V: Vehicle, RouteId>(
    states: &[RouteState],
    slots: &[Slot<'_, V, RouteId>],
    riders: &[Rider<'_, S>],
    evaluator: &Evaluator<'_>,
    unassigned: &[(&S, UnassignedReason)],
    requiring_transport: usize,
) -> Result<(), InvariantViolation> {
    let mut seen = HashSet::new();
    let mut assigned = 0;

    for (state, slot) in states.iter().zip(slots) {
        let vehicle = format!("{:?}", slot.vehicle.id());
        let limit = slot.limit.min(slot.vehicle.capacity());
        if state.stops.len() > limit as usize {
            return Err(report(InvariantViolation::CapacityExceeded {
                vehicle,
                assigned: state.stops.len(),
                limit,
            }));
        }
        if !state.stops.is_empty() {
            // Re-measured from the stops, not the cached estimate.
            let (estimate, _) = evaluator.measure(slot.depot, slot.vehicle.mpg(), &state.stops);
            if estimate.ride_minutes > evaluator.max_ride_minutes + EPSILON {
                return Err(report(InvariantViolation::RideTimeExceeded {
                    vehicle,
                    minutes: estimate.ride_minutes,
                    limit: evaluator.max_ride_minutes,
                }));
            }
            if estimate.total_miles() > evaluator.max_route_distance + EPSILON {
                return Err(report(InvariantViolation::DistanceExceeded {
                    vehicle,
                    miles: estimate.total_miles(),
                    limit: evaluator.max_route_distance,
                }));
            }
        }
        for &r in &state.stops {
            let rider = &riders[r];
            if rider.restricted && !slot.accessible {
                return Err(report(InvariantViolation::AccessibilityViolated {
                    student: format!("{:?}", rider.student.id()),
                    vehicle,
                }));
            }
            if !seen.insert(r) {
                return Err(report(InvariantViolation::DuplicatePlacement {
                    student: format!("{:?}", rider.student.id()),
                }));
            }
            assigned += 1;
        }
    }

    if assigned + unassigned.len() != requiring_transport {
        return Err(report(InvariantViolation::ConservationBroken {
            assigned,
            unassigned: unassigned.len(),
            expected: requiring_transport,
        }));
    }

    Ok(())
}

fn report(violation: InvariantViolation) -> InvariantViolation {
    error!(%violation, "assignment invariant violated");
    violation
}
