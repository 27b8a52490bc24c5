//! One planning run: validate, analyze the baseline, optimize, score.
//!
//! A run owns its phase and is consumed by [`PlanningRun::execute`], so no
//! phase can be entered twice. Starting over means building a new run from
//! fresh input snapshots.

use serde::Serialize;
use thiserror::Error;
use tracing::{debug, error, info, instrument, warn};

use crate::aggregator::{OptimizationReport, aggregate};
use crate::analyzer::analyze;
use crate::optimizer::{InvariantViolation, OptimizeError, OptimizeOptions, optimize};
use crate::params::OptimizationParameters;
use crate::travel::MatrixShapeError;
use crate::traits::{RouteRecord, Student, TravelEstimator, Vehicle};
use crate::validator::{ValidationError, validate};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum RunPhase {
    Idle,
    Validating,
    Failed,
    Analyzing,
    Optimizing,
    Scoring,
    Complete,
}

impl RunPhase {
    pub fn can_advance_to(self, next: RunPhase) -> bool {
        use RunPhase::*;
        matches!(
            (self, next),
            (Idle, Validating)
                | (Validating, Failed)
                | (Validating, Analyzing)
                | (Analyzing, Optimizing)
                | (Optimizing, Failed)
                | (Optimizing, Scoring)
                | (Scoring, Complete)
        )
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, RunPhase::Failed | RunPhase::Complete)
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum RunFailure {
    #[error("invalid optimization parameters ({} errors)", .0.len())]
    InvalidParameters(Vec<ValidationError>),
    #[error("invariant violated: {0}")]
    InvariantViolated(#[from] InvariantViolation),
    #[error(transparent)]
    TravelMatrix(#[from] MatrixShapeError),
}

impl From<OptimizeError> for RunFailure {
    fn from(err: OptimizeError) -> Self {
        match err {
            OptimizeError::TravelMatrix(e) => RunFailure::TravelMatrix(e),
            OptimizeError::Invariant(e) => RunFailure::InvariantViolated(e),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum RunOutcome<RouteId, VehicleId, StudentId> {
    Complete(Box<OptimizationReport<RouteId, VehicleId, StudentId>>),
    Failed(RunFailure),
}

impl<RouteId, VehicleId, StudentId> RunOutcome<RouteId, VehicleId, StudentId> {
    pub fn report(&self) -> Option<&OptimizationReport<RouteId, VehicleId, StudentId>> {
        match self {
            RunOutcome::Complete(report) => Some(report),
            RunOutcome::Failed(_) => None,
        }
    }

    pub fn failure(&self) -> Option<&RunFailure> {
        match self {
            RunOutcome::Complete(_) => None,
            RunOutcome::Failed(failure) => Some(failure),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CompletedRun<RouteId, VehicleId, StudentId> {
    /// Every phase entered, starting with `Idle`.
    pub phases: Vec<RunPhase>,
    pub outcome: RunOutcome<RouteId, VehicleId, StudentId>,
}

impl<RouteId, VehicleId, StudentId> CompletedRun<RouteId, VehicleId, StudentId> {
    pub fn final_phase(&self) -> RunPhase {
        self.phases.last().copied().unwrap_or(RunPhase::Idle)
    }

    pub fn visited(&self, phase: RunPhase) -> bool {
        self.phases.contains(&phase)
    }
}

pub struct PlanningRun<'a, S, V, R, E> {
    students: &'a [S],
    vehicles: &'a [V],
    routes: &'a [R],
    estimator: &'a E,
    params: OptimizationParameters,
    options: OptimizeOptions,
    phases: Vec<RunPhase>,
}

impl<'a, S, V, R, E> PlanningRun<'a, S, V, R, E>
where
    S: Student<RouteId = R::Id>,
    V: Vehicle,
    R: RouteRecord<VehicleId = V::Id>,
    E: TravelEstimator,
{
    pub fn new(
        students: &'a [S],
        vehicles: &'a [V],
        routes: &'a [R],
        estimator: &'a E,
        params: OptimizationParameters,
        options: OptimizeOptions,
    ) -> Self {
        Self {
            students,
            vehicles,
            routes,
            estimator,
            params,
            options,
            phases: vec![RunPhase::Idle],
        }
    }

    pub fn phase(&self) -> RunPhase {
        self.phases.last().copied().unwrap_or(RunPhase::Idle)
    }

    fn advance(&mut self, next: RunPhase) {
        let current = self.phase();
        debug_assert!(
            current.can_advance_to(next),
            "illegal phase transition {current:?} -> {next:?}"
        );
        debug!(from = ?current, to = ?next, "run phase");
        self.phases.push(next);
    }

    fn fail(mut self, failure: RunFailure) -> CompletedRun<R::Id, V::Id, S::Id> {
        self.advance(RunPhase::Failed);
        CompletedRun {
            phases: self.phases,
            outcome: RunOutcome::Failed(failure),
        }
    }

    #[instrument(skip_all, fields(leg = ?self.options.leg, seed = self.options.seed))]
    pub fn execute(mut self) -> CompletedRun<R::Id, V::Id, S::Id> {
        info!(
            students = self.students.len(),
            vehicles = self.vehicles.len(),
            routes = self.routes.len(),
            "planning run started"
        );

        self.advance(RunPhase::Validating);
        let errors = validate(&self.params);
        if !errors.is_empty() {
            warn!(errors = errors.len(), "parameters rejected; run failed");
            return self.fail(RunFailure::InvalidParameters(errors));
        }

        self.advance(RunPhase::Analyzing);
        let baseline = analyze(self.routes, self.vehicles, &self.params);
        info!(
            routes = baseline.routes.len(),
            under_utilized = baseline.under_utilized,
            over_capacity = baseline.over_capacity,
            integrity_warnings = baseline.integrity_warnings,
            "baseline analyzed"
        );

        self.advance(RunPhase::Optimizing);
        let plan = match optimize(
            self.students,
            self.vehicles,
            self.routes,
            self.estimator,
            &self.params,
            &self.options,
        ) {
            Ok(plan) => plan,
            Err(err) => {
                error!(%err, "optimization aborted; run failed");
                return self.fail(err.into());
            }
        };

        self.advance(RunPhase::Scoring);
        let report = aggregate(baseline, plan, self.students, self.vehicles);

        self.advance(RunPhase::Complete);
        info!(
            assignments = report.assignments.len(),
            unassigned = report.unassigned.len(),
            cancelled = report.cancelled,
            "planning run complete"
        );

        CompletedRun {
            phases: self.phases,
            outcome: RunOutcome::Complete(Box::new(report)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::haversine::HaversineEstimator;
    use crate::traits::{Leg, VehicleStatus};

    struct Pupil(u32);

    impl Student for Pupil {
        type Id = u32;
        type RouteId = u32;

        fn id(&self) -> &u32 {
            &self.0
        }

        fn home_location(&self) -> Option<(f64, f64)> {
            Some((36.101, -115.151))
        }

        fn assigned_route(&self, _leg: Leg) -> Option<&u32> {
            None
        }

        fn special_needs(&self) -> bool {
            false
        }

        fn is_active(&self) -> bool {
            true
        }
    }

    struct Van(u32);

    impl Vehicle for Van {
        type Id = u32;

        fn id(&self) -> &u32 {
            &self.0
        }

        fn capacity(&self) -> u32 {
            12
        }

        fn is_accessible(&self) -> bool {
            true
        }

        fn status(&self) -> VehicleStatus {
            VehicleStatus::Active
        }

        fn depot_location(&self) -> Option<(f64, f64)> {
            None
        }
    }

    struct Line(u32);

    impl RouteRecord for Line {
        type Id = u32;
        type VehicleId = u32;

        fn id(&self) -> &u32 {
            &self.0
        }

        fn is_active(&self) -> bool {
            true
        }

        fn vehicle_id(&self, _leg: Leg) -> Option<&u32> {
            Some(&self.0)
        }

        fn odometer(&self, _leg: Leg) -> Option<(f64, f64)> {
            Some((10.0, 14.0))
        }

        fn riders(&self, _leg: Leg) -> u32 {
            3
        }
    }

    #[test]
    fn test_transition_table() {
        use RunPhase::*;
        assert!(Idle.can_advance_to(Validating));
        assert!(Validating.can_advance_to(Failed));
        assert!(Validating.can_advance_to(Analyzing));
        assert!(Scoring.can_advance_to(Complete));
        assert!(!Idle.can_advance_to(Optimizing));
        assert!(!Analyzing.can_advance_to(Failed));
        assert!(!Complete.can_advance_to(Idle));
        assert!(!Failed.can_advance_to(Validating));
        assert!(Failed.is_terminal() && Complete.is_terminal());
    }

    #[test]
    fn test_successful_run_visits_every_phase() {
        let pupils = vec![Pupil(1), Pupil(2), Pupil(3)];
        let vans = vec![Van(1)];
        let lines = vec![Line(1)];
        let estimator = HaversineEstimator::default();
        let run = PlanningRun::new(
            &pupils,
            &vans,
            &lines,
            &estimator,
            OptimizationParameters::default(),
            OptimizeOptions::default(),
        );
        assert_eq!(run.phase(), RunPhase::Idle);

        let done = run.execute();
        assert_eq!(
            done.phases,
            vec![
                RunPhase::Idle,
                RunPhase::Validating,
                RunPhase::Analyzing,
                RunPhase::Optimizing,
                RunPhase::Scoring,
                RunPhase::Complete,
            ]
        );
        let report = done.outcome.report().unwrap();
        assert_eq!(report.assignments[0].students_assigned.len(), 3);
        assert_eq!(report.assignments[0].route_id, Some(1));
        assert_eq!(report.proposed_new_routes, 0);
    }

    #[test]
    fn test_invalid_parameters_fail_before_optimizing() {
        let params = OptimizationParameters {
            min_students_per_route: 70,
            max_students_per_bus: 60,
            ..Default::default()
        };
        let done = PlanningRun::new(
            &[Pupil(1)],
            &[Van(1)],
            &[] as &[Line],
            &HaversineEstimator::default(),
            params,
            OptimizeOptions::default(),
        )
        .execute();

        assert_eq!(done.final_phase(), RunPhase::Failed);
        assert!(!done.visited(RunPhase::Analyzing));
        assert!(!done.visited(RunPhase::Optimizing));
        match done.outcome.failure() {
            Some(RunFailure::InvalidParameters(errors)) => assert_eq!(errors.len(), 1),
            other => panic!("unexpected outcome: {other:?}"),
        }
    }
}
