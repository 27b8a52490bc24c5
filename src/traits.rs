//! Core domain traits for the route planner.
//!
//! The engine never owns student, vehicle or route records. The host
//! application implements these traits on its own models and hands the
//! engine read-only snapshots.

use std::fmt::Debug;
use std::hash::Hash;

use serde::{Deserialize, Serialize};

/// Unique identifier for planner entities.
///
/// `Ord` is required so that every ordering the engine produces is
/// reproducible regardless of hash seeds.
pub trait Id: Clone + Eq + Ord + Hash + Debug + Send + Sync {}

impl<T> Id for T where T: Clone + Eq + Ord + Hash + Debug + Send + Sync {}

/// Which half of the school day a route leg serves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Leg {
    Am,
    Pm,
}

impl Leg {
    pub const BOTH: [Leg; 2] = [Leg::Am, Leg::Pm];
}

/// A student who may require transport.
pub trait Student: Sync {
    type Id: Id;
    type RouteId: Id;

    fn id(&self) -> &Self::Id;

    /// Home location (lat, lng), or a geocoded proxy. `None` when the
    /// address could not be located.
    fn home_location(&self) -> Option<(f64, f64)>;

    /// Route the student currently rides on the given leg.
    fn assigned_route(&self, leg: Leg) -> Option<&Self::RouteId>;

    /// Requires an accessibility-equipped vehicle.
    fn special_needs(&self) -> bool;

    fn is_active(&self) -> bool;

    /// Bell-time tier of the student's school. A vehicle serves a single
    /// tier per leg.
    fn bell_tier(&self) -> u32 {
        0
    }
}

/// Operational status of a vehicle. Only `Active` vehicles are routed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum VehicleStatus {
    Active,
    Maintenance,
    Retired,
}

/// A bus that can carry students.
pub trait Vehicle: Sync {
    type Id: Id;

    fn id(&self) -> &Self::Id;

    /// Physical seating capacity.
    fn capacity(&self) -> u32;

    fn is_accessible(&self) -> bool;

    fn status(&self) -> VehicleStatus;

    /// Depot (lat, lng) where the leg starts. If None, deadhead distance is
    /// not counted.
    fn depot_location(&self) -> Option<(f64, f64)>;

    /// Fuel economy in miles per gallon. Falls back to the fleet default.
    fn mpg(&self) -> Option<f64> {
        None
    }
}

/// An existing route as recorded by the operator.
pub trait RouteRecord: Sync {
    type Id: Id;
    type VehicleId: Id;

    fn id(&self) -> &Self::Id;

    fn is_active(&self) -> bool;

    /// Vehicle assigned to the given leg.
    fn vehicle_id(&self, leg: Leg) -> Option<&Self::VehicleId>;

    /// Begin/end odometer readings for the leg, in miles.
    fn odometer(&self, leg: Leg) -> Option<(f64, f64)>;

    /// Recorded rider count for the leg.
    fn riders(&self, leg: Leg) -> u32;
}

/// Provides a distance matrix (miles) for a set of locations.
///
/// The matrix is indexed by the provided location order.
pub trait TravelEstimator: Sync {
    fn matrix_for(&self, locations: &[(f64, f64)]) -> Vec<Vec<f64>>;
}

/// Why a student could not be placed on any vehicle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum UnassignedReason {
    /// No home location, so ride time cannot be checked.
    MissingLocation,
    /// No active vehicle satisfies accessibility (or none is active at all).
    NoEligibleVehicle,
    /// Every eligible vehicle is full.
    CapacityExhausted,
    /// Seats remain, but placing the student would break ride-time or
    /// route-distance bounds.
    ConstraintsExceeded,
    /// The run was cancelled before the student was considered.
    Cancelled,
}
