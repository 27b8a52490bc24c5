//! Test fixtures for school-route-planner.
//!
//! Provides:
//! - Builders for students, buses, and routes
//! - A deterministic synthetic district around a Henderson, NV campus

#![allow(dead_code)]

pub mod district;

pub use district::*;

use school_route_planner::traits::{Leg, RouteRecord, Student, Vehicle, VehicleStatus};

#[derive(Clone, Debug, Hash, Eq, PartialEq, Ord, PartialOrd, serde::Serialize)]
pub struct TestId(pub String);

impl TestId {
    pub fn new(s: &str) -> Self {
        Self(s.to_string())
    }
}

// ============================================================================
// Students
// ============================================================================

/// Builder for test students with sensible defaults.
#[derive(Clone, Debug)]
pub struct TestStudent {
    pub id: TestId,
    pub home: Option<(f64, f64)>,
    pub am_route: Option<TestId>,
    pub pm_route: Option<TestId>,
    pub special_needs: bool,
    pub active: bool,
    pub tier: u32,
}

impl TestStudent {
    pub fn new(id: &str) -> Self {
        Self {
            id: TestId::new(id),
            home: Some(CAMPUS),
            am_route: None,
            pm_route: None,
            special_needs: false,
            active: true,
            tier: 0,
        }
    }

    pub fn home(mut self, lat: f64, lng: f64) -> Self {
        self.home = Some((lat, lng));
        self
    }

    pub fn without_home(mut self) -> Self {
        self.home = None;
        self
    }

    /// Rides `route` on both legs today.
    pub fn riding(mut self, route: &str) -> Self {
        self.am_route = Some(TestId::new(route));
        self.pm_route = Some(TestId::new(route));
        self
    }

    pub fn special_needs(mut self) -> Self {
        self.special_needs = true;
        self
    }

    pub fn inactive(mut self) -> Self {
        self.active = false;
        self
    }

    pub fn tier(mut self, tier: u32) -> Self {
        self.tier = tier;
        self
    }
}

impl Student for TestStudent {
    type Id = TestId;
    type RouteId = TestId;

    fn id(&self) -> &TestId {
        &self.id
    }

    fn home_location(&self) -> Option<(f64, f64)> {
        self.home
    }

    fn assigned_route(&self, leg: Leg) -> Option<&TestId> {
        match leg {
            Leg::Am => self.am_route.as_ref(),
            Leg::Pm => self.pm_route.as_ref(),
        }
    }

    fn special_needs(&self) -> bool {
        self.special_needs
    }

    fn is_active(&self) -> bool {
        self.active
    }

    fn bell_tier(&self) -> u32 {
        self.tier
    }
}

// ============================================================================
// Buses
// ============================================================================

#[derive(Clone, Debug)]
pub struct TestBus {
    pub id: TestId,
    pub capacity: u32,
    pub accessible: bool,
    pub status: VehicleStatus,
    pub depot: Option<(f64, f64)>,
    pub mpg: Option<f64>,
}

impl TestBus {
    pub fn new(id: &str, capacity: u32) -> Self {
        Self {
            id: TestId::new(id),
            capacity,
            accessible: false,
            status: VehicleStatus::Active,
            depot: Some(DEPOT),
            mpg: None,
        }
    }

    pub fn accessible(mut self) -> Self {
        self.accessible = true;
        self
    }

    pub fn status(mut self, status: VehicleStatus) -> Self {
        self.status = status;
        self
    }

    pub fn depot(mut self, lat: f64, lng: f64) -> Self {
        self.depot = Some((lat, lng));
        self
    }

    pub fn without_depot(mut self) -> Self {
        self.depot = None;
        self
    }

    pub fn mpg(mut self, mpg: f64) -> Self {
        self.mpg = Some(mpg);
        self
    }
}

impl Vehicle for TestBus {
    type Id = TestId;

    fn id(&self) -> &TestId {
        &self.id
    }

    fn capacity(&self) -> u32 {
        self.capacity
    }

    fn is_accessible(&self) -> bool {
        self.accessible
    }

    fn status(&self) -> VehicleStatus {
        self.status
    }

    fn depot_location(&self) -> Option<(f64, f64)> {
        self.depot
    }

    fn mpg(&self) -> Option<f64> {
        self.mpg
    }
}

// ============================================================================
// Routes
// ============================================================================

#[derive(Clone, Debug, Default)]
pub struct LegRecord {
    pub vehicle: Option<TestId>,
    pub odometer: Option<(f64, f64)>,
    pub riders: u32,
}

#[derive(Clone, Debug)]
pub struct TestRoute {
    pub id: TestId,
    pub active: bool,
    pub am: LegRecord,
    pub pm: LegRecord,
}

impl TestRoute {
    pub fn new(id: &str) -> Self {
        Self {
            id: TestId::new(id),
            active: true,
            am: LegRecord::default(),
            pm: LegRecord::default(),
        }
    }

    /// Same vehicle on both legs.
    pub fn vehicle(mut self, bus: &str) -> Self {
        self.am.vehicle = Some(TestId::new(bus));
        self.pm.vehicle = Some(TestId::new(bus));
        self
    }

    pub fn odometer(mut self, leg: Leg, begin: f64, end: f64) -> Self {
        self.leg_mut(leg).odometer = Some((begin, end));
        self
    }

    pub fn riders(mut self, leg: Leg, riders: u32) -> Self {
        self.leg_mut(leg).riders = riders;
        self
    }

    pub fn inactive(mut self) -> Self {
        self.active = false;
        self
    }

    fn leg_mut(&mut self, leg: Leg) -> &mut LegRecord {
        match leg {
            Leg::Am => &mut self.am,
            Leg::Pm => &mut self.pm,
        }
    }

    fn leg(&self, leg: Leg) -> &LegRecord {
        match leg {
            Leg::Am => &self.am,
            Leg::Pm => &self.pm,
        }
    }
}

impl RouteRecord for TestRoute {
    type Id = TestId;
    type VehicleId = TestId;

    fn id(&self) -> &TestId {
        &self.id
    }

    fn is_active(&self) -> bool {
        self.active
    }

    fn vehicle_id(&self, leg: Leg) -> Option<&TestId> {
        self.leg(leg).vehicle.as_ref()
    }

    fn odometer(&self, leg: Leg) -> Option<(f64, f64)> {
        self.leg(leg).odometer
    }

    fn riders(&self, leg: Leg) -> u32 {
        self.leg(leg).riders
    }
}
