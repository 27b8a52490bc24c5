//! Deterministic synthetic school district.
//!
//! Homes sit on a tight grid of shared bus stops around a campus in
//! Henderson, NV, so full 60-seat buses stay well inside the default
//! ride-time and distance limits.

use school_route_planner::traits::Leg;

use super::{TestBus, TestRoute, TestStudent};

/// Campus (drop-off for the AM leg).
pub const CAMPUS: (f64, f64) = (36.0397, -115.0629);

/// Bus yard about a mile south-east of the campus.
pub const DEPOT: (f64, f64) = (36.0312, -115.0511);

/// Grid spacing between stops, roughly 0.2 miles.
pub const STOP_SPACING_DEG: f64 = 0.003;

pub const RIDERS_PER_STOP: usize = 5;

/// Odometer distance recorded for every existing AM route.
pub const BASELINE_ROUTE_MILES: f64 = 14.0;

#[derive(Clone, Debug)]
pub struct District {
    pub students: Vec<TestStudent>,
    pub buses: Vec<TestBus>,
    pub routes: Vec<TestRoute>,
}

/// Location of stop `index` on a `side` x `side` grid centered on the campus.
pub fn stop_location(index: usize, side: usize) -> (f64, f64) {
    let row = (index / side) as f64;
    let col = (index % side) as f64;
    let half = (side as f64 - 1.0) / 2.0;
    (
        CAMPUS.0 + (row - half) * STOP_SPACING_DEG,
        CAMPUS.1 + (col - half) * STOP_SPACING_DEG,
    )
}

pub fn student_id(index: usize) -> String {
    format!("s{index:04}")
}

pub fn bus_id(index: usize) -> String {
    format!("bus-{:02}", index + 1)
}

pub fn route_id(index: usize) -> String {
    format!("route-{:02}", index + 1)
}

/// Builds a district of `students` riders (the first `special_needs` of them
/// flagged) and `buses` 60-seat buses (the first `accessible` of them
/// equipped), each bus running one existing route.
pub fn district(
    students: usize,
    special_needs: usize,
    buses: usize,
    accessible: usize,
) -> District {
    let stops = students.div_ceil(RIDERS_PER_STOP).max(1);
    let side = (stops as f64).sqrt().ceil() as usize;

    let students_out: Vec<TestStudent> = (0..students)
        .map(|i| {
            let (lat, lng) = stop_location(i / RIDERS_PER_STOP, side);
            let mut student = TestStudent::new(&student_id(i)).home(lat, lng);
            if buses > 0 {
                student = student.riding(&route_id(i % buses));
            }
            if i < special_needs {
                student = student.special_needs();
            }
            student
        })
        .collect();

    let buses_out: Vec<TestBus> = (0..buses)
        .map(|i| {
            let bus = TestBus::new(&bus_id(i), 60);
            if i < accessible { bus.accessible() } else { bus }
        })
        .collect();

    let riders_per_route = if buses == 0 { 0 } else { (students / buses) as u32 };
    let routes: Vec<TestRoute> = (0..buses)
        .map(|i| {
            TestRoute::new(&route_id(i))
                .vehicle(&bus_id(i))
                .odometer(Leg::Am, 1000.0, 1000.0 + BASELINE_ROUTE_MILES)
                .riders(Leg::Am, riders_per_route)
        })
        .collect();

    District {
        students: students_out,
        buses: buses_out,
        routes,
    }
}
