//! school-route-planner core
//!
//! Student-to-bus assignment engine: baseline route analysis, constrained
//! greedy packing with bounded local improvement, and cost scoring.

pub mod traits;
pub mod params;
pub mod validator;
pub mod haversine;
pub mod travel;
pub mod cost;
pub mod analyzer;
pub mod cluster;
pub mod cancel;
pub mod optimizer;
pub mod aggregator;
pub mod pipeline;
