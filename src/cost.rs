//! Linear operating cost model (fuel + driver time).

use serde::Serialize;

use crate::params::OptimizationParameters;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CostModel {
    pub fuel_cost_per_gallon: f64,
    pub driver_cost_per_hour: f64,
    /// Used when a vehicle reports no usable fuel economy.
    pub default_mpg: f64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct RouteCost {
    pub fuel_cost: f64,
    pub driver_cost: f64,
}

impl RouteCost {
    pub fn total(&self) -> f64 {
        self.fuel_cost + self.driver_cost
    }
}

/// One savings figure, in currency and as a share of the baseline.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct SavingsLine {
    pub amount: f64,
    /// `None` when the baseline is zero and a percentage is meaningless.
    pub percent: Option<f64>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct Savings {
    pub fuel: SavingsLine,
    pub driver: SavingsLine,
    pub total: SavingsLine,
}

impl CostModel {
    pub fn from_params(params: &OptimizationParameters) -> Self {
        Self {
            fuel_cost_per_gallon: params.fuel_cost_per_gallon,
            driver_cost_per_hour: params.driver_cost_per_hour,
            default_mpg: params.default_mpg,
        }
    }

    pub fn cost(&self, distance_miles: f64, duration_hours: f64, mpg: Option<f64>) -> RouteCost {
        let mpg = mpg
            .filter(|mpg| mpg.is_finite() && *mpg > 0.0)
            .unwrap_or(self.default_mpg);
        RouteCost {
            fuel_cost: distance_miles / mpg * self.fuel_cost_per_gallon,
            driver_cost: duration_hours * self.driver_cost_per_hour,
        }
    }
}

/// `baseline - candidate`, per component and in total.
///
/// Percentages are reported only when the baseline total is non-zero and
/// the component's own baseline is non-zero.
pub fn savings(baseline: &RouteCost, candidate: &RouteCost) -> Savings {
    let defined = baseline.total() != 0.0;
    let line = |base: f64, cand: f64| {
        let amount = base - cand;
        SavingsLine {
            amount,
            percent: if defined { percent_of(amount, base) } else { None },
        }
    };

    Savings {
        fuel: line(baseline.fuel_cost, candidate.fuel_cost),
        driver: line(baseline.driver_cost, candidate.driver_cost),
        total: line(baseline.total(), candidate.total()),
    }
}

/// `part / whole * 100`, or `None` for a zero whole.
pub fn percent_of(part: f64, whole: f64) -> Option<f64> {
    if whole == 0.0 || !whole.is_finite() {
        None
    } else {
        Some(part / whole * 100.0)
    }
}
