//! Solution returned by a solver adapter.

use serde::{Deserialize, Serialize};

use crate::{NlpOracle, SolverError, SolverStatus};

/// Primal/dual result of one solve.
///
/// Multiplier sign convention: stationarity of
/// `f + dual_gᵀ g + dual_xᵀ x`, so an active lower bound has a negative
/// multiplier and an active upper bound a positive one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Solution {
    pub status: SolverStatus,
    /// Primal values in flattening order.
    pub x: Vec<f64>,
    /// Objective value at `x`.
    pub f: f64,
    /// Constraint values at `x`.
    pub g: Vec<f64>,
    pub dual_g: Vec<f64>,
    pub dual_x: Vec<f64>,
    pub iterations: usize,
    pub solve_time_seconds: f64,
}

impl Solution {
    pub fn objective_value(&self) -> f64 {
        self.f
    }

    pub fn status(&self) -> SolverStatus {
        self.status
    }

    pub fn get_primal(&self, index: usize) -> Option<f64> {
        self.x.get(index).copied()
    }

    pub fn primal_values(&self) -> &[f64] {
        &self.x
    }

    pub fn constraint_values(&self) -> &[f64] {
        &self.g
    }

    pub fn constraint_duals(&self) -> &[f64] {
        &self.dual_g
    }

    pub fn variable_duals(&self) -> &[f64] {
        &self.dual_x
    }

    pub fn is_optimal(&self) -> bool {
        self.status.is_optimal()
    }

    pub fn is_feasible(&self) -> bool {
        self.status.is_feasible()
    }

    /// Check that every vector is sized for `oracle`.
    pub fn validate(&self, oracle: &NlpOracle) -> Result<(), SolverError> {
        let sizes = [
            ("x", &self.x, oracle.n_x()),
            ("dual_x", &self.dual_x, oracle.n_x()),
            ("g", &self.g, oracle.n_g()),
            ("dual_g", &self.dual_g, oracle.n_g()),
        ];
        for (what, values, expected) in sizes {
            if values.len() != expected {
                return Err(SolverError::DimensionMismatch {
                    what,
                    expected,
                    actual: values.len(),
                });
            }
        }
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::float_cmp)]
mod tests {
    use super::*;

    fn fixture(status: SolverStatus) -> Solution {
        Solution {
            status,
            x: vec![1.0, 2.0],
            f: 5.0,
            g: vec![3.0],
            dual_g: vec![-0.5],
            dual_x: vec![0.0, 0.0],
            iterations: 7,
            solve_time_seconds: 0.01,
        }
    }

    #[test]
    fn accessors() {
        let solution = fixture(SolverStatus::Optimal);
        assert_eq!(solution.objective_value(), 5.0);
        assert_eq!(solution.get_primal(1), Some(2.0));
        assert_eq!(solution.get_primal(2), None);
        assert!(solution.is_optimal());
        assert!(solution.is_feasible());
    }

    #[test]
    fn time_limit_is_feasible_not_optimal() {
        let solution = fixture(SolverStatus::ReachedTimeLimit);
        assert!(!solution.is_optimal());
        assert!(solution.is_feasible());
    }

    #[test]
    fn status_serializes_as_snake_case() {
        let solution = fixture(SolverStatus::ReachedIterationLimit);
        let json = serde_json::to_string(&solution).unwrap();
        assert!(json.contains("\"status\":\"reached_iteration_limit\""));
        let back: Solution = serde_json::from_str(&json).unwrap();
        assert_eq!(back, solution);
    }
}
