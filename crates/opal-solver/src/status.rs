//! Solver status types.

use serde::{Deserialize, Serialize};

/// Common status values that solvers may return.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SolverStatus {
    /// Optimal solution found.
    Optimal,
    /// Problem is infeasible.
    Infeasible,
    /// Problem is unbounded.
    Unbounded,
    /// Solver reached time limit (may have feasible solution).
    ReachedTimeLimit,
    /// Solver reached iteration limit (may have feasible solution).
    ReachedIterationLimit,
    /// Non-finite values appeared during the solve.
    NumericalFailure,
    /// Adapter could not classify its outcome.
    Unknown,
}

impl SolverStatus {
    /// Check if the status indicates an optimal solution.
    pub fn is_optimal(self) -> bool {
        matches!(self, SolverStatus::Optimal)
    }

    /// Optimal, or stopped at a limit with a usable iterate.
    pub fn is_feasible(self) -> bool {
        matches!(
            self,
            SolverStatus::Optimal
                | SolverStatus::ReachedTimeLimit
                | SolverStatus::ReachedIterationLimit
        )
    }

    /// Get a human-readable string representation.
    pub fn as_str(self) -> &'static str {
        match self {
            SolverStatus::Optimal => "optimal",
            SolverStatus::Infeasible => "infeasible",
            SolverStatus::Unbounded => "unbounded",
            SolverStatus::ReachedTimeLimit => "time_limit",
            SolverStatus::ReachedIterationLimit => "iteration_limit",
            SolverStatus::NumericalFailure => "numerical_failure",
            SolverStatus::Unknown => "unknown",
        }
    }
}

impl std::fmt::Display for SolverStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_is_optimal() {
        assert!(SolverStatus::Optimal.is_optimal());
        assert!(!SolverStatus::Infeasible.is_optimal());
        assert!(!SolverStatus::ReachedTimeLimit.is_optimal());
        assert!(!SolverStatus::NumericalFailure.is_optimal());
    }

    #[test]
    fn test_status_is_feasible() {
        assert!(SolverStatus::Optimal.is_feasible());
        assert!(SolverStatus::ReachedTimeLimit.is_feasible());
        assert!(SolverStatus::ReachedIterationLimit.is_feasible());
        assert!(!SolverStatus::Infeasible.is_feasible());
        assert!(!SolverStatus::NumericalFailure.is_feasible());
        assert!(!SolverStatus::Unknown.is_feasible());
    }

    #[test]
    fn test_status_as_str() {
        assert_eq!(SolverStatus::Optimal.as_str(), "optimal");
        assert_eq!(SolverStatus::ReachedTimeLimit.as_str(), "time_limit");
        assert_eq!(
            SolverStatus::NumericalFailure.as_str(),
            "numerical_failure"
        );
        assert_eq!(format!("{}", SolverStatus::Infeasible), "infeasible");
        assert_eq!(SolverStatus::Unknown.as_str(), "unknown");
    }
}
