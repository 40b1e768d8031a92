//! Termination reasons and their mapping to generic solver statuses.

use opal_solver::SolverStatus;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Termination {
    Converged,
    OuterIterationLimit,
    /// Penalty at its cap and the violation still above tolerance.
    PenaltyLimit,
    NonFinite,
    ObjectiveUnbounded,
    TimeLimit,
}

impl Termination {
    pub(crate) fn status(self) -> SolverStatus {
        match self {
            Termination::Converged => SolverStatus::Optimal,
            Termination::OuterIterationLimit => SolverStatus::ReachedIterationLimit,
            Termination::PenaltyLimit => SolverStatus::Infeasible,
            Termination::NonFinite => SolverStatus::NumericalFailure,
            Termination::ObjectiveUnbounded => SolverStatus::Unbounded,
            Termination::TimeLimit => SolverStatus::ReachedTimeLimit,
        }
    }

    pub(crate) fn as_str(self) -> &'static str {
        match self {
            Termination::Converged => "converged",
            Termination::OuterIterationLimit => "outer_iteration_limit",
            Termination::PenaltyLimit => "penalty_limit",
            Termination::NonFinite => "non_finite",
            Termination::ObjectiveUnbounded => "objective_unbounded",
            Termination::TimeLimit => "time_limit",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_termination_to_status_mapping() {
        assert_eq!(Termination::Converged.status(), SolverStatus::Optimal);
        assert_eq!(
            Termination::OuterIterationLimit.status(),
            SolverStatus::ReachedIterationLimit
        );
        assert_eq!(Termination::PenaltyLimit.status(), SolverStatus::Infeasible);
        assert_eq!(
            Termination::NonFinite.status(),
            SolverStatus::NumericalFailure
        );
        assert_eq!(
            Termination::ObjectiveUnbounded.status(),
            SolverStatus::Unbounded
        );
        assert_eq!(
            Termination::TimeLimit.status(),
            SolverStatus::ReachedTimeLimit
        );
    }

    #[test]
    fn test_termination_strings() {
        assert_eq!(Termination::PenaltyLimit.as_str(), "penalty_limit");
        assert_eq!(Termination::Converged.as_str(), "converged");
    }
}
