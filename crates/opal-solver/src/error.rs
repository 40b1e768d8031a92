//! Solver error types.

use opal_expr::FunctionError;

use crate::SolverStatus;

/// Error type for solver operations.
#[derive(Debug, Clone, PartialEq)]
pub enum SolverError {
    /// Problem has no decision variables.
    EmptyProblem,
    /// No objective function set.
    NoObjective,
    /// A numeric vector or expression has the wrong size.
    DimensionMismatch {
        what: &'static str,
        expected: usize,
        actual: usize,
    },
    /// Lower bound above upper bound, or a NaN bound.
    InvalidBounds {
        what: &'static str,
        index: usize,
        lower: f64,
        upper: f64,
    },
    /// Adapter option outside its valid range.
    InvalidOption { name: &'static str, value: f64 },
    /// Compiling or evaluating an oracle function failed.
    Function(FunctionError),
    /// Internal solver error.
    InternalError(String),
    /// Solver failed to find optimal solution.
    SolveFailure {
        /// The solver status that caused the failure.
        status: SolverStatus,
    },
}

impl SolverError {
    /// Returns a semantic error code for programmatic handling.
    pub fn code(&self) -> &'static str {
        match self {
            SolverError::EmptyProblem => "PROBLEM_EMPTY",
            SolverError::NoObjective => "OBJECTIVE_MISSING",
            SolverError::DimensionMismatch { .. } => "SOLVER_DIMENSION_MISMATCH",
            SolverError::InvalidBounds { .. } => "SOLVER_INVALID_BOUNDS",
            SolverError::InvalidOption { .. } => "SOLVER_INVALID_OPTION",
            SolverError::Function(inner) => inner.code(),
            SolverError::InternalError(_) => "SOLVER_INTERNAL",
            SolverError::SolveFailure { status } => match status {
                SolverStatus::Infeasible => "SOLVER_INFEASIBLE",
                SolverStatus::Unbounded => "SOLVER_UNBOUNDED",
                SolverStatus::ReachedTimeLimit => "SOLVER_TIME_LIMIT",
                SolverStatus::ReachedIterationLimit => "SOLVER_ITERATION_LIMIT",
                SolverStatus::NumericalFailure => "SOLVER_NUMERICAL_FAILURE",
                _ => "SOLVER_INTERNAL",
            },
        }
    }

    /// Status attached to a failed solve, if any.
    pub fn status(&self) -> Option<SolverStatus> {
        match self {
            SolverError::SolveFailure { status } => Some(*status),
            _ => None,
        }
    }
}

impl std::fmt::Display for SolverError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SolverError::EmptyProblem => {
                write!(f, "[{}] Problem has no decision variables", self.code())
            }
            SolverError::NoObjective => write!(f, "[{}] Problem has no objective", self.code()),
            SolverError::DimensionMismatch {
                what,
                expected,
                actual,
            } => write!(
                f,
                "[{}] {what} has {actual} entries, expected {expected}",
                self.code()
            ),
            SolverError::InvalidBounds {
                what,
                index,
                lower,
                upper,
            } => write!(
                f,
                "[{}] {what}[{index}] has invalid bounds [{lower}, {upper}]",
                self.code()
            ),
            SolverError::InvalidOption { name, value } => {
                write!(f, "[{}] Option {name} cannot be {value}", self.code())
            }
            SolverError::Function(inner) => write!(f, "{inner}"),
            SolverError::InternalError(msg) => {
                write!(f, "[{}] Solver internal error: {}", self.code(), msg)
            }
            SolverError::SolveFailure { status } => {
                write!(f, "[{}] {}", self.code(), status_message(*status))
            }
        }
    }
}

fn status_message(status: SolverStatus) -> &'static str {
    match status {
        SolverStatus::Infeasible => "Problem is infeasible",
        SolverStatus::Unbounded => "Problem is unbounded",
        SolverStatus::ReachedTimeLimit => "Solver reached time limit",
        SolverStatus::ReachedIterationLimit => "Solver reached iteration limit",
        SolverStatus::NumericalFailure => "Solver hit non-finite values",
        SolverStatus::Unknown => "Solver status unknown",
        SolverStatus::Optimal => "Solver returned optimal",
    }
}

impl std::error::Error for SolverError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            SolverError::Function(inner) => Some(inner),
            _ => None,
        }
    }
}

impl From<FunctionError> for SolverError {
    fn from(err: FunctionError) -> Self {
        SolverError::Function(err)
    }
}
