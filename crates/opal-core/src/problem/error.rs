//! Problem builder error types.

use opal_expr::{ExprError, FunctionError};
use opal_solver::SolverError;

/// Errors that can occur while declaring or solving a problem
#[derive(Debug, Clone, PartialEq)]
pub enum ModelError {
    /// Numeric values do not fit the declared shape
    ShapeMismatch {
        what: &'static str,
        expected: (usize, usize),
        actual: (usize, usize),
    },
    /// Variable or parameter declared with zero elements
    EmptyDeclaration {
        name: String,
        rows: usize,
        cols: usize,
    },
    /// Expression is not a variable of this problem
    UnknownVariable,
    /// Expression is not a parameter of this problem
    UnknownParameter,
    /// Expression references a symbol declared neither as variable nor parameter
    UndeclaredSymbol { name: String },
    /// Objective already set
    MultipleObjectives,
    /// No objective set
    NoObjective,
    /// `solve()` called without a solver adapter
    NoSolver,
    /// Structural declaration after the first solve
    StructureFrozen { operation: &'static str },
    /// Lower bound above upper bound, or NaN
    InvalidBounds { index: usize, lower: f64, upper: f64 },
    Expr(ExprError),
    Solver(SolverError),
}

impl ModelError {
    /// Returns a semantic error code for programmatic handling.
    pub fn code(&self) -> &'static str {
        match self {
            ModelError::ShapeMismatch { .. } => "MODEL_SHAPE_MISMATCH",
            ModelError::EmptyDeclaration { .. } => "MODEL_EMPTY_DECLARATION",
            ModelError::UnknownVariable => "VARIABLE_UNKNOWN",
            ModelError::UnknownParameter => "PARAMETER_UNKNOWN",
            ModelError::UndeclaredSymbol { .. } => "MODEL_UNDECLARED_SYMBOL",
            ModelError::MultipleObjectives => "OBJECTIVE_ALREADY_SET",
            ModelError::NoObjective => "OBJECTIVE_MISSING",
            ModelError::NoSolver => "MODEL_NO_SOLVER",
            ModelError::StructureFrozen { .. } => "MODEL_STRUCTURE_FROZEN",
            ModelError::InvalidBounds { .. } => "VARIABLE_INVALID_BOUNDS",
            ModelError::Expr(inner) => inner.code(),
            ModelError::Solver(inner) => inner.code(),
        }
    }

    /// Solver status when a solve ran but did not succeed.
    pub fn status(&self) -> Option<opal_solver::SolverStatus> {
        match self {
            ModelError::Solver(inner) => inner.status(),
            _ => None,
        }
    }
}

impl std::fmt::Display for ModelError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ModelError::ShapeMismatch {
                what,
                expected,
                actual,
            } => write!(
                f,
                "[{}] {} expects shape {}x{}, got {}x{}",
                self.code(),
                what,
                expected.0,
                expected.1,
                actual.0,
                actual.1
            ),
            ModelError::EmptyDeclaration { name, rows, cols } => write!(
                f,
                "[{}] '{}' must have at least one element, got {}x{}",
                self.code(),
                name,
                rows,
                cols
            ),
            ModelError::UnknownVariable => write!(
                f,
                "[{}] Expression is not a variable of this problem",
                self.code()
            ),
            ModelError::UnknownParameter => write!(
                f,
                "[{}] Expression is not a parameter of this problem",
                self.code()
            ),
            ModelError::UndeclaredSymbol { name } => write!(
                f,
                "[{}] Symbol '{}' is neither a variable nor a parameter of this problem",
                self.code(),
                name
            ),
            ModelError::MultipleObjectives => {
                write!(f, "[{}] Problem already has an objective", self.code())
            }
            ModelError::NoObjective => {
                write!(f, "[{}] Problem has no objective defined", self.code())
            }
            ModelError::NoSolver => write!(
                f,
                "[{}] No solver adapter configured; call solver() first",
                self.code()
            ),
            ModelError::StructureFrozen { operation } => write!(
                f,
                "[{}] Cannot {} after the first solve",
                self.code(),
                operation
            ),
            ModelError::InvalidBounds {
                index,
                lower,
                upper,
            } => write!(
                f,
                "[{}] Bounds at element {} invalid: lower ({}) > upper ({})",
                self.code(),
                index,
                lower,
                upper
            ),
            ModelError::Expr(inner) => write!(f, "{inner}"),
            ModelError::Solver(inner) => write!(f, "{inner}"),
        }
    }
}

impl std::error::Error for ModelError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ModelError::Expr(inner) => Some(inner),
            ModelError::Solver(inner) => Some(inner),
            _ => None,
        }
    }
}

impl From<ExprError> for ModelError {
    fn from(err: ExprError) -> Self {
        ModelError::Expr(err)
    }
}

impl From<SolverError> for ModelError {
    fn from(err: SolverError) -> Self {
        ModelError::Solver(err)
    }
}

impl From<FunctionError> for ModelError {
    fn from(err: FunctionError) -> Self {
        match err {
            FunctionError::Expr(inner) => ModelError::Expr(inner),
            other => ModelError::Solver(SolverError::Function(other)),
        }
    }
}
