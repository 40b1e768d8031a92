//! Expression construction errors.

/// Which dimension of a matrix an index refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Axis {
    Row,
    Column,
}

impl Axis {
    pub fn as_str(self) -> &'static str {
        match self {
            Axis::Row => "row",
            Axis::Column => "column",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExprError {
    /// Operand shapes are incompatible under every broadcasting rule.
    ShapeMismatch {
        op: &'static str,
        left: (usize, usize),
        right: (usize, usize),
    },
    /// A resolved index or range falls outside the matrix.
    OutOfRange {
        axis: Axis,
        index: isize,
        len: usize,
    },
    /// Slice step must be at least one.
    InvalidSlice { step: isize },
    /// Operands were built in different graphs.
    ForeignGraph,
    /// Relation token is not one of `==`, `<=`, `>=`.
    UnsupportedRelation(String),
    /// A cell that must be a bare symbol is an expression.
    NotSymbolic { position: usize },
    /// The operator has no derivative rule.
    NotDifferentiable { op: &'static str },
    /// The derivative of an embedded function could not be built.
    CallDerivative { function: String, reason: String },
}

impl ExprError {
    /// Returns a semantic error code for programmatic handling.
    pub fn code(&self) -> &'static str {
        match self {
            ExprError::ShapeMismatch { .. } => "EXPR_SHAPE_MISMATCH",
            ExprError::OutOfRange { .. } => "EXPR_OUT_OF_RANGE",
            ExprError::InvalidSlice { .. } => "EXPR_INVALID_SLICE",
            ExprError::ForeignGraph => "EXPR_FOREIGN_GRAPH",
            ExprError::UnsupportedRelation(_) => "EXPR_UNSUPPORTED_RELATION",
            ExprError::NotSymbolic { .. } => "EXPR_NOT_SYMBOLIC",
            ExprError::NotDifferentiable { .. } => "EXPR_NOT_DIFFERENTIABLE",
            ExprError::CallDerivative { .. } => "EXPR_CALL_DERIVATIVE",
        }
    }

    pub(crate) fn shape(op: &'static str, left: (usize, usize), right: (usize, usize)) -> Self {
        ExprError::ShapeMismatch { op, left, right }
    }
}

impl std::fmt::Display for ExprError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExprError::ShapeMismatch { op, left, right } => write!(
                f,
                "[{}] {op}: incompatible shapes {}x{} and {}x{}",
                self.code(),
                left.0,
                left.1,
                right.0,
                right.1
            ),
            ExprError::OutOfRange { axis, index, len } => write!(
                f,
                "[{}] {} index {} out of range for dimension {}",
                self.code(),
                axis.as_str(),
                index,
                len
            ),
            ExprError::InvalidSlice { step } => {
                write!(f, "[{}] slice step must be >= 1 (got {step})", self.code())
            }
            ExprError::ForeignGraph => write!(
                f,
                "[{}] operands belong to different expression graphs",
                self.code()
            ),
            ExprError::UnsupportedRelation(token) => write!(
                f,
                "[{}] relation '{token}' is not one of ==, <=, >=",
                self.code()
            ),
            ExprError::NotSymbolic { position } => write!(
                f,
                "[{}] element {position} is not a purely symbolic cell",
                self.code()
            ),
            ExprError::NotDifferentiable { op } => {
                write!(f, "[{}] no derivative rule for '{op}'", self.code())
            }
            ExprError::CallDerivative { function, reason } => write!(
                f,
                "[{}] derivative of '{function}' unavailable: {reason}",
                self.code()
            ),
        }
    }
}

impl std::error::Error for ExprError {}

#[cfg(test)]
mod tests {
    use super::{Axis, ExprError};

    #[test]
    fn error_code_is_stable() {
        assert_eq!(ExprError::ForeignGraph.code(), "EXPR_FOREIGN_GRAPH");
        assert_eq!(
            ExprError::UnsupportedRelation("<".to_string()).code(),
            "EXPR_UNSUPPORTED_RELATION"
        );
        assert_eq!(
            ExprError::NotDifferentiable { op: "floor" }.code(),
            "EXPR_NOT_DIFFERENTIABLE"
        );
    }

    #[test]
    fn display_prefixes_error_code() {
        let rendered = ExprError::shape("add", (2, 3), (3, 2)).to_string();
        assert!(rendered.starts_with("[EXPR_SHAPE_MISMATCH]"));
        assert!(rendered.contains("2x3"));
        assert!(rendered.contains("3x2"));
    }

    #[test]
    fn out_of_range_names_axis() {
        let err = ExprError::OutOfRange {
            axis: Axis::Column,
            index: 9,
            len: 4,
        };
        assert!(err.to_string().contains("column index 9"));
    }
}
