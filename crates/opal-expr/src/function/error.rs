use crate::expr::ExprError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FunctionError {
    /// An output depends on a symbol element that no input covers.
    InputMismatch { symbol: String },
    /// Input cell is an expression rather than a bare symbol element.
    NotSymbolic { input: usize, position: usize },
    /// A symbol element appears more than once among the inputs.
    DuplicateInput { symbol: String },
    /// Wrong number of arguments.
    ArityMismatch { expected: usize, actual: usize },
    /// Argument shape differs from the declared input shape.
    ShapeMismatch {
        input: usize,
        expected: (usize, usize),
        actual: (usize, usize),
    },
    /// Names list length differs from the inputs/outputs list.
    NameCountMismatch { expected: usize, actual: usize },
    Expr(ExprError),
}

impl FunctionError {
    /// Returns a semantic error code for programmatic handling.
    pub fn code(&self) -> &'static str {
        match self {
            FunctionError::InputMismatch { .. } => "FUNCTION_INPUT_MISMATCH",
            FunctionError::NotSymbolic { .. } => "FUNCTION_NOT_SYMBOLIC",
            FunctionError::DuplicateInput { .. } => "FUNCTION_DUPLICATE_INPUT",
            FunctionError::ArityMismatch { .. } => "FUNCTION_ARITY_MISMATCH",
            FunctionError::ShapeMismatch { .. } => "FUNCTION_SHAPE_MISMATCH",
            FunctionError::NameCountMismatch { .. } => "FUNCTION_NAME_COUNT_MISMATCH",
            FunctionError::Expr(inner) => inner.code(),
        }
    }
}

impl std::fmt::Display for FunctionError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FunctionError::InputMismatch { symbol } => write!(
                f,
                "[{}] output depends on '{symbol}', which is not among the inputs",
                self.code()
            ),
            FunctionError::NotSymbolic { input, position } => write!(
                f,
                "[{}] input {input} element {position} is not a purely symbolic cell",
                self.code()
            ),
            FunctionError::DuplicateInput { symbol } => {
                write!(f, "[{}] symbol '{symbol}' appears twice among inputs", self.code())
            }
            FunctionError::ArityMismatch { expected, actual } => write!(
                f,
                "[{}] expected {expected} arguments, got {actual}",
                self.code()
            ),
            FunctionError::ShapeMismatch {
                input,
                expected,
                actual,
            } => write!(
                f,
                "[{}] argument {input}: expected {}x{}, got {}x{}",
                self.code(),
                expected.0,
                expected.1,
                actual.0,
                actual.1
            ),
            FunctionError::NameCountMismatch { expected, actual } => write!(
                f,
                "[{}] expected {expected} names, got {actual}",
                self.code()
            ),
            FunctionError::Expr(inner) => write!(f, "{inner}"),
        }
    }
}

impl std::error::Error for FunctionError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            FunctionError::Expr(inner) => Some(inner),
            _ => None,
        }
    }
}

impl From<ExprError> for FunctionError {
    fn from(err: ExprError) -> Self {
        FunctionError::Expr(err)
    }
}
