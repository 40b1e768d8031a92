//! Expression nodes and the primitive operators they apply.

use crate::ids::{CallSiteId, NodeId, SymbolId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UnaryOp {
    Neg,
    Sin,
    Cos,
    Tan,
    Asin,
    Acos,
    Atan,
    Exp,
    Log,
    Sqrt,
    Sq,
    Abs,
    Tanh,
    Sign,
    Floor,
    Ceil,
}

impl UnaryOp {
    pub fn as_str(self) -> &'static str {
        match self {
            UnaryOp::Neg => "neg",
            UnaryOp::Sin => "sin",
            UnaryOp::Cos => "cos",
            UnaryOp::Tan => "tan",
            UnaryOp::Asin => "asin",
            UnaryOp::Acos => "acos",
            UnaryOp::Atan => "atan",
            UnaryOp::Exp => "exp",
            UnaryOp::Log => "log",
            UnaryOp::Sqrt => "sqrt",
            UnaryOp::Sq => "sq",
            UnaryOp::Abs => "fabs",
            UnaryOp::Tanh => "tanh",
            UnaryOp::Sign => "sign",
            UnaryOp::Floor => "floor",
            UnaryOp::Ceil => "ceil",
        }
    }

    pub fn apply(self, x: f64) -> f64 {
        match self {
            UnaryOp::Neg => -x,
            UnaryOp::Sin => x.sin(),
            UnaryOp::Cos => x.cos(),
            UnaryOp::Tan => x.tan(),
            UnaryOp::Asin => x.asin(),
            UnaryOp::Acos => x.acos(),
            UnaryOp::Atan => x.atan(),
            UnaryOp::Exp => x.exp(),
            UnaryOp::Log => x.ln(),
            UnaryOp::Sqrt => x.sqrt(),
            UnaryOp::Sq => x * x,
            UnaryOp::Abs => x.abs(),
            UnaryOp::Tanh => x.tanh(),
            UnaryOp::Sign => {
                if x > 0.0 {
                    1.0
                } else if x < 0.0 {
                    -1.0
                } else {
                    0.0
                }
            }
            UnaryOp::Floor => x.floor(),
            UnaryOp::Ceil => x.ceil(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Pow,
    Atan2,
    Fmin,
    Fmax,
}

impl BinaryOp {
    pub fn as_str(self) -> &'static str {
        match self {
            BinaryOp::Add => "add",
            BinaryOp::Sub => "sub",
            BinaryOp::Mul => "mul",
            BinaryOp::Div => "div",
            BinaryOp::Pow => "pow",
            BinaryOp::Atan2 => "atan2",
            BinaryOp::Fmin => "fmin",
            BinaryOp::Fmax => "fmax",
        }
    }

    /// Infix symbol for arithmetic operators.
    pub(crate) fn infix(self) -> Option<char> {
        match self {
            BinaryOp::Add => Some('+'),
            BinaryOp::Sub => Some('-'),
            BinaryOp::Mul => Some('*'),
            BinaryOp::Div => Some('/'),
            _ => None,
        }
    }

    pub fn apply(self, a: f64, b: f64) -> f64 {
        match self {
            BinaryOp::Add => a + b,
            BinaryOp::Sub => a - b,
            BinaryOp::Mul => a * b,
            BinaryOp::Div => a / b,
            BinaryOp::Pow => a.powf(b),
            BinaryOp::Atan2 => a.atan2(b),
            BinaryOp::Fmin => a.min(b),
            BinaryOp::Fmax => a.max(b),
        }
    }
}

/// One immutable node of the expression DAG.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Node {
    /// Element `offset` (column-major) of a declared symbol.
    Symbol { symbol: SymbolId, offset: usize },
    Constant(f64),
    Unary { op: UnaryOp, arg: NodeId },
    Binary { op: BinaryOp, lhs: NodeId, rhs: NodeId },
    /// Flattened output element `output` of an embedded function call.
    Call { site: CallSiteId, output: usize },
}

impl Node {
    pub fn as_constant(&self) -> Option<f64> {
        match self {
            Node::Constant(value) => Some(*value),
            _ => None,
        }
    }

    pub fn is_symbol(&self) -> bool {
        matches!(self, Node::Symbol { .. })
    }

    pub fn tag(&self) -> &'static str {
        match self {
            Node::Symbol { .. } => "symbol",
            Node::Constant(_) => "constant",
            Node::Unary { .. } => "unary",
            Node::Binary { .. } => "binary",
            Node::Call { .. } => "call",
        }
    }
}

#[cfg(test)]
#[allow(clippy::float_cmp)]
mod tests {
    use super::*;

    #[test]
    fn unary_apply() {
        assert_eq!(UnaryOp::Sq.apply(3.0), 9.0);
        assert_eq!(UnaryOp::Neg.apply(2.0), -2.0);
        assert_eq!(UnaryOp::Sign.apply(-0.5), -1.0);
        assert_eq!(UnaryOp::Sign.apply(0.0), 0.0);
        assert_eq!(UnaryOp::Floor.apply(1.7), 1.0);
    }

    #[test]
    fn binary_apply() {
        assert_eq!(BinaryOp::Pow.apply(2.0, 3.0), 8.0);
        assert_eq!(BinaryOp::Fmax.apply(2.0, 3.0), 3.0);
        assert_eq!(BinaryOp::Div.apply(1.0, 4.0), 0.25);
    }

    #[test]
    fn node_tags() {
        assert_eq!(Node::Constant(1.0).tag(), "constant");
        assert_eq!(Node::Constant(1.0).as_constant(), Some(1.0));
        let sym = Node::Symbol {
            symbol: SymbolId::new(0),
            offset: 0,
        };
        assert!(sym.is_symbol());
        assert_eq!(sym.as_constant(), None);
    }
}
