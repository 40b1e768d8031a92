pub mod ad;
pub mod dense;
pub mod expr;
pub mod function;
pub mod ids;

pub use ad::{gradient, hessian, jacobian, Jacobian, SweepTrace};
pub use dense::DenseMatrix;
pub use expr::{
    horzcat, vertcat, Axis, ConstraintExpr, ExprError, Graph, MatrixExpr, Relation, Slice,
    SymbolInfo,
};
pub use function::{Function, FunctionError};
pub use ids::{NodeId, SymbolId};
