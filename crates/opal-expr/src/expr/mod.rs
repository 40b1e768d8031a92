//! Expression graph types.
//!
//! - `graph`      — Append-only node arena and the shared `Graph` handle
//! - `node`       — Node kinds and primitive operators
//! - `matrix`     — MatrixExpr: shape + column-major node ids, operators
//! - `slice`      — Range and element selection
//! - `concat`     — vertcat / horzcat
//! - `constraint` — ConstraintExpr: expression with per-element bounds
//! - `error`      — Expression construction errors

pub mod concat;
pub mod constraint;
pub mod error;
pub mod graph;
pub mod matrix;
pub mod node;
pub mod slice;

pub use concat::{horzcat, vertcat};
pub use constraint::{ConstraintExpr, Relation};
pub use error::{Axis, ExprError};
pub use graph::{Graph, SymbolInfo};
pub use matrix::MatrixExpr;
pub use node::{BinaryOp, Node, UnaryOp};
pub use slice::Slice;
