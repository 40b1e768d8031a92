//! Opti-style problem builder over opal expressions.
//!
//! Declare variables and parameters on a [`Problem`], state an objective and
//! constraints with `opal_expr` expressions, then solve through any
//! `opal_solver::NlpSolver` adapter.

pub mod problem;

pub use problem::{ConstraintHandle, ModelError, Problem, ProblemSolution};
