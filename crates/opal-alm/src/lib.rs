//! Augmented Lagrangian reference adapter for `opal-solver`.
//!
//! [`AlmSolver`] implements [`opal_solver::NlpSolver`] with first-order
//! information only: a shifted quadratic penalty on the constraint bounds and
//! a spectral projected-gradient inner loop that keeps variable bounds by
//! projection.

mod options;
mod solver;
mod spg;
mod status;

pub use options::AlmOptions;
pub use solver::AlmSolver;
