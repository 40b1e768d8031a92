//! Solver adapter boundary for opal nonlinear programs.
//!
//! Solver implementations (like `opal-alm`) consume a compiled
//! [`NlpOracle`] and numeric [`NlpInputs`] and never see the expression
//! graph itself.
//!
//! # Overview
//!
//! - [`Nlp`] / [`NlpOracle`]: program description and its compiled callables
//! - [`NlpInputs`]: initial guess, bounds and parameter values
//! - [`SolverConfig`]: Configuration options for solver behavior
//! - [`SolverStatus`]: Common status values across solvers
//! - [`SolverError`]: Error types for solver operations
//! - [`NlpSolver`]: Trait for solver implementations
//! - [`Solution`]: Primal/dual result of one solve

mod config;
mod error;
mod inputs;
mod nlp;
mod solution;
mod status;
mod traits;

pub use config::SolverConfig;
pub use error::SolverError;
pub use inputs::NlpInputs;
pub use nlp::{Nlp, NlpOracle};
pub use solution::Solution;
pub use status::SolverStatus;
pub use traits::{solve_checked, NlpSolver};
