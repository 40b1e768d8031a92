//! Solver adapter trait.

use std::time::Instant;

use tracing::{debug, warn};

use crate::{NlpInputs, NlpOracle, Solution, SolverConfig, SolverError};

/// Interface every NLP solver adapter implements.
///
/// An adapter consumes first-order data only (objective, gradient,
/// constraints, constraint Jacobian) and returns a `Solution` carrying its
/// status. Deciding whether that status counts as success is up to the
/// caller; see [`solve_checked`].
pub trait NlpSolver {
    /// Short adapter name for logs.
    fn name(&self) -> &str;

    /// Solve the program described by `oracle` from `inputs`.
    ///
    /// # Errors
    ///
    /// Returns a `SolverError` if the inputs do not fit the oracle or an
    /// oracle evaluation fails. A solve that runs but does not converge is
    /// reported through `Solution::status`, not as an error.
    fn solve(
        &mut self,
        oracle: &NlpOracle,
        inputs: &NlpInputs,
        config: &SolverConfig,
    ) -> Result<Solution, SolverError>;
}

/// Validate inputs, run the adapter, check the result sizes and turn
/// non-optimal statuses into `SolverError::SolveFailure`.
pub fn solve_checked(
    solver: &mut dyn NlpSolver,
    oracle: &NlpOracle,
    inputs: &NlpInputs,
    config: &SolverConfig,
) -> Result<Solution, SolverError> {
    inputs.validate(oracle)?;
    let started = Instant::now();
    let solution = solver.solve(oracle, inputs, config)?;
    let duration_ms = started.elapsed().as_millis() as u64;
    if let Err(err) = solution.validate(oracle) {
        warn!(
            component = "solver",
            operation = "solve",
            status = "failed",
            adapter = solver.name(),
            error_code = err.code(),
            "Adapter returned a malformed solution"
        );
        return Err(err);
    }

    if !solution.status.is_optimal() {
        warn!(
            component = "solver",
            operation = "solve",
            status = "failed",
            adapter = solver.name(),
            solver_status = solution.status.as_str(),
            iterations = solution.iterations,
            duration_ms,
            "Solver did not reach optimality"
        );
        return Err(SolverError::SolveFailure {
            status: solution.status,
        });
    }

    debug!(
        component = "solver",
        operation = "solve",
        status = "success",
        adapter = solver.name(),
        objective = solution.f,
        iterations = solution.iterations,
        duration_ms,
        "Solve complete"
    );
    Ok(solution)
}
