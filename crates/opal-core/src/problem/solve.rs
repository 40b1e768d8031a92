//! Flattening, one-time compilation and the solver call.

use std::time::Instant;

use opal_solver::{solve_checked, Nlp, NlpInputs, NlpOracle, NlpSolver};
use tracing::debug;

use crate::problem::{ModelError, Problem, ProblemSolution};

impl Problem {
    /// Solve with the adapter set through [`Problem::solver`].
    pub fn solve(&mut self) -> Result<ProblemSolution, ModelError> {
        let mut solver = self.take_solver().ok_or(ModelError::NoSolver)?;
        let result = self.solve_with(solver.as_mut());
        self.restore_solver(solver);
        result
    }

    /// Solve with an explicit adapter.
    ///
    /// The first call compiles the program and freezes the structure; later
    /// calls reuse it with the current bounds, initial guesses and parameter
    /// values. A non-optimal status is returned as
    /// `ModelError::Solver(SolverError::SolveFailure { .. })`.
    pub fn solve_with(&mut self, solver: &mut dyn NlpSolver) -> Result<ProblemSolution, ModelError> {
        let oracle = match self.oracle.take() {
            Some(oracle) => oracle,
            None => self.compile()?,
        };
        let inputs = self.inputs();
        let result = solve_checked(solver, &oracle, &inputs, self.config());
        self.oracle = Some(oracle);
        let solution = result?;
        Ok(ProblemSolution::new(self, solution))
    }

    /// Numeric inputs for the next solve, in flattening order.
    pub fn inputs(&self) -> NlpInputs {
        NlpInputs {
            x0: self.x0(),
            lbx: self.lbx(),
            ubx: self.ubx(),
            lbg: self.lbg(),
            ubg: self.ubg(),
            p: self.parameter_values(),
        }
    }

    fn compile(&self) -> Result<NlpOracle, ModelError> {
        let f = self.objective.clone().ok_or(ModelError::NoObjective)?;
        let started = Instant::now();
        let nlp = Nlp {
            x: self.x()?,
            p: self.p()?,
            f,
            g: self.g()?,
        };
        let oracle = NlpOracle::new(&nlp)?;

        debug!(
            component = "problem",
            operation = "compile",
            status = "success",
            variables = oracle.n_x() as u64,
            parameters = oracle.n_p() as u64,
            constraints = oracle.n_g() as u64,
            duration_ms = started.elapsed().as_millis() as u64,
            "Compiled problem"
        );
        Ok(oracle)
    }
}
