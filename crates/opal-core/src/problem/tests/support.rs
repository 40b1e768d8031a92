use opal_solver::{NlpInputs, NlpOracle, NlpSolver, Solution, SolverConfig, SolverError, SolverStatus};

/// Adapter that returns the initial guess with a fixed status and records
/// what it was given.
#[derive(Debug, Default)]
pub(super) struct RecordingSolver {
    pub(super) status: Option<SolverStatus>,
    pub(super) seen: Vec<NlpInputs>,
    /// Report an empty primal vector.
    pub(super) drop_primal: bool,
}

impl RecordingSolver {
    pub(super) fn with_status(status: SolverStatus) -> Self {
        Self {
            status: Some(status),
            ..Self::default()
        }
    }
}

impl NlpSolver for RecordingSolver {
    fn name(&self) -> &str {
        "recording"
    }

    fn solve(
        &mut self,
        oracle: &NlpOracle,
        inputs: &NlpInputs,
        _config: &SolverConfig,
    ) -> Result<Solution, SolverError> {
        self.seen.push(inputs.clone());
        Ok(Solution {
            status: self.status.unwrap_or(SolverStatus::Optimal),
            f: oracle.objective(&inputs.x0, &inputs.p)?,
            g: oracle.constraints(&inputs.x0, &inputs.p)?,
            x: if self.drop_primal {
                Vec::new()
            } else {
                inputs.x0.clone()
            },
            dual_g: (0..oracle.n_g()).map(|i| i as f64 + 1.0).collect(),
            dual_x: vec![0.0; oracle.n_x()],
            iterations: 0,
            solve_time_seconds: 0.0,
        })
    }
}
