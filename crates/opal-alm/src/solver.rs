//! Augmented Lagrangian solver.

use std::time::{Duration, Instant};

use opal_solver::{NlpInputs, NlpOracle, NlpSolver, Solution, SolverConfig, SolverError};
use tracing::{debug, info, trace};

use crate::options::AlmOptions;
use crate::spg::{self, InnerSettings, InnerStop, Merit, UNBOUNDED_OBJECTIVE};
use crate::status::Termination;

/// Reference NLP adapter.
///
/// Constraint bounds `lbg <= g(x) <= ubg` are handled by a shifted quadratic
/// penalty with first-order multiplier updates; variable bounds are kept by
/// projection in the inner spectral projected-gradient solve.
#[derive(Debug, Clone, Default)]
pub struct AlmSolver {
    options: AlmOptions,
}

impl AlmSolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_options(options: AlmOptions) -> Self {
        debug!(
            component = "alm",
            operation = "init",
            status = "success",
            initial_penalty = options.initial_penalty,
            max_penalty = options.max_penalty,
            "Creating augmented Lagrangian solver"
        );
        Self { options }
    }

    fn update_options(&mut self, update: impl FnOnce(AlmOptions) -> AlmOptions) {
        self.options = update(std::mem::take(&mut self.options));
    }

    pub fn set_initial_penalty(&mut self, penalty: f64) {
        self.update_options(|options| options.with_initial_penalty(penalty));
    }

    pub fn set_penalty_growth(&mut self, growth: f64) {
        self.update_options(|options| options.with_penalty_growth(growth));
    }

    /// Penalty above which a still-violated problem is reported infeasible.
    pub fn set_max_penalty(&mut self, penalty: f64) {
        self.update_options(|options| options.with_max_penalty(penalty));
    }

    pub fn set_max_inner_iterations(&mut self, iterations: usize) {
        self.update_options(|options| options.with_max_inner_iterations(iterations));
    }

    pub fn options(&self) -> &AlmOptions {
        &self.options
    }

    /// Generic configuration wins over adapter defaults.
    fn resolve_options(&self, config: &SolverConfig) -> Result<AlmOptions, SolverError> {
        let mut options = self.options.clone();
        if let Some(iterations) = config.max_iterations {
            options.max_outer_iterations = iterations;
        }
        if let Some(tolerance) = config.tolerance {
            options.tolerance = tolerance;
        }
        if let Some(tolerance) = config.constraint_tolerance {
            options.constraint_tolerance = tolerance;
        }
        options.validate()?;
        Ok(options)
    }
}

impl NlpSolver for AlmSolver {
    fn name(&self) -> &str {
        "alm"
    }

    fn solve(
        &mut self,
        oracle: &NlpOracle,
        inputs: &NlpInputs,
        config: &SolverConfig,
    ) -> Result<Solution, SolverError> {
        inputs.validate(oracle)?;
        let options = self.resolve_options(config)?;
        let verbose = config.verbosity.is_some_and(|level| level > 0);
        let started = Instant::now();
        let deadline = config
            .time_limit
            .and_then(time_limit_duration)
            .and_then(|limit| started.checked_add(limit));

        debug!(
            component = "alm",
            operation = "solve",
            status = "started",
            variables = oracle.n_x() as u64,
            constraints = oracle.n_g() as u64,
            parameters = oracle.n_p() as u64,
            "Starting augmented Lagrangian solve"
        );

        let mut x = inputs.x0.clone();
        spg::project(&mut x, &inputs.lbx, &inputs.ubx);
        let mut lambda = vec![0.0; oracle.n_g()];
        let mut rho = options.initial_penalty;
        let mut previous_violation = f64::INFINITY;
        let mut outer = 0;
        let mut inner_total = 0;

        let termination = loop {
            if outer >= options.max_outer_iterations {
                break Termination::OuterIterationLimit;
            }
            if deadline.is_some_and(|deadline| Instant::now() >= deadline) {
                break Termination::TimeLimit;
            }
            outer += 1;

            let merit = Merit {
                oracle,
                p: &inputs.p,
                lbg: &inputs.lbg,
                ubg: &inputs.ubg,
                lambda: &lambda,
                rho,
            };
            let settings = InnerSettings {
                tolerance: options.tolerance,
                max_iterations: options.max_inner_iterations,
                armijo: options.armijo,
                deadline,
            };
            let inner = spg::minimize(&merit, &mut x, &inputs.lbx, &inputs.ubx, &settings)?;
            inner_total += inner.iterations;

            match inner.stop {
                InnerStop::NonFinite => break Termination::NonFinite,
                InnerStop::Unbounded => break Termination::ObjectiveUnbounded,
                InnerStop::TimeLimit => break Termination::TimeLimit,
                InnerStop::Converged | InnerStop::IterationLimit | InnerStop::Stalled => {}
            }

            let g = oracle.constraints(&x, &inputs.p)?;
            lambda = merit.shifted_multipliers(&g);
            let f = oracle.objective(&x, &inputs.p)?;
            if !f.is_finite() || lambda.iter().any(|l| !l.is_finite()) {
                break Termination::NonFinite;
            }
            if f < UNBOUNDED_OBJECTIVE {
                break Termination::ObjectiveUnbounded;
            }

            let violation = bound_violation(&g, &inputs.lbg, &inputs.ubg);
            let stationarity = stationarity(oracle, &x, inputs, &lambda)?;

            trace!(
                component = "alm",
                operation = "outer_iteration",
                iteration = outer,
                inner_iterations = inner.iterations,
                inner_stop = ?inner.stop,
                inner_projected_gradient = inner.projected_gradient,
                objective = f,
                violation,
                stationarity,
                penalty = rho,
                "Outer iteration"
            );
            if verbose {
                info!(
                    component = "alm",
                    iteration = outer,
                    objective = f,
                    violation,
                    stationarity,
                    penalty = rho,
                    "alm iteration"
                );
            }

            if violation <= options.constraint_tolerance && stationarity <= options.tolerance {
                break Termination::Converged;
            }
            if violation > options.constraint_tolerance
                && violation > options.violation_decrease * previous_violation
            {
                if rho >= options.max_penalty {
                    break Termination::PenaltyLimit;
                }
                rho = (rho * options.penalty_growth).min(options.max_penalty);
            }
            previous_violation = violation;
        };

        let f = oracle.objective(&x, &inputs.p)?;
        let g = oracle.constraints(&x, &inputs.p)?;
        let dual_x = bound_multipliers(oracle, &x, inputs, &lambda)?;
        let elapsed = started.elapsed();

        debug!(
            component = "alm",
            operation = "solve",
            status = "success",
            termination = termination.as_str(),
            outer_iterations = outer,
            inner_iterations = inner_total,
            objective = f,
            duration_ms = elapsed.as_millis() as u64,
            "Augmented Lagrangian solve finished"
        );

        Ok(Solution {
            status: termination.status(),
            x,
            f,
            g,
            dual_g: lambda,
            dual_x,
            iterations: outer,
            solve_time_seconds: elapsed.as_secs_f64(),
        })
    }
}

/// `‖g - proj_[lbg, ubg](g)‖∞`.
fn bound_violation(g: &[f64], lower: &[f64], upper: &[f64]) -> f64 {
    g.iter()
        .zip(lower.iter().zip(upper))
        .map(|(&gi, (&lo, &hi))| (gi - gi.max(lo).min(hi)).abs())
        .fold(0.0, f64::max)
}

/// Wall-clock budget for a `time_limit` in seconds. Negative limits count as
/// zero; NaN, infinite and unrepresentable limits mean no deadline.
fn time_limit_duration(seconds: f64) -> Option<Duration> {
    if seconds.is_nan() {
        return None;
    }
    Duration::try_from_secs_f64(seconds.max(0.0)).ok()
}

/// `∇f + Jᵀλ`.
fn lagrangian_gradient(
    oracle: &NlpOracle,
    x: &[f64],
    inputs: &NlpInputs,
    lambda: &[f64],
) -> Result<Vec<f64>, SolverError> {
    let mut grad = oracle.gradient(x, &inputs.p)?;
    if oracle.n_g() > 0 {
        let jt_lambda = oracle.jacobian_transpose_product(x, &inputs.p, lambda)?;
        for (gi, extra) in grad.iter_mut().zip(jt_lambda) {
            *gi += extra;
        }
    }
    Ok(grad)
}

fn stationarity(
    oracle: &NlpOracle,
    x: &[f64],
    inputs: &NlpInputs,
    lambda: &[f64],
) -> Result<f64, SolverError> {
    let grad = lagrangian_gradient(oracle, x, inputs, lambda)?;
    Ok(spg::projected_gradient_norm(
        x,
        &grad,
        &inputs.lbx,
        &inputs.ubx,
    ))
}

/// Variable-bound multipliers: `-(∇f + Jᵀλ)` where a bound is active and
/// the residual pushes into it, zero elsewhere.
fn bound_multipliers(
    oracle: &NlpOracle,
    x: &[f64],
    inputs: &NlpInputs,
    lambda: &[f64],
) -> Result<Vec<f64>, SolverError> {
    let grad = lagrangian_gradient(oracle, x, inputs, lambda)?;
    Ok(x
        .iter()
        .zip(grad)
        .zip(inputs.lbx.iter().zip(&inputs.ubx))
        .map(|((&xi, ri), (&lo, &hi))| {
            let at_lower = lo.is_finite() && (xi - lo).abs() <= 1e-8 * lo.abs().max(1.0);
            let at_upper = hi.is_finite() && (xi - hi).abs() <= 1e-8 * hi.abs().max(1.0);
            if (at_lower && ri > 0.0) || (at_upper && ri < 0.0) {
                -ri
            } else {
                0.0
            }
        })
        .collect())
}
