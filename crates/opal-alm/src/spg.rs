//! Spectral projected gradient on a box.
//!
//! Barzilai-Borwein step lengths with monotone Armijo backtracking along the
//! projected direction.

use std::time::Instant;

use opal_solver::{NlpOracle, SolverError};

const MIN_STEP: f64 = 1e-30;
const MAX_STEP: f64 = 1e30;
const MAX_BACKTRACKS: usize = 150;
pub(crate) const UNBOUNDED_OBJECTIVE: f64 = -1e20;

/// Shifted quadratic penalty of two-sided constraints:
/// `f(x) + rho/2 * sum dist(g(x) + lambda/rho, [lbg, ubg])^2`.
pub(crate) struct Merit<'a> {
    pub(crate) oracle: &'a NlpOracle,
    pub(crate) p: &'a [f64],
    pub(crate) lbg: &'a [f64],
    pub(crate) ubg: &'a [f64],
    pub(crate) lambda: &'a [f64],
    pub(crate) rho: f64,
}

impl Merit<'_> {
    /// `rho * (z - proj(z))` with `z = g + lambda / rho`.
    pub(crate) fn shifted_multipliers(&self, g: &[f64]) -> Vec<f64> {
        g.iter()
            .enumerate()
            .map(|(i, &gi)| {
                let z = gi + self.lambda[i] / self.rho;
                self.rho * (z - z.max(self.lbg[i]).min(self.ubg[i]))
            })
            .collect()
    }

    pub(crate) fn value(&self, x: &[f64]) -> Result<f64, SolverError> {
        let f = self.oracle.objective(x, self.p)?;
        if self.oracle.n_g() == 0 {
            return Ok(f);
        }
        let g = self.oracle.constraints(x, self.p)?;
        let penalty: f64 = self
            .shifted_multipliers(&g)
            .iter()
            .map(|mu| mu * mu)
            .sum::<f64>()
            / (2.0 * self.rho);
        Ok(f + penalty)
    }

    pub(crate) fn gradient(&self, x: &[f64]) -> Result<Vec<f64>, SolverError> {
        let mut grad = self.oracle.gradient(x, self.p)?;
        if self.oracle.n_g() == 0 {
            return Ok(grad);
        }
        let g = self.oracle.constraints(x, self.p)?;
        let mu = self.shifted_multipliers(&g);
        let jt_mu = self.oracle.jacobian_transpose_product(x, self.p, &mu)?;
        for (gi, extra) in grad.iter_mut().zip(jt_mu) {
            *gi += extra;
        }
        Ok(grad)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum InnerStop {
    Converged,
    IterationLimit,
    /// Line search could not make progress.
    Stalled,
    NonFinite,
    Unbounded,
    TimeLimit,
}

#[derive(Debug, Clone, Copy)]
pub(crate) struct InnerOutcome {
    pub(crate) stop: InnerStop,
    pub(crate) iterations: usize,
    pub(crate) projected_gradient: f64,
}

pub(crate) struct InnerSettings {
    pub(crate) tolerance: f64,
    pub(crate) max_iterations: usize,
    pub(crate) armijo: f64,
    pub(crate) deadline: Option<Instant>,
}

pub(crate) fn project(x: &mut [f64], lower: &[f64], upper: &[f64]) {
    for ((xi, &lo), &hi) in x.iter_mut().zip(lower).zip(upper) {
        *xi = xi.max(lo).min(hi);
    }
}

/// `‖proj(x - grad) - x‖∞`.
pub(crate) fn projected_gradient_norm(x: &[f64], grad: &[f64], lower: &[f64], upper: &[f64]) -> f64 {
    x.iter()
        .zip(grad)
        .zip(lower.iter().zip(upper))
        .map(|((&xi, &gi), (&lo, &hi))| ((xi - gi).max(lo).min(hi) - xi).abs())
        .fold(0.0, f64::max)
}

fn dot(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

/// Minimize `merit` over `[lower, upper]` starting from `x`, in place.
pub(crate) fn minimize(
    merit: &Merit<'_>,
    x: &mut Vec<f64>,
    lower: &[f64],
    upper: &[f64],
    settings: &InnerSettings,
) -> Result<InnerOutcome, SolverError> {
    project(x, lower, upper);
    let mut value = merit.value(x)?;
    let mut grad = merit.gradient(x)?;
    let mut pg = projected_gradient_norm(x, &grad, lower, upper);
    let mut step = if pg > 0.0 { (1.0 / pg).clamp(MIN_STEP, MAX_STEP) } else { 1.0 };

    let outcome = |stop, iterations, projected_gradient| InnerOutcome {
        stop,
        iterations,
        projected_gradient,
    };

    for iteration in 0..settings.max_iterations {
        if !value.is_finite() || grad.iter().any(|g| !g.is_finite()) {
            return Ok(outcome(InnerStop::NonFinite, iteration, pg));
        }
        if value < UNBOUNDED_OBJECTIVE {
            return Ok(outcome(InnerStop::Unbounded, iteration, pg));
        }
        if pg <= settings.tolerance {
            return Ok(outcome(InnerStop::Converged, iteration, pg));
        }
        if settings.deadline.is_some_and(|deadline| Instant::now() >= deadline) {
            return Ok(outcome(InnerStop::TimeLimit, iteration, pg));
        }

        let direction: Vec<f64> = x
            .iter()
            .zip(&grad)
            .zip(lower.iter().zip(upper))
            .map(|((&xi, &gi), (&lo, &hi))| (xi - step * gi).max(lo).min(hi) - xi)
            .collect();
        let slope = dot(&grad, &direction);

        let mut t = 1.0;
        let mut accepted = None;
        for _ in 0..MAX_BACKTRACKS {
            let trial: Vec<f64> = x
                .iter()
                .zip(&direction)
                .map(|(xi, di)| xi + t * di)
                .collect();
            let trial_value = merit.value(&trial)?;
            if trial_value <= value + settings.armijo * t * slope {
                accepted = Some((trial, trial_value));
                break;
            }
            t *= 0.5;
        }
        let Some((trial, trial_value)) = accepted else {
            return Ok(outcome(InnerStop::Stalled, iteration, pg));
        };

        let trial_grad = merit.gradient(&trial)?;
        let s: Vec<f64> = trial.iter().zip(x.iter()).map(|(a, b)| a - b).collect();
        let y: Vec<f64> = trial_grad.iter().zip(&grad).map(|(a, b)| a - b).collect();
        let sty = dot(&s, &y);
        step = if sty > 0.0 {
            (dot(&s, &s) / sty).clamp(MIN_STEP, MAX_STEP)
        } else {
            MAX_STEP
        };

        *x = trial;
        value = trial_value;
        grad = trial_grad;
        pg = projected_gradient_norm(x, &grad, lower, upper);
    }

    Ok(outcome(InnerStop::IterationLimit, settings.max_iterations, pg))
}

#[cfg(test)]
mod tests {
    use super::*;
    use opal_expr::{Graph, MatrixExpr};
    use opal_solver::Nlp;

    fn quadratic_oracle() -> NlpOracle {
        let g = Graph::new();
        let x = MatrixExpr::sym(&g, "x", 2, 1);
        let target = MatrixExpr::from_values(
            &g,
            &opal_expr::DenseMatrix::column(vec![3.0, -1.0]),
        );
        let diff = x.sub(&target).unwrap();
        let weights = MatrixExpr::from_values(&g, &opal_expr::DenseMatrix::column(vec![1.0, 10.0]));
        NlpOracle::new(&Nlp {
            f: diff.sq().dot(&weights).unwrap(),
            x,
            p: MatrixExpr::empty(&g),
            g: MatrixExpr::empty(&g),
        })
        .unwrap()
    }

    fn settings() -> InnerSettings {
        InnerSettings {
            tolerance: 1e-9,
            max_iterations: 500,
            armijo: 1e-4,
            deadline: None,
        }
    }

    #[test]
    fn unconstrained_quadratic_converges() {
        let oracle = quadratic_oracle();
        let merit = Merit {
            oracle: &oracle,
            p: &[],
            lbg: &[],
            ubg: &[],
            lambda: &[],
            rho: 1.0,
        };
        let mut x = vec![0.0, 0.0];
        let inf = f64::INFINITY;
        let outcome = minimize(&merit, &mut x, &[-inf, -inf], &[inf, inf], &settings()).unwrap();
        assert_eq!(outcome.stop, InnerStop::Converged);
        assert!((x[0] - 3.0).abs() < 1e-6);
        assert!((x[1] + 1.0).abs() < 1e-6);
    }

    #[test]
    fn box_is_respected() {
        let oracle = quadratic_oracle();
        let merit = Merit {
            oracle: &oracle,
            p: &[],
            lbg: &[],
            ubg: &[],
            lambda: &[],
            rho: 1.0,
        };
        let mut x = vec![0.0, 0.0];
        let outcome = minimize(&merit, &mut x, &[0.0, 0.0], &[2.0, 5.0], &settings()).unwrap();
        assert_eq!(outcome.stop, InnerStop::Converged);
        assert!((x[0] - 2.0).abs() < 1e-9);
        assert!(x[1].abs() < 1e-9);
    }

    #[test]
    fn projection_and_norm() {
        let mut x = vec![-1.0, 0.5, 4.0];
        project(&mut x, &[0.0, 0.0, 0.0], &[1.0, 1.0, 3.0]);
        assert_eq!(x, vec![0.0, 0.5, 3.0]);
        // gradient pushing into an active bound does not count
        let norm = projected_gradient_norm(&[0.0, 0.5], &[1.0, 0.25], &[0.0, 0.0], &[1.0, 1.0]);
        assert!((norm - 0.25).abs() < 1e-15);
    }
}
