//! Nonlinear program description and its compiled first-order oracle.

use std::time::Instant;

use opal_expr::{gradient, jacobian, DenseMatrix, Function, MatrixExpr};
use tracing::debug;

use crate::SolverError;

/// `minimize f(x, p) subject to lbg <= g(x, p) <= ubg, lbx <= x <= ubx`.
///
/// `x` and `p` must be purely symbolic; `p` and `g` may be 0x0.
#[derive(Debug, Clone)]
pub struct Nlp {
    pub x: MatrixExpr,
    pub p: MatrixExpr,
    pub f: MatrixExpr,
    pub g: MatrixExpr,
}

/// Compiled numeric callables handed to a solver adapter.
///
/// All vectors are flattened column-major in the order of `Nlp::x` / `Nlp::p`.
#[derive(Debug, Clone)]
pub struct NlpOracle {
    n_x: usize,
    n_p: usize,
    n_g: usize,
    objective: Function,
    gradient: Function,
    constraints: Function,
    constraint_jacobian: Function,
}

impl NlpOracle {
    pub fn new(nlp: &Nlp) -> Result<Self, SolverError> {
        let started = Instant::now();
        if nlp.x.is_empty() {
            return Err(SolverError::EmptyProblem);
        }
        if !nlp.f.is_scalar() {
            return Err(SolverError::DimensionMismatch {
                what: "objective",
                expected: 1,
                actual: nlp.f.numel(),
            });
        }

        let x = nlp.x.vec();
        let p = nlp.p.vec();
        let g = nlp.g.vec();
        let args = [x.clone(), p.clone()];
        let names = ["x", "p"];

        let grad = gradient(&nlp.f, &x).map_err(opal_expr::FunctionError::from)?;
        let jac_g = jacobian(&g, std::slice::from_ref(&x))
            .map_err(opal_expr::FunctionError::from)?
            .into_matrix();

        let objective = Function::with_names("nlp_f", &args, &names, &[nlp.f.clone()], &["f"])?;
        let gradient = Function::with_names("nlp_grad_f", &args, &names, &[grad], &["grad_f"])?;
        let constraints = Function::with_names("nlp_g", &args, &names, &[g], &["g"])?;
        let constraint_jacobian =
            Function::with_names("nlp_jac_g", &args, &names, &[jac_g], &["jac_g"])?;

        let oracle = Self {
            n_x: x.numel(),
            n_p: p.numel(),
            n_g: constraints.flat_output_len(),
            objective,
            gradient,
            constraints,
            constraint_jacobian,
        };

        debug!(
            component = "solver",
            operation = "compile_oracle",
            status = "success",
            n_x = oracle.n_x,
            n_p = oracle.n_p,
            n_g = oracle.n_g,
            instructions = oracle.objective.n_instructions()
                + oracle.gradient.n_instructions()
                + oracle.constraints.n_instructions()
                + oracle.constraint_jacobian.n_instructions(),
            duration_ms = started.elapsed().as_millis() as u64,
            "Compiled NLP oracle"
        );
        Ok(oracle)
    }

    pub fn n_x(&self) -> usize {
        self.n_x
    }

    pub fn n_p(&self) -> usize {
        self.n_p
    }

    pub fn n_g(&self) -> usize {
        self.n_g
    }

    fn args(&self, x: &[f64], p: &[f64]) -> Result<Vec<f64>, SolverError> {
        if x.len() != self.n_x {
            return Err(SolverError::DimensionMismatch {
                what: "x",
                expected: self.n_x,
                actual: x.len(),
            });
        }
        if p.len() != self.n_p {
            return Err(SolverError::DimensionMismatch {
                what: "p",
                expected: self.n_p,
                actual: p.len(),
            });
        }
        let mut flat = Vec::with_capacity(x.len() + p.len());
        flat.extend_from_slice(x);
        flat.extend_from_slice(p);
        Ok(flat)
    }

    /// `f(x, p)`.
    pub fn objective(&self, x: &[f64], p: &[f64]) -> Result<f64, SolverError> {
        let values = self.objective.evaluate_flat(&self.args(x, p)?)?;
        Ok(values[0])
    }

    /// `∇f(x, p)`, length `n_x`.
    pub fn gradient(&self, x: &[f64], p: &[f64]) -> Result<Vec<f64>, SolverError> {
        Ok(self.gradient.evaluate_flat(&self.args(x, p)?)?)
    }

    /// `g(x, p)`, length `n_g`.
    pub fn constraints(&self, x: &[f64], p: &[f64]) -> Result<Vec<f64>, SolverError> {
        Ok(self.constraints.evaluate_flat(&self.args(x, p)?)?)
    }

    /// `∂g/∂x`, an `n_g x n_x` dense matrix.
    pub fn constraint_jacobian(&self, x: &[f64], p: &[f64]) -> Result<DenseMatrix, SolverError> {
        let data = self.constraint_jacobian.evaluate_flat(&self.args(x, p)?)?;
        DenseMatrix::from_column_major(self.n_g, self.n_x, data).ok_or_else(|| {
            SolverError::InternalError("constraint Jacobian has the wrong size".to_string())
        })
    }

    /// `(∂g/∂x)ᵀ v`, length `n_x`.
    pub fn jacobian_transpose_product(
        &self,
        x: &[f64],
        p: &[f64],
        v: &[f64],
    ) -> Result<Vec<f64>, SolverError> {
        if v.len() != self.n_g {
            return Err(SolverError::DimensionMismatch {
                what: "multipliers",
                expected: self.n_g,
                actual: v.len(),
            });
        }
        let jac = self.constraint_jacobian(x, p)?;
        let data = jac.data();
        Ok((0..self.n_x)
            .map(|col| {
                let column = &data[col * self.n_g..(col + 1) * self.n_g];
                column.iter().zip(v).map(|(a, b)| a * b).sum()
            })
            .collect())
    }
}
