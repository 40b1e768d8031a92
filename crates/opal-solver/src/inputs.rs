//! Numeric inputs for one solve: initial guess, bounds, parameter values.

use crate::{NlpOracle, SolverError};

#[derive(Debug, Clone, PartialEq)]
pub struct NlpInputs {
    pub x0: Vec<f64>,
    pub lbx: Vec<f64>,
    pub ubx: Vec<f64>,
    pub lbg: Vec<f64>,
    pub ubg: Vec<f64>,
    pub p: Vec<f64>,
}

impl NlpInputs {
    /// Zero initial guess and parameters, no bounds, sized for `oracle`.
    pub fn unbounded(oracle: &NlpOracle) -> Self {
        Self {
            x0: vec![0.0; oracle.n_x()],
            lbx: vec![f64::NEG_INFINITY; oracle.n_x()],
            ubx: vec![f64::INFINITY; oracle.n_x()],
            lbg: vec![f64::NEG_INFINITY; oracle.n_g()],
            ubg: vec![f64::INFINITY; oracle.n_g()],
            p: vec![0.0; oracle.n_p()],
        }
    }

    /// Check sizes against `oracle` and that every bound pair is ordered.
    pub fn validate(&self, oracle: &NlpOracle) -> Result<(), SolverError> {
        let sizes = [
            ("x0", &self.x0, oracle.n_x()),
            ("lbx", &self.lbx, oracle.n_x()),
            ("ubx", &self.ubx, oracle.n_x()),
            ("lbg", &self.lbg, oracle.n_g()),
            ("ubg", &self.ubg, oracle.n_g()),
            ("p", &self.p, oracle.n_p()),
        ];
        for (what, values, expected) in sizes {
            if values.len() != expected {
                return Err(SolverError::DimensionMismatch {
                    what,
                    expected,
                    actual: values.len(),
                });
            }
        }
        check_bounds("x", &self.lbx, &self.ubx)?;
        check_bounds("g", &self.lbg, &self.ubg)?;
        Ok(())
    }
}

fn check_bounds(what: &'static str, lower: &[f64], upper: &[f64]) -> Result<(), SolverError> {
    for (index, (&lo, &hi)) in lower.iter().zip(upper).enumerate() {
        // NaN fails the comparison too
        if !(lo <= hi) {
            return Err(SolverError::InvalidBounds {
                what,
                index,
                lower: lo,
                upper: hi,
            });
        }
    }
    Ok(())
}
