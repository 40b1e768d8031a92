//! Adapter-specific options.

use opal_solver::SolverError;

/// Tuning knobs of the augmented Lagrangian method.
///
/// Generic limits (iterations, tolerances, time) come from
/// `opal_solver::SolverConfig` and override the defaults here.
#[derive(Debug, Clone, PartialEq)]
pub struct AlmOptions {
    /// Penalty parameter for the first outer iteration.
    pub initial_penalty: f64,
    /// Factor applied when the violation does not shrink enough.
    pub penalty_growth: f64,
    /// Largest penalty tried before declaring the problem infeasible.
    pub max_penalty: f64,
    /// Required violation reduction per outer iteration (ratio).
    pub violation_decrease: f64,
    /// Cap on projected-gradient iterations per outer iteration.
    pub max_inner_iterations: usize,
    /// Sufficient-decrease constant of the backtracking line search.
    pub armijo: f64,
    pub max_outer_iterations: usize,
    pub tolerance: f64,
    pub constraint_tolerance: f64,
}

impl Default for AlmOptions {
    fn default() -> Self {
        Self {
            initial_penalty: 10.0,
            penalty_growth: 10.0,
            max_penalty: 1e8,
            violation_decrease: 0.25,
            max_inner_iterations: 5000,
            armijo: 1e-4,
            max_outer_iterations: 100,
            tolerance: 1e-6,
            constraint_tolerance: 1e-6,
        }
    }
}

impl AlmOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_initial_penalty(mut self, penalty: f64) -> Self {
        self.initial_penalty = penalty;
        self
    }

    pub fn with_penalty_growth(mut self, growth: f64) -> Self {
        self.penalty_growth = growth;
        self
    }

    pub fn with_max_penalty(mut self, penalty: f64) -> Self {
        self.max_penalty = penalty;
        self
    }

    pub fn with_max_inner_iterations(mut self, iterations: usize) -> Self {
        self.max_inner_iterations = iterations;
        self
    }

    /// Reject values the method cannot run with.
    ///
    /// Penalties must be finite and positive, growth above one, and the
    /// Armijo constant inside `(0, 1)`.
    pub fn validate(&self) -> Result<(), SolverError> {
        let invalid = |name: &'static str, value: f64| SolverError::InvalidOption { name, value };
        if !self.initial_penalty.is_finite() || self.initial_penalty <= 0.0 {
            return Err(invalid("initial_penalty", self.initial_penalty));
        }
        if !self.penalty_growth.is_finite() || self.penalty_growth <= 1.0 {
            return Err(invalid("penalty_growth", self.penalty_growth));
        }
        if self.max_penalty.is_nan() || self.max_penalty < self.initial_penalty {
            return Err(invalid("max_penalty", self.max_penalty));
        }
        if self.armijo.is_nan() || self.armijo <= 0.0 || self.armijo >= 1.0 {
            return Err(invalid("armijo", self.armijo));
        }
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::float_cmp)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let options = AlmOptions::new();
        assert_eq!(options.initial_penalty, 10.0);
        assert_eq!(options.max_penalty, 1e8);
        assert_eq!(options.max_outer_iterations, 100);
    }

    #[test]
    fn builder() {
        let options = AlmOptions::new()
            .with_initial_penalty(1.0)
            .with_penalty_growth(5.0)
            .with_max_penalty(1e4)
            .with_max_inner_iterations(10);
        assert_eq!(options.initial_penalty, 1.0);
        assert_eq!(options.penalty_growth, 5.0);
        assert_eq!(options.max_penalty, 1e4);
        assert_eq!(options.max_inner_iterations, 10);
    }

    #[test]
    fn defaults_are_valid() {
        assert!(AlmOptions::new().validate().is_ok());
    }

    #[test]
    fn non_positive_penalty_is_rejected() {
        for penalty in [0.0, -1.0, f64::NAN, f64::INFINITY] {
            let err = AlmOptions::new()
                .with_initial_penalty(penalty)
                .validate()
                .unwrap_err();
            assert_eq!(err.code(), "SOLVER_INVALID_OPTION");
        }
    }

    #[test]
    fn growth_must_exceed_one() {
        let err = AlmOptions::new()
            .with_penalty_growth(1.0)
            .validate()
            .unwrap_err();
        assert!(matches!(
            err,
            SolverError::InvalidOption {
                name: "penalty_growth",
                ..
            }
        ));
        assert!(AlmOptions::new().with_penalty_growth(1.5).validate().is_ok());
    }

    #[test]
    fn max_penalty_below_initial_is_rejected() {
        let err = AlmOptions::new()
            .with_initial_penalty(100.0)
            .with_max_penalty(10.0)
            .validate()
            .unwrap_err();
        assert!(matches!(
            err,
            SolverError::InvalidOption {
                name: "max_penalty",
                ..
            }
        ));
    }
}
