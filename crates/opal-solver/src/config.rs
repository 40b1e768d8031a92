//! Solver configuration types.

/// Configuration options for solver behavior.
///
/// Every field is optional; `None` leaves the choice to the adapter.
#[derive(Debug, Clone, Default)]
pub struct SolverConfig {
    /// Time limit in seconds. `None` means no limit.
    pub time_limit: Option<f64>,
    /// Maximum number of (outer) iterations. `None` uses solver default.
    pub max_iterations: Option<usize>,
    /// Optimality tolerance. `None` uses solver default.
    pub tolerance: Option<f64>,
    /// Constraint violation tolerance. `None` uses solver default.
    pub constraint_tolerance: Option<f64>,
    /// Verbosity level. `None` uses solver default.
    pub verbosity: Option<u32>,
}

impl SolverConfig {
    /// Create a new configuration with all defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the time limit in seconds.
    pub fn with_time_limit(mut self, seconds: f64) -> Self {
        self.time_limit = Some(seconds);
        self
    }

    /// Set the iteration cap.
    pub fn with_max_iterations(mut self, iterations: usize) -> Self {
        self.max_iterations = Some(iterations);
        self
    }

    /// Set the optimality tolerance.
    pub fn with_tolerance(mut self, tol: f64) -> Self {
        self.tolerance = Some(tol);
        self
    }

    /// Set the constraint violation tolerance.
    pub fn with_constraint_tolerance(mut self, tol: f64) -> Self {
        self.constraint_tolerance = Some(tol);
        self
    }

    /// Set the verbosity level.
    pub fn with_verbosity(mut self, level: u32) -> Self {
        self.verbosity = Some(level);
        self
    }

    /// Check if this configuration is completely empty (all defaults).
    pub fn is_empty(&self) -> bool {
        self.time_limit.is_none()
            && self.max_iterations.is_none()
            && self.tolerance.is_none()
            && self.constraint_tolerance.is_none()
            && self.verbosity.is_none()
    }
}
