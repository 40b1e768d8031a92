//! Opti-style problem builder.
//!
//! A [`Problem`] owns a [`Graph`] and accumulates declarations against it:
//! decision variables, parameters, one scalar objective and constraint
//! blocks. Solving flattens the declarations into an `opal_solver::Nlp`,
//! compiles it once and hands numeric bounds, initial guesses and parameter
//! values to a solver adapter.
//!
//! # Module Organization
//!
//! - [`error`]: Problem error types
//! - [`builder`]: Declarations (variables, parameters, objective, constraints)
//! - [`solve`]: Flattening, compilation and the solver call
//! - [`solution`]: Results mapped back onto declared expressions

mod builder;
mod error;
mod solution;
mod solve;

use opal_expr::{vertcat, DenseMatrix, Graph, MatrixExpr, Relation, SymbolId};
use opal_solver::{NlpOracle, NlpSolver, SolverConfig};

pub use error::ModelError;
pub use solution::ProblemSolution;

#[derive(Debug, Clone)]
pub(crate) struct VariableDecl {
    pub(crate) symbol: SymbolId,
    pub(crate) expr: MatrixExpr,
    /// First index in the flattened variable vector.
    pub(crate) offset: usize,
    pub(crate) lower: Vec<f64>,
    pub(crate) upper: Vec<f64>,
    pub(crate) initial: Vec<f64>,
}

#[derive(Debug, Clone)]
pub(crate) struct ParameterDecl {
    pub(crate) symbol: SymbolId,
    pub(crate) expr: MatrixExpr,
    pub(crate) value: DenseMatrix,
}

#[derive(Debug, Clone)]
pub(crate) struct ConstraintBlock {
    /// Flattened constraint expression.
    pub(crate) expr: MatrixExpr,
    pub(crate) shape: (usize, usize),
    pub(crate) lower: Vec<f64>,
    pub(crate) upper: Vec<f64>,
    pub(crate) relation: Relation,
    /// First index in the stacked constraint vector.
    pub(crate) offset: usize,
}

/// Handle to one constraint block, returned by `subject_to`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConstraintHandle(pub(crate) usize);

impl ConstraintHandle {
    pub fn index(self) -> usize {
        self.0
    }
}

/// Nonlinear program under construction.
pub struct Problem {
    pub(crate) graph: Graph,
    pub(crate) variables: Vec<VariableDecl>,
    pub(crate) parameters: Vec<ParameterDecl>,
    pub(crate) objective: Option<MatrixExpr>,
    pub(crate) constraints: Vec<ConstraintBlock>,
    pub(crate) n_x: usize,
    pub(crate) n_g: usize,
    solver: Option<Box<dyn NlpSolver>>,
    config: SolverConfig,
    /// Compiled on the first solve; its presence freezes the structure.
    pub(crate) oracle: Option<NlpOracle>,
}

impl Default for Problem {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Problem {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Problem")
            .field("variables", &self.n_x)
            .field("parameters", &self.n_p())
            .field("constraints", &self.n_g)
            .field("has_objective", &self.objective.is_some())
            .field("solver", &self.solver.as_ref().map(|s| s.name().to_string()))
            .field("frozen", &self.is_frozen())
            .finish()
    }
}

impl Problem {
    /// Create an empty problem over a fresh graph.
    pub fn new() -> Self {
        Self::with_graph(Graph::new())
    }

    /// Create an empty problem that declares its symbols in `graph`.
    pub fn with_graph(graph: Graph) -> Self {
        Self {
            graph,
            variables: Vec::new(),
            parameters: Vec::new(),
            objective: None,
            constraints: Vec::new(),
            n_x: 0,
            n_g: 0,
            solver: None,
            config: SolverConfig::new(),
            oracle: None,
        }
    }

    pub fn graph(&self) -> &Graph {
        &self.graph
    }

    /// Set the solver adapter used by [`Problem::solve`].
    pub fn solver(&mut self, adapter: impl NlpSolver + 'static) {
        self.solver = Some(Box::new(adapter));
    }

    pub fn has_solver(&self) -> bool {
        self.solver.is_some()
    }

    pub fn config(&self) -> &SolverConfig {
        &self.config
    }

    /// Set the generic solver configuration for the next solves.
    pub fn set_config(&mut self, config: SolverConfig) {
        self.config = config;
    }

    /// Whether structural declarations are still accepted.
    pub fn is_frozen(&self) -> bool {
        self.oracle.is_some()
    }

    // ── Accessors ───────────────────────────────────────────

    /// Objective expression, if set.
    pub fn f(&self) -> Option<&MatrixExpr> {
        self.objective.as_ref()
    }

    /// All constraint blocks, flattened and stacked.
    pub fn g(&self) -> Result<MatrixExpr, ModelError> {
        let parts: Vec<MatrixExpr> = self.constraints.iter().map(|c| c.expr.clone()).collect();
        Ok(vertcat(&self.graph, &parts)?)
    }

    /// All variables, flattened in declaration order.
    pub fn x(&self) -> Result<MatrixExpr, ModelError> {
        let parts: Vec<MatrixExpr> = self.variables.iter().map(|v| v.expr.vec()).collect();
        Ok(vertcat(&self.graph, &parts)?)
    }

    /// All parameters, flattened in declaration order.
    pub fn p(&self) -> Result<MatrixExpr, ModelError> {
        let parts: Vec<MatrixExpr> = self.parameters.iter().map(|p| p.expr.vec()).collect();
        Ok(vertcat(&self.graph, &parts)?)
    }

    pub fn lbg(&self) -> Vec<f64> {
        self.constraints
            .iter()
            .flat_map(|c| c.lower.iter().copied())
            .collect()
    }

    pub fn ubg(&self) -> Vec<f64> {
        self.constraints
            .iter()
            .flat_map(|c| c.upper.iter().copied())
            .collect()
    }

    pub fn lbx(&self) -> Vec<f64> {
        self.variables
            .iter()
            .flat_map(|v| v.lower.iter().copied())
            .collect()
    }

    pub fn ubx(&self) -> Vec<f64> {
        self.variables
            .iter()
            .flat_map(|v| v.upper.iter().copied())
            .collect()
    }

    pub fn x0(&self) -> Vec<f64> {
        self.variables
            .iter()
            .flat_map(|v| v.initial.iter().copied())
            .collect()
    }

    /// Current parameter values, flattened in declaration order.
    pub fn parameter_values(&self) -> Vec<f64> {
        self.parameters
            .iter()
            .flat_map(|p| p.value.data().iter().copied())
            .collect()
    }

    /// Number of scalar decision variables.
    pub fn n_x(&self) -> usize {
        self.n_x
    }

    /// Number of scalar parameters.
    pub fn n_p(&self) -> usize {
        self.parameters.iter().map(|p| p.value.len()).sum()
    }

    /// Number of scalar constraints.
    pub fn n_g(&self) -> usize {
        self.n_g
    }

    pub fn num_variable_blocks(&self) -> usize {
        self.variables.len()
    }

    pub fn num_parameter_blocks(&self) -> usize {
        self.parameters.len()
    }

    pub fn num_constraint_blocks(&self) -> usize {
        self.constraints.len()
    }

    /// Relation of a constraint block as declared.
    pub fn constraint_relation(&self, handle: ConstraintHandle) -> Option<Relation> {
        self.constraints.get(handle.0).map(|c| c.relation)
    }

    // ── Lookups ─────────────────────────────────────────────

    pub(crate) fn variable_index(&self, var: &MatrixExpr) -> Result<usize, ModelError> {
        if !var.graph().same(&self.graph) {
            return Err(ModelError::UnknownVariable);
        }
        let symbol = var.as_symbol().ok_or(ModelError::UnknownVariable)?;
        self.variables
            .iter()
            .position(|v| v.symbol == symbol)
            .ok_or(ModelError::UnknownVariable)
    }

    pub(crate) fn parameter_index(&self, param: &MatrixExpr) -> Result<usize, ModelError> {
        if !param.graph().same(&self.graph) {
            return Err(ModelError::UnknownParameter);
        }
        let symbol = param.as_symbol().ok_or(ModelError::UnknownParameter)?;
        self.parameters
            .iter()
            .position(|p| p.symbol == symbol)
            .ok_or(ModelError::UnknownParameter)
    }

    /// Every symbol of `expr` must be declared here, in this graph.
    pub(crate) fn ensure_declared(&self, expr: &MatrixExpr) -> Result<(), ModelError> {
        if !expr.graph().same(&self.graph) {
            return Err(opal_expr::ExprError::ForeignGraph.into());
        }
        for (symbol, info) in expr.symbols() {
            let declared = self.variables.iter().any(|v| v.symbol == symbol)
                || self.parameters.iter().any(|p| p.symbol == symbol);
            if !declared {
                return Err(ModelError::UndeclaredSymbol { name: info.name });
            }
        }
        Ok(())
    }

    pub(crate) fn ensure_open(&self, operation: &'static str) -> Result<(), ModelError> {
        if self.is_frozen() {
            return Err(ModelError::StructureFrozen { operation });
        }
        Ok(())
    }

    pub(crate) fn take_solver(&mut self) -> Option<Box<dyn NlpSolver>> {
        self.solver.take()
    }

    pub(crate) fn restore_solver(&mut self, solver: Box<dyn NlpSolver>) {
        self.solver = Some(solver);
    }
}
