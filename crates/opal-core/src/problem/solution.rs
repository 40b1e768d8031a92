//! Results of a problem solve, mapped back onto declared expressions.

use opal_expr::{DenseMatrix, ExprError, Function, Graph, MatrixExpr, SymbolId};
use opal_solver::{Solution, SolverError, SolverStatus};

use crate::problem::{ConstraintHandle, ModelError, Problem};

/// Read-only result of [`Problem::solve`].
///
/// Holds the raw [`Solution`] together with the layout it was produced
/// from, so values survive later changes to the problem.
#[derive(Debug, Clone)]
pub struct ProblemSolution {
    solution: Solution,
    graph: Graph,
    variables: Vec<(SymbolId, MatrixExpr, usize)>,
    parameters: Vec<(SymbolId, MatrixExpr, DenseMatrix)>,
    constraints: Vec<(usize, (usize, usize))>,
}

impl ProblemSolution {
    pub(crate) fn new(problem: &Problem, solution: Solution) -> Self {
        Self {
            solution,
            graph: problem.graph.clone(),
            variables: problem
                .variables
                .iter()
                .map(|v| (v.symbol, v.expr.clone(), v.offset))
                .collect(),
            parameters: problem
                .parameters
                .iter()
                .map(|p| (p.symbol, p.expr.clone(), p.value.clone()))
                .collect(),
            constraints: problem
                .constraints
                .iter()
                .map(|c| (c.offset, c.shape))
                .collect(),
        }
    }

    pub fn status(&self) -> SolverStatus {
        self.solution.status
    }

    pub fn objective_value(&self) -> f64 {
        self.solution.f
    }

    pub fn iterations(&self) -> usize {
        self.solution.iterations
    }

    pub fn solve_time_seconds(&self) -> f64 {
        self.solution.solve_time_seconds
    }

    /// Raw adapter result in flattening order.
    pub fn solution(&self) -> &Solution {
        &self.solution
    }

    pub fn into_solution(self) -> Solution {
        self.solution
    }

    fn variable_slot(&self, var: &MatrixExpr) -> Result<(usize, (usize, usize)), ModelError> {
        if !var.graph().same(&self.graph) {
            return Err(ModelError::UnknownVariable);
        }
        let symbol = var.as_symbol().ok_or(ModelError::UnknownVariable)?;
        self.variables
            .iter()
            .find(|(s, _, _)| *s == symbol)
            .map(|(_, expr, offset)| (*offset, expr.shape()))
            .ok_or(ModelError::UnknownVariable)
    }

    /// Optimal values of a declared variable.
    pub fn value_of(&self, var: &MatrixExpr) -> Result<DenseMatrix, ModelError> {
        let (offset, (rows, cols)) = self.variable_slot(var)?;
        let data = block("x", &self.solution.x, offset, rows * cols)?;
        Ok(matrix(rows, cols, data))
    }

    /// Bound multipliers of a declared variable.
    pub fn bound_dual_of(&self, var: &MatrixExpr) -> Result<DenseMatrix, ModelError> {
        let (offset, (rows, cols)) = self.variable_slot(var)?;
        let data = block("dual_x", &self.solution.dual_x, offset, rows * cols)?;
        Ok(matrix(rows, cols, data))
    }

    /// Multipliers of a constraint block, shaped like its expression.
    pub fn dual_of(&self, handle: ConstraintHandle) -> Option<DenseMatrix> {
        let &(offset, (rows, cols)) = self.constraints.get(handle.0)?;
        let data = self.solution.dual_g.get(offset..offset + rows * cols)?.to_vec();
        Some(matrix(rows, cols, data))
    }

    /// Constraint values of a block at the solution.
    pub fn constraint_value_of(&self, handle: ConstraintHandle) -> Option<DenseMatrix> {
        let &(offset, (rows, cols)) = self.constraints.get(handle.0)?;
        let data = self.solution.g.get(offset..offset + rows * cols)?.to_vec();
        Some(matrix(rows, cols, data))
    }

    /// Evaluate any expression over declared symbols at the solution, with
    /// parameters at the values used for the solve.
    pub fn value(&self, expr: &MatrixExpr) -> Result<DenseMatrix, ModelError> {
        if !expr.graph().same(&self.graph) {
            return Err(ExprError::ForeignGraph.into());
        }
        if let Some(values) = expr.constant_values() {
            return Ok(values);
        }

        let mut inputs = Vec::new();
        let mut args = Vec::new();
        for (symbol, info) in expr.symbols() {
            if let Some((_, var, offset)) = self.variables.iter().find(|(s, _, _)| *s == symbol) {
                let data = block("x", &self.solution.x, *offset, var.numel())?;
                inputs.push(var.clone());
                args.push(matrix(var.rows(), var.cols(), data));
            } else if let Some((_, param, value)) =
                self.parameters.iter().find(|(s, _, _)| *s == symbol)
            {
                inputs.push(param.clone());
                args.push(value.clone());
            } else {
                return Err(ModelError::UndeclaredSymbol { name: info.name });
            }
        }

        let function = Function::new("value", &inputs, std::slice::from_ref(expr))?;
        let mut outputs = function.evaluate(&args)?;
        Ok(outputs.swap_remove(0))
    }
}

fn block(
    what: &'static str,
    values: &[f64],
    offset: usize,
    len: usize,
) -> Result<Vec<f64>, ModelError> {
    values
        .get(offset..offset + len)
        .map(<[f64]>::to_vec)
        .ok_or_else(|| {
            SolverError::DimensionMismatch {
                what,
                expected: offset + len,
                actual: values.len(),
            }
            .into()
        })
}

fn matrix(rows: usize, cols: usize, data: Vec<f64>) -> DenseMatrix {
    DenseMatrix::from_column_major(rows, cols, data).unwrap_or_else(|| DenseMatrix::zeros(rows, cols))
}
