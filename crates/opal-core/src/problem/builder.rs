//! Declaration methods: variables, parameters, objective and constraints.

use opal_expr::{ConstraintExpr, DenseMatrix, MatrixExpr, SymbolId};
use tracing::debug;

use crate::problem::{ConstraintBlock, ConstraintHandle, ModelError, ParameterDecl, Problem, VariableDecl};

/// Values for a `rows x cols` target: exact shape, or 1x1 broadcast.
fn broadcast(
    what: &'static str,
    shape: (usize, usize),
    values: &DenseMatrix,
) -> Result<Vec<f64>, ModelError> {
    if values.shape() == shape {
        return Ok(values.data().to_vec());
    }
    match values.as_scalar() {
        Some(value) => Ok(vec![value; shape.0 * shape.1]),
        None => Err(ModelError::ShapeMismatch {
            what,
            expected: shape,
            actual: values.shape(),
        }),
    }
}

/// Symbol node for a new declaration; zero-element shapes have none.
fn declare_symbol(
    expr: &MatrixExpr,
    name: &str,
    rows: usize,
    cols: usize,
) -> Result<SymbolId, ModelError> {
    expr.as_symbol().ok_or_else(|| ModelError::EmptyDeclaration {
        name: name.to_string(),
        rows,
        cols,
    })
}

fn check_bounds(lower: &[f64], upper: &[f64]) -> Result<(), ModelError> {
    for (index, (&lo, &hi)) in lower.iter().zip(upper).enumerate() {
        if lo.is_nan() || hi.is_nan() || lo > hi {
            return Err(ModelError::InvalidBounds {
                index,
                lower: lo,
                upper: hi,
            });
        }
    }
    Ok(())
}

impl Problem {
    /// Declare a `rows x cols` decision variable with a generated name.
    pub fn variable(&mut self, rows: usize, cols: usize) -> Result<MatrixExpr, ModelError> {
        let name = format!("x_{}", self.variables.len());
        self.variable_named(&name, rows, cols)
    }

    /// Declare a decision variable. Its elements take the next contiguous
    /// block of the flattened variable vector, column-major.
    pub fn variable_named(
        &mut self,
        name: &str,
        rows: usize,
        cols: usize,
    ) -> Result<MatrixExpr, ModelError> {
        self.ensure_open("declare a variable")?;
        let expr = MatrixExpr::sym(&self.graph, name, rows, cols);
        let symbol = declare_symbol(&expr, name, rows, cols)?;
        let numel = rows * cols;
        let offset = self.n_x;
        self.variables.push(VariableDecl {
            symbol,
            expr: expr.clone(),
            offset,
            lower: vec![f64::NEG_INFINITY; numel],
            upper: vec![f64::INFINITY; numel],
            initial: vec![0.0; numel],
        });
        self.n_x += numel;

        debug!(
            component = "problem",
            operation = "variable",
            status = "success",
            variable = name,
            rows = rows as u64,
            cols = cols as u64,
            offset = offset as u64,
            "Declared variable"
        );
        Ok(expr)
    }

    /// Declare a `rows x cols` parameter with a generated name.
    pub fn parameter(&mut self, rows: usize, cols: usize) -> Result<MatrixExpr, ModelError> {
        let name = format!("p_{}", self.parameters.len());
        self.parameter_named(&name, rows, cols)
    }

    /// Declare a parameter. Its value starts at zero.
    pub fn parameter_named(
        &mut self,
        name: &str,
        rows: usize,
        cols: usize,
    ) -> Result<MatrixExpr, ModelError> {
        self.ensure_open("declare a parameter")?;
        let expr = MatrixExpr::sym(&self.graph, name, rows, cols);
        let symbol = declare_symbol(&expr, name, rows, cols)?;
        self.parameters.push(ParameterDecl {
            symbol,
            expr: expr.clone(),
            value: DenseMatrix::zeros(rows, cols),
        });

        debug!(
            component = "problem",
            operation = "parameter",
            status = "success",
            parameter = name,
            rows = rows as u64,
            cols = cols as u64,
            "Declared parameter"
        );
        Ok(expr)
    }

    /// Set a parameter's numeric value. Allowed between solves.
    ///
    /// The shape must match exactly; on error the previous value is kept.
    pub fn set_value(&mut self, param: &MatrixExpr, value: &DenseMatrix) -> Result<(), ModelError> {
        let index = self.parameter_index(param)?;
        let decl = &mut self.parameters[index];
        if value.shape() != decl.expr.shape() {
            return Err(ModelError::ShapeMismatch {
                what: "parameter value",
                expected: decl.expr.shape(),
                actual: value.shape(),
            });
        }
        decl.value = value.clone();
        Ok(())
    }

    /// Current value of a parameter.
    pub fn value_of_parameter(&self, param: &MatrixExpr) -> Result<&DenseMatrix, ModelError> {
        let index = self.parameter_index(param)?;
        Ok(&self.parameters[index].value)
    }

    /// Same scalar bounds on every element of `var`.
    pub fn set_bounds(&mut self, var: &MatrixExpr, lower: f64, upper: f64) -> Result<(), ModelError> {
        self.set_bounds_elements(var, &DenseMatrix::scalar(lower), &DenseMatrix::scalar(upper))
    }

    /// Per-element bounds; 1x1 matrices broadcast.
    pub fn set_bounds_elements(
        &mut self,
        var: &MatrixExpr,
        lower: &DenseMatrix,
        upper: &DenseMatrix,
    ) -> Result<(), ModelError> {
        let index = self.variable_index(var)?;
        let shape = self.variables[index].expr.shape();
        let lower = broadcast("lower bound", shape, lower)?;
        let upper = broadcast("upper bound", shape, upper)?;
        check_bounds(&lower, &upper)?;

        let decl = &mut self.variables[index];
        decl.lower = lower;
        decl.upper = upper;
        Ok(())
    }

    /// Initial guess for `var`; a 1x1 matrix broadcasts.
    pub fn set_initial(&mut self, var: &MatrixExpr, values: &DenseMatrix) -> Result<(), ModelError> {
        let index = self.variable_index(var)?;
        let shape = self.variables[index].expr.shape();
        self.variables[index].initial = broadcast("initial guess", shape, values)?;
        Ok(())
    }

    /// Set the scalar objective to minimize.
    pub fn minimize(&mut self, expr: &MatrixExpr) -> Result<(), ModelError> {
        self.ensure_open("set the objective")?;
        if self.objective.is_some() {
            return Err(ModelError::MultipleObjectives);
        }
        if !expr.is_scalar() {
            return Err(ModelError::ShapeMismatch {
                what: "objective",
                expected: (1, 1),
                actual: expr.shape(),
            });
        }
        self.ensure_declared(expr)?;
        self.objective = Some(expr.clone());

        debug!(
            component = "problem",
            operation = "minimize",
            status = "success",
            "Set objective"
        );
        Ok(())
    }

    /// Append one constraint block.
    pub fn subject_to(&mut self, constraint: ConstraintExpr) -> Result<ConstraintHandle, ModelError> {
        self.ensure_open("add a constraint")?;
        self.ensure_declared(constraint.expr())?;
        check_bounds(constraint.lower(), constraint.upper())?;

        let (expr, lower, upper, relation) = constraint.into_parts();
        let handle = ConstraintHandle(self.constraints.len());
        let offset = self.n_g;
        self.n_g += lower.len();
        self.constraints.push(ConstraintBlock {
            shape: expr.shape(),
            expr: expr.vec(),
            lower,
            upper,
            relation,
            offset,
        });

        debug!(
            component = "problem",
            operation = "subject_to",
            status = "success",
            relation = relation.as_str(),
            elements = (self.n_g - offset) as u64,
            offset = offset as u64,
            "Added constraint block"
        );
        Ok(handle)
    }

    /// `expr <relation> bound` with the relation given as `==`, `<=` or `>=`.
    pub fn subject_to_relation(
        &mut self,
        expr: &MatrixExpr,
        relation: &str,
        bound: f64,
    ) -> Result<ConstraintHandle, ModelError> {
        let constraint = ConstraintExpr::parse(expr, relation, bound)?;
        self.subject_to(constraint)
    }
}
