//! Matrix expressions: a shape plus one node reference per cell.
//!
//! Storage is column-major everywhere: `cells[col * rows + row]`. Operations
//! append new nodes to the shared graph and return new matrices; existing
//! nodes and matrices are never modified.

use std::collections::BTreeMap;
use std::fmt;

use crate::dense::DenseMatrix;
use crate::expr::constraint::{ConstraintExpr, Relation};
use crate::expr::error::ExprError;
use crate::expr::graph::{Arena, Graph, SymbolInfo};
use crate::expr::node::{BinaryOp, Node, UnaryOp};
use crate::ids::{NodeId, SymbolId};

#[derive(Debug, Clone)]
pub struct MatrixExpr {
    graph: Graph,
    rows: usize,
    cols: usize,
    cells: Vec<NodeId>,
}

impl MatrixExpr {
    // ── Constructors ────────────────────────────────────────

    /// Fresh symbol of the given shape; one symbol node per element.
    pub fn sym(graph: &Graph, name: &str, rows: usize, cols: usize) -> Self {
        let (_, cells) = graph.write().symbol_elements(name, rows, cols);
        Self::from_cells(graph, rows, cols, cells)
    }

    /// Fresh 1x1 symbol.
    pub fn scalar_sym(graph: &Graph, name: &str) -> Self {
        Self::sym(graph, name, 1, 1)
    }

    /// 1x1 constant.
    pub fn constant(graph: &Graph, value: f64) -> Self {
        Self::filled(graph, 1, 1, value)
    }

    /// Matrix with every cell set to the same constant.
    pub fn filled(graph: &Graph, rows: usize, cols: usize, value: f64) -> Self {
        let node = graph.write().constant(value);
        Self::from_cells(graph, rows, cols, vec![node; rows * cols])
    }

    pub fn zeros(graph: &Graph, rows: usize, cols: usize) -> Self {
        Self::filled(graph, rows, cols, 0.0)
    }

    pub fn ones(graph: &Graph, rows: usize, cols: usize) -> Self {
        Self::filled(graph, rows, cols, 1.0)
    }

    /// 0x0 matrix; skipped by concatenation.
    pub fn empty(graph: &Graph) -> Self {
        Self::from_cells(graph, 0, 0, Vec::new())
    }

    /// Constant matrix holding numeric values.
    pub fn from_values(graph: &Graph, values: &DenseMatrix) -> Self {
        let mut arena = graph.write();
        let cells = values
            .data()
            .iter()
            .map(|&value| arena.constant(value))
            .collect();
        drop(arena);
        Self::from_cells(graph, values.rows(), values.cols(), cells)
    }

    pub(crate) fn from_cells(graph: &Graph, rows: usize, cols: usize, cells: Vec<NodeId>) -> Self {
        debug_assert_eq!(cells.len(), rows * cols);
        Self {
            graph: graph.clone(),
            rows,
            cols,
            cells,
        }
    }

    // ── Accessors ───────────────────────────────────────────

    pub fn graph(&self) -> &Graph {
        &self.graph
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn cols(&self) -> usize {
        self.cols
    }

    pub fn shape(&self) -> (usize, usize) {
        (self.rows, self.cols)
    }

    /// Number of elements.
    pub fn numel(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    pub fn is_scalar(&self) -> bool {
        self.rows == 1 && self.cols == 1
    }

    /// Node ids, column-major.
    pub fn cells(&self) -> &[NodeId] {
        &self.cells
    }

    /// Node at `(row, col)` without bounds translation.
    pub fn cell(&self, row: usize, col: usize) -> Option<NodeId> {
        (row < self.rows && col < self.cols).then(|| self.cells[col * self.rows + row])
    }

    /// Whether every cell is a distinct bare symbol element.
    pub fn is_symbolic(&self) -> bool {
        self.first_non_symbolic().is_none()
    }

    pub(crate) fn first_non_symbolic(&self) -> Option<usize> {
        let arena = self.graph.read();
        let mut seen = std::collections::HashSet::new();
        self.cells
            .iter()
            .position(|&id| !arena.node(id).is_symbol() || !seen.insert(id))
    }

    /// Numeric values when every cell is constant.
    pub fn constant_values(&self) -> Option<DenseMatrix> {
        let arena = self.graph.read();
        let data = self
            .cells
            .iter()
            .map(|&id| arena.constant_value(id))
            .collect::<Option<Vec<_>>>()?;
        DenseMatrix::from_column_major(self.rows, self.cols, data)
    }

    /// Symbols this expression depends on, in declaration order.
    pub fn symbols(&self) -> Vec<(SymbolId, SymbolInfo)> {
        let arena = self.graph.read();
        let mut found: BTreeMap<SymbolId, SymbolInfo> = BTreeMap::new();
        for id in arena.reachable(&self.cells) {
            if let Node::Symbol { symbol, .. } = arena.node(id) {
                found
                    .entry(symbol)
                    .or_insert_with(|| arena.symbol(symbol).clone());
            }
        }
        found.into_iter().collect()
    }

    /// Symbol element nodes this expression depends on.
    pub fn free_elements(&self) -> Vec<NodeId> {
        let arena = self.graph.read();
        arena
            .reachable(&self.cells)
            .into_iter()
            .filter(|&id| arena.node(id).is_symbol())
            .collect()
    }

    /// The symbol this matrix is exactly (all elements, declaration order).
    pub fn as_symbol(&self) -> Option<SymbolId> {
        let arena = self.graph.read();
        let mut symbol_id = None;
        for (position, &id) in self.cells.iter().enumerate() {
            match arena.node(id) {
                Node::Symbol { symbol, offset } if offset == position => {
                    if *symbol_id.get_or_insert(symbol) != symbol {
                        return None;
                    }
                }
                _ => return None,
            }
        }
        let symbol = symbol_id?;
        let info = arena.symbol(symbol);
        (info.rows == self.rows && info.cols == self.cols).then_some(symbol)
    }

    pub(crate) fn ensure_same_graph(&self, other: &MatrixExpr) -> Result<(), ExprError> {
        if self.graph.same(&other.graph) {
            Ok(())
        } else {
            Err(ExprError::ForeignGraph)
        }
    }

    // ── Elementwise operations ──────────────────────────────

    fn elementwise(&self, other: &MatrixExpr, op: BinaryOp) -> Result<MatrixExpr, ExprError> {
        self.ensure_same_graph(other)?;
        let (rows, cols) = broadcast_shape(op.as_str(), self.shape(), other.shape())?;
        let mut arena = self.graph.write();
        let cells = (0..rows * cols)
            .map(|k| {
                let lhs = if self.is_scalar() { self.cells[0] } else { self.cells[k] };
                let rhs = if other.is_scalar() { other.cells[0] } else { other.cells[k] };
                arena.binary(op, lhs, rhs)
            })
            .collect();
        drop(arena);
        Ok(MatrixExpr::from_cells(&self.graph, rows, cols, cells))
    }

    fn with_scalar(&self, value: f64, op: BinaryOp, scalar_on_left: bool) -> MatrixExpr {
        let mut arena = self.graph.write();
        let constant = arena.constant(value);
        let cells = self
            .cells
            .iter()
            .map(|&cell| {
                if scalar_on_left {
                    arena.binary(op, constant, cell)
                } else {
                    arena.binary(op, cell, constant)
                }
            })
            .collect();
        drop(arena);
        MatrixExpr::from_cells(&self.graph, self.rows, self.cols, cells)
    }

    fn map_unary(&self, op: UnaryOp) -> MatrixExpr {
        let mut arena = self.graph.write();
        let cells = self.cells.iter().map(|&cell| arena.unary(op, cell)).collect();
        drop(arena);
        MatrixExpr::from_cells(&self.graph, self.rows, self.cols, cells)
    }

    pub fn add(&self, other: &MatrixExpr) -> Result<MatrixExpr, ExprError> {
        self.elementwise(other, BinaryOp::Add)
    }

    pub fn sub(&self, other: &MatrixExpr) -> Result<MatrixExpr, ExprError> {
        self.elementwise(other, BinaryOp::Sub)
    }

    /// Elementwise product.
    pub fn mul(&self, other: &MatrixExpr) -> Result<MatrixExpr, ExprError> {
        self.elementwise(other, BinaryOp::Mul)
    }

    pub fn div(&self, other: &MatrixExpr) -> Result<MatrixExpr, ExprError> {
        self.elementwise(other, BinaryOp::Div)
    }

    pub fn pow(&self, exponent: &MatrixExpr) -> Result<MatrixExpr, ExprError> {
        self.elementwise(exponent, BinaryOp::Pow)
    }

    /// `atan2(self, x)`.
    pub fn atan2(&self, x: &MatrixExpr) -> Result<MatrixExpr, ExprError> {
        self.elementwise(x, BinaryOp::Atan2)
    }

    pub fn fmin(&self, other: &MatrixExpr) -> Result<MatrixExpr, ExprError> {
        self.elementwise(other, BinaryOp::Fmin)
    }

    pub fn fmax(&self, other: &MatrixExpr) -> Result<MatrixExpr, ExprError> {
        self.elementwise(other, BinaryOp::Fmax)
    }

    /// Elementwise power with a constant exponent.
    pub fn powf(&self, exponent: f64) -> MatrixExpr {
        self.with_scalar(exponent, BinaryOp::Pow, false)
    }

    pub fn neg(&self) -> MatrixExpr {
        self.map_unary(UnaryOp::Neg)
    }

    pub fn sin(&self) -> MatrixExpr {
        self.map_unary(UnaryOp::Sin)
    }

    pub fn cos(&self) -> MatrixExpr {
        self.map_unary(UnaryOp::Cos)
    }

    pub fn tan(&self) -> MatrixExpr {
        self.map_unary(UnaryOp::Tan)
    }

    pub fn asin(&self) -> MatrixExpr {
        self.map_unary(UnaryOp::Asin)
    }

    pub fn acos(&self) -> MatrixExpr {
        self.map_unary(UnaryOp::Acos)
    }

    pub fn atan(&self) -> MatrixExpr {
        self.map_unary(UnaryOp::Atan)
    }

    pub fn exp(&self) -> MatrixExpr {
        self.map_unary(UnaryOp::Exp)
    }

    pub fn log(&self) -> MatrixExpr {
        self.map_unary(UnaryOp::Log)
    }

    pub fn sqrt(&self) -> MatrixExpr {
        self.map_unary(UnaryOp::Sqrt)
    }

    pub fn sq(&self) -> MatrixExpr {
        self.map_unary(UnaryOp::Sq)
    }

    pub fn abs(&self) -> MatrixExpr {
        self.map_unary(UnaryOp::Abs)
    }

    pub fn tanh(&self) -> MatrixExpr {
        self.map_unary(UnaryOp::Tanh)
    }

    pub fn sign(&self) -> MatrixExpr {
        self.map_unary(UnaryOp::Sign)
    }

    pub fn floor(&self) -> MatrixExpr {
        self.map_unary(UnaryOp::Floor)
    }

    pub fn ceil(&self) -> MatrixExpr {
        self.map_unary(UnaryOp::Ceil)
    }

    // ── Linear algebra ──────────────────────────────────────

    /// Matrix product. A 1x1 operand scales the other one.
    pub fn mtimes(&self, other: &MatrixExpr) -> Result<MatrixExpr, ExprError> {
        self.ensure_same_graph(other)?;
        if self.is_scalar() || other.is_scalar() {
            return self.mul(other);
        }
        if self.cols != other.rows {
            return Err(ExprError::shape("mtimes", self.shape(), other.shape()));
        }
        let (m, n, p) = (self.rows, self.cols, other.cols);
        let mut arena = self.graph.write();
        let zero = arena.constant(0.0);
        let mut cells = Vec::with_capacity(m * p);
        for j in 0..p {
            for i in 0..m {
                let mut acc = zero;
                for k in 0..n {
                    let product = arena.binary(
                        BinaryOp::Mul,
                        self.cells[k * m + i],
                        other.cells[j * n + k],
                    );
                    acc = arena.binary(BinaryOp::Add, acc, product);
                }
                cells.push(acc);
            }
        }
        drop(arena);
        Ok(MatrixExpr::from_cells(&self.graph, m, p, cells))
    }

    pub fn transpose(&self) -> MatrixExpr {
        let mut cells = Vec::with_capacity(self.cells.len());
        for row in 0..self.rows {
            for col in 0..self.cols {
                cells.push(self.cells[col * self.rows + row]);
            }
        }
        MatrixExpr::from_cells(&self.graph, self.cols, self.rows, cells)
    }

    /// Reinterpret the column-major cell order with a new shape.
    pub fn reshape(&self, rows: usize, cols: usize) -> Result<MatrixExpr, ExprError> {
        if rows * cols != self.numel() {
            return Err(ExprError::shape("reshape", self.shape(), (rows, cols)));
        }
        Ok(MatrixExpr::from_cells(
            &self.graph,
            rows,
            cols,
            self.cells.clone(),
        ))
    }

    /// Column-major flattening into a column vector.
    pub fn vec(&self) -> MatrixExpr {
        MatrixExpr::from_cells(&self.graph, self.numel(), 1, self.cells.clone())
    }

    /// Sum of all elements.
    pub fn sum(&self) -> MatrixExpr {
        let mut arena = self.graph.write();
        let total = sum_cells(&mut arena, &self.cells);
        drop(arena);
        MatrixExpr::from_cells(&self.graph, 1, 1, vec![total])
    }

    /// Inner product of two equally shaped matrices.
    pub fn dot(&self, other: &MatrixExpr) -> Result<MatrixExpr, ExprError> {
        self.ensure_same_graph(other)?;
        if self.shape() != other.shape() {
            return Err(ExprError::shape("dot", self.shape(), other.shape()));
        }
        Ok(self.mul(other)?.sum())
    }

    /// Sum of squares of all elements.
    pub fn sumsqr(&self) -> MatrixExpr {
        self.sq().sum()
    }

    /// Euclidean (Frobenius) norm.
    pub fn norm_2(&self) -> MatrixExpr {
        self.sumsqr().sqrt()
    }

    // ── Comparison methods (produce ConstraintExpr) ─────────

    pub fn compare_scalar(&self, rhs: f64, relation: Relation) -> ConstraintExpr {
        let n = self.numel();
        let (lower, upper) = relation.bounds_for(rhs);
        ConstraintExpr::from_parts(self.clone(), vec![lower; n], vec![upper; n], relation)
    }

    /// Compare against another expression.
    ///
    /// A constant side becomes the bound; otherwise the difference
    /// `self - rhs` is bounded by zero.
    pub fn compare_expr(
        &self,
        rhs: &MatrixExpr,
        relation: Relation,
    ) -> Result<ConstraintExpr, ExprError> {
        self.ensure_same_graph(rhs)?;
        if let Some(values) = rhs.constant_values() {
            let (rows, cols) = broadcast_shape("compare", self.shape(), rhs.shape())?;
            let lhs = self.broadcast_to(rows, cols);
            let bounds = broadcast_values(&values, rows * cols);
            return Ok(bounded(lhs, &bounds, relation));
        }
        if let Some(values) = self.constant_values() {
            let (rows, cols) = broadcast_shape("compare", self.shape(), rhs.shape())?;
            let lhs = rhs.broadcast_to(rows, cols);
            let bounds = broadcast_values(&values, rows * cols);
            return Ok(bounded(lhs, &bounds, relation.flipped()));
        }
        let difference = self.sub(rhs)?;
        Ok(difference.compare_scalar(0.0, relation))
    }

    pub fn le_scalar(&self, rhs: f64) -> ConstraintExpr {
        self.compare_scalar(rhs, Relation::LessEqual)
    }

    pub fn ge_scalar(&self, rhs: f64) -> ConstraintExpr {
        self.compare_scalar(rhs, Relation::GreaterEqual)
    }

    pub fn eq_scalar(&self, rhs: f64) -> ConstraintExpr {
        self.compare_scalar(rhs, Relation::Equal)
    }

    pub fn le_expr(&self, rhs: &MatrixExpr) -> Result<ConstraintExpr, ExprError> {
        self.compare_expr(rhs, Relation::LessEqual)
    }

    pub fn ge_expr(&self, rhs: &MatrixExpr) -> Result<ConstraintExpr, ExprError> {
        self.compare_expr(rhs, Relation::GreaterEqual)
    }

    pub fn eq_expr(&self, rhs: &MatrixExpr) -> Result<ConstraintExpr, ExprError> {
        self.compare_expr(rhs, Relation::Equal)
    }

    fn broadcast_to(&self, rows: usize, cols: usize) -> MatrixExpr {
        if self.shape() == (rows, cols) {
            self.clone()
        } else {
            MatrixExpr::from_cells(&self.graph, rows, cols, vec![self.cells[0]; rows * cols])
        }
    }
}

fn bounded(expr: MatrixExpr, bounds: &[f64], relation: Relation) -> ConstraintExpr {
    let (lower, upper): (Vec<f64>, Vec<f64>) =
        bounds.iter().map(|&value| relation.bounds_for(value)).unzip();
    ConstraintExpr::from_parts(expr, lower, upper, relation)
}

fn broadcast_values(values: &DenseMatrix, len: usize) -> Vec<f64> {
    match values.as_scalar() {
        Some(value) => vec![value; len],
        None => values.data().to_vec(),
    }
}

pub(crate) fn broadcast_shape(
    op: &'static str,
    left: (usize, usize),
    right: (usize, usize),
) -> Result<(usize, usize), ExprError> {
    if left == right {
        Ok(left)
    } else if left == (1, 1) {
        Ok(right)
    } else if right == (1, 1) {
        Ok(left)
    } else {
        Err(ExprError::shape(op, left, right))
    }
}

pub(crate) fn sum_cells(arena: &mut Arena, cells: &[NodeId]) -> NodeId {
    let mut iter = cells.iter();
    let Some(&first) = iter.next() else {
        return arena.constant(0.0);
    };
    iter.fold(first, |acc, &cell| arena.binary(BinaryOp::Add, acc, cell))
}

// ── Operator overloads (scalar operands never fail) ─────────

impl std::ops::Add<f64> for &MatrixExpr {
    type Output = MatrixExpr;

    fn add(self, rhs: f64) -> Self::Output {
        self.with_scalar(rhs, BinaryOp::Add, false)
    }
}

impl std::ops::Sub<f64> for &MatrixExpr {
    type Output = MatrixExpr;

    fn sub(self, rhs: f64) -> Self::Output {
        self.with_scalar(rhs, BinaryOp::Sub, false)
    }
}

impl std::ops::Mul<f64> for &MatrixExpr {
    type Output = MatrixExpr;

    fn mul(self, rhs: f64) -> Self::Output {
        self.with_scalar(rhs, BinaryOp::Mul, false)
    }
}

impl std::ops::Div<f64> for &MatrixExpr {
    type Output = MatrixExpr;

    fn div(self, rhs: f64) -> Self::Output {
        self.with_scalar(rhs, BinaryOp::Div, false)
    }
}

impl std::ops::Add<f64> for MatrixExpr {
    type Output = MatrixExpr;

    fn add(self, rhs: f64) -> Self::Output {
        &self + rhs
    }
}

impl std::ops::Sub<f64> for MatrixExpr {
    type Output = MatrixExpr;

    fn sub(self, rhs: f64) -> Self::Output {
        &self - rhs
    }
}

impl std::ops::Mul<f64> for MatrixExpr {
    type Output = MatrixExpr;

    fn mul(self, rhs: f64) -> Self::Output {
        &self * rhs
    }
}

impl std::ops::Div<f64> for MatrixExpr {
    type Output = MatrixExpr;

    fn div(self, rhs: f64) -> Self::Output {
        &self / rhs
    }
}

impl std::ops::Mul<&MatrixExpr> for f64 {
    type Output = MatrixExpr;

    fn mul(self, rhs: &MatrixExpr) -> Self::Output {
        rhs.with_scalar(self, BinaryOp::Mul, true)
    }
}

impl std::ops::Sub<&MatrixExpr> for f64 {
    type Output = MatrixExpr;

    fn sub(self, rhs: &MatrixExpr) -> Self::Output {
        rhs.with_scalar(self, BinaryOp::Sub, true)
    }
}

impl std::ops::Neg for &MatrixExpr {
    type Output = MatrixExpr;

    fn neg(self) -> Self::Output {
        self.map_unary(UnaryOp::Neg)
    }
}

impl std::ops::Neg for MatrixExpr {
    type Output = MatrixExpr;

    fn neg(self) -> Self::Output {
        self.map_unary(UnaryOp::Neg)
    }
}

impl fmt::Display for MatrixExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = self.graph.read().render(&self.cells);
        if self.is_scalar() {
            return write!(f, "{}", text[&self.cells[0]]);
        }
        write!(f, "[")?;
        for row in 0..self.rows {
            if row > 0 {
                write!(f, ", ")?;
            }
            let cells = (0..self.cols)
                .map(|col| text[&self.cells[col * self.rows + row]].as_str())
                .collect::<Vec<_>>();
            write!(f, "[{}]", cells.join(", "))?;
        }
        write!(f, "]")
    }
}
