//! Constraint expressions: a matrix expression with per-element bounds.

use std::str::FromStr;

use crate::expr::error::ExprError;
use crate::expr::matrix::MatrixExpr;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Relation {
    LessEqual,
    GreaterEqual,
    Equal,
    /// Two-sided `lower <= expr <= upper`.
    Range,
}

impl Relation {
    pub fn as_str(self) -> &'static str {
        match self {
            Relation::LessEqual => "le",
            Relation::GreaterEqual => "ge",
            Relation::Equal => "eq",
            Relation::Range => "range",
        }
    }

    /// Relation seen from the other side: `a <= b` is `b >= a`.
    pub fn flipped(self) -> Self {
        match self {
            Relation::LessEqual => Relation::GreaterEqual,
            Relation::GreaterEqual => Relation::LessEqual,
            other => other,
        }
    }

    /// `(lower, upper)` bounds for `expr <relation> value`.
    pub(crate) fn bounds_for(self, value: f64) -> (f64, f64) {
        match self {
            Relation::LessEqual => (f64::NEG_INFINITY, value),
            Relation::GreaterEqual => (value, f64::INFINITY),
            Relation::Equal | Relation::Range => (value, value),
        }
    }
}

impl FromStr for Relation {
    type Err = ExprError;

    fn from_str(token: &str) -> Result<Self, Self::Err> {
        match token.trim() {
            "==" => Ok(Relation::Equal),
            "<=" => Ok(Relation::LessEqual),
            ">=" => Ok(Relation::GreaterEqual),
            other => Err(ExprError::UnsupportedRelation(other.to_string())),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ConstraintExpr {
    expr: MatrixExpr,
    lower: Vec<f64>,
    upper: Vec<f64>,
    relation: Relation,
}

impl ConstraintExpr {
    pub(crate) fn from_parts(
        expr: MatrixExpr,
        lower: Vec<f64>,
        upper: Vec<f64>,
        relation: Relation,
    ) -> Self {
        debug_assert_eq!(lower.len(), expr.numel());
        debug_assert_eq!(upper.len(), expr.numel());
        Self {
            expr,
            lower,
            upper,
            relation,
        }
    }

    /// `expr <relation> bound`, with the relation given as a token.
    pub fn parse(expr: &MatrixExpr, relation: &str, bound: f64) -> Result<Self, ExprError> {
        let relation = relation.parse::<Relation>()?;
        Ok(expr.compare_scalar(bound, relation))
    }

    /// Two-sided constraint with scalar bounds applied to every element.
    pub fn range(lower: f64, expr: &MatrixExpr, upper: f64) -> Self {
        let n = expr.numel();
        Self::from_parts(expr.clone(), vec![lower; n], vec![upper; n], Relation::Range)
    }

    /// Two-sided constraint with per-element bounds (column-major).
    pub fn range_elements(
        lower: Vec<f64>,
        expr: &MatrixExpr,
        upper: Vec<f64>,
    ) -> Result<Self, ExprError> {
        let n = expr.numel();
        if lower.len() != n || upper.len() != n {
            return Err(ExprError::shape(
                "range",
                expr.shape(),
                (lower.len().max(upper.len()), 1),
            ));
        }
        Ok(Self::from_parts(expr.clone(), lower, upper, Relation::Range))
    }

    pub fn expr(&self) -> &MatrixExpr {
        &self.expr
    }

    pub fn lower(&self) -> &[f64] {
        &self.lower
    }

    pub fn upper(&self) -> &[f64] {
        &self.upper
    }

    pub fn relation(&self) -> Relation {
        self.relation
    }

    pub fn len(&self) -> usize {
        self.lower.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lower.is_empty()
    }

    pub fn into_parts(self) -> (MatrixExpr, Vec<f64>, Vec<f64>, Relation) {
        (self.expr, self.lower, self.upper, self.relation)
    }
}
