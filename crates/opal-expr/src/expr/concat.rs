//! Vertical and horizontal concatenation.
//!
//! 0x0 parts are skipped so that empty accumulators can be extended in loops.

use crate::expr::error::ExprError;
use crate::expr::graph::Graph;
use crate::expr::matrix::MatrixExpr;

fn non_empty<'a>(
    graph: &Graph,
    parts: &'a [MatrixExpr],
) -> Result<Vec<&'a MatrixExpr>, ExprError> {
    let mut kept = Vec::with_capacity(parts.len());
    for part in parts {
        if !part.graph().same(graph) {
            return Err(ExprError::ForeignGraph);
        }
        if part.shape() != (0, 0) {
            kept.push(part);
        }
    }
    Ok(kept)
}

/// Stack parts on top of each other; column counts must agree.
pub fn vertcat(graph: &Graph, parts: &[MatrixExpr]) -> Result<MatrixExpr, ExprError> {
    let kept = non_empty(graph, parts)?;
    let Some(first) = kept.first() else {
        return Ok(MatrixExpr::empty(graph));
    };
    let cols = first.cols();
    for part in &kept {
        if part.cols() != cols {
            return Err(ExprError::shape("vertcat", first.shape(), part.shape()));
        }
    }
    let rows: usize = kept.iter().map(|part| part.rows()).sum();
    let mut cells = Vec::with_capacity(rows * cols);
    for c in 0..cols {
        for part in &kept {
            let height = part.rows();
            cells.extend_from_slice(&part.cells()[c * height..(c + 1) * height]);
        }
    }
    Ok(MatrixExpr::from_cells(graph, rows, cols, cells))
}

/// Place parts side by side; row counts must agree.
pub fn horzcat(graph: &Graph, parts: &[MatrixExpr]) -> Result<MatrixExpr, ExprError> {
    let kept = non_empty(graph, parts)?;
    let Some(first) = kept.first() else {
        return Ok(MatrixExpr::empty(graph));
    };
    let rows = first.rows();
    for part in &kept {
        if part.rows() != rows {
            return Err(ExprError::shape("horzcat", first.shape(), part.shape()));
        }
    }
    let cols: usize = kept.iter().map(|part| part.cols()).sum();
    let cells = kept
        .iter()
        .flat_map(|part| part.cells().iter().copied())
        .collect();
    Ok(MatrixExpr::from_cells(graph, rows, cols, cells))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dense::DenseMatrix;

    #[test]
    fn vertcat_interleaves_columns() {
        let g = Graph::new();
        let a = MatrixExpr::from_values(
            &g,
            &DenseMatrix::from_rows(&[vec![1.0, 2.0]]).unwrap(),
        );
        let b = MatrixExpr::from_values(
            &g,
            &DenseMatrix::from_rows(&[vec![3.0, 4.0], vec![5.0, 6.0]]).unwrap(),
        );
        let v = vertcat(&g, &[a, b]).unwrap();
        assert_eq!(v.shape(), (3, 2));
        assert_eq!(
            v.constant_values().unwrap().to_rows(),
            vec![vec![1.0, 2.0], vec![3.0, 4.0], vec![5.0, 6.0]]
        );
    }

    #[test]
    fn horzcat_appends_columns() {
        let g = Graph::new();
        let a = MatrixExpr::sym(&g, "a", 2, 1);
        let b = MatrixExpr::sym(&g, "b", 2, 2);
        let h = horzcat(&g, &[a.clone(), b.clone()]).unwrap();
        assert_eq!(h.shape(), (2, 3));
        assert_eq!(&h.cells()[..2], a.cells());
        assert_eq!(&h.cells()[2..], b.cells());
    }

    #[test]
    fn empty_parts_are_skipped() {
        let g = Graph::new();
        let x = MatrixExpr::sym(&g, "x", 1, 3);
        let mut acc = MatrixExpr::empty(&g);
        for _ in 0..2 {
            acc = vertcat(&g, &[acc, x.clone()]).unwrap();
        }
        assert_eq!(acc.shape(), (2, 3));
        assert_eq!(vertcat(&g, &[]).unwrap().shape(), (0, 0));
    }

    #[test]
    fn mismatched_dimension_fails() {
        let g = Graph::new();
        let a = MatrixExpr::sym(&g, "a", 2, 1);
        let b = MatrixExpr::sym(&g, "b", 3, 2);
        assert!(matches!(
            vertcat(&g, &[a.clone(), b.clone()]),
            Err(ExprError::ShapeMismatch { op: "vertcat", .. })
        ));
        assert!(matches!(
            horzcat(&g, &[a, b]),
            Err(ExprError::ShapeMismatch { op: "horzcat", .. })
        ));
    }

    #[test]
    fn foreign_part_is_rejected() {
        let g = Graph::new();
        let other = Graph::new();
        let a = MatrixExpr::sym(&other, "a", 1, 1);
        assert_eq!(vertcat(&g, &[a]).unwrap_err(), ExprError::ForeignGraph);
    }
}
