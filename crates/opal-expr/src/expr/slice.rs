//! Rectangular selection of matrix cells.
//!
//! Ranges are end-exclusive. A negative `start` or `stop` counts from the end
//! of the dimension: as a start `-1` is the last index, as a stop it excludes
//! the last index. Resolved bounds outside the dimension are an error; they
//! are never clamped.

use crate::expr::error::{Axis, ExprError};
use crate::expr::matrix::MatrixExpr;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Slice {
    pub start: isize,
    /// `None` runs to the end of the dimension.
    pub stop: Option<isize>,
    pub step: isize,
}

impl Slice {
    /// Every index of the dimension.
    pub fn all() -> Self {
        Self {
            start: 0,
            stop: None,
            step: 1,
        }
    }

    /// `start..stop` with unit step.
    pub fn new(start: isize, stop: isize) -> Self {
        Self {
            start,
            stop: Some(stop),
            step: 1,
        }
    }

    /// `start..` to the end of the dimension.
    pub fn starting_at(start: isize) -> Self {
        Self {
            start,
            stop: None,
            step: 1,
        }
    }

    pub fn with_step(mut self, step: isize) -> Self {
        self.step = step;
        self
    }

    /// Concrete indices selected in a dimension of length `len`.
    pub fn resolve(&self, axis: Axis, len: usize) -> Result<Vec<usize>, ExprError> {
        if self.step < 1 {
            return Err(ExprError::InvalidSlice { step: self.step });
        }
        let start = resolve_bound(axis, self.start, len)?;
        let stop = match self.stop {
            Some(stop) => resolve_bound(axis, stop, len)?,
            None => len,
        };
        if stop <= start {
            return Ok(Vec::new());
        }
        Ok((start..stop).step_by(self.step as usize).collect())
    }
}

/// Resolve a range bound; `len` itself is a valid bound.
fn resolve_bound(axis: Axis, index: isize, len: usize) -> Result<usize, ExprError> {
    let resolved = if index < 0 {
        len as isize + index
    } else {
        index
    };
    if resolved < 0 || resolved > len as isize {
        return Err(ExprError::OutOfRange { axis, index, len });
    }
    Ok(resolved as usize)
}

/// Resolve a single element index; must land inside `0..len`.
pub(crate) fn resolve_index(axis: Axis, index: isize, len: usize) -> Result<usize, ExprError> {
    let resolved = if index < 0 {
        len as isize + index
    } else {
        index
    };
    if resolved < 0 || resolved >= len as isize {
        return Err(ExprError::OutOfRange { axis, index, len });
    }
    Ok(resolved as usize)
}

impl MatrixExpr {
    /// Rows × columns selection. The result references the same nodes.
    pub fn slice(&self, rows: Slice, cols: Slice) -> Result<MatrixExpr, ExprError> {
        let row_idx = rows.resolve(Axis::Row, self.rows())?;
        let col_idx = cols.resolve(Axis::Column, self.cols())?;
        Ok(self.select(&row_idx, &col_idx))
    }

    /// Single element; negative indices count from the end.
    pub fn at(&self, row: isize, col: isize) -> Result<MatrixExpr, ExprError> {
        let r = resolve_index(Axis::Row, row, self.rows())?;
        let c = resolve_index(Axis::Column, col, self.cols())?;
        Ok(self.select(&[r], &[c]))
    }

    /// One full row as a 1 x cols matrix.
    pub fn row(&self, row: isize) -> Result<MatrixExpr, ExprError> {
        let r = resolve_index(Axis::Row, row, self.rows())?;
        let cols: Vec<usize> = (0..self.cols()).collect();
        Ok(self.select(&[r], &cols))
    }

    /// One full column as a rows x 1 matrix.
    pub fn col(&self, col: isize) -> Result<MatrixExpr, ExprError> {
        let c = resolve_index(Axis::Column, col, self.cols())?;
        let rows: Vec<usize> = (0..self.rows()).collect();
        Ok(self.select(&rows, &[c]))
    }

    fn select(&self, rows: &[usize], cols: &[usize]) -> MatrixExpr {
        let n_rows = self.rows();
        let cells = self.cells();
        let mut selected = Vec::with_capacity(rows.len() * cols.len());
        for &c in cols {
            for &r in rows {
                selected.push(cells[c * n_rows + r]);
            }
        }
        MatrixExpr::from_cells(self.graph(), rows.len(), cols.len(), selected)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dense::DenseMatrix;
    use crate::expr::graph::Graph;

    fn numbered(g: &Graph, rows: usize, cols: usize) -> MatrixExpr {
        let data = (0..rows * cols).map(|k| k as f64).collect();
        let values = DenseMatrix::from_column_major(rows, cols, data).unwrap();
        MatrixExpr::from_values(g, &values)
    }

    #[test]
    fn full_slice_is_identity() {
        let g = Graph::new();
        let m = MatrixExpr::sym(&g, "m", 3, 4);
        let same = m.slice(Slice::all(), Slice::all()).unwrap();
        assert_eq!(same.shape(), m.shape());
        assert_eq!(same.cells(), m.cells());
    }

    #[test]
    fn negative_indices_count_from_end() {
        let g = Graph::new();
        let m = MatrixExpr::sym(&g, "m", 5, 1);
        // start -1 selects only the last row
        let last = m.slice(Slice::starting_at(-1), Slice::all()).unwrap();
        assert_eq!(last.cells(), &m.cells()[4..]);
        // stop -1 excludes the last row
        let head = m.slice(Slice::new(0, -1), Slice::all()).unwrap();
        assert_eq!(head.cells(), &m.cells()[..4]);
        // -2 as a start is the second-to-last row
        let tail = m.slice(Slice::starting_at(-2), Slice::all()).unwrap();
        assert_eq!(tail.cells(), &m.cells()[3..]);
        assert_eq!(m.at(-1, 0).unwrap().cells(), &m.cells()[4..5]);
    }

    #[test]
    fn step_selects_every_other() {
        let g = Graph::new();
        let m = numbered(&g, 6, 1);
        let even = m.slice(Slice::all().with_step(2), Slice::all()).unwrap();
        assert_eq!(
            even.constant_values().unwrap().data(),
            &[0.0, 2.0, 4.0]
        );
    }

    #[test]
    fn invalid_step_is_rejected() {
        let g = Graph::new();
        let m = MatrixExpr::sym(&g, "m", 2, 2);
        let err = m.slice(Slice::all().with_step(0), Slice::all()).unwrap_err();
        assert_eq!(err, ExprError::InvalidSlice { step: 0 });
    }

    #[test]
    fn out_of_range_is_not_clamped() {
        let g = Graph::new();
        let m = MatrixExpr::sym(&g, "m", 3, 2);
        let err = m.slice(Slice::new(0, 4), Slice::all()).unwrap_err();
        assert_eq!(
            err,
            ExprError::OutOfRange {
                axis: Axis::Row,
                index: 4,
                len: 3
            }
        );
        assert!(m.slice(Slice::all(), Slice::starting_at(-3)).is_err());
        assert!(m.at(3, 0).is_err());
        assert!(m.col(2).is_err());
    }

    #[test]
    fn rectangular_block() {
        let g = Graph::new();
        let m = numbered(&g, 3, 3);
        // column-major values: m[r, c] = c * 3 + r
        let block = m.slice(Slice::new(1, 3), Slice::new(0, 2)).unwrap();
        assert_eq!(block.shape(), (2, 2));
        assert_eq!(
            block.constant_values().unwrap().to_rows(),
            vec![vec![1.0, 4.0], vec![2.0, 5.0]]
        );
        assert_eq!(m.row(-1).unwrap().shape(), (1, 3));
        assert_eq!(m.col(0).unwrap().shape(), (3, 1));
    }

    #[test]
    fn slicing_adds_no_nodes() {
        let g = Graph::new();
        let m = MatrixExpr::sym(&g, "m", 4, 4);
        let before = g.len();
        let _ = m.slice(Slice::new(1, -1), Slice::all().with_step(3)).unwrap();
        assert_eq!(g.len(), before);
    }
}
