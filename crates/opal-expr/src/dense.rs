//! Dense numeric matrices (column-major) for function inputs and outputs.

use std::fmt;

#[derive(Debug, Clone, PartialEq)]
pub struct DenseMatrix {
    rows: usize,
    cols: usize,
    data: Vec<f64>,
}

impl DenseMatrix {
    /// Matrix of zeros.
    pub fn zeros(rows: usize, cols: usize) -> Self {
        Self::filled(rows, cols, 0.0)
    }

    /// Matrix with every element set to `value`.
    pub fn filled(rows: usize, cols: usize, value: f64) -> Self {
        Self {
            rows,
            cols,
            data: vec![value; rows * cols],
        }
    }

    /// 1x1 matrix.
    pub fn scalar(value: f64) -> Self {
        Self {
            rows: 1,
            cols: 1,
            data: vec![value],
        }
    }

    /// Column vector.
    pub fn column(values: Vec<f64>) -> Self {
        Self {
            rows: values.len(),
            cols: 1,
            data: values,
        }
    }

    /// From column-major data. Returns `None` when the length does not match.
    pub fn from_column_major(rows: usize, cols: usize, data: Vec<f64>) -> Option<Self> {
        (data.len() == rows * cols).then_some(Self { rows, cols, data })
    }

    /// From row slices. Returns `None` for ragged input.
    pub fn from_rows(rows: &[Vec<f64>]) -> Option<Self> {
        let nrows = rows.len();
        let ncols = rows.first().map_or(0, Vec::len);
        if rows.iter().any(|row| row.len() != ncols) {
            return None;
        }
        let mut data = Vec::with_capacity(nrows * ncols);
        for col in 0..ncols {
            for row in rows {
                data.push(row[col]);
            }
        }
        Some(Self {
            rows: nrows,
            cols: ncols,
            data,
        })
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

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Column-major storage.
    pub fn data(&self) -> &[f64] {
        &self.data
    }

    pub fn into_data(self) -> Vec<f64> {
        self.data
    }

    pub fn get(&self, row: usize, col: usize) -> Option<f64> {
        if row < self.rows && col < self.cols {
            Some(self.data[col * self.rows + row])
        } else {
            None
        }
    }

    /// Value of a 1x1 matrix.
    pub fn as_scalar(&self) -> Option<f64> {
        (self.data.len() == 1).then(|| self.data[0])
    }

    /// Rows as nested vectors, for display and serialization.
    pub fn to_rows(&self) -> Vec<Vec<f64>> {
        (0..self.rows)
            .map(|row| {
                (0..self.cols)
                    .map(|col| self.data[col * self.rows + row])
                    .collect()
            })
            .collect()
    }
}

impl fmt::Display for DenseMatrix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(value) = self.as_scalar() {
            return write!(f, "{value}");
        }
        write!(f, "[")?;
        for (r, row) in self.to_rows().iter().enumerate() {
            if r > 0 {
                write!(f, ", ")?;
            }
            let cells = row.iter().map(f64::to_string).collect::<Vec<_>>();
            write!(f, "[{}]", cells.join(", "))?;
        }
        write!(f, "]")
    }
}

#[cfg(test)]
#[allow(clippy::float_cmp)]
mod tests {
    use super::DenseMatrix;

    #[test]
    fn from_rows_is_column_major() {
        let m = DenseMatrix::from_rows(&[vec![1.0, 2.0], vec![3.0, 4.0]]).unwrap();
        assert_eq!(m.data(), &[1.0, 3.0, 2.0, 4.0]);
        assert_eq!(m.get(0, 1), Some(2.0));
        assert_eq!(m.get(2, 0), None);
    }

    #[test]
    fn ragged_rows_are_rejected() {
        assert!(DenseMatrix::from_rows(&[vec![1.0], vec![1.0, 2.0]]).is_none());
    }

    #[test]
    fn column_major_length_checked() {
        assert!(DenseMatrix::from_column_major(2, 2, vec![1.0]).is_none());
    }

    #[test]
    fn display_rows() {
        let m = DenseMatrix::from_rows(&[vec![1.0, 2.0], vec![3.0, 4.0]]).unwrap();
        assert_eq!(m.to_string(), "[[1, 2], [3, 4]]");
        assert_eq!(DenseMatrix::scalar(19.0).to_string(), "19");
    }
}
