use crate::common::*;

/// Pairwise IoU between two box sets, stored row-major.
///
/// Rows index the first set (anchors) and columns the second set (ground
/// truth). An empty column set yields a matrix with rows but no columns.
#[derive(Debug, Clone, PartialEq)]
pub struct OverlapMatrix {
    num_rows: usize,
    num_cols: usize,
    values: Vec<f64>,
}

impl OverlapMatrix {
    pub fn new<R1, R2>(rows: &[R1], cols: &[R2]) -> Self
    where
        R1: Rect<Type = f64>,
        R2: Rect<Type = f64>,
    {
        let values = iproduct!(rows, cols)
            .map(|(lhs, rhs)| lhs.iou_with(rhs))
            .collect();

        Self {
            num_rows: rows.len(),
            num_cols: cols.len(),
            values,
        }
    }

    pub fn num_rows(&self) -> usize {
        self.num_rows
    }

    pub fn num_cols(&self) -> usize {
        self.num_cols
    }

    pub fn get(&self, row: usize, col: usize) -> Option<f64> {
        (row < self.num_rows && col < self.num_cols)
            .then(|| self.values[row * self.num_cols + col])
    }

    pub fn row(&self, row: usize) -> &[f64] {
        let start = row * self.num_cols;
        &self.values[start..(start + self.num_cols)]
    }

    pub fn rows(&self) -> impl Iterator<Item = &[f64]> + '_ {
        (0..self.num_rows).map(move |row| self.row(row))
    }

    /// Returns the column index and value of the maximum of each row.
    ///
    /// Ties resolve to the lowest column index. Rows of a matrix without
    /// columns have no maximum.
    pub fn row_argmax(&self) -> Vec<Option<(usize, f64)>> {
        self.rows()
            .map(|row| {
                row.iter()
                    .copied()
                    .enumerate()
                    .fold(None, |max: Option<(usize, f64)>, (col, value)| match max {
                        Some((_, max_value)) if max_value >= value => max,
                        _ => Some((col, value)),
                    })
            })
            .collect()
    }

    /// Returns the maximum value of each column.
    pub fn col_max(&self) -> Vec<f64> {
        let mut maxima = vec![0.0; self.num_cols];
        self.rows().for_each(|row| {
            maxima.iter_mut().zip(row).for_each(|(max, &value)| {
                if value > *max {
                    *max = value;
                }
            });
        });
        maxima
    }
}
