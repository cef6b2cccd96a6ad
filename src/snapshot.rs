/// An owned, point-in-time copy of the window, row-major, oldest row first.
///
/// Never aliases the live window storage, so it can be processed without holding any lock.
#[derive(Debug, Clone, PartialEq)]
pub struct Snapshot {
    rows: usize,
    columns: usize,
    data: Vec<f64>,
}

impl Snapshot {
    /// An all-zero snapshot, used as a reusable scratch buffer.
    pub fn zeroed(rows: usize, columns: usize) -> Self {
        Self {
            rows,
            columns,
            data: vec![0.0; rows * columns],
        }
    }

    /// Builds a snapshot from row-major cells.
    ///
    /// # Panics
    /// Panics if `data.len()` is not a multiple of `columns`.
    pub fn from_cells(columns: usize, data: Vec<f64>) -> Self {
        assert!(
            columns > 0 && data.len().is_multiple_of(columns),
            "{} cells do not form rows of {} columns",
            data.len(),
            columns
        );
        Self {
            rows: data.len() / columns,
            columns,
            data,
        }
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn columns(&self) -> usize {
        self.columns
    }

    pub fn as_slice(&self) -> &[f64] {
        &self.data
    }

    pub(crate) fn as_mut_slice(&mut self) -> &mut [f64] {
        &mut self.data
    }

    pub fn row(&self, index: usize) -> Option<&[f64]> {
        if index >= self.rows {
            return None;
        }
        let start = index * self.columns;
        Some(&self.data[start..start + self.columns])
    }

    pub fn iter_rows(&self) -> impl Iterator<Item = &[f64]> {
        self.data.chunks_exact(self.columns)
    }

    /// Copies one column into `out`, which must hold exactly `rows()` values.
    pub fn column_into(&self, column: usize, out: &mut [f64]) {
        assert!(column < self.columns, "column {} out of {}", column, self.columns);
        assert_eq!(out.len(), self.rows, "column buffer has the wrong length");
        for (dst, row) in out.iter_mut().zip(self.iter_rows()) {
            *dst = row[column];
        }
    }

    pub fn column(&self, column: usize) -> Vec<f64> {
        let mut out = vec![0.0; self.rows];
        self.column_into(column, &mut out);
        out
    }

    /// Arithmetic mean of every column over all rows, written into `out`.
    pub fn column_means_into(&self, out: &mut [f64]) {
        assert_eq!(out.len(), self.columns, "means buffer has the wrong length");
        out.fill(0.0);
        for row in self.iter_rows() {
            for (sum, value) in out.iter_mut().zip(row) {
                *sum += *value;
            }
        }
        if self.rows > 0 {
            let rows = self.rows as f64;
            out.iter_mut().for_each(|sum| *sum /= rows);
        }
    }

    pub fn column_means(&self) -> Vec<f64> {
        let mut out = vec![0.0; self.columns];
        self.column_means_into(&mut out);
        out
    }
}
