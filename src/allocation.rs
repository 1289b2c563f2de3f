use serde::{Deserialize, Serialize};

/// Energy bought by each buyer (rows) from each seller (columns, grid last)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AllocationMatrix {
    nr_buyers: usize,
    nr_columns: usize,
    cells: Vec<f64>,
}

impl AllocationMatrix {
    /// All-zero allocation
    pub fn zeros(nr_buyers: usize, nr_columns: usize) -> Self {
        Self {
            nr_buyers,
            nr_columns,
            cells: vec![0.0; nr_buyers * nr_columns],
        }
    }

    /// Allocation from a row-major vector, as returned by a flat optimizer
    /// Returns `None` when the vector length does not match the shape
    pub fn from_flat(nr_buyers: usize, nr_columns: usize, cells: Vec<f64>) -> Option<Self> {
        if cells.len() != nr_buyers * nr_columns {
            return None;
        }
        Some(Self { nr_buyers, nr_columns, cells })
    }

    pub fn get(&self, buyer: usize, seller: usize) -> f64 {
        self.cells[buyer * self.nr_columns + seller]
    }

    pub fn set(&mut self, buyer: usize, seller: usize, value: f64) {
        self.cells[buyer * self.nr_columns + seller] = value;
    }

    pub fn row(&self, buyer: usize) -> &[f64] {
        let start = buyer * self.nr_columns;
        &self.cells[start..start + self.nr_columns]
    }

    /// Overwrite one buyer's row
    pub fn set_row(&mut self, buyer: usize, values: &[f64]) {
        let start = buyer * self.nr_columns;
        self.cells[start..start + self.nr_columns].copy_from_slice(values);
    }

    pub fn rows(&self) -> impl Iterator<Item = &[f64]> {
        self.cells.chunks(self.nr_columns.max(1))
    }

    pub fn row_sum(&self, buyer: usize) -> f64 {
        self.row(buyer).iter().sum()
    }

    /// Aggregate load per seller (column sums)
    pub fn loads(&self) -> Vec<f64> {
        let mut loads = vec![0.0; self.nr_columns];
        for row in self.rows() {
            for (load, value) in loads.iter_mut().zip(row) {
                *load += value;
            }
        }
        loads
    }

    /// Aggregate load per seller from every buyer except `excluded`
    ///
    /// Summed row by row rather than subtracted from the totals so that the result does not
    /// carry the excluded row's rounding.
    pub fn loads_excluding(&self, excluded: usize) -> Vec<f64> {
        let mut loads = vec![0.0; self.nr_columns];
        for (buyer, row) in self.rows().enumerate() {
            if buyer == excluded {
                continue;
            }
            for (load, value) in loads.iter_mut().zip(row) {
                *load += value;
            }
        }
        loads
    }
}

/// Element-wise closeness with an absolute tolerance
pub fn all_close(a: &[f64], b: &[f64], atol: f64) -> bool {
    a.len() == b.len() && a.iter().zip(b).all(|(x, y)| (x - y).abs() <= atol)
}
