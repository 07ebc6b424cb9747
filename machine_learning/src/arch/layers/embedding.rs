use ndarray::prelude::*;

use super::ensure_dim;
use crate::{MlErr, Result};

/// A lookup table mapping a categorical index to a dense row.
#[derive(Clone, Debug)]
pub struct Embedding {
    dim: (usize, usize),
    indices: Vec<usize>,
    out: Array2<f32>,
}

impl Embedding {
    /// Creates a new `Embedding` with `dim.0` categories of width `dim.1`.
    pub fn new(dim: (usize, usize)) -> Self {
        Self {
            dim,
            indices: Vec::new(),
            out: Array2::zeros((1, 1)),
        }
    }

    pub fn size(&self) -> usize {
        self.dim.0 * self.dim.1
    }

    pub fn dim(&self) -> (usize, usize) {
        self.dim
    }

    pub fn shape(&self) -> Vec<usize> {
        vec![self.dim.0, self.dim.1]
    }

    /// Looks up the row of every index in `indices`.
    ///
    /// # Arguments
    /// * `params` - The flattened table.
    /// * `indices` - One category index per sample.
    ///
    /// # Returns
    /// A `(indices.len(), width)` view or an error if an index is out of the table.
    pub fn forward(&mut self, params: &[f32], indices: &[usize]) -> Result<ArrayView2<'_, f32>> {
        let table = self.view(params)?;

        ensure_dim(&mut self.out, (indices.len(), self.dim.1));
        for (mut row, &index) in self.out.rows_mut().into_iter().zip(indices) {
            if index >= self.dim.0 {
                return Err(MlErr::IndexOutOfRange {
                    what: "embedding",
                    index,
                    len: self.dim.0,
                });
            }

            row.assign(&table.row(index));
        }

        self.indices.clear();
        self.indices.extend_from_slice(indices);
        Ok(self.out.view())
    }

    /// Scatters `d` into the table gradient, rows looked up more than once accumulate.
    pub fn backward(&self, grad: &mut [f32], d: ArrayView2<f32>) -> Result<()> {
        if grad.len() != self.size() {
            return Err(MlErr::SizeMismatch {
                what: "embedding gradient",
                got: grad.len(),
                expected: self.size(),
            });
        }

        let mut dtable = ArrayViewMut2::from_shape(self.dim, grad).map_err(|_| MlErr::SizeMismatch {
            what: "embedding gradient",
            got: self.dim.0 * self.dim.1,
            expected: self.size(),
        })?;
        dtable.fill(0.);

        for (row, &index) in d.rows().into_iter().zip(&self.indices) {
            let mut target = dtable.row_mut(index);
            target += &row;
        }

        Ok(())
    }

    fn view<'a>(&self, params: &'a [f32]) -> Result<ArrayView2<'a, f32>> {
        ArrayView2::from_shape(self.dim, params).map_err(|_| MlErr::SizeMismatch {
            what: "embedding table",
            got: params.len(),
            expected: self.size(),
        })
    }
}
