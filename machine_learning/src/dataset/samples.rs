use ndarray::prelude::*;

use crate::{MlErr, Result};

/// Model-ready inputs: one row per sample across the three branches plus the target.
#[derive(Debug, Clone, PartialEq)]
pub struct Samples {
    env: Array2<f32>,
    text: Vec<usize>,
    wearable: Array2<f32>,
    target: Array2<f32>,
}

impl Samples {
    /// Creates a new `Samples`.
    ///
    /// # Returns
    /// The samples or `MlErr::SizeMismatch` if the inputs don't agree on the amount of rows.
    pub fn new(
        env: Array2<f32>,
        text: Vec<usize>,
        wearable: Array2<f32>,
        target: Array2<f32>,
    ) -> Result<Self> {
        let rows = env.nrows();
        for (what, got) in [
            ("text input rows", text.len()),
            ("wearable input rows", wearable.nrows()),
            ("target rows", target.nrows()),
        ] {
            if got != rows {
                return Err(MlErr::SizeMismatch {
                    what,
                    got,
                    expected: rows,
                });
            }
        }

        Ok(Self {
            env,
            text,
            wearable,
            target,
        })
    }

    pub fn len(&self) -> usize {
        self.text.len()
    }

    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }

    pub fn env(&self) -> ArrayView2<'_, f32> {
        self.env.view()
    }

    pub fn text(&self) -> &[usize] {
        &self.text
    }

    pub fn wearable(&self) -> ArrayView2<'_, f32> {
        self.wearable.view()
    }

    pub fn target(&self) -> ArrayView2<'_, f32> {
        self.target.view()
    }

    /// Copies the rows at `indices`, in that order.
    pub fn select(&self, indices: &[usize]) -> Self {
        Self {
            env: self.env.select(Axis(0), indices),
            text: indices.iter().map(|&i| self.text[i]).collect(),
            wearable: self.wearable.select(Axis(0), indices),
            target: self.target.select(Axis(0), indices),
        }
    }
}
