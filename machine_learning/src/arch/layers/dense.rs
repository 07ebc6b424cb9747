use ndarray::{linalg, prelude::*};

use super::ensure_dim;
use crate::{MlErr, Result, arch::activations::ActFn};

/// A fully connected layer, `a = act(x · w + b)`.
///
/// The layer does not own its parameters, it works over the slice of the model's flat
/// parameter buffer it is handed, laid out as the `(in, out)` kernel followed by the bias.
#[derive(Clone, Debug)]
pub struct Dense {
    dim: (usize, usize),
    act_fn: Option<ActFn>,
    size: usize,

    // Forward metadata
    x: Array2<f32>,
    z: Array2<f32>,
    a: Array2<f32>,

    // Backward metadata
    d: Array2<f32>,
}

impl Dense {
    /// Creates a new `Dense` layer.
    ///
    /// # Arguments
    /// * `dim` - The input and output widths.
    /// * `act_fn` - The activation applied to the output, `None` for a linear layer.
    pub fn new(dim: (usize, usize), act_fn: Option<ActFn>) -> Self {
        let zeros = Array2::zeros((1, 1));

        Self {
            dim,
            size: (dim.0 + 1) * dim.1,
            act_fn,
            x: zeros.clone(),
            z: zeros.clone(),
            a: zeros.clone(),
            d: zeros,
        }
    }

    /// Returns the size of this layer.
    ///
    /// # Returns
    /// The amount of parameters this layer has.
    pub fn size(&self) -> usize {
        self.size
    }

    pub fn dim(&self) -> (usize, usize) {
        self.dim
    }

    /// Returns the shapes of the kernel and the bias, in that order.
    pub fn shapes(&self) -> [Vec<usize>; 2] {
        [vec![self.dim.0, self.dim.1], vec![self.dim.1]]
    }

    /// Makes a forward pass through the layer, caching what the backward pass needs.
    ///
    /// # Arguments
    /// * `params` - This layer's slice of parameters.
    /// * `x` - A batch of inputs, one row per sample.
    ///
    /// # Returns
    /// A view of the layer's output for the batch.
    pub fn forward(&mut self, params: &[f32], x: ArrayView2<f32>) -> Result<ArrayView2<'_, f32>> {
        if x.ncols() != self.dim.0 {
            return Err(MlErr::SizeMismatch {
                what: "dense layer input",
                got: x.ncols(),
                expected: self.dim.0,
            });
        }

        let (w, b) = self.view_params(params)?;
        let shape = (x.nrows(), self.dim.1);

        ensure_dim(&mut self.z, shape);
        linalg::general_mat_mul(1.0, &x, &w, 0.0, &mut self.z);
        self.z += &b;

        self.x = x.to_owned();

        let Some(act_fn) = self.act_fn else {
            return Ok(self.z.view());
        };

        ensure_dim(&mut self.a, shape);
        self.a.zip_mut_with(&self.z, |a, &z| *a = act_fn.f(z));
        Ok(self.a.view())
    }

    /// Backpropagates `d` through the layer.
    ///
    /// # Arguments
    /// * `params` - This layer's slice of parameters.
    /// * `grad` - This layer's slice of the gradient buffer, overwritten.
    /// * `d` - The loss derivative with respect to this layer's output.
    ///
    /// # Returns
    /// The loss derivative with respect to this layer's input.
    pub fn backward(
        &mut self,
        params: &[f32],
        grad: &mut [f32],
        mut d: ArrayViewMut2<f32>,
    ) -> Result<ArrayViewMut2<'_, f32>> {
        if let Some(act_fn) = self.act_fn {
            d.zip_mut_with(&self.z, |d, &z| *d *= act_fn.df(z));
        }

        let (mut dw, mut db) = self.view_grad(grad)?;
        linalg::general_mat_mul(1.0, &self.x.t(), &d, 0.0, &mut dw);
        db.assign(&d.sum_axis(Axis(0)));

        let (w, _) = self.view_params(params)?;
        ensure_dim(&mut self.d, (d.nrows(), self.dim.0));
        linalg::general_mat_mul(1.0, &d, &w.t(), 0.0, &mut self.d);

        Ok(self.d.view_mut())
    }

    /// Gives a view of the raw gradient slice as the delta weights and delta biases of this layer.
    fn view_grad<'a>(
        &self,
        grad: &'a mut [f32],
    ) -> Result<(ArrayViewMut2<'a, f32>, ArrayViewMut1<'a, f32>)> {
        self.check_len(grad.len())?;

        let w_size = self.size - self.dim.1;
        let (dw_raw, db_raw) = grad.split_at_mut(w_size);
        let dw = ArrayViewMut2::from_shape(self.dim, dw_raw).map_err(|_| self.mismatch(w_size))?;
        let db = ArrayViewMut1::from_shape(self.dim.1, db_raw).map_err(|_| self.mismatch(w_size))?;
        Ok((dw, db))
    }

    /// Gives a view of the raw parameter slice as the weights and biases of this layer.
    fn view_params<'a>(
        &self,
        params: &'a [f32],
    ) -> Result<(ArrayView2<'a, f32>, ArrayView1<'a, f32>)> {
        self.check_len(params.len())?;

        let w_size = self.size - self.dim.1;
        let (w_raw, b_raw) = params.split_at(w_size);
        let w = ArrayView2::from_shape(self.dim, w_raw).map_err(|_| self.mismatch(w_size))?;
        let b = ArrayView1::from_shape(self.dim.1, b_raw).map_err(|_| self.mismatch(w_size))?;
        Ok((w, b))
    }

    fn check_len(&self, len: usize) -> Result<()> {
        if len != self.size {
            return Err(self.mismatch(len));
        }

        Ok(())
    }

    fn mismatch(&self, got: usize) -> MlErr {
        MlErr::SizeMismatch {
            what: "dense layer parameters",
            got,
            expected: self.size,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // w = [[1, 2], [3, 4]], b = [0.5, -10]
    const PARAMS: [f32; 6] = [1., 2., 3., 4., 0.5, -10.];

    #[test]
    fn forward_applies_kernel_bias_and_activation() {
        let mut dense = Dense::new((2, 2), Some(ActFn::relu()));
        let x = array![[1., 1.], [0., 2.]];

        let out = dense.forward(&PARAMS, x.view()).unwrap();

        // z = [[4.5, -4], [6.5, -2]]
        assert_eq!(out, array![[4.5, 0.], [6.5, 0.]]);
    }

    #[test]
    fn backward_matches_hand_computed_gradient() {
        let mut dense = Dense::new((2, 2), None);
        let x = array![[1., 2.]];
        dense.forward(&PARAMS, x.view()).unwrap();

        let mut grad = [0.; 6];
        let mut d = array![[1., -1.]];
        let dx = dense.backward(&PARAMS, &mut grad, d.view_mut()).unwrap();

        // dx = d · wᵀ
        assert_eq!(dx, array![[-1., -1.]]);
        // dw = xᵀ · d, db = d
        assert_eq!(grad, [1., -1., 2., -2., 1., -1.]);
    }

    #[test]
    fn wrong_input_width_is_rejected() {
        let mut dense = Dense::new((2, 2), None);
        let x = array![[1., 2., 3.]];
        assert!(dense.forward(&PARAMS, x.view()).is_err());
    }
}
