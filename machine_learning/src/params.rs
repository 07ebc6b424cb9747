//! The parameter vector: an ordered sequence of tensors holding one model's full state.
//!
//! Shapes are part of the value. Two vectors with a different shape list are different
//! models, so every operation that pairs them checks the shapes and refuses to coerce.

use crate::{MlErr, Result};

/// A dense row-major `f32` tensor.
#[derive(Debug, Clone, PartialEq)]
pub struct Tensor {
    shape: Vec<usize>,
    data: Vec<f32>,
}

impl Tensor {
    /// Creates a new `Tensor`.
    ///
    /// # Arguments
    /// * `shape` - The dimensions of the tensor.
    /// * `data` - The row-major values, its length must be the product of `shape`.
    ///
    /// # Returns
    /// A new `Tensor` or `MlErr::SizeMismatch` if `data` doesn't fit `shape`.
    pub fn new(shape: Vec<usize>, data: Vec<f32>) -> Result<Self> {
        let expected = shape.iter().product();
        if data.len() != expected {
            return Err(MlErr::SizeMismatch {
                what: "tensor data",
                got: data.len(),
                expected,
            });
        }

        Ok(Self { shape, data })
    }

    /// Creates a tensor of the given shape filled with zeros.
    pub fn zeros(shape: Vec<usize>) -> Self {
        let len = shape.iter().product();
        Self {
            shape,
            data: vec![0.0; len],
        }
    }

    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    pub fn data(&self) -> &[f32] {
        &self.data
    }

    pub fn data_mut(&mut self) -> &mut [f32] {
        &mut self.data
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

/// An ordered list of tensors with fixed shapes per architecture.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ParameterVector {
    tensors: Vec<Tensor>,
}

impl ParameterVector {
    pub fn new(tensors: Vec<Tensor>) -> Self {
        Self { tensors }
    }

    /// Creates a vector of zero-filled tensors with the given shapes.
    pub fn zeros(shapes: &[Vec<usize>]) -> Self {
        Self::new(shapes.iter().cloned().map(Tensor::zeros).collect())
    }

    /// Rebuilds a vector from its flattened values.
    ///
    /// # Arguments
    /// * `shapes` - The shape of every tensor, in order.
    /// * `flat` - Every tensor's values concatenated in order.
    ///
    /// # Returns
    /// The vector or `MlErr::SizeMismatch` if `flat` holds more or fewer values than `shapes` describe.
    pub fn from_flat(shapes: &[Vec<usize>], flat: &[f32]) -> Result<Self> {
        let expected: usize = shapes.iter().map(|s| s.iter().product::<usize>()).sum();
        if flat.len() != expected {
            return Err(MlErr::SizeMismatch {
                what: "flattened parameters",
                got: flat.len(),
                expected,
            });
        }

        let mut rest = flat;
        let mut tensors = Vec::with_capacity(shapes.len());

        for shape in shapes {
            let (head, tail) = rest.split_at(shape.iter().product());
            tensors.push(Tensor::new(shape.clone(), head.to_vec())?);
            rest = tail;
        }

        Ok(Self { tensors })
    }

    pub fn tensors(&self) -> &[Tensor] {
        &self.tensors
    }

    pub fn tensors_mut(&mut self) -> &mut [Tensor] {
        &mut self.tensors
    }

    /// Returns the amount of tensors.
    pub fn len(&self) -> usize {
        self.tensors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tensors.is_empty()
    }

    /// Returns the total amount of scalar parameters.
    pub fn num_params(&self) -> usize {
        self.tensors.iter().map(Tensor::len).sum()
    }

    pub fn shapes(&self) -> Vec<Vec<usize>> {
        self.tensors.iter().map(|t| t.shape.clone()).collect()
    }

    /// Writes every tensor's values in order into `buf`, replacing its contents.
    pub fn flatten_into(&self, buf: &mut Vec<f32>) {
        buf.clear();
        buf.reserve(self.num_params());

        for tensor in &self.tensors {
            buf.extend_from_slice(&tensor.data);
        }
    }

    pub fn to_flat(&self) -> Vec<f32> {
        let mut buf = Vec::new();
        self.flatten_into(&mut buf);
        buf
    }

    /// Checks that this vector has exactly the given shapes.
    ///
    /// # Returns
    /// `MlErr::TensorCount` or `MlErr::ShapeMismatch` describing the first disagreement.
    pub fn ensure_shapes(&self, shapes: &[Vec<usize>]) -> Result<()> {
        if self.tensors.len() != shapes.len() {
            return Err(MlErr::TensorCount {
                got: self.tensors.len(),
                expected: shapes.len(),
            });
        }

        for (index, (tensor, expected)) in self.tensors.iter().zip(shapes).enumerate() {
            if tensor.shape != *expected {
                return Err(MlErr::ShapeMismatch {
                    index,
                    got: tensor.shape.clone(),
                    expected: expected.clone(),
                });
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tensor_rejects_data_of_wrong_length() {
        assert!(matches!(
            Tensor::new(vec![2, 3], vec![0.0; 5]),
            Err(MlErr::SizeMismatch { got: 5, expected: 6, .. })
        ));
    }

    #[test]
    fn flat_values_are_split_by_shape() {
        let shapes = vec![vec![2, 2], vec![2], vec![1]];
        let params = ParameterVector::from_flat(&shapes, &[1., 2., 3., 4., 5., 6., 7.]).unwrap();

        assert_eq!(params.len(), 3);
        assert_eq!(params.tensors()[0].data(), &[1., 2., 3., 4.]);
        assert_eq!(params.tensors()[1].data(), &[5., 6.]);
        assert_eq!(params.tensors()[2].data(), &[7.]);
        assert_eq!(params.to_flat(), vec![1., 2., 3., 4., 5., 6., 7.]);
    }

    #[test]
    fn flat_values_of_wrong_total_are_rejected() {
        let shapes = vec![vec![2], vec![2]];
        assert!(ParameterVector::from_flat(&shapes, &[1., 2., 3.]).is_err());
    }

    #[test]
    fn shape_disagreement_is_reported_not_coerced() {
        let params = ParameterVector::zeros(&[vec![3, 2], vec![2]]);

        assert!(params.ensure_shapes(&[vec![3, 2], vec![2]]).is_ok());
        assert!(matches!(
            params.ensure_shapes(&[vec![2, 3], vec![2]]),
            Err(MlErr::ShapeMismatch { index: 0, .. })
        ));
        assert!(matches!(
            params.ensure_shapes(&[vec![3, 2]]),
            Err(MlErr::TensorCount { got: 2, expected: 1 })
        ));
    }
}
