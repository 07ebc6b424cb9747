use crate::{MlErr, Result};

/// Adam with the Keras defaults, the optimizer the health model was designed around.
#[derive(Debug, Clone)]
pub struct Adam {
    learning_rate: f32,
    /// First and second moment estimates, one pair per parameter.
    moments: Box<[(f32, f32)]>,
    steps: i32,
}

impl Adam {
    const BETA1: f32 = 0.9;
    const BETA2: f32 = 0.999;
    const EPSILON: f32 = 1e-7;

    pub const DEFAULT_LEARNING_RATE: f32 = 1e-3;

    /// Creates an optimizer for `len` parameters.
    pub fn new(len: usize, learning_rate: f32) -> Self {
        Self {
            learning_rate,
            moments: vec![(0., 0.); len].into_boxed_slice(),
            steps: 0,
        }
    }

    pub fn with_defaults(len: usize) -> Self {
        Self::new(len, Self::DEFAULT_LEARNING_RATE)
    }

    /// Moves `params` one step against `grad`.
    ///
    /// # Errors
    /// `MlErr::SizeMismatch` if either buffer isn't as long as the optimizer state.
    pub fn step(&mut self, params: &mut [f32], grad: &[f32]) -> Result<()> {
        let len = self.moments.len();
        if params.len() != len || grad.len() != len {
            return Err(MlErr::SizeMismatch {
                what: "optimizer buffers",
                got: params.len().max(grad.len()),
                expected: len,
            });
        }

        self.steps += 1;
        let correction1 = 1. - Self::BETA1.powi(self.steps);
        let correction2 = 1. - Self::BETA2.powi(self.steps);
        let rate = self.learning_rate * correction2.sqrt() / correction1;

        for ((p, &g), (m, v)) in params.iter_mut().zip(grad).zip(self.moments.iter_mut()) {
            *m = Self::BETA1 * *m + (1. - Self::BETA1) * g;
            *v = Self::BETA2 * *v + (1. - Self::BETA2) * g * g;
            *p -= rate * *m / (v.sqrt() + Self::EPSILON);
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_step_moves_by_learning_rate_against_gradient() {
        let mut adam = Adam::with_defaults(2);
        let mut params = [1.0, -1.0];

        adam.step(&mut params, &[0.5, -2.0]).unwrap();

        assert!((params[0] - (1.0 - 1e-3)).abs() < 1e-6);
        assert!((params[1] - (-1.0 + 1e-3)).abs() < 1e-6);
    }

    #[test]
    fn zero_gradient_leaves_params_alone() {
        let mut adam = Adam::with_defaults(1);
        let mut params = [0.25];

        adam.step(&mut params, &[0.0]).unwrap();
        assert_eq!(params, [0.25]);
    }

    #[test]
    fn mismatched_lengths_are_rejected() {
        let mut adam = Adam::with_defaults(2);
        let mut params = [0.0; 3];
        assert!(adam.step(&mut params, &[0.0; 3]).is_err());
    }
}
