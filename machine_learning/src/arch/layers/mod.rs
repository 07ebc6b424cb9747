mod dense;
mod embedding;

pub use dense::Dense;
pub use embedding::Embedding;

use ndarray::Array2;

/// Reuses `buf` when it already has `shape`, reallocates it otherwise.
fn ensure_dim(buf: &mut Array2<f32>, shape: (usize, usize)) {
    if buf.dim() != shape {
        *buf = Array2::zeros(shape);
    }
}
