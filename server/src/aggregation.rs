//! Sample-weighted averaging of client updates.

use machine_learning::{ParameterVector, Tensor};

use crate::AggregationErr;

/// Averages parameter vectors weighted by the amount of samples behind each one.
///
/// Every tensor is accumulated in `f64` and divided once by the total weight, so the
/// result only depends on the order of `updates`. Callers must pass them in a stable
/// order (by client id) for two runs over the same updates to agree bit for bit.
///
/// # Arguments
/// * `updates` - Pairs of parameters and their positive sample counts.
///
/// # Returns
/// A vector with the shapes of the first update.
///
/// # Errors
/// * `InsufficientUpdates` if `updates` is empty.
/// * `ZeroWeight` if any sample count is zero.
/// * `ShapeMismatch` if any update's shapes disagree with the first one's.
pub fn aggregate(updates: &[(&ParameterVector, usize)]) -> Result<ParameterVector, AggregationErr> {
    let Some(((first, _), _)) = updates.split_first() else {
        return Err(AggregationErr::InsufficientUpdates);
    };

    let shapes = first.shapes();

    for (index, (params, weight)) in updates.iter().enumerate() {
        if *weight == 0 {
            return Err(AggregationErr::ZeroWeight { index });
        }

        params
            .ensure_shapes(&shapes)
            .map_err(|source| AggregationErr::ShapeMismatch { index, source })?;
    }

    let total: f64 = updates.iter().map(|(_, weight)| *weight as f64).sum();
    let mut acc: Vec<Vec<f64>> = first.tensors().iter().map(|t| vec![0.0; t.len()]).collect();

    for (params, weight) in updates {
        let weight = *weight as f64;

        for (sums, tensor) in acc.iter_mut().zip(params.tensors()) {
            for (sum, &x) in sums.iter_mut().zip(tensor.data()) {
                *sum += weight * x as f64;
            }
        }
    }

    let tensors = acc
        .into_iter()
        .zip(shapes)
        .map(|(sums, shape)| {
            let data = sums.into_iter().map(|sum| (sum / total) as f32).collect();
            Tensor::new(shape, data)
        })
        .collect::<Result<Vec<_>, _>>()
        .map_err(|source| AggregationErr::ShapeMismatch { index: 0, source })?;

    Ok(ParameterVector::new(tensors))
}

/// Averages scalar values weighted by sample counts, `None` if the total weight is zero.
pub fn weighted_mean<I>(values: I) -> Option<f32>
where
    I: IntoIterator<Item = (f32, usize)>,
{
    let (sum, total) = values
        .into_iter()
        .fold((0.0f64, 0usize), |(sum, total), (value, weight)| {
            (sum + value as f64 * weight as f64, total + weight)
        });

    (total > 0).then(|| (sum / total as f64) as f32)
}
