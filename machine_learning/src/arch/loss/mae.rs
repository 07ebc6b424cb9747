use ndarray::ArrayView2;

/// Mean absolute error, reported as a metric next to the loss.
pub fn mae(y_pred: ArrayView2<f32>, y: ArrayView2<f32>) -> f32 {
    (&y_pred - &y).mapv(f32::abs).mean().unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use ndarray::array;

    use super::*;

    #[test]
    fn mae_averages_absolute_errors() {
        let y_pred = array![[1.], [4.], [-2.]];
        let y = array![[2.], [2.], [-2.]];
        assert_eq!(mae(y_pred.view(), y.view()), 1.);
    }
}
