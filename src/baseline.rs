//! Baseline correction of epoched data.
//!
//! `epochs` is always `[E, C, T]`.  For every epoch and channel the mean of
//! the samples inside the baseline interval is subtracted from the whole
//! channel trace, as `epochs.apply_baseline((tmin, tmax))` does.
use ndarray::{s, Array3, ArrayViewMut2, Axis};

/// Subtract the per-channel mean of samples `start..stop` from each epoch.
///
/// An empty or out-of-range interval leaves the data untouched.
pub fn baseline_correct_range_inplace(epochs: &mut Array3<f32>, start: usize, stop: usize) {
    let stop = stop.min(epochs.dim().2);
    if start >= stop {
        return;
    }
    for epoch in epochs.axis_iter_mut(Axis(0)) {
        correct_epoch(epoch, start, stop);
    }
}

/// Subtract the per-channel mean of the whole window.
pub fn baseline_correct_inplace(epochs: &mut Array3<f32>) {
    let n_t = epochs.dim().2;
    baseline_correct_range_inplace(epochs, 0, n_t);
}

fn correct_epoch(mut epoch: ArrayViewMut2<'_, f32>, start: usize, stop: usize) {
    for mut ch in epoch.rows_mut() {
        let m = ch.slice(s![start..stop]).mean().unwrap_or(0.0);
        ch.mapv_inplace(|v| v - m);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn whole_window_mean_removed() {
        let mut epochs = Array3::from_shape_fn((3, 8, 128), |(e, c, t)| {
            e as f32 * 10.0 + c as f32 * 5.0 + (t as f32 * 0.1).sin()
        });
        baseline_correct_inplace(&mut epochs);
        for e in 0..3 {
            for c in 0..8 {
                let m = epochs.slice(s![e, c, ..]).mean().unwrap();
                approx::assert_abs_diff_eq!(m, 0.0, epsilon = 1e-5_f32);
            }
        }
    }

    #[test]
    fn prestimulus_interval_only() {
        // Baseline samples hold 2.0, post-stimulus samples 7.0.
        let mut epochs = Array3::from_shape_fn((1, 2, 10), |(_, _, t)| if t < 4 { 2.0 } else { 7.0 });
        baseline_correct_range_inplace(&mut epochs, 0, 4);
        assert_eq!(epochs[[0, 1, 0]], 0.0);
        assert_eq!(epochs[[0, 1, 9]], 5.0);
    }

    #[test]
    fn empty_interval_is_noop() {
        let mut epochs = Array3::from_elem((1, 1, 4), 1.0_f32);
        baseline_correct_range_inplace(&mut epochs, 3, 3);
        assert!(epochs.iter().all(|&v| v == 1.0));
    }
}
