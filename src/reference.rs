//! Average reference: subtract the mean across channels at each time point.
//!
//! Matches `raw.set_eeg_reference('average', projection=False)`.
use ndarray::{Array2, Axis};

/// `data[c, t] -= mean(data[:, t])` for a `[C, T]` array.
pub fn average_reference_inplace(data: &mut Array2<f32>) {
    let Some(means) = data.mean_axis(Axis(0)) else {
        return;
    };
    for mut row in data.rows_mut() {
        row -= &means;
    }
}
