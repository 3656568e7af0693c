//! FFT resampling, matching `mne.filter.resample(..., method='fft')`.
//!
//! Each channel is padded (odd reflection, lengths from [`auto_npad`]), its
//! spectrum is truncated or zero-extended to the new length and scaled by
//! `new_len / old_len`, the Nyquist bin of the shorter spectrum is doubled
//! (downsampling) or halved (upsampling), and the padding is cut back off.
use anyhow::{bail, Result};
use ndarray::{Array2, ArrayView1};
use rustfft::{num_complex::Complex, FftPlanner};

use crate::filter::apply::reflect_limited_pad;

/// MNE's automatic padding: enough to reach the next power of two with at
/// least `min(n / 8, 100)` samples on each side.
pub fn auto_npad(n: usize) -> (usize, usize) {
    let min_add = (n / 8).min(100) * 2;
    let next_pow2 = (n + min_add).next_power_of_two();
    let total = next_pow2 - n;
    (total / 2, total - total / 2)
}

/// Resample `data` (`[C, T]`) from `src_sfreq` to `dst_sfreq`.
///
/// The output has `round(T · dst / src)` columns.
pub fn resample(data: &Array2<f32>, src_sfreq: f32, dst_sfreq: f32) -> Result<Array2<f32>> {
    if src_sfreq <= 0.0 || dst_sfreq <= 0.0 {
        bail!("invalid resampling rates {src_sfreq} Hz → {dst_sfreq} Hz");
    }
    if (src_sfreq - dst_sfreq).abs() < 1e-6 {
        return Ok(data.clone());
    }
    let ratio = dst_sfreq as f64 / src_sfreq as f64;
    let n_in = data.ncols();
    if n_in == 0 {
        bail!("cannot resample an empty recording");
    }
    let final_len = (ratio * n_in as f64).round() as usize;
    let (npad_l, npad_r) = auto_npad(n_in);

    let mut planner = FftPlanner::<f64>::new();
    let mut out = Array2::<f32>::zeros((data.nrows(), final_len));
    for (src, mut dst) in data.rows().into_iter().zip(out.rows_mut()) {
        let y = resample_1d(&mut planner, &src.to_vec(), ratio, npad_l, npad_r);
        dst.assign(&ArrayView1::from(&y));
    }
    Ok(out)
}

/// Resample one channel with explicit (possibly asymmetric) padding.
pub fn resample_1d(
    planner: &mut FftPlanner<f64>,
    x: &[f32],
    ratio: f64,
    npad_l: usize,
    npad_r: usize,
) -> Vec<f32> {
    let n_in = x.len();
    let final_len = (ratio * n_in as f64).round() as usize;

    let x_ext = reflect_limited_pad(x, npad_l.min(n_in - 1), npad_r.min(n_in - 1));
    let old_len = x_ext.len();
    let new_len = (ratio * old_len as f64).round() as usize;
    let shorter = new_len < old_len;
    let use_len = if shorter { new_len } else { old_len };

    let mut spec: Vec<Complex<f64>> =
        x_ext.iter().map(|&v| Complex { re: v as f64, im: 0.0 }).collect();
    planner.plan_fft_forward(old_len).process(&mut spec);
    spec.truncate(old_len / 2 + 1);

    if use_len % 2 == 0 {
        let nyq = use_len / 2;
        if nyq < spec.len() {
            spec[nyq] *= if shorter { 2.0 } else { 0.5 };
        }
    }
    let scale = new_len as f64 / old_len as f64;

    // Rebuild a Hermitian spectrum of length new_len from the half spectrum.
    let half = new_len / 2 + 1;
    let mut full = vec![Complex::<f64>::default(); new_len];
    for (i, v) in spec.iter().take(half).enumerate() {
        full[i] = *v * scale;
    }
    for i in 1..half {
        let mirror = new_len - i;
        if mirror >= half {
            full[mirror] = full[i].conj();
        }
    }
    planner.plan_fft_inverse(new_len).process(&mut full);

    let inv = 1.0 / new_len as f64;
    let cut_l = (ratio * npad_l.min(n_in - 1) as f64).round() as usize;
    let mut y: Vec<f32> = full
        .iter()
        .skip(cut_l)
        .take(final_len)
        .map(|c| (c.re * inv) as f32)
        .collect();
    y.resize(final_len, 0.0);
    y
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_rate_is_passthrough() {
        let data = Array2::from_shape_fn((2, 512), |(_, t)| t as f32 / 512.0);
        let out = resample(&data, 256.0, 256.0).unwrap();
        assert_eq!(out, data);
    }

    #[test]
    fn half_rate_length() {
        let data = Array2::zeros((1, 1024));
        assert_eq!(resample(&data, 512.0, 256.0).unwrap().ncols(), 512);
    }

    #[test]
    fn non_integer_ratio_length() {
        // 1000 Hz → 256 Hz over 10 s.
        let data = Array2::zeros((3, 10_000));
        assert_eq!(resample(&data, 1000.0, 256.0).unwrap().ncols(), 2560);
    }

    #[test]
    fn dc_preserved() {
        let data = Array2::from_elem((1, 1024), 3.14_f32);
        for &v in resample(&data, 512.0, 256.0).unwrap().iter() {
            approx::assert_abs_diff_eq!(v, 3.14, epsilon = 1e-2);
        }
    }

    #[test]
    fn slow_sine_survives_downsampling() {
        let src = 1000.0_f32;
        let data = Array2::from_shape_fn((1, 5000), |(_, t)| {
            (2.0 * std::f32::consts::PI * 3.0 * t as f32 / src).sin()
        });
        let out = resample(&data, src, 250.0).unwrap();
        for t in 50..1200 {
            let expected = (2.0 * std::f32::consts::PI * 3.0 * t as f32 / 250.0).sin();
            approx::assert_abs_diff_eq!(out[[0, t]], expected, epsilon = 1e-2);
        }
    }

    #[test]
    fn auto_npad_matches_mne() {
        assert_eq!(auto_npad(15360), (512, 512));
        assert_eq!(auto_npad(30720), (1024, 1024));
    }
}
