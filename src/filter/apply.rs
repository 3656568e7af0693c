//! Zero-phase overlap-add FIR convolution.
//!
//! Zero phase comes from advancing the output by `(N-1)/2` samples of a
//! symmetric odd-length kernel, not from forward-backward filtering.  Edges
//! are extended by `N-1` samples of odd reflection on each side before
//! convolving, as MNE's `_smart_pad` does.
use std::sync::Arc;

use anyhow::{bail, Result};
use ndarray::{Array2, ArrayView1};
use rustfft::{num_complex::Complex, Fft, FftPlanner};

/// Apply a zero-phase FIR kernel to every channel of `data` (`[C, T]`) in place.
pub fn apply_fir_zero_phase(data: &mut Array2<f32>, h: &[f32]) -> Result<()> {
    let n_t = data.ncols();
    if n_t == 0 {
        return Ok(());
    }
    let fir = OverlapAdd::new(h, n_t)?;
    for mut row in data.rows_mut() {
        let x = row.to_vec();
        let y = fir.run(&x);
        row.assign(&ArrayView1::from(&y));
    }
    Ok(())
}

/// Filter one signal.  The output has the length of `x`.
pub fn filter_1d(x: &[f32], h: &[f32]) -> Result<Vec<f32>> {
    if x.is_empty() {
        return Ok(vec![]);
    }
    Ok(OverlapAdd::new(h, x.len())?.run(x))
}

/// Kernel spectrum and FFT plans shared by all channels of equal length.
struct OverlapAdd {
    n_h: usize,
    n_fft: usize,
    h_fft: Vec<Complex<f32>>,
    fwd: Arc<dyn Fft<f32>>,
    inv: Arc<dyn Fft<f32>>,
}

impl OverlapAdd {
    fn new(h: &[f32], n_x: usize) -> Result<Self> {
        if h.len() % 2 == 0 {
            bail!("zero-phase FIR needs an odd number of taps, got {}", h.len());
        }
        let n_h = h.len();
        let n_fft = choose_fft_len(n_h, n_x + 2 * (n_h - 1));

        let mut planner: FftPlanner<f32> = FftPlanner::new();
        let fwd = planner.plan_fft_forward(n_fft);
        let inv = planner.plan_fft_inverse(n_fft);

        let mut h_fft = zero_padded(h, n_fft);
        fwd.process(&mut h_fft);

        Ok(Self { n_h, n_fft, h_fft, fwd, inv })
    }

    fn run(&self, x: &[f32]) -> Vec<f32> {
        let n_x = x.len();
        let shift = (self.n_h - 1) / 2;
        let n_edge = self.n_h - 1;

        let x_ext = reflect_limited_pad(x, n_edge, n_edge);
        let n_ext = x_ext.len();
        let n_seg = self.n_fft - self.n_h + 1;
        let inv_scale = 1.0 / self.n_fft as f32;
        let mut out = vec![0.0_f32; n_ext];

        for start in (0..n_ext).step_by(n_seg) {
            let stop = (start + n_seg).min(n_ext);
            let mut buf = zero_padded(&x_ext[start..stop], self.n_fft);
            self.fwd.process(&mut buf);
            for (b, &hf) in buf.iter_mut().zip(&self.h_fft) {
                *b *= hf;
            }
            self.inv.process(&mut buf);

            // Output index o receives product index o - start + shift.
            let out_start = start.saturating_sub(shift);
            let prod_start = shift.saturating_sub(start);
            let out_end = (out_start + self.n_fft).min(n_ext);
            for (o, p) in (out_start..out_end).zip(prod_start..self.n_fft) {
                out[o] += buf[p].re * inv_scale;
            }
        }

        out[n_edge..n_edge + n_x].to_vec()
    }
}

fn zero_padded(x: &[f32], n: usize) -> Vec<Complex<f32>> {
    x.iter()
        .map(|&v| Complex { re: v, im: 0.0 })
        .chain(std::iter::repeat(Complex::default()))
        .take(n)
        .collect()
}

/// Odd reflection around the first and last sample.
///
/// Left:  `2·x[0] − x[i]`, right: `2·x[n−1] − x[n−1−i]`.  Requests longer
/// than the signal are completed with zeros on the outside.
pub(crate) fn reflect_limited_pad(x: &[f32], n_l: usize, n_r: usize) -> Vec<f32> {
    let n = x.len();
    let actual_l = n_l.min(n - 1);
    let actual_r = n_r.min(n - 1);
    let first = x[0];
    let last = x[n - 1];

    let mut out = Vec::with_capacity(n_l + n + n_r);
    out.extend(std::iter::repeat(0.0).take(n_l - actual_l));
    out.extend((1..=actual_l).rev().map(|i| 2.0 * first - x[i]));
    out.extend_from_slice(x);
    out.extend((1..=actual_r).map(|i| 2.0 * last - x[n - 1 - i]));
    out.extend(std::iter::repeat(0.0).take(n_r - actual_r));
    out
}

/// Power-of-two block size minimising MNE's overlap-add cost estimate
/// `ceil(n_x / (N − n_h + 1)) · N · (log2 N + 1) + 4e-5 · N · n_x`.
fn choose_fft_len(n_h: usize, n_x: usize) -> usize {
    let min_fft = 2 * n_h - 1;
    let max_pow = (n_x as f64).log2().ceil() as u32 + 1;
    let min_pow = (min_fft as f64).log2().ceil() as u32;

    let mut best_n = 1_usize << max_pow.max(min_pow);
    let mut best_cost = f64::INFINITY;
    for pow in min_pow..=max_pow {
        let n = 1_usize << pow;
        if n < min_fft {
            continue;
        }
        let n_seg = (n - n_h + 1) as f64;
        let cost = (n_x as f64 / n_seg).ceil() * n as f64 * (pow as f64 + 1.0)
            + 4e-5 * n as f64 * n_x as f64;
        if cost < best_cost {
            best_cost = cost;
            best_n = n;
        }
    }
    best_n
}
