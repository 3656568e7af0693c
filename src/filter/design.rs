//! FIR filter design following MNE's `fir_design='firwin'` defaults.
//!
//! Both filter kinds are Hamming-windowed sincs whose length and transition
//! band are derived from the cutoff:
//!   • high-pass: trans_bw = min(max(0.25 · l_freq, 2.0), l_freq)
//!   • low-pass:  trans_bw = min(max(0.25 · h_freq, 2.0), nyquist − h_freq)
//!   • length N  = ceil(3.3 / trans_bw · sfreq), rounded up to odd
//!   • the −6 dB point sits in the middle of the transition band
use std::f64::consts::PI;

use anyhow::{bail, Result};

/// Transition bandwidth of a high-pass at `l_freq`.
pub fn auto_trans_bandwidth(l_freq: f32) -> f32 {
    (0.25 * l_freq).max(2.0).min(l_freq)
}

/// Transition bandwidth of a low-pass at `h_freq` for sampling rate `sfreq`.
pub fn auto_trans_bandwidth_lowpass(h_freq: f32, sfreq: f32) -> f32 {
    (0.25 * h_freq).max(2.0).min(sfreq / 2.0 - h_freq)
}

/// Number of taps for a Hamming design with transition band `trans_bw`.
/// Always odd.
pub fn auto_filter_length(trans_bw: f32, sfreq: f32) -> usize {
    let n_raw = (3.3 / trans_bw * sfreq).ceil() as usize;
    if n_raw % 2 == 0 { n_raw + 1 } else { n_raw }
}

/// Zero-phase high-pass impulse response.
///
/// Equivalent to `mne.filter.create_filter(l_freq=l_freq, h_freq=None,
/// fir_window='hamming', fir_design='firwin')`.
pub fn design_highpass(l_freq: f32, sfreq: f32) -> Vec<f32> {
    let trans_bw = auto_trans_bandwidth(l_freq);
    let n = auto_filter_length(trans_bw, sfreq);
    let cutoff_hz = l_freq - trans_bw / 2.0;
    firwin(n, cutoff_hz, sfreq, false).iter().map(|&v| v as f32).collect()
}

/// Zero-phase low-pass impulse response.
///
/// Equivalent to `mne.filter.create_filter(l_freq=None, h_freq=h_freq,
/// fir_window='hamming', fir_design='firwin')`.
pub fn design_lowpass(h_freq: f32, sfreq: f32) -> Result<Vec<f32>> {
    if h_freq <= 0.0 || h_freq >= sfreq / 2.0 {
        bail!("low-pass cutoff {h_freq} Hz must lie in (0, {}) Hz", sfreq / 2.0);
    }
    let trans_bw = auto_trans_bandwidth_lowpass(h_freq, sfreq);
    let n = auto_filter_length(trans_bw, sfreq);
    let cutoff_hz = h_freq + trans_bw / 2.0;
    Ok(firwin(n, cutoff_hz, sfreq, true).iter().map(|&v| v as f32).collect())
}

/// Hamming-windowed sinc with unit DC gain.
///
/// `pass_zero = false` turns the low-pass into a high-pass by spectral
/// inversion.  `n` must be odd.
pub fn firwin(n: usize, cutoff_hz: f32, sfreq: f32, pass_zero: bool) -> Vec<f64> {
    assert!(n % 2 == 1, "firwin requires odd N for linear-phase filter");
    let alpha = (n - 1) as f64 / 2.0;
    let fc = cutoff_hz as f64 / (sfreq as f64 / 2.0);
    let win = hamming(n);

    let mut h: Vec<f64> = (0..n)
        .map(|i| {
            let x = i as f64 - alpha;
            let sinc = if x == 0.0 { fc } else { (PI * fc * x).sin() / (PI * x) };
            sinc * win[i]
        })
        .collect();

    let s: f64 = h.iter().sum();
    h.iter_mut().for_each(|v| *v /= s);

    if !pass_zero {
        h.iter_mut().for_each(|v| *v = -*v);
        h[n / 2] += 1.0;
    }
    h
}

/// Hamming window of length `n`.
pub fn hamming(n: usize) -> Vec<f64> {
    (0..n)
        .map(|i| 0.54 - 0.46 * (2.0 * PI * i as f64 / (n - 1) as f64).cos())
        .collect()
}
