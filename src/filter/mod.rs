//! FIR filter design and application.
//!
//! - [`design`]: Hamming-windowed sinc high-pass and low-pass design with
//!   MNE's automatic transition bands and filter lengths.
//! - [`apply`]: overlap-add zero-phase convolution.

pub mod apply;
pub mod design;

pub use apply::{apply_fir_zero_phase, filter_1d};
pub use design::{
    auto_filter_length, auto_trans_bandwidth, auto_trans_bandwidth_lowpass, design_highpass,
    design_lowpass, firwin, hamming,
};
