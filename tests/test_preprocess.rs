mod common;
use common::{noise, oddball_recording, SFREQ};
use ndarray::{Array2, Axis};
use p3erp::filter::{apply_fir_zero_phase, design_highpass, design_lowpass};
use p3erp::pipeline::preprocess;
use p3erp::{PipelineConfig, Recording};
use std::f32::consts::PI;

fn sine(freq: f32, sfreq: f32, t: usize) -> f32 {
    (2.0 * PI * freq * t as f32 / sfreq).sin()
}

#[test]
fn band_pass_keeps_alpha_and_removes_offset_and_line_noise() {
    let n = 20 * SFREQ as usize;
    let data = Array2::from_shape_fn((1, n), |(_, t)| 3.0 + sine(10.0, SFREQ, t) + sine(60.0, SFREQ, t));
    let mut rec = Recording::new(data, SFREQ, vec!["Pz".into()], vec![]).unwrap();
    rec.filter(Some(0.5), Some(40.0)).unwrap();

    // Away from the edges only the 10 Hz component is left.
    for t in 1000..n - 1000 {
        approx::assert_abs_diff_eq!(rec.data[[0, t]], sine(10.0, SFREQ, t), epsilon = 3e-2);
    }
}

#[test]
fn high_then_low_equals_low_then_high_in_the_interior() {
    let n = 16384;
    let x: Vec<f32> = noise(11, n);
    let hp = design_highpass(0.5, 256.0);
    let lp = design_lowpass(40.0, 256.0).unwrap();

    let mut a = Array2::from_shape_vec((1, n), x.clone()).unwrap();
    apply_fir_zero_phase(&mut a, &hp).unwrap();
    apply_fir_zero_phase(&mut a, &lp).unwrap();
    let mut b = Array2::from_shape_vec((1, n), x).unwrap();
    apply_fir_zero_phase(&mut b, &lp).unwrap();
    apply_fir_zero_phase(&mut b, &hp).unwrap();

    for t in 2 * hp.len()..n - 2 * hp.len() {
        approx::assert_abs_diff_eq!(a[[0, t]], b[[0, t]], epsilon = 1e-4);
    }
}

#[test]
fn preprocess_drops_references_and_positions_channels() {
    let dir = tempfile::tempdir().unwrap();
    let cfg = PipelineConfig {
        drop_channels: vec!["TRIGGER".into()],
        ica: None,
        output_dir: dir.path().to_path_buf(),
        ..PipelineConfig::variant_a()
    };
    let mut rec = oddball_recording(&[1, 4, 4, 4], &[]);
    preprocess(&mut rec, &cfg).unwrap();

    assert_eq!(rec.n_channels(), 6);
    assert!(!rec.ch_names.iter().any(|c| c == "TRIGGER"));
    let pos = rec.chan_pos.as_ref().unwrap();
    assert!(pos.iter().all(|v| v.is_finite()));
    for &s in rec.data.sum_axis(Axis(0)).iter() {
        approx::assert_abs_diff_eq!(s, 0.0, epsilon = 1e-9);
    }
}

#[test]
fn resampling_to_256_keeps_event_timing() {
    let cfg = PipelineConfig {
        drop_channels: vec!["TRIGGER".into()],
        resample_sfreq: Some(256.0),
        l_freq: None,
        h_freq: None,
        ..PipelineConfig::variant_a()
    };
    let mut rec = oddball_recording(&[1, 4, 4], &[]);
    let onsets_s: Vec<f32> = rec.events.iter().map(|e| e.sample as f32 / rec.sfreq).collect();
    preprocess(&mut rec, &cfg).unwrap();

    approx::assert_abs_diff_eq!(rec.sfreq, 256.0);
    assert_eq!(rec.n_times(), 5 * 256);
    for (ev, t) in rec.events.iter().zip(onsets_s) {
        approx::assert_abs_diff_eq!(ev.sample as f32 / 256.0, t, epsilon = 1.0 / 256.0);
    }
}
