/// Shared helpers: synthetic oddball recordings and test configurations.
use ndarray::{Array2, Array3};
use p3erp::{EpochSet, EpochWindow, Event, EventTable, PipelineConfig, Recording};
use std::path::Path;

#[allow(unused)]
pub const SFREQ: f32 = 250.0;
#[allow(unused)]
pub const EEG: [&str; 6] = ["Fz", "Cz", "Pz", "Oz", "C3", "C4"];

#[allow(unused)]
/// Deterministic pseudo-noise in [-1, 1).
pub fn noise(seed: u64, n: usize) -> Vec<f32> {
    let mut state = seed.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
    (0..n)
        .map(|_| {
            state = state.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
            ((state >> 40) as f32 / (1u64 << 24) as f32) * 2.0 - 1.0
        })
        .collect()
}

/// Six EEG channels plus a `TRIGGER` channel at 250 Hz, one event per second
/// starting at 1 s.  `codes[k]` is the code of event `k`; events listed in
/// `bad` get a 400 µV, 100 ms step on Cz starting 100 ms after onset.
#[allow(unused)]
pub fn oddball_recording(codes: &[i32], bad: &[usize]) -> Recording {
    let n_ev = codes.len();
    let n_t = ((n_ev + 2) as f32 * SFREQ) as usize;
    let n_ch = EEG.len() + 1;
    let mut data = Array2::<f32>::zeros((n_ch, n_t));

    for c in 0..EEG.len() {
        let jitter = noise(c as u64 + 1, n_t);
        for t in 0..n_t {
            let phase = 2.0 * std::f32::consts::PI * (8.0 + c as f32) * t as f32 / SFREQ;
            data[[c, t]] = 5e-6 * phase.sin() + 2e-6 * jitter[t];
        }
    }

    let mut events = Vec::with_capacity(n_ev);
    for (k, &code) in codes.iter().enumerate() {
        let onset = (k + 1) * SFREQ as usize;
        events.push(Event { sample: onset, code });
        // Trigger line.
        data[[EEG.len(), onset]] = 1.0;
        if bad.contains(&k) {
            for t in onset + 25..onset + 50 {
                data[[1, t]] += 400e-6;
            }
        }
    }

    let mut names: Vec<String> = EEG.iter().map(|s| s.to_string()).collect();
    names.push("TRIGGER".into());
    Recording::new(data, SFREQ, names, events).unwrap()
}

/// `n` codes cycling through 1, 2, 3, 4.
#[allow(unused)]
pub fn cycling_codes(n: usize) -> Vec<i32> {
    (0..n).map(|k| (k % 4) as i32 + 1).collect()
}

/// Variant A settings reading `<dir>/{id}.safetensors` and writing to
/// `<dir>/out`, ICA off.
#[allow(unused)]
pub fn test_config(dir: &Path) -> PipelineConfig {
    PipelineConfig {
        input_template: format!("{}/{{id}}.safetensors", dir.display()),
        output_dir: dir.join("out"),
        participants: vec![],
        drop_channels: vec!["TRIGGER".into()],
        ica: None,
        ..PipelineConfig::variant_a()
    }
}

/// An epoch set of `n` epochs per `(label, code)` whose samples all equal
/// `value`.
#[allow(unused)]
pub fn constant_epochs(conditions: &[(&str, i32, usize)], value: f32) -> EpochSet {
    let total: usize = conditions.iter().map(|c| c.2).sum();
    let n_t = 176;
    let window = EpochWindow::default();
    let mut codes = Vec::with_capacity(total);
    for &(_, code, n) in conditions {
        codes.extend(std::iter::repeat(code).take(n));
    }
    EpochSet {
        data: Array3::from_elem((total, 3, n_t), value),
        samples: (0..total).map(|i| 250 * (i + 1)).collect(),
        codes,
        event_table: EventTable::new(conditions.iter().map(|&(l, c, _)| (l, c)).collect()),
        ch_names: vec!["Fz".into(), "Cz".into(), "Pz".into()],
        sfreq: SFREQ,
        tmin: -0.2,
        baseline: window.baseline,
        drop_log: vec![None; total],
    }
}
