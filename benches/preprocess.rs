use std::hint::black_box;
use criterion::{criterion_group, criterion_main, Criterion};
use ndarray::Array2;
use p3erp::filter::{apply_fir_zero_phase, design_highpass, design_lowpass};
use p3erp::{EpochSet, Event, EventTable, PipelineConfig, Recording};

const SFREQ: f32 = 500.0;
const N_CH: usize = 27;
const SECS: usize = 60;

fn recording() -> Recording {
    let n_t = SECS * SFREQ as usize;
    let data = Array2::from_shape_fn((N_CH, n_t), |(c, t)| {
        20e-6 * (2.0 * std::f32::consts::PI * (5.0 + c as f32) * t as f32 / SFREQ).sin()
    });
    let events = (1..SECS - 1)
        .map(|s| Event { sample: s * SFREQ as usize, code: if s % 5 == 0 { 1 } else { 4 } })
        .collect();
    let names = (0..N_CH).map(|c| format!("E{c}")).collect();
    Recording::new(data, SFREQ, names, events).unwrap()
}

fn bench_band_pass(c: &mut Criterion) {
    let rec = recording();
    let hp = design_highpass(0.5, SFREQ);
    let lp = design_lowpass(40.0, SFREQ).unwrap();
    c.bench_function("band-pass 0.5-40 Hz [27×30000]", |b| {
        b.iter(|| {
            let mut data = rec.data.clone();
            apply_fir_zero_phase(&mut data, &hp).unwrap();
            apply_fir_zero_phase(&mut data, &lp).unwrap();
            black_box(data[[0, 0]])
        })
    });
}

fn bench_resample(c: &mut Criterion) {
    let rec = recording();
    c.bench_function("resample 500 → 256 Hz [27×30000]", |b| {
        b.iter(|| {
            let mut r = rec.clone();
            r.resample(black_box(256.0)).unwrap();
            black_box(r.n_times())
        })
    });
}

fn bench_epochs(c: &mut Criterion) {
    let rec = recording();
    let cfg = PipelineConfig::variant_a();
    let table = EventTable::from_pairs(&[("odd", 1), ("normal", 4)]);
    c.bench_function("epoch + reject 58 events", |b| {
        b.iter(|| {
            let ep = EpochSet::from_recording(&rec, &table, &cfg.epoch, cfg.reject_ptp).unwrap();
            black_box(ep.len())
        })
    });
}

criterion_group!(benches, bench_band_pass, bench_resample, bench_epochs);
criterion_main!(benches);
