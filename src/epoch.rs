//! Epoching.
//!
//! Two flavours:
//!
//! * [`epoch`] cuts continuous `[C, T]` data into non-overlapping fixed-length
//!   windows (trailing samples dropped, whole-window mean removed).  Used to
//!   build the ICA training set.
//! * [`EpochSet::from_recording`] cuts a window around every stimulus event,
//!   applies the pre-stimulus baseline and rejects epochs whose peak-to-peak
//!   amplitude exceeds a threshold, keeping a drop log.
use anyhow::{bail, Result};
use ndarray::{s, Array2, Array3, ArrayView2, Axis};
use serde::{Deserialize, Serialize};

use crate::baseline::{baseline_correct_inplace, baseline_correct_range_inplace};
use crate::config::EpochWindow;
use crate::events::{Event, EventTable};
use crate::evoked::Evoked;
use crate::recording::Recording;

/// Epoch `data` (`[C, T]`) into `[E, C, epoch_samples]` non-overlapping
/// windows with whole-window baseline correction.
pub fn epoch(data: &Array2<f32>, epoch_samples: usize) -> Array3<f32> {
    let (n_ch, n_t) = data.dim();
    let n_epochs = if epoch_samples == 0 { 0 } else { n_t / epoch_samples };

    let mut out = Array3::<f32>::zeros((n_epochs, n_ch, epoch_samples));
    for e in 0..n_epochs {
        let start = e * epoch_samples;
        out.slice_mut(s![e, .., ..])
            .assign(&data.slice(s![.., start..start + epoch_samples]));
    }
    baseline_correct_inplace(&mut out);
    out
}

/// Largest per-channel peak-to-peak amplitude of one `[C, T]` epoch, with
/// the channel it occurs on.
pub fn max_ptp(epoch: ArrayView2<'_, f32>) -> (f32, usize) {
    let mut best = (0.0_f32, 0_usize);
    for (c, row) in epoch.rows().into_iter().enumerate() {
        let (lo, hi) = row
            .iter()
            .fold((f32::INFINITY, f32::NEG_INFINITY), |(lo, hi), &v| (lo.min(v), hi.max(v)));
        let ptp = hi - lo;
        if ptp > best.0 {
            best = (ptp, c);
        }
    }
    best
}

/// Robust rejection threshold learnt from the data:
/// `median(ptp) + k · 1.4826 · MAD(ptp)` over the per-epoch maximum
/// peak-to-peak amplitudes.  Returns `None` for an empty set.
pub fn data_driven_threshold(epochs: &Array3<f32>, k: f32) -> Option<f32> {
    let ptps: Vec<f32> = epochs.axis_iter(Axis(0)).map(|e| max_ptp(e).0).collect();
    let med = median(&ptps)?;
    let deviations: Vec<f32> = ptps.iter().map(|v| (v - med).abs()).collect();
    let mad = median(&deviations)?;
    Some(med + k * 1.4826 * mad)
}

fn median(values: &[f32]) -> Option<f32> {
    if values.is_empty() {
        return None;
    }
    let mut v = values.to_vec();
    v.sort_by(f32::total_cmp);
    let n = v.len();
    Some(if n % 2 == 1 { v[n / 2] } else { 0.5 * (v[n / 2 - 1] + v[n / 2]) })
}

/// Why an event produced no epoch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum DropReason {
    /// The window runs past the start or end of the recording.
    NoData,
    /// Peak-to-peak amplitude on `channel` exceeded the rejection threshold.
    TooBigPtp { channel: String },
}

/// Event-locked epochs of one or more participants.
#[derive(Debug, Clone, PartialEq)]
pub struct EpochSet {
    /// Retained epochs, `[E, C, T]`, volts.
    pub data: Array3<f32>,
    /// Event code of each retained epoch.
    pub codes: Vec<i32>,
    /// Onset sample of each retained epoch in its source recording.
    pub samples: Vec<usize>,
    pub event_table: EventTable,
    pub ch_names: Vec<String>,
    pub sfreq: f32,
    /// Time of the first sample relative to the event, seconds.
    pub tmin: f32,
    pub baseline: Option<(f32, f32)>,
    /// One entry per candidate event; `None` means the epoch was kept.
    pub drop_log: Vec<Option<DropReason>>,
}

impl EpochSet {
    /// Cut, baseline-correct and reject epochs around the events of `rec`
    /// whose code appears in `table`.
    ///
    /// The window spans samples `round(tmin·sf) ..= round(tmax·sf)` around
    /// each onset.  Rejection looks at the baseline-corrected data and drops
    /// an epoch as soon as one channel's peak-to-peak amplitude is strictly
    /// above `reject_ptp`.
    pub fn from_recording(
        rec: &Recording,
        table: &EventTable,
        window: &EpochWindow,
        reject_ptp: Option<f32>,
    ) -> Result<Self> {
        let sf = rec.sfreq;
        let first = (window.tmin * sf).round() as i64;
        let last = (window.tmax * sf).round() as i64;
        if last < first {
            bail!("epoch window ({}, {}) is empty", window.tmin, window.tmax);
        }
        let n_t = (last - first + 1) as usize;
        let n_ch = rec.n_channels();
        let tmin = first as f32 / sf;

        let codes = table.codes();
        let candidates: Vec<&Event> = rec.events.iter().filter(|e| codes.contains(&e.code)).collect();

        let mut kept = Vec::with_capacity(candidates.len());
        let mut drop_log = Vec::with_capacity(candidates.len());
        let baseline_range = window.baseline.map(|b| baseline_indices(b, tmin, sf, n_t));

        for ev in candidates {
            let start = ev.sample as i64 + first;
            if start < 0 || start as usize + n_t > rec.n_times() {
                drop_log.push(Some(DropReason::NoData));
                continue;
            }
            let start = start as usize;
            let mut ep = Array3::<f32>::zeros((1, n_ch, n_t));
            ep.slice_mut(s![0, .., ..]).assign(&rec.data.slice(s![.., start..start + n_t]));
            if let Some((b0, b1)) = baseline_range {
                baseline_correct_range_inplace(&mut ep, b0, b1);
            }
            if let Some(thresh) = reject_ptp {
                let (ptp, ch) = max_ptp(ep.index_axis(Axis(0), 0));
                if ptp > thresh {
                    log::trace!(
                        "event at sample {} rejected: {:.1} µV on {}",
                        ev.sample,
                        ptp * 1e6,
                        rec.ch_names[ch]
                    );
                    drop_log.push(Some(DropReason::TooBigPtp { channel: rec.ch_names[ch].clone() }));
                    continue;
                }
            }
            drop_log.push(None);
            kept.push((ep, ev.code, ev.sample));
        }

        let mut data = Array3::<f32>::zeros((kept.len(), n_ch, n_t));
        let mut out_codes = Vec::with_capacity(kept.len());
        let mut samples = Vec::with_capacity(kept.len());
        for (i, (ep, code, sample)) in kept.into_iter().enumerate() {
            data.slice_mut(s![i, .., ..]).assign(&ep.index_axis(Axis(0), 0));
            out_codes.push(code);
            samples.push(sample);
        }

        Ok(Self {
            data,
            codes: out_codes,
            samples,
            event_table: table.clone(),
            ch_names: rec.ch_names.clone(),
            sfreq: sf,
            tmin,
            baseline: window.baseline,
            drop_log,
        })
    }

    /// Number of retained epochs.
    pub fn len(&self) -> usize {
        self.data.dim().0
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn n_times(&self) -> usize {
        self.data.dim().2
    }

    /// Time axis of one epoch, seconds.
    pub fn times(&self) -> Vec<f32> {
        (0..self.n_times()).map(|i| self.tmin + i as f32 / self.sfreq).collect()
    }

    /// Percentage of candidate events that produced no epoch.
    pub fn drop_log_stats(&self) -> f32 {
        if self.drop_log.is_empty() {
            return 0.0;
        }
        let dropped = self.drop_log.iter().filter(|d| d.is_some()).count();
        100.0 * dropped as f32 / self.drop_log.len() as f32
    }

    /// Re-apply a baseline interval to the retained epochs.
    pub fn apply_baseline(&mut self, baseline: (f32, f32)) {
        let (b0, b1) = baseline_indices(baseline, self.tmin, self.sfreq, self.n_times());
        baseline_correct_range_inplace(&mut self.data, b0, b1);
        self.baseline = Some(baseline);
    }

    /// Epochs of the conditions selected by `selector` (exact label or
    /// `/`-separated tags).
    pub fn select(&self, selector: &str) -> Result<EpochSet> {
        let wanted = self.event_table.select_codes(selector);
        if wanted.is_empty() {
            bail!("'{selector}' matches no condition (known: {})", self.labels().join(", "));
        }
        let idx: Vec<usize> = self
            .codes
            .iter()
            .enumerate()
            .filter(|(_, c)| wanted.contains(c))
            .map(|(i, _)| i)
            .collect();
        Ok(EpochSet {
            data: self.data.select(Axis(0), &idx),
            codes: idx.iter().map(|&i| self.codes[i]).collect(),
            samples: idx.iter().map(|&i| self.samples[i]).collect(),
            ..self.clone_metadata()
        })
    }

    /// Sample-wise mean of all retained epochs.
    pub fn average(&self) -> Result<Evoked> {
        let Some(mean) = self.data.mean_axis(Axis(0)) else {
            bail!("cannot average an empty epoch set");
        };
        Ok(Evoked {
            data: mean,
            ch_names: self.ch_names.clone(),
            sfreq: self.sfreq,
            tmin: self.tmin,
            comment: String::new(),
            nave: self.len(),
        })
    }

    /// Average of the epochs selected by `selector`, labelled with it.
    pub fn average_condition(&self, selector: &str) -> Result<Evoked> {
        let sub = self.select(selector)?;
        if sub.is_empty() {
            bail!("no retained epochs for condition '{selector}'");
        }
        let mut evoked = sub.average()?;
        evoked.comment = selector.to_string();
        Ok(evoked)
    }

    /// Labels of the event table in order.
    pub fn labels(&self) -> Vec<String> {
        self.event_table.labels().map(String::from).collect()
    }

    /// Number of retained epochs per condition label.
    pub fn counts(&self) -> Vec<(String, usize)> {
        self.event_table
            .iter()
            .map(|id| (id.label.clone(), self.codes.iter().filter(|&&c| c == id.code).count()))
            .collect()
    }

    /// Stack several epoch sets into one.  Channel layout, sampling rate and
    /// time axis must agree; event tables are merged.
    pub fn concatenate(sets: Vec<EpochSet>) -> Result<EpochSet> {
        let mut iter = sets.into_iter();
        let Some(first) = iter.next() else {
            bail!("no epoch sets to concatenate");
        };
        let mut table = first.event_table.clone();
        let mut parts = vec![first.data.clone()];
        let mut codes = first.codes.clone();
        let mut samples = first.samples.clone();
        let mut drop_log = first.drop_log.clone();

        for other in iter {
            if other.ch_names != first.ch_names {
                bail!("channel mismatch: {:?} vs {:?}", first.ch_names, other.ch_names);
            }
            if (other.sfreq - first.sfreq).abs() > 1e-3
                || (other.tmin - first.tmin).abs() > 1e-6
                || other.n_times() != first.n_times()
            {
                bail!(
                    "time axis mismatch: {} Hz / {} s / {} samples vs {} Hz / {} s / {} samples",
                    first.sfreq,
                    first.tmin,
                    first.n_times(),
                    other.sfreq,
                    other.tmin,
                    other.n_times()
                );
            }
            for id in other.event_table.iter() {
                match (table.code(&id.label), table.label(id.code).is_some()) {
                    (Some(c), _) if c == id.code => {}
                    (None, false) => table = merged(&table, &id.label, id.code),
                    _ => bail!("event table conflict on '{}' = {}", id.label, id.code),
                }
            }
            parts.push(other.data);
            codes.extend(other.codes);
            samples.extend(other.samples);
            drop_log.extend(other.drop_log);
        }

        let views: Vec<_> = parts.iter().map(|p| p.view()).collect();
        let data = ndarray::concatenate(Axis(0), &views)?;
        Ok(EpochSet {
            data,
            codes,
            samples,
            event_table: table,
            drop_log,
            ..first.clone_metadata()
        })
    }

    fn clone_metadata(&self) -> EpochSet {
        EpochSet {
            data: Array3::zeros((0, self.ch_names.len(), self.n_times())),
            codes: vec![],
            samples: vec![],
            event_table: self.event_table.clone(),
            ch_names: self.ch_names.clone(),
            sfreq: self.sfreq,
            tmin: self.tmin,
            baseline: self.baseline,
            drop_log: self.drop_log.clone(),
        }
    }
}

fn merged(table: &EventTable, label: &str, code: i32) -> EventTable {
    let mut pairs: Vec<(String, i32)> = table.iter().map(|id| (id.label.clone(), id.code)).collect();
    pairs.push((label.to_string(), code));
    EventTable::new(pairs)
}

/// Sample range `b0..b1` (exclusive end) covering the baseline interval.
fn baseline_indices(baseline: (f32, f32), tmin: f32, sfreq: f32, n_t: usize) -> (usize, usize) {
    let b0 = ((baseline.0 - tmin) * sfreq).round().max(0.0) as usize;
    let b1 = (((baseline.1 - tmin) * sfreq).round() as usize + 1).min(n_t);
    (b0, b1)
}
