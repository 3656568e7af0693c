//! Continuous multi-channel recording.
//!
//! A [`Recording`] is loaded once and then mutated in place by the
//! preprocessing steps (channel pruning, montage, resampling, filtering,
//! re-referencing, ICA cleaning).
use anyhow::{bail, Result};
use ndarray::{Array2, Axis};

use crate::config::OnMissing;
use crate::events::Event;
use crate::{filter, reference, resample};

/// Continuous EEG with its channel and event metadata.
#[derive(Debug, Clone)]
pub struct Recording {
    /// Signal in volts, shape `[C, T]`.
    pub data: Array2<f32>,
    /// Sampling rate in Hz.
    pub sfreq: f32,
    /// One name per row of `data`.
    pub ch_names: Vec<String>,
    /// 2-D scalp positions `[C, 2]`, set by [`crate::montage::set_montage`].
    /// Channels without a known position hold `NaN`.
    pub chan_pos: Option<Array2<f32>>,
    /// Stimulus events, sorted by onset.
    pub events: Vec<Event>,
}

impl Recording {
    pub fn new(data: Array2<f32>, sfreq: f32, ch_names: Vec<String>, events: Vec<Event>) -> Result<Self> {
        if data.nrows() != ch_names.len() {
            bail!("{} channel names for {} data rows", ch_names.len(), data.nrows());
        }
        if sfreq <= 0.0 {
            bail!("invalid sampling rate {sfreq}");
        }
        let mut events = events;
        events.sort_by_key(|e| e.sample);
        Ok(Self { data, sfreq, ch_names, chan_pos: None, events })
    }

    pub fn n_channels(&self) -> usize {
        self.data.nrows()
    }

    pub fn n_times(&self) -> usize {
        self.data.ncols()
    }

    pub fn duration_secs(&self) -> f64 {
        self.n_times() as f64 / self.sfreq as f64
    }

    /// Index of `name`; matching ignores case and spaces.
    pub fn channel_index(&self, name: &str) -> Option<usize> {
        let norm = |s: &str| s.replace(' ', "").to_lowercase();
        let wanted = norm(name);
        self.ch_names.iter().position(|n| norm(n) == wanted)
    }

    /// Remove the named channels.
    pub fn drop_channels(&mut self, names: &[String], on_missing: OnMissing) -> Result<()> {
        let mut missing = Vec::new();
        let mut drop = Vec::new();
        for name in names {
            match self.channel_index(name) {
                Some(idx) => drop.push(idx),
                None => missing.push(name.clone()),
            }
        }
        on_missing.handle("drop_channels", &missing)?;
        let keep: Vec<usize> = (0..self.n_channels()).filter(|i| !drop.contains(i)).collect();
        self.retain_rows(&keep);
        log::debug!("dropped {} channel(s), {} remain", drop.len(), self.n_channels());
        Ok(())
    }

    /// Keep only the named channels, in the given order.
    pub fn pick_channels(&mut self, names: &[String]) -> Result<()> {
        let mut keep = Vec::with_capacity(names.len());
        for name in names {
            match self.channel_index(name) {
                Some(idx) => keep.push(idx),
                None => bail!("pick_channels: channel '{name}' not found"),
            }
        }
        self.retain_rows(&keep);
        Ok(())
    }

    fn retain_rows(&mut self, keep: &[usize]) {
        self.data = self.data.select(Axis(0), keep);
        self.ch_names = keep.iter().map(|&i| self.ch_names[i].clone()).collect();
        if let Some(pos) = &self.chan_pos {
            self.chan_pos = Some(pos.select(Axis(0), keep));
        }
    }

    /// Resample to `sfreq`, rescaling event onsets to the new rate.
    pub fn resample(&mut self, sfreq: f32) -> Result<()> {
        if (self.sfreq - sfreq).abs() <= 1e-3 {
            return Ok(());
        }
        let ratio = sfreq as f64 / self.sfreq as f64;
        self.data = resample::resample(&self.data, self.sfreq, sfreq)?;
        let n_t = self.n_times();
        for ev in &mut self.events {
            ev.sample = ((ev.sample as f64 * ratio).round() as usize).min(n_t.saturating_sub(1));
        }
        log::debug!("resampled to {sfreq} Hz ({n_t} samples)");
        self.sfreq = sfreq;
        Ok(())
    }

    /// Zero-phase FIR filter.  `l_freq` alone is a high-pass, `h_freq` alone a
    /// low-pass; both together run the high-pass first, then the low-pass.
    pub fn filter(&mut self, l_freq: Option<f32>, h_freq: Option<f32>) -> Result<()> {
        if let Some(l) = l_freq {
            let h = filter::design_highpass(l, self.sfreq);
            log::debug!("high-pass {l} Hz: {} taps", h.len());
            filter::apply_fir_zero_phase(&mut self.data, &h)?;
        }
        if let Some(hf) = h_freq {
            let h = filter::design_lowpass(hf, self.sfreq)?;
            log::debug!("low-pass {hf} Hz: {} taps", h.len());
            filter::apply_fir_zero_phase(&mut self.data, &h)?;
        }
        Ok(())
    }

    /// Re-reference every channel to the mean of all channels.
    pub fn set_average_reference(&mut self) {
        reference::average_reference_inplace(&mut self.data);
    }
}
