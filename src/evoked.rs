//! Evoked (time-locked average) responses.
use anyhow::{bail, Result};
use ndarray::{Array1, Array2, Axis};

/// Average of the retained epochs of one condition, `[C, T]`, volts.
#[derive(Debug, Clone, PartialEq)]
pub struct Evoked {
    pub data: Array2<f32>,
    pub ch_names: Vec<String>,
    pub sfreq: f32,
    pub tmin: f32,
    /// Condition label, or a formula such as `"odd - normal"` for combinations.
    pub comment: String,
    /// Number of averaged epochs (effective count for combinations).
    pub nave: usize,
}

impl Evoked {
    pub fn n_times(&self) -> usize {
        self.data.ncols()
    }

    pub fn times(&self) -> Vec<f32> {
        (0..self.n_times()).map(|i| self.tmin + i as f32 / self.sfreq).collect()
    }

    /// Mean trace over the named channels (`combine='mean'`).
    pub fn pick_mean(&self, picks: &[String]) -> Result<Array1<f32>> {
        let norm = |s: &str| s.replace(' ', "").to_lowercase();
        let mut idx = Vec::with_capacity(picks.len());
        for p in picks {
            match self.ch_names.iter().position(|n| norm(n) == norm(p)) {
                Some(i) => idx.push(i),
                None => bail!("channel '{p}' not in evoked ({} channels)", self.ch_names.len()),
            }
        }
        match self.data.select(Axis(0), &idx).mean_axis(Axis(0)) {
            Some(trace) => Ok(trace),
            None => bail!("no channels picked"),
        }
    }

    /// Time (s) and value of the largest positive deflection of `trace`
    /// inside `[t0, t1]`, e.g. the P3 peak.
    pub fn peak_in(&self, trace: &Array1<f32>, t0: f32, t1: f32) -> Option<(f32, f32)> {
        self.times()
            .into_iter()
            .zip(trace.iter().copied())
            .filter(|(t, _)| *t >= t0 && *t <= t1)
            .max_by(|a, b| a.1.total_cmp(&b.1))
    }
}

/// Weighted sum `Σ wᵢ · evokedᵢ`.
///
/// All inputs must share channels and time axis.  The effective number of
/// averages follows MNE: `nave = 1 / Σ(wᵢ² / naveᵢ)`.  Weights `[1, -1]`
/// give the difference wave.
pub fn combine_evoked(parts: &[(&Evoked, f32)]) -> Result<Evoked> {
    let Some(&(first, _)) = parts.first() else {
        bail!("nothing to combine");
    };
    let mut data = Array2::<f32>::zeros(first.data.dim());
    let mut inv_nave = 0.0_f64;
    let mut comment = String::new();

    for (i, &(ev, w)) in parts.iter().enumerate() {
        if ev.ch_names != first.ch_names || ev.data.dim() != first.data.dim() {
            bail!("cannot combine '{}' with '{}': layouts differ", first.comment, ev.comment);
        }
        if (ev.tmin - first.tmin).abs() > 1e-6 || (ev.sfreq - first.sfreq).abs() > 1e-3 {
            bail!("cannot combine '{}' with '{}': time axes differ", first.comment, ev.comment);
        }
        data.scaled_add(w, &ev.data);
        if ev.nave > 0 {
            inv_nave += (w as f64).powi(2) / ev.nave as f64;
        }
        comment.push_str(&term(i, w, &ev.comment));
    }

    Ok(Evoked {
        data,
        ch_names: first.ch_names.clone(),
        sfreq: first.sfreq,
        tmin: first.tmin,
        comment,
        nave: if inv_nave > 0.0 { (1.0 / inv_nave).round() as usize } else { 0 },
    })
}

/// `a − b`.
pub fn difference_wave(a: &Evoked, b: &Evoked) -> Result<Evoked> {
    combine_evoked(&[(a, 1.0), (b, -1.0)])
}

fn term(i: usize, w: f32, name: &str) -> String {
    let sign = if w < 0.0 { "-" } else { "+" };
    let mag = w.abs();
    let body = if (mag - 1.0).abs() < f32::EPSILON { name.to_string() } else { format!("{mag}*{name}") };
    match (i, sign) {
        (0, "+") => body,
        (0, _) => format!("-{body}"),
        _ => format!(" {sign} {body}"),
    }
}
