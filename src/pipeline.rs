//! Per-participant P3 pipeline.
//!
//! ```text
//! <input>.vhdr | .safetensors
//!   │
//!   ├─ drop_channels        non-EEG channels removed
//!   ├─ set_montage          standard 10-20 positions
//!   ├─ resample             optional (Variant B: 256 Hz)
//!   ├─ filter               FIR high-pass, then FIR low-pass
//!   ├─ average reference
//!   ├─ pick_events          only codes of the event table
//!   ├─ ICA                  fit (continuous or fixed windows), remove artifacts
//!   ├─ EpochSet             window + baseline + peak-to-peak rejection
//!   ├─ exclusion check      drop rate > max_drop_pct
//!   └─ persist + average + plot
//! ```
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};

use crate::config::{Comparison, PipelineConfig};
use crate::epoch::EpochSet;
use crate::events::pick_events;
use crate::evoked::{difference_wave, Evoked};
use crate::ica::Ica;
use crate::recording::Recording;
use crate::{brainvision, io, montage, plot};

/// Everything a participant run wrote to disk.
#[derive(Debug, Clone)]
pub struct ParticipantOutput {
    pub epochs_path: PathBuf,
    /// One average per condition of the event table that kept epochs.
    pub evokeds: Vec<Evoked>,
    pub plots: Vec<PathBuf>,
}

/// Result of one participant run.
#[derive(Debug, Clone)]
pub enum ParticipantOutcome {
    Included {
        n_epochs: usize,
        drop_rate: f32,
        output: ParticipantOutput,
    },
    /// Drop rate above the configured maximum.  `output` is `None` unless the
    /// exclusion policy lets persistence proceed.
    Excluded {
        drop_rate: f32,
        output: Option<ParticipantOutput>,
    },
}

impl ParticipantOutcome {
    pub fn is_excluded(&self) -> bool {
        matches!(self, ParticipantOutcome::Excluded { .. })
    }

    pub fn drop_rate(&self) -> f32 {
        match self {
            ParticipantOutcome::Included { drop_rate, .. } | ParticipantOutcome::Excluded { drop_rate, .. } => {
                *drop_rate
            }
        }
    }

    pub fn output(&self) -> Option<&ParticipantOutput> {
        match self {
            ParticipantOutcome::Included { output, .. } => Some(output),
            ParticipantOutcome::Excluded { output, .. } => output.as_ref(),
        }
    }
}

/// Read a recording, choosing the reader from the file extension.
pub fn load_recording(path: &Path) -> Result<Recording> {
    let ext = path.extension().and_then(|e| e.to_str()).map(str::to_lowercase);
    match ext.as_deref() {
        Some("vhdr") => brainvision::read_brainvision(path),
        Some("safetensors") => io::load_recording(path),
        Some("set") => bail!("{}: EEGLAB files are not read; convert to .vhdr or .safetensors first", path.display()),
        _ => bail!("{}: unsupported recording format (expected .vhdr or .safetensors)", path.display()),
    }
}

/// Run every participant of `cfg.participants` in order.  The first failure
/// aborts the run.
pub fn run_participants(cfg: &PipelineConfig) -> Result<Vec<(String, ParticipantOutcome)>> {
    let mut outcomes = Vec::with_capacity(cfg.participants.len());
    for id in &cfg.participants {
        let outcome = run_participant(id, cfg).with_context(|| format!("participant {id}"))?;
        outcomes.push((id.clone(), outcome));
    }
    Ok(outcomes)
}

/// Load participant `id` from `cfg.input_path(id)` and process it.
pub fn run_participant(id: &str, cfg: &PipelineConfig) -> Result<ParticipantOutcome> {
    let path = cfg.input_path(id);
    log::info!("P{id}: loading {}", path.display());
    let rec = load_recording(&path)?;
    log::info!(
        "P{id}: {} channels, {:.1} s at {} Hz, {} events",
        rec.n_channels(),
        rec.duration_secs(),
        rec.sfreq,
        rec.events.len()
    );
    process_recording(id, rec, cfg)
}

/// Preprocess an already loaded recording and produce the participant's
/// epochs, averages and plots.
pub fn process_recording(id: &str, mut rec: Recording, cfg: &PipelineConfig) -> Result<ParticipantOutcome> {
    preprocess(&mut rec, cfg)?;

    rec.events = pick_events(&rec.events, &cfg.event_table.codes());
    if rec.events.is_empty() {
        bail!("P{id}: no events match the event table");
    }
    for id_entry in cfg.event_table.iter() {
        let n = rec.events.iter().filter(|e| e.code == id_entry.code).count();
        log::debug!("P{id}: {n} '{}' events (code {})", id_entry.label, id_entry.code);
    }

    if let Some(ica_cfg) = &cfg.ica {
        let ica = Ica::fit(&rec, ica_cfg)?;
        ica.apply(&mut rec)?;
    }

    let mut epochs = EpochSet::from_recording(&rec, &cfg.event_table, &cfg.epoch, cfg.reject_ptp)?;
    let drop_rate = epochs.drop_log_stats();
    log::info!(
        "P{id}: {} of {} epochs retained ({drop_rate:.1}% dropped)",
        epochs.len(),
        epochs.drop_log.len()
    );

    let excluded = drop_rate > cfg.exclusion.max_drop_pct;
    if excluded {
        log::warn!(
            "P{id} was excluded! (drop rate {drop_rate:.1}% over {}%)",
            cfg.exclusion.max_drop_pct
        );
        if cfg.exclusion.skip_persistence {
            return Ok(ParticipantOutcome::Excluded { drop_rate, output: None });
        }
    }

    if let Some(baseline) = cfg.epoch.baseline {
        epochs.apply_baseline(baseline);
    }
    let output = persist_and_plot(id, &epochs, cfg)?;

    Ok(if excluded {
        ParticipantOutcome::Excluded { drop_rate, output: Some(output) }
    } else {
        ParticipantOutcome::Included { n_epochs: epochs.len(), drop_rate, output }
    })
}

/// Channel pruning, montage, resampling, filtering and re-referencing.
pub fn preprocess(rec: &mut Recording, cfg: &PipelineConfig) -> Result<()> {
    rec.drop_channels(&cfg.drop_channels, cfg.on_missing)?;
    if cfg.montage {
        montage::set_montage(rec, cfg.on_missing)?;
    }
    if let Some(sfreq) = cfg.resample_sfreq {
        rec.resample(sfreq)?;
    }
    rec.filter(cfg.l_freq, cfg.h_freq)?;
    rec.set_average_reference();
    Ok(())
}

fn persist_and_plot(id: &str, epochs: &EpochSet, cfg: &PipelineConfig) -> Result<ParticipantOutput> {
    std::fs::create_dir_all(&cfg.output_dir)
        .with_context(|| format!("creating {}", cfg.output_dir.display()))?;
    let epochs_path = cfg.epochs_path(id);
    io::save_epochs(epochs, &epochs_path)?;
    log::info!("P{id}: saved {}", epochs_path.display());

    let evokeds = condition_averages(epochs);
    let title = format!("P{id}");
    let plots = plot_comparisons(epochs, cfg, id, &title, false)?;
    Ok(ParticipantOutput { epochs_path, evokeds, plots })
}

/// One evoked per condition label that kept at least one epoch.
pub fn condition_averages(epochs: &EpochSet) -> Vec<Evoked> {
    epochs
        .labels()
        .iter()
        .filter_map(|label| match epochs.average_condition(label) {
            Ok(ev) => Some(ev),
            Err(e) => {
                log::warn!("{e}");
                None
            }
        })
        .collect()
}

/// Render every configured comparison.  `stem` names the files; difference
/// waves are drawn when the comparison asks for one or `always_difference`
/// is set.
pub(crate) fn plot_comparisons(
    epochs: &EpochSet,
    cfg: &PipelineConfig,
    stem: &str,
    title: &str,
    always_difference: bool,
) -> Result<Vec<PathBuf>> {
    let mut written = Vec::new();
    let single = cfg.comparisons.len() == 1;
    for cmp in &cfg.comparisons {
        let (a, b) = match (epochs.average_condition(&cmp.a), epochs.average_condition(&cmp.b)) {
            (Ok(a), Ok(b)) => (a, b),
            (Err(e), _) | (_, Err(e)) => {
                log::warn!("{title}: skipping {} vs {} plot: {e}", cmp.a, cmp.b);
                continue;
            }
        };
        let path = cfg.plot_path(&comparison_stem(stem, cmp, single));
        plot::plot_evokeds(&[&a, &b], &cfg.plot, title, &path)?;
        written.push(path);

        if cmp.difference || always_difference {
            let diff = difference_wave(&a, &b)?;
            let path = cfg.plot_path(&difference_stem(stem, cmp));
            plot::plot_evokeds(&[&diff], &cfg.plot, &format!("{title} difference"), &path)?;
            written.push(path);
        }
    }
    Ok(written)
}

fn file_label(label: &str) -> String {
    label.replace('/', "")
}

fn comparison_stem(stem: &str, cmp: &Comparison, single: bool) -> String {
    if single {
        stem.to_string()
    } else {
        format!("{stem} {} vs {}", file_label(&cmp.a), file_label(&cmp.b))
    }
}

fn difference_stem(stem: &str, cmp: &Comparison) -> String {
    format!("{stem} {}-{}", file_label(&cmp.a), file_label(&cmp.b))
}
