//! Grand average across participants.
//!
//! Every persisted epoch set in the output directory is loaded and stacked
//! into one set, so each retained epoch carries the same weight: a
//! participant with more epochs pulls the grand mean further.
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use crate::config::PipelineConfig;
use crate::epoch::EpochSet;
use crate::evoked::Evoked;
use crate::io::{load_epochs, EPOCHS_SUFFIX};
use crate::pipeline::{condition_averages, plot_comparisons};

/// File stem of the grand-average plots.
pub const GRAND_AVERAGE_STEM: &str = "Grand Average";

pub struct GrandAverage {
    /// Files that were combined, in load order.
    pub sources: Vec<PathBuf>,
    pub epochs: EpochSet,
    pub evokeds: Vec<Evoked>,
    pub plots: Vec<PathBuf>,
}

/// Persisted epoch sets in `dir`, sorted by file name.
pub fn find_epoch_files(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for entry in std::fs::read_dir(dir).with_context(|| format!("listing {}", dir.display()))? {
        let path = entry?.path();
        let is_epochs = path
            .file_name()
            .and_then(|n| n.to_str())
            .is_some_and(|n| n.ends_with(EPOCHS_SUFFIX));
        if is_epochs && path.is_file() {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

/// Load, concatenate, average and plot everything in `cfg.output_dir`.
///
/// Fails when the directory holds no epoch sets.
pub fn grand_average(cfg: &PipelineConfig) -> Result<GrandAverage> {
    let sources = find_epoch_files(&cfg.output_dir)?;
    log::info!("grand average over {} epoch file(s) in {}", sources.len(), cfg.output_dir.display());

    let mut sets = Vec::with_capacity(sources.len());
    for path in &sources {
        let set = load_epochs(path)?;
        log::debug!("{}: {} epochs", path.display(), set.len());
        sets.push(set);
    }
    let epochs = EpochSet::concatenate(sets).context("grand average")?;
    for (label, n) in epochs.counts() {
        log::info!("grand average '{label}': {n} epochs");
    }

    let evokeds = condition_averages(&epochs);
    let plots = plot_comparisons(&epochs, cfg, GRAND_AVERAGE_STEM, GRAND_AVERAGE_STEM, true)?;
    Ok(GrandAverage { sources, epochs, evokeds, plots })
}
