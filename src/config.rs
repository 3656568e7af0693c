//! Pipeline configuration.
//!
//! [`PipelineConfig`] holds every tunable parameter of the per-participant
//! pipeline and of the grand-average aggregator.  Two presets mirror the two
//! recording setups of the oddball study:
//!
//! * [`PipelineConfig::variant_a`]: four-condition table, ICA fitted on the
//!   continuous signal, excluded participants are never persisted.
//! * [`PipelineConfig::variant_b`]: eight sub-conditions, resampling to
//!   256 Hz, ICA fitted on a dedicated fixed-length epoch set, persistence
//!   always proceeds.
//!
//! A configuration can also be read from (and written to) TOML so that no
//! parameter has to live in source code.
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};

use crate::events::EventTable;

/// What to do when a named channel is absent from a recording.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OnMissing {
    /// Fail the participant with an error.
    #[default]
    Raise,
    /// Log a warning and carry on.
    Warn,
    /// Carry on silently.
    Ignore,
}

impl OnMissing {
    /// Apply the policy to a list of missing names found by `what`.
    pub fn handle(self, what: &str, missing: &[String]) -> Result<()> {
        if missing.is_empty() {
            return Ok(());
        }
        match self {
            OnMissing::Raise => bail!("{what}: channel(s) not found: {}", missing.join(", ")),
            OnMissing::Warn => {
                log::warn!("{what}: channel(s) not found: {}", missing.join(", "));
                Ok(())
            }
            OnMissing::Ignore => Ok(()),
        }
    }
}

/// Signal the ICA decomposition is trained on.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum IcaFitOn {
    /// The whole continuous (filtered, re-referenced) recording.
    Continuous,
    /// Non-overlapping windows of `duration` seconds cut from the continuous
    /// recording; windows whose peak-to-peak amplitude exceeds
    /// `median + mad_k · 1.4826 · MAD` are left out of the training set.
    FixedEpochs { duration: f32, mad_k: f32 },
}

/// Independent component analysis parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IcaConfig {
    /// Number of components to estimate.  Clamped to the channel count.
    pub n_components: usize,
    /// Seed of the FastICA initialisation, for reproducible decompositions.
    pub random_state: usize,
    /// Maximum number of FastICA iterations.
    pub max_iter: usize,
    /// FastICA convergence tolerance.
    pub tol: f64,
    /// Component indices always removed from the signal.
    #[serde(default)]
    pub exclude: Vec<usize>,
    /// Components whose source time course has an absolute excess kurtosis
    /// above this value are also removed (blinks and other spiky artifacts).
    /// Off by default: the fitted decomposition is applied with only
    /// `exclude` removed, which leaves the signal unchanged when it is empty.
    #[serde(default)]
    pub kurtosis_threshold: Option<f64>,
    /// Training signal.
    pub fit_on: IcaFitOn,
}

impl Default for IcaConfig {
    fn default() -> Self {
        Self {
            n_components: 29,
            random_state: 89,
            max_iter: 200,
            tol: 1e-4,
            exclude: vec![],
            kurtosis_threshold: None,
            fit_on: IcaFitOn::Continuous,
        }
    }
}

/// Epoch time window around each event onset, in seconds.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EpochWindow {
    /// Start of the window relative to the event (negative = before).
    pub tmin: f32,
    /// End of the window relative to the event (inclusive).
    pub tmax: f32,
    /// Interval whose per-channel mean is subtracted from every epoch.
    pub baseline: Option<(f32, f32)>,
}

impl Default for EpochWindow {
    fn default() -> Self {
        Self { tmin: -0.2, tmax: 0.5, baseline: Some((-0.2, 0.0)) }
    }
}

/// Participant exclusion rule applied after epoch rejection.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ExclusionPolicy {
    /// A participant whose drop rate (percent) is strictly above this value is
    /// excluded.
    pub max_drop_pct: f32,
    /// When `true` an excluded participant produces no output at all.  When
    /// `false` the exclusion is only logged and persistence proceeds.
    pub skip_persistence: bool,
}

impl Default for ExclusionPolicy {
    fn default() -> Self {
        Self { max_drop_pct: 25.0, skip_persistence: true }
    }
}

/// A pair of conditions plotted against each other.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Comparison {
    pub a: String,
    pub b: String,
    /// Also plot the `a − b` difference wave for each participant.
    #[serde(default)]
    pub difference: bool,
}

impl Comparison {
    pub fn new(a: &str, b: &str, difference: bool) -> Self {
        Self { a: a.to_string(), b: b.to_string(), difference }
    }
}

/// Plot appearance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlotConfig {
    /// Channels averaged into the plotted trace.
    pub picks: Vec<String>,
    /// Fixed y-axis range in µV; automatic when unset.
    pub ylim_uv: Option<(f64, f64)>,
}

impl Default for PlotConfig {
    fn default() -> Self {
        Self { picks: vec!["Pz".to_string()], ylim_uv: None }
    }
}

/// Configuration of the whole P3 pipeline.
///
/// Build one from a preset and adjust it with struct-update syntax:
///
/// ```
/// use p3erp::PipelineConfig;
///
/// let cfg = PipelineConfig {
///     participants: vec!["3".into(), "7".into()],
///     reject_ptp: Some(100e-6),
///     ..PipelineConfig::variant_a()
/// };
/// assert_eq!(cfg.epoch.tmin, -0.2);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Input path template; every `{id}` is replaced by the participant id.
    pub input_template: String,
    /// Directory receiving epoch sets and plots.
    pub output_dir: PathBuf,
    /// Participants processed by `run-per-participant`.
    pub participants: Vec<String>,
    /// Non-EEG channels removed right after loading.
    pub drop_channels: Vec<String>,
    /// Policy for absent channels (drop list and montage).
    pub on_missing: OnMissing,
    /// Assign the standard 10-20 layout.
    pub montage: bool,
    /// Resample to this rate (Hz) before filtering.
    pub resample_sfreq: Option<f32>,
    /// High-pass cutoff (Hz).
    pub l_freq: Option<f32>,
    /// Low-pass cutoff (Hz).
    pub h_freq: Option<f32>,
    /// Condition label → event code.  Only these codes are epoched.
    pub event_table: EventTable,
    /// Artifact removal; `None` skips ICA.
    pub ica: Option<IcaConfig>,
    pub epoch: EpochWindow,
    /// Peak-to-peak rejection threshold in volts.
    pub reject_ptp: Option<f32>,
    pub exclusion: ExclusionPolicy,
    pub comparisons: Vec<Comparison>,
    pub plot: PlotConfig,
}

impl Default for PipelineConfig {
    /// The Variant A preset.
    fn default() -> Self {
        Self::variant_a()
    }
}

impl PipelineConfig {
    /// Four-condition oddball setup with ICA on the continuous signal.
    ///
    /// Recordings are read from `./<id>/<id>.vhdr`.  EEGLAB `.set` files are
    /// not supported; convert them to BrainVision (or to a `.safetensors`
    /// recording, see [`crate::io::save_recording`]) and point
    /// `input_template` at the result.
    pub fn variant_a() -> Self {
        Self {
            input_template: "./{id}/{id}.vhdr".to_string(),
            output_dir: PathBuf::from("./MNE Result"),
            participants: (1..10).map(|i| i.to_string()).collect(),
            drop_channels: ["ExG 1", "ExG 2", "A2", "Packet Counter", "TRIGGER"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            on_missing: OnMissing::Raise,
            montage: true,
            resample_sfreq: None,
            l_freq: Some(0.5),
            h_freq: Some(40.0),
            event_table: EventTable::from_pairs(&[
                ("odd", 1),
                ("response", 2),
                ("dummy", 3),
                ("normal", 4),
            ]),
            ica: Some(IcaConfig::default()),
            epoch: EpochWindow::default(),
            reject_ptp: Some(150e-6),
            exclusion: ExclusionPolicy::default(),
            comparisons: vec![Comparison::new("odd", "normal", false)],
            plot: PlotConfig::default(),
        }
    }

    /// Eight sub-condition setup: 256 Hz resampling, ICA trained on
    /// fixed-length epochs, exclusion only logged.
    pub fn variant_b() -> Self {
        let mut pairs = Vec::with_capacity(8);
        for k in 1..=4 {
            pairs.push((format!("odd/{k}"), 10 + k));
        }
        for k in 1..=4 {
            pairs.push((format!("normal/{k}"), 20 + k));
        }
        let comparisons = (1..=4)
            .map(|k| Comparison::new(&format!("odd/{k}"), &format!("normal/{k}"), true))
            .collect();

        Self {
            input_template: "../Raw_data/{id}.vhdr".to_string(),
            resample_sfreq: Some(256.0),
            event_table: EventTable::new(pairs),
            ica: Some(IcaConfig {
                fit_on: IcaFitOn::FixedEpochs { duration: 1.0, mad_k: 3.0 },
                ..IcaConfig::default()
            }),
            exclusion: ExclusionPolicy { max_drop_pct: 25.0, skip_persistence: false },
            comparisons,
            ..Self::variant_a()
        }
    }

    /// Read a TOML configuration; absent keys take Variant A values.
    pub fn from_toml_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading config {}", path.display()))?;
        let cfg: Self = toml::from_str(&text)
            .with_context(|| format!("parsing config {}", path.display()))?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn to_toml(&self) -> Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Reject configurations that cannot produce a valid epoch set.
    pub fn validate(&self) -> Result<()> {
        if self.epoch.tmin >= self.epoch.tmax {
            bail!("epoch window is empty: tmin={} tmax={}", self.epoch.tmin, self.epoch.tmax);
        }
        if let Some((b0, b1)) = self.epoch.baseline {
            if b0 > b1 || b0 < self.epoch.tmin || b1 > self.epoch.tmax {
                bail!(
                    "baseline ({b0}, {b1}) must lie inside the epoch window ({}, {})",
                    self.epoch.tmin,
                    self.epoch.tmax
                );
            }
        }
        if let (Some(l), Some(h)) = (self.l_freq, self.h_freq) {
            if l >= h {
                bail!("high-pass cutoff {l} Hz must be below low-pass cutoff {h} Hz");
            }
        }
        if self.event_table.is_empty() {
            bail!("event table is empty");
        }
        for cmp in &self.comparisons {
            for label in [&cmp.a, &cmp.b] {
                if !self.event_table.matches_tag(label) {
                    bail!("comparison label '{label}' matches no condition in the event table");
                }
            }
        }
        Ok(())
    }

    /// Recording path of participant `id`.
    pub fn input_path(&self, id: &str) -> PathBuf {
        PathBuf::from(self.input_template.replace("{id}", id))
    }

    /// Persisted epoch-set path of participant `id`.
    pub fn epochs_path(&self, id: &str) -> PathBuf {
        self.output_dir.join(format!("{id}{}", crate::io::EPOCHS_SUFFIX))
    }

    /// Plot path `<output_dir>/<stem>.html`.
    pub fn plot_path(&self, stem: &str) -> PathBuf {
        self.output_dir.join(format!("{stem}.html"))
    }
}
