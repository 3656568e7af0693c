//! # p3erp: P3 event-related potentials from oddball EEG
//!
//! `p3erp` extracts the P3 component by contrasting "odd" and "normal"
//! stimuli.  Each participant's recording is cleaned, epoched around the
//! stimuli and averaged; the persisted epoch sets of all participants are
//! then pooled into a grand average.  The DSP steps follow MNE-Python's
//! defaults (firwin FIR design, overlap-add zero-phase filtering, FFT
//! resampling, `Epochs` windowing and peak-to-peak rejection).
//!
//! ## Pipeline overview
//!
//! ```text
//! run-per-participant                         aggregate
//! ───────────────────                         ─────────
//! <id>.vhdr                                   MNE Result/*-epo.safetensors
//!   │                                           │
//!   ├─ drop non-EEG channels                    ├─ load + concatenate
//!   ├─ standard 10-20 montage                   ├─ average per condition
//!   ├─ [resample 256 Hz]                        └─ Grand Average*.html
//!   ├─ FIR high-pass 0.5 Hz, low-pass 40 Hz
//!   ├─ average reference
//!   ├─ ICA artifact removal
//!   ├─ epochs −0.2…0.5 s, baseline, 150 µV ptp
//!   ├─ drop rate > 25 % → excluded
//!   └─ <id>-epo.safetensors + <id>.html
//! ```
//!
//! ## Quick start
//!
//! ```no_run
//! use p3erp::{grand_average, run_participant, PipelineConfig};
//!
//! let cfg = PipelineConfig {
//!     participants: vec!["1".into(), "2".into()],
//!     ..PipelineConfig::variant_a()
//! };
//! for id in &cfg.participants {
//!     let outcome = run_participant(id, &cfg).unwrap();
//!     println!("P{id}: {:.1}% dropped", outcome.drop_rate());
//! }
//! let grand = grand_average(&cfg).unwrap();
//! println!("{} epochs pooled", grand.epochs.len());
//! ```
//!
//! ## Running individual steps
//!
//! ```no_run
//! use p3erp::{EpochSet, PipelineConfig};
//! use p3erp::pipeline::{load_recording, preprocess};
//! use std::path::Path;
//!
//! let cfg = PipelineConfig::variant_a();
//! let mut rec = load_recording(Path::new("1/1.vhdr")).unwrap();
//! preprocess(&mut rec, &cfg).unwrap();
//! let epochs = EpochSet::from_recording(&rec, &cfg.event_table, &cfg.epoch, cfg.reject_ptp).unwrap();
//! let odd = epochs.average_condition("odd").unwrap();
//! println!("odd: {} epochs", odd.nave);
//! ```

pub mod aggregate;
pub mod baseline;
pub mod brainvision;
pub mod config;
pub mod epoch;
pub mod events;
pub mod evoked;
pub mod filter;
pub mod ica;
pub mod io;
pub mod montage;
pub mod pipeline;
pub mod plot;
pub mod recording;
pub mod reference;
pub mod resample;

// ── Crate-root re-exports ─────────────────────────────────────────────────

// config
pub use config::{
    Comparison, EpochWindow, ExclusionPolicy, IcaConfig, IcaFitOn, OnMissing, PipelineConfig, PlotConfig,
};

// data model
pub use epoch::{DropReason, EpochSet};
pub use events::{Event, EventId, EventTable};
pub use evoked::{combine_evoked, difference_wave, Evoked};
pub use recording::Recording;

// io
pub use brainvision::read_brainvision;
pub use io::{load_epochs, save_epochs, StFile, StWriter};

// pipeline
pub use aggregate::{grand_average, GrandAverage};
pub use ica::Ica;
pub use pipeline::{run_participant, run_participants, ParticipantOutcome, ParticipantOutput};
