//! Safetensors persistence.
//!
//! The container is the plain safetensors layout: an 8-byte little-endian
//! header length, a JSON header describing each tensor (`dtype`, `shape`,
//! `data_offsets`) plus an optional `__metadata__` string map, then the raw
//! little-endian tensor bytes.  It is used for two things:
//!
//! * per-participant epoch sets (`<id>-epo.safetensors`), written by the
//!   pipeline and read back by the grand-average aggregator;
//! * continuous recordings, an alternative input format to BrainVision.
use std::collections::BTreeMap;
use std::io::Write;
use std::path::Path;

use anyhow::{bail, Context, Result};
use ndarray::{Array2, Array3};
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::epoch::{DropReason, EpochSet};
use crate::events::{Event, EventTable};
use crate::recording::Recording;

/// File-name suffix of persisted epoch sets.
pub const EPOCHS_SUFFIX: &str = "-epo.safetensors";

const EPOCHS_FORMAT: &str = "p3erp-epochs-v1";
const RECORDING_FORMAT: &str = "p3erp-raw-v1";

// ── Reader ────────────────────────────────────────────────────────────────────

/// A parsed safetensors file held in memory.
pub struct StFile {
    bytes: Vec<u8>,
    data_start: usize,
    header: serde_json::Map<String, serde_json::Value>,
}

impl StFile {
    pub fn read(path: &Path) -> Result<Self> {
        let bytes = std::fs::read(path).with_context(|| format!("reading {}", path.display()))?;
        Self::parse(bytes).with_context(|| format!("parsing {}", path.display()))
    }

    pub fn parse(bytes: Vec<u8>) -> Result<Self> {
        if bytes.len() < 8 {
            bail!("safetensors file too small");
        }
        let mut len = [0u8; 8];
        len.copy_from_slice(&bytes[..8]);
        let n = u64::from_le_bytes(len);
        let Some(data_start) = usize::try_from(n).ok().and_then(|n| 8usize.checked_add(n)) else {
            bail!("header length {n} exceeds file size {}", bytes.len());
        };
        let Some(raw_header) = bytes.get(8..data_start) else {
            bail!("header length {n} exceeds file size {}", bytes.len());
        };
        let header: serde_json::Map<String, serde_json::Value> =
            serde_json::from_slice(raw_header).context("invalid safetensors header")?;
        Ok(Self { bytes, data_start, header })
    }

    /// Free-form string metadata.
    pub fn metadata(&self, key: &str) -> Option<&str> {
        self.header.get("__metadata__")?.get(key)?.as_str()
    }

    /// Metadata entry holding JSON, decoded.
    pub fn metadata_json<T: DeserializeOwned>(&self, key: &str) -> Result<T> {
        let Some(text) = self.metadata(key) else {
            bail!("missing metadata '{key}'");
        };
        serde_json::from_str(text).with_context(|| format!("decoding metadata '{key}'"))
    }

    pub fn has_tensor(&self, name: &str) -> bool {
        self.header.contains_key(name)
    }

    /// Shape and raw bytes of tensor `name`, checking its dtype.
    fn tensor(&self, name: &str, dtype: &str, elem: usize) -> Result<(Vec<usize>, &[u8])> {
        let Some(entry) = self.header.get(name) else {
            bail!("missing tensor '{name}'");
        };
        if entry["dtype"].as_str() != Some(dtype) {
            bail!("tensor '{name}': expected {dtype}, found {}", entry["dtype"]);
        }
        let shape: Vec<usize> = entry["shape"]
            .as_array()
            .context("tensor shape")?
            .iter()
            .map(|v| v.as_u64().map(|d| d as usize).context("tensor dimension"))
            .collect::<Result<_>>()?;
        let offsets = entry["data_offsets"].as_array().context("tensor offsets")?;
        let (s, e) = match (offsets.first().and_then(|v| v.as_u64()), offsets.get(1).and_then(|v| v.as_u64())) {
            (Some(s), Some(e)) => (s as usize, e as usize),
            _ => bail!("tensor '{name}': malformed data_offsets"),
        };
        let n_bytes = shape.iter().try_fold(elem, |acc, &d| acc.checked_mul(d));
        if e < s || n_bytes != Some(e - s) {
            bail!("tensor '{name}': {} bytes for shape {shape:?}", e.saturating_sub(s));
        }
        let range = self.data_start.checked_add(s).zip(self.data_start.checked_add(e));
        let Some(raw) = range.and_then(|(s, e)| self.bytes.get(s..e)) else {
            bail!("tensor '{name}' runs past end of file");
        };
        Ok((shape, raw))
    }

    pub fn tensor_f32(&self, name: &str) -> Result<(Vec<usize>, Vec<f32>)> {
        let (shape, raw) = self.tensor(name, "F32", 4)?;
        let v = raw.chunks_exact(4).map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]])).collect();
        Ok((shape, v))
    }

    pub fn tensor_i32(&self, name: &str) -> Result<(Vec<usize>, Vec<i32>)> {
        let (shape, raw) = self.tensor(name, "I32", 4)?;
        let v = raw.chunks_exact(4).map(|b| i32::from_le_bytes([b[0], b[1], b[2], b[3]])).collect();
        Ok((shape, v))
    }

    pub fn tensor_i64(&self, name: &str) -> Result<(Vec<usize>, Vec<i64>)> {
        let (shape, raw) = self.tensor(name, "I64", 8)?;
        let v = raw
            .chunks_exact(8)
            .map(|b| i64::from_le_bytes([b[0], b[1], b[2], b[3], b[4], b[5], b[6], b[7]]))
            .collect();
        Ok((shape, v))
    }
}

// ── Writer ────────────────────────────────────────────────────────────────────

/// Safetensors writer for F32, I32 and I64 tensors plus string metadata.
#[derive(Default)]
pub struct StWriter {
    entries: Vec<(String, Vec<u8>, &'static str, Vec<usize>)>,
    metadata: BTreeMap<String, String>,
}

impl StWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_f32(&mut self, name: &str, data: &[f32], shape: &[usize]) {
        let bytes = data.iter().flat_map(|v| v.to_le_bytes()).collect();
        self.entries.push((name.to_string(), bytes, "F32", shape.to_vec()));
    }

    pub fn add_i32(&mut self, name: &str, data: &[i32], shape: &[usize]) {
        let bytes = data.iter().flat_map(|v| v.to_le_bytes()).collect();
        self.entries.push((name.to_string(), bytes, "I32", shape.to_vec()));
    }

    pub fn add_i64(&mut self, name: &str, data: &[i64], shape: &[usize]) {
        let bytes = data.iter().flat_map(|v| v.to_le_bytes()).collect();
        self.entries.push((name.to_string(), bytes, "I64", shape.to_vec()));
    }

    pub fn add_metadata(&mut self, key: &str, value: impl Into<String>) {
        self.metadata.insert(key.to_string(), value.into());
    }

    pub fn add_metadata_json<T: Serialize>(&mut self, key: &str, value: &T) -> Result<()> {
        self.add_metadata(key, serde_json::to_string(value)?);
        Ok(())
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let mut header = serde_json::Map::new();
        if !self.metadata.is_empty() {
            header.insert("__metadata__".into(), serde_json::to_value(&self.metadata)?);
        }
        let mut offset = 0usize;
        for (name, data, dtype, shape) in &self.entries {
            header.insert(
                name.clone(),
                serde_json::json!({
                    "dtype": dtype,
                    "shape": shape,
                    "data_offsets": [offset, offset + data.len()],
                }),
            );
            offset += data.len();
        }
        let mut hdr = serde_json::to_vec(&header)?;
        hdr.resize(hdr.len() + (8 - hdr.len() % 8) % 8, b' ');

        let mut out = Vec::with_capacity(8 + hdr.len() + offset);
        out.extend_from_slice(&(hdr.len() as u64).to_le_bytes());
        out.extend_from_slice(&hdr);
        for (_, data, _, _) in &self.entries {
            out.extend_from_slice(data);
        }
        Ok(out)
    }

    pub fn write(&self, path: &Path) -> Result<()> {
        let bytes = self.to_bytes()?;
        let mut f = std::fs::File::create(path).with_context(|| format!("creating {}", path.display()))?;
        f.write_all(&bytes)?;
        Ok(())
    }
}

// ── Epoch sets ────────────────────────────────────────────────────────────────

/// Persist an epoch set; overwrites an existing file.
pub fn save_epochs(epochs: &EpochSet, path: &Path) -> Result<()> {
    let (n_e, n_c, n_t) = epochs.data.dim();
    let data: Vec<f32> = epochs.data.iter().copied().collect();
    let samples: Vec<i64> = epochs.samples.iter().map(|&s| s as i64).collect();

    let mut w = StWriter::new();
    w.add_f32("data", &data, &[n_e, n_c, n_t]);
    w.add_i32("codes", &epochs.codes, &[n_e]);
    w.add_i64("samples", &samples, &[n_e]);
    w.add_metadata("format", EPOCHS_FORMAT);
    w.add_metadata_json("ch_names", &epochs.ch_names)?;
    w.add_metadata_json("sfreq", &epochs.sfreq)?;
    w.add_metadata_json("tmin", &epochs.tmin)?;
    w.add_metadata_json("baseline", &epochs.baseline)?;
    w.add_metadata_json("event_table", &epochs.event_table)?;
    w.add_metadata_json("drop_log", &epochs.drop_log)?;
    w.write(path)
}

/// Read an epoch set written by [`save_epochs`].
pub fn load_epochs(path: &Path) -> Result<EpochSet> {
    let st = StFile::read(path)?;
    if st.metadata("format") != Some(EPOCHS_FORMAT) {
        bail!("{} is not a p3erp epoch file", path.display());
    }
    let (shape, data) = st.tensor_f32("data")?;
    let [n_e, n_c, n_t] = shape[..] else {
        bail!("epoch data must be 3-D, got shape {shape:?}");
    };
    let data = Array3::from_shape_vec((n_e, n_c, n_t), data)?;
    let (_, codes) = st.tensor_i32("codes")?;
    let (_, samples) = st.tensor_i64("samples")?;
    let ch_names: Vec<String> = st.metadata_json("ch_names")?;
    if ch_names.len() != n_c || codes.len() != n_e || samples.len() != n_e {
        bail!("{}: inconsistent epoch metadata", path.display());
    }

    Ok(EpochSet {
        data,
        codes,
        samples: samples.into_iter().map(|s| s as usize).collect(),
        event_table: st.metadata_json::<EventTable>("event_table")?,
        ch_names,
        sfreq: st.metadata_json("sfreq")?,
        tmin: st.metadata_json("tmin")?,
        baseline: st.metadata_json("baseline")?,
        drop_log: st.metadata_json::<Vec<Option<DropReason>>>("drop_log")?,
    })
}

// ── Recordings ────────────────────────────────────────────────────────────────

/// Persist a continuous recording (data, channel names, positions, events).
pub fn save_recording(rec: &Recording, path: &Path) -> Result<()> {
    let (n_c, n_t) = rec.data.dim();
    let data: Vec<f32> = rec.data.iter().copied().collect();
    let events: Vec<i64> = rec.events.iter().flat_map(|e| [e.sample as i64, e.code as i64]).collect();

    let mut w = StWriter::new();
    w.add_f32("data", &data, &[n_c, n_t]);
    w.add_i64("events", &events, &[rec.events.len(), 2]);
    if let Some(pos) = &rec.chan_pos {
        let flat: Vec<f32> = pos.iter().copied().collect();
        w.add_f32("chan_pos", &flat, &[pos.nrows(), pos.ncols()]);
    }
    w.add_metadata("format", RECORDING_FORMAT);
    w.add_metadata_json("sfreq", &rec.sfreq)?;
    w.add_metadata_json("ch_names", &rec.ch_names)?;
    w.write(path)
}

/// Read a recording written by [`save_recording`].
pub fn load_recording(path: &Path) -> Result<Recording> {
    let st = StFile::read(path)?;
    if st.metadata("format") != Some(RECORDING_FORMAT) {
        bail!("{} is not a p3erp recording", path.display());
    }
    let (shape, data) = st.tensor_f32("data")?;
    let [n_c, n_t] = shape[..] else {
        bail!("recording data must be 2-D, got shape {shape:?}");
    };
    let data = Array2::from_shape_vec((n_c, n_t), data)?;
    let (_, flat) = st.tensor_i64("events")?;
    let events = flat
        .chunks_exact(2)
        .map(|p| Event { sample: p[0].max(0) as usize, code: p[1] as i32 })
        .collect();

    let mut rec = Recording::new(data, st.metadata_json("sfreq")?, st.metadata_json("ch_names")?, events)?;
    if st.has_tensor("chan_pos") {
        let (shape, pos) = st.tensor_f32("chan_pos")?;
        let [rows, cols] = shape[..] else {
            bail!("chan_pos must be 2-D, got shape {shape:?}");
        };
        rec.chan_pos = Some(Array2::from_shape_vec((rows, cols), pos)?);
    }
    Ok(rec)
}
