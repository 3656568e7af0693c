//! BrainVision reader (`.vhdr` header, `.vmrk` markers, `.eeg` samples).
//!
//! Header and samples are loaded with `bvreader`, which applies each
//! channel's resolution so samples come out in µV; they are stored in volts.
//! Only `Stimulus` markers carrying an integer code become events; marker
//! positions are 1-based in the file and 0-based in the returned recording.
use std::path::{Path, PathBuf};

use anyhow::{anyhow, bail, Context, Result};
use bvreader::bv_reader::BVFile;
use ndarray::Array2;

use crate::events::{code_from_description, Event};
use crate::recording::Recording;

/// Load a full recording from its `.vhdr` header.
pub fn read_brainvision(vhdr: &Path) -> Result<Recording> {
    let path = vhdr.to_str().with_context(|| format!("non UTF-8 path {}", vhdr.display()))?;
    let mut file = BVFile::from_header(path).map_err(|e| anyhow!("loading {}: {e:?}", vhdr.display()))?;
    file.validate().map_err(|e| anyhow!("invalid BrainVision file {}: {e:?}", vhdr.display()))?;
    file.bv_data
        .scale_channels(&file.bv_header.channel_info)
        .map_err(|e| anyhow!("scaling {}: {e:?}", vhdr.display()))?;

    let header = &file.bv_header;
    if header.sampling_interval as f64 <= 0.0 {
        bail!("{}: invalid sampling interval", vhdr.display());
    }
    let sfreq = (1e6 / header.sampling_interval as f64) as f32;
    let ch_names: Vec<String> = header.channel_info.iter().map(|ch| ch.label.clone()).collect();
    let data = channels_to_volts(&file.bv_data.data)?;
    if data.nrows() != ch_names.len() {
        bail!("{}: {} channels in header, {} in data", vhdr.display(), ch_names.len(), data.nrows());
    }

    let events = match marker_file(vhdr)? {
        Some(path) => {
            let text = std::fs::read(&path).with_context(|| format!("reading {}", path.display()))?;
            parse_vmrk(&String::from_utf8_lossy(&text))
        }
        None => vec![],
    };
    log::info!(
        "{}: {} channels, {} samples at {} Hz, {} stimulus events",
        vhdr.display(),
        ch_names.len(),
        data.ncols(),
        sfreq,
        events.len()
    );
    Recording::new(data, sfreq, ch_names, events)
}

/// Stack per-channel µV traces into a `[C, T]` array in volts.
fn channels_to_volts(channels: &[Vec<f32>]) -> Result<Array2<f32>> {
    let n_t = channels.first().map_or(0, |c| c.len());
    if channels.iter().any(|c| c.len() != n_t) {
        bail!("channels have different lengths");
    }
    let mut data = Array2::<f32>::zeros((channels.len(), n_t));
    for (mut row, ch) in data.rows_mut().into_iter().zip(channels) {
        for (dst, &v) in row.iter_mut().zip(ch) {
            *dst = v * 1e-6;
        }
    }
    Ok(data)
}

/// The `MarkerFile` named in the header, resolved next to it, or the
/// `.vmrk` sibling when the header names none.
fn marker_file(vhdr: &Path) -> Result<Option<PathBuf>> {
    let text = std::fs::read(vhdr).with_context(|| format!("reading {}", vhdr.display()))?;
    let dir = vhdr.parent().unwrap_or_else(|| Path::new("."));
    let named = String::from_utf8_lossy(&text)
        .lines()
        .find_map(|l| l.trim().strip_prefix("MarkerFile=").map(|m| dir.join(m.trim())));
    let path = named.unwrap_or_else(|| vhdr.with_extension("vmrk"));
    Ok(path.exists().then_some(path))
}

/// Stimulus events of a `.vmrk` file.
///
/// Entries look like `Mk2=Stimulus,S  1,1234,1,0`.
pub fn parse_vmrk(text: &str) -> Vec<Event> {
    let mut in_markers = false;
    let mut events = Vec::new();
    for line in text.lines().map(str::trim) {
        if line.starts_with('[') {
            in_markers = line == "[Marker Infos]";
            continue;
        }
        if !in_markers || line.starts_with(';') {
            continue;
        }
        let Some((_, value)) = line.split_once('=') else {
            continue;
        };
        if let Some(ev) = stimulus_event(value) {
            events.push(ev);
        }
    }
    events
}

fn stimulus_event(value: &str) -> Option<Event> {
    let mut fields = value.split(',');
    if fields.next()?.trim() != "Stimulus" {
        return None;
    }
    let code = code_from_description(fields.next()?)?;
    let pos: usize = fields.next()?.trim().parse().ok()?;
    Some(Event { sample: pos.saturating_sub(1), code })
}
