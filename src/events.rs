//! Stimulus events and the condition table.
//!
//! An [`Event`] is an `(onset sample, integer code)` pair.  The
//! [`EventTable`] maps semantic condition labels onto codes; labels may carry
//! `/`-separated tags (`"odd/2"`) so that selecting `"odd"` picks every
//! sub-condition, the same way MNE resolves hierarchical event ids.
use serde::{Deserialize, Serialize};

/// One annotated stimulus.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    /// Onset, in samples from the start of the recording.
    pub sample: usize,
    pub code: i32,
}

/// One row of the condition table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventId {
    pub label: String,
    pub code: i32,
}

/// Ordered condition label → event code table.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EventTable {
    entries: Vec<EventId>,
}

impl EventTable {
    pub fn new<S: Into<String>>(pairs: Vec<(S, i32)>) -> Self {
        Self {
            entries: pairs
                .into_iter()
                .map(|(label, code)| EventId { label: label.into(), code })
                .collect(),
        }
    }

    pub fn from_pairs(pairs: &[(&str, i32)]) -> Self {
        Self::new(pairs.to_vec())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &EventId> {
        self.entries.iter()
    }

    pub fn labels(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|e| e.label.as_str())
    }

    pub fn codes(&self) -> Vec<i32> {
        self.entries.iter().map(|e| e.code).collect()
    }

    pub fn code(&self, label: &str) -> Option<i32> {
        self.entries.iter().find(|e| e.label == label).map(|e| e.code)
    }

    pub fn label(&self, code: i32) -> Option<&str> {
        self.entries.iter().find(|e| e.code == code).map(|e| e.label.as_str())
    }

    /// Codes whose label is selected by `selector`.
    ///
    /// An exact label match wins; otherwise every label containing all of the
    /// `/`-separated tags of `selector` is selected.
    pub fn select_codes(&self, selector: &str) -> Vec<i32> {
        if let Some(code) = self.code(selector) {
            return vec![code];
        }
        let wanted: Vec<&str> = selector.split('/').collect();
        self.entries
            .iter()
            .filter(|e| {
                let tags: Vec<&str> = e.label.split('/').collect();
                wanted.iter().all(|w| tags.contains(w))
            })
            .map(|e| e.code)
            .collect()
    }

    pub fn matches_tag(&self, selector: &str) -> bool {
        !self.select_codes(selector).is_empty()
    }
}

/// Keep only events whose code is in `include`, preserving order.
///
/// Mirrors `mne.pick_events(events, include=...)`.
pub fn pick_events(events: &[Event], include: &[i32]) -> Vec<Event> {
    events.iter().copied().filter(|e| include.contains(&e.code)).collect()
}

/// Integer code of an annotation description.
///
/// BrainVision stimulus markers look like `"S  1"` or `"Stimulus/S 12"`; the
/// code is the trailing integer.  Returns `None` for descriptions without one
/// (e.g. `"New Segment"` or `"Comment/foo"`).
pub fn code_from_description(description: &str) -> Option<i32> {
    let tail = description.rsplit('/').next().unwrap_or(description).trim();
    let digits_start = tail
        .char_indices()
        .rev()
        .take_while(|(_, c)| c.is_ascii_digit())
        .last()
        .map(|(i, _)| i)?;
    let prefix = tail[..digits_start].trim();
    if !(prefix.is_empty() || prefix.chars().all(|c| c.is_ascii_alphabetic())) {
        return None;
    }
    tail[digits_start..].parse().ok()
}
