//! Time-code document parsing
//!
//! The document pairs audio timestamps with score element references. It has
//! two required top-level sections:
//!
//! ```yaml
//! meta:
//!   firstBar: 1
//!   totalBars: 32
//!   leadTimeSeconds: 0.05
//! flow:
//!   - [0.0, 1]                      # bar marker: (time, bar)
//!   - [0.0, 0, ["n1", "n2"], 0.5]   # note: (start, channel, refs, end)
//!   - [2.0, 2]
//! ```

use serde::{Deserialize, Serialize};
use serde_yaml::Value;

use crate::error::{PlayerError, PlayerWarning};

/// Global timing parameters from the `meta` section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimeCodeMeta {
    #[serde(default = "default_first_bar", alias = "first_bar")]
    pub first_bar: u32,
    /// Total bar count; derived from the flow when absent or zero.
    #[serde(default, alias = "total_bars", alias = "totalMeasures")]
    pub total_bars: u32,
    #[serde(default, alias = "lead_time_seconds", alias = "leadTime")]
    pub lead_time_seconds: f64,
}

fn default_first_bar() -> u32 {
    1
}

impl Default for TimeCodeMeta {
    fn default() -> Self {
        Self {
            first_bar: default_first_bar(),
            total_bars: 0,
            lead_time_seconds: 0.0,
        }
    }
}

/// A `[time, bar]` flow entry.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct BarMarker {
    pub time: f64,
    pub bar: u32,
}

/// A `[start, channel, refs, end]` flow entry.
///
/// The note sounds over the half-open interval `[start, end)`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NoteEvent {
    pub start: f64,
    pub end: f64,
    pub channel: u32,
    pub refs: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum FlowEvent {
    Bar(BarMarker),
    Note(NoteEvent),
}

/// A parsed time-code document.
///
/// Flow events keep document order here; sorting happens when the
/// [`TimeCodeStore`](super::TimeCodeStore) is built.
#[derive(Debug, Clone, PartialEq)]
pub struct TimeCodeDocument {
    pub meta: TimeCodeMeta,
    pub flow: Vec<FlowEvent>,
    /// Note entries dropped during parsing because their payload was unusable.
    pub skipped_notes: usize,
}

/// Raw document for deserialization. Flow entries stay untyped until
/// [`parse_flow_entry`] classifies them.
#[derive(Deserialize, Debug, Default)]
struct RawDocument {
    meta: Option<TimeCodeMeta>,
    flow: Option<Vec<Value>>,
}

impl TimeCodeDocument {
    pub fn new(meta: TimeCodeMeta, flow: Vec<FlowEvent>) -> Self {
        Self {
            meta,
            flow,
            skipped_notes: 0,
        }
    }

    /// Parse a YAML (or JSON, which YAML accepts) time-code document.
    pub fn from_yaml(source: &str) -> Result<Self, PlayerError> {
        let raw: RawDocument = serde_yaml::from_str(source)
            .map_err(|e| PlayerError::MalformedTimeCode(e.to_string()))?;
        Self::from_raw(raw)
    }

    pub fn from_json(source: &str) -> Result<Self, PlayerError> {
        let raw: RawDocument = serde_json::from_str(source)
            .map_err(|e| PlayerError::MalformedTimeCode(e.to_string()))?;
        Self::from_raw(raw)
    }

    fn from_raw(raw: RawDocument) -> Result<Self, PlayerError> {
        let meta = raw.meta.ok_or_else(|| {
            PlayerError::MalformedTimeCode("Sync data missing \"meta\" section".to_string())
        })?;
        let entries = raw.flow.ok_or_else(|| {
            PlayerError::MalformedTimeCode("Sync data missing \"flow\" section".to_string())
        })?;
        if !meta.lead_time_seconds.is_finite() {
            return Err(PlayerError::MalformedTimeCode(format!(
                "lead time must be finite, got {}",
                meta.lead_time_seconds
            )));
        }

        let mut flow = Vec::with_capacity(entries.len());
        let mut skipped_notes = 0;
        for (index, entry) in entries.iter().enumerate() {
            match parse_flow_entry(index, entry)? {
                Ok(event) => flow.push(event),
                Err(warning) => {
                    warning.log();
                    skipped_notes += 1;
                }
            }
        }

        Ok(Self {
            meta,
            flow,
            skipped_notes,
        })
    }

    pub fn bar_markers(&self) -> impl Iterator<Item = &BarMarker> {
        self.flow.iter().filter_map(|event| match event {
            FlowEvent::Bar(marker) => Some(marker),
            FlowEvent::Note(_) => None,
        })
    }

    pub fn notes(&self) -> impl Iterator<Item = &NoteEvent> {
        self.flow.iter().filter_map(|event| match event {
            FlowEvent::Note(note) => Some(note),
            FlowEvent::Bar(_) => None,
        })
    }
}

/// Classify one flow entry.
///
/// The outer `Result` is fatal: the entry has no recognizable shape, or it is
/// a bar marker with unusable values (which would corrupt bar lookup). The
/// inner `Result` carries a warning for a note entry whose payload is bad;
/// such notes are skipped.
fn parse_flow_entry(
    index: usize,
    entry: &Value,
) -> Result<Result<FlowEvent, PlayerWarning>, PlayerError> {
    let items = entry.as_sequence().ok_or_else(|| {
        PlayerError::MalformedTimeCode(format!("flow entry #{index} is not a list"))
    })?;

    match items.len() {
        2 => {
            let time = seconds(&items[0]).ok_or_else(|| {
                PlayerError::MalformedTimeCode(format!("flow entry #{index} has an invalid bar time"))
            })?;
            let bar = whole_number(&items[1]).ok_or_else(|| {
                PlayerError::MalformedTimeCode(format!(
                    "flow entry #{index} has an invalid bar number"
                ))
            })?;
            Ok(Ok(FlowEvent::Bar(BarMarker { time, bar })))
        }
        4 => Ok(parse_note(index, items).map(FlowEvent::Note)),
        n => Err(PlayerError::MalformedTimeCode(format!(
            "flow entry #{index} has {n} fields; expected [time, bar] or [time, channel, refs, end]"
        ))),
    }
}

fn parse_note(index: usize, items: &[Value]) -> Result<NoteEvent, PlayerWarning> {
    let malformed = |reason: &str| PlayerWarning::MalformedNote {
        index,
        reason: reason.to_string(),
    };

    let start = seconds(&items[0]).ok_or_else(|| malformed("start time is not a number"))?;
    // Flow files write a null channel for the default voice.
    let channel = match &items[1] {
        Value::Null => 0,
        other => whole_number(other).ok_or_else(|| malformed("channel is not a whole number"))?,
    };
    let refs = element_refs(&items[2]).ok_or_else(|| malformed("element refs are missing"))?;
    let end = seconds(&items[3]).ok_or_else(|| malformed("end time is not a number"))?;
    if end < start {
        return Err(malformed("end time precedes start time"));
    }

    Ok(NoteEvent {
        start,
        end,
        channel,
        refs,
    })
}

fn seconds(value: &Value) -> Option<f64> {
    value.as_f64().filter(|t| t.is_finite())
}

fn whole_number(value: &Value) -> Option<u32> {
    if let Some(n) = value.as_u64() {
        return u32::try_from(n).ok();
    }
    let f = value.as_f64()?;
    if f.fract() == 0.0 && (0.0..=u32::MAX as f64).contains(&f) {
        Some(f as u32)
    } else {
        None
    }
}

/// Refs may be a single id or a list of ids; numeric ids are accepted as text.
fn element_refs(value: &Value) -> Option<Vec<String>> {
    fn one(value: &Value) -> Option<String> {
        match value {
            Value::String(s) if !s.is_empty() => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        }
    }

    let refs = match value {
        Value::Sequence(items) => items.iter().map(one).collect::<Option<Vec<_>>>()?,
        other => vec![one(other)?],
    };
    if refs.is_empty() {
        None
    } else {
        Some(refs)
    }
}
