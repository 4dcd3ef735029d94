//! Time-code store
//!
//! An immutable index built once per loaded work. Every per-frame query is
//! either a binary search over sorted data or an O(1) bar-cache access; the
//! raw flow is never rescanned after [`TimeCodeStore::build`].

use std::collections::BTreeSet;

use serde::Serialize;
use tracing::debug;

use super::document::{BarMarker, FlowEvent, TimeCodeDocument, TimeCodeMeta};
use crate::error::{PlayerError, PlayerWarning};
use crate::score::{ElementId, ScoreIndex};

/// Bar ranges wider than this are treated as a corrupt document.
pub const MAX_BARS: u32 = 100_000;

/// A note with its element references resolved against the score.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TimedNote {
    /// Position in start-time order; stable for the lifetime of the store.
    pub index: usize,
    pub start: f64,
    pub end: f64,
    pub channel: u32,
    pub refs: Vec<String>,
    #[serde(skip)]
    pub elements: Vec<ElementId>,
}

impl TimedNote {
    /// Whether the sounding interval `[start, end)` meets the window `[from, to]`.
    pub fn intersects(&self, from: f64, to: f64) -> bool {
        self.start <= to && self.end > from
    }
}

/// Per-bar cache entry: the bar's score elements and its notes.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BarCacheEntry {
    pub bar: u32,
    pub elements: Vec<ElementId>,
    /// Indices into [`TimeCodeStore::notes`], in start-time order.
    pub notes: Vec<usize>,
}

/// Dense cache covering every bar from the lowest to the highest known bar.
#[derive(Debug, Clone, Default)]
pub struct BarCache {
    lowest: u32,
    entries: Vec<BarCacheEntry>,
}

impl BarCache {
    fn covering(lowest: u32, highest: u32) -> Self {
        let entries = (lowest..=highest)
            .map(|bar| BarCacheEntry {
                bar,
                ..Default::default()
            })
            .collect();
        Self { lowest, entries }
    }

    /// Entry for `bar`, or `None` when the bar is outside the cached range.
    pub fn get(&self, bar: u32) -> Option<&BarCacheEntry> {
        let offset = bar.checked_sub(self.lowest)? as usize;
        self.entries.get(offset)
    }

    fn get_mut(&mut self, bar: u32) -> Option<&mut BarCacheEntry> {
        let offset = bar.checked_sub(self.lowest)? as usize;
        self.entries.get_mut(offset)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &BarCacheEntry> {
        self.entries.iter()
    }
}

#[derive(Debug, Clone)]
pub struct TimeCodeStore {
    meta: TimeCodeMeta,
    boundaries: Vec<BarMarker>,
    notes: Vec<TimedNote>,
    longest_note: f64,
    bar_cache: BarCache,
    total_bars: u32,
    skipped_notes: usize,
    missing_refs: usize,
}

impl TimeCodeStore {
    /// Build a store with no score attached. Bar element sets are empty.
    pub fn build(document: &TimeCodeDocument) -> Result<Self, PlayerError> {
        Self::build_with_score(document, &ScoreIndex::default())
    }

    /// Build a store and resolve note refs and bar elements against `score`.
    ///
    /// # Errors
    /// [`PlayerError::MalformedTimeCode`] if the bar range is implausibly
    /// large.
    pub fn build_with_score(
        document: &TimeCodeDocument,
        score: &ScoreIndex,
    ) -> Result<Self, PlayerError> {
        let meta = document.meta.clone();

        // Stable sort keeps document order among equal timestamps so that the
        // dedup below can apply last-write-wins.
        let mut boundaries: Vec<BarMarker> = document.bar_markers().copied().collect();
        boundaries.sort_by(|a, b| a.time.total_cmp(&b.time));
        let mut deduped: Vec<BarMarker> = Vec::with_capacity(boundaries.len());
        for marker in boundaries {
            match deduped.last_mut() {
                Some(last) if last.time == marker.time => *last = marker,
                _ => deduped.push(marker),
            }
        }
        let boundaries = deduped;

        let mut events: Vec<_> = document
            .flow
            .iter()
            .filter_map(|event| match event {
                FlowEvent::Note(note) => Some(note),
                FlowEvent::Bar(_) => None,
            })
            .collect();
        events.sort_by(|a, b| a.start.total_cmp(&b.start));

        let mut missing: BTreeSet<&str> = BTreeSet::new();
        let mut longest_note: f64 = 0.0;
        let notes: Vec<TimedNote> = events
            .into_iter()
            .enumerate()
            .map(|(index, note)| {
                let mut elements = Vec::new();
                for reference in &note.refs {
                    let found = score.elements_for_ref(reference);
                    if found.is_empty() {
                        missing.insert(reference.as_str());
                    }
                    elements.extend_from_slice(found);
                }
                longest_note = longest_note.max(note.end - note.start);
                TimedNote {
                    index,
                    start: note.start,
                    end: note.end,
                    channel: note.channel,
                    refs: note.refs.clone(),
                    elements,
                }
            })
            .collect();

        // Only report missing refs when there is a score to look them up in.
        if score.element_count() > 0 {
            for reference in &missing {
                PlayerWarning::MissingElement(reference.to_string()).log();
            }
        }
        let missing_refs = if score.element_count() > 0 { missing.len() } else { 0 };

        let declared_last = meta
            .first_bar
            .checked_add(meta.total_bars.saturating_sub(1))
            .ok_or_else(|| {
                PlayerError::MalformedTimeCode(format!("bar count {} overflows", meta.total_bars))
            })?;
        let lowest = boundaries
            .iter()
            .map(|m| m.bar)
            .chain(score.bars())
            .fold(meta.first_bar, u32::min);
        let highest = boundaries
            .iter()
            .map(|m| m.bar)
            .chain(score.bars())
            .fold(declared_last, u32::max);
        if highest - lowest >= MAX_BARS {
            return Err(PlayerError::MalformedTimeCode(format!(
                "bar range {lowest}..={highest} exceeds {MAX_BARS} bars"
            )));
        }
        let total_bars = if meta.total_bars > 0 {
            meta.total_bars
        } else {
            highest - meta.first_bar.min(highest) + 1
        };

        let mut store = TimeCodeStore {
            meta,
            boundaries,
            notes,
            longest_note,
            bar_cache: BarCache::covering(lowest, highest),
            total_bars,
            skipped_notes: document.skipped_notes,
            missing_refs,
        };

        for bar in lowest..=highest {
            let elements = score.elements_for_bar(bar);
            if let Some(entry) = store.bar_cache.get_mut(bar) {
                entry.elements.extend_from_slice(elements);
            }
        }
        for i in 0..store.notes.len() {
            let bar = store.measure_at(store.notes[i].start);
            if let Some(entry) = store.bar_cache.get_mut(bar) {
                entry.notes.push(i);
            }
        }

        debug!(
            notes = store.notes.len(),
            boundaries = store.boundaries.len(),
            bars = store.bar_cache.len(),
            "Built time-code store"
        );
        Ok(store)
    }

    /// Bar sounding at `time`: the bar of the last boundary at or before
    /// `time`, or the first bar when `time` precedes every boundary.
    pub fn measure_at(&self, time: f64) -> u32 {
        let after = self.boundaries.partition_point(|marker| marker.time <= time);
        match after.checked_sub(1) {
            Some(i) => self.boundaries[i].bar,
            None => self.meta.first_bar,
        }
    }

    /// Score elements of `bar`; empty when the bar is out of range.
    pub fn elements_for_measure(&self, bar: u32) -> &[ElementId] {
        self.bar_cache
            .get(bar)
            .map(|entry| entry.elements.as_slice())
            .unwrap_or(&[])
    }

    /// Notes whose sounding interval meets `[from, to]`, in start-time order.
    pub fn active_notes_in_window(&self, from: f64, to: f64) -> Vec<&TimedNote> {
        if to < from {
            return Vec::new();
        }
        // No note starting before `from - longest_note` can still sound at `from`.
        let lo = self
            .notes
            .partition_point(|note| note.start < from - self.longest_note);
        let hi = self.notes.partition_point(|note| note.start <= to);
        self.notes[lo..hi.max(lo)]
            .iter()
            .filter(|note| note.intersects(from, to))
            .collect()
    }

    /// Notes starting inside `bar`.
    pub fn notes_in_measure(&self, bar: u32) -> impl Iterator<Item = &TimedNote> {
        self.bar_cache
            .get(bar)
            .map(|entry| entry.notes.as_slice())
            .unwrap_or(&[])
            .iter()
            .map(move |&i| &self.notes[i])
    }

    pub fn meta(&self) -> &TimeCodeMeta {
        &self.meta
    }

    pub fn first_bar(&self) -> u32 {
        self.meta.first_bar
    }

    pub fn total_bars(&self) -> u32 {
        self.total_bars
    }

    pub fn notes(&self) -> &[TimedNote] {
        &self.notes
    }

    pub fn boundaries(&self) -> &[BarMarker] {
        &self.boundaries
    }

    pub fn bar_cache(&self) -> &BarCache {
        &self.bar_cache
    }

    /// Distinct channels used by notes, ascending.
    pub fn channels(&self) -> Vec<u32> {
        let channels: BTreeSet<u32> = self.notes.iter().map(|note| note.channel).collect();
        channels.into_iter().collect()
    }

    /// Latest timestamp the flow mentions.
    pub fn end_time(&self) -> f64 {
        let last_note = self.notes.iter().map(|note| note.end).fold(0.0, f64::max);
        let last_bar = self.boundaries.last().map(|m| m.time).unwrap_or(0.0);
        last_note.max(last_bar)
    }

    pub fn skipped_notes(&self) -> usize {
        self.skipped_notes
    }

    pub fn missing_refs(&self) -> usize {
        self.missing_refs
    }
}
