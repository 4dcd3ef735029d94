//! # Score Index
//!
//! The SVG score is rendered externally and only consumed here. Highlightable
//! note elements carry a `data-ref` attribute and bar elements carry a
//! `data-bar` attribute; those two attributes are the only way the player
//! locates anything in the markup.
//!
//! [`ScoreIndex::parse`] scans the markup once per load and assigns every
//! tagged element an [`ElementId`]: its position among tagged elements in
//! document order. A browser host resolves the same ids with
//! `svg.querySelectorAll("[data-ref], [data-bar]")`, which walks the tree in
//! the same order.

use std::collections::{BTreeMap, HashMap};

use quick_xml::events::{BytesStart, Event};
use quick_xml::reader::Reader;
use serde::Serialize;
use tracing::debug;

use crate::error::PlayerError;

pub const REF_ATTRIBUTE: &[u8] = b"data-ref";
pub const BAR_ATTRIBUTE: &[u8] = b"data-bar";

/// Stable handle of a tagged score element.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct ElementId(pub usize);

#[derive(Debug, Clone, Default)]
pub struct ScoreIndex {
    by_ref: HashMap<String, Vec<ElementId>>,
    by_bar: BTreeMap<u32, Vec<ElementId>>,
    element_count: usize,
}

impl ScoreIndex {
    /// Build the index from SVG markup.
    ///
    /// # Errors
    /// [`PlayerError::AssetLoad`] if the markup is not well-formed XML or has
    /// no `<svg>` element.
    pub fn parse(markup: &str) -> Result<Self, PlayerError> {
        let mut reader = Reader::from_str(markup);
        let mut index = ScoreIndex::default();
        let mut saw_svg = false;

        loop {
            match reader.read_event() {
                Ok(Event::Start(element)) | Ok(Event::Empty(element)) => {
                    if element.local_name().as_ref() == b"svg" {
                        saw_svg = true;
                    }
                    index.visit(&element)?;
                }
                Ok(Event::Eof) => break,
                Ok(_) => {}
                Err(e) => {
                    return Err(PlayerError::asset(
                        "score",
                        format!("invalid SVG at byte {}: {e}", reader.buffer_position()),
                    ))
                }
            }
        }

        if !saw_svg {
            return Err(PlayerError::asset(
                "score",
                "SVG element not found in loaded content",
            ));
        }

        debug!(
            elements = index.element_count,
            refs = index.by_ref.len(),
            bars = index.by_bar.len(),
            "Indexed score markup"
        );
        Ok(index)
    }

    fn visit(&mut self, element: &BytesStart<'_>) -> Result<(), PlayerError> {
        let mut reference = None;
        let mut bar = None;
        let mut tagged = false;

        for attribute in element.attributes() {
            let attribute = attribute.map_err(|e| {
                PlayerError::asset("score", format!("invalid SVG attribute: {e}"))
            })?;
            let key = attribute.key.as_ref();
            if key != REF_ATTRIBUTE && key != BAR_ATTRIBUTE {
                continue;
            }
            tagged = true;
            let value = attribute
                .unescape_value()
                .map_err(|e| PlayerError::asset("score", format!("invalid SVG attribute: {e}")))?;
            if key == REF_ATTRIBUTE {
                reference = Some(value.into_owned());
            } else {
                match value.trim().parse::<u32>() {
                    Ok(number) => bar = Some(number),
                    Err(_) => debug!(value = %value, "Ignoring non-numeric data-bar"),
                }
            }
        }

        if !tagged {
            return Ok(());
        }

        let id = ElementId(self.element_count);
        self.element_count += 1;
        if let Some(reference) = reference {
            self.by_ref.entry(reference).or_default().push(id);
        }
        if let Some(bar) = bar {
            self.by_bar.entry(bar).or_default().push(id);
        }
        Ok(())
    }

    /// Elements tagged with the given `data-ref`, empty if none.
    pub fn elements_for_ref(&self, reference: &str) -> &[ElementId] {
        self.by_ref.get(reference).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Elements tagged with the given `data-bar`, empty if none.
    pub fn elements_for_bar(&self, bar: u32) -> &[ElementId] {
        self.by_bar.get(&bar).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Bar numbers present in the markup, ascending.
    pub fn bars(&self) -> impl Iterator<Item = u32> + '_ {
        self.by_bar.keys().copied()
    }

    /// Number of tagged elements.
    pub fn element_count(&self) -> usize {
        self.element_count
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SVG: &str = r#"<?xml version="1.0"?>
<svg xmlns="http://www.w3.org/2000/svg">
  <g data-bar="1"><rect data-bar="1" width="10" height="10"/></g>
  <path data-ref="n1" d="M0 0"/>
  <path data-ref="n2" d="M1 1"/>
  <g data-bar="2">
    <path data-ref="n1" d="M2 2"/>
  </g>
  <rect data-bar="x"/>
  <text>plain</text>
</svg>"#;

    #[test]
    fn test_indexes_tagged_elements_in_document_order() {
        let index = ScoreIndex::parse(SVG).unwrap();

        // The non-numeric data-bar still takes an id so ordering matches the DOM.
        assert_eq!(index.element_count(), 7);
        assert_eq!(index.elements_for_bar(1), &[ElementId(0), ElementId(1)]);
        assert_eq!(index.elements_for_ref("n1"), &[ElementId(2), ElementId(5)]);
        assert_eq!(index.elements_for_ref("n2"), &[ElementId(3)]);
        assert_eq!(index.elements_for_bar(2), &[ElementId(4)]);
        assert_eq!(index.bars().collect::<Vec<_>>(), vec![1, 2]);
    }

    #[test]
    fn test_unknown_lookups_are_empty() {
        let index = ScoreIndex::parse(SVG).unwrap();
        assert!(index.elements_for_ref("missing").is_empty());
        assert!(index.elements_for_bar(99).is_empty());
    }

    #[test]
    fn test_missing_svg_root_is_an_asset_error() {
        let result = ScoreIndex::parse("<div data-ref=\"n1\"></div>");
        assert!(matches!(result, Err(PlayerError::AssetLoad { .. })));
    }

    #[test]
    fn test_malformed_markup_is_an_asset_error() {
        let result = ScoreIndex::parse("<svg><g></svg>");
        assert!(matches!(result, Err(PlayerError::AssetLoad { .. })));
    }
}
