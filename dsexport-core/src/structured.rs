//! Access to structured render state attached to host nodes.
//!
//! Some host pages keep the original authored content (raw markdown, raw
//! reasoning text) on the nodes that render it. Extractors ask a
//! [`StructuredContentProvider`] for that state and fall back to reading the
//! visible tree when it has nothing.

use serde_json::{Map, Value};

use crate::dom::NodeRef;

pub type StateBag = Map<String, Value>;

/// Key holding an answer's raw markdown.
pub const MARKDOWN_KEY: &str = "markdown";
/// Key holding a thinking chain's raw text.
pub const CONTENT_KEY: &str = "content";
/// Key holding a single paragraph's text.
pub const TEXT_KEY: &str = "text";

pub trait StructuredContentProvider: Send + Sync {
    /// State bag attached to this node alone.
    fn state(&self, node: NodeRef<'_>) -> Option<StateBag>;

    /// How many ancestors above the starting node a chain lookup visits.
    fn chain_depth(&self) -> usize;

    /// Walks the node and its ancestors (nearest first, bounded by
    /// [`chain_depth`](Self::chain_depth)) and returns the first non-empty
    /// string stored under `key`.
    fn lookup(&self, node: NodeRef<'_>, key: &str) -> Option<String> {
        std::iter::once(node)
            .chain(node.ancestors())
            .take(self.chain_depth() + 1)
            .find_map(|candidate| string_entry(&self.state(candidate)?, key))
    }

    /// Looks only at the node's own state.
    fn own(&self, node: NodeRef<'_>, key: &str) -> Option<String> {
        string_entry(&self.state(node)?, key)
    }
}

fn string_entry(bag: &StateBag, key: &str) -> Option<String> {
    bag.get(key)
        .and_then(Value::as_str)
        .filter(|s| !s.trim().is_empty())
        .map(ToString::to_string)
}

/// Provider for pages that carry no structured state. Every lookup misses,
/// so extraction always takes the text fallback.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullStateProvider;

impl StructuredContentProvider for NullStateProvider {
    fn state(&self, _node: NodeRef<'_>) -> Option<StateBag> {
        None
    }

    fn chain_depth(&self) -> usize {
        0
    }
}

/// Host adapter reading a JSON object serialized into an attribute, e.g.
/// `<div data-state='{"markdown":"**hi**"}'>`.
#[derive(Debug, Clone)]
pub struct AttributeStateProvider {
    attribute: String,
    depth: usize,
}

impl Default for AttributeStateProvider {
    fn default() -> Self {
        Self::new("data-state", 3)
    }
}

impl AttributeStateProvider {
    pub fn new(attribute: impl Into<String>, depth: usize) -> Self {
        Self {
            attribute: attribute.into(),
            depth,
        }
    }
}

impl StructuredContentProvider for AttributeStateProvider {
    fn state(&self, node: NodeRef<'_>) -> Option<StateBag> {
        let raw = node.attr(&self.attribute)?;
        match serde_json::from_str::<Value>(raw) {
            Ok(Value::Object(bag)) => Some(bag),
            Ok(_) => None,
            Err(err) => {
                tracing::debug!(attribute = %self.attribute, %err, "unreadable state bag");
                None
            }
        }
    }

    fn chain_depth(&self) -> usize {
        self.depth
    }
}
