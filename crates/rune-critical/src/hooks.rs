//! Per-stylesheet bookkeeping and host customization points.

use std::path::PathBuf;

use ego_tree::NodeId;

use crate::error::Result;
use crate::options::CriticalOptions;
use crate::paths::resolve_stylesheet;

/// Where a `<style>` element's text came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StyleSource {
    /// Present in the input document.
    Inline,
    /// Fetched for a `<link rel="stylesheet">`.
    Linked,
    /// Loaded from `additional_stylesheets`.
    Additional,
}

/// A `<style>` element being processed, with what the document assembly
/// knows about it.
#[derive(Debug, Clone)]
pub struct StyleUnit {
    pub element: NodeId,
    /// Href or configured entry; `inline CSS` for document styles.
    pub name: String,
    pub source: StyleSource,
    /// File the text was read from.
    pub path: Option<PathBuf>,
    /// Nodes to remove if the whole sheet ends up inlined: the original link
    /// plus anything the preload rewrite added.
    pub companions: Vec<NodeId>,
    /// Cleared when the sheet was inlined whole and must not be reduced.
    pub reduce: bool,
}

impl StyleUnit {
    pub fn inline(element: NodeId) -> Self {
        Self {
            element,
            name: "inline CSS".to_string(),
            source: StyleSource::Inline,
            path: None,
            companions: Vec::new(),
            reduce: true,
        }
    }

    pub fn external(element: NodeId, name: impl Into<String>, source: StyleSource, path: PathBuf) -> Self {
        Self {
            element,
            name: name.into(),
            source,
            path: Some(path),
            companions: Vec::new(),
            reduce: true,
        }
    }

    pub fn is_external(&self) -> bool {
        self.source != StyleSource::Inline
    }

    /// Name used in log lines.
    pub fn display_name(&self) -> &str {
        self.name.strip_prefix('/').unwrap_or(&self.name)
    }
}

/// Host strategy consulted at the points where build integrations differ.
///
/// Every method has a default, so hosts override only what they need.
pub trait StyleHooks: Send + Sync {
    /// Map an href to the path the asset store reads.
    fn resolve_path(&self, href: &str, options: &CriticalOptions) -> Result<PathBuf> {
        resolve_stylesheet(href, options)
    }

    /// Whether the whole sheet should be inlined without reduction.
    fn on_inline_threshold(&self, _unit: &StyleUnit, sheet: &str, threshold: usize) -> bool {
        threshold > 0 && sheet.len() < threshold
    }

    /// Whether to keep the full sheet inline instead of writing `inverse`
    /// back. `inline_all` is the size-based default.
    fn on_prune(&self, _unit: &StyleUnit, _before: &str, _inverse: &str, inline_all: bool) -> bool {
        inline_all
    }
}

/// The stock behavior for every hook.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultHooks;

impl StyleHooks for DefaultHooks {}
