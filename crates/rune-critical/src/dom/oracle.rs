use ego_tree::NodeId;
use scraper::ElementRef;

use super::{Document, parse_selector};
use crate::error::Result;

/// Attribute marking the element whose subtree decides what is critical.
pub const CONTAINER_ATTRIBUTE: &str = "data-beasties-container";

/// Answers "does anything in scope match this selector?" for one document.
pub struct SelectorOracle<'a> {
    document: &'a Document,
    scope: NodeId,
}

impl<'a> SelectorOracle<'a> {
    pub fn new(document: &'a Document, scope: NodeId) -> Self {
        Self { document, scope }
    }

    /// Scope to the element matched by `container`, else the first element
    /// carrying [`CONTAINER_ATTRIBUTE`], else the document element.
    pub fn for_document(document: &'a Document, container: Option<&str>) -> Self {
        let configured = container.and_then(|selector| match document.select_first(selector) {
            Ok(found) => found,
            Err(error) => {
                tracing::warn!(%error, "ignoring invalid container selector");
                None
            }
        });
        let scope = configured
            .or_else(|| {
                document
                    .select_first(&format!("[{CONTAINER_ATTRIBUTE}]"))
                    .ok()
                    .flatten()
            })
            .or_else(|| document.document_element())
            .unwrap_or_else(|| document.root());
        Self::new(document, scope)
    }

    pub fn scope(&self) -> NodeId {
        self.scope
    }

    /// Whether the scope element or any of its descendants matches. Selectors
    /// the matcher cannot parse are errors, never a silent `false`.
    pub fn exists(&self, selector: &str) -> Result<bool> {
        let selector = parse_selector(selector)?;
        let Some(scope) = self.document.node(self.scope) else {
            return Ok(false);
        };
        Ok(scope
            .descendants()
            .filter_map(ElementRef::wrap)
            .any(|element| selector.matches(&element)))
    }
}
