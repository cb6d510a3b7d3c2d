//! Mutable HTML document built on `scraper`'s arena tree.
//!
//! Elements are addressed by [`NodeId`]; ids stay valid after a node is
//! detached, so callers can hold on to them across mutations.

mod oracle;

pub use oracle::SelectorOracle;

use ego_tree::{NodeId, NodeRef};
use html5ever::serialize::SerializeOpts;
use html5ever::{Attribute, LocalName, Namespace, QualName};
use scraper::node::{Element, Text};
use scraper::{ElementRef, Html, Node, Selector, StrTendril};

use crate::error::{CriticalError, Result};

const HTML_NAMESPACE: &str = "http://www.w3.org/1999/xhtml";

pub struct Document {
    html: Html,
}

impl Document {
    pub fn parse(source: &str) -> Self {
        Self {
            html: Html::parse_document(source),
        }
    }

    /// Serialize the whole document. `<noscript>` contents are written as
    /// markup, matching a scripting-enabled parse.
    pub fn serialize(&self) -> Result<String> {
        let mut buf = Vec::new();
        html5ever::serialize(&mut buf, &self.html, SerializeOpts::default())?;
        String::from_utf8(buf)
            .map_err(|err| std::io::Error::new(std::io::ErrorKind::InvalidData, err).into())
    }

    pub fn root(&self) -> NodeId {
        self.html.tree.root().id()
    }

    /// The `<html>` element.
    pub fn document_element(&self) -> Option<NodeId> {
        self.html
            .tree
            .root()
            .children()
            .find(|node| node.value().is_element())
            .map(|node| node.id())
    }

    pub fn head(&self) -> Option<NodeId> {
        self.first_by_tag("head")
    }

    pub fn body(&self) -> Option<NodeId> {
        self.first_by_tag("body")
    }

    fn first_by_tag(&self, tag: &str) -> Option<NodeId> {
        self.attached_elements()
            .find(|element| element.value().name() == tag)
            .map(|element| element.id())
    }

    fn attached_elements(&self) -> impl Iterator<Item = ElementRef<'_>> {
        self.html.tree.root().descendants().filter_map(ElementRef::wrap)
    }

    pub(crate) fn node(&self, id: NodeId) -> Option<NodeRef<'_, Node>> {
        self.html.tree.get(id)
    }

    /// Every attached element matching `selector`, in document order.
    pub fn select(&self, selector: &str) -> Result<Vec<NodeId>> {
        let selector = parse_selector(selector)?;
        Ok(self
            .attached_elements()
            .filter(|element| selector.matches(element))
            .map(|element| element.id())
            .collect())
    }

    pub fn select_first(&self, selector: &str) -> Result<Option<NodeId>> {
        let selector = parse_selector(selector)?;
        Ok(self
            .attached_elements()
            .find(|element| selector.matches(element))
            .map(|element| element.id()))
    }

    /// Create a detached HTML element.
    pub fn create_element(&mut self, tag: &str) -> NodeId {
        let name = QualName::new(None, Namespace::from(HTML_NAMESPACE), LocalName::from(tag));
        self.html
            .tree
            .orphan(Node::Element(Element::new(name, Vec::new())))
            .id()
    }

    fn element(&self, id: NodeId) -> Option<&Element> {
        self.node(id).and_then(|node| node.value().as_element())
    }

    pub fn tag_name(&self, id: NodeId) -> Option<&str> {
        self.element(id).map(Element::name)
    }

    pub fn attr(&self, id: NodeId, name: &str) -> Option<&str> {
        self.element(id).and_then(|element| element.attr(name))
    }

    /// Set an attribute. An existing attribute keeps its position; a new one
    /// is appended.
    pub fn set_attr(&mut self, id: NodeId, name: &str, value: &str) {
        self.rewrite_attrs(id, |attrs| {
            let value = StrTendril::from(value);
            match attrs.iter_mut().find(|attr| &*attr.name.local == name) {
                Some(attr) => attr.value = value,
                None => attrs.push(Attribute {
                    name: QualName::new(None, Namespace::from(""), LocalName::from(name)),
                    value,
                }),
            }
        });
    }

    pub fn remove_attr(&mut self, id: NodeId, name: &str) {
        self.rewrite_attrs(id, |attrs| attrs.retain(|attr| &*attr.name.local != name));
    }

    /// Rebuild the element so its cached id and class lists follow the new
    /// attributes.
    fn rewrite_attrs<F>(&mut self, id: NodeId, edit: F)
    where
        F: FnOnce(&mut Vec<Attribute>),
    {
        let Some(mut node) = self.html.tree.get_mut(id) else {
            return;
        };
        let Node::Element(element) = node.value() else {
            return;
        };
        let mut attrs: Vec<Attribute> = element
            .attrs
            .iter()
            .map(|(name, value)| Attribute {
                name: name.clone(),
                value: value.clone(),
            })
            .collect();
        edit(&mut attrs);
        *element = Element::new(element.name.clone(), attrs);
    }

    /// Concatenated text of all descendants.
    pub fn text(&self, id: NodeId) -> String {
        self.node(id)
            .and_then(ElementRef::wrap)
            .map(|element| element.text().collect())
            .unwrap_or_default()
    }

    /// Replace all children of `id` with a single text node.
    pub fn set_text(&mut self, id: NodeId, text: &str) {
        let children: Vec<NodeId> = match self.node(id) {
            Some(node) => node.children().map(|child| child.id()).collect(),
            None => return,
        };
        for child in children {
            self.detach(child);
        }
        if text.is_empty() {
            return;
        }
        let text_node = self.html.tree.orphan(Node::Text(Text {
            text: StrTendril::from(text),
        }));
        let text_id = text_node.id();
        self.append(id, text_id);
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.node(id).and_then(|node| node.parent()).map(|node| node.id())
    }

    /// Move `child` to the end of `parent`'s children.
    pub fn append(&mut self, parent: NodeId, child: NodeId) {
        if parent == child {
            return;
        }
        if let Some(mut node) = self.html.tree.get_mut(parent) {
            node.append_id(child);
        }
    }

    /// Move `new` to just before `reference`. No-op when `reference` is
    /// detached.
    pub fn insert_before(&mut self, reference: NodeId, new: NodeId) {
        if !self.can_insert_next_to(reference, new) {
            return;
        }
        self.detach(new);
        if let Some(mut node) = self.html.tree.get_mut(reference) {
            node.insert_id_before(new);
        }
    }

    /// Move `new` to just after `reference`. No-op when `reference` is
    /// detached.
    pub fn insert_after(&mut self, reference: NodeId, new: NodeId) {
        if !self.can_insert_next_to(reference, new) {
            return;
        }
        self.detach(new);
        if let Some(mut node) = self.html.tree.get_mut(reference) {
            node.insert_id_after(new);
        }
    }

    fn can_insert_next_to(&self, reference: NodeId, new: NodeId) -> bool {
        reference != new
            && self.node(new).is_some()
            && self.node(reference).is_some_and(|node| node.parent().is_some())
    }

    pub fn detach(&mut self, id: NodeId) {
        if let Some(mut node) = self.html.tree.get_mut(id) {
            node.detach();
        }
    }

    /// Detached copy of an element with the same name and attributes but no
    /// children.
    pub fn clone_element(&mut self, id: NodeId) -> Option<NodeId> {
        let element = self.element(id)?.clone();
        Some(self.html.tree.orphan(Node::Element(element)).id())
    }
}

pub(crate) fn parse_selector(selector: &str) -> Result<Selector> {
    Selector::parse(selector).map_err(|err| CriticalError::Selector {
        selector: selector.to_string(),
        message: err.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const PAGE: &str = "<!DOCTYPE html><html><head><link rel=\"stylesheet\" href=\"/a.css\" id=\"main\"></head><body><h1 class=\"title\">Hi</h1></body></html>";

    #[test]
    fn selects_in_document_order_and_skips_detached_nodes() {
        let mut doc = Document::parse(PAGE);
        let heading = doc.select_first("h1").unwrap().unwrap();
        assert_eq!(doc.select("head, h1").unwrap().len(), 2);
        doc.detach(heading);
        assert!(doc.select("h1").unwrap().is_empty());
        assert_eq!(doc.parent(heading), None);
    }

    #[test]
    fn invalid_selectors_surface_as_errors() {
        let doc = Document::parse(PAGE);
        let err = doc.select("h1[").unwrap_err();
        assert!(matches!(err, CriticalError::Selector { ref selector, .. } if selector == "h1["));
    }

    #[test]
    fn set_attr_replaces_in_place_and_appends_new() {
        let mut doc = Document::parse(PAGE);
        let link = doc.select_first("link").unwrap().unwrap();
        doc.set_attr(link, "rel", "preload");
        doc.set_attr(link, "as", "style");
        doc.remove_attr(link, "id");
        let html = doc.serialize().unwrap();
        assert!(html.contains("<link rel=\"preload\" href=\"/a.css\" as=\"style\">"), "{html}");
        assert!(doc.select("#main").unwrap().is_empty());
    }

    #[test]
    fn inserts_and_text_round_trip_through_serialization() {
        let mut doc = Document::parse(PAGE);
        let link = doc.select_first("link").unwrap().unwrap();
        let style = doc.create_element("style");
        doc.set_text(style, "h1{color:red}");
        doc.insert_before(link, style);
        assert_eq!(doc.text(style), "h1{color:red}");
        let html = doc.serialize().unwrap();
        assert!(
            html.contains("<head><style>h1{color:red}</style><link"),
            "{html}"
        );
    }

    #[test]
    fn insert_next_to_detached_reference_is_ignored() {
        let mut doc = Document::parse(PAGE);
        let orphan = doc.create_element("div");
        let other = doc.create_element("span");
        doc.insert_after(orphan, other);
        assert!(doc.parent(other).is_none());
    }

    #[test]
    fn clone_element_is_shallow_and_detached() {
        let mut doc = Document::parse(PAGE);
        let body = doc.body().unwrap();
        let copy = doc.clone_element(body).unwrap();
        assert_eq!(doc.tag_name(copy), Some("body"));
        assert!(doc.parent(copy).is_none());
        assert!(doc.node(copy).unwrap().children().next().is_none());
    }

    #[test]
    fn noscript_contents_serialize_as_markup() {
        let mut doc = Document::parse(PAGE);
        let link = doc.select_first("link").unwrap().unwrap();
        let noscript = doc.create_element("noscript");
        let copy = doc.clone_element(link).unwrap();
        doc.append(noscript, copy);
        doc.insert_after(link, noscript);
        let html = doc.serialize().unwrap();
        assert!(
            html.contains("<noscript><link rel=\"stylesheet\" href=\"/a.css\" id=\"main\"></noscript>"),
            "{html}"
        );
    }
}
