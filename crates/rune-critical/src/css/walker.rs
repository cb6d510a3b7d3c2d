//! Rule tree traversal: a filtering walk over one tree and a mirrored walk
//! over two structurally identical trees.
//!
//! Both walks are post-order: a container's children are visited before the
//! container itself, so a container's verdict can depend on what survived.
//! `@keyframes` bodies are never entered and declarations are never visited.

use std::mem;

use super::ast::Node;

/// Outcome of visiting a node in a filtering walk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Keep,
    Remove,
    /// Keep a container iff it still has children; keep leaves.
    Defer,
}

/// Outcome of visiting a node in a mirrored walk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MirrorVerdict {
    /// Keep in the primary tree; the inverse keeps only what the primary
    /// dropped below this node.
    Keep,
    /// Drop from the primary tree and keep the inverse copy whole.
    Remove,
    /// Keep each copy iff it still has children after the walk.
    Defer,
    /// Decide both sides independently.
    Split { primary: bool, inverse: bool },
}

impl MirrorVerdict {
    /// The verdict for the primary tree alone.
    pub fn primary(self) -> Verdict {
        match self {
            MirrorVerdict::Keep => Verdict::Keep,
            MirrorVerdict::Remove => Verdict::Remove,
            MirrorVerdict::Defer => Verdict::Defer,
            MirrorVerdict::Split { primary: true, .. } => Verdict::Keep,
            MirrorVerdict::Split { primary: false, .. } => Verdict::Remove,
        }
    }
}

fn descends(node: &Node) -> bool {
    match node {
        Node::AtRule(at) if at.is_keyframes() => false,
        _ => node.has_nested_rules(),
    }
}

fn has_children(node: &Node) -> bool {
    node.children().is_none_or(|children| !children.is_empty())
}

/// Filter `nodes` in place, dropping everything `visit` rejects.
pub fn walk_rules<F>(nodes: &mut Vec<Node>, visit: &mut F)
where
    F: FnMut(&mut Node) -> Verdict,
{
    for mut node in mem::take(nodes) {
        if matches!(node, Node::Declaration(_)) {
            nodes.push(node);
            continue;
        }
        if descends(&node) {
            if let Some(children) = node.children_mut() {
                walk_rules(children, visit);
            }
        }
        let keep = match visit(&mut node) {
            Verdict::Keep => true,
            Verdict::Remove => false,
            Verdict::Defer => has_children(&node),
        };
        if keep {
            nodes.push(node);
        }
    }
}

/// Adapt a visitor so a walk only records its decisions.
///
/// Rejected nodes get their removal mark set instead of being dropped, and a
/// rule's filtered selector list is stored in `marked_selectors` while the
/// live list is restored. Containers deferring to their children are marked
/// when every child already carries a mark.
pub fn mark_only<F>(mut visit: F) -> impl FnMut(&mut Node) -> Verdict
where
    F: FnMut(&mut Node) -> Verdict,
{
    move |node: &mut Node| {
        let original = match node {
            Node::Rule(rule) => Some(rule.selectors.clone()),
            _ => None,
        };
        let remove = match visit(node) {
            Verdict::Keep => false,
            Verdict::Remove => true,
            Verdict::Defer => node
                .children()
                .is_some_and(|children| children.iter().all(Node::removal_mark)),
        };
        if remove {
            node.set_removal_mark(true);
        }
        if let (Node::Rule(rule), Some(original)) = (node, original) {
            rule.marked_selectors = Some(mem::replace(&mut rule.selectors, original));
        }
        Verdict::Keep
    }
}

/// Walk `primary` and `inverse` in lockstep, partitioning nodes between them.
///
/// Both lists must come from parsing the same text. The visitor sees the
/// primary node and its inverse counterpart. Leaves follow the usual
/// complement: kept in one tree, dropped from the other. A container kept in
/// the primary tree survives in the inverse only while it still holds rules
/// the primary dropped; its declarations stay with the primary copy.
pub fn walk_rules_mirrored<F>(primary: &mut Vec<Node>, inverse: &mut Vec<Node>, visit: &mut F)
where
    F: FnMut(&mut Node, &mut Node) -> MirrorVerdict,
{
    let left = mem::take(primary);
    let right = mem::take(inverse);
    for (mut a, mut b) in left.into_iter().zip(right) {
        if matches!(a, Node::Declaration(_)) {
            primary.push(a);
            inverse.push(b);
            continue;
        }
        let container = descends(&a);
        if container {
            if let (Some(left), Some(right)) = (a.children_mut(), b.children_mut()) {
                walk_rules_mirrored(left, right, visit);
            }
        }
        let (keep_primary, keep_inverse) = match visit(&mut a, &mut b) {
            MirrorVerdict::Keep if container => (true, retain_nested_rules(&mut b)),
            MirrorVerdict::Keep => (true, false),
            MirrorVerdict::Remove => (false, true),
            MirrorVerdict::Defer if container => (has_children(&a), retain_nested_rules(&mut b)),
            MirrorVerdict::Defer => {
                let keep = has_children(&a);
                (keep, !keep)
            }
            MirrorVerdict::Split { primary, inverse } => (primary, inverse),
        };
        if keep_primary {
            primary.push(a);
        }
        if keep_inverse {
            inverse.push(b);
        }
    }
}

/// Drop declarations from a container's inverse copy; report whether any
/// rules remain. Comments alone do not keep the copy alive.
fn retain_nested_rules(node: &mut Node) -> bool {
    let Some(children) = node.children_mut() else {
        return false;
    };
    children.retain(|child| !matches!(child, Node::Declaration(_)));
    if holds_rules(children) {
        true
    } else {
        children.clear();
        false
    }
}

/// Whether `nodes` contains a rule or at-rule, as opposed to only comments
/// and declarations.
pub fn holds_rules(nodes: &[Node]) -> bool {
    nodes
        .iter()
        .any(|node| matches!(node, Node::Rule(_) | Node::AtRule(_)))
}

/// Running state of `beasties:` comment directives during a walk.
///
/// Recognised commands are `include`, `exclude` (next rule only) and
/// `include start`/`include end`, `exclude start`/`exclude end` (every rule
/// in between, in traversal order).
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct DirectiveState {
    include_next: bool,
    exclude_next: bool,
    include_all: bool,
    exclude_all: bool,
}

impl DirectiveState {
    pub const PREFIX: &'static str = "beasties:";

    /// Update the state from a comment's text. Non-directive comments are
    /// ignored.
    pub fn observe(&mut self, comment: &str) {
        let Some(command) = comment.trim().strip_prefix(Self::PREFIX) else {
            return;
        };
        match command {
            "include" => self.include_next = true,
            "exclude" => self.exclude_next = true,
            "include start" => self.include_all = true,
            "include end" => self.include_all = false,
            "exclude start" => self.exclude_all = true,
            "exclude end" => self.exclude_all = false,
            _ => {}
        }
    }

    /// Forced decision for the rule being visited, if any. One-shot
    /// directives are consumed.
    pub fn take_override(&mut self) -> Option<bool> {
        if mem::take(&mut self.include_next) {
            return Some(true);
        }
        if mem::take(&mut self.exclude_next) {
            return Some(false);
        }
        if self.include_all {
            return Some(true);
        }
        if self.exclude_all {
            return Some(false);
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::css::{SerializeOptions, parse_stylesheet, serialize_stylesheet};

    fn css(nodes: Vec<Node>) -> String {
        serialize_stylesheet(&crate::css::Stylesheet { nodes }, SerializeOptions::default())
    }

    fn rule_named(node: &Node, name: &str) -> bool {
        matches!(node, Node::Rule(rule) if rule.selectors.iter().any(|s| s == name))
    }

    #[test]
    fn filtering_walk_prunes_emptied_containers() {
        let mut sheet =
            parse_stylesheet("h1{color:red}@media print{h2{color:blue}}@media screen{h1{margin:0}}")
                .unwrap();
        walk_rules(&mut sheet.nodes, &mut |node: &mut Node| {
            if rule_named(node, "h2") {
                Verdict::Remove
            } else {
                Verdict::Defer
            }
        });
        assert_eq!(css(sheet.nodes), "h1{color:red}@media screen{h1{margin:0}}");
    }

    #[test]
    fn keyframes_bodies_are_not_visited() {
        let mut sheet = parse_stylesheet("@keyframes spin{from{opacity:0}to{opacity:1}}").unwrap();
        let mut visited = Vec::new();
        walk_rules(&mut sheet.nodes, &mut |node: &mut Node| {
            if let Node::AtRule(at) = node {
                visited.push(at.name.clone());
            }
            if let Node::Rule(_) = node {
                visited.push("rule".to_string());
            }
            Verdict::Keep
        });
        assert_eq!(visited, vec!["keyframes".to_string()]);
    }

    #[test]
    fn mark_only_records_without_removing() {
        let mut sheet = parse_stylesheet("h1,h2{color:red}p{color:blue}").unwrap();
        walk_rules(
            &mut sheet.nodes,
            &mut mark_only(|node: &mut Node| match node {
                Node::Rule(rule) => {
                    rule.filter_selectors(|sel| sel == "h1");
                    if rule.selectors.is_empty() {
                        Verdict::Remove
                    } else {
                        Verdict::Keep
                    }
                }
                _ => Verdict::Keep,
            }),
        );
        assert_eq!(sheet.nodes.len(), 2);
        let Node::Rule(first) = &sheet.nodes[0] else {
            panic!("expected rule");
        };
        assert_eq!(first.selectors, vec!["h1".to_string(), "h2".to_string()]);
        assert_eq!(first.marked_selectors, Some(vec!["h1".to_string()]));
        assert!(!first.removal_mark);
        assert!(sheet.nodes[1].removal_mark());
    }

    #[test]
    fn mirrored_walk_partitions_rules() {
        let source = "h1{color:red}h2{color:blue}@media print{h1{margin:0}h3{margin:1px}}";
        let mut primary = parse_stylesheet(source).unwrap();
        let mut inverse = parse_stylesheet(source).unwrap();
        walk_rules_mirrored(&mut primary.nodes, &mut inverse.nodes, &mut |node: &mut Node, _: &mut Node| {
            if rule_named(node, "h1") {
                MirrorVerdict::Keep
            } else if matches!(node, Node::Rule(_)) {
                MirrorVerdict::Remove
            } else {
                MirrorVerdict::Defer
            }
        });
        assert_eq!(css(primary.nodes), "h1{color:red}@media print{h1{margin:0}}");
        assert_eq!(css(inverse.nodes), "h2{color:blue}@media print{h3{margin:1px}}");
    }

    #[test]
    fn split_verdict_can_keep_both_sides() {
        let mut primary = parse_stylesheet("@layer a, b;h1{color:red}").unwrap();
        let mut inverse = primary.clone();
        walk_rules_mirrored(&mut primary.nodes, &mut inverse.nodes, &mut |node: &mut Node, _: &mut Node| {
            match node {
                Node::AtRule(_) => MirrorVerdict::Split {
                    primary: true,
                    inverse: true,
                },
                _ => MirrorVerdict::Keep,
            }
        });
        assert_eq!(css(primary.nodes), "@layer a, b;h1{color:red}");
        assert_eq!(css(inverse.nodes), "@layer a, b;");
    }

    #[test]
    fn directives_toggle_in_traversal_order() {
        let mut state = DirectiveState::default();
        assert_eq!(state.take_override(), None);

        state.observe("beasties:include");
        assert_eq!(state.take_override(), Some(true));
        assert_eq!(state.take_override(), None);

        state.observe(" beasties:exclude start ");
        assert_eq!(state.take_override(), Some(false));
        assert_eq!(state.take_override(), Some(false));
        state.observe("beasties:exclude end");
        assert_eq!(state.take_override(), None);

        state.observe("! beasties:include");
        state.observe("just a note");
        assert_eq!(state.take_override(), None);
    }
}
