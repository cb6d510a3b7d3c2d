//! Mutable stylesheet tree.

/// A parsed stylesheet: the top-level node list.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Stylesheet {
    pub nodes: Vec<Node>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Node {
    Rule(Rule),
    AtRule(AtRule),
    Declaration(Declaration),
    Comment(Comment),
}

/// A style rule: `selectors { nodes }`. Nested rules are allowed in `nodes`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Rule {
    pub selectors: Vec<String>,
    pub nodes: Vec<Node>,
    pub removal_mark: bool,
    /// Selector list chosen by a marking pass, applied later without
    /// disturbing `selectors` in the meantime.
    pub marked_selectors: Option<Vec<String>>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct AtRule {
    /// Name without the `@`, as written.
    pub name: String,
    pub params: String,
    /// `None` for statement at-rules such as `@import` or `@layer a, b;`.
    pub nodes: Option<Vec<Node>>,
    pub removal_mark: bool,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Declaration {
    pub property: String,
    pub value: String,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Comment {
    /// Text between `/*` and `*/`, trimmed.
    pub text: String,
    pub removal_mark: bool,
}

impl Rule {
    /// Keep only the selectors accepted by `keep`.
    pub fn filter_selectors<F>(&mut self, mut keep: F)
    where
        F: FnMut(&str) -> bool,
    {
        self.selectors.retain(|selector| keep(selector));
    }

    pub fn declarations(&self) -> impl Iterator<Item = &Declaration> {
        self.nodes.iter().filter_map(|node| match node {
            Node::Declaration(decl) => Some(decl),
            _ => None,
        })
    }
}

impl AtRule {
    /// `@keyframes` or a vendor-prefixed variant like `@-webkit-keyframes`.
    pub fn is_keyframes(&self) -> bool {
        let name = self.name.to_ascii_lowercase();
        name == "keyframes" || (name.starts_with('-') && name.ends_with("-keyframes"))
    }

    pub fn is_named(&self, name: &str) -> bool {
        self.name.eq_ignore_ascii_case(name)
    }

    pub fn declarations(&self) -> impl Iterator<Item = &Declaration> {
        self.nodes.iter().flatten().filter_map(|node| match node {
            Node::Declaration(decl) => Some(decl),
            _ => None,
        })
    }
}

impl Node {
    pub fn children(&self) -> Option<&Vec<Node>> {
        match self {
            Node::Rule(rule) => Some(&rule.nodes),
            Node::AtRule(at) => at.nodes.as_ref(),
            _ => None,
        }
    }

    pub fn children_mut(&mut self) -> Option<&mut Vec<Node>> {
        match self {
            Node::Rule(rule) => Some(&mut rule.nodes),
            Node::AtRule(at) => at.nodes.as_mut(),
            _ => None,
        }
    }

    /// Whether any direct child is a rule or at-rule.
    pub fn has_nested_rules(&self) -> bool {
        self.children().is_some_and(|children| {
            children
                .iter()
                .any(|child| matches!(child, Node::Rule(_) | Node::AtRule(_)))
        })
    }

    /// Declarations are never marked.
    pub fn removal_mark(&self) -> bool {
        match self {
            Node::Rule(rule) => rule.removal_mark,
            Node::AtRule(at) => at.removal_mark,
            Node::Comment(comment) => comment.removal_mark,
            Node::Declaration(_) => false,
        }
    }

    pub fn set_removal_mark(&mut self, mark: bool) {
        match self {
            Node::Rule(rule) => rule.removal_mark = mark,
            Node::AtRule(at) => at.removal_mark = mark,
            Node::Comment(comment) => comment.removal_mark = mark,
            Node::Declaration(_) => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keyframes_detection_accepts_vendor_prefixes() {
        let at = |name: &str| AtRule {
            name: name.to_string(),
            ..AtRule::default()
        };
        assert!(at("keyframes").is_keyframes());
        assert!(at("-webkit-keyframes").is_keyframes());
        assert!(at("KEYFRAMES").is_keyframes());
        assert!(!at("media").is_keyframes());
        assert!(!at("font-face").is_keyframes());
    }

    #[test]
    fn filter_selectors_retains_in_order() {
        let mut rule = Rule {
            selectors: vec!["h1".into(), "h2".into(), "p".into()],
            ..Rule::default()
        };
        rule.filter_selectors(|sel| sel != "h2");
        assert_eq!(rule.selectors, vec!["h1".to_string(), "p".to_string()]);
    }

    #[test]
    fn nested_rule_detection_ignores_declarations() {
        let leaf = Node::Rule(Rule {
            selectors: vec!["a".into()],
            nodes: vec![Node::Declaration(Declaration {
                property: "color".into(),
                value: "red".into(),
            })],
            ..Rule::default()
        });
        assert!(!leaf.has_nested_rules());

        let media = Node::AtRule(AtRule {
            name: "media".into(),
            params: "print".into(),
            nodes: Some(vec![leaf]),
            removal_mark: false,
        });
        assert!(media.has_nested_rules());
    }
}
