//! Reduction of one stylesheet to the rules a document uses.
//!
//! Pass 1 walks the parsed sheet without removing anything: it filters each
//! rule's selectors through the oracle, marks dead rules, and records which
//! fonts and keyframes the surviving rules reference. Pass 2 applies the marks
//! and resolves `@keyframes` and `@font-face`, either on the critical tree
//! alone or on the critical tree and its inverse in lockstep.

use std::collections::HashSet;
use std::sync::OnceLock;

use regex::Regex;

use crate::css::{
    AtRule, DirectiveState, MirrorVerdict, Node, Rule, SelectorCache, SerializeOptions,
    Stylesheet, Verdict, holds_rules, is_always_matching, mark_only, parse_stylesheet, serialize_stylesheet,
    walk_rules, walk_rules_mirrored,
};
use crate::dom::SelectorOracle;
use crate::error::ParseError;
use crate::options::{CriticalOptions, KeyframesMode};

/// Output of [`CriticalEngine::reduce`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Reduction {
    /// Serialized critical rules.
    pub critical: String,
    /// Serialized non-critical rules, when the inverse tree was requested.
    pub inverse: Option<String>,
    /// Font URLs to preload, first occurrence order.
    pub font_preloads: Vec<String>,
}

/// What pass 1 learned about the sheet.
#[derive(Debug, Default)]
struct Usage {
    /// Values of every font declaration in critical rules, space separated.
    critical_fonts: String,
    keyframes: HashSet<String>,
    failed_selectors: Vec<String>,
}

pub struct CriticalEngine<'a> {
    options: &'a CriticalOptions,
    selectors: &'a SelectorCache,
}

fn font_property_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"(?i)\bfont(?:-family)?\b").expect("literal pattern compiles"))
}

fn font_url_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r#"url\s*\(\s*(?:"(.+?)"|'(.+?)'|(.+?))\s*\)"#).expect("literal pattern compiles")
    })
}

/// First `url(...)` target in a `src` value, unquoted.
fn first_font_url(value: &str) -> Option<String> {
    let captures = font_url_pattern().captures(value)?;
    (1..=3)
        .find_map(|group| captures.get(group))
        .map(|found| found.as_str().to_string())
}

impl<'a> CriticalEngine<'a> {
    pub fn new(options: &'a CriticalOptions, selectors: &'a SelectorCache) -> Self {
        Self { options, selectors }
    }

    /// Reduce `css` to the rules `oracle` finds a use for. With `with_inverse`
    /// the non-critical complement is serialized as well.
    pub fn reduce(
        &self,
        css: &str,
        oracle: &SelectorOracle<'_>,
        with_inverse: bool,
    ) -> Result<Reduction, ParseError> {
        let mut critical = parse_stylesheet(css)?;
        let mut inverse = with_inverse.then(|| critical.clone());

        let usage = self.mark(&mut critical, oracle);
        if !usage.failed_selectors.is_empty() {
            tracing::warn!(
                "{} rules skipped due to selector errors:\n  {}",
                usage.failed_selectors.len(),
                usage.failed_selectors.join("\n  ")
            );
        }

        let mut font_preloads = Vec::new();
        match inverse.as_mut() {
            Some(inverse) => {
                walk_rules_mirrored(
                    &mut critical.nodes,
                    &mut inverse.nodes,
                    &mut |node: &mut Node, other: &mut Node| {
                        self.resolve(node, Some(other), &usage, &mut font_preloads)
                    },
                );
            }
            None => {
                walk_rules(&mut critical.nodes, &mut |node: &mut Node| {
                    self.resolve(node, None, &usage, &mut font_preloads).primary()
                });
            }
        }

        let serialize = |sheet: &Stylesheet| {
            serialize_stylesheet(
                sheet,
                SerializeOptions {
                    compress: self.options.compress,
                },
            )
        };
        Ok(Reduction {
            critical: serialize(&critical),
            // Leftover comments are not worth an external file.
            inverse: inverse.as_ref().map(|sheet| {
                if holds_rules(&sheet.nodes) {
                    serialize(sheet)
                } else {
                    String::new()
                }
            }),
            font_preloads,
        })
    }

    /// Pass 1: record removal marks and font/keyframe usage.
    fn mark(&self, sheet: &mut Stylesheet, oracle: &SelectorOracle<'_>) -> Usage {
        let mut usage = Usage::default();
        let mut directives = DirectiveState::default();
        walk_rules(
            &mut sheet.nodes,
            &mut mark_only(|node: &mut Node| match node {
                Node::Comment(comment) => {
                    directives.observe(&comment.text);
                    Verdict::Remove
                }
                Node::Rule(rule) => {
                    match directives.take_override() {
                        Some(false) => return Verdict::Remove,
                        Some(true) => {
                            self.scan_usage(rule, &mut usage);
                            return Verdict::Keep;
                        }
                        None => {}
                    }
                    let failed = &mut usage.failed_selectors;
                    rule.filter_selectors(|selector| self.is_critical(selector, oracle, failed));
                    if rule.selectors.is_empty() {
                        return Verdict::Remove;
                    }
                    self.scan_usage(rule, &mut usage);
                    Verdict::Defer
                }
                Node::AtRule(at) if at.is_named("font-face") || at.is_named("layer") => {
                    Verdict::Keep
                }
                Node::AtRule(at) if at.nodes.is_some() => Verdict::Defer,
                Node::AtRule(_) => Verdict::Remove,
                Node::Declaration(_) => Verdict::Keep,
            }),
        );
        usage
    }

    fn is_critical(
        &self,
        selector: &str,
        oracle: &SelectorOracle<'_>,
        failed: &mut Vec<String>,
    ) -> bool {
        if self.options.is_allowed(selector) || is_always_matching(selector) {
            return true;
        }
        let normalized = self.selectors.normalize(selector);
        if normalized.is_empty() {
            return false;
        }
        match oracle.exists(&normalized) {
            Ok(found) => found,
            Err(error) => {
                failed.push(error.to_string());
                false
            }
        }
    }

    /// Collect font values and animation names from a critical rule.
    fn scan_usage(&self, rule: &Rule, usage: &mut Usage) {
        let inline_fonts = self.options.should_inline_fonts();
        for decl in rule.declarations() {
            if inline_fonts && font_property_pattern().is_match(&decl.property) {
                usage.critical_fonts.push(' ');
                usage.critical_fonts.push_str(&decl.value);
            }
            if decl.property == "animation" || decl.property == "animation-name" {
                // Loose match: every token is a candidate keyframes name.
                usage.keyframes.extend(
                    decl.value
                        .split(|c: char| c.is_whitespace() || c == ',')
                        .filter(|token| !token.is_empty())
                        .map(str::to_string),
                );
            }
        }
    }

    /// Pass 2 decision for one node. `inverse` is the node's counterpart in
    /// the non-critical tree, when one is being built.
    fn resolve(
        &self,
        node: &mut Node,
        inverse: Option<&mut Node>,
        usage: &Usage,
        font_preloads: &mut Vec<String>,
    ) -> MirrorVerdict {
        if node.removal_mark() {
            return MirrorVerdict::Remove;
        }
        match node {
            Node::Rule(rule) => apply_marked_selectors(rule, inverse),
            Node::AtRule(at) if at.is_keyframes() => match self.options.keyframes {
                KeyframesMode::None => MirrorVerdict::Split {
                    primary: false,
                    inverse: true,
                },
                KeyframesMode::All => MirrorVerdict::Split {
                    primary: true,
                    inverse: false,
                },
                KeyframesMode::Critical if usage.keyframes.contains(at.params.trim()) => {
                    MirrorVerdict::Keep
                }
                KeyframesMode::Critical => MirrorVerdict::Remove,
            },
            Node::AtRule(at) if at.is_named("font-face") => {
                if self.resolve_font_face(at, usage, font_preloads) {
                    MirrorVerdict::Keep
                } else {
                    MirrorVerdict::Remove
                }
            }
            // `@layer a, b;` fixes layer order and belongs in both sheets.
            Node::AtRule(at) if at.is_named("layer") && at.nodes.is_none() => {
                MirrorVerdict::Split {
                    primary: true,
                    inverse: true,
                }
            }
            Node::AtRule(at) if at.is_named("layer") => MirrorVerdict::Keep,
            _ => MirrorVerdict::Defer,
        }
    }

    /// Queue the face's source for preloading and report whether the rule
    /// stays in the critical sheet.
    fn resolve_font_face(
        &self,
        at: &AtRule,
        usage: &Usage,
        font_preloads: &mut Vec<String>,
    ) -> bool {
        let mut family = None;
        let mut src = None;
        for decl in at.declarations() {
            if decl.property == "src" {
                src = first_font_url(&decl.value);
            } else if decl.property == "font-family" {
                family = Some(decl.value.as_str());
            }
        }

        if let Some(url) = src.as_deref() {
            let url = url.trim();
            if self.options.should_preload_fonts() && !font_preloads.iter().any(|seen| seen == url)
            {
                font_preloads.push(url.to_string());
            }
        }

        self.options.should_inline_fonts()
            && src.is_some()
            && family.is_some_and(|family| {
                !family.is_empty() && usage.critical_fonts.contains(family)
            })
    }
}

/// Swap in the selectors pass 1 kept. Selectors it dropped move to the
/// inverse copy so no selector is lost from both sheets.
fn apply_marked_selectors(rule: &mut Rule, inverse: Option<&mut Node>) -> MirrorVerdict {
    let Some(kept) = rule.marked_selectors.take() else {
        return MirrorVerdict::Keep;
    };
    let dropped: Vec<String> = rule
        .selectors
        .iter()
        .filter(|selector| !kept.contains(selector))
        .cloned()
        .collect();
    rule.selectors = kept;
    match inverse {
        Some(Node::Rule(other)) if !dropped.is_empty() => {
            other.selectors = dropped;
            MirrorVerdict::Split {
                primary: true,
                inverse: true,
            }
        }
        _ => MirrorVerdict::Keep,
    }
}
