//! Selector normalization for existence queries.
//!
//! Pseudo-classes and pseudo-elements are stripped because only the existence
//! of the underlying element matters: `a:hover` is critical whenever an `<a>`
//! exists. `:not(...)` is stripped as well, which can over-include but never
//! drops CSS the page uses.

use std::collections::HashMap;
use std::sync::{Mutex, OnceLock};

use regex::Regex;

/// Selectors that always count as matching and skip normalization.
pub fn is_always_matching(selector: &str) -> bool {
    matches!(
        selector,
        ":root" | "html" | "body" | "::before" | "::after" | ":before" | ":after"
    )
}

fn dangling_comma_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"\(\s*,|,\s*\)").expect("literal pattern compiles"))
}

fn is_combinator(c: char) -> bool {
    matches!(c, '>' | '+' | '~')
}

/// Normalize one selector (already split from its list).
///
/// The result is trimmed and never ends in, starts with, or contains two
/// adjacent combinators: a missing compound is filled with `*`. Normalizing
/// twice gives the same result as normalizing once.
pub fn normalize_selector(selector: &str) -> String {
    if is_always_matching(selector) {
        return selector.to_string();
    }
    let stripped = strip_pseudos(selector);
    let fixed = dangling_comma_pattern().replace_all(&stripped, |caps: &regex::Captures<'_>| {
        let repaired = if caps[0].starts_with('(') { "(" } else { ")" };
        repaired.to_string()
    });
    fill_missing_compounds(&fixed).trim().to_string()
}

/// Copy a quoted string starting at `start`, returning the index after it.
fn copy_quoted(chars: &[char], start: usize, out: &mut String) -> usize {
    let quote = chars[start];
    out.push(quote);
    let mut i = start + 1;
    while i < chars.len() {
        let c = chars[i];
        out.push(c);
        i += 1;
        if c == '\\' && i < chars.len() {
            out.push(chars[i]);
            i += 1;
        } else if c == quote {
            break;
        }
    }
    i
}

/// Copy an attribute selector `[...]` verbatim.
fn copy_bracketed(chars: &[char], start: usize, out: &mut String) -> usize {
    let mut i = start;
    while i < chars.len() {
        let c = chars[i];
        if c == '"' || c == '\'' {
            i = copy_quoted(chars, i, out);
            continue;
        }
        out.push(c);
        i += 1;
        if c == ']' {
            break;
        }
    }
    i
}

/// Index just past the balanced parenthesised group starting at `start`.
fn skip_parenthesized(chars: &[char], start: usize) -> usize {
    let mut depth = 0usize;
    let mut i = start;
    let mut sink = String::new();
    while i < chars.len() {
        match chars[i] {
            '"' | '\'' => {
                i = copy_quoted(chars, i, &mut sink);
                continue;
            }
            '\\' => i += 1,
            '(' => depth += 1,
            ')' => {
                depth = depth.saturating_sub(1);
                if depth == 0 {
                    return i + 1;
                }
            }
            _ => {}
        }
        i += 1;
    }
    chars.len()
}

/// Remove every unescaped `:name` / `::name` token together with its
/// parenthesised argument.
fn strip_pseudos(selector: &str) -> String {
    let chars: Vec<char> = selector.chars().collect();
    let mut out = String::with_capacity(selector.len());
    let mut i = 0;
    while i < chars.len() {
        let c = chars[i];
        match c {
            '\\' => {
                out.push(c);
                if let Some(&next) = chars.get(i + 1) {
                    out.push(next);
                }
                i += 2;
            }
            '"' | '\'' => i = copy_quoted(&chars, i, &mut out),
            '[' => i = copy_bracketed(&chars, i, &mut out),
            ':' => {
                let mut j = i + 1;
                if chars.get(j) == Some(&':') {
                    j += 1;
                }
                let name_start = j;
                while j < chars.len() && (chars[j].is_ascii_alphabetic() || chars[j] == '-') {
                    j += 1;
                }
                if j == name_start {
                    out.push(c);
                    i += 1;
                    continue;
                }
                if chars.get(j) == Some(&'(') {
                    j = skip_parenthesized(&chars, j);
                }
                i = j;
            }
            _ => {
                out.push(c);
                i += 1;
            }
        }
    }
    out
}

/// Insert `*` wherever a combinator has no compound selector on one side.
fn fill_missing_compounds(selector: &str) -> String {
    let chars: Vec<char> = selector.chars().collect();
    let mut out = String::with_capacity(selector.len() + 4);
    // Whether the last significant character emitted was a combinator, and
    // whether anything significant has been emitted at all.
    let mut after_combinator = false;
    let mut seen_compound = false;
    let mut i = 0;
    while i < chars.len() {
        let c = chars[i];
        match c {
            '\\' => {
                out.push(c);
                if let Some(&next) = chars.get(i + 1) {
                    out.push(next);
                }
                i += 2;
                after_combinator = false;
                seen_compound = true;
                continue;
            }
            '"' | '\'' => {
                i = copy_quoted(&chars, i, &mut out);
                after_combinator = false;
                seen_compound = true;
                continue;
            }
            '[' => {
                i = copy_bracketed(&chars, i, &mut out);
                after_combinator = false;
                seen_compound = true;
                continue;
            }
            '(' => {
                let end = skip_parenthesized(&chars, i);
                out.extend(&chars[i..end]);
                i = end;
                after_combinator = false;
                seen_compound = true;
                continue;
            }
            c if is_combinator(c) => {
                if after_combinator || !seen_compound {
                    let kept = out.trim_end().len();
                    out.truncate(kept);
                    if out.is_empty() {
                        out.push('*');
                    } else {
                        out.push_str(" *");
                    }
                    out.push(' ');
                }
                out.push(c);
                after_combinator = true;
                seen_compound = true;
            }
            c if c.is_whitespace() => out.push(c),
            _ => {
                out.push(c);
                after_combinator = false;
                seen_compound = true;
            }
        }
        i += 1;
    }
    if after_combinator {
        let kept = out.trim_end().len();
        out.truncate(kept);
        out.push_str(" *");
    }
    out
}

/// Memoized [`normalize_selector`], keyed by the raw selector.
#[derive(Debug, Default)]
pub struct SelectorCache {
    entries: Mutex<HashMap<String, String>>,
}

impl SelectorCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn normalize(&self, selector: &str) -> String {
        if let Ok(entries) = self.entries.lock() {
            if let Some(hit) = entries.get(selector) {
                return hit.clone();
            }
        }
        let normalized = normalize_selector(selector);
        if let Ok(mut entries) = self.entries.lock() {
            entries.insert(selector.to_string(), normalized.clone());
        }
        normalized
    }

    pub fn len(&self) -> usize {
        self.entries.lock().map(|entries| entries.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_pseudo_classes_and_elements() {
        assert_eq!(normalize_selector("a:hover"), "a");
        assert_eq!(normalize_selector("p::first-line"), "p");
        assert_eq!(normalize_selector("li:nth-child(2n+1) span"), "li span");
        assert_eq!(normalize_selector(".btn:not(.disabled):focus-visible"), ".btn");
        assert_eq!(normalize_selector("input::-webkit-input-placeholder"), "input");
    }

    #[test]
    fn leaves_escapes_attributes_and_strings_alone() {
        assert_eq!(normalize_selector(r".sm\:flex"), r".sm\:flex");
        assert_eq!(normalize_selector("a[href^=\"http:\"]"), "a[href^=\"http:\"]");
        assert_eq!(normalize_selector("[data-x='a>b']"), "[data-x='a>b']");
    }

    #[test]
    fn fills_adjacent_and_dangling_combinators() {
        assert_eq!(normalize_selector(".form-floating>~label"), ".form-floating> * ~label");
        assert_eq!(normalize_selector(".btn-group>+.btn"), ".btn-group> * +.btn");
        assert_eq!(normalize_selector(".lobot>*+*"), ".lobot>*+*");
        assert_eq!(normalize_selector("div > :not(.foo) > *"), "div > * > *");
        assert_eq!(normalize_selector("ul > li:hover >"), "ul > li > *");
        assert_eq!(normalize_selector(":focus-within > a"), "* > a");
    }

    #[test]
    fn repairs_dangling_commas() {
        assert_eq!(normalize_selector(":is(a, b)"), "");
        assert_eq!(dangling_comma_pattern().replace_all("x( , y,)", "").as_ref(), "x y");
    }

    #[test]
    fn special_cases_are_returned_unchanged() {
        for selector in [":root", "html", "body", "::before", ":after"] {
            assert!(is_always_matching(selector));
            assert_eq!(normalize_selector(selector), selector);
        }
        assert!(!is_always_matching("html body"));
    }

    #[test]
    fn normalization_is_idempotent() {
        for selector in [
            ".form-floating>~label",
            "div > :not(.foo) > *",
            "a:hover > > b",
            "~ .x",
            ".foo~+span",
            "ul li::marker",
            "a[title=\":hover\"] + b:focus",
        ] {
            let once = normalize_selector(selector);
            assert_eq!(normalize_selector(&once), once, "not idempotent for {selector:?}");
        }
    }

    #[test]
    fn cache_memoizes_by_raw_selector() {
        let cache = SelectorCache::new();
        assert!(cache.is_empty());
        assert_eq!(cache.normalize("a:hover"), "a");
        assert_eq!(cache.normalize("a:hover"), "a");
        assert_eq!(cache.len(), 1);
    }
}
