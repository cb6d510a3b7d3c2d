//! Stylesheet serialization, minified or pretty-printed.

use std::fmt::Write;

use super::ast::{Declaration, Node, Stylesheet};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SerializeOptions {
    pub compress: bool,
}

impl Default for SerializeOptions {
    fn default() -> Self {
        Self { compress: true }
    }
}

/// Serialize `sheet` back to CSS text.
///
/// Declarations whose value contains `</style>` are skipped so the output can
/// be embedded in a `<style>` element.
pub fn serialize_stylesheet(sheet: &Stylesheet, options: SerializeOptions) -> String {
    let mut out = String::new();
    if options.compress {
        write_compact(&mut out, &sheet.nodes);
    } else {
        write_pretty(&mut out, &sheet.nodes, 0);
    }
    out
}

fn is_embeddable(decl: &Declaration) -> bool {
    !decl.value.to_ascii_lowercase().contains("</style")
}

fn write_compact(out: &mut String, nodes: &[Node]) {
    // A declaration needs a `;` before whatever follows it in the same block.
    let mut after_declaration = false;
    for node in nodes {
        match node {
            Node::Comment(_) => {}
            Node::Declaration(decl) => {
                if !is_embeddable(decl) {
                    continue;
                }
                if after_declaration {
                    out.push(';');
                }
                write_declaration(out, decl, "");
                after_declaration = true;
            }
            Node::Rule(rule) => {
                if after_declaration {
                    out.push(';');
                    after_declaration = false;
                }
                out.push_str(&rule.selectors.join(","));
                out.push('{');
                write_compact(out, &rule.nodes);
                out.push('}');
            }
            Node::AtRule(at) => {
                if after_declaration {
                    out.push(';');
                    after_declaration = false;
                }
                out.push('@');
                out.push_str(&at.name);
                if !at.params.is_empty() {
                    out.push(' ');
                    out.push_str(&at.params);
                }
                match &at.nodes {
                    Some(children) => {
                        out.push('{');
                        write_compact(out, children);
                        out.push('}');
                    }
                    None => out.push(';'),
                }
            }
        }
    }
}

/// `prop:value`, or `prop: ` for an empty value so custom properties keep
/// their (empty) token stream.
fn write_declaration(out: &mut String, decl: &Declaration, separator: &str) {
    out.push_str(&decl.property);
    out.push(':');
    if decl.value.is_empty() {
        out.push(' ');
    } else {
        out.push_str(separator);
        out.push_str(&decl.value);
    }
}

fn write_pretty(out: &mut String, nodes: &[Node], depth: usize) {
    let indent = "  ".repeat(depth);
    for node in nodes {
        match node {
            Node::Comment(comment) => {
                let _ = writeln!(out, "{indent}/* {} */", comment.text);
            }
            Node::Declaration(decl) => {
                if !is_embeddable(decl) {
                    continue;
                }
                out.push_str(&indent);
                write_declaration(out, decl, " ");
                out.push_str(";\n");
            }
            Node::Rule(rule) => {
                let _ = writeln!(out, "{indent}{} {{", rule.selectors.join(", "));
                write_pretty(out, &rule.nodes, depth + 1);
                let _ = writeln!(out, "{indent}}}");
            }
            Node::AtRule(at) => {
                out.push_str(&indent);
                out.push('@');
                out.push_str(&at.name);
                if !at.params.is_empty() {
                    out.push(' ');
                    out.push_str(&at.params);
                }
                match &at.nodes {
                    Some(children) => {
                        out.push_str(" {\n");
                        write_pretty(out, children, depth + 1);
                        let _ = writeln!(out, "{indent}}}");
                    }
                    None => out.push_str(";\n"),
                }
            }
        }
    }
}
