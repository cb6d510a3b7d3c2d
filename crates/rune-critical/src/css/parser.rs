//! Stylesheet parser built on the `cssparser` tokenizer.
//!
//! The tokenizer provides block nesting and raw source slices; this module
//! decides where rules, at-rules and declarations start and end, keeping the
//! original text of selectors, preludes and values.

use cssparser::{
    ParseError as CssParseError, ParseErrorKind, Parser, ParserInput, SourceLocation,
    SourcePosition, Token,
};

use super::ast::{AtRule, Comment, Declaration, Node, Rule, Stylesheet};
use crate::error::ParseError;

type PResult<'i, T> = Result<T, CssParseError<'i, ParseError>>;

/// Parse stylesheet text into a [`Stylesheet`].
pub fn parse_stylesheet(css: &str) -> Result<Stylesheet, ParseError> {
    let mut input = ParserInput::new(css);
    let mut parser = Parser::new(&mut input);
    parse_list(&mut parser, true)
        .map(|nodes| Stylesheet { nodes })
        .map_err(into_parse_error)
}

fn into_parse_error(error: CssParseError<'_, ParseError>) -> ParseError {
    match error.kind {
        ParseErrorKind::Custom(error) => error,
        ParseErrorKind::Basic(kind) => ParseError::new(format!("{kind:?}"), error.location),
    }
}

fn fail<'i, T>(message: &str, location: SourceLocation) -> PResult<'i, T> {
    Err(CssParseError {
        kind: ParseErrorKind::Custom(ParseError::new(message, location)),
        location,
    })
}

/// Parse items until the end of the current block (or input).
fn parse_list<'i, 't>(parser: &mut Parser<'i, 't>, top_level: bool) -> PResult<'i, Vec<Node>> {
    let mut nodes = Vec::new();
    loop {
        let start = parser.position();
        let location = parser.current_source_location();
        let token = match parser.next_including_whitespace_and_comments() {
            Ok(token) => token.clone(),
            Err(_) => break,
        };
        match token {
            Token::WhiteSpace(_) | Token::Semicolon | Token::CDO | Token::CDC => {}
            Token::Comment(text) => {
                let raw = parser.slice_from(start);
                if raw.len() < 4 || !raw.ends_with("*/") {
                    return fail("Unclosed comment", location);
                }
                nodes.push(Node::Comment(Comment {
                    text: text.trim().to_string(),
                    removal_mark: false,
                }));
            }
            Token::AtKeyword(name) => {
                nodes.push(parse_at_rule(parser, name.to_string(), location)?);
            }
            Token::CurlyBracketBlock => {
                let nodes_in_block = parse_block(parser, location)?;
                nodes.push(Node::Rule(Rule {
                    nodes: nodes_in_block,
                    ..Rule::default()
                }));
            }
            Token::CloseCurlyBracket => return fail("Unexpected }", location),
            Token::BadString(_) => return fail("Unclosed string", location),
            Token::BadUrl(_) => return fail("Unclosed bracket", location),
            first => nodes.push(parse_rule_or_declaration(
                parser, start, first, location, top_level,
            )?),
        }
    }
    Ok(nodes)
}

fn parse_at_rule<'i, 't>(
    parser: &mut Parser<'i, 't>,
    name: String,
    location: SourceLocation,
) -> PResult<'i, Node> {
    let prelude_start = parser.position();
    let mut prelude_end = prelude_start;
    loop {
        let token = match parser.next_including_whitespace_and_comments() {
            Ok(token) => token.clone(),
            Err(_) => break,
        };
        match token {
            Token::Semicolon => break,
            Token::CurlyBracketBlock => {
                let params = parser.slice(prelude_start..prelude_end).trim().to_string();
                let nodes = parse_block(parser, location)?;
                return Ok(Node::AtRule(AtRule {
                    name,
                    params,
                    nodes: Some(nodes),
                    removal_mark: false,
                }));
            }
            Token::BadString(_) => return fail("Unclosed string", location),
            Token::BadUrl(_) => return fail("Unclosed bracket", location),
            Token::CloseCurlyBracket => return fail("Unexpected }", location),
            _ => {}
        }
        prelude_end = parser.position();
    }
    let params = parser.slice(prelude_start..prelude_end).trim().to_string();
    Ok(Node::AtRule(AtRule {
        name,
        params,
        nodes: None,
        removal_mark: false,
    }))
}

/// Either `prelude { ... }` or `property: value`; whichever terminator comes
/// first decides.
fn parse_rule_or_declaration<'i, 't>(
    parser: &mut Parser<'i, 't>,
    start: SourcePosition,
    first: Token<'i>,
    location: SourceLocation,
    top_level: bool,
) -> PResult<'i, Node> {
    let mut end = parser.position();
    let mut colon = matches!(first, Token::Colon).then_some((start, end));
    loop {
        let before = parser.position();
        let token = match parser.next_including_whitespace_and_comments() {
            Ok(token) => token.clone(),
            Err(_) => break,
        };
        match token {
            Token::CurlyBracketBlock => {
                let selectors = split_selectors(parser.slice(start..before));
                let nodes = parse_block(parser, location)?;
                return Ok(Node::Rule(Rule {
                    selectors,
                    nodes,
                    removal_mark: false,
                    marked_selectors: None,
                }));
            }
            Token::Semicolon => break,
            Token::Colon if colon.is_none() => colon = Some((before, parser.position())),
            Token::BadString(_) => return fail("Unclosed string", location),
            Token::BadUrl(_) => return fail("Unclosed bracket", location),
            Token::CloseCurlyBracket => return fail("Unexpected }", location),
            _ => {}
        }
        end = parser.position();
    }

    if top_level {
        return fail("Unknown word", location);
    }
    let Some((colon_start, colon_end)) = colon else {
        return fail("Unknown word", location);
    };
    let property = parser.slice(start..colon_start).trim();
    if property.is_empty() {
        return fail("Unknown word", location);
    }
    let value = parser.slice(colon_end..end).trim();
    Ok(Node::Declaration(Declaration {
        property: property.to_string(),
        value: value.to_string(),
    }))
}

/// Parse the contents of a `{}` block the parser has just opened.
fn parse_block<'i, 't>(
    parser: &mut Parser<'i, 't>,
    location: SourceLocation,
) -> PResult<'i, Vec<Node>> {
    let (nodes, inner_end) = parser.parse_nested_block(|nested| {
        let nodes = parse_list(nested, false)?;
        Ok((nodes, nested.position()))
    })?;
    if parser.slice(inner_end..parser.position()) != "}" {
        return fail("Unclosed block", location);
    }
    Ok(nodes)
}

/// Split a selector list on top-level commas. Commas nested in functions,
/// brackets or strings are part of a single selector.
pub(crate) fn split_selectors(prelude: &str) -> Vec<String> {
    let mut input = ParserInput::new(prelude);
    let mut parser = Parser::new(&mut input);
    let mut selectors = Vec::new();
    let mut start = parser.position();
    loop {
        let before = parser.position();
        let is_comma = match parser.next_including_whitespace_and_comments() {
            Ok(token) => matches!(token, Token::Comma),
            Err(_) => break,
        };
        if is_comma {
            push_selector(&mut selectors, parser.slice(start..before));
            start = parser.position();
        }
    }
    push_selector(&mut selectors, parser.slice_from(start));
    selectors
}

fn push_selector(selectors: &mut Vec<String>, raw: &str) {
    let trimmed = raw.trim();
    if !trimmed.is_empty() {
        selectors.push(trimmed.to_string());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decl(property: &str, value: &str) -> Node {
        Node::Declaration(Declaration {
            property: property.into(),
            value: value.into(),
        })
    }

    #[test]
    fn parses_rules_with_declarations() {
        let sheet = parse_stylesheet("h1, h2.title { color: blue; margin: 0 auto }").unwrap();
        assert_eq!(sheet.nodes.len(), 1);
        let Node::Rule(rule) = &sheet.nodes[0] else {
            panic!("expected rule");
        };
        assert_eq!(rule.selectors, vec!["h1".to_string(), "h2.title".to_string()]);
        assert_eq!(rule.nodes, vec![decl("color", "blue"), decl("margin", "0 auto")]);
    }

    #[test]
    fn empty_custom_property_values_parse() {
        let sheet = parse_stylesheet("* { --a: ; --b: }").unwrap();
        let Node::Rule(rule) = &sheet.nodes[0] else {
            panic!("expected rule");
        };
        assert_eq!(rule.nodes, vec![decl("--a", ""), decl("--b", "")]);
    }

    #[test]
    fn at_rules_keep_params_and_bodies() {
        let sheet = parse_stylesheet(
            "@import url(a.css);@layer base, theme;@media (min-width: 480px) { p { color: red } }",
        )
        .unwrap();
        let names: Vec<_> = sheet
            .nodes
            .iter()
            .map(|node| match node {
                Node::AtRule(at) => (at.name.as_str(), at.params.as_str(), at.nodes.is_some()),
                other => panic!("unexpected node {other:?}"),
            })
            .collect();
        assert_eq!(
            names,
            vec![
                ("import", "url(a.css)", false),
                ("layer", "base, theme", false),
                ("media", "(min-width: 480px)", true),
            ]
        );
    }

    #[test]
    fn comments_are_kept_with_trimmed_text() {
        let sheet = parse_stylesheet("/* beasties:include */ .a { color: red }").unwrap();
        assert_eq!(
            sheet.nodes[0],
            Node::Comment(Comment {
                text: "beasties:include".into(),
                removal_mark: false,
            })
        );
    }

    #[test]
    fn selector_commas_inside_functions_do_not_split() {
        assert_eq!(
            split_selectors(":is(a, b) > c, [data-x=\"1,2\"]"),
            vec![":is(a, b) > c".to_string(), "[data-x=\"1,2\"]".to_string()]
        );
    }

    #[test]
    fn nested_rules_and_keyframes() {
        let sheet = parse_stylesheet(
            ".card { color: red; &:hover { color: blue } } @keyframes spin { from { opacity: 0 } 50% { opacity: .5 } }",
        )
        .unwrap();
        let Node::Rule(card) = &sheet.nodes[0] else {
            panic!("expected rule");
        };
        assert_eq!(card.nodes.len(), 2);
        assert!(matches!(&card.nodes[1], Node::Rule(r) if r.selectors == vec!["&:hover".to_string()]));
        let Node::AtRule(spin) = &sheet.nodes[1] else {
            panic!("expected at-rule");
        };
        assert_eq!(spin.params, "spin");
        assert_eq!(spin.nodes.as_ref().map(Vec::len), Some(2));
    }

    #[test]
    fn malformed_input_is_rejected() {
        for css in [
            "a { color: red",
            "a { color: red } }",
            "/* never closed",
            "a { color }",
            "color: red;",
            "a { content: \"broken\n }",
        ] {
            assert!(parse_stylesheet(css).is_err(), "expected error for {css:?}");
        }
    }

    #[test]
    fn parse_error_reports_one_based_lines() {
        let error = parse_stylesheet("a { color: red }\n}").unwrap_err();
        assert_eq!(error.line, 2);
        assert_eq!(error.message, "Unexpected }");
    }
}
