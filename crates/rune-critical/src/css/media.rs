//! Media query validation.
//!
//! A `media` attribute value is only ever echoed into generated markup after
//! it parses as a media query list. The grammar accepted here is the
//! Media Queries Level 4 shape: optional `not`/`only`, a media type, `and`
//! chains of parenthesised conditions, or a bare condition. Feature contents
//! are limited to identifiers, numbers, dimensions, ratios, range operators
//! and math functions, so quotes, semicolons and unbalanced parentheses never
//! pass.

use cssparser::{ParseError, Parser, ParserInput, Token};

type MediaResult<'i> = Result<(), ParseError<'i, ()>>;

const RESERVED_TYPES: &[&str] = &["and", "not", "only", "or", "layer"];

/// Whether `query` is a syntactically valid media query list.
pub fn is_valid_media_query(query: &str) -> bool {
    let mut input = ParserInput::new(query);
    let mut parser = Parser::new(&mut input);
    parser
        .parse_comma_separated(|parser| parse_media_query(parser))
        .is_ok()
}

fn parse_media_query<'i, 't>(parser: &mut Parser<'i, 't>) -> MediaResult<'i> {
    if parser.try_parse(|parser| parse_whole_condition(parser)).is_ok() {
        return Ok(());
    }

    let first = parser.expect_ident_cloned()?;
    let media_type = if first.eq_ignore_ascii_case("not") || first.eq_ignore_ascii_case("only") {
        parser.expect_ident_cloned()?
    } else {
        first
    };
    if RESERVED_TYPES
        .iter()
        .any(|reserved| media_type.eq_ignore_ascii_case(reserved))
    {
        return Err(parser.new_custom_error(()));
    }
    if parser
        .try_parse(|parser| parser.expect_ident_matching("and"))
        .is_ok()
    {
        parse_condition(parser, false)?;
    }
    parser.expect_exhausted()?;
    Ok(())
}

fn parse_whole_condition<'i, 't>(parser: &mut Parser<'i, 't>) -> MediaResult<'i> {
    parse_condition(parser, true)?;
    parser.expect_exhausted()?;
    Ok(())
}

/// `not <in-parens>`, or `<in-parens>` joined by a single kind of connector.
fn parse_condition<'i, 't>(parser: &mut Parser<'i, 't>, allow_or: bool) -> MediaResult<'i> {
    if parser
        .try_parse(|parser| parser.expect_ident_matching("not"))
        .is_ok()
    {
        return parse_in_parens(parser);
    }
    parse_in_parens(parser)?;
    let mut connector: Option<bool> = None;
    loop {
        let Ok(word) = parser.try_parse(|parser| parser.expect_ident_cloned()) else {
            break;
        };
        let is_and = if word.eq_ignore_ascii_case("and") {
            true
        } else if allow_or && word.eq_ignore_ascii_case("or") {
            false
        } else {
            return Err(parser.new_custom_error(()));
        };
        if connector.is_some_and(|previous| previous != is_and) {
            return Err(parser.new_custom_error(()));
        }
        connector = Some(is_and);
        parse_in_parens(parser)?;
    }
    Ok(())
}

fn parse_in_parens<'i, 't>(parser: &mut Parser<'i, 't>) -> MediaResult<'i> {
    parser.expect_parenthesis_block()?;
    parser.parse_nested_block(|parser| {
        if parser.try_parse(|parser| parse_whole_condition(parser)).is_ok() {
            return Ok(());
        }
        parse_feature(parser)
    })
}

/// `(name)`, `(name: value)` or a range form like `(400px <= width)`.
fn parse_feature<'i, 't>(parser: &mut Parser<'i, 't>) -> MediaResult<'i> {
    let mut seen_tokens = false;
    let mut seen_colon = false;
    loop {
        let token = match parser.next() {
            Ok(token) => token.clone(),
            Err(_) => break,
        };
        seen_tokens = true;
        match token {
            Token::Ident(_)
            | Token::Number { .. }
            | Token::Dimension { .. }
            | Token::Percentage { .. }
            | Token::Delim('/' | '<' | '>' | '=') => {}
            Token::Colon if !seen_colon => seen_colon = true,
            Token::Function(_) => parser.parse_nested_block(|parser| parse_math(parser))?,
            _ => return Err(parser.new_custom_error(())),
        }
    }
    if seen_tokens {
        Ok(())
    } else {
        Err(parser.new_custom_error(()))
    }
}

/// Arguments of `calc()` and friends inside a feature value.
fn parse_math<'i, 't>(parser: &mut Parser<'i, 't>) -> MediaResult<'i> {
    loop {
        let token = match parser.next() {
            Ok(token) => token.clone(),
            Err(_) => break,
        };
        match token {
            Token::Ident(_)
            | Token::Number { .. }
            | Token::Dimension { .. }
            | Token::Percentage { .. }
            | Token::Comma
            | Token::Delim('+' | '-' | '*' | '/') => {}
            Token::Function(_) | Token::ParenthesisBlock => {
                parser.parse_nested_block(|parser| parse_math(parser))?
            }
            _ => return Err(parser.new_custom_error(())),
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_common_queries() {
        for query in [
            "all",
            "print",
            "screen and (min-width: 480px)",
            "only screen and (max-width: 600px), print",
            "not all and (monochrome)",
            "(prefers-reduced-motion: reduce)",
            "(min-width: 40em) and (orientation: landscape)",
            "(hover) or (pointer: fine)",
            "not (color)",
            "(400px <= width <= 700px)",
            "(min-aspect-ratio: 16/9)",
            "(min-width: calc(100px + 2em))",
        ] {
            assert!(is_valid_media_query(query), "expected {query:?} to be valid");
        }
    }

    #[test]
    fn rejects_injection_attempts() {
        for query in [
            "foo);color:red;(bar",
            "print' onload='alert(1)",
            "screen\" onerror=\"x",
            "all;",
            "(min-width: 1px))",
        ] {
            assert!(!is_valid_media_query(query), "expected {query:?} to be invalid");
        }
    }

    #[test]
    fn rejects_malformed_grammar() {
        for query in [
            "",
            "screen and",
            "and",
            "only",
            "screen or (color)",
            "(a) and (b) or (c)",
            "()",
            "(width: 'x')",
        ] {
            assert!(!is_valid_media_query(query), "expected {query:?} to be invalid");
        }
    }
}
