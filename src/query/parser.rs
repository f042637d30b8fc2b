//! Selector parser
//!
//! Parses label selectors of the form:
//!
//! ```text
//! {key="value", key2!="v", key3=~"regex", key4!~"regex"}
//! ```
//!
//! Empty `{}` matches all streams. Unbalanced braces or a missing value are
//! syntax errors; a pattern that fails to compile is a regex error.

use nom::{
    branch::alt,
    bytes::complete::{is_not, tag, take_while1},
    character::complete::{char, multispace0},
    combinator::{map, opt, value},
    multi::separated_list1,
    sequence::{delimited, preceded},
    IResult,
};

use crate::query::ast::{MatchOp, Matcher};
use crate::query::error::{QueryError, QueryResult};

/// Parse a selector string into a list of matchers
pub fn parse_selector(input: &str) -> QueryResult<Vec<Matcher>> {
    match selector_body(input) {
        Ok((rest, raw)) => {
            if !rest.trim().is_empty() {
                return Err(QueryError::Syntax(format!(
                    "unexpected input after selector: '{}'",
                    rest.trim()
                )));
            }
            raw.into_iter().map(build_matcher).collect()
        }
        Err(_) => Err(QueryError::Syntax(format!(
            "expected '{{key=\"value\", ...}}', got '{}'",
            input.trim()
        ))),
    }
}

struct RawMatcher<'a> {
    key: &'a str,
    op: MatchOp,
    value: String,
}

fn build_matcher(raw: RawMatcher<'_>) -> QueryResult<Matcher> {
    match raw.op {
        MatchOp::Eq | MatchOp::Ne => Ok(Matcher::equality(raw.key, raw.op, raw.value)),
        MatchOp::Re | MatchOp::Nre => Matcher::regex(raw.key, raw.op, raw.value)
            .map_err(|e| QueryError::Regex(e.to_string())),
    }
}

fn selector_body(input: &str) -> IResult<&str, Vec<RawMatcher<'_>>> {
    map(
        delimited(
            preceded(multispace0, char('{')),
            opt(separated_list1(
                preceded(multispace0, char(',')),
                matcher,
            )),
            preceded(multispace0, char('}')),
        ),
        |list| list.unwrap_or_default(),
    )(input)
}

fn matcher(input: &str) -> IResult<&str, RawMatcher<'_>> {
    let (input, _) = multispace0(input)?;
    let (input, key) = label_name(input)?;
    let (input, _) = multispace0(input)?;
    let (input, op) = match_op(input)?;
    let (input, _) = multispace0(input)?;
    let (input, value) = quoted_string(input)?;
    Ok((input, RawMatcher { key, op, value }))
}

fn label_name(input: &str) -> IResult<&str, &str> {
    take_while1(|c: char| c.is_ascii_alphanumeric() || c == '_')(input)
}

fn match_op(input: &str) -> IResult<&str, MatchOp> {
    // Two-character operators must be tried first.
    alt((
        value(MatchOp::Re, tag("=~")),
        value(MatchOp::Nre, tag("!~")),
        value(MatchOp::Ne, tag("!=")),
        value(MatchOp::Eq, tag("=")),
    ))(input)
}

fn quoted_string(input: &str) -> IResult<&str, String> {
    delimited(
        char('"'),
        map(opt(string_contents), |s| s.unwrap_or_default()),
        char('"'),
    )(input)
}

fn string_contents(input: &str) -> IResult<&str, String> {
    nom::bytes::complete::escaped_transform(
        is_not("\"\\"),
        '\\',
        alt((
            value("\"", tag("\"")),
            value("\\", tag("\\")),
            value("\n", tag("n")),
            value("\t", tag("t")),
        )),
    )(input)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_equality() {
        let matchers = parse_selector(r#"{service="api"}"#).unwrap();
        assert_eq!(matchers.len(), 1);
        assert_eq!(matchers[0].key, "service");
        assert_eq!(matchers[0].op, MatchOp::Eq);
        assert_eq!(matchers[0].value, "api");
    }

    #[test]
    fn test_all_operators() {
        let matchers =
            parse_selector(r#"{a="1", b!="2", c=~"x.*", d!~"y+"}"#).unwrap();
        let ops: Vec<MatchOp> = matchers.iter().map(|m| m.op).collect();
        assert_eq!(ops, vec![MatchOp::Eq, MatchOp::Ne, MatchOp::Re, MatchOp::Nre]);
    }

    #[test]
    fn test_empty_selector_matches_all() {
        assert!(parse_selector("{}").unwrap().is_empty());
        assert!(parse_selector("  {  }  ").unwrap().is_empty());
    }

    #[test]
    fn test_whitespace_tolerated() {
        let matchers = parse_selector(r#"  { service = "api" , level = "error" }  "#).unwrap();
        assert_eq!(matchers.len(), 2);
        assert_eq!(matchers[1].key, "level");
    }

    #[test]
    fn test_escaped_quotes_in_value() {
        let matchers = parse_selector(r#"{msg="say \"hi\""}"#).unwrap();
        assert_eq!(matchers[0].value, r#"say "hi""#);
    }

    #[test]
    fn test_empty_value_allowed() {
        let matchers = parse_selector(r#"{service=""}"#).unwrap();
        assert_eq!(matchers[0].value, "");
    }

    #[test]
    fn test_missing_value_is_syntax_error() {
        let err = parse_selector(r#"{service="api", level=}"#).unwrap_err();
        assert!(matches!(err, QueryError::Syntax(_)));
    }

    #[test]
    fn test_unbalanced_braces_are_syntax_errors() {
        assert!(matches!(
            parse_selector(r#"{service="api""#),
            Err(QueryError::Syntax(_))
        ));
        assert!(matches!(
            parse_selector(r#"service="api"}"#),
            Err(QueryError::Syntax(_))
        ));
        assert!(matches!(parse_selector(""), Err(QueryError::Syntax(_))));
    }

    #[test]
    fn test_trailing_garbage_is_syntax_error() {
        assert!(matches!(
            parse_selector(r#"{service="api"} extra"#),
            Err(QueryError::Syntax(_))
        ));
    }

    #[test]
    fn test_invalid_regex_is_regex_error() {
        let err = parse_selector(r#"{service=~"[invalid"}"#).unwrap_err();
        assert!(matches!(err, QueryError::Regex(_)));
    }

    #[test]
    fn test_negative_regex_compiled_too() {
        let err = parse_selector(r#"{service!~"[invalid"}"#).unwrap_err();
        assert!(matches!(err, QueryError::Regex(_)));
    }
}
