//! Selector AST
//!
//! A selector is a list of label matchers. Equality and regex-match
//! matchers narrow the stream set through the label index; inequality and
//! regex-non-match are applied per entry by the executor.

use regex::Regex;
use std::collections::HashMap;

/// Matcher operator: `=`, `!=`, `=~`, `!~`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchOp {
    Eq,
    Ne,
    Re,
    Nre,
}

impl MatchOp {
    pub fn as_str(&self) -> &'static str {
        match self {
            MatchOp::Eq => "=",
            MatchOp::Ne => "!=",
            MatchOp::Re => "=~",
            MatchOp::Nre => "!~",
        }
    }
}

/// A single `key op "value"` matcher
#[derive(Debug, Clone)]
pub struct Matcher {
    pub key: String,
    pub op: MatchOp,
    pub value: String,
    /// Compiled pattern for `=~`/`!~`, None for equality operators
    regex: Option<Regex>,
}

impl Matcher {
    /// Build an equality-style matcher (`=` or `!=`)
    pub fn equality(key: impl Into<String>, op: MatchOp, value: impl Into<String>) -> Self {
        debug_assert!(matches!(op, MatchOp::Eq | MatchOp::Ne));
        Self {
            key: key.into(),
            op,
            value: value.into(),
            regex: None,
        }
    }

    /// Build a regex-style matcher (`=~` or `!~`), compiling the pattern
    pub fn regex(
        key: impl Into<String>,
        op: MatchOp,
        value: impl Into<String>,
    ) -> Result<Self, regex::Error> {
        debug_assert!(matches!(op, MatchOp::Re | MatchOp::Nre));
        let value = value.into();
        let regex = Regex::new(&value)?;
        Ok(Self {
            key: key.into(),
            op,
            value,
            regex: Some(regex),
        })
    }

    /// Compiled regex, present for `=~`/`!~`
    pub fn pattern(&self) -> Option<&Regex> {
        self.regex.as_ref()
    }

    /// Positive matchers narrow the stream set; negative ones only filter
    /// entries.
    pub fn is_positive(&self) -> bool {
        matches!(self.op, MatchOp::Eq | MatchOp::Re)
    }

    /// Test an entry's labels. A missing key reads as the empty string, so
    /// `!=` and `!~` match entries that lack the label entirely.
    pub fn matches(&self, labels: &HashMap<String, String>) -> bool {
        let value = labels.get(&self.key).map(String::as_str).unwrap_or("");
        match self.op {
            MatchOp::Eq => value == self.value,
            MatchOp::Ne => value != self.value,
            MatchOp::Re => self.regex.as_ref().map(|re| re.is_match(value)).unwrap_or(false),
            MatchOp::Nre => !self.regex.as_ref().map(|re| re.is_match(value)).unwrap_or(false),
        }
    }
}

impl std::fmt::Display for Matcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}{}\"{}\"", self.key, self.op.as_str(), self.value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn labels(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_equality_matcher() {
        let m = Matcher::equality("service", MatchOp::Eq, "api");
        assert!(m.matches(&labels(&[("service", "api")])));
        assert!(!m.matches(&labels(&[("service", "db")])));
        assert!(!m.matches(&labels(&[])));
    }

    #[test]
    fn test_inequality_matches_missing_label() {
        let m = Matcher::equality("service", MatchOp::Ne, "api");
        assert!(!m.matches(&labels(&[("service", "api")])));
        assert!(m.matches(&labels(&[("service", "db")])));
        assert!(m.matches(&labels(&[])));
    }

    #[test]
    fn test_regex_matcher() {
        let m = Matcher::regex("service", MatchOp::Re, "^a.*").unwrap();
        assert!(m.matches(&labels(&[("service", "api")])));
        assert!(!m.matches(&labels(&[("service", "db")])));

        let m = Matcher::regex("service", MatchOp::Nre, "^a.*").unwrap();
        assert!(!m.matches(&labels(&[("service", "api")])));
        assert!(m.matches(&labels(&[])));
    }

    #[test]
    fn test_invalid_regex_rejected() {
        assert!(Matcher::regex("service", MatchOp::Re, "[invalid").is_err());
    }

    #[test]
    fn test_display() {
        let m = Matcher::equality("service", MatchOp::Ne, "api");
        assert_eq!(m.to_string(), "service!=\"api\"");
    }
}
