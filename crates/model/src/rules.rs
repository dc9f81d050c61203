//! Ordered allow/deny path rules.
//!
//! A user's rules decide whether a canonical, scope-relative path is
//! reachable at all. Rules are evaluated in order and the **last** rule whose
//! pattern matches decides the verdict; when no rule matches the path is
//! allowed.
//!
//! Rules are persisted as `{ "allow": bool, "path": string, "regex": bool }`.

use std::fmt;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::ModelError;

/// What a rule matches against.
#[derive(Clone)]
pub enum PathPattern {
    /// Matches the path itself and everything below it.
    Prefix(String),
    /// Matches any path the expression finds a match in.
    Regex(Regex),
}

impl PathPattern {
    /// Build a prefix pattern. A trailing separator is ignored.
    pub fn prefix(path: impl Into<String>) -> Self {
        let mut path = path.into();
        while path.len() > 1 && path.ends_with('/') {
            path.pop();
        }
        PathPattern::Prefix(path)
    }

    /// Compile a regular expression pattern.
    pub fn regex(expr: &str) -> Result<Self, ModelError> {
        Regex::new(expr)
            .map(PathPattern::Regex)
            .map_err(|e| ModelError::InvalidPattern {
                pattern: expr.to_string(),
                reason: e.to_string(),
            })
    }

    /// The pattern's source text.
    pub fn as_str(&self) -> &str {
        match self {
            PathPattern::Prefix(p) => p,
            PathPattern::Regex(r) => r.as_str(),
        }
    }

    /// Check the pattern against a canonical path.
    ///
    /// Prefixes match whole segments: `/a` matches `/a` and `/a/b` but not `/ab`.
    pub fn matches(&self, path: &str) -> bool {
        match self {
            PathPattern::Prefix(prefix) => {
                if prefix == "/" {
                    return path.starts_with('/');
                }
                match path.strip_prefix(prefix.as_str()) {
                    Some(rest) => rest.is_empty() || rest.starts_with('/'),
                    None => false,
                }
            }
            PathPattern::Regex(regex) => regex.is_match(path),
        }
    }
}

impl fmt::Debug for PathPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PathPattern::Prefix(p) => f.debug_tuple("Prefix").field(p).finish(),
            PathPattern::Regex(r) => f.debug_tuple("Regex").field(&r.as_str()).finish(),
        }
    }
}

impl PartialEq for PathPattern {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (PathPattern::Prefix(a), PathPattern::Prefix(b)) => a == b,
            (PathPattern::Regex(a), PathPattern::Regex(b)) => a.as_str() == b.as_str(),
            _ => false,
        }
    }
}

/// A single allow or deny rule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RuleRecord", into = "RuleRecord")]
pub enum Rule {
    /// Paths matching the pattern are reachable.
    Allow(PathPattern),
    /// Paths matching the pattern are not reachable.
    Deny(PathPattern),
}

impl Rule {
    /// The rule's pattern.
    pub fn pattern(&self) -> &PathPattern {
        match self {
            Rule::Allow(p) | Rule::Deny(p) => p,
        }
    }

    /// Whether a match grants access.
    pub fn allows(&self) -> bool {
        matches!(self, Rule::Allow(_))
    }

    /// The rule's verdict for `path`, or `None` if it does not match.
    pub fn verdict(&self, path: &str) -> Option<bool> {
        self.pattern().matches(path).then(|| self.allows())
    }
}

/// Decide whether `path` is reachable under `rules`.
///
/// The last matching rule wins. With no match the path is allowed.
pub fn is_allowed(path: &str, rules: &[Rule]) -> bool {
    rules
        .iter()
        .rev()
        .find_map(|rule| rule.verdict(path))
        .unwrap_or(true)
}

/// Persisted form of a rule.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct RuleRecord {
    allow: bool,
    path: String,
    #[serde(default)]
    regex: bool,
}

impl TryFrom<RuleRecord> for Rule {
    type Error = ModelError;

    fn try_from(record: RuleRecord) -> Result<Self, Self::Error> {
        let pattern = if record.regex {
            PathPattern::regex(&record.path)?
        } else {
            PathPattern::prefix(record.path)
        };

        Ok(if record.allow {
            Rule::Allow(pattern)
        } else {
            Rule::Deny(pattern)
        })
    }
}

impl From<Rule> for RuleRecord {
    fn from(rule: Rule) -> Self {
        let allow = rule.allows();
        let (path, regex) = match rule.pattern() {
            PathPattern::Prefix(p) => (p.clone(), false),
            PathPattern::Regex(r) => (r.as_str().to_string(), true),
        };
        RuleRecord { allow, path, regex }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn deny(path: &str) -> Rule {
        Rule::Deny(PathPattern::prefix(path))
    }

    fn allow(path: &str) -> Rule {
        Rule::Allow(PathPattern::prefix(path))
    }

    #[test]
    fn test_no_rules_allows_everything() {
        assert!(is_allowed("/", &[]));
        assert!(is_allowed("/any/where", &[]));
    }

    #[test]
    fn test_prefix_matches_segments() {
        let pattern = PathPattern::prefix("/private");
        assert!(pattern.matches("/private"));
        assert!(pattern.matches("/private/notes.txt"));
        assert!(!pattern.matches("/privateer"));
        assert!(!pattern.matches("/public"));
    }

    #[test]
    fn test_prefix_trailing_separator_ignored() {
        let pattern = PathPattern::prefix("/private/");
        assert_eq!(pattern.as_str(), "/private");
        assert!(pattern.matches("/private/a"));
    }

    #[test]
    fn test_root_prefix_matches_all() {
        let pattern = PathPattern::prefix("/");
        assert!(pattern.matches("/"));
        assert!(pattern.matches("/a/b"));
    }

    #[test]
    fn test_deny_rule() {
        let rules = vec![deny("/secret")];
        assert!(!is_allowed("/secret", &rules));
        assert!(!is_allowed("/secret/key.pem", &rules));
        assert!(is_allowed("/docs", &rules));
    }

    #[test]
    fn test_last_match_wins() {
        // Deny everything, then re-allow a subtree.
        let rules = vec![deny("/"), allow("/shared")];
        assert!(is_allowed("/shared/file.txt", &rules));
        assert!(!is_allowed("/home", &rules));

        // Reversed order: the broad deny comes last and wins.
        let rules = vec![allow("/shared"), deny("/")];
        assert!(!is_allowed("/shared/file.txt", &rules));
    }

    #[test]
    fn test_regex_rule() {
        let rules = vec![Rule::Deny(PathPattern::regex(r"/\.").unwrap())];
        assert!(!is_allowed("/.git/config", &rules));
        assert!(!is_allowed("/dir/.env", &rules));
        assert!(is_allowed("/dir/env", &rules));
    }

    #[test]
    fn test_invalid_regex() {
        let result = PathPattern::regex("(unclosed");
        assert!(matches!(result, Err(ModelError::InvalidPattern { .. })));
    }

    #[test]
    fn test_rule_serialization() {
        let rule = Rule::Deny(PathPattern::regex(r"\.bak$").unwrap());
        let json = serde_json::to_value(&rule).unwrap();
        assert_eq!(json["allow"], false);
        assert_eq!(json["path"], r"\.bak$");
        assert_eq!(json["regex"], true);

        let restored: Rule = serde_json::from_value(json).unwrap();
        assert_eq!(restored, rule);
    }

    #[test]
    fn test_rule_deserialization_defaults_to_prefix() {
        let rule: Rule = serde_json::from_str(r#"{"allow": true, "path": "/pub"}"#).unwrap();
        assert_eq!(rule, allow("/pub"));
    }

    #[test]
    fn test_rule_deserialization_rejects_bad_regex() {
        let result: Result<Rule, _> =
            serde_json::from_str(r#"{"allow": false, "path": "[", "regex": true}"#);
        assert!(result.is_err());
    }
}
