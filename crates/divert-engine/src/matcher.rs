//! URL matching shared by the native compiler, the shim and the rule tester.
//!
//! Every consumer goes through [`matches`] / [`CompiledMatch`], so "does this
//! rule match this URL" has a single answer regardless of which enforcement
//! path asks.

use crate::config::{MatchKind, MatchSpec};
use regex::Regex;

/// Pre-compiled form of a [`MatchSpec`].
///
/// Compiling never fails: a pattern that does not compile becomes
/// [`CompiledMatch::Never`] (fail-closed).
#[derive(Debug, Clone)]
pub enum CompiledMatch {
    Substring(String),
    Pattern(Regex),
    Never,
}

impl CompiledMatch {
    pub fn compile(spec: &MatchSpec) -> Self {
        if spec.value.is_empty() {
            return CompiledMatch::Never;
        }
        match spec.kind {
            MatchKind::Substring => CompiledMatch::Substring(spec.value.clone()),
            MatchKind::Wildcard => Regex::new(&wildcard_to_regex(&spec.value))
                .map(CompiledMatch::Pattern)
                .unwrap_or(CompiledMatch::Never),
            MatchKind::Regex => Regex::new(&spec.value)
                .map(CompiledMatch::Pattern)
                .unwrap_or(CompiledMatch::Never),
        }
    }

    pub fn is_match(&self, url: &str) -> bool {
        match self {
            CompiledMatch::Substring(needle) => url.contains(needle.as_str()),
            CompiledMatch::Pattern(regex) => regex.is_match(url),
            CompiledMatch::Never => false,
        }
    }
}

/// Test `url` against `spec`. Never panics; invalid patterns do not match.
pub fn matches(url: &str, spec: &MatchSpec) -> bool {
    CompiledMatch::compile(spec).is_match(url)
}

/// Translate a wildcard pattern into an anchored regex.
///
/// Every metacharacter except `*` is escaped and each `*` becomes `.*`.
pub fn wildcard_to_regex(pattern: &str) -> String {
    let body = pattern
        .split('*')
        .map(regex::escape)
        .collect::<Vec<_>>()
        .join(".*");
    format!("^{body}$")
}

/// Method predicate: `*` (or empty) accepts any verb, otherwise ASCII
/// case-insensitive equality.
pub fn method_matches(rule_method: &str, method: &str) -> bool {
    let rule_method = rule_method.trim();
    rule_method.is_empty() || rule_method == "*" || rule_method.eq_ignore_ascii_case(method)
}
