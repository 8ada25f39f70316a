//! Compiles native-classified rules into backend directives.
//!
//! Input rules must already be sorted by ascending priority (see
//! [`crate::classify::partition`]). The rule at index `i` of `n` gets backend
//! priority `n - i`, so the earliest rule takes precedence in the backend just
//! as it does in the shim.

use super::directive::{Condition, Directive, DirectiveAction, DirectiveUpdate, RedirectSpec};
use crate::actions::{mock_data_uri, resolve_action, EffectiveAction, RedirectTarget};
use crate::classify::{classify, Enforcement};
use crate::config::{
    BackendConfig, HeaderOperation, HeaderRule, MatchKind, MatchSpec, RegexValidation, Rule,
    RuleId,
};
use crate::error::CompileError;
use crate::matcher::wildcard_to_regex;
use crate::metrics;
use regex::Regex;
use std::collections::HashSet;
use tracing::{debug, warn};

/// Characters with special meaning in the backend's `urlFilter` syntax.
const URL_FILTER_SPECIALS: [char; 3] = ['*', '|', '^'];

/// A rule that was left out of the directive set.
#[derive(Debug, Clone, PartialEq)]
pub struct SkippedRule {
    pub rule_id: RuleId,
    pub name: String,
    pub error: CompileError,
}

#[derive(Debug, Clone, Default)]
pub struct CompiledSet {
    pub directives: Vec<Directive>,
    pub skipped: Vec<SkippedRule>,
}

impl CompiledSet {
    pub fn ids(&self) -> Vec<RuleId> {
        self.directives.iter().map(|d| d.id).collect()
    }
}

/// Compile every rule, skipping (and logging) the ones that cannot be
/// expressed. One bad rule never blocks the rest of the set.
pub fn compile(rules: &[Rule], config: &BackendConfig) -> CompiledSet {
    let total = rules.len();
    let mut seen = HashSet::with_capacity(total);
    let mut compiled = CompiledSet::default();

    for (index, rule) in rules.iter().enumerate() {
        let priority = (total - index) as u32;
        let result = if seen.contains(&rule.id) {
            Err(CompileError::DuplicateId(rule.id))
        } else {
            compile_rule(rule, priority, config)
        };

        match result {
            Ok(directive) => {
                seen.insert(directive.id);
                compiled.directives.push(directive);
            }
            Err(error) => {
                warn!("Skipping rule {} ('{}'): {}", rule.id, rule.name, error);
                metrics::record_compile_skip(error.reason());
                compiled.skipped.push(SkippedRule {
                    rule_id: rule.id,
                    name: rule.name.clone(),
                    error,
                });
            }
        }
    }

    debug!(
        "Compiled {} directives ({} skipped)",
        compiled.directives.len(),
        compiled.skipped.len()
    );
    compiled
}

/// Compile a single rule at the given backend priority.
pub fn compile_rule(
    rule: &Rule,
    priority: u32,
    config: &BackendConfig,
) -> Result<Directive, CompileError> {
    if rule.id < 1 {
        return Err(CompileError::InvalidId);
    }
    if rule.match_spec.value.is_empty() {
        return Err(CompileError::EmptyMatch);
    }
    if classify(rule) == Enforcement::Shim {
        return Err(CompileError::ShimOnly(rule.rule_type));
    }

    let mut condition = base_condition(rule, config);

    let action = match resolve_action(rule)? {
        EffectiveAction::Block => DirectiveAction::Block,
        EffectiveAction::Redirect(RedirectTarget::Url(url)) => DirectiveAction::Redirect {
            redirect: RedirectSpec::to_url(url),
        },
        EffectiveAction::Redirect(RedirectTarget::Replace { find, replace }) => {
            condition.url_filter = None;
            condition.regex_filter = Some(replace_regex(&rule.match_spec, &find));
            DirectiveAction::Redirect {
                redirect: RedirectSpec::substitution(format!("\\1{replace}\\2")),
            }
        }
        EffectiveAction::Headers { request, response } => {
            let request_headers = header_rows(&request);
            let response_headers = header_rows(&response);
            if request_headers.is_empty() && response_headers.is_empty() {
                return Err(CompileError::NoHeaderRows);
            }
            DirectiveAction::ModifyHeaders {
                request_headers,
                response_headers,
            }
        }
        EffectiveAction::Mock(mock) => DirectiveAction::Redirect {
            redirect: RedirectSpec::to_url(mock_data_uri(&mock)),
        },
        EffectiveAction::Intercept(_) => return Err(CompileError::ShimOnly(rule.rule_type)),
    };

    if config.regex_validation == RegexValidation::Reject {
        if let Some(pattern) = &condition.regex_filter {
            Regex::new(pattern).map_err(|e| CompileError::InvalidRegex(e.to_string()))?;
        }
    }

    Ok(Directive {
        id: rule.id,
        priority,
        condition,
        action,
    })
}

/// Diff the installed ids against a freshly compiled set: every installed id
/// is removed and the whole new set added in the same call.
pub fn build_update(installed: &[RuleId], compiled: &CompiledSet) -> DirectiveUpdate {
    DirectiveUpdate {
        remove_rule_ids: installed.to_vec(),
        add_rules: compiled.directives.clone(),
    }
}

fn base_condition(rule: &Rule, config: &BackendConfig) -> Condition {
    let value = &rule.match_spec.value;
    let (url_filter, regex_filter) = match rule.match_spec.kind {
        MatchKind::Substring if value.contains(URL_FILTER_SPECIALS) => {
            (None, Some(regex::escape(value)))
        }
        MatchKind::Substring => (Some(value.clone()), None),
        MatchKind::Wildcard => (None, Some(wildcard_to_regex(value))),
        MatchKind::Regex => (None, Some(value.clone())),
    };

    let method = rule.method.trim();
    let request_methods = if method.is_empty() || method == "*" {
        None
    } else {
        Some(vec![method.to_ascii_lowercase()])
    };

    Condition {
        url_filter,
        regex_filter,
        resource_types: config.resource_types.clone(),
        request_methods,
    }
}

/// Normalize rows the same way `apply_header_overrides` reads them: a set
/// without a value deletes the header and an append without a value is a no-op.
fn header_rows(rows: &[HeaderRule]) -> Vec<HeaderRule> {
    rows.iter()
        .filter_map(|row| match (row.operation, &row.value) {
            (HeaderOperation::Remove, _) | (HeaderOperation::Set, None) => {
                Some(HeaderRule::remove(row.header.clone()))
            }
            (HeaderOperation::Append, None) => None,
            (_, Some(_)) => Some(row.clone()),
        })
        .collect()
}

/// Regex used for a replace-mode redirect.
///
/// Group 1 captures everything before the first occurrence of `find`, group 2
/// everything after it. For regex-kind matches the match pattern is embedded
/// (anchors stripped, groups made non-capturing) so the directive still only
/// fires where the rule matches and the two capture groups stay numbered 1
/// and 2.
pub fn replace_regex(spec: &MatchSpec, find: &str) -> String {
    let escaped = regex::escape(find);
    let fragment = match spec.kind {
        MatchKind::Regex => Some(to_non_capturing(strip_anchors(&spec.value))),
        _ => None,
    };

    match fragment.filter(|f| !f.is_empty()) {
        Some(fragment) => {
            format!(r"^((?:.|\n)*?(?:{fragment})(?:.|\n)*?){escaped}((?:.|\n)*)$")
        }
        None => format!(r"^((?:.|\n)*?){escaped}((?:.|\n)*)$"),
    }
}

fn strip_anchors(pattern: &str) -> &str {
    let pattern = pattern.strip_prefix('^').unwrap_or(pattern);
    match pattern.strip_suffix('$') {
        Some(stripped) => {
            let escapes = stripped.chars().rev().take_while(|c| *c == '\\').count();
            if escapes % 2 == 0 {
                stripped
            } else {
                pattern
            }
        }
        None => pattern,
    }
}

/// Rewrite capturing groups, named ones included, as `(?:...)`.
/// Escapes and character classes are left untouched.
pub fn to_non_capturing(pattern: &str) -> String {
    let mut out = String::with_capacity(pattern.len() + 8);
    let mut chars = pattern.chars().peekable();
    let mut in_class = false;

    while let Some(c) = chars.next() {
        match c {
            '\\' => {
                out.push(c);
                if let Some(next) = chars.next() {
                    out.push(next);
                }
            }
            '[' if !in_class => {
                in_class = true;
                out.push(c);
                if chars.peek() == Some(&'^') {
                    out.push('^');
                    chars.next();
                }
                if chars.peek() == Some(&']') {
                    out.push(']');
                    chars.next();
                }
            }
            ']' if in_class => {
                in_class = false;
                out.push(c);
            }
            '(' if !in_class => {
                if chars.peek() != Some(&'?') {
                    out.push_str("(?:");
                    continue;
                }
                let lookahead: String = chars.clone().take(3).collect();
                let named = lookahead.starts_with("?P<")
                    || (lookahead.starts_with("?<")
                        && !lookahead.starts_with("?<=")
                        && !lookahead.starts_with("?<!"));
                if named {
                    for skipped in chars.by_ref() {
                        if skipped == '>' {
                            break;
                        }
                    }
                    out.push_str("(?:");
                } else {
                    out.push('(');
                }
            }
            _ => out.push(c),
        }
    }
    out
}

/// Evaluate a `regexSubstitution` against a URL the way the backend does:
/// the first match of `regex_filter` is replaced by `substitution` with
/// `\0`..`\9` expanded. Returns `None` when the filter does not match.
pub fn apply_substitution(regex_filter: &str, substitution: &str, url: &str) -> Option<String> {
    let re = Regex::new(regex_filter).ok()?;
    substitute(&re, substitution, url)
}

/// [`apply_substitution`] with an already compiled filter.
pub(crate) fn substitute(re: &Regex, substitution: &str, url: &str) -> Option<String> {
    let caps = re.captures(url)?;
    let whole = caps.get(0)?;

    let mut replaced = String::with_capacity(url.len());
    let mut chars = substitution.chars().peekable();
    while let Some(c) = chars.next() {
        if c == '\\' {
            if let Some(digit) = chars.peek().and_then(|d| d.to_digit(10)) {
                chars.next();
                if let Some(group) = caps.get(digit as usize) {
                    replaced.push_str(group.as_str());
                }
                continue;
            }
        }
        replaced.push(c);
    }

    Some(format!(
        "{}{}{}",
        &url[..whole.start()],
        replaced,
        &url[whole.end()..]
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{MockAction, RedirectMode, ResourceType, RuleAction, RuleType};

    fn rule(id: RuleId, rule_type: RuleType, spec: MatchSpec, action: RuleAction) -> Rule {
        Rule {
            id,
            name: format!("rule-{id}"),
            group_id: None,
            rule_type,
            priority: 1,
            enabled: true,
            method: "*".into(),
            match_spec: spec,
            action,
        }
    }

    fn replace_action(find: &str, replace: &str) -> RuleAction {
        RuleAction {
            mode: Some(RedirectMode::Replace),
            find: Some(find.into()),
            replace: Some(replace.into()),
            ..Default::default()
        }
    }

    fn redirect_target(directive: &Directive) -> &RedirectSpec {
        match &directive.action {
            DirectiveAction::Redirect { redirect } => redirect,
            other => panic!("expected redirect, got {other:?}"),
        }
    }

    #[test]
    fn test_priorities_follow_order() {
        let rules = vec![
            rule(3, RuleType::Block, MatchSpec::substring("a"), RuleAction::default()),
            rule(1, RuleType::Block, MatchSpec::substring("b"), RuleAction::default()),
            rule(2, RuleType::Block, MatchSpec::substring("c"), RuleAction::default()),
        ];
        let compiled = compile(&rules, &BackendConfig::default());
        let priorities: Vec<_> = compiled
            .directives
            .iter()
            .map(|d| (d.id, d.priority))
            .collect();
        assert_eq!(priorities, vec![(3, 3), (1, 2), (2, 1)]);
    }

    #[test]
    fn test_substring_condition() {
        let block = rule(1, RuleType::Block, MatchSpec::substring("ads"), RuleAction::default());
        let directive = compile_rule(&block, 1, &BackendConfig::default()).unwrap();
        assert_eq!(directive.condition.url_filter.as_deref(), Some("ads"));
        assert!(directive.condition.regex_filter.is_none());
        assert_eq!(directive.condition.resource_types, ResourceType::ALL.to_vec());
        assert!(directive.condition.request_methods.is_none());
    }

    #[test]
    fn test_substring_with_filter_syntax_becomes_regex() {
        let block = rule(1, RuleType::Block, MatchSpec::substring("a|b"), RuleAction::default());
        let directive = compile_rule(&block, 1, &BackendConfig::default()).unwrap();
        assert!(directive.condition.url_filter.is_none());
        assert_eq!(directive.condition.regex_filter.as_deref(), Some(r"a\|b"));
    }

    #[test]
    fn test_wildcard_and_regex_conditions() {
        let wildcard = rule(
            1,
            RuleType::Block,
            MatchSpec::wildcard("https://*.a.com/*"),
            RuleAction::default(),
        );
        let directive = compile_rule(&wildcard, 1, &BackendConfig::default()).unwrap();
        assert_eq!(
            directive.condition.regex_filter,
            Some(wildcard_to_regex("https://*.a.com/*"))
        );

        let regex = rule(2, RuleType::Block, MatchSpec::regex(r"^https://a\.com"), RuleAction::default());
        let directive = compile_rule(&regex, 1, &BackendConfig::default()).unwrap();
        assert_eq!(directive.condition.regex_filter.as_deref(), Some(r"^https://a\.com"));
    }

    #[test]
    fn test_method_restriction_is_lowercased() {
        let mut block = rule(1, RuleType::Block, MatchSpec::substring("a"), RuleAction::default());
        block.method = "POST".into();
        let directive = compile_rule(&block, 1, &BackendConfig::default()).unwrap();
        assert_eq!(directive.condition.request_methods, Some(vec!["post".to_string()]));
    }

    #[test]
    fn test_replace_redirect_substring() {
        let r = rule(
            1,
            RuleType::Redirect,
            MatchSpec::substring("https://a.com"),
            replace_action("a.com", "b.com"),
        );
        let directive = compile_rule(&r, 1, &BackendConfig::default()).unwrap();
        assert!(directive.condition.url_filter.is_none());
        let filter = directive.condition.regex_filter.clone().unwrap();
        let substitution = redirect_target(&directive).regex_substitution.clone().unwrap();
        assert_eq!(substitution, r"\1b.com\2");
        assert_eq!(
            apply_substitution(&filter, &substitution, "https://a.com/x").as_deref(),
            Some("https://b.com/x")
        );
    }

    #[test]
    fn test_replace_redirect_regex_keeps_groups_numbered() {
        let r = rule(
            1,
            RuleType::Redirect,
            MatchSpec::regex(r"^https://(api)\.a\.com"),
            replace_action("v1", "v2"),
        );
        let directive = compile_rule(&r, 1, &BackendConfig::default()).unwrap();
        let filter = directive.condition.regex_filter.clone().unwrap();
        let substitution = redirect_target(&directive).regex_substitution.clone().unwrap();

        assert_eq!(
            apply_substitution(&filter, &substitution, "https://api.a.com/v1/users").as_deref(),
            Some("https://api.a.com/v2/users")
        );
        assert_eq!(apply_substitution(&filter, &substitution, "https://web.a.com/v1"), None);
    }

    #[test]
    fn test_to_non_capturing() {
        assert_eq!(to_non_capturing("(a)(?:b)"), "(?:a)(?:b)");
        assert_eq!(to_non_capturing("(?P<x>a)"), "(?:a)");
        assert_eq!(to_non_capturing(r"\(a\)[(]"), r"\(a\)[(]");
        assert_eq!(to_non_capturing("(?i)a"), "(?i)a");
    }

    #[test]
    fn test_strip_anchors_respects_escapes() {
        assert_eq!(strip_anchors("^abc$"), "abc");
        assert_eq!(strip_anchors(r"abc\$"), r"abc\$");
        assert_eq!(strip_anchors(r"abc\\$"), r"abc\\");
    }

    #[test]
    fn test_zero_delay_mock_becomes_data_uri() {
        let r = rule(
            1,
            RuleType::Mock,
            MatchSpec::substring("api"),
            RuleAction {
                mock: Some(MockAction {
                    body: "hi there".into(),
                    content_type: "text/plain".into(),
                    ..Default::default()
                }),
                ..Default::default()
            },
        );
        let directive = compile_rule(&r, 1, &BackendConfig::default()).unwrap();
        assert_eq!(
            redirect_target(&directive).url.as_deref(),
            Some("data:text/plain,hi%20there")
        );
    }

    #[test]
    fn test_header_rows() {
        let r = rule(
            1,
            RuleType::Headers,
            MatchSpec::substring("a"),
            RuleAction {
                request_headers: vec![HeaderRule {
                    header: "cookie".into(),
                    operation: HeaderOperation::Remove,
                    value: Some("ignored".into()),
                }],
                ..Default::default()
            },
        );
        let directive = compile_rule(&r, 1, &BackendConfig::default()).unwrap();
        assert_eq!(
            directive.action,
            DirectiveAction::ModifyHeaders {
                request_headers: vec![HeaderRule::remove("cookie")],
                response_headers: vec![],
            }
        );

        let only_valueless_append = rule(
            2,
            RuleType::Headers,
            MatchSpec::substring("a"),
            RuleAction {
                response_headers: vec![HeaderRule {
                    header: "x-a".into(),
                    operation: HeaderOperation::Append,
                    value: None,
                }],
                ..Default::default()
            },
        );
        assert_eq!(
            compile_rule(&only_valueless_append, 1, &BackendConfig::default()),
            Err(CompileError::NoHeaderRows)
        );

        let empty = rule(3, RuleType::Headers, MatchSpec::substring("a"), RuleAction::default());
        assert_eq!(
            compile_rule(&empty, 1, &BackendConfig::default()),
            Err(CompileError::NoHeaderRows)
        );
    }

    #[test]
    fn test_set_without_value_compiles_to_remove() {
        let r = rule(
            1,
            RuleType::Headers,
            MatchSpec::substring("a"),
            RuleAction {
                request_headers: vec![HeaderRule::set("x-debug", None), HeaderRule::remove("cookie")],
                response_headers: vec![HeaderRule::set("x-served-by", Some("divert"))],
                ..Default::default()
            },
        );
        let compiled = compile(&[r.clone()], &BackendConfig::default());
        assert!(compiled.skipped.is_empty());
        assert_eq!(
            compiled.directives[0].action,
            DirectiveAction::ModifyHeaders {
                request_headers: vec![HeaderRule::remove("x-debug"), HeaderRule::remove("cookie")],
                response_headers: vec![HeaderRule::set("x-served-by", Some("divert"))],
            }
        );

        let mut headers = hyper::HeaderMap::new();
        headers.insert("x-debug", "1".parse().unwrap());
        headers.insert("cookie", "a=b".parse().unwrap());
        crate::actions::apply_header_overrides(&mut headers, &r.action.request_headers);
        assert!(headers.is_empty());
    }

    #[test]
    fn test_bad_rules_are_skipped_individually() {
        let rules = vec![
            rule(0, RuleType::Block, MatchSpec::substring("a"), RuleAction::default()),
            rule(1, RuleType::Redirect, MatchSpec::substring("a"), RuleAction::default()),
            rule(2, RuleType::Block, MatchSpec::substring(""), RuleAction::default()),
            rule(3, RuleType::Block, MatchSpec::substring("ok"), RuleAction::default()),
            rule(3, RuleType::Block, MatchSpec::substring("dup"), RuleAction::default()),
        ];
        let compiled = compile(&rules, &BackendConfig::default());
        assert_eq!(compiled.ids(), vec![3]);
        let reasons: Vec<_> = compiled.skipped.iter().map(|s| s.error.reason()).collect();
        assert_eq!(
            reasons,
            vec!["invalid_id", "malformed_action", "empty_match", "duplicate_id"]
        );
    }

    #[test]
    #[tracing_test::traced_test]
    fn test_skipped_rule_is_logged() {
        let rules = vec![rule(
            4,
            RuleType::Redirect,
            MatchSpec::substring("a"),
            RuleAction::default(),
        )];
        let compiled = compile(&rules, &BackendConfig::default());
        assert!(compiled.directives.is_empty());
        assert!(logs_contain("Skipping rule 4 ('rule-4')"));
    }

    #[test]
    fn test_regex_validation_reject() {
        let r = rule(1, RuleType::Block, MatchSpec::regex("(unclosed"), RuleAction::default());
        assert!(compile_rule(&r, 1, &BackendConfig::default()).is_ok());

        let strict = BackendConfig {
            regex_validation: RegexValidation::Reject,
            ..Default::default()
        };
        assert!(matches!(
            compile_rule(&r, 1, &strict),
            Err(CompileError::InvalidRegex(_))
        ));
    }

    #[test]
    fn test_shim_rules_are_rejected() {
        let r = rule(1, RuleType::Intercept, MatchSpec::substring("a"), RuleAction::default());
        assert_eq!(
            compile_rule(&r, 1, &BackendConfig::default()),
            Err(CompileError::ShimOnly(RuleType::Intercept))
        );
    }

    #[test]
    fn test_build_update_replaces_everything() {
        let rules = vec![rule(5, RuleType::Block, MatchSpec::substring("a"), RuleAction::default())];
        let compiled = compile(&rules, &BackendConfig::default());
        let update = build_update(&[1, 2], &compiled);
        assert_eq!(update.remove_rule_ids, vec![1, 2]);
        assert_eq!(update.add_rules.len(), 1);
        assert_eq!(update.add_rules[0].id, 5);
    }
}
