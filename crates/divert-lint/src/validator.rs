//! Checks for stored rule snapshots.
//!
//! Validation works on raw JSON rather than typed rules so that a single bad
//! field is reported with its location instead of failing the whole file.

use crate::types::{LintIssue, LintOptions, LintResult};
use regex::Regex;
use serde_json::{Map, Value};
use std::collections::HashSet;
use std::path::Path;

const RULE_TYPES: [&str; 5] = ["redirect", "block", "headers", "mock", "intercept"];
const MATCH_KINDS: [&str; 4] = ["substring", "string", "wildcard", "regex"];
const HEADER_OPERATIONS: [&str; 3] = ["set", "remove", "append"];
const REQUEST_MODES: [&str; 3] = ["pass", "modify", "block"];
const RESPONSE_MODES: [&str; 3] = ["pass", "modify", "mock"];

/// Validate a complete snapshot document `{enabled, rules[], groups[]}`.
pub fn validate_snapshot(file: &Path, snapshot: &Value, result: &mut LintResult, options: &LintOptions) {
    let Some(root) = snapshot.as_object() else {
        result.add_issue(
            LintIssue::error("E003", "Snapshot must be a JSON object", file.to_path_buf())
                .with_suggestion("Wrap the rules as {\"enabled\": true, \"rules\": [...], \"groups\": []}"),
        );
        return;
    };

    if let Some(enabled) = root.get("enabled") {
        if !enabled.is_boolean() {
            result.add_issue(
                LintIssue::error("E004", "'enabled' must be a boolean", file.to_path_buf())
                    .with_location("enabled"),
            );
        }
    }

    let groups = validate_groups(file, root.get("groups"), result);

    let rules = match root.get("rules") {
        None => return,
        Some(Value::Array(rules)) => rules,
        Some(_) => {
            result.add_issue(
                LintIssue::error("E003", "'rules' must be an array", file.to_path_buf())
                    .with_location("rules"),
            );
            return;
        }
    };

    let mut seen_ids = HashSet::new();
    for (idx, rule) in rules.iter().enumerate() {
        result.rules_checked += 1;
        validate_rule(file, rule, idx, &groups, &mut seen_ids, result, options);
    }
}

/// Collect group ids, flagging malformed and repeated entries.
fn validate_groups(file: &Path, groups: Option<&Value>, result: &mut LintResult) -> HashSet<String> {
    let mut ids = HashSet::new();
    let groups = match groups {
        None => return ids,
        Some(Value::Array(groups)) => groups,
        Some(_) => {
            result.add_issue(
                LintIssue::error("E003", "'groups' must be an array", file.to_path_buf())
                    .with_location("groups"),
            );
            return ids;
        }
    };

    for (idx, group) in groups.iter().enumerate() {
        let location = format!("groups[{idx}]");
        let Some(id) = group.get("id").and_then(Value::as_str) else {
            result.add_issue(
                LintIssue::error("E005", "Group has no string id", file.to_path_buf())
                    .with_location(location),
            );
            continue;
        };
        if !ids.insert(id.to_string()) {
            result.add_issue(
                LintIssue::warning(
                    "W004",
                    format!("Group id '{id}' is used more than once"),
                    file.to_path_buf(),
                )
                .with_location(format!("{location}.id")),
            );
        }
    }
    ids
}

/// Validate one rule record.
pub fn validate_rule(
    file: &Path,
    rule: &Value,
    idx: usize,
    groups: &HashSet<String>,
    seen_ids: &mut HashSet<i64>,
    result: &mut LintResult,
    options: &LintOptions,
) {
    let location = format!("rules[{idx}]");
    let Some(rule) = rule.as_object() else {
        result.add_issue(
            LintIssue::error("E003", "Rule must be a JSON object", file.to_path_buf())
                .with_location(location),
        );
        return;
    };

    check_id(file, rule, &location, seen_ids, result);
    check_group(file, rule, &location, groups, result);
    check_priority(file, rule, &location, result);
    check_match(file, rule, &location, result);

    let rule_type = match rule.get("type").and_then(Value::as_str) {
        Some(t) if RULE_TYPES.contains(&t) => t,
        other => {
            let message = match other {
                Some(t) => format!("Unknown rule type '{t}'"),
                None => "Rule has no type".to_string(),
            };
            result.add_issue(
                LintIssue::error("E012", message, file.to_path_buf())
                    .with_location(format!("{location}.type"))
                    .with_suggestion(format!("Use one of: {}", RULE_TYPES.join(", "))),
            );
            return;
        }
    };

    let empty = Map::new();
    let action = match rule.get("action") {
        Some(Value::Object(action)) => action,
        None | Some(Value::Null) => &empty,
        Some(_) => {
            result.add_issue(
                LintIssue::error("E003", "'action' must be an object", file.to_path_buf())
                    .with_location(format!("{location}.action")),
            );
            return;
        }
    };
    let action_location = format!("{location}.action");

    match rule_type {
        "redirect" => check_redirect(file, action, &action_location, result),
        "headers" => check_header_rows(file, action, &action_location, result),
        "mock" => check_mock(file, action, &action_location, result),
        "intercept" => check_intercept(file, action, &action_location, result),
        _ => {}
    }

    check_enforcement(file, rule_type, action, &location, result, options);
}

fn check_id(
    file: &Path,
    rule: &Map<String, Value>,
    location: &str,
    seen_ids: &mut HashSet<i64>,
    result: &mut LintResult,
) {
    match rule.get("id").and_then(Value::as_i64) {
        Some(id) if id >= 1 => {
            if !seen_ids.insert(id) {
                result.add_issue(
                    LintIssue::error(
                        "E011",
                        format!("Rule id {id} is used more than once"),
                        file.to_path_buf(),
                    )
                    .with_location(format!("{location}.id"))
                    .with_suggestion("Give every rule a unique id; the backend rejects duplicates"),
                );
            }
        }
        Some(id) => {
            result.add_issue(
                LintIssue::error("E010", format!("Rule id {id} must be >= 1"), file.to_path_buf())
                    .with_location(format!("{location}.id")),
            );
        }
        None => {
            result.add_issue(
                LintIssue::error("E010", "Rule has no integer id", file.to_path_buf())
                    .with_location(format!("{location}.id")),
            );
        }
    }
}

fn check_group(
    file: &Path,
    rule: &Map<String, Value>,
    location: &str,
    groups: &HashSet<String>,
    result: &mut LintResult,
) {
    if let Some(group_id) = rule.get("groupId").and_then(Value::as_str) {
        if !groups.contains(group_id) {
            result.add_issue(
                LintIssue::warning(
                    "W001",
                    format!("Group '{group_id}' does not exist; the rule is treated as ungrouped"),
                    file.to_path_buf(),
                )
                .with_location(format!("{location}.groupId")),
            );
        }
    }
}

fn check_priority(file: &Path, rule: &Map<String, Value>, location: &str, result: &mut LintResult) {
    let Some(priority) = rule.get("priority") else {
        return;
    };
    match priority.as_i64() {
        Some(p) if p >= 1 => {}
        Some(p) => {
            result.add_issue(
                LintIssue::warning("W002", format!("Priority {p} is below 1"), file.to_path_buf())
                    .with_location(format!("{location}.priority"))
                    .with_suggestion("Priorities start at 1; lower values win"),
            );
        }
        None => {
            result.add_issue(
                LintIssue::error("E006", "Priority must be an integer", file.to_path_buf())
                    .with_location(format!("{location}.priority")),
            );
        }
    }
}

fn check_match(file: &Path, rule: &Map<String, Value>, location: &str, result: &mut LintResult) {
    let location = format!("{location}.match");
    let Some(spec) = rule.get("match").and_then(Value::as_object) else {
        result.add_issue(
            LintIssue::error("E013", "Rule has no match specification", file.to_path_buf())
                .with_location(location),
        );
        return;
    };

    let kind = spec
        .get("type")
        .or_else(|| spec.get("kind"))
        .and_then(Value::as_str)
        .unwrap_or("substring");
    if !MATCH_KINDS.contains(&kind) {
        result.add_issue(
            LintIssue::error("E015", format!("Unknown match type '{kind}'"), file.to_path_buf())
                .with_location(format!("{location}.type"))
                .with_suggestion("Use substring, wildcard or regex"),
        );
        return;
    }

    let value = spec.get("value").and_then(Value::as_str).unwrap_or_default();
    if value.is_empty() {
        result.add_issue(
            LintIssue::error("E013", "Match value is empty", file.to_path_buf())
                .with_location(format!("{location}.value"))
                .with_suggestion("An empty match value never matches anything"),
        );
        return;
    }

    if kind == "regex" {
        if let Err(e) = Regex::new(value) {
            result.add_issue(
                LintIssue::error("E014", format!("Invalid regex: {e}"), file.to_path_buf())
                    .with_location(format!("{location}.value")),
            );
        }
    }
}

fn check_redirect(file: &Path, action: &Map<String, Value>, location: &str, result: &mut LintResult) {
    let mode = action.get("mode").and_then(Value::as_str).unwrap_or("url");
    match mode {
        "url" => {
            if non_empty_str(action.get("redirectUrl")).is_none() {
                result.add_issue(
                    LintIssue::error("E020", "Redirect rule has no redirectUrl", file.to_path_buf())
                        .with_location(format!("{location}.redirectUrl")),
                );
            }
        }
        "replace" => {
            if non_empty_str(action.get("find")).is_none() {
                result.add_issue(
                    LintIssue::error(
                        "E021",
                        "Replace redirect requires a non-empty find string",
                        file.to_path_buf(),
                    )
                    .with_location(format!("{location}.find")),
                );
            }
        }
        other => {
            result.add_issue(
                LintIssue::error("E024", format!("Unknown redirect mode '{other}'"), file.to_path_buf())
                    .with_location(format!("{location}.mode"))
                    .with_suggestion("Use 'url' or 'replace'"),
            );
        }
    }
}

fn check_header_rows(file: &Path, action: &Map<String, Value>, location: &str, result: &mut LintResult) {
    let mut rows = 0;
    for field in ["requestHeaders", "responseHeaders"] {
        let Some(list) = action.get(field) else {
            continue;
        };
        let Some(list) = list.as_array() else {
            result.add_issue(
                LintIssue::error("E022", format!("'{field}' must be an array"), file.to_path_buf())
                    .with_location(format!("{location}.{field}")),
            );
            continue;
        };
        rows += list.len();
        for (idx, row) in list.iter().enumerate() {
            check_header_row(file, row, &format!("{location}.{field}[{idx}]"), result);
        }
    }

    if rows == 0 {
        result.add_issue(
            LintIssue::error(
                "E023",
                "Header rule needs at least one request or response row",
                file.to_path_buf(),
            )
            .with_location(location.to_string()),
        );
    }
}

fn check_header_row(file: &Path, row: &Value, location: &str, result: &mut LintResult) {
    if non_empty_str(row.get("header")).is_none() {
        result.add_issue(
            LintIssue::error("E022", "Header row has no header name", file.to_path_buf())
                .with_location(location.to_string()),
        );
        return;
    }
    let operation = row.get("operation").and_then(Value::as_str).unwrap_or("set");
    if !HEADER_OPERATIONS.contains(&operation) {
        result.add_issue(
            LintIssue::error(
                "E022",
                format!("Unknown header operation '{operation}'"),
                file.to_path_buf(),
            )
            .with_location(format!("{location}.operation")),
        );
        return;
    }
    let has_value = row.get("value").is_some_and(Value::is_string);
    if operation == "append" && !has_value {
        result.add_issue(
            LintIssue::warning("W005", "Append row without a value is ignored", file.to_path_buf())
                .with_location(format!("{location}.value"))
                .with_suggestion("Give the row a value, or use 'remove' to delete the header"),
        );
    }
}

fn check_mock(file: &Path, action: &Map<String, Value>, location: &str, result: &mut LintResult) {
    let Some(mock) = action.get("mock").and_then(Value::as_object) else {
        result.add_issue(
            LintIssue::error("E025", "Mock rule has no mock action", file.to_path_buf())
                .with_location(format!("{location}.mock")),
        );
        return;
    };
    check_status(file, mock.get("statusCode"), &format!("{location}.mock.statusCode"), result);
    check_delay(file, mock.get("delay"), &format!("{location}.mock.delay"), result);
}

fn check_intercept(file: &Path, action: &Map<String, Value>, location: &str, result: &mut LintResult) {
    if let Some(request) = action.get("request").and_then(Value::as_object) {
        let location = format!("{location}.request");
        check_mode(file, request, &REQUEST_MODES, &location, result);
        check_header_overrides(file, request.get("headers"), &format!("{location}.headers"), result);
    }
    if let Some(response) = action.get("response").and_then(Value::as_object) {
        let location = format!("{location}.response");
        check_mode(file, response, &RESPONSE_MODES, &location, result);
        check_header_overrides(file, response.get("headers"), &format!("{location}.headers"), result);
        check_status(file, response.get("statusCode"), &format!("{location}.statusCode"), result);
        check_delay(file, response.get("delay"), &format!("{location}.delay"), result);
    }
}

fn check_mode(
    file: &Path,
    section: &Map<String, Value>,
    allowed: &[&str],
    location: &str,
    result: &mut LintResult,
) {
    let Some(mode) = section.get("mode") else {
        return;
    };
    match mode.as_str() {
        Some(m) if allowed.contains(&m) => {}
        _ => {
            result.add_issue(
                LintIssue::error("E026", format!("Unknown mode {mode}"), file.to_path_buf())
                    .with_location(format!("{location}.mode"))
                    .with_suggestion(format!("Use one of: {}", allowed.join(", "))),
            );
        }
    }
}

/// Header overrides are an object, a list of header rows, or text holding
/// either of those.
fn check_header_overrides(file: &Path, headers: Option<&Value>, location: &str, result: &mut LintResult) {
    let parsed;
    let value = match headers {
        None | Some(Value::Null) => return,
        Some(Value::String(text)) if text.trim().is_empty() => return,
        Some(Value::String(text)) => match serde_json::from_str::<Value>(text) {
            Ok(v) => {
                parsed = v;
                &parsed
            }
            Err(e) => {
                result.add_issue(
                    LintIssue::error(
                        "E030",
                        format!("Header overrides are not valid JSON: {e}"),
                        file.to_path_buf(),
                    )
                    .with_location(location.to_string())
                    .with_suggestion("Use a JSON object such as {\"x-debug\": \"1\"}"),
                );
                return;
            }
        },
        Some(other) => other,
    };

    match value {
        Value::Object(_) => {}
        Value::Array(rows) => {
            for (idx, row) in rows.iter().enumerate() {
                check_header_row(file, row, &format!("{location}[{idx}]"), result);
            }
        }
        _ => {
            result.add_issue(
                LintIssue::error(
                    "E030",
                    "Header overrides must be a JSON object",
                    file.to_path_buf(),
                )
                .with_location(location.to_string()),
            );
        }
    }
}

fn check_status(file: &Path, status: Option<&Value>, location: &str, result: &mut LintResult) {
    let Some(status) = status else {
        return;
    };
    if !status.as_u64().is_some_and(|s| (100..=599).contains(&s)) {
        result.add_issue(
            LintIssue::error("E027", format!("Invalid status code {status}"), file.to_path_buf())
                .with_location(location.to_string()),
        );
    }
}

fn check_delay(file: &Path, delay: Option<&Value>, location: &str, result: &mut LintResult) {
    let Some(delay) = delay else {
        return;
    };
    if delay.as_u64().is_none() {
        result.add_issue(
            LintIssue::error(
                "E031",
                format!("Delay must be a non-negative integer of milliseconds, got {delay}"),
                file.to_path_buf(),
            )
            .with_location(location.to_string()),
        );
    }
}

/// Notes on where the rule will be enforced, plus delays that will be ignored.
fn check_enforcement(
    file: &Path,
    rule_type: &str,
    action: &Map<String, Value>,
    location: &str,
    result: &mut LintResult,
    options: &LintOptions,
) {
    let mock_delay = delay_of(action.get("mock"));
    let response_delay = delay_of(action.get("response"));

    if rule_type != "mock" && mock_delay > 0 {
        result.add_issue(
            LintIssue::info(
                "I002",
                format!("Mock delay is ignored on a {rule_type} rule"),
                file.to_path_buf(),
            )
            .with_location(format!("{location}.action.mock.delay")),
        );
    }
    if rule_type != "intercept" && response_delay > 0 {
        result.add_issue(
            LintIssue::info(
                "I002",
                format!("Response delay is ignored on a {rule_type} rule"),
                file.to_path_buf(),
            )
            .with_location(format!("{location}.action.response.delay")),
        );
    }

    if !options.explain {
        return;
    }
    let note = match rule_type {
        "intercept" => Some("Intercept rules run in the runtime shim".to_string()),
        "mock" if mock_delay > 0 => Some(format!(
            "Mock delay of {mock_delay}ms moves this rule to the runtime shim"
        )),
        _ => None,
    };
    let issue = match note {
        Some(note) => LintIssue::info("I001", note, file.to_path_buf()),
        None => LintIssue::info(
            "I001",
            "Enforced by the native filtering backend",
            file.to_path_buf(),
        ),
    };
    result.add_issue(issue.with_location(location.to_string()));
}

fn delay_of(section: Option<&Value>) -> u64 {
    section
        .and_then(|s| s.get("delay"))
        .and_then(Value::as_u64)
        .unwrap_or(0)
}

fn non_empty_str(value: Option<&Value>) -> Option<&str> {
    value.and_then(Value::as_str).filter(|s| !s.is_empty())
}
