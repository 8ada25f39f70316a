//! Rule, group and snapshot records as stored by the rule store.
//!
//! The JSON shape mirrors what the rule editor persists: camelCase keys, a flat
//! `action` record whose populated fields depend on the rule `type`, and
//! optional fields that fall back to the editor's defaults.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use tracing::warn;

/// Stable rule identifier. Also used as the native directive id, so it must be >= 1.
pub type RuleId = u32;

/// Full state handed over by the rule store.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RuleSnapshot {
    /// Global switch. When false no rule is enforced by either backend.
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Rules that fail to parse are dropped individually; see [`lenient_rules`].
    #[serde(default, deserialize_with = "lenient_rules")]
    pub rules: Vec<Rule>,
    #[serde(default)]
    pub groups: Vec<Group>,
}

/// Parse each stored rule on its own so one malformed record (a fractional
/// delay, an out-of-range status code) only excludes that rule.
fn lenient_rules<'de, D>(deserializer: D) -> Result<Vec<Rule>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<Vec<Value>>::deserialize(deserializer)?.unwrap_or_default();
    let rules = raw
        .into_iter()
        .enumerate()
        .filter_map(|(index, value)| match Rule::deserialize(&value) {
            Ok(rule) => Some(rule),
            Err(e) => {
                let id = value.get("id").map_or_else(|| "?".to_string(), Value::to_string);
                warn!("Dropping malformed rule #{} (id {}): {}", index, id, e);
                None
            }
        })
        .collect();
    Ok(rules)
}

impl Default for RuleSnapshot {
    fn default() -> Self {
        Self {
            enabled: true,
            rules: Vec::new(),
            groups: Vec::new(),
        }
    }
}

impl RuleSnapshot {
    pub fn rule(&self, id: RuleId) -> Option<&Rule> {
        self.rules.iter().find(|r| r.id == id)
    }

    pub fn group(&self, id: &str) -> Option<&Group> {
        self.groups.iter().find(|g| g.id == id)
    }

    /// Next free rule id (max + 1, starting at 1).
    pub fn next_rule_id(&self) -> RuleId {
        self.rules.iter().map(|r| r.id).max().map_or(1, |max| max + 1)
    }

    /// Delete a group and ungroup its members.
    ///
    /// Member rules keep their own `enabled` flag; they are never removed or
    /// disabled as a side effect. Returns the number of rules that were ungrouped.
    pub fn delete_group(&mut self, group_id: &str) -> usize {
        self.groups.retain(|g| g.id != group_id);
        let mut ungrouped = 0;
        for rule in &mut self.rules {
            if rule.group_id.as_deref() == Some(group_id) {
                rule.group_id = None;
                ungrouped += 1;
            }
        }
        ungrouped
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Group {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default = "default_true")]
    pub enabled: bool,
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Rule {
    pub id: RuleId,
    #[serde(default)]
    pub name: String,
    /// Weak reference to a [`Group`]; `None` means ungrouped.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group_id: Option<String>,
    #[serde(rename = "type")]
    pub rule_type: RuleType,
    /// Ascending: 1 wins over 2. Ties keep the stored order.
    #[serde(default = "default_priority")]
    pub priority: i64,
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// HTTP verb or `*`.
    #[serde(default = "default_method")]
    pub method: String,
    #[serde(rename = "match")]
    pub match_spec: MatchSpec,
    #[serde(default)]
    pub action: RuleAction,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RuleType {
    Redirect,
    Block,
    Headers,
    Mock,
    Intercept,
}

impl RuleType {
    pub fn as_str(&self) -> &'static str {
        match self {
            RuleType::Redirect => "redirect",
            RuleType::Block => "block",
            RuleType::Headers => "headers",
            RuleType::Mock => "mock",
            RuleType::Intercept => "intercept",
        }
    }
}

impl std::fmt::Display for RuleType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct MatchSpec {
    #[serde(rename = "type", alias = "kind", default)]
    pub kind: MatchKind,
    #[serde(default)]
    pub value: String,
}

impl MatchSpec {
    pub fn substring(value: impl Into<String>) -> Self {
        Self {
            kind: MatchKind::Substring,
            value: value.into(),
        }
    }

    pub fn wildcard(value: impl Into<String>) -> Self {
        Self {
            kind: MatchKind::Wildcard,
            value: value.into(),
        }
    }

    pub fn regex(value: impl Into<String>) -> Self {
        Self {
            kind: MatchKind::Regex,
            value: value.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchKind {
    /// Literal, case-sensitive containment. Stored as `string` by older editors.
    #[default]
    #[serde(alias = "string")]
    Substring,
    Wildcard,
    Regex,
}

/// Persisted action record.
///
/// Only the fields belonging to the rule's type are consulted; everything else
/// is ignored even when present.
#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RuleAction {
    // redirect
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mode: Option<RedirectMode>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub redirect_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub find: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub replace: Option<String>,

    // headers
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub request_headers: Vec<HeaderRule>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub response_headers: Vec<HeaderRule>,

    // mock
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mock: Option<MockAction>,

    // intercept
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request: Option<InterceptRequest>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response: Option<InterceptResponse>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RedirectMode {
    #[default]
    Url,
    Replace,
}

/// One header rewrite row: `{header, operation, value?}`.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct HeaderRule {
    pub header: String,
    #[serde(default)]
    pub operation: HeaderOperation,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
}

impl HeaderRule {
    pub fn set(header: impl Into<String>, value: Option<&str>) -> Self {
        Self {
            header: header.into(),
            operation: HeaderOperation::Set,
            value: value.map(str::to_string),
        }
    }

    pub fn remove(header: impl Into<String>) -> Self {
        Self {
            header: header.into(),
            operation: HeaderOperation::Remove,
            value: None,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HeaderOperation {
    #[default]
    Set,
    Remove,
    Append,
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct MockAction {
    #[serde(default = "default_status")]
    pub status_code: u16,
    #[serde(default = "default_content_type")]
    pub content_type: String,
    #[serde(default)]
    pub body: String,
    /// Milliseconds. Any positive delay moves the rule to the shim.
    #[serde(default)]
    pub delay: u64,
}

impl Default for MockAction {
    fn default() -> Self {
        Self {
            status_code: default_status(),
            content_type: default_content_type(),
            body: String::new(),
            delay: 0,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct InterceptRequest {
    #[serde(default)]
    pub mode: RequestMode,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    /// Header overrides as a JSON object (`null` deletes) or a list of
    /// [`HeaderRule`] rows. Kept raw so malformed stored data fails open.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub headers: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct InterceptResponse {
    #[serde(default)]
    pub mode: ResponseMode,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status_code: Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub headers: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<String>,
    #[serde(default)]
    pub delay: u64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RequestMode {
    #[default]
    Pass,
    Modify,
    Block,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ResponseMode {
    #[default]
    Pass,
    Modify,
    Mock,
}

fn default_true() -> bool {
    true
}

fn default_priority() -> i64 {
    1
}

fn default_method() -> String {
    "*".to_string()
}

fn default_status() -> u16 {
    200
}

fn default_content_type() -> String {
    "application/json".to_string()
}
