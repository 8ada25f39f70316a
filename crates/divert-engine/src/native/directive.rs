//! Directive records accepted by the declarative filtering backend.
//!
//! Serialized field names follow the backend's wire format
//! (`{id, priority, condition, action}` with camelCase keys).

use crate::config::{HeaderRule, ResourceType, RuleId};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Directive {
    pub id: RuleId,
    /// Backend precedence: larger wins.
    pub priority: u32,
    pub condition: Condition,
    pub action: DirectiveAction,
}

/// `url_filter` and `regex_filter` are mutually exclusive.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Condition {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url_filter: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub regex_filter: Option<String>,
    pub resource_types: Vec<ResourceType>,
    /// Lowercase verbs; absent means any method.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_methods: Option<Vec<String>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum DirectiveAction {
    Block,
    Redirect {
        redirect: RedirectSpec,
    },
    ModifyHeaders {
        #[serde(
            rename = "requestHeaders",
            default,
            skip_serializing_if = "Vec::is_empty"
        )]
        request_headers: Vec<HeaderRule>,
        #[serde(
            rename = "responseHeaders",
            default,
            skip_serializing_if = "Vec::is_empty"
        )]
        response_headers: Vec<HeaderRule>,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RedirectSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    /// `\1`..`\9` insert capture groups of the condition's `regex_filter`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub regex_substitution: Option<String>,
}

impl RedirectSpec {
    pub fn to_url(url: impl Into<String>) -> Self {
        Self {
            url: Some(url.into()),
            regex_substitution: None,
        }
    }

    pub fn substitution(pattern: impl Into<String>) -> Self {
        Self {
            url: None,
            regex_substitution: Some(pattern.into()),
        }
    }
}

/// One combined remove+add call. Applying it is the only way the installed
/// set changes, so there is never a moment with neither or both sets active.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DirectiveUpdate {
    pub remove_rule_ids: Vec<RuleId>,
    pub add_rules: Vec<Directive>,
}
