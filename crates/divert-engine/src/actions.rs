//! Action semantics shared by the native compiler and the shim.
//!
//! Both enforcement paths derive their behavior from the functions here, so a
//! behavior expressible by both (block, URL rewrite, header rewrite, mocked
//! body) comes out the same on either path.
//!
//! # Header overrides
//!
//! Overrides are [`HeaderRule`] rows. `set` with a value upserts the header as
//! a string, `set` without a value (JSON `null` or absent) deletes it,
//! `remove` deletes it and `append` adds another value.
//!
//! # Body templates
//!
//! A response body template containing [`BODY_TOKEN`] has the token replaced
//! by the real response body; a template without the token replaces the body
//! outright.

use crate::config::{
    HeaderOperation, HeaderRule, InterceptRequest, InterceptResponse, MockAction, RedirectMode,
    RequestMode, ResponseMode, Rule, RuleType,
};
use crate::error::ActionError;
use crate::request::OutgoingRequest;
use crate::response::{InterceptedResponse, ResponseBuilder};
use hyper::header::{CONTENT_LENGTH, CONTENT_TYPE};
use hyper::http::{HeaderName, HeaderValue};
use hyper::HeaderMap;
use serde_json::Value;
use std::str::FromStr;
use std::time::Duration;
use tracing::debug;

/// Placeholder substituted with the real response body.
pub const BODY_TOKEN: &str = "{{body}}";

/// The one action variant that applies to a rule, given its type.
#[derive(Debug, Clone, PartialEq)]
pub enum EffectiveAction {
    Block,
    Redirect(RedirectTarget),
    Headers {
        request: Vec<HeaderRule>,
        response: Vec<HeaderRule>,
    },
    Mock(MockAction),
    Intercept(CallPlan),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RedirectTarget {
    Url(String),
    Replace { find: String, replace: String },
}

/// Pick the action variant for the rule's type, ignoring unrelated fields.
pub fn resolve_action(rule: &Rule) -> Result<EffectiveAction, ActionError> {
    let action = &rule.action;
    match rule.rule_type {
        RuleType::Block => Ok(EffectiveAction::Block),
        RuleType::Redirect => match action.mode.unwrap_or_default() {
            RedirectMode::Url => match action.redirect_url.as_deref().map(str::trim) {
                Some(url) if !url.is_empty() => {
                    Ok(EffectiveAction::Redirect(RedirectTarget::Url(url.to_string())))
                }
                _ => Err(ActionError::MissingRedirectUrl),
            },
            RedirectMode::Replace => match action.find.as_deref() {
                Some(find) if !find.is_empty() => {
                    Ok(EffectiveAction::Redirect(RedirectTarget::Replace {
                        find: find.to_string(),
                        replace: action.replace.clone().unwrap_or_default(),
                    }))
                }
                _ => Err(ActionError::EmptyFind),
            },
        },
        RuleType::Headers => Ok(EffectiveAction::Headers {
            request: action.request_headers.clone(),
            response: action.response_headers.clone(),
        }),
        RuleType::Mock => action
            .mock
            .clone()
            .map(EffectiveAction::Mock)
            .ok_or(ActionError::MissingMock),
        RuleType::Intercept => Ok(EffectiveAction::Intercept(intercept_plan(
            action.request.as_ref(),
            action.response.as_ref(),
        ))),
    }
}

/// What the shim does with one call: request effect, response effect and the
/// delay consumed before dispatch.
#[derive(Debug, Clone, PartialEq)]
pub struct CallPlan {
    pub request: RequestPlan,
    pub response: ResponsePlan,
    pub delay: Duration,
}

impl CallPlan {
    pub fn pass() -> Self {
        Self {
            request: RequestPlan::Pass,
            response: ResponsePlan::Pass,
            delay: Duration::ZERO,
        }
    }
}

/// Build the shim plan for a rule.
///
/// Only mock and intercept rules are routed to the shim; a block rule still
/// maps to a blocking plan, the remaining native-only types pass through.
pub fn call_plan(rule: &Rule) -> Result<CallPlan, ActionError> {
    match resolve_action(rule)? {
        EffectiveAction::Intercept(plan) => Ok(plan),
        EffectiveAction::Mock(mock) => Ok(CallPlan {
            request: RequestPlan::Pass,
            response: ResponsePlan::Mock(MockResponse {
                status: mock.status_code,
                headers: vec![HeaderRule::set(
                    CONTENT_TYPE.as_str(),
                    Some(mock.content_type.as_str()),
                )],
                body: mock.body,
            }),
            delay: Duration::from_millis(mock.delay),
        }),
        EffectiveAction::Block => Ok(CallPlan {
            request: RequestPlan::Block,
            ..CallPlan::pass()
        }),
        EffectiveAction::Redirect(_) | EffectiveAction::Headers { .. } => Ok(CallPlan::pass()),
    }
}

fn intercept_plan(
    request: Option<&InterceptRequest>,
    response: Option<&InterceptResponse>,
) -> CallPlan {
    let request_plan = match request {
        None => RequestPlan::Pass,
        Some(req) => match req.mode {
            RequestMode::Pass => RequestPlan::Pass,
            RequestMode::Block => RequestPlan::Block,
            RequestMode::Modify => RequestPlan::Modify(RequestModification {
                url: req
                    .url
                    .as_deref()
                    .map(str::trim)
                    .filter(|u| !u.is_empty())
                    .map(str::to_string),
                headers: req
                    .headers
                    .as_ref()
                    .map(parse_header_overrides)
                    .unwrap_or_default(),
                body: req.body.clone(),
            }),
        },
    };

    let response_plan = match response {
        None => ResponsePlan::Pass,
        Some(resp) => {
            let headers = resp
                .headers
                .as_ref()
                .map(parse_header_overrides)
                .unwrap_or_default();
            match resp.mode {
                ResponseMode::Pass => ResponsePlan::Pass,
                ResponseMode::Mock => ResponsePlan::Mock(MockResponse {
                    status: resp.status_code.unwrap_or(200),
                    headers,
                    body: resp.body.clone().unwrap_or_default(),
                }),
                ResponseMode::Modify => ResponsePlan::Modify(ResponseModification {
                    status: resp.status_code,
                    headers,
                    body_template: resp.body.clone(),
                }),
            }
        }
    };

    CallPlan {
        request: request_plan,
        response: response_plan,
        delay: Duration::from_millis(response.map_or(0, |r| r.delay)),
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum RequestPlan {
    Pass,
    Block,
    Modify(RequestModification),
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct RequestModification {
    pub url: Option<String>,
    pub headers: Vec<HeaderRule>,
    pub body: Option<String>,
}

/// Result of applying a request plan to an outgoing call.
#[derive(Debug, Clone, PartialEq)]
pub enum RequestOutcome {
    Blocked,
    Dispatch(OutgoingRequest),
}

impl RequestPlan {
    pub fn is_block(&self) -> bool {
        matches!(self, RequestPlan::Block)
    }

    /// New target URL, if the plan rewrites it.
    pub fn rewritten_url(&self) -> Option<&str> {
        match self {
            RequestPlan::Modify(m) => m.url.as_deref(),
            _ => None,
        }
    }

    pub fn apply(&self, mut request: OutgoingRequest) -> RequestOutcome {
        match self {
            RequestPlan::Pass => RequestOutcome::Dispatch(request),
            RequestPlan::Block => RequestOutcome::Blocked,
            RequestPlan::Modify(modification) => {
                if let Some(url) = &modification.url {
                    request.url = url.clone();
                }
                apply_header_overrides(&mut request.headers, &modification.headers);
                if let Some(body) = &modification.body {
                    request.body = Some(body.clone().into());
                }
                RequestOutcome::Dispatch(request)
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ResponsePlan {
    Pass,
    Mock(MockResponse),
    Modify(ResponseModification),
}

#[derive(Debug, Clone, PartialEq)]
pub struct MockResponse {
    pub status: u16,
    pub headers: Vec<HeaderRule>,
    pub body: String,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResponseModification {
    pub status: Option<u16>,
    pub headers: Vec<HeaderRule>,
    pub body_template: Option<String>,
}

impl ResponsePlan {
    /// Fabricated response when the plan bypasses the network.
    pub fn mock_response(&self) -> Option<InterceptedResponse> {
        match self {
            ResponsePlan::Mock(mock) => {
                let mut headers = HeaderMap::new();
                apply_header_overrides(&mut headers, &mock.headers);
                Some(
                    ResponseBuilder::from_status(mock.status)
                        .headers(headers)
                        .body(mock.body.clone())
                        .build(),
                )
            }
            _ => None,
        }
    }

    /// Post-process a real response. Pass and mock plans return it unchanged.
    pub fn apply(&self, response: InterceptedResponse) -> InterceptedResponse {
        let ResponsePlan::Modify(modification) = self else {
            return response;
        };

        let (status, mut headers, body) = response.into_parts();
        apply_header_overrides(&mut headers, &modification.headers);

        let builder = match modification.status {
            Some(code) => ResponseBuilder::from_status(code),
            None => ResponseBuilder::new(status),
        };

        let body = match &modification.body_template {
            Some(template) => {
                headers.remove(CONTENT_LENGTH);
                apply_body_template(template, &String::from_utf8_lossy(&body)).into()
            }
            None => body,
        };

        builder.headers(headers).body(body).build()
    }
}

/// Substitute the first [`BODY_TOKEN`] with `original`, or replace outright.
pub fn apply_body_template(template: &str, original: &str) -> String {
    if template.contains(BODY_TOKEN) {
        template.replacen(BODY_TOKEN, original, 1)
    } else {
        template.to_string()
    }
}

/// Apply override rows in order. Rows with an invalid name or value are skipped.
pub fn apply_header_overrides(headers: &mut HeaderMap, overrides: &[HeaderRule]) {
    for row in overrides {
        let Ok(name) = HeaderName::from_str(row.header.trim()) else {
            debug!("Skipping header override with invalid name '{}'", row.header);
            continue;
        };
        match (row.operation, row.value.as_deref()) {
            (HeaderOperation::Remove, _) | (HeaderOperation::Set, None) => {
                headers.remove(&name);
            }
            (HeaderOperation::Set, Some(value)) => {
                if let Ok(value) = HeaderValue::from_str(value) {
                    headers.insert(name, value);
                }
            }
            (HeaderOperation::Append, Some(value)) => {
                if let Ok(value) = HeaderValue::from_str(value) {
                    headers.append(name, value);
                }
            }
            (HeaderOperation::Append, None) => {}
        }
    }
}

/// Read stored header overrides leniently.
///
/// Accepts a JSON object (`{"X": "v", "Y": null}`), a list of [`HeaderRule`]
/// rows, or either of those encoded as JSON text. Anything else, including
/// text that does not parse, yields no overrides.
pub fn parse_header_overrides(value: &Value) -> Vec<HeaderRule> {
    match value {
        Value::Object(map) => map
            .iter()
            .map(|(name, v)| match v {
                Value::Null => HeaderRule::set(name.as_str(), None),
                Value::String(s) => HeaderRule::set(name.as_str(), Some(s.as_str())),
                other => HeaderRule::set(name.as_str(), Some(other.to_string().as_str())),
            })
            .collect(),
        Value::Array(rows) => rows
            .iter()
            .filter_map(|row| serde_json::from_value::<HeaderRule>(row.clone()).ok())
            .collect(),
        Value::String(text) if text.trim().is_empty() => Vec::new(),
        Value::String(text) => match serde_json::from_str::<Value>(text) {
            Ok(parsed @ (Value::Object(_) | Value::Array(_))) => parse_header_overrides(&parsed),
            _ => {
                debug!("Ignoring malformed header overrides");
                Vec::new()
            }
        },
        _ => Vec::new(),
    }
}

/// `data:` URI standing in for a mocked response on the native path.
pub fn mock_data_uri(mock: &MockAction) -> String {
    format!(
        "data:{},{}",
        mock.content_type,
        urlencoding::encode(&mock.body)
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{MatchSpec, RuleAction};
    use hyper::StatusCode;
    use serde_json::json;

    fn rule_with(rule_type: RuleType, action: RuleAction) -> Rule {
        Rule {
            id: 1,
            name: "r".into(),
            group_id: None,
            rule_type,
            priority: 1,
            enabled: true,
            method: "*".into(),
            match_spec: MatchSpec::substring("x"),
            action,
        }
    }

    #[test]
    fn test_set_null_deletes_header() {
        let mut headers = HeaderMap::new();
        headers.insert("x", HeaderValue::from_static("old"));
        apply_header_overrides(&mut headers, &[HeaderRule::set("X", None)]);
        assert!(headers.get("x").is_none());
    }

    #[test]
    fn test_set_value_upserts_header() {
        let mut headers = HeaderMap::new();
        apply_header_overrides(&mut headers, &[HeaderRule::set("X", Some("v"))]);
        assert_eq!(headers.get("x").unwrap(), "v");

        apply_header_overrides(&mut headers, &[HeaderRule::set("X", Some("w"))]);
        assert_eq!(headers.get_all("x").iter().count(), 1);
        assert_eq!(headers.get("x").unwrap(), "w");
    }

    #[test]
    fn test_append_and_remove() {
        let mut headers = HeaderMap::new();
        headers.insert("accept", HeaderValue::from_static("text/html"));
        apply_header_overrides(
            &mut headers,
            &[
                HeaderRule {
                    header: "Accept".into(),
                    operation: HeaderOperation::Append,
                    value: Some("application/json".into()),
                },
                HeaderRule::remove("cookie"),
            ],
        );
        assert_eq!(headers.get_all("accept").iter().count(), 2);
        assert!(headers.get("cookie").is_none());
    }

    #[test]
    fn test_parse_object_overrides() {
        let rows = parse_header_overrides(&json!({"X-A": "1", "X-B": null, "X-C": 5}));
        assert_eq!(rows.len(), 3);
        assert!(rows.contains(&HeaderRule::set("X-A", Some("1"))));
        assert!(rows.contains(&HeaderRule::set("X-B", None)));
        assert!(rows.contains(&HeaderRule::set("X-C", Some("5"))));
    }

    #[test]
    fn test_parse_row_overrides() {
        let rows = parse_header_overrides(&json!([
            {"header": "X", "operation": "set", "value": null},
            {"header": "Y", "operation": "append", "value": "v"},
            {"bogus": true}
        ]));
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0], HeaderRule::set("X", None));
    }

    #[test]
    fn test_malformed_overrides_fail_open() {
        assert!(parse_header_overrides(&json!("{not json")).is_empty());
        assert!(parse_header_overrides(&json!(42)).is_empty());
        assert_eq!(
            parse_header_overrides(&json!(r#"{"X": "1"}"#)),
            vec![HeaderRule::set("X", Some("1"))]
        );
    }

    #[test]
    fn test_body_template() {
        assert_eq!(apply_body_template("{{body}}-suffix", "X"), "X-suffix");
        assert_eq!(apply_body_template("literal", "X"), "literal");
        assert_eq!(apply_body_template("{{body}}{{body}}", "X"), "X{{body}}");
    }

    #[test]
    fn test_mock_data_uri_percent_encodes_body() {
        let mock = MockAction {
            content_type: "application/json".into(),
            body: r#"{"ok": true}"#.into(),
            ..Default::default()
        };
        assert_eq!(
            mock_data_uri(&mock),
            "data:application/json,%7B%22ok%22%3A%20true%7D"
        );
    }

    #[test]
    fn test_resolve_redirect_requires_fields() {
        let missing = rule_with(RuleType::Redirect, RuleAction::default());
        assert_eq!(resolve_action(&missing), Err(ActionError::MissingRedirectUrl));

        let empty_find = rule_with(
            RuleType::Redirect,
            RuleAction {
                mode: Some(RedirectMode::Replace),
                find: Some(String::new()),
                ..Default::default()
            },
        );
        assert_eq!(resolve_action(&empty_find), Err(ActionError::EmptyFind));
    }

    #[test]
    fn test_resolve_ignores_unrelated_fields() {
        let block = rule_with(
            RuleType::Block,
            RuleAction {
                redirect_url: Some("https://elsewhere".into()),
                mock: Some(MockAction::default()),
                ..Default::default()
            },
        );
        assert_eq!(resolve_action(&block), Ok(EffectiveAction::Block));
    }

    #[test]
    fn test_mock_plan() {
        let rule = rule_with(
            RuleType::Mock,
            RuleAction {
                mock: Some(MockAction {
                    status_code: 418,
                    content_type: "text/plain".into(),
                    body: "teapot".into(),
                    delay: 250,
                }),
                ..Default::default()
            },
        );
        let plan = call_plan(&rule).unwrap();
        assert_eq!(plan.delay, Duration::from_millis(250));
        let response = plan.response.mock_response().unwrap();
        assert_eq!(response.status(), StatusCode::IM_A_TEAPOT);
        assert_eq!(response.header("content-type"), Some("text/plain"));
        assert_eq!(response.text(), "teapot");
    }

    #[test]
    fn test_modify_response() {
        let plan = ResponsePlan::Modify(ResponseModification {
            status: Some(201),
            headers: vec![HeaderRule::set("X-Old", None), HeaderRule::set("X-New", Some("1"))],
            body_template: Some("[{{body}}]".into()),
        });
        let real = ResponseBuilder::new(StatusCode::OK)
            .header("x-old", "gone")
            .header("content-length", "2")
            .body("ok")
            .build();

        let out = plan.apply(real);
        assert_eq!(out.status(), StatusCode::CREATED);
        assert_eq!(out.text(), "[ok]");
        assert!(out.header("x-old").is_none());
        assert!(out.header("content-length").is_none());
        assert_eq!(out.header("x-new"), Some("1"));
    }

    #[test]
    fn test_modify_response_without_template_keeps_body() {
        let plan = ResponsePlan::Modify(ResponseModification::default());
        let real = ResponseBuilder::new(StatusCode::ACCEPTED).body("same").build();
        let out = plan.apply(real.clone());
        assert_eq!(out, real);
    }

    #[test]
    fn test_modify_request() {
        let plan = RequestPlan::Modify(RequestModification {
            url: Some("https://b.com/x".into()),
            headers: vec![HeaderRule::set("Authorization", None)],
            body: Some("new".into()),
        });
        let request = OutgoingRequest::get("https://a.com/x")
            .with_header("authorization", "secret")
            .with_header("accept", "*/*");
        let RequestOutcome::Dispatch(out) = plan.apply(request) else {
            panic!("expected dispatch");
        };
        assert_eq!(out.url, "https://b.com/x");
        assert!(out.header("authorization").is_none());
        assert_eq!(out.header("accept"), Some("*/*"));
        assert_eq!(out.body.as_deref(), Some(&b"new"[..]));
    }

    #[test]
    fn test_intercept_delay_comes_from_response() {
        let rule = rule_with(
            RuleType::Intercept,
            RuleAction {
                request: Some(InterceptRequest {
                    mode: RequestMode::Block,
                    ..Default::default()
                }),
                response: Some(InterceptResponse {
                    delay: 900,
                    ..Default::default()
                }),
                ..Default::default()
            },
        );
        let plan = call_plan(&rule).unwrap();
        assert!(plan.request.is_block());
        assert_eq!(plan.delay, Duration::from_millis(900));
    }
}
