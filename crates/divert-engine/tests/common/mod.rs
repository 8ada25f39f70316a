//! Shared helpers for the integration tests.
#![allow(dead_code)]

use async_trait::async_trait;
use divert_engine::config::{
    Group, InterceptRequest, InterceptResponse, MatchSpec, MockAction, Rule, RuleAction, RuleId,
    RuleType,
};
use divert_engine::error::TransportError;
use divert_engine::request::OutgoingRequest;
use divert_engine::response::{InterceptedResponse, ResponseBuilder};
use divert_engine::shim::Transport;
use hyper::StatusCode;
use parking_lot::Mutex;
use std::sync::Arc;

/// Transport that records every forwarded request and answers with a fixed
/// response (or a fixed error).
pub struct RecordingTransport {
    requests: Mutex<Vec<OutgoingRequest>>,
    outcome: Result<InterceptedResponse, TransportError>,
}

impl RecordingTransport {
    pub fn ok(status: StatusCode, body: &str) -> Arc<Self> {
        Arc::new(Self {
            requests: Mutex::new(Vec::new()),
            outcome: Ok(ResponseBuilder::new(status)
                .header("content-type", "text/plain")
                .header("x-upstream", "real")
                .header("content-length", &body.len().to_string())
                .body(body.to_string())
                .build()),
        })
    }

    pub fn failing(error: TransportError) -> Arc<Self> {
        Arc::new(Self {
            requests: Mutex::new(Vec::new()),
            outcome: Err(error),
        })
    }

    pub fn requests(&self) -> Vec<OutgoingRequest> {
        self.requests.lock().clone()
    }
}

#[async_trait]
impl Transport for RecordingTransport {
    async fn send(&self, request: OutgoingRequest) -> Result<InterceptedResponse, TransportError> {
        self.requests.lock().push(request);
        self.outcome.clone()
    }
}

pub fn rule(id: RuleId, rule_type: RuleType, match_spec: MatchSpec, action: RuleAction) -> Rule {
    Rule {
        id,
        name: format!("rule-{id}"),
        group_id: None,
        rule_type,
        priority: 1,
        enabled: true,
        method: "*".to_string(),
        match_spec,
        action,
    }
}

pub fn mock_rule(id: RuleId, value: &str, body: &str, delay: u64) -> Rule {
    rule(
        id,
        RuleType::Mock,
        MatchSpec::substring(value),
        RuleAction {
            mock: Some(MockAction {
                status_code: 200,
                content_type: "application/json".to_string(),
                body: body.to_string(),
                delay,
            }),
            ..Default::default()
        },
    )
}

pub fn intercept_rule(
    id: RuleId,
    value: &str,
    request: InterceptRequest,
    response: InterceptResponse,
) -> Rule {
    rule(
        id,
        RuleType::Intercept,
        MatchSpec::substring(value),
        RuleAction {
            request: Some(request),
            response: Some(response),
            ..Default::default()
        },
    )
}

pub fn block_rule(id: RuleId, value: &str) -> Rule {
    rule(id, RuleType::Block, MatchSpec::substring(value), RuleAction::default())
}

pub fn group(id: &str, enabled: bool) -> Group {
    Group {
        id: id.to_string(),
        name: id.to_uppercase(),
        enabled,
    }
}
