//! Error types for the engine.

use crate::config::{RuleId, RuleType};

/// A rule's action record does not carry what its type requires.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ActionError {
    #[error("redirect rule has no redirectUrl")]
    MissingRedirectUrl,
    #[error("replace redirect requires a non-empty find string")]
    EmptyFind,
    #[error("mock rule has no mock action")]
    MissingMock,
}

/// Why a single rule was left out of the native directive set.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CompileError {
    #[error("rule id must be >= 1")]
    InvalidId,
    #[error("rule id {0} is used more than once")]
    DuplicateId(RuleId),
    #[error("match value is empty")]
    EmptyMatch,
    #[error("{0} rule needs the runtime shim")]
    ShimOnly(RuleType),
    #[error("malformed action: {0}")]
    Action(#[from] ActionError),
    #[error("header rule needs at least one request or response row")]
    NoHeaderRows,
    #[error("invalid regex filter: {0}")]
    InvalidRegex(String),
}

impl CompileError {
    /// Short label used for metrics.
    pub fn reason(&self) -> &'static str {
        match self {
            CompileError::InvalidId => "invalid_id",
            CompileError::DuplicateId(_) => "duplicate_id",
            CompileError::EmptyMatch => "empty_match",
            CompileError::ShimOnly(_) => "shim_only",
            CompileError::Action(_) => "malformed_action",
            CompileError::NoHeaderRows => "no_header_rows",
            CompileError::InvalidRegex(_) => "invalid_regex",
        }
    }
}

/// Rejection from the declarative filtering backend. A rejected update
/// leaves the previously installed directive set active.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BackendError {
    #[error("directive id {0} appears more than once")]
    DuplicateId(RuleId),
    #[error("directive {id} has an invalid regexFilter: {message}")]
    InvalidRegex { id: RuleId, message: String },
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("failed to access rule store: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid rule snapshot: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Failure of a forwarded call, passed through to the caller unchanged.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    #[error("network error: {0}")]
    Network(String),
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ShimError {
    /// Deliberately generic; the matching rule is only recorded in the audit log.
    #[error("request blocked")]
    Blocked,
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error("invalid call state: {0}")]
    InvalidState(&'static str),
}

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error(transparent)]
    Backend(#[from] BackendError),
    #[error(transparent)]
    Store(#[from] StoreError),
}
