//! The declarative filtering backend seam.
//!
//! [`FilterBackend`] is what the engine talks to when installing directives.
//! [`MemoryBackend`] keeps the installed set in process and can evaluate it
//! against URLs, reporting matches the way a real backend would.

use super::compiler::substitute;
use super::directive::{Directive, DirectiveAction, DirectiveUpdate};
use crate::audit::RuleMatchedEvent;
use crate::config::{HeaderRule, RuleId};
use crate::error::BackendError;
use async_trait::async_trait;
use parking_lot::RwLock;
use regex::Regex;
use serde::Serialize;
use std::collections::HashSet;
use tokio::sync::broadcast;
use tracing::{debug, info};

const EVENT_CHANNEL_CAPACITY: usize = 256;

#[async_trait]
pub trait FilterBackend: Send + Sync {
    /// Ids of the directives currently installed.
    async fn installed_ids(&self) -> Result<Vec<RuleId>, BackendError>;

    /// Apply a combined remove+add update. Either the whole update takes
    /// effect or, on error, the previous set stays installed.
    async fn update_dynamic_rules(&self, update: DirectiveUpdate) -> Result<(), BackendError>;
}

/// What the backend does to a matched request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum NativeEffect {
    Block,
    Redirect(String),
    ModifyHeaders {
        request: Vec<HeaderRule>,
        response: Vec<HeaderRule>,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NativeMatch {
    pub rule_id: RuleId,
    pub effect: NativeEffect,
}

/// An installed directive with its `regexFilter` compiled once.
#[derive(Debug, Clone)]
struct InstalledDirective {
    directive: Directive,
    regex: Option<Regex>,
}

impl InstalledDirective {
    fn new(directive: Directive) -> Result<Self, BackendError> {
        let regex = match &directive.condition.regex_filter {
            Some(pattern) => Some(Regex::new(pattern).map_err(|e| BackendError::InvalidRegex {
                id: directive.id,
                message: e.to_string(),
            })?),
            None => None,
        };
        Ok(Self { directive, regex })
    }

    fn matches(&self, url: &str, method: &str) -> bool {
        let condition = &self.directive.condition;
        if let Some(methods) = &condition.request_methods {
            let method = method.to_ascii_lowercase();
            if !methods.iter().any(|m| *m == method) {
                return false;
            }
        }
        match (&condition.url_filter, &self.regex) {
            (Some(filter), _) => url.contains(filter.as_str()),
            (None, Some(re)) => re.is_match(url),
            (None, None) => true,
        }
    }

    fn effect(&self, url: &str) -> Option<NativeEffect> {
        match &self.directive.action {
            DirectiveAction::Block => Some(NativeEffect::Block),
            DirectiveAction::Redirect { redirect } => {
                match (&redirect.url, &redirect.regex_substitution) {
                    (Some(target), _) => Some(NativeEffect::Redirect(target.clone())),
                    (None, Some(substitution)) => {
                        let re = self.regex.as_ref()?;
                        substitute(re, substitution, url).map(NativeEffect::Redirect)
                    }
                    (None, None) => None,
                }
            }
            DirectiveAction::ModifyHeaders {
                request_headers,
                response_headers,
            } => Some(NativeEffect::ModifyHeaders {
                request: request_headers.clone(),
                response: response_headers.clone(),
            }),
        }
    }
}

/// In-process filtering backend.
pub struct MemoryBackend {
    installed: RwLock<Vec<InstalledDirective>>,
    events: broadcast::Sender<RuleMatchedEvent>,
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryBackend {
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            installed: RwLock::new(Vec::new()),
            events,
        }
    }

    /// Copy of the installed directive set.
    pub fn directives(&self) -> Vec<Directive> {
        self.installed
            .read()
            .iter()
            .map(|entry| entry.directive.clone())
            .collect()
    }

    /// Receive a [`RuleMatchedEvent`] for every match reported by [`Self::evaluate`].
    pub fn subscribe(&self) -> broadcast::Receiver<RuleMatchedEvent> {
        self.events.subscribe()
    }

    /// Find the winning directive for a request: highest priority first,
    /// lowest id on ties.
    pub fn evaluate(&self, url: &str, method: &str, tab_id: Option<i64>) -> Option<NativeMatch> {
        let installed = self.installed.read();
        let mut candidates: Vec<&InstalledDirective> = installed
            .iter()
            .filter(|entry| entry.matches(url, method))
            .collect();
        candidates.sort_by(|a, b| {
            b.directive
                .priority
                .cmp(&a.directive.priority)
                .then(a.directive.id.cmp(&b.directive.id))
        });

        for entry in candidates {
            let Some(effect) = entry.effect(url) else {
                continue;
            };
            let directive = &entry.directive;
            debug!("Directive {} matched {}", directive.id, url);
            // No subscribers is fine
            let _ = self.events.send(RuleMatchedEvent {
                rule_id: directive.id,
                url: url.to_string(),
                tab_id,
            });
            return Some(NativeMatch {
                rule_id: directive.id,
                effect,
            });
        }
        None
    }
}

#[async_trait]
impl FilterBackend for MemoryBackend {
    async fn installed_ids(&self) -> Result<Vec<RuleId>, BackendError> {
        Ok(self.installed.read().iter().map(|entry| entry.directive.id).collect())
    }

    async fn update_dynamic_rules(&self, update: DirectiveUpdate) -> Result<(), BackendError> {
        let mut installed = self.installed.write();

        let removed: HashSet<RuleId> = update.remove_rule_ids.iter().copied().collect();
        let mut next: Vec<InstalledDirective> = installed
            .iter()
            .filter(|entry| !removed.contains(&entry.directive.id))
            .cloned()
            .collect();
        let mut ids: HashSet<RuleId> = next.iter().map(|entry| entry.directive.id).collect();

        for directive in update.add_rules {
            if !ids.insert(directive.id) {
                return Err(BackendError::DuplicateId(directive.id));
            }
            next.push(InstalledDirective::new(directive)?);
        }

        info!(
            "Installed {} directives ({} removed)",
            next.len(),
            removed.len()
        );
        *installed = next;
        Ok(())
    }
}
