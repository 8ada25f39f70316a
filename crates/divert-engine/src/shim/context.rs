//! Per-context install state for the shim.

use super::interceptor::{build_rule_set, Interceptor, ShimRuleSet};
use crate::audit::RuleMatchedEvent;
use crate::config::{Rule, RuleId};
use parking_lot::RwLock;
use tokio::sync::broadcast;
use tracing::{debug, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstallOutcome {
    /// First install: the call surfaces are now wrapped.
    Installed,
    /// Already installed: only the working list was replaced.
    HotSwapped,
}

struct ShimState {
    installed: bool,
    rules: ShimRuleSet,
}

/// One execution context (a page, a worker, a process) the shim is installed into.
///
/// The install marker lives here rather than in a global, so each context
/// knows on its own whether its call surfaces are wrapped.
pub struct ExecutionContext {
    tab_id: Option<i64>,
    state: RwLock<ShimState>,
    matches: RwLock<Option<broadcast::Sender<RuleMatchedEvent>>>,
}

impl ExecutionContext {
    pub fn new(tab_id: Option<i64>) -> Self {
        Self {
            tab_id,
            state: RwLock::new(ShimState {
                installed: false,
                rules: ShimRuleSet::from(Vec::new()),
            }),
            matches: RwLock::new(None),
        }
    }

    pub fn tab_id(&self) -> Option<i64> {
        self.tab_id
    }

    /// Install the shim, or hot-swap the working list if it already is.
    pub fn install(&self, rules: &[Rule]) -> InstallOutcome {
        let set = build_rule_set(rules);
        let count = set.len();
        let mut state = self.state.write();
        state.rules = set;
        if state.installed {
            debug!("Hot-swapped {} shim rules (tab {:?})", count, self.tab_id);
            InstallOutcome::HotSwapped
        } else {
            state.installed = true;
            info!("Shim installed with {} rules (tab {:?})", count, self.tab_id);
            InstallOutcome::Installed
        }
    }

    /// Replace the working list without touching the install marker.
    pub fn update(&self, rules: &[Rule]) {
        let set = build_rule_set(rules);
        self.state.write().rules = set;
    }

    pub fn is_installed(&self) -> bool {
        self.state.read().installed
    }

    pub fn rule_count(&self) -> usize {
        self.state.read().rules.len()
    }

    /// Snapshot of the current working list, or `None` while not installed.
    ///
    /// Calls resolve against the returned value, so a later swap never
    /// changes a decision that was already taken.
    pub fn interceptor(&self) -> Option<Interceptor> {
        let state = self.state.read();
        state
            .installed
            .then(|| Interceptor::new(state.rules.clone()))
    }

    /// Route shim matches to an audit channel.
    pub fn report_matches_to(&self, sender: broadcast::Sender<RuleMatchedEvent>) {
        *self.matches.write() = Some(sender);
    }

    pub(crate) fn report_match(&self, rule_id: RuleId, url: &str) {
        if let Some(sender) = self.matches.read().as_ref() {
            // No subscribers is fine
            let _ = sender.send(RuleMatchedEvent {
                rule_id,
                url: url.to_string(),
                tab_id: self.tab_id,
            });
        }
    }
}
