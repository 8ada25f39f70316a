//! Rule resolution and dispatch shared by both call-surface adapters.

use super::transport::Transport;
use crate::actions::{call_plan, CallPlan, RequestOutcome, RequestPlan, ResponsePlan};
use crate::config::{Rule, RuleId};
use crate::error::{ActionError, ShimError};
use crate::matcher::{method_matches, CompiledMatch};
use crate::metrics;
use crate::request::OutgoingRequest;
use crate::response::InterceptedResponse;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Immutable working list installed into an execution context.
pub type ShimRuleSet = Arc<[ShimRule]>;

/// A shim rule with its matcher compiled and its plan resolved up front.
#[derive(Debug, Clone)]
pub struct ShimRule {
    rule: Rule,
    matcher: CompiledMatch,
    plan: CallPlan,
}

impl ShimRule {
    pub fn new(rule: Rule) -> Result<Self, ActionError> {
        let plan = call_plan(&rule)?;
        let matcher = CompiledMatch::compile(&rule.match_spec);
        Ok(Self {
            rule,
            matcher,
            plan,
        })
    }

    pub fn rule(&self) -> &Rule {
        &self.rule
    }

    pub fn plan(&self) -> &CallPlan {
        &self.plan
    }

    pub fn matches(&self, url: &str, method: &str) -> bool {
        method_matches(&self.rule.method, method) && self.matcher.is_match(url)
    }
}

/// Build a working list from rules already sorted by ascending priority.
/// Rules whose action cannot be resolved are left out.
pub fn build_rule_set(rules: &[Rule]) -> ShimRuleSet {
    rules
        .iter()
        .filter_map(|rule| match ShimRule::new(rule.clone()) {
            Ok(shim_rule) => Some(shim_rule),
            Err(e) => {
                warn!("Skipping shim rule {} ('{}'): {}", rule.id, rule.name, e);
                None
            }
        })
        .collect()
}

/// The resolved outcome for one call, captured before any suspension.
#[derive(Debug, Clone, PartialEq)]
pub struct Decision {
    pub rule_id: RuleId,
    pub rule_name: String,
    pub plan: CallPlan,
}

impl Decision {
    pub fn delay(&self) -> Duration {
        self.plan.delay
    }
}

/// Read-only view over one working list.
#[derive(Debug, Clone)]
pub struct Interceptor {
    rules: ShimRuleSet,
}

impl Interceptor {
    pub fn new(rules: ShimRuleSet) -> Self {
        Self { rules }
    }

    /// First rule, in list order, whose matcher and method predicate accept the call.
    pub fn pick_rule(&self, url: &str, method: &str) -> Option<&ShimRule> {
        self.rules.iter().find(|rule| rule.matches(url, method))
    }

    pub fn resolve(&self, url: &str, method: &str) -> Option<Decision> {
        self.pick_rule(url, method).map(|rule| Decision {
            rule_id: rule.rule.id,
            rule_name: rule.rule.name.clone(),
            plan: rule.plan.clone(),
        })
    }
}

/// Which wrapped surface a call came through.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Surface {
    Fetch,
    Xhr,
}

impl Surface {
    pub fn as_str(&self) -> &'static str {
        match self {
            Surface::Fetch => "fetch",
            Surface::Xhr => "xhr",
        }
    }
}

/// Carry out a decision: block, or sleep, rewrite the request, then either
/// answer with the mock or forward and post-process the real response.
pub async fn dispatch(
    surface: Surface,
    decision: Option<Decision>,
    request: OutgoingRequest,
    transport: &dyn Transport,
) -> Result<InterceptedResponse, ShimError> {
    let Some(decision) = decision else {
        metrics::record_shim_decision(surface.as_str(), "pass");
        return Ok(transport.send(request).await?);
    };

    if decision.plan.request.is_block() {
        debug!("Rule {} blocked {}", decision.rule_id, request.url);
        metrics::record_shim_decision(surface.as_str(), "block");
        return Err(ShimError::Blocked);
    }

    let delay = decision.delay();
    if !delay.is_zero() {
        debug!("Rule {} delaying {} by {:?}", decision.rule_id, request.url, delay);
        metrics::record_shim_delay(surface.as_str(), delay.as_millis() as u64);
        tokio::time::sleep(delay).await;
    }

    let request = match decision.plan.request.apply(request) {
        RequestOutcome::Dispatch(request) => request,
        RequestOutcome::Blocked => {
            metrics::record_shim_decision(surface.as_str(), "block");
            return Err(ShimError::Blocked);
        }
    };

    if let Some(mock) = decision.plan.response.mock_response() {
        metrics::record_shim_decision(surface.as_str(), "mock");
        return Ok(mock);
    }

    metrics::record_shim_decision(surface.as_str(), forward_outcome(&decision.plan));
    let response = transport.send(request).await?;
    Ok(decision.plan.response.apply(response))
}

/// Outcome label for a matched call that reaches the network.
fn forward_outcome(plan: &CallPlan) -> &'static str {
    match (&plan.request, &plan.response) {
        (RequestPlan::Modify(_), _) | (_, ResponsePlan::Modify(_)) => "modify",
        _ => "pass",
    }
}
