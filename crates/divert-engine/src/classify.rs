//! Rule classification: which enforcement path owns a rule.
//!
//! The native backend cannot delay a call or transform bodies, so any rule
//! needing either belongs to the shim. Classification is always derived from
//! the current rule record and never stored.

use crate::config::{Rule, RuleSnapshot, RuleType};
use crate::gate::is_effectively_enabled;
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Enforcement {
    Native,
    Shim,
}

pub fn classify(rule: &Rule) -> Enforcement {
    let delayed_mock = rule.rule_type == RuleType::Mock
        && rule.action.mock.as_ref().is_some_and(|m| m.delay > 0);
    if rule.rule_type == RuleType::Intercept || delayed_mock {
        Enforcement::Shim
    } else {
        Enforcement::Native
    }
}

/// Effectively enabled rules split by enforcement path, each list sorted by
/// ascending priority with ties kept in stored order.
#[derive(Debug, Clone, Default)]
pub struct Partition {
    pub native: Vec<Rule>,
    pub shim: Vec<Rule>,
}

pub fn partition(snapshot: &RuleSnapshot) -> Partition {
    let mut partition = Partition::default();
    if !snapshot.enabled {
        return partition;
    }

    for rule in &snapshot.rules {
        if !is_effectively_enabled(rule, &snapshot.groups) {
            continue;
        }
        match classify(rule) {
            Enforcement::Native => partition.native.push(rule.clone()),
            Enforcement::Shim => partition.shim.push(rule.clone()),
        }
    }

    // sort_by_key is stable
    partition.native.sort_by_key(|r| r.priority);
    partition.shim.sort_by_key(|r| r.priority);
    partition
}
