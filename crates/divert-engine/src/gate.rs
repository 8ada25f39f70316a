//! Group gate: effective enablement of a rule.
//!
//! Derived on every read and never written back to the rule, so toggling a
//! group off and on restores exactly the per-rule state that was stored.

use crate::config::{Group, Rule};

/// `rule.enabled && (ungrouped || group.enabled)`.
///
/// A `groupId` pointing at a group missing from `groups` counts as ungrouped:
/// a dangling reference must not silently disable the rule.
pub fn is_effectively_enabled(rule: &Rule, groups: &[Group]) -> bool {
    if !rule.enabled {
        return false;
    }
    match rule.group_id.as_deref() {
        None => true,
        Some(group_id) => groups
            .iter()
            .find(|g| g.id == group_id)
            .map_or(true, |g| g.enabled),
    }
}
