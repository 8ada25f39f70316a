//! "Which rules would match this URL?" for a whole snapshot.

use crate::classify::{classify, Enforcement};
use crate::config::{RuleId, RuleSnapshot, RuleType};
use crate::gate::is_effectively_enabled;
use crate::matcher::matches;
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RuleMatch {
    /// 1-based rank among the matches, by ascending priority.
    pub position: usize,
    pub rule_id: RuleId,
    pub name: String,
    pub rule_type: RuleType,
    pub priority: i64,
    /// Effective enablement, group and global switch included.
    pub enabled: bool,
    pub enforcement: Enforcement,
}

/// Every rule whose match spec accepts `url`, regardless of enablement,
/// type or method, ordered the way the enforcement paths would order them.
pub fn test_url(snapshot: &RuleSnapshot, url: &str) -> Vec<RuleMatch> {
    let mut hits: Vec<_> = snapshot
        .rules
        .iter()
        .filter(|rule| matches(url, &rule.match_spec))
        .collect();
    hits.sort_by_key(|rule| rule.priority);

    hits.into_iter()
        .enumerate()
        .map(|(index, rule)| RuleMatch {
            position: index + 1,
            rule_id: rule.id,
            name: rule.name.clone(),
            rule_type: rule.rule_type,
            priority: rule.priority,
            enabled: snapshot.enabled && is_effectively_enabled(rule, &snapshot.groups),
            enforcement: classify(rule),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Group, MatchSpec, Rule, RuleAction};

    fn rule(id: RuleId, priority: i64, spec: MatchSpec, group_id: Option<&str>) -> Rule {
        Rule {
            id,
            name: format!("rule-{id}"),
            group_id: group_id.map(str::to_string),
            rule_type: RuleType::Block,
            priority,
            enabled: true,
            method: "POST".into(),
            match_spec: spec,
            action: RuleAction::default(),
        }
    }

    #[test]
    fn test_matches_sorted_with_enablement() {
        let snapshot = RuleSnapshot {
            enabled: true,
            rules: vec![
                rule(1, 3, MatchSpec::substring("example"), None),
                rule(2, 1, MatchSpec::wildcard("*example.com*"), Some("off")),
                rule(3, 1, MatchSpec::regex("nomatch$"), None),
                rule(4, 3, MatchSpec::substring("https"), None),
            ],
            groups: vec![Group {
                id: "off".into(),
                name: "Off".into(),
                enabled: false,
            }],
        };

        let hits = test_url(&snapshot, "https://example.com/a");
        let ids: Vec<_> = hits.iter().map(|h| h.rule_id).collect();
        assert_eq!(ids, vec![2, 1, 4]);
        assert_eq!(hits[0].position, 1);
        assert!(!hits[0].enabled);
        assert!(hits[1].enabled);
        assert_eq!(hits[1].enforcement, Enforcement::Native);
    }

    #[test]
    fn test_global_switch_reported() {
        let snapshot = RuleSnapshot {
            enabled: false,
            rules: vec![rule(1, 1, MatchSpec::substring("a"), None)],
            groups: vec![],
        };
        let hits = test_url(&snapshot, "a");
        assert_eq!(hits.len(), 1);
        assert!(!hits[0].enabled);
    }
}
