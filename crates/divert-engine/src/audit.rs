//! Audit log of rule matches.
//!
//! Matches come from two places: the filtering backend reports
//! [`RuleMatchedEvent`]s for native directives, and the shim records its own
//! decisions. Both end up as [`AuditEntry`] rows in a [`LogStore`].

use crate::config::{RuleId, RuleSnapshot, RuleType};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// Match notification emitted by the filtering backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RuleMatchedEvent {
    pub rule_id: RuleId,
    pub url: String,
    #[serde(default)]
    pub tab_id: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditEntry {
    pub time: DateTime<Utc>,
    pub rule_id: RuleId,
    /// `None` when the rule no longer exists in the current snapshot.
    pub rule_name: Option<String>,
    pub rule_type: Option<RuleType>,
    pub url: String,
    pub tab_id: Option<i64>,
}

impl AuditEntry {
    /// Resolve a backend event against the snapshot it was raised under.
    pub fn from_event(event: RuleMatchedEvent, snapshot: &RuleSnapshot) -> Self {
        let rule = snapshot.rule(event.rule_id);
        Self {
            time: Utc::now(),
            rule_id: event.rule_id,
            rule_name: rule.map(|r| r.name.clone()),
            rule_type: rule.map(|r| r.rule_type),
            url: event.url,
            tab_id: event.tab_id,
        }
    }
}

/// Sink for audit entries.
pub trait LogStore: Send + Sync {
    fn record(&self, entry: AuditEntry);

    /// All retained entries, newest first.
    fn entries(&self) -> Vec<AuditEntry>;

    fn clear(&self);
}

/// Bounded in-memory log that drops the oldest entry once full.
pub struct MemoryLogStore {
    capacity: usize,
    entries: Mutex<VecDeque<AuditEntry>>,
}

impl MemoryLogStore {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            entries: Mutex::new(VecDeque::with_capacity(capacity.max(1))),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}

impl LogStore for MemoryLogStore {
    fn record(&self, entry: AuditEntry) {
        let mut entries = self.entries.lock();
        entries.push_front(entry);
        entries.truncate(self.capacity);
    }

    fn entries(&self) -> Vec<AuditEntry> {
        self.entries.lock().iter().cloned().collect()
    }

    fn clear(&self) {
        self.entries.lock().clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{MatchSpec, Rule, RuleAction};

    fn snapshot() -> RuleSnapshot {
        RuleSnapshot {
            enabled: true,
            rules: vec![Rule {
                id: 4,
                name: "block ads".into(),
                group_id: None,
                rule_type: RuleType::Block,
                priority: 1,
                enabled: true,
                method: "*".into(),
                match_spec: MatchSpec::substring("ads"),
                action: RuleAction::default(),
            }],
            groups: vec![],
        }
    }

    fn event(rule_id: RuleId, url: &str) -> RuleMatchedEvent {
        RuleMatchedEvent {
            rule_id,
            url: url.into(),
            tab_id: Some(1),
        }
    }

    #[test]
    fn test_entry_resolves_rule() {
        let entry = AuditEntry::from_event(event(4, "https://ads.test"), &snapshot());
        assert_eq!(entry.rule_name.as_deref(), Some("block ads"));
        assert_eq!(entry.rule_type, Some(RuleType::Block));

        let unknown = AuditEntry::from_event(event(99, "https://x.test"), &snapshot());
        assert!(unknown.rule_name.is_none());
        assert!(unknown.rule_type.is_none());
    }

    #[test]
    fn test_store_is_bounded_and_newest_first() {
        let store = MemoryLogStore::new(2);
        let snapshot = snapshot();
        for url in ["https://1", "https://2", "https://3"] {
            store.record(AuditEntry::from_event(event(4, url), &snapshot));
        }

        let urls: Vec<_> = store.entries().into_iter().map(|e| e.url).collect();
        assert_eq!(urls, vec!["https://3", "https://2"]);

        store.clear();
        assert!(store.is_empty());
    }

    #[test]
    fn test_event_wire_format() {
        let parsed: RuleMatchedEvent =
            serde_json::from_str(r#"{"ruleId": 3, "url": "https://a"}"#).unwrap();
        assert_eq!(parsed.rule_id, 3);
        assert_eq!(parsed.tab_id, None);
    }
}
