//! Snapshot synchronization across the native backend and shim contexts.

mod common;

use common::{block_rule, group, mock_rule, rule};
use divert_engine::config::{
    EngineConfig, HeaderRule, MatchSpec, RedirectMode, RuleAction, RuleSnapshot, RuleType,
};
use divert_engine::native::{DirectiveAction, FilterBackend, MemoryBackend, NativeEffect};
use divert_engine::shim::ExecutionContext;
use divert_engine::store::{FileRuleStore, RuleStore};
use divert_engine::tester::test_url;
use divert_engine::{Engine, Enforcement};
use std::sync::Arc;
use tempfile::TempDir;
use tokio::sync::watch;

fn engine() -> Engine<MemoryBackend> {
    Engine::new(Arc::new(MemoryBackend::new()), EngineConfig::default())
}

#[tokio::test]
async fn test_mock_delay_decides_enforcement_path() {
    let engine = engine();
    let context = Arc::new(ExecutionContext::new(None));
    engine.attach(&context);

    engine
        .apply_snapshot(RuleSnapshot {
            rules: vec![mock_rule(1, "api.test", "{}", 0)],
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(engine.backend().installed_ids().await.unwrap(), vec![1]);
    assert!(engine.shim_rules().is_empty());
    assert_eq!(context.rule_count(), 0);
    assert!(matches!(
        engine.backend().evaluate("https://api.test/a", "GET", None),
        Some(hit) if hit.effect == NativeEffect::Redirect("data:application/json,%7B%7D".into())
    ));

    engine
        .apply_snapshot(RuleSnapshot {
            rules: vec![mock_rule(1, "api.test", "{}", 5000)],
            ..Default::default()
        })
        .await
        .unwrap();
    assert!(engine.backend().installed_ids().await.unwrap().is_empty());
    assert_eq!(engine.shim_rules()[0].id, 1);
    assert_eq!(context.rule_count(), 1);
}

#[tokio::test]
async fn test_group_toggle_hides_rules_from_both_paths() {
    let engine = engine();
    let context = Arc::new(ExecutionContext::new(None));
    engine.attach(&context);

    let mut native = block_rule(1, "ads.test");
    native.group_id = Some("ads".into());
    let mut shim = mock_rule(2, "api.test", "{}", 100);
    shim.group_id = Some("ads".into());
    let mut snapshot = RuleSnapshot {
        rules: vec![native, shim],
        groups: vec![group("ads", true)],
        ..Default::default()
    };

    engine.apply_snapshot(snapshot.clone()).await.unwrap();
    assert_eq!(engine.backend().installed_ids().await.unwrap(), vec![1]);
    assert_eq!(context.rule_count(), 1);

    snapshot.groups[0].enabled = false;
    engine.apply_snapshot(snapshot.clone()).await.unwrap();
    assert!(engine.backend().installed_ids().await.unwrap().is_empty());
    assert_eq!(context.rule_count(), 0);
    assert!(engine.snapshot().rules.iter().all(|r| r.enabled));

    snapshot.groups[0].enabled = true;
    engine.apply_snapshot(snapshot).await.unwrap();
    assert_eq!(engine.backend().installed_ids().await.unwrap(), vec![1]);
    assert_eq!(context.rule_count(), 1);
}

#[tokio::test]
async fn test_deleting_group_keeps_rules() {
    let engine = engine();
    let mut member = block_rule(1, "ads.test");
    member.group_id = Some("ads".into());
    let mut snapshot = RuleSnapshot {
        rules: vec![member],
        groups: vec![group("ads", false)],
        ..Default::default()
    };

    engine.apply_snapshot(snapshot.clone()).await.unwrap();
    assert!(engine.backend().installed_ids().await.unwrap().is_empty());

    assert_eq!(snapshot.delete_group("ads"), 1);
    engine.apply_snapshot(snapshot).await.unwrap();
    assert_eq!(engine.backend().installed_ids().await.unwrap(), vec![1]);
}

#[tokio::test]
async fn test_replace_redirect_end_to_end() {
    let engine = engine();
    let redirect = rule(
        1,
        RuleType::Redirect,
        MatchSpec::substring("https://a.com"),
        RuleAction {
            mode: Some(RedirectMode::Replace),
            find: Some("a.com".into()),
            replace: Some("b.com".into()),
            ..Default::default()
        },
    );
    engine
        .apply_snapshot(RuleSnapshot {
            rules: vec![redirect],
            ..Default::default()
        })
        .await
        .unwrap();

    let hit = engine
        .backend()
        .evaluate("https://a.com/x", "GET", Some(3))
        .unwrap();
    assert_eq!(hit.effect, NativeEffect::Redirect("https://b.com/x".into()));
}

#[tokio::test]
async fn test_native_priority_and_headers() {
    let engine = engine();
    let mut headers = rule(
        1,
        RuleType::Headers,
        MatchSpec::wildcard("https://*.example.com/*"),
        RuleAction {
            request_headers: vec![HeaderRule::remove("cookie")],
            ..Default::default()
        },
    );
    headers.priority = 1;
    let mut blocker = block_rule(2, "example.com");
    blocker.priority = 5;

    engine
        .apply_snapshot(RuleSnapshot {
            rules: vec![blocker, headers],
            ..Default::default()
        })
        .await
        .unwrap();

    let directives = engine.backend().directives();
    let header_directive = directives.iter().find(|d| d.id == 1).unwrap();
    assert!(matches!(header_directive.action, DirectiveAction::ModifyHeaders { .. }));
    assert!(header_directive.priority > directives.iter().find(|d| d.id == 2).unwrap().priority);

    let hit = engine
        .backend()
        .evaluate("https://www.example.com/page", "GET", None)
        .unwrap();
    assert_eq!(hit.rule_id, 1);
}

#[tokio::test]
async fn test_backend_matches_are_audited() {
    let engine = engine();
    engine
        .apply_snapshot(RuleSnapshot {
            rules: vec![block_rule(7, "ads.test")],
            ..Default::default()
        })
        .await
        .unwrap();

    let mut events = engine.backend().subscribe();
    engine.backend().evaluate("https://ads.test/x", "GET", Some(11));
    engine.record_match(events.recv().await.unwrap());

    let entries = engine.audit().entries();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].rule_type, Some(RuleType::Block));
    assert_eq!(entries[0].url, "https://ads.test/x");
    assert_eq!(entries[0].tab_id, Some(11));
}

#[tokio::test]
async fn test_store_feeds_engine_through_watch() {
    let dir = TempDir::new().unwrap();
    let store = FileRuleStore::new(dir.path().join("rules.json"));
    store
        .save(&RuleSnapshot {
            rules: vec![block_rule(1, "ads.test"), mock_rule(2, "api.test", "{}", 50)],
            ..Default::default()
        })
        .await
        .unwrap();

    let engine = Arc::new(engine());
    let context = Arc::new(ExecutionContext::new(None));
    engine.attach(&context);

    let (tx, rx) = watch::channel(store.load().await.unwrap());
    let runner = tokio::spawn({
        let engine = Arc::clone(&engine);
        async move { engine.run(rx).await }
    });

    let mut next = store.load().await.unwrap();
    next.enabled = false;
    tx.send(next).unwrap();
    drop(tx);
    runner.await.unwrap();

    assert!(engine.backend().installed_ids().await.unwrap().is_empty());
    assert_eq!(context.rule_count(), 0);
}

#[test]
fn test_rule_tester_reports_paths() {
    let mut delayed = mock_rule(2, "api.test", "{}", 100);
    delayed.priority = 0;
    let snapshot = RuleSnapshot {
        rules: vec![block_rule(1, "api.test"), delayed],
        ..Default::default()
    };

    let hits = test_url(&snapshot, "https://api.test/a");
    assert_eq!(hits.len(), 2);
    assert_eq!(hits[0].rule_id, 2);
    assert_eq!(hits[0].enforcement, Enforcement::Shim);
    assert_eq!(hits[1].enforcement, Enforcement::Native);
}
