//! Coordinates both enforcement paths from one rule snapshot.
//!
//! Every snapshot change goes through [`Engine::apply_snapshot`]: partition,
//! compile the native set and replace it in one backend call, then push the
//! shim working list to every attached execution context.

use crate::audit::{AuditEntry, LogStore, MemoryLogStore, RuleMatchedEvent};
use crate::classify::partition;
use crate::config::{EngineConfig, Rule, RuleId, RuleSnapshot};
use crate::error::{BackendError, EngineError};
use crate::metrics;
use crate::native::{build_update, compile, CompiledSet, FilterBackend, SkippedRule};
use crate::shim::{ExecutionContext, InstallOutcome};
use crate::store::RuleStore;
use parking_lot::{Mutex, RwLock};
use std::sync::{Arc, Weak};
use tokio::sync::{broadcast, watch};
use tracing::{debug, error, info, warn};

const SHIM_EVENT_CAPACITY: usize = 256;

/// What a single synchronization did.
#[derive(Debug, Clone, Default)]
pub struct SyncReport {
    pub removed: Vec<RuleId>,
    pub installed: Vec<RuleId>,
    pub skipped: Vec<SkippedRule>,
    pub shim_rules: usize,
    /// Live execution contexts that received the new working list.
    pub contexts: usize,
}

pub struct Engine<B: FilterBackend> {
    backend: Arc<B>,
    config: EngineConfig,
    snapshot: RwLock<RuleSnapshot>,
    shim_rules: RwLock<Vec<Rule>>,
    contexts: Mutex<Vec<Weak<ExecutionContext>>>,
    audit: Arc<dyn LogStore>,
    shim_matches: broadcast::Sender<RuleMatchedEvent>,
}

impl<B: FilterBackend> Engine<B> {
    pub fn new(backend: Arc<B>, config: EngineConfig) -> Self {
        let audit: Arc<dyn LogStore> = Arc::new(MemoryLogStore::new(config.audit.capacity));
        let (shim_matches, _) = broadcast::channel(SHIM_EVENT_CAPACITY);
        Self {
            backend,
            config,
            snapshot: RwLock::new(RuleSnapshot::default()),
            shim_rules: RwLock::new(Vec::new()),
            contexts: Mutex::new(Vec::new()),
            audit,
            shim_matches,
        }
    }

    pub fn with_log_store(mut self, store: Arc<dyn LogStore>) -> Self {
        self.audit = store;
        self
    }

    pub fn backend(&self) -> &Arc<B> {
        &self.backend
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn audit(&self) -> &Arc<dyn LogStore> {
        &self.audit
    }

    /// The snapshot most recently applied.
    pub fn snapshot(&self) -> RuleSnapshot {
        self.snapshot.read().clone()
    }

    /// Current shim working list, ascending priority.
    pub fn shim_rules(&self) -> Vec<Rule> {
        self.shim_rules.read().clone()
    }

    /// Recompute both paths for a new snapshot.
    ///
    /// The shim contexts are refreshed even when the backend rejects the
    /// directive update; the backend error is returned afterwards and the
    /// previously installed directive set stays active.
    pub async fn apply_snapshot(&self, snapshot: RuleSnapshot) -> Result<SyncReport, EngineError> {
        let partition = partition(&snapshot);
        let compiled = compile(&partition.native, &self.config.backend);

        *self.snapshot.write() = snapshot;
        *self.shim_rules.write() = partition.shim;

        let native = self.install_directives(&compiled).await;
        let contexts = self.refresh_contexts();

        match native {
            Ok(removed) => {
                metrics::record_sync(true);
                let report = SyncReport {
                    removed,
                    installed: compiled.ids(),
                    skipped: compiled.skipped,
                    shim_rules: self.shim_rules.read().len(),
                    contexts,
                };
                info!(
                    "Applied snapshot: {} directives ({} skipped), {} shim rules, {} contexts",
                    report.installed.len(),
                    report.skipped.len(),
                    report.shim_rules,
                    report.contexts
                );
                Ok(report)
            }
            Err(e) => {
                metrics::record_sync(false);
                error!("Filtering backend rejected directive update: {}", e);
                Err(e.into())
            }
        }
    }

    async fn install_directives(&self, compiled: &CompiledSet) -> Result<Vec<RuleId>, BackendError> {
        let installed = self.backend.installed_ids().await?;
        let update = build_update(&installed, compiled);
        debug!(
            "Replacing {} directives with {}",
            update.remove_rule_ids.len(),
            update.add_rules.len()
        );
        self.backend.update_dynamic_rules(update).await?;
        metrics::set_directives_installed(compiled.directives.len());
        Ok(installed)
    }

    /// Push the current working list to every live context, forgetting the
    /// ones that have been dropped.
    fn refresh_contexts(&self) -> usize {
        let rules = self.shim_rules.read().clone();
        let mut contexts = self.contexts.lock();
        contexts.retain(|weak| match weak.upgrade() {
            Some(context) => {
                context.install(&rules);
                true
            }
            None => false,
        });
        contexts.len()
    }

    /// Install the shim into a context with the current working list and keep
    /// it refreshed on later snapshots. The engine only holds a weak
    /// reference; dropping the context detaches it.
    pub fn attach(&self, context: &Arc<ExecutionContext>) -> InstallOutcome {
        context.report_matches_to(self.shim_matches.clone());
        self.contexts.lock().push(Arc::downgrade(context));
        let rules = self.shim_rules.read().clone();
        context.install(&rules)
    }

    /// Match events raised by attached shim contexts.
    pub fn shim_matches(&self) -> broadcast::Receiver<RuleMatchedEvent> {
        self.shim_matches.subscribe()
    }

    /// Resolve a match event against the current snapshot and audit it.
    pub fn record_match(&self, event: RuleMatchedEvent) {
        let entry = AuditEntry::from_event(event, &self.snapshot.read());
        let rule_type = entry.rule_type.map_or("unknown", |t| t.as_str());
        metrics::record_rule_match(rule_type);
        self.audit.record(entry);
    }

    /// Audit every event from `events` until the channel closes.
    pub async fn forward_matches(&self, mut events: broadcast::Receiver<RuleMatchedEvent>) {
        loop {
            match events.recv().await {
                Ok(event) => self.record_match(event),
                Err(broadcast::error::RecvError::Lagged(missed)) => {
                    warn!("Audit fell behind, {} match events dropped", missed);
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    }

    /// Load the persisted snapshot and apply it.
    pub async fn load_from(&self, store: &dyn RuleStore) -> Result<SyncReport, EngineError> {
        let snapshot = store.load().await?;
        self.apply_snapshot(snapshot).await
    }

    /// Apply the current snapshot, then every change until the sender is
    /// dropped. A failed synchronization is logged and the loop continues.
    pub async fn run(&self, mut snapshots: watch::Receiver<RuleSnapshot>) {
        loop {
            let snapshot = snapshots.borrow_and_update().clone();
            if let Err(e) = self.apply_snapshot(snapshot).await {
                warn!("Snapshot synchronization failed: {}", e);
            }
            if snapshots.changed().await.is_err() {
                debug!("Rule store closed, stopping engine");
                break;
            }
        }
    }
}
