//! Rule snapshot persistence.

use crate::config::RuleSnapshot;
use crate::error::StoreError;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tracing::debug;

#[async_trait]
pub trait RuleStore: Send + Sync {
    async fn load(&self) -> Result<RuleSnapshot, StoreError>;
    async fn save(&self, snapshot: &RuleSnapshot) -> Result<(), StoreError>;
}

/// Snapshot kept as a JSON file. A missing file reads as an empty snapshot.
pub struct FileRuleStore {
    path: PathBuf,
}

impl FileRuleStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Parse a snapshot from its stored JSON text.
pub fn parse_snapshot(text: &str) -> Result<RuleSnapshot, StoreError> {
    Ok(serde_json::from_str(text)?)
}

#[async_trait]
impl RuleStore for FileRuleStore {
    async fn load(&self) -> Result<RuleSnapshot, StoreError> {
        match tokio::fs::read_to_string(&self.path).await {
            Ok(text) => parse_snapshot(&text),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("No rule store at {}, starting empty", self.path.display());
                Ok(RuleSnapshot::default())
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Write pretty-printed JSON through a temporary file and rename it into place.
    async fn save(&self, snapshot: &RuleSnapshot) -> Result<(), StoreError> {
        let text = serde_json::to_string_pretty(snapshot)?;
        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, text).await?;
        tokio::fs::rename(&tmp, &self.path).await?;
        debug!(
            "Saved {} rules to {}",
            snapshot.rules.len(),
            self.path.display()
        );
        Ok(())
    }
}
