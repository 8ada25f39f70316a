//! Configuration types for the Divert engine.

mod backend;
mod observability;
mod rules;

use std::path::Path;

use serde::{Deserialize, Serialize};

// Re-export all types for library consumers
pub use backend::{BackendConfig, RegexValidation, ResourceType};
pub use observability::{AuditConfig, LogFormat, LoggingConfig};
pub use rules::{
    Group, HeaderOperation, HeaderRule, InterceptRequest, InterceptResponse, MatchKind, MatchSpec,
    MockAction, RedirectMode, RequestMode, ResponseMode, Rule, RuleAction, RuleId, RuleSnapshot,
    RuleType,
};

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct EngineConfig {
    #[serde(default)]
    pub backend: BackendConfig,
    #[serde(default)]
    pub audit: AuditConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl EngineConfig {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, anyhow::Error> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_yaml(&contents)
    }

    pub fn from_yaml(contents: &str) -> Result<Self, anyhow::Error> {
        let config: EngineConfig = serde_yaml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), anyhow::Error> {
        if self.backend.resource_types.is_empty() {
            anyhow::bail!(
                "backend.resource_types must not be empty; omit it to use the full default set"
            );
        }

        let mut seen = std::collections::HashSet::new();
        for resource_type in &self.backend.resource_types {
            if !seen.insert(resource_type) {
                anyhow::bail!("Duplicate resource type in backend.resource_types: {resource_type:?}");
            }
        }

        if self.audit.capacity == 0 {
            anyhow::bail!("audit.capacity must be greater than 0");
        }

        if tracing_subscriber::EnvFilter::try_new(&self.logging.level).is_err() {
            anyhow::bail!("Invalid logging.level filter: '{}'", self.logging.level);
        }

        Ok(())
    }
}
