//! Declarative filtering backend configuration.

use serde::{Deserialize, Serialize};

/// Resource categories a directive condition can be scoped to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceType {
    MainFrame,
    SubFrame,
    Stylesheet,
    Script,
    Image,
    Font,
    Object,
    Xmlhttprequest,
    Ping,
    CspReport,
    Media,
    Websocket,
    Other,
}

impl ResourceType {
    /// The fixed set attached to every compiled directive by default.
    pub const ALL: [ResourceType; 13] = [
        ResourceType::MainFrame,
        ResourceType::SubFrame,
        ResourceType::Stylesheet,
        ResourceType::Script,
        ResourceType::Image,
        ResourceType::Font,
        ResourceType::Object,
        ResourceType::Xmlhttprequest,
        ResourceType::Ping,
        ResourceType::CspReport,
        ResourceType::Media,
        ResourceType::Websocket,
        ResourceType::Other,
    ];
}

/// Who validates `regexFilter` patterns before they take effect.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RegexValidation {
    /// Submit as-is; the filtering backend is the last line of defense.
    #[default]
    Backend,
    /// Compile each pattern first and skip the rule when it does not compile.
    Reject,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct BackendConfig {
    #[serde(default = "default_resource_types")]
    pub resource_types: Vec<ResourceType>,
    #[serde(default)]
    pub regex_validation: RegexValidation,
}

fn default_resource_types() -> Vec<ResourceType> {
    ResourceType::ALL.to_vec()
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            resource_types: default_resource_types(),
            regex_validation: RegexValidation::default(),
        }
    }
}
