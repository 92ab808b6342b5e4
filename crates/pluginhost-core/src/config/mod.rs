//! # Plugin Configuration
//!
//! Configuration documents consumed by the plugin runtime.
//!
//! - [`PluginConfig`]: the key/value map handed to a single plugin. The
//!   runtime reads only the reserved `plugin.class` and `wicket.id` keys;
//!   everything else is opaque and interpreted by the plugin.
//! - [`ClusterConfig`]: a cluster template. Declares the service, reference
//!   and property slots of the cluster and the plugins started inside it.
//!
//! Documents can be parsed from JSON, and from YAML or TOML when the
//! `yaml-config` / `toml-config` features are enabled. How configuration is
//! produced is never a concern of the runtime itself.
pub mod cluster;
pub mod plugin;

use std::path::Path;

use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::plugin_system::error::PluginSystemError;

pub use cluster::ClusterConfig;
pub use plugin::PluginConfig;

/// Supported configuration file formats
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigFormat {
    /// JSON format (.json)
    Json,
    /// YAML format (.yaml, .yml) - requires "yaml-config" feature
    #[cfg(feature = "yaml-config")]
    Yaml,
    /// TOML format (.toml) - requires "toml-config" feature
    #[cfg(feature = "toml-config")]
    Toml,
}

impl ConfigFormat {
    /// Get the file extension for this format
    pub fn extension(&self) -> &'static str {
        match self {
            ConfigFormat::Json => "json",
            #[cfg(feature = "yaml-config")]
            ConfigFormat::Yaml => "yaml",
            #[cfg(feature = "toml-config")]
            ConfigFormat::Toml => "toml",
        }
    }

    /// Determine format from file extension
    pub fn from_path(path: &Path) -> Option<Self> {
        path.extension()
            .and_then(|ext| ext.to_str())
            .and_then(|ext| match ext.to_lowercase().as_str() {
                "json" => Some(ConfigFormat::Json),
                #[cfg(feature = "yaml-config")]
                "yaml" | "yml" => Some(ConfigFormat::Yaml),
                #[cfg(feature = "toml-config")]
                "toml" => Some(ConfigFormat::Toml),
                _ => None,
            })
    }

    /// Parse a document in this format
    pub fn parse<T: DeserializeOwned>(&self, data: &str) -> Result<T, PluginSystemError> {
        match self {
            ConfigFormat::Json => serde_json::from_str(data)
                .map_err(|e| PluginSystemError::config_with_source("Failed to deserialize from JSON", e)),
            #[cfg(feature = "yaml-config")]
            ConfigFormat::Yaml => serde_yaml::from_str(data)
                .map_err(|e| PluginSystemError::config_with_source("Failed to deserialize from YAML", e)),
            #[cfg(feature = "toml-config")]
            ConfigFormat::Toml => toml::from_str(data)
                .map_err(|e| PluginSystemError::config_with_source("Failed to deserialize from TOML", e)),
        }
    }

    /// Serialize a document to this format
    pub fn render<T: Serialize>(&self, value: &T) -> Result<String, PluginSystemError> {
        match self {
            ConfigFormat::Json => serde_json::to_string_pretty(value)
                .map_err(|e| PluginSystemError::config_with_source("Failed to serialize to JSON", e)),
            #[cfg(feature = "yaml-config")]
            ConfigFormat::Yaml => serde_yaml::to_string(value)
                .map_err(|e| PluginSystemError::config_with_source("Failed to serialize to YAML", e)),
            #[cfg(feature = "toml-config")]
            ConfigFormat::Toml => toml::to_string_pretty(value)
                .map_err(|e| PluginSystemError::config_with_source("Failed to serialize to TOML", e)),
        }
    }
}

/// Read and parse a configuration document, picking the format from the extension.
pub(crate) fn load_document<T: DeserializeOwned>(path: &Path) -> Result<T, PluginSystemError> {
    let format = ConfigFormat::from_path(path)
        .ok_or_else(|| PluginSystemError::UnsupportedConfigFormat(path.to_path_buf()))?;
    let content = std::fs::read_to_string(path).map_err(|source| PluginSystemError::Io {
        path: path.to_path_buf(),
        operation: "read_config".to_string(),
        source,
    })?;
    log::debug!("Loaded {} configuration from {}", format.extension(), path.display());
    format.parse(&content)
}
