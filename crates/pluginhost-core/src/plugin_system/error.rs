//! # Plugin System Errors
//!
//! Defines error types specific to the plugin system.
//!
//! [`PluginSystemError`] covers failures of the runtime itself: configuration
//! documents that cannot be read or parsed, cluster operations attempted in
//! the wrong state and internal bookkeeping problems. [`PluginError`] is what
//! a plugin constructor returns; its [`PluginError::Declined`] variant is not
//! a failure but the signal that a plugin has nothing to contribute.
use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum PluginSystemError {
    #[error("I/O error during operation '{operation}' on path '{path}': {source}")]
    Io {
        path: PathBuf,
        operation: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Unsupported configuration format for path: {0}")]
    UnsupportedConfigFormat(PathBuf),

    #[error("Configuration error: {message}")]
    ConfigError {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    #[error("Cluster '{cluster_id}': {message}")]
    ClusterError {
        cluster_id: String,
        message: String,
    },

    #[error("Internal plugin system error: {0}")]
    InternalError(String),
}

impl PluginSystemError {
    pub fn config(message: impl Into<String>) -> Self {
        PluginSystemError::ConfigError { message: message.into(), source: None }
    }

    pub fn config_with_source<E>(message: impl Into<String>, source: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        PluginSystemError::ConfigError { message: message.into(), source: Some(Box::new(source)) }
    }
}

/// Outcome of a failed plugin constructor.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PluginError {
    /// The plugin has nothing to contribute for this configuration.
    #[error("plugin declined to start")]
    Declined,

    #[error("missing configuration key '{0}'")]
    MissingConfig(String),

    #[error("plugin failed: {0}")]
    Failed(String),
}

impl PluginError {
    pub fn failed(message: impl Into<String>) -> Self {
        PluginError::Failed(message.into())
    }

    pub fn is_declined(&self) -> bool {
        matches!(self, PluginError::Declined)
    }
}
