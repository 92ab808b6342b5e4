//! # Kernel Errors
//!
//! Defines the crate-level [`Error`] type and the [`Result`] alias used by
//! every fallible public operation. Subsystem errors convert into it with `?`.
use std::result::Result as StdResult;

use thiserror::Error as ThisError;

use crate::plugin_system::error::{PluginError, PluginSystemError};

#[derive(Debug, ThisError)]
pub enum Error {
    /// Specific, typed plugin system error
    #[error("Plugin system error: {0}")]
    PluginSystem(#[from] PluginSystemError),

    /// A plugin constructor failed outside of the factory
    #[error("Plugin error: {0}")]
    Plugin(#[from] PluginError),

    /// Error occurring while the application is bootstrapped or torn down.
    #[error("Lifecycle error during {phase}: {message}")]
    Lifecycle {
        phase: LifecyclePhase,
        message: String,
    },

    /// Generic error with message
    #[error("Error: {0}")]
    Other(String),
}

/// Represents a specific phase in the application's lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ThisError)]
pub enum LifecyclePhase {
    #[error("Bootstrap")]
    Bootstrap,
    #[error("Start")]
    Start,
    #[error("Shutdown")]
    Shutdown,
}

/// Shorthand for Result with our Error type
pub type Result<T> = StdResult<T, Error>;

impl From<&str> for Error {
    fn from(msg: &str) -> Self {
        Error::Other(msg.to_string())
    }
}

impl From<String> for Error {
    fn from(msg: String) -> Self {
        Error::Other(msg)
    }
}
