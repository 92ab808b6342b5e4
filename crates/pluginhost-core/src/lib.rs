pub mod config;
pub mod kernel;
pub mod plugin_system;
pub(crate) mod utils;

// Re-export key public types for the binary and for plugin crates
pub use config::{ClusterConfig, ConfigFormat, PluginConfig};
pub use kernel::Application;
pub use kernel::error::{Error, Result};
pub use plugin_system::{
    ClusterControl, Plugin, PluginCatalog, PluginContext, PluginError, PluginManager, ServiceRef,
    ServiceRegistry, ServiceTracker,
};

#[cfg(test)]
mod tests;
