use std::sync::Arc;

use crate::config::PluginConfig;
use crate::kernel::error::Result;
use crate::plugin_system::context::PluginContext;
use crate::plugin_system::error::PluginError;

/// Core trait that all plugins implement.
///
/// A plugin does its wiring in its constructor: it registers services and
/// trackers on the context it is given and may start nested clusters. Those
/// registrations become visible to others only once the constructor has
/// returned and the context is connected, right before [`Plugin::start`].
pub trait Plugin: Send + Sync {
    /// Called once, after the plugin's registrations have been published.
    fn start(&self) -> Result<()> {
        Ok(())
    }

    /// Called once when the owning context stops, before any teardown.
    fn stop(&self) -> Result<()> {
        Ok(())
    }
}

/// Builds a plugin for a context. Returning [`PluginError::Declined`] means
/// the plugin has nothing to contribute for this configuration.
pub type PluginConstructor =
    Arc<dyn Fn(&Arc<PluginContext>, &PluginConfig) -> std::result::Result<Arc<dyn Plugin>, PluginError> + Send + Sync>;
