use std::fmt;
use std::sync::Arc;

use crate::config::{ClusterConfig, PluginConfig};
use crate::kernel::constants;
use crate::kernel::error::Result;
use crate::plugin_system::cluster::{ClusterControl, ClusterState};
use crate::plugin_system::context::PluginContext;
use crate::plugin_system::error::PluginSystemError;
use crate::plugin_system::factory::{PluginCatalog, PluginFactory};
use crate::plugin_system::registry::ServiceRegistry;

/// Create a context for `config`, construct its plugin and connect it.
///
/// Returns `None` when the plugin declined or failed without a fallback; the
/// context is then already reset and holds nothing.
pub(crate) fn boot_plugin(
    registry: &Arc<ServiceRegistry>,
    factory: &Arc<PluginFactory>,
    config: PluginConfig,
) -> Option<Arc<PluginContext>> {
    let context = PluginContext::new(registry.clone(), factory.clone(), config);
    let outcome = factory.create_plugin(&context, context.config());
    match outcome.plugin() {
        Some(plugin) => {
            context.connect(Some(plugin));
            log::debug!("Started plugin '{}' ({:?})", context.config().name(), outcome);
            Some(context)
        }
        None => {
            log::debug!("No plugin started for '{}' ({:?})", context.config().name(), outcome);
            None
        }
    }
}

/// Owns the shared registry and factory and a root context for clusters.
pub struct PluginManager {
    registry: Arc<ServiceRegistry>,
    factory: Arc<PluginFactory>,
    root: Arc<PluginContext>,
}

impl fmt::Debug for PluginManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PluginManager")
            .field("registry", &self.registry)
            .field("root", &self.root)
            .finish()
    }
}

impl PluginManager {
    pub fn new(catalog: PluginCatalog) -> Arc<Self> {
        let registry = ServiceRegistry::new();
        let factory = PluginFactory::new(catalog);
        let root = PluginContext::new(registry.clone(), factory.clone(), PluginConfig::new(constants::ROOT_CONTEXT_NAME));
        root.connect(None);
        log::debug!("Plugin manager ready with {} plugin classes", factory.catalog().names().len());
        Arc::new(Self { registry, factory, root })
    }

    pub fn registry(&self) -> &Arc<ServiceRegistry> {
        &self.registry
    }

    pub fn factory(&self) -> &Arc<PluginFactory> {
        &self.factory
    }

    /// Context that owns every cluster started through [`start_cluster`](Self::start_cluster)
    pub fn root_context(&self) -> &Arc<PluginContext> {
        &self.root
    }

    /// Boot a top-level plugin. The caller owns the returned context and stops it.
    pub fn start(&self, config: PluginConfig) -> Option<Arc<PluginContext>> {
        log::info!("Starting plugin '{}'", config.name());
        boot_plugin(&self.registry, &self.factory, config)
    }

    /// Instantiate and start `template` under the root context.
    pub fn start_cluster(&self, template: &ClusterConfig, parameters: Option<&PluginConfig>) -> Result<Arc<ClusterControl>> {
        let cluster = self.root.new_cluster(template, parameters);
        cluster.start();
        match cluster.state() {
            ClusterState::Running => {
                log::info!("Cluster '{}' is running", cluster.id());
                Ok(cluster)
            }
            state => Err(PluginSystemError::ClusterError {
                cluster_id: cluster.id().to_string(),
                message: format!("cluster did not start (state {:?})", state),
            }
            .into()),
        }
    }

    /// Stop every cluster started through the manager and re-arm the root context.
    pub fn stop(&self) {
        log::info!("Stopping plugin manager");
        self.root.reset();
        self.root.connect(None);
    }
}
