use std::path::Path;
use std::sync::Arc;

use crate::config::{ClusterConfig, PluginConfig};
use crate::kernel::constants;
use crate::kernel::error::{Error, LifecyclePhase, Result};
use crate::plugin_system::{ClusterControl, PluginCatalog, PluginContext, PluginManager};

/// One row of the service table: a user-visible name and the ids published under it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceEntry {
    pub name: String,
    pub ids: Vec<u64>,
}

/// Main application struct: owns the plugin manager and everything started through it
pub struct Application {
    manager: Arc<PluginManager>,
    contexts: Vec<Arc<PluginContext>>,
    clusters: Vec<Arc<ClusterControl>>,
    shut_down: bool,
}

impl Application {
    pub fn new(catalog: PluginCatalog) -> Self {
        log::info!("Initializing {} v{}", constants::APP_NAME, constants::APP_VERSION);
        Self {
            manager: PluginManager::new(catalog),
            contexts: Vec::new(),
            clusters: Vec::new(),
            shut_down: false,
        }
    }

    pub fn plugin_manager(&self) -> &Arc<PluginManager> {
        &self.manager
    }

    pub fn clusters(&self) -> &[Arc<ClusterControl>] {
        &self.clusters
    }

    /// Boot a single top-level plugin. Returns whether a plugin came up.
    pub fn start_plugin(&mut self, config: PluginConfig) -> Result<bool> {
        self.ensure_running(LifecyclePhase::Start)?;
        match self.manager.start(config) {
            Some(context) => {
                self.contexts.push(context);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    pub fn run_cluster(&mut self, template: &ClusterConfig, parameters: &PluginConfig) -> Result<Arc<ClusterControl>> {
        self.ensure_running(LifecyclePhase::Start)?;
        let cluster = self.manager.start_cluster(template, Some(parameters))?;
        self.clusters.push(cluster.clone());
        Ok(cluster)
    }

    /// Load a cluster template from `path` and start it.
    pub fn load_and_run(&mut self, path: &Path, parameters: &PluginConfig) -> Result<Arc<ClusterControl>> {
        log::info!("Loading cluster template from {}", path.display());
        let template = ClusterConfig::load(path)?;
        self.run_cluster(&template, parameters)
    }

    /// User-visible service names with the ids published under each, sorted by name
    pub fn service_table(&self) -> Vec<ServiceEntry> {
        let registry = self.manager.registry();
        registry
            .service_names()
            .into_iter()
            .filter(|name| !name.starts_with(constants::SERVICE_ID_PREFIX))
            .map(|name| {
                let ids = registry
                    .get_service_refs(&name)
                    .iter()
                    .filter_map(|service| registry.service_id(service))
                    .collect();
                ServiceEntry { name, ids }
            })
            .collect()
    }

    /// Stop everything in reverse start order and verify nothing was left behind.
    pub fn shutdown(&mut self) -> Result<()> {
        if self.shut_down {
            return Ok(());
        }
        log::info!("Shutting down {}", constants::APP_NAME);
        self.shut_down = true;

        for context in self.contexts.drain(..).rev() {
            context.stop();
        }
        for cluster in self.clusters.drain(..).rev() {
            cluster.stop();
        }
        self.manager.stop();

        let registry = self.manager.registry();
        if !registry.is_empty() {
            let leftover = registry.service_names();
            log::error!("Registry not empty after shutdown: {:?}", leftover);
            return Err(Error::Lifecycle {
                phase: LifecyclePhase::Shutdown,
                message: format!("{} service names still registered: {}", leftover.len(), leftover.join(", ")),
            });
        }
        log::info!("Shutdown complete");
        Ok(())
    }

    fn ensure_running(&self, phase: LifecyclePhase) -> Result<()> {
        if self.shut_down {
            return Err(Error::Lifecycle { phase, message: "application has been shut down".to_string() });
        }
        Ok(())
    }
}

impl Drop for Application {
    fn drop(&mut self) {
        if let Err(e) = self.shutdown() {
            log::warn!("Shutdown on drop reported: {}", e);
        }
    }
}
