use std::any::Any;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::{Arc, Mutex, Weak};

use crate::config::ClusterConfig;
use crate::kernel::error::Result;
use crate::plugin_system::context::PluginContext;
use crate::plugin_system::factory::PluginFactory;
use crate::plugin_system::forwarder::ServiceForwarder;
use crate::plugin_system::manager;
use crate::plugin_system::registry::ServiceRegistry;
use crate::plugin_system::service::{ServiceRef, ServiceTracker};
use crate::utils::lock;

/// Lifecycle state of a [`ClusterControl`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClusterState {
    New,
    Running,
    /// Started while the owner was stopping; nothing was actually started
    Hollow,
    Stopped,
}

/// A service exposed by the cluster, tracked per registry id
struct Extension {
    names: HashSet<String>,
    forwarder: Arc<ServiceForwarder>,
}

struct ClusterInner {
    state: ClusterState,
    contexts: Vec<Option<Arc<PluginContext>>>,
    extensions: HashMap<u64, Extension>,
}

/// Control over a group of plugins started together from a cluster template.
///
/// Services the cluster's plugins publish on its service slots are
/// re-published under the cluster id, so the owner can enumerate what the
/// cluster currently exposes with `get_service_refs(cluster.id())`.
pub struct ClusterControl {
    id: String,
    owner: Weak<PluginContext>,
    registry: Arc<ServiceRegistry>,
    factory: Arc<PluginFactory>,
    config: ClusterConfig,
    forwarders: Vec<Arc<ServiceForwarder>>,
    weak_self: Weak<ClusterControl>,
    inner: Mutex<ClusterInner>,
}

impl fmt::Debug for ClusterControl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = lock(&self.inner);
        f.debug_struct("ClusterControl")
            .field("id", &self.id)
            .field("state", &inner.state)
            .field("plugins", &inner.contexts.len())
            .field("extensions", &inner.extensions.len())
            .field("forwarders", &self.forwarders.len())
            .finish()
    }
}

impl ClusterControl {
    pub(crate) fn new(
        owner: Weak<PluginContext>,
        registry: Arc<ServiceRegistry>,
        factory: Arc<PluginFactory>,
        id: String,
        config: ClusterConfig,
        forwarders: Vec<Arc<ServiceForwarder>>,
    ) -> Arc<Self> {
        Arc::new_cyclic(|weak_self| Self {
            id,
            owner,
            registry,
            factory,
            config,
            forwarders,
            weak_self: weak_self.clone(),
            inner: Mutex::new(ClusterInner {
                state: ClusterState::New,
                contexts: Vec::new(),
                extensions: HashMap::new(),
            }),
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// The decorated cluster config
    pub fn cluster_config(&self) -> &ClusterConfig {
        &self.config
    }

    pub fn state(&self) -> ClusterState {
        lock(&self.inner).state
    }

    pub fn forwarders(&self) -> &[Arc<ServiceForwarder>] {
        &self.forwarders
    }

    /// One slot per plugin entry, `None` where no context survived
    pub fn plugin_contexts(&self) -> Vec<Option<Arc<PluginContext>>> {
        lock(&self.inner).contexts.clone()
    }

    /// Synthetic names of the service slots, watched while running
    fn exposed_names(&self) -> Vec<String> {
        self.config
            .services()
            .iter()
            .filter_map(|slot| self.config.get_string(slot))
            .collect()
    }

    fn as_tracker(&self) -> Option<Arc<dyn ServiceTracker>> {
        let me: Arc<dyn ServiceTracker> = self.weak_self.upgrade()?;
        Some(me)
    }

    pub fn start(&self) {
        {
            let inner = lock(&self.inner);
            match inner.state {
                ClusterState::Running | ClusterState::Hollow => {
                    log::warn!("Cluster '{}' is already started ({:?})", self.id, inner.state);
                    return;
                }
                ClusterState::New | ClusterState::Stopped => {}
            }
        }
        let Some(owner) = self.owner.upgrade() else {
            log::error!("Cluster '{}' outlived its owning context", self.id);
            return;
        };
        if owner.is_stopping() {
            log::debug!("Owner of cluster '{}' is stopping; cluster stays hollow", self.id);
            lock(&self.inner).state = ClusterState::Hollow;
            return;
        }

        // all forwarders must track before any of them forwards
        for forwarder in &self.forwarders {
            forwarder.start();
        }
        for forwarder in &self.forwarders {
            forwarder.connect();
        }

        lock(&self.inner).state = ClusterState::Running;
        if let Some(me) = self.as_tracker() {
            for name in self.exposed_names() {
                owner.register_tracker(me.clone(), &name);
            }
        }

        let contexts: Vec<Option<Arc<PluginContext>>> = self
            .config
            .plugins()
            .iter()
            .map(|plugin| manager::boot_plugin(&self.registry, &self.factory, plugin.clone()))
            .collect();
        log::info!(
            "Cluster '{}' started {} of {} plugins",
            self.id,
            contexts.iter().flatten().count(),
            contexts.len()
        );
        lock(&self.inner).contexts = contexts;

        if let Some(me) = self.weak_self.upgrade() {
            owner.attach_cluster(&self.id, me);
        }
    }

    /// Stop every plugin of the cluster. Safe to call more than once.
    pub fn stop(&self) {
        let contexts = {
            let mut inner = lock(&self.inner);
            match inner.state {
                ClusterState::Hollow => {
                    inner.state = ClusterState::New;
                    return;
                }
                ClusterState::New | ClusterState::Stopped => return,
                ClusterState::Running => {}
            }
            inner.state = ClusterState::Stopped;
            std::mem::take(&mut inner.contexts)
        };
        log::debug!("Stopping cluster '{}'", self.id);

        let owner = self.owner.upgrade();
        if let Some(owner) = &owner {
            owner.detach_cluster(&self.id);
        }

        for context in contexts.into_iter().flatten() {
            context.stop();
        }

        if let (Some(owner), Some(me)) = (&owner, self.as_tracker()) {
            for name in self.exposed_names() {
                owner.unregister_tracker(&me, &name);
            }
        }

        for forwarder in &self.forwarders {
            forwarder.disconnect();
        }
        for forwarder in &self.forwarders {
            forwarder.stop();
        }

        let leftovers: Vec<Extension> = lock(&self.inner).extensions.drain().map(|(_, e)| e).collect();
        for extension in leftovers {
            extension.forwarder.stop();
        }
    }

    /// Service published on one of the cluster's slots, by slot name.
    pub fn get_service<T: Any + Send + Sync>(&self, slot: &str) -> Option<Arc<T>> {
        if self.state() != ClusterState::Running {
            log::warn!("Cluster '{}' is not running; no service for '{}'", self.id, slot);
            return None;
        }
        let name = self.config.get_string(slot)?;
        self.owner.upgrade()?.get_service::<T>(&name)
    }
}

impl ServiceTracker for ClusterControl {
    fn add_service(&self, service: &ServiceRef, name: &str) -> Result<()> {
        let Some(reference) = self.registry.get_reference(service) else {
            return Ok(());
        };
        let created = {
            let mut inner = lock(&self.inner);
            if inner.state != ClusterState::Running {
                return Ok(());
            }
            match inner.extensions.get_mut(&reference.service_id()) {
                Some(extension) => {
                    extension.names.insert(name.to_string());
                    None
                }
                None => {
                    let forwarder = ServiceForwarder::new(self.registry.clone(), reference.name(), self.id.clone());
                    inner.extensions.insert(
                        reference.service_id(),
                        Extension { names: HashSet::from([name.to_string()]), forwarder: forwarder.clone() },
                    );
                    Some(forwarder)
                }
            }
        };
        if let Some(forwarder) = created {
            forwarder.start();
            forwarder.connect();
        }
        Ok(())
    }

    fn remove_service(&self, service: &ServiceRef, name: &str) -> Result<()> {
        let Some(reference) = self.registry.get_reference(service) else {
            return Ok(());
        };
        let retired = {
            let mut inner = lock(&self.inner);
            let id = reference.service_id();
            let emptied = match inner.extensions.get_mut(&id) {
                Some(extension) => {
                    extension.names.remove(name);
                    extension.names.is_empty()
                }
                None => false,
            };
            if emptied { inner.extensions.remove(&id) } else { None }
        };
        if let Some(extension) = retired {
            extension.forwarder.stop();
        }
        Ok(())
    }
}
