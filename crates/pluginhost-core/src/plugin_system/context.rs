use std::any::{Any, TypeId};
use std::collections::HashSet;
use std::fmt;
use std::sync::{Arc, Mutex, Weak};

use crate::config::{ClusterConfig, PluginConfig};
use crate::kernel::constants;
use crate::plugin_system::cluster::ClusterControl;
use crate::plugin_system::decorator;
use crate::plugin_system::factory::PluginFactory;
use crate::plugin_system::forwarder::ServiceForwarder;
use crate::plugin_system::registry::{ServiceRegistration, ServiceRegistry};
use crate::plugin_system::service::{
    same_tracker, ServiceFactory, ServiceKey, ServiceRef, ServiceReference, ServiceTracker,
};
use crate::plugin_system::traits::Plugin;
use crate::utils::lock;

/// Lifecycle phase of a [`PluginContext`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContextPhase {
    /// Registrations are buffered until the plugin is connected
    Initializing,
    /// Registrations go straight to the registry
    Running,
    /// Teardown in progress or done; new registrations are rejected
    Stopping,
}

struct LocalService {
    name: String,
    service: ServiceRef,
}

struct FactoryInstance {
    factory_key: ServiceKey,
    factory: Arc<dyn ServiceFactory>,
    instance: ServiceRef,
}

struct ContextState {
    phase: ContextPhase,
    /// Buffered trackers have been handed to the registry
    connected: bool,
    plugin: Option<Arc<dyn Plugin>>,
    plugin_started: bool,
    services: Vec<LocalService>,
    registrations: Vec<ServiceRegistration>,
    instances: Vec<FactoryInstance>,
    trackers: Vec<(String, Arc<dyn ServiceTracker>)>,
    children: Vec<(String, Arc<ClusterControl>)>,
    cluster_ids: HashSet<String>,
}

impl ContextState {
    fn new() -> Self {
        Self {
            phase: ContextPhase::Initializing,
            connected: false,
            plugin: None,
            plugin_started: false,
            services: Vec::new(),
            registrations: Vec::new(),
            instances: Vec::new(),
            trackers: Vec::new(),
            children: Vec::new(),
            cluster_ids: HashSet::new(),
        }
    }
}

/// Per-plugin facade over the [`ServiceRegistry`].
///
/// While the plugin is being constructed, service and tracker registrations
/// are buffered so that nothing becomes visible before the plugin is
/// complete. [`connect`](Self::connect) publishes them in registration order
/// and starts the plugin. [`stop`](Self::stop) tears down everything the
/// context created, including nested clusters.
pub struct PluginContext {
    registry: Arc<ServiceRegistry>,
    factory: Arc<PluginFactory>,
    config: PluginConfig,
    weak_self: Weak<PluginContext>,
    state: Mutex<ContextState>,
}

impl fmt::Debug for PluginContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = lock(&self.state);
        f.debug_struct("PluginContext")
            .field("name", &self.config.name())
            .field("phase", &state.phase)
            .field("services", &state.services.len())
            .field("trackers", &state.trackers.len())
            .field("clusters", &state.children.len())
            .finish_non_exhaustive()
    }
}

impl PluginContext {
    pub fn new(registry: Arc<ServiceRegistry>, factory: Arc<PluginFactory>, config: PluginConfig) -> Arc<Self> {
        Arc::new_cyclic(|weak_self| Self {
            registry,
            factory,
            config,
            weak_self: weak_self.clone(),
            state: Mutex::new(ContextState::new()),
        })
    }

    pub fn config(&self) -> &PluginConfig {
        &self.config
    }

    pub fn registry(&self) -> &Arc<ServiceRegistry> {
        &self.registry
    }

    pub fn phase(&self) -> ContextPhase {
        lock(&self.state).phase
    }

    pub fn is_stopping(&self) -> bool {
        self.phase() == ContextPhase::Stopping
    }

    pub fn plugin(&self) -> Option<Arc<dyn Plugin>> {
        lock(&self.state).plugin.clone()
    }

    /// Number of (name, service) registrations held by this context
    pub fn service_count(&self) -> usize {
        lock(&self.state).services.len()
    }

    pub fn tracker_count(&self) -> usize {
        lock(&self.state).trackers.len()
    }

    pub fn child_cluster_ids(&self) -> Vec<String> {
        lock(&self.state).children.iter().map(|(id, _)| id.clone()).collect()
    }

    pub fn register_service<T: Any + Send + Sync>(&self, service: Arc<T>, name: &str) {
        self.register_service_ref(ServiceRef::new(service), name);
    }

    pub fn unregister_service<T: Any + Send + Sync>(&self, service: &Arc<T>, name: &str) {
        self.unregister_service_ref(&ServiceRef::new(service.clone()), name);
    }

    /// Publish a factory; consumers asking for its product type get their own instance.
    pub fn register_service_factory<F: ServiceFactory + 'static>(&self, factory: Arc<F>, name: &str) {
        self.register_service_ref(ServiceRef::from_factory(factory), name);
    }

    pub fn register_service_ref(&self, service: ServiceRef, name: &str) {
        let mut state = lock(&self.state);
        match state.phase {
            ContextPhase::Stopping => {
                log::warn!("Context '{}' is stopping; ignoring registration under '{}'", self.config.name(), name);
            }
            ContextPhase::Running => {
                state.services.push(LocalService { name: name.to_string(), service: service.clone() });
                drop(state);
                if let Some(registration) = self.registry.register_service(&service, name) {
                    registration.notify_trackers(&self.registry);
                }
            }
            ContextPhase::Initializing => {
                state.services.push(LocalService { name: name.to_string(), service: service.clone() });
                if let Some(registration) = state.registrations.iter_mut().find(|r| r.service().same(&service)) {
                    registration.add_name(name);
                    return;
                }
                drop(state);
                if let Some(registration) = self.registry.register_service(&service, name) {
                    self.hold_registration(registration);
                }
            }
        }
    }

    /// Keep a fresh registration until connect, unless the phase moved on meanwhile.
    fn hold_registration(&self, registration: ServiceRegistration) {
        let mut state = lock(&self.state);
        match state.phase {
            ContextPhase::Initializing => state.registrations.push(registration),
            ContextPhase::Running => {
                drop(state);
                registration.notify_trackers(&self.registry);
            }
            ContextPhase::Stopping => {
                drop(state);
                registration.cleanup(&self.registry);
            }
        }
    }

    pub fn unregister_service_ref(&self, service: &ServiceRef, name: &str) {
        let mut state = lock(&self.state);
        let Some(pos) = state
            .services
            .iter()
            .position(|local| local.name == name && local.service.same(service))
        else {
            log::error!("Context '{}' did not register a service under '{}'", self.config.name(), name);
            return;
        };
        state.services.remove(pos);

        if state.phase == ContextPhase::Initializing {
            if let Some(index) = state.registrations.iter().position(|r| r.service().same(service)) {
                state.registrations[index].remove_name(name);
                if state.registrations[index].names().is_empty() {
                    let registration = state.registrations.remove(index);
                    drop(state);
                    registration.cleanup(&self.registry);
                }
                return;
            }
        }
        drop(state);
        self.registry.unregister_service(service, name);
    }

    pub fn register_tracker(&self, tracker: Arc<dyn ServiceTracker>, name: &str) {
        let mut state = lock(&self.state);
        if state.phase == ContextPhase::Stopping {
            log::warn!("Context '{}' is stopping; ignoring tracker for '{}'", self.config.name(), name);
            return;
        }
        state.trackers.push((name.to_string(), tracker.clone()));
        if state.connected {
            drop(state);
            self.registry.register_tracker(tracker, name);
        }
    }

    pub fn unregister_tracker(&self, tracker: &Arc<dyn ServiceTracker>, name: &str) {
        let mut state = lock(&self.state);
        let Some(pos) = state
            .trackers
            .iter()
            .position(|(n, t)| n == name && same_tracker(t, tracker))
        else {
            log::error!("Context '{}' has no tracker for '{}'", self.config.name(), name);
            return;
        };
        state.trackers.remove(pos);
        if state.connected {
            drop(state);
            self.registry.unregister_tracker(tracker, name);
        }
    }

    /// First service of type `T` under `name`.
    ///
    /// Looks in the registry, then at factories published under `name`, then,
    /// while initializing, at this context's own unpublished registrations.
    pub fn get_service<T: Any + Send + Sync>(&self, name: &str) -> Option<Arc<T>> {
        if let Some(service) = self.registry.get_service::<T>(name) {
            return Some(service);
        }
        if let Some(service) = self.factory_services::<T>(name, true).into_iter().next() {
            return Some(service);
        }
        self.pending_services::<T>(name).into_iter().next()
    }

    /// Every service of type `T` under `name` from all three sources, not deduplicated.
    pub fn get_services<T: Any + Send + Sync>(&self, name: &str) -> Vec<Arc<T>> {
        let mut services = self.registry.get_services::<T>(name);
        services.extend(self.factory_services::<T>(name, false));
        services.extend(self.pending_services::<T>(name));
        services
    }

    /// Every service under `name` regardless of type, including unpublished ones.
    pub fn get_service_refs(&self, name: &str) -> Vec<ServiceRef> {
        let mut services = self.registry.get_service_refs(name);
        let state = lock(&self.state);
        if state.phase == ContextPhase::Initializing {
            services.extend(
                state
                    .registrations
                    .iter()
                    .filter(|r| r.names().iter().any(|n| n == name))
                    .map(|r| r.service().clone()),
            );
        }
        services
    }

    pub fn get_reference(&self, service: &ServiceRef) -> Option<ServiceReference> {
        self.registry.get_reference(service)
    }

    fn factory_services<T: Any + Send + Sync>(&self, name: &str, first_only: bool) -> Vec<Arc<T>> {
        let wanted = TypeId::of::<T>();
        let mut found = Vec::new();
        for candidate in self.registry.get_service_refs(name) {
            let Some(factory) = candidate.as_factory() else { continue };
            if factory.service_type() != wanted {
                continue;
            }
            if let Some(service) = self.factory_instance(&candidate, factory).and_then(|s| s.downcast::<T>()) {
                found.push(service);
                if first_only {
                    break;
                }
            }
        }
        found
    }

    /// The instance `factory` made for this context, created on first use.
    fn factory_instance(&self, candidate: &ServiceRef, factory: &Arc<dyn ServiceFactory>) -> Option<ServiceRef> {
        let factory_key = candidate.key();
        {
            let state = lock(&self.state);
            if let Some(existing) = state.instances.iter().find(|i| i.factory_key == factory_key) {
                return Some(existing.instance.clone());
            }
            if state.phase == ContextPhase::Stopping {
                return None;
            }
        }

        let instance = factory.get_service(self)?;
        let mut state = lock(&self.state);
        if let Some(existing) = state.instances.iter().find(|i| i.factory_key == factory_key) {
            let existing = existing.instance.clone();
            drop(state);
            factory.release_service(self, &instance);
            return Some(existing);
        }
        state.instances.push(FactoryInstance { factory_key, factory: factory.clone(), instance: instance.clone() });
        Some(instance)
    }

    fn pending_services<T: Any + Send + Sync>(&self, name: &str) -> Vec<Arc<T>> {
        let state = lock(&self.state);
        if state.phase != ContextPhase::Initializing {
            return Vec::new();
        }
        state
            .registrations
            .iter()
            .filter(|r| r.names().iter().any(|n| n == name))
            .filter_map(|r| r.service().downcast::<T>())
            .collect()
    }

    /// Prepare a cluster from `template`; the control is returned unstarted.
    ///
    /// `parameters` may map service and reference slots to external service
    /// names (a forwarder is set up for each) and provide property values.
    pub fn new_cluster(&self, template: &ClusterConfig, parameters: Option<&PluginConfig>) -> Arc<ClusterControl> {
        let base = format!("{}{}{}", self.config.name(), constants::CLUSTER_INFIX, template.name());
        let cluster_id = {
            let mut state = lock(&self.state);
            let mut counter = 0usize;
            let id = loop {
                let candidate = format!("{}{}", base, counter);
                if !state.cluster_ids.contains(&candidate) {
                    break candidate;
                }
                counter += 1;
            };
            state.cluster_ids.insert(id.clone());
            id
        };

        let empty = PluginConfig::default();
        let parameters = parameters.unwrap_or(&empty);
        let decorated = decorator::decorate(template, &cluster_id, parameters);

        let mut forwarders = Vec::new();
        for slot in template.services() {
            if let (Some(internal), Some(external)) = (decorated.get_string(slot), parameters.get_string(slot)) {
                forwarders.push(ServiceForwarder::new(self.registry.clone(), internal, external));
            }
        }
        for slot in template.references() {
            if let (Some(internal), Some(external)) = (decorated.get_string(slot), parameters.get_string(slot)) {
                forwarders.push(ServiceForwarder::new(self.registry.clone(), external, internal));
            }
        }

        log::debug!(
            "Context '{}' created cluster '{}' with {} forwarders",
            self.config.name(),
            cluster_id,
            forwarders.len()
        );
        ClusterControl::new(
            self.weak_self.clone(),
            self.registry.clone(),
            self.factory.clone(),
            cluster_id,
            decorated,
            forwarders,
        )
    }

    pub(crate) fn attach_cluster(&self, id: &str, cluster: Arc<ClusterControl>) {
        let mut state = lock(&self.state);
        if state.phase == ContextPhase::Stopping {
            drop(state);
            log::warn!("Context '{}' is stopping; stopping late cluster '{}'", self.config.name(), id);
            cluster.stop();
            return;
        }
        state.children.push((id.to_string(), cluster));
    }

    pub(crate) fn detach_cluster(&self, id: &str) {
        let mut state = lock(&self.state);
        if let Some(pos) = state.children.iter().position(|(child, _)| child == id) {
            state.children.remove(pos);
        }
    }

    /// Publish buffered registrations and start the plugin.
    pub fn connect(&self, plugin: Option<Arc<dyn Plugin>>) {
        let (trackers, registrations) = {
            let mut state = lock(&self.state);
            if state.phase != ContextPhase::Initializing {
                log::warn!("Context '{}' is already connected ({:?})", self.config.name(), state.phase);
                return;
            }
            state.phase = ContextPhase::Running;
            state.connected = true;
            state.plugin = plugin.clone();
            (state.trackers.clone(), std::mem::take(&mut state.registrations))
        };

        for (name, tracker) in trackers {
            self.registry.register_tracker(tracker, &name);
        }
        for registration in registrations {
            registration.notify_trackers(&self.registry);
        }

        if let Some(plugin) = plugin {
            lock(&self.state).plugin_started = true;
            if let Err(e) = plugin.start() {
                log::error!("Plugin '{}' failed to start: {}", self.config.name(), e);
            }
        }
    }

    /// Tear down everything this context registered or started. Idempotent.
    pub fn stop(&self) {
        let (plugin, children) = {
            let mut state = lock(&self.state);
            if state.phase == ContextPhase::Stopping {
                return;
            }
            state.phase = ContextPhase::Stopping;
            let plugin = if state.plugin_started { state.plugin.clone() } else { None };
            state.plugin_started = false;
            (plugin, state.children.clone())
        };
        log::debug!("Stopping context '{}'", self.config.name());

        if let Some(plugin) = plugin {
            if let Err(e) = plugin.stop() {
                log::error!("Plugin '{}' failed to stop: {}", self.config.name(), e);
            }
        }

        for (_, cluster) in children {
            cluster.stop();
        }

        let (connected, trackers, instances, services, registrations) = {
            let mut state = lock(&self.state);
            state.children.clear();
            state.cluster_ids.clear();
            state.plugin = None;
            (
                state.connected,
                std::mem::take(&mut state.trackers),
                std::mem::take(&mut state.instances),
                std::mem::take(&mut state.services),
                std::mem::take(&mut state.registrations),
            )
        };

        if connected {
            for (name, tracker) in &trackers {
                self.registry.unregister_tracker(tracker, name);
            }
        }

        for instance in &instances {
            instance.factory.release_service(self, &instance.instance);
        }

        for local in &services {
            if registrations.iter().any(|r| r.service().same(&local.service)) {
                continue;
            }
            self.registry.unregister_service(&local.service, &local.name);
        }
        for registration in registrations {
            registration.cleanup(&self.registry);
        }
    }

    /// Stop, then re-arm for another construction attempt.
    pub fn reset(&self) {
        self.stop();
        let mut state = lock(&self.state);
        state.phase = ContextPhase::Initializing;
        state.connected = false;
    }
}
