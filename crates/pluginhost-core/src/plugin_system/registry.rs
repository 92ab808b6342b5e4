use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex};
use std::thread::{self, ThreadId};

use crate::plugin_system::service::{
    same_tracker, service_id_name, ServiceKey, ServiceRef, ServiceReference, ServiceTracker,
};
use crate::utils::lock;

/// Reference record of a registered service instance
struct RefCount {
    id: u64,
    /// Number of names (excluding the synthetic self-name) referencing the service
    count: usize,
    service: ServiceRef,
}

#[derive(Default)]
struct RegistryState {
    services: HashMap<String, Vec<ServiceRef>>,
    trackers: HashMap<String, Vec<Arc<dyn ServiceTracker>>>,
    references: HashMap<ServiceKey, RefCount>,
    next_id: u64,
}

/// Registry mapping service names to published service instances.
///
/// Every instance gets a stable integer id the first time it is registered
/// and is published under the synthetic name `services.<id>` in addition to
/// its user names. The id is freed when the last user name is removed.
///
/// The registry assumes a single logical owner thread per plugin tree. Locks
/// are never held while trackers are called, so trackers may re-enter it.
pub struct ServiceRegistry {
    state: Mutex<RegistryState>,
    /// `(name, service)` pairs being forwarded, keyed by the forwarding thread
    in_flight: Mutex<Vec<InFlight>>,
}

impl fmt::Debug for ServiceRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = lock(&self.state);
        f.debug_struct("ServiceRegistry")
            .field("names", &state.services.len())
            .field("tracked_names", &state.trackers.len())
            .field("references", &state.references.len())
            .field("next_id", &state.next_id)
            .finish()
    }
}

impl ServiceRegistry {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(RegistryState { next_id: 1, ..Default::default() }),
            in_flight: Mutex::new(Vec::new()),
        })
    }

    /// Register `service` under `name`.
    ///
    /// A service new to the registry gets an id and is returned as a
    /// [`ServiceRegistration`] that the caller publishes when ready. A known
    /// service is published under `name` right away and `None` is returned.
    pub fn register_service(&self, service: &ServiceRef, name: &str) -> Option<ServiceRegistration> {
        let mut state = lock(&self.state);
        let known = match state.references.get_mut(&service.key()) {
            Some(record) => {
                record.count += 1;
                true
            }
            None => false,
        };
        if known {
            drop(state);
            self.publish(service, name);
            return None;
        }

        let id = state.next_id;
        state.next_id += 1;
        state.references.insert(service.key(), RefCount { id, count: 1, service: service.clone() });
        log::debug!("Allocated service id {} for registration under '{}'", id, name);
        Some(ServiceRegistration::new(service.clone(), id, name))
    }

    /// Drop the reference record of a registration that was never published.
    pub fn cleanup(&self, service: &ServiceRef) {
        let mut state = lock(&self.state);
        if let Some(record) = state.references.remove(&service.key()) {
            log::debug!("Released unpublished service id {}", record.id);
        }
    }

    /// Remove `service` from `name`, notifying trackers before the removal.
    pub fn unregister_service(&self, service: &ServiceRef, name: &str) {
        {
            let state = lock(&self.state);
            if !state.references.contains_key(&service.key()) {
                log::error!("Unregistering unknown service from '{}'", name);
                return;
            }
            let listed = state
                .services
                .get(name)
                .is_some_and(|list| list.iter().any(|s| s.same(service)));
            if !listed {
                log::error!("Service is not registered under '{}'", name);
                return;
            }
        }

        self.unpublish(service, name);

        let freed = {
            let mut state = lock(&self.state);
            match state.references.get_mut(&service.key()) {
                Some(record) => {
                    record.count = record.count.saturating_sub(1);
                    (record.count == 0).then_some(record.id)
                }
                None => None,
            }
        };

        if let Some(id) = freed {
            self.unpublish(service, &service_id_name(id));
            let mut state = lock(&self.state);
            // a tracker may have re-registered the service while it was being unpublished
            if state.references.get(&service.key()).is_some_and(|record| record.count == 0) {
                state.references.remove(&service.key());
                log::debug!("Freed service id {}", id);
            }
        }
    }

    /// Add a tracker for `name`; it immediately sees every service already there.
    pub fn register_tracker(&self, tracker: Arc<dyn ServiceTracker>, name: &str) {
        let current = {
            let mut state = lock(&self.state);
            state.trackers.entry(name.to_string()).or_default().push(tracker.clone());
            state.services.get(name).cloned().unwrap_or_default()
        };
        for service in &current {
            if let Err(e) = tracker.add_service(service, name) {
                log::error!("Tracker for '{}' failed to add service: {}", name, e);
            }
        }
    }

    /// Remove a tracker for `name`; it first sees every current service removed.
    pub fn unregister_tracker(&self, tracker: &Arc<dyn ServiceTracker>, name: &str) {
        let current = {
            let state = lock(&self.state);
            let known = state
                .trackers
                .get(name)
                .is_some_and(|list| list.iter().any(|t| same_tracker(t, tracker)));
            if !known {
                log::error!("Unregistering unknown tracker for '{}'", name);
                return;
            }
            state.services.get(name).cloned().unwrap_or_default()
        };
        for service in &current {
            if let Err(e) = tracker.remove_service(service, name) {
                log::error!("Tracker for '{}' failed to remove service: {}", name, e);
            }
        }

        let mut state = lock(&self.state);
        if let Some(list) = state.trackers.get_mut(name) {
            if let Some(pos) = list.iter().position(|t| same_tracker(t, tracker)) {
                list.remove(pos);
            }
            if list.is_empty() {
                state.trackers.remove(name);
            }
        }
    }

    /// Weak handle on a registered service; `None` if it was never registered.
    pub fn get_reference(self: &Arc<Self>, service: &ServiceRef) -> Option<ServiceReference> {
        let state = lock(&self.state);
        match state.references.get(&service.key()) {
            Some(record) => Some(ServiceReference::new(record.id, Arc::downgrade(self))),
            None => {
                log::error!("Requested reference for a service that is not registered");
                None
            }
        }
    }

    /// First service under `name` of type `T`
    pub fn get_service<T: Any + Send + Sync>(&self, name: &str) -> Option<Arc<T>> {
        let state = lock(&self.state);
        state
            .services
            .get(name)?
            .iter()
            .find_map(|service| service.downcast::<T>())
    }

    /// All services under `name` of type `T`, in registration order
    pub fn get_services<T: Any + Send + Sync>(&self, name: &str) -> Vec<Arc<T>> {
        let state = lock(&self.state);
        state
            .services
            .get(name)
            .map(|list| list.iter().filter_map(|service| service.downcast::<T>()).collect())
            .unwrap_or_default()
    }

    /// All services under `name`, whatever their type
    pub fn get_service_refs(&self, name: &str) -> Vec<ServiceRef> {
        lock(&self.state).services.get(name).cloned().unwrap_or_default()
    }

    /// Number of user names referencing `service`; 0 when it has no id.
    pub fn reference_count(&self, service: &ServiceRef) -> usize {
        lock(&self.state).references.get(&service.key()).map_or(0, |record| record.count)
    }

    pub fn service_id(&self, service: &ServiceRef) -> Option<u64> {
        lock(&self.state).references.get(&service.key()).map(|record| record.id)
    }

    /// Names with at least one published service, sorted
    pub fn service_names(&self) -> Vec<String> {
        let state = lock(&self.state);
        let mut names: Vec<String> = state.services.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn tracker_count(&self, name: &str) -> usize {
        lock(&self.state).trackers.get(name).map_or(0, Vec::len)
    }

    pub fn reference_total(&self) -> usize {
        lock(&self.state).references.len()
    }

    /// True when nothing is published, tracked or referenced.
    pub fn is_empty(&self) -> bool {
        let state = lock(&self.state);
        state.services.is_empty() && state.trackers.is_empty() && state.references.is_empty()
    }

    /// Services holding an id, in id order. Used for diagnostics.
    pub fn registered_services(&self) -> Vec<(u64, ServiceRef)> {
        let state = lock(&self.state);
        let mut all: Vec<(u64, ServiceRef)> = state
            .references
            .values()
            .map(|record| (record.id, record.service.clone()))
            .collect();
        all.sort_by_key(|(id, _)| *id);
        all
    }

    /// Add one more name reference to a known service.
    fn add_reference(&self, service: &ServiceRef) -> bool {
        match lock(&self.state).references.get_mut(&service.key()) {
            Some(record) => {
                record.count += 1;
                true
            }
            None => false,
        }
    }

    fn publish(&self, service: &ServiceRef, name: &str) {
        let trackers = {
            let mut state = lock(&self.state);
            state.services.entry(name.to_string()).or_default().push(service.clone());
            state.trackers.get(name).cloned().unwrap_or_default()
        };
        for tracker in &trackers {
            if let Err(e) = tracker.add_service(service, name) {
                log::error!("Tracker for '{}' failed to add service: {}", name, e);
            }
        }
    }

    fn unpublish(&self, service: &ServiceRef, name: &str) {
        let trackers = lock(&self.state).trackers.get(name).cloned().unwrap_or_default();
        for tracker in &trackers {
            if let Err(e) = tracker.remove_service(service, name) {
                log::error!("Tracker for '{}' failed to remove service: {}", name, e);
            }
        }

        let mut state = lock(&self.state);
        match state.services.get_mut(name) {
            Some(list) => {
                if let Some(pos) = list.iter().position(|s| s.same(service)) {
                    list.remove(pos);
                }
                if list.is_empty() {
                    state.services.remove(name);
                }
            }
            None => log::error!("No services registered under '{}'", name),
        }
    }

    /// Whether the current thread is forwarding `service` out of `name`.
    pub(crate) fn is_forwarding(&self, name: &str, service: &ServiceRef) -> bool {
        let marker = InFlight::new(name, service);
        lock(&self.in_flight).contains(&marker)
    }

    /// Mark `(name, service)` as being forwarded by this thread until the guard drops.
    pub(crate) fn enter_forwarding(&self, name: &str, service: &ServiceRef) -> ForwardingGuard<'_> {
        let marker = InFlight::new(name, service);
        lock(&self.in_flight).push(marker.clone());
        ForwardingGuard { registry: self, marker }
    }
}

#[derive(Clone, PartialEq, Eq)]
struct InFlight {
    thread: ThreadId,
    name: String,
    key: ServiceKey,
}

impl InFlight {
    fn new(name: &str, service: &ServiceRef) -> Self {
        Self { thread: thread::current().id(), name: name.to_string(), key: service.key() }
    }
}

/// Scope of one forwarding step; pops the in-flight marker on drop.
pub(crate) struct ForwardingGuard<'a> {
    registry: &'a ServiceRegistry,
    marker: InFlight,
}

impl Drop for ForwardingGuard<'_> {
    fn drop(&mut self) {
        let mut stack = lock(&self.registry.in_flight);
        if let Some(pos) = stack.iter().rposition(|m| *m == self.marker) {
            stack.remove(pos);
        }
        if stack.is_empty() {
            *stack = Vec::new();
        }
    }
}

/// A registration that has an id but is not yet visible under its names.
#[derive(Debug)]
pub struct ServiceRegistration {
    service: ServiceRef,
    id: u64,
    names: Vec<String>,
}

impl ServiceRegistration {
    fn new(service: ServiceRef, id: u64, name: &str) -> Self {
        Self { service, id, names: vec![name.to_string()] }
    }

    pub fn service(&self) -> &ServiceRef {
        &self.service
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn add_name(&mut self, name: &str) {
        self.names.push(name.to_string());
    }

    pub fn remove_name(&mut self, name: &str) {
        if let Some(pos) = self.names.iter().position(|n| n == name) {
            self.names.remove(pos);
        }
    }

    /// Publish the service under its self-name and every accumulated name.
    pub fn notify_trackers(self, registry: &ServiceRegistry) {
        registry.publish(&self.service, &service_id_name(self.id));
        for (index, name) in self.names.iter().enumerate() {
            // the first name is covered by the count the record was created with
            if index > 0 && !registry.add_reference(&self.service) {
                log::error!("Service id {} vanished before it was published under '{}'", self.id, name);
                continue;
            }
            registry.publish(&self.service, name);
        }
    }

    /// Abandon the registration without publishing anything.
    pub fn cleanup(self, registry: &ServiceRegistry) {
        registry.cleanup(&self.service);
    }
}
