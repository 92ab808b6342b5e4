use std::fmt;
use std::sync::{Arc, Mutex, Weak};

use crate::kernel::error::Result;
use crate::plugin_system::registry::ServiceRegistry;
use crate::plugin_system::service::{ServiceRef, ServiceTracker};
use crate::utils::lock;

#[derive(Default)]
struct ForwarderState {
    started: bool,
    connected: bool,
    /// Services seen under the source while not connected
    pending: Vec<ServiceRef>,
    /// Services this forwarder registered under the target
    forwarded: Vec<ServiceRef>,
}

/// Tracker that republishes every service seen under `source` under `target`.
///
/// Forwarding is cycle safe: when `A -> B` and `B -> A` forwarders both exist,
/// a service entering either name is registered under each name exactly once.
pub struct ServiceForwarder {
    registry: Arc<ServiceRegistry>,
    source: String,
    target: String,
    weak_self: Weak<ServiceForwarder>,
    state: Mutex<ForwarderState>,
}

impl fmt::Debug for ServiceForwarder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = lock(&self.state);
        f.debug_struct("ServiceForwarder")
            .field("source", &self.source)
            .field("target", &self.target)
            .field("connected", &state.connected)
            .field("forwarded", &state.forwarded.len())
            .finish()
    }
}

impl ServiceForwarder {
    pub fn new(registry: Arc<ServiceRegistry>, source: impl Into<String>, target: impl Into<String>) -> Arc<Self> {
        let source = source.into();
        let target = target.into();
        Arc::new_cyclic(|weak_self| Self {
            registry,
            source,
            target,
            weak_self: weak_self.clone(),
            state: Mutex::new(ForwarderState::default()),
        })
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn target(&self) -> &str {
        &self.target
    }

    pub fn is_connected(&self) -> bool {
        lock(&self.state).connected
    }

    /// Start tracking the source. Services are buffered until [`connect`](Self::connect).
    pub fn start(&self) {
        {
            let mut state = lock(&self.state);
            if state.started {
                log::warn!("Forwarder {} -> {} already started", self.source, self.target);
                return;
            }
            state.started = true;
        }
        if let Some(me) = self.as_tracker() {
            self.registry.register_tracker(me, &self.source);
        }
    }

    /// Forward everything buffered so far and every service seen from now on.
    pub fn connect(&self) {
        let pending = {
            let mut state = lock(&self.state);
            if !state.started || state.connected {
                log::warn!(
                    "Forwarder {} -> {} cannot connect (started: {}, connected: {})",
                    self.source, self.target, state.started, state.connected
                );
                return;
            }
            state.connected = true;
            std::mem::take(&mut state.pending)
        };
        for service in pending {
            // already carried over by a reverse forwarder that connected first
            if self.registry.get_service_refs(&self.target).iter().any(|s| s.same(&service)) {
                log::debug!("Forwarder {} -> {}: service already in target", self.source, self.target);
                continue;
            }
            self.forward_and_record(&service);
        }
    }

    /// Withdraw every forwarded service; tracking continues, buffered again.
    pub fn disconnect(&self) {
        let forwarded = {
            let mut state = lock(&self.state);
            if !state.connected {
                return;
            }
            state.connected = false;
            std::mem::take(&mut state.forwarded)
        };
        for service in &forwarded {
            self.unforward(service);
        }
        lock(&self.state).pending.extend(forwarded);
    }

    /// Stop tracking the source. Safe to call more than once.
    pub fn stop(&self) {
        self.disconnect();
        {
            let mut state = lock(&self.state);
            if !state.started {
                return;
            }
            state.started = false;
        }
        if let Some(me) = self.as_tracker() {
            self.registry.unregister_tracker(&me, &self.source);
        }
        lock(&self.state).pending.clear();
    }

    fn as_tracker(&self) -> Option<Arc<dyn ServiceTracker>> {
        let me: Arc<dyn ServiceTracker> = self.weak_self.upgrade()?;
        Some(me)
    }

    fn forward_and_record(&self, service: &ServiceRef) {
        if self.forward(service) {
            lock(&self.state).forwarded.push(service.clone());
        }
    }

    fn forward(&self, service: &ServiceRef) -> bool {
        if self.registry.is_forwarding(&self.target, service) {
            log::debug!(
                "Skipping forward {} -> {}: service is already being forwarded into '{}'",
                self.source, self.target, self.target
            );
            return false;
        }
        let _guard = self.registry.enter_forwarding(&self.source, service);
        if let Some(registration) = self.registry.register_service(service, &self.target) {
            registration.notify_trackers(&self.registry);
        }
        true
    }

    fn unforward(&self, service: &ServiceRef) {
        if self.registry.is_forwarding(&self.target, service) {
            log::debug!("Skipping unforward {} -> {}: already in progress", self.source, self.target);
            return;
        }
        let _guard = self.registry.enter_forwarding(&self.source, service);
        self.registry.unregister_service(service, &self.target);
    }
}

impl ServiceTracker for ServiceForwarder {
    fn add_service(&self, service: &ServiceRef, _name: &str) -> Result<()> {
        {
            let mut state = lock(&self.state);
            if !state.connected {
                state.pending.push(service.clone());
                return Ok(());
            }
        }
        self.forward_and_record(service);
        Ok(())
    }

    fn remove_service(&self, service: &ServiceRef, _name: &str) -> Result<()> {
        let was_forwarded = {
            let mut state = lock(&self.state);
            if !state.connected {
                if let Some(pos) = state.pending.iter().position(|s| s.same(service)) {
                    state.pending.remove(pos);
                }
                return Ok(());
            }
            match state.forwarded.iter().position(|s| s.same(service)) {
                Some(pos) => {
                    state.forwarded.remove(pos);
                    true
                }
                None => false,
            }
        };
        if was_forwarded {
            self.unforward(service);
        }
        Ok(())
    }
}
