#![cfg(test)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use crate::config::PluginConfig;
use crate::kernel::error::Result;
use crate::plugin_system::context::PluginContext;
use crate::plugin_system::error::PluginError;
use crate::plugin_system::factory::{PluginCatalog, PluginFactory};
use crate::plugin_system::registry::ServiceRegistry;
use crate::plugin_system::service::{ServiceRef, ServiceTracker};
use crate::plugin_system::traits::Plugin;

/// A service identified by a label in test assertions
#[derive(Debug)]
pub struct Named(pub String);

pub fn named(label: &str) -> Arc<Named> {
    Arc::new(Named(label.to_string()))
}

pub fn label_of(service: &ServiceRef) -> String {
    service.downcast::<Named>().map(|n| n.0.clone()).unwrap_or_else(|| "?".to_string())
}

/// Publish `service` under `name` directly on the registry.
pub fn publish(registry: &ServiceRegistry, service: &Arc<Named>, name: &str) -> ServiceRef {
    let service = ServiceRef::new(service.clone());
    if let Some(registration) = registry.register_service(&service, name) {
        registration.notify_trackers(registry);
    }
    service
}

/// Tracker that records `+label@name` / `-label@name` events
#[derive(Default)]
pub struct RecordingTracker {
    events: Mutex<Vec<String>>,
}

impl RecordingTracker {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn events(&self) -> Vec<String> {
        self.events.lock().unwrap().clone()
    }

    pub fn clear(&self) {
        self.events.lock().unwrap().clear();
    }
}

impl ServiceTracker for RecordingTracker {
    fn add_service(&self, service: &ServiceRef, name: &str) -> Result<()> {
        self.events.lock().unwrap().push(format!("+{}@{}", label_of(service), name));
        Ok(())
    }

    fn remove_service(&self, service: &ServiceRef, name: &str) -> Result<()> {
        self.events.lock().unwrap().push(format!("-{}@{}", label_of(service), name));
        Ok(())
    }
}

pub fn as_tracker<T: ServiceTracker + 'static>(tracker: &Arc<T>) -> Arc<dyn ServiceTracker> {
    tracker.clone()
}

pub fn empty_factory() -> Arc<PluginFactory> {
    PluginFactory::new(PluginCatalog::new())
}

pub fn context(registry: &Arc<ServiceRegistry>, name: &str) -> Arc<PluginContext> {
    PluginContext::new(registry.clone(), empty_factory(), PluginConfig::new(name))
}

/// Plugin counting its lifecycle hooks
#[derive(Default)]
pub struct CountingPlugin {
    pub starts: AtomicUsize,
    pub stops: AtomicUsize,
}

impl CountingPlugin {
    pub fn starts(&self) -> usize {
        self.starts.load(Ordering::SeqCst)
    }

    pub fn stops(&self) -> usize {
        self.stops.load(Ordering::SeqCst)
    }
}

impl Plugin for CountingPlugin {
    fn start(&self) -> Result<()> {
        self.starts.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn stop(&self) -> Result<()> {
        self.stops.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Plugin that publishes a `Named` service under its `service.id` config value
pub struct ProviderPlugin;

impl Plugin for ProviderPlugin {}

pub fn provider(context: &Arc<PluginContext>, config: &PluginConfig) -> std::result::Result<Arc<dyn Plugin>, PluginError> {
    let name = config
        .get_string("service.id")
        .ok_or_else(|| PluginError::MissingConfig("service.id".to_string()))?;
    let label = config.get_string("label").unwrap_or_else(|| config.name().to_string());
    context.register_service(named(&label), &name);
    Ok(Arc::new(ProviderPlugin))
}

/// Catalog with `Provider`, `Decliner`, `Failer` and `Panicker`
pub fn test_catalog() -> PluginCatalog {
    PluginCatalog::new()
        .with_plugin("Provider", provider)
        .with_plugin("Decliner", |context: &Arc<PluginContext>, _config: &PluginConfig| {
            context.register_service(named("left-behind"), "declined.service");
            Err(PluginError::Declined)
        })
        .with_plugin("Failer", |context: &Arc<PluginContext>, _config: &PluginConfig| {
            context.register_service(named("half-done"), "failed.service");
            Err(PluginError::failed("cannot work today"))
        })
        .with_plugin("Panicker", |_context: &Arc<PluginContext>, _config: &PluginConfig| -> std::result::Result<Arc<dyn Plugin>, PluginError> {
            panic!("constructor blew up")
        })
}

pub fn provider_config(name: &str, service_id: &str) -> PluginConfig {
    PluginConfig::new(name)
        .with("plugin.class", "Provider")
        .with("service.id", service_id)
}
