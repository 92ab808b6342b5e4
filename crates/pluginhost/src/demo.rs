//! Built-in plugins available to `pluginhost run`.
use std::sync::Arc;

use pluginhost_core::plugin_system::TypedTracker;
use pluginhost_core::{Plugin, PluginCatalog, PluginConfig, PluginContext, PluginError, ServiceTracker};

/// Text service published by the `Greeter` plugin
#[derive(Debug)]
pub struct Greeting(pub String);

struct Greeter {
    name: String,
}

impl Plugin for Greeter {
    fn start(&self) -> pluginhost_core::Result<()> {
        log::info!("Greeter '{}' started", self.name);
        Ok(())
    }
}

struct Watcher;

impl Plugin for Watcher {}

fn required(config: &PluginConfig, key: &str) -> Result<String, PluginError> {
    config.get_string(key).ok_or_else(|| PluginError::MissingConfig(key.to_string()))
}

fn greeter(context: &Arc<PluginContext>, config: &PluginConfig) -> Result<Arc<dyn Plugin>, PluginError> {
    let service_id = required(config, "service.id")?;
    let text = config.get_string("text").unwrap_or_else(|| format!("hello from {}", config.name()));
    context.register_service(Arc::new(Greeting(text)), &service_id);
    Ok(Arc::new(Greeter { name: config.name().to_string() }))
}

fn watcher(context: &Arc<PluginContext>, config: &PluginConfig) -> Result<Arc<dyn Plugin>, PluginError> {
    let watched = required(config, "watch")?;
    let tracker: Arc<dyn ServiceTracker> = TypedTracker::<Greeting>::new(
        |greeting, name| {
            println!("  [watcher] {} appeared at {}", greeting.0, name);
            Ok(())
        },
        |greeting, name| {
            println!("  [watcher] {} left {}", greeting.0, name);
            Ok(())
        },
    );
    context.register_tracker(tracker, &watched);
    Ok(Arc::new(Watcher))
}

/// Declines unless `enabled` is true, then behaves like `Greeter`
fn optional(context: &Arc<PluginContext>, config: &PluginConfig) -> Result<Arc<dyn Plugin>, PluginError> {
    if !config.get_bool("enabled").unwrap_or(false) {
        return Err(PluginError::Declined);
    }
    greeter(context, config)
}

fn broken(_context: &Arc<PluginContext>, config: &PluginConfig) -> Result<Arc<dyn Plugin>, PluginError> {
    Err(PluginError::failed(config.get_string("reason").unwrap_or_else(|| "always broken".to_string())))
}

pub fn catalog() -> PluginCatalog {
    PluginCatalog::new()
        .with_plugin("Greeter", greeter)
        .with_plugin("Watcher", watcher)
        .with_plugin("Optional", optional)
        .with_plugin("Broken", broken)
}
