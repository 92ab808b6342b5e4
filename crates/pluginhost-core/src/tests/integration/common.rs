#![cfg(test)]

use std::sync::{Arc, Mutex};

use crate::config::{ClusterConfig, PluginConfig};
use crate::kernel::error::Result;
use crate::plugin_system::{
    ClusterControl, Plugin, PluginCatalog, PluginContext, PluginError, ServiceTracker, TypedTracker,
};

/// Shared, ordered record of what the scenario plugins did
pub type EventLog = Arc<Mutex<Vec<String>>>;

pub fn event_log() -> EventLog {
    Arc::new(Mutex::new(Vec::new()))
}

pub fn events(log: &EventLog) -> Vec<String> {
    log.lock().unwrap().clone()
}

/// The service type every scenario plugin publishes
#[derive(Debug)]
pub struct Greeting(pub String);

/// Publishes a greeting under `service.id`
pub struct LeafPlugin {
    name: String,
    log: EventLog,
}

impl Plugin for LeafPlugin {
    fn start(&self) -> Result<()> {
        self.log.lock().unwrap().push(format!("start {}", self.name));
        Ok(())
    }

    fn stop(&self) -> Result<()> {
        self.log.lock().unwrap().push(format!("stop {}", self.name));
        Ok(())
    }
}

/// Publishes `foo` and runs a sub-cluster whose `bar` slot is forwarded to `foo.proxy`
pub struct HostPlugin {
    cluster: Arc<ClusterControl>,
}

impl Plugin for HostPlugin {
    fn stop(&self) -> Result<()> {
        self.cluster.stop();
        Ok(())
    }
}

pub fn leaf_template() -> ClusterConfig {
    ClusterConfig::new("leaf")
        .with_service("bar")
        .with_property("greeting", "hello")
        .with_plugin(
            PluginConfig::new("leaf")
                .with("plugin.class", "Leaf")
                .with("service.id", "${bar}")
                .with("text", "${greeting} from the leaf"),
        )
}

/// Catalog of the scenario plugins: `Host`, `Leaf`, `Nester` and `Watcher`
pub fn scenario_catalog(log: &EventLog) -> PluginCatalog {
    let leaf_log = log.clone();
    let watcher_log = log.clone();
    PluginCatalog::new()
        .with_plugin("Leaf", move |context: &Arc<PluginContext>, config: &PluginConfig| {
            let name = config
                .get_string("service.id")
                .ok_or_else(|| PluginError::MissingConfig("service.id".to_string()))?;
            let text = config.get_string("text").unwrap_or_else(|| config.name().to_string());
            context.register_service(Arc::new(Greeting(text)), &name);
            Ok(Arc::new(LeafPlugin { name: config.name().to_string(), log: leaf_log.clone() }) as Arc<dyn Plugin>)
        })
        .with_plugin("Host", |context: &Arc<PluginContext>, config: &PluginConfig| {
            let own = config.get_string("service.id").unwrap_or_else(|| "foo".to_string());
            context.register_service(Arc::new(Greeting(format!("{} itself", own))), &own);

            let parameters = PluginConfig::new("parameters")
                .with("bar", format!("{}.proxy", own))
                .with("greeting", config.get_string("greeting").unwrap_or_else(|| "hi".to_string()));
            let cluster = context.new_cluster(&leaf_template(), Some(&parameters));
            cluster.start();
            Ok(Arc::new(HostPlugin { cluster }) as Arc<dyn Plugin>)
        })
        .with_plugin("Nester", |context: &Arc<PluginContext>, config: &PluginConfig| {
            // a cluster whose only plugin is itself a host
            let inner = ClusterConfig::new("inner").with_plugin(
                PluginConfig::new("host")
                    .with("plugin.class", "Host")
                    .with("service.id", config.get_string("service.id").unwrap_or_else(|| "deep".to_string())),
            );
            let cluster = context.new_cluster(&inner, None);
            cluster.start();
            Ok(Arc::new(HostPlugin { cluster }) as Arc<dyn Plugin>)
        })
        .with_plugin("Watcher", move |context: &Arc<PluginContext>, config: &PluginConfig| {
            let watched = config
                .get_string("watch")
                .ok_or_else(|| PluginError::MissingConfig("watch".to_string()))?;
            let on_add = watcher_log.clone();
            let on_remove = watcher_log.clone();
            let tracker: Arc<dyn ServiceTracker> = TypedTracker::<Greeting>::new(
                move |greeting, name| {
                    on_add.lock().unwrap().push(format!("seen {} at {}", greeting.0, name));
                    Ok(())
                },
                move |greeting, name| {
                    on_remove.lock().unwrap().push(format!("lost {} at {}", greeting.0, name));
                    Ok(())
                },
            );
            context.register_tracker(tracker, &watched);
            Ok(Arc::new(LeafPlugin { name: config.name().to_string(), log: watcher_log.clone() }) as Arc<dyn Plugin>)
        })
}
