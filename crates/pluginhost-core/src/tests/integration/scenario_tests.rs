#![cfg(test)]

use crate::config::PluginConfig;
use crate::plugin_system::PluginManager;

use super::common::{event_log, events, scenario_catalog, Greeting};

fn host_config(name: &str, service_id: &str) -> PluginConfig {
    PluginConfig::new(name).with("plugin.class", "Host").with("service.id", service_id)
}

#[test]
fn test_host_with_forwarded_sub_cluster() {
    let log = event_log();
    let manager = PluginManager::new(scenario_catalog(&log));
    let registry = manager.registry().clone();

    let host = manager.start(host_config("host", "foo")).expect("host starts");
    assert_eq!(registry.get_service::<Greeting>("foo").unwrap().0, "foo itself");
    assert_eq!(registry.get_service::<Greeting>("foo.proxy").unwrap().0, "hi from the leaf");
    assert_eq!(host.child_cluster_ids(), vec!["host.cluster.leaf0"]);
    assert_eq!(host.get_service_refs("host.cluster.leaf0").len(), 1);
    assert_eq!(events(&log), vec!["start host.cluster.leaf0.leaf"]);

    host.stop();
    assert_eq!(events(&log), vec!["start host.cluster.leaf0.leaf", "stop host.cluster.leaf0.leaf"]);
    assert!(registry.get_service_refs("foo").is_empty());
    assert!(registry.get_service_refs("foo.proxy").is_empty());
    assert!(registry.is_empty());
}

#[test]
fn test_watcher_sees_forwarded_service_come_and_go() {
    let log = event_log();
    let manager = PluginManager::new(scenario_catalog(&log));

    let watcher = manager
        .start(PluginConfig::new("watcher").with("plugin.class", "Watcher").with("watch", "foo.proxy"))
        .expect("watcher starts");
    let host = manager.start(host_config("host", "foo")).expect("host starts");
    assert!(events(&log).contains(&"seen hi from the leaf at foo.proxy".to_string()));

    host.stop();
    assert!(events(&log).contains(&"lost hi from the leaf at foo.proxy".to_string()));

    watcher.stop();
    assert!(manager.registry().is_empty());
}

#[test]
fn test_late_watcher_gets_replay() {
    let log = event_log();
    let manager = PluginManager::new(scenario_catalog(&log));
    let host = manager.start(host_config("host", "foo")).expect("host starts");

    let watcher = manager
        .start(PluginConfig::new("watcher").with("plugin.class", "Watcher").with("watch", "foo"))
        .expect("watcher starts");
    assert_eq!(events(&log).last().map(String::as_str), Some("start watcher"));
    assert!(events(&log).contains(&"seen foo itself at foo".to_string()));

    watcher.stop();
    host.stop();
    assert!(manager.registry().is_empty());
}

#[test]
fn test_nested_clusters_tear_down_completely() {
    let log = event_log();
    let manager = PluginManager::new(scenario_catalog(&log));
    let registry = manager.registry().clone();

    let nest = manager
        .start(PluginConfig::new("nest").with("plugin.class", "Nester").with("service.id", "deep"))
        .expect("nester starts");
    assert_eq!(nest.child_cluster_ids(), vec!["nest.cluster.inner0"]);
    assert_eq!(registry.get_service::<Greeting>("deep").unwrap().0, "deep itself");
    assert_eq!(registry.get_service::<Greeting>("deep.proxy").unwrap().0, "hi from the leaf");
    assert_eq!(events(&log), vec!["start nest.cluster.inner0.host.cluster.leaf0.leaf"]);

    nest.stop();
    assert_eq!(events(&log).last().map(String::as_str), Some("stop nest.cluster.inner0.host.cluster.leaf0.leaf"));
    assert!(registry.is_empty());
}

#[test]
fn test_independent_hosts() {
    let log = event_log();
    let manager = PluginManager::new(scenario_catalog(&log));
    let registry = manager.registry().clone();

    let left = manager.start(host_config("left", "a")).expect("left starts");
    let right = manager.start(host_config("right", "b")).expect("right starts");
    assert!(registry.get_service::<Greeting>("a.proxy").is_some());
    assert!(registry.get_service::<Greeting>("b.proxy").is_some());

    left.stop();
    assert!(registry.get_service_refs("a").is_empty());
    assert!(registry.get_service_refs("a.proxy").is_empty());
    assert_eq!(registry.get_service::<Greeting>("b").unwrap().0, "b itself");
    assert!(registry.get_service::<Greeting>("b.proxy").is_some());

    right.stop();
    assert!(registry.is_empty());
}

#[test]
fn test_manager_stop_ends_clusters_from_templates() {
    let log = event_log();
    let manager = PluginManager::new(scenario_catalog(&log));
    let parameters = PluginConfig::new("params").with("bar", "top.proxy").with("greeting", "hey");

    let cluster = manager.start_cluster(&super::common::leaf_template(), Some(&parameters)).expect("cluster runs");
    assert_eq!(manager.registry().get_service::<Greeting>("top.proxy").unwrap().0, "hey from the leaf");
    assert_eq!(cluster.get_service::<Greeting>("bar").unwrap().0, "hey from the leaf");

    manager.stop();
    assert!(manager.registry().is_empty());
    assert!(cluster.get_service::<Greeting>("bar").is_none());
}

#[cfg(feature = "yaml-config")]
#[test]
fn test_application_runs_yaml_template() {
    use crate::kernel::Application;

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("site.yaml");
    std::fs::write(
        &path,
        r#"
name: site
properties: [greeting]
greeting: howdy
plugins:
  - name: main
    plugin.class: Host
    service.id: site
    greeting: "${greeting}"
"#,
    )
    .unwrap();

    let log = event_log();
    let mut app = Application::new(scenario_catalog(&log));
    let parameters = PluginConfig::new("params").with("greeting", "yo");
    let cluster = app.load_and_run(&path, &parameters).expect("template runs");
    assert_eq!(cluster.plugin_contexts().len(), 1);

    let registry = app.plugin_manager().registry().clone();
    assert_eq!(registry.get_service::<Greeting>("site.proxy").unwrap().0, "yo from the leaf");
    app.shutdown().expect("clean shutdown");
    assert!(registry.is_empty());
}
