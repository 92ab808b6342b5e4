//! Instantiation of cluster templates.
//!
//! A template names its slots abstractly. Decorating it for a concrete
//! cluster id gives every service and reference slot a globally unique
//! service name, fills property slots from the caller's parameters and
//! expands `${slot}` placeholders in the contained plugin configs.
use std::collections::BTreeMap;

use serde_json::Value;

use crate::config::{ClusterConfig, PluginConfig};

/// Synthetic service name of `slot` inside the cluster `cluster_id`.
pub fn slot_service_name(cluster_id: &str, slot: &str) -> String {
    format!("{}.{}", cluster_id, slot)
}

pub fn decorate(template: &ClusterConfig, cluster_id: &str, parameters: &PluginConfig) -> ClusterConfig {
    let mut decorated = template.clone();
    decorated.set_name(cluster_id);

    for slot in template.services().iter().chain(template.references()) {
        decorated.put(slot, slot_service_name(cluster_id, slot));
    }
    for slot in template.properties() {
        if let Some(value) = parameters.get(slot) {
            decorated.put(slot, value.clone());
        }
    }

    let variables: BTreeMap<String, Value> = template
        .services()
        .iter()
        .chain(template.references())
        .chain(template.properties())
        .filter_map(|slot| decorated.get(slot).map(|value| (slot.clone(), value.clone())))
        .collect();

    for (index, plugin) in decorated.plugins_mut().iter_mut().enumerate() {
        let local = if plugin.name().is_empty() {
            format!("plugin{}", index)
        } else {
            plugin.name().to_string()
        };
        plugin.set_name(format!("{}.{}", cluster_id, local));
        for value in plugin.values_mut().values_mut() {
            expand(value, &variables);
        }
    }
    decorated
}

fn expand(value: &mut Value, variables: &BTreeMap<String, Value>) {
    let replacement = match &*value {
        Value::String(text) => whole_placeholder(text).and_then(|key| variables.get(key)).cloned(),
        _ => None,
    };
    if let Some(replacement) = replacement {
        *value = replacement;
        return;
    }
    match value {
        Value::String(text) if text.contains("${") => *text = interpolate(text, variables),
        Value::Array(items) => items.iter_mut().for_each(|item| expand(item, variables)),
        Value::Object(map) => map.values_mut().for_each(|item| expand(item, variables)),
        _ => {}
    }
}

fn whole_placeholder(text: &str) -> Option<&str> {
    let key = text.strip_prefix("${")?.strip_suffix('}')?;
    (!key.contains('}')).then_some(key)
}

/// Replace every known `${key}` by the scalar's text; unknown keys stay verbatim.
fn interpolate(text: &str, variables: &BTreeMap<String, Value>) -> String {
    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(start) = rest.find("${") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        let Some(end) = after.find('}') else {
            out.push_str(&rest[start..]);
            return out;
        };
        let key = &after[..end];
        match variables.get(key).and_then(scalar_text) {
            Some(replacement) => out.push_str(&replacement),
            None => out.push_str(&rest[start..start + 2 + end + 1]),
        }
        rest = &after[end + 1..];
    }
    out.push_str(rest);
    out
}

fn scalar_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}
