use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::plugin_system::error::PluginSystemError;

use super::{ConfigFormat, PluginConfig};

/// A cluster template: the plugins to start together and the slots through
/// which the cluster talks to its surroundings.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ClusterConfig {
    #[serde(default)]
    name: String,
    /// Slots for services the cluster exposes
    #[serde(default)]
    services: Vec<String>,
    /// Slots for services the cluster consumes
    #[serde(default)]
    references: Vec<String>,
    /// Plain value slots
    #[serde(default)]
    properties: Vec<String>,
    #[serde(default)]
    plugins: Vec<PluginConfig>,
    #[serde(flatten)]
    values: BTreeMap<String, Value>,
}

impl ClusterConfig {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into(), ..Default::default() }
    }

    pub fn from_str(data: &str, format: ConfigFormat) -> Result<Self, PluginSystemError> {
        format.parse(data)
    }

    pub fn load(path: &Path) -> Result<Self, PluginSystemError> {
        super::load_document(path)
    }

    pub fn with_service(mut self, slot: &str) -> Self {
        self.services.push(slot.to_string());
        self
    }

    pub fn with_reference(mut self, slot: &str) -> Self {
        self.references.push(slot.to_string());
        self
    }

    pub fn with_property(mut self, slot: &str, default: impl Into<Value>) -> Self {
        self.properties.push(slot.to_string());
        self.values.insert(slot.to_string(), default.into());
        self
    }

    pub fn with_plugin(mut self, plugin: PluginConfig) -> Self {
        self.plugins.push(plugin);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn services(&self) -> &[String] {
        &self.services
    }

    pub fn references(&self) -> &[String] {
        &self.references
    }

    pub fn properties(&self) -> &[String] {
        &self.properties
    }

    pub fn plugins(&self) -> &[PluginConfig] {
        &self.plugins
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.values.get(key)
    }

    pub fn get_string(&self, key: &str) -> Option<String> {
        match self.values.get(key)? {
            Value::String(s) => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            Value::Bool(b) => Some(b.to_string()),
            _ => None,
        }
    }

    pub fn put(&mut self, key: &str, value: impl Into<Value>) {
        self.values.insert(key.to_string(), value.into());
    }

    pub(crate) fn set_name(&mut self, name: impl Into<String>) {
        self.name = name.into();
    }

    pub(crate) fn plugins_mut(&mut self) -> &mut Vec<PluginConfig> {
        &mut self.plugins
    }
}
