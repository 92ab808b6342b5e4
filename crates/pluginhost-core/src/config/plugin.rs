use std::collections::BTreeMap;
use std::path::Path;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::kernel::constants;
use crate::plugin_system::error::PluginSystemError;

use super::ConfigFormat;

/// Configuration of a single plugin instance
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PluginConfig {
    /// Instance name; unique among the siblings of a cluster
    #[serde(default)]
    name: String,
    #[serde(flatten)]
    values: BTreeMap<String, Value>,
}

impl PluginConfig {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into(), values: BTreeMap::new() }
    }

    /// Builder-style `put`
    pub fn with(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.put(key, value);
        self
    }

    pub fn from_str(data: &str, format: ConfigFormat) -> Result<Self, PluginSystemError> {
        format.parse(data)
    }

    pub fn load(path: &Path) -> Result<Self, PluginSystemError> {
        super::load_document(path)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn set_name(&mut self, name: impl Into<String>) {
        self.name = name.into();
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.values.get(key)
    }

    /// String view of a scalar value. Arrays, objects and nulls yield `None`.
    pub fn get_string(&self, key: &str) -> Option<String> {
        match self.values.get(key)? {
            Value::String(s) => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            Value::Bool(b) => Some(b.to_string()),
            _ => None,
        }
    }

    /// A list of strings. A single string is treated as a one-element list.
    pub fn get_strings(&self, key: &str) -> Vec<String> {
        match self.values.get(key) {
            Some(Value::Array(items)) => items
                .iter()
                .filter_map(|item| item.as_str().map(str::to_string))
                .collect(),
            Some(Value::String(s)) => vec![s.clone()],
            _ => Vec::new(),
        }
    }

    pub fn get_bool(&self, key: &str) -> Option<bool> {
        match self.values.get(key)? {
            Value::Bool(b) => Some(*b),
            Value::String(s) => s.parse().ok(),
            _ => None,
        }
    }

    /// Deserialize a value into any serde type
    pub fn get_as<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        self.values
            .get(key)
            .and_then(|value| serde_json::from_value(value.clone()).ok())
    }

    pub fn put(&mut self, key: &str, value: impl Into<Value>) {
        self.values.insert(key.to_string(), value.into());
    }

    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.values.remove(key)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &String> {
        self.values.keys()
    }

    pub fn values(&self) -> &BTreeMap<String, Value> {
        &self.values
    }

    pub(crate) fn values_mut(&mut self) -> &mut BTreeMap<String, Value> {
        &mut self.values
    }

    /// Name of the plugin implementation, from `plugin.class`
    pub fn plugin_class(&self) -> Option<String> {
        self.get_string(constants::PLUGIN_CLASS).filter(|class| !class.is_empty())
    }

    /// Render target this plugin fills, from `wicket.id`
    pub fn render_target(&self) -> Option<String> {
        self.get_string(constants::RENDER_TARGET).filter(|id| !id.is_empty())
    }
}
