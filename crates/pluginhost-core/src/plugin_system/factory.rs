//! Plugin instantiation.
//!
//! The [`PluginFactory`] resolves the implementation named by a config's
//! `plugin.class` in a [`PluginCatalog`] and runs its constructor. Nothing a
//! constructor does, including panicking, escapes [`PluginFactory::create_plugin`]:
//! failures end in a reset context and, when the config names a render target,
//! an [`ErrorPlugin`] standing in for the plugin.
use std::collections::HashMap;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use crate::config::PluginConfig;
use crate::kernel::constants;
use crate::plugin_system::context::PluginContext;
use crate::plugin_system::error::PluginError;
use crate::plugin_system::traits::{Plugin, PluginConstructor};

/// Name to constructor table, plus markup for layout-only plugins.
#[derive(Clone, Default)]
pub struct PluginCatalog {
    constructors: HashMap<String, PluginConstructor>,
    /// Markup keyed by resource path, e.g. `site/Header.html`
    layouts: HashMap<String, String>,
}

impl fmt::Debug for PluginCatalog {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PluginCatalog")
            .field("plugins", &self.names())
            .field("layouts", &self.layouts.len())
            .finish()
    }
}

impl PluginCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<F>(&mut self, class: &str, constructor: F)
    where
        F: Fn(&Arc<PluginContext>, &PluginConfig) -> Result<Arc<dyn Plugin>, PluginError> + Send + Sync + 'static,
    {
        if self.constructors.insert(class.to_string(), Arc::new(constructor)).is_some() {
            log::warn!("Plugin class '{}' registered twice; keeping the last one", class);
        }
    }

    pub fn with_plugin<F>(mut self, class: &str, constructor: F) -> Self
    where
        F: Fn(&Arc<PluginContext>, &PluginConfig) -> Result<Arc<dyn Plugin>, PluginError> + Send + Sync + 'static,
    {
        self.register(class, constructor);
        self
    }

    pub fn register_layout(&mut self, path: &str, markup: impl Into<String>) {
        self.layouts.insert(path.to_string(), markup.into());
    }

    pub fn with_layout(mut self, path: &str, markup: impl Into<String>) -> Self {
        self.register_layout(path, markup);
        self
    }

    /// Registered class names, sorted
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.constructors.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn resolve(&self, class: &str) -> Option<PluginConstructor> {
        self.constructors.get(class).cloned()
    }

    pub fn layout(&self, path: &str) -> Option<&str> {
        self.layouts.get(path).map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.constructors.is_empty() && self.layouts.is_empty()
    }
}

/// Resource path of the markup for a class name: `a.b.Layout` -> `a/b/Layout.html`.
pub fn layout_path(class: &str) -> String {
    format!("{}.{}", class.replace('.', "/"), constants::LAYOUT_EXTENSION)
}

/// What became of a plugin construction attempt.
pub enum PluginOutcome {
    Started(Arc<dyn Plugin>),
    /// The plugin chose not to participate
    Declined,
    Failed {
        message: String,
        /// Error display registered under the config's render target, if any
        fallback: Option<Arc<dyn Plugin>>,
    },
}

impl fmt::Debug for PluginOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PluginOutcome::Started(_) => f.write_str("Started"),
            PluginOutcome::Declined => f.write_str("Declined"),
            PluginOutcome::Failed { message, fallback } => f
                .debug_struct("Failed")
                .field("message", message)
                .field("fallback", &fallback.is_some())
                .finish(),
        }
    }
}

impl PluginOutcome {
    /// The plugin to connect the context with, if any
    pub fn plugin(&self) -> Option<Arc<dyn Plugin>> {
        match self {
            PluginOutcome::Started(plugin) => Some(plugin.clone()),
            PluginOutcome::Failed { fallback, .. } => fallback.clone(),
            PluginOutcome::Declined => None,
        }
    }

    pub fn is_started(&self) -> bool {
        matches!(self, PluginOutcome::Started(_))
    }
}

/// Plugin made of markup only; fills its render target.
#[derive(Debug)]
pub struct LayoutPlugin {
    path: String,
    markup: String,
}

impl LayoutPlugin {
    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn markup(&self) -> &str {
        &self.markup
    }
}

impl Plugin for LayoutPlugin {}

/// Stands in for a plugin that failed to construct.
#[derive(Debug)]
pub struct ErrorPlugin {
    message: String,
}

impl ErrorPlugin {
    pub fn message(&self) -> &str {
        &self.message
    }
}

impl Plugin for ErrorPlugin {}

pub struct PluginFactory {
    catalog: Arc<PluginCatalog>,
}

impl fmt::Debug for PluginFactory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PluginFactory").field("catalog", &self.catalog).finish()
    }
}

impl PluginFactory {
    pub fn new(catalog: PluginCatalog) -> Arc<Self> {
        Arc::new(Self { catalog: Arc::new(catalog) })
    }

    pub fn catalog(&self) -> &PluginCatalog {
        &self.catalog
    }

    /// Instantiate the plugin `config` names, within `context`.
    pub fn create_plugin(&self, context: &Arc<PluginContext>, config: &PluginConfig) -> PluginOutcome {
        let Some(class) = config.plugin_class() else {
            let message = format!("No '{}' configured for plugin '{}'", constants::PLUGIN_CLASS, config.name());
            return self.fail(context, config, message);
        };

        let supplied = context.get_service::<PluginCatalog>(constants::CATALOG_SERVICE_ID);
        let catalogs: Vec<&PluginCatalog> = supplied.as_deref().into_iter().chain([self.catalog.as_ref()]).collect();

        let Some(constructor) = catalogs.iter().find_map(|catalog| catalog.resolve(&class)) else {
            let path = layout_path(&class);
            if let Some(markup) = catalogs.iter().find_map(|catalog| catalog.layout(&path)) {
                log::debug!("Plugin class '{}' not found; using layout '{}'", class, path);
                let layout = Arc::new(LayoutPlugin { path, markup: markup.to_string() });
                if let Some(target) = config.render_target() {
                    context.register_service(layout.clone(), &target);
                }
                return PluginOutcome::Started(layout);
            }
            let message = format!("Unknown plugin class '{}' for plugin '{}'", class, config.name());
            return self.fail(context, config, message);
        };

        match panic::catch_unwind(AssertUnwindSafe(|| constructor(context, config))) {
            Ok(Ok(plugin)) => {
                log::debug!("Constructed plugin '{}' ({})", config.name(), class);
                PluginOutcome::Started(plugin)
            }
            Ok(Err(PluginError::Declined)) => {
                log::debug!("Plugin '{}' ({}) declined to start", config.name(), class);
                context.reset();
                PluginOutcome::Declined
            }
            Ok(Err(e)) => {
                log::debug!("Constructor of '{}' returned {:?}", class, e);
                let message = format!("Plugin '{}' ({}) failed: {}", config.name(), class, e);
                self.fail(context, config, message)
            }
            Err(payload) => {
                let detail = panic_message(payload.as_ref());
                log::debug!("Constructor of '{}' panicked: {}", class, detail);
                let message = format!("Plugin '{}' ({}) panicked: {}", config.name(), class, detail);
                self.fail(context, config, message)
            }
        }
    }

    fn fail(&self, context: &Arc<PluginContext>, config: &PluginConfig, message: String) -> PluginOutcome {
        log::error!("{}", message);
        context.reset();
        let fallback = config.render_target().map(|target| {
            let error = Arc::new(ErrorPlugin { message: message.clone() });
            context.register_service(error.clone(), &target);
            let plugin: Arc<dyn Plugin> = error;
            plugin
        });
        PluginOutcome::Failed { message, fallback }
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(text) = payload.downcast_ref::<&str>() {
        text.to_string()
    } else if let Some(text) = payload.downcast_ref::<String>() {
        text.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
