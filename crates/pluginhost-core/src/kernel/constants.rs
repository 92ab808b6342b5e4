/// Application name
pub const APP_NAME: &str = "pluginhost";

/// Application version
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Config key naming the plugin implementation to instantiate
pub const PLUGIN_CLASS: &str = "plugin.class";

/// Config key naming the render target a plugin fills
pub const RENDER_TARGET: &str = "wicket.id";

/// Service name under which a caller-supplied plugin catalog is looked up
pub const CATALOG_SERVICE_ID: &str = "service.plugin.catalog";

/// Prefix of the synthetic self-name every registered service is published under
pub const SERVICE_ID_PREFIX: &str = "services.";

/// Infix used when generating cluster ids
pub const CLUSTER_INFIX: &str = ".cluster.";

/// Name of the root context owned by the plugin manager
pub const ROOT_CONTEXT_NAME: &str = "root";

/// Markup resources resolved for layout-only plugins use this extension
pub const LAYOUT_EXTENSION: &str = "html";
