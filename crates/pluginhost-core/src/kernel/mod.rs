//! # Kernel
//!
//! Application bootstrap, crate-wide constants and the crate-level error type.
//!
//! - [`Application`](bootstrap::Application) owns a
//!   [`PluginManager`](crate::plugin_system::PluginManager) and tears down
//!   everything started through it, checking that the registry ends up empty.
//! - `constants` holds the reserved config keys and service names.
//! - [`Error`](error::Error) and the [`Result`](error::Result) alias are what
//!   every fallible public operation returns.
pub mod bootstrap;
pub mod constants;
pub mod error;

pub use bootstrap::{Application, ServiceEntry};
pub use error::{Error, LifecyclePhase, Result};
