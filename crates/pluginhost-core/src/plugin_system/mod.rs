//! # Plugin System
//!
//! Runtime that lets independently configured plugins find and depend on
//! each other's services without compile-time references.
//!
//! ## Key Submodules and Responsibilities:
//!
//! - **[`registry`]**: The [`ServiceRegistry`], mapping names to published
//!   service instances, assigning ids and notifying trackers.
//! - **[`service`]**: Service handles ([`ServiceRef`], [`ServiceReference`]) and
//!   the [`ServiceTracker`] and [`ServiceFactory`] traits.
//! - **[`context`]**: [`PluginContext`], the per-plugin facade with two-phase
//!   initialization and recursive teardown.
//! - **[`cluster`]**: [`ClusterControl`], a group of plugins started from a
//!   cluster template.
//! - **[`decorator`]**: Turns a cluster template into a concrete cluster config.
//! - **[`forwarder`]**: [`ServiceForwarder`], republishing services from one name
//!   under another.
//! - **[`factory`]**: [`PluginFactory`] and [`PluginCatalog`]; constructs plugins and
//!   contains their failures.
//! - **[`manager`]**: [`PluginManager`], the orchestration root.
//! - **[`traits`]**: The [`Plugin`] trait plugins implement.
//! - **[`error`]**: [`PluginSystemError`](error::PluginSystemError) and
//!   [`PluginError`](error::PluginError).
pub mod cluster;
pub mod context;
pub mod decorator;
pub mod error;
pub mod factory;
pub mod forwarder;
pub mod manager;
pub mod registry;
pub mod service;
pub mod traits;

pub use cluster::{ClusterControl, ClusterState};
pub use context::{ContextPhase, PluginContext};
pub use error::{PluginError, PluginSystemError};
pub use factory::{ErrorPlugin, LayoutPlugin, PluginCatalog, PluginFactory, PluginOutcome};
pub use forwarder::ServiceForwarder;
pub use manager::PluginManager;
pub use registry::{ServiceRegistration, ServiceRegistry};
pub use service::{ServiceFactory, ServiceRef, ServiceReference, ServiceTracker, TypedTracker};
pub use traits::{Plugin, PluginConstructor};

#[cfg(test)]
mod tests;
