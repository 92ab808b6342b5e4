//! Service handles, trackers and factories.
//!
//! A service is any `Send + Sync` value published under a name. The runtime
//! never compares services by value: [`ServiceRef`] wraps the shared handle
//! and all bookkeeping goes through its pointer identity ([`ServiceKey`]).
use std::any::{Any, TypeId};
use std::fmt;
use std::marker::PhantomData;
use std::sync::{Arc, Weak};

use crate::kernel::error::Result;
use crate::plugin_system::context::PluginContext;
use crate::plugin_system::registry::ServiceRegistry;

/// Identity of a service instance. Only meaningful while the instance is alive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ServiceKey(usize);

/// Identity-compared handle to a published service.
#[derive(Clone)]
pub struct ServiceRef {
    inner: Arc<dyn Any + Send + Sync>,
    factory: Option<Arc<dyn ServiceFactory>>,
}

impl ServiceRef {
    pub fn new<T: Any + Send + Sync>(service: Arc<T>) -> Self {
        Self { inner: service, factory: None }
    }

    /// Wrap a factory so that contexts can instantiate the service lazily.
    pub fn from_factory<F: ServiceFactory + 'static>(factory: Arc<F>) -> Self {
        let facet: Arc<dyn ServiceFactory> = factory.clone();
        Self { inner: factory, factory: Some(facet) }
    }

    pub fn key(&self) -> ServiceKey {
        ServiceKey(Arc::as_ptr(&self.inner) as *const () as usize)
    }

    /// Identity comparison; two equal values are still different services.
    pub fn same(&self, other: &ServiceRef) -> bool {
        self.key() == other.key()
    }

    pub fn is<T: Any>(&self) -> bool {
        (*self.inner).is::<T>()
    }

    pub fn downcast<T: Any + Send + Sync>(&self) -> Option<Arc<T>> {
        self.inner.clone().downcast::<T>().ok()
    }

    pub fn as_factory(&self) -> Option<&Arc<dyn ServiceFactory>> {
        self.factory.as_ref()
    }
}

impl fmt::Debug for ServiceRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceRef")
            .field("key", &self.key())
            .field("factory", &self.factory.is_some())
            .finish()
    }
}

/// Observer of the services published under a name.
///
/// Callbacks run synchronously from inside registry operations and may
/// themselves register or unregister services and trackers. A returned error
/// is logged and does not stop other trackers from being notified.
pub trait ServiceTracker: Send + Sync {
    fn add_service(&self, service: &ServiceRef, name: &str) -> Result<()>;

    fn remove_service(&self, service: &ServiceRef, name: &str) -> Result<()>;
}

/// Identity of a tracker registration.
pub(crate) fn tracker_key(tracker: &Arc<dyn ServiceTracker>) -> usize {
    Arc::as_ptr(tracker) as *const () as usize
}

pub(crate) fn same_tracker(a: &Arc<dyn ServiceTracker>, b: &Arc<dyn ServiceTracker>) -> bool {
    tracker_key(a) == tracker_key(b)
}

type TrackerCallback<T> = Box<dyn Fn(Arc<T>, &str) -> Result<()> + Send + Sync>;

/// Tracker that only sees services of type `T`; other services are ignored.
pub struct TypedTracker<T> {
    on_add: TrackerCallback<T>,
    on_remove: TrackerCallback<T>,
    _marker: PhantomData<fn(T)>,
}

impl<T: Any + Send + Sync> TypedTracker<T> {
    pub fn new<A, R>(on_add: A, on_remove: R) -> Arc<Self>
    where
        A: Fn(Arc<T>, &str) -> Result<()> + Send + Sync + 'static,
        R: Fn(Arc<T>, &str) -> Result<()> + Send + Sync + 'static,
    {
        Arc::new(Self { on_add: Box::new(on_add), on_remove: Box::new(on_remove), _marker: PhantomData })
    }
}

impl<T: Any + Send + Sync> ServiceTracker for TypedTracker<T> {
    fn add_service(&self, service: &ServiceRef, name: &str) -> Result<()> {
        match service.downcast::<T>() {
            Some(typed) => (self.on_add)(typed, name),
            None => Ok(()),
        }
    }

    fn remove_service(&self, service: &ServiceRef, name: &str) -> Result<()> {
        match service.downcast::<T>() {
            Some(typed) => (self.on_remove)(typed, name),
            None => Ok(()),
        }
    }
}

/// Publishes a service that is instantiated once per consuming context.
pub trait ServiceFactory: Any + Send + Sync {
    /// Type of the instances produced by [`ServiceFactory::get_service`]
    fn service_type(&self) -> TypeId;

    fn get_service(&self, context: &PluginContext) -> Option<ServiceRef>;

    /// Called when the consuming context stops.
    fn release_service(&self, context: &PluginContext, service: &ServiceRef);
}

/// Weak handle to a registered service, addressed by its registry id.
///
/// Holding a reference keeps neither the service nor the registry alive.
#[derive(Clone)]
pub struct ServiceReference {
    id: u64,
    name: String,
    registry: Weak<ServiceRegistry>,
}

impl ServiceReference {
    pub(crate) fn new(id: u64, registry: Weak<ServiceRegistry>) -> Self {
        Self { id, name: service_id_name(id), registry }
    }

    pub fn service_id(&self) -> u64 {
        self.id
    }

    /// The synthetic `services.<id>` name the service is published under.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn service(&self) -> Option<ServiceRef> {
        self.registry.upgrade()?.get_service_refs(&self.name).into_iter().next()
    }

    pub fn get<T: Any + Send + Sync>(&self) -> Option<Arc<T>> {
        self.service().and_then(|service| service.downcast::<T>())
    }
}

impl fmt::Debug for ServiceReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceReference").field("name", &self.name).finish_non_exhaustive()
    }
}

/// Synthetic self-name of the service with the given registry id.
pub fn service_id_name(id: u64) -> String {
    format!("{}{}", crate::kernel::constants::SERVICE_ID_PREFIX, id)
}
