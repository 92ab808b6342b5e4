#![cfg(test)]

use std::sync::{Arc, Mutex};

use crate::kernel::error::{Error, Result};
use crate::plugin_system::registry::ServiceRegistry;
use crate::plugin_system::service::{ServiceRef, ServiceTracker};

use super::common::{as_tracker, label_of, named, publish, Named, RecordingTracker};

#[test]
fn test_registry_new_is_empty() {
    let registry = ServiceRegistry::new();
    assert!(registry.is_empty());
    assert_eq!(registry.reference_total(), 0);
    assert!(registry.service_names().is_empty());
}

#[test]
fn test_first_registration_is_deferred() {
    let registry = ServiceRegistry::new();
    let service = ServiceRef::new(named("a"));

    let registration = registry.register_service(&service, "alpha").expect("new service gets a registration");
    assert_eq!(registration.id(), 1);
    assert_eq!(registration.names(), ["alpha".to_string()]);
    // nothing is published until the caller says so
    assert!(registry.get_service::<Named>("alpha").is_none());
    assert_eq!(registry.reference_count(&service), 1);

    registration.notify_trackers(&registry);
    assert_eq!(registry.get_service::<Named>("alpha").unwrap().0, "a");
    assert_eq!(registry.get_service_refs("services.1").len(), 1);
}

#[test]
fn test_refcount_follows_user_names() {
    let registry = ServiceRegistry::new();
    let service = publish(&registry, &named("shared"), "one");
    assert_eq!(registry.reference_count(&service), 1);

    assert!(registry.register_service(&service, "two").is_none(), "known service is published directly");
    assert!(registry.register_service(&service, "three").is_none());
    assert_eq!(registry.reference_count(&service), 3);
    assert_eq!(registry.service_id(&service), Some(1));
    assert_eq!(registry.service_names(), vec!["one", "services.1", "three", "two"]);

    registry.unregister_service(&service, "two");
    assert_eq!(registry.reference_count(&service), 2);
    registry.unregister_service(&service, "one");
    assert_eq!(registry.reference_count(&service), 1);
    assert!(registry.get_service_refs("services.1").len() == 1, "self-name stays while a user name remains");

    registry.unregister_service(&service, "three");
    assert_eq!(registry.reference_count(&service), 0);
    assert!(registry.is_empty());
}

#[test]
fn test_reference_resolves_until_freed() {
    let registry = ServiceRegistry::new();
    let service = publish(&registry, &named("ref"), "target");

    let reference = registry.get_reference(&service).expect("registered service has a reference");
    assert_eq!(reference.name(), "services.1");
    assert_eq!(reference.service_id(), 1);
    assert_eq!(reference.get::<Named>().unwrap().0, "ref");

    registry.unregister_service(&service, "target");
    assert!(reference.service().is_none());
    assert!(registry.get_reference(&service).is_none());
}

#[test]
fn test_reference_does_not_keep_registry_alive() {
    let registry = ServiceRegistry::new();
    let service = publish(&registry, &named("weak"), "target");
    let reference = registry.get_reference(&service).unwrap();
    drop(registry);
    assert!(reference.service().is_none());
}

#[test]
fn test_ids_are_never_reused() {
    let registry = ServiceRegistry::new();
    let first = publish(&registry, &named("first"), "x");
    registry.unregister_service(&first, "x");

    let second = publish(&registry, &named("second"), "x");
    assert_eq!(registry.service_id(&second), Some(2));

    let third = ServiceRef::new(named("third"));
    let registration = registry.register_service(&third, "y").unwrap();
    registration.cleanup(&registry);
    assert_eq!(registry.reference_count(&third), 0);

    let fourth = publish(&registry, &named("fourth"), "y");
    assert_eq!(registry.service_id(&fourth), Some(4));
}

#[test]
fn test_cleanup_has_no_other_effects() {
    let registry = ServiceRegistry::new();
    let tracker = RecordingTracker::new();
    registry.register_tracker(as_tracker(&tracker), "pending");

    let service = ServiceRef::new(named("p"));
    let registration = registry.register_service(&service, "pending").unwrap();
    registration.cleanup(&registry);

    assert!(tracker.events().is_empty());
    assert_eq!(registry.reference_total(), 0);
    assert!(registry.get_service_refs("pending").is_empty());
}

#[test]
fn test_names_keep_registration_order() {
    let registry = ServiceRegistry::new();
    let a = publish(&registry, &named("a"), "list");
    let _b = publish(&registry, &named("b"), "list");
    let _c = publish(&registry, &named("c"), "list");

    let labels: Vec<String> = registry.get_service_refs("list").iter().map(label_of).collect();
    assert_eq!(labels, vec!["a", "b", "c"]);

    registry.unregister_service(&a, "list");
    let _d = publish(&registry, &named("d"), "list");
    let labels: Vec<String> = registry.get_services::<Named>("list").iter().map(|n| n.0.clone()).collect();
    assert_eq!(labels, vec!["b", "c", "d"]);
}

#[test]
fn test_typed_lookup_skips_other_types() {
    let registry = ServiceRegistry::new();
    let number = ServiceRef::new(Arc::new(42u32));
    if let Some(registration) = registry.register_service(&number, "mixed") {
        registration.notify_trackers(&registry);
    }
    publish(&registry, &named("text"), "mixed");

    assert_eq!(registry.get_service::<Named>("mixed").unwrap().0, "text");
    assert_eq!(*registry.get_service::<u32>("mixed").unwrap(), 42);
    assert_eq!(registry.get_services::<Named>("mixed").len(), 1);
    assert_eq!(registry.get_service_refs("mixed").len(), 2);
    assert!(registry.get_service::<String>("mixed").is_none());
}

#[test]
fn test_late_tracker_sees_existing_services_in_order() {
    let registry = ServiceRegistry::new();
    publish(&registry, &named("s1"), "x");
    publish(&registry, &named("s2"), "x");
    publish(&registry, &named("s3"), "x");

    let tracker = RecordingTracker::new();
    registry.register_tracker(as_tracker(&tracker), "x");
    assert_eq!(tracker.events(), vec!["+s1@x", "+s2@x", "+s3@x"]);
    assert_eq!(registry.tracker_count("x"), 1);

    tracker.clear();
    registry.unregister_tracker(&as_tracker(&tracker), "x");
    assert_eq!(tracker.events(), vec!["-s1@x", "-s2@x", "-s3@x"]);
    assert_eq!(registry.tracker_count("x"), 0);
}

#[test]
fn test_tracker_notified_before_removal() {
    let registry = ServiceRegistry::new();

    struct Probe {
        registry: Arc<ServiceRegistry>,
        seen_during_removal: Mutex<Vec<usize>>,
    }
    impl ServiceTracker for Probe {
        fn add_service(&self, _service: &ServiceRef, _name: &str) -> Result<()> {
            Ok(())
        }
        fn remove_service(&self, _service: &ServiceRef, name: &str) -> Result<()> {
            let count = self.registry.get_service_refs(name).len();
            self.seen_during_removal.lock().unwrap().push(count);
            Ok(())
        }
    }

    let probe = Arc::new(Probe { registry: registry.clone(), seen_during_removal: Mutex::new(Vec::new()) });
    registry.register_tracker(as_tracker(&probe), "watched");
    let service = publish(&registry, &named("w"), "watched");
    registry.unregister_service(&service, "watched");

    assert_eq!(*probe.seen_during_removal.lock().unwrap(), vec![1]);
    assert!(registry.get_service_refs("watched").is_empty());
}

#[test]
fn test_failing_tracker_does_not_stop_notification() {
    let registry = ServiceRegistry::new();

    struct Failing;
    impl ServiceTracker for Failing {
        fn add_service(&self, _service: &ServiceRef, _name: &str) -> Result<()> {
            Err(Error::from("tracker refused"))
        }
        fn remove_service(&self, _service: &ServiceRef, _name: &str) -> Result<()> {
            Err(Error::from("tracker refused"))
        }
    }

    let failing: Arc<dyn ServiceTracker> = Arc::new(Failing);
    let recorder = RecordingTracker::new();
    registry.register_tracker(failing, "n");
    registry.register_tracker(as_tracker(&recorder), "n");

    let service = publish(&registry, &named("s"), "n");
    registry.unregister_service(&service, "n");
    assert_eq!(recorder.events(), vec!["+s@n", "-s@n"]);
}

#[test]
fn test_reentrant_tracker_can_register() {
    let registry = ServiceRegistry::new();

    struct Echo {
        registry: Arc<ServiceRegistry>,
    }
    impl ServiceTracker for Echo {
        fn add_service(&self, service: &ServiceRef, _name: &str) -> Result<()> {
            if self.registry.register_service(service, "echo").is_some() {
                return Err(Error::from("service should already be known"));
            }
            Ok(())
        }
        fn remove_service(&self, service: &ServiceRef, _name: &str) -> Result<()> {
            self.registry.unregister_service(service, "echo");
            Ok(())
        }
    }

    let echo = Arc::new(Echo { registry: registry.clone() });
    registry.register_tracker(as_tracker(&echo), "voice");

    let service = publish(&registry, &named("hello"), "voice");
    assert_eq!(registry.get_service::<Named>("echo").unwrap().0, "hello");
    assert_eq!(registry.reference_count(&service), 2);

    registry.unregister_service(&service, "voice");
    assert!(registry.get_service_refs("echo").is_empty());
    assert_eq!(registry.reference_count(&service), 0);

    registry.unregister_tracker(&as_tracker(&echo), "voice");
    assert!(registry.is_empty());
}

#[test]
fn test_unknown_unregistrations_are_harmless() {
    let registry = ServiceRegistry::new();
    let service = publish(&registry, &named("known"), "here");
    let stranger = ServiceRef::new(named("stranger"));

    registry.unregister_service(&stranger, "here");
    registry.unregister_service(&service, "elsewhere");
    registry.unregister_tracker(&as_tracker(&RecordingTracker::new()), "here");

    assert_eq!(registry.reference_count(&service), 1);
    assert_eq!(registry.get_service_refs("here").len(), 1);
    assert!(registry.get_reference(&stranger).is_none());
}

#[test]
fn test_registries_are_independent() {
    let left = ServiceRegistry::new();
    let right = ServiceRegistry::new();
    let shared = named("shared");
    let in_left = publish(&left, &shared, "name");
    assert!(right.get_service::<Named>("name").is_none());

    let in_right = publish(&right, &shared, "name");
    assert_eq!(left.service_id(&in_left), Some(1));
    assert_eq!(right.service_id(&in_right), Some(1));
}

#[test]
fn test_forwarding_markers_are_per_thread() {
    let registry = ServiceRegistry::new();
    let service = ServiceRef::new(named("s"));

    let guard = registry.enter_forwarding("x", &service);
    assert!(registry.is_forwarding("x", &service));
    assert!(!registry.is_forwarding("y", &service));

    let seen_elsewhere = std::thread::scope(|scope| {
        scope.spawn(|| registry.is_forwarding("x", &service)).join().unwrap()
    });
    assert!(!seen_elsewhere, "another thread must not see this thread's marker");

    drop(guard);
    assert!(!registry.is_forwarding("x", &service));
}
