use keystone_di::container::{ComponentState, Container, ContainerBuilder};
use keystone_di::instance_provider::{ComponentInstancePtr, TypedComponentInstanceProvider};
use keystone_di::provider_registry::Provider;
use keystone_di::{ComponentInstanceProviderError, ProviderDefinitionRegistryError};
use std::fmt::{Display, Formatter};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Barrier, Mutex};
use std::thread;
use std::time::Duration;

struct Client {
    logger: ComponentInstancePtr<String>,
}

#[derive(Debug)]
struct ConnectionError;

impl Display for ConnectionError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "connection refused")
    }
}

impl std::error::Error for ConnectionError {}

fn counting_provider(key: &str, starts: &Arc<AtomicUsize>) -> Provider {
    let starts = starts.clone();
    Provider::new(key).start(move |context| {
        starts.fetch_add(1, Ordering::SeqCst);
        Ok(context.key().to_string())
    })
}

#[test]
fn should_boot_client_with_logger() {
    let container = ContainerBuilder::new().build();
    container
        .register(Provider::new("logger").start(|_| Ok("my logger".to_string())))
        .unwrap();
    container
        .register(Provider::new("client").uses("logger").start(|context| {
            Ok(Client {
                logger: context.dependency("logger")?,
            })
        }))
        .unwrap();

    let client = container.instance_typed::<Client>("client").unwrap();
    assert_eq!(*client.logger, "my logger");
}

#[test]
fn should_memoize_booted_component() {
    let starts = Arc::new(AtomicUsize::new(0));
    let container = ContainerBuilder::new().build();
    container
        .register(counting_provider("logger", &starts))
        .unwrap();

    let first = container.resolve("logger").unwrap();
    let second = container.resolve("logger").unwrap();

    assert!(Arc::ptr_eq(&first, &second));
    assert_eq!(starts.load(Ordering::SeqCst), 1);
}

#[test]
fn should_boot_dependency_chain_in_order() {
    let events = Arc::new(Mutex::new(Vec::new()));
    let container = ContainerBuilder::new().build();

    for (key, dependency) in [("a", Some("b")), ("b", Some("c")), ("c", None)] {
        let events = events.clone();
        container
            .register(Provider::new(key).uses_all(dependency).start(move |context| {
                events.lock().unwrap().push(format!("{} begin", context.key()));
                events.lock().unwrap().push(format!("{} end", context.key()));
                Ok(())
            }))
            .unwrap();
    }

    container.finalize("a").unwrap();

    assert_eq!(
        *events.lock().unwrap(),
        vec!["c begin", "c end", "b begin", "b end", "a begin", "a end"]
    );
}

#[test]
fn should_fail_on_undefined_dependency() {
    let starts = Arc::new(AtomicUsize::new(0));
    let container = ContainerBuilder::new().build();
    container
        .register(counting_provider("client", &starts).uses("logger"))
        .unwrap();

    assert!(matches!(
        container.resolve("client").unwrap_err(),
        ComponentInstanceProviderError::UnknownComponent(key) if key == "logger"
    ));
    assert_eq!(starts.load(Ordering::SeqCst), 0);
}

#[test]
fn should_fail_on_mutual_dependency() {
    let container = ContainerBuilder::new().build();
    container
        .register(Provider::new("a").uses("b").start(|_| Ok(())))
        .unwrap();
    container
        .register(Provider::new("b").uses("a").start(|_| Ok(())))
        .unwrap();

    assert!(matches!(
        container.resolve("a").unwrap_err(),
        ComponentInstanceProviderError::CircularDependency(path) if path == vec!["a", "b", "a"]
    ));
}

#[test]
fn should_fail_on_self_dependency() {
    let container = ContainerBuilder::new().build();
    container
        .register(Provider::new("a").uses("a").start(|_| Ok(())))
        .unwrap();

    assert!(matches!(
        container.resolve("a").unwrap_err(),
        ComponentInstanceProviderError::CircularDependency(_)
    ));
    assert!(matches!(
        container.finalize_all().unwrap_err(),
        ComponentInstanceProviderError::CircularDependency(_)
    ));
}

#[test]
fn should_boot_once_under_concurrent_requests() {
    const THREADS: usize = 8;

    let starts = Arc::new(AtomicUsize::new(0));
    let container = Arc::new(ContainerBuilder::new().build());

    {
        let starts = starts.clone();
        container
            .register(Provider::new("database").start(move |_| {
                starts.fetch_add(1, Ordering::SeqCst);
                thread::sleep(Duration::from_millis(50));
                Ok("connection".to_string())
            }))
            .unwrap();
    }

    let barrier = Arc::new(Barrier::new(THREADS));
    let handles = (0..THREADS)
        .map(|_| {
            let container = container.clone();
            let barrier = barrier.clone();
            thread::spawn(move || {
                barrier.wait();
                container.resolve("database").unwrap()
            })
        })
        .collect::<Vec<_>>();

    let instances = handles
        .into_iter()
        .map(|handle| handle.join().unwrap())
        .collect::<Vec<_>>();

    assert_eq!(starts.load(Ordering::SeqCst), 1);
    assert!(instances
        .iter()
        .all(|instance| Arc::ptr_eq(instance, &instances[0])));
}

#[test]
fn should_detect_cycle_across_threads() {
    let barrier = Arc::new(Barrier::new(2));
    let container = Arc::new(ContainerBuilder::new().build());

    for (key, other) in [("a", "b"), ("b", "a")] {
        let barrier = barrier.clone();
        container
            .register(Provider::new(key).start(move |context| {
                barrier.wait();
                context.resolve::<()>(other).map(|_| ())
            }))
            .unwrap();
    }

    let handles = ["a", "b"].map(|key| {
        let container = container.clone();
        thread::spawn(move || container.resolve(key))
    });

    for handle in handles {
        assert!(matches!(
            handle.join().unwrap().unwrap_err(),
            ComponentInstanceProviderError::CircularDependency(_)
        ));
    }
}

#[test]
fn should_finalize_all_in_dependency_order() {
    let events = Arc::new(Mutex::new(Vec::new()));
    let container = ContainerBuilder::new().build();

    for (key, dependencies) in [
        ("api", vec!["client", "logger"]),
        ("client", vec!["logger"]),
        ("logger", vec![]),
    ] {
        let events = events.clone();
        container
            .register(Provider::new(key).uses_all(dependencies).start(move |context| {
                events.lock().unwrap().push(context.key().to_string());
                Ok(())
            }))
            .unwrap();
    }

    container.finalize_all().unwrap();

    assert_eq!(*events.lock().unwrap(), vec!["logger", "client", "api"]);
    assert!(container
        .keys()
        .iter()
        .all(|key| container.state(key) == ComponentState::Resolved));
}

#[test]
fn should_validate_graph_before_finalizing() {
    let starts = Arc::new(AtomicUsize::new(0));
    let container = ContainerBuilder::new().build();
    container
        .register(counting_provider("a_logger", &starts))
        .unwrap();
    container
        .register(counting_provider("client", &starts).uses("missing"))
        .unwrap();

    assert!(matches!(
        container.finalize_all().unwrap_err(),
        ComponentInstanceProviderError::UnknownComponent(key) if key == "missing"
    ));
    assert_eq!(starts.load(Ordering::SeqCst), 0);
}

#[test]
fn should_stop_finalizing_on_first_error() {
    let starts = Arc::new(AtomicUsize::new(0));
    let container = ContainerBuilder::new().build();
    container
        .register(
            Provider::new("a").start(|context| Err::<(), _>(context.start_error(ConnectionError))),
        )
        .unwrap();
    container
        .register(counting_provider("b", &starts))
        .unwrap();

    assert!(matches!(
        container.finalize_all().unwrap_err(),
        ComponentInstanceProviderError::ProviderStart { key, .. } if key == "a"
    ));
    assert_eq!(starts.load(Ordering::SeqCst), 0);
    assert_eq!(container.state("b"), ComponentState::Registered);
}

#[test]
fn should_reject_duplicate_registration_by_default() {
    let container = ContainerBuilder::new().build();
    container
        .register(Provider::new("logger").start(|_| Ok(())))
        .unwrap();

    assert_eq!(
        container
            .register(Provider::new("logger").start(|_| Ok(())))
            .unwrap_err(),
        ProviderDefinitionRegistryError::DuplicateProviderKey("logger".to_string())
    );
}

#[test]
#[allow(deprecated)]
fn should_register_legacy_bootable() {
    let container = ContainerBuilder::new().build();
    container
        .register_bootable(Provider::new("logger").start(|_| Ok("legacy".to_string())))
        .unwrap();

    assert_eq!(*container.instance_typed::<String>("logger").unwrap(), "legacy");
    assert_eq!(
        container
            .register(Provider::new("logger").start(|_| Ok("current".to_string())))
            .unwrap_err(),
        ProviderDefinitionRegistryError::ProviderAlreadyResolved("logger".to_string())
    );
}

#[test]
fn should_look_up_without_booting() {
    let starts = Arc::new(AtomicUsize::new(0));
    let container: Container = ContainerBuilder::new().build();
    container
        .register(counting_provider("logger", &starts))
        .unwrap();

    assert!(matches!(
        container.booted_instance_typed::<String>("logger").unwrap_err(),
        ComponentInstanceProviderError::NotBooted(_)
    ));
    assert!(matches!(
        container.booted_instance_typed::<String>("client").unwrap_err(),
        ComponentInstanceProviderError::UnknownComponent(_)
    ));
    assert_eq!(starts.load(Ordering::SeqCst), 0);

    container.finalize("logger").unwrap();

    assert_eq!(
        *container.booted_instance_typed::<String>("logger").unwrap(),
        "logger"
    );
}
