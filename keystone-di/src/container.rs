//! Core functionality for booting components. A [Container] uses definitions from a
//! [ProviderDefinitionRegistry] to lazily boot components and store them for reuse.
//!
//! Each registered key goes through the following states, observable with [Container::state]:
//! `Registered -> Resolving -> Resolved`. A component is booted at most once - concurrent requests
//! for a component which is currently booting wait for the boot to finish and receive either the
//! booted instance or the same error. A failed boot leaves the component `Registered`, so it can be
//! retried with a subsequent request. A panicking start procedure counts as a failed boot and is
//! reported as [ComponentInstanceProviderError::ProviderStart] with a [StartPanic] cause.
//!
//! `Resolved` is terminal. After [Container::shutdown], the container neither boots, hands out nor
//! registers components anymore.
//!
//! Note: a start procedure which never returns blocks all requests for its component
//! indefinitely, as there are no boot timeouts.

use crate::boot_order::boot_order;
use crate::error::{
    ComponentInstanceProviderError, ErrorPtr, ProviderDefinitionRegistryError, StartPanic,
};
use crate::instance_provider::{
    downcast, ComponentInstanceAnyPtr, ComponentInstanceProvider, ComponentInstancePtr,
};
use crate::provider_registry::{
    DefaultProviderDefinitionRegistry, Provider, ProviderDefinition, ProviderDefinitionRegistry,
};
use fxhash::{FxHashMap, FxHashSet};
use itertools::Itertools;
use parking_lot::{Condvar, Mutex, RwLock};
use std::error::Error;
use std::mem;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{debug, info, warn};

pub type ProviderDefinitionRegistryPtr = Box<dyn ProviderDefinitionRegistry + Send + Sync>;

/// Builder for [Container] with sensible defaults, for easy construction.
pub struct ContainerBuilder {
    definition_registry: ProviderDefinitionRegistryPtr,
}

impl Default for ContainerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ContainerBuilder {
    /// Creates a new builder with a default configuration, which rejects duplicate keys.
    pub fn new() -> Self {
        Self {
            definition_registry: Box::<DefaultProviderDefinitionRegistry>::default(),
        }
    }

    /// Switches the default registry between rejecting duplicate keys and letting the last
    /// registration win. Replaces any registry set previously.
    pub fn with_definition_overriding(mut self, allow_definition_overriding: bool) -> Self {
        self.definition_registry = Box::new(DefaultProviderDefinitionRegistry::new(
            allow_definition_overriding,
        ));
        self
    }

    /// Sets new [ProviderDefinitionRegistry].
    pub fn with_definition_registry(
        mut self,
        definition_registry: ProviderDefinitionRegistryPtr,
    ) -> Self {
        self.definition_registry = definition_registry;
        self
    }

    /// Builds resulting [Container].
    pub fn build(self) -> Container {
        Container::new(self.definition_registry)
    }
}

/// Lifecycle state of a single component key.
#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug)]
pub enum ComponentState {
    Unregistered,
    Registered,
    Resolving,
    Resolved,
}

type ResolutionId = u64;

#[derive(Default)]
enum SlotState {
    #[default]
    Registered,
    Resolving {
        resolution: ResolutionId,
    },
    Resolved(ComponentInstanceAnyPtr),
}

#[derive(Default)]
struct Slot {
    state: SlotState,
    // incremented on each boot attempt, so waiters can tell which attempt has failed
    attempt: u64,
    last_failure: Option<(u64, ComponentInstanceProviderError)>,
}

#[derive(Default)]
struct BootState {
    slots: FxHashMap<String, Slot>,
    // resolution -> key it's waiting for
    waiting: FxHashMap<ResolutionId, String>,
    boot_order: Vec<String>,
    shut_down: bool,
}

impl BootState {
    /// Follows the wait-for chain starting at `owner` and returns the keys on it, if it leads back
    /// to `resolution`.
    fn wait_cycle(&self, owner: ResolutionId, resolution: ResolutionId) -> Option<Vec<String>> {
        let mut current = owner;
        let mut keys = Vec::new();
        let mut visited = FxHashSet::default();

        while current != resolution {
            if !visited.insert(current) {
                return None;
            }

            let key = self.waiting.get(&current)?;
            keys.push(key.clone());

            match self.slots.get(key).map(|slot| &slot.state) {
                Some(SlotState::Resolving { resolution }) => current = *resolution,
                _ => return None,
            }
        }

        Some(keys)
    }
}

/// A single chain of nested resolutions, e.g. a component and all of its transitive dependencies.
struct Resolution {
    id: ResolutionId,
    path: Vec<String>,
}

enum Acquired {
    Instance(ComponentInstanceAnyPtr),
    Boot(ProviderDefinition, u64),
}

/// Registry of named providers and their booted components. Safe to share between threads.
pub struct Container {
    definition_registry: RwLock<ProviderDefinitionRegistryPtr>,
    state: Mutex<BootState>,
    state_changed: Condvar,
    next_resolution: AtomicU64,
}

impl Container {
    /// Creates a new container using given registry. The registry may already contain definitions.
    pub fn new(definition_registry: ProviderDefinitionRegistryPtr) -> Self {
        Self {
            definition_registry: RwLock::new(definition_registry),
            state: Default::default(),
            state_changed: Default::default(),
            next_resolution: AtomicU64::new(0),
        }
    }

    /// Registers a new provider. Registering a key which is already booted or booting is always an
    /// error, while handling other duplicates depends on the underlying registry.
    pub fn register(&self, provider: Provider) -> Result<(), ProviderDefinitionRegistryError> {
        let definition = provider.build()?;
        let key = definition.key.clone();

        let mut state = self.state.lock();
        if state.shut_down {
            return Err(ProviderDefinitionRegistryError::ContainerShutDown(key));
        }

        if let Some(slot) = state.slots.get(&key) {
            if !matches!(slot.state, SlotState::Registered) {
                return Err(ProviderDefinitionRegistryError::ProviderAlreadyResolved(
                    key,
                ));
            }
        }

        self.definition_registry
            .write()
            .register_provider(definition)?;

        state.slots.entry(key).or_default().last_failure = None;
        Ok(())
    }

    /// Legacy name for [Container::register].
    #[deprecated(note = "bootables are now called providers - use `register` instead")]
    pub fn register_bootable(
        &self,
        provider: Provider,
    ) -> Result<(), ProviderDefinitionRegistryError> {
        self.register(provider)
    }

    /// Returns the component registered under `key`, booting it first, if needed.
    pub fn resolve(
        &self,
        key: &str,
    ) -> Result<ComponentInstanceAnyPtr, ComponentInstanceProviderError> {
        let mut resolution = self.new_resolution();
        self.resolve_in(key, &mut resolution)
    }

    /// Returns an already booted component without booting it.
    pub fn get(
        &self,
        key: &str,
    ) -> Result<ComponentInstanceAnyPtr, ComponentInstanceProviderError> {
        let state = self.state.lock();
        if state.shut_down {
            return Err(ComponentInstanceProviderError::ContainerShutDown);
        }

        if let Some(Slot {
            state: SlotState::Resolved(instance),
            ..
        }) = state.slots.get(key)
        {
            return Ok(instance.clone());
        }

        if self.definition_registry.read().is_registered(key) {
            Err(ComponentInstanceProviderError::NotBooted(key.to_string()))
        } else {
            Err(ComponentInstanceProviderError::UnknownComponent(
                key.to_string(),
            ))
        }
    }

    /// Eagerly boots a single component.
    #[inline]
    pub fn finalize(&self, key: &str) -> Result<(), ComponentInstanceProviderError> {
        self.resolve(key).map(|_| ())
    }

    /// Eagerly boots all registered components in dependency order. Missing dependencies and
    /// dependency cycles are reported before any provider is started. Stops at the first error.
    pub fn finalize_all(&self) -> Result<(), ComponentInstanceProviderError> {
        if self.state.lock().shut_down {
            return Err(ComponentInstanceProviderError::ContainerShutDown);
        }

        let definitions = self.definition_registry.read().all_definitions();
        let order = boot_order(&definitions)?;

        info!("Finalizing {} components...", order.len());

        for key in &order {
            self.finalize(key)?;
        }

        Ok(())
    }

    /// Returns the current lifecycle state of given key.
    pub fn state(&self, key: &str) -> ComponentState {
        let state = self.state.lock();
        match state.slots.get(key).map(|slot| &slot.state) {
            Some(SlotState::Resolved(_)) => ComponentState::Resolved,
            Some(SlotState::Resolving { .. }) => ComponentState::Resolving,
            _ if self.definition_registry.read().is_registered(key) => ComponentState::Registered,
            _ => ComponentState::Unregistered,
        }
    }

    /// Returns all registered keys in alphabetical order.
    pub fn keys(&self) -> Vec<String> {
        self.definition_registry
            .read()
            .all_definitions()
            .into_keys()
            .sorted()
            .collect()
    }

    /// Tears the container down, calling stop procedures of booted components in reverse boot
    /// order. Booted components stay `Resolved`, but any subsequent request or registration fails
    /// with a `ContainerShutDown` error. All components are stopped even if some stop procedures
    /// fail - the first error is returned. Repeated calls stop nothing.
    ///
    /// Components which are still booting while the container shuts down are not stopped.
    pub fn shutdown(&self) -> Result<(), ComponentInstanceProviderError> {
        let booted = {
            let mut state = self.state.lock();
            state.shut_down = true;

            let boot_order = mem::take(&mut state.boot_order);
            boot_order
                .into_iter()
                .rev()
                .filter_map(|key| match state.slots.get(&key) {
                    Some(Slot {
                        state: SlotState::Resolved(instance),
                        ..
                    }) => Some((key, instance.clone())),
                    _ => None,
                })
                .collect_vec()
        };

        self.state_changed.notify_all();

        info!("Shutting down {} components...", booted.len());

        let stops = {
            let registry = self.definition_registry.read();
            booted
                .into_iter()
                .filter_map(|(key, instance)| {
                    registry
                        .provider_by_key(&key)
                        .and_then(|definition| definition.stop)
                        .map(|stop| (key, instance, stop))
                })
                .collect_vec()
        };

        let mut first_error = None;
        for (key, instance, stop) in stops {
            debug!(key = %key, "Stopping provider.");

            if let Err(source) = (stop)(&instance) {
                warn!(key = %key, error = %source, "Error stopping provider.");
                first_error
                    .get_or_insert(ComponentInstanceProviderError::ProviderStop { key, source });
            }
        }

        first_error.map_or(Ok(()), Err)
    }

    fn new_resolution(&self) -> Resolution {
        Resolution {
            id: self.next_resolution.fetch_add(1, Ordering::Relaxed),
            path: Vec::new(),
        }
    }

    fn resolve_in(
        &self,
        key: &str,
        resolution: &mut Resolution,
    ) -> Result<ComponentInstanceAnyPtr, ComponentInstanceProviderError> {
        if resolution.path.iter().any(|entry| entry == key) {
            return Err(self.cycle_error(&resolution.path, key, &[]));
        }

        let (definition, attempt) = match self.acquire(key, resolution)? {
            Acquired::Instance(instance) => return Ok(instance),
            Acquired::Boot(definition, attempt) => (definition, attempt),
        };

        resolution.path.push(key.to_string());
        let result = panic::catch_unwind(AssertUnwindSafe(|| self.boot(&definition, resolution)))
            .unwrap_or_else(|payload| {
                let cause = StartPanic::from_payload(&*payload);
                warn!(key, %cause, "Provider panicked while booting.");
                Err(ComponentInstanceProviderError::provider_start(key, cause))
            });
        resolution.path.pop();

        {
            let mut guard = self.state.lock();
            let state = &mut *guard;
            let slot = state.slots.entry(key.to_string()).or_default();

            match &result {
                Ok(instance) => {
                    slot.state = SlotState::Resolved(instance.clone());
                    slot.last_failure = None;
                    state.boot_order.push(key.to_string());
                }
                Err(error) => {
                    slot.state = SlotState::Registered;
                    slot.last_failure = Some((attempt, error.clone()));
                }
            }
        }

        self.state_changed.notify_all();

        match &result {
            Ok(_) => debug!(key, "Provider booted."),
            Err(error) => debug!(key, %error, "Provider failed to boot."),
        }

        result
    }

    /// Returns either a booted instance or marks the key as resolving by given resolution and
    /// returns the definition to boot. Waits if another resolution is booting the same key.
    fn acquire(
        &self,
        key: &str,
        resolution: &Resolution,
    ) -> Result<Acquired, ComponentInstanceProviderError> {
        let mut state = self.state.lock();

        loop {
            if state.shut_down {
                return Err(ComponentInstanceProviderError::ContainerShutDown);
            }

            let (owner, attempt) = match state.slots.get(key) {
                Some(Slot {
                    state: SlotState::Resolved(instance),
                    ..
                }) => return Ok(Acquired::Instance(instance.clone())),
                Some(Slot {
                    state: SlotState::Resolving { resolution },
                    attempt,
                    ..
                }) => (*resolution, *attempt),
                _ => {
                    let definition = self
                        .definition_registry
                        .read()
                        .provider_by_key(key)
                        .ok_or_else(|| {
                            ComponentInstanceProviderError::UnknownComponent(key.to_string())
                        })?;

                    let slot = state.slots.entry(key.to_string()).or_default();
                    slot.attempt += 1;
                    slot.state = SlotState::Resolving {
                        resolution: resolution.id,
                    };

                    debug!(key, "Booting provider.");
                    return Ok(Acquired::Boot(definition, slot.attempt));
                }
            };

            if let Some(keys) = state.wait_cycle(owner, resolution.id) {
                return Err(self.cycle_error(&resolution.path, key, &keys));
            }

            debug!(key, "Waiting for provider booted by another resolution.");

            state.waiting.insert(resolution.id, key.to_string());
            while matches!(
                state.slots.get(key),
                Some(Slot { state: SlotState::Resolving { .. }, attempt: current, .. }) if *current == attempt
            ) {
                self.state_changed.wait(&mut state);
            }
            state.waiting.remove(&resolution.id);

            if let Some(Slot {
                last_failure: Some((failed_attempt, error)),
                ..
            }) = state.slots.get(key)
            {
                if *failed_attempt == attempt {
                    return Err(error.clone());
                }
            }
        }
    }

    fn boot(
        &self,
        definition: &ProviderDefinition,
        resolution: &mut Resolution,
    ) -> Result<ComponentInstanceAnyPtr, ComponentInstanceProviderError> {
        let dependencies = definition
            .dependencies
            .iter()
            .map(|dependency| {
                self.resolve_in(dependency, resolution)
                    .map(|instance| (dependency.clone(), instance))
            })
            .collect::<Result<FxHashMap<_, _>, _>>()?;

        let mut context = StartContext {
            key: &definition.key,
            container: self,
            resolution,
            dependencies: &dependencies,
        };

        (definition.start)(&mut context)
    }

    fn cycle_error(
        &self,
        path: &[String],
        key: &str,
        waited_keys: &[String],
    ) -> ComponentInstanceProviderError {
        let cycle = path
            .iter()
            .map(String::as_str)
            .chain(Some(key))
            .chain(waited_keys.iter().map(String::as_str))
            .map(str::to_string)
            .collect_vec();

        warn!(cycle = %cycle.iter().join(" -> "), "Detected circular dependency.");
        ComponentInstanceProviderError::CircularDependency(cycle)
    }
}

impl ComponentInstanceProvider for Container {
    #[inline]
    fn instance(
        &self,
        key: &str,
    ) -> Result<ComponentInstanceAnyPtr, ComponentInstanceProviderError> {
        self.resolve(key)
    }

    #[inline]
    fn booted_instance(
        &self,
        key: &str,
    ) -> Result<ComponentInstanceAnyPtr, ComponentInstanceProviderError> {
        self.get(key)
    }
}

/// Context passed to start procedures, giving access to the booted dependencies.
pub struct StartContext<'a> {
    key: &'a str,
    container: &'a Container,
    resolution: &'a mut Resolution,
    dependencies: &'a FxHashMap<String, ComponentInstanceAnyPtr>,
}

impl StartContext<'_> {
    /// Key of the component being booted.
    #[inline]
    pub fn key(&self) -> &str {
        self.key
    }

    /// Returns a dependency declared with [Provider::uses]. All declared dependencies are booted
    /// before the start procedure runs.
    pub fn dependency<T: Send + Sync + 'static>(
        &self,
        key: &str,
    ) -> Result<ComponentInstancePtr<T>, ComponentInstanceProviderError> {
        let instance = self.dependencies.get(key).cloned().ok_or_else(|| {
            ComponentInstanceProviderError::UndeclaredDependency {
                key: self.key.to_string(),
                dependency: key.to_string(),
            }
        })?;

        downcast(key, instance)
    }

    /// Boots a component which is not known upfront. Such dependencies are invisible when
    /// computing boot order in [Container::finalize_all], but still take part in cycle detection.
    pub fn resolve<T: Send + Sync + 'static>(
        &mut self,
        key: &str,
    ) -> Result<ComponentInstancePtr<T>, ComponentInstanceProviderError> {
        self.container
            .resolve_in(key, self.resolution)
            .and_then(|instance| downcast(key, instance))
    }

    /// Wraps an error raised by the start procedure, preserving it as the cause.
    pub fn start_error<E: Error + Send + Sync + 'static>(
        &self,
        error: E,
    ) -> ComponentInstanceProviderError {
        ComponentInstanceProviderError::provider_start(self.key, error)
    }

    /// Same as [StartContext::start_error], but for already type-erased errors.
    pub fn start_error_ptr(&self, source: ErrorPtr) -> ComponentInstanceProviderError {
        ComponentInstanceProviderError::ProviderStart {
            key: self.key.to_string(),
            source,
        }
    }
}
