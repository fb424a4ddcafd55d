//! Functionality related to registering provider definitions. A [ProviderDefinition] describes how
//! to boot a single component: its key, the keys of the components it depends on and the start
//! procedure producing the instance. Definitions are usually created with the [Provider] builder:
//!
//! ```
//! use keystone_di::container::ContainerBuilder;
//! use keystone_di::instance_provider::{ComponentInstancePtr, TypedComponentInstanceProvider};
//! use keystone_di::provider_registry::Provider;
//!
//! struct Client {
//!     logger: ComponentInstancePtr<String>,
//! }
//!
//! let container = ContainerBuilder::new().build();
//!
//! container
//!     .register(Provider::new("logger").start(|_| Ok("my logger".to_string())))
//!     .unwrap();
//! container
//!     .register(Provider::new("client").uses("logger").start(|context| {
//!         Ok(Client {
//!             logger: context.dependency("logger")?,
//!         })
//!     }))
//!     .unwrap();
//!
//! let client = container.instance_typed::<Client>("client").unwrap();
//! assert_eq!(*client.logger, "my logger");
//! ```

use crate::container::StartContext;
use crate::error::{ComponentInstanceProviderError, ErrorPtr, ProviderDefinitionRegistryError};
use crate::instance_provider::{ComponentInstanceAnyPtr, ComponentInstancePtr};
use derivative::Derivative;
use fxhash::FxHashMap;
#[cfg(test)]
use mockall::automock;
use std::sync::Arc;
use tracing::{debug, warn};

/// Type-erased start procedure of a provider.
pub type StartFunction = Arc<
    dyn Fn(&mut StartContext<'_>) -> Result<ComponentInstanceAnyPtr, ComponentInstanceProviderError>
        + Send
        + Sync,
>;

/// Type-erased stop procedure of a provider.
pub type StopFunction = Arc<dyn Fn(&ComponentInstanceAnyPtr) -> Result<(), ErrorPtr> + Send + Sync>;

/// Definition of a provider registered in a definition registry.
#[derive(Derivative, Clone)]
#[derivative(Debug)]
pub struct ProviderDefinition {
    /// Unique key under which the booted component is available.
    pub key: String,

    /// Keys of components which need to be booted before this one. They are available in the
    /// [StartContext] passed to the start procedure.
    pub dependencies: Vec<String>,

    /// Procedure creating the component instance.
    #[derivative(Debug = "ignore")]
    pub start: StartFunction,

    /// Optional procedure releasing the component on container shutdown.
    #[derivative(Debug = "ignore")]
    pub stop: Option<StopFunction>,
}

/// Builder for [ProviderDefinition]s.
#[derive(Derivative)]
#[derivative(Debug)]
pub struct Provider {
    key: String,
    dependencies: Vec<String>,
    #[derivative(Debug = "ignore")]
    start: Option<StartFunction>,
    #[derivative(Debug = "ignore")]
    stop: Option<StopFunction>,
}

impl Provider {
    pub fn new<K: ToString>(key: K) -> Self {
        Self {
            key: key.to_string(),
            dependencies: Vec::new(),
            start: None,
            stop: None,
        }
    }

    /// Declares a dependency on a component with the given key. Repeated declarations are
    /// ignored.
    pub fn uses<K: ToString>(mut self, key: K) -> Self {
        let key = key.to_string();
        if !self.dependencies.contains(&key) {
            self.dependencies.push(key);
        }

        self
    }

    /// Declares dependencies on all given keys.
    pub fn uses_all<I, K>(self, keys: I) -> Self
    where
        I: IntoIterator<Item = K>,
        K: ToString,
    {
        keys.into_iter().fold(self, |provider, key| provider.uses(key))
    }

    /// Sets the start procedure. The procedure runs after all declared dependencies are booted and
    /// at most once for the lifetime of a container, unless it fails.
    pub fn start<T, F>(mut self, start: F) -> Self
    where
        T: Send + Sync + 'static,
        F: Fn(&mut StartContext<'_>) -> Result<T, ComponentInstanceProviderError>
            + Send
            + Sync
            + 'static,
    {
        self.start = Some(Arc::new(move |context: &mut StartContext<'_>| {
            start(context)
                .map(|instance| ComponentInstancePtr::new(instance) as ComponentInstanceAnyPtr)
        }));
        self
    }

    /// Sets the stop procedure, called with the booted instance on container shutdown.
    pub fn stop<T, F>(mut self, stop: F) -> Self
    where
        T: Send + Sync + 'static,
        F: Fn(&T) -> Result<(), ErrorPtr> + Send + Sync + 'static,
    {
        self.stop = Some(Arc::new(move |instance: &ComponentInstanceAnyPtr| {
            match instance.downcast_ref::<T>() {
                Some(instance) => stop(instance),
                None => Ok(()),
            }
        }));
        self
    }

    #[inline]
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Builds the definition. Every provider needs a start procedure.
    pub fn build(self) -> Result<ProviderDefinition, ProviderDefinitionRegistryError> {
        let start = self.start.ok_or_else(|| {
            ProviderDefinitionRegistryError::MissingStartProcedure(self.key.clone())
        })?;

        Ok(ProviderDefinition {
            key: self.key,
            dependencies: self.dependencies,
            start,
            stop: self.stop,
        })
    }
}

/// A registry of provider definitions which can be used when booting components.
#[cfg_attr(test, automock)]
pub trait ProviderDefinitionRegistry {
    /// Adds a new definition. Handling of duplicate keys is registry-dependent.
    fn register_provider(
        &mut self,
        definition: ProviderDefinition,
    ) -> Result<(), ProviderDefinitionRegistryError>;

    /// Returns a definition with given key.
    fn provider_by_key(&self, key: &str) -> Option<ProviderDefinition>;

    /// Checks if there's a definition with given key.
    fn is_registered(&self, key: &str) -> bool;

    /// Returns a copy of the whole registry as a map.
    fn all_definitions(&self) -> FxHashMap<String, ProviderDefinition>;
}

/// Map-based registry with a configurable key collision policy: either reject duplicates or let
/// the last registration win.
#[derive(Clone, Debug, Default)]
pub struct DefaultProviderDefinitionRegistry {
    definitions: FxHashMap<String, ProviderDefinition>,
    allow_definition_overriding: bool,
}

impl DefaultProviderDefinitionRegistry {
    pub fn new(allow_definition_overriding: bool) -> Self {
        Self {
            definitions: Default::default(),
            allow_definition_overriding,
        }
    }
}

impl ProviderDefinitionRegistry for DefaultProviderDefinitionRegistry {
    fn register_provider(
        &mut self,
        definition: ProviderDefinition,
    ) -> Result<(), ProviderDefinitionRegistryError> {
        if self.definitions.contains_key(&definition.key) {
            if !self.allow_definition_overriding {
                return Err(ProviderDefinitionRegistryError::DuplicateProviderKey(
                    definition.key,
                ));
            }

            warn!(key = %definition.key, "Overriding provider definition.");
        } else {
            debug!(key = %definition.key, dependencies = ?definition.dependencies, "Registering provider.");
        }

        self.definitions.insert(definition.key.clone(), definition);
        Ok(())
    }

    #[inline]
    fn provider_by_key(&self, key: &str) -> Option<ProviderDefinition> {
        self.definitions.get(key).cloned()
    }

    #[inline]
    fn is_registered(&self, key: &str) -> bool {
        self.definitions.contains_key(key)
    }

    #[inline]
    fn all_definitions(&self) -> FxHashMap<String, ProviderDefinition> {
        self.definitions.clone()
    }
}
