//! A registry of named components booted on demand. Components are described by
//! [providers](provider_registry::Provider), which declare the keys of their dependencies and a
//! start procedure producing the component. A [Container](container::Container) boots providers
//! lazily on first request, dependencies first, and at most once per key, even when requested
//! concurrently from multiple threads.
//!
//! ```
//! use keystone_di::container::ContainerBuilder;
//! use keystone_di::instance_provider::TypedComponentInstanceProvider;
//! use keystone_di::provider_registry::Provider;
//!
//! let container = ContainerBuilder::new().build();
//! container
//!     .register(Provider::new("greeting").start(|_| Ok("Hello".to_string())))
//!     .unwrap();
//!
//! let greeting = container.instance_typed::<String>("greeting").unwrap();
//! assert_eq!(*greeting, "Hello");
//! ```

pub mod boot_order;
pub mod container;
mod error;
pub mod instance_provider;
pub mod provider_registry;

pub use error::{
    ComponentInstanceProviderError, ErrorPtr, ProviderDefinitionRegistryError, StartPanic,
};
