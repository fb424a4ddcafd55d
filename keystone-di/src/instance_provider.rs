use crate::error::ComponentInstanceProviderError;
use std::any::{type_name, Any};
use std::sync::Arc;

pub use crate::error::ErrorPtr;

pub type ComponentInstancePtr<T> = Arc<T>;

pub type ComponentInstanceAnyPtr = ComponentInstancePtr<dyn Any + Send + Sync + 'static>;

/// Generic provider for component instances, addressed by their keys.
pub trait ComponentInstanceProvider {
    /// Returns the instance registered under `key`, booting its provider (and all of its
    /// dependencies) first, if needed. Providers are booted at most once.
    fn instance(
        &self,
        key: &str,
    ) -> Result<ComponentInstanceAnyPtr, ComponentInstanceProviderError>;

    /// Returns an already booted instance without triggering a boot. Registered, but not yet
    /// booted components result in [ComponentInstanceProviderError::NotBooted].
    fn booted_instance(
        &self,
        key: &str,
    ) -> Result<ComponentInstanceAnyPtr, ComponentInstanceProviderError>;
}

/// Helper trait for [ComponentInstanceProvider] providing strongly-typed access.
pub trait TypedComponentInstanceProvider {
    /// Typesafe version of [ComponentInstanceProvider::instance].
    fn instance_typed<T: Send + Sync + 'static>(
        &self,
        key: &str,
    ) -> Result<ComponentInstancePtr<T>, ComponentInstanceProviderError>;

    /// Typesafe version of [ComponentInstanceProvider::booted_instance].
    fn booted_instance_typed<T: Send + Sync + 'static>(
        &self,
        key: &str,
    ) -> Result<ComponentInstancePtr<T>, ComponentInstanceProviderError>;

    /// Tries to get an instance like [TypedComponentInstanceProvider::instance_typed] does,
    /// but returns `None` when no provider is registered for the key.
    fn instance_option<T: Send + Sync + 'static>(
        &self,
        key: &str,
    ) -> Result<Option<ComponentInstancePtr<T>>, ComponentInstanceProviderError>;
}

impl<CIP: ComponentInstanceProvider + ?Sized> TypedComponentInstanceProvider for CIP {
    fn instance_typed<T: Send + Sync + 'static>(
        &self,
        key: &str,
    ) -> Result<ComponentInstancePtr<T>, ComponentInstanceProviderError> {
        self.instance(key).and_then(|instance| downcast(key, instance))
    }

    fn booted_instance_typed<T: Send + Sync + 'static>(
        &self,
        key: &str,
    ) -> Result<ComponentInstancePtr<T>, ComponentInstanceProviderError> {
        self.booted_instance(key)
            .and_then(|instance| downcast(key, instance))
    }

    fn instance_option<T: Send + Sync + 'static>(
        &self,
        key: &str,
    ) -> Result<Option<ComponentInstancePtr<T>>, ComponentInstanceProviderError> {
        match self.instance_typed(key) {
            Ok(instance) => Ok(Some(instance)),
            Err(ComponentInstanceProviderError::UnknownComponent(missing)) if missing == key => {
                Ok(None)
            }
            Err(error) => Err(error),
        }
    }
}

/// Casts a type-erased instance to a concrete type.
pub fn downcast<T: Send + Sync + 'static>(
    key: &str,
    instance: ComponentInstanceAnyPtr,
) -> Result<ComponentInstancePtr<T>, ComponentInstanceProviderError> {
    instance
        .downcast::<T>()
        .map_err(|_| ComponentInstanceProviderError::IncompatibleComponent {
            key: key.to_string(),
            type_name: type_name::<T>(),
        })
}
