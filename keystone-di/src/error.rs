use itertools::Itertools;
use std::any::Any;
use std::error::Error;
use std::sync::Arc;
use thiserror::Error;

/// Type-erased error produced by user code, e.g. start or stop procedures.
pub type ErrorPtr = Arc<dyn Error + Send + Sync>;

/// Errors related to resolving and managing component instances.
#[derive(Error, Clone, Debug)]
pub enum ComponentInstanceProviderError {
    #[error("Cannot find a provider for component: {0}")]
    UnknownComponent(String),
    #[error("Component '{0}' is registered, but has not been booted yet")]
    NotBooted(String),
    #[error("Detected a circular dependency: {}", .0.iter().join(" -> "))]
    CircularDependency(Vec<String>),
    #[error("Tried to downcast component '{key}' to incompatible type: {type_name}")]
    IncompatibleComponent { key: String, type_name: &'static str },
    #[error("Provider '{key}' requested '{dependency}' without declaring it as a dependency")]
    UndeclaredDependency { key: String, dependency: String },
    #[error("Error starting provider '{key}': {source}")]
    ProviderStart { key: String, source: ErrorPtr },
    #[error("Error stopping provider '{key}': {source}")]
    ProviderStop { key: String, source: ErrorPtr },
    #[error("Registration error: {0}")]
    Registration(#[from] ProviderDefinitionRegistryError),
    #[error("Container has been shut down")]
    ContainerShutDown,
}

impl ComponentInstanceProviderError {
    /// Wraps an arbitrary error as a start failure of the given provider.
    pub fn provider_start<E: Error + Send + Sync + 'static>(key: &str, error: E) -> Self {
        Self::ProviderStart {
            key: key.to_string(),
            source: Arc::new(error),
        }
    }
}

/// Errors related to provider definition registries.
#[derive(Error, Clone, Ord, PartialOrd, Eq, PartialEq, Hash, Debug)]
pub enum ProviderDefinitionRegistryError {
    #[error("Attempted to register a duplicated provider with key: {0}")]
    DuplicateProviderKey(String),
    #[error("Attempted to re-register provider '{0}' which is already booted or booting")]
    ProviderAlreadyResolved(String),
    #[error("Provider '{0}' has no start procedure")]
    MissingStartProcedure(String),
    #[error("Attempted to register provider '{0}' in a container which has been shut down")]
    ContainerShutDown(String),
}

/// Panic raised by a start procedure, reported as the cause of a failed start.
#[derive(Error, Clone, Debug)]
#[error("start procedure panicked: {message}")]
pub struct StartPanic {
    message: String,
}

impl StartPanic {
    /// Extracts the panic message from a payload returned by [std::panic::catch_unwind].
    pub fn from_payload(payload: &(dyn Any + Send)) -> Self {
        let message = payload
            .downcast_ref::<&str>()
            .map(|message| message.to_string())
            .or_else(|| payload.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "unknown panic payload".to_string());

        Self { message }
    }

    #[inline]
    pub fn message(&self) -> &str {
        &self.message
    }
}

#[cfg(test)]
mod tests {
    use crate::error::{ComponentInstanceProviderError, ProviderDefinitionRegistryError, StartPanic};
    use std::fmt::{Display, Formatter};
    use std::panic;

    #[derive(Debug)]
    struct TestError;

    impl Display for TestError {
        fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
            write!(f, "broken")
        }
    }

    impl std::error::Error for TestError {}

    #[test]
    fn should_format_cycle_path() {
        let error = ComponentInstanceProviderError::CircularDependency(vec![
            "a".to_string(),
            "b".to_string(),
            "a".to_string(),
        ]);

        assert_eq!(
            error.to_string(),
            "Detected a circular dependency: a -> b -> a"
        );
    }

    #[test]
    fn should_preserve_start_cause() {
        let error = ComponentInstanceProviderError::provider_start("logger", TestError);

        assert_eq!(error.to_string(), "Error starting provider 'logger': broken");
        assert!(std::error::Error::source(&error).is_some());
    }

    #[test]
    fn should_convert_registration_error() {
        let error: ComponentInstanceProviderError =
            ProviderDefinitionRegistryError::DuplicateProviderKey("logger".to_string()).into();

        assert!(matches!(
            error,
            ComponentInstanceProviderError::Registration(
                ProviderDefinitionRegistryError::DuplicateProviderKey(_)
            )
        ));
    }

    #[test]
    fn should_extract_panic_message() {
        let payload = panic::catch_unwind(|| panic!("no connection")).unwrap_err();
        assert_eq!(StartPanic::from_payload(&*payload).message(), "no connection");

        let payload = panic::catch_unwind(|| panic!("port {}", 8080)).unwrap_err();
        assert_eq!(
            StartPanic::from_payload(&*payload).to_string(),
            "start procedure panicked: port 8080"
        );
    }
}
