//! Core application framework functionality.

use crate::config::ApplicationConfig;
use crate::runner::{ApplicationRunnerPtr, ErrorPtr};
use config::ConfigError;
use derive_more::Deref;
use itertools::Itertools;
use keystone_di::container::{Container, ContainerBuilder};
use keystone_di::instance_provider::TypedComponentInstanceProvider;
use keystone_di::provider_registry::Provider;
use keystone_di::{ComponentInstanceProviderError, ProviderDefinitionRegistryError};
use std::cmp::Reverse;
use thiserror::Error;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

#[derive(Error, Debug)]
pub enum ApplicationError {
    #[error("Error reading configuration: {0}")]
    Config(#[from] ConfigError),
    #[error("Error booting components: {0}")]
    Boot(ComponentInstanceProviderError),
    #[error("Error retrieving runners: {0}")]
    RunnerInjectionError(ComponentInstanceProviderError),
    #[error("Runner error: {0}")]
    RunnerError(ErrorPtr),
    #[error("Error shutting down components: {0}")]
    Shutdown(ComponentInstanceProviderError),
}

/// Creates an [Application] configured from the environment. See [crate::config] for details.
pub fn create_default() -> Result<Application, ApplicationError> {
    ApplicationConfig::init_from_environment()
        .map(Application::new)
        .map_err(ApplicationError::Config)
}

/// Main entrypoint for the application. Boots components and runs
/// [ApplicationRunners](crate::runner::ApplicationRunner). Dereferences to the underlying
/// [Container], so providers can be registered directly.
#[derive(Deref)]
pub struct Application {
    config: ApplicationConfig,
    #[deref]
    container: Container,
    runners: Vec<String>,
}

impl Application {
    /// Creates an application with a new container, configured according to given config.
    pub fn new(config: ApplicationConfig) -> Self {
        let container = ContainerBuilder::new()
            .with_definition_overriding(config.allow_definition_overriding)
            .build();

        Self::with_container(config, container)
    }

    /// Creates an application using an existing container.
    pub fn with_container(config: ApplicationConfig, container: Container) -> Self {
        Self {
            config,
            container,
            runners: Vec::new(),
        }
    }

    #[inline]
    pub fn config(&self) -> &ApplicationConfig {
        &self.config
    }

    #[inline]
    pub fn container(&self) -> &Container {
        &self.container
    }

    /// Registers a provider of an [ApplicationRunnerPtr] and marks it to be run.
    pub fn register_runner(
        &mut self,
        provider: Provider,
    ) -> Result<(), ProviderDefinitionRegistryError> {
        let key = provider.key().to_string();
        self.container.register(provider)?;
        self.add_runner(key);
        Ok(())
    }

    /// Marks an already registered component as a runner to be run.
    pub fn add_runner<K: ToString>(&mut self, key: K) {
        let key = key.to_string();
        if !self.runners.contains(&key) {
            self.runners.push(key);
        }
    }

    /// Boots components, runs all runners by priority and shuts the container down, even if
    /// booting or running fails. The container cannot be used after shutdown, so an application
    /// runs once.
    pub fn run(&self) -> Result<(), ApplicationError> {
        let _logger_guard = self.config.install_tracing_logger.then(|| {
            let subscriber = tracing_subscriber::fmt()
                .with_env_filter(
                    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
                )
                .finish();

            tracing::subscriber::set_default(subscriber)
        });

        let result = self.boot_and_run();

        info!("Shutting down...");
        let shutdown = self.container.shutdown().map_err(ApplicationError::Shutdown);

        result.and(shutdown)
    }

    fn boot_and_run(&self) -> Result<(), ApplicationError> {
        if self.config.finalize_on_start {
            info!("Booting all components...");
            self.container
                .finalize_all()
                .map_err(ApplicationError::Boot)?;
        }

        info!("Searching for application runners...");

        let runners = self
            .runners
            .iter()
            .map(|key| self.container.instance_typed::<ApplicationRunnerPtr>(key))
            .collect::<Result<Vec<_>, _>>()
            .map_err(ApplicationError::RunnerInjectionError)?;

        info!("Running application runners...");

        // stable sort keeps registration order for equal priorities
        for runner in runners.iter().sorted_by_key(|runner| Reverse(runner.priority())) {
            runner.run().map_err(ApplicationError::RunnerError)?;
        }

        debug!("All runners finished.");
        Ok(())
    }
}
