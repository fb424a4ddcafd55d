//! Application framework based on [keystone_di] component containers.
//!
//! Applications usually start in the `main()` function and explicitly initialize and pass around
//! their services, clients and other components. With a container in place, each component is
//! described by a provider naming its dependencies, and the container boots them in the right
//! order. This, in turn, requires an entrypoint which boots the container and runs the actual
//! business logic. This crate provides such entrypoint in the form of
//! [Application](application::Application), which also configures supporting infrastructure,
//! e.g. logging.
//!
//! ```
//! use keystone::application::Application;
//! use keystone::config::ApplicationConfig;
//! use keystone::runner::{ApplicationRunner, ApplicationRunnerPtr, ErrorPtr};
//! use keystone_di::instance_provider::ComponentInstancePtr;
//! use keystone_di::provider_registry::Provider;
//!
//! struct GreetingRunner {
//!     greeting: ComponentInstancePtr<String>,
//! }
//!
//! impl ApplicationRunner for GreetingRunner {
//!     fn run(&self) -> Result<(), ErrorPtr> {
//!         println!("{}", self.greeting);
//!         Ok(())
//!     }
//! }
//!
//! let mut application = Application::new(ApplicationConfig::default());
//! application
//!     .register(Provider::new("greeting").start(|_| Ok("Hello world!".to_string())))
//!     .unwrap();
//! application
//!     .register_runner(Provider::new("greeter").uses("greeting").start(|context| {
//!         Ok(Box::new(GreetingRunner {
//!             greeting: context.dependency("greeting")?,
//!         }) as ApplicationRunnerPtr)
//!     }))
//!     .unwrap();
//!
//! application.run().unwrap();
//! ```

pub mod application;
pub mod config;
pub mod runner;
