//! Runners executing actual application logic.

pub use keystone_di::ErrorPtr;
#[cfg(test)]
use mockall::automock;

/// Instance type of runner components.
pub type ApplicationRunnerPtr = Box<dyn ApplicationRunner + Send + Sync>;

/// Runs application logic. Runners are components registered with
/// [Application::register_runner](crate::application::Application::register_runner), which boot
/// as [ApplicationRunnerPtr] instances.
#[cfg_attr(test, automock)]
pub trait ApplicationRunner {
    /// Runs any application code.
    fn run(&self) -> Result<(), ErrorPtr>;

    /// Returns the priority for this runner. Higher priorities get run first. Default 0.
    fn priority(&self) -> i8 {
        0
    }
}
