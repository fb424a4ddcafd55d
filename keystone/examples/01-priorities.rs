// note: this example assumes you've analyzed the previous one

use keystone::application::Application;
use keystone::config::ApplicationConfig;
use keystone::runner::{ApplicationRunner, ApplicationRunnerPtr, ErrorPtr};
use keystone_di::instance_provider::ComponentInstancePtr;
use keystone_di::provider_registry::Provider;

struct Greeter {
    name: String,
}

struct GreetingRunner {
    // runners can depend on other components, just like any other component
    greeter: ComponentInstancePtr<Greeter>,
    priority: i8,
}

impl ApplicationRunner for GreetingRunner {
    fn run(&self) -> Result<(), ErrorPtr> {
        println!("Hello {}, priority {}!", self.greeter.name, self.priority);
        Ok(())
    }

    // runners with higher priority run first
    fn priority(&self) -> i8 {
        self.priority
    }
}

fn runner(key: &str, priority: i8) -> Provider {
    Provider::new(key).uses("greeter").start(move |context| {
        Ok(Box::new(GreetingRunner {
            greeter: context.dependency("greeter")?,
            priority,
        }) as ApplicationRunnerPtr)
    })
}

fn main() {
    // start with a default config and override what's needed
    let mut config = ApplicationConfig::default();
    config.allow_definition_overriding = true;

    let mut application = Application::new(config);

    application
        .register(Provider::new("greeter").start(|_| {
            Ok(Greeter {
                name: "keystone".to_string(),
            })
        }))
        .expect("error registering greeter");

    application
        .register_runner(runner("low", -10))
        .expect("error registering runner");
    application
        .register_runner(runner("high", 10))
        .expect("error registering runner");

    // prints the "high" greeting first
    application.run().expect("error running application");
}
