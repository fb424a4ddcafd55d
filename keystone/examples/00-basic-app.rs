use keystone::application;
use keystone::runner::{ApplicationRunner, ApplicationRunnerPtr, ErrorPtr};
use keystone_di::provider_registry::Provider;

// this is an application runner, which will run when the application starts
struct HelloWorldRunner;

impl ApplicationRunner for HelloWorldRunner {
    fn run(&self) -> Result<(), ErrorPtr> {
        println!("Hello world!");
        Ok(())
    }
}

// note: for the sake of simplicity, errors are unwrapped, rather than gracefully handled
fn main() {
    // create our application, configured from the environment and an optional keystone.json file
    let mut application =
        application::create_default().expect("unable to create default application");

    // runners are regular components, which boot as ApplicationRunnerPtr
    application
        .register_runner(
            Provider::new("hello_world")
                .start(|_| Ok(Box::new(HelloWorldRunner) as ApplicationRunnerPtr)),
        )
        .expect("error registering runner");

    // prints "Hello world!"
    application.run().expect("error running application");
}
