use keystone_di::container::ContainerBuilder;
use keystone_di::instance_provider::{ComponentInstancePtr, TypedComponentInstanceProvider};
use keystone_di::provider_registry::Provider;

// this is a component which depends on another one, registered under the "logger" key
struct Client {
    logger: ComponentInstancePtr<String>,
}

impl Client {
    fn call(&self) {
        println!("Calling with {}!", self.logger);
    }
}

//noinspection DuplicatedCode
// note: for the sake of simplicity, errors are unwrapped, rather than gracefully handled
fn main() {
    // components are booted by a Container
    // for convenience, ContainerBuilder can be used to create the container with a reasonable
    // default configuration
    let container = ContainerBuilder::new().build();

    // a provider without dependencies - the start procedure simply returns the component
    container
        .register(Provider::new("logger").start(|_| {
            println!("Booting logger!");
            Ok("my logger".to_string())
        }))
        .expect("error registering logger");

    // "uses" declares dependencies, which are booted before the start procedure runs
    container
        .register(Provider::new("client").uses("logger").start(|context| {
            Ok(Client {
                logger: context.dependency("logger")?,
            })
        }))
        .expect("error registering client");

    // prints "Booting logger!" - nothing is booted until requested
    let client = container
        .instance_typed::<Client>("client")
        .expect("error booting client");

    // prints "Calling with my logger!"
    client.call();

    // the same instance is returned on subsequent requests, without booting it again
    let again = container
        .instance_typed::<Client>("client")
        .expect("error booting client");
    assert!(ComponentInstancePtr::ptr_eq(&client, &again));
}
