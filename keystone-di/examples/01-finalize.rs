// note: this example assumes you've analyzed the previous one

use keystone_di::container::ContainerBuilder;
use keystone_di::provider_registry::Provider;
use keystone_di::ComponentInstanceProviderError;
use std::fmt::{Display, Formatter};

#[derive(Debug)]
struct ConnectionError;

impl Display for ConnectionError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "database is not available")
    }
}

impl std::error::Error for ConnectionError {}

//noinspection DuplicatedCode
fn main() {
    let container = ContainerBuilder::new().build();

    // stop procedures are called on shutdown, in reverse boot order
    container
        .register(
            Provider::new("database")
                .start(|_| {
                    println!("Connecting...");
                    Ok("connection".to_string())
                })
                .stop(|connection: &String| {
                    println!("Closing {connection}!");
                    Ok(())
                }),
        )
        .expect("error registering database");

    container
        .register(
            Provider::new("repository")
                .uses("database")
                .start(|context| context.dependency::<String>("database").map(|_| ()))
                .stop(|_: &()| {
                    println!("Releasing repository!");
                    Ok(())
                }),
        )
        .expect("error registering repository");

    // boots all registered providers in dependency order, e.g. to warm up before serving traffic
    // prints "Connecting..."
    container.finalize_all().expect("error finalizing container");

    // start errors are reported with the key of the failing provider and the original cause
    container
        .register(Provider::new("cache").start(|context| {
            Err::<(), ComponentInstanceProviderError>(context.start_error(ConnectionError))
        }))
        .expect("error registering cache");

    // prints "Error starting provider 'cache': database is not available"
    if let Err(error) = container.finalize("cache") {
        println!("{error}");
    }

    // stops booted components, after which the container cannot be used anymore
    // prints "Releasing repository!" "Closing connection!"
    container.shutdown().expect("error shutting down container");
}
