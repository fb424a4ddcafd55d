//! Dependency-ordered boot sequence used when finalizing a whole container.

use crate::error::ComponentInstanceProviderError;
use crate::provider_registry::ProviderDefinition;
use fxhash::FxHashMap;
use itertools::Itertools;

#[derive(Copy, Clone, Eq, PartialEq, Debug)]
enum Mark {
    Visiting,
    Done,
}

/// Returns keys of all given definitions ordered in a way which guarantees that each key comes
/// after all of its dependencies. Ties are broken by key name, so the order is stable for a given
/// set of definitions.
pub fn boot_order(
    definitions: &FxHashMap<String, ProviderDefinition>,
) -> Result<Vec<String>, ComponentInstanceProviderError> {
    let mut marks = FxHashMap::default();
    let mut path = Vec::new();
    let mut order = Vec::with_capacity(definitions.len());

    for key in definitions.keys().sorted() {
        visit(key, definitions, &mut marks, &mut path, &mut order)?;
    }

    Ok(order)
}

fn visit<'a>(
    key: &'a str,
    definitions: &'a FxHashMap<String, ProviderDefinition>,
    marks: &mut FxHashMap<&'a str, Mark>,
    path: &mut Vec<&'a str>,
    order: &mut Vec<String>,
) -> Result<(), ComponentInstanceProviderError> {
    match marks.get(key) {
        Some(Mark::Done) => return Ok(()),
        Some(Mark::Visiting) => {
            let start = path.iter().position(|entry| *entry == key).unwrap_or(0);
            return Err(ComponentInstanceProviderError::CircularDependency(
                path[start..]
                    .iter()
                    .chain(Some(&key))
                    .map(|entry| entry.to_string())
                    .collect(),
            ));
        }
        None => {}
    }

    let definition = definitions
        .get(key)
        .ok_or_else(|| ComponentInstanceProviderError::UnknownComponent(key.to_string()))?;

    marks.insert(key, Mark::Visiting);
    path.push(key);

    for dependency in &definition.dependencies {
        visit(dependency, definitions, marks, path, order)?;
    }

    path.pop();
    marks.insert(key, Mark::Done);
    order.push(key.to_string());

    Ok(())
}
