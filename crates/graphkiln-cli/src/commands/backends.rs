use anyhow::{Context, Result};
use graphkiln_sync::default_registry;

pub fn execute() -> Result<bool> {
    let registry = default_registry().context("building backend registry")?;
    for descriptor in registry.descriptors() {
        println!("{descriptor}");
    }
    Ok(true)
}
