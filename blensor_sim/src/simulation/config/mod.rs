// blensor_sim/src/simulation/config/mod.rs

//! This module handles loading, resolving, and validating all simulation
//! configuration from disk, including the prefab catalog system.

mod catalog;
mod resolver;

pub mod structs;

use crate::error::SimError;
use figment::{
    providers::{Env, Format, Toml},
    value::Value,
    Figment,
};
use std::path::Path;
use tracing::{debug, info};

pub use catalog::{load_catalog_from_disk, PrefabCatalog};
pub use resolver::resolve_value;
pub use structs::ScenarioConfig;

/// Prefix of environment variables that override scenario keys, e.g.
/// `BLENSOR_OUTPUT__PATH=out.pcd`.
pub const ENV_PREFIX: &str = "BLENSOR_";

/// Loads a scenario file, layers the environment over it, resolves every
/// prefab reference and validates the result.
pub fn load_scenario(path: &Path, catalog: &PrefabCatalog) -> Result<ScenarioConfig, SimError> {
    // Figment treats a missing file as an empty source.
    if !path.is_file() {
        return Err(SimError::MissingScenario(path.to_path_buf()));
    }
    info!("Loading scenario from: {}", path.display());

    let raw: Value = Figment::new()
        .merge(Toml::file(path))
        .merge(Env::prefixed(ENV_PREFIX).split("__"))
        .extract()?;
    scenario_from_value(&raw, catalog)
}

/// Parses a scenario given as TOML text, without environment overrides.
pub fn parse_scenario(text: &str, catalog: &PrefabCatalog) -> Result<ScenarioConfig, SimError> {
    let raw: Value = Figment::new().merge(Toml::string(text)).extract()?;
    scenario_from_value(&raw, catalog)
}

fn scenario_from_value(raw: &Value, catalog: &PrefabCatalog) -> Result<ScenarioConfig, SimError> {
    let resolved = resolve_value(raw, catalog)?;
    let scenario: ScenarioConfig = resolved.deserialize()?;
    scenario.validate()?;
    debug!(
        sensor = scenario.sensor.device.name(),
        objects = scenario.objects.len(),
        "scenario resolved"
    );
    Ok(scenario)
}

/// A catalog entry with its own `from` chain resolved, rendered as TOML.
pub fn render_preset(key: &str, catalog: &PrefabCatalog) -> Result<String, SimError> {
    let value = catalog
        .get(key)
        .ok_or_else(|| SimError::Prefab(format!("Prefab '{key}' not found in catalog")))?;
    let resolved = resolve_value(value, catalog)?;
    toml::to_string_pretty(&resolved).map_err(|source| SimError::Render {
        what: "preset",
        source,
    })
}
