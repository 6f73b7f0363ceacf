// blensor_sim/src/simulation/config/catalog.rs

//! The prefab catalog: every preset TOML file under a directory, parsed and
//! keyed by its relative path.

use figment::{
    providers::{Format, Toml},
    value::Value,
    Figment,
};
use std::{collections::BTreeMap, path::Path};
use tracing::{error, info, warn};
use walkdir::WalkDir;

/// Holds the entire parsed catalog of prefabs.
/// The key is a namespace string (e.g., "sensors.hdl64e") and the value is
/// the raw, parsed TOML data for that preset.
#[derive(Default, Debug, Clone)]
pub struct PrefabCatalog(pub BTreeMap<String, Value>);

impl PrefabCatalog {
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// `sensors/hdl64e.toml` under `root` -> `sensors.hdl64e`.
fn catalog_key(root: &Path, path: &Path) -> Option<String> {
    let relative = path.strip_prefix(root).ok()?.with_extension("");
    let parts: Vec<String> = relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect();
    (!parts.is_empty()).then(|| parts.join("."))
}

/// Walks `catalog_path`, parses every `.toml` file and collects the results.
/// Files that fail to parse are logged and skipped; a missing directory gives
/// an empty catalog.
pub fn load_catalog_from_disk(catalog_path: &Path) -> PrefabCatalog {
    let mut catalog = PrefabCatalog::default();
    if !catalog_path.exists() {
        warn!(
            "Catalog directory not found at {:?}, no prefabs will be loaded.",
            catalog_path
        );
        return catalog;
    }

    info!("Loading prefab catalog from: {:?}", catalog_path);

    for entry in WalkDir::new(catalog_path)
        .sort_by_file_name()
        .into_iter()
        .filter_map(Result::ok)
        .filter(|e| !e.file_type().is_dir() && e.path().extension().is_some_and(|ext| ext == "toml"))
    {
        let path = entry.path();
        let Some(key) = catalog_key(catalog_path, path) else {
            continue;
        };

        match Figment::new().merge(Toml::file(path)).extract::<Value>() {
            Ok(data) => {
                info!("Loaded catalog item: '{}'", key);
                catalog.0.insert(key, data);
            }
            Err(e) => {
                error!("Failed to load catalog item from {:?}: {}", path, e);
            }
        }
    }
    catalog
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn keys_follow_relative_paths() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("sensors/velodyne")).unwrap();
        fs::write(dir.path().join("sensors/velodyne/hdl64e.toml"), "kind = \"Velodyne\"\n").unwrap();
        fs::write(dir.path().join("sensors/tof.toml"), "kind = \"Tof\"\n").unwrap();
        fs::write(dir.path().join("notes.txt"), "ignored").unwrap();
        fs::write(dir.path().join("broken.toml"), "kind = ").unwrap();

        let catalog = load_catalog_from_disk(dir.path());
        let keys: Vec<&str> = catalog.keys().collect();
        assert_eq!(keys, vec!["sensors.tof", "sensors.velodyne.hdl64e"]);
        let kind = catalog
            .get("sensors.tof")
            .and_then(|v| v.find_ref("kind"))
            .and_then(|v| v.as_str());
        assert_eq!(kind, Some("Tof"));
    }

    #[test]
    fn missing_directory_gives_an_empty_catalog() {
        let dir = tempfile::tempdir().unwrap();
        assert!(load_catalog_from_disk(&dir.path().join("nope")).is_empty());
    }
}
