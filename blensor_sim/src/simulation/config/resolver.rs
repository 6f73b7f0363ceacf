// blensor_sim/src/simulation/config/resolver.rs

//! Resolves `from = "..."` references against the prefab catalog.

use super::catalog::PrefabCatalog;
use crate::error::SimError;
use figment::value::{Dict, Tag, Value};

/// Prefab chains deeper than this are treated as cycles.
const MAX_DEPTH: usize = 32;

pub fn resolve_value(value: &Value, catalog: &PrefabCatalog) -> Result<Value, SimError> {
    resolve_value_recursively(value, catalog, 0)
}

/// Recursive deep merge: merges the contents of `override_dict` into `base`.
fn deep_merge(base: &mut Dict, override_dict: &Dict) {
    for (key, override_val) in override_dict {
        // An override that is itself a `from` reference replaces the base value
        // outright instead of merging into it.
        if let Some(d) = override_val.as_dict() {
            if d.contains_key("from") {
                base.insert(key.clone(), override_val.clone());
                continue;
            }
        }

        if let Some(base_val) = base.get_mut(key) {
            if let (Some(base_sub_dict), Some(override_sub_dict)) =
                (base_val.as_dict(), override_val.as_dict())
            {
                let mut new_sub_dict = base_sub_dict.clone();
                deep_merge(&mut new_sub_dict, override_sub_dict);
                *base_val = Value::Dict(Tag::Default, new_sub_dict);
                continue;
            }
        }
        base.insert(key.clone(), override_val.clone());
    }
}

fn resolve_value_recursively(
    value: &Value,
    catalog: &PrefabCatalog,
    depth: usize,
) -> Result<Value, SimError> {
    if depth > MAX_DEPTH {
        return Err(SimError::Prefab(format!(
            "prefab references nest deeper than {MAX_DEPTH} levels (cycle?)"
        )));
    }

    // Pre-order: resolve the current node, then the children of the result.
    let current_node = match value.as_dict() {
        Some(dict) => match dict.get("from") {
            Some(from) => {
                let from_key = from.as_str().ok_or_else(|| {
                    SimError::Prefab("'from' must name a catalog entry as a string".to_string())
                })?;
                let base_prefab_data = catalog
                    .get(from_key)
                    .ok_or_else(|| SimError::Prefab(format!("Prefab '{from_key}' not found in catalog")))?;

                let resolved_base = resolve_value_recursively(base_prefab_data, catalog, depth + 1)?;
                let mut final_dict = resolved_base.into_dict().ok_or_else(|| {
                    SimError::Prefab(format!(
                        "Prefab '{from_key}' must resolve to a dictionary to be merged."
                    ))
                })?;

                // The sibling keys of `from` override the prefab.
                deep_merge(&mut final_dict, dict);
                Value::Dict(Tag::Default, final_dict)
            }
            None => value.clone(),
        },
        None => value.clone(),
    };

    match &current_node {
        Value::Dict(tag, dict) => {
            let mut new_dict = Dict::new();
            for (key, val) in dict.iter() {
                // The 'from' key has been processed, so we strip it from the final output.
                if key == "from" {
                    continue;
                }
                new_dict.insert(key.clone(), resolve_value_recursively(val, catalog, depth + 1)?);
            }
            Ok(Value::Dict(*tag, new_dict))
        }
        Value::Array(tag, arr) => {
            let resolved = arr
                .iter()
                .map(|item| resolve_value_recursively(item, catalog, depth + 1))
                .collect::<Result<Vec<_>, _>>()?;
            Ok(Value::Array(*tag, resolved))
        }
        _ => Ok(current_node),
    }
}
