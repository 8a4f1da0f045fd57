//! Helm `--set` value handling and values file merging

use anyhow::{Context, Result};
use serde_yaml::{Mapping, Value};
use std::fs;
use std::path::Path;

/// Split a comma separated `--set` string, dropping empty entries
pub fn split_set_values(values: &str) -> Vec<String> {
    values
        .split(',')
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(String::from)
        .collect()
}

/// Turn `a.b=c` entries into a nested mapping.
///
/// The literal `false` is stored as a boolean; entries without `=` are skipped.
pub fn set_values_to_map(values: &[String]) -> Mapping {
    let mut answer = Mapping::new();
    for entry in values {
        let Some((path, value)) = entry.split_once('=') else {
            continue;
        };
        let value = if value == "false" {
            Value::Bool(false)
        } else {
            Value::String(value.to_string())
        };
        set_value_via_path(&mut answer, path, value);
    }
    answer
}

fn set_value_via_path(map: &mut Mapping, path: &str, value: Value) {
    let mut keys: Vec<&str> = path.split('.').collect();
    let Some(last) = keys.pop() else {
        return;
    };
    let mut current = map;
    for key in keys {
        let key = Value::String(key.to_string());
        let entry = current
            .entry(key)
            .or_insert_with(|| Value::Mapping(Mapping::new()));
        if !entry.is_mapping() {
            *entry = Value::Mapping(Mapping::new());
        }
        let Value::Mapping(next) = entry else {
            return;
        };
        current = next;
    }
    current.insert(Value::String(last.to_string()), value);
}

/// Deep merge `src` into `dest`: nested maps merge, everything else overwrites
pub fn combine_map_trees(dest: &mut Mapping, src: &Mapping) {
    for (key, value) in src {
        match (dest.get_mut(key), value) {
            (Some(Value::Mapping(d)), Value::Mapping(s)) => combine_map_trees(d, s),
            _ => {
                dest.insert(key.clone(), value.clone());
            }
        }
    }
}

fn load_values_file(path: &Path) -> Result<Mapping> {
    let text = fs::read_to_string(path)
        .with_context(|| format!("Failed to read helm values YAML file {}", path.display()))?;
    if text.trim().is_empty() {
        return Ok(Mapping::new());
    }
    serde_yaml::from_str(&text)
        .with_context(|| format!("Failed to parse helm values YAML file {}", path.display()))
}

/// Merge `inputs` in order, add `extra` keys and store the result under
/// `chart_name` in `out`, keeping whatever `out` already contained.
pub fn combine_value_files_to_file(
    out: &Path,
    inputs: &[&Path],
    chart_name: &str,
    extra: &Mapping,
) -> Result<()> {
    let mut answer = if out.exists() {
        load_values_file(out)?
    } else {
        Mapping::new()
    };

    let mut merged = Mapping::new();
    for input in inputs {
        let values = load_values_file(input)?;
        combine_map_trees(&mut merged, &values);
    }
    for (k, v) in extra {
        merged.insert(k.clone(), v.clone());
    }
    answer.insert(Value::String(chart_name.to_string()), Value::Mapping(merged));

    let text = serde_yaml::to_string(&answer)
        .context("Failed to marshal the combined values YAML files back to YAML")?;
    fs::write(out, text)
        .with_context(|| format!("Failed to save combined helm values YAML file {}", out.display()))
}

/// Whether a chart reference points at the local filesystem
pub fn is_local_chart(chart: &str) -> bool {
    chart.starts_with('/')
        || chart.starts_with('.')
        || chart.matches('/').count() > 1
        || Path::new(chart).exists()
}
