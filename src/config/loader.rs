use crate::config::schema::WorkerConfig;
use crate::error::{Error, Result};
use serde_json::Value;
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use validator::Validate;

pub struct ConfigLoader;

impl ConfigLoader {
    /// Loads a config file, resolving `extends` chains on top of the built-in defaults.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<WorkerConfig> {
        let mut visited = HashSet::new();
        let layer = Self::load_with_inheritance(path.as_ref(), &mut visited)?;

        let mut merged = serde_json::to_value(WorkerConfig::default())?;
        Self::merge_values(&mut merged, layer);
        if let Value::Object(map) = &mut merged {
            map.remove("extends");
        }

        let config: WorkerConfig = serde_json::from_value(merged)
            .map_err(|e| Error::Config(format!("{}: {}", path.as_ref().display(), e)))?;
        config.validate()?;
        Ok(config)
    }

    pub fn load_or_default(path: Option<&Path>) -> Result<WorkerConfig> {
        match path {
            Some(path) => Self::load(path),
            None => {
                let config = WorkerConfig::default();
                config.validate()?;
                Ok(config)
            }
        }
    }

    fn load_with_inheritance(path: &Path, visited: &mut HashSet<PathBuf>) -> Result<Value> {
        let path = fs::canonicalize(path)
            .map_err(|e| Error::Config(format!("{}: {}", path.display(), e)))?;

        if !visited.insert(path.clone()) {
            return Err(Error::Config(format!(
                "Circular inheritance detected involving {}",
                path.display()
            )));
        }

        let mut layer = Self::load_file(&path)?;
        if !layer.is_object() {
            return Err(Error::Config(format!(
                "{}: top level must be a table/object",
                path.display()
            )));
        }

        let parent = layer
            .get("extends")
            .and_then(Value::as_str)
            .map(str::to_owned);

        match parent {
            Some(parent_path_str) => {
                let parent_path = path
                    .parent()
                    .ok_or_else(|| {
                        Error::Config(format!(
                            "Cannot determine parent directory for {}",
                            path.display()
                        ))
                    })?
                    .join(parent_path_str);

                let mut base = Self::load_with_inheritance(&parent_path, visited)?;
                if let Value::Object(map) = &mut layer {
                    map.remove("extends");
                }
                Self::merge_values(&mut base, layer);
                Ok(base)
            }
            None => Ok(layer),
        }
    }

    fn load_file(path: &Path) -> Result<Value> {
        let content = fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("{}: {}", path.display(), e)))?;

        match path.extension().and_then(|ext| ext.to_str()) {
            Some("json") => Ok(serde_json::from_str(&content)?),
            Some("yaml") | Some("yml") => Ok(serde_yaml::from_str(&content)?),
            Some("toml") => Ok(toml::from_str(&content)?),
            _ => Err(Error::Config(format!(
                "Unsupported file extension: {}",
                path.display()
            ))),
        }
    }

    /// Child values win; nested tables merge key by key.
    fn merge_values(base: &mut Value, overlay: Value) {
        match (base, overlay) {
            (Value::Object(base_map), Value::Object(overlay_map)) => {
                for (key, value) in overlay_map {
                    match base_map.get_mut(&key) {
                        Some(existing) => Self::merge_values(existing, value),
                        None => {
                            base_map.insert(key, value);
                        }
                    }
                }
            }
            (slot, value) => *slot = value,
        }
    }
}
