//! Persisted user preferences.

use std::collections::BTreeMap;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use dirs::config_dir;
use serde_json::Value;

use crate::error::{ExportError, Result};

/// Whether `\( \)` / `\[ \]` delimiters are rewritten to dollar signs.
pub const CONVERT_LATEX_KEY: &str = "convertLatexDelimiters";
pub const CONVERT_LATEX_DEFAULT: bool = true;

const PREFERENCES_FILE: &str = "preferences.json";

pub trait PreferenceStore: Send + Sync {
    fn get_bool(&self, key: &str, default: bool) -> Result<bool>;
    fn set_bool(&self, key: &str, value: bool) -> Result<()>;
}

/// Preferences kept in a flat JSON object on disk.
#[derive(Debug, Clone)]
pub struct JsonFilePreferenceStore {
    path: PathBuf,
}

impl JsonFilePreferenceStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Precedence:
    /// 1) `$DSEXPORT_CONFIG_DIR/preferences.json`
    /// 2) `<platform config dir>/dsexport/preferences.json`
    pub fn from_env_or_home() -> Result<Self> {
        let dir = env::var_os("DSEXPORT_CONFIG_DIR")
            .filter(|path| !path.is_empty())
            .map(PathBuf::from)
            .or_else(|| config_dir().map(|path| path.join("dsexport")))
            .ok_or(ExportError::ConfigDirectoryNotFound)?;
        Ok(Self::new(dir.join(PREFERENCES_FILE)))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn load(&self) -> Result<BTreeMap<String, Value>> {
        let raw = match fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(BTreeMap::new()),
            Err(source) => {
                return Err(ExportError::Io {
                    path: self.path.clone(),
                    source,
                });
            }
        };
        if raw.trim().is_empty() {
            return Ok(BTreeMap::new());
        }
        serde_json::from_str(&raw).map_err(|source| ExportError::Preferences {
            path: self.path.clone(),
            source,
        })
    }
}

impl PreferenceStore for JsonFilePreferenceStore {
    fn get_bool(&self, key: &str, default: bool) -> Result<bool> {
        Ok(self
            .load()?
            .get(key)
            .and_then(Value::as_bool)
            .unwrap_or(default))
    }

    fn set_bool(&self, key: &str, value: bool) -> Result<()> {
        let mut values = self.load()?;
        values.insert(key.to_string(), Value::Bool(value));

        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(|source| ExportError::Io {
                path: parent.to_path_buf(),
                source,
            })?;
        }
        let raw = serde_json::to_string_pretty(&values)
            .map_err(|err| ExportError::Serialization(err.to_string()))?;
        fs::write(&self.path, raw).map_err(|source| ExportError::Io {
            path: self.path.clone(),
            source,
        })?;
        tracing::debug!(key, value, path = %self.path.display(), "preference saved");
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct MemoryPreferenceStore {
    values: Mutex<BTreeMap<String, bool>>,
}

impl PreferenceStore for MemoryPreferenceStore {
    fn get_bool(&self, key: &str, default: bool) -> Result<bool> {
        let values = self.values.lock().unwrap_or_else(|err| err.into_inner());
        Ok(values.get(key).copied().unwrap_or(default))
    }

    fn set_bool(&self, key: &str, value: bool) -> Result<()> {
        let mut values = self.values.lock().unwrap_or_else(|err| err.into_inner());
        values.insert(key.to_string(), value);
        Ok(())
    }
}

/// Flips a boolean preference and returns its new value.
pub fn toggle(store: &dyn PreferenceStore, key: &str, default: bool) -> Result<bool> {
    let next = !store.get_bool(key, default)?;
    store.set_bool(key, next)?;
    Ok(next)
}
