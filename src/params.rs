// Persistent parameters (trim and friends) that survive restarts
//
// File format is a flat JSON object of key -> number:
//   { "trim": 0.02 }

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::error::Result;

/// Durable key/value storage for scalar parameters
pub trait ParamStore: Send {
    fn read_param(&self, key: &str) -> Option<f64>;

    /// Store `value` under `key`, persisting it before returning
    fn write_param(&mut self, key: &str, value: f64) -> Result<()>;
}

/// Parameter store backed by a JSON file
pub struct FileParamStore {
    path: PathBuf,
    values: BTreeMap<String, f64>,
}

impl FileParamStore {
    /// Open the store at `path`
    ///
    /// A missing file is an empty store. A file that cannot be parsed is logged
    /// and treated as empty; the next write replaces it.
    pub fn open(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref().to_path_buf();
        let values = match fs::read_to_string(&path) {
            Ok(text) => match serde_json::from_str(&text) {
                Ok(values) => values,
                Err(e) => {
                    warn!("Ignoring unreadable parameter file {}: {}", path.display(), e);
                    BTreeMap::new()
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("No parameter file at {}, starting empty", path.display());
                BTreeMap::new()
            }
            Err(e) => {
                warn!("Failed to read parameter file {}: {}", path.display(), e);
                BTreeMap::new()
            }
        };
        Self { path, values }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Write the whole map to a sibling temp file and rename it into place
    fn flush(&self) -> Result<()> {
        if let Some(dir) = self.path.parent() {
            if !dir.as_os_str().is_empty() {
                fs::create_dir_all(dir)?;
            }
        }
        let text = serde_json::to_string_pretty(&self.values)?;
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, text)?;
        fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}

impl ParamStore for FileParamStore {
    fn read_param(&self, key: &str) -> Option<f64> {
        self.values.get(key).copied()
    }

    fn write_param(&mut self, key: &str, value: f64) -> Result<()> {
        self.values.insert(key.to_string(), value);
        self.flush()?;
        debug!("Wrote param {}={} to {}", key, value, self.path.display());
        Ok(())
    }
}

/// In-memory store, for tests and hardware-less runs
#[derive(Debug, Default, Clone)]
pub struct MemoryParamStore {
    values: BTreeMap<String, f64>,
}

impl MemoryParamStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_param(mut self, key: &str, value: f64) -> Self {
        self.values.insert(key.to_string(), value);
        self
    }
}

impl ParamStore for MemoryParamStore {
    fn read_param(&self, key: &str) -> Option<f64> {
        self.values.get(key).copied()
    }

    fn write_param(&mut self, key: &str, value: f64) -> Result<()> {
        self.values.insert(key.to_string(), value);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileParamStore::open(dir.path().join("params.json"));
        assert_eq!(store.read_param("trim"), None);
    }

    #[test]
    fn test_write_persists_across_open() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("params.json");

        let mut store = FileParamStore::open(&path);
        store.write_param("trim", 0.05).unwrap();
        store.write_param("other", -1.5).unwrap();

        let reopened = FileParamStore::open(&path);
        assert_eq!(reopened.path(), path.as_path());
        assert_eq!(reopened.read_param("trim"), Some(0.05));
        assert_eq!(reopened.read_param("other"), Some(-1.5));
        // No temp file left behind
        assert!(!path.with_extension("json.tmp").exists());
    }

    #[test]
    fn test_corrupt_file_is_replaced_on_write() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("params.json");
        fs::write(&path, "trim: not json").unwrap();

        let mut store = FileParamStore::open(&path);
        assert_eq!(store.read_param("trim"), None);

        store.write_param("trim", 0.1).unwrap();
        assert_eq!(FileParamStore::open(&path).read_param("trim"), Some(0.1));
    }

    #[test]
    fn test_memory_store() {
        let mut store = MemoryParamStore::new().with_param("trim", 0.2);
        assert_eq!(store.read_param("trim"), Some(0.2));
        store.write_param("trim", -0.1).unwrap();
        assert_eq!(store.read_param("trim"), Some(-0.1));
    }
}
