//! Property Store
//!
//! Persisted scalar settings: primary-key counters, backup retention and
//! the resource page backing each manifest.
//!
//! ## File Format
//! A bincode-encoded `BTreeMap<String, PropertyValue>`, replaced atomically
//! (temp file + rename) on every change.

use std::collections::BTreeMap;
use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::error::{Result, TallyError};

/// A single stored property
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum PropertyValue {
    Long(i64),
    Double(f64),
    Text(String),
    Bytes(Vec<u8>),
}

/// Key/value store for persisted settings
pub trait PropertyStore: Send + Sync {
    fn get(&self, key: &str) -> Option<PropertyValue>;

    fn set(&self, key: &str, value: PropertyValue) -> Result<()>;

    fn remove(&self, key: &str) -> Result<()>;

    /// Set several properties in one write
    fn set_many(&self, entries: Vec<(String, PropertyValue)>) -> Result<()> {
        for (key, value) in entries {
            self.set(&key, value)?;
        }
        Ok(())
    }

    fn get_long(&self, key: &str) -> Result<Option<i64>> {
        match self.get(key) {
            None => Ok(None),
            Some(PropertyValue::Long(v)) => Ok(Some(v)),
            Some(other) => Err(type_mismatch(key, "Long", &other)),
        }
    }

    fn get_double(&self, key: &str) -> Result<Option<f64>> {
        match self.get(key) {
            None => Ok(None),
            Some(PropertyValue::Double(v)) => Ok(Some(v)),
            Some(other) => Err(type_mismatch(key, "Double", &other)),
        }
    }

    fn get_bytes(&self, key: &str) -> Result<Option<Vec<u8>>> {
        match self.get(key) {
            None => Ok(None),
            Some(PropertyValue::Bytes(v)) => Ok(Some(v)),
            Some(other) => Err(type_mismatch(key, "Bytes", &other)),
        }
    }
}

fn type_mismatch(key: &str, expected: &str, found: &PropertyValue) -> TallyError {
    TallyError::InvalidData(format!(
        "property {} should be {}, found {:?}",
        key, expected, found
    ))
}

// =============================================================================
// File-backed store
// =============================================================================

/// Property store persisted to a single file
pub struct FileProperties {
    path: PathBuf,
    values: RwLock<BTreeMap<String, PropertyValue>>,
}

impl FileProperties {
    /// Open the store, starting empty when the file does not exist
    pub fn open(path: &Path) -> Result<Self> {
        let values = match fs::read(path) {
            Ok(bytes) => bincode::deserialize(&bytes)?,
            Err(e) if e.kind() == ErrorKind::NotFound => BTreeMap::new(),
            Err(e) => return Err(e.into()),
        };

        Ok(Self {
            path: path.to_path_buf(),
            values: RwLock::new(values),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn persist(&self, values: &BTreeMap<String, PropertyValue>) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }

        let encoded = bincode::serialize(values)?;
        let mut temp_name = self.path.as_os_str().to_owned();
        temp_name.push(".tmp");
        let temp = PathBuf::from(temp_name);
        {
            let mut file = OpenOptions::new()
                .create(true)
                .write(true)
                .truncate(true)
                .open(&temp)?;
            file.write_all(&encoded)?;
            file.sync_all()?;
        }
        fs::rename(&temp, &self.path)?;
        Ok(())
    }
}

impl PropertyStore for FileProperties {
    fn get(&self, key: &str) -> Option<PropertyValue> {
        self.values.read().get(key).cloned()
    }

    fn set(&self, key: &str, value: PropertyValue) -> Result<()> {
        let mut values = self.values.write();
        values.insert(key.to_string(), value);
        self.persist(&values)
    }

    fn remove(&self, key: &str) -> Result<()> {
        let mut values = self.values.write();
        if values.remove(key).is_some() {
            self.persist(&values)?;
        }
        Ok(())
    }

    fn set_many(&self, entries: Vec<(String, PropertyValue)>) -> Result<()> {
        let mut values = self.values.write();
        values.extend(entries);
        self.persist(&values)
    }
}

// =============================================================================
// In-memory store
// =============================================================================

/// Property store that never touches disk
#[derive(Default)]
pub struct MemoryProperties {
    values: RwLock<BTreeMap<String, PropertyValue>>,
}

impl MemoryProperties {
    pub fn new() -> Self {
        Self::default()
    }
}

impl PropertyStore for MemoryProperties {
    fn get(&self, key: &str) -> Option<PropertyValue> {
        self.values.read().get(key).cloned()
    }

    fn set(&self, key: &str, value: PropertyValue) -> Result<()> {
        self.values.write().insert(key.to_string(), value);
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<()> {
        self.values.write().remove(key);
        Ok(())
    }
}
