//! Primary-key counters
//!
//! The persisted `maxId` owned by a counter-backed table.

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

use crate::error::Result;
use crate::props::{PropertyStore, PropertyValue};

/// Greatest id ever assigned by a table
pub trait IdCounter: Send + Sync {
    /// Current value, 0 when nothing was assigned yet
    fn get(&self) -> Result<i64>;

    /// Raise the counter to `candidate`; lower values are ignored
    fn advance(&self, candidate: i64) -> Result<()>;

    /// Overwrite the counter, used when rebuilding from the table itself
    fn reset(&self, value: i64) -> Result<()>;
}

/// Counter kept in a property store under one key
pub struct PropertyCounter {
    store: Arc<dyn PropertyStore>,
    key: String,
}

impl PropertyCounter {
    pub fn new(store: Arc<dyn PropertyStore>, key: impl Into<String>) -> Self {
        Self {
            store,
            key: key.into(),
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }
}

impl IdCounter for PropertyCounter {
    fn get(&self) -> Result<i64> {
        Ok(self.store.get_long(&self.key)?.unwrap_or(0))
    }

    fn advance(&self, candidate: i64) -> Result<()> {
        if candidate > self.get()? {
            self.store.set(&self.key, PropertyValue::Long(candidate))?;
        }
        Ok(())
    }

    fn reset(&self, value: i64) -> Result<()> {
        self.store.set(&self.key, PropertyValue::Long(value))
    }
}

/// Counter that lives only as long as the process
#[derive(Default)]
pub struct MemoryCounter {
    value: AtomicI64,
}

impl MemoryCounter {
    pub fn new(initial: i64) -> Self {
        Self {
            value: AtomicI64::new(initial),
        }
    }
}

impl IdCounter for MemoryCounter {
    fn get(&self) -> Result<i64> {
        Ok(self.value.load(Ordering::SeqCst))
    }

    fn advance(&self, candidate: i64) -> Result<()> {
        self.value.fetch_max(candidate, Ordering::SeqCst);
        Ok(())
    }

    fn reset(&self, value: i64) -> Result<()> {
        self.value.store(value, Ordering::SeqCst);
        Ok(())
    }
}
