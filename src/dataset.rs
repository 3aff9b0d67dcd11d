//! Dataset
//!
//! A data directory (one subdirectory per table) together with its local
//! manifest and corruption state.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{info, warn};

use crate::codec::RecordSerializer;
use crate::config::IntegrityMode;
use crate::error::{Result, TallyError};
use crate::storage::DirectoryStorage;
use crate::sync::{Local, Version};

/// A data directory and its manifest
pub struct Dataset {
    local: Local,
    corrupted: bool,
}

impl Dataset {
    /// Open a data directory.
    ///
    /// Creates the manifest when none exists; otherwise runs the integrity
    /// test and flags the dataset corrupted instead of failing.
    pub fn open(root: &Path, mode: IntegrityMode) -> Result<Self> {
        let mut local = Local::open(root, mode)?;

        let corrupted = if local.index().is_empty() {
            local.create_index()?;
            false
        } else {
            match local.data_integrity_test() {
                Ok(()) => false,
                Err(TallyError::InvalidData(detail)) => {
                    warn!(root = %root.display(), %detail, "dataset flagged corrupted");
                    true
                }
                Err(e) => return Err(e),
            }
        };

        info!(
            root = %root.display(),
            version = %local.version(),
            corrupted,
            "dataset opened"
        );
        Ok(Self { local, corrupted })
    }

    pub fn root(&self) -> &Path {
        self.local.root()
    }

    pub fn local(&self) -> &Local {
        &self.local
    }

    pub fn local_mut(&mut self) -> &mut Local {
        &mut self.local
    }

    pub fn is_corrupted(&self) -> bool {
        self.corrupted
    }

    /// Version of the manifest as last persisted, without rescanning
    pub fn version(&self) -> Version {
        self.local.version()
    }

    /// Bring the manifest up to date with the directory and return its
    /// version.
    ///
    /// A corrupted dataset is not rescanned and fails with
    /// [`TallyError::InvalidData`] until it is recovered.
    pub fn current_version(&mut self) -> Result<Version> {
        if self.corrupted {
            return Err(TallyError::InvalidData(format!(
                "dataset at {} is corrupted",
                self.root().display()
            )));
        }
        self.local.update_index()?;
        Ok(self.local.version())
    }

    /// Re-run the integrity test and update the corruption flag
    pub fn verify(&mut self) -> Result<bool> {
        self.corrupted = match self.local.data_integrity_test() {
            Ok(()) => false,
            Err(TallyError::InvalidData(_)) => true,
            Err(e) => return Err(e),
        };
        Ok(!self.corrupted)
    }

    /// Directory holding one table's partitions
    pub fn table_dir(&self, table: &str) -> Result<PathBuf> {
        let valid = !table.is_empty()
            && !table.starts_with('.')
            && table
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
        if !valid {
            return Err(TallyError::InvalidArgument(format!(
                "invalid table name: {:?}",
                table
            )));
        }
        Ok(self.root().join(table))
    }

    /// Partition storage for one table of this dataset
    pub fn open_storage(
        &self,
        table: &str,
        serializer: Arc<RecordSerializer>,
    ) -> Result<DirectoryStorage> {
        DirectoryStorage::open(&self.table_dir(table)?, serializer)
    }
}
