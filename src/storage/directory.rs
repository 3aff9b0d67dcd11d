//! Directory-backed storage
//!
//! One file per partition inside a table directory.

use std::fs::{self, File, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use bytes::Bytes;
use tracing::debug;

use crate::codec::{Record, RecordSerializer};
use crate::error::Result;

use super::{check_addressable, DataFile, PartitionedStorage};

/// Partitioned storage over a directory of `partition_NNNNNN.dat` files
pub struct DirectoryStorage {
    /// Directory holding the partition files
    dir: PathBuf,

    /// Codec shared by every partition of the table
    serializer: Arc<RecordSerializer>,
}

impl DirectoryStorage {
    /// Open or create storage in the given directory
    pub fn open(dir: &Path, serializer: Arc<RecordSerializer>) -> Result<Self> {
        fs::create_dir_all(dir)?;
        Ok(Self {
            dir: dir.to_path_buf(),
            serializer,
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn serializer(&self) -> &RecordSerializer {
        &self.serializer
    }

    /// Indices of every partition file present, ascending
    pub fn materialized(&self) -> Result<Vec<usize>> {
        let mut indices = Vec::new();
        for entry in fs::read_dir(&self.dir)? {
            let entry = entry?;
            let path = entry.path();
            if path.is_file() {
                if let Some(index) = Self::parse_partition_index(&path) {
                    indices.push(index);
                }
            }
        }
        indices.sort_unstable();
        Ok(indices)
    }

    // =========================================================================
    // Private Helpers
    // =========================================================================

    /// Generate partition path given a directory and index
    fn partition_path(dir: &Path, index: usize) -> PathBuf {
        dir.join(format!("partition_{:06}.dat", index))
    }

    /// Parse partition index from filename
    /// "partition_000042.dat" → Some(42)
    fn parse_partition_index(path: &Path) -> Option<usize> {
        if path.extension()? != "dat" {
            return None;
        }
        let name = path.file_stem()?.to_string_lossy();
        let index_str = name.strip_prefix("partition_")?;
        index_str.parse().ok()
    }
}

impl PartitionedStorage for DirectoryStorage {
    fn partition(&self, index: usize) -> Result<Box<dyn DataFile + '_>> {
        check_addressable(index)?;
        Ok(Box::new(PartitionFile {
            path: Self::partition_path(&self.dir, index),
            serializer: &self.serializer,
        }))
    }

    fn partitions_count(&self) -> Result<usize> {
        Ok(self.materialized()?.last().map_or(0, |&max| max + 1))
    }

    fn remove_partition(&self, index: usize) -> Result<()> {
        self.partition(index)?.delete()
    }
}

/// A single partition file
struct PartitionFile<'a> {
    path: PathBuf,
    serializer: &'a RecordSerializer,
}

impl PartitionFile<'_> {
    fn temp_path(&self) -> PathBuf {
        self.path.with_extension("dat.tmp")
    }
}

impl DataFile for PartitionFile<'_> {
    fn read(&self) -> Result<Vec<Record>> {
        match fs::read(&self.path) {
            Ok(bytes) => self.serializer.decode_all(Bytes::from(bytes)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(Vec::new()),
            Err(e) => Err(e.into()),
        }
    }

    fn write(&self, records: &[Record]) -> Result<()> {
        if records.is_empty() && !self.path.exists() {
            return Ok(());
        }

        let encoded = self.serializer.encode_all(records)?;

        // Write beside the target, then rename over it
        let temp = self.temp_path();
        {
            let mut file: File = OpenOptions::new()
                .create(true)
                .write(true)
                .truncate(true)
                .open(&temp)?;
            file.write_all(&encoded)?;
            file.sync_all()?;
        }
        fs::rename(&temp, &self.path)?;

        debug!(path = %self.path.display(), records = records.len(), "partition written");
        Ok(())
    }

    fn delete(&self) -> Result<()> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}
