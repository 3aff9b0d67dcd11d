//! In-memory storage
//!
//! Partitions held in a map; nothing touches the filesystem.

use std::collections::BTreeMap;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::codec::Record;
use crate::error::Result;

use super::{check_addressable, DataFile, PartitionedStorage};

/// Partitioned storage kept entirely in memory
///
/// Cloning shares the same partitions.
#[derive(Clone, Default)]
pub struct MemoryStorage {
    partitions: Arc<RwLock<BTreeMap<usize, Vec<Record>>>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record count of every materialized partition, by index
    pub fn partition_sizes(&self) -> Vec<(usize, usize)> {
        self.partitions
            .read()
            .iter()
            .map(|(&index, records)| (index, records.len()))
            .collect()
    }
}

impl PartitionedStorage for MemoryStorage {
    fn partition(&self, index: usize) -> Result<Box<dyn DataFile + '_>> {
        check_addressable(index)?;
        Ok(Box::new(MemoryPartition {
            index,
            partitions: &self.partitions,
        }))
    }

    fn partitions_count(&self) -> Result<usize> {
        Ok(self
            .partitions
            .read()
            .keys()
            .next_back()
            .map_or(0, |&max| max + 1))
    }

    fn remove_partition(&self, index: usize) -> Result<()> {
        self.partition(index)?.delete()
    }
}

struct MemoryPartition<'a> {
    index: usize,
    partitions: &'a RwLock<BTreeMap<usize, Vec<Record>>>,
}

impl DataFile for MemoryPartition<'_> {
    fn read(&self) -> Result<Vec<Record>> {
        Ok(self
            .partitions
            .read()
            .get(&self.index)
            .cloned()
            .unwrap_or_default())
    }

    fn write(&self, records: &[Record]) -> Result<()> {
        let mut partitions = self.partitions.write();
        if records.is_empty() && !partitions.contains_key(&self.index) {
            return Ok(());
        }
        partitions.insert(self.index, records.to_vec());
        Ok(())
    }

    fn delete(&self) -> Result<()> {
        self.partitions.write().remove(&self.index);
        Ok(())
    }
}
