//! Storage Module
//!
//! Partitioned record storage behind one capability trait.
//!
//! ## Responsibilities
//! - Own the physical identity of partitions (files or in-memory slots)
//! - Read/replace/delete a partition's records as a unit
//! - Report how many partitions are materialized
//!
//! ## Backends
//! - [`DirectoryStorage`]: one file per partition, `partition_NNNNNN.dat`
//! - [`MemoryStorage`]: partitions kept in a map, for tests and scratch tables
//!
//! Partition indices below [`MAX_PARTITIONS`] are always addressable; a
//! partition is materialized on its first non-empty write. After
//! `remove_partition` the set of materialized indices may be sparse, so
//! `partitions_count` reports the highest materialized index + 1.

mod directory;
mod memory;

pub use directory::DirectoryStorage;
pub use memory::MemoryStorage;

use crate::codec::Record;
use crate::error::{Result, TallyError};

/// Upper bound on addressable partition indices (six-digit file names)
pub const MAX_PARTITIONS: usize = 1_000_000;

/// One partition: an ordered run of records stored as a unit
pub trait DataFile {
    /// Read every record in stored order. A partition that was never
    /// written reads as empty.
    fn read(&self) -> Result<Vec<Record>>;

    /// Atomically replace the partition's content
    fn write(&self, records: &[Record]) -> Result<()>;

    /// Remove the partition entirely
    fn delete(&self) -> Result<()>;
}

/// A set of independently addressable partitions
pub trait PartitionedStorage: Send + Sync {
    /// Handle for partition `index`
    fn partition(&self, index: usize) -> Result<Box<dyn DataFile + '_>>;

    /// Highest materialized partition index + 1, or 0 when empty
    fn partitions_count(&self) -> Result<usize>;

    /// Delete partition `index`
    fn remove_partition(&self, index: usize) -> Result<()>;
}

pub(crate) fn check_addressable(index: usize) -> Result<()> {
    if index >= MAX_PARTITIONS {
        return Err(TallyError::IndexOutOfRange {
            index,
            len: MAX_PARTITIONS,
        });
    }
    Ok(())
}
