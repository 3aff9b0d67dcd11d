//! Clustered Index
//!
//! One logical sort order spread across the partitions of a storage.

use std::cmp::Ordering;

use tracing::debug;

use crate::codec::{Record, Value};
use crate::error::{Result, TallyError};
use crate::storage::{DataFile, PartitionedStorage};

use super::iter::{ClusteredIter, Direction};
use super::search::{binary_search_last, insertion_point};

/// Records ordered by one sort column across bounded partitions
///
/// ## Invariants (after every operation):
/// - Records inside a partition ascend by the sort column
/// - For partitions `p < q`: `max(key in p) <= min(key in q)`
/// - No partition holds more than `max_partition_size` records
///
/// ## Concurrency:
/// Mutations take `&mut self` and iterators borrow `&self`, so an open
/// iterator statically excludes inserts and repartitions on the same index.
pub struct ClusteredIndex {
    storage: Box<dyn PartitionedStorage>,
    max_partition_size: usize,
    sort_key: usize,
}

impl ClusteredIndex {
    pub fn new(
        storage: Box<dyn PartitionedStorage>,
        max_partition_size: usize,
        sort_key: usize,
    ) -> Result<Self> {
        if max_partition_size == 0 {
            return Err(TallyError::InvalidArgument(
                "max_partition_size must be at least 1".to_string(),
            ));
        }
        Ok(Self {
            storage,
            max_partition_size,
            sort_key,
        })
    }

    pub fn sort_key(&self) -> usize {
        self.sort_key
    }

    pub fn max_partition_size(&self) -> usize {
        self.max_partition_size
    }

    pub fn storage(&self) -> &dyn PartitionedStorage {
        self.storage.as_ref()
    }

    pub fn partitions_count(&self) -> Result<usize> {
        self.storage.partitions_count()
    }

    /// Explicit access to one materialized partition
    pub fn partition(&self, index: usize) -> Result<Box<dyn DataFile + '_>> {
        let len = self.storage.partitions_count()?;
        if index >= len {
            return Err(TallyError::IndexOutOfRange { index, len });
        }
        self.storage.partition(index)
    }

    /// Partition and in-partition position where a record with `key` would
    /// be inserted. An empty storage yields `(0, 0)`.
    pub fn find_insertion_point(&self, key: &Value) -> Result<(usize, usize)> {
        let (partition, _, position) = self.locate(key)?;
        Ok((partition, position))
    }

    /// Insert a record at its sorted position, after any equal keys
    pub fn insert_with_index(&mut self, record: Record) -> Result<()> {
        let key = self.key_of(&record)?.clone();
        let (partition, mut records, position) = self.locate(&key)?;
        records.insert(position, record);
        self.store(partition, records)
    }

    /// Insert a record, failing with `DuplicateKey` if its key is present
    pub fn insert_with_index_unique(&mut self, record: Record) -> Result<()> {
        let key = self.key_of(&record)?.clone();
        let (partition, mut records, position) = self.locate(&key)?;

        let duplicate = position > 0
            && records[position - 1]
                .get(self.sort_key)
                .is_some_and(|existing| existing.key_cmp(&key) == Ordering::Equal);
        if duplicate {
            return Err(TallyError::DuplicateKey(format!("{:?}", key)));
        }

        records.insert(position, record);
        self.store(partition, records)
    }

    /// First record, in key order, matching `predicate`.
    ///
    /// Full scan; there is no secondary index.
    pub fn query_first(&self, predicate: impl Fn(&Record) -> bool) -> Result<Option<Record>> {
        for record in self.iter()? {
            let record = record?;
            if predicate(&record) {
                return Ok(Some(record));
            }
        }
        Ok(None)
    }

    /// Lazy ascending iteration over every record
    pub fn iter(&self) -> Result<ClusteredIter<'_>> {
        ClusteredIter::new(self, Direction::Ascending)
    }

    /// Lazy descending iteration over every record
    pub fn iter_rev(&self) -> Result<ClusteredIter<'_>> {
        ClusteredIter::new(self, Direction::Descending)
    }

    /// Total number of records
    pub fn len(&self) -> Result<usize> {
        let mut total = 0;
        for index in 0..self.storage.partitions_count()? {
            total += self.storage.partition(index)?.read()?.len();
        }
        Ok(total)
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }

    /// Remove every record matching `predicate`, then rebalance.
    /// Returns the number of records removed.
    pub fn delete_where(&mut self, predicate: impl Fn(&Record) -> bool) -> Result<usize> {
        let mut removed = 0;
        for index in 0..self.storage.partitions_count()? {
            let file = self.storage.partition(index)?;
            let mut records = file.read()?;
            let before = records.len();
            records.retain(|record| !predicate(record));
            if records.len() != before {
                removed += before - records.len();
                file.write(&records)?;
            }
        }

        if removed > 0 {
            self.repartition()?;
        }
        Ok(removed)
    }

    /// Rebalance every partition
    pub fn repartition(&mut self) -> Result<()> {
        self.repartition_from(0)
    }

    /// Rebalance partitions `start..`, leaving earlier partitions untouched.
    ///
    /// Records are re-sorted (stable, so equal keys keep their order) and
    /// packed to half capacity, rounded up. Partitions left over at the tail
    /// are removed.
    pub fn repartition_from(&mut self, start: usize) -> Result<()> {
        self.rebalance(start, None)
    }

    // =========================================================================
    // Private Helpers
    // =========================================================================

    fn fill_target(&self) -> usize {
        self.max_partition_size.div_ceil(2)
    }

    fn key_of<'r>(&self, record: &'r Record) -> Result<&'r Value> {
        record.get(self.sort_key).ok_or_else(|| {
            TallyError::InvalidArgument(format!(
                "record has {} values, sort key is column {}",
                record.len(),
                self.sort_key
            ))
        })
    }

    /// Write back a partition, rebalancing from it when it overflows.
    /// An overflowing partition is never written as is.
    fn store(&mut self, partition: usize, records: Vec<Record>) -> Result<()> {
        if records.len() > self.max_partition_size {
            return self.rebalance(partition, Some(records));
        }
        self.storage.partition(partition)?.write(&records)
    }

    /// Rebalance from `start`, using `pending` in place of the stored
    /// content of partition `start` when given
    fn rebalance(&mut self, start: usize, pending: Option<Vec<Record>>) -> Result<()> {
        let stored = self.storage.partitions_count()?;
        if start >= stored && pending.is_none() {
            return Ok(());
        }
        let count = stored.max(start + 1);

        let mut records = match pending {
            Some(records) => records,
            None => self.storage.partition(start)?.read()?,
        };
        for index in start + 1..count {
            records.extend(self.storage.partition(index)?.read()?);
        }
        for record in &records {
            self.key_of(record)?;
        }
        let sort_key = self.sort_key;
        records.sort_by(|a, b| a[sort_key].key_cmp(&b[sort_key]));

        let fill = self.fill_target();
        let mut next = start;
        for chunk in records.chunks(fill) {
            self.storage.partition(next)?.write(chunk)?;
            next += 1;
        }
        for index in next..count {
            self.storage.remove_partition(index)?;
        }

        debug!(
            start,
            records = records.len(),
            partitions_before = count,
            partitions_after = next,
            "repartitioned"
        );
        Ok(())
    }

    /// Find the receiving partition, its records and the position for `key`
    fn locate(&self, key: &Value) -> Result<(usize, Vec<Record>, usize)> {
        let count = self.storage.partitions_count()?;
        if count == 0 {
            return Ok((0, Vec::new(), 0));
        }

        // Number of partitions whose first key is <= key; the last of them
        // receives the record so duplicates go after every equal key
        let mut lo = 0;
        let mut hi = count;
        while lo < hi {
            let mid = lo + (hi - lo) / 2;
            match self.first_key_from(mid, count)? {
                Some(first) if first.key_cmp(key) != Ordering::Greater => lo = mid + 1,
                _ => hi = mid,
            }
        }
        let partition = lo.saturating_sub(1);

        let records = self.storage.partition(partition)?.read()?;
        let sort_key = self.sort_key;
        let result = binary_search_last(&records, |record| {
            record
                .get(sort_key)
                .map_or(Ordering::Less, |existing| existing.key_cmp(key))
        });

        Ok((partition, records, insertion_point(result)))
    }

    /// First key of the nearest non-empty partition at or after `index`
    fn first_key_from(&self, index: usize, count: usize) -> Result<Option<Value>> {
        for candidate in index..count {
            let records = self.storage.partition(candidate)?.read()?;
            if let Some(first) = records.first() {
                return Ok(Some(self.key_of(first)?.clone()));
            }
        }
        Ok(None)
    }
}
