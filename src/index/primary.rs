//! Primary-key tables
//!
//! Two id assignment strategies layered on [`ClusteredIndex`]:
//! - [`ClusteredIndexWithPk`]: ids come from an external [`IdCounter`]
//! - [`IdClusteredIndex`]: ids are clustered, next id = current max + 1

use crate::codec::{Record, Value};
use crate::error::{Result, TallyError};
use crate::storage::PartitionedStorage;

use super::counter::IdCounter;
use super::iter::ClusteredIter;
use super::ClusteredIndex;

/// Operations shared by the plain index and both primary-key variants
pub trait ClusteredTable {
    /// Underlying ordering/partitioning engine
    fn index(&self) -> &ClusteredIndex;

    fn insert_with_index(&mut self, record: Record) -> Result<()>;

    fn insert_with_index_unique(&mut self, record: Record) -> Result<()>;

    fn repartition(&mut self) -> Result<()>;

    fn query_first(&self, predicate: &dyn Fn(&Record) -> bool) -> Result<Option<Record>> {
        self.index().query_first(predicate)
    }

    fn iter(&self) -> Result<ClusteredIter<'_>> {
        self.index().iter()
    }

    fn sort_key(&self) -> usize {
        self.index().sort_key()
    }

    fn storage(&self) -> &dyn PartitionedStorage {
        self.index().storage()
    }
}

impl ClusteredTable for ClusteredIndex {
    fn index(&self) -> &ClusteredIndex {
        self
    }

    fn insert_with_index(&mut self, record: Record) -> Result<()> {
        ClusteredIndex::insert_with_index(self, record)
    }

    fn insert_with_index_unique(&mut self, record: Record) -> Result<()> {
        ClusteredIndex::insert_with_index_unique(self, record)
    }

    fn repartition(&mut self) -> Result<()> {
        ClusteredIndex::repartition(self)
    }
}

/// Id carried by `record`: `None` when the column is null or not positive
fn id_of(record: &Record, id_column: usize) -> Result<Option<i64>> {
    match record.get(id_column) {
        None => Err(TallyError::InvalidArgument(format!(
            "record has {} values, id is column {}",
            record.len(),
            id_column
        ))),
        Some(Value::Null) => Ok(None),
        Some(Value::Long(id)) => Ok((*id > 0).then_some(*id)),
        Some(other) => Err(TallyError::InvalidArgument(format!(
            "id column {} must be Long, got {:?}",
            id_column, other
        ))),
    }
}

fn reject_preassigned(record: &Record, id_column: usize) -> Result<()> {
    if let Some(id) = id_of(record, id_column)? {
        return Err(TallyError::InvalidArgument(format!(
            "record already carries id {}",
            id
        )));
    }
    Ok(())
}

/// Id following `id`, or an error once the id space is used up
fn successor(id: i64) -> Result<i64> {
    id.checked_add(1)
        .ok_or_else(|| TallyError::InvalidArgument("id space exhausted".to_string()))
}

// =============================================================================
// Counter-backed
// =============================================================================

/// Clustered table whose ids come from a persisted counter
///
/// The sort column is independent of the id column.
pub struct ClusteredIndexWithPk {
    index: ClusteredIndex,
    id_column: usize,
    counter: Box<dyn IdCounter>,
}

impl ClusteredIndexWithPk {
    pub fn new(index: ClusteredIndex, id_column: usize, counter: Box<dyn IdCounter>) -> Self {
        Self {
            index,
            id_column,
            counter,
        }
    }

    pub fn id_column(&self) -> usize {
        self.id_column
    }

    /// Greatest id assigned so far
    pub fn max_id(&self) -> Result<i64> {
        self.counter.get()
    }

    /// Assign `maxId + 1` to an id-less record and insert it
    pub fn assign_unique_id_and_insert(&mut self, mut record: Record) -> Result<i64> {
        reject_preassigned(&record, self.id_column)?;

        let id = successor(self.counter.get()?)?;
        record[self.id_column] = Value::Long(id);
        self.counter.advance(id)?;
        self.index.insert_with_index(record)?;
        Ok(id)
    }

    /// Rebuild the counter from the largest id stored in the table
    pub fn recover_max_id(&mut self) -> Result<i64> {
        let mut max = 0;
        for record in self.index.iter()? {
            if let Some(id) = id_of(&record?, self.id_column)? {
                max = max.max(id);
            }
        }
        self.counter.reset(max)?;
        Ok(max)
    }
}

impl ClusteredTable for ClusteredIndexWithPk {
    fn index(&self) -> &ClusteredIndex {
        &self.index
    }

    /// Insert a record that already carries an id, e.g. one replayed from a
    /// peer. The id must not occur yet; the counter follows it upward.
    fn insert_with_index(&mut self, record: Record) -> Result<()> {
        let id = id_of(&record, self.id_column)?.ok_or_else(|| {
            TallyError::InvalidArgument(
                "record has no id; use assign_unique_id_and_insert".to_string(),
            )
        })?;

        let id_column = self.id_column;
        let existing = self
            .index
            .query_first(|r| matches!(r.get(id_column), Some(Value::Long(v)) if *v == id))?;
        if existing.is_some() {
            return Err(TallyError::InvalidArgument(format!(
                "id {} already present",
                id
            )));
        }

        self.index.insert_with_index(record)?;
        self.counter.advance(id)
    }

    fn insert_with_index_unique(&mut self, _record: Record) -> Result<()> {
        Err(TallyError::UnsupportedOperation(
            "counter-backed tables enforce uniqueness through id assignment".to_string(),
        ))
    }

    fn repartition(&mut self) -> Result<()> {
        self.index.repartition()
    }
}

// =============================================================================
// Self-numbering
// =============================================================================

/// Clustered table sorted by its own id column, numbering records itself
pub struct IdClusteredIndex {
    index: ClusteredIndex,
}

impl IdClusteredIndex {
    pub fn new(
        storage: Box<dyn PartitionedStorage>,
        max_partition_size: usize,
        id_column: usize,
    ) -> Result<Self> {
        Ok(Self {
            index: ClusteredIndex::new(storage, max_partition_size, id_column)?,
        })
    }

    pub fn id_column(&self) -> usize {
        self.index.sort_key()
    }

    /// Id the next assigned record would receive
    pub fn next_id(&self) -> Result<i64> {
        match self.index.iter_rev()?.next() {
            Some(record) => successor(id_of(&record?, self.id_column())?.unwrap_or(0)),
            None => Ok(1),
        }
    }

    /// Number an id-less record with `max + 1` and insert it uniquely
    pub fn assign_unique_id_and_insert(&mut self, mut record: Record) -> Result<i64> {
        let id_column = self.id_column();
        reject_preassigned(&record, id_column)?;

        let id = self.next_id()?;
        record[id_column] = Value::Long(id);
        self.index.insert_with_index_unique(record)?;
        Ok(id)
    }
}

impl ClusteredTable for IdClusteredIndex {
    fn index(&self) -> &ClusteredIndex {
        &self.index
    }

    fn insert_with_index(&mut self, _record: Record) -> Result<()> {
        Err(TallyError::InvalidArgument(
            "self-numbering tables only accept assign_unique_id_and_insert".to_string(),
        ))
    }

    fn insert_with_index_unique(&mut self, record: Record) -> Result<()> {
        self.index.insert_with_index_unique(record)
    }

    fn repartition(&mut self) -> Result<()> {
        self.index.repartition()
    }
}
