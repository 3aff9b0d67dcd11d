//! Clustered Index Iterator
//!
//! Lazy, partition-at-a-time iteration in key order.

use std::collections::VecDeque;

use crate::codec::Record;
use crate::error::Result;

use super::ClusteredIndex;

/// Iteration order over the clustered key
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Ascending,
    Descending,
}

/// Iterator over every record of a [`ClusteredIndex`]
///
/// Only one partition is held in memory at a time. Stops after the first
/// error.
pub struct ClusteredIter<'a> {
    index: &'a ClusteredIndex,
    direction: Direction,
    /// Partitions not yet loaded, in visiting order
    remaining: VecDeque<usize>,
    /// Records of the current partition, in visiting order
    buffer: VecDeque<Record>,
    failed: bool,
}

impl<'a> ClusteredIter<'a> {
    pub(super) fn new(index: &'a ClusteredIndex, direction: Direction) -> Result<Self> {
        let mut iter = Self {
            index,
            direction,
            remaining: VecDeque::new(),
            buffer: VecDeque::new(),
            failed: false,
        };
        iter.restart()?;
        Ok(iter)
    }

    pub fn direction(&self) -> Direction {
        self.direction
    }

    /// Rewind to the first record
    pub fn restart(&mut self) -> Result<()> {
        let count = self.index.partitions_count()?;
        self.remaining = match self.direction {
            Direction::Ascending => (0..count).collect(),
            Direction::Descending => (0..count).rev().collect(),
        };
        self.buffer.clear();
        self.failed = false;
        Ok(())
    }

    fn load_next_partition(&mut self) -> Result<bool> {
        while let Some(partition) = self.remaining.pop_front() {
            let mut records = self.index.storage().partition(partition)?.read()?;
            if records.is_empty() {
                continue;
            }
            if self.direction == Direction::Descending {
                records.reverse();
            }
            self.buffer = records.into();
            return Ok(true);
        }
        Ok(false)
    }
}

impl Iterator for ClusteredIter<'_> {
    type Item = Result<Record>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed {
            return None;
        }

        if self.buffer.is_empty() {
            match self.load_next_partition() {
                Ok(true) => {}
                Ok(false) => return None,
                Err(e) => {
                    self.failed = true;
                    return Some(Err(e));
                }
            }
        }

        self.buffer.pop_front().map(Ok)
    }
}
