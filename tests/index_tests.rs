//! Tests for the clustered index
//!
//! These tests verify:
//! - Global sort order and partition boundaries after every insert
//! - No partition ever exceeds max_partition_size
//! - Equal keys keep insertion order; unique inserts reject duplicates
//! - Lazy iteration in both directions, restartable
//! - Rebalancing after bulk loads and deletions

use std::cmp::Ordering;
use std::sync::Arc;

use tallydb::codec::{ColumnInfo, ColumnType, RecordSerializer};
use tallydb::index::ClusteredIndex;
use tallydb::storage::{DirectoryStorage, MemoryStorage, PartitionedStorage};
use tallydb::{Record, TallyError, Value};
use tempfile::TempDir;

// =============================================================================
// Helper Functions
// =============================================================================

/// Deterministic pseudo-random keys (xorshift)
fn random_keys(count: usize, seed: u64) -> Vec<i64> {
    let mut state = seed;
    (0..count)
        .map(|_| {
            state ^= state << 13;
            state ^= state >> 7;
            state ^= state << 17;
            (state % 1_000) as i64
        })
        .collect()
}

fn record(key: i64, label: &str) -> Record {
    vec![Value::Long(key), Value::from(label)]
}

fn memory_index(max: usize) -> (MemoryStorage, ClusteredIndex) {
    let storage = MemoryStorage::new();
    let index = ClusteredIndex::new(Box::new(storage.clone()), max, 0).unwrap();
    (storage, index)
}

fn keys(index: &ClusteredIndex) -> Vec<i64> {
    index
        .iter()
        .unwrap()
        .map(|r| r.unwrap()[0].as_i64().unwrap())
        .collect()
}

/// Check sortedness, boundaries and the size bound across all partitions
fn assert_invariants(index: &ClusteredIndex) {
    let max = index.max_partition_size();
    let mut previous_max: Option<Value> = None;

    for p in 0..index.partitions_count().unwrap() {
        let records = index.partition(p).unwrap().read().unwrap();
        assert!(
            records.len() <= max,
            "partition {} holds {} > {}",
            p,
            records.len(),
            max
        );

        for pair in records.windows(2) {
            assert_ne!(pair[0][0].key_cmp(&pair[1][0]), Ordering::Greater);
        }

        if let (Some(prev), Some(first)) = (&previous_max, records.first()) {
            assert_ne!(prev.key_cmp(&first[0]), Ordering::Greater, "boundary at {}", p);
        }
        if let Some(last) = records.last() {
            previous_max = Some(last[0].clone());
        }
    }
}

// =============================================================================
// Construction Tests
// =============================================================================

#[test]
fn test_zero_partition_size_rejected() {
    let result = ClusteredIndex::new(Box::new(MemoryStorage::new()), 0, 0);
    assert!(matches!(result, Err(TallyError::InvalidArgument(_))));
}

#[test]
fn test_empty_index() {
    let (_, index) = memory_index(10);

    assert_eq!(index.find_insertion_point(&Value::Long(5)).unwrap(), (0, 0));
    assert_eq!(index.partitions_count().unwrap(), 0);
    assert!(index.is_empty().unwrap());
    assert_eq!(index.iter().unwrap().count(), 0);
    assert!(matches!(
        index.partition(0),
        Err(TallyError::IndexOutOfRange { index: 0, len: 0 })
    ));
}

// =============================================================================
// Insert Tests
// =============================================================================

#[test]
fn test_random_inserts_keep_invariants() {
    let (_, mut index) = memory_index(8);
    let input = random_keys(300, 0x2545_F491_4F6C_DD1D);

    for (i, key) in input.iter().enumerate() {
        index.insert_with_index(record(*key, "r")).unwrap();
        if i % 25 == 0 {
            assert_invariants(&index);
        }
    }
    assert_invariants(&index);

    let mut expected = input.clone();
    expected.sort_unstable();
    assert_eq!(keys(&index), expected);
    assert_eq!(index.len().unwrap(), 300);
}

#[test]
fn test_size_bound_holds_after_every_insert() {
    let (storage, mut index) = memory_index(4);

    for key in (0..60).rev() {
        index.insert_with_index(record(key, "r")).unwrap();
        for (_, size) in storage.partition_sizes() {
            assert!(size <= 4);
        }
    }
    assert_eq!(keys(&index), (0..60).collect::<Vec<_>>());
}

#[test]
fn test_ascending_inserts_spread_over_partitions() {
    let (_, mut index) = memory_index(10);
    for key in 0..100 {
        index.insert_with_index(record(key, "r")).unwrap();
    }

    assert!(index.partitions_count().unwrap() >= 10);
    assert_invariants(&index);
}

#[test]
fn test_equal_keys_keep_insertion_order() {
    let (_, mut index) = memory_index(3);
    index.insert_with_index(record(1, "low")).unwrap();
    index.insert_with_index(record(9, "high")).unwrap();
    for label in ["a", "b", "c", "d", "e"] {
        index.insert_with_index(record(5, label)).unwrap();
    }

    let labels: Vec<String> = index
        .iter()
        .unwrap()
        .map(|r| r.unwrap()[1].as_str().unwrap().to_string())
        .collect();

    assert_eq!(labels, vec!["low", "a", "b", "c", "d", "e", "high"]);
    assert_invariants(&index);
}

#[test]
fn test_find_insertion_point_after_equal_keys() {
    let (_, mut index) = memory_index(10);
    for key in [1, 3, 3, 7] {
        index.insert_with_index(record(key, "r")).unwrap();
    }

    assert_eq!(index.find_insertion_point(&Value::Long(0)).unwrap(), (0, 0));
    assert_eq!(index.find_insertion_point(&Value::Long(3)).unwrap(), (0, 3));
    assert_eq!(index.find_insertion_point(&Value::Long(8)).unwrap(), (0, 4));
}

#[test]
fn test_unique_insert_rejects_duplicates() {
    let (_, mut index) = memory_index(4);
    for key in 0..20 {
        index.insert_with_index_unique(record(key * 2, "r")).unwrap();
    }

    for key in [0, 14, 38] {
        let result = index.insert_with_index_unique(record(key, "dup"));
        assert!(matches!(result, Err(TallyError::DuplicateKey(_))), "key {}", key);
    }

    index.insert_with_index_unique(record(15, "new")).unwrap();
    assert_eq!(index.len().unwrap(), 21);
    assert_invariants(&index);
}

#[test]
fn test_missing_sort_column_rejected() {
    let storage = MemoryStorage::new();
    let mut index = ClusteredIndex::new(Box::new(storage), 4, 3).unwrap();

    let result = index.insert_with_index(record(1, "short"));

    assert!(matches!(result, Err(TallyError::InvalidArgument(_))));
}

#[test]
fn test_text_sort_key() {
    let storage = MemoryStorage::new();
    let mut index = ClusteredIndex::new(Box::new(storage), 2, 1).unwrap();
    for (i, name) in ["delta", "alpha", "echo", "charlie", "bravo"].iter().enumerate() {
        index.insert_with_index(record(i as i64, name)).unwrap();
    }

    let names: Vec<String> = index
        .iter()
        .unwrap()
        .map(|r| r.unwrap()[1].as_str().unwrap().to_string())
        .collect();
    assert_eq!(names, vec!["alpha", "bravo", "charlie", "delta", "echo"]);
}

#[test]
fn test_null_keys_sort_first() {
    let (_, mut index) = memory_index(4);
    index.insert_with_index(record(3, "three")).unwrap();
    index
        .insert_with_index(vec![Value::Null, Value::from("none")])
        .unwrap();

    let first = index.iter().unwrap().next().unwrap().unwrap();
    assert!(first[0].is_null());
}

// =============================================================================
// Query and Iteration Tests
// =============================================================================

#[test]
fn test_query_first_in_key_order() {
    let (_, mut index) = memory_index(3);
    for key in [50, 10, 40, 20, 30] {
        let label = if key % 20 == 0 { "even" } else { "odd" };
        index.insert_with_index(record(key, label)).unwrap();
    }

    let found = index
        .query_first(|r| r[1].as_str() == Some("even"))
        .unwrap()
        .unwrap();
    assert_eq!(found[0], Value::Long(20));

    assert!(index
        .query_first(|r| r[1].as_str() == Some("none"))
        .unwrap()
        .is_none());
}

#[test]
fn test_iter_rev_descends() {
    let (_, mut index) = memory_index(5);
    for key in random_keys(40, 7) {
        index.insert_with_index(record(key, "r")).unwrap();
    }

    let descending: Vec<i64> = index
        .iter_rev()
        .unwrap()
        .map(|r| r.unwrap()[0].as_i64().unwrap())
        .collect();
    let mut ascending = keys(&index);
    ascending.reverse();

    assert_eq!(descending, ascending);
}

#[test]
fn test_iter_restart() {
    let (_, mut index) = memory_index(3);
    for key in 0..10 {
        index.insert_with_index(record(key, "r")).unwrap();
    }

    let mut iter = index.iter().unwrap();
    let head: Vec<_> = iter.by_ref().take(4).map(|r| r.unwrap()).collect();
    assert_eq!(head.len(), 4);

    iter.restart().unwrap();
    assert_eq!(iter.count(), 10);
}

// =============================================================================
// Rebalancing Tests
// =============================================================================

#[test]
fn test_repartition_after_bulk_load() {
    let (storage, mut index) = memory_index(10);
    let bulk: Vec<Record> = random_keys(35, 99)
        .into_iter()
        .map(|k| record(k, "bulk"))
        .collect();
    storage.partition(0).unwrap().write(&bulk).unwrap();

    index.repartition().unwrap();

    assert_invariants(&index);
    assert_eq!(index.len().unwrap(), 35);
    // Packed to half capacity
    assert_eq!(index.partitions_count().unwrap(), 7);
}

#[test]
fn test_repartition_from_leaves_prefix_untouched() {
    let (storage, mut index) = memory_index(4);
    storage
        .partition(0)
        .unwrap()
        .write(&[record(1, "a"), record(2, "b"), record(3, "c"), record(4, "d")])
        .unwrap();
    storage
        .partition(1)
        .unwrap()
        .write(&[record(9, "i"), record(5, "e"), record(7, "g")])
        .unwrap();

    index.repartition_from(1).unwrap();

    assert_eq!(index.partition(0).unwrap().read().unwrap().len(), 4);
    assert_eq!(keys(&index), vec![1, 2, 3, 4, 5, 7, 9]);
    assert_invariants(&index);
}

#[test]
fn test_repartition_compacts_sparse_storage() {
    let (storage, mut index) = memory_index(4);
    storage.partition(1).unwrap().write(&[record(1, "a")]).unwrap();
    storage.partition(5).unwrap().write(&[record(2, "b")]).unwrap();

    // Inserts into a sparse layout still land in order
    index.insert_with_index(record(0, "z")).unwrap();
    index.insert_with_index(record(3, "c")).unwrap();
    assert_eq!(keys(&index), vec![0, 1, 2, 3]);

    index.repartition().unwrap();
    assert_eq!(index.partitions_count().unwrap(), 2);
    assert_invariants(&index);
}

#[test]
fn test_delete_where_rebalances() {
    let (_, mut index) = memory_index(6);
    for key in 0..60 {
        index.insert_with_index(record(key, "r")).unwrap();
    }
    let before = index.partitions_count().unwrap();

    let removed = index.delete_where(|r| r[0].as_i64().unwrap() % 3 != 0).unwrap();

    assert_eq!(removed, 40);
    assert_eq!(keys(&index), (0..60).step_by(3).collect::<Vec<_>>());
    assert!(index.partitions_count().unwrap() < before);
    assert_invariants(&index);

    assert_eq!(index.delete_where(|_| false).unwrap(), 0);
}

// =============================================================================
// Persistence Tests
// =============================================================================

#[test]
fn test_directory_index_survives_reopen() {
    let dir = TempDir::new().unwrap();
    let serializer = Arc::new(
        RecordSerializer::new(vec![
            ColumnInfo::new("key", ColumnType::Long).non_null(),
            ColumnInfo::new("label", ColumnType::Text),
        ])
        .unwrap(),
    );

    let input = random_keys(50, 31);
    {
        let storage = DirectoryStorage::open(dir.path(), Arc::clone(&serializer)).unwrap();
        let mut index = ClusteredIndex::new(Box::new(storage), 6, 0).unwrap();
        for key in &input {
            index.insert_with_index(record(*key, "disk")).unwrap();
        }
    }

    let storage = DirectoryStorage::open(dir.path(), serializer).unwrap();
    let index = ClusteredIndex::new(Box::new(storage), 6, 0).unwrap();

    let mut expected = input;
    expected.sort_unstable();
    assert_eq!(keys(&index), expected);
    assert_invariants(&index);
}
