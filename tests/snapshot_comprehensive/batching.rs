//! Batching Tests
//!
//! - Flush counts for partial and exact-multiple final batches
//! - Row counts in each destination table
//! - Rows committed by each flush
//! - Commit failures surface both store results

use super::*;
use arbor::{MemoryStore, SnapshotError, SnapshotOptions, TableName};

fn batched(batch_size: usize) -> TestStore {
    TestStore::with_config(SnapshotConfig::default().with_batch_size(batch_size))
}

#[test]
fn test_exact_multiple_has_no_trailing_flush() {
    // 5 leaves give 9 rows: three full batches of 3
    let mut store = batched(3);
    let mut tree = versioned(&[1], 5);
    let summary = store
        .db()
        .snapshot(&CancellationToken::new(), &mut tree, 1)
        .unwrap();
    assert_eq!(summary.rows, 9);
    assert_eq!(summary.flushes, 3);
}

#[test]
fn test_partial_final_batch_is_flushed() {
    // 6 leaves give 11 rows: two full batches of 5 and one of 1
    let mut store = batched(5);
    let mut tree = versioned(&[1], 6);
    let summary = store
        .db()
        .snapshot(&CancellationToken::new(), &mut tree, 1)
        .unwrap();
    assert_eq!(summary.rows, 11);
    assert_eq!(summary.flushes, 3);

    store.reopen();
    assert_eq!(
        store.db().changelog().row_count(&TableName::Snapshot(1)).unwrap(),
        11
    );
}

#[test]
fn test_single_batch_when_batch_exceeds_rows() {
    let mut store = TestStore::new();
    let mut tree = versioned(&[1], 50);
    let summary = store
        .db()
        .snapshot(&CancellationToken::new(), &mut tree, 1)
        .unwrap();
    assert_eq!(summary.flushes, 1);
    assert_eq!(summary.leaves, 50);
    assert_eq!(summary.branches, 49);
}

#[test]
fn test_stream_rows_land_in_each_destination() {
    // 20 leaves give 39 rows: three batches of 13
    let mut store = batched(13);
    let (_, summary) = store
        .db()
        .write_snapshot(
            &CancellationToken::new(),
            2,
            stream_of(20, 2),
            SnapshotOptions::default(),
        )
        .unwrap();
    assert_eq!(summary.flushes, 3);

    store.reopen();
    let db = store.db();
    assert_eq!(db.changelog().row_count(&TableName::Snapshot(2)).unwrap(), 39);
    assert_eq!(db.changelog().row_count(&TableName::Leaf).unwrap(), 20);
    assert_eq!(db.tree().row_count(&TableName::Tree(2)).unwrap(), 19);
    assert_eq!(db.tree().row_count(&TableName::Tree(1)).unwrap(), 0);
}

#[test]
fn test_commit_failure_reports_changelog_error() {
    let changelog = MemoryStore::new();
    let mut db = SnapshotDb::with_connections(
        Box::new(changelog.connect()),
        Box::new(MemoryStore::new().connect()),
        SnapshotConfig::default().with_batch_size(4),
    )
    .unwrap();
    let mut tree = versioned(&[1], 10);

    changelog.fail_next_commit();
    let err = db
        .snapshot(&CancellationToken::new(), &mut tree, 1)
        .unwrap_err();
    match err {
        SnapshotError::Commit { changelog, tree } => {
            assert!(changelog.is_some());
            assert!(tree.is_none());
        }
        other => panic!("expected Commit, got {:?}", other),
    }
    assert!(db.import_snapshot(1, false).unwrap_err().is_not_found());
}

fn in_memory(batch_size: usize) -> (MemoryStore, MemoryStore, SnapshotDb) {
    let changelog = MemoryStore::new();
    let tree = MemoryStore::new();
    let db = SnapshotDb::with_connections(
        Box::new(changelog.connect()),
        Box::new(tree.connect()),
        SnapshotConfig::default().with_batch_size(batch_size),
    )
    .unwrap();
    (changelog, tree, db)
}

#[test]
fn test_each_flush_commits_one_batch_of_rows() {
    let (changelog, _, mut db) = in_memory(5);
    let mut tree = versioned(&[1], 6);
    db.snapshot(&CancellationToken::new(), &mut tree, 1).unwrap();
    assert_eq!(changelog.committed_batches(), vec![5, 5, 1]);

    let (changelog, _, mut db) = in_memory(3);
    let mut tree = versioned(&[1], 5);
    db.snapshot(&CancellationToken::new(), &mut tree, 1).unwrap();
    assert_eq!(changelog.committed_batches(), vec![3, 3, 3]);
}

#[test]
fn test_stream_flush_commits_both_stores_together() {
    // Each node adds a compact row plus a leaf or shard row
    let (changelog, tree, mut db) = in_memory(13);
    let (_, summary) = db
        .write_snapshot(
            &CancellationToken::new(),
            2,
            stream_of(20, 2),
            SnapshotOptions::default(),
        )
        .unwrap();
    assert_eq!(summary.flushes, 3);

    let changelog = changelog.committed_batches();
    let tree = tree.committed_batches();
    assert_eq!(changelog.len(), 3);
    assert_eq!(tree.len(), 3);
    for (c, t) in changelog.iter().zip(&tree) {
        assert_eq!(c + t, 26);
    }
    assert_eq!(changelog.iter().sum::<usize>(), 39 + 20);
    assert_eq!(tree.iter().sum::<usize>(), 19);
}
