//! Cancellation Tests
//!
//! - Cancellation observed at the next flush
//! - Committed batches stay but the generation is never readable
//! - A clean re-export of the same version succeeds
//! - recover() discards leftovers, leaf and shard rows included

use super::*;
use arbor::{SnapshotError, SnapshotOptions};

/// Stream that cancels `token` after yielding `after` nodes
struct CancelAfter<I> {
    inner: I,
    token: CancellationToken,
    after: usize,
    yielded: usize,
}

impl<I: Iterator<Item = SnapshotNode>> Iterator for CancelAfter<I> {
    type Item = SnapshotNode;

    fn next(&mut self) -> Option<SnapshotNode> {
        if self.yielded == self.after {
            self.token.cancel();
        }
        self.yielded += 1;
        self.inner.next()
    }
}

fn small_batches() -> TestStore {
    TestStore::with_config(SnapshotConfig::default().with_batch_size(10))
}

fn cancel_stream_at(store: &mut TestStore, version: i64, leaves: usize, after: usize) {
    let cancel = CancellationToken::new();
    let nodes = CancelAfter {
        inner: stream_of(leaves, version).into_iter(),
        token: cancel.clone(),
        after,
        yielded: 0,
    };
    let err = store
        .db()
        .write_snapshot(&cancel, version, nodes, SnapshotOptions::default())
        .unwrap_err();
    assert!(err.is_cancelled());
}

/// Rows across every internal-node shard
fn shard_rows(db: &SnapshotDb) -> u64 {
    (1..=db.shard_id())
        .map(|shard| db.tree().row_count(&arbor::TableName::Tree(shard)).unwrap_or(0))
        .sum()
}

fn leaf_rows(db: &SnapshotDb) -> u64 {
    db.changelog().row_count(&arbor::TableName::Leaf).unwrap()
}

#[test]
fn test_cancel_mid_stream_reports_committed_rows() {
    let mut store = small_batches();
    let cancel = CancellationToken::new();
    let nodes = CancelAfter {
        inner: stream_of(50, 4).into_iter(),
        token: cancel.clone(),
        after: 25,
        yielded: 0,
    };

    let err = store
        .db()
        .write_snapshot(&cancel, 4, nodes, SnapshotOptions::default())
        .unwrap_err();
    match err {
        SnapshotError::Cancelled { ordinal } => {
            assert!(ordinal > 0);
            assert!(ordinal < 99);
        }
        other => panic!("expected Cancelled, got {:?}", other),
    }

    let generations = store.db().generations().unwrap();
    assert_eq!(generations.len(), 1);
    assert!(!generations[0].complete);
    assert!(store.db().import_snapshot(4, true).unwrap_err().is_not_found());
}

#[test]
fn test_cancel_before_start_writes_nothing_readable() {
    let mut store = small_batches();
    let mut tree = versioned(&[1], 30);
    let cancel = CancellationToken::new();
    cancel.cancel();

    let err = store.db().snapshot(&cancel, &mut tree, 1).unwrap_err();
    assert!(err.is_cancelled());
    assert_eq!(
        store
            .db()
            .changelog()
            .row_count(&arbor::TableName::Snapshot(1))
            .unwrap(),
        0
    );
}

#[test]
fn test_reexport_after_cancel_succeeds() {
    let mut store = small_batches();
    let mut tree = versioned(&[6], 30);
    let cancel = CancellationToken::new();
    cancel.cancel();
    assert!(store.db().snapshot(&cancel, &mut tree, 6).is_err());

    store.snapshot(&mut tree, 6);
    store.reopen();
    let root = store.db().import_snapshot(6, true).unwrap().unwrap();
    assert_eq!(root, root_at(&mut tree, 6));
}

#[test]
fn test_recover_discards_cancelled_generation() {
    let mut store = small_batches();
    let mut tree = versioned(&[1, 2], 30);
    store.snapshot(&mut tree, 1);

    let cancel = CancellationToken::new();
    cancel.cancel();
    assert!(store.db().snapshot(&cancel, &mut tree, 2).is_err());

    store.reopen();
    assert_eq!(store.db().recover().unwrap(), vec![2]);
    let generations = store.db().generations().unwrap();
    assert_eq!(generations.len(), 1);
    assert_eq!(generations[0].version, 1);
}

#[test]
fn test_cancel_after_last_batch_still_fails() {
    // 7 rows with a batch of 10: only the final flush runs
    let mut store = small_batches();
    let mut tree = versioned(&[3], 4);
    let cancel = CancellationToken::new();
    cancel.cancel();
    assert!(store
        .db()
        .snapshot(&cancel, &mut tree, 3)
        .unwrap_err()
        .is_cancelled());
}

#[test]
fn test_recover_removes_cancelled_stream_rows() {
    let mut store = small_batches();
    cancel_stream_at(&mut store, 4, 50, 25);
    assert!(leaf_rows(store.db()) > 0);

    store.reopen();
    assert_eq!(store.db().recover().unwrap(), vec![4]);
    assert_eq!(leaf_rows(store.db()), 0);
    assert_eq!(shard_rows(store.db()), 0);

    let nodes = stream_of(50, 4);
    let (root, summary) = store
        .db()
        .write_snapshot(&CancellationToken::new(), 4, nodes, SnapshotOptions::default())
        .unwrap();
    assert_eq!(summary.rows, 99);
    assert_eq!(leaf_rows(store.db()), 50);
    assert_eq!(shard_rows(store.db()), 49);

    let imported = store.db().import_snapshot(4, true).unwrap().unwrap();
    assert_eq!(imported.hash(), root.and_then(|r| r.hash()));
}

#[test]
fn test_stream_reexport_without_recover_replaces_rows() {
    let mut store = small_batches();
    let mut tree = versioned(&[1], 8);
    store.snapshot(&mut tree, 1);
    cancel_stream_at(&mut store, 2, 30, 40);

    let nodes = stream_of(30, 2);
    store
        .db()
        .write_snapshot(&CancellationToken::new(), 2, nodes, SnapshotOptions::default())
        .unwrap();
    assert_eq!(leaf_rows(store.db()), 30);
    assert_eq!(shard_rows(store.db()), 29);
    assert!(store.db().generations().unwrap().iter().all(|g| g.complete));
}
