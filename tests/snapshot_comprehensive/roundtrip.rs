//! Round-trip Tests
//!
//! Exports rebuilt after a close/reopen of the on-disk store:
//! - Tree-driven export, verify and trust imports
//! - Pre-order storage order of tree-driven rows
//! - Stream-driven export into leaf and shard tables
//! - Pruned leaf values
//! - Empty and single-leaf trees

use super::*;
use arbor::{NodeKey, SnapshotOptions, TableName};
use rusqlite::Connection;

// =============================================================================
// TREE-DRIVEN EXPORT
// =============================================================================

#[test]
fn test_tree_export_verify_import_after_reopen() {
    let mut store = TestStore::new();
    let mut tree = versioned(&[4], 100);
    store.snapshot(&mut tree, 4);
    let original = root_at(&mut tree, 4);

    store.reopen();
    let imported = store
        .db()
        .import_snapshot(4, true)
        .expect("import should succeed")
        .expect("non-empty tree");
    assert_eq!(imported, original);
}

#[test]
fn test_tree_export_trust_import_keeps_internal_nodes() {
    let mut store = TestStore::new();
    let mut tree = versioned(&[2], 33);
    store.snapshot(&mut tree, 2);
    let original = root_at(&mut tree, 2);

    let root = store.db().import_snapshot(2, false).unwrap().unwrap();
    assert_eq!(root.hash(), original.hash());
    assert_eq!(root.size(), 33);
    assert_eq!(root.preorder().count(), 32);
    assert!(root.preorder().all(|n| !n.is_leaf()));
}

#[test]
fn test_tree_export_writes_compact_table_only() {
    let mut store = TestStore::new();
    let mut tree = versioned(&[1], 10);
    store.snapshot(&mut tree, 1);

    let db = store.db();
    assert_eq!(db.changelog().row_count(&TableName::Snapshot(1)).unwrap(), 19);
    assert_eq!(db.changelog().row_count(&TableName::Leaf).unwrap(), 0);
    assert_eq!(db.tree().row_count(&TableName::Tree(1)).unwrap(), 0);
    assert!(db.changelog().has_index(&TableName::Snapshot(1)).unwrap());
}

#[test]
fn test_tree_export_stores_rows_in_preorder() {
    let mut store = TestStore::with_config(SnapshotConfig::default().with_batch_size(3));
    let mut tree = versioned(&[1], 4);
    store.snapshot(&mut tree, 1);
    store.close();

    let conn = Connection::open(store.changelog_path()).unwrap();
    let mut stmt = conn
        .prepare("SELECT ordinal FROM \"snapshot_1\" ORDER BY rowid")
        .unwrap();
    let stored: Vec<i64> = stmt
        .query_map([], |row| row.get(0))
        .unwrap()
        .collect::<Result<_, _>>()
        .unwrap();
    assert_eq!(stored, (1..=7).collect::<Vec<i64>>());
}

#[test]
fn test_verify_import_accepts_left_max_internal_keys() {
    // Internal key is the largest key of the left subtree
    let mut a = Node::leaf(NodeKey::new(1, 1), b"a".to_vec(), b"1".to_vec());
    a.compute_hash().unwrap();
    let mut b = Node::leaf(NodeKey::new(1, 2), b"b".to_vec(), b"2".to_vec());
    b.compute_hash().unwrap();
    let mut root = Node::branch(NodeKey::new(1, 3), b"a".to_vec(), a, b);
    root.compute_hash().unwrap();

    let mut tree = MemTree::new();
    tree.insert_version(1, Some(root.clone()));
    let mut store = TestStore::new();
    store.snapshot(&mut tree, 1);

    store.reopen();
    let imported = store.db().import_snapshot(1, true).unwrap().unwrap();
    assert_eq!(imported, root);
}

#[test]
fn test_single_leaf_tree_roundtrip() {
    let mut store = TestStore::new();
    let mut tree = versioned(&[1], 1);
    store.snapshot(&mut tree, 1);

    let root = store.db().import_snapshot(1, false).unwrap().unwrap();
    assert!(root.is_leaf());
    assert_eq!(root.key(), b"key00000");
}

#[test]
fn test_empty_tree_roundtrip() {
    let mut store = TestStore::new();
    let mut tree = MemTree::new();
    tree.insert_version(3, None);
    store.snapshot(&mut tree, 3);

    store.reopen();
    assert!(store.db().import_snapshot(3, true).unwrap().is_none());
    let generations = store.db().generations().unwrap();
    assert_eq!(generations.len(), 1);
    assert!(generations[0].complete);
    assert_eq!(generations[0].row_count, Some(0));
}

#[test]
fn test_snapshot_same_version_twice_fails() {
    let mut store = TestStore::new();
    let mut tree = versioned(&[1], 5);
    store.snapshot(&mut tree, 1);

    let err = store
        .db()
        .snapshot(&CancellationToken::new(), &mut tree, 1)
        .unwrap_err();
    assert!(matches!(err, arbor::SnapshotError::GenerationExists { version: 1 }));
}

// =============================================================================
// STREAM-DRIVEN EXPORT
// =============================================================================

#[test]
fn test_stream_export_matches_source_hash() {
    let mut store = TestStore::new();
    let source = tree_of(64, 9);

    let (root, summary) = store
        .db()
        .write_snapshot(
            &CancellationToken::new(),
            9,
            arbor::snapshot_stream(&source).collect::<Vec<_>>(),
            SnapshotOptions::default(),
        )
        .expect("stream export should succeed");
    let root = root.expect("non-empty stream");
    assert_eq!(root.hash(), source.hash());
    assert_eq!(summary.leaves, 64);
    assert_eq!(summary.branches, 63);
    assert_eq!(summary.versions, vec![9]);

    store.reopen();
    let imported = store.db().import_snapshot(9, true).unwrap().unwrap();
    assert_eq!(imported.hash(), source.hash());
    assert_eq!(imported.size(), 64);
}

#[test]
fn test_stream_export_fills_leaf_and_shard_tables() {
    let mut store = TestStore::new();
    let (_, summary) = store
        .db()
        .write_snapshot(
            &CancellationToken::new(),
            5,
            stream_of(20, 5),
            SnapshotOptions::default(),
        )
        .unwrap();
    let shard = summary.shard.expect("stream export records its shard");
    assert_eq!(shard, 2);

    store.reopen();
    let db = store.db();
    assert_eq!(db.shard_id(), 2);
    assert_eq!(db.changelog().row_count(&TableName::Leaf).unwrap(), 20);
    assert_eq!(db.tree().row_count(&TableName::Tree(shard)).unwrap(), 19);
    assert_eq!(db.tree().shard_for_version(5).unwrap(), Some(shard));
    assert!(db.tree().has_index(&TableName::Tree(shard)).unwrap());
}

#[test]
fn test_stream_export_without_save_tree_keeps_shard() {
    let mut store = TestStore::new();
    let options = SnapshotOptions {
        store_leaf_values: true,
        save_tree: false,
    };
    let (_, summary) = store
        .db()
        .write_snapshot(&CancellationToken::new(), 5, stream_of(4, 5), options)
        .unwrap();
    assert_eq!(summary.shard, Some(1));
}

#[test]
fn test_stream_node_keys_use_ordinals() {
    let mut store = TestStore::new();
    let (root, _) = store
        .db()
        .write_snapshot(
            &CancellationToken::new(),
            7,
            stream_of(8, 7),
            SnapshotOptions::default(),
        )
        .unwrap();
    let root = root.unwrap();
    assert_eq!(root.node_key(), arbor::NodeKey::new(7, 1));
    assert_eq!(root.left_key(), Some(arbor::NodeKey::new(7, 2)));
    // left subtree of 8 leaves holds 7 nodes
    assert_eq!(root.right_key(), Some(arbor::NodeKey::new(7, 9)));
}

#[test]
fn test_pruned_leaf_values_still_import() {
    let mut store = TestStore::new();
    let source = tree_of(16, 3);
    let options = SnapshotOptions {
        store_leaf_values: false,
        save_tree: true,
    };
    store
        .db()
        .write_snapshot(
            &CancellationToken::new(),
            3,
            arbor::snapshot_stream(&source).collect::<Vec<_>>(),
            options,
        )
        .unwrap();

    store.reopen();
    let imported = store.db().import_snapshot(3, true).unwrap().unwrap();
    assert_eq!(imported.hash(), source.hash());
    assert!(imported
        .preorder()
        .filter(|n| n.is_leaf())
        .all(|n| n.value().is_none()));
}
