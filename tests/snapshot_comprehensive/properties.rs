//! Property Tests
//!
//! Randomized key sets exported by stream and read back:
//! - Root hash survives the round trip in both modes
//! - Compact-table ordinals are dense and start at 1
//! - Every internal node's size is the sum of its children's

use std::collections::BTreeMap;

use super::*;
use arbor::{SnapshotOptions, TableName};
use proptest::prelude::*;

fn build(entries: BTreeMap<String, (String, i64)>) -> Node {
    let entries = entries
        .into_iter()
        .map(|(key, (value, version))| Entry::new(key, value, version))
        .collect();
    build_balanced(entries).unwrap().unwrap()
}

fn key_sets() -> impl Strategy<Value = BTreeMap<String, (String, i64)>> {
    prop::collection::btree_map("[a-z]{1,8}", ("[ -~]{0,16}", 1i64..50), 1..120usize)
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(24))]

    #[test]
    fn prop_stream_roundtrip_preserves_root_hash(
        entries in key_sets(),
        store_leaf_values in any::<bool>(),
        load_leaves in any::<bool>(),
    ) {
        let source = build(entries);
        let mut db = SnapshotDb::in_memory(SnapshotConfig::default().with_batch_size(16)).unwrap();
        let options = SnapshotOptions { store_leaf_values, save_tree: true };

        let (root, summary) = db
            .write_snapshot(&CancellationToken::new(), 50, arbor::snapshot_stream(&source), options)
            .unwrap();
        prop_assert_eq!(root.unwrap().hash(), source.hash());
        prop_assert_eq!(summary.rows, source.preorder().count() as u64);

        let imported = db.import_snapshot(50, load_leaves).unwrap().unwrap();
        prop_assert_eq!(imported.hash(), source.hash());
        prop_assert_eq!(imported.size(), source.size());
    }

    #[test]
    fn prop_ordinals_are_dense(entries in key_sets()) {
        let source = build(entries);
        let mut db = SnapshotDb::in_memory(SnapshotConfig::default().with_batch_size(7)).unwrap();
        db.write_snapshot_default(&CancellationToken::new(), 50, arbor::snapshot_stream(&source))
            .unwrap();

        let mut cursor = db.changelog().scan_ordinal(&TableName::Snapshot(50)).unwrap();
        let mut expected = 1u64;
        while let Some(row) = cursor.step().unwrap() {
            prop_assert_eq!(row.ordinal, expected);
            prop_assert_eq!(row.node_key.sequence(), expected as u32);
            expected += 1;
        }
        prop_assert_eq!(expected - 1, source.preorder().count() as u64);
    }

    #[test]
    fn prop_internal_size_is_sum_of_children(entries in key_sets()) {
        let leaves = entries.len() as i64;
        let mut tree = MemTree::new();
        tree.insert_version(50, Some(build(entries)));
        let mut db = SnapshotDb::in_memory(SnapshotConfig::default()).unwrap();
        db.snapshot(&CancellationToken::new(), &mut tree, 50).unwrap();

        let root = db.import_snapshot(50, true).unwrap().unwrap();
        prop_assert_eq!(root.size(), leaves);
        for node in root.preorder().filter(|n| !n.is_leaf()) {
            let left = node.left_node().unwrap();
            let right = node.right_node().unwrap();
            prop_assert_eq!(node.size(), left.size() + right.size());
            prop_assert!(node.height() > left.height().max(right.height()));
        }
    }
}
