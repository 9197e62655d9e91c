//! Corruption Tests
//!
//! Rows are damaged directly in `changelog.sqlite` between export and import:
//! - Flipped hash bytes in leaves and the root
//! - Missing and truncated rows
//! - Missing completion marker

use super::*;
use arbor::SnapshotError;
use rusqlite::{params, Connection};

/// Offset of the hash inside an encoded node
fn hash_offset(bytes: &[u8]) -> usize {
    let key_len = u32::from_le_bytes([bytes[10], bytes[11], bytes[12], bytes[13]]) as usize;
    14 + key_len
}

fn read_row(conn: &Connection, version: i64, ordinal: u64) -> Vec<u8> {
    conn.query_row(
        &format!("SELECT bytes FROM \"snapshot_{}\" WHERE ordinal = ?1", version),
        params![ordinal as i64],
        |row| row.get(0),
    )
    .expect("row exists")
}

fn write_row(conn: &Connection, version: i64, ordinal: u64, bytes: &[u8]) {
    conn.execute(
        &format!("UPDATE \"snapshot_{}\" SET bytes = ?1 WHERE ordinal = ?2", version),
        params![bytes, ordinal as i64],
    )
    .expect("update row");
}

fn flip_hash(store: &TestStore, version: i64, ordinal: u64) {
    let conn = Connection::open(store.changelog_path()).unwrap();
    let mut bytes = read_row(&conn, version, ordinal);
    let offset = hash_offset(&bytes);
    bytes[offset] ^= 0xff;
    write_row(&conn, version, ordinal, &bytes);
}

fn exported(n: usize) -> TestStore {
    let mut store = TestStore::new();
    let mut tree = versioned(&[1], n);
    store.snapshot(&mut tree, 1);
    store.close();
    store
}

#[test]
fn test_flipped_leaf_hash_detected_in_verify_mode() {
    // 4 leaves: ordinals 1 root, 2 branch, 3 and 4 leaves
    let mut store = exported(4);
    flip_hash(&store, 1, 3);
    store.reopen();

    let err = store.db().import_snapshot(1, true).unwrap_err();
    assert!(matches!(err, SnapshotError::HashMismatch { .. }));
    assert!(err.is_corruption());

    // trust mode never reads leaf hashes back
    assert!(store.db().import_snapshot(1, false).is_ok());
}

#[test]
fn test_flipped_root_hash_detected_in_trust_mode() {
    let mut store = exported(8);
    flip_hash(&store, 1, 1);
    store.reopen();

    let err = store.db().import_snapshot(1, false).unwrap_err();
    assert!(matches!(err, SnapshotError::HashMismatch { .. }));
}

#[test]
fn test_deleted_row_is_corrupt() {
    let mut store = exported(8);
    {
        let conn = Connection::open(store.changelog_path()).unwrap();
        conn.execute("DELETE FROM \"snapshot_1\" WHERE ordinal = ?1", params![5i64])
            .unwrap();
    }
    store.reopen();

    match store.db().import_snapshot(1, true).unwrap_err() {
        SnapshotError::Corrupt { ordinal, .. } => assert_eq!(ordinal, 5),
        other => panic!("expected Corrupt, got {:?}", other),
    }
}

#[test]
fn test_truncated_row_is_corrupt() {
    let mut store = exported(8);
    {
        let conn = Connection::open(store.changelog_path()).unwrap();
        let bytes = read_row(&conn, 1, 2);
        write_row(&conn, 1, 2, &bytes[..bytes.len() / 2]);
    }
    store.reopen();

    match store.db().import_snapshot(1, false).unwrap_err() {
        SnapshotError::Corrupt { ordinal, .. } => assert_eq!(ordinal, 2),
        other => panic!("expected Corrupt, got {:?}", other),
    }
}

#[test]
fn test_missing_marker_hides_generation() {
    let mut store = exported(8);
    {
        let conn = Connection::open(store.changelog_path()).unwrap();
        conn.execute("DELETE FROM \"snapshot_marker\" WHERE version = ?1", params![1i64])
            .unwrap();
    }
    store.reopen();

    assert!(store.db().import_snapshot(1, true).unwrap_err().is_not_found());
    let generations = store.db().generations().unwrap();
    assert!(!generations[0].complete);
}

#[test]
fn test_marker_row_count_mismatch_is_corrupt() {
    let mut store = exported(8);
    {
        let conn = Connection::open(store.changelog_path()).unwrap();
        conn.execute(
            "UPDATE \"snapshot_marker\" SET row_count = ?1 WHERE version = ?2",
            params![99i64, 1i64],
        )
        .unwrap();
    }
    store.reopen();

    assert!(matches!(
        store.db().import_snapshot(1, false).unwrap_err(),
        SnapshotError::Corrupt { .. }
    ));
}
