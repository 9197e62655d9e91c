//! Snapshot catalog
//!
//! Generations are discovered from the table names of the changelog database
//! (`snapshot_<version>`) joined with the completion markers. Versions are
//! compared numerically.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use arbor_core::NodeHash;
use arbor_storage::{StoreConn, TableName};

use crate::error::SnapshotResult;

/// File name that identifies a store directory
pub const CHANGELOG_FILE_NAME: &str = "changelog.sqlite";

/// File name of the internal-node database
pub const TREE_FILE_NAME: &str = "tree.sqlite";

/// One stored generation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Generation {
    /// Tree version
    pub version: i64,
    /// True once the completion marker is written
    pub complete: bool,
    /// Rows recorded by the marker
    pub row_count: Option<u64>,
    /// Root hash recorded by the marker
    pub root_hash: Option<NodeHash>,
}

/// All generations in `changelog`, newest first
///
/// Incomplete generations are included with `complete == false`.
pub fn list_generations(changelog: &dyn StoreConn) -> SnapshotResult<Vec<Generation>> {
    let markers: BTreeMap<i64, _> = changelog
        .markers()?
        .into_iter()
        .map(|m| (m.version, m))
        .collect();

    let mut generations: Vec<Generation> = changelog
        .table_names()?
        .iter()
        .filter_map(|name| name.parse::<TableName>().ok())
        .filter_map(|table| table.snapshot_version())
        .map(|version| match markers.get(&version) {
            Some(marker) => Generation {
                version,
                complete: true,
                row_count: Some(marker.row_count),
                root_hash: marker.root_hash,
            },
            None => Generation {
                version,
                complete: false,
                row_count: None,
                root_hash: None,
            },
        })
        .collect();
    generations.sort_by(|a, b| b.version.cmp(&a.version));
    Ok(generations)
}

/// Newest complete generation with version `<= target`
///
/// `generations` must be ordered newest first, as [`list_generations`]
/// returns them.
pub fn select_at_or_before(generations: &[Generation], target: i64) -> Option<&Generation> {
    generations
        .iter()
        .filter(|g| g.complete)
        .find(|g| g.version <= target)
}

/// Every directory under `root` that holds a changelog database
///
/// Contents are not validated. Results are sorted.
pub fn discover_stores(root: &Path) -> SnapshotResult<Vec<PathBuf>> {
    let mut found = Vec::new();
    let mut pending = vec![root.to_path_buf()];
    while let Some(dir) = pending.pop() {
        for entry in fs::read_dir(&dir)? {
            let entry = entry?;
            let file_type = entry.file_type()?;
            if file_type.is_dir() {
                pending.push(entry.path());
            } else if entry.file_name() == CHANGELOG_FILE_NAME {
                found.push(dir.clone());
            }
        }
    }
    found.sort();
    Ok(found)
}
