//! Diff engine (§4.10): tree-walk SHA-256 comparison between two published
//! snapshot payloads (or an empty tree when `from_id` is empty).

use std::collections::BTreeMap;

use crate::error::JvsError;
use crate::hash::TreeEntry;
use crate::ids::SnapshotId;
use crate::repo::Repo;

/// The three buckets a `Diff` partitions entries into, each sorted by
/// path. Directories are never emitted as entries (§4.10): only files and
/// symlinks carry a content hash to compare.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DiffResult {
    pub added: Vec<String>,
    pub removed: Vec<String>,
    pub modified: Vec<String>,
}

fn comparable_hash(entry: &TreeEntry) -> Option<&str> {
    match entry {
        TreeEntry::File { hash, .. } | TreeEntry::Symlink { hash } => Some(hash.as_str()),
        TreeEntry::Dir => None,
    }
}

fn load_tree(repo: &Repo, id: &str) -> std::io::Result<BTreeMap<String, TreeEntry>> {
    if id.is_empty() {
        return Ok(BTreeMap::new());
    }
    crate::hash::walk_tree(&repo.snapshot_payload_path(id))
}

/// `Diff(from_id, to_id)` (§4.10). `from_id` may be empty, in which case
/// every entry in `to_id` is reported as added.
///
/// # Errors
/// Returns an I/O error if either snapshot tree cannot be walked.
pub fn diff(repo: &Repo, from_id: &str, to_id: &str) -> Result<DiffResult, JvsError> {
    let from = load_tree(repo, from_id).map_err(|source| JvsError::Io {
        context: format!("walking snapshot {from_id} for diff"),
        source,
    })?;
    let to = load_tree(repo, to_id).map_err(|source| JvsError::Io {
        context: format!("walking snapshot {to_id} for diff"),
        source,
    })?;

    let mut result = DiffResult::default();
    for (path, to_entry) in &to {
        let Some(to_hash) = comparable_hash(to_entry) else {
            continue;
        };
        match from.get(path).and_then(comparable_hash) {
            None => result.added.push(path.clone()),
            Some(from_hash) if from_hash != to_hash => result.modified.push(path.clone()),
            Some(_) => {}
        }
    }
    for (path, from_entry) in &from {
        if comparable_hash(from_entry).is_none() {
            continue;
        }
        if !to.contains_key(path) || comparable_hash(to.get(path).unwrap()).is_none() {
            result.removed.push(path.clone());
        }
    }

    result.added.sort();
    result.removed.sort();
    result.modified.sort();
    Ok(result)
}

/// Convenience wrapper resolving [`SnapshotId`]s before diffing.
///
/// # Errors
/// Propagates [`diff`]'s errors.
pub fn diff_ids(repo: &Repo, from: Option<&SnapshotId>, to: &SnapshotId) -> Result<DiffResult, JvsError> {
    diff(
        repo,
        from.map(SnapshotId::as_str).unwrap_or_default(),
        to.as_str(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ids::WorktreeName;
    use crate::repo::Repo;
    use crate::snapshot::{create, CreateRequest};

    fn init_repo() -> (tempfile::TempDir, Repo) {
        let dir = tempfile::tempdir().unwrap();
        let repo = Repo::init(dir.path().to_path_buf()).unwrap();
        (dir, repo)
    }

    #[test]
    fn empty_from_reports_everything_as_added() {
        let (_dir, repo) = init_repo();
        let main = WorktreeName::main();
        std::fs::write(repo.worktree_payload_path(&main).join("a.txt"), b"x").unwrap();
        let d = create(&repo, &main, &CreateRequest::default()).unwrap();
        let result = diff(&repo, "", d.snapshot_id.as_str()).unwrap();
        assert_eq!(result.added, vec!["a.txt".to_owned()]);
        assert!(result.removed.is_empty());
        assert!(result.modified.is_empty());
    }

    #[test]
    fn basic_lifecycle_modification_is_detected() {
        let (_dir, repo) = init_repo();
        let main = WorktreeName::main();
        let root = repo.worktree_payload_path(&main);
        std::fs::write(root.join("a.txt"), b"hello").unwrap();
        let d1 = create(&repo, &main, &CreateRequest::default()).unwrap();
        std::fs::write(root.join("a.txt"), b"world").unwrap();
        let d2 = create(&repo, &main, &CreateRequest::default()).unwrap();

        let result = diff(&repo, d1.snapshot_id.as_str(), d2.snapshot_id.as_str()).unwrap();
        assert_eq!(result.modified, vec!["a.txt".to_owned()]);
        assert!(result.added.is_empty());
        assert!(result.removed.is_empty());
    }

    #[test]
    fn added_and_removed_are_detected() {
        let (_dir, repo) = init_repo();
        let main = WorktreeName::main();
        let root = repo.worktree_payload_path(&main);
        std::fs::write(root.join("a.txt"), b"a").unwrap();
        let d1 = create(&repo, &main, &CreateRequest::default()).unwrap();
        std::fs::remove_file(root.join("a.txt")).unwrap();
        std::fs::write(root.join("b.txt"), b"b").unwrap();
        let d2 = create(&repo, &main, &CreateRequest::default()).unwrap();

        let result = diff(&repo, d1.snapshot_id.as_str(), d2.snapshot_id.as_str()).unwrap();
        assert_eq!(result.added, vec!["b.txt".to_owned()]);
        assert_eq!(result.removed, vec!["a.txt".to_owned()]);
        assert!(result.modified.is_empty());
    }

    #[test]
    fn identical_snapshots_produce_empty_diff() {
        let (_dir, repo) = init_repo();
        let main = WorktreeName::main();
        std::fs::write(repo.worktree_payload_path(&main).join("a.txt"), b"same").unwrap();
        let d1 = create(&repo, &main, &CreateRequest::default()).unwrap();
        let result = diff(&repo, d1.snapshot_id.as_str(), d1.snapshot_id.as_str()).unwrap();
        assert_eq!(result, DiffResult::default());
    }
}
