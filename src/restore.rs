//! Restorer (§4.9): atomic two-rename swap with backup.

use std::collections::BTreeMap;

use serde_json::json;

use crate::error::{IoContext, JvsError};
use crate::fsutil;
use crate::ids::{SnapshotId, WorktreeName};
use crate::model::{AuditEventType, Descriptor, WorktreeConfig};
use crate::repo::Repo;
use crate::worktree;

/// Load and checksum-verify a published descriptor.
///
/// # Errors
/// Returns [`JvsError::NotFound`] if no descriptor exists for `id`, or
/// [`JvsError::DescriptorCorrupt`] if its checksum does not recompute.
pub fn load_verified_descriptor(repo: &Repo, id: &SnapshotId) -> Result<Descriptor, JvsError> {
    let path = repo.descriptor_path(id.as_str());
    let bytes = std::fs::read(&path).map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            JvsError::NotFound {
                what: "snapshot".to_owned(),
                reference: id.to_string(),
            }
        } else {
            JvsError::Io {
                context: format!("reading descriptor {}", path.display()),
                source: e,
            }
        }
    })?;
    let descriptor: Descriptor = serde_json::from_slice(&bytes)?;
    let expected = descriptor.compute_checksum().map_err(JvsError::from)?;
    if expected != descriptor.descriptor_checksum {
        return Err(JvsError::DescriptorCorrupt {
            snapshot_id: id.to_string(),
            detail: "recomputed checksum does not match stored descriptor_checksum".to_owned(),
        });
    }
    Ok(descriptor)
}

/// `Restore(worktree_name, snapshot_id)` (§4.9).
///
/// # Errors
/// Returns [`JvsError::NotFound`]/[`JvsError::DescriptorCorrupt`] per
/// [`load_verified_descriptor`], or an I/O error from the clone/swap.
pub fn restore(
    repo: &Repo,
    worktree_name: &WorktreeName,
    snapshot_id: &SnapshotId,
) -> Result<WorktreeConfig, JvsError> {
    // Step 1: load and verify the descriptor.
    let descriptor = load_verified_descriptor(repo, snapshot_id)?;

    // Step 2: load worktree config (just to confirm it exists).
    let _cfg = repo.read_worktree_config(worktree_name)?;

    let payload = repo.worktree_payload_path(worktree_name);
    let snapshot_payload = repo.snapshot_payload_path(snapshot_id.as_str());

    // Step 3: clone the snapshot payload into a sibling temp directory.
    let restore_tmp = fsutil::sibling_temp_path(&payload, "restore-tmp");
    crate::engine::clone_with(repo.engine(), &snapshot_payload, &restore_tmp)
        .io_context("cloning snapshot payload for restore")?;
    // The snapshot tree's own .READY marker has no business living inside
    // a worktree payload.
    let _ = std::fs::remove_file(restore_tmp.join(".READY"));

    // Step 4: two-rename swap, with rollback on the second rename's
    // failure.
    let backup = fsutil::sibling_temp_path(&payload, "restore-backup");
    if let Err(e) = fsutil::rename_and_sync(&payload, &backup) {
        let _ = std::fs::remove_dir_all(&restore_tmp);
        return Err(JvsError::Io {
            context: "renaming current payload aside for restore".to_owned(),
            source: e,
        });
    }
    if let Err(e) = fsutil::rename_and_sync(&restore_tmp, &payload) {
        // Roll back: put the backup back where the payload was.
        let _ = fsutil::rename_and_sync(&backup, &payload);
        let _ = std::fs::remove_dir_all(&restore_tmp);
        return Err(JvsError::Io {
            context: "renaming restored payload into place".to_owned(),
            source: e,
        });
    }

    // Step 5: remove the backup synchronously.
    std::fs::remove_dir_all(&backup).io_context("removing restore backup")?;

    // Step 6: update head only — this is what produces DETACHED whenever
    // snapshot_id != latest.
    let cfg = worktree::update_head(repo, worktree_name, snapshot_id)?;
    let detached = cfg.is_detached();

    // Step 7: audit.
    let mut details = BTreeMap::new();
    details.insert("detached".to_owned(), json!(detached));
    if let Err(e) = repo.audit_log().append(
        AuditEventType::Restore,
        worktree_name.as_str(),
        snapshot_id.as_str(),
        details,
    ) {
        tracing::warn!(error = %e, snapshot_id = %snapshot_id, "failed to append audit record for restore");
    }

    tracing::info!(
        snapshot_id = %snapshot_id,
        worktree = %worktree_name,
        descriptor_checksum = %descriptor.descriptor_checksum,
        detached,
        "restored worktree"
    );
    Ok(cfg)
}

/// `RestoreToLatest(name)` (§4.9): restore to `latest_snapshot_id`,
/// clearing detached state.
///
/// # Errors
/// Returns [`JvsError::NotFound`] if the worktree has no snapshots yet, or
/// propagates [`restore`]'s errors.
pub fn restore_to_latest(repo: &Repo, worktree_name: &WorktreeName) -> Result<WorktreeConfig, JvsError> {
    let cfg = repo.read_worktree_config(worktree_name)?;
    if cfg.latest_snapshot_id.is_empty() {
        return Err(JvsError::NotFound {
            what: "snapshot".to_owned(),
            reference: "HEAD (no snapshots yet)".to_owned(),
        });
    }
    let id = SnapshotId::new(cfg.latest_snapshot_id)?;
    restore(repo, worktree_name, &id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ids::WorktreeName;
    use crate::model::WorktreeState;
    use crate::repo::Repo;
    use crate::snapshot::{create, CreateRequest};

    fn init_repo() -> (tempfile::TempDir, Repo) {
        let dir = tempfile::tempdir().unwrap();
        let repo = Repo::init(dir.path().to_path_buf()).unwrap();
        (dir, repo)
    }

    #[test]
    fn restore_to_non_latest_produces_detached_and_restores_content() {
        let (_dir, repo) = init_repo();
        let main = WorktreeName::main();
        let root = repo.worktree_payload_path(&main);
        std::fs::write(root.join("a.txt"), b"hello").unwrap();
        let d1 = create(&repo, &main, &CreateRequest::default()).unwrap();
        std::fs::write(root.join("a.txt"), b"world").unwrap();
        let d2 = create(&repo, &main, &CreateRequest::default()).unwrap();

        let cfg = restore(&repo, &main, &d1.snapshot_id).unwrap();
        assert!(cfg.is_detached());
        assert_eq!(std::fs::read(root.join("a.txt")).unwrap(), b"hello");
        assert_eq!(cfg.latest_snapshot_id, d2.snapshot_id.to_string());
    }

    #[test]
    fn restore_to_head_clears_detached_state() {
        let (_dir, repo) = init_repo();
        let main = WorktreeName::main();
        let root = repo.worktree_payload_path(&main);
        std::fs::write(root.join("a.txt"), b"hello").unwrap();
        let d1 = create(&repo, &main, &CreateRequest::default()).unwrap();
        std::fs::write(root.join("a.txt"), b"world").unwrap();
        create(&repo, &main, &CreateRequest::default()).unwrap();

        restore(&repo, &main, &d1.snapshot_id).unwrap();
        let cfg = restore_to_latest(&repo, &main).unwrap();
        assert_eq!(cfg.state(), WorktreeState::Head);
        assert_eq!(std::fs::read(root.join("a.txt")).unwrap(), b"world");
    }

    #[test]
    fn restore_unknown_id_fails_not_found_and_leaves_worktree_unchanged() {
        let (_dir, repo) = init_repo();
        let main = WorktreeName::main();
        let root = repo.worktree_payload_path(&main);
        std::fs::write(root.join("a.txt"), b"hello").unwrap();
        let bogus = crate::ids::SnapshotId::new("1-deadbeef").unwrap();
        let err = restore(&repo, &main, &bogus).unwrap_err();
        assert!(matches!(err, JvsError::NotFound { .. }));
        assert_eq!(std::fs::read(root.join("a.txt")).unwrap(), b"hello");
    }

    #[test]
    fn tampered_descriptor_fails_restore() {
        let (_dir, repo) = init_repo();
        let main = WorktreeName::main();
        let d = create(&repo, &main, &CreateRequest::default()).unwrap();
        let path = repo.descriptor_path(d.snapshot_id.as_str());
        let mut on_disk: Descriptor = serde_json::from_slice(&std::fs::read(&path).unwrap()).unwrap();
        on_disk.note = "tampered".to_owned();
        std::fs::write(&path, serde_json::to_vec_pretty(&on_disk).unwrap()).unwrap();

        let err = restore(&repo, &main, &d.snapshot_id).unwrap_err();
        assert!(matches!(err, JvsError::DescriptorCorrupt { .. }));
    }
}
