//! Snapshot creator (§4.8): the 12-step atomic publish protocol.
//!
//! Any failure after step 3 (intent written) triggers best-effort cleanup
//! of the `<id>.tmp/` directory via [`TmpGuard`]; the intent file itself is
//! left in place for [`crate::doctor`] to classify on a later run.

use std::collections::BTreeMap;
use std::path::Path;

use chrono::Utc;
use serde_json::json;

use crate::error::{IoContext, JvsError};
use crate::fsutil;
use crate::ids::{SnapshotId, Tag, WorktreeName};
use crate::model::{AuditEventType, Descriptor, EngineKind, Intent, IntegrityState, ReadyMarker};
use crate::repo::Repo;
use crate::worktree;

/// Arguments to [`create`]; `paths` selects a partial snapshot when
/// non-empty.
#[derive(Debug, Clone, Default)]
pub struct CreateRequest {
    pub note: String,
    pub tags: Vec<Tag>,
    pub paths: Vec<String>,
}

/// RAII guard that removes a `.tmp` directory unless disarmed.
struct TmpGuard<'a> {
    path: &'a Path,
    armed: bool,
}

impl<'a> TmpGuard<'a> {
    fn new(path: &'a Path) -> Self {
        Self { path, armed: true }
    }

    fn disarm(&mut self) {
        self.armed = false;
    }
}

impl Drop for TmpGuard<'_> {
    fn drop(&mut self) {
        if self.armed {
            let _ = std::fs::remove_dir_all(self.path);
        }
    }
}

/// `Create(worktree_name, note, tags, paths?)` (§4.8): run the 12-step
/// atomic publish protocol.
///
/// # Errors
/// Returns [`JvsError::Detached`] if the worktree is not in `HEAD` state,
/// [`JvsError::PartialSnapshot`] if `request.paths` is invalid, or an I/O
/// error from any step. Any failure after the intent is written cleans up
/// the `.tmp` directory before returning.
pub fn create(
    repo: &Repo,
    worktree_name: &WorktreeName,
    request: &CreateRequest,
) -> Result<Descriptor, JvsError> {
    // Step 1: load and validate the worktree config.
    let cfg = repo.read_worktree_config(worktree_name)?;
    if cfg.is_detached() {
        return Err(JvsError::Detached {
            worktree: worktree_name.to_string(),
        });
    }

    let worktree_root = repo.worktree_payload_path(worktree_name);
    let partial_paths = if request.paths.is_empty() {
        None
    } else {
        Some(validate_partial_paths(&worktree_root, &request.paths)?)
    };

    // Step 2: generate a new snapshot id.
    let id = SnapshotId::generate();
    let engine = repo.engine();

    // Step 3: write intent atomically.
    let intent = Intent {
        snapshot_id: id.clone(),
        worktree_name: worktree_name.clone(),
        started_at: Utc::now(),
        engine,
    };
    let intent_bytes = serde_json::to_vec_pretty(&intent)?;
    fsutil::atomic_write(&repo.intent_path(id.as_str()), &intent_bytes, 0o644)
        .io_context("writing intent")?;

    let result = create_after_intent(repo, worktree_name, &cfg, &id, engine, request, partial_paths.as_deref());

    // Best-effort intent removal regardless of outcome on this path: a
    // successful publish has no further use for it, and a failed one is
    // exactly what doctor's "abandoned intent" finding is for — but we
    // still try to clean it up immediately rather than waiting for a
    // doctor run, per §4.8 step 3's "defer best-effort removal on success".
    if result.is_ok() {
        let _ = std::fs::remove_file(repo.intent_path(id.as_str()));
    }

    result
}

fn create_after_intent(
    repo: &Repo,
    worktree_name: &WorktreeName,
    cfg: &crate::model::WorktreeConfig,
    id: &SnapshotId,
    engine: EngineKind,
    request: &CreateRequest,
    partial_paths: Option<&[String]>,
) -> Result<Descriptor, JvsError> {
    let worktree_root = repo.worktree_payload_path(worktree_name);
    let tmp_path = repo.snapshot_tmp_path(id.as_str());

    // Step 4: mkdir the tmp payload directory.
    std::fs::create_dir_all(&tmp_path).io_context("creating snapshot tmp directory")?;
    let mut guard = TmpGuard::new(&tmp_path);

    // Step 5: clone the worktree payload (or the partial subset) into tmp.
    clone_into_tmp(engine, &worktree_root, &tmp_path, partial_paths)
        .io_context("cloning worktree payload")?;

    // Step 6: fsync the tmp payload tree.
    fsutil::fsync_tree(&tmp_path).io_context("fsyncing snapshot tmp tree")?;

    // Step 7: compute the payload root hash.
    let payload_root_hash = match partial_paths {
        Some(paths) => crate::hash::payload_root_hash_partial(&tmp_path, paths)
            .io_context("hashing partial payload")?,
        None => crate::hash::payload_root_hash(&tmp_path).io_context("hashing payload")?,
    };

    // Step 8: construct the descriptor.
    let parent_id = if cfg.head_snapshot_id.is_empty() {
        None
    } else {
        Some(SnapshotId::new(cfg.head_snapshot_id.clone())?)
    };
    let mut descriptor = Descriptor {
        snapshot_id: id.clone(),
        parent_id,
        worktree_name: worktree_name.clone(),
        created_at: Utc::now(),
        note: request.note.clone(),
        tags: request.tags.clone(),
        engine,
        payload_root_hash,
        integrity_state: IntegrityState::Verified,
        descriptor_checksum: String::new(),
        compression: None,
        partial_paths: partial_paths.map(<[String]>::to_vec),
    };

    // Step 9: compute and set the descriptor checksum.
    descriptor.descriptor_checksum = descriptor
        .compute_checksum()
        .map_err(JvsError::from)?;

    // Step 10: write the READY marker into tmp; fsync.
    let ready = ReadyMarker {
        snapshot_id: id.clone(),
        completed_at: Utc::now(),
        engine,
        descriptor_checksum: descriptor.descriptor_checksum.clone(),
        payload_hash: descriptor.payload_root_hash.clone(),
    };
    let ready_bytes = serde_json::to_vec_pretty(&ready)?;
    let ready_path = tmp_path.join(".READY");
    std::fs::write(&ready_path, &ready_bytes).io_context("writing READY marker")?;
    {
        let f = std::fs::File::open(&ready_path).io_context("opening READY marker to fsync")?;
        f.sync_all().io_context("fsyncing READY marker")?;
    }
    fsutil::fsync_tree(&tmp_path).io_context("fsyncing snapshot tree before publish")?;

    // Step 11: rename tmp -> published; fsync parent. Compression is a
    // documented no-op in this release (see DESIGN.md).
    let published_path = repo.snapshot_payload_path(id.as_str());
    fsutil::rename_and_sync(&tmp_path, &published_path).io_context("publishing snapshot tree")?;
    guard.disarm();

    // Step 12: write the descriptor, update worktree pointers, append audit.
    let descriptor_bytes = serde_json::to_vec_pretty(&descriptor)?;
    fsutil::atomic_write(
        &repo.descriptor_path(id.as_str()),
        &descriptor_bytes,
        0o644,
    )
    .io_context("writing descriptor")?;

    worktree::set_latest(repo, worktree_name, id)?;

    let mut details = BTreeMap::new();
    details.insert("engine".to_owned(), json!(engine.to_string()));
    details.insert("note".to_owned(), json!(descriptor.note));
    details.insert(
        "checksum".to_owned(),
        json!(descriptor.descriptor_checksum),
    );
    if let Some(paths) = &descriptor.partial_paths {
        details.insert("partial_paths".to_owned(), json!(paths));
    }
    // A failure here is non-fatal (§7): the snapshot is already published.
    if let Err(e) = repo
        .audit_log()
        .append(AuditEventType::SnapshotCreate, worktree_name.as_str(), id.as_str(), details)
    {
        tracing::warn!(error = %e, snapshot_id = %id, "failed to append audit record for published snapshot");
    }

    tracing::info!(snapshot_id = %id, worktree = %worktree_name, %engine, "published snapshot");
    Ok(descriptor)
}

/// Clone either the whole worktree payload, or a validated subset of
/// relative paths, into `tmp_root`. Clones entry-by-entry (rather than the
/// payload root itself) so `tmp_root`, already `mkdir`'d in step 4, never
/// collides with a CoW engine's "dst must not exist" contract.
fn clone_into_tmp(
    engine: EngineKind,
    worktree_root: &Path,
    tmp_root: &Path,
    partial_paths: Option<&[String]>,
) -> std::io::Result<()> {
    match partial_paths {
        Some(paths) => {
            for rel in paths {
                let src = worktree_root.join(rel);
                let dst = tmp_root.join(rel);
                if let Some(parent) = dst.parent() {
                    std::fs::create_dir_all(parent)?;
                }
                crate::engine::clone_with(engine, &src, &dst)?;
            }
            Ok(())
        }
        None => {
            if !worktree_root.is_dir() {
                return Ok(());
            }
            for entry in std::fs::read_dir(worktree_root)? {
                let entry = entry?;
                let name = entry.file_name();
                crate::engine::clone_with(engine, &entry.path(), &tmp_root.join(&name))?;
            }
            Ok(())
        }
    }
}

/// Validate, deduplicate, and sort a `paths` argument for a partial
/// snapshot (§4.8 precondition): each must be relative, contain no `..`
/// component, and exist under `worktree_root`.
///
/// # Errors
/// Returns [`JvsError::PartialSnapshot`] on any invalid entry.
fn validate_partial_paths(worktree_root: &Path, paths: &[String]) -> Result<Vec<String>, JvsError> {
    let mut out: Vec<String> = Vec::with_capacity(paths.len());
    for raw in paths {
        let trimmed = raw.trim_end_matches('/');
        if trimmed.is_empty() || trimmed.starts_with('/') {
            return Err(JvsError::PartialSnapshot {
                detail: format!("{raw:?} must be a non-empty path relative to the worktree root"),
            });
        }
        if std::path::Path::new(trimmed)
            .components()
            .any(|c| matches!(c, std::path::Component::ParentDir | std::path::Component::RootDir))
        {
            return Err(JvsError::PartialSnapshot {
                detail: format!("{raw:?} must not contain '..' or an absolute root"),
            });
        }
        let abs = worktree_root.join(trimmed);
        if !abs.exists() {
            return Err(JvsError::PartialSnapshot {
                detail: format!("{raw:?} does not exist under the worktree"),
            });
        }
        out.push(trimmed.to_owned());
    }
    out.sort();
    out.dedup();
    Ok(out)
}
