//! Worktree manager (§4.7): CRUD of worktree records, head/latest
//! pointers, and the INITIAL/HEAD/DETACHED state machine.

use std::collections::BTreeMap;

use chrono::Utc;
use serde_json::json;

use crate::error::JvsError;
use crate::ids::{SnapshotId, WorktreeName};
use crate::model::{AuditEventType, WorktreeConfig};
use crate::repo::Repo;

/// Append a `worktree.create`/`worktree.remove` audit record. Failure here
/// is non-fatal (§7), matching the snapshot creator and restorer: the
/// mutation already happened and is not rolled back for a logging failure.
fn audit(repo: &Repo, event_type: AuditEventType, name: &WorktreeName, details: BTreeMap<String, serde_json::Value>) {
    if let Err(e) = repo.audit_log().append(event_type, name.as_str(), "", details) {
        tracing::warn!(error = %e, worktree = %name, %event_type, "failed to append audit record");
    }
}

/// `Create(name, base?)` (§4.7): register a new, empty worktree.
///
/// # Errors
/// Returns an I/O error if the config cannot be written, or fails if a
/// worktree with this name already exists.
pub fn create(
    repo: &Repo,
    name: &WorktreeName,
    base: Option<&SnapshotId>,
) -> Result<WorktreeConfig, JvsError> {
    if repo.worktree_config_path(name).exists() {
        return Err(JvsError::NotFound {
            what: "available worktree name (already exists)".to_owned(),
            reference: name.to_string(),
        });
    }
    std::fs::create_dir_all(repo.worktree_payload_path(name))
        .map_err(|source| JvsError::Io {
            context: "creating worktree payload directory".to_owned(),
            source,
        })?;
    let cfg = WorktreeConfig {
        name: name.clone(),
        created_at: Utc::now(),
        base_snapshot_id: base.cloned(),
        head_snapshot_id: String::new(),
        latest_snapshot_id: String::new(),
    };
    repo.write_worktree_config(&cfg)?;
    let mut details = BTreeMap::new();
    if let Some(base) = base {
        details.insert("base_snapshot_id".to_owned(), json!(base.to_string()));
    }
    audit(repo, AuditEventType::WorktreeCreate, name, details);
    Ok(cfg)
}

/// `Fork(id, name, clone)` (§4.7): start a new worktree at `id`, with
/// `head == latest == base == id` — i.e. the new worktree starts at HEAD.
///
/// # Errors
/// Propagates the CoW engine's I/O error, or a config-write error.
pub fn fork(repo: &Repo, id: &SnapshotId, name: &WorktreeName) -> Result<WorktreeConfig, JvsError> {
    if repo.worktree_config_path(name).exists() {
        return Err(JvsError::NotFound {
            what: "available worktree name (already exists)".to_owned(),
            reference: name.to_string(),
        });
    }
    let src = repo.snapshot_payload_path(id.as_str());
    let dst = repo.worktree_payload_path(name);
    if let Some(parent) = dst.parent() {
        std::fs::create_dir_all(parent).map_err(|source| JvsError::Io {
            context: "creating worktrees directory".to_owned(),
            source,
        })?;
    }
    let engine = repo.engine();
    crate::engine::clone_with(engine, &src, &dst).map_err(|source| JvsError::Io {
        context: format!("cloning snapshot {id} into new worktree {name}"),
        source,
    })?;

    let cfg = WorktreeConfig {
        name: name.clone(),
        created_at: Utc::now(),
        base_snapshot_id: Some(id.clone()),
        head_snapshot_id: id.to_string(),
        latest_snapshot_id: id.to_string(),
    };
    repo.write_worktree_config(&cfg)?;
    let mut details = BTreeMap::new();
    details.insert("base_snapshot_id".to_owned(), json!(id.to_string()));
    audit(repo, AuditEventType::WorktreeCreate, name, details);
    Ok(cfg)
}

/// `List()` (§4.7).
///
/// # Errors
/// Returns an I/O error if the worktrees directory cannot be read, or a
/// JSON error if a config is malformed.
pub fn list(repo: &Repo) -> Result<Vec<WorktreeConfig>, JvsError> {
    repo.list_worktree_names()?
        .into_iter()
        .map(|name| repo.read_worktree_config(&name))
        .collect()
}

/// `Get(name)` (§4.7).
///
/// # Errors
/// Returns [`JvsError::NotFound`] if no such worktree exists.
pub fn get(repo: &Repo, name: &WorktreeName) -> Result<WorktreeConfig, JvsError> {
    repo.read_worktree_config(name)
}

/// `Rename(old, new)` (§4.7): forbidden for `main`'s payload move, but the
/// config rename path is shared — `main` itself can never be renamed.
///
/// # Errors
/// Returns [`JvsError::MainProtected`] if `old` is `main`, or
/// [`JvsError::NotFound`] if `new` already exists.
pub fn rename(repo: &Repo, old: &WorktreeName, new: &WorktreeName) -> Result<WorktreeConfig, JvsError> {
    if old.is_main() {
        return Err(JvsError::MainProtected {
            operation: "rename".to_owned(),
        });
    }
    if repo.worktree_config_path(new).exists() {
        return Err(JvsError::NotFound {
            what: "available worktree name (already exists)".to_owned(),
            reference: new.to_string(),
        });
    }
    let mut cfg = repo.read_worktree_config(old)?;

    let old_payload = repo.worktree_payload_path(old);
    let new_payload = repo.worktree_payload_path(new);
    if let Some(parent) = new_payload.parent() {
        std::fs::create_dir_all(parent).map_err(|source| JvsError::Io {
            context: "creating worktrees directory".to_owned(),
            source,
        })?;
    }
    crate::fsutil::rename_and_sync(&old_payload, &new_payload).map_err(|source| JvsError::Io {
        context: "renaming worktree payload".to_owned(),
        source,
    })?;

    cfg.name = new.clone();
    repo.write_worktree_config(&cfg)?;
    std::fs::remove_file(repo.worktree_config_path(old)).ok();
    if let Some(dir) = repo.worktree_config_path(old).parent() {
        std::fs::remove_dir(dir).ok();
    }
    Ok(cfg)
}

/// `Remove(name)` (§4.7): forbidden for `main`.
///
/// # Errors
/// Returns [`JvsError::MainProtected`] if `name` is `main`.
pub fn remove(repo: &Repo, name: &WorktreeName) -> Result<(), JvsError> {
    if name.is_main() {
        return Err(JvsError::MainProtected {
            operation: "remove".to_owned(),
        });
    }
    let payload = repo.worktree_payload_path(name);
    if payload.exists() {
        std::fs::remove_dir_all(&payload).map_err(|source| JvsError::Io {
            context: "removing worktree payload".to_owned(),
            source,
        })?;
    }
    if let Some(dir) = repo.worktree_config_path(name).parent() {
        std::fs::remove_dir_all(dir).map_err(|source| JvsError::Io {
            context: "removing worktree config directory".to_owned(),
            source,
        })?;
    }
    audit(repo, AuditEventType::WorktreeRemove, name, BTreeMap::new());
    Ok(())
}

/// `UpdateHead(name, id)` (§4.7): detach-preserving — only `head` moves.
///
/// # Errors
/// Propagates a config read/write error.
pub fn update_head(repo: &Repo, name: &WorktreeName, id: &SnapshotId) -> Result<WorktreeConfig, JvsError> {
    let mut cfg = repo.read_worktree_config(name)?;
    cfg.head_snapshot_id = id.to_string();
    repo.write_worktree_config(&cfg)?;
    Ok(cfg)
}

/// `SetLatest(name, id)` (§4.7): sets both `head` and `latest`.
///
/// # Errors
/// Propagates a config read/write error.
pub fn set_latest(repo: &Repo, name: &WorktreeName, id: &SnapshotId) -> Result<WorktreeConfig, JvsError> {
    let mut cfg = repo.read_worktree_config(name)?;
    cfg.head_snapshot_id = id.to_string();
    cfg.latest_snapshot_id = id.to_string();
    repo.write_worktree_config(&cfg)?;
    Ok(cfg)
}
