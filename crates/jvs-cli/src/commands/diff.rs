use jvs::ids::SnapshotId;
use jvs::Repo;
use serde::Serialize;

use crate::format::OutputFormat;

#[derive(Serialize)]
struct DiffReport {
    from: String,
    to: String,
    added: Vec<String>,
    removed: Vec<String>,
    modified: Vec<String>,
}

/// `diff [<from> [<to>]]` (§6): tree diff between two snapshots. `to`
/// defaults to the worktree's current head; `from` defaults to `to`'s
/// parent (so a bare `jvs diff` shows the latest snapshot's own changes).
pub fn run(
    repo: &Repo,
    worktree: &str,
    from: Option<&str>,
    to: Option<&str>,
    format: OutputFormat,
) -> anyhow::Result<()> {
    let to_id = match to {
        Some(reference) => super::resolve_snapshot(repo, reference)?.snapshot_id,
        None => {
            let cfg = repo.read_worktree_config(&super::worktree_name(worktree)?)?;
            if cfg.head_snapshot_id.is_empty() {
                anyhow::bail!("worktree '{worktree}' has no snapshots yet");
            }
            SnapshotId::new(cfg.head_snapshot_id).map_err(jvs::JvsError::from)?
        }
    };

    let from_id = match from {
        Some(reference) => Some(super::resolve_snapshot(repo, reference)?.snapshot_id),
        None => {
            let to_descriptor = super::resolve_snapshot(repo, to_id.as_str())?;
            to_descriptor.parent_id
        }
    };

    let result = jvs::diff::diff_ids(repo, from_id.as_ref(), &to_id)?;

    if format.is_json() {
        OutputFormat::print_json(&DiffReport {
            from: from_id.map(|id| id.to_string()).unwrap_or_default(),
            to: to_id.to_string(),
            added: result.added,
            removed: result.removed,
            modified: result.modified,
        })?;
    } else {
        for path in &result.added {
            println!("+ {path}");
        }
        for path in &result.removed {
            println!("- {path}");
        }
        for path in &result.modified {
            println!("~ {path}");
        }
        if result.added.is_empty() && result.removed.is_empty() && result.modified.is_empty() {
            println!("No differences.");
        }
    }
    Ok(())
}
