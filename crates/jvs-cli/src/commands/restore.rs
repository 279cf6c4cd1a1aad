use jvs::Repo;
use serde::Serialize;

use crate::format::OutputFormat;

#[derive(Serialize)]
struct RestoreReport {
    worktree: String,
    snapshot_id: String,
    detached: bool,
}

/// `restore <id>|HEAD` (§6): in-place restore; `HEAD` restores to the
/// worktree's `latest_snapshot_id` and clears detached state, anything else
/// is resolved via the snapshot catalog and sets `DETACHED` when it isn't
/// the latest snapshot.
pub fn run(repo: &Repo, worktree: &str, id: &str, format: OutputFormat) -> anyhow::Result<()> {
    let worktree_name = super::worktree_name(worktree)?;
    let cfg = if id.eq_ignore_ascii_case("head") {
        jvs::restore::restore_to_latest(repo, &worktree_name)?
    } else {
        let descriptor = super::resolve_snapshot(repo, id)?;
        jvs::restore::restore(repo, &worktree_name, &descriptor.snapshot_id)?
    };

    let report = RestoreReport {
        worktree: cfg.name.to_string(),
        snapshot_id: cfg.head_snapshot_id.clone(),
        detached: cfg.is_detached(),
    };

    if format.is_json() {
        OutputFormat::print_json(&report)?;
    } else {
        println!("Restored worktree '{}' to {}", report.worktree, report.snapshot_id);
        if report.detached {
            println!("  worktree is now DETACHED");
        }
    }
    Ok(())
}
