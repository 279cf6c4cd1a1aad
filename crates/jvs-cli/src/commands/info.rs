use jvs::Repo;
use serde::Serialize;

use crate::format::OutputFormat;

#[derive(Serialize)]
struct InfoReport {
    root: String,
    format_version: u32,
    engine: String,
    worktree_count: usize,
    snapshot_count: usize,
}

/// `info` (§6): engine, worktree/snapshot counts, and format version.
pub fn run(repo: &Repo, format: OutputFormat) -> anyhow::Result<()> {
    let worktrees = repo.list_worktree_names()?;
    let snapshots = jvs::catalog::list_all(repo)?;

    let report = InfoReport {
        root: repo.root().display().to_string(),
        format_version: jvs::FORMAT_VERSION,
        engine: repo.engine().to_string(),
        worktree_count: worktrees.len(),
        snapshot_count: snapshots.len(),
    };

    if format.is_json() {
        OutputFormat::print_json(&report)?;
    } else {
        println!("root:       {}", report.root);
        println!("format:     {}", report.format_version);
        println!("engine:     {}", report.engine);
        println!("worktrees:  {}", report.worktree_count);
        println!("snapshots:  {}", report.snapshot_count);
    }
    Ok(())
}
