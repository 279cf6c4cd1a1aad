use jvs::ids::Tag;
use jvs::snapshot::CreateRequest;
use jvs::Repo;
use serde::Serialize;

use crate::format::OutputFormat;

#[derive(Serialize)]
struct SnapshotReport {
    snapshot_id: String,
    worktree: String,
    note: String,
    tags: Vec<String>,
}

/// `snapshot [note] [--tag …] [--paths …]` (§6): create a snapshot of a
/// worktree; rejected by the core crate with `E_DETACHED` if the worktree
/// is not in `HEAD` state.
pub fn run(
    repo: &Repo,
    worktree: &str,
    note: Option<&str>,
    tags: &[String],
    paths: &[String],
    format: OutputFormat,
) -> anyhow::Result<()> {
    let worktree_name = super::worktree_name(worktree)?;
    let tags = tags
        .iter()
        .map(|t| Tag::new(t.clone()).map_err(jvs::JvsError::from))
        .collect::<Result<Vec<_>, _>>()?;

    let request = CreateRequest {
        note: note.unwrap_or_default().to_owned(),
        tags,
        paths: paths.to_vec(),
    };
    let descriptor = jvs::snapshot::create(repo, &worktree_name, &request)?;

    let report = SnapshotReport {
        snapshot_id: descriptor.snapshot_id.to_string(),
        worktree: descriptor.worktree_name.to_string(),
        note: descriptor.note.clone(),
        tags: descriptor.tags.iter().map(ToString::to_string).collect(),
    };

    if format.is_json() {
        OutputFormat::print_json(&report)?;
    } else {
        println!("Created snapshot {}", report.snapshot_id);
        println!("  worktree: {}", report.worktree);
        if !report.note.is_empty() {
            println!("  note: {}", report.note);
        }
        if !report.tags.is_empty() {
            println!("  tags: {}", report.tags.join(", "));
        }
    }
    Ok(())
}
