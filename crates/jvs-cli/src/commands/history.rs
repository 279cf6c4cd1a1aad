use jvs::catalog::Filter;
use jvs::Repo;
use serde::Serialize;

use crate::format::OutputFormat;

#[derive(Serialize)]
struct HistoryEntry {
    snapshot_id: String,
    created_at: String,
    note: String,
    tags: Vec<String>,
}

/// `history [--limit N] [--grep …] [--tag …] [--all]` (§6): list
/// descriptors for a worktree, newest first.
#[allow(clippy::too_many_arguments)]
pub fn run(
    repo: &Repo,
    worktree: &str,
    limit: usize,
    grep: Option<&str>,
    tag: Option<&str>,
    all: bool,
    format: OutputFormat,
) -> anyhow::Result<()> {
    let filter = Filter {
        note_substring: grep.map(ToOwned::to_owned),
        tag: tag.map(ToOwned::to_owned),
        worktree_name: Some(worktree.to_owned()),
        created_after: None,
        created_before: None,
    };
    let mut descriptors = jvs::catalog::find(repo, &filter)?;
    if !all {
        descriptors.truncate(limit);
    }

    let entries: Vec<HistoryEntry> = descriptors
        .iter()
        .map(|d| HistoryEntry {
            snapshot_id: d.snapshot_id.to_string(),
            created_at: d.created_at.to_rfc3339(),
            note: d.note.clone(),
            tags: d.tags.iter().map(ToString::to_string).collect(),
        })
        .collect();

    if format.is_json() {
        OutputFormat::print_json(&entries)?;
    } else if entries.is_empty() {
        println!("No snapshots for worktree '{worktree}'.");
    } else {
        for e in &entries {
            let tags = if e.tags.is_empty() {
                String::new()
            } else {
                format!(" [{}]", e.tags.join(", "))
            };
            println!("{}  {}  {}{tags}", e.snapshot_id, e.created_at, e.note);
        }
        if !all && entries.len() >= limit {
            println!("(use --all to show every snapshot)");
        }
    }
    Ok(())
}
