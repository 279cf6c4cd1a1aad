use clap::Subcommand;
use jvs::model::WorktreeConfig;
use jvs::Repo;
use serde::Serialize;

use crate::format::OutputFormat;

#[derive(Subcommand)]
pub enum WorktreeCommand {
    /// Register a new, empty worktree
    Create {
        name: String,
        /// Snapshot to record as this worktree's base.
        #[arg(long)]
        base: Option<String>,
    },
    /// List every worktree and its state
    List,
    /// Print a worktree's payload directory
    Path { name: String },
    /// Rename a worktree (not permitted for `main`)
    Rename { old: String, new: String },
    /// Remove a worktree (not permitted for `main`)
    Remove { name: String },
    /// Start a new worktree at a given snapshot
    Fork { id: String, name: String },
}

#[derive(Serialize)]
struct WorktreeView {
    name: String,
    state: String,
    head: String,
    latest: String,
}

impl From<&WorktreeConfig> for WorktreeView {
    fn from(cfg: &WorktreeConfig) -> Self {
        Self {
            name: cfg.name.to_string(),
            state: cfg.state().to_string(),
            head: cfg.head_snapshot_id.clone(),
            latest: cfg.latest_snapshot_id.clone(),
        }
    }
}

pub fn run(repo: &Repo, cmd: &WorktreeCommand, format: OutputFormat) -> anyhow::Result<()> {
    match cmd {
        WorktreeCommand::Create { name, base } => create(repo, name, base.as_deref(), format),
        WorktreeCommand::List => list(repo, format),
        WorktreeCommand::Path { name } => path(repo, name, format),
        WorktreeCommand::Rename { old, new } => rename(repo, old, new, format),
        WorktreeCommand::Remove { name } => remove(repo, name, format),
        WorktreeCommand::Fork { id, name } => fork(repo, id, name, format),
    }
}

fn create(repo: &Repo, name: &str, base: Option<&str>, format: OutputFormat) -> anyhow::Result<()> {
    let name = super::worktree_name(name)?;
    let base = base
        .map(|reference| super::resolve_snapshot(repo, reference))
        .transpose()?
        .map(|d| d.snapshot_id);
    let cfg = jvs::worktree::create(repo, &name, base.as_ref())?;
    print_one(&cfg, format, "Created worktree")
}

fn list(repo: &Repo, format: OutputFormat) -> anyhow::Result<()> {
    let worktrees = jvs::worktree::list(repo)?;
    let views: Vec<WorktreeView> = worktrees.iter().map(WorktreeView::from).collect();
    if format.is_json() {
        OutputFormat::print_json(&views)?;
    } else {
        for v in &views {
            println!("{:<20} {:<10} head={} latest={}", v.name, v.state, v.head, v.latest);
        }
    }
    Ok(())
}

fn path(repo: &Repo, name: &str, format: OutputFormat) -> anyhow::Result<()> {
    let name = super::worktree_name(name)?;
    let path = repo.worktree_payload_path(&name).display().to_string();
    if format.is_json() {
        OutputFormat::print_json(&serde_json::json!({ "path": path }))?;
    } else {
        println!("{path}");
    }
    Ok(())
}

fn rename(repo: &Repo, old: &str, new: &str, format: OutputFormat) -> anyhow::Result<()> {
    let old = super::worktree_name(old)?;
    let new = super::worktree_name(new)?;
    let cfg = jvs::worktree::rename(repo, &old, &new)?;
    print_one(&cfg, format, "Renamed worktree")
}

fn remove(repo: &Repo, name: &str, format: OutputFormat) -> anyhow::Result<()> {
    let name = super::worktree_name(name)?;
    jvs::worktree::remove(repo, &name)?;
    if format.is_json() {
        OutputFormat::print_json(&serde_json::json!({ "removed": name.to_string() }))?;
    } else {
        println!("Removed worktree '{name}'");
    }
    Ok(())
}

fn fork(repo: &Repo, id: &str, name: &str, format: OutputFormat) -> anyhow::Result<()> {
    let descriptor = super::resolve_snapshot(repo, id)?;
    let name = super::worktree_name(name)?;
    let cfg = jvs::worktree::fork(repo, &descriptor.snapshot_id, &name)?;
    print_one(&cfg, format, "Forked worktree")
}

fn print_one(cfg: &WorktreeConfig, format: OutputFormat, label: &str) -> anyhow::Result<()> {
    let view = WorktreeView::from(cfg);
    if format.is_json() {
        OutputFormat::print_json(&view)?;
    } else {
        println!("{label} '{}' (state: {})", view.name, view.state);
    }
    Ok(())
}
