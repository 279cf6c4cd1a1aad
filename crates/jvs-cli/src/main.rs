//! `jvs` — a local, snapshot-first versioning engine for filesystem
//! worktrees.
//!
//! This binary is a thin argument-parsing and output-formatting shell
//! around the `jvs` library crate: every operation it performs is a direct
//! call into `jvs::*`, with this crate owning only `clap` parsing, text
//! vs. `--json` rendering, and exit-code classification.
use clap::{Parser, Subcommand};

mod commands;
mod exit;
mod format;
mod logging;

#[derive(Parser)]
#[command(name = "jvs")]
#[command(version, about = "Local, snapshot-first versioning for filesystem worktrees")]
#[command(propagate_version = true)]
struct Cli {
    /// Repository root directory.
    #[arg(long, global = true, default_value = ".", env = "JVS_REPO")]
    repo: String,

    /// Emit a single JSON value to stdout instead of human-readable text.
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create a repo skeleton and the `main` worktree
    Init {
        /// Directory to initialize (created if missing). Defaults to the
        /// repo root.
        name: Option<String>,
    },

    /// Print engine, worktree/snapshot counts, and format version
    Info,

    /// Scan for inconsistencies and, optionally, repair them
    Doctor {
        /// Exit non-zero if any finding is reported, even if repaired.
        #[arg(long)]
        strict: bool,
        /// Apply the repair action for every repairable finding.
        #[arg(long)]
        repair_runtime: bool,
    },

    /// Recompute and check a descriptor checksum and payload root hash
    Verify {
        /// Snapshot reference to verify (ID, short prefix, tag, or note).
        #[arg(long)]
        snapshot: Option<String>,
        /// Verify every published snapshot.
        #[arg(long)]
        all: bool,
    },

    /// Create a snapshot of a worktree
    Snapshot {
        /// Free-form note attached to the snapshot.
        note: Option<String>,
        /// Worktree to snapshot.
        #[arg(long, default_value = "main")]
        worktree: String,
        /// Tag to attach; may be repeated.
        #[arg(long = "tag")]
        tags: Vec<String>,
        /// Restrict the snapshot to these paths (partial snapshot); may be
        /// repeated.
        #[arg(long = "paths")]
        paths: Vec<String>,
    },

    /// List snapshot descriptors
    History {
        /// Worktree to list history for.
        #[arg(long, default_value = "main")]
        worktree: String,
        /// Maximum number of entries to print.
        #[arg(long, default_value_t = 20)]
        limit: usize,
        /// Only include descriptors whose note contains this substring.
        #[arg(long)]
        grep: Option<String>,
        /// Only include descriptors carrying this exact tag.
        #[arg(long)]
        tag: Option<String>,
        /// Ignore `--limit` and print every matching descriptor.
        #[arg(long)]
        all: bool,
    },

    /// Tree diff between two snapshots
    Diff {
        /// Snapshot reference to diff from. Defaults to `to`'s parent.
        from: Option<String>,
        /// Snapshot reference to diff to. Defaults to the worktree's head.
        to: Option<String>,
        /// Worktree whose head is used for the defaults above.
        #[arg(long, default_value = "main")]
        worktree: String,
    },

    /// Restore a worktree in-place to a snapshot
    Restore {
        /// Snapshot reference, or the literal `HEAD` for the latest.
        id: String,
        /// Worktree to restore.
        #[arg(long, default_value = "main")]
        worktree: String,
    },

    /// Worktree CRUD and fork
    #[command(subcommand)]
    Worktree(commands::worktree::WorktreeCommand),

    /// Two-phase garbage collection
    #[command(subcommand)]
    Gc(commands::gc::GcCommand),
}

fn main() {
    let cli = Cli::parse();
    logging::init();

    let format = format::OutputFormat::resolve(cli.json);
    let result = dispatch(&cli, format);

    if let Err(err) = result {
        if format.is_json() {
            let body = serde_json::json!({ "error": err.to_string() });
            eprintln!("{body}");
        } else {
            eprintln!("error: {err}");
        }
        std::process::exit(exit::code_for(&err));
    }
}

fn dispatch(cli: &Cli, format: format::OutputFormat) -> anyhow::Result<()> {
    use Commands::{Diff, Doctor, Gc, History, Info, Init, Restore, Snapshot, Verify, Worktree};

    if let Init { name } = &cli.command {
        return commands::init::run(&cli.repo, name.as_deref(), format);
    }

    let repo = jvs::Repo::open(&cli.repo)?;

    match &cli.command {
        Init { .. } => unreachable!("handled above"),
        Info => commands::info::run(&repo, format),
        Doctor {
            strict,
            repair_runtime,
        } => commands::doctor::run(&repo, *strict, *repair_runtime, format),
        Verify { snapshot, all } => commands::verify::run(&repo, snapshot.as_deref(), *all, format),
        Snapshot {
            note,
            worktree,
            tags,
            paths,
        } => commands::snapshot::run(&repo, worktree, note.as_deref(), tags, paths, format),
        History {
            worktree,
            limit,
            grep,
            tag,
            all,
        } => commands::history::run(&repo, worktree, *limit, grep.as_deref(), tag.as_deref(), *all, format),
        Diff { from, to, worktree } => {
            commands::diff::run(&repo, worktree, from.as_deref(), to.as_deref(), format)
        }
        Restore { id, worktree } => commands::restore::run(&repo, worktree, id, format),
        Worktree(cmd) => commands::worktree::run(&repo, cmd, format),
        Gc(cmd) => commands::gc::run(&repo, cmd, format),
    }
}
