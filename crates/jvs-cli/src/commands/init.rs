use std::path::{Path, PathBuf};

use jvs::Repo;
use serde::Serialize;

use crate::format::OutputFormat;

#[derive(Serialize)]
struct InitReport {
    root: String,
    format_version: u32,
    engine: String,
}

/// `init <name>` (§6): create the repo skeleton and `main` worktree at
/// `repo_root.join(name)`, or at `repo_root` itself when `name` is absent.
pub fn run(repo_root: &str, name: Option<&str>, format: OutputFormat) -> anyhow::Result<()> {
    let target: PathBuf = match name {
        Some(name) => Path::new(repo_root).join(name),
        None => Path::new(repo_root).to_path_buf(),
    };
    std::fs::create_dir_all(&target)?;
    let repo = Repo::init(target.clone())?;

    let report = InitReport {
        root: target.display().to_string(),
        format_version: jvs::FORMAT_VERSION,
        engine: repo.engine().to_string(),
    };

    if format.is_json() {
        OutputFormat::print_json(&report)?;
    } else {
        println!("Initialized jvs repository at {}", report.root);
        println!("  format version: {}", report.format_version);
        println!("  engine: {}", report.engine);
        println!();
        println!("Next: jvs snapshot -- take your first snapshot of `main`");
    }
    Ok(())
}
