pub mod diff;
pub mod doctor;
pub mod gc;
pub mod history;
pub mod info;
pub mod init;
pub mod restore;
pub mod snapshot;
pub mod verify;
pub mod worktree;

use jvs::Repo;

/// Resolve a worktree name argument into a validated [`jvs::ids::WorktreeName`].
fn worktree_name(raw: &str) -> anyhow::Result<jvs::ids::WorktreeName> {
    jvs::ids::WorktreeName::new(raw)
        .map_err(jvs::JvsError::from)
        .map_err(anyhow::Error::from)
}

/// Resolve a snapshot reference (full ID, short prefix, tag, or note
/// substring) to a verified descriptor.
fn resolve_snapshot(repo: &Repo, reference: &str) -> anyhow::Result<jvs::model::Descriptor> {
    Ok(jvs::catalog::find_one(repo, reference)?)
}
