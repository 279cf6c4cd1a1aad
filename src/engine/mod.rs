//! CoW engine abstraction (§4.4): three engines behind one `Clone(src, dst)`
//! operation, with deterministic auto-selection cached per repo root.
//!
//! Dispatch is a plain enum match rather than `dyn Trait` — there are only
//! three variants, known at compile time, and a match keeps call sites
//! monomorphic.

mod copy;
mod juicefs;
mod reflink;

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, OnceLock};

use crate::model::EngineKind;

/// Environment variable that overrides automatic engine selection (§4.4).
pub const ENV_SNAPSHOT_ENGINE: &str = "JVS_SNAPSHOT_ENGINE";

fn selection_cache() -> &'static Mutex<HashMap<PathBuf, EngineKind>> {
    static CACHE: OnceLock<Mutex<HashMap<PathBuf, EngineKind>>> = OnceLock::new();
    CACHE.get_or_init(|| Mutex::new(HashMap::new()))
}

/// Clone `src` (file, directory, or symlink tree) into `dst` using the
/// named engine. `dst` must not already exist.
///
/// # Errors
/// Propagates the underlying engine's I/O error.
pub fn clone_with(engine: EngineKind, src: &Path, dst: &Path) -> std::io::Result<()> {
    match engine {
        EngineKind::JuicefsClone => juicefs::clone_tree(src, dst),
        EngineKind::ReflinkCopy => reflink::clone_tree(src, dst),
        EngineKind::Copy => copy::clone_tree(src, dst),
    }
}

/// Resolve which engine to use for `repo_root`, honoring the env override
/// first and otherwise caching the auto-selected engine for the process
/// lifetime (§4.4).
///
/// `configured_override` is the repo config's `engine` field, consulted
/// when the environment variable is unset.
#[must_use]
pub fn select(repo_root: &Path, configured_override: Option<&str>) -> EngineKind {
    let env_value = std::env::var(ENV_SNAPSHOT_ENGINE).ok();
    if let Some(kind) = resolve_override(env_value.as_deref(), configured_override) {
        return kind;
    }

    let mut cache = selection_cache().lock().unwrap_or_else(|p| p.into_inner());
    if let Some(kind) = cache.get(repo_root) {
        return *kind;
    }

    let kind = auto_select(repo_root);
    cache.insert(repo_root.to_path_buf(), kind);
    kind
}

/// Pure priority logic for the override step: env var beats repo config,
/// each parsed independently. Split out from [`select`] so it is testable
/// without mutating process environment variables.
fn resolve_override(env_value: Option<&str>, configured: Option<&str>) -> Option<EngineKind> {
    if let Some(v) = env_value {
        if let Ok(kind) = v.parse::<EngineKind>() {
            return Some(kind);
        }
    }
    configured.and_then(|c| c.parse::<EngineKind>().ok())
}

/// Probe order: JuiceFS mount + CLI, then reflink, then the universal
/// `copy` fallback.
fn auto_select(repo_root: &Path) -> EngineKind {
    if juicefs::probe(repo_root) {
        return EngineKind::JuicefsClone;
    }
    let scratch = repo_root.join(".jvs").join("tmp");
    let _ = std::fs::create_dir_all(&scratch);
    if reflink::probe(&scratch) {
        return EngineKind::ReflinkCopy;
    }
    EngineKind::Copy
}

/// Clear the cached selection for `repo_root`. Exposed for tests and for
/// `doctor --repair-runtime`, which may need to force re-probing after an
/// environment change.
pub fn clear_cache(repo_root: &Path) {
    let mut cache = selection_cache().lock().unwrap_or_else(|p| p.into_inner());
    cache.remove(repo_root);
}
