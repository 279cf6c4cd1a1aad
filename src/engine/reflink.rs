//! `reflink-copy` engine: per-file FICLONE/clonefile, directory recursion,
//! per-file fallback to byte copy (§4.4).
//!
//! Directory recursion happens in Rust; each regular file is handed to
//! `cp --reflink=always` individually so a failure (e.g. crossing onto a
//! non-CoW filesystem partway through a tree) degrades to a byte copy for
//! that one file rather than the whole operation.

use std::fs;
use std::path::Path;
use std::process::{Command, Stdio};

use super::copy;

/// Recursively clone `src` into `dst` using reflinks where the filesystem
/// supports them, falling back per file to a byte copy.
///
/// # Errors
/// Propagates I/O errors other than a reflink-specific failure (those are
/// silently downgraded to a byte copy).
pub fn clone_tree(src: &Path, dst: &Path) -> std::io::Result<()> {
    let meta = fs::symlink_metadata(src)?;
    if meta.is_dir() {
        fs::create_dir_all(dst)?;
        for entry in fs::read_dir(src)? {
            let entry = entry?;
            let name = entry.file_name();
            clone_tree(&src.join(&name), &dst.join(&name))?;
        }
        Ok(())
    } else if meta.file_type().is_symlink() {
        copy::clone_tree(src, dst)
    } else {
        clone_file_reflink(src, dst)
    }
}

fn clone_file_reflink(src: &Path, dst: &Path) -> std::io::Result<()> {
    let status = Command::new("cp")
        .arg("--reflink=always")
        .arg(src)
        .arg(dst)
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status();

    match status {
        Ok(s) if s.success() => Ok(()),
        _ => {
            let _ = fs::remove_file(dst);
            copy::clone_tree(src, dst)
        }
    }
}

/// Probe whether reflinks are usable in `dir` by attempting a tiny clone
/// in a scratch subdirectory, per §4.4's selection algorithm.
#[must_use]
pub fn probe(dir: &Path) -> bool {
    let Ok(probe_dir) = tempfile::tempdir_in(dir) else {
        return false;
    };
    let src = probe_dir.path().join("probe-src");
    let dst = probe_dir.path().join("probe-dst");
    if fs::write(&src, b"x").is_err() {
        return false;
    }
    let status = Command::new("cp")
        .arg("--reflink=always")
        .arg(&src)
        .arg(&dst)
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status();
    matches!(status, Ok(s) if s.success())
}
