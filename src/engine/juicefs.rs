//! `juicefs-clone` engine: metadata-only CoW via the `juicefs clone` binary
//! (§4.4).
//!
//! JuiceFS exposes a `juicefs clone <src> <dst>` subcommand that clones a
//! file or directory inside a JuiceFS mount without copying data blocks.
//! Unsupported outside a JuiceFS mount — the caller must probe first.

use std::path::Path;
use std::process::{Command, Stdio};

/// Clone `src` to `dst` via the `juicefs clone` CLI.
///
/// # Errors
/// Returns an error if the `juicefs` binary is missing or the clone
/// subcommand fails (e.g. `src`/`dst` are not inside a JuiceFS mount).
pub fn clone_tree(src: &Path, dst: &Path) -> std::io::Result<()> {
    let output = Command::new("juicefs")
        .arg("clone")
        .arg(src)
        .arg(dst)
        .stdout(Stdio::null())
        .stderr(Stdio::piped())
        .output()?;
    if output.status.success() {
        Ok(())
    } else {
        let stderr = String::from_utf8_lossy(&output.stderr).trim().to_owned();
        Err(std::io::Error::other(format!(
            "juicefs clone failed: {stderr}"
        )))
    }
}

/// Probe for a usable `juicefs` CLI and an active mount covering `dir`.
#[must_use]
pub fn probe(dir: &Path) -> bool {
    let version_ok = Command::new("juicefs")
        .arg("version")
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .is_ok_and(|s| s.success());
    if !version_ok {
        return false;
    }
    mount_covers(dir)
}

#[cfg(target_os = "linux")]
fn mount_covers(dir: &Path) -> bool {
    let Ok(canon) = dir.canonicalize() else {
        return false;
    };
    let Ok(mounts) = std::fs::read_to_string("/proc/mounts") else {
        return false;
    };
    mounts.lines().any(|line| {
        let mut fields = line.split_whitespace();
        let _device = fields.next();
        let Some(mount_point) = fields.next() else {
            return false;
        };
        let Some(fstype) = fields.next() else {
            return false;
        };
        fstype.contains("fuse.juicefs") && canon.starts_with(mount_point)
    })
}

#[cfg(not(target_os = "linux"))]
fn mount_covers(_dir: &Path) -> bool {
    false
}
