//! Filesystem durability primitives (§4.5).
//!
//! `AtomicWrite` and `RenameAndSync` are the only primitives that call
//! `fsync`; every higher layer goes through them rather than touching
//! `fsync` directly, keeping the durability contract in one auditable
//! place (§9).

use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use rand::Rng;

fn rand_suffix() -> String {
    let mut rng = rand::rng();
    (0..8)
        .map(|_| {
            let n = rng.random_range(0..16_u8);
            std::char::from_digit(u32::from(n), 16).unwrap_or('0')
        })
        .collect()
}

fn fsync_dir(dir: &Path) -> std::io::Result<()> {
    let f = File::open(dir)?;
    f.sync_all()
}

/// `AtomicWrite(path, bytes, mode)` (§4.5): write `path.tmp.<rand>`, fsync
/// the file, rename to `path`, fsync the parent directory.
///
/// # Errors
/// Propagates I/O errors from any step; the temp file is best-effort
/// removed if a later step fails.
#[cfg(unix)]
pub fn atomic_write(path: &Path, bytes: &[u8], mode: u32) -> std::io::Result<()> {
    use std::os::unix::fs::PermissionsExt;

    let parent = path.parent().unwrap_or_else(|| Path::new("."));
    fs::create_dir_all(parent)?;
    let tmp = parent.join(format!(
        "{}.tmp.{}",
        path.file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default(),
        rand_suffix()
    ));

    let write_result = (|| -> std::io::Result<()> {
        let mut f = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .mode(mode)
            .open(&tmp)?;
        f.write_all(bytes)?;
        f.sync_all()?;
        fs::set_permissions(&tmp, fs::Permissions::from_mode(mode))?;
        fs::rename(&tmp, path)?;
        fsync_dir(parent)?;
        Ok(())
    })();

    if write_result.is_err() {
        let _ = fs::remove_file(&tmp);
    }
    write_result
}

#[cfg(not(unix))]
pub fn atomic_write(path: &Path, bytes: &[u8], _mode: u32) -> std::io::Result<()> {
    let parent = path.parent().unwrap_or_else(|| Path::new("."));
    fs::create_dir_all(parent)?;
    let tmp = parent.join(format!(
        "{}.tmp.{}",
        path.file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default(),
        rand_suffix()
    ));
    let write_result = (|| -> std::io::Result<()> {
        let mut f = File::create(&tmp)?;
        f.write_all(bytes)?;
        f.sync_all()?;
        fs::rename(&tmp, path)?;
        Ok(())
    })();
    if write_result.is_err() {
        let _ = fs::remove_file(&tmp);
    }
    write_result
}

/// `RenameAndSync(src, dst)` (§4.5): rename `src` to `dst`, fsync the
/// parent of `dst`.
///
/// # Errors
/// Propagates I/O errors from the rename or the fsync.
pub fn rename_and_sync(src: &Path, dst: &Path) -> std::io::Result<()> {
    fs::rename(src, dst)?;
    let parent = dst.parent().unwrap_or_else(|| Path::new("."));
    fsync_dir(parent)
}

/// `FsyncTree(dir)` (§4.5): post-order walk, fsync every file and
/// directory. Tolerates a directory that vanishes mid-walk (used on the
/// `.tmp` snapshot tree, which is only ever touched by this process).
///
/// # Errors
/// Propagates I/O errors other than "not found" (which is swallowed,
/// since a vanished entry has nothing left to sync).
pub fn fsync_tree(dir: &Path) -> std::io::Result<()> {
    if !dir.exists() {
        return Ok(());
    }
    let entries = match fs::read_dir(dir) {
        Ok(e) => e,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
        Err(e) => return Err(e),
    };

    for entry in entries {
        let entry = match entry {
            Ok(e) => e,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => continue,
            Err(e) => return Err(e),
        };
        let path = entry.path();
        let file_type = entry.file_type()?;
        if file_type.is_dir() {
            fsync_tree(&path)?;
        } else if file_type.is_symlink() {
            // Symlinks have no fsync-able file descriptor of their own;
            // the directory entry containing them is synced below.
        } else {
            match File::open(&path) {
                Ok(f) => f.sync_all()?,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(e),
            }
        }
    }

    match File::open(dir) {
        Ok(f) => f.sync_all()?,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => return Err(e),
    }
    Ok(())
}

/// Generate a sibling temp path for `path` with the given suffix tag
/// (e.g. `"tmp"`, `"restore-tmp"`, `"restore-backup"`), following the
/// `<name>.<tag>-<rand>` convention used throughout the snapshot creator
/// and restorer.
#[must_use]
pub fn sibling_temp_path(path: &Path, tag: &str) -> PathBuf {
    let parent = path.parent().unwrap_or_else(|| Path::new("."));
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    parent.join(format!("{name}.{tag}-{}", rand_suffix()))
}
