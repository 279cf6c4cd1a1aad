//! `copy` engine: universal recursive deep-copy fallback (§4.4).
//!
//! Always works, regardless of filesystem. Symlinks are recreated as
//! symlinks (never followed); regular file mtimes are copied after content;
//! directory mtimes are not preserved (matching the portable-metadata
//! declaration: modes yes, mtime yes for files, owner/xattrs/ACLs no).

use std::fs;
use std::path::Path;

/// Recursively copy `src` into `dst`. `dst` must not already exist.
///
/// # Errors
/// Propagates any I/O error encountered while walking or copying.
pub fn clone_tree(src: &Path, dst: &Path) -> std::io::Result<()> {
    let meta = fs::symlink_metadata(src)?;
    if meta.is_dir() {
        clone_dir(src, dst)
    } else if meta.file_type().is_symlink() {
        clone_symlink(src, dst)
    } else {
        clone_file(src, dst)
    }
}

fn clone_dir(src: &Path, dst: &Path) -> std::io::Result<()> {
    fs::create_dir_all(dst)?;
    for entry in fs::read_dir(src)? {
        let entry = entry?;
        let name = entry.file_name();
        clone_tree(&src.join(&name), &dst.join(&name))?;
    }
    Ok(())
}

fn clone_file(src: &Path, dst: &Path) -> std::io::Result<()> {
    fs::copy(src, dst)?;
    if let Ok(meta) = fs::metadata(src) {
        let mtime = filetime::FileTime::from_last_modification_time(&meta);
        let _ = filetime::set_file_mtime(dst, mtime);
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mode = meta.permissions().mode() & crate::hash::MODE_MASK;
            let _ = fs::set_permissions(dst, fs::Permissions::from_mode(mode));
        }
    }
    Ok(())
}

#[cfg(unix)]
fn clone_symlink(src: &Path, dst: &Path) -> std::io::Result<()> {
    let target = fs::read_link(src)?;
    std::os::unix::fs::symlink(target, dst)
}

#[cfg(not(unix))]
fn clone_symlink(src: &Path, dst: &Path) -> std::io::Result<()> {
    let target = fs::read_link(src)?;
    std::os::windows::fs::symlink_file(target, dst)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn copies_plain_file() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("a.txt");
        let dst = dir.path().join("b.txt");
        fs::write(&src, b"hello").unwrap();
        clone_tree(&src, &dst).unwrap();
        assert_eq!(fs::read(&dst).unwrap(), b"hello");
    }

    #[test]
    fn copies_directory_tree_recursively() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("src");
        fs::create_dir_all(src.join("sub")).unwrap();
        fs::write(src.join("a.txt"), b"one").unwrap();
        fs::write(src.join("sub/b.txt"), b"two").unwrap();
        let dst = dir.path().join("dst");
        clone_tree(&src, &dst).unwrap();
        assert_eq!(fs::read(dst.join("a.txt")).unwrap(), b"one");
        assert_eq!(fs::read(dst.join("sub/b.txt")).unwrap(), b"two");
    }

    #[test]
    fn copies_empty_directories() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("src");
        fs::create_dir_all(src.join("empty")).unwrap();
        let dst = dir.path().join("dst");
        clone_tree(&src, &dst).unwrap();
        assert!(dst.join("empty").is_dir());
    }

    #[cfg(unix)]
    #[test]
    fn preserves_symlinks_without_following() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("src");
        fs::create_dir_all(&src).unwrap();
        fs::write(src.join("target.txt"), b"data").unwrap();
        std::os::unix::fs::symlink("target.txt", src.join("link")).unwrap();
        let dst = dir.path().join("dst");
        clone_tree(&src, &dst).unwrap();
        let link_meta = fs::symlink_metadata(dst.join("link")).unwrap();
        assert!(link_meta.file_type().is_symlink());
        assert_eq!(fs::read_link(dst.join("link")).unwrap(), Path::new("target.txt"));
    }
}
