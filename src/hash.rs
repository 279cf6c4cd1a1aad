//! Hash & integrity kernel (§4.3).
//!
//! Three hashes share one SHA-256 primitive: the payload root hash (a
//! deterministic walk of a materialized snapshot tree), the descriptor
//! checksum, and the audit record hash. Both of the latter are computed
//! over the canonical JSON encoding ([`crate::canon`]) of their subject with
//! specific fields omitted.

use std::collections::BTreeMap;
use std::fs;
use std::io::Read;
use std::os::unix::fs::{MetadataExt, PermissionsExt};
use std::path::Path;

use serde::Serialize;
use sha2::{Digest, Sha256};
use unicode_normalization::UnicodeNormalization;

/// Portable permission-bit mask applied to file modes before hashing.
///
/// Owner/mtime are never hashed; only the permission bits survive.
pub(crate) const MODE_MASK: u32 = 0o777;

/// SHA-256 of an empty byte string, hex-encoded. Also the payload root hash
/// of an empty snapshot (§8 boundary behavior).
#[must_use]
pub fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}

/// Streaming SHA-256 of a file's content, hex-encoded.
///
/// # Errors
/// Propagates I/O errors from opening or reading the file.
pub fn sha256_file(path: &Path) -> std::io::Result<String> {
    let mut file = fs::File::open(path)?;
    let mut hasher = Sha256::new();
    let mut buf = [0_u8; 64 * 1024];
    loop {
        let n = file.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(format!("{:x}", hasher.finalize()))
}

/// One entry in a payload tree walk, keyed by NFC-normalized relative path
/// using `/` as separator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TreeEntry {
    File { mode: u32, size: u64, hash: String },
    Symlink { hash: String },
    Dir,
}

impl TreeEntry {
    /// The `<kind>:<rel>:...` record emitted for payload root hashing.
    fn record_line(&self, rel: &str) -> String {
        match self {
            Self::File { mode, size, hash } => {
                format!("file:{rel}:{mode:o}:{size}:{hash}")
            }
            Self::Symlink { hash } => format!("symlink:{rel}:{hash}"),
            Self::Dir => format!("dir:{rel}::"),
        }
    }
}

/// Walk `root` (excluding a top-level `.READY` marker) and return a sorted
/// map from NFC-normalized, `/`-separated relative path to [`TreeEntry`].
///
/// # Errors
/// Propagates I/O errors encountered while walking or hashing.
pub fn walk_tree(root: &Path) -> std::io::Result<BTreeMap<String, TreeEntry>> {
    let mut out = BTreeMap::new();
    if root.is_dir() {
        walk_inner(root, root, &mut out)?;
    }
    Ok(out)
}

fn walk_inner(
    root: &Path,
    dir: &Path,
    out: &mut BTreeMap<String, TreeEntry>,
) -> std::io::Result<()> {
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        let file_type = entry.file_type()?;

        let rel = path
            .strip_prefix(root)
            .unwrap_or(&path)
            .to_string_lossy()
            .nfc()
            .collect::<String>()
            .replace(std::path::MAIN_SEPARATOR, "/");

        if rel == ".READY" && path.parent() == Some(root) {
            continue;
        }

        if file_type.is_symlink() {
            let target = fs::read_link(&path)?;
            let hash = sha256_hex(target.to_string_lossy().as_bytes());
            out.insert(rel, TreeEntry::Symlink { hash });
        } else if file_type.is_dir() {
            out.insert(rel.clone(), TreeEntry::Dir);
            walk_inner(root, &path, out)?;
        } else {
            let meta = fs::symlink_metadata(&path)?;
            let mode = meta.permissions().mode() & MODE_MASK;
            let size = meta.size();
            let hash = sha256_file(&path)?;
            out.insert(rel, TreeEntry::File { mode, size, hash });
        }
    }
    Ok(())
}

/// Payload root hash (§4.3): SHA-256 of `\n`-joined, byte-sorted `<kind>:...`
/// records over the materialized tree, excluding `.READY`.
///
/// # Errors
/// Propagates I/O errors from the underlying walk.
pub fn payload_root_hash(root: &Path) -> std::io::Result<String> {
    let tree = walk_tree(root)?;
    let mut lines: Vec<String> = tree.iter().map(|(rel, e)| e.record_line(rel)).collect();
    // `walk_tree` already returns entries in byte-sorted path order via
    // BTreeMap; `lines` inherits that order, so no extra sort is needed.
    // Kept explicit (cheap, already-sorted) for readers scanning this fn.
    lines.sort();
    let joined = lines.join("\n");
    Ok(sha256_hex(joined.as_bytes()))
}

/// Payload root hash over an explicit, caller-chosen subset of relative
/// paths (used for partial snapshots). Each path's subtree is included.
///
/// # Errors
/// Propagates I/O errors from walking the selected subtrees.
pub fn payload_root_hash_partial(
    root: &Path,
    rel_paths: &[String],
) -> std::io::Result<String> {
    let mut combined = BTreeMap::new();
    for rel in rel_paths {
        let abs = root.join(rel);
        if abs.is_dir() {
            let mut sub = BTreeMap::new();
            walk_inner(root, &abs, &mut sub)?;
            combined.extend(sub);
            combined.insert(rel.clone(), TreeEntry::Dir);
        } else {
            let meta = fs::symlink_metadata(&abs)?;
            if meta.file_type().is_symlink() {
                let target = fs::read_link(&abs)?;
                let hash = sha256_hex(target.to_string_lossy().as_bytes());
                combined.insert(rel.clone(), TreeEntry::Symlink { hash });
            } else {
                let mode = meta.permissions().mode() & MODE_MASK;
                let size = meta.size();
                let hash = sha256_file(&abs)?;
                combined.insert(rel.clone(), TreeEntry::File { mode, size, hash });
            }
        }
    }
    let mut lines: Vec<String> = combined.iter().map(|(rel, e)| e.record_line(rel)).collect();
    lines.sort();
    Ok(sha256_hex(lines.join("\n").as_bytes()))
}

/// Descriptor checksum / audit record hash: SHA-256 of the canonical JSON
/// of `value` with the fields named in `omit` removed from the top-level
/// object first.
///
/// # Errors
/// Returns an error if `value` cannot be converted to a JSON object, or is
/// not an object at all.
pub fn checksum_omitting<T: Serialize>(
    value: &T,
    omit: &[&str],
) -> Result<String, serde_json::Error> {
    let mut v = serde_json::to_value(value)?;
    if let Some(map) = v.as_object_mut() {
        for key in omit {
            map.remove(*key);
        }
    }
    let bytes = crate::canon::to_canonical_bytes(&v)?;
    Ok(sha256_hex(&bytes))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::os::unix::fs::symlink;

    #[test]
    fn sha256_hex_of_empty_matches_known_constant() {
        // echo -n "" | sha256sum
        assert_eq!(
            sha256_hex(b""),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }

    #[test]
    fn empty_dir_has_deterministic_empty_hash() {
        let dir = tempfile::tempdir().unwrap();
        let hash = payload_root_hash(dir.path()).unwrap();
        assert_eq!(hash, sha256_hex(b""));
    }

    #[test]
    fn walk_tree_includes_files_dirs_symlinks() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("sub")).unwrap();
        std::fs::write(dir.path().join("sub/a.txt"), b"hello").unwrap();
        symlink("a.txt", dir.path().join("sub/link")).unwrap();

        let tree = walk_tree(dir.path()).unwrap();
        assert!(matches!(tree.get("sub"), Some(TreeEntry::Dir)));
        assert!(matches!(tree.get("sub/a.txt"), Some(TreeEntry::File { .. })));
        assert!(matches!(tree.get("sub/link"), Some(TreeEntry::Symlink { .. })));
    }

    #[test]
    fn ready_marker_is_excluded_at_root() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(".READY"), b"{}").unwrap();
        std::fs::write(dir.path().join("a.txt"), b"x").unwrap();

        let with_ready = payload_root_hash(dir.path()).unwrap();
        std::fs::remove_file(dir.path().join(".READY")).unwrap();
        let without_ready = payload_root_hash(dir.path()).unwrap();
        assert_eq!(with_ready, without_ready);
    }

    #[test]
    fn hash_is_deterministic_across_runs() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.txt"), b"hello").unwrap();
        std::fs::create_dir(dir.path().join("b")).unwrap();

        let h1 = payload_root_hash(dir.path()).unwrap();
        let h2 = payload_root_hash(dir.path()).unwrap();
        assert_eq!(h1, h2);
    }

    #[test]
    fn hash_changes_when_content_changes() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.txt"), b"hello").unwrap();
        let h1 = payload_root_hash(dir.path()).unwrap();

        std::fs::write(dir.path().join("a.txt"), b"world").unwrap();
        let h2 = payload_root_hash(dir.path()).unwrap();
        assert_ne!(h1, h2);
    }

    #[test]
    fn hardlinks_hash_as_separate_files() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.txt"), b"same").unwrap();
        std::fs::hard_link(dir.path().join("a.txt"), dir.path().join("b.txt")).unwrap();

        let tree = walk_tree(dir.path()).unwrap();
        assert_eq!(tree.len(), 2);
        assert!(tree.contains_key("a.txt"));
        assert!(tree.contains_key("b.txt"));
    }

    #[test]
    fn checksum_omitting_excludes_named_fields() {
        #[derive(Serialize)]
        struct Descriptor {
            snapshot_id: String,
            descriptor_checksum: String,
            integrity_state: String,
        }
        let a = Descriptor {
            snapshot_id: "1-aaaaaaaa".to_owned(),
            descriptor_checksum: "deadbeef".to_owned(),
            integrity_state: "verified".to_owned(),
        };
        let b = Descriptor {
            snapshot_id: "1-aaaaaaaa".to_owned(),
            descriptor_checksum: "other-value".to_owned(),
            integrity_state: "tampered".to_owned(),
        };
        let ca = checksum_omitting(&a, &["descriptor_checksum", "integrity_state"]).unwrap();
        let cb = checksum_omitting(&b, &["descriptor_checksum", "integrity_state"]).unwrap();
        assert_eq!(ca, cb);
    }

    #[test]
    fn checksum_omitting_detects_other_field_changes() {
        #[derive(Serialize)]
        struct Descriptor {
            note: String,
            descriptor_checksum: String,
        }
        let a = Descriptor {
            note: "first".to_owned(),
            descriptor_checksum: "x".to_owned(),
        };
        let b = Descriptor {
            note: "second".to_owned(),
            descriptor_checksum: "x".to_owned(),
        };
        let ca = checksum_omitting(&a, &["descriptor_checksum"]).unwrap();
        let cb = checksum_omitting(&b, &["descriptor_checksum"]).unwrap();
        assert_ne!(ca, cb);
    }

    #[test]
    fn partial_hash_includes_only_selected_paths() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.txt"), b"a").unwrap();
        std::fs::write(dir.path().join("b.txt"), b"b").unwrap();
        std::fs::create_dir(dir.path().join("sub")).unwrap();
        std::fs::write(dir.path().join("sub/c.txt"), b"c").unwrap();

        let only_a = payload_root_hash_partial(dir.path(), &["a.txt".to_owned()]).unwrap();
        let only_b = payload_root_hash_partial(dir.path(), &["b.txt".to_owned()]).unwrap();
        assert_ne!(only_a, only_b);

        let sub = payload_root_hash_partial(dir.path(), &["sub".to_owned()]).unwrap();
        let full_sub_only = {
            let tmp = tempfile::tempdir().unwrap();
            std::fs::create_dir(tmp.path().join("sub")).unwrap();
            std::fs::write(tmp.path().join("sub/c.txt"), b"c").unwrap();
            payload_root_hash(tmp.path()).unwrap()
        };
        assert_eq!(sub, full_sub_only);
    }
}
