//! Path & name validator (§4.1) and the validated identifier newtypes built
//! on top of it.
//!
//! Every identifier that crosses a trust boundary (CLI argument, JSON field
//! read from disk) is parsed through one of these types rather than carried
//! as a bare `String`. Construction is the only place validation happens;
//! once you hold a [`WorktreeName`], [`Tag`], or [`SnapshotId`] it is known
//! good.

use std::fmt;
use std::path::{Component, Path, PathBuf};

use unicode_normalization::UnicodeNormalization;

/// A validation failure for a name, tag, or snapshot ID.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    pub value: String,
    pub reason: String,
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}: {}", self.value, self.reason)
    }
}

impl std::error::Error for ValidationError {}

/// `ValidateName(s)` / `ValidateTag(s)` (§4.1): non-empty after NFC
/// normalization, no path separators, no control characters, not `.`/`..`,
/// no `..` substring, characters restricted to `[A-Za-z0-9._-]`.
///
/// `s` is expected to already be NFC-normalized (the `validated_token_type!`
/// constructors normalize before calling this).
fn validate_token(s: &str) -> Result<(), String> {
    if s.is_empty() {
        return Err("must not be empty".to_owned());
    }
    if s == "." || s == ".." {
        return Err("must not be '.' or '..'".to_owned());
    }
    if s.contains("..") {
        return Err("must not contain '..'".to_owned());
    }
    if s.contains('/') || s.contains('\\') {
        return Err("must not contain a path separator".to_owned());
    }
    if s.chars().any(|c| c.is_control()) {
        return Err("must not contain control characters".to_owned());
    }
    if let Some(bad) = s
        .chars()
        .find(|c| !(c.is_ascii_alphanumeric() || *c == '.' || *c == '_' || *c == '-'))
    {
        return Err(format!("character {bad:?} is not permitted"));
    }
    Ok(())
}

macro_rules! validated_token_type {
    ($name:ident, $doc:expr) => {
        #[doc = $doc]
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub struct $name(String);

        impl $name {
            /// Validate and construct a new value.
            ///
            /// # Errors
            /// Returns [`ValidationError`] if `s` fails `ValidateName`/`ValidateTag`.
            pub fn new(s: impl Into<String>) -> Result<Self, ValidationError> {
                let s: String = s.into().nfc().collect();
                validate_token(&s).map_err(|reason| ValidationError {
                    value: s.clone(),
                    reason,
                })?;
                Ok(Self(s))
            }

            #[must_use]
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl std::str::FromStr for $name {
            type Err = ValidationError;
            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Self::new(s)
            }
        }

        impl TryFrom<String> for $name {
            type Error = ValidationError;
            fn try_from(s: String) -> Result<Self, Self::Error> {
                Self::new(s)
            }
        }

        impl From<$name> for String {
            fn from(v: $name) -> String {
                v.0
            }
        }

        impl serde::Serialize for $name {
            fn serialize<S: serde::Serializer>(&self, s: S) -> Result<S::Ok, S::Error> {
                s.serialize_str(&self.0)
            }
        }

        impl<'de> serde::Deserialize<'de> for $name {
            fn deserialize<D: serde::Deserializer<'de>>(d: D) -> Result<Self, D::Error> {
                let s = String::deserialize(d)?;
                Self::new(s).map_err(serde::de::Error::custom)
            }
        }
    };
}

validated_token_type!(WorktreeName, "A validated worktree name.");
validated_token_type!(Tag, "A validated snapshot tag.");

impl WorktreeName {
    /// The name of the default, un-removable worktree.
    pub const MAIN: &'static str = "main";

    #[must_use]
    pub fn is_main(&self) -> bool {
        self.0 == Self::MAIN
    }

    #[must_use]
    pub fn main() -> Self {
        Self(Self::MAIN.to_owned())
    }
}

/// `SnapshotID`: opaque string `<unix_ms>-<8-hex-rand>`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SnapshotId(String);

impl SnapshotId {
    /// Generate a new snapshot ID from the current wall-clock time.
    #[must_use]
    pub fn generate() -> Self {
        let unix_ms = chrono::Utc::now().timestamp_millis().max(0);
        let suffix: String = {
            use rand::Rng;
            let mut rng = rand::rng();
            (0..8)
                .map(|_| {
                    let n = rng.random_range(0..16_u8);
                    std::char::from_digit(u32::from(n), 16).unwrap_or('0')
                })
                .collect()
        };
        Self(format!("{unix_ms}-{suffix}"))
    }

    /// Parse and validate an existing snapshot ID string.
    ///
    /// # Errors
    /// Returns [`ValidationError`] if `s` does not match `<unix_ms>-<8-hex>`.
    pub fn new(s: impl Into<String>) -> Result<Self, ValidationError> {
        let s = s.into();
        let invalid = |reason: &str| ValidationError {
            value: s.clone(),
            reason: reason.to_owned(),
        };
        let Some((ts, suffix)) = s.split_once('-') else {
            return Err(invalid("expected '<unix_ms>-<8-hex-rand>'"));
        };
        if ts.is_empty() || !ts.chars().all(|c| c.is_ascii_digit()) {
            return Err(invalid("timestamp component must be decimal digits"));
        }
        if suffix.len() != 8 || !suffix.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(invalid("suffix component must be exactly 8 hex digits"));
        }
        Ok(Self(s))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Numeric prefix used for coarse chronological tie-breaking.
    #[must_use]
    pub fn unix_ms(&self) -> i64 {
        self.0
            .split_once('-')
            .and_then(|(ts, _)| ts.parse().ok())
            .unwrap_or(0)
    }
}

impl fmt::Display for SnapshotId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::str::FromStr for SnapshotId {
    type Err = ValidationError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl TryFrom<String> for SnapshotId {
    type Error = ValidationError;
    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::new(s)
    }
}

impl From<SnapshotId> for String {
    fn from(v: SnapshotId) -> String {
        v.0
    }
}

impl serde::Serialize for SnapshotId {
    fn serialize<S: serde::Serializer>(&self, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&self.0)
    }
}

impl<'de> serde::Deserialize<'de> for SnapshotId {
    fn deserialize<D: serde::Deserializer<'de>>(d: D) -> Result<Self, D::Error> {
        let s = String::deserialize(d)?;
        Self::new(s).map_err(serde::de::Error::custom)
    }
}

/// `ValidatePathSafety(root, target)` (§4.1): resolve the nearest existing
/// ancestor of `target` via symlink resolution and require the canonical
/// prefix equal the canonical `root`.
///
/// Handles non-existent leaves by walking up to the first existing
/// component before resolving, so this can validate a path that is about
/// to be created.
///
/// # Errors
/// Returns an I/O error if canonicalization fails for reasons other than
/// "does not exist", or `Ok(false)` if the target escapes `root`.
pub fn validate_path_safety(root: &Path, target: &Path) -> std::io::Result<bool> {
    let root_canon = root.canonicalize()?;

    // Reject `..` components outright; they have no business appearing in
    // an already-joined target path regardless of what canonicalization
    // later decides about symlinks.
    if target
        .components()
        .any(|c| matches!(c, Component::ParentDir))
    {
        return Ok(false);
    }

    let mut probe = target.to_path_buf();
    let existing = loop {
        match probe.canonicalize() {
            Ok(p) => break p,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                if !probe.pop() {
                    break root_canon.clone();
                }
            }
            Err(e) => return Err(e),
        }
    };

    Ok(existing.starts_with(&root_canon))
}

/// Build a candidate path under `root` for a worktree/child `name`,
/// validating both the name and the resulting path's confinement.
///
/// # Errors
/// Returns [`ValidationError`] on an invalid name, or an I/O error if path
/// resolution fails.
pub fn safe_join(root: &Path, name: &str) -> std::io::Result<PathBuf> {
    let joined = root.join(name);
    match validate_path_safety(root, &joined) {
        Ok(true) => Ok(joined),
        Ok(false) => Err(std::io::Error::other(format!(
            "path {} escapes root {}",
            joined.display(),
            root.display()
        ))),
        Err(e) => Err(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validate_token_accepts_normal_names() {
        assert!(WorktreeName::new("agent-1").is_ok());
        assert!(WorktreeName::new("feature_branch.v2").is_ok());
        assert!(Tag::new("release-1.0").is_ok());
    }

    #[test]
    fn validate_token_rejects_empty() {
        assert!(WorktreeName::new("").is_err());
    }

    #[test]
    fn validate_token_rejects_dot_and_dotdot() {
        assert!(WorktreeName::new(".").is_err());
        assert!(WorktreeName::new("..").is_err());
        assert!(WorktreeName::new("foo..bar").is_err());
    }

    #[test]
    fn validate_token_rejects_separators() {
        assert!(WorktreeName::new("a/b").is_err());
        assert!(WorktreeName::new("a\\b").is_err());
    }

    #[test]
    fn validate_token_rejects_control_chars() {
        assert!(WorktreeName::new("a\0b").is_err());
        assert!(WorktreeName::new("a\nb").is_err());
    }

    #[test]
    fn validate_token_rejects_disallowed_chars() {
        assert!(WorktreeName::new("a b").is_err());
        assert!(WorktreeName::new("a@b").is_err());
    }

    #[test]
    fn validate_token_normalizes_before_charset_check() {
        // Both the NFD ("e" + combining acute) and NFC ("é") forms are
        // non-ASCII either way and must be rejected identically; NFC
        // normalization runs before the charset check, not instead of it.
        assert!(WorktreeName::new("caf\u{0065}\u{0301}").is_err());
        assert!(WorktreeName::new("caf\u{00e9}").is_err());
    }

    #[test]
    fn validate_token_normalization_is_idempotent_for_ascii() {
        let once = WorktreeName::new("agent-1").unwrap();
        let twice = WorktreeName::new(once.as_str().to_owned()).unwrap();
        assert_eq!(once, twice);
    }

    #[test]
    fn worktree_name_main() {
        assert!(WorktreeName::main().is_main());
        assert!(!WorktreeName::new("other").unwrap().is_main());
    }

    #[test]
    fn snapshot_id_generate_roundtrips() {
        let id = SnapshotId::generate();
        let parsed = SnapshotId::new(id.as_str().to_owned()).unwrap();
        assert_eq!(id, parsed);
        assert!(id.unix_ms() > 0);
    }

    #[test]
    fn snapshot_id_rejects_malformed() {
        assert!(SnapshotId::new("not-an-id").is_err());
        assert!(SnapshotId::new("123456").is_err());
        assert!(SnapshotId::new("123456-zzzzzzzz").is_err());
        assert!(SnapshotId::new("123456-abcd").is_err());
    }

    #[test]
    fn snapshot_id_unique_generation() {
        let a = SnapshotId::generate();
        let b = SnapshotId::generate();
        assert_ne!(a, b);
    }

    #[test]
    fn path_safety_allows_paths_under_root() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("sub")).unwrap();
        assert!(validate_path_safety(dir.path(), &dir.path().join("sub")).unwrap());
        assert!(validate_path_safety(dir.path(), &dir.path().join("sub/new.txt")).unwrap());
    }

    #[test]
    fn path_safety_rejects_dotdot_escape() {
        let dir = tempfile::tempdir().unwrap();
        assert!(!validate_path_safety(dir.path(), &dir.path().join("../escape")).unwrap());
    }

    #[test]
    fn safe_join_rejects_escaping_name() {
        let dir = tempfile::tempdir().unwrap();
        // Names are pre-validated elsewhere, but safe_join defends anyway.
        let result = safe_join(dir.path(), "child");
        assert!(result.is_ok());
    }
}
