//! Repository configuration (`.jvs/config.toml`).
//!
//! Distinct from a caller's own business config (YAML load/merge/cache for
//! e.g. a CI pipeline is someone else's concern) — this is the small,
//! internal TOML file that seeds defaults for the CoW engine, retention
//! policy, and compression at `init` time. Missing file → all defaults, not
//! an error.

use std::fmt;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::model::RetentionPolicy;

/// Top-level repository configuration.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
#[serde(deny_unknown_fields, default)]
pub struct RepoConfig {
    /// Overrides automatic CoW engine selection (§4.4) when set. Valid
    /// values: `"juicefs-clone"`, `"reflink-copy"`, `"copy"`. Equivalent to
    /// setting `JVS_SNAPSHOT_ENGINE`, but persisted with the repo; the
    /// environment variable takes precedence when both are set.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub engine: Option<String>,

    pub retention: RetentionPolicy,

    /// Compression is specified as a contract, not a shipped storage
    /// detail (§1 Out of scope); this stays `false` and has no effect on
    /// the snapshot creator until a future release implements it.
    pub compress: bool,
}

impl Default for RepoConfig {
    fn default() -> Self {
        Self {
            engine: None,
            retention: RetentionPolicy::default(),
            compress: false,
        }
    }
}

/// Error loading a repository configuration file.
#[derive(Debug)]
pub struct ConfigError {
    pub path: Option<std::path::PathBuf>,
    pub message: String,
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(p) = &self.path {
            write!(f, "{}: {}", p.display(), self.message)
        } else {
            write!(f, "config error: {}", self.message)
        }
    }
}

impl std::error::Error for ConfigError {}

impl RepoConfig {
    /// Load configuration from a TOML file.
    ///
    /// - If the file does not exist, returns all defaults (not an error).
    /// - If the file exists but contains invalid TOML or unknown fields,
    ///   returns a [`ConfigError`] with line-level detail.
    ///
    /// # Errors
    /// Returns `ConfigError` on I/O errors (other than not-found) or parse
    /// errors.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let contents = match std::fs::read_to_string(path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Self::default()),
            Err(e) => {
                return Err(ConfigError {
                    path: Some(path.to_owned()),
                    message: format!("could not read file: {e}"),
                });
            }
        };
        Self::parse(&contents).map_err(|mut e| {
            e.path = Some(path.to_owned());
            e
        })
    }

    /// Parse configuration from a TOML string.
    ///
    /// # Errors
    /// Returns `ConfigError` on invalid TOML or unknown fields.
    pub fn parse(toml_str: &str) -> Result<Self, ConfigError> {
        toml::from_str(toml_str).map_err(|e| {
            let mut message = e.message().to_owned();
            if let Some(span) = e.span() {
                let line = toml_str[..span.start].chars().filter(|&c| c == '\n').count() + 1;
                message = format!("line {line}: {message}");
            }
            ConfigError {
                path: None,
                message,
            }
        })
    }

    /// Serialize to pretty TOML, suitable for writing at `init` time.
    ///
    /// # Errors
    /// Returns an error if the config cannot be serialized (should not
    /// happen for a well-formed `RepoConfig`).
    pub fn to_toml_string(&self) -> Result<String, toml::ser::Error> {
        toml::to_string_pretty(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_all_fields() {
        let c = RepoConfig::default();
        assert_eq!(c.engine, None);
        assert_eq!(c.retention.keep_min_snapshots, 0);
        assert!(!c.compress);
    }

    #[test]
    fn load_missing_file_returns_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let c = RepoConfig::load(&dir.path().join("config.toml")).unwrap();
        assert_eq!(c, RepoConfig::default());
    }

    #[test]
    fn load_existing_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            "engine = \"reflink-copy\"\ncompress = false\n\n[retention]\nkeep_min_age_secs = 86400\nkeep_min_snapshots = 5\n",
        )
        .unwrap();
        let c = RepoConfig::load(&path).unwrap();
        assert_eq!(c.engine.as_deref(), Some("reflink-copy"));
        assert_eq!(c.retention.keep_min_snapshots, 5);
    }

    #[test]
    fn load_invalid_file_shows_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.toml");
        std::fs::write(&path, "not valid toml +++ [[[").unwrap();
        let err = RepoConfig::load(&path).unwrap_err();
        assert_eq!(err.path.as_deref(), Some(path.as_path()));
    }

    #[test]
    fn unknown_field_is_rejected() {
        let err = RepoConfig::parse("bogus_field = true").unwrap_err();
        assert!(err.message.contains("bogus_field") || err.message.contains("unknown"));
    }

    #[test]
    fn round_trips_through_to_toml_string() {
        let c = RepoConfig {
            engine: Some("copy".to_owned()),
            retention: RetentionPolicy {
                keep_min_age_secs: 3600,
                keep_min_snapshots: 2,
            },
            compress: false,
        };
        let s = c.to_toml_string().unwrap();
        let parsed = RepoConfig::parse(&s).unwrap();
        assert_eq!(parsed, c);
    }
}
