//! Repository root and on-disk layout (§6).
//!
//! ```text
//! <repo_root>/
//! ├── .jvs/
//! │   ├── repo_id
//! │   ├── format_version
//! │   ├── descriptors/<id>.json
//! │   ├── snapshots/<id>/
//! │   ├── snapshots/<id>.tmp/
//! │   ├── intents/<id>.json
//! │   ├── worktrees/<name>/config.json
//! │   ├── audit/audit.jsonl
//! │   ├── pins/<id>.json
//! │   ├── gc/<plan_id>.json
//! │   └── gc/tombstones/<id>.json
//! ├── main/
//! └── worktrees/<name>/
//! ```

use std::path::{Path, PathBuf};

use rand::Rng;

use crate::audit::AuditLog;
use crate::config::RepoConfig;
use crate::error::{IoContext, JvsError};
use crate::fsutil;
use crate::ids::WorktreeName;
use crate::model::WorktreeConfig;

/// A handle to a JVS repository rooted at a directory.
pub struct Repo {
    root: PathBuf,
    config: RepoConfig,
}

impl Repo {
    /// Open an existing repository at `root`.
    ///
    /// # Errors
    /// Returns [`JvsError::NotFound`] if `.jvs/` does not exist, or
    /// [`JvsError::FormatUnsupported`] if its recorded format version is
    /// newer than this implementation understands.
    pub fn open(root: impl Into<PathBuf>) -> Result<Self, JvsError> {
        let root = root.into();
        if !root.join(".jvs").is_dir() {
            return Err(JvsError::NotFound {
                what: "repository".to_owned(),
                reference: root.display().to_string(),
            });
        }
        let version = read_format_version(&root)?;
        if version > FORMAT_VERSION {
            return Err(JvsError::FormatUnsupported {
                found: version,
                supported: FORMAT_VERSION,
            });
        }
        let config = RepoConfig::load(&root.join(".jvs").join("config.toml"))
            .map_err(|e| JvsError::Io {
                context: "loading repo config".to_owned(),
                source: std::io::Error::other(e.to_string()),
            })?;
        Ok(Self { root, config })
    }

    /// Initialize a new repository at `root`, creating `.jvs/` and the
    /// `main` worktree. Idempotent if `.jvs/` already exists and is a
    /// repository of this format version.
    ///
    /// # Errors
    /// Returns an I/O error if the layout cannot be created.
    pub fn init(root: impl Into<PathBuf>) -> Result<Self, JvsError> {
        let root = root.into();
        if root.join(".jvs").is_dir() {
            return Self::open(root);
        }

        std::fs::create_dir_all(root.join(".jvs"))
            .io_context("creating .jvs directory")?;
        for sub in [
            "descriptors",
            "snapshots",
            "intents",
            "worktrees",
            "audit",
            "pins",
            "gc",
            "gc/tombstones",
            "tmp",
        ] {
            std::fs::create_dir_all(root.join(".jvs").join(sub))
                .io_context("creating .jvs subdirectory")?;
        }
        fsutil::atomic_write(&root.join(".jvs").join("repo_id"), generate_repo_id().as_bytes(), 0o644)
            .io_context("writing repo_id")?;
        fsutil::atomic_write(
            &root.join(".jvs").join("format_version"),
            FORMAT_VERSION.to_string().as_bytes(),
            0o644,
        )
        .io_context("writing format_version")?;

        let config = RepoConfig::default();
        let toml = config
            .to_toml_string()
            .map_err(|e| JvsError::Io {
                context: "serializing default config".to_owned(),
                source: std::io::Error::other(e.to_string()),
            })?;
        fsutil::atomic_write(&root.join(".jvs").join("config.toml"), toml.as_bytes(), 0o644)
            .io_context("writing config.toml")?;

        let repo = Self { root, config };
        repo.create_main_worktree()?;
        Ok(repo)
    }

    fn create_main_worktree(&self) -> Result<(), JvsError> {
        let name = WorktreeName::main();
        std::fs::create_dir_all(self.worktree_payload_path(&name))
            .io_context("creating main worktree payload directory")?;
        let cfg = WorktreeConfig {
            name: name.clone(),
            created_at: chrono::Utc::now(),
            base_snapshot_id: None,
            head_snapshot_id: String::new(),
            latest_snapshot_id: String::new(),
        };
        self.write_worktree_config(&cfg)
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    #[must_use]
    pub fn config(&self) -> &RepoConfig {
        &self.config
    }

    #[must_use]
    pub fn jvs_dir(&self) -> PathBuf {
        self.root.join(".jvs")
    }

    #[must_use]
    pub fn descriptor_path(&self, id: &str) -> PathBuf {
        self.jvs_dir().join("descriptors").join(format!("{id}.json"))
    }

    #[must_use]
    pub fn snapshot_payload_path(&self, id: &str) -> PathBuf {
        self.jvs_dir().join("snapshots").join(id)
    }

    #[must_use]
    pub fn snapshot_tmp_path(&self, id: &str) -> PathBuf {
        self.jvs_dir().join("snapshots").join(format!("{id}.tmp"))
    }

    #[must_use]
    pub fn intent_path(&self, id: &str) -> PathBuf {
        self.jvs_dir().join("intents").join(format!("{id}.json"))
    }

    #[must_use]
    pub fn worktree_config_path(&self, name: &WorktreeName) -> PathBuf {
        self.jvs_dir()
            .join("worktrees")
            .join(name.as_str())
            .join("config.json")
    }

    /// `Path(name)` (§4.7): `main` lives at `<root>/main`, all others at
    /// `<root>/worktrees/<name>`.
    #[must_use]
    pub fn worktree_payload_path(&self, name: &WorktreeName) -> PathBuf {
        if name.is_main() {
            self.root.join("main")
        } else {
            self.root.join("worktrees").join(name.as_str())
        }
    }

    #[must_use]
    pub fn pin_path(&self, id: &str) -> PathBuf {
        self.jvs_dir().join("pins").join(format!("{id}.json"))
    }

    #[must_use]
    pub fn gc_plan_path(&self, plan_id: &str) -> PathBuf {
        self.jvs_dir().join("gc").join(format!("{plan_id}.json"))
    }

    #[must_use]
    pub fn tombstone_path(&self, id: &str) -> PathBuf {
        self.jvs_dir()
            .join("gc")
            .join("tombstones")
            .join(format!("{id}.json"))
    }

    #[must_use]
    pub fn audit_log(&self) -> AuditLog {
        AuditLog::new(self.jvs_dir().join("audit").join("audit.jsonl"))
    }

    /// Resolve the CoW engine to use for this repo, honoring env override
    /// then the repo config, then auto-selection (§4.4).
    #[must_use]
    pub fn engine(&self) -> crate::model::EngineKind {
        crate::engine::select(&self.root, self.config.engine.as_deref())
    }

    /// Load a worktree's config.
    ///
    /// # Errors
    /// Returns [`JvsError::NotFound`] if the worktree does not exist, or a
    /// JSON error if the config is malformed.
    pub fn read_worktree_config(&self, name: &WorktreeName) -> Result<WorktreeConfig, JvsError> {
        let path = self.worktree_config_path(name);
        let bytes = std::fs::read(&path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                JvsError::NotFound {
                    what: "worktree".to_owned(),
                    reference: name.to_string(),
                }
            } else {
                JvsError::Io {
                    context: format!("reading worktree config {}", path.display()),
                    source: e,
                }
            }
        })?;
        serde_json::from_slice(&bytes).map_err(JvsError::from)
    }

    /// Persist a worktree's config atomically.
    ///
    /// # Errors
    /// Returns an I/O error if the config cannot be written.
    pub fn write_worktree_config(&self, cfg: &WorktreeConfig) -> Result<(), JvsError> {
        let path = self.worktree_config_path(&cfg.name);
        let bytes = serde_json::to_vec_pretty(cfg).map_err(JvsError::from)?;
        fsutil::atomic_write(&path, &bytes, 0o644).io_context("writing worktree config")?;
        Ok(())
    }

    /// List all worktree names present under `.jvs/worktrees/` plus
    /// `main`.
    ///
    /// # Errors
    /// Returns an I/O error if the worktrees directory cannot be read.
    pub fn list_worktree_names(&self) -> Result<Vec<WorktreeName>, JvsError> {
        let mut names = vec![WorktreeName::main()];
        let dir = self.jvs_dir().join("worktrees");
        match std::fs::read_dir(&dir) {
            Ok(entries) => {
                for entry in entries {
                    let entry = entry.io_context("reading worktrees directory")?;
                    if let Some(name) = entry.file_name().to_str() {
                        if name != WorktreeName::MAIN {
                            if let Ok(n) = WorktreeName::new(name) {
                                names.push(n);
                            }
                        }
                    }
                }
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(JvsError::Io { context: "reading worktrees directory".to_owned(), source: e }),
        }
        names.sort_by(|a, b| a.as_str().cmp(b.as_str()));
        names.dedup();
        Ok(names)
    }
}

/// On-disk format version written by this implementation.
pub const FORMAT_VERSION: u32 = crate::FORMAT_VERSION;

fn read_format_version(root: &Path) -> Result<u32, JvsError> {
    let path = root.join(".jvs").join("format_version");
    match std::fs::read_to_string(&path) {
        Ok(s) => s.trim().parse().map_err(|_| JvsError::FormatUnsupported {
            found: 0,
            supported: FORMAT_VERSION,
        }),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(1),
        Err(e) => Err(JvsError::Io {
            context: "reading format_version".to_owned(),
            source: e,
        }),
    }
}

fn generate_repo_id() -> String {
    let mut rng = rand::rng();
    (0..16)
        .map(|_| {
            let n = rng.random_range(0..16_u8);
            std::char::from_digit(u32::from(n), 16).unwrap_or('0')
        })
        .collect()
}
