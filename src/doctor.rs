//! Doctor / recovery (§4.13): scan for inconsistencies, classify each as a
//! [`Finding`], and apply the matching repair.
//!
//! `scan` never mutates the repository; `repair` only touches what a
//! specific finding names. The CLI's `--repair-runtime` flag decides
//! whether `repair` runs at all — this module just does the work when
//! asked.

use std::collections::{HashMap, HashSet};

use crate::audit;
use crate::error::JvsError;
use crate::model::{AuditRecord, Descriptor};
use crate::repo::Repo;

/// One inconsistency found by [`scan`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Finding {
    /// `.jvs/snapshots/<id>.tmp/` with no matching published snapshot.
    OrphanTmp { snapshot_id: String },
    /// Intent file present but the snapshot already published.
    CompletedIntent { snapshot_id: String },
    /// Intent present, no published snapshot, no tmp directory.
    AbandonedIntent { snapshot_id: String },
    /// Worktree head does not reference any READY snapshot, but a later
    /// READY snapshot exists in its lineage.
    HeadOrphan {
        worktree_name: String,
        current_head: String,
        advance_to: String,
    },
    /// The audit chain is broken or has missing records.
    BrokenAuditChain { at_index: usize },
    /// A snapshot directory has `.READY` but no descriptor file.
    MissingDescriptor { snapshot_id: String },
    /// The repository's recorded format version is newer than this binary
    /// understands. Never repaired automatically (§4.13 [AMBIENT]).
    FormatUnsupported { found: u32, supported: u32 },
}

impl Finding {
    /// The repair action name this finding maps to, or `None` for findings
    /// with no automatic repair (`MissingDescriptor`, `FormatUnsupported`).
    #[must_use]
    pub fn repair_action(&self) -> Option<&'static str> {
        match self {
            Self::OrphanTmp { .. } => Some("clean_tmp"),
            Self::CompletedIntent { .. } | Self::AbandonedIntent { .. } => Some("clean_intents"),
            Self::HeadOrphan { .. } => Some("advance_head"),
            Self::BrokenAuditChain { .. } => Some("audit_repair"),
            Self::MissingDescriptor { .. } | Self::FormatUnsupported { .. } => None,
        }
    }
}

fn published_ids(repo: &Repo) -> HashSet<String> {
    crate::catalog::list_all(repo)
        .unwrap_or_default()
        .into_iter()
        .map(|d| d.snapshot_id.to_string())
        .collect()
}

fn ready_snapshot_ids(repo: &Repo) -> std::io::Result<HashSet<String>> {
    let dir = repo.jvs_dir().join("snapshots");
    let mut out = HashSet::new();
    let entries = match std::fs::read_dir(&dir) {
        Ok(e) => e,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(out),
        Err(e) => return Err(e),
    };
    for entry in entries {
        let entry = entry?;
        let name = entry.file_name().to_string_lossy().into_owned();
        if name.ends_with(".tmp") {
            continue;
        }
        if entry.path().join(".READY").is_file() {
            out.insert(name);
        }
    }
    Ok(out)
}

fn scan_orphan_tmp(repo: &Repo, published: &HashSet<String>) -> std::io::Result<Vec<Finding>> {
    let dir = repo.jvs_dir().join("snapshots");
    let mut findings = Vec::new();
    let entries = match std::fs::read_dir(&dir) {
        Ok(e) => e,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(findings),
        Err(e) => return Err(e),
    };
    for entry in entries {
        let entry = entry?;
        let name = entry.file_name().to_string_lossy().into_owned();
        let Some(id) = name.strip_suffix(".tmp") else {
            continue;
        };
        if !published.contains(id) {
            findings.push(Finding::OrphanTmp {
                snapshot_id: id.to_owned(),
            });
        }
    }
    Ok(findings)
}

fn scan_intents(repo: &Repo, published: &HashSet<String>) -> std::io::Result<Vec<Finding>> {
    let dir = repo.jvs_dir().join("intents");
    let mut findings = Vec::new();
    let entries = match std::fs::read_dir(&dir) {
        Ok(e) => e,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(findings),
        Err(e) => return Err(e),
    };
    for entry in entries {
        let entry = entry?;
        let Some(id) = entry
            .path()
            .file_stem()
            .and_then(|s| s.to_str())
            .map(str::to_owned)
        else {
            continue;
        };
        if published.contains(&id) {
            findings.push(Finding::CompletedIntent { snapshot_id: id });
        } else if !repo.snapshot_tmp_path(&id).exists() {
            findings.push(Finding::AbandonedIntent { snapshot_id: id });
        }
        // An intent whose `.tmp` is still present but not yet published is
        // simply in-progress work, not a finding.
    }
    Ok(findings)
}

fn scan_head_orphans(repo: &Repo, by_id: &HashMap<String, &Descriptor>) -> Result<Vec<Finding>, JvsError> {
    let mut findings = Vec::new();
    for cfg in crate::worktree::list(repo)? {
        if cfg.head_snapshot_id.is_empty() || by_id.contains_key(&cfg.head_snapshot_id) {
            continue;
        }
        // Head references a snapshot with no READY descriptor (corrupted
        // pointer, or the snapshot was removed out of band). If a later,
        // still-published snapshot is on record for this worktree — its
        // own `latest` — offer to advance head there.
        if cfg.head_snapshot_id != cfg.latest_snapshot_id
            && by_id.contains_key(&cfg.latest_snapshot_id)
        {
            findings.push(Finding::HeadOrphan {
                worktree_name: cfg.name.to_string(),
                current_head: cfg.head_snapshot_id.clone(),
                advance_to: cfg.latest_snapshot_id.clone(),
            });
        }
    }
    Ok(findings)
}

fn scan_audit_chain(repo: &Repo) -> anyhow::Result<Vec<Finding>> {
    let records = repo.audit_log().read_all()?;
    Ok(audit::find_chain_break(&records)
        .map(|at_index| Finding::BrokenAuditChain { at_index })
        .into_iter()
        .collect())
}

fn scan_missing_descriptors(repo: &Repo, published: &HashSet<String>) -> std::io::Result<Vec<Finding>> {
    let ready = ready_snapshot_ids(repo)?;
    Ok(ready
        .difference(published)
        .map(|id| Finding::MissingDescriptor {
            snapshot_id: id.clone(),
        })
        .collect())
}

fn scan_format_version(repo: &Repo) -> Vec<Finding> {
    let path = repo.jvs_dir().join("format_version");
    match std::fs::read_to_string(&path) {
        Ok(s) => match s.trim().parse::<u32>() {
            Ok(found) if found > crate::FORMAT_VERSION => vec![Finding::FormatUnsupported {
                found,
                supported: crate::FORMAT_VERSION,
            }],
            _ => vec![],
        },
        Err(_) => vec![],
    }
}

/// `Scan()` (§4.13): run every detection pass and return every finding.
///
/// # Errors
/// Propagates I/O errors from reading any of the scanned directories.
pub fn scan(repo: &Repo) -> Result<Vec<Finding>, JvsError> {
    let descriptors = crate::catalog::list_all(repo)?;
    let published = descriptors
        .iter()
        .map(|d| d.snapshot_id.to_string())
        .collect::<HashSet<_>>();
    let by_id: HashMap<String, &Descriptor> = descriptors
        .iter()
        .map(|d| (d.snapshot_id.to_string(), d))
        .collect();

    let mut findings = Vec::new();
    findings.extend(scan_orphan_tmp(repo, &published).io_context_gc()?);
    findings.extend(scan_intents(repo, &published).io_context_gc()?);
    findings.extend(scan_head_orphans(repo, &by_id)?);
    findings.extend(scan_audit_chain(repo).unwrap_or_default());
    findings.extend(scan_missing_descriptors(repo, &published).io_context_gc()?);
    findings.extend(scan_format_version(repo));
    Ok(findings)
}

// Small local shim so this module's I/O calls read the same as the rest of
// the crate's `IoContext`-wrapped calls without pulling in a context string
// for scan-only, best-effort reads.
trait IoContextGc<T> {
    fn io_context_gc(self) -> Result<T, JvsError>;
}

impl<T> IoContextGc<T> for std::io::Result<T> {
    fn io_context_gc(self) -> Result<T, JvsError> {
        self.map_err(|source| JvsError::Io {
            context: "scanning repository for doctor findings".to_owned(),
            source,
        })
    }
}

/// Outcome of applying [`repair`] to one finding.
#[derive(Debug, Clone)]
pub struct RepairOutcome {
    pub finding: Finding,
    pub applied: bool,
    pub detail: String,
}

fn repair_one(repo: &Repo, finding: &Finding) -> RepairOutcome {
    match finding {
        Finding::OrphanTmp { snapshot_id } => {
            let path = repo.snapshot_tmp_path(snapshot_id);
            match std::fs::remove_dir_all(&path) {
                Ok(()) => RepairOutcome {
                    finding: finding.clone(),
                    applied: true,
                    detail: format!("removed {}", path.display()),
                },
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => RepairOutcome {
                    finding: finding.clone(),
                    applied: true,
                    detail: "already absent".to_owned(),
                },
                Err(e) => RepairOutcome {
                    finding: finding.clone(),
                    applied: false,
                    detail: e.to_string(),
                },
            }
        }
        Finding::CompletedIntent { snapshot_id } | Finding::AbandonedIntent { snapshot_id } => {
            let path = repo.intent_path(snapshot_id);
            match std::fs::remove_file(&path) {
                Ok(()) => RepairOutcome {
                    finding: finding.clone(),
                    applied: true,
                    detail: format!("removed {}", path.display()),
                },
                Err(_) if !path.exists() => RepairOutcome {
                    finding: finding.clone(),
                    applied: true,
                    detail: "already absent".to_owned(),
                },
                Err(e) => RepairOutcome {
                    finding: finding.clone(),
                    applied: false,
                    detail: e.to_string(),
                },
            }
        }
        Finding::HeadOrphan {
            worktree_name,
            advance_to,
            ..
        } => match crate::ids::WorktreeName::new(worktree_name.clone())
            .map_err(JvsError::from)
            .and_then(|name| {
                let id = crate::ids::SnapshotId::new(advance_to.clone())?;
                crate::worktree::update_head(repo, &name, &id)
            }) {
            Ok(_) => RepairOutcome {
                finding: finding.clone(),
                applied: true,
                detail: format!("advanced head to {advance_to}"),
            },
            Err(e) => RepairOutcome {
                finding: finding.clone(),
                applied: false,
                detail: e.to_string(),
            },
        },
        Finding::BrokenAuditChain { .. } => match audit_repair(repo) {
            Ok(detail) => RepairOutcome {
                finding: finding.clone(),
                applied: true,
                detail,
            },
            Err(e) => RepairOutcome {
                finding: finding.clone(),
                applied: false,
                detail: e.to_string(),
            },
        },
        Finding::MissingDescriptor { .. } | Finding::FormatUnsupported { .. } => RepairOutcome {
            finding: finding.clone(),
            applied: false,
            detail: "no automatic repair; report only".to_owned(),
        },
    }
}

/// `audit_repair` (§4.13): recompute the hash chain over every
/// still-present record (each record's own hash is recomputed, then
/// `prev_hash` values are relinked in file order), and report how many
/// records remain versus how many the original chain implied were lost.
///
/// This rewrites `.jvs/audit/audit.jsonl` in place, so callers must already
/// be holding the same level of exclusivity the audit appender normally
/// provides (§5) — `doctor` is a maintenance operation expected to run with
/// no concurrent writers.
///
/// # Errors
/// Returns an I/O error if the log cannot be read or rewritten, or a JSON
/// error if a record cannot be re-encoded.
pub fn audit_repair(repo: &Repo) -> Result<String, JvsError> {
    let log = repo.audit_log();
    let mut records = log_read_all(&log)?;

    let mut prev_hash = String::new();
    for record in &mut records {
        record.prev_hash = prev_hash.clone();
        record.record_hash = record.compute_hash().map_err(JvsError::from)?;
        prev_hash = record.record_hash.clone();
    }

    let mut out = String::new();
    for record in &records {
        out.push_str(&crate::canon::to_canonical_string(record).map_err(JvsError::from)?);
        out.push('\n');
    }
    crate::fsutil::atomic_write(log.path(), out.as_bytes(), 0o644)
        .map_err(|source| JvsError::Io {
            context: "rewriting repaired audit log".to_owned(),
            source,
        })?;

    Ok(format!("rechained {} record(s)", records.len()))
}

fn log_read_all(log: &audit::AuditLog) -> Result<Vec<AuditRecord>, JvsError> {
    log.read_all().map_err(|e| JvsError::Io {
        context: "reading audit log for repair".to_owned(),
        source: std::io::Error::other(e.to_string()),
    })
}

/// `Repair(findings)` (§4.13): apply each finding's repair action. Findings
/// with no automatic repair are passed through unapplied.
#[must_use]
pub fn repair(repo: &Repo, findings: &[Finding]) -> Vec<RepairOutcome> {
    findings.iter().map(|f| repair_one(repo, f)).collect()
}
