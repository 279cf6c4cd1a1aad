//! Audit appender (§4.6): JSONL file with a SHA-256 hash chain.
//!
//! Concurrency discipline is two-layered per §5: an in-process [`Mutex`]
//! serializes callers within this process, and an exclusive advisory
//! `flock` (via `fs4`) serializes across processes sharing the same repo
//! root. Malformed lines are skipped when recomputing the last hash —
//! tolerating partial writes is a deliberate design choice (§4.6), not a
//! bug being papered over.

use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chrono::Utc;
use fs4::fs_std::FileExt;

use crate::canon::to_canonical_string;
use crate::model::{AuditEventType, AuditRecord};

/// Handle to a repo's append-only audit log.
pub struct AuditLog {
    path: PathBuf,
    guard: Mutex<()>,
}

impl AuditLog {
    /// Open (without creating) the audit log at `path`. The file and its
    /// parent directory are created lazily on the first append.
    #[must_use]
    pub fn new(path: PathBuf) -> Self {
        Self {
            path,
            guard: Mutex::new(()),
        }
    }

    /// `Append(event_type, worktree, snapshot_id, details)` (§4.6).
    ///
    /// # Errors
    /// Returns an I/O error if the file cannot be opened, locked, read,
    /// written, or synced, or a JSON error if a record cannot be encoded.
    pub fn append(
        &self,
        event_type: AuditEventType,
        worktree_name: &str,
        snapshot_id: &str,
        details: std::collections::BTreeMap<String, serde_json::Value>,
    ) -> anyhow::Result<AuditRecord> {
        let _guard = self.guard.lock().unwrap_or_else(|p| p.into_inner());

        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let mut file = OpenOptions::new()
            .create(true)
            .read(true)
            .append(true)
            .open(&self.path)?;
        FileExt::lock_exclusive(&file)?;

        let result = (|| -> anyhow::Result<AuditRecord> {
            let prev_hash = last_record_hash_locked(&file)?;

            let mut record = AuditRecord {
                timestamp: Utc::now(),
                event_type,
                snapshot_id: snapshot_id.to_owned(),
                worktree_name: worktree_name.to_owned(),
                details,
                prev_hash,
                record_hash: String::new(),
            };
            record.record_hash = record.compute_hash()?;

            let line = to_canonical_string(&record)?;
            writeln!(file, "{line}")?;
            file.sync_all()?;

            Ok(record)
        })();

        FileExt::unlock(&file)?;
        result
    }

    /// `GetLastRecordHash()` (§4.6): empty string if the log has no valid
    /// records yet.
    ///
    /// # Errors
    /// Returns an I/O error if the file exists but cannot be opened/read.
    pub fn last_record_hash(&self) -> anyhow::Result<String> {
        let _guard = self.guard.lock().unwrap_or_else(|p| p.into_inner());
        let file = match File::open(&self.path) {
            Ok(f) => f,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(String::new()),
            Err(e) => return Err(e.into()),
        };
        FileExt::lock_shared(&file)?;
        let result = last_record_hash_locked(&file);
        FileExt::unlock(&file)?;
        result
    }

    /// Read every well-formed record in append order. Malformed lines are
    /// skipped, matching `GetLastRecordHash`'s tolerance.
    ///
    /// # Errors
    /// Returns an I/O error if the file exists but cannot be opened/read.
    pub fn read_all(&self) -> anyhow::Result<Vec<AuditRecord>> {
        let _guard = self.guard.lock().unwrap_or_else(|p| p.into_inner());
        let file = match File::open(&self.path) {
            Ok(f) => f,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };
        FileExt::lock_shared(&file)?;
        let records = parse_records(&file);
        FileExt::unlock(&file)?;
        Ok(records)
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

fn parse_records(file: &File) -> Vec<AuditRecord> {
    let reader = BufReader::new(file);
    reader
        .lines()
        .map_while(Result::ok)
        .filter(|line| !line.trim().is_empty())
        .filter_map(|line| serde_json::from_str::<AuditRecord>(&line).ok())
        .collect()
}

fn last_record_hash_locked(file: &File) -> anyhow::Result<String> {
    use std::io::Seek;
    let mut f = file.try_clone()?;
    f.seek(std::io::SeekFrom::Start(0))?;
    let records = parse_records(&f);
    Ok(records.last().map(|r| r.record_hash.clone()).unwrap_or_default())
}

/// Verify the chain invariant: for all `i>0`, `records[i].prev_hash ==
/// records[i-1].record_hash` (§3). Returns the index of the first break,
/// if any.
#[must_use]
pub fn find_chain_break(records: &[AuditRecord]) -> Option<usize> {
    records
        .windows(2)
        .position(|w| w[1].prev_hash != w[0].record_hash)
        .map(|i| i + 1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn log_at(dir: &Path) -> AuditLog {
        AuditLog::new(dir.join("audit.jsonl"))
    }

    #[test]
    fn first_append_has_empty_prev_hash() {
        let dir = tempfile::tempdir().unwrap();
        let log = log_at(dir.path());
        let r = log
            .append(AuditEventType::WorktreeCreate, "main", "", BTreeMap::new())
            .unwrap();
        assert_eq!(r.prev_hash, "");
        assert!(!r.record_hash.is_empty());
    }

    #[test]
    fn chain_is_contiguous_across_appends() {
        let dir = tempfile::tempdir().unwrap();
        let log = log_at(dir.path());
        let r1 = log
            .append(AuditEventType::WorktreeCreate, "main", "", BTreeMap::new())
            .unwrap();
        let r2 = log
            .append(
                AuditEventType::SnapshotCreate,
                "main",
                "1-aaaaaaaa",
                BTreeMap::new(),
            )
            .unwrap();
        assert_eq!(r2.prev_hash, r1.record_hash);

        let all = log.read_all().unwrap();
        assert_eq!(all.len(), 2);
        assert!(find_chain_break(&all).is_none());
    }

    #[test]
    fn last_record_hash_matches_most_recent_append() {
        let dir = tempfile::tempdir().unwrap();
        let log = log_at(dir.path());
        let r = log
            .append(AuditEventType::WorktreeCreate, "main", "", BTreeMap::new())
            .unwrap();
        assert_eq!(log.last_record_hash().unwrap(), r.record_hash);
    }

    #[test]
    fn last_record_hash_empty_when_file_absent() {
        let dir = tempfile::tempdir().unwrap();
        let log = log_at(dir.path());
        assert_eq!(log.last_record_hash().unwrap(), "");
    }

    #[test]
    fn malformed_lines_are_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("audit.jsonl");
        std::fs::write(&path, "not json\n\n").unwrap();
        let log = AuditLog::new(path);
        assert_eq!(log.last_record_hash().unwrap(), "");
        let r = log
            .append(AuditEventType::WorktreeCreate, "main", "", BTreeMap::new())
            .unwrap();
        assert_eq!(r.prev_hash, "");
    }

    #[test]
    fn detects_broken_chain() {
        let r0 = AuditRecord {
            timestamp: Utc::now(),
            event_type: AuditEventType::WorktreeCreate,
            snapshot_id: String::new(),
            worktree_name: "main".to_owned(),
            details: BTreeMap::new(),
            prev_hash: String::new(),
            record_hash: "h0".to_owned(),
        };
        let r1 = AuditRecord {
            timestamp: Utc::now(),
            event_type: AuditEventType::Restore,
            snapshot_id: "x".to_owned(),
            worktree_name: "main".to_owned(),
            details: BTreeMap::new(),
            prev_hash: "wrong".to_owned(),
            record_hash: "h1".to_owned(),
        };
        assert_eq!(find_chain_break(&[r0, r1]), Some(1));
    }

    #[test]
    fn concurrent_appends_from_multiple_threads_produce_contiguous_chain() {
        use std::sync::Arc;
        let dir = tempfile::tempdir().unwrap();
        let log = Arc::new(log_at(dir.path()));
        let handles: Vec<_> = (0..8)
            .map(|i| {
                let log = Arc::clone(&log);
                std::thread::spawn(move || {
                    log.append(
                        AuditEventType::SnapshotCreate,
                        "main",
                        &format!("1-{i:08x}"),
                        BTreeMap::new(),
                    )
                    .unwrap();
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        let all = log.read_all().unwrap();
        assert_eq!(all.len(), 8);
        assert!(find_chain_break(&all).is_none());
    }
}
