//! Data model (§3): the on-disk record shapes for descriptors, READY
//! markers, intents, worktree configs, audit records, pins, GC plans and
//! tombstones.
//!
//! These are plain serde structs/enums; validation of their string fields
//! happens at the [`crate::ids`] layer before a value ever reaches one of
//! these types.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ids::{SnapshotId, Tag, WorktreeName};

/// Which CoW mechanism materialized a snapshot's payload (§4.4).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EngineKind {
    JuicefsClone,
    ReflinkCopy,
    Copy,
}

impl fmt::Display for EngineKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::JuicefsClone => write!(f, "juicefs-clone"),
            Self::ReflinkCopy => write!(f, "reflink-copy"),
            Self::Copy => write!(f, "copy"),
        }
    }
}

impl std::str::FromStr for EngineKind {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "juicefs-clone" => Ok(Self::JuicefsClone),
            "reflink-copy" => Ok(Self::ReflinkCopy),
            "copy" => Ok(Self::Copy),
            other => Err(format!("unknown engine kind {other:?}")),
        }
    }
}

/// Whether a descriptor's recorded hash has been independently reverified.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IntegrityState {
    Verified,
    Tampered,
    Unknown,
}

/// Compression applied to a finalized snapshot tree (§4.8 step 11).
///
/// The initial release never sets this: the field stays present and
/// round-trippable in the descriptor so a future release can populate it
/// without a format migration, but nothing currently writes `Some`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Compression {
    #[serde(rename = "type")]
    pub kind: String,
    pub level: u32,
}

/// Metadata of a completed snapshot (§3), persisted at
/// `.jvs/descriptors/<id>.json`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Descriptor {
    pub snapshot_id: SnapshotId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<SnapshotId>,
    pub worktree_name: WorktreeName,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub note: String,
    #[serde(default)]
    pub tags: Vec<Tag>,
    pub engine: EngineKind,
    pub payload_root_hash: String,
    pub integrity_state: IntegrityState,
    pub descriptor_checksum: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub compression: Option<Compression>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub partial_paths: Option<Vec<String>>,
}

impl Descriptor {
    /// Compute this descriptor's checksum: SHA-256 of its canonical JSON
    /// with `descriptor_checksum` and `integrity_state` omitted.
    ///
    /// # Errors
    /// Returns an error if the descriptor cannot be serialized.
    pub fn compute_checksum(&self) -> Result<String, serde_json::Error> {
        crate::hash::checksum_omitting(self, &["descriptor_checksum", "integrity_state"])
    }
}

/// `.jvs/snapshots/<id>/.READY` (§3): authoritative "this snapshot is
/// complete" signal.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReadyMarker {
    pub snapshot_id: SnapshotId,
    pub completed_at: DateTime<Utc>,
    pub engine: EngineKind,
    pub descriptor_checksum: String,
    pub payload_hash: String,
}

/// `.jvs/intents/<id>.json` (§3): created before materialization, removed
/// on success. Residual presence after process exit signals a crashed
/// creation.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Intent {
    pub snapshot_id: SnapshotId,
    pub worktree_name: WorktreeName,
    pub started_at: DateTime<Utc>,
    pub engine: EngineKind,
}

/// Per-worktree state at `.jvs/worktrees/<name>/config.json` (§3, §4.7).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorktreeConfig {
    pub name: WorktreeName,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_snapshot_id: Option<SnapshotId>,
    #[serde(default)]
    pub head_snapshot_id: String,
    #[serde(default)]
    pub latest_snapshot_id: String,
}

/// The three worktree states of §4.7's state machine.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum WorktreeState {
    Initial,
    Head,
    Detached,
}

impl fmt::Display for WorktreeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Initial => write!(f, "initial"),
            Self::Head => write!(f, "head"),
            Self::Detached => write!(f, "detached"),
        }
    }
}

impl WorktreeConfig {
    /// Compute the current state per §3's predicate: detached iff
    /// `head != latest && head != ""`.
    #[must_use]
    pub fn state(&self) -> WorktreeState {
        if self.head_snapshot_id.is_empty() && self.latest_snapshot_id.is_empty() {
            WorktreeState::Initial
        } else if self.head_snapshot_id != self.latest_snapshot_id
            && !self.head_snapshot_id.is_empty()
        {
            WorktreeState::Detached
        } else {
            WorktreeState::Head
        }
    }

    #[must_use]
    pub fn is_detached(&self) -> bool {
        matches!(self.state(), WorktreeState::Detached)
    }
}

/// An event recorded in the audit log (§3, §4.6).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditEventType {
    #[serde(rename = "snapshot.create")]
    SnapshotCreate,
    Restore,
    #[serde(rename = "worktree.create")]
    WorktreeCreate,
    #[serde(rename = "worktree.remove")]
    WorktreeRemove,
    #[serde(rename = "gc.run")]
    GcRun,
}

impl fmt::Display for AuditEventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::SnapshotCreate => "snapshot.create",
            Self::Restore => "restore",
            Self::WorktreeCreate => "worktree.create",
            Self::WorktreeRemove => "worktree.remove",
            Self::GcRun => "gc.run",
        };
        f.write_str(s)
    }
}

/// A single append-only record in `.jvs/audit/audit.jsonl` (§3).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AuditRecord {
    pub timestamp: DateTime<Utc>,
    pub event_type: AuditEventType,
    #[serde(default)]
    pub snapshot_id: String,
    pub worktree_name: String,
    #[serde(default)]
    pub details: BTreeMap<String, serde_json::Value>,
    pub prev_hash: String,
    pub record_hash: String,
}

impl AuditRecord {
    /// Compute this record's hash: SHA-256 of its canonical JSON with
    /// `record_hash` omitted.
    ///
    /// # Errors
    /// Returns an error if the record cannot be serialized.
    pub fn compute_hash(&self) -> Result<String, serde_json::Error> {
        crate::hash::checksum_omitting(self, &["record_hash"])
    }
}

/// `.jvs/pins/<id>.json` (§3): keeps a snapshot out of GC regardless of
/// retention policy until it expires.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pin {
    pub snapshot_id: SnapshotId,
    pub pinned_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
}

impl Pin {
    #[must_use]
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|exp| exp <= now)
    }
}

/// Cause a snapshot was included in a GC plan's protected set.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProtectionCause {
    Head,
    Lineage,
    Intent,
    Pin,
    Retention,
}

/// Retention policy knobs consulted during the GC plan phase (§4.12).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetentionPolicy {
    /// Snapshots newer than this many seconds are always protected.
    #[serde(default)]
    pub keep_min_age_secs: i64,
    /// The newest N snapshots (by `created_at`) are always protected.
    #[serde(default)]
    pub keep_min_snapshots: usize,
}

impl Default for RetentionPolicy {
    fn default() -> Self {
        Self {
            keep_min_age_secs: 0,
            keep_min_snapshots: 0,
        }
    }
}

/// `.jvs/gc/<plan_id>.json` (§3): persisted plan phase output.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct GcPlan {
    pub plan_id: String,
    pub created_at: DateTime<Utc>,
    pub protected_set: Vec<String>,
    /// Keyed by [`ProtectionCause`]'s `Display` string (`serde_json` maps
    /// require string keys; see its `Display`/`FromStr` impls below).
    pub protection_counts: BTreeMap<String, usize>,
    pub to_delete: Vec<String>,
    pub deletable_bytes_estimate: u64,
    pub retention_policy: RetentionPolicy,
}

/// `.jvs/gc/tombstones/<id>.json` (§3): written after GC deletes a
/// snapshot.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tombstone {
    pub snapshot_id: String,
    pub deleted_at: DateTime<Utc>,
    pub reclaimable: u64,
}

// `BTreeMap<ProtectionCause, usize>` needs its key type to serialize as a
// JSON object key (a string), which `serde_json` only does for
// `Serialize`-as-string keys; deriving that via `Display`/`FromStr` is the
// standard approach for a small closed enum used as a map key.
impl fmt::Display for ProtectionCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Head => "head",
            Self::Lineage => "lineage",
            Self::Intent => "intent",
            Self::Pin => "pin",
            Self::Retention => "retention",
        };
        f.write_str(s)
    }
}

impl std::str::FromStr for ProtectionCause {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "head" => Ok(Self::Head),
            "lineage" => Ok(Self::Lineage),
            "intent" => Ok(Self::Intent),
            "pin" => Ok(Self::Pin),
            "retention" => Ok(Self::Retention),
            other => Err(format!("unknown protection cause {other:?}")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn ts(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(secs, 0).unwrap()
    }

    #[test]
    fn worktree_state_initial_when_both_empty() {
        let cfg = WorktreeConfig {
            name: WorktreeName::main(),
            created_at: ts(0),
            base_snapshot_id: None,
            head_snapshot_id: String::new(),
            latest_snapshot_id: String::new(),
        };
        assert_eq!(cfg.state(), WorktreeState::Initial);
    }

    #[test]
    fn worktree_state_head_when_equal() {
        let cfg = WorktreeConfig {
            name: WorktreeName::main(),
            created_at: ts(0),
            base_snapshot_id: None,
            head_snapshot_id: "1-aaaaaaaa".to_owned(),
            latest_snapshot_id: "1-aaaaaaaa".to_owned(),
        };
        assert_eq!(cfg.state(), WorktreeState::Head);
        assert!(!cfg.is_detached());
    }

    #[test]
    fn worktree_state_detached_when_differing_and_head_nonempty() {
        let cfg = WorktreeConfig {
            name: WorktreeName::main(),
            created_at: ts(0),
            base_snapshot_id: None,
            head_snapshot_id: "1-aaaaaaaa".to_owned(),
            latest_snapshot_id: "2-bbbbbbbb".to_owned(),
        };
        assert_eq!(cfg.state(), WorktreeState::Detached);
        assert!(cfg.is_detached());
    }

    #[test]
    fn pin_expiry() {
        let pin = Pin {
            snapshot_id: SnapshotId::new("1-aaaaaaaa").unwrap(),
            pinned_at: ts(0),
            reason: None,
            expires_at: Some(ts(100)),
        };
        assert!(!pin.is_expired(ts(50)));
        assert!(pin.is_expired(ts(100)));
        assert!(pin.is_expired(ts(200)));
    }

    #[test]
    fn pin_without_expiry_never_expires() {
        let pin = Pin {
            snapshot_id: SnapshotId::new("1-aaaaaaaa").unwrap(),
            pinned_at: ts(0),
            reason: None,
            expires_at: None,
        };
        assert!(!pin.is_expired(ts(1_000_000)));
    }

    #[test]
    fn engine_kind_round_trips_through_display_and_fromstr() {
        for kind in [
            EngineKind::JuicefsClone,
            EngineKind::ReflinkCopy,
            EngineKind::Copy,
        ] {
            let s = kind.to_string();
            let parsed: EngineKind = s.parse().unwrap();
            assert_eq!(parsed, kind);
        }
    }

    #[test]
    fn descriptor_checksum_excludes_itself_and_integrity_state() {
        let d = Descriptor {
            snapshot_id: SnapshotId::new("1-aaaaaaaa").unwrap(),
            parent_id: None,
            worktree_name: WorktreeName::main(),
            created_at: ts(0),
            note: "first".to_owned(),
            tags: vec![],
            engine: EngineKind::Copy,
            payload_root_hash: "deadbeef".to_owned(),
            integrity_state: IntegrityState::Verified,
            descriptor_checksum: String::new(),
            compression: None,
            partial_paths: None,
        };
        let a = d.compute_checksum().unwrap();
        let mut d2 = d.clone();
        d2.integrity_state = IntegrityState::Tampered;
        let b = d2.compute_checksum().unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn audit_record_hash_excludes_itself() {
        let r = AuditRecord {
            timestamp: ts(0),
            event_type: AuditEventType::SnapshotCreate,
            snapshot_id: "1-aaaaaaaa".to_owned(),
            worktree_name: "main".to_owned(),
            details: BTreeMap::new(),
            prev_hash: String::new(),
            record_hash: String::new(),
        };
        let a = r.compute_hash().unwrap();
        let mut r2 = r.clone();
        r2.record_hash = "something-else".to_owned();
        let b = r2.compute_hash().unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn audit_event_type_serializes_to_spec_strings() {
        assert_eq!(
            serde_json::to_string(&AuditEventType::SnapshotCreate).unwrap(),
            "\"snapshot.create\""
        );
        assert_eq!(
            serde_json::to_string(&AuditEventType::WorktreeRemove).unwrap(),
            "\"worktree.remove\""
        );
    }
}
