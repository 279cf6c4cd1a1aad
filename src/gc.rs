//! Garbage collector (§4.12): two-phase plan/run with protected-set
//! revalidation.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use chrono::Utc;
use rand::Rng;
use serde_json::json;

use crate::error::{IoContext, JvsError};
use crate::fsutil;
use crate::model::{Descriptor, GcPlan, Pin, ProtectionCause, RetentionPolicy, Tombstone};
use crate::repo::Repo;

fn generate_plan_id() -> String {
    let unix_ms = Utc::now().timestamp_millis().max(0);
    let mut rng = rand::rng();
    let suffix: String = (0..8)
        .map(|_| {
            let n = rng.random_range(0..16_u8);
            std::char::from_digit(u32::from(n), 16).unwrap_or('0')
        })
        .collect();
    format!("gc-{unix_ms}-{suffix}")
}

/// The protected set computed by the plan phase, with every cause that
/// applies to each protected snapshot (causes can overlap).
#[derive(Debug, Clone, Default)]
pub struct ProtectedSet {
    pub causes: HashMap<String, BTreeSet<ProtectionCause>>,
}

impl ProtectedSet {
    fn protect(&mut self, id: impl Into<String>, cause: ProtectionCause) {
        self.causes.entry(id.into()).or_default().insert(cause);
    }

    #[must_use]
    pub fn contains(&self, id: &str) -> bool {
        self.causes.contains_key(id)
    }

    #[must_use]
    pub fn counts(&self) -> BTreeMap<String, usize> {
        let mut counts: BTreeMap<String, usize> = BTreeMap::new();
        for cause_set in self.causes.values() {
            for cause in cause_set {
                *counts.entry(cause.to_string()).or_insert(0) += 1;
            }
        }
        counts
    }
}

fn unexpired_pins(repo: &Repo) -> Result<Vec<Pin>, JvsError> {
    let dir = repo.jvs_dir().join("pins");
    let mut out = Vec::new();
    let entries = match std::fs::read_dir(&dir) {
        Ok(e) => e,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(out),
        Err(e) => {
            return Err(JvsError::Io {
                context: "reading pins directory".to_owned(),
                source: e,
            })
        }
    };
    let now = Utc::now();
    for entry in entries {
        let entry = entry.io_context("reading pins directory entry")?;
        let Ok(bytes) = std::fs::read(entry.path()) else {
            continue;
        };
        if let Ok(pin) = serde_json::from_slice::<Pin>(&bytes) {
            if !pin.is_expired(now) {
                out.push(pin);
            }
        }
    }
    Ok(out)
}

fn intent_snapshot_ids(repo: &Repo) -> Result<Vec<String>, JvsError> {
    let dir = repo.jvs_dir().join("intents");
    let mut out = Vec::new();
    let entries = match std::fs::read_dir(&dir) {
        Ok(e) => e,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(out),
        Err(e) => {
            return Err(JvsError::Io {
                context: "reading intents directory".to_owned(),
                source: e,
            })
        }
    };
    for entry in entries {
        let entry = entry.io_context("reading intents directory entry")?;
        if let Some(stem) = entry.path().file_stem().and_then(|s| s.to_str()) {
            out.push(stem.to_owned());
        }
    }
    Ok(out)
}

/// Walk `parent_id` from `start` through `by_id`, protecting every
/// ancestor found (lineage may be broken — a missing ancestor simply ends
/// the walk rather than erroring, matching §4.13's "Lineage Broken"
/// finding being a `doctor` concern, not a GC one).
fn protect_lineage(protected: &mut ProtectedSet, by_id: &HashMap<String, &Descriptor>, start: &str) {
    let mut current = start.to_owned();
    loop {
        let Some(descriptor) = by_id.get(&current) else {
            break;
        };
        match &descriptor.parent_id {
            Some(parent) => {
                let parent = parent.to_string();
                protected.protect(parent.clone(), ProtectionCause::Lineage);
                current = parent;
            }
            None => break,
        }
    }
}

/// Compute the protected set (§4.12 plan phase, items 1–5).
///
/// # Errors
/// Propagates I/O errors from reading worktrees, descriptors, intents, or
/// pins.
pub fn compute_protected_set(repo: &Repo, retention: &RetentionPolicy) -> Result<ProtectedSet, JvsError> {
    let mut protected = ProtectedSet::default();

    let descriptors = crate::catalog::list_all(repo)?;
    let by_id: HashMap<String, &Descriptor> = descriptors
        .iter()
        .map(|d| (d.snapshot_id.to_string(), d))
        .collect();

    // 1 & 2: every worktree's head, and its lineage ancestors.
    for cfg in crate::worktree::list(repo)? {
        if !cfg.head_snapshot_id.is_empty() {
            protected.protect(cfg.head_snapshot_id.clone(), ProtectionCause::Head);
            protect_lineage(&mut protected, &by_id, &cfg.head_snapshot_id);
        }
        if !cfg.latest_snapshot_id.is_empty() && cfg.latest_snapshot_id != cfg.head_snapshot_id {
            protect_lineage(&mut protected, &by_id, &cfg.latest_snapshot_id);
        }
    }

    // 3: snapshot IDs referenced by in-progress intents.
    for id in intent_snapshot_ids(repo)? {
        protected.protect(id, ProtectionCause::Intent);
    }

    // 4: unexpired pins.
    for pin in unexpired_pins(repo)? {
        protected.protect(pin.snapshot_id.to_string(), ProtectionCause::Pin);
    }

    // 5: retention — age window, then newest-N.
    let now = Utc::now();
    let age_cutoff = now - chrono::Duration::seconds(retention.keep_min_age_secs);
    for d in &descriptors {
        if d.created_at >= age_cutoff {
            protected.protect(d.snapshot_id.to_string(), ProtectionCause::Retention);
        }
    }
    if retention.keep_min_snapshots > 0 {
        let mut by_created: Vec<&Descriptor> = descriptors.iter().collect();
        by_created.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        for d in by_created.into_iter().take(retention.keep_min_snapshots) {
            protected.protect(d.snapshot_id.to_string(), ProtectionCause::Retention);
        }
    }

    Ok(protected)
}

fn published_snapshot_ids(repo: &Repo) -> Result<BTreeSet<String>, JvsError> {
    Ok(crate::catalog::list_all(repo)?
        .into_iter()
        .map(|d| d.snapshot_id.to_string())
        .collect())
}

fn dir_size(path: &std::path::Path) -> u64 {
    let mut total = 0_u64;
    let Ok(entries) = std::fs::read_dir(path) else {
        return 0;
    };
    for entry in entries.flatten() {
        let Ok(file_type) = entry.file_type() else {
            continue;
        };
        if file_type.is_dir() {
            total += dir_size(&entry.path());
        } else if let Ok(meta) = entry.metadata() {
            total += meta.len();
        }
    }
    total
}

/// `gc plan` (§4.12): compute the protected set, persist a [`GcPlan`].
///
/// # Errors
/// Propagates I/O errors from computing the protected set or writing the
/// plan file.
pub fn plan(repo: &Repo, retention: &RetentionPolicy) -> Result<GcPlan, JvsError> {
    let protected = compute_protected_set(repo, retention)?;
    let published = published_snapshot_ids(repo)?;

    let to_delete: Vec<String> = published
        .iter()
        .filter(|id| !protected.contains(id))
        .cloned()
        .collect();

    let deletable_bytes_estimate: u64 = to_delete
        .iter()
        .map(|id| dir_size(&repo.snapshot_payload_path(id)))
        .sum();

    let gc_plan = GcPlan {
        plan_id: generate_plan_id(),
        created_at: Utc::now(),
        protected_set: protected.causes.keys().cloned().collect(),
        protection_counts: protected.counts(),
        to_delete,
        deletable_bytes_estimate,
        retention_policy: retention.clone(),
    };

    let bytes = serde_json::to_vec_pretty(&gc_plan)?;
    fsutil::atomic_write(&repo.gc_plan_path(&gc_plan.plan_id), &bytes, 0o644)
        .io_context("writing GC plan")?;
    Ok(gc_plan)
}

/// Result of a `gc run` (§4.12 run phase).
#[derive(Debug, Clone, Default)]
pub struct RunResult {
    pub deleted: Vec<String>,
    pub failed: Vec<(String, String)>,
}

/// `gc run --plan-id <id>` (§4.12): reload, revalidate, delete, tombstone,
/// and audit.
///
/// # Errors
/// Returns [`JvsError::NotFound`] if the plan does not exist, or
/// [`JvsError::GcPlanMismatch`] if any candidate has since become
/// protected.
pub fn run(repo: &Repo, plan_id: &str) -> Result<RunResult, JvsError> {
    // Step 1: reload the plan.
    let plan_path = repo.gc_plan_path(plan_id);
    let bytes = std::fs::read(&plan_path).map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            JvsError::NotFound {
                what: "gc plan".to_owned(),
                reference: plan_id.to_owned(),
            }
        } else {
            JvsError::Io {
                context: format!("reading gc plan {}", plan_path.display()),
                source: e,
            }
        }
    })?;
    let gc_plan: GcPlan = serde_json::from_slice(&bytes)?;

    // Step 2: recompute the protected set; abort on mismatch.
    let protected = compute_protected_set(repo, &gc_plan.retention_policy)?;
    if let Some(mismatched) = gc_plan.to_delete.iter().find(|id| protected.contains(id)) {
        tracing::warn!(plan_id, snapshot_id = %mismatched, "gc plan candidate became protected since planning");
        return Err(JvsError::GcPlanMismatch {
            plan_id: plan_id.to_owned(),
        });
    }

    // Step 3 & 4: delete each candidate, tombstone successes.
    let mut result = RunResult::default();
    for id in &gc_plan.to_delete {
        let payload = repo.snapshot_payload_path(id);
        let reclaimable = dir_size(&payload);
        let payload_result = std::fs::remove_dir_all(&payload);
        let descriptor_result = std::fs::remove_file(repo.descriptor_path(id));

        match (payload_result, descriptor_result) {
            (Ok(()) | Err(_), Ok(()) | Err(_))
                if !payload.exists() && !repo.descriptor_path(id).exists() =>
            {
                let tombstone = Tombstone {
                    snapshot_id: id.clone(),
                    deleted_at: Utc::now(),
                    reclaimable,
                };
                if let Ok(tb_bytes) = serde_json::to_vec_pretty(&tombstone) {
                    if let Err(e) = fsutil::atomic_write(&repo.tombstone_path(id), &tb_bytes, 0o644) {
                        tracing::warn!(snapshot_id = %id, error = %e, "failed to write tombstone");
                    }
                }
                result.deleted.push(id.clone());
            }
            (payload_res, descriptor_res) => {
                let detail = [payload_res.err(), descriptor_res.err()]
                    .into_iter()
                    .flatten()
                    .map(|e| e.to_string())
                    .collect::<Vec<_>>()
                    .join("; ");
                tracing::warn!(snapshot_id = %id, %detail, "failed to delete gc candidate");
                result.failed.push((id.clone(), detail));
            }
        }
    }

    // Step 5: delete the plan, audit.
    let _ = std::fs::remove_file(&plan_path);
    let mut details = BTreeMap::new();
    details.insert("plan_id".to_owned(), json!(plan_id));
    details.insert("deleted_count".to_owned(), json!(result.deleted.len()));
    if let Err(e) = repo
        .audit_log()
        .append(crate::model::AuditEventType::GcRun, "", "", details)
    {
        tracing::warn!(error = %e, plan_id, "failed to append audit record for gc run");
    }

    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ids::WorktreeName;
    use crate::repo::Repo;
    use crate::snapshot::{create, CreateRequest};

    fn init_repo() -> (tempfile::TempDir, Repo) {
        let dir = tempfile::tempdir().unwrap();
        let repo = Repo::init(dir.path().to_path_buf()).unwrap();
        (dir, repo)
    }

    fn zero_retention() -> RetentionPolicy {
        RetentionPolicy {
            keep_min_age_secs: 0,
            keep_min_snapshots: 0,
        }
    }

    #[test]
    fn plan_protects_head_and_lineage_and_deletes_orphan() {
        let (_dir, repo) = init_repo();
        let main = WorktreeName::main();
        let root = repo.worktree_payload_path(&main);

        for i in 0..5 {
            std::fs::write(root.join(format!("f{i}.txt")), format!("{i}")).unwrap();
            create(&repo, &main, &CreateRequest::default()).unwrap();
        }

        let temp_name = WorktreeName::new("scratch").unwrap();
        crate::worktree::create(&repo, &temp_name, None).unwrap();
        std::fs::write(repo.worktree_payload_path(&temp_name).join("g.txt"), b"g").unwrap();
        let temp_snapshot = create(&repo, &temp_name, &CreateRequest::default()).unwrap();
        crate::worktree::remove(&repo, &temp_name).unwrap();

        let gc_plan = plan(&repo, &zero_retention()).unwrap();
        assert!(gc_plan.to_delete.contains(&temp_snapshot.snapshot_id.to_string()));
        assert_eq!(gc_plan.to_delete.len(), 1);

        let result = run(&repo, &gc_plan.plan_id).unwrap();
        assert_eq!(result.deleted, vec![temp_snapshot.snapshot_id.to_string()]);
        assert!(!repo
            .snapshot_payload_path(temp_snapshot.snapshot_id.as_str())
            .exists());
        assert!(repo
            .tombstone_path(temp_snapshot.snapshot_id.as_str())
            .is_file());

        let all = crate::catalog::list_all(&repo).unwrap();
        assert_eq!(all.len(), 5);
    }

    #[test]
    fn run_aborts_when_candidate_becomes_protected() {
        let (_dir, repo) = init_repo();
        let temp_name = WorktreeName::new("scratch").unwrap();
        crate::worktree::create(&repo, &temp_name, None).unwrap();
        std::fs::write(repo.worktree_payload_path(&temp_name).join("g.txt"), b"g").unwrap();
        let temp_snapshot = create(&repo, &temp_name, &CreateRequest::default()).unwrap();

        let gc_plan = plan(&repo, &zero_retention()).unwrap();
        assert!(gc_plan.to_delete.is_empty());

        // Force a mismatch: fabricate a plan claiming the still-head
        // snapshot of `scratch` as a candidate.
        let mut bad_plan = gc_plan.clone();
        bad_plan.to_delete = vec![temp_snapshot.snapshot_id.to_string()];
        let bytes = serde_json::to_vec_pretty(&bad_plan).unwrap();
        fsutil::atomic_write(&repo.gc_plan_path(&bad_plan.plan_id), &bytes, 0o644).unwrap();

        let err = run(&repo, &bad_plan.plan_id).unwrap_err();
        assert!(matches!(err, JvsError::GcPlanMismatch { .. }));
    }

    #[test]
    fn retention_protects_unreferenced_recent_snapshots() {
        let (_dir, repo) = init_repo();
        let main = WorktreeName::main();
        std::fs::write(repo.worktree_payload_path(&main).join("a.txt"), b"a").unwrap();
        create(&repo, &main, &CreateRequest::default()).unwrap();

        let temp_name = WorktreeName::new("scratch").unwrap();
        crate::worktree::create(&repo, &temp_name, None).unwrap();
        std::fs::write(repo.worktree_payload_path(&temp_name).join("g.txt"), b"g").unwrap();
        let temp_snapshot = create(&repo, &temp_name, &CreateRequest::default()).unwrap();
        crate::worktree::remove(&repo, &temp_name).unwrap();

        // With a generous retention window, the orphaned snapshot survives
        // even though no worktree head or lineage protects it anymore.
        let retention = RetentionPolicy {
            keep_min_age_secs: 3600,
            keep_min_snapshots: 0,
        };
        let gc_plan = plan(&repo, &retention).unwrap();
        assert!(gc_plan.to_delete.is_empty());

        // Without retention, the same orphan is a deletion candidate.
        let gc_plan = plan(&repo, &zero_retention()).unwrap();
        assert_eq!(gc_plan.to_delete, vec![temp_snapshot.snapshot_id.to_string()]);
    }

    #[test]
    fn not_found_for_unknown_plan_id() {
        let (_dir, repo) = init_repo();
        assert!(matches!(run(&repo, "gc-nonexistent"), Err(JvsError::NotFound { .. })));
    }
}
