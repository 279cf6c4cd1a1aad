use jvs::doctor::Finding;
use jvs::{JvsError, Repo};
use serde::Serialize;

use crate::format::OutputFormat;

/// A JSON-friendly rendering of a [`Finding`]; the core type stays decoupled
/// from `serde` output framing (only this CLI boundary needs it).
#[derive(Serialize)]
struct FindingView {
    kind: &'static str,
    detail: String,
    repair_action: Option<&'static str>,
}

fn describe(finding: &Finding) -> FindingView {
    let (kind, detail) = match finding {
        Finding::OrphanTmp { snapshot_id } => ("orphan_tmp", format!("snapshot {snapshot_id}")),
        Finding::CompletedIntent { snapshot_id } => {
            ("completed_intent", format!("snapshot {snapshot_id}"))
        }
        Finding::AbandonedIntent { snapshot_id } => {
            ("abandoned_intent", format!("snapshot {snapshot_id}"))
        }
        Finding::HeadOrphan {
            worktree_name,
            current_head,
            advance_to,
        } => (
            "head_orphan",
            format!("worktree {worktree_name}: head {current_head} -> {advance_to}"),
        ),
        Finding::BrokenAuditChain { at_index } => {
            ("broken_audit_chain", format!("record {at_index}"))
        }
        Finding::MissingDescriptor { snapshot_id } => {
            ("missing_descriptor", format!("snapshot {snapshot_id}"))
        }
        Finding::FormatUnsupported { found, supported } => (
            "format_unsupported",
            format!("found {found}, supported {supported}"),
        ),
    };
    FindingView {
        kind,
        detail,
        repair_action: finding.repair_action(),
    }
}

#[derive(Serialize)]
struct RepairView {
    kind: &'static str,
    applied: bool,
    detail: String,
}

#[derive(Serialize)]
struct DoctorReport {
    findings: Vec<FindingView>,
    repairs: Vec<RepairView>,
}

/// `doctor [--strict] [--repair-runtime]` (§6, §4.13).
pub fn run(repo: &Repo, strict: bool, repair_runtime: bool, format: OutputFormat) -> anyhow::Result<()> {
    let findings = jvs::doctor::scan(repo)?;
    let views: Vec<FindingView> = findings.iter().map(describe).collect();

    let repairs = if repair_runtime && !findings.is_empty() {
        jvs::doctor::repair(repo, &findings)
            .into_iter()
            .map(|outcome| RepairView {
                kind: describe(&outcome.finding).kind,
                applied: outcome.applied,
                detail: outcome.detail,
            })
            .collect()
    } else {
        Vec::new()
    };

    if format.is_json() {
        OutputFormat::print_json(&DoctorReport {
            findings: views,
            repairs,
        })?;
    } else if views.is_empty() {
        println!("No inconsistencies found.");
    } else {
        println!("{} finding(s):", views.len());
        for v in &views {
            match v.repair_action {
                Some(action) => println!("  [{}] {} (repair: {action})", v.kind, v.detail),
                None => println!("  [{}] {} (report only)", v.kind, v.detail),
            }
        }
        if !repairs.is_empty() {
            println!();
            println!("Repairs applied:");
            for r in &repairs {
                let status = if r.applied { "ok" } else { "failed" };
                println!("  [{}] {status}: {}", r.kind, r.detail);
            }
        }
    }

    if strict {
        if let Some(err) = findings.iter().find_map(as_integrity_error) {
            return Err(err.into());
        }
        if !findings.is_empty() {
            anyhow::bail!("doctor found {} issue(s) (--strict)", findings.len());
        }
    }
    Ok(())
}

/// Findings with a stable integrity error code (§6, §7) raise that typed
/// error under `--strict` rather than the generic bail, so the CLI's exit
/// classifier (exit code 3, not 1) sees them for what they are.
fn as_integrity_error(finding: &Finding) -> Option<JvsError> {
    match finding {
        Finding::BrokenAuditChain { at_index } => Some(JvsError::AuditChainBroken {
            at_index: *at_index,
            detail: "records[i].prev_hash does not match records[i-1].record_hash".to_owned(),
        }),
        Finding::FormatUnsupported { found, supported } => Some(JvsError::FormatUnsupported {
            found: *found,
            supported: *supported,
        }),
        _ => None,
    }
}
