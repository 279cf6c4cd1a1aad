use clap::Subcommand;
use jvs::Repo;
use serde::Serialize;

use crate::format::OutputFormat;

#[derive(Subcommand)]
pub enum GcCommand {
    /// Compute the protected set and persist a deletion plan
    Plan,
    /// Revalidate and execute a previously planned collection
    Run {
        #[arg(long)]
        plan_id: String,
    },
}

#[derive(Serialize)]
struct PlanReport {
    plan_id: String,
    protected_count: usize,
    to_delete: Vec<String>,
    deletable_bytes_estimate: u64,
}

#[derive(Serialize)]
struct RunReport {
    deleted: Vec<String>,
    failed: Vec<(String, String)>,
}

pub fn run(repo: &Repo, cmd: &GcCommand, format: OutputFormat) -> anyhow::Result<()> {
    match cmd {
        GcCommand::Plan => plan(repo, format),
        GcCommand::Run { plan_id } => run_plan(repo, plan_id, format),
    }
}

fn plan(repo: &Repo, format: OutputFormat) -> anyhow::Result<()> {
    let retention = repo.config().retention.clone();
    let gc_plan = jvs::gc::plan(repo, &retention)?;
    let report = PlanReport {
        plan_id: gc_plan.plan_id.clone(),
        protected_count: gc_plan.protected_set.len(),
        to_delete: gc_plan.to_delete.clone(),
        deletable_bytes_estimate: gc_plan.deletable_bytes_estimate,
    };
    if format.is_json() {
        OutputFormat::print_json(&report)?;
    } else {
        println!("Plan {}", report.plan_id);
        println!("  protected: {}", report.protected_count);
        println!("  to delete: {} ({} bytes estimated)", report.to_delete.len(), report.deletable_bytes_estimate);
        println!();
        println!("Run with: jvs gc run --plan-id {}", report.plan_id);
    }
    Ok(())
}

fn run_plan(repo: &Repo, plan_id: &str, format: OutputFormat) -> anyhow::Result<()> {
    let result = jvs::gc::run(repo, plan_id)?;
    let report = RunReport {
        deleted: result.deleted,
        failed: result.failed,
    };
    if format.is_json() {
        OutputFormat::print_json(&report)?;
    } else {
        println!("Deleted {} snapshot(s)", report.deleted.len());
        for id in &report.deleted {
            println!("  - {id}");
        }
        if !report.failed.is_empty() {
            println!("Failed:");
            for (id, reason) in &report.failed {
                println!("  - {id}: {reason}");
            }
        }
    }
    Ok(())
}
