//! Command implementations

pub mod apply;
pub mod hostname;
pub mod report;
pub mod resources;
pub mod status;

use anyhow::{Context as AnyhowContext, Result};
use colored::Colorize;
use convergence::{CommandRunner, ResourceRef, Run, RunOutcome, RunSummary, StepStatus};
use rayon::prelude::*;
use std::path::PathBuf;

use crate::manifest::Manifest;
use crate::state::ResourceReport;
use crate::ui;

/// Manifest given on the command line, or the default location
fn manifest_path(arg: Option<PathBuf>) -> Result<PathBuf> {
    match arg {
        Some(path) => Ok(path),
        None => Manifest::default_path(),
    }
}

/// Why-run evaluation of one requested action
pub struct Planned {
    pub resource: ResourceRef,
    pub action: String,
    pub result: std::result::Result<RunOutcome, String>,
}

impl Planned {
    pub fn pending(&self) -> usize {
        self.result.as_ref().map_or(0, RunOutcome::pending)
    }
}

/// Evaluate every requested action of `run` in why-run mode, `jobs` resources
/// at a time. Actions are not consumed, so the run can still converge.
pub fn plan_run(run: &mut Run, runner: &dyn CommandRunner, jobs: usize) -> Result<Vec<Planned>> {
    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(jobs.max(1))
        .build()
        .context("Failed to create planning thread pool")?;

    let planned: Vec<Vec<Planned>> = pool.install(|| {
        run.entries_mut()
            .par_iter_mut()
            .map(|entry| {
                entry
                    .actions
                    .iter()
                    .map(|action| Planned {
                        resource: entry.resource.reference().clone(),
                        action: action.clone(),
                        result: entry
                            .resource
                            .plan(action, runner)
                            .map_err(|e| e.to_string()),
                    })
                    .collect()
            })
            .collect()
    });

    Ok(planned.into_iter().flatten().collect())
}

/// Print a plan, returning the number of steps that would change something
pub fn print_plan(planned: &[Planned], verbose: bool) -> usize {
    let mut pending = 0;
    for item in planned {
        let label = format!("{} ({})", item.resource, item.action);
        match &item.result {
            Ok(outcome) if outcome.pending() == 0 => {
                println!("  {} {}", "○".dimmed(), label.dimmed());
            }
            Ok(outcome) => {
                pending += outcome.pending();
                println!("  {} {}", "~".yellow(), label.bold());
                for step in &outcome.steps {
                    if step.status == StepStatus::WouldExecute || verbose {
                        println!("      {} {}", ui::status_label(&step.status), step.description);
                    }
                    if verbose && step.status == StepStatus::WouldExecute {
                        println!("        {}", step.command.dimmed());
                    }
                }
            }
            Err(error) => {
                println!("  {} {} {}", "?".red(), label.bold(), error.red());
            }
        }
    }
    pending
}

/// Desired state of every declared resource, for the run report
pub fn desired_states(run: &mut Run) -> Vec<ResourceReport> {
    run.entries_mut()
        .iter_mut()
        .map(|entry| ResourceReport {
            resource: entry.resource.reference().clone(),
            desired_state: entry.resource.desired_state().unwrap_or_else(|e| {
                log::warn!("{}: {e}", entry.resource.reference());
                Default::default()
            }),
        })
        .collect()
}

/// Print the totals of a finished run
pub fn print_summary(summary: &RunSummary, why_run: bool) {
    let updated = summary.outcomes.iter().filter(|o| o.updated).count();
    let pending: usize = summary.outcomes.iter().map(RunOutcome::pending).sum();

    ui::section("Summary");
    ui::kv("Actions run", &summary.outcomes.len().to_string());
    if why_run {
        ui::kv("Would change", &pending.to_string());
    } else {
        ui::kv("Updated", &updated.to_string());
    }
    ui::kv("Notifications", &summary.notifications_delivered.to_string());
    if !summary.failures.is_empty() {
        ui::kv("Failed", &summary.failures.len().to_string().red().to_string());
        for failure in &summary.failures {
            ui::dim(&format!("{} ({}): {}", failure.resource, failure.action, failure.error));
        }
    }
    if summary.aborted {
        ui::warn("Run stopped at the first failure (fail_fast)");
    }
}
