//! `steward report` - show the last apply

use anyhow::{Context as AnyhowContext, Result};
use colored::Colorize;

use crate::Context;
use crate::state::RunReport;
use crate::ui;

pub fn run(ctx: &Context, json: bool) -> Result<()> {
    let path = ctx.config.state_file()?;
    let Some(report) = RunReport::load(&path)? else {
        ui::info("No run recorded yet - run `steward apply` first");
        return Ok(());
    };

    if json {
        let content = serde_json::to_string_pretty(&report).context("Failed to serialize run report")?;
        println!("{content}");
        return Ok(());
    }

    ui::header("Last run");
    ui::kv("Started", &report.started_at.format("%Y-%m-%d %H:%M:%S UTC").to_string());
    let elapsed = report.finished_at - report.started_at;
    ui::kv("Duration", &format!("{:.1}s", elapsed.num_milliseconds() as f64 / 1000.0));
    if let Some(manifest) = &report.manifest {
        ui::kv("Manifest", manifest);
    }
    ui::kv("Updated", &report.updated().to_string());
    ui::kv("Notifications", &report.notifications_delivered.to_string());

    ui::section("Actions");
    for outcome in &report.outcomes {
        let marker = if outcome.updated { "✓".green() } else { "○".dimmed() };
        println!("  {marker} {} ({})", outcome.resource, outcome.action);
        if ctx.verbose > 0 {
            for step in &outcome.steps {
                println!("      {} {}", ui::status_label(&step.status), step.description);
            }
        }
    }

    if ctx.verbose > 0 && !report.resources.is_empty() {
        ui::section("Desired state");
        for resource in &report.resources {
            println!("  {}", resource.resource.to_string().bold());
            for (property, value) in &resource.desired_state {
                ui::kv(&format!("  {property}"), &value.to_string());
            }
        }
    }

    if !report.is_success() {
        ui::section("Failures");
        for failure in &report.failures {
            ui::error(&format!("{} ({}): {}", failure.resource, failure.action, failure.error));
        }
    }
    if report.aborted {
        ui::warn("The run stopped at the first failure");
    }
    Ok(())
}
