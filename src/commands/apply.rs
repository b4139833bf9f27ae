//! `steward apply` - converge every resource in the manifest

use anyhow::{Context as AnyhowContext, Result, bail};
use chrono::Utc;
use convergence::CommandRunner;
use dialoguer::Confirm;
use std::sync::Arc;

use super::{desired_states, manifest_path, plan_run, print_plan, print_summary};
use crate::Context;
use crate::cli::ApplyArgs;
use crate::manifest::Manifest;
use crate::resource::Catalog;
use crate::runner::ShellRunner;
use crate::state::RunReport;
use crate::sudo::SudoContext;
use crate::ui::{self, UiProgress};

pub fn run(ctx: &Context, args: ApplyArgs) -> Result<()> {
    let path = manifest_path(args.manifest)?;
    let manifest = Manifest::load(&path)?;
    let catalog = Catalog::new(&ctx.config).with_why_run(args.dry_run);
    let why_run = catalog.runtime().why_run;

    let runner: Arc<dyn CommandRunner> = Arc::new(ShellRunner::new(ctx.config.sudo.clone()));
    let mut run = manifest
        .build_run(&catalog, Arc::clone(&runner))
        .with_context(|| format!("Invalid manifest: {}", path.display()))?;

    ui::header("Applying manifest");
    ui::kv("Manifest", &path.display().to_string());
    ui::kv("Resources", &run.entries().len().to_string());
    if why_run {
        ui::warn("Why-run mode - no changes will be made");
    }

    if !why_run {
        ui::section("Plan");
        let planned = plan_run(&mut run, runner.as_ref(), 4)?;
        let pending = print_plan(&planned, ctx.verbose > 0);
        if pending == 0 && planned.iter().all(|p| p.result.is_ok()) {
            println!();
            ui::success("Everything is up to date");
            return Ok(());
        }

        if !args.yes {
            println!();
            let confirmed = Confirm::new()
                .with_prompt(format!("Apply {pending} change(s)?"))
                .default(true)
                .interact()?;
            if !confirmed {
                ui::info("Aborted");
                return Ok(());
            }
        }
    }

    let _sudo = if !why_run && !ctx.config.sudo.is_empty() {
        Some(SudoContext::acquire(&format!(
            "run {} with sudo",
            ctx.config.sudo.programs.join(", ")
        ))?)
    } else {
        None
    };

    ui::section("Converging");
    let started_at = Utc::now();
    let mut progress = UiProgress::new(ctx.quiet, ctx.verbose > 0);
    let summary = run.converge_with_progress(&mut progress);
    print_summary(&summary, why_run);

    let resources = desired_states(&mut run);
    let report = RunReport::new(started_at, Some(&path), why_run, resources, summary);
    if !why_run {
        report.save(&ctx.config.state_file()?)?;
    }

    if !report.is_success() {
        bail!("{} action(s) failed", report.failures.len());
    }

    println!();
    ui::success("Apply complete!");
    Ok(())
}
