//! `steward status` - what apply would change

use anyhow::{Context as AnyhowContext, Result};
use convergence::CommandRunner;
use std::sync::Arc;

use super::{manifest_path, plan_run, print_plan};
use crate::Context;
use crate::cli::StatusArgs;
use crate::manifest::Manifest;
use crate::resource::Catalog;
use crate::runner::ShellRunner;
use crate::ui;

pub fn run(ctx: &Context, args: StatusArgs) -> Result<()> {
    let path = manifest_path(args.manifest)?;
    let manifest = Manifest::load(&path)?;
    let catalog = Catalog::new(&ctx.config).with_why_run(true);

    // Guards only read state, so no sudo wrapping here
    let runner: Arc<dyn CommandRunner> = Arc::new(ShellRunner::default());
    let mut run = manifest
        .build_run(&catalog, Arc::clone(&runner))
        .with_context(|| format!("Invalid manifest: {}", path.display()))?;

    ui::header("Status");
    ui::kv("Manifest", &path.display().to_string());
    println!();

    let planned = plan_run(&mut run, runner.as_ref(), usize::from(args.jobs))?;
    let pending = print_plan(&planned, ctx.verbose > 0);
    let errors = planned.iter().filter(|p| p.result.is_err()).count();

    println!();
    if errors > 0 {
        ui::warn(&format!("{errors} resource(s) could not be checked"));
    }
    if pending == 0 {
        ui::success("Everything is up to date");
    } else {
        ui::info(&format!("{pending} change(s) pending - run `steward apply`"));
    }
    Ok(())
}
