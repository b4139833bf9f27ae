//! `steward hostname` - set the machine's names without a manifest

use anyhow::{Context as AnyhowContext, Result, bail};
use convergence::{CommandRunner, Run};
use std::sync::{Arc, PoisonError};

use super::print_summary;
use crate::Context;
use crate::cli::{HostnameActionArg, HostnameArgs};
use crate::resource::{Catalog, HostnameAction, Ohai, macos_hostname};
use crate::runner::ShellRunner;
use crate::sudo::SudoContext;
use crate::ui::{self, UiProgress};

impl From<HostnameActionArg> for HostnameAction {
    fn from(arg: HostnameActionArg) -> Self {
        match arg {
            HostnameActionArg::Set => Self::Set,
            HostnameActionArg::Local => Self::Local,
            HostnameActionArg::ComputerName => Self::ComputerName,
            HostnameActionArg::Host => Self::Host,
        }
    }
}

pub fn run(ctx: &Context, args: HostnameArgs) -> Result<()> {
    let catalog = Catalog::new(&ctx.config).with_why_run(args.dry_run);
    let why_run = catalog.runtime().why_run;
    let action = HostnameAction::from(args.action);

    let mut resource = catalog
        .declare(macos_hostname::RESOURCE_TYPE, &args.name)
        .context("macos_hostname is not available")?;
    if let Some(name) = &args.computername {
        resource.set_property("computername", name.as_str().into())?;
    }
    if let Some(name) = &args.localhostname {
        resource.set_property("localhostname", name.as_str().into())?;
    }

    let runner: Arc<dyn CommandRunner> = Arc::new(ShellRunner::new(ctx.config.sudo.clone()));
    let mut run = Run::new(catalog.runtime().clone(), runner);
    run.add_with_actions(resource, vec![action.to_string()]);
    let ohai = Ohai::hostname();
    let facts = ohai.facts();
    run.add_target(Box::new(ohai));

    ui::header(&format!("macos_hostname[{}] ({action})", args.name));

    let _sudo = if !why_run && !ctx.config.sudo.is_empty() {
        Some(SudoContext::acquire("change the system hostname")?)
    } else {
        None
    };

    let mut progress = UiProgress::new(ctx.quiet, ctx.verbose > 0);
    let summary = run.converge_with_progress(&mut progress);
    print_summary(&summary, why_run);

    let facts = facts.lock().unwrap_or_else(PoisonError::into_inner);
    if !facts.is_empty() {
        ui::section("Reloaded facts");
        for (fact, value) in facts.iter() {
            ui::kv(fact, value);
        }
    }

    if !summary.failures.is_empty() {
        bail!("Failed to set hostname");
    }
    Ok(())
}
