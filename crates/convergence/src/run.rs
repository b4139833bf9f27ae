//! Run scheduler - converges a list of declared resources
//!
//! Resources whose `compile_time` property is true run first, then the rest
//! in declaration order. Immediate notifications are delivered as soon as
//! the triggering action completes; delayed ones are drained at the end of
//! the run, each (target, action) at most once.

use crate::command::CommandRunner;
use crate::context::{NoProgress, NotificationTarget, ProgressCallback, RunContext, RuntimeConfig};
use crate::error::Error;
use crate::notification::{Notification, NotificationRouter, ResourceRef};
use crate::resource::BoxedResource;
use crate::types::{Failure, RunSummary};
use std::fmt;
use std::sync::Arc;

/// Immediate notifications may trigger further immediate notifications; this
/// bounds the chain.
pub const MAX_NOTIFICATION_DEPTH: usize = 16;

/// A declared resource and the actions requested for it
#[derive(Debug)]
pub struct RunEntry {
    pub resource: BoxedResource,
    pub actions: Vec<String>,
}

/// One convergence run over a set of declared resources
pub struct Run {
    config: RuntimeConfig,
    runner: Arc<dyn CommandRunner>,
    entries: Vec<RunEntry>,
    targets: Vec<Box<dyn NotificationTarget>>,
    router: NotificationRouter,
}

impl fmt::Debug for Run {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let targets: Vec<&ResourceRef> = self.targets.iter().map(|t| t.reference()).collect();
        f.debug_struct("Run")
            .field("config", &self.config)
            .field("entries", &self.entries)
            .field("targets", &targets)
            .field("router", &self.router)
            .finish_non_exhaustive()
    }
}

impl Run {
    pub fn new(config: RuntimeConfig, runner: Arc<dyn CommandRunner>) -> Self {
        Self {
            config,
            runner,
            entries: Vec::new(),
            targets: Vec::new(),
            router: NotificationRouter::new(),
        }
    }

    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    pub fn runner(&self) -> &dyn CommandRunner {
        self.runner.as_ref()
    }

    /// Declare a resource that runs its default action
    pub fn add(&mut self, resource: BoxedResource) {
        let action = resource.default_action();
        self.add_with_actions(resource, vec![action]);
    }

    /// Declare a resource that runs `actions` in order
    pub fn add_with_actions(&mut self, resource: BoxedResource, actions: Vec<String>) {
        self.entries.push(RunEntry { resource, actions });
    }

    /// Register a non-resource notification target
    pub fn add_target(&mut self, target: Box<dyn NotificationTarget>) {
        self.targets.push(target);
    }

    pub fn entries(&self) -> &[RunEntry] {
        &self.entries
    }

    pub fn entries_mut(&mut self) -> &mut [RunEntry] {
        &mut self.entries
    }

    /// Converge every declared resource
    pub fn converge(&mut self) -> RunSummary {
        self.converge_with_progress(&mut NoProgress)
    }

    /// Converge every declared resource, reporting progress
    pub fn converge_with_progress(&mut self, progress: &mut dyn ProgressCallback) -> RunSummary {
        let mut summary = RunSummary::default();

        let mut compile = Vec::new();
        let mut converge = Vec::new();
        for (index, entry) in self.entries.iter_mut().enumerate() {
            let compile_time = entry.resource.compile_time().unwrap_or_else(|e| {
                log::warn!("{}: {e}", entry.resource.reference());
                false
            });
            if compile_time {
                compile.push(index);
            } else {
                converge.push(index);
            }
        }
        log::debug!(
            "{} resource(s) at compile time, {} at converge time",
            compile.len(),
            converge.len()
        );

        'resources: for index in compile.into_iter().chain(converge) {
            let actions = self.entries[index].actions.clone();
            for action in actions {
                if self.entries[index].resource.has_run(&action) {
                    log::debug!(
                        "{}: '{action}' already ran this run, skipping",
                        self.entries[index].resource.reference()
                    );
                    continue;
                }
                if !self.run_entry(index, &action, 0, progress, &mut summary) && self.config.fail_fast {
                    summary.aborted = true;
                    break 'resources;
                }
            }
        }

        if summary.aborted {
            log::info!("Running queued delayed notifications before stopping");
        }
        'delayed: loop {
            let batch = self.router.drain();
            if batch.is_empty() {
                break;
            }
            for notification in batch {
                if !self.deliver(&notification, 0, progress, &mut summary) && self.config.fail_fast {
                    summary.aborted = true;
                    break 'delayed;
                }
            }
        }

        summary
    }

    /// Run one action of one entry, then its immediate notifications.
    /// Returns false when anything failed.
    fn run_entry(
        &mut self,
        index: usize,
        action: &str,
        depth: usize,
        progress: &mut dyn ProgressCallback,
        summary: &mut RunSummary,
    ) -> bool {
        let runner = Arc::clone(&self.runner);
        let entry = &mut self.entries[index];
        let reference = entry.resource.reference().clone();

        progress.on_action_start(&reference, action);
        let result = {
            let mut ctx = RunContext::with_progress(runner.as_ref(), &mut self.router, &mut *progress);
            entry.resource.run(action, &mut ctx)
        };

        match result {
            Ok(outcome) => {
                progress.on_action_complete(&outcome);
                summary.outcomes.push(outcome);
                self.dispatch_immediate(depth, progress, summary)
            }
            Err(e) => {
                let dropped = self.router.take_immediate();
                if !dropped.is_empty() {
                    log::debug!(
                        "{reference}: dropping {} immediate notification(s) after failure",
                        dropped.len()
                    );
                }
                self.record_failure(&reference, action, &e, progress, summary);
                false
            }
        }
    }

    fn dispatch_immediate(
        &mut self,
        depth: usize,
        progress: &mut dyn ProgressCallback,
        summary: &mut RunSummary,
    ) -> bool {
        let pending = self.router.take_immediate();
        if pending.is_empty() {
            return true;
        }
        if depth >= MAX_NOTIFICATION_DEPTH {
            log::warn!(
                "Immediate notifications nested deeper than {MAX_NOTIFICATION_DEPTH}, dropping {}",
                pending.len()
            );
            return true;
        }
        for notification in pending {
            if !self.deliver(&notification, depth + 1, progress, summary) {
                return false;
            }
        }
        true
    }

    /// Deliver one notification to a registered target or a declared resource
    fn deliver(
        &mut self,
        notification: &Notification,
        depth: usize,
        progress: &mut dyn ProgressCallback,
        summary: &mut RunSummary,
    ) -> bool {
        let target = &notification.target;
        let action = notification.action.as_str();

        if let Some(pos) = self.targets.iter().position(|t| t.reference() == target) {
            progress.on_notification(notification);
            log::info!("{notification}");
            let result = {
                let mut ctx = RunContext::with_progress(self.runner.as_ref(), &mut self.router, &mut *progress);
                self.targets[pos].handle(action, &mut ctx)
            };
            return match result {
                Ok(changed) => {
                    summary.notifications_delivered += 1;
                    log::debug!("{target}: '{action}' handled (changed: {changed})");
                    self.dispatch_immediate(depth, progress, summary)
                }
                Err(e) => {
                    self.record_failure(target, action, &e, progress, summary);
                    false
                }
            };
        }

        let Some(index) = self
            .entries
            .iter()
            .position(|e| e.resource.reference() == target)
        else {
            let e = Error::UnknownResource(target.to_string());
            self.record_failure(target, action, &e, progress, summary);
            return false;
        };

        if self.entries[index].resource.has_run(action) {
            log::debug!("{target}: '{action}' already ran this run, ignoring {notification}");
            return true;
        }

        progress.on_notification(notification);
        log::info!("{notification}");
        summary.notifications_delivered += 1;
        self.run_entry(index, action, depth, progress, summary)
    }

    fn record_failure(
        &self,
        resource: &ResourceRef,
        action: &str,
        error: &Error,
        progress: &mut dyn ProgressCallback,
        summary: &mut RunSummary,
    ) {
        log::debug!("{resource}: '{action}' failed: {error}");
        progress.on_action_failed(resource, action, error);
        summary.failures.push(Failure {
            resource: resource.clone(),
            action: action.to_string(),
            error: error.to_string(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::{CommandLine, CommandOutput};
    use crate::context::RunContext;
    use crate::error::Result;
    use crate::guard::Condition;
    use crate::property::{PropertySpec, PropertyType};
    use crate::resource::{ActionName, Declaration, Lifecycle};
    use crate::step::Step;
    use crate::testing::ScriptedRunner;
    use std::collections::HashMap;
    use std::fmt;
    use std::sync::Mutex;

    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    enum SvcAction {
        Start,
        Restart,
        Fail,
    }

    impl fmt::Display for SvcAction {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            match self {
                Self::Start => write!(f, "start"),
                Self::Restart => write!(f, "restart"),
                Self::Fail => write!(f, "fail"),
            }
        }
    }

    impl ActionName for SvcAction {
        fn all() -> &'static [Self] {
            &[Self::Start, Self::Restart, Self::Fail]
        }
    }

    /// A service resource that notifies `notify` targets whenever it starts
    fn service(notify: &[(&str, &str, bool)]) -> Declaration<SvcAction> {
        let notify: Vec<(ResourceRef, String, bool)> = notify
            .iter()
            .map(|(target, action, immediate)| (target.parse().unwrap(), action.to_string(), *immediate))
            .collect();
        Declaration::new("svc", SvcAction::Start)
            .property(PropertySpec::new("unit", PropertyType::String).name_property())
            .action(SvcAction::Start, "Start the unit", move |props, _| {
                let unit = props.get_string("unit")?;
                let mut step = Step::execute("start", CommandLine::new("svc").args(["start", &unit]))
                    .not_if(Condition::Succeeds(CommandLine::new("svc").args(["running", &unit])));
                for (target, action, immediate) in &notify {
                    step = if *immediate {
                        step.notifies_immediately(action, target)
                    } else {
                        step.notifies(action, target)
                    };
                }
                Ok(vec![step])
            })
            .action(SvcAction::Restart, "Restart the unit", |props, _| {
                let unit = props.get_string("unit")?;
                Ok(vec![Step::execute("restart", CommandLine::new("svc").args(["restart", &unit]))])
            })
            .action(SvcAction::Fail, "Always fails", |props, _| {
                let unit = props.get_string("unit")?;
                Ok(vec![Step::execute("fail", CommandLine::new("svc").args(["fail", &unit]))])
            })
    }

    fn runner() -> Arc<ScriptedRunner> {
        Arc::new(ScriptedRunner::new().handle(|cmd| match cmd.args.first().map(String::as_str) {
            Some("running") => Some(CommandOutput::failed(3, "")),
            Some("fail") => Some(CommandOutput::failed(1, "unit is masked")),
            _ => Some(CommandOutput::ok("")),
        }))
    }

    fn add(run: &mut Run, decl: &Declaration<SvcAction>, name: &str) {
        run.add(Box::new(decl.declare(name, RuntimeConfig::default())));
    }

    struct Recorder {
        reference: ResourceRef,
        seen: Arc<Mutex<Vec<String>>>,
    }

    impl NotificationTarget for Recorder {
        fn reference(&self) -> &ResourceRef {
            &self.reference
        }

        fn handle(&mut self, action: &str, _ctx: &mut RunContext) -> Result<bool> {
            self.seen.lock().unwrap().push(action.to_string());
            Ok(true)
        }
    }

    fn recorder(reference: &str) -> (Box<Recorder>, Arc<Mutex<Vec<String>>>) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let target = Recorder {
            reference: reference.parse().unwrap(),
            seen: Arc::clone(&seen),
        };
        (Box::new(target), seen)
    }

    #[test]
    fn test_debug_lists_entries_and_targets() {
        let mut run = Run::new(RuntimeConfig::default(), runner());
        add(&mut run, &service(&[]), "db");
        let (target, _) = recorder("ohai[reload hostname]");
        run.add_target(target);

        let debug = format!("{run:?}");
        assert!(debug.starts_with("Run {"));
        assert!(debug.contains("reload hostname"));
    }

    #[test]
    fn test_resources_run_in_declaration_order() {
        let runner = runner();
        let mut run = Run::new(RuntimeConfig::default(), runner.clone());
        let decl = service(&[]);
        add(&mut run, &decl, "db");
        add(&mut run, &decl, "web");

        let summary = run.converge();

        assert!(summary.is_success());
        assert_eq!(summary.updated(), 2);
        assert_eq!(
            runner.calls(),
            vec!["svc running db", "svc start db", "svc running web", "svc start web"]
        );
    }

    #[test]
    fn test_compile_time_resources_run_first() {
        let runner = runner();
        let mut run = Run::new(RuntimeConfig::default(), runner.clone());
        let decl = service(&[]);
        add(&mut run, &decl, "late");
        let mut early = decl.declare("early", RuntimeConfig::default());
        early.set("compile_time", true).unwrap();
        run.add(Box::new(early));

        run.converge();

        let starts: Vec<String> = runner
            .calls()
            .into_iter()
            .filter(|c| c.starts_with("svc start"))
            .collect();
        assert_eq!(starts, vec!["svc start early", "svc start late"]);
    }

    #[test]
    fn test_delayed_notifications_delivered_once_at_end() {
        let runner = runner();
        let mut run = Run::new(RuntimeConfig::default(), runner.clone());
        let (ohai, seen) = recorder("ohai[reload hostname]");
        run.add_target(ohai);
        let decl = service(&[("ohai[reload hostname]", "reload", false)]);
        add(&mut run, &decl, "a");
        add(&mut run, &decl, "b");

        let summary = run.converge();

        assert!(summary.is_success());
        assert_eq!(*seen.lock().unwrap(), vec!["reload"]);
        assert_eq!(summary.notifications_delivered, 1);
    }

    #[test]
    fn test_immediate_notification_runs_before_next_resource() {
        let runner = runner();
        let mut run = Run::new(RuntimeConfig::default(), runner.clone());
        let notifying = service(&[("svc[web]", "restart", true)]);
        let plain = service(&[]);
        add(&mut run, &notifying, "db");
        add(&mut run, &plain, "cache");
        add(&mut run, &plain, "web");

        let summary = run.converge();

        assert!(summary.is_success());
        let mutations: Vec<String> = runner
            .calls()
            .into_iter()
            .filter(|c| !c.starts_with("svc running"))
            .collect();
        assert_eq!(
            mutations,
            vec!["svc start db", "svc restart web", "svc start cache", "svc start web"]
        );
    }

    #[test]
    fn test_notified_action_not_repeated() {
        let runner = runner();
        let mut run = Run::new(RuntimeConfig::default(), runner.clone());
        let notifying = service(&[("svc[web]", "start", true)]);
        let plain = service(&[]);
        add(&mut run, &notifying, "db");
        add(&mut run, &plain, "web");

        let summary = run.converge();

        assert!(summary.is_success());
        assert_eq!(runner.count("svc start web"), 1);
        assert_eq!(summary.outcomes.len(), 2);
    }

    #[test]
    fn test_up_to_date_resource_sends_nothing() {
        let runner = Arc::new(
            ScriptedRunner::new()
                .respond("svc running db", CommandOutput::ok(""))
                .handle(|_| Some(CommandOutput::ok(""))),
        );
        let mut run = Run::new(RuntimeConfig::default(), runner.clone());
        let (ohai, seen) = recorder("ohai[reload hostname]");
        run.add_target(ohai);
        add(&mut run, &service(&[("ohai[reload hostname]", "reload", false)]), "db");

        let summary = run.converge();

        assert_eq!(summary.updated(), 0);
        assert!(seen.lock().unwrap().is_empty());
        assert_eq!(runner.count("svc start db"), 0);
    }

    #[test]
    fn test_unknown_notification_target_fails() {
        let runner = runner();
        let mut run = Run::new(RuntimeConfig::default(), runner);
        add(&mut run, &service(&[("ohai[missing]", "reload", false)]), "db");

        let summary = run.converge();

        assert!(!summary.is_success());
        assert_eq!(summary.failures[0].resource.to_string(), "ohai[missing]");
        assert!(summary.failures[0].error.contains("ohai[missing]"));
    }

    #[test]
    fn test_fail_fast_stops_run_but_drains_delayed() {
        let runner = runner();
        let mut run = Run::new(RuntimeConfig::default(), runner.clone());
        let (ohai, seen) = recorder("ohai[reload hostname]");
        run.add_target(ohai);
        add(&mut run, &service(&[("ohai[reload hostname]", "reload", false)]), "db");
        let decl = service(&[]);
        run.add_with_actions(
            Box::new(decl.declare("broken", RuntimeConfig::default())),
            vec!["fail".to_string()],
        );
        add(&mut run, &decl, "never");

        let summary = run.converge();

        assert!(summary.aborted);
        assert_eq!(summary.failures.len(), 1);
        assert!(summary.failures[0].error.contains("unit is masked"));
        assert_eq!(runner.count("svc start never"), 0);
        assert_eq!(*seen.lock().unwrap(), vec!["reload"]);
        assert_eq!(run.entries()[1].resource.state(), &Lifecycle::Failed);
    }

    #[test]
    fn test_keep_going_without_fail_fast() {
        let runner = runner();
        let config = RuntimeConfig {
            fail_fast: false,
            ..Default::default()
        };
        let mut run = Run::new(config, runner.clone());
        let decl = service(&[]);
        run.add_with_actions(
            Box::new(decl.declare("broken", RuntimeConfig::default())),
            vec!["fail".to_string()],
        );
        add(&mut run, &decl, "web");

        let summary = run.converge();

        assert!(!summary.aborted);
        assert_eq!(summary.failures.len(), 1);
        assert_eq!(runner.count("svc start web"), 1);
    }

    #[test]
    fn test_why_run_delivers_nothing() {
        let runner = runner();
        let config = RuntimeConfig {
            why_run: true,
            ..Default::default()
        };
        let mut run = Run::new(config.clone(), runner.clone());
        let (ohai, seen) = recorder("ohai[reload hostname]");
        run.add_target(ohai);
        run.add(Box::new(
            service(&[("ohai[reload hostname]", "reload", false)]).declare("db", config),
        ));

        let summary = run.converge();

        assert_eq!(summary.outcomes[0].pending(), 1);
        assert!(seen.lock().unwrap().is_empty());
        assert_eq!(runner.count("svc start db"), 0);
    }

    #[test]
    fn test_progress_events() {
        #[derive(Default)]
        struct Events(HashMap<&'static str, usize>);

        impl ProgressCallback for Events {
            fn on_action_start(&mut self, _: &ResourceRef, _: &str) {
                *self.0.entry("start").or_default() += 1;
            }
            fn on_step(&mut self, _: &ResourceRef, _: &crate::types::StepReport) {
                *self.0.entry("step").or_default() += 1;
            }
            fn on_action_complete(&mut self, _: &crate::types::RunOutcome) {
                *self.0.entry("complete").or_default() += 1;
            }
            fn on_action_failed(&mut self, _: &ResourceRef, _: &str, _: &Error) {
                *self.0.entry("failed").or_default() += 1;
            }
            fn on_notification(&mut self, _: &Notification) {
                *self.0.entry("notification").or_default() += 1;
            }
        }

        let mut run = Run::new(RuntimeConfig::default(), runner());
        let (ohai, _) = recorder("ohai[reload hostname]");
        run.add_target(ohai);
        add(&mut run, &service(&[("ohai[reload hostname]", "reload", false)]), "db");
        let mut events = Events::default();

        run.converge_with_progress(&mut events);

        assert_eq!(events.0["start"], 1);
        assert_eq!(events.0["step"], 1);
        assert_eq!(events.0["complete"], 1);
        assert_eq!(events.0["notification"], 1);
        assert!(!events.0.contains_key("failed"));
    }
}
