//! Action executor - runs an action's steps in declared order
//!
//! For each step the guard is consulted first. A step whose effect already
//! holds is skipped without running its command or sending notifications.
//! The first failing step aborts the action; effects of earlier steps stay
//! in place for the next convergence run to build on.

use crate::context::{RunContext, RuntimeConfig};
use crate::error::{Error, Result};
use crate::guard::GuardEvaluator;
use crate::notification::{Notification, ResourceRef};
use crate::step::Step;
use crate::types::{RunOutcome, StepReport, StepStatus};

/// Runs guarded steps through the context's command runner
pub struct ActionExecutor<'a> {
    config: &'a RuntimeConfig,
}

impl<'a> ActionExecutor<'a> {
    pub fn new(config: &'a RuntimeConfig) -> Self {
        Self { config }
    }

    /// Run `steps` as `action` of `resource`, recording into `outcome`.
    ///
    /// `outcome.updated` is accurate even when this returns an error, since
    /// steps before the failing one may already have changed the system.
    pub fn run(
        &self,
        ctx: &mut RunContext,
        resource: &ResourceRef,
        action: &str,
        steps: &[Step],
        outcome: &mut RunOutcome,
    ) -> Result<()> {
        for step in steps {
            let status = self
                .run_step(ctx, resource, step, outcome)
                .map_err(|source| Error::Step {
                    resource: resource.to_string(),
                    action: action.to_string(),
                    step: step.description.clone(),
                    source: Box::new(source),
                })?;

            let report = StepReport {
                description: step.description.clone(),
                command: step.command.to_string(),
                status,
            };
            if let Some(progress) = ctx.progress.as_deref_mut() {
                progress.on_step(resource, &report);
            }
            outcome.steps.push(report);
        }
        Ok(())
    }

    fn run_step(
        &self,
        ctx: &mut RunContext,
        resource: &ResourceRef,
        step: &Step,
        outcome: &mut RunOutcome,
    ) -> Result<StepStatus> {
        let runner = ctx.runner;

        let guards = GuardEvaluator::new(runner).timeout(self.config.command_timeout);
        if guards.should_skip(step)? {
            let reason = step
                .guard
                .as_ref()
                .map(ToString::to_string)
                .unwrap_or_default();
            log::debug!("{resource}: '{}' up to date", step.description);
            return Ok(StepStatus::Skipped { reason });
        }

        if self.config.why_run {
            log::info!("{resource}: would run '{}': {}", step.description, step.command);
            return Ok(StepStatus::WouldExecute);
        }

        let mut command = step.command.clone();
        command.privileged = true;
        if command.timeout.is_none() {
            command.timeout = self.config.command_timeout;
        }

        log::info!("{resource}: {} ({command})", step.description);
        runner.run_checked(&command, &step.returns)?;
        outcome.updated = true;

        for spec in &step.notifications {
            let notification = Notification {
                source: resource.clone(),
                target: spec.target.clone(),
                action: spec.action.clone(),
                timing: spec.timing,
            };
            ctx.router.enqueue(notification.clone());
            outcome.notifications.push(notification);
        }

        Ok(StepStatus::Executed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::{CommandLine, CommandOutput};
    use crate::guard::Condition;
    use crate::notification::{NotificationRouter, Timing};
    use crate::testing::ScriptedRunner;
    use std::time::Duration;

    fn resource() -> ResourceRef {
        ResourceRef::new("test", "steps")
    }

    fn ohai() -> ResourceRef {
        ResourceRef::new("ohai", "reload hostname")
    }

    fn run_steps(
        runner: &ScriptedRunner,
        config: &RuntimeConfig,
        steps: &[Step],
        router: &mut NotificationRouter,
    ) -> (RunOutcome, Result<()>) {
        let mut ctx = RunContext::new(runner, router);
        let mut outcome = RunOutcome::new(&resource(), "run");
        let result = ActionExecutor::new(config).run(&mut ctx, &resource(), "run", steps, &mut outcome);
        (outcome, result)
    }

    #[test]
    fn test_guard_true_never_runs_command() {
        let runner = ScriptedRunner::new()
            .respond("check", CommandOutput::ok(""))
            .handle(|_| Some(CommandOutput::ok("")));
        let steps = vec![
            Step::execute("guarded", CommandLine::new("mutate"))
                .not_if(Condition::Succeeds(CommandLine::new("check")))
                .notifies("reload", &ohai()),
        ];
        let mut router = NotificationRouter::new();

        let (outcome, result) = run_steps(&runner, &RuntimeConfig::default(), &steps, &mut router);

        result.unwrap();
        assert_eq!(runner.count("mutate"), 0);
        assert!(!outcome.updated);
        assert!(outcome.notifications.is_empty());
        assert!(router.is_empty());
        assert!(matches!(outcome.steps[0].status, StepStatus::Skipped { .. }));
    }

    #[test]
    fn test_failure_aborts_remaining_steps() {
        let runner = ScriptedRunner::new()
            .respond("b", CommandOutput::failed(1, "b broke"))
            .handle(|_| Some(CommandOutput::ok("")));
        let steps = vec![
            Step::execute("A", CommandLine::new("a")),
            Step::execute("B", CommandLine::new("b")),
            Step::execute("C", CommandLine::new("c")),
        ];
        let mut router = NotificationRouter::new();

        let (outcome, result) = run_steps(&runner, &RuntimeConfig::default(), &steps, &mut router);

        let err = result.unwrap_err();
        match &err {
            Error::Step { step, action, .. } => {
                assert_eq!(step, "B");
                assert_eq!(action, "run");
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(err.command_output(), Some(("", "b broke")));
        assert_eq!(runner.calls(), vec!["a", "b"]);
        // A's effect happened and is reported
        assert!(outcome.updated);
        assert_eq!(outcome.steps.len(), 1);
    }

    #[test]
    fn test_steps_run_in_declared_order() {
        let runner = ScriptedRunner::new().handle(|_| Some(CommandOutput::ok("")));
        let steps: Vec<Step> = ["one", "two", "three"]
            .iter()
            .map(|n| Step::execute(n, CommandLine::new(n)))
            .collect();
        let mut router = NotificationRouter::new();

        let (outcome, result) = run_steps(&runner, &RuntimeConfig::default(), &steps, &mut router);

        result.unwrap();
        assert_eq!(runner.calls(), vec!["one", "two", "three"]);
        assert!(outcome.updated);
    }

    #[test]
    fn test_executed_steps_queue_notifications() {
        let runner = ScriptedRunner::new().handle(|_| Some(CommandOutput::ok("")));
        let steps = vec![
            Step::execute("first", CommandLine::new("x")).notifies("reload", &ohai()),
            Step::execute("second", CommandLine::new("y")).notifies("reload", &ohai()),
        ];
        let mut router = NotificationRouter::new();

        let (outcome, result) = run_steps(&runner, &RuntimeConfig::default(), &steps, &mut router);

        result.unwrap();
        assert_eq!(outcome.notifications.len(), 2);
        let drained = router.drain();
        assert_eq!(drained.len(), 1);
        assert_eq!(drained[0].target, ohai());
        assert_eq!(drained[0].timing, Timing::Delayed);
    }

    #[test]
    fn test_why_run_evaluates_guards_only() {
        let runner = ScriptedRunner::new()
            .respond("check", CommandOutput::failed(1, ""))
            .handle(|_| Some(CommandOutput::ok("")));
        let config = RuntimeConfig {
            why_run: true,
            ..Default::default()
        };
        let steps = vec![
            Step::execute("guarded", CommandLine::new("mutate"))
                .not_if(Condition::Succeeds(CommandLine::new("check")))
                .notifies("reload", &ohai()),
        ];
        let mut router = NotificationRouter::new();

        let (outcome, result) = run_steps(&runner, &config, &steps, &mut router);

        result.unwrap();
        assert_eq!(runner.calls(), vec!["check"]);
        assert!(!outcome.updated);
        assert_eq!(outcome.pending(), 1);
        assert!(router.is_empty());
    }

    #[test]
    fn test_guard_error_stops_action() {
        let runner = ScriptedRunner::new().respond("status", CommandOutput::failed(2, "unreadable"));
        let steps = vec![
            Step::execute("guarded", CommandLine::new("mutate"))
                .not_if(Condition::output_equals(CommandLine::new("status"), "ok")),
        ];
        let mut router = NotificationRouter::new();

        let (outcome, result) = run_steps(&runner, &RuntimeConfig::default(), &steps, &mut router);

        assert!(result.unwrap_err().is_guard_failure());
        assert_eq!(runner.count("mutate"), 0);
        assert!(!outcome.updated);
    }

    #[test]
    fn test_default_timeout_applied() {
        let runner = ScriptedRunner::new().handle(|_| Some(CommandOutput::ok("")));
        let config = RuntimeConfig {
            command_timeout: Some(Duration::from_secs(5)),
            ..Default::default()
        };
        let steps = vec![
            Step::execute("default", CommandLine::new("a")),
            Step::execute("own", CommandLine::new("b").timeout(Duration::from_secs(60))),
        ];
        let mut router = NotificationRouter::new();

        run_steps(&runner, &config, &steps, &mut router).1.unwrap();

        let timeouts: Vec<_> = runner.commands().iter().map(|c| c.timeout).collect();
        assert_eq!(
            timeouts,
            vec![Some(Duration::from_secs(5)), Some(Duration::from_secs(60))]
        );
    }

    #[test]
    fn test_accepted_exit_codes() {
        let runner = ScriptedRunner::new().respond("grep", CommandOutput::failed(1, ""));
        let steps = vec![Step::execute("tolerant", CommandLine::new("grep")).returns(&[0, 1])];
        let mut router = NotificationRouter::new();

        let (outcome, result) = run_steps(&runner, &RuntimeConfig::default(), &steps, &mut router);

        result.unwrap();
        assert!(outcome.updated);
    }

    #[test]
    fn test_only_step_commands_are_privileged() {
        let runner = ScriptedRunner::new()
            .respond("/usr/sbin/scutil --get LocalHostName", CommandOutput::ok("old\n"))
            .handle(|_| Some(CommandOutput::ok("")));
        let config = RuntimeConfig {
            command_timeout: Some(Duration::from_secs(5)),
            ..Default::default()
        };
        let steps = vec![
            Step::execute(
                "set LocalHostName",
                CommandLine::new("/usr/sbin/scutil").args(["--set", "LocalHostName", "new"]),
            )
            .not_if(Condition::output_equals(
                CommandLine::new("/usr/sbin/scutil").args(["--get", "LocalHostName"]),
                "new",
            )),
        ];
        let mut router = NotificationRouter::new();

        run_steps(&runner, &config, &steps, &mut router).1.unwrap();

        let commands = runner.commands();
        assert_eq!(commands.len(), 2);
        assert!(!commands[0].privileged);
        assert_eq!(commands[0].timeout, Some(Duration::from_secs(5)));
        assert!(commands[1].privileged);
    }
}
