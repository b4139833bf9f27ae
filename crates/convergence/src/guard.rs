//! Guard evaluation - decides whether a step's effect already holds
//!
//! Guards only read system state. A guard whose status query fails is an
//! error, never a skip: unreadable state cannot prove the desired state
//! is already in place.

use crate::command::{CommandLine, CommandOutput, CommandRunner, ExitStatus};
use crate::error::{Error, Result};
use crate::step::Step;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// Read-only predicate over the system
pub type CheckFn = Arc<dyn Fn(&dyn CommandRunner) -> Result<bool> + Send + Sync>;

/// A condition checked against current system state
#[derive(Clone)]
pub enum Condition {
    /// Stdout of `command`, minus trailing whitespace, equals `expected`
    OutputEquals { command: CommandLine, expected: String },
    /// `command` exits with status 0
    Succeeds(CommandLine),
    /// Arbitrary read-only predicate, described by `label`
    Check { label: String, check: CheckFn },
}

impl Condition {
    pub fn output_equals(command: CommandLine, expected: impl Into<String>) -> Self {
        Self::OutputEquals {
            command,
            expected: expected.into(),
        }
    }

    pub fn check<F>(label: impl Into<String>, f: F) -> Self
    where
        F: Fn(&dyn CommandRunner) -> Result<bool> + Send + Sync + 'static,
    {
        Self::Check {
            label: label.into(),
            check: Arc::new(f),
        }
    }

    fn holds(&self, runner: &dyn CommandRunner) -> std::result::Result<bool, String> {
        match self {
            Self::OutputEquals { command, expected } => {
                let output = runner.run(command).map_err(|e| e.to_string())?;
                if !output.success() {
                    return Err(format!(
                        "`{command}` exited with {}: {}",
                        output.status,
                        output.stderr_str().trim()
                    ));
                }
                let stdout = output.stdout_str();
                Ok(stdout.trim_end() == expected.as_str())
            }
            Self::Succeeds(command) => {
                let output = runner.run(command).map_err(|e| e.to_string())?;
                match output.status {
                    ExitStatus::Code(code) => Ok(code == 0),
                    status => Err(format!("`{command}` ended with {status}")),
                }
            }
            Self::Check { check, .. } => check(runner).map_err(|e| e.to_string()),
        }
    }
}

impl fmt::Debug for Condition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::OutputEquals { command, expected } => f
                .debug_struct("OutputEquals")
                .field("command", command)
                .field("expected", expected)
                .finish(),
            Self::Succeeds(command) => f.debug_tuple("Succeeds").field(command).finish(),
            Self::Check { label, .. } => f.debug_struct("Check").field("label", label).finish_non_exhaustive(),
        }
    }
}

impl fmt::Display for Condition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::OutputEquals { command, expected } => write!(f, "`{command}` == {expected:?}"),
            Self::Succeeds(command) => write!(f, "`{command}` succeeds"),
            Self::Check { label, .. } => write!(f, "{label}"),
        }
    }
}

/// Guard attached to a step
#[derive(Debug, Clone)]
pub enum Guard {
    /// Skip the step when the condition holds
    NotIf(Condition),
    /// Skip the step unless the condition holds
    OnlyIf(Condition),
}

impl fmt::Display for Guard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotIf(c) => write!(f, "not_if {c}"),
            Self::OnlyIf(c) => write!(f, "only_if {c}"),
        }
    }
}

/// Gives every guard query a timeout unless it carries its own
struct QueryRunner<'a> {
    inner: &'a dyn CommandRunner,
    timeout: Option<Duration>,
}

impl CommandRunner for QueryRunner<'_> {
    fn run(&self, command: &CommandLine) -> Result<CommandOutput> {
        if command.timeout.is_some() || self.timeout.is_none() {
            return self.inner.run(command);
        }
        let mut command = command.clone();
        command.timeout = self.timeout;
        self.inner.run(&command)
    }
}

/// Evaluates step guards through a command runner
pub struct GuardEvaluator<'a> {
    runner: &'a dyn CommandRunner,
    timeout: Option<Duration>,
}

impl<'a> GuardEvaluator<'a> {
    pub fn new(runner: &'a dyn CommandRunner) -> Self {
        Self { runner, timeout: None }
    }

    /// Timeout for queries that do not set one, including those issued by
    /// [`Condition::Check`] closures
    pub fn timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    /// Whether the step's effect is already satisfied.
    ///
    /// A step without a guard never skips.
    pub fn should_skip(&self, step: &Step) -> Result<bool> {
        let Some(guard) = &step.guard else {
            return Ok(false);
        };

        let runner = QueryRunner {
            inner: self.runner,
            timeout: self.timeout,
        };
        let skip = match guard {
            Guard::NotIf(condition) => condition.holds(&runner),
            Guard::OnlyIf(condition) => condition.holds(&runner).map(|holds| !holds),
        }
        .map_err(|message| Error::GuardEvaluation {
            step: step.description.clone(),
            message,
        })?;

        log::debug!("guard {guard} for '{}': skip={skip}", step.description);
        Ok(skip)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::ScriptedRunner;

    struct Fixed(CommandOutput);

    impl CommandRunner for Fixed {
        fn run(&self, _command: &CommandLine) -> Result<CommandOutput> {
            Ok(self.0.clone())
        }
    }

    struct Broken;

    impl CommandRunner for Broken {
        fn run(&self, _command: &CommandLine) -> Result<CommandOutput> {
            Err(Error::Io(std::io::Error::new(std::io::ErrorKind::NotFound, "no scutil")))
        }
    }

    fn get_local() -> CommandLine {
        CommandLine::new("/usr/sbin/scutil").args(["--get", "LocalHostName"])
    }

    fn step_with(guard: Guard) -> Step {
        Step::execute("set LocalHostName", CommandLine::new("true")).guard(guard)
    }

    #[test]
    fn test_no_guard_never_skips() {
        let runner = Broken;
        let step = Step::execute("always", CommandLine::new("true"));
        assert!(!GuardEvaluator::new(&runner).should_skip(&step).unwrap());
    }

    #[test]
    fn test_output_equals_trims_trailing_whitespace_only() {
        let runner = Fixed(CommandOutput::ok("awesome-mac01\n"));
        let eval = GuardEvaluator::new(&runner);

        let matching = step_with(Guard::NotIf(Condition::output_equals(get_local(), "awesome-mac01")));
        assert!(eval.should_skip(&matching).unwrap());

        let case_differs = step_with(Guard::NotIf(Condition::output_equals(get_local(), "Awesome-Mac01")));
        assert!(!eval.should_skip(&case_differs).unwrap());

        let leading = Fixed(CommandOutput::ok("  awesome-mac01"));
        let eval = GuardEvaluator::new(&leading);
        assert!(!eval.should_skip(&matching).unwrap());
    }

    #[test]
    fn test_failed_status_query_is_an_error() {
        let runner = Fixed(CommandOutput::failed(1, "LocalHostName: not set"));
        let step = step_with(Guard::NotIf(Condition::output_equals(get_local(), "mac")));
        let err = GuardEvaluator::new(&runner).should_skip(&step).unwrap_err();
        assert!(matches!(err, Error::GuardEvaluation { .. }));
        assert!(err.to_string().contains("LocalHostName: not set"));
    }

    #[test]
    fn test_unrunnable_guard_is_an_error() {
        let step = step_with(Guard::OnlyIf(Condition::Succeeds(CommandLine::new("hab"))));
        assert!(GuardEvaluator::new(&Broken).should_skip(&step).is_err());
    }

    #[test]
    fn test_succeeds_uses_exit_status() {
        let installed = step_with(Guard::NotIf(Condition::Succeeds(CommandLine::new("hab"))));
        let only_if = step_with(Guard::OnlyIf(Condition::Succeeds(CommandLine::new("hab"))));

        let ok = Fixed(CommandOutput::ok(""));
        assert!(GuardEvaluator::new(&ok).should_skip(&installed).unwrap());
        assert!(!GuardEvaluator::new(&ok).should_skip(&only_if).unwrap());

        let missing = Fixed(CommandOutput::failed(1, ""));
        assert!(!GuardEvaluator::new(&missing).should_skip(&installed).unwrap());
        assert!(GuardEvaluator::new(&missing).should_skip(&only_if).unwrap());
    }

    #[test]
    fn test_timed_out_query_is_an_error() {
        let runner = Fixed(CommandOutput {
            stdout: Vec::new(),
            stderr: Vec::new(),
            status: ExitStatus::TimedOut,
        });
        let step = step_with(Guard::NotIf(Condition::Succeeds(CommandLine::new("hab"))));
        assert!(GuardEvaluator::new(&runner).should_skip(&step).is_err());
    }

    #[test]
    fn test_custom_check() {
        let runner = Fixed(CommandOutput::ok("1.6.0\n"));
        let guard = Guard::NotIf(Condition::check("hab is 1.6.0", |runner| {
            let version = runner.run_capture(&CommandLine::new("hab").arg("--version"))?;
            Ok(version.trim().ends_with("1.6.0"))
        }));
        assert_eq!(guard.to_string(), "not_if hab is 1.6.0");
        let step = step_with(guard);
        assert!(GuardEvaluator::new(&runner).should_skip(&step).unwrap());
    }

    #[test]
    fn test_display() {
        let guard = Guard::NotIf(Condition::output_equals(get_local(), "mac"));
        assert_eq!(guard.to_string(), r#"not_if `/usr/sbin/scutil --get LocalHostName` == "mac""#);
    }

    #[test]
    fn test_queries_get_default_timeout() {
        let runner = ScriptedRunner::new().handle(|_| Some(CommandOutput::ok("1.6.0\n")));
        let eval = GuardEvaluator::new(&runner).timeout(Some(Duration::from_secs(30)));

        let check = step_with(Guard::NotIf(Condition::check("depot is reachable", |runner| {
            runner.run_capture(&CommandLine::new("curl").arg("https://bldr.habitat.sh"))?;
            Ok(true)
        })));
        let own = step_with(Guard::NotIf(Condition::output_equals(
            get_local().timeout(Duration::from_secs(2)),
            "mac",
        )));
        eval.should_skip(&check).unwrap();
        eval.should_skip(&own).unwrap();

        let timeouts: Vec<_> = runner.commands().iter().map(|c| c.timeout).collect();
        assert_eq!(
            timeouts,
            vec![Some(Duration::from_secs(30)), Some(Duration::from_secs(2))]
        );
        assert!(runner.commands().iter().all(|c| !c.privileged));
    }
}
