//! Test support: a scripted command runner that records every call
//!
//! Enabled for this crate's tests and, through the `testing` feature, for
//! crates that declare resources and want to assert which commands ran.

use crate::command::{CommandLine, CommandOutput, CommandRunner};
use crate::error::Result;
use std::sync::{Mutex, PoisonError};

type Handler = Box<dyn Fn(&CommandLine) -> Option<CommandOutput> + Send + Sync>;

/// Command runner driven by scripted responses
///
/// Handlers are tried in registration order; the first one returning
/// `Some` answers the call. Unscripted commands fail with exit status 127.
#[derive(Default)]
pub struct ScriptedRunner {
    handlers: Vec<Handler>,
    calls: Mutex<Vec<CommandLine>>,
}

impl ScriptedRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Answer `command` (matched on its display form) with `output`
    pub fn respond(self, command: &str, output: CommandOutput) -> Self {
        let command = command.to_string();
        self.handle(move |cmd| (cmd.to_string() == command).then(|| output.clone()))
    }

    /// Answer commands with a closure
    pub fn handle<F>(mut self, f: F) -> Self
    where
        F: Fn(&CommandLine) -> Option<CommandOutput> + Send + Sync + 'static,
    {
        self.handlers.push(Box::new(f));
        self
    }

    /// Every command run so far, in order
    pub fn commands(&self) -> Vec<CommandLine> {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Display form of every command run so far
    pub fn calls(&self) -> Vec<String> {
        self.commands().iter().map(ToString::to_string).collect()
    }

    /// How many times exactly `command` ran
    pub fn count(&self, command: &str) -> usize {
        self.calls().iter().filter(|c| *c == command).count()
    }

    /// How many commands starting with `prefix` ran
    pub fn count_matching(&self, prefix: &str) -> usize {
        self.calls().iter().filter(|c| c.starts_with(prefix)).count()
    }
}

impl CommandRunner for ScriptedRunner {
    fn run(&self, command: &CommandLine) -> Result<CommandOutput> {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(command.clone());

        let output = self
            .handlers
            .iter()
            .find_map(|h| h(command))
            .unwrap_or_else(|| CommandOutput::failed(127, &format!("not scripted: {command}")));
        Ok(output)
    }
}
