//! Run context, configuration and provider traits
//!
//! These let the convergence crate be embedded without depending on a
//! specific process runner, UI or inventory implementation.

use crate::command::CommandRunner;
use crate::error::Result;
use crate::notification::{Notification, NotificationRouter, ResourceRef};
use crate::types::{RunOutcome, StepReport};
use std::path::PathBuf;
use std::time::Duration;

/// Explicit settings handed to every resource at construction
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    /// Evaluate guards but never run mutating commands
    pub why_run: bool,
    /// Stop the run at the first failed resource
    pub fail_fast: bool,
    /// Timeout applied to step commands that do not set their own
    pub command_timeout: Option<Duration>,
    /// Scratch directory for downloaded installers and similar files
    pub file_cache_path: PathBuf,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            why_run: false,
            fail_fast: true,
            command_timeout: Some(Duration::from_secs(900)),
            file_cache_path: std::env::temp_dir().join("steward-cache"),
        }
    }
}

/// Context passed to action execution
pub struct RunContext<'a> {
    pub runner: &'a dyn CommandRunner,
    pub router: &'a mut NotificationRouter,
    pub progress: Option<&'a mut dyn ProgressCallback>,
}

impl<'a> RunContext<'a> {
    pub fn new(runner: &'a dyn CommandRunner, router: &'a mut NotificationRouter) -> Self {
        Self {
            runner,
            router,
            progress: None,
        }
    }

    /// Create a context reporting to a progress callback
    pub fn with_progress(
        runner: &'a dyn CommandRunner,
        router: &'a mut NotificationRouter,
        progress: &'a mut dyn ProgressCallback,
    ) -> Self {
        Self {
            runner,
            router,
            progress: Some(progress),
        }
    }
}

/// Something that can receive notifications without being a declared
/// resource, such as a fact reloader
pub trait NotificationTarget: Send + Sync {
    /// Reference notifications use to address this target
    fn reference(&self) -> &ResourceRef;

    /// Handle a notified action. Returns whether anything changed.
    fn handle(&mut self, action: &str, ctx: &mut RunContext) -> Result<bool>;
}

/// Progress callback for run operations
///
/// Implement this trait to receive progress updates during a run.
pub trait ProgressCallback {
    /// Called when a resource action starts
    fn on_action_start(&mut self, resource: &ResourceRef, action: &str);

    /// Called after each step, executed or skipped
    fn on_step(&mut self, resource: &ResourceRef, step: &StepReport);

    /// Called when an action completes successfully
    fn on_action_complete(&mut self, outcome: &RunOutcome);

    /// Called when an action fails
    fn on_action_failed(&mut self, resource: &ResourceRef, action: &str, error: &crate::Error);

    /// Called when a notification is delivered
    fn on_notification(&mut self, notification: &Notification);
}

/// No-op progress callback
pub struct NoProgress;

impl ProgressCallback for NoProgress {
    fn on_action_start(&mut self, _resource: &ResourceRef, _action: &str) {}
    fn on_step(&mut self, _resource: &ResourceRef, _step: &StepReport) {}
    fn on_action_complete(&mut self, _outcome: &RunOutcome) {}
    fn on_action_failed(&mut self, _resource: &ResourceRef, _action: &str, _error: &crate::Error) {}
    fn on_notification(&mut self, _notification: &Notification) {}
}
