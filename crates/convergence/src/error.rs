//! Error types for resource convergence.
//!
//! Every failure is surfaced to the caller of an action. The core never
//! retries: a later convergence run re-evaluates guards and picks up where a
//! failed run stopped.

use thiserror::Error;

/// Errors that can occur while declaring, resolving or running a resource.
#[derive(Debug, Error)]
pub enum Error {
    /// A value does not satisfy the property's declared type
    #[error("property '{property}' expects {expected}, got {actual}")]
    TypeMismatch {
        /// Name of the property
        property: String,
        /// Human-readable form of the declared type
        expected: String,
        /// Human-readable form of the rejected value
        actual: String,
    },

    /// Access to a property that was never declared
    #[error("unknown property: {0}")]
    UnknownProperty(String),

    /// A required property has neither a value nor a default
    #[error("required property '{0}' is not set")]
    MissingProperty(String),

    /// A default expression reached itself while resolving
    #[error("cyclic default for property '{property}' (via {chain})")]
    CyclicDefault {
        /// Property whose default re-entered itself
        property: String,
        /// Resolution chain leading back to the property
        chain: String,
    },

    /// Property assignment after the resource started executing
    #[error("properties of {resource} are frozen once an action starts")]
    PropertiesFrozen {
        /// Display form of the resource
        resource: String,
    },

    /// Action name not present in the resource's action table
    #[error("{resource} has no action '{action}'")]
    UnknownAction {
        /// Display form of the resource
        resource: String,
        /// Requested action
        action: String,
    },

    /// The same action was requested twice on one resource instance
    #[error("action '{action}' already ran on {resource}")]
    ActionAlreadyRun {
        /// Display form of the resource
        resource: String,
        /// Action that already ran
        action: String,
    },

    /// Lifecycle transition that is not allowed
    #[error("{resource} cannot run '{action}' while {state}")]
    InvalidState {
        /// Display form of the resource
        resource: String,
        /// Requested action
        action: String,
        /// Current lifecycle state
        state: String,
    },

    /// Notification target that nobody registered
    #[error("no resource or target registered as {0}")]
    UnknownResource(String),

    /// Malformed `type[name]` reference
    #[error("invalid resource reference '{0}': expected type[name]")]
    InvalidReference(String),

    /// The guard's read-only state query failed
    #[error("guard for '{step}' failed: {message}")]
    GuardEvaluation {
        /// Step whose guard failed
        step: String,
        /// What went wrong
        message: String,
    },

    /// A mutating command exited with a status the step does not accept
    #[error("command `{command}` failed with {status}: {}", stderr.trim())]
    Command {
        /// The command line that ran
        command: String,
        /// Exit status description ("exit status 1", "signal", "timeout")
        status: String,
        /// Captured standard output
        stdout: String,
        /// Captured standard error
        stderr: String,
    },

    /// A step failed inside an action
    #[error("{resource} action '{action}' failed at step '{step}': {source}")]
    Step {
        /// Display form of the resource
        resource: String,
        /// Action being executed
        action: String,
        /// Description of the failing step
        step: String,
        /// Underlying failure
        #[source]
        source: Box<Error>,
    },

    /// IO error while spawning or talking to a command
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Captured output of the command behind this error, if any.
    ///
    /// Looks through `Step` wrappers so callers can report what the failing
    /// command printed.
    pub fn command_output(&self) -> Option<(&str, &str)> {
        match self {
            Error::Command { stdout, stderr, .. } => Some((stdout, stderr)),
            Error::Step { source, .. } => source.command_output(),
            _ => None,
        }
    }

    /// Whether this error came from a guard query rather than a mutation.
    pub fn is_guard_failure(&self) -> bool {
        match self {
            Error::GuardEvaluation { .. } => true,
            Error::Step { source, .. } => source.is_guard_failure(),
            _ => false,
        }
    }
}

/// Result type for convergence operations.
pub type Result<T> = std::result::Result<T, Error>;
