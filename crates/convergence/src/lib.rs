//! # Convergence
//!
//! Declarative, idempotent resources for configuring a machine.
//!
//! A resource declares the state a piece of the system should be in. Each
//! action turns that declaration into an ordered list of guarded steps:
//! a step only runs its command when a read-only check says the effect does
//! not hold yet, so running the same declarations twice changes nothing the
//! second time.
//!
//! ## Core Concepts
//!
//! - **Property**: Typed, lazily defaulted attribute of a resource ([`PropertySet`])
//! - **Guard**: `not_if` / `only_if` condition evaluated before a step ([`Guard`])
//! - **Step**: One guarded command plus the notifications it sends ([`Step`])
//! - **Resource**: Properties + an action table + a lifecycle ([`Resource`])
//! - **Notification**: Request for another resource to run an action ([`NotificationRouter`])
//! - **Run**: Converges many resources and delivers notifications ([`Run`])
//!
//! ## Example
//!
//! ```ignore
//! use convergence::{
//!     ActionName, CommandLine, Condition, Declaration, PropertySpec, PropertyType,
//!     Run, RuntimeConfig, Step,
//! };
//!
//! let motd = Declaration::new("motd", MotdAction::Write)
//!     .property(PropertySpec::new("message", PropertyType::String).name_property())
//!     .action(MotdAction::Write, "Write the message", |props, _| {
//!         let message = props.get_string("message")?;
//!         Ok(vec![
//!             Step::execute("write", CommandLine::new("motd").args(["set", &message]))
//!                 .not_if(Condition::output_equals(CommandLine::new("motd").arg("get"), message)),
//!         ])
//!     });
//!
//! let mut run = Run::new(RuntimeConfig::default(), runner);
//! run.add(Box::new(motd.declare("hello", RuntimeConfig::default())));
//! let summary = run.converge();
//! ```
//!
//! ## Provider Traits
//!
//! - [`CommandRunner`]: Runs commands for guards and steps
//! - [`NotificationTarget`]: Receives notifications without being a resource
//! - [`ProgressCallback`]: Receives progress updates
//!
//! The crate never spawns processes, prints or prompts by itself.

pub mod command;
pub mod context;
pub mod error;
pub mod executor;
pub mod guard;
pub mod notification;
pub mod property;
pub mod resource;
pub mod run;
pub mod step;
pub mod types;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

// Re-export main types at crate root
pub use command::{CommandLine, CommandOutput, CommandRunner, ExitStatus};
pub use context::{NoProgress, NotificationTarget, ProgressCallback, RunContext, RuntimeConfig};
pub use error::{Error, Result};
pub use executor::ActionExecutor;
pub use guard::{Condition, Guard, GuardEvaluator};
pub use notification::{Notification, NotificationRouter, ResourceRef, Timing};
pub use property::{PropertySet, PropertySpec, PropertyType, Value};
pub use resource::{
    ActionName, BoxedResource, COMPILE_TIME, Declaration, Lifecycle, ManagedResource, Resource,
    compile_time_property,
};
pub use run::{Run, RunEntry};
pub use step::{NotifySpec, Step};
pub use types::{Failure, RunOutcome, RunSummary, StepReport, StepStatus};
