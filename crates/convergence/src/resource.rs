//! Resource runtime - identity, properties and actions of one declared resource
//!
//! A resource type is described once by a [`Declaration`]: its properties,
//! a closed enum of actions and, for each action, a builder that turns the
//! resolved properties into an ordered list of [`Step`]s. Each declared
//! instance is a [`Resource`] that walks a one-way lifecycle:
//!
//! ```text
//! Declared -> PropertiesResolving -> PropertiesFinal -> Executing(action) -> Completed | Failed
//! ```
//!
//! Properties freeze when the first action starts, so guards and commands
//! always see the same values. A completed resource may run a different
//! action later in the run (for instance when notified), but never the same
//! one twice. A failed resource stays failed.

use crate::command::CommandRunner;
use crate::context::{RunContext, RuntimeConfig};
use crate::error::{Error, Result};
use crate::executor::ActionExecutor;
use crate::notification::{NotificationRouter, ResourceRef};
use crate::property::{PropertySet, PropertySpec, PropertyType, Value};
use crate::step::Step;
use crate::types::RunOutcome;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::hash::Hash;
use std::sync::Arc;

/// Name of the property asking the scheduler to run a resource at compile time
pub const COMPILE_TIME: &str = "compile_time";

/// Closed set of actions of one resource type
///
/// `Display` must produce the action's name as used in manifests and
/// notifications (e.g. `set`, `computer_name`).
pub trait ActionName: Copy + Eq + Hash + fmt::Debug + fmt::Display + Send + Sync + 'static {
    /// Every action of the type, in documentation order
    fn all() -> &'static [Self];

    /// Look an action up by name
    fn parse(name: &str) -> Option<Self> {
        Self::all().iter().copied().find(|a| a.to_string() == name)
    }
}

/// Builds an action's steps from the frozen properties
pub type StepBuilder = Arc<dyn Fn(&mut PropertySet, &RuntimeConfig) -> Result<Vec<Step>> + Send + Sync>;

/// One entry of an action table
#[derive(Clone)]
pub struct ActionDef {
    pub description: String,
    build: StepBuilder,
}

impl fmt::Debug for ActionDef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ActionDef")
            .field("description", &self.description)
            .finish_non_exhaustive()
    }
}

/// Declaration of a resource type
#[derive(Debug, Clone)]
pub struct Declaration<A: ActionName> {
    pub resource_type: String,
    pub description: String,
    pub properties: Vec<PropertySpec>,
    pub actions: HashMap<A, ActionDef>,
    pub default_action: A,
}

impl<A: ActionName> Declaration<A> {
    pub fn new(resource_type: &str, default_action: A) -> Self {
        Self {
            resource_type: resource_type.to_string(),
            description: String::new(),
            properties: Vec::new(),
            actions: HashMap::new(),
            default_action,
        }
    }

    pub fn description(mut self, description: &str) -> Self {
        self.description = description.to_string();
        self
    }

    pub fn property(mut self, spec: PropertySpec) -> Self {
        self.properties.retain(|p| p.name != spec.name);
        self.properties.push(spec);
        self
    }

    pub fn action<F>(mut self, action: A, description: &str, build: F) -> Self
    where
        F: Fn(&mut PropertySet, &RuntimeConfig) -> Result<Vec<Step>> + Send + Sync + 'static,
    {
        self.actions.insert(
            action,
            ActionDef {
                description: description.to_string(),
                build: Arc::new(build),
            },
        );
        self
    }

    /// Declare an instance named `name`
    pub fn declare(&self, name: &str, config: RuntimeConfig) -> Resource<A> {
        Resource::declare(self, name, config)
    }
}

/// Lifecycle of a resource instance
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Lifecycle {
    Declared,
    PropertiesResolving,
    PropertiesFinal,
    Executing(String),
    Completed,
    Failed,
}

impl fmt::Display for Lifecycle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Declared => write!(f, "declared"),
            Self::PropertiesResolving => write!(f, "resolving properties"),
            Self::PropertiesFinal => write!(f, "properties final"),
            Self::Executing(action) => write!(f, "executing '{action}'"),
            Self::Completed => write!(f, "completed"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

/// A declared resource instance
#[derive(Debug)]
pub struct Resource<A: ActionName> {
    reference: ResourceRef,
    description: String,
    properties: PropertySet,
    actions: HashMap<A, ActionDef>,
    default_action: A,
    config: RuntimeConfig,
    state: Lifecycle,
    updated: bool,
    executed: Vec<A>,
}

impl<A: ActionName> Resource<A> {
    /// Declare an instance of `declaration` named `name`.
    ///
    /// Every resource gets a boolean `compile_time` property (default
    /// `false`) unless the declaration overrides it.
    pub fn declare(declaration: &Declaration<A>, name: &str, config: RuntimeConfig) -> Self {
        let mut specs = declaration.properties.clone();
        if !specs.iter().any(|s| s.name == COMPILE_TIME) {
            specs.push(compile_time_property(false));
        }

        Self {
            reference: ResourceRef::new(&declaration.resource_type, name),
            description: declaration.description.clone(),
            properties: PropertySet::new(name, specs),
            actions: declaration.actions.clone(),
            default_action: declaration.default_action,
            config,
            state: Lifecycle::Declared,
            updated: false,
            executed: Vec::new(),
        }
    }

    pub fn reference(&self) -> &ResourceRef {
        &self.reference
    }

    pub fn set(&mut self, name: &str, value: impl Into<Value>) -> Result<()> {
        self.properties.set(name, value).map_err(|e| match e {
            Error::PropertiesFrozen { .. } => Error::PropertiesFrozen {
                resource: self.reference.to_string(),
            },
            other => other,
        })
    }

    pub fn get(&mut self, name: &str) -> Result<Value> {
        self.properties.get(name)
    }

    pub fn properties(&self) -> &PropertySet {
        &self.properties
    }

    pub fn compile_time(&mut self) -> Result<bool> {
        self.properties.get_bool(COMPILE_TIME)
    }

    pub fn state(&self) -> &Lifecycle {
        &self.state
    }

    /// Whether the most recent action changed the system
    pub fn updated(&self) -> bool {
        self.updated
    }

    pub fn default_action(&self) -> A {
        self.default_action
    }

    pub fn has_run(&self, action: A) -> bool {
        self.executed.contains(&action)
    }

    /// Properties that describe the desired state, resolved
    pub fn desired_state(&mut self) -> Result<BTreeMap<String, Value>> {
        let mut resolved = self.properties.resolve_all()?;
        let reported: Vec<String> = self
            .properties
            .specs()
            .iter()
            .filter(|s| s.desired_state)
            .map(|s| s.name.clone())
            .collect();
        resolved.retain(|name, _| reported.contains(name));
        Ok(resolved)
    }

    fn action_def(&self, action: A) -> Result<ActionDef> {
        self.actions
            .get(&action)
            .cloned()
            .ok_or_else(|| Error::UnknownAction {
                resource: self.reference.to_string(),
                action: action.to_string(),
            })
    }

    fn parse_action(&self, name: &str) -> Result<A> {
        A::parse(name).ok_or_else(|| Error::UnknownAction {
            resource: self.reference.to_string(),
            action: name.to_string(),
        })
    }

    /// Resolve and freeze properties on first use
    fn finalize_properties(&mut self) -> Result<()> {
        if self.state != Lifecycle::Declared {
            return Ok(());
        }
        self.state = Lifecycle::PropertiesResolving;
        match self.properties.resolve_all() {
            Ok(_) => {
                self.properties.freeze();
                self.state = Lifecycle::PropertiesFinal;
                Ok(())
            }
            Err(e) => {
                self.state = Lifecycle::Failed;
                Err(e)
            }
        }
    }

    /// Run `action`, converging the system toward the declared state
    pub fn run_action(&mut self, action: A, ctx: &mut RunContext) -> Result<RunOutcome> {
        if matches!(self.state, Lifecycle::Failed | Lifecycle::Executing(_)) {
            return Err(Error::InvalidState {
                resource: self.reference.to_string(),
                action: action.to_string(),
                state: self.state.to_string(),
            });
        }
        if self.has_run(action) {
            return Err(Error::ActionAlreadyRun {
                resource: self.reference.to_string(),
                action: action.to_string(),
            });
        }
        let def = self.action_def(action)?;
        self.finalize_properties()?;

        let name = action.to_string();
        self.state = Lifecycle::Executing(name.clone());
        self.executed.push(action);
        self.updated = false;
        log::debug!("{}: running action '{name}'", self.reference);

        let mut outcome = RunOutcome::new(&self.reference, &name);
        let result = (def.build)(&mut self.properties, &self.config).and_then(|steps| {
            ActionExecutor::new(&self.config).run(ctx, &self.reference, &name, &steps, &mut outcome)
        });

        self.updated = outcome.updated;
        match result {
            Ok(()) => {
                self.state = Lifecycle::Completed;
                Ok(outcome)
            }
            Err(e) => {
                self.state = Lifecycle::Failed;
                Err(e)
            }
        }
    }

    /// Run an action given by name
    pub fn run_action_named(&mut self, name: &str, ctx: &mut RunContext) -> Result<RunOutcome> {
        let action = self.parse_action(name)?;
        self.run_action(action, ctx)
    }

    /// Evaluate `action` in why-run mode without consuming it.
    ///
    /// Guards run against the live system; no command is executed and no
    /// notification leaves the resource.
    pub fn plan(&mut self, action: A, runner: &dyn CommandRunner) -> Result<RunOutcome> {
        let def = self.action_def(action)?;
        self.finalize_properties()?;

        let config = RuntimeConfig {
            why_run: true,
            ..self.config.clone()
        };
        let name = action.to_string();
        let mut router = NotificationRouter::new();
        let mut ctx = RunContext::new(runner, &mut router);
        let mut outcome = RunOutcome::new(&self.reference, &name);

        let steps = (def.build)(&mut self.properties, &config)?;
        ActionExecutor::new(&config).run(&mut ctx, &self.reference, &name, &steps, &mut outcome)?;
        Ok(outcome)
    }
}

/// The `compile_time` property with the given default
pub fn compile_time_property(default: bool) -> PropertySpec {
    PropertySpec::new(COMPILE_TIME, PropertyType::Bool)
        .default(default)
        .not_desired_state()
        .description("Determines whether or not the resource should be run at compile time.")
}

/// Type-erased view of a resource, as held by a run
pub trait ManagedResource: Send + Sync + fmt::Debug {
    fn reference(&self) -> &ResourceRef;

    /// Human-readable description of the resource type
    fn description(&self) -> &str;

    fn default_action(&self) -> String;

    /// (name, description) of every action in the table
    fn actions(&self) -> Vec<(String, String)>;

    fn set_property(&mut self, name: &str, value: Value) -> Result<()>;

    fn compile_time(&mut self) -> Result<bool>;

    /// Whether `action` already ran on this instance
    fn has_run(&self, action: &str) -> bool;

    fn updated(&self) -> bool;

    fn state(&self) -> &Lifecycle;

    fn desired_state(&mut self) -> Result<BTreeMap<String, Value>>;

    fn run(&mut self, action: &str, ctx: &mut RunContext) -> Result<RunOutcome>;

    fn plan(&mut self, action: &str, runner: &dyn CommandRunner) -> Result<RunOutcome>;
}

/// A boxed resource for type-erased storage
pub type BoxedResource = Box<dyn ManagedResource>;

impl<A: ActionName> ManagedResource for Resource<A> {
    fn reference(&self) -> &ResourceRef {
        &self.reference
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn default_action(&self) -> String {
        self.default_action.to_string()
    }

    fn actions(&self) -> Vec<(String, String)> {
        A::all()
            .iter()
            .filter_map(|a| {
                self.actions
                    .get(a)
                    .map(|def| (a.to_string(), def.description.clone()))
            })
            .collect()
    }

    fn set_property(&mut self, name: &str, value: Value) -> Result<()> {
        self.set(name, value)
    }

    fn compile_time(&mut self) -> Result<bool> {
        Resource::compile_time(self)
    }

    fn has_run(&self, action: &str) -> bool {
        A::parse(action).is_some_and(|a| Resource::has_run(self, a))
    }

    fn updated(&self) -> bool {
        self.updated
    }

    fn state(&self) -> &Lifecycle {
        &self.state
    }

    fn desired_state(&mut self) -> Result<BTreeMap<String, Value>> {
        Resource::desired_state(self)
    }

    fn run(&mut self, action: &str, ctx: &mut RunContext) -> Result<RunOutcome> {
        self.run_action_named(action, ctx)
    }

    fn plan(&mut self, action: &str, runner: &dyn CommandRunner) -> Result<RunOutcome> {
        let action = self.parse_action(action)?;
        Resource::plan(self, action, runner)
    }
}
