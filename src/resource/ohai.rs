//! ohai - reloads system facts when notified
//!
//! Not a declared resource: it only exists to receive `reload`
//! notifications, e.g. `ohai[reload hostname]` after a name change.

use convergence::{CommandRunner, Error, NotificationTarget, ResourceRef, Result, RunContext};
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, PoisonError};

use super::macos_hostname::{ScutilKey, scutil_get};

pub const RESOURCE_TYPE: &str = "ohai";

/// Fact name -> value
pub type Facts = BTreeMap<String, String>;

/// Fact reloader for one plugin
pub struct Ohai {
    reference: ResourceRef,
    plugin: String,
    facts: Arc<Mutex<Facts>>,
}

impl Ohai {
    /// Reloader named `name`; `reload <plugin>` selects the plugin
    pub fn new(name: &str) -> Self {
        let plugin = name.strip_prefix("reload ").unwrap_or(name).trim().to_string();
        Self {
            reference: ResourceRef::new(RESOURCE_TYPE, name),
            plugin,
            facts: Arc::default(),
        }
    }

    /// The reloader macos_hostname notifies
    pub fn hostname() -> Self {
        Self::new("reload hostname")
    }

    /// Shared view of the collected facts
    pub fn facts(&self) -> Arc<Mutex<Facts>> {
        Arc::clone(&self.facts)
    }

    fn collect(&self, runner: &dyn CommandRunner) -> Result<Facts> {
        let mut facts = Facts::new();
        match self.plugin.as_str() {
            "hostname" => {
                for (fact, key) in [
                    ("hostname", ScutilKey::HostName),
                    ("computername", ScutilKey::ComputerName),
                    ("localhostname", ScutilKey::LocalHostName),
                ] {
                    if let Some(value) = scutil_get(runner, key)? {
                        facts.insert(fact.to_string(), value);
                    }
                }
            }
            other => log::warn!("{}: no '{other}' plugin, nothing to reload", self.reference),
        }
        Ok(facts)
    }
}

impl NotificationTarget for Ohai {
    fn reference(&self) -> &ResourceRef {
        &self.reference
    }

    fn handle(&mut self, action: &str, ctx: &mut RunContext) -> Result<bool> {
        if action != "reload" {
            return Err(Error::UnknownAction {
                resource: self.reference.to_string(),
                action: action.to_string(),
            });
        }

        let fresh = self.collect(ctx.runner)?;
        let mut facts = self.facts.lock().unwrap_or_else(PoisonError::into_inner);
        let changed = *facts != fresh;
        log::info!("{}: reloaded {} fact(s)", self.reference, fresh.len());
        *facts = fresh;
        Ok(changed)
    }
}
