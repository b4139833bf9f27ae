//! Resource types steward knows how to converge
//!
//! Each submodule exposes a `declaration()` describing the type's
//! properties and actions. The [`Catalog`] turns a type name from a
//! manifest into a declared instance.

pub mod habitat_install;
pub mod habitat_package;
pub mod macos_hostname;
pub mod ohai;

use convergence::{
    ActionName, BoxedResource, COMPILE_TIME, Declaration, NotificationTarget, PropertySpec,
    PropertyType, RuntimeConfig, compile_time_property,
};

use crate::config::StewardConfig;

pub use habitat_install::HabitatInstallAction;
pub use habitat_package::HabitatPackageAction;
pub use macos_hostname::HostnameAction;
pub use ohai::Ohai;

/// One property as shown by `steward resources`
#[derive(Debug, Clone)]
pub struct PropertyInfo {
    pub name: String,
    pub kind: PropertyType,
    pub description: String,
    pub name_property: bool,
}

/// A resource type as shown by `steward resources`
#[derive(Debug, Clone)]
pub struct TypeInfo {
    pub name: String,
    pub description: String,
    pub default_action: String,
    pub properties: Vec<PropertyInfo>,
    /// (action, description) in declaration order
    pub actions: Vec<(String, String)>,
}

fn describe<A: ActionName>(declaration: &Declaration<A>) -> TypeInfo {
    // Every instance gets one, declared or not
    let implicit = compile_time_property(false);
    let mut specs: Vec<&PropertySpec> = declaration.properties.iter().collect();
    if !specs.iter().any(|s| s.name == COMPILE_TIME) {
        specs.push(&implicit);
    }

    TypeInfo {
        name: declaration.resource_type.clone(),
        description: declaration.description.clone(),
        default_action: declaration.default_action.to_string(),
        properties: specs
            .into_iter()
            .map(|spec| PropertyInfo {
                name: spec.name.clone(),
                kind: spec.kind.clone(),
                description: spec.description.clone(),
                name_property: spec.name_property,
            })
            .collect(),
        actions: A::all()
            .iter()
            .filter_map(|action| {
                declaration
                    .actions
                    .get(action)
                    .map(|def| (action.to_string(), def.description.clone()))
            })
            .collect(),
    }
}

/// Declarations of every resource type, bound to one configuration
pub struct Catalog {
    runtime: RuntimeConfig,
    hostname: Declaration<HostnameAction>,
    habitat_install: Declaration<HabitatInstallAction>,
    habitat_package: Declaration<HabitatPackageAction>,
}

impl Catalog {
    pub fn new(config: &StewardConfig) -> Self {
        Self {
            runtime: config.runtime_config(),
            hostname: macos_hostname::declaration(),
            habitat_install: habitat_install::declaration(&config.habitat),
            habitat_package: habitat_package::declaration(&config.habitat),
        }
    }

    /// Force why-run mode on every resource declared from now on
    pub fn with_why_run(mut self, why_run: bool) -> Self {
        self.runtime.why_run |= why_run;
        self
    }

    pub fn runtime(&self) -> &RuntimeConfig {
        &self.runtime
    }

    /// Names of all known resource types
    pub fn types() -> [&'static str; 3] {
        [
            macos_hostname::RESOURCE_TYPE,
            habitat_install::RESOURCE_TYPE,
            habitat_package::RESOURCE_TYPE,
        ]
    }

    /// Declare an instance of `resource_type`, or `None` if the type is unknown
    pub fn declare(&self, resource_type: &str, name: &str) -> Option<BoxedResource> {
        let runtime = self.runtime.clone();
        let resource: BoxedResource = match resource_type {
            macos_hostname::RESOURCE_TYPE => Box::new(self.hostname.declare(name, runtime)),
            habitat_install::RESOURCE_TYPE => Box::new(self.habitat_install.declare(name, runtime)),
            habitat_package::RESOURCE_TYPE => Box::new(self.habitat_package.declare(name, runtime)),
            _ => return None,
        };
        log::debug!("Declared {}", resource.reference());
        Some(resource)
    }

    /// Targets that receive notifications without being declared
    pub fn notification_targets() -> Vec<Box<dyn NotificationTarget>> {
        vec![Box::new(Ohai::hostname())]
    }

    pub fn describe(&self) -> Vec<TypeInfo> {
        vec![
            describe(&self.hostname),
            describe(&self.habitat_install),
            describe(&self.habitat_package),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_declare_known_types() {
        let catalog = Catalog::new(&StewardConfig::default());
        for resource_type in Catalog::types() {
            let resource = catalog.declare(resource_type, "example").unwrap();
            assert_eq!(resource.reference().resource_type, resource_type);
        }
        assert!(catalog.declare("apt_package", "vim").is_none());
    }

    #[test]
    fn test_why_run_propagates() {
        let catalog = Catalog::new(&StewardConfig::default()).with_why_run(true);
        assert!(catalog.runtime().why_run);

        let catalog = Catalog::new(&StewardConfig {
            why_run: true,
            ..Default::default()
        })
        .with_why_run(false);
        assert!(catalog.runtime().why_run);
    }

    #[test]
    fn test_describe_lists_actions_in_order() {
        let catalog = Catalog::new(&StewardConfig::default());
        let types = catalog.describe();
        assert_eq!(types.len(), 3);

        let hostname = &types[0];
        assert_eq!(hostname.name, "macos_hostname");
        assert_eq!(hostname.default_action, "set");
        let actions: Vec<&str> = hostname.actions.iter().map(|(a, _)| a.as_str()).collect();
        assert_eq!(actions, ["set", "local", "computer_name", "host"]);

        let package = &types[2];
        assert!(package.properties.iter().any(|p| p.name == "package_name" && p.name_property));
        assert!(package.properties.iter().any(|p| p.name == "compile_time"));
    }

    #[test]
    fn test_hostname_reload_target_is_registered() {
        let targets = Catalog::notification_targets();
        assert_eq!(targets.len(), 1);
        assert_eq!(targets[0].reference(), &macos_hostname::reload_target());
    }
}
