//! TOML manifest of resource declarations
//!
//! ```toml
//! [[resource]]
//! type = "macos_hostname"
//! name = "awesome_chef-mac01"
//! action = "local"
//!
//! [[resource]]
//! type = "habitat_package"
//! name = "core/redis"
//! actions = ["install", "upgrade"]
//!
//! [resource.properties]
//! channel = "unstable"
//! binlink = "force"
//! ```

use anyhow::{Context, Result};
use convergence::{BoxedResource, CommandRunner, ResourceRef, Run, Value};
use serde::Deserialize;
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;

use crate::resource::Catalog;

#[derive(Debug, Error)]
pub enum ManifestError {
    #[error("invalid manifest: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("unknown resource type '{resource_type}' (known: {known})")]
    UnknownType { resource_type: String, known: String },

    #[error("{resource}: property '{property}' has unsupported value {value}")]
    UnsupportedValue {
        resource: String,
        property: String,
        value: String,
    },

    #[error("{resource} is declared twice")]
    Duplicate { resource: String },

    #[error("{resource}: use either `action` or `actions`, not both")]
    ConflictingActions { resource: String },

    #[error("{resource}: {source}")]
    Resource {
        resource: String,
        #[source]
        source: convergence::Error,
    },
}

/// One `[[resource]]` table
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ResourceDecl {
    #[serde(rename = "type")]
    pub resource_type: String,

    pub name: String,

    #[serde(default)]
    pub action: Option<String>,

    #[serde(default)]
    pub actions: Vec<String>,

    #[serde(default)]
    pub properties: toml::Table,
}

impl ResourceDecl {
    pub fn reference(&self) -> ResourceRef {
        ResourceRef::new(&self.resource_type, &self.name)
    }

    /// Requested actions; empty means the type's default action
    fn requested_actions(&self) -> std::result::Result<Vec<String>, ManifestError> {
        match (&self.action, self.actions.is_empty()) {
            (Some(_), false) => Err(ManifestError::ConflictingActions {
                resource: self.reference().to_string(),
            }),
            (Some(action), true) => Ok(vec![action.clone()]),
            (None, _) => Ok(self.actions.clone()),
        }
    }

    /// Declare this resource from `catalog` with its properties assigned
    pub fn declare(&self, catalog: &Catalog) -> std::result::Result<(BoxedResource, Vec<String>), ManifestError> {
        let reference = self.reference().to_string();
        let mut resource = catalog
            .declare(&self.resource_type, &self.name)
            .ok_or_else(|| ManifestError::UnknownType {
                resource_type: self.resource_type.clone(),
                known: Catalog::types().join(", "),
            })?;

        for (property, value) in &self.properties {
            let value = to_value(value).ok_or_else(|| ManifestError::UnsupportedValue {
                resource: reference.clone(),
                property: property.clone(),
                value: value.to_string(),
            })?;
            resource
                .set_property(property, value)
                .map_err(|source| ManifestError::Resource {
                    resource: reference.clone(),
                    source,
                })?;
        }

        let mut actions = self.requested_actions()?;
        if actions.is_empty() {
            actions.push(resource.default_action());
        }
        let known: Vec<String> = resource.actions().into_iter().map(|(name, _)| name).collect();
        if let Some(unknown) = actions.iter().find(|a| !known.contains(a)) {
            return Err(ManifestError::Resource {
                resource: reference.clone(),
                source: convergence::Error::UnknownAction {
                    resource: reference,
                    action: unknown.clone(),
                },
            });
        }

        Ok((resource, actions))
    }
}

/// A whole manifest file
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Manifest {
    #[serde(default, rename = "resource")]
    pub resources: Vec<ResourceDecl>,
}

/// Convert a TOML value into a property value; `None` if it has no counterpart
fn to_value(value: &toml::Value) -> Option<Value> {
    match value {
        toml::Value::String(s) => Some(Value::String(s.clone())),
        toml::Value::Boolean(b) => Some(Value::Bool(*b)),
        toml::Value::Integer(i) => Some(Value::Integer(*i)),
        toml::Value::Array(items) => items
            .iter()
            .map(|item| item.as_str().map(ToString::to_string))
            .collect::<Option<Vec<_>>>()
            .map(Value::List),
        _ => None,
    }
}

impl Manifest {
    /// Default manifest location (~/.config/steward/manifest.toml)
    pub fn default_path() -> Result<PathBuf> {
        Ok(crate::config::config_dir()?.join("manifest.toml"))
    }

    pub fn parse(content: &str) -> std::result::Result<Self, ManifestError> {
        Ok(toml::from_str(content)?)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read manifest: {}", path.display()))?;
        let manifest = Self::parse(&content)
            .with_context(|| format!("Failed to load manifest: {}", path.display()))?;
        log::debug!(
            "Loaded {} resource(s) from {}",
            manifest.resources.len(),
            path.display()
        );
        Ok(manifest)
    }

    /// Declare every resource into a new run
    pub fn build_run(
        &self,
        catalog: &Catalog,
        runner: Arc<dyn CommandRunner>,
    ) -> std::result::Result<Run, ManifestError> {
        let mut run = Run::new(catalog.runtime().clone(), runner);
        let mut seen = HashSet::new();

        for decl in &self.resources {
            let reference = decl.reference();
            if !seen.insert(reference.clone()) {
                return Err(ManifestError::Duplicate {
                    resource: reference.to_string(),
                });
            }
            let (resource, actions) = decl.declare(catalog)?;
            run.add_with_actions(resource, actions);
        }

        for target in Catalog::notification_targets() {
            run.add_target(target);
        }
        Ok(run)
    }
}
