//! Persisted report of the last `apply` run

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use convergence::{Failure, ResourceRef, RunOutcome, RunSummary, Value};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

/// What one run did, written after `steward apply`
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct RunReport {
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,

    /// Manifest the run was declared from
    #[serde(default)]
    pub manifest: Option<String>,

    pub why_run: bool,

    #[serde(default)]
    pub aborted: bool,

    /// Desired state of every declared resource
    #[serde(default)]
    pub resources: Vec<ResourceReport>,

    #[serde(default)]
    pub outcomes: Vec<RunOutcome>,

    #[serde(default)]
    pub failures: Vec<Failure>,

    #[serde(default)]
    pub notifications_delivered: usize,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ResourceReport {
    pub resource: ResourceRef,
    pub desired_state: BTreeMap<String, Value>,
}

impl RunReport {
    pub fn new(
        started_at: DateTime<Utc>,
        manifest: Option<&Path>,
        why_run: bool,
        resources: Vec<ResourceReport>,
        summary: RunSummary,
    ) -> Self {
        Self {
            started_at,
            finished_at: Utc::now(),
            manifest: manifest.map(|p| p.display().to_string()),
            why_run,
            aborted: summary.aborted,
            resources,
            outcomes: summary.outcomes,
            failures: summary.failures,
            notifications_delivered: summary.notifications_delivered,
        }
    }

    pub fn is_success(&self) -> bool {
        self.failures.is_empty()
    }

    pub fn updated(&self) -> usize {
        self.outcomes.iter().filter(|o| o.updated).count()
    }

    /// Load a report, or `None` if no run was recorded yet
    pub fn load(path: &Path) -> Result<Option<Self>> {
        if !path.exists() {
            log::debug!("No run report at {}", path.display());
            return Ok(None);
        }

        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read run report: {}", path.display()))?;
        let report = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse run report: {}", path.display()))?;

        log::debug!("Loaded run report from {}", path.display());
        Ok(Some(report))
    }

    /// Save the report, creating its directory if needed
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir)
                .with_context(|| format!("Failed to create state directory: {}", dir.display()))?;
        }

        let content = serde_json::to_string_pretty(self).context("Failed to serialize run report")?;
        fs::write(path, content)
            .with_context(|| format!("Failed to write run report: {}", path.display()))?;

        log::debug!("Saved run report to {}", path.display());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use convergence::{StepReport, StepStatus};
    use tempfile::TempDir;

    fn sample() -> RunReport {
        let host = ResourceRef::new("macos_hostname", "awesome_chef-mac01");
        let mut outcome = RunOutcome::new(&host, "local");
        outcome.updated = true;
        outcome.steps.push(StepReport {
            description: "set LocalHostName via scutil".into(),
            command: "/usr/sbin/scutil --set LocalHostName awesome_chef-mac01".into(),
            status: StepStatus::Executed,
        });
        let summary = RunSummary {
            outcomes: vec![outcome],
            notifications_delivered: 1,
            ..Default::default()
        };
        let resources = vec![ResourceReport {
            resource: host,
            desired_state: BTreeMap::from([(
                "hostname".to_string(),
                Value::from("awesome_chef-mac01"),
            )]),
        }];
        RunReport::new(Utc::now(), Some(Path::new("host.toml")), false, resources, summary)
    }

    #[test]
    fn test_load_missing_report() {
        let dir = TempDir::new().unwrap();
        assert!(RunReport::load(&dir.path().join("last-run.json")).unwrap().is_none());
    }

    #[test]
    fn test_save_and_load() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("last-run.json");

        sample().save(&path).unwrap();
        let loaded = RunReport::load(&path).unwrap().unwrap();

        assert!(loaded.is_success());
        assert_eq!(loaded.updated(), 1);
        assert_eq!(loaded.manifest.as_deref(), Some("host.toml"));
        assert_eq!(loaded.outcomes[0].action, "local");
        assert_eq!(
            loaded.resources[0].desired_state["hostname"],
            Value::from("awesome_chef-mac01")
        );
    }

    #[test]
    fn test_corrupt_report_is_an_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("last-run.json");
        fs::write(&path, "{ not json").unwrap();
        assert!(RunReport::load(&path).is_err());
    }
}
