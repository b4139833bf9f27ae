//! Core types for run outcomes and summaries

use crate::notification::{Notification, ResourceRef};
use serde::{Deserialize, Serialize};

/// What happened to a single step
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StepStatus {
    /// Command ran and succeeded
    Executed,
    /// Guard said the effect already holds
    Skipped { reason: String },
    /// Why-run: the command would have run
    WouldExecute,
}

/// Report for one step of an action
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepReport {
    pub description: String,
    pub command: String,
    pub status: StepStatus,
}

impl StepReport {
    /// Whether the step changed (or in why-run, would change) the system
    pub fn is_change(&self) -> bool {
        matches!(self.status, StepStatus::Executed | StepStatus::WouldExecute)
    }
}

/// Result of running one action on one resource
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunOutcome {
    pub resource: ResourceRef,
    pub action: String,
    /// True iff at least one step executed its command
    pub updated: bool,
    pub steps: Vec<StepReport>,
    /// Notifications queued by executed steps
    pub notifications: Vec<Notification>,
}

impl RunOutcome {
    pub fn new(resource: &ResourceRef, action: &str) -> Self {
        Self {
            resource: resource.clone(),
            action: action.to_string(),
            updated: false,
            steps: Vec::new(),
            notifications: Vec::new(),
        }
    }

    /// Steps that would run in why-run mode
    pub fn pending(&self) -> usize {
        self.steps
            .iter()
            .filter(|s| s.status == StepStatus::WouldExecute)
            .count()
    }
}

/// A failed action recorded by a run that keeps going
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Failure {
    pub resource: ResourceRef,
    pub action: String,
    pub error: String,
}

/// Summary of a whole run
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RunSummary {
    pub outcomes: Vec<RunOutcome>,
    pub failures: Vec<Failure>,
    pub notifications_delivered: usize,
    /// Stopped early because of a failure with `fail_fast` set
    #[serde(default)]
    pub aborted: bool,
}

impl RunSummary {
    /// Number of actions that changed the system
    pub fn updated(&self) -> usize {
        self.outcomes.iter().filter(|o| o.updated).count()
    }

    /// Number of actions that left the system as it was
    pub fn up_to_date(&self) -> usize {
        self.outcomes.len() - self.updated()
    }

    /// Check if the run was fully successful (no failures)
    pub fn is_success(&self) -> bool {
        self.failures.is_empty()
    }

    /// Outcome of `action` on `resource`, if it ran
    pub fn outcome(&self, resource: &ResourceRef, action: &str) -> Option<&RunOutcome> {
        self.outcomes
            .iter()
            .find(|o| &o.resource == resource && o.action == action)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn outcome(name: &str, updated: bool) -> RunOutcome {
        RunOutcome {
            updated,
            ..RunOutcome::new(&ResourceRef::new("test", name), "run")
        }
    }

    #[test]
    fn test_summary_counts() {
        let summary = RunSummary {
            outcomes: vec![outcome("a", true), outcome("b", false), outcome("c", true)],
            ..Default::default()
        };
        assert_eq!(summary.updated(), 2);
        assert_eq!(summary.up_to_date(), 1);
        assert!(summary.is_success());
        assert!(summary.outcome(&ResourceRef::new("test", "b"), "run").is_some());
        assert!(summary.outcome(&ResourceRef::new("test", "b"), "stop").is_none());
    }

    #[test]
    fn test_step_report_serialization() {
        let report = StepReport {
            description: "set HostName via scutil".into(),
            command: "/usr/sbin/scutil --set HostName mac".into(),
            status: StepStatus::Skipped {
                reason: "already set".into(),
            },
        };
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["status"]["kind"], "skipped");
        assert_eq!(json["status"]["reason"], "already set");
        assert!(!report.is_change());
    }
}
