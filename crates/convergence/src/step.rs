//! Steps - guarded units of work inside an action

use crate::command::CommandLine;
use crate::guard::{Condition, Guard};
use crate::notification::{ResourceRef, Timing};

/// A notification a step sends when its command runs
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotifySpec {
    pub target: ResourceRef,
    pub action: String,
    pub timing: Timing,
}

/// One guarded command
///
/// ```ignore
/// let step = Step::execute("set HostName via scutil", set_cmd)
///     .not_if(Condition::output_equals(get_cmd, "mymac"))
///     .notifies("reload", &"ohai[reload hostname]".parse()?);
/// ```
#[derive(Debug, Clone)]
pub struct Step {
    pub description: String,
    pub command: CommandLine,
    pub guard: Option<Guard>,
    pub notifications: Vec<NotifySpec>,
    /// Exit codes that count as success
    pub returns: Vec<i32>,
}

impl Step {
    pub fn execute(description: &str, command: CommandLine) -> Self {
        Self {
            description: description.to_string(),
            command,
            guard: None,
            notifications: Vec::new(),
            returns: vec![0],
        }
    }

    pub fn guard(mut self, guard: Guard) -> Self {
        self.guard = Some(guard);
        self
    }

    /// Skip when `condition` already holds
    pub fn not_if(self, condition: Condition) -> Self {
        self.guard(Guard::NotIf(condition))
    }

    /// Run only when `condition` holds
    pub fn only_if(self, condition: Condition) -> Self {
        self.guard(Guard::OnlyIf(condition))
    }

    /// Notify `target` at the end of the run
    pub fn notifies(self, action: &str, target: &ResourceRef) -> Self {
        self.notifies_with(action, target, Timing::Delayed)
    }

    /// Notify `target` as soon as this action completes
    pub fn notifies_immediately(self, action: &str, target: &ResourceRef) -> Self {
        self.notifies_with(action, target, Timing::Immediate)
    }

    pub fn notifies_with(mut self, action: &str, target: &ResourceRef, timing: Timing) -> Self {
        self.notifications.push(NotifySpec {
            target: target.clone(),
            action: action.to_string(),
            timing,
        });
        self
    }

    pub fn returns(mut self, codes: &[i32]) -> Self {
        self.returns = codes.to_vec();
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder() {
        let ohai = ResourceRef::new("ohai", "reload hostname");
        let step = Step::execute("set HostName", CommandLine::new("scutil"))
            .not_if(Condition::Succeeds(CommandLine::new("true")))
            .notifies("reload", &ohai)
            .notifies_immediately("restart", &ResourceRef::new("service", "mdns"))
            .returns(&[0, 3]);

        assert!(matches!(step.guard, Some(Guard::NotIf(_))));
        assert_eq!(step.notifications.len(), 2);
        assert_eq!(step.notifications[0].timing, Timing::Delayed);
        assert_eq!(step.notifications[0].target, ohai);
        assert_eq!(step.notifications[1].timing, Timing::Immediate);
        assert_eq!(step.returns, vec![0, 3]);
    }

    #[test]
    fn test_defaults() {
        let step = Step::execute("noop", CommandLine::new("true"));
        assert!(step.guard.is_none());
        assert!(step.notifications.is_empty());
        assert_eq!(step.returns, vec![0]);
    }
}
