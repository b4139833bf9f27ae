//! Notification routing between resources
//!
//! A step that changes the system can ask another resource to run one of its
//! actions. Immediate notifications are handed to the scheduler as soon as
//! the triggering action completes. Delayed notifications are buffered until
//! the end of the run and delivered at most once per target action, no matter
//! how many resources asked for them.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::{HashSet, VecDeque};
use std::fmt;
use std::str::FromStr;

/// Reference to a resource in `type[name]` form, e.g. `ohai[reload hostname]`
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ResourceRef {
    pub resource_type: String,
    pub name: String,
}

impl ResourceRef {
    pub fn new(resource_type: &str, name: &str) -> Self {
        Self {
            resource_type: resource_type.to_string(),
            name: name.to_string(),
        }
    }
}

impl fmt::Display for ResourceRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}[{}]", self.resource_type, self.name)
    }
}

impl FromStr for ResourceRef {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let invalid = || Error::InvalidReference(s.to_string());
        let s = s.trim();
        let open = s.find('[').ok_or_else(invalid)?;
        let name = s[open + 1..].strip_suffix(']').ok_or_else(invalid)?;
        let resource_type = &s[..open];

        if resource_type.is_empty() || name.is_empty() {
            return Err(invalid());
        }
        Ok(Self::new(resource_type, name))
    }
}

/// When a notification is delivered
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Timing {
    /// At the end of the run, coalesced per target action
    Delayed,
    /// As soon as the triggering action completes
    Immediate,
}

impl fmt::Display for Timing {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Delayed => write!(f, "delayed"),
            Self::Immediate => write!(f, "immediate"),
        }
    }
}

/// "Run `action` on `target` because `source` changed"
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    pub source: ResourceRef,
    pub target: ResourceRef,
    pub action: String,
    pub timing: Timing,
}

impl Notification {
    fn same_request(&self, other: &Self) -> bool {
        self.source == other.source && self.target == other.target && self.action == other.action
    }
}

impl fmt::Display for Notification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} notifies {} action '{}' ({})",
            self.source, self.target, self.action, self.timing
        )
    }
}

/// Queue of pending notifications for one run
#[derive(Debug, Default)]
pub struct NotificationRouter {
    immediate: VecDeque<Notification>,
    delayed: Vec<Notification>,
    /// (target, action) pairs already handed out from the delayed queue
    delivered: HashSet<(ResourceRef, String)>,
}

impl NotificationRouter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a notification.
    ///
    /// A pending notification with the same source, target and action is
    /// replaced in place by this one, keeping the stronger of the two timings.
    /// Only a delayed request upgraded to immediate moves, to the immediate
    /// queue.
    pub fn enqueue(&mut self, mut notification: Notification) {
        if let Some(pos) = self.immediate.iter().position(|n| n.same_request(&notification)) {
            notification.timing = Timing::Immediate;
            log::debug!("requeued: {notification}");
            self.immediate[pos] = notification;
            return;
        }
        if let Some(pos) = self.delayed.iter().position(|n| n.same_request(&notification)) {
            if notification.timing == Timing::Delayed {
                log::debug!("requeued: {notification}");
                self.delayed[pos] = notification;
                return;
            }
            self.delayed.remove(pos);
        }

        log::debug!("queued: {notification}");
        match notification.timing {
            Timing::Immediate => self.immediate.push_back(notification),
            Timing::Delayed => self.delayed.push(notification),
        }
    }

    /// Take every immediate notification queued so far
    pub fn take_immediate(&mut self) -> Vec<Notification> {
        self.immediate.drain(..).collect()
    }

    /// Drain delayed notifications for end-of-run delivery.
    ///
    /// Each (target, action) pair is returned once per run, in the order it
    /// was first requested. Pairs already drained earlier in the run are
    /// dropped.
    pub fn drain(&mut self) -> Vec<Notification> {
        let mut drained = Vec::new();
        for notification in std::mem::take(&mut self.delayed) {
            let key = (notification.target.clone(), notification.action.clone());
            if self.delivered.insert(key) {
                drained.push(notification);
            } else {
                log::debug!("coalesced: {notification}");
            }
        }
        drained
    }

    /// Delayed notifications waiting for the end of the run
    pub fn pending_delayed(&self) -> &[Notification] {
        &self.delayed
    }

    pub fn is_empty(&self) -> bool {
        self.immediate.is_empty() && self.delayed.is_empty()
    }
}
