//! macos_hostname - set HostName, ComputerName and LocalHostName via scutil
//!
//! Every step compares the current `scutil --get` value with the desired
//! one first and notifies `ohai[reload hostname]` (delayed) when it changes
//! something, so facts are reloaded once at the end of the run.

use convergence::{
    ActionName, CommandLine, CommandRunner, Condition, Declaration, PropertySet, PropertySpec,
    PropertyType, ResourceRef, Result, RuntimeConfig, Step, compile_time_property,
};
use std::fmt;

use super::ohai;

pub const RESOURCE_TYPE: &str = "macos_hostname";

const SCUTIL: &str = "/usr/sbin/scutil";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HostnameAction {
    Set,
    Local,
    ComputerName,
    Host,
}

impl fmt::Display for HostnameAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Set => write!(f, "set"),
            Self::Local => write!(f, "local"),
            Self::ComputerName => write!(f, "computer_name"),
            Self::Host => write!(f, "host"),
        }
    }
}

impl ActionName for HostnameAction {
    fn all() -> &'static [Self] {
        &[Self::Set, Self::Local, Self::ComputerName, Self::Host]
    }
}

/// The three names scutil manages
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScutilKey {
    HostName,
    ComputerName,
    LocalHostName,
}

impl ScutilKey {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::HostName => "HostName",
            Self::ComputerName => "ComputerName",
            Self::LocalHostName => "LocalHostName",
        }
    }
}

/// `localhostname` up to the first `.`
pub fn shortname(localhostname: &str) -> &str {
    localhostname.split('.').next().unwrap_or(localhostname)
}

/// Current scutil value of `key`; `None` when the key is not set.
///
/// scutil exits 1 and prints "<key>: not set" for keys that were never
/// configured, which is a readable state rather than a failed query.
pub fn scutil_get(runner: &dyn CommandRunner, key: ScutilKey) -> Result<Option<String>> {
    let command = CommandLine::new(SCUTIL).args(["--get", key.as_str()]);
    let output = runner.run(&command)?;
    if output.success() {
        return Ok(Some(output.stdout_str().trim_end().to_string()));
    }
    let not_set = output.stdout_str().contains("not set") || output.stderr_str().contains("not set");
    if not_set {
        return Ok(None);
    }
    Err(output.into_error(&command))
}

/// Set `key` to `value` unless it already reads back as `value`
fn scutil_step(key: ScutilKey, value: &str) -> Step {
    let desired = value.to_string();
    let label = format!("`{SCUTIL} --get {}` == {value:?}", key.as_str());

    Step::execute(
        &format!("set {} via scutil", key.as_str()),
        CommandLine::new(SCUTIL).args(["--set", key.as_str(), value]),
    )
    .not_if(Condition::check(label, move |runner| {
        Ok(scutil_get(runner, key)?.as_deref() == Some(desired.as_str()))
    }))
    .notifies("reload", &reload_target())
}

/// Fact reloader notified whenever a name changes
pub fn reload_target() -> ResourceRef {
    ResourceRef::new(ohai::RESOURCE_TYPE, "reload hostname")
}

fn host_step(props: &mut PropertySet) -> Result<Step> {
    Ok(scutil_step(ScutilKey::HostName, &props.get_string("hostname")?))
}

fn computer_name_step(props: &mut PropertySet) -> Result<Step> {
    Ok(scutil_step(ScutilKey::ComputerName, &props.get_string("computername")?))
}

fn local_step(props: &mut PropertySet) -> Result<Step> {
    let localhostname = props.get_string("localhostname")?;
    Ok(scutil_step(ScutilKey::LocalHostName, shortname(&localhostname)))
}

fn set_steps(props: &mut PropertySet, _config: &RuntimeConfig) -> Result<Vec<Step>> {
    Ok(vec![host_step(props)?, computer_name_step(props)?, local_step(props)?])
}

pub fn declaration() -> Declaration<HostnameAction> {
    Declaration::new(RESOURCE_TYPE, HostnameAction::Set)
        .description(
            "Set the system's hostname, computer name and local hostname, then reload \
             hostname facts so later resources see the new names.",
        )
        .property(
            PropertySpec::new("hostname", PropertyType::String)
                .name_property()
                .description("Hostname, if it differs from the resource name. Shown in shells and to ssh clients."),
        )
        .property(
            PropertySpec::new("computername", PropertyType::String)
                .default_from("hostname")
                .description("User-friendly computer name. Defaults to hostname."),
        )
        .property(
            PropertySpec::new("localhostname", PropertyType::String)
                .default_from("hostname")
                .description(
                    "Local network (Bonjour) name. Defaults to hostname; everything from the \
                     first '.' is dropped.",
                ),
        )
        .property(compile_time_property(true))
        .action(HostnameAction::Set, "Sets all node's hostnames.", set_steps)
        .action(HostnameAction::Local, "Only changes node's localhost name.", |props, _| {
            Ok(vec![local_step(props)?])
        })
        .action(HostnameAction::ComputerName, "Only changes node's computername.", |props, _| {
            Ok(vec![computer_name_step(props)?])
        })
        .action(HostnameAction::Host, "Only set the hostname.", |props, _| {
            Ok(vec![host_step(props)?])
        })
}
