//! habitat_install - install or upgrade the Habitat `hab` binary
//!
//! The download and installation themselves are left to Habitat's install
//! script; this resource only decides whether to run it.

use convergence::{
    ActionName, CommandLine, CommandRunner, Condition, Declaration, Error, PropertySet,
    PropertySpec, PropertyType, Result, RuntimeConfig, Step,
};
use std::fmt;
use std::io::ErrorKind;
use std::path::PathBuf;

use crate::config::HabitatConfig;

pub const RESOURCE_TYPE: &str = "habitat_install";

const INSTALLER: &str = "hab-install.sh";

/// Fetch the installer. Takes the directory, script path and URL as `$1`..`$3`.
const DOWNLOAD_SCRIPT: &str = r#"mkdir -p "$1" && curl -fsSL -o "$2" "$3""#;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HabitatInstallAction {
    Install,
    Upgrade,
}

impl fmt::Display for HabitatInstallAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Install => write!(f, "install"),
            Self::Upgrade => write!(f, "upgrade"),
        }
    }
}

impl ActionName for HabitatInstallAction {
    fn all() -> &'static [Self] {
        &[Self::Install, Self::Upgrade]
    }
}

/// Version from `hab --version` output ("hab 1.6.56/20220712180417")
pub fn parse_hab_version(output: &str) -> Option<&str> {
    let version = output.trim().strip_prefix("hab ")?;
    version.split('/').next().filter(|v| !v.is_empty())
}

/// Installed `hab` version, or `None` if hab is not on the PATH
pub fn installed_version(runner: &dyn CommandRunner) -> Result<Option<String>> {
    match runner.run(&CommandLine::new("hab").arg("--version")) {
        Ok(output) if output.success() => {
            Ok(parse_hab_version(&output.stdout_str()).map(ToString::to_string))
        }
        Ok(_) => Ok(None),
        Err(Error::Io(e)) if e.kind() == ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e),
    }
}

/// hab is installed, at `version` when one is pinned
fn hab_installed(version: Option<String>) -> Condition {
    let label = match &version {
        Some(v) => format!("hab {v} installed"),
        None => "hab installed".to_string(),
    };
    Condition::check(label, move |runner| {
        let installed = installed_version(runner)?;
        Ok(match (&installed, &version) {
            (Some(installed), Some(wanted)) => installed == wanted,
            (Some(_), None) => true,
            (None, _) => false,
        })
    })
}

/// Download and run the install script
fn installer_steps(props: &mut PropertySet, config: &RuntimeConfig) -> Result<Vec<Step>> {
    let install_url = props.get_string("install_url")?;
    let version = props.get_opt_string("hab_version")?;
    let channel = props.get_opt_string("hab_channel")?;
    let bldr_url = props.get_opt_string("bldr_url")?;
    let tmp_dir = props
        .get_opt_string("tmp_dir")?
        .map_or_else(|| config.file_cache_path.clone(), PathBuf::from);
    let script = tmp_dir.join(INSTALLER).display().to_string();

    let mut run = CommandLine::new("env");
    if let Some(url) = &bldr_url {
        run = run.arg(format!("HAB_BLDR_URL={url}"));
    }
    run = run.args(["bash", &script]);
    if let Some(v) = &version {
        run = run.args(["-v", v]);
    }
    if let Some(c) = &channel {
        run = run.args(["-c", c]);
    }

    Ok(vec![
        Step::execute(
            "download hab install script",
            CommandLine::shell(DOWNLOAD_SCRIPT).args([
                "steward".to_string(),
                tmp_dir.display().to_string(),
                script,
                install_url,
            ]),
        )
        .not_if(hab_installed(version.clone())),
        Step::execute("run hab install script", run).not_if(hab_installed(version)),
    ])
}

/// Persist license acceptance when `license` is "accept"
fn license_step(props: &mut PropertySet) -> Result<Option<Step>> {
    if props.get_opt_string("license")?.as_deref() != Some("accept") {
        return Ok(None);
    }
    Ok(Some(
        Step::execute(
            "accept habitat license",
            CommandLine::new("hab").args(["license", "accept"]),
        )
        .not_if(Condition::Succeeds(CommandLine::shell(
            "test -f /hab/accepted-licenses/habitat || test -f \"$HOME/.hab/accepted-licenses/habitat\"",
        ))),
    ))
}

pub fn declaration(habitat: &HabitatConfig) -> Declaration<HabitatInstallAction> {
    Declaration::new(RESOURCE_TYPE, HabitatInstallAction::Install)
        .description("Install the Habitat `hab` binary with Habitat's install script.")
        .property(PropertySpec::new("name", PropertyType::String).name_property())
        .property(
            PropertySpec::new("install_url", PropertyType::String)
                .default(habitat.install_url.as_str())
                .description("URL of the install script."),
        )
        .property(
            PropertySpec::new("bldr_url", PropertyType::String)
                .description("Builder URL the installer downloads hab from."),
        )
        .property(
            PropertySpec::new("hab_version", PropertyType::String)
                .description("Version to install. Latest when unset."),
        )
        .property(
            PropertySpec::new("hab_channel", PropertyType::String)
                .description("Release channel to install hab from."),
        )
        .property(
            PropertySpec::new("tmp_dir", PropertyType::String)
                .not_desired_state()
                .description("Where the install script is downloaded. Defaults to the file cache."),
        )
        .property(
            PropertySpec::new("license", PropertyType::Choice(&["accept", "accept-no-persist"]))
                .description("Accept the Habitat license."),
        )
        .action(HabitatInstallAction::Install, "Installs Habitat. Does nothing if hab is already installed.", |props, config| {
            let mut steps = installer_steps(props, config)?;
            steps.extend(license_step(props)?);
            Ok(steps)
        })
        .action(HabitatInstallAction::Upgrade, "Re-runs the installer unless the pinned version is installed.", |props, config| {
            let pinned = props.is_set("hab_version");
            let mut steps = installer_steps(props, config)?;
            if !pinned {
                for step in &mut steps {
                    step.guard = None;
                }
            }
            steps.extend(license_step(props)?);
            Ok(steps)
        })
}
