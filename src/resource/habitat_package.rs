//! habitat_package - install, upgrade or remove Habitat packages

use convergence::{
    ActionName, CommandLine, CommandRunner, Condition, Declaration, Error, PropertySet,
    PropertySpec, PropertyType, Result, RuntimeConfig, Step, Value,
};
use serde::Deserialize;
use std::fmt;

use crate::config::HabitatConfig;

pub const RESOURCE_TYPE: &str = "habitat_package";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HabitatPackageAction {
    Install,
    Upgrade,
    Remove,
}

impl fmt::Display for HabitatPackageAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Install => write!(f, "install"),
            Self::Upgrade => write!(f, "upgrade"),
            Self::Remove => write!(f, "remove"),
        }
    }
}

impl ActionName for HabitatPackageAction {
    fn all() -> &'static [Self] {
        &[Self::Install, Self::Upgrade, Self::Remove]
    }
}

/// A package identifier: origin/name[/version[/release]]
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct PackageIdent {
    pub origin: String,
    pub name: String,
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default)]
    pub release: Option<String>,
}

impl PackageIdent {
    /// Parse `origin/name` plus an optional `version[/release]`
    pub fn parse(package_name: &str, version: Option<&str>) -> Result<Self> {
        let invalid = || Error::TypeMismatch {
            property: "package_name".to_string(),
            expected: "origin/name".to_string(),
            actual: format!("{package_name:?}"),
        };
        let (origin, name) = package_name.split_once('/').ok_or_else(invalid)?;
        if origin.is_empty() || name.is_empty() || name.contains('/') {
            return Err(invalid());
        }

        let (version, release) = match version {
            Some(v) => match v.split_once('/') {
                Some((v, r)) => (Some(v.to_string()), Some(r.to_string())),
                None => (Some(v.to_string()), None),
            },
            None => (None, None),
        };

        Ok(Self {
            origin: origin.to_string(),
            name: name.to_string(),
            version,
            release,
        })
    }

    /// Whether this names one exact build
    pub fn is_fully_qualified(&self) -> bool {
        self.version.is_some() && self.release.is_some()
    }
}

impl fmt::Display for PackageIdent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.origin, self.name)?;
        if let Some(version) = &self.version {
            write!(f, "/{version}")?;
        }
        if let Some(release) = &self.release {
            write!(f, "/{release}")?;
        }
        Ok(())
    }
}

#[derive(Debug, Deserialize)]
struct DepotPackage {
    ident: PackageIdent,
}

/// Latest build of `ident` in `channel`, asked from the Builder API
fn latest_in_channel(
    runner: &dyn CommandRunner,
    bldr_url: &str,
    channel: &str,
    ident: &PackageIdent,
    auth_token: Option<&str>,
) -> Result<PackageIdent> {
    let mut url = format!(
        "{}/v1/depot/channels/{}/{channel}/pkgs/{}",
        bldr_url.trim_end_matches('/'),
        ident.origin,
        ident.name
    );
    if let Some(version) = &ident.version {
        url.push('/');
        url.push_str(version);
    }
    url.push_str("/latest");

    let mut command = CommandLine::new("curl").arg("-fsSL");
    if let Some(token) = auth_token {
        command = command.arg("-H").secret_arg(format!("Authorization: Bearer {token}"));
    }
    let body = runner.run_capture(&command.arg(url))?;
    let package: DepotPackage = serde_json::from_str(&body).map_err(|e| Error::GuardEvaluation {
        step: format!("look up latest {ident}"),
        message: format!("unexpected Builder response: {e}"),
    })?;
    Ok(package.ident)
}

/// Install path of `ident`, or `None` when not installed
fn installed_path(runner: &dyn CommandRunner, ident: &PackageIdent) -> Result<Option<String>> {
    let output = runner.run(&pkg_path(ident))?;
    Ok(output
        .success()
        .then(|| output.stdout_str().trim_end().to_string()))
}

fn pkg_path(ident: &PackageIdent) -> CommandLine {
    CommandLine::new("hab").args(["pkg", "path", &ident.to_string()])
}

struct PackageSettings {
    ident: PackageIdent,
    bldr_url: String,
    channel: String,
    auth_token: Option<String>,
}

impl PackageSettings {
    fn read(props: &mut PropertySet) -> Result<Self> {
        let package_name = props.get_string("package_name")?;
        let version = props.get_opt_string("version")?;
        Ok(Self {
            ident: PackageIdent::parse(&package_name, version.as_deref())?,
            bldr_url: props.get_string("bldr_url")?,
            channel: props.get_string("channel")?,
            auth_token: props.get_opt_string("auth_token")?,
        })
    }
}

/// `hab pkg install` with the resource's options
fn install_command(props: &mut PropertySet, settings: &PackageSettings) -> Result<CommandLine> {
    let mut command = CommandLine::new("hab").args([
        "pkg".to_string(),
        "install".to_string(),
        settings.ident.to_string(),
        "--url".to_string(),
        settings.bldr_url.clone(),
        "--channel".to_string(),
        settings.channel.clone(),
    ]);
    // Read by hab itself, which keeps the token out of the command line
    if let Some(token) = &settings.auth_token {
        command = command.env("HAB_AUTH_TOKEN", token.as_str());
    }
    match props.get("binlink")? {
        Value::Bool(true) => command = command.arg("--binlink"),
        Value::String(s) if s == "force" => command = command.args(["--binlink", "--force"]),
        _ => {}
    }
    Ok(command.args(props.get_list("options")?))
}

fn install_steps(props: &mut PropertySet, _config: &RuntimeConfig) -> Result<Vec<Step>> {
    let settings = PackageSettings::read(props)?;
    let command = install_command(props, &settings)?;
    Ok(vec![
        Step::execute(&format!("install {}", settings.ident), command)
            .not_if(Condition::Succeeds(pkg_path(&settings.ident))),
    ])
}

fn upgrade_steps(props: &mut PropertySet, _config: &RuntimeConfig) -> Result<Vec<Step>> {
    let settings = PackageSettings::read(props)?;
    let command = install_command(props, &settings)?;

    let PackageSettings {
        ident,
        bldr_url,
        channel,
        auth_token,
    } = settings;
    let description = format!("upgrade {ident}");
    let label = format!("latest {ident} in {channel} installed");
    let guard = if ident.is_fully_qualified() {
        Condition::Succeeds(pkg_path(&ident))
    } else {
        Condition::check(label, move |runner| {
            let Some(path) = installed_path(runner, &ident)? else {
                return Ok(false);
            };
            let latest = latest_in_channel(runner, &bldr_url, &channel, &ident, auth_token.as_deref())?;
            let (Some(version), Some(release)) = (&latest.version, &latest.release) else {
                return Ok(false);
            };
            Ok(path.ends_with(&format!("/{version}/{release}")))
        })
    };

    Ok(vec![Step::execute(&description, command).not_if(guard)])
}

fn remove_steps(props: &mut PropertySet, _config: &RuntimeConfig) -> Result<Vec<Step>> {
    let settings = PackageSettings::read(props)?;
    let ident = settings.ident.to_string();

    let mut command = CommandLine::new("hab").args(["pkg", "uninstall", &ident]);
    if let Some(keep) = props.get("keep_latest")?.as_i64() {
        command = command.args(["--keep-latest".to_string(), keep.to_string()]);
    }
    for exclude in props.get_list("exclude")? {
        command = command.args(["--exclude", &exclude]);
    }
    if props.get_bool("no_deps")? {
        command = command.arg("--no-deps");
    }

    Ok(vec![
        Step::execute(&format!("remove {ident}"), command)
            .only_if(Condition::Succeeds(pkg_path(&settings.ident))),
    ])
}

pub fn declaration(habitat: &HabitatConfig) -> Declaration<HabitatPackageAction> {
    Declaration::new(RESOURCE_TYPE, HabitatPackageAction::Install)
        .description("Install, upgrade or remove Habitat packages.")
        .property(
            PropertySpec::new("package_name", PropertyType::String)
                .name_property()
                .description("Package to manage, as origin/name."),
        )
        .property(
            PropertySpec::new("version", PropertyType::String)
                .description("Version, or version/release, to install."),
        )
        .property(
            PropertySpec::new("bldr_url", PropertyType::String)
                .default(habitat.bldr_url.as_str())
                .description("Builder URL to install from."),
        )
        .property(
            PropertySpec::new("channel", PropertyType::String)
                .default(habitat.channel.as_str())
                .description("Release channel to install from."),
        )
        .property(
            PropertySpec::new("auth_token", PropertyType::String)
                .not_desired_state()
                .description("Builder token for private packages."),
        )
        .property(
            PropertySpec::new(
                "binlink",
                PropertyType::AnyOf(vec![PropertyType::Bool, PropertyType::Choice(&["force"])]),
            )
            .default(false)
            .description("Binlink the package's binaries; `force` overwrites existing links."),
        )
        .property(
            PropertySpec::new("options", PropertyType::StringList)
                .description("Extra arguments to `hab pkg install`."),
        )
        .property(
            PropertySpec::new("keep_latest", PropertyType::Integer)
                .description("Releases to keep when removing."),
        )
        .property(
            PropertySpec::new("exclude", PropertyType::StringList)
                .description("Dependencies to keep when removing."),
        )
        .property(
            PropertySpec::new("no_deps", PropertyType::Bool)
                .default(false)
                .description("Remove only the package, not its dependencies."),
        )
        .action(HabitatPackageAction::Install, "Install the package unless it is already installed.", install_steps)
        .action(HabitatPackageAction::Upgrade, "Install the latest release in the channel.", upgrade_steps)
        .action(HabitatPackageAction::Remove, "Uninstall the package if it is installed.", remove_steps)
}
