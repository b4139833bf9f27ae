use anyhow::{Context, Result};
use convergence::RuntimeConfig;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::sudo::SudoConfig;

/// Get the config directory path (~/.config/steward)
pub fn config_dir() -> Result<PathBuf> {
    let home = dirs::home_dir().context("Could not determine home directory")?;
    Ok(home.join(".config").join("steward"))
}

/// Get the state directory path (~/.local/state/steward)
pub fn state_dir() -> Result<PathBuf> {
    let home = dirs::home_dir().context("Could not determine home directory")?;
    Ok(home.join(".local").join("state").join("steward"))
}

/// Expand `~` and environment variables in a configured path
pub fn expand_path(path: &str) -> PathBuf {
    match shellexpand::full(path) {
        Ok(expanded) => PathBuf::from(expanded.as_ref()),
        Err(_) => PathBuf::from(shellexpand::tilde(path).as_ref()),
    }
}

// ============================================================================
// Steward Config
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StewardConfig {
    /// Upper bound for a single step command; 0 disables the timeout
    pub command_timeout_secs: u64,

    /// Report what would change without changing anything
    pub why_run: bool,

    /// Stop at the first failed resource
    pub fail_fast: bool,

    /// Scratch directory for installers (defaults to the system temp dir)
    pub file_cache_path: Option<String>,

    /// Where `apply` writes its run report
    pub state_file: Option<String>,

    pub sudo: SudoConfig,

    pub habitat: HabitatConfig,
}

impl Default for StewardConfig {
    fn default() -> Self {
        Self {
            command_timeout_secs: 900,
            why_run: false,
            fail_fast: true,
            file_cache_path: None,
            state_file: None,
            sudo: SudoConfig::default(),
            habitat: HabitatConfig::default(),
        }
    }
}

/// Defaults for the Habitat resources
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HabitatConfig {
    /// Builder (depot) URL packages are installed from
    pub bldr_url: String,

    /// Release channel packages are installed from
    pub channel: String,

    /// Location of the `hab` install script
    pub install_url: String,
}

impl Default for HabitatConfig {
    fn default() -> Self {
        Self {
            bldr_url: "https://bldr.habitat.sh".to_string(),
            channel: "stable".to_string(),
            install_url: "https://raw.githubusercontent.com/habitat-sh/habitat/main/components/hab/install.sh"
                .to_string(),
        }
    }
}

impl StewardConfig {
    /// Path of the config file (~/.config/steward/config.toml)
    pub fn path() -> Result<PathBuf> {
        Ok(config_dir()?.join("config.toml"))
    }

    /// Load the config file, or defaults if it doesn't exist
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::path()?)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            log::debug!("Config file {} does not exist, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        let config: Self = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        log::debug!("Loaded config from {}", path.display());
        Ok(config)
    }

    /// Settings handed to every declared resource
    pub fn runtime_config(&self) -> RuntimeConfig {
        let defaults = RuntimeConfig::default();
        RuntimeConfig {
            why_run: self.why_run,
            fail_fast: self.fail_fast,
            command_timeout: (self.command_timeout_secs > 0)
                .then(|| Duration::from_secs(self.command_timeout_secs)),
            file_cache_path: self
                .file_cache_path
                .as_deref()
                .map_or(defaults.file_cache_path, expand_path),
        }
    }

    /// Path of the run report
    pub fn state_file(&self) -> Result<PathBuf> {
        match &self.state_file {
            Some(path) => Ok(expand_path(path)),
            None => Ok(state_dir()?.join("last-run.json")),
        }
    }
}
