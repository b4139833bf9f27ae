//! Scoped sudo context with deterministic allowlist
//!
//! Sudo is never requested for the entire process. Instead:
//! 1. Config lists which programs run through sudo (allowlist)
//! 2. Guards and planning never need sudo
//! 3. Sudo is validated once before a run that will mutate
//! 4. The sudo timestamp is dropped when the run ends

use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::process::Command;

/// Configuration for sudo allowlist
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SudoConfig {
    /// Programs whose step commands run through `sudo -n`
    /// (e.g. ["/usr/sbin/scutil", "hab"])
    #[serde(default)]
    pub programs: Vec<String>,
}

impl SudoConfig {
    /// Check if a program requires sudo.
    ///
    /// Entries match either the exact program or its file name, so
    /// `scutil` also covers `/usr/sbin/scutil`.
    pub fn requires_sudo(&self, program: &str) -> bool {
        let file_name = Path::new(program)
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or(program);
        self.programs.iter().any(|p| p == program || p == file_name)
    }

    pub fn is_empty(&self) -> bool {
        self.programs.is_empty()
    }
}

/// Scoped sudo context - invalidates the sudo timestamp on drop
pub struct SudoContext {
    _private: (),
}

impl SudoContext {
    /// Acquire sudo privileges with a reason shown to user
    pub fn acquire(reason: &str) -> Result<Self> {
        if Self::is_valid() {
            log::debug!("sudo timestamp still valid, not prompting");
            return Ok(Self { _private: () });
        }

        eprintln!();
        eprintln!("  Sudo required: {reason}");
        eprintln!();

        // Validate sudo (will prompt for password)
        let status = Command::new("sudo")
            .args(["-v"])
            .status()
            .context("Failed to execute sudo")?;

        if !status.success() {
            bail!("Failed to acquire sudo privileges");
        }

        Ok(Self { _private: () })
    }

    /// Check if sudo is currently valid (without prompting)
    pub fn is_valid() -> bool {
        Command::new("sudo")
            .args(["-n", "true"])
            .status()
            .map(|s| s.success())
            .unwrap_or(false)
    }
}

impl Drop for SudoContext {
    fn drop(&mut self) {
        // Invalidate sudo timestamp to release privileges
        let _ = Command::new("sudo").args(["-k"]).status();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sudo_config_defaults() {
        let config = SudoConfig::default();
        assert!(config.is_empty());
        assert!(!config.requires_sudo("/usr/sbin/scutil"));
    }

    #[test]
    fn test_program_requires_sudo() {
        let config = SudoConfig {
            programs: vec!["scutil".to_string(), "/opt/bin/hab".to_string()],
        };
        assert!(config.requires_sudo("scutil"));
        assert!(config.requires_sudo("/usr/sbin/scutil"));
        assert!(config.requires_sudo("/opt/bin/hab"));
        assert!(!config.requires_sudo("hab"));
        assert!(!config.requires_sudo("curl"));
    }
}
