//! Harness configuration. Every section has a default; the command line
//! overrides individual values after loading.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HarnessConfig {
    /// Root of every solver's target directory
    pub directory: PathBuf,
    /// Prefix of captured output files, with `$var` placeholders
    pub output: String,
    /// bzip2 captured output before moving it to results
    pub compress: bool,
    pub limits: Limits,
    pub log: LogConfig,
}

/// Resource ceiling of one invocation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Limits {
    /// CPU-time ceiling; wall time may reach 1.5x this
    pub timeout_secs: f64,
    /// Virtual memory ceiling, bytes
    pub memory_bytes: u64,
    /// Poll interval
    pub check_secs: f64,
    /// Grace window between graceful and forceful stop
    pub kill_delay_secs: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    pub level: String,
    pub json: bool,
    /// Append log records here instead of stderr
    pub file: Option<PathBuf>,
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            directory: PathBuf::from("runs"),
            output: "$name.$index".to_string(),
            compress: false,
            limits: Limits::default(),
            log: LogConfig::default(),
        }
    }
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            timeout_secs: 300.0,
            memory_bytes: 2 * 1024 * 1024 * 1024,
            check_secs: 1.0,
            kill_delay_secs: 5.0,
        }
    }
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
            file: None,
        }
    }
}

impl Limits {
    /// Reject ceilings no invocation can be supervised under.
    pub fn validate(&self) -> Result<()> {
        if !(self.check_secs >= 0.0 && self.check_secs.is_finite()) {
            return Err(Error::config(format!(
                "check interval must be finite and >= 0, got {}",
                self.check_secs
            )));
        }
        if !(self.timeout_secs > 0.0 && self.timeout_secs.is_finite()) {
            return Err(Error::config(format!(
                "timeout must be finite and > 0, got {}",
                self.timeout_secs
            )));
        }
        if self.memory_bytes == 0 {
            return Err(Error::config("memory limit must be > 0"));
        }
        if !(self.kill_delay_secs >= 0.0 && self.kill_delay_secs.is_finite()) {
            return Err(Error::config(format!(
                "kill delay must be finite and >= 0, got {}",
                self.kill_delay_secs
            )));
        }
        Ok(())
    }

    pub fn check_interval(&self) -> Duration {
        Duration::from_secs_f64(self.check_secs)
    }
}

impl HarnessConfig {
    /// Load from a JSON file; a missing file yields the defaults, a file that
    /// cannot be read or parsed is a configuration error.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let data = std::fs::read_to_string(path)
            .map_err(|e| Error::config(format!("cannot read {}: {}", path.display(), e)))?;
        serde_json::from_str(&data)
            .map_err(|e| Error::config(format!("malformed {}: {}", path.display(), e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_validate() {
        assert!(Limits::default().validate().is_ok());
        assert_eq!(HarnessConfig::default().output, "$name.$index");
    }

    #[test]
    fn rejects_bad_ceilings() {
        let bad = [
            Limits { timeout_secs: 0.0, ..Limits::default() },
            Limits { memory_bytes: 0, ..Limits::default() },
            Limits { check_secs: -1.0, ..Limits::default() },
            Limits { check_secs: f64::NAN, ..Limits::default() },
            Limits { kill_delay_secs: -0.5, ..Limits::default() },
        ];
        for l in bad {
            assert!(matches!(l.validate(), Err(Error::Config(_))), "{:?}", l);
        }
    }

    #[test]
    fn infinite_ceilings_are_rejected() {
        let bad = [
            Limits { check_secs: f64::INFINITY, ..Limits::default() },
            Limits { timeout_secs: f64::INFINITY, ..Limits::default() },
            Limits { kill_delay_secs: f64::INFINITY, ..Limits::default() },
        ];
        for l in bad {
            assert!(matches!(l.validate(), Err(Error::Config(_))), "{:?}", l);
        }
    }

    #[test]
    fn zero_check_interval_is_allowed() {
        let l = Limits { check_secs: 0.0, ..Limits::default() };
        assert!(l.validate().is_ok());
        assert_eq!(l.check_interval(), Duration::ZERO);
    }

    #[test]
    fn partial_file_fills_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("benchbot.json");
        std::fs::write(&path, r#"{"compress": true, "limits": {"timeout_secs": 10}}"#).unwrap();
        let c = HarnessConfig::load(&path).unwrap();
        assert!(c.compress);
        assert_eq!(c.limits.timeout_secs, 10.0);
        assert_eq!(c.limits.kill_delay_secs, 5.0);
        assert_eq!(c.log.level, "info");
    }

    #[test]
    fn malformed_file_is_config_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("benchbot.json");
        std::fs::write(&path, "{ not json").unwrap();
        assert!(matches!(HarnessConfig::load(&path), Err(Error::Config(_))));
    }
}
