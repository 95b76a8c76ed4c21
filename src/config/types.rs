//! Configuration types, defaults, loading, and validation.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Orchestration and rate-budget knobs
    #[serde(default)]
    pub runtime: RuntimeConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// What to do when a requested agent depends on an agent outside the request set.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MissingDependencyPolicy {
    /// Silently pull the missing dependencies (and theirs, transitively) into the run.
    #[default]
    AutoAdd,
    /// Reject the selection.
    Fail,
}

/// Orchestration runtime configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuntimeConfig {
    /// Token-bucket capacity and per-minute refill for LLM calls (default: 10)
    #[serde(default = "default_rpm_limit")]
    pub rpm_limit: u32,

    /// Executor concurrency ceiling (default: 2)
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent: usize,

    /// Whole-turn deadline in milliseconds (default: 60000)
    #[serde(default = "default_turn_deadline_ms")]
    pub turn_deadline_ms: u64,

    /// Per-LLM-call deadline in milliseconds (default: 25000)
    #[serde(default = "default_llm_call_deadline_ms")]
    pub llm_call_deadline_ms: u64,

    /// Missing-dependency handling for explicit agent selections
    #[serde(default)]
    pub missing_dependency_policy: MissingDependencyPolicy,

    /// Confidence floor above which two disagreeing recommendations are
    /// both surfaced with a mixed-signals caveat (default: 60)
    #[serde(default = "default_synthesis_conflict_threshold")]
    pub synthesis_conflict_threshold: u32,

    /// Aggregate-relevance floor below which a verification-required
    /// retrieval is flagged thin (default: 0.3)
    #[serde(default = "default_verification_threshold")]
    pub verification_threshold: f32,

    /// Max output tokens requested per LLM call (default: 1024)
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
}

fn default_rpm_limit() -> u32 {
    10
}

fn default_max_concurrent() -> usize {
    2
}

fn default_turn_deadline_ms() -> u64 {
    60_000
}

fn default_llm_call_deadline_ms() -> u64 {
    25_000
}

fn default_synthesis_conflict_threshold() -> u32 {
    60
}

fn default_verification_threshold() -> f32 {
    0.3
}

fn default_max_tokens() -> u32 {
    1024
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            rpm_limit: default_rpm_limit(),
            max_concurrent: default_max_concurrent(),
            turn_deadline_ms: default_turn_deadline_ms(),
            llm_call_deadline_ms: default_llm_call_deadline_ms(),
            missing_dependency_policy: MissingDependencyPolicy::default(),
            synthesis_conflict_threshold: default_synthesis_conflict_threshold(),
            verification_threshold: default_verification_threshold(),
            max_tokens: default_max_tokens(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level filter when RUST_LOG is unset (default: "info")
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Also write JSON logs to a daily-rotated file
    #[serde(default)]
    pub file_enabled: bool,

    /// Directory for file logs (default: `<home>/logs`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub directory: Option<PathBuf>,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            file_enabled: false,
            directory: None,
        }
    }
}

/// Path to the finsight home directory: `~/.finsight/`
pub fn finsight_home() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".finsight")
}

impl Config {
    /// Load configuration from `~/.finsight/config.toml`, falling back to
    /// defaults when the file does not exist.
    pub fn load() -> Result<Self> {
        Self::load_from(&finsight_home().join("config.toml"))
    }

    /// Load configuration from an explicit path.
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let raw = fs::read_to_string(path)
            .with_context(|| format!("failed to read config at {}", path.display()))?;
        let config: Self = toml::from_str(&raw)
            .with_context(|| format!("failed to parse config at {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    /// Reject configurations the core cannot honour.
    pub fn validate(&self) -> Result<()> {
        anyhow::ensure!(self.runtime.rpm_limit > 0, "rpm_limit must be positive");
        anyhow::ensure!(
            self.runtime.max_concurrent > 0,
            "max_concurrent must be positive"
        );
        anyhow::ensure!(
            (0.0..=1.0).contains(&self.runtime.verification_threshold),
            "verification_threshold must be within [0, 1]"
        );
        anyhow::ensure!(
            self.runtime.synthesis_conflict_threshold <= 100,
            "synthesis_conflict_threshold must be within [0, 100]"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let config = Config::default();
        assert_eq!(config.runtime.rpm_limit, 10);
        assert_eq!(config.runtime.max_concurrent, 2);
        assert_eq!(config.runtime.turn_deadline_ms, 60_000);
        assert_eq!(config.runtime.llm_call_deadline_ms, 25_000);
        assert_eq!(
            config.runtime.missing_dependency_policy,
            MissingDependencyPolicy::AutoAdd
        );
        assert_eq!(config.runtime.synthesis_conflict_threshold, 60);
        assert!((config.runtime.verification_threshold - 0.3).abs() < f32::EPSILON);
    }

    #[test]
    fn load_from_missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::load_from(&dir.path().join("nope.toml")).unwrap();
        assert_eq!(config.runtime.rpm_limit, 10);
    }

    #[test]
    fn partial_file_fills_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(
            &path,
            "[runtime]\nrpm_limit = 30\nmissing_dependency_policy = \"fail\"\n",
        )
        .unwrap();

        let config = Config::load_from(&path).unwrap();
        assert_eq!(config.runtime.rpm_limit, 30);
        assert_eq!(
            config.runtime.missing_dependency_policy,
            MissingDependencyPolicy::Fail
        );
        assert_eq!(config.runtime.max_concurrent, 2);
    }

    #[test]
    fn zero_rpm_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "[runtime]\nrpm_limit = 0\n").unwrap();
        assert!(Config::load_from(&path).is_err());
    }
}
