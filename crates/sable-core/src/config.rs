//! TOML configuration tree with env-var overrides.

use std::path::{Path, PathBuf};

use anyhow::Context;
use serde::{Deserialize, Serialize};

fn default_agent_name() -> String {
    "sable".to_string()
}

fn default_data_dir() -> String {
    "data".to_string()
}

fn default_skills_dir() -> String {
    dirs_home().join("sable-skills").display().to_string()
}

fn dirs_home() -> PathBuf {
    std::env::var_os("HOME")
        .map_or_else(|| PathBuf::from("."), PathBuf::from)
}

fn default_occurrence_threshold() -> u64 {
    2
}

fn default_lookback_days() -> u32 {
    7
}

fn default_approval_timeout_secs() -> u64 {
    120
}

fn default_auto_approve_after() -> u64 {
    3
}

fn default_error_threshold() -> u64 {
    3
}

fn default_correction_threshold() -> usize {
    3
}

fn default_rejection_threshold() -> u64 {
    3
}

fn default_miss_threshold() -> usize {
    5
}

fn default_test_timeout_secs() -> u64 {
    30
}

fn default_oracle_model() -> String {
    "gpt-4o-mini".to_string()
}

fn default_oracle_max_tokens() -> u32 {
    4_096
}

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub agent: AgentConfig,
    #[serde(default)]
    pub data: DataConfig,
    #[serde(default)]
    pub logger: LoggerConfig,
    #[serde(default)]
    pub gates: GatesConfig,
    #[serde(default, rename = "loop")]
    pub improvement: LoopConfig,
    #[serde(default)]
    pub autofix: AutofixConfig,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub oracle: Option<OracleConfig>,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct AgentConfig {
    #[serde(default = "default_agent_name")]
    pub name: String,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            name: default_agent_name(),
        }
    }
}

#[derive(Debug, Deserialize, Serialize)]
pub struct DataConfig {
    /// Root of the on-disk state: `errors/`, `audit-trail/`,
    /// `improvement-data/`, `autofix-data/` live underneath.
    #[serde(default = "default_data_dir")]
    pub dir: String,
}

impl Default for DataConfig {
    fn default() -> Self {
        Self {
            dir: default_data_dir(),
        }
    }
}

#[derive(Debug, Deserialize, Serialize)]
pub struct LoggerConfig {
    /// Occurrence count above which the threshold hook fires.
    #[serde(default = "default_occurrence_threshold")]
    pub occurrence_threshold: u64,
    /// Default query window in day files.
    #[serde(default = "default_lookback_days")]
    pub lookback_days: u32,
}

impl Default for LoggerConfig {
    fn default() -> Self {
        Self {
            occurrence_threshold: default_occurrence_threshold(),
            lookback_days: default_lookback_days(),
        }
    }
}

#[derive(Debug, Deserialize, Serialize)]
pub struct GatesConfig {
    /// Seconds a pending gate waits for external resolution.
    #[serde(default = "default_approval_timeout_secs")]
    pub approval_timeout_secs: u64,
    /// Identical plan approvals after which the plan gate auto-passes.
    #[serde(default = "default_auto_approve_after")]
    pub auto_approve_after: u64,
}

impl Default for GatesConfig {
    fn default() -> Self {
        Self {
            approval_timeout_secs: default_approval_timeout_secs(),
            auto_approve_after: default_auto_approve_after(),
        }
    }
}

#[derive(Debug, Deserialize, Serialize)]
pub struct LoopConfig {
    /// Recurring-error count at which an insight is raised.
    #[serde(default = "default_error_threshold")]
    pub error_threshold: u64,
    /// Identical corrections at which a proposal is raised immediately.
    #[serde(default = "default_correction_threshold")]
    pub correction_threshold: usize,
    /// Gate rejections per skill at which a raise-risk insight is raised.
    #[serde(default = "default_rejection_threshold")]
    pub rejection_threshold: u64,
    /// Unmatched messages required before clustering runs.
    #[serde(default = "default_miss_threshold")]
    pub miss_threshold: usize,
    /// Interval for the periodic analysis cycle; 0 disables it.
    #[serde(default)]
    pub analysis_interval_secs: u64,
}

impl Default for LoopConfig {
    fn default() -> Self {
        Self {
            error_threshold: default_error_threshold(),
            correction_threshold: default_correction_threshold(),
            rejection_threshold: default_rejection_threshold(),
            miss_threshold: default_miss_threshold(),
            analysis_interval_secs: 0,
        }
    }
}

#[derive(Debug, Deserialize, Serialize)]
pub struct AutofixConfig {
    /// Directory holding skill subdirectories with patchable sources.
    #[serde(default = "default_skills_dir")]
    pub skills_dir: String,
    #[serde(default = "default_test_timeout_secs")]
    pub test_timeout_secs: u64,
}

impl Default for AutofixConfig {
    fn default() -> Self {
        Self {
            skills_dir: default_skills_dir(),
            test_timeout_secs: default_test_timeout_secs(),
        }
    }
}

#[derive(Debug, Deserialize, Serialize)]
pub struct OracleConfig {
    /// OpenAI-compatible chat completions endpoint.
    pub base_url: String,
    #[serde(default = "default_oracle_model")]
    pub model: String,
    #[serde(default = "default_oracle_max_tokens")]
    pub max_tokens: u32,
    /// Env var holding the API key; the key itself never lives in config.
    #[serde(default)]
    pub api_key_env: Option<String>,
}

impl Config {
    /// Load configuration from a TOML file with env var overrides.
    ///
    /// Falls back to defaults when the file does not exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let mut config = if path.exists() {
            let content = std::fs::read_to_string(path).context("failed to read config file")?;
            toml::from_str::<Self>(&content).context("failed to parse config file")?
        } else {
            Self::default()
        };

        config.apply_env_overrides();
        Ok(config)
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(dir) = std::env::var("SABLE_DATA_DIR")
            && !dir.is_empty()
        {
            self.data.dir = dir;
        }
        if let Ok(dir) = std::env::var("SABLE_SKILLS_DIR")
            && !dir.is_empty()
        {
            self.autofix.skills_dir = dir;
        }
        if let Ok(url) = std::env::var("SABLE_ORACLE_URL")
            && !url.is_empty()
        {
            let oracle = self.oracle.get_or_insert_with(|| OracleConfig {
                base_url: String::new(),
                model: default_oracle_model(),
                max_tokens: default_oracle_max_tokens(),
                api_key_env: None,
            });
            oracle.base_url = url;
        }
    }

    /// Validate configuration values are within sane bounds.
    ///
    /// # Errors
    ///
    /// Returns an error if any value is out of range.
    pub fn validate(&self) -> anyhow::Result<()> {
        anyhow::ensure!(
            self.logger.lookback_days >= 1 && self.logger.lookback_days <= 365,
            "logger.lookback_days must be in 1..=365, got {}",
            self.logger.lookback_days
        );
        anyhow::ensure!(
            self.gates.approval_timeout_secs >= 1,
            "gates.approval_timeout_secs must be >= 1"
        );
        anyhow::ensure!(
            self.improvement.error_threshold >= 1,
            "loop.error_threshold must be >= 1"
        );
        anyhow::ensure!(
            self.improvement.correction_threshold >= 1,
            "loop.correction_threshold must be >= 1"
        );
        anyhow::ensure!(
            self.autofix.test_timeout_secs >= 1 && self.autofix.test_timeout_secs <= 600,
            "autofix.test_timeout_secs must be in 1..=600, got {}",
            self.autofix.test_timeout_secs
        );
        Ok(())
    }

    /// Root data directory as a path.
    #[must_use]
    pub fn data_dir(&self) -> PathBuf {
        PathBuf::from(&self.data.dir)
    }
}
