//! Herald configuration.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::HeraldError;
use crate::queue::RetryPolicy;

/// Upper bound for every configured duration (100 years).
pub const MAX_DURATION_SECS: u64 = 100 * 365 * 24 * 60 * 60;

/// Root configuration. Every field has a default, so an empty file is valid.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HeraldConfig {
    /// How long before the due date the reminder fires.
    #[serde(default = "default_reminder_lead_time_secs")]
    pub reminder_lead_time_secs: u64,
    /// How often the worker looks for due jobs.
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,
    /// Dispatch attempts before a job is Failed.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// How long Fired / Cancelled / Failed records are kept.
    #[serde(default = "default_terminal_retention_secs")]
    pub terminal_retention_secs: u64,
    /// A claimed job with no recorded result is put back to Pending after this long.
    #[serde(default = "default_claim_timeout_secs")]
    pub claim_timeout_secs: u64,
    /// Number of dispatch workers.
    #[serde(default = "default_worker_count")]
    pub worker_count: usize,
    /// `tracing_subscriber::EnvFilter` directive used when `RUST_LOG` is unset.
    #[serde(default = "default_log_filter")]
    pub log_filter: String,
}

fn default_reminder_lead_time_secs() -> u64 { 5 * 60 }
fn default_poll_interval_secs() -> u64 { 10 }
fn default_max_retries() -> u32 { 3 }
fn default_terminal_retention_secs() -> u64 { 60 * 60 }
fn default_claim_timeout_secs() -> u64 { 60 }
fn default_worker_count() -> usize { 1 }
fn default_log_filter() -> String { "info".into() }

impl Default for HeraldConfig {
    fn default() -> Self {
        Self {
            reminder_lead_time_secs: default_reminder_lead_time_secs(),
            poll_interval_secs: default_poll_interval_secs(),
            max_retries: default_max_retries(),
            terminal_retention_secs: default_terminal_retention_secs(),
            claim_timeout_secs: default_claim_timeout_secs(),
            worker_count: default_worker_count(),
            log_filter: default_log_filter(),
        }
    }
}

impl HeraldConfig {
    /// Load config from a specific TOML file.
    pub fn load_from(path: &Path) -> Result<Self, HeraldError> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            HeraldError::Config(format!("failed to read {}: {e}", path.display()))
        })?;
        Self::from_toml(&content)
    }

    /// Load from `path` when given, otherwise use defaults.
    pub fn load_or_default(path: Option<&Path>) -> Result<Self, HeraldError> {
        match path {
            Some(path) => Self::load_from(path),
            None => Ok(Self::default()),
        }
    }

    pub fn from_toml(content: &str) -> Result<Self, HeraldError> {
        let config: Self = toml::from_str(content)
            .map_err(|e| HeraldError::Config(format!("failed to parse config: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), HeraldError> {
        if self.poll_interval_secs == 0 {
            return Err(HeraldError::Config(
                "poll_interval_secs must be greater than 0".into(),
            ));
        }
        if self.max_retries == 0 {
            return Err(HeraldError::Config("max_retries must be at least 1".into()));
        }
        if self.worker_count == 0 {
            return Err(HeraldError::Config("worker_count must be at least 1".into()));
        }
        for (name, secs) in [
            ("reminder_lead_time_secs", self.reminder_lead_time_secs),
            ("terminal_retention_secs", self.terminal_retention_secs),
            ("claim_timeout_secs", self.claim_timeout_secs),
        ] {
            if secs > MAX_DURATION_SECS || to_duration(secs).is_none() {
                return Err(HeraldError::Config(format!(
                    "{name} out of range (max {MAX_DURATION_SECS})"
                )));
            }
        }
        Ok(())
    }

    pub fn reminder_lead_time(&self) -> chrono::Duration {
        to_duration(self.reminder_lead_time_secs).unwrap_or(chrono::Duration::MAX)
    }

    pub fn poll_interval(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.poll_interval_secs)
    }

    pub fn terminal_retention(&self) -> chrono::Duration {
        to_duration(self.terminal_retention_secs).unwrap_or(chrono::Duration::MAX)
    }

    pub fn claim_timeout(&self) -> chrono::Duration {
        to_duration(self.claim_timeout_secs).unwrap_or(chrono::Duration::MAX)
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.max_retries)
    }
}

fn to_duration(secs: u64) -> Option<chrono::Duration> {
    i64::try_from(secs).ok().and_then(chrono::Duration::try_seconds)
}
