//! Workflow configuration.
//!
//! Loaded from YAML. The retry bound has no default: the source system looped
//! back to ingestion without any cap, so the bound is a required input here
//! rather than a guessed constant.

use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// Configuration for one orchestrator instance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowConfig {
    /// Maximum number of QA-triggered full-pipeline retries. Required.
    pub max_retries: u32,

    /// Quality score at or above which the run proceeds to reporting
    #[serde(default = "default_proceed_threshold")]
    pub proceed_threshold: f64,

    /// Quality score at or above which a non-proceeding run may retry
    #[serde(default = "default_retry_threshold")]
    pub retry_threshold: f64,

    /// Timeout applied to every collaborator call, in seconds
    #[serde(default = "default_collaborator_timeout")]
    pub collaborator_timeout_seconds: u64,

    /// Stage-local retry policy for the mint transaction only
    #[serde(default)]
    pub mint_retry: MintRetryPolicy,
}

fn default_proceed_threshold() -> f64 {
    0.8
}
fn default_retry_threshold() -> f64 {
    0.6
}
fn default_collaborator_timeout() -> u64 {
    30
}

impl WorkflowConfig {
    /// Defaults for everything except the required retry bound.
    pub fn with_max_retries(max_retries: u32) -> Self {
        Self {
            max_retries,
            proceed_threshold: default_proceed_threshold(),
            retry_threshold: default_retry_threshold(),
            collaborator_timeout_seconds: default_collaborator_timeout(),
            mint_retry: MintRetryPolicy::default(),
        }
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        Self::from_yaml(&content)
    }

    pub fn from_yaml(content: &str) -> Result<Self> {
        let config: Self =
            serde_yaml::from_str(content).context("Failed to parse workflow config YAML")?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.proceed_threshold)
            || !(0.0..=1.0).contains(&self.retry_threshold)
        {
            anyhow::bail!("router thresholds must lie in [0, 1]");
        }
        if self.retry_threshold >= self.proceed_threshold {
            anyhow::bail!(
                "retry threshold {} must be below proceed threshold {}",
                self.retry_threshold,
                self.proceed_threshold
            );
        }
        if self.collaborator_timeout_seconds == 0 {
            anyhow::bail!("collaborator timeout must be positive");
        }
        if self.mint_retry.max_attempts == 0 {
            anyhow::bail!("mint retry must allow at least one attempt");
        }
        Ok(())
    }

    pub fn collaborator_timeout(&self) -> Duration {
        Duration::from_secs(self.collaborator_timeout_seconds)
    }
}

/// Bounded retry with exponential backoff, applied only to the mint call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MintRetryPolicy {
    /// Maximum number of attempts (including the first try)
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    #[serde(default = "default_initial_delay")]
    pub initial_delay_ms: u64,

    #[serde(default = "default_max_delay")]
    pub max_delay_ms: u64,

    #[serde(default = "default_backoff_multiplier")]
    pub backoff_multiplier: f64,
}

fn default_max_attempts() -> u32 {
    3
}
fn default_initial_delay() -> u64 {
    500
}
fn default_max_delay() -> u64 {
    5000
}
fn default_backoff_multiplier() -> f64 {
    2.0
}

impl Default for MintRetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            initial_delay_ms: default_initial_delay(),
            max_delay_ms: default_max_delay(),
            backoff_multiplier: default_backoff_multiplier(),
        }
    }
}

impl MintRetryPolicy {
    /// Delay before the next attempt (attempts are 1-indexed).
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        if attempt <= 1 {
            return Duration::from_millis(self.initial_delay_ms);
        }
        let delay =
            self.initial_delay_ms as f64 * self.backoff_multiplier.powi((attempt - 1) as i32);
        Duration::from_millis(delay.min(self.max_delay_ms as f64) as u64)
    }

    pub fn should_retry(&self, attempt: u32) -> bool {
        attempt < self.max_attempts
    }
}
