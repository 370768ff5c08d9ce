//! Configuration for the orchestrator façade.
//!
//! Provides defaults, fluent setters, environment loading, and validation
//! for retry behavior, history bounds, and narrative validation.

use std::time::Duration;

use thiserror::Error;

use crate::retry::RetryPolicy;

/// Errors that can occur during configuration operations.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// An environment variable has an invalid value.
    #[error("Invalid value for {key}: {message}")]
    InvalidValue { key: String, message: String },

    /// Configuration validation failed.
    #[error("Configuration validation failed: {0}")]
    ValidationFailed(String),
}

/// Configuration for one orchestrator instance.
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    // Retry settings
    /// Total attempts per agent-dispatching call, including the first.
    pub retry_attempts: u32,
    /// Delay before the second attempt.
    pub retry_initial_delay: Duration,
    /// Multiplier applied to the delay between consecutive attempts.
    pub retry_backoff_factor: f64,

    // History bounds
    /// Maximum task records retained in the execution history.
    pub max_task_history: usize,
    /// Maximum workflow records retained.
    pub max_workflow_history: usize,
    /// Maximum error records retained by diagnostics.
    pub max_error_history: usize,

    // Narrative settings
    /// Minimum character length for a full narrative to count as present.
    pub min_narrative_length: usize,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            retry_attempts: 3,
            retry_initial_delay: Duration::from_millis(250),
            retry_backoff_factor: 2.0,
            max_task_history: 256,
            max_workflow_history: 64,
            max_error_history: 500,
            min_narrative_length: 80,
        }
    }
}

impl OrchestratorConfig {
    /// Creates a configuration with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the retry attempt budget.
    pub fn with_retry_attempts(mut self, attempts: u32) -> Self {
        self.retry_attempts = attempts;
        self
    }

    /// Sets the delay before the second attempt.
    pub fn with_retry_initial_delay(mut self, delay: Duration) -> Self {
        self.retry_initial_delay = delay;
        self
    }

    /// Sets the backoff multiplier.
    pub fn with_retry_backoff_factor(mut self, factor: f64) -> Self {
        self.retry_backoff_factor = factor;
        self
    }

    /// Sets the execution history bound.
    pub fn with_max_task_history(mut self, bound: usize) -> Self {
        self.max_task_history = bound;
        self
    }

    /// Sets the workflow history bound.
    pub fn with_max_workflow_history(mut self, bound: usize) -> Self {
        self.max_workflow_history = bound;
        self
    }

    /// Sets the error history bound.
    pub fn with_max_error_history(mut self, bound: usize) -> Self {
        self.max_error_history = bound;
        self
    }

    /// Sets the minimum full-narrative length.
    pub fn with_min_narrative_length(mut self, length: usize) -> Self {
        self.min_narrative_length = length;
        self
    }

    /// Creates configuration from environment variables.
    ///
    /// # Environment Variables
    ///
    /// - `ORCHESTRATOR_RETRY_ATTEMPTS`: attempts per call (default: 3)
    /// - `ORCHESTRATOR_RETRY_INITIAL_DELAY_MS`: first backoff delay (default: 250)
    /// - `ORCHESTRATOR_RETRY_BACKOFF`: backoff multiplier (default: 2.0)
    /// - `ORCHESTRATOR_MAX_TASK_HISTORY`: task history bound (default: 256)
    /// - `ORCHESTRATOR_MAX_WORKFLOW_HISTORY`: workflow history bound (default: 64)
    /// - `ORCHESTRATOR_MAX_ERROR_HISTORY`: error history bound (default: 500)
    /// - `ORCHESTRATOR_MIN_NARRATIVE_LENGTH`: narrative length floor (default: 80)
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if a variable has an invalid value or the final
    /// configuration fails validation.
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Ok(val) = std::env::var("ORCHESTRATOR_RETRY_ATTEMPTS") {
            config.retry_attempts = parse_env_value(&val, "ORCHESTRATOR_RETRY_ATTEMPTS")?;
        }

        if let Ok(val) = std::env::var("ORCHESTRATOR_RETRY_INITIAL_DELAY_MS") {
            let millis: u64 = parse_env_value(&val, "ORCHESTRATOR_RETRY_INITIAL_DELAY_MS")?;
            config.retry_initial_delay = Duration::from_millis(millis);
        }

        if let Ok(val) = std::env::var("ORCHESTRATOR_RETRY_BACKOFF") {
            config.retry_backoff_factor = parse_env_value(&val, "ORCHESTRATOR_RETRY_BACKOFF")?;
        }

        if let Ok(val) = std::env::var("ORCHESTRATOR_MAX_TASK_HISTORY") {
            config.max_task_history = parse_env_value(&val, "ORCHESTRATOR_MAX_TASK_HISTORY")?;
        }

        if let Ok(val) = std::env::var("ORCHESTRATOR_MAX_WORKFLOW_HISTORY") {
            config.max_workflow_history =
                parse_env_value(&val, "ORCHESTRATOR_MAX_WORKFLOW_HISTORY")?;
        }

        if let Ok(val) = std::env::var("ORCHESTRATOR_MAX_ERROR_HISTORY") {
            config.max_error_history = parse_env_value(&val, "ORCHESTRATOR_MAX_ERROR_HISTORY")?;
        }

        if let Ok(val) = std::env::var("ORCHESTRATOR_MIN_NARRATIVE_LENGTH") {
            config.min_narrative_length =
                parse_env_value(&val, "ORCHESTRATOR_MIN_NARRATIVE_LENGTH")?;
        }

        config.validate()?;
        Ok(config)
    }

    /// Validates the configuration values.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::ValidationFailed` if any values are invalid.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.retry_attempts == 0 {
            return Err(ConfigError::ValidationFailed(
                "retry_attempts must be greater than 0".to_string(),
            ));
        }

        if self.retry_backoff_factor < 1.0 {
            return Err(ConfigError::ValidationFailed(
                "retry_backoff_factor must be at least 1.0".to_string(),
            ));
        }

        if self.max_task_history == 0 {
            return Err(ConfigError::ValidationFailed(
                "max_task_history must be greater than 0".to_string(),
            ));
        }

        if self.max_workflow_history == 0 {
            return Err(ConfigError::ValidationFailed(
                "max_workflow_history must be greater than 0".to_string(),
            ));
        }

        if self.max_error_history == 0 {
            return Err(ConfigError::ValidationFailed(
                "max_error_history must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }

    /// The retry policy applied around agent-dispatching calls.
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(
            self.retry_attempts,
            self.retry_initial_delay,
            self.retry_backoff_factor,
        )
    }
}

/// Parses an environment variable value into the target type.
fn parse_env_value<T: std::str::FromStr>(value: &str, key: &str) -> Result<T, ConfigError>
where
    T::Err: std::fmt::Display,
{
    value.parse().map_err(|e: T::Err| ConfigError::InvalidValue {
        key: key.to_string(),
        message: e.to_string(),
    })
}
