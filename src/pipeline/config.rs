//! Pipeline configuration.
//!
//! This module provides configuration options for a verdict run: retry and
//! backoff policy, the gate threshold, generation settings, scoring match
//! mode, storage, usage charging and the HTTP bind address.

use std::time::Duration;
use thiserror::Error;

use crate::scoring::MatchMode;

/// Errors that can occur during configuration operations.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A required environment variable is missing.
    #[error("Missing environment variable: {0}")]
    MissingEnvVar(String),

    /// An environment variable has an invalid value.
    #[error("Invalid value for {key}: {message}")]
    InvalidValue { key: String, message: String },

    /// Configuration validation failed.
    #[error("Configuration validation failed: {0}")]
    ValidationFailed(String),
}

/// Configuration for the pipeline controller.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    // Stage execution settings
    /// Total attempts per stage, first call included.
    pub max_retries: u32,
    /// Backoff unit; attempt N waits N units after failing.
    pub backoff_unit: Duration,

    // Gate settings
    /// Scores strictly below this take the rescue branch.
    pub gate_threshold: u8,
    /// How generated dimension labels are matched.
    pub match_mode: MatchMode,
    /// Number of weakest dimensions handed to the rescue stage.
    pub rescue_focus_dimensions: usize,

    // LLM settings
    /// Model used for generation; empty means the client default.
    pub default_model: String,
    /// Temperature for LLM generation.
    pub temperature: f64,
    /// Max tokens per generation.
    pub max_tokens: u32,

    // Research settings
    /// Results requested per search query.
    pub results_per_query: usize,

    // Storage settings
    /// SQLite database connection URL.
    pub database_url: String,

    // Usage settings
    /// Whether accepted runs are charged against the usage ledger.
    pub ledger_enabled: bool,
    /// Credits charged per accepted run.
    pub credits_per_run: i64,

    // Server settings
    /// Address the HTTP server binds to.
    pub bind_addr: String,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            // Stage execution defaults
            max_retries: 3,
            backoff_unit: Duration::from_secs(1),

            // Gate defaults
            gate_threshold: 60,
            match_mode: MatchMode::Lenient,
            rescue_focus_dimensions: 3,

            // LLM defaults
            default_model: String::new(),
            temperature: 0.7,
            max_tokens: 4096,

            // Research defaults
            results_per_query: 5,

            // Storage defaults
            database_url: "sqlite://verdict.db".to_string(),

            // Usage defaults
            ledger_enabled: true,
            credits_per_run: 1,

            // Server defaults
            bind_addr: "0.0.0.0:8000".to_string(),
        }
    }
}

impl PipelineConfig {
    /// Creates a new configuration with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates configuration from environment variables.
    ///
    /// # Environment Variables
    ///
    /// - `VERDICT_MAX_RETRIES`: Total attempts per stage (default: 3)
    /// - `VERDICT_BACKOFF_MS`: Backoff unit in milliseconds (default: 1000)
    /// - `VERDICT_GATE_THRESHOLD`: Gate acceptance threshold (default: 60)
    /// - `VERDICT_MATCH_MODE`: `lenient` or `strict` (default: lenient)
    /// - `VERDICT_RESCUE_FOCUS`: Weakest dimensions given to rescue (default: 3)
    /// - `VERDICT_MODEL`: Generation model (default: client default)
    /// - `VERDICT_TEMPERATURE`: LLM temperature (default: 0.7)
    /// - `VERDICT_MAX_TOKENS`: Max tokens per generation (default: 4096)
    /// - `VERDICT_RESULTS_PER_QUERY`: Search results per query (default: 5)
    /// - `DATABASE_URL`: SQLite connection URL (default: sqlite://verdict.db)
    /// - `VERDICT_LEDGER_ENABLED`: Charge accepted runs (default: true)
    /// - `VERDICT_CREDITS_PER_RUN`: Credits per accepted run (default: 1)
    /// - `VERDICT_BIND_ADDR`: HTTP bind address (default: 0.0.0.0:8000)
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if variables have invalid values.
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();

        // Stage execution settings
        if let Ok(val) = std::env::var("VERDICT_MAX_RETRIES") {
            config.max_retries = parse_env_value(&val, "VERDICT_MAX_RETRIES")?;
        }

        if let Ok(val) = std::env::var("VERDICT_BACKOFF_MS") {
            let ms: u64 = parse_env_value(&val, "VERDICT_BACKOFF_MS")?;
            config.backoff_unit = Duration::from_millis(ms);
        }

        // Gate settings
        if let Ok(val) = std::env::var("VERDICT_GATE_THRESHOLD") {
            config.gate_threshold = parse_env_value(&val, "VERDICT_GATE_THRESHOLD")?;
        }

        if let Ok(val) = std::env::var("VERDICT_MATCH_MODE") {
            config.match_mode = val.parse::<MatchMode>().map_err(|message| ConfigError::InvalidValue {
                key: "VERDICT_MATCH_MODE".to_string(),
                message,
            })?;
        }

        if let Ok(val) = std::env::var("VERDICT_RESCUE_FOCUS") {
            config.rescue_focus_dimensions = parse_env_value(&val, "VERDICT_RESCUE_FOCUS")?;
        }

        // LLM settings
        if let Ok(val) = std::env::var("VERDICT_MODEL") {
            config.default_model = val;
        }

        if let Ok(val) = std::env::var("VERDICT_TEMPERATURE") {
            config.temperature = parse_env_value(&val, "VERDICT_TEMPERATURE")?;
        }

        if let Ok(val) = std::env::var("VERDICT_MAX_TOKENS") {
            config.max_tokens = parse_env_value(&val, "VERDICT_MAX_TOKENS")?;
        }

        // Research settings
        if let Ok(val) = std::env::var("VERDICT_RESULTS_PER_QUERY") {
            config.results_per_query = parse_env_value(&val, "VERDICT_RESULTS_PER_QUERY")?;
        }

        // Storage settings
        if let Ok(val) = std::env::var("DATABASE_URL") {
            config.database_url = val;
        }

        // Usage settings
        if let Ok(val) = std::env::var("VERDICT_LEDGER_ENABLED") {
            config.ledger_enabled = parse_env_bool(&val, "VERDICT_LEDGER_ENABLED")?;
        }

        if let Ok(val) = std::env::var("VERDICT_CREDITS_PER_RUN") {
            config.credits_per_run = parse_env_value(&val, "VERDICT_CREDITS_PER_RUN")?;
        }

        // Server settings
        if let Ok(val) = std::env::var("VERDICT_BIND_ADDR") {
            config.bind_addr = val;
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
        if self.max_retries == 0 {
            return Err(ConfigError::ValidationFailed(
                "max_retries must be greater than 0".to_string(),
            ));
        }

        if self.gate_threshold > 100 {
            return Err(ConfigError::ValidationFailed(
                "gate_threshold must be between 0 and 100".to_string(),
            ));
        }

        if !(0.0..=2.0).contains(&self.temperature) {
            return Err(ConfigError::ValidationFailed(
                "temperature must be between 0.0 and 2.0".to_string(),
            ));
        }

        if self.max_tokens == 0 {
            return Err(ConfigError::ValidationFailed(
                "max_tokens must be greater than 0".to_string(),
            ));
        }

        if self.results_per_query == 0 {
            return Err(ConfigError::ValidationFailed(
                "results_per_query must be greater than 0".to_string(),
            ));
        }

        if self.database_url.is_empty() {
            return Err(ConfigError::ValidationFailed(
                "database_url cannot be empty".to_string(),
            ));
        }

        if self.credits_per_run < 0 {
            return Err(ConfigError::ValidationFailed(
                "credits_per_run cannot be negative".to_string(),
            ));
        }

        if self.bind_addr.is_empty() {
            return Err(ConfigError::ValidationFailed(
                "bind_addr cannot be empty".to_string(),
            ));
        }

        Ok(())
    }

    /// Builder method to set total attempts per stage.
    pub fn with_max_retries(mut self, max: u32) -> Self {
        self.max_retries = max;
        self
    }

    /// Builder method to set the backoff unit.
    pub fn with_backoff_unit(mut self, unit: Duration) -> Self {
        self.backoff_unit = unit;
        self
    }

    /// Builder method to set the gate threshold.
    pub fn with_gate_threshold(mut self, threshold: u8) -> Self {
        self.gate_threshold = threshold;
        self
    }

    /// Builder method to set the dimension match mode.
    pub fn with_match_mode(mut self, mode: MatchMode) -> Self {
        self.match_mode = mode;
        self
    }

    /// Builder method to set default model.
    pub fn with_default_model(mut self, model: impl Into<String>) -> Self {
        self.default_model = model.into();
        self
    }

    /// Builder method to set temperature.
    pub fn with_temperature(mut self, temp: f64) -> Self {
        self.temperature = temp;
        self
    }

    /// Builder method to set database URL.
    pub fn with_database_url(mut self, url: impl Into<String>) -> Self {
        self.database_url = url.into();
        self
    }

    /// Builder method to enable or disable usage charging.
    pub fn with_ledger(mut self, enabled: bool) -> Self {
        self.ledger_enabled = enabled;
        self
    }

    /// Builder method to set credits charged per accepted run.
    pub fn with_credits_per_run(mut self, credits: i64) -> Self {
        self.credits_per_run = credits;
        self
    }

    /// Builder method to set the bind address.
    pub fn with_bind_addr(mut self, addr: impl Into<String>) -> Self {
        self.bind_addr = addr.into();
        self
    }
}

/// Parse an environment variable value into a type.
fn parse_env_value<T: std::str::FromStr>(value: &str, key: &str) -> Result<T, ConfigError> {
    value.parse().map_err(|_| ConfigError::InvalidValue {
        key: key.to_string(),
        message: format!("could not parse '{}'", value),
    })
}

/// Parse an environment variable as a boolean.
fn parse_env_bool(value: &str, key: &str) -> Result<bool, ConfigError> {
    match value.to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Ok(true),
        "false" | "0" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::InvalidValue {
            key: key.to_string(),
            message: format!("expected boolean value, got '{}'", value),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = PipelineConfig::default();
        assert_eq!(config.max_retries, 3);
        assert_eq!(config.backoff_unit, Duration::from_secs(1));
        assert_eq!(config.gate_threshold, 60);
        assert_eq!(config.match_mode, MatchMode::Lenient);
        assert!((config.temperature - 0.7).abs() < f64::EPSILON);
        assert!(config.ledger_enabled);
        assert_eq!(config.credits_per_run, 1);
    }

    #[test]
    fn test_config_builder() {
        let config = PipelineConfig::new()
            .with_max_retries(5)
            .with_backoff_unit(Duration::from_millis(10))
            .with_gate_threshold(70)
            .with_match_mode(MatchMode::Strict)
            .with_default_model("gpt-4o-mini")
            .with_temperature(0.2)
            .with_database_url("sqlite::memory:")
            .with_ledger(false)
            .with_credits_per_run(2)
            .with_bind_addr("127.0.0.1:9000");

        assert_eq!(config.max_retries, 5);
        assert_eq!(config.backoff_unit, Duration::from_millis(10));
        assert_eq!(config.gate_threshold, 70);
        assert_eq!(config.match_mode, MatchMode::Strict);
        assert_eq!(config.default_model, "gpt-4o-mini");
        assert!((config.temperature - 0.2).abs() < f64::EPSILON);
        assert_eq!(config.database_url, "sqlite::memory:");
        assert!(!config.ledger_enabled);
        assert_eq!(config.credits_per_run, 2);
        assert_eq!(config.bind_addr, "127.0.0.1:9000");
    }

    #[test]
    fn test_validation_valid_config() {
        assert!(PipelineConfig::default().validate().is_ok());
    }

    #[test]
    fn test_validation_zero_retries() {
        let result = PipelineConfig::default().with_max_retries(0).validate();
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("max_retries"));
    }

    #[test]
    fn test_validation_threshold_out_of_range() {
        let result = PipelineConfig::default().with_gate_threshold(101).validate();
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("gate_threshold"));
    }

    #[test]
    fn test_validation_invalid_temperature() {
        let result = PipelineConfig::default().with_temperature(3.0).validate();
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("temperature"));
    }

    #[test]
    fn test_validation_negative_credits() {
        let result = PipelineConfig::default().with_credits_per_run(-1).validate();
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("credits_per_run"));
    }

    #[test]
    fn test_validation_empty_database_url() {
        let result = PipelineConfig::default().with_database_url("").validate();
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("database_url"));
    }

    #[test]
    fn test_parse_env_bool() {
        assert!(parse_env_bool("true", "test").unwrap());
        assert!(parse_env_bool("1", "test").unwrap());
        assert!(parse_env_bool("ON", "test").unwrap());
        assert!(!parse_env_bool("false", "test").unwrap());
        assert!(!parse_env_bool("no", "test").unwrap());
        assert!(parse_env_bool("maybe", "test").is_err());
    }

    #[test]
    fn test_parse_env_value() {
        let n: u32 = parse_env_value("7", "VERDICT_MAX_RETRIES").unwrap();
        assert_eq!(n, 7);
        let err = parse_env_value::<u8>("300", "VERDICT_GATE_THRESHOLD").unwrap_err();
        assert!(err.to_string().contains("VERDICT_GATE_THRESHOLD"));
    }
}
