use crate::adaptive::{AdaptiveRetryStrategy, AdaptiveRetryStrategyBuilder};
use crate::admission::DEFAULT_MAX_ATTEMPTS;
use crate::config::error::{ConfigError, Result};
use crate::predicate::RetryPredicate;
use crate::rate_limiter::RateLimiterConfig;
use crate::standard::{StandardRetryStrategy, StandardRetryStrategyBuilder};
use crate::token_bucket::{
    DEFAULT_INITIAL_CAPACITY, DEFAULT_RETRY_COST, DEFAULT_SUCCESS_CREDIT, RetryBudgetConfig,
    SuccessCredit,
};
use config::{Config, Environment, File};
use retries_api::{BackoffStrategy, RetryErrorType};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Root retry configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrySettings {
    /// Total attempts per call, first attempt included
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    #[serde(default = "default_true")]
    pub circuit_breaker_enabled: bool,

    #[serde(default)]
    pub backoff: BackoffSettings,

    #[serde(default)]
    pub budget: BudgetSettings,

    /// Outermost error types that may be retried
    #[serde(default = "default_retry_on")]
    pub retry_on: Vec<RetryErrorType>,

    /// Rate limiter tuning, only read by the adaptive strategy
    #[serde(default)]
    pub adaptive: AdaptiveSettings,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackoffKind {
    Immediate,
    Fixed,
    FixedWithoutJitter,
    #[default]
    Exponential,
    ExponentialWithoutJitter,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackoffSettings {
    #[serde(default)]
    pub kind: BackoffKind,

    /// Base delay in milliseconds. Fixed kinds use it as the constant delay.
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,

    /// Ceiling in milliseconds for exponential kinds
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BudgetSettings {
    #[serde(default = "default_initial_capacity")]
    pub initial_capacity: u32,

    #[serde(default = "default_retry_cost")]
    pub retry_cost: u32,

    #[serde(default = "default_success_credit")]
    pub success_credit: u32,

    /// Credit back what the call withdrew instead of a fixed amount
    #[serde(default)]
    pub repay_debited_on_success: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdaptiveSettings {
    #[serde(default = "default_min_rate")]
    pub min_rate: f64,

    #[serde(default = "default_max_rate")]
    pub max_rate: f64,

    #[serde(default = "default_decrease_factor")]
    pub decrease_factor: f64,

    #[serde(default = "default_increase_step")]
    pub increase_step: f64,

    #[serde(default = "default_cooldown_ms")]
    pub cooldown_ms: u64,
}

fn default_max_attempts() -> u32 {
    DEFAULT_MAX_ATTEMPTS
}
fn default_true() -> bool {
    true
}
fn default_retry_on() -> Vec<RetryErrorType> {
    RetryErrorType::DEFAULT_RETRYABLE.to_vec()
}
fn default_base_delay_ms() -> u64 {
    1_000
}
fn default_max_delay_ms() -> u64 {
    20_000
}
fn default_initial_capacity() -> u32 {
    DEFAULT_INITIAL_CAPACITY
}
fn default_retry_cost() -> u32 {
    DEFAULT_RETRY_COST
}
fn default_success_credit() -> u32 {
    DEFAULT_SUCCESS_CREDIT
}
fn default_min_rate() -> f64 {
    0.5
}
fn default_max_rate() -> f64 {
    100.0
}
fn default_decrease_factor() -> f64 {
    0.5
}
fn default_increase_step() -> f64 {
    1.0
}
fn default_cooldown_ms() -> u64 {
    1_000
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            circuit_breaker_enabled: true,
            backoff: BackoffSettings::default(),
            budget: BudgetSettings::default(),
            retry_on: default_retry_on(),
            adaptive: AdaptiveSettings::default(),
        }
    }
}

impl Default for BackoffSettings {
    fn default() -> Self {
        Self {
            kind: BackoffKind::default(),
            base_delay_ms: default_base_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
        }
    }
}

impl Default for BudgetSettings {
    fn default() -> Self {
        Self {
            initial_capacity: default_initial_capacity(),
            retry_cost: default_retry_cost(),
            success_credit: default_success_credit(),
            repay_debited_on_success: false,
        }
    }
}

impl Default for AdaptiveSettings {
    fn default() -> Self {
        Self {
            min_rate: default_min_rate(),
            max_rate: default_max_rate(),
            decrease_factor: default_decrease_factor(),
            increase_step: default_increase_step(),
            cooldown_ms: default_cooldown_ms(),
        }
    }
}

impl BackoffSettings {
    pub fn to_strategy(&self) -> BackoffStrategy {
        let base = Duration::from_millis(self.base_delay_ms);
        let max = Duration::from_millis(self.max_delay_ms);
        match self.kind {
            BackoffKind::Immediate => BackoffStrategy::retry_immediately(),
            BackoffKind::Fixed => BackoffStrategy::fixed_delay(base),
            BackoffKind::FixedWithoutJitter => BackoffStrategy::fixed_delay_without_jitter(base),
            BackoffKind::Exponential => BackoffStrategy::exponential_delay(base, max),
            BackoffKind::ExponentialWithoutJitter => {
                BackoffStrategy::exponential_delay_without_jitter(base, max)
            }
        }
    }
}

impl BudgetSettings {
    pub fn to_config(&self) -> RetryBudgetConfig {
        RetryBudgetConfig {
            initial_capacity: self.initial_capacity,
            retry_cost: self.retry_cost,
            success_credit: self.success_credit,
            success_credit_policy: if self.repay_debited_on_success {
                SuccessCredit::RepayDebited
            } else {
                SuccessCredit::Fixed
            },
        }
    }
}

impl AdaptiveSettings {
    pub fn to_config(&self) -> RateLimiterConfig {
        RateLimiterConfig {
            min_rate: self.min_rate,
            max_rate: self.max_rate,
            decrease_factor: self.decrease_factor,
            increase_step: self.increase_step,
            cooldown: Duration::from_millis(self.cooldown_ms),
        }
    }
}

impl RetrySettings {
    /// Check every value before it reaches a builder.
    pub fn validate(&self) -> Result<()> {
        if self.max_attempts == 0 {
            return Err(ConfigError::ValidationError(
                "max_attempts must be >= 1".to_string(),
            ));
        }
        if self.retry_on.is_empty() {
            return Err(ConfigError::ValidationError(
                "retry_on must name at least one error type".to_string(),
            ));
        }
        self.backoff.to_strategy().validate()?;
        self.adaptive.to_config().validate()?;
        Ok(())
    }

    fn predicate(&self) -> RetryPredicate {
        RetryPredicate::from_error_types(self.retry_on.iter().copied())
    }

    /// Standard strategy builder carrying these settings.
    pub fn standard_builder(&self) -> Result<StandardRetryStrategyBuilder> {
        self.validate()?;
        Ok(StandardRetryStrategy::builder()
            .max_attempts(self.max_attempts)
            .circuit_breaker_enabled(self.circuit_breaker_enabled)
            .retry_budget(self.budget.to_config())
            .retry_predicate(self.predicate())
            .backoff_strategy(self.backoff.to_strategy()))
    }

    /// Adaptive strategy builder carrying these settings. The backoff block
    /// is ignored.
    pub fn adaptive_builder(&self) -> Result<AdaptiveRetryStrategyBuilder> {
        self.validate()?;
        Ok(AdaptiveRetryStrategy::builder()
            .max_attempts(self.max_attempts)
            .circuit_breaker_enabled(self.circuit_breaker_enabled)
            .retry_budget(self.budget.to_config())
            .retry_predicate(self.predicate())
            .rate_limiter(self.adaptive.to_config()))
    }
}

/// Configuration loader with layered merging support
#[derive(Debug)]
pub struct ConfigLoader {
    config_path: Option<PathBuf>,
}

impl ConfigLoader {
    pub fn new() -> Self {
        Self { config_path: None }
    }

    pub fn with_file<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.config_path = Some(path.as_ref().to_path_buf());
        self
    }

    /// Load settings with layered merging:
    /// 1. Built-in defaults
    /// 2. Config file, if one was set
    /// 3. Environment variables (`RETRIES_` prefix)
    pub fn load(&self) -> Result<RetrySettings> {
        let mut builder = Config::builder();

        let defaults_json = serde_json::to_string(&RetrySettings::default())?;
        builder = builder.add_source(config::File::from_str(
            &defaults_json,
            config::FileFormat::Json,
        ));

        if let Some(ref path) = self.config_path {
            if !path.exists() {
                return Err(ConfigError::FileNotFound(path.clone()));
            }
            builder = builder.add_source(File::from(path.as_ref()));
        }

        // e.g. RETRIES_BUDGET__RETRY_COST=10, RETRIES_RETRY_ON=transient,throttling
        builder = builder.add_source(
            Environment::with_prefix("RETRIES")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true)
                .list_separator(",")
                .with_list_parse_key("retry_on"),
        );

        let settings: RetrySettings = builder.build()?.try_deserialize()?;
        settings.validate()?;
        tracing::debug!(
            path = ?self.config_path,
            max_attempts = settings.max_attempts,
            backoff = ?settings.backoff.kind,
            "retry settings loaded"
        );
        Ok(settings)
    }

    /// Locate the config file in standard locations:
    /// 1. `./retries.toml`
    /// 2. `<config dir>/retries/config.toml`
    pub fn find_config_file() -> Option<PathBuf> {
        let cwd_config = PathBuf::from("./retries.toml");
        if cwd_config.exists() {
            return Some(cwd_config);
        }

        let user_config = dirs::config_dir()?.join("retries").join("config.toml");
        user_config.exists().then_some(user_config)
    }

    pub fn load_default() -> Result<RetrySettings> {
        let loader = match Self::find_config_file() {
            Some(path) => ConfigLoader::new().with_file(path),
            None => ConfigLoader::new(),
        };
        loader.load()
    }
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}
