//! File and environment configuration for retry strategies
//!
//! Settings are layered: built-in defaults, then an optional TOML/JSON file,
//! then `RETRIES_*` environment variables. The result converts into either
//! strategy builder.

pub mod error;
pub mod loader;

pub use error::{ConfigError, Result};
pub use loader::{
    AdaptiveSettings, BackoffKind, BackoffSettings, BudgetSettings, ConfigLoader, RetrySettings,
};
