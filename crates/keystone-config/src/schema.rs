//! Base configuration schema.

use std::time::Duration;

use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Default graceful shutdown budget, in seconds.
pub const DEFAULT_SHUTDOWN_TIMEOUT_SECS: u64 = 30;

/// Environment variable names read into [`BaseConfig`].
pub mod keys {
    pub const APP_NAME: &str = "APP_NAME";
    pub const CONTAINER_NAME: &str = "CONTAINER_NAME";
    pub const APP_ENV: &str = "APP_ENV";
    pub const APP_VERSION: &str = "APP_VERSION";
    pub const TIMEZONE: &str = "TIMEZONE";
    pub const DEBUG: &str = "DEBUG";
    pub const SHUTDOWN_TIMEOUT: &str = "SHUTDOWN_TIMEOUT";

    /// Every key the loader looks up.
    pub const ALL: [&str; 7] = [
        APP_NAME,
        CONTAINER_NAME,
        APP_ENV,
        APP_VERSION,
        TIMEZONE,
        DEBUG,
        SHUTDOWN_TIMEOUT,
    ];
}

/// Process-wide application settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BaseConfig {
    #[serde(default)]
    pub app_name: String,

    #[serde(default)]
    pub container_name: String,

    #[serde(default)]
    pub app_env: String,

    #[serde(default)]
    pub app_version: String,

    /// IANA timezone name, e.g. `Asia/Almaty`.
    #[serde(default)]
    pub timezone: Option<String>,

    #[serde(default)]
    pub debug: bool,

    #[serde(default = "default_shutdown_timeout_secs")]
    pub shutdown_timeout_secs: u64,
}

impl Default for BaseConfig {
    fn default() -> Self {
        Self {
            app_name: String::new(),
            container_name: String::new(),
            app_env: String::new(),
            app_version: String::new(),
            timezone: None,
            debug: false,
            shutdown_timeout_secs: default_shutdown_timeout_secs(),
        }
    }
}

fn default_shutdown_timeout_secs() -> u64 {
    DEFAULT_SHUTDOWN_TIMEOUT_SECS
}

impl BaseConfig {
    /// Graceful shutdown budget.
    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.shutdown_timeout_secs)
    }

    /// Resolve the configured timezone.
    ///
    /// Returns `Ok(None)` when no timezone is configured.
    pub fn location(&self) -> Result<Option<Tz>, ConfigError> {
        match self.timezone.as_deref() {
            None => Ok(None),
            Some(name) => name
                .parse::<Tz>()
                .map(Some)
                .map_err(|_| ConfigError::UnknownTimezone(name.to_string())),
        }
    }
}
