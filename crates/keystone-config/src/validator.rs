//! Configuration validation.

use crate::schema::{keys, BaseConfig};

/// Environments the validator recognises without a warning.
const KNOWN_ENVS: [&str; 7] = ["local", "dev", "test", "stage", "staging", "prod", "production"];

/// Validation result.
#[derive(Debug, Default)]
pub struct ValidationResult {
    pub errors: Vec<ValidationIssue>,
    pub warnings: Vec<ValidationIssue>,
}

impl ValidationResult {
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn add_error(&mut self, path: impl Into<String>, message: impl Into<String>) {
        self.errors.push(ValidationIssue::new(path, message));
    }

    pub fn add_warning(&mut self, path: impl Into<String>, message: impl Into<String>) {
        self.warnings.push(ValidationIssue::new(path, message));
    }
}

/// A problem found in one configuration key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationIssue {
    pub path: String,
    pub message: String,
}

impl ValidationIssue {
    pub fn new(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            message: message.into(),
        }
    }
}

/// Base configuration validator.
///
/// Timezone names are not checked here; they are resolved during bootstrap.
pub struct ConfigValidator;

impl ConfigValidator {
    /// Validate the configuration.
    pub fn validate(config: &BaseConfig) -> ValidationResult {
        let mut result = ValidationResult::default();

        Self::validate_identity(config, &mut result);
        Self::validate_shutdown(config, &mut result);

        result
    }

    fn validate_identity(config: &BaseConfig, result: &mut ValidationResult) {
        if config.app_name.is_empty() {
            result.add_warning(
                keys::APP_NAME,
                "APP_NAME is not set, logs will not carry a service name",
            );
        }

        if !config.app_env.is_empty() && !KNOWN_ENVS.contains(&config.app_env.as_str()) {
            result.add_warning(
                keys::APP_ENV,
                format!(
                    "Unknown environment '{}', known values: {:?}",
                    config.app_env, KNOWN_ENVS
                ),
            );
        }
    }

    fn validate_shutdown(config: &BaseConfig, result: &mut ValidationResult) {
        if config.shutdown_timeout_secs == 0 {
            result.add_error(keys::SHUTDOWN_TIMEOUT, "must be greater than 0");
        }

        if config.shutdown_timeout_secs > 600 {
            result.add_warning(
                keys::SHUTDOWN_TIMEOUT,
                "shutdown budget is very high (>600s), orchestrators may kill the process first",
            );
        }
    }
}

#[cfg(test)]
#[path = "validator_tests.rs"]
mod tests;
