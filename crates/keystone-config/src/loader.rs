//! Configuration loader.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::error::ConfigError;
use crate::schema::{keys, BaseConfig};
use crate::validator::ConfigValidator;

/// Where configuration variables come from.
#[derive(Debug, Clone)]
pub enum EnvSource {
    /// Process environment layered over an optional env file.
    ///
    /// Process variables win over the file. The file never mutates the
    /// process environment.
    Process {
        env_file: Option<PathBuf>,
        require_env_file: bool,
    },
    /// A fixed set of variables.
    Vars(HashMap<String, String>),
}

impl EnvSource {
    /// Process environment plus `.env` in the current directory, if present.
    pub fn process() -> Self {
        Self::Process {
            env_file: Some(PathBuf::from(".env")),
            require_env_file: false,
        }
    }

    /// A fixed set of variables, e.g. for tests or embedding.
    pub fn vars<I, K, V>(vars: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self::Vars(
            vars.into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }

    /// Collect the variables relevant to [`BaseConfig`].
    pub fn collect(&self) -> Result<HashMap<String, String>, ConfigError> {
        match self {
            Self::Vars(vars) => Ok(vars.clone()),
            Self::Process {
                env_file,
                require_env_file,
            } => {
                let mut vars = match env_file {
                    Some(path) => ConfigLoader::read_env_file(path, *require_env_file)?,
                    None => HashMap::new(),
                };
                for key in keys::ALL {
                    if let Ok(value) = std::env::var(key) {
                        vars.insert(key.to_string(), value);
                    }
                }
                Ok(vars)
            }
        }
    }
}

impl Default for EnvSource {
    fn default() -> Self {
        Self::process()
    }
}

/// Base configuration loader.
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load and validate configuration from the given source.
    pub fn load(source: &EnvSource) -> Result<BaseConfig, ConfigError> {
        let vars = source.collect()?;
        let config = Self::from_vars(&vars)?;

        let result = ConfigValidator::validate(&config);
        for warning in &result.warnings {
            warn!(field = %warning.path, "{}", warning.message);
        }
        if !result.is_valid() {
            let message = result
                .errors
                .iter()
                .map(|e| format!("{}: {}", e.path, e.message))
                .collect::<Vec<_>>()
                .join("; ");
            return Err(ConfigError::Invalid(message));
        }

        debug!(config = ?config, "Base configuration loaded");
        Ok(config)
    }

    /// Build a configuration from raw variables. Empty values count as unset.
    pub fn from_vars(vars: &HashMap<String, String>) -> Result<BaseConfig, ConfigError> {
        let get = |key: &str| {
            vars.get(key)
                .map(|v| v.trim())
                .filter(|v| !v.is_empty())
                .map(str::to_string)
        };

        let mut config = BaseConfig {
            app_name: get(keys::APP_NAME).unwrap_or_default(),
            container_name: get(keys::CONTAINER_NAME).unwrap_or_default(),
            app_env: get(keys::APP_ENV).unwrap_or_default(),
            app_version: get(keys::APP_VERSION).unwrap_or_default(),
            timezone: get(keys::TIMEZONE),
            ..Default::default()
        };

        if let Some(raw) = get(keys::DEBUG) {
            config.debug = parse_bool(&raw).ok_or_else(|| ConfigError::InvalidValue {
                field: keys::DEBUG.to_string(),
                message: format!("expected a boolean, got '{}'", raw),
            })?;
        }

        if let Some(raw) = get(keys::SHUTDOWN_TIMEOUT) {
            let secs = raw.trim_end_matches('s');
            config.shutdown_timeout_secs =
                secs.parse().map_err(|_| ConfigError::InvalidValue {
                    field: keys::SHUTDOWN_TIMEOUT.to_string(),
                    message: format!("expected whole seconds, got '{}'", raw),
                })?;
        }

        Ok(config)
    }

    /// Read `KEY=value` pairs from an env file.
    ///
    /// A missing file yields no variables unless `required` is set.
    pub fn read_env_file(
        path: &Path,
        required: bool,
    ) -> Result<HashMap<String, String>, ConfigError> {
        let path = PathBuf::from(Self::expand_path(&path.to_string_lossy()));

        let iter = match dotenvy::from_path_iter(&path) {
            Ok(iter) => iter,
            Err(e) if e.not_found() => {
                if required {
                    return Err(ConfigError::NotFound(path));
                }
                debug!(path = %path.display(), "No env file, using process environment only");
                return Ok(HashMap::new());
            }
            Err(e) => {
                return Err(ConfigError::EnvFile {
                    path,
                    reason: e.to_string(),
                })
            }
        };

        let mut vars = HashMap::new();
        for item in iter {
            let (key, value) = item.map_err(|e| ConfigError::EnvFile {
                path: path.clone(),
                reason: e.to_string(),
            })?;
            vars.insert(key, value);
        }
        Ok(vars)
    }

    /// Expand shell-style paths (e.g., `~/.config`).
    pub fn expand_path(path: &str) -> String {
        shellexpand::tilde(path).to_string()
    }
}

/// Accepts `1`, `t`, `T`, `TRUE`, `true`, `True` and their false counterparts.
fn parse_bool(raw: &str) -> Option<bool> {
    match raw {
        "1" | "t" | "T" | "TRUE" | "true" | "True" => Some(true),
        "0" | "f" | "F" | "FALSE" | "false" | "False" => Some(false),
        _ => None,
    }
}
