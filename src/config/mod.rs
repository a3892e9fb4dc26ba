//! Configuration resolution.
//!
//! Values come from the optional settings file and are overridden by
//! environment variables (`.env` is loaded by the binary before resolving).

mod database;
pub(crate) mod helpers;
mod storage;

pub use database::DatabaseConfig;
pub use helpers::{Env, ProcessEnv};
pub use storage::BlobConfig;

use crate::error::ConfigError;
use crate::settings::Settings;
use helpers::{optional_env, parse_bool_env, parse_string_env};

/// Log output settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoggingConfig {
    /// `tracing_subscriber::EnvFilter` directive.
    pub filter: String,
    pub json: bool,
}

impl LoggingConfig {
    pub(crate) fn resolve_with(settings: &Settings, env: &dyn Env) -> Result<Self, ConfigError> {
        Ok(Self {
            filter: parse_string_env(env, "CRM_LOG", settings.logging.filter.clone()),
            json: parse_bool_env(env, "CRM_LOG_JSON", settings.logging.json)?,
        })
    }
}

/// Fully resolved configuration.
#[derive(Debug)]
pub struct Config {
    /// `None` when no remote store is configured.
    pub database: Option<DatabaseConfig>,
    pub storage: BlobConfig,
    pub logging: LoggingConfig,
    pub user_id: Option<String>,
}

impl Config {
    pub fn resolve(settings: &Settings) -> Result<Self, ConfigError> {
        Self::resolve_with(settings, &ProcessEnv)
    }

    pub fn resolve_with(settings: &Settings, env: &dyn Env) -> Result<Self, ConfigError> {
        Ok(Self {
            database: DatabaseConfig::resolve_with(settings, env)?,
            storage: BlobConfig::resolve_with(settings, env)?,
            logging: LoggingConfig::resolve_with(settings, env)?,
            user_id: optional_env(env, "CRM_USER_ID").or_else(|| settings.user_id.clone()),
        })
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::config::helpers::fixed_env;

    #[test]
    fn defaults_resolve_without_remote_store() {
        let config = Config::resolve_with(&Settings::default(), &fixed_env(&[])).expect("config");
        assert!(config.database.is_none());
        assert_eq!(config.user_id, None);
        assert_eq!(
            config.logging,
            LoggingConfig {
                filter: "crm_records=info".to_string(),
                json: false,
            }
        );
    }

    #[test]
    fn env_overrides_logging_and_user() {
        let mut settings = Settings::default();
        settings.user_id = Some("from-file".to_string());
        let env = fixed_env(&[
            ("CRM_LOG", "crm_records=debug"),
            ("CRM_LOG_JSON", "true"),
            ("CRM_USER_ID", "from-env"),
        ]);
        let config = Config::resolve_with(&settings, &env).expect("config");
        assert_eq!(config.logging.filter, "crm_records=debug");
        assert!(config.logging.json);
        assert_eq!(config.user_id.as_deref(), Some("from-env"));
    }

    #[test]
    fn invalid_values_surface_as_config_errors() {
        let env = fixed_env(&[("CRM_LOG_JSON", "sometimes")]);
        let err = Config::resolve_with(&Settings::default(), &env).expect_err("invalid");
        let ConfigError::InvalidValue { key, .. } = err else {
            panic!("expected InvalidValue");
        };
        assert_eq!(key, "CRM_LOG_JSON");
    }
}
