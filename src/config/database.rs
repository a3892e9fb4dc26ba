use secrecy::{ExposeSecret, SecretString};

use crate::config::helpers::{Env, ProcessEnv, optional_env, parse_env};
use crate::error::ConfigError;
use crate::settings::Settings;

const URL_SCHEMES: [&str; 2] = ["postgres://", "postgresql://"];

/// Remote store connection settings.
#[derive(Debug)]
pub struct DatabaseConfig {
    pub url: SecretString,
    pub pool_size: usize,
}

impl DatabaseConfig {
    /// Resolve from settings and the process environment.
    ///
    /// `Ok(None)` means no remote store is configured, which is a normal state.
    pub fn resolve(settings: &Settings) -> Result<Option<Self>, ConfigError> {
        Self::resolve_with(settings, &ProcessEnv)
    }

    pub(crate) fn resolve_with(
        settings: &Settings,
        env: &dyn Env,
    ) -> Result<Option<Self>, ConfigError> {
        let url = optional_env(env, "DATABASE_URL").or_else(|| {
            settings
                .database
                .url
                .as_deref()
                .map(str::trim)
                .filter(|url| !url.is_empty())
                .map(str::to_string)
        });
        let Some(url) = url else {
            return Ok(None);
        };
        if !URL_SCHEMES.iter().any(|scheme| url.starts_with(scheme)) {
            return Err(ConfigError::InvalidValue {
                key: "DATABASE_URL".to_string(),
                message: "expected a postgres:// or postgresql:// URL".to_string(),
            });
        }

        let pool_size = parse_env(env, "DATABASE_POOL_SIZE", settings.database.pool_size)?;
        if pool_size == 0 {
            return Err(ConfigError::InvalidValue {
                key: "DATABASE_POOL_SIZE".to_string(),
                message: "pool size must be at least 1".to_string(),
            });
        }

        Ok(Some(Self {
            url: SecretString::from(url),
            pool_size,
        }))
    }

    pub fn url(&self) -> &str {
        self.url.expose_secret()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::helpers::fixed_env;

    #[test]
    fn no_url_means_unconfigured() {
        let resolved =
            DatabaseConfig::resolve_with(&Settings::default(), &fixed_env(&[])).expect("resolve");
        assert!(resolved.is_none());

        let blank = fixed_env(&[("DATABASE_URL", "  ")]);
        let resolved = DatabaseConfig::resolve_with(&Settings::default(), &blank).expect("resolve");
        assert!(resolved.is_none());
    }

    #[test]
    fn env_overrides_settings() {
        let mut settings = Settings::default();
        settings.database.url = Some("postgres://file@localhost/crm".to_string());
        let env = fixed_env(&[
            ("DATABASE_URL", "postgresql://env@db/crm"),
            ("DATABASE_POOL_SIZE", "12"),
        ]);
        let config = DatabaseConfig::resolve_with(&settings, &env)
            .expect("resolve")
            .expect("configured");
        assert_eq!(config.url(), "postgresql://env@db/crm");
        assert_eq!(config.pool_size, 12);
    }

    #[test]
    fn settings_url_is_used_without_env() {
        let mut settings = Settings::default();
        settings.database.url = Some("postgres://file@localhost/crm".to_string());
        let config = DatabaseConfig::resolve_with(&settings, &fixed_env(&[]))
            .expect("resolve")
            .expect("configured");
        assert_eq!(config.url(), "postgres://file@localhost/crm");
        assert_eq!(config.pool_size, 5);
    }

    #[test]
    fn rejects_foreign_schemes_and_empty_pools() {
        let env = fixed_env(&[("DATABASE_URL", "mysql://db/crm")]);
        let err = DatabaseConfig::resolve_with(&Settings::default(), &env).expect_err("scheme");
        assert!(matches!(err, ConfigError::InvalidValue { ref key, .. } if key == "DATABASE_URL"));

        let env = fixed_env(&[
            ("DATABASE_URL", "postgres://db/crm"),
            ("DATABASE_POOL_SIZE", "0"),
        ]);
        let err = DatabaseConfig::resolve_with(&Settings::default(), &env).expect_err("pool");
        assert!(
            matches!(err, ConfigError::InvalidValue { ref key, .. } if key == "DATABASE_POOL_SIZE")
        );
    }
}
