use std::time::Duration;

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use secrecy::SecretString;
use url::Url;

use crate::config::helpers::{Env, ProcessEnv, optional_env, parse_env, parse_string_env};
use crate::error::ConfigError;
use crate::settings::Settings;

/// Blob store URL signing settings.
#[derive(Debug)]
pub struct BlobConfig {
    /// Prefix of issued download URLs.
    pub base_url: Url,
    pub signing_key: SecretString,
    /// Default lifetime of issued URLs.
    pub url_ttl: Duration,
}

impl BlobConfig {
    pub fn resolve(settings: &Settings) -> Result<Self, ConfigError> {
        Self::resolve_with(settings, &ProcessEnv)
    }

    pub(crate) fn resolve_with(settings: &Settings, env: &dyn Env) -> Result<Self, ConfigError> {
        let raw_base = parse_string_env(env, "BLOB_BASE_URL", settings.storage.base_url.clone());
        let base_url = Url::parse(&raw_base).map_err(|e| ConfigError::InvalidValue {
            key: "BLOB_BASE_URL".to_string(),
            message: format!("'{raw_base}': {e}"),
        })?;
        if base_url.cannot_be_a_base() {
            return Err(ConfigError::InvalidValue {
                key: "BLOB_BASE_URL".to_string(),
                message: format!("'{raw_base}' cannot be used as a base URL"),
            });
        }

        let signing_key = match optional_env(env, "BLOB_SIGNING_KEY")
            .or_else(|| settings.storage.signing_key.clone())
        {
            Some(key) => key,
            None => {
                tracing::debug!("No blob signing key configured, using an ephemeral key");
                URL_SAFE_NO_PAD.encode(rand::random::<[u8; 32]>())
            }
        };

        let ttl_secs = parse_env(env, "BLOB_URL_TTL_SECS", settings.storage.url_ttl_secs)?;
        if ttl_secs == 0 {
            return Err(ConfigError::InvalidValue {
                key: "BLOB_URL_TTL_SECS".to_string(),
                message: "URL lifetime must be at least one second".to_string(),
            });
        }

        Ok(Self {
            base_url,
            signing_key: SecretString::from(signing_key),
            url_ttl: Duration::from_secs(ttl_secs),
        })
    }
}
