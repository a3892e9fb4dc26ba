//! Environment lookup helpers shared by the config resolvers.
//!
//! Resolvers take an [`Env`] so tests can resolve against a fixed map instead
//! of the process environment.

use std::collections::HashMap;
use std::str::FromStr;

use crate::error::ConfigError;

/// Source of environment variables.
pub trait Env {
    fn var(&self, key: &str) -> Option<String>;
}

/// The process environment.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessEnv;

impl Env for ProcessEnv {
    fn var(&self, key: &str) -> Option<String> {
        std::env::var(key).ok()
    }
}

impl Env for HashMap<String, String> {
    fn var(&self, key: &str) -> Option<String> {
        self.get(key).cloned()
    }
}

/// Non-blank value of `key`, trimmed.
pub(crate) fn optional_env(env: &dyn Env, key: &str) -> Option<String> {
    env.var(key)
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

pub(crate) fn parse_string_env(env: &dyn Env, key: &str, default: String) -> String {
    optional_env(env, key).unwrap_or(default)
}

pub(crate) fn parse_bool_env(env: &dyn Env, key: &str, default: bool) -> Result<bool, ConfigError> {
    match optional_env(env, key) {
        None => Ok(default),
        Some(raw) => match raw.to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => Ok(true),
            "0" | "false" | "no" | "off" => Ok(false),
            other => Err(ConfigError::InvalidValue {
                key: key.to_string(),
                message: format!("expected a boolean, got '{other}'"),
            }),
        },
    }
}

pub(crate) fn parse_env<T>(env: &dyn Env, key: &str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match optional_env(env, key) {
        None => Ok(default),
        Some(raw) => raw.parse().map_err(|e: T::Err| ConfigError::InvalidValue {
            key: key.to_string(),
            message: format!("'{raw}': {e}"),
        }),
    }
}

#[cfg(test)]
pub(crate) fn fixed_env(pairs: &[(&str, &str)]) -> HashMap<String, String> {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}
