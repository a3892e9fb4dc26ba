//! Backend availability gate.
//!
//! Answers "is a remote store configured?" on every call. Only the
//! configuration is checked; no network round trip is made.

use std::sync::Arc;
#[cfg(feature = "postgres")]
use std::sync::{Mutex, PoisonError};

use crate::db::RemoteStore;
#[cfg(feature = "postgres")]
use crate::db::postgres::PgBackend;
use crate::settings::Settings;

pub trait BackendGate: Send + Sync {
    /// The remote store to use for this call, if one is configured.
    fn remote(&self) -> Option<Arc<dyn RemoteStore>>;

    fn is_remote_available(&self) -> bool {
        self.remote().is_some()
    }
}

/// Gate that never reports a remote store.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoRemote;

impl BackendGate for NoRemote {
    fn remote(&self) -> Option<Arc<dyn RemoteStore>> {
        None
    }
}

/// Gate that always hands out the same store.
#[derive(Clone)]
pub struct StaticRemote(pub Arc<dyn RemoteStore>);

impl BackendGate for StaticRemote {
    fn remote(&self) -> Option<Arc<dyn RemoteStore>> {
        Some(Arc::clone(&self.0))
    }
}

/// Gate driven by settings and the process environment.
///
/// The database configuration is resolved again on every call, so setting or
/// fixing `DATABASE_URL` takes effect without a restart. Only the connection
/// pool is reused, and only while the URL stays the same.
pub struct EnvGate {
    settings: Settings,
    #[cfg(feature = "postgres")]
    cached: Mutex<Option<(String, Arc<PgBackend>)>>,
}

impl EnvGate {
    pub fn new(settings: Settings) -> Self {
        Self {
            settings,
            #[cfg(feature = "postgres")]
            cached: Mutex::new(None),
        }
    }
}

#[cfg(feature = "postgres")]
impl BackendGate for EnvGate {
    fn remote(&self) -> Option<Arc<dyn RemoteStore>> {
        let config = match crate::config::DatabaseConfig::resolve(&self.settings) {
            Ok(Some(config)) => config,
            Ok(None) => {
                tracing::debug!("No remote store configured");
                return None;
            }
            Err(e) => {
                tracing::warn!("Ignoring invalid remote store configuration: {}", e);
                return None;
            }
        };

        let mut cached = self.cached.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some((url, backend)) = cached.as_ref()
            && url == config.url()
        {
            return Some(Arc::clone(backend) as Arc<dyn RemoteStore>);
        }

        match PgBackend::new(&config) {
            Ok(backend) => {
                let backend = Arc::new(backend);
                *cached = Some((config.url().to_string(), Arc::clone(&backend)));
                Some(backend as Arc<dyn RemoteStore>)
            }
            Err(e) => {
                tracing::warn!("Failed to build remote store pool: {}", e);
                None
            }
        }
    }
}

#[cfg(not(feature = "postgres"))]
impl BackendGate for EnvGate {
    fn remote(&self) -> Option<Arc<dyn RemoteStore>> {
        let _ = &self.settings;
        None
    }
}
