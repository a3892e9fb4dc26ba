//! Record service facade.
//!
//! One [`RecordService`] per entity kind. Every operation asks the backend
//! gate for a remote store. Without one, the operation runs on the fallback
//! store. With one, it runs remotely, and any recoverable failure (including a
//! panic inside the remote path) re-runs the whole operation on the fallback
//! store. The caller sees which path answered through [`Outcome`] and, once
//! serialized, the envelope's `usingFallbackData` flag.

pub mod documents;
mod remote;

use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::FutureExt;
use serde::Serialize;
use uuid::Uuid;

use crate::db::{BackendGate, RemoteStore};
use crate::error::ServiceError;
use crate::fallback::FallbackStore;
use crate::records::{
    DealKind, DocumentKind, LeadKind, NoHooks, RecordFilter, RecordKind, StageTransitionPolicy,
    WriteHook,
};
use crate::session::CurrentUser;

pub use documents::{DocumentDetails, DocumentUploads, Upload};

/// Result of a facade operation.
#[derive(Debug)]
pub enum Outcome<T> {
    /// Answered by the remote store.
    Ok(T),
    /// Answered by the fallback store.
    Fallback(T),
    Err {
        error: ServiceError,
        via_fallback: bool,
    },
}

impl<T> Outcome<T> {
    pub fn from_result(result: Result<T, ServiceError>, via_fallback: bool) -> Self {
        match (result, via_fallback) {
            (Ok(value), false) => Self::Ok(value),
            (Ok(value), true) => Self::Fallback(value),
            (Err(error), via_fallback) => Self::Err {
                error,
                via_fallback,
            },
        }
    }

    pub fn is_fallback(&self) -> bool {
        match self {
            Self::Ok(_) => false,
            Self::Fallback(_) => true,
            Self::Err { via_fallback, .. } => *via_fallback,
        }
    }

    pub fn is_err(&self) -> bool {
        matches!(self, Self::Err { .. })
    }

    pub fn value(&self) -> Option<&T> {
        match self {
            Self::Ok(value) | Self::Fallback(value) => Some(value),
            Self::Err { .. } => None,
        }
    }

    pub fn into_parts(self) -> (Result<T, ServiceError>, bool) {
        let via_fallback = self.is_fallback();
        let result = match self {
            Self::Ok(value) | Self::Fallback(value) => Ok(value),
            Self::Err { error, .. } => Err(error),
        };
        (result, via_fallback)
    }

    pub fn into_result(self) -> Result<T, ServiceError> {
        self.into_parts().0
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Outcome<U> {
        let (result, via_fallback) = self.into_parts();
        Outcome::from_result(result.map(f), via_fallback)
    }

    pub fn into_envelope(self) -> Envelope<T> {
        let (result, using_fallback_data) = self.into_parts();
        match result {
            Ok(data) => Envelope {
                data: Some(data),
                error: false,
                message: None,
                using_fallback_data,
            },
            Err(e) => Envelope {
                data: None,
                error: true,
                message: Some(e.to_string()),
                using_fallback_data,
            },
        }
    }
}

impl<T> From<Outcome<T>> for Envelope<T> {
    fn from(outcome: Outcome<T>) -> Self {
        outcome.into_envelope()
    }
}

/// Uniform response shape of every facade operation.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Envelope<T> {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    pub error: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    pub using_fallback_data: bool,
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// Await the remote path, turning a panic into a transient error.
async fn guarded<T>(
    attempt: impl Future<Output = Result<T, ServiceError>>,
) -> Result<T, ServiceError> {
    match AssertUnwindSafe(attempt).catch_unwind().await {
        Ok(result) => result,
        Err(payload) => Err(ServiceError::Transient(format!(
            "remote call panicked: {}",
            panic_message(&*payload)
        ))),
    }
}

/// Facade over one entity kind.
pub struct RecordService<K: RecordKind> {
    gate: Arc<dyn BackendGate>,
    fallback: Arc<FallbackStore>,
    users: Arc<dyn CurrentUser>,
    hook: Arc<dyn WriteHook<K>>,
}

impl<K: RecordKind> Clone for RecordService<K> {
    fn clone(&self) -> Self {
        Self {
            gate: Arc::clone(&self.gate),
            fallback: Arc::clone(&self.fallback),
            users: Arc::clone(&self.users),
            hook: Arc::clone(&self.hook),
        }
    }
}

impl RecordService<LeadKind> {
    pub fn leads(
        gate: Arc<dyn BackendGate>,
        fallback: Arc<FallbackStore>,
        users: Arc<dyn CurrentUser>,
    ) -> Self {
        Self::new(gate, fallback, users, Arc::new(NoHooks))
    }
}

impl RecordService<DealKind> {
    /// Deal writes on either store go through the stage transition policy.
    pub fn deals(
        gate: Arc<dyn BackendGate>,
        fallback: Arc<FallbackStore>,
        users: Arc<dyn CurrentUser>,
    ) -> Self {
        Self::new(gate, fallback, users, Arc::new(StageTransitionPolicy))
    }
}

impl RecordService<DocumentKind> {
    pub fn documents(
        gate: Arc<dyn BackendGate>,
        fallback: Arc<FallbackStore>,
        users: Arc<dyn CurrentUser>,
    ) -> Self {
        Self::new(gate, fallback, users, Arc::new(NoHooks))
    }
}

impl<K: RecordKind> RecordService<K> {
    pub fn new(
        gate: Arc<dyn BackendGate>,
        fallback: Arc<FallbackStore>,
        users: Arc<dyn CurrentUser>,
        hook: Arc<dyn WriteHook<K>>,
    ) -> Self {
        Self {
            gate,
            fallback,
            users,
            hook,
        }
    }

    pub fn fallback(&self) -> &FallbackStore {
        &self.fallback
    }

    /// Route one operation: remote when configured, fallback otherwise or
    /// when the remote attempt fails recoverably.
    async fn run<T, F, Fut>(
        &self,
        op: &'static str,
        remote: F,
        local: impl FnOnce(&FallbackStore, Option<String>) -> Result<T, ServiceError>,
    ) -> Outcome<T>
    where
        F: FnOnce(Arc<dyn RemoteStore>, Option<String>) -> Fut,
        Fut: Future<Output = Result<T, ServiceError>>,
    {
        let user = self.users.current_user_id().await;
        let Some(store) = self.gate.remote() else {
            tracing::debug!("{} {}: no remote store, using fallback data", K::KIND, op);
            return Outcome::from_result(local(&self.fallback, user), true);
        };

        match guarded(remote(store, user.clone())).await {
            Ok(value) => Outcome::Ok(value),
            Err(e) if e.is_recoverable() => {
                tracing::warn!(
                    "{} {} failed on remote store, using fallback data: {}",
                    K::KIND,
                    op,
                    e
                );
                Outcome::from_result(local(&self.fallback, user), true)
            }
            Err(error) => Outcome::Err {
                error,
                via_fallback: false,
            },
        }
    }

    /// Records matching `filter`, newest first.
    pub async fn list(&self, filter: &RecordFilter) -> Outcome<Vec<K::Record>> {
        self.run(
            "list",
            |store, user| async move { remote::list::<K>(store.as_ref(), user.as_deref(), filter).await },
            |fallback, _| Ok(fallback.query::<K>(filter)),
        )
        .await
    }

    pub async fn get(&self, id: Uuid) -> Outcome<K::Record> {
        self.run(
            "get",
            |store, user| async move { remote::get::<K>(store.as_ref(), user.as_deref(), id).await },
            |fallback, _| fallback.get::<K>(id),
        )
        .await
    }

    /// Create a record owned by the current user.
    pub async fn create(&self, draft: K::Draft) -> Outcome<K::Record> {
        let hook = self.hook.as_ref();
        let remote_draft = draft.clone();
        self.run(
            "create",
            |store, user| async move {
                remote::create::<K>(store.as_ref(), user.as_deref(), remote_draft, hook).await
            },
            |fallback, user| fallback.insert::<K>(draft, user, hook),
        )
        .await
    }

    /// Merge `patch` into the record. An empty patch only refreshes
    /// `updated_at`.
    pub async fn update(&self, id: Uuid, patch: &K::Patch) -> Outcome<K::Record> {
        let hook = self.hook.as_ref();
        self.run(
            "update",
            |store, user| async move {
                remote::update::<K>(store.as_ref(), user.as_deref(), id, patch, hook).await
            },
            |fallback, _| fallback.update::<K>(id, patch, hook),
        )
        .await
    }

    pub async fn delete(&self, id: Uuid) -> Outcome<()> {
        self.run(
            "delete",
            |store, user| async move { remote::delete::<K>(store.as_ref(), user.as_deref(), id).await },
            |fallback, _| fallback.delete::<K>(id),
        )
        .await
    }

    /// Aggregates over the whole collection, recomputed on every call.
    pub async fn stats(&self) -> Outcome<K::Stats> {
        self.run(
            "stats",
            |store, user| async move { remote::stats::<K>(store.as_ref(), user.as_deref()).await },
            |fallback, _| Ok(fallback.stats::<K>()),
        )
        .await
    }
}

/// The three facades plus document uploads, sharing one gate, fallback store
/// and user provider.
pub struct CrmServices {
    pub leads: RecordService<LeadKind>,
    pub deals: RecordService<DealKind>,
    pub documents: DocumentUploads,
}

impl CrmServices {
    pub fn new(
        gate: Arc<dyn BackendGate>,
        fallback: Arc<FallbackStore>,
        users: Arc<dyn CurrentUser>,
        blobs: Arc<dyn crate::blob::BlobStore>,
        url_ttl: std::time::Duration,
    ) -> Self {
        Self {
            leads: RecordService::leads(Arc::clone(&gate), Arc::clone(&fallback), Arc::clone(&users)),
            deals: RecordService::deals(Arc::clone(&gate), Arc::clone(&fallback), Arc::clone(&users)),
            documents: DocumentUploads::new(
                RecordService::documents(gate, fallback, users),
                blobs,
                url_ttl,
            ),
        }
    }
}
