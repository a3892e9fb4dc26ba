//! Remote store abstraction.
//!
//! Provides a backend-agnostic `RemoteStore` trait used by the remote query
//! adapter. One implementation exists behind a feature flag:
//!
//! - `postgres` (default): Uses `deadpool-postgres` + `tokio-postgres`
//!
//! A record is stored whole, as JSON, next to the columns the store needs for
//! identity, tenant scoping and ordering. Queries carry the filter engine's
//! compiled conditions so every backend evaluates the same predicate list.

#[cfg(feature = "postgres")]
pub mod postgres;

pub mod gate;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::DatabaseError;
use crate::records::{Condition, EntityKind, RecordKind};

pub use gate::{BackendGate, EnvGate, NoRemote, StaticRemote};

/// One stored record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredRow {
    pub id: Uuid,
    /// Tenant the row belongs to (`created_by` of the record).
    pub owner: Option<String>,
    pub data: serde_json::Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl StoredRow {
    pub fn encode<K: RecordKind>(record: &K::Record) -> Result<Self, DatabaseError> {
        let data = serde_json::to_value(record).map_err(|e| {
            DatabaseError::Serialization(format!("failed to encode {}: {}", K::KIND, e))
        })?;
        Ok(Self {
            id: K::id(record),
            owner: K::owner(record).map(str::to_string),
            data,
            created_at: K::created_at(record),
            updated_at: K::updated_at(record),
        })
    }

    pub fn decode<K: RecordKind>(self) -> Result<K::Record, DatabaseError> {
        serde_json::from_value(self.data).map_err(|e| {
            DatabaseError::Serialization(format!("invalid {} row {}: {}", K::KIND, self.id, e))
        })
    }
}

/// Backend-agnostic selection of rows in one table.
#[derive(Debug, Clone, PartialEq)]
pub struct RemoteQuery {
    pub kind: EntityKind,
    pub id: Option<Uuid>,
    /// Tenant scope; `None` means unscoped.
    pub owner: Option<String>,
    pub conditions: Vec<Condition>,
}

impl RemoteQuery {
    pub fn for_kind(kind: EntityKind) -> Self {
        Self {
            kind,
            id: None,
            owner: None,
            conditions: Vec::new(),
        }
    }

    pub fn with_id(mut self, id: Uuid) -> Self {
        self.id = Some(id);
        self
    }

    pub fn scoped_to(mut self, owner: Option<&str>) -> Self {
        self.owner = owner.map(str::to_string);
        self
    }

    pub fn with_conditions(mut self, conditions: Vec<Condition>) -> Self {
        self.conditions = conditions;
        self
    }
}

/// Remote persistence used by the record service when it is configured.
///
/// `fetch` returns rows newest first. `replace` and `remove` report the number
/// of rows they touched so callers can map zero to "not found".
#[async_trait]
pub trait RemoteStore: Send + Sync {
    async fn fetch(&self, query: &RemoteQuery) -> Result<Vec<StoredRow>, DatabaseError>;

    async fn insert(&self, kind: EntityKind, row: &StoredRow) -> Result<(), DatabaseError>;

    async fn replace(&self, query: &RemoteQuery, row: &StoredRow) -> Result<u64, DatabaseError>;

    async fn remove(&self, query: &RemoteQuery) -> Result<u64, DatabaseError>;
}
