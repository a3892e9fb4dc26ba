//! Remote store doubles shared by the integration tests.
#![allow(dead_code)]

use std::collections::HashMap;
use std::str::FromStr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use rust_decimal::Decimal;
use secrecy::SecretString;
use url::Url;

use crm_records::CrmServices;
use crm_records::blob::MemoryBlobStore;
use crm_records::config::BlobConfig;
use crm_records::db::{BackendGate, RemoteQuery, RemoteStore, StoredRow};
use crm_records::error::DatabaseError;
use crm_records::fallback::FallbackStore;
use crm_records::records::{Condition, EntityKind, LIST_SEPARATOR, SearchField};
use crm_records::session::FixedUser;

/// Evaluates queries over JSON rows with the semantics of the Postgres
/// renderer: `data->>'f' = v`, ILIKE over coalesced text, numeric casts.
#[derive(Default)]
pub struct MemoryRemote {
    tables: Mutex<HashMap<EntityKind, Vec<StoredRow>>>,
    pub fetches: AtomicUsize,
}

impl MemoryRemote {
    pub fn rows(&self, kind: EntityKind) -> Vec<StoredRow> {
        self.tables
            .lock()
            .expect("tables")
            .get(&kind)
            .cloned()
            .unwrap_or_default()
    }

    pub fn seed(&self, kind: EntityKind, rows: Vec<StoredRow>) {
        self.tables
            .lock()
            .expect("tables")
            .entry(kind)
            .or_default()
            .extend(rows);
    }
}

fn text_field<'a>(data: &'a serde_json::Value, name: &str) -> Option<&'a str> {
    data.get(name).and_then(serde_json::Value::as_str)
}

fn search_text(data: &serde_json::Value, field: SearchField) -> String {
    match field {
        SearchField::Text(name) => text_field(data, name).unwrap_or_default().to_string(),
        SearchField::List(name) => data
            .get(name)
            .and_then(serde_json::Value::as_array)
            .map(|items| {
                items
                    .iter()
                    .filter_map(serde_json::Value::as_str)
                    .collect::<Vec<_>>()
                    .join(LIST_SEPARATOR)
            })
            .unwrap_or_default(),
    }
}

fn numeric(data: &serde_json::Value, name: &str) -> Option<Decimal> {
    match data.get(name)? {
        serde_json::Value::String(raw) => Decimal::from_str(raw).ok(),
        serde_json::Value::Number(n) => Decimal::from_str(&n.to_string()).ok(),
        _ => None,
    }
}

fn condition_holds(data: &serde_json::Value, condition: &Condition) -> bool {
    match condition {
        Condition::Equals { field, value } => text_field(data, field) == Some(value.as_str()),
        Condition::Contains { fields, term } => {
            let needle = term.to_lowercase();
            fields
                .iter()
                .any(|field| search_text(data, *field).to_lowercase().contains(&needle))
        }
        Condition::AtLeast { field, bound } => numeric(data, field).is_some_and(|n| n >= *bound),
        Condition::AtMost { field, bound } => numeric(data, field).is_some_and(|n| n <= *bound),
    }
}

fn row_matches(row: &StoredRow, query: &RemoteQuery) -> bool {
    if query.id.is_some_and(|id| id != row.id) {
        return false;
    }
    if let Some(owner) = &query.owner
        && row.owner.as_deref() != Some(owner.as_str())
    {
        return false;
    }
    query
        .conditions
        .iter()
        .all(|condition| condition_holds(&row.data, condition))
}

#[async_trait]
impl RemoteStore for MemoryRemote {
    async fn fetch(&self, query: &RemoteQuery) -> Result<Vec<StoredRow>, DatabaseError> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        let mut rows: Vec<StoredRow> = self
            .rows(query.kind)
            .into_iter()
            .filter(|row| row_matches(row, query))
            .collect();
        rows.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(rows)
    }

    async fn insert(&self, kind: EntityKind, row: &StoredRow) -> Result<(), DatabaseError> {
        let mut tables = self.tables.lock().expect("tables");
        let table = tables.entry(kind).or_default();
        if table.iter().any(|existing| existing.id == row.id) {
            return Err(DatabaseError::Query(format!("duplicate key {}", row.id)));
        }
        table.push(row.clone());
        Ok(())
    }

    async fn replace(&self, query: &RemoteQuery, row: &StoredRow) -> Result<u64, DatabaseError> {
        let mut tables = self.tables.lock().expect("tables");
        let mut touched = 0;
        for existing in tables.entry(query.kind).or_default().iter_mut() {
            if row_matches(existing, query) {
                existing.data = row.data.clone();
                existing.updated_at = row.updated_at;
                touched += 1;
            }
        }
        Ok(touched)
    }

    async fn remove(&self, query: &RemoteQuery) -> Result<u64, DatabaseError> {
        let mut tables = self.tables.lock().expect("tables");
        let table = tables.entry(query.kind).or_default();
        let before = table.len();
        table.retain(|row| !row_matches(row, query));
        Ok((before - table.len()) as u64)
    }
}

/// Remote store whose every call fails like an unreachable server.
pub struct FailingRemote;

#[async_trait]
impl RemoteStore for FailingRemote {
    async fn fetch(&self, _query: &RemoteQuery) -> Result<Vec<StoredRow>, DatabaseError> {
        Err(DatabaseError::Pool("connection refused".to_string()))
    }

    async fn insert(&self, _kind: EntityKind, _row: &StoredRow) -> Result<(), DatabaseError> {
        Err(DatabaseError::Pool("connection refused".to_string()))
    }

    async fn replace(&self, _query: &RemoteQuery, _row: &StoredRow) -> Result<u64, DatabaseError> {
        Err(DatabaseError::Query("deadlock detected".to_string()))
    }

    async fn remove(&self, _query: &RemoteQuery) -> Result<u64, DatabaseError> {
        Err(DatabaseError::Query("statement timeout".to_string()))
    }
}

/// Remote store that panics mid-call.
pub struct PanickingRemote;

#[async_trait]
impl RemoteStore for PanickingRemote {
    async fn fetch(&self, _query: &RemoteQuery) -> Result<Vec<StoredRow>, DatabaseError> {
        panic!("driver bug in fetch")
    }

    async fn insert(&self, _kind: EntityKind, _row: &StoredRow) -> Result<(), DatabaseError> {
        panic!("driver bug in insert")
    }

    async fn replace(&self, _query: &RemoteQuery, _row: &StoredRow) -> Result<u64, DatabaseError> {
        panic!("driver bug in replace")
    }

    async fn remove(&self, _query: &RemoteQuery) -> Result<u64, DatabaseError> {
        panic!("driver bug in remove")
    }
}

/// Gate whose remote store can be switched on and off between calls.
#[derive(Default)]
pub struct SwitchGate {
    remote: Mutex<Option<Arc<dyn RemoteStore>>>,
}

impl SwitchGate {
    pub fn set(&self, remote: Option<Arc<dyn RemoteStore>>) {
        *self.remote.lock().expect("gate") = remote;
    }
}

impl BackendGate for SwitchGate {
    fn remote(&self) -> Option<Arc<dyn RemoteStore>> {
        self.remote.lock().expect("gate").clone()
    }
}

pub fn blob_store() -> Arc<MemoryBlobStore> {
    Arc::new(MemoryBlobStore::new(BlobConfig {
        base_url: Url::parse("https://files.example.com/crm/").expect("url"),
        signing_key: SecretString::from("integration-key".to_string()),
        url_ttl: Duration::from_secs(300),
    }))
}

pub fn services(
    gate: Arc<dyn BackendGate>,
    fallback: Arc<FallbackStore>,
    user: Option<&str>,
    blobs: Arc<MemoryBlobStore>,
) -> CrmServices {
    CrmServices::new(
        gate,
        fallback,
        Arc::new(FixedUser::from(user.map(str::to_string))),
        blobs,
        Duration::from_secs(300),
    )
}
