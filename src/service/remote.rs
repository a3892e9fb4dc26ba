//! Remote query adapter.
//!
//! Runs record operations against a [`RemoteStore`]. Filters are compiled by
//! the filter engine and passed through unchanged; every query is scoped to
//! the current user when one is known. Driver errors come back as
//! `ServiceError` so the facade can decide whether to fall back.

use chrono::Utc;
use uuid::Uuid;

use crate::db::{RemoteQuery, RemoteStore, StoredRow};
use crate::error::ServiceError;
use crate::records::filter;
use crate::records::{RecordFilter, RecordKind, WriteHook, new_record, patched_record};

fn scoped<K: RecordKind>(owner: Option<&str>) -> RemoteQuery {
    RemoteQuery::for_kind(K::KIND).scoped_to(owner)
}

fn decode_rows<K: RecordKind>(rows: Vec<StoredRow>) -> Result<Vec<K::Record>, ServiceError> {
    rows.into_iter()
        .map(|row| row.decode::<K>().map_err(ServiceError::from))
        .collect()
}

pub(crate) async fn list<K: RecordKind>(
    store: &dyn RemoteStore,
    owner: Option<&str>,
    filter: &RecordFilter,
) -> Result<Vec<K::Record>, ServiceError> {
    let query = scoped::<K>(owner).with_conditions(filter::compile::<K>(filter));
    decode_rows::<K>(store.fetch(&query).await?)
}

pub(crate) async fn get<K: RecordKind>(
    store: &dyn RemoteStore,
    owner: Option<&str>,
    id: Uuid,
) -> Result<K::Record, ServiceError> {
    let rows = store.fetch(&scoped::<K>(owner).with_id(id)).await?;
    match rows.into_iter().next() {
        Some(row) => Ok(row.decode::<K>()?),
        None => Err(ServiceError::NotFound { kind: K::KIND, id }),
    }
}

pub(crate) async fn create<K: RecordKind>(
    store: &dyn RemoteStore,
    owner: Option<&str>,
    draft: K::Draft,
    hook: &dyn WriteHook<K>,
) -> Result<K::Record, ServiceError> {
    let record = new_record::<K>(draft, owner.map(str::to_string), hook, Utc::now())?;
    store
        .insert(K::KIND, &StoredRow::encode::<K>(&record)?)
        .await?;
    Ok(record)
}

/// Read, patch, write back. Two concurrent updates of the same id are not
/// serialized: the later write wins and the stage policy's "stamp the close
/// date if unset" check can run against a stale read.
pub(crate) async fn update<K: RecordKind>(
    store: &dyn RemoteStore,
    owner: Option<&str>,
    id: Uuid,
    patch: &K::Patch,
    hook: &dyn WriteHook<K>,
) -> Result<K::Record, ServiceError> {
    let existing = get::<K>(store, owner, id).await?;
    let updated = patched_record::<K>(&existing, patch, hook, Utc::now())?;
    let touched = store
        .replace(
            &scoped::<K>(owner).with_id(id),
            &StoredRow::encode::<K>(&updated)?,
        )
        .await?;
    if touched == 0 {
        return Err(ServiceError::NotFound { kind: K::KIND, id });
    }
    Ok(updated)
}

pub(crate) async fn delete<K: RecordKind>(
    store: &dyn RemoteStore,
    owner: Option<&str>,
    id: Uuid,
) -> Result<(), ServiceError> {
    let removed = store.remove(&scoped::<K>(owner).with_id(id)).await?;
    if removed == 0 {
        return Err(ServiceError::NotFound { kind: K::KIND, id });
    }
    Ok(())
}

pub(crate) async fn stats<K: RecordKind>(
    store: &dyn RemoteStore,
    owner: Option<&str>,
) -> Result<K::Stats, ServiceError> {
    let records = decode_rows::<K>(store.fetch(&scoped::<K>(owner)).await?)?;
    Ok(K::stats(&records))
}
