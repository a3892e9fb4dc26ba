//! In-process fallback store.
//!
//! Holds one newest-first collection per entity kind. It is used when no
//! remote store is configured or when a remote call fails. Nothing here is
//! durable: the collections live as long as the `FallbackStore` value, and
//! concurrent writers to the same id race with last-write-wins.

use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use chrono::Utc;
use serde::Deserialize;
use uuid::Uuid;

use crate::error::{ConfigError, ServiceError};
use crate::records::filter;
use crate::records::{
    Deal, Document, Lead, RecordFilter, RecordKind, WriteHook, new_record, patched_record,
};

const FIXTURES: &str = include_str!("fixtures.toml");

/// Per-kind record collections, newest first.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Collections {
    pub(crate) leads: Vec<Lead>,
    pub(crate) deals: Vec<Deal>,
    pub(crate) documents: Vec<Document>,
}

impl Collections {
    /// Parse the bundled seed records.
    pub fn fixtures() -> Result<Self, ConfigError> {
        parse_fixtures(FIXTURES)
    }
}

fn parse_fixtures(raw: &str) -> Result<Collections, ConfigError> {
    toml::from_str(raw).map_err(|e| ConfigError::Parse {
        path: "fixtures.toml".to_string(),
        reason: e.to_string(),
    })
}

#[derive(Debug, Default)]
pub struct FallbackStore {
    collections: RwLock<Collections>,
}

impl FallbackStore {
    pub fn new(collections: Collections) -> Self {
        Self {
            collections: RwLock::new(collections),
        }
    }

    /// Store seeded with the bundled fixtures.
    pub fn seeded() -> Result<Self, ConfigError> {
        Ok(Self::new(Collections::fixtures()?))
    }

    // A panic while holding the lock cannot leave a collection half-written:
    // every mutation is a single push/replace/remove.
    fn read(&self) -> RwLockReadGuard<'_, Collections> {
        self.collections
            .read()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, Collections> {
        self.collections
            .write()
            .unwrap_or_else(PoisonError::into_inner)
    }

    pub fn list<K: RecordKind>(&self) -> Vec<K::Record> {
        K::collection(&self.read()).clone()
    }

    pub fn len<K: RecordKind>(&self) -> usize {
        K::collection(&self.read()).len()
    }

    pub fn find<K: RecordKind>(&self, id: Uuid) -> Option<K::Record> {
        K::collection(&self.read())
            .iter()
            .find(|record| K::id(record) == id)
            .cloned()
    }

    pub fn get<K: RecordKind>(&self, id: Uuid) -> Result<K::Record, ServiceError> {
        self.find::<K>(id).ok_or(ServiceError::NotFound { kind: K::KIND, id })
    }

    /// Records matching `filter`, newest first.
    pub fn query<K: RecordKind>(&self, filter: &RecordFilter) -> Vec<K::Record> {
        filter::apply::<K>(K::collection(&self.read()), filter)
    }

    pub fn stats<K: RecordKind>(&self) -> K::Stats {
        K::stats(K::collection(&self.read()))
    }

    /// Build a record from `draft` and put it at the front of its collection.
    pub fn insert<K: RecordKind>(
        &self,
        draft: K::Draft,
        created_by: Option<String>,
        hook: &dyn WriteHook<K>,
    ) -> Result<K::Record, ServiceError> {
        let record = new_record::<K>(draft, created_by, hook, Utc::now())?;
        K::collection_mut(&mut self.write()).insert(0, record.clone());
        Ok(record)
    }

    /// Merge `patch` into the record in place; its position is unchanged.
    pub fn update<K: RecordKind>(
        &self,
        id: Uuid,
        patch: &K::Patch,
        hook: &dyn WriteHook<K>,
    ) -> Result<K::Record, ServiceError> {
        let mut guard = self.write();
        let slot = K::collection_mut(&mut guard)
            .iter_mut()
            .find(|record| K::id(record) == id)
            .ok_or(ServiceError::NotFound { kind: K::KIND, id })?;
        let updated = patched_record::<K>(slot, patch, hook, Utc::now())?;
        *slot = updated.clone();
        Ok(updated)
    }

    pub fn delete<K: RecordKind>(&self, id: Uuid) -> Result<(), ServiceError> {
        let mut guard = self.write();
        let records = K::collection_mut(&mut guard);
        let index = records
            .iter()
            .position(|record| K::id(record) == id)
            .ok_or(ServiceError::NotFound { kind: K::KIND, id })?;
        records.remove(index);
        Ok(())
    }
}
