//! Entity kinds handled by the record service.
//!
//! Each kind (lead, deal, document) is described by a [`RecordKind`]
//! implementation: how a record is built from a draft, merged with a patch,
//! validated, inspected field-by-field for filtering, and reduced into stats.
//! The stores and the facade are generic over this descriptor, so the three
//! kinds share one code path. Kind-specific write side effects (the deal
//! pipeline's stage policy) plug in through [`WriteHook`].

pub mod deal;
pub mod document;
pub mod filter;
pub mod lead;
pub mod stage;

use std::borrow::Cow;
use std::collections::HashSet;
use std::fmt;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};
use uuid::Uuid;

use crate::error::ValidationError;
use crate::fallback::Collections;

pub use deal::{Deal, DealKind, DealPatch, DealStage, DealStats, NewDeal};
pub use document::{
    Document, DocumentCategory, DocumentKind, DocumentPatch, DocumentStats, NewDocument,
    RelatedToType,
};
pub use filter::{Condition, RecordFilter};
pub use lead::{Lead, LeadKind, LeadPatch, LeadSource, LeadStats, LeadStatus, NewLead};
pub use stage::StageTransitionPolicy;

/// Separator used when a list field (tags) is searched as one string.
pub const LIST_SEPARATOR: &str = ",";

/// The three record kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityKind {
    Lead,
    Deal,
    Document,
}

impl EntityKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Lead => "lead",
            Self::Deal => "deal",
            Self::Document => "document",
        }
    }

    /// Remote table holding this kind.
    pub fn table(self) -> &'static str {
        match self {
            Self::Lead => "leads",
            Self::Deal => "deals",
            Self::Document => "documents",
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A record field as seen by the filter engine.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue<'a> {
    Text(&'a str),
    Number(Decimal),
    List(&'a [String]),
    Missing,
}

impl<'a> FieldValue<'a> {
    pub fn from_opt(value: Option<&'a str>) -> Self {
        value.map_or(Self::Missing, Self::Text)
    }

    pub fn as_text(&self) -> Option<&'a str> {
        match self {
            Self::Text(text) => Some(text),
            _ => None,
        }
    }

    pub fn as_number(&self) -> Option<Decimal> {
        match self {
            Self::Number(n) => Some(*n),
            _ => None,
        }
    }

    /// The string a free-text search is matched against.
    pub fn search_text(&self) -> Option<Cow<'a, str>> {
        match self {
            Self::Text(text) => Some(Cow::Borrowed(*text)),
            Self::List(items) => Some(Cow::Owned(items.join(LIST_SEPARATOR))),
            Self::Number(_) | Self::Missing => None,
        }
    }
}

/// A field included in free-text search.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchField {
    Text(&'static str),
    /// A list of strings, searched as its `LIST_SEPARATOR`-joined text.
    List(&'static str),
}

impl SearchField {
    pub fn name(self) -> &'static str {
        match self {
            Self::Text(name) | Self::List(name) => name,
        }
    }
}

/// Exact-match filter options understood by the filter engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterOption {
    Stage,
    Status,
    Category,
    RelatedToType,
    CustomerId,
    OwnerId,
    AssignedTo,
}

impl FilterOption {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Stage => "stage",
            Self::Status => "status",
            Self::Category => "category",
            Self::RelatedToType => "related_to_type",
            Self::CustomerId => "customer_id",
            Self::OwnerId => "owner_id",
            Self::AssignedTo => "assigned_to",
        }
    }

    /// Enumerated options treat the value `"all"` as "no constraint".
    pub fn accepts_all_sentinel(self) -> bool {
        matches!(
            self,
            Self::Stage | Self::Status | Self::Category | Self::RelatedToType
        )
    }
}

/// Descriptor of one entity kind.
pub trait RecordKind: Send + Sync + 'static {
    type Record: Clone + fmt::Debug + Serialize + DeserializeOwned + Send + Sync + 'static;
    /// Create payload; required fields may be blank and are checked by `validate`.
    type Draft: Clone + fmt::Debug + DeserializeOwned + Send + Sync;
    /// Partial update; every field optional.
    type Patch: fmt::Debug + Default + DeserializeOwned + Send + Sync;
    type Stats: fmt::Debug + Serialize + Send;

    const KIND: EntityKind;
    /// Searchable fields, in match order.
    const SEARCH_FIELDS: &'static [SearchField];
    /// Exact-match options this kind recognizes, with the field each one reads.
    const EXACT_FILTERS: &'static [(FilterOption, &'static str)];
    /// Numeric field bounded by `min_amount`/`max_amount`, if any.
    const AMOUNT_FIELD: Option<&'static str> = None;

    /// Fill defaults and audit fields.
    fn build(
        draft: Self::Draft,
        id: Uuid,
        created_by: Option<String>,
        now: DateTime<Utc>,
    ) -> Self::Record;
    fn merge(record: &mut Self::Record, patch: &Self::Patch);
    fn validate(record: &Self::Record) -> Result<(), ValidationError>;

    fn id(record: &Self::Record) -> Uuid;
    fn owner(record: &Self::Record) -> Option<&str>;
    fn created_at(record: &Self::Record) -> DateTime<Utc>;
    fn updated_at(record: &Self::Record) -> DateTime<Utc>;
    fn touch(record: &mut Self::Record, now: DateTime<Utc>);
    fn field<'a>(record: &'a Self::Record, name: &str) -> FieldValue<'a>;

    fn stats(records: &[Self::Record]) -> Self::Stats;

    fn collection(collections: &Collections) -> &Vec<Self::Record>;
    fn collection_mut(collections: &mut Collections) -> &mut Vec<Self::Record>;
}

/// Side effects applied to a record while it is written, on either store.
pub trait WriteHook<K: RecordKind>: Send + Sync {
    fn on_create(&self, _record: &mut K::Record, _now: DateTime<Utc>) {}

    fn on_update(&self, _record: &mut K::Record, _patch: &K::Patch, _now: DateTime<Utc>) {}
}

/// Hook that does nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoHooks;

impl<K: RecordKind> WriteHook<K> for NoHooks {}

/// Build a validated record from a draft with a fresh id.
pub fn new_record<K: RecordKind>(
    draft: K::Draft,
    created_by: Option<String>,
    hook: &dyn WriteHook<K>,
    now: DateTime<Utc>,
) -> Result<K::Record, ValidationError> {
    let mut record = K::build(draft, Uuid::new_v4(), created_by, now);
    hook.on_create(&mut record, now);
    K::validate(&record)?;
    Ok(record)
}

/// Apply a patch to a copy of `existing`; `existing` is untouched on error.
pub fn patched_record<K: RecordKind>(
    existing: &K::Record,
    patch: &K::Patch,
    hook: &dyn WriteHook<K>,
    now: DateTime<Utc>,
) -> Result<K::Record, ValidationError> {
    let mut record = existing.clone();
    K::merge(&mut record, patch);
    K::touch(&mut record, now);
    hook.on_update(&mut record, patch, now);
    K::validate(&record)?;
    Ok(record)
}

/// Trim tags, drop blanks and repeated tags, keep first-seen order.
pub fn normalize_tags(tags: Vec<String>) -> Vec<String> {
    let mut seen = HashSet::new();
    tags.into_iter()
        .map(|tag| tag.trim().to_string())
        .filter(|tag| !tag.is_empty() && seen.insert(tag.clone()))
        .collect()
}

/// Trim an optional string, mapping blank to `None`.
pub(crate) fn clean_opt(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

pub(crate) fn require_text(field: &'static str, value: &str) -> Result<(), ValidationError> {
    if value.trim().is_empty() {
        return Err(ValidationError::MissingField { field });
    }
    Ok(())
}

pub(crate) fn require_range(
    field: &'static str,
    value: i32,
    min: i32,
    max: i32,
) -> Result<(), ValidationError> {
    if value < min || value > max {
        return Err(ValidationError::OutOfRange {
            field,
            min: i64::from(min),
            max: i64::from(max),
            value: i64::from(value),
        });
    }
    Ok(())
}

/// Lets a patch tell "field absent" (`None`) from "field set to null" (`Some(None)`).
pub(crate) fn deserialize_some<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    T::deserialize(deserializer).map(Some)
}
