//! Filter engine.
//!
//! A [`RecordFilter`] is compiled, per kind, into a list of [`Condition`]s.
//! The same compiled list is evaluated in memory here and rendered into
//! remote-store clauses by the driver, so both stores agree on what a filter
//! means. Conditions combine with AND; a record must satisfy all of them.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::records::{FieldValue, FilterOption, RecordKind, SearchField};

/// Sentinel meaning "no constraint" for enumerated options.
pub const ALL_SENTINEL: &str = "all";

/// Caller-supplied filter; every option is optional.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RecordFilter {
    pub stage: Option<String>,
    pub status: Option<String>,
    pub category: Option<String>,
    pub search: Option<String>,
    pub related_to_type: Option<String>,
    pub customer_id: Option<String>,
    pub owner_id: Option<String>,
    pub assigned_to: Option<String>,
    #[serde(rename = "minAmount", alias = "min_amount")]
    pub min_amount: Option<Decimal>,
    #[serde(rename = "maxAmount", alias = "max_amount")]
    pub max_amount: Option<Decimal>,
}

impl RecordFilter {
    pub fn search(term: impl Into<String>) -> Self {
        Self {
            search: Some(term.into()),
            ..Self::default()
        }
    }

    pub fn value(&self, option: FilterOption) -> Option<&str> {
        let raw = match option {
            FilterOption::Stage => &self.stage,
            FilterOption::Status => &self.status,
            FilterOption::Category => &self.category,
            FilterOption::RelatedToType => &self.related_to_type,
            FilterOption::CustomerId => &self.customer_id,
            FilterOption::OwnerId => &self.owner_id,
            FilterOption::AssignedTo => &self.assigned_to,
        };
        raw.as_deref()
            .filter(|value| !value.trim().is_empty())
            .filter(|value| !(option.accepts_all_sentinel() && *value == ALL_SENTINEL))
    }
}

/// One compiled predicate.
#[derive(Debug, Clone, PartialEq)]
pub enum Condition {
    /// Case-sensitive equality on a text field.
    Equals { field: &'static str, value: String },
    /// Case-insensitive substring match on any of `fields`.
    ///
    /// In memory this folds with Unicode `to_lowercase`; Postgres `ILIKE`
    /// folds per the database collation. ASCII terms match the same on both
    /// stores; non-ASCII terms can differ under a `C` collation.
    Contains {
        fields: &'static [SearchField],
        term: String,
    },
    /// Inclusive lower bound on a numeric field.
    AtLeast { field: &'static str, bound: Decimal },
    /// Inclusive upper bound on a numeric field.
    AtMost { field: &'static str, bound: Decimal },
}

impl Condition {
    pub fn matches<K: RecordKind>(&self, record: &K::Record) -> bool {
        match self {
            Self::Equals { field, value } => match K::field(record, field) {
                FieldValue::Text(text) => text == value.as_str(),
                FieldValue::Number(n) => value.parse::<Decimal>().is_ok_and(|v| v == n),
                FieldValue::List(_) | FieldValue::Missing => false,
            },
            Self::Contains { fields, term } => {
                let needle = term.to_lowercase();
                fields.iter().any(|field| {
                    K::field(record, field.name())
                        .search_text()
                        .is_some_and(|text| text.to_lowercase().contains(&needle))
                })
            }
            Self::AtLeast { field, bound } => K::field(record, field)
                .as_number()
                .is_some_and(|n| n >= *bound),
            Self::AtMost { field, bound } => K::field(record, field)
                .as_number()
                .is_some_and(|n| n <= *bound),
        }
    }
}

/// Compile `filter` for kind `K`. Options `K` does not recognize are ignored.
pub fn compile<K: RecordKind>(filter: &RecordFilter) -> Vec<Condition> {
    let mut conditions = Vec::new();

    for &(option, field) in K::EXACT_FILTERS {
        if let Some(value) = filter.value(option) {
            conditions.push(Condition::Equals {
                field,
                value: value.to_string(),
            });
        }
    }

    if let Some(term) = filter.search.as_deref().map(str::trim)
        && !term.is_empty()
    {
        conditions.push(Condition::Contains {
            fields: K::SEARCH_FIELDS,
            term: term.to_string(),
        });
    }

    if let Some(field) = K::AMOUNT_FIELD {
        if let Some(bound) = filter.min_amount {
            conditions.push(Condition::AtLeast { field, bound });
        }
        if let Some(bound) = filter.max_amount {
            conditions.push(Condition::AtMost { field, bound });
        }
    }

    conditions
}

pub fn matches_all<K: RecordKind>(record: &K::Record, conditions: &[Condition]) -> bool {
    conditions.iter().all(|condition| condition.matches::<K>(record))
}

/// Records satisfying `filter`, in their original order.
pub fn apply<K: RecordKind>(records: &[K::Record], filter: &RecordFilter) -> Vec<K::Record> {
    let conditions = compile::<K>(filter);
    records
        .iter()
        .filter(|record| matches_all::<K>(record, &conditions))
        .cloned()
        .collect()
}
