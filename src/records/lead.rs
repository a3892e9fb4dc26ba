use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::ValidationError;
use crate::fallback::Collections;
use crate::records::{
    EntityKind, FieldValue, FilterOption, RecordKind, SearchField, clean_opt, deserialize_some,
    require_range, require_text,
};

/// Where a lead came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LeadSource {
    Website,
    Referral,
    Campaign,
    Social,
    Other,
}

impl LeadSource {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Website => "website",
            Self::Referral => "referral",
            Self::Campaign => "campaign",
            Self::Social => "social",
            Self::Other => "other",
        }
    }
}

/// Lead qualification state. Any status may move to any other.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LeadStatus {
    New,
    Contacted,
    Qualified,
    Converted,
    Lost,
}

impl LeadStatus {
    pub const ALL: [Self; 5] = [
        Self::New,
        Self::Contacted,
        Self::Qualified,
        Self::Converted,
        Self::Lost,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::New => "new",
            Self::Contacted => "contacted",
            Self::Qualified => "qualified",
            Self::Converted => "converted",
            Self::Lost => "lost",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Lead {
    pub id: Uuid,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub phone: Option<String>,
    pub company: Option<String>,
    pub job_title: Option<String>,
    pub source: LeadSource,
    pub status: LeadStatus,
    pub score: i32,
    pub notes: Option<String>,
    pub assigned_to: Option<String>,
    pub created_by: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct NewLead {
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub phone: Option<String>,
    pub company: Option<String>,
    pub job_title: Option<String>,
    pub source: Option<LeadSource>,
    pub status: Option<LeadStatus>,
    pub score: Option<i32>,
    pub notes: Option<String>,
    pub assigned_to: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct LeadPatch {
    #[serde(default)]
    pub first_name: Option<String>,
    #[serde(default)]
    pub last_name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default, deserialize_with = "deserialize_some")]
    pub phone: Option<Option<String>>,
    #[serde(default, deserialize_with = "deserialize_some")]
    pub company: Option<Option<String>>,
    #[serde(default, deserialize_with = "deserialize_some")]
    pub job_title: Option<Option<String>>,
    #[serde(default)]
    pub source: Option<LeadSource>,
    #[serde(default)]
    pub status: Option<LeadStatus>,
    #[serde(default)]
    pub score: Option<i32>,
    #[serde(default, deserialize_with = "deserialize_some")]
    pub notes: Option<Option<String>>,
    #[serde(default, deserialize_with = "deserialize_some")]
    pub assigned_to: Option<Option<String>>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LeadStats {
    pub total: usize,
    pub by_status: BTreeMap<LeadStatus, usize>,
}

/// Lead descriptor.
#[derive(Debug, Clone, Copy, Default)]
pub struct LeadKind;

impl RecordKind for LeadKind {
    type Record = Lead;
    type Draft = NewLead;
    type Patch = LeadPatch;
    type Stats = LeadStats;

    const KIND: EntityKind = EntityKind::Lead;
    const SEARCH_FIELDS: &'static [SearchField] = &[
        SearchField::Text("first_name"),
        SearchField::Text("last_name"),
        SearchField::Text("email"),
        SearchField::Text("company"),
        SearchField::Text("phone"),
    ];
    const EXACT_FILTERS: &'static [(FilterOption, &'static str)] = &[
        (FilterOption::Status, "status"),
        (FilterOption::OwnerId, "created_by"),
        (FilterOption::AssignedTo, "assigned_to"),
    ];

    fn build(draft: NewLead, id: Uuid, created_by: Option<String>, now: DateTime<Utc>) -> Lead {
        Lead {
            id,
            first_name: draft.first_name.trim().to_string(),
            last_name: draft.last_name.trim().to_string(),
            email: draft.email.trim().to_string(),
            phone: clean_opt(draft.phone),
            company: clean_opt(draft.company),
            job_title: clean_opt(draft.job_title),
            source: draft.source.unwrap_or(LeadSource::Website),
            status: draft.status.unwrap_or(LeadStatus::New),
            score: draft.score.unwrap_or(0),
            notes: clean_opt(draft.notes),
            assigned_to: clean_opt(draft.assigned_to),
            created_by,
            created_at: now,
            updated_at: now,
        }
    }

    fn merge(lead: &mut Lead, patch: &LeadPatch) {
        if let Some(first_name) = &patch.first_name {
            lead.first_name = first_name.trim().to_string();
        }
        if let Some(last_name) = &patch.last_name {
            lead.last_name = last_name.trim().to_string();
        }
        if let Some(email) = &patch.email {
            lead.email = email.trim().to_string();
        }
        if let Some(phone) = &patch.phone {
            lead.phone = clean_opt(phone.clone());
        }
        if let Some(company) = &patch.company {
            lead.company = clean_opt(company.clone());
        }
        if let Some(job_title) = &patch.job_title {
            lead.job_title = clean_opt(job_title.clone());
        }
        if let Some(source) = patch.source {
            lead.source = source;
        }
        if let Some(status) = patch.status {
            lead.status = status;
        }
        if let Some(score) = patch.score {
            lead.score = score;
        }
        if let Some(notes) = &patch.notes {
            lead.notes = clean_opt(notes.clone());
        }
        if let Some(assigned_to) = &patch.assigned_to {
            lead.assigned_to = clean_opt(assigned_to.clone());
        }
    }

    fn validate(lead: &Lead) -> Result<(), ValidationError> {
        require_text("first_name", &lead.first_name)?;
        require_text("last_name", &lead.last_name)?;
        require_text("email", &lead.email)?;
        if !lead.email.contains('@') {
            return Err(ValidationError::Invalid {
                field: "email",
                reason: format!("'{}' is not an email address", lead.email),
            });
        }
        require_range("score", lead.score, 0, 100)
    }

    fn id(lead: &Lead) -> Uuid {
        lead.id
    }

    fn owner(lead: &Lead) -> Option<&str> {
        lead.created_by.as_deref()
    }

    fn created_at(lead: &Lead) -> DateTime<Utc> {
        lead.created_at
    }

    fn updated_at(lead: &Lead) -> DateTime<Utc> {
        lead.updated_at
    }

    fn touch(lead: &mut Lead, now: DateTime<Utc>) {
        lead.updated_at = now;
    }

    fn field<'a>(lead: &'a Lead, name: &str) -> FieldValue<'a> {
        match name {
            "first_name" => FieldValue::Text(&lead.first_name),
            "last_name" => FieldValue::Text(&lead.last_name),
            "email" => FieldValue::Text(&lead.email),
            "phone" => FieldValue::from_opt(lead.phone.as_deref()),
            "company" => FieldValue::from_opt(lead.company.as_deref()),
            "job_title" => FieldValue::from_opt(lead.job_title.as_deref()),
            "source" => FieldValue::Text(lead.source.as_str()),
            "status" => FieldValue::Text(lead.status.as_str()),
            "score" => FieldValue::Number(Decimal::from(lead.score)),
            "notes" => FieldValue::from_opt(lead.notes.as_deref()),
            "assigned_to" => FieldValue::from_opt(lead.assigned_to.as_deref()),
            "created_by" => FieldValue::from_opt(lead.created_by.as_deref()),
            _ => FieldValue::Missing,
        }
    }

    fn stats(leads: &[Lead]) -> LeadStats {
        let mut by_status: BTreeMap<LeadStatus, usize> =
            LeadStatus::ALL.into_iter().map(|s| (s, 0)).collect();
        for lead in leads {
            *by_status.entry(lead.status).or_default() += 1;
        }
        LeadStats {
            total: leads.len(),
            by_status,
        }
    }

    fn collection(collections: &Collections) -> &Vec<Lead> {
        &collections.leads
    }

    fn collection_mut(collections: &mut Collections) -> &mut Vec<Lead> {
        &mut collections.leads
    }
}
