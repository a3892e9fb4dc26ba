use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::ValidationError;
use crate::fallback::Collections;
use crate::records::{
    EntityKind, FieldValue, FilterOption, RecordKind, SearchField, clean_opt, deserialize_some,
    normalize_tags, require_range, require_text,
};

pub const DEFAULT_CURRENCY: &str = "USD";

/// Pipeline position of a deal. Declaration order is pipeline order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DealStage {
    Prospecting,
    Qualification,
    Proposal,
    Negotiation,
    ClosedWon,
    ClosedLost,
}

impl DealStage {
    pub const ALL: [Self; 6] = [
        Self::Prospecting,
        Self::Qualification,
        Self::Proposal,
        Self::Negotiation,
        Self::ClosedWon,
        Self::ClosedLost,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Prospecting => "prospecting",
            Self::Qualification => "qualification",
            Self::Proposal => "proposal",
            Self::Negotiation => "negotiation",
            Self::ClosedWon => "closed_won",
            Self::ClosedLost => "closed_lost",
        }
    }

    pub fn is_closed(self) -> bool {
        matches!(self, Self::ClosedWon | Self::ClosedLost)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Deal {
    pub id: Uuid,
    pub title: String,
    pub description: Option<String>,
    pub amount: Decimal,
    pub currency: String,
    pub stage: DealStage,
    pub probability: i32,
    pub expected_close_date: Option<NaiveDate>,
    /// Set by the stage policy when the deal closes.
    pub actual_close_date: Option<DateTime<Utc>>,
    pub customer_id: Option<String>,
    pub lead_id: Option<Uuid>,
    pub assigned_to: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    pub notes: Option<String>,
    pub created_by: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct NewDeal {
    pub title: String,
    pub description: Option<String>,
    pub amount: Option<Decimal>,
    pub currency: Option<String>,
    pub stage: Option<DealStage>,
    pub probability: Option<i32>,
    pub expected_close_date: Option<NaiveDate>,
    pub customer_id: Option<String>,
    pub lead_id: Option<Uuid>,
    pub assigned_to: Option<String>,
    pub tags: Vec<String>,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct DealPatch {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default, deserialize_with = "deserialize_some")]
    pub description: Option<Option<String>>,
    #[serde(default)]
    pub amount: Option<Decimal>,
    #[serde(default)]
    pub currency: Option<String>,
    #[serde(default)]
    pub stage: Option<DealStage>,
    #[serde(default)]
    pub probability: Option<i32>,
    #[serde(default, deserialize_with = "deserialize_some")]
    pub expected_close_date: Option<Option<NaiveDate>>,
    #[serde(default, deserialize_with = "deserialize_some")]
    pub customer_id: Option<Option<String>>,
    #[serde(default, deserialize_with = "deserialize_some")]
    pub lead_id: Option<Option<Uuid>>,
    #[serde(default, deserialize_with = "deserialize_some")]
    pub assigned_to: Option<Option<String>>,
    #[serde(default)]
    pub tags: Option<Vec<String>>,
    #[serde(default, deserialize_with = "deserialize_some")]
    pub notes: Option<Option<String>>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DealStats {
    pub total: usize,
    pub total_value: Decimal,
    pub won_value: Decimal,
    /// Zero when there are no deals.
    pub average_deal_size: Decimal,
    /// Percentage of deals in `closed_won`; zero when there are no deals.
    pub win_rate: Decimal,
    pub by_stage: BTreeMap<DealStage, usize>,
}

fn normalize_currency(raw: &str) -> String {
    raw.trim().to_ascii_uppercase()
}

/// Sums past `Decimal::MAX` stick at `Decimal::MAX`.
fn saturating_add(sum: Decimal, amount: Decimal) -> Decimal {
    sum.checked_add(amount).unwrap_or(Decimal::MAX)
}

/// `numerator / denominator` rounded to cents, or zero for an empty denominator.
fn ratio(numerator: Decimal, denominator: usize) -> Decimal {
    if denominator == 0 {
        return Decimal::ZERO;
    }
    (numerator / Decimal::from(denominator)).round_dp(2)
}

/// Deal descriptor.
#[derive(Debug, Clone, Copy, Default)]
pub struct DealKind;

impl RecordKind for DealKind {
    type Record = Deal;
    type Draft = NewDeal;
    type Patch = DealPatch;
    type Stats = DealStats;

    const KIND: EntityKind = EntityKind::Deal;
    const SEARCH_FIELDS: &'static [SearchField] = &[
        SearchField::Text("title"),
        SearchField::Text("description"),
        SearchField::Text("notes"),
    ];
    const EXACT_FILTERS: &'static [(FilterOption, &'static str)] = &[
        (FilterOption::Stage, "stage"),
        (FilterOption::CustomerId, "customer_id"),
        (FilterOption::OwnerId, "created_by"),
        (FilterOption::AssignedTo, "assigned_to"),
    ];
    const AMOUNT_FIELD: Option<&'static str> = Some("amount");

    fn build(draft: NewDeal, id: Uuid, created_by: Option<String>, now: DateTime<Utc>) -> Deal {
        Deal {
            id,
            title: draft.title.trim().to_string(),
            description: clean_opt(draft.description),
            amount: draft.amount.unwrap_or(Decimal::ZERO),
            currency: draft
                .currency
                .as_deref()
                .map(normalize_currency)
                .filter(|c| !c.is_empty())
                .unwrap_or_else(|| DEFAULT_CURRENCY.to_string()),
            stage: draft.stage.unwrap_or(DealStage::Prospecting),
            probability: draft.probability.unwrap_or(0),
            expected_close_date: draft.expected_close_date,
            actual_close_date: None,
            customer_id: clean_opt(draft.customer_id),
            lead_id: draft.lead_id,
            assigned_to: clean_opt(draft.assigned_to),
            tags: normalize_tags(draft.tags),
            notes: clean_opt(draft.notes),
            created_by,
            created_at: now,
            updated_at: now,
        }
    }

    fn merge(deal: &mut Deal, patch: &DealPatch) {
        if let Some(title) = &patch.title {
            deal.title = title.trim().to_string();
        }
        if let Some(description) = &patch.description {
            deal.description = clean_opt(description.clone());
        }
        if let Some(amount) = patch.amount {
            deal.amount = amount;
        }
        if let Some(currency) = &patch.currency {
            deal.currency = normalize_currency(currency);
        }
        if let Some(stage) = patch.stage {
            deal.stage = stage;
        }
        if let Some(probability) = patch.probability {
            deal.probability = probability;
        }
        if let Some(expected) = patch.expected_close_date {
            deal.expected_close_date = expected;
        }
        if let Some(customer_id) = &patch.customer_id {
            deal.customer_id = clean_opt(customer_id.clone());
        }
        if let Some(lead_id) = patch.lead_id {
            deal.lead_id = lead_id;
        }
        if let Some(assigned_to) = &patch.assigned_to {
            deal.assigned_to = clean_opt(assigned_to.clone());
        }
        if let Some(tags) = &patch.tags {
            deal.tags = normalize_tags(tags.clone());
        }
        if let Some(notes) = &patch.notes {
            deal.notes = clean_opt(notes.clone());
        }
    }

    fn validate(deal: &Deal) -> Result<(), ValidationError> {
        require_text("title", &deal.title)?;
        if deal.amount < Decimal::ZERO {
            return Err(ValidationError::Negative { field: "amount" });
        }
        if deal.currency.len() != 3 || !deal.currency.chars().all(|c| c.is_ascii_uppercase()) {
            return Err(ValidationError::Invalid {
                field: "currency",
                reason: format!("'{}' is not a three-letter currency code", deal.currency),
            });
        }
        require_range("probability", deal.probability, 0, 100)
    }

    fn id(deal: &Deal) -> Uuid {
        deal.id
    }

    fn owner(deal: &Deal) -> Option<&str> {
        deal.created_by.as_deref()
    }

    fn created_at(deal: &Deal) -> DateTime<Utc> {
        deal.created_at
    }

    fn updated_at(deal: &Deal) -> DateTime<Utc> {
        deal.updated_at
    }

    fn touch(deal: &mut Deal, now: DateTime<Utc>) {
        deal.updated_at = now;
    }

    fn field<'a>(deal: &'a Deal, name: &str) -> FieldValue<'a> {
        match name {
            "title" => FieldValue::Text(&deal.title),
            "description" => FieldValue::from_opt(deal.description.as_deref()),
            "amount" => FieldValue::Number(deal.amount),
            "currency" => FieldValue::Text(&deal.currency),
            "stage" => FieldValue::Text(deal.stage.as_str()),
            "probability" => FieldValue::Number(Decimal::from(deal.probability)),
            "customer_id" => FieldValue::from_opt(deal.customer_id.as_deref()),
            "assigned_to" => FieldValue::from_opt(deal.assigned_to.as_deref()),
            "tags" => FieldValue::List(&deal.tags),
            "notes" => FieldValue::from_opt(deal.notes.as_deref()),
            "created_by" => FieldValue::from_opt(deal.created_by.as_deref()),
            _ => FieldValue::Missing,
        }
    }

    fn stats(deals: &[Deal]) -> DealStats {
        let mut by_stage: BTreeMap<DealStage, usize> =
            DealStage::ALL.into_iter().map(|s| (s, 0)).collect();
        let mut total_value = Decimal::ZERO;
        let mut won_value = Decimal::ZERO;

        for deal in deals {
            *by_stage.entry(deal.stage).or_default() += 1;
            total_value = saturating_add(total_value, deal.amount);
            if deal.stage == DealStage::ClosedWon {
                won_value = saturating_add(won_value, deal.amount);
            }
        }

        let won_count = by_stage[&DealStage::ClosedWon];
        DealStats {
            total: deals.len(),
            total_value,
            won_value,
            average_deal_size: ratio(total_value, deals.len()),
            win_rate: ratio(Decimal::from(won_count) * Decimal::ONE_HUNDRED, deals.len()),
            by_stage,
        }
    }

    fn collection(collections: &Collections) -> &Vec<Deal> {
        &collections.deals
    }

    fn collection_mut(collections: &mut Collections) -> &mut Vec<Deal> {
        &mut collections.deals
    }
}
