//! Facade behaviour when no remote store is configured.
//!
//! Every operation runs on the fallback store and must say so through the
//! envelope flag.

mod support;

use std::sync::Arc;

use bytes::Bytes;
use pretty_assertions::assert_eq;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use uuid::Uuid;

use crm_records::CrmServices;
use crm_records::db::NoRemote;
use crm_records::error::ServiceError;
use crm_records::fallback::FallbackStore;
use crm_records::records::filter::{compile, matches_all};
use crm_records::records::{
    DealKind, DealPatch, DealStage, DocumentCategory, LeadPatch, NewDeal, NewLead,
    RecordFilter, RelatedToType,
};
use crm_records::service::{DocumentDetails, Upload};

fn offline(fallback: FallbackStore) -> (CrmServices, Arc<crm_records::blob::MemoryBlobStore>) {
    let blobs = support::blob_store();
    let services = support::services(
        Arc::new(NoRemote),
        Arc::new(fallback),
        Some("owner-1"),
        Arc::clone(&blobs),
    );
    (services, blobs)
}

fn seeded() -> CrmServices {
    offline(FallbackStore::seeded().expect("fixtures")).0
}

fn prospect(title: &str, amount: Decimal) -> NewDeal {
    NewDeal {
        title: title.to_string(),
        amount: Some(amount),
        stage: Some(DealStage::Prospecting),
        ..NewDeal::default()
    }
}

#[tokio::test]
async fn deal_lifecycle_updates_stats() {
    let (services, _) = offline(FallbackStore::default());
    let deals = &services.deals;

    let before = deals.stats().await.into_result().expect("stats");
    assert_eq!(before.total, 0);
    assert_eq!(before.average_deal_size, Decimal::ZERO);
    assert_eq!(before.win_rate, Decimal::ZERO);

    let created = deals.create(prospect("X", dec!(1000))).await;
    assert!(created.is_fallback());
    let deal = created.into_result().expect("deal");
    assert_eq!(deal.probability, 0);
    assert_eq!(deal.actual_close_date, None);

    let stats = deals.stats().await.into_result().expect("stats");
    assert!(stats.total >= 1);
    assert_eq!(stats.total_value, before.total_value + dec!(1000));
    assert_eq!(stats.won_value, before.won_value);
    assert_eq!(stats.win_rate, before.win_rate);

    let patch = DealPatch {
        stage: Some(DealStage::ClosedWon),
        ..DealPatch::default()
    };
    let closed = deals.update(deal.id, &patch).await.into_result().expect("closed");
    assert_eq!(closed.probability, 100);
    assert!(closed.actual_close_date.is_some());

    let after = deals.stats().await.into_result().expect("stats");
    assert_eq!(after.won_value, stats.won_value + dec!(1000));
    assert_eq!(after.win_rate, dec!(100));
    assert_eq!(after.by_stage[&DealStage::ClosedWon], 1);
}

#[tokio::test]
async fn deleting_a_missing_id_reports_error_without_mutation() {
    let services = seeded();
    let before = services.leads.list(&RecordFilter::default()).await;
    let before = before.value().expect("leads").clone();

    let envelope = services.leads.delete(Uuid::new_v4()).await.into_envelope();
    assert!(envelope.error);
    assert!(envelope.using_fallback_data);
    assert!(envelope.message.expect("message").contains("not found"));

    let after = services.leads.list(&RecordFilter::default()).await;
    assert_eq!(after.value().expect("leads"), &before);
}

#[tokio::test]
async fn search_finds_company_and_excludes_unrelated_leads() {
    let services = seeded();
    let unrelated = services
        .leads
        .create(NewLead {
            first_name: "Bruno".to_string(),
            last_name: "Lima".to_string(),
            email: "bruno@bakery.example".to_string(),
            company: Some("Corner Bakery".to_string()),
            ..NewLead::default()
        })
        .await
        .into_result()
        .expect("lead");

    let found = services
        .leads
        .list(&RecordFilter::search("tech"))
        .await
        .into_result()
        .expect("search");
    assert!(
        found
            .iter()
            .any(|lead| lead.company.as_deref() == Some("Tech Solutions Ltd"))
    );
    assert!(found.iter().all(|lead| lead.id != unrelated.id));
}

#[tokio::test]
async fn create_then_get_round_trips() {
    let services = seeded();
    let draft = NewLead {
        first_name: "Carla".to_string(),
        last_name: "Nunes".to_string(),
        email: "carla@example.com".to_string(),
        company: Some("Nunes & Filhos".to_string()),
        score: Some(64),
        ..NewLead::default()
    };
    let created = services.leads.create(draft).await.into_result().expect("lead");
    let fetched = services
        .leads
        .get(created.id)
        .await
        .into_result()
        .expect("get");
    assert_eq!(fetched, created);
    assert_eq!(fetched.first_name, "Carla");
    assert_eq!(fetched.score, 64);
    assert_eq!(fetched.created_by.as_deref(), Some("owner-1"));
    assert_eq!(fetched.created_at, fetched.updated_at);
}

#[tokio::test]
async fn empty_update_changes_only_updated_at() {
    let services = seeded();
    let leads = services
        .leads
        .list(&RecordFilter::default())
        .await
        .into_result()
        .expect("leads");
    let original = leads[0].clone();

    let updated = services
        .leads
        .update(original.id, &LeadPatch::default())
        .await
        .into_result()
        .expect("update");
    let mut expected = original.clone();
    expected.updated_at = updated.updated_at;
    assert_eq!(updated, expected);
    assert!(updated.updated_at >= original.updated_at);
}

#[tokio::test]
async fn closed_stages_always_carry_probability_and_close_date() {
    let services = seeded();
    let deal = services
        .deals
        .create(prospect("Pipeline walk", dec!(500)))
        .await
        .into_result()
        .expect("deal");

    let sequence = [
        DealStage::Qualification,
        DealStage::ClosedLost,
        DealStage::Negotiation,
        DealStage::ClosedWon,
        DealStage::Proposal,
        DealStage::ClosedWon,
    ];
    for stage in sequence {
        let patch = DealPatch {
            stage: Some(stage),
            probability: Some(30),
            ..DealPatch::default()
        };
        services
            .deals
            .update(deal.id, &patch)
            .await
            .into_result()
            .expect("update");
    }

    let all = services
        .deals
        .list(&RecordFilter::default())
        .await
        .into_result()
        .expect("deals");
    for deal in all.iter().filter(|d| d.stage.is_closed()) {
        assert_eq!(deal.probability, 100, "{}", deal.title);
        assert!(deal.actual_close_date.is_some(), "{}", deal.title);
    }
}

#[tokio::test]
async fn probability_only_patch_keeps_closed_deal_at_full_probability() {
    let (services, _) = offline(FallbackStore::default());
    let deal = services
        .deals
        .create(prospect("Closed early", dec!(750)))
        .await
        .into_result()
        .expect("deal");
    let won = services
        .deals
        .update(
            deal.id,
            &DealPatch {
                stage: Some(DealStage::ClosedWon),
                ..DealPatch::default()
            },
        )
        .await
        .into_result()
        .expect("won");

    let patched = services
        .deals
        .update(
            deal.id,
            &DealPatch {
                probability: Some(40),
                ..DealPatch::default()
            },
        )
        .await
        .into_result()
        .expect("patched");
    assert_eq!(patched.stage, DealStage::ClosedWon);
    assert_eq!(patched.probability, 100);
    assert_eq!(patched.actual_close_date, won.actual_close_date);
}

#[tokio::test]
async fn stats_over_huge_amounts_saturate() {
    let (services, _) = offline(FallbackStore::default());
    for title in ["Big one", "Big two"] {
        services
            .deals
            .create(prospect(title, Decimal::MAX - Decimal::ONE))
            .await
            .into_result()
            .expect("deal");
    }
    let stats = services.deals.stats().await.into_result().expect("stats");
    assert_eq!(stats.total, 2);
    assert_eq!(stats.total_value, Decimal::MAX);
    assert_eq!(stats.won_value, Decimal::ZERO);
}

#[tokio::test]
async fn filter_results_are_ordered_subsequences() {
    let services = seeded();
    let all = services
        .deals
        .list(&RecordFilter::default())
        .await
        .into_result()
        .expect("deals");

    let filters = [
        RecordFilter::search("tech"),
        RecordFilter {
            stage: Some("proposal".to_string()),
            ..RecordFilter::default()
        },
        RecordFilter {
            min_amount: Some(dec!(5000)),
            max_amount: Some(dec!(20000)),
            ..RecordFilter::default()
        },
        RecordFilter {
            stage: Some("all".to_string()),
            search: Some("a".to_string()),
            min_amount: Some(dec!(1)),
            ..RecordFilter::default()
        },
    ];
    for filter in &filters {
        let found = services
            .deals
            .list(filter)
            .await
            .into_result()
            .expect("filtered");
        let conditions = compile::<DealKind>(filter);
        let expected: Vec<Uuid> = all
            .iter()
            .filter(|deal| matches_all::<DealKind>(deal, &conditions))
            .map(|deal| deal.id)
            .collect();
        let ids: Vec<Uuid> = found.iter().map(|deal| deal.id).collect();
        assert_eq!(ids, expected, "{filter:?}");
    }
}

#[tokio::test]
async fn validation_failures_are_reported_not_corrected() {
    let services = seeded();
    let outcome = services
        .deals
        .create(NewDeal {
            title: "Bad".to_string(),
            amount: Some(dec!(-5)),
            ..NewDeal::default()
        })
        .await;
    assert!(matches!(
        outcome.into_result(),
        Err(ServiceError::Validation(_))
    ));

    let lead_outcome = services
        .leads
        .create(NewLead {
            first_name: "No".to_string(),
            last_name: "Email".to_string(),
            ..NewLead::default()
        })
        .await;
    assert!(lead_outcome.is_err());
}

#[tokio::test]
async fn document_upload_download_and_delete() {
    let (services, blobs) = offline(FallbackStore::default());
    let docs = &services.documents;

    let uploaded = docs
        .upload(
            Upload {
                file_name: "Master Agreement.pdf".to_string(),
                content_type: None,
                bytes: Bytes::from_static(b"%PDF-1.7"),
            },
            DocumentDetails {
                category: Some(DocumentCategory::Contract),
                tags: vec!["signed".to_string(), "signed".to_string()],
                related_to_type: Some(RelatedToType::Deal),
                related_to_id: Some("deal-42".to_string()),
                ..DocumentDetails::default()
            },
        )
        .await;
    assert!(uploaded.is_fallback());
    let document = uploaded.into_result().expect("upload");
    assert_eq!(document.name, "Master Agreement.pdf");
    assert_eq!(document.file_type, "application/pdf");
    assert_eq!(document.file_size, 8);
    assert_eq!(document.tags, vec!["signed"]);
    assert!(document.file_path.starts_with("deal/"));
    assert!(document.file_path.ends_with("-Master-Agreement.pdf"));

    let url = docs
        .download_url(document.id, None)
        .await
        .into_result()
        .expect("url");
    assert_eq!(blobs.open(&url).expect("open"), Bytes::from_static(b"%PDF-1.7"));

    let stats = docs.records().stats().await.into_result().expect("stats");
    assert_eq!(stats.total, 1);
    assert_eq!(stats.total_size, 8);

    docs.delete(document.id).await.into_result().expect("delete");
    assert!(blobs.open(&url).is_err());
    assert!(blobs.is_empty());
    assert!(docs.records().get(document.id).await.is_err());
}

#[tokio::test]
async fn failed_document_record_removes_its_blob() {
    let (services, blobs) = offline(FallbackStore::default());
    let outcome = services
        .documents
        .upload(
            Upload {
                file_name: "orphan.txt".to_string(),
                content_type: Some("text/plain".to_string()),
                bytes: Bytes::from_static(b"hello"),
            },
            DocumentDetails {
                related_to_id: Some("lead-1".to_string()),
                ..DocumentDetails::default()
            },
        )
        .await;
    assert!(matches!(
        outcome.into_result(),
        Err(ServiceError::Validation(_))
    ));
    assert_eq!(
        services
            .documents
            .records()
            .stats()
            .await
            .into_result()
            .expect("stats")
            .total,
        0
    );
    assert!(blobs.is_empty());
}

#[tokio::test]
async fn lead_stats_track_status_changes() {
    let (services, _) = offline(FallbackStore::default());
    let lead = services
        .leads
        .create(NewLead {
            first_name: "Dora".to_string(),
            last_name: "Reis".to_string(),
            email: "dora@example.com".to_string(),
            ..NewLead::default()
        })
        .await
        .into_result()
        .expect("lead");
    let stats = services.leads.stats().await.into_result().expect("stats");
    assert_eq!(stats.total, 1);

    let patch: LeadPatch = serde_json::from_str(r#"{"status":"qualified","company":null}"#)
        .expect("patch");
    services
        .leads
        .update(lead.id, &patch)
        .await
        .into_result()
        .expect("update");
    let stats = services.leads.stats().await.into_result().expect("stats");
    let json = serde_json::to_value(&stats).expect("json");
    assert_eq!(json["by_status"]["qualified"], 1);
    assert_eq!(json["by_status"]["new"], 0);
}

#[tokio::test]
async fn fallback_stores_are_isolated_per_instance() {
    let first = seeded();
    let second = seeded();
    let lead = first
        .leads
        .create(NewLead {
            first_name: "Iso".to_string(),
            last_name: "Lated".to_string(),
            email: "iso@example.com".to_string(),
            ..NewLead::default()
        })
        .await
        .into_result()
        .expect("lead");
    assert!(second.leads.get(lead.id).await.is_err());
}
