//! End-to-end batch runs

use std::collections::BTreeSet;

use chrono::{DateTime, Duration, TimeZone, Utc};
use serde_json::json;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use cdp_core::{
    CandidateContact, ContactType, ExtractionMethod, ListingPayload, MatchType, PipelineConfig,
    ResolutionStrategy, ValidationStatus,
};
use cdp_pipeline::{ContactPipeline, PipelineReport};

fn extracted_at() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 5, 4, 9, 30, 0).unwrap()
}

/// Candidates that differ only where a test says so
fn candidate(
    contact_type: ContactType,
    raw: &str,
    method: ExtractionMethod,
    confidence: f32,
    context: &str,
) -> CandidateContact {
    CandidateContact::new(contact_type, raw, method, confidence, "listing-42")
        .with_context(context)
        .with_timestamp(Some(extracted_at()))
}

async fn run(config: PipelineConfig, prior: Vec<CandidateContact>) -> PipelineReport {
    ContactPipeline::new(config)
        .unwrap()
        .at(extracted_at())
        .run(Vec::new(), prior, &CancellationToken::new())
        .await
        .unwrap()
}

fn assert_partition(report: &PipelineReport) {
    let mut seen = BTreeSet::new();
    for cluster in &report.clusters {
        for id in &cluster.members {
            assert!(seen.insert(*id), "candidate {id} in two clusters");
        }
    }
    for id in &report.excluded {
        assert!(seen.insert(*id), "excluded candidate {id} was clustered");
    }
    assert_eq!(seen.len(), report.candidates.len());
    assert_eq!(report.resolutions.len(), report.clusters.len());
}

#[tokio::test]
async fn test_scenario_a_phone_formats_are_exact_duplicates() {
    let local = candidate(ContactType::Phone, "0176 12345678", ExtractionMethod::FreeText, 0.6, "Tel.");
    let international =
        candidate(ContactType::Phone, "+4917612345678", ExtractionMethod::FreeText, 0.8, "Tel.");
    let international_id = international.id;

    let report = run(PipelineConfig::default(), vec![local, international]).await;
    assert_partition(&report);

    assert!(report
        .candidates
        .iter()
        .all(|c| c.normalized_value == "+4917612345678"));

    assert_eq!(report.clusters.len(), 1);
    let cluster = &report.clusters[0];
    assert_eq!(cluster.len(), 2);
    assert_eq!(cluster.matches[0].match_type, MatchType::Exact);

    let resolution = &report.resolutions[0];
    assert_eq!(resolution.strategy, ResolutionStrategy::KeepBest);
    assert!(!resolution.requires_manual_review);
    assert_eq!(resolution.merge_conflicts(), 1);
    assert_eq!(resolution.resolved_record.as_ref().unwrap().id, international_id);
}

#[tokio::test]
async fn test_scenario_b_gmail_variants_are_exact_duplicates() {
    let tagged = candidate(
        ContactType::Email,
        "Max.Mustermann+flat@gmail.com",
        ExtractionMethod::HtmlLink,
        0.9,
        "mailto",
    );
    let plain = candidate(
        ContactType::Email,
        "maxmustermann@gmail.com",
        ExtractionMethod::HtmlLink,
        0.9,
        "mailto",
    );

    let report = run(PipelineConfig::default(), vec![tagged, plain]).await;
    assert_partition(&report);

    assert_eq!(report.candidates[0].normalized_value, "maxmustermann@gmail.com");
    assert_eq!(report.candidates[1].normalized_value, "maxmustermann@gmail.com");
    assert_eq!(report.clusters.len(), 1);
    assert_eq!(report.clusters[0].matches[0].match_type, MatchType::Exact);
    assert!(report.resolutions[0].resolved_record.is_some());
}

#[tokio::test]
async fn test_scenario_c_empty_value_is_reported_but_not_clustered() {
    let empty = candidate(ContactType::Email, "", ExtractionMethod::FreeText, 0.5, "");
    let empty_id = empty.id;
    let valid = candidate(
        ContactType::Email,
        "anna.schmidt@example.de",
        ExtractionMethod::FreeText,
        0.7,
        "E-Mail",
    );

    let report = run(PipelineConfig::default(), vec![empty, valid]).await;
    assert_partition(&report);

    assert_eq!(
        report.candidate(empty_id).unwrap().validation_status,
        ValidationStatus::Invalid
    );
    assert_eq!(report.excluded, vec![empty_id]);
    assert!(report.clusters.iter().all(|c| !c.members.contains(&empty_id)));
    assert!(report
        .resolutions
        .iter()
        .filter_map(|r| r.resolved_record.as_ref())
        .all(|r| r.id != empty_id));

    assert_eq!(report.quality.count, 2);
    let score = report
        .quality
        .scores
        .iter()
        .find(|s| s.candidate_id == empty_id)
        .unwrap();
    assert_eq!(score.dimensions.completeness, 0.0);
}

/// Prior candidate with a settled status, a fixed id and its own age
fn settled(
    id: u128,
    confidence: f32,
    age_days: i64,
    status: ValidationStatus,
) -> CandidateContact {
    let mut c = candidate(
        ContactType::Phone,
        "+4917612345678",
        ExtractionMethod::FreeText,
        confidence,
        "Tel.",
    )
    .with_id(Uuid::from_u128(id))
        .with_timestamp(Some(extracted_at() - Duration::days(age_days)));
    c.validation_status = status;
    c
}

#[tokio::test]
async fn test_scenario_d_conflicting_merge_is_escalated() {
    // Folding in id order overwrites confidence, timestamp and status
    let members = vec![
        settled(1, 0.5, 3, ValidationStatus::Uncertain),
        settled(2, 0.9, 1, ValidationStatus::Valid),
        settled(3, 0.7, 2, ValidationStatus::Uncertain),
        settled(4, 0.8, 0, ValidationStatus::Valid),
    ];

    let mut config = PipelineConfig::default();
    config.resolution.strategy = ResolutionStrategy::Merge;

    let report = run(config, members).await;
    assert_partition(&report);

    assert_eq!(report.clusters.len(), 1);
    assert_eq!(report.clusters[0].len(), 4);

    let resolution = &report.resolutions[0];
    assert_eq!(resolution.merge_conflicts(), 3);
    assert!(resolution.requires_manual_review);
    assert_eq!(resolution.strategy, ResolutionStrategy::ManualReview);
    assert_eq!(resolution.requested_strategy, ResolutionStrategy::Merge);
    assert!(resolution.resolved_record.is_none());
    assert_eq!(
        resolution.suggested_record.as_ref().unwrap().id,
        Uuid::from_u128(1)
    );
    // Three conflicts, and the merge base was not the best member
    assert!((resolution.resolution_confidence - 0.5).abs() < 1e-6);
    assert_eq!(report.manual_reviews().count(), 1);
}

#[tokio::test]
async fn test_listing_run_clusters_contacts_across_extractors() {
    let listing = ListingPayload::new("listing-7")
        .with_description("Rufen Sie an: 030 1234567")
        .with_html(r#"<a href="mailto:kontakt@example.de">Schreiben Sie uns</a>"#)
        .with_structured(json!({
            "contact": { "phone": "+49 30 1234567", "email": "kontakt@example.de" }
        }));

    let pipeline = ContactPipeline::new(PipelineConfig::default()).unwrap();
    let report = pipeline
        .run(vec![listing], Vec::new(), &CancellationToken::new())
        .await
        .unwrap();
    assert_partition(&report);

    assert!(report.extraction_failures.is_empty());
    assert_eq!(report.quality.count, report.candidates.len());
    assert!(report
        .candidates
        .iter()
        .all(|c| c.validation_status != ValidationStatus::Pending));

    let phones: Vec<_> = report
        .candidates
        .iter()
        .filter(|c| c.contact_type == ContactType::Phone)
        .map(|c| c.id)
        .collect();
    assert!(phones.len() >= 2);

    let cluster = report
        .clusters
        .iter()
        .find(|c| c.members.contains(&phones[0]))
        .unwrap();
    assert!(phones.iter().all(|id| cluster.members.contains(id)));

    // Sightings of one number by different extractors collapse automatically
    let resolution = report
        .resolutions
        .iter()
        .find(|r| r.cluster_id == cluster.id)
        .unwrap();
    assert!(!resolution.requires_manual_review);
    assert_eq!(resolution.strategy, ResolutionStrategy::KeepBest);
    assert_eq!(
        resolution.resolved_record.as_ref().unwrap().normalized_value,
        "+49301234567"
    );
}
