//! Integration tests for committed record storage and export.
//!
//! Tests cover:
//! - Patient/supplement registration and barcode lookup
//! - Record queries by patient, supplement and time window, newest first
//! - Records referencing the wrong patient are never stored
//! - Committed records cannot be edited or deleted
//! - CSV export

mod common;

use pillcount::export::{to_csv_string, CSV_HEADER};
use pillcount::reconcile;
use sqlx::sqlite::SqliteConnectOptions;
use sqlx::{ConnectOptions, Connection};
use time::{Duration, OffsetDateTime};

use common::*;

fn ai_record(count: u32, confidence: f64) -> ReconciledRecord {
    ReconciledRecord {
        final_count: count,
        final_confidence: Some(confidence),
        provenance: Provenance::Ai,
        ai_count: None,
        manual_reason: None,
    }
}

#[tokio::test]
async fn test_patient_and_barcode_lookup() -> anyhow::Result<()> {
    let (db, _temp_dir) = create_test_db().await;
    let patient = db
        .add_patient(&NewPatient {
            name: "Amina".to_string(),
            metadata: Some(r#"{"village":"Kisii"}"#.to_string()),
        })
        .await?;
    db.add_supplement(&NewSupplement {
        barcode: "8901234567890".to_string(),
        patient: patient.id,
        kind: "iron-folate".to_string(),
    })
    .await?;

    let found = db
        .find_supplement_by_barcode("8901234567890")
        .await?
        .expect("supplement by barcode");
    assert_eq!(found.patient, patient.id);
    assert_eq!(found.kind, "iron-folate");
    assert!(db.find_supplement_by_barcode("missing").await?.is_none());

    let loaded = db.get_patient_by_id(patient.id).await?.expect("patient");
    assert_eq!(loaded.name, "Amina");
    assert_eq!(loaded.metadata.as_deref(), Some(r#"{"village":"Kisii"}"#));
    assert_eq!(db.get_patients().await?.len(), 1);
    Ok(())
}

#[tokio::test]
async fn test_barcode_is_unique() -> anyhow::Result<()> {
    let (db, _temp_dir) = create_test_db().await;
    let (patient, _) = seed_patient(&db, "Amina", "BOTTLE-1").await?;

    let result = db
        .add_supplement(&NewSupplement {
            barcode: "BOTTLE-1".to_string(),
            patient,
            kind: "calcium".to_string(),
        })
        .await;

    assert!(result.is_err(), "duplicate barcode should be rejected");
    Ok(())
}

#[tokio::test]
async fn test_supplement_requires_existing_patient() -> anyhow::Result<()> {
    let (db, _temp_dir) = create_test_db().await;

    let result = db
        .add_supplement(&NewSupplement {
            barcode: "ORPHAN".to_string(),
            patient: PatientRef(999),
            kind: "calcium".to_string(),
        })
        .await;

    let error_msg = result.unwrap_err().to_string();
    assert!(
        error_msg.contains("FOREIGN KEY"),
        "Error should mention foreign key constraint, got: {}",
        error_msg
    );
    Ok(())
}

#[tokio::test]
async fn test_commit_and_get() -> anyhow::Result<()> {
    let (db, _temp_dir) = create_test_db().await;
    let (patient, supplement) = seed_patient(&db, "Amina", "BOTTLE-1").await?;
    let record = reconcile(
        Some(&AggregatedResult {
            count: 25,
            mean_confidence: 0.85,
            detections: Vec::new(),
        }),
        Some(&ManualOverride::new(30, "AI undercount")),
    )?;

    let before = OffsetDateTime::now_utc() - Duration::seconds(1);
    let id = db.commit(&record, patient, supplement).await?;
    let stored = db.get_record(id).await?.expect("committed record");

    assert_eq!(stored.id, id);
    assert_eq!(stored.record, record);
    assert!(stored.committed_at >= before);
    assert!(stored.committed_at <= OffsetDateTime::now_utc() + Duration::seconds(1));
    Ok(())
}

#[tokio::test]
async fn test_record_ids_are_unique() -> anyhow::Result<()> {
    let (db, _temp_dir) = create_test_db().await;
    let (patient, supplement) = seed_patient(&db, "Amina", "BOTTLE-1").await?;

    let a = db.commit(&ai_record(10, 0.9), patient, supplement).await?;
    let b = db.commit(&ai_record(10, 0.9), patient, supplement).await?;

    assert_ne!(a, b);
    assert_eq!(db.query(&RecordFilter::default()).await?.len(), 2);
    Ok(())
}

#[tokio::test]
async fn test_query_filters_and_order() -> anyhow::Result<()> {
    let (db, _temp_dir) = create_test_db().await;
    let (amina, amina_bottle) = seed_patient(&db, "Amina", "BOTTLE-1").await?;
    let (wanjiru, wanjiru_bottle) = seed_patient(&db, "Wanjiru", "BOTTLE-2").await?;

    let first = db.commit(&ai_record(30, 0.9), amina, amina_bottle).await?;
    db.commit(&ai_record(12, 0.7), wanjiru, wanjiru_bottle).await?;
    let last = db.commit(&ai_record(28, 0.8), amina, amina_bottle).await?;

    let all = db.query(&RecordFilter::default()).await?;
    assert_eq!(all.len(), 3);
    assert_eq!(all[0].id, last);
    assert_eq!(all[2].id, first);

    let for_amina = db
        .query(&RecordFilter {
            patient: Some(amina),
            ..Default::default()
        })
        .await?;
    let ids: Vec<CommittedRecordId> = for_amina.iter().map(|r| r.id).collect();
    assert_eq!(ids, vec![last, first]);

    let for_bottle = db
        .query(&RecordFilter {
            supplement: Some(wanjiru_bottle),
            ..Default::default()
        })
        .await?;
    assert_eq!(for_bottle.len(), 1);
    assert_eq!(for_bottle[0].record.final_count, 12);
    Ok(())
}

#[tokio::test]
async fn test_query_time_window() -> anyhow::Result<()> {
    let (db, _temp_dir) = create_test_db().await;
    let (patient, supplement) = seed_patient(&db, "Amina", "BOTTLE-1").await?;
    let id = db.commit(&ai_record(30, 0.9), patient, supplement).await?;
    let committed_at = db.get_record(id).await?.expect("record").committed_at;

    let exact = db
        .query(&RecordFilter {
            since: Some(committed_at),
            until: Some(committed_at),
            ..Default::default()
        })
        .await?;
    assert_eq!(exact.len(), 1, "bounds are inclusive");

    let future = db
        .query(&RecordFilter {
            since: Some(committed_at + Duration::minutes(1)),
            ..Default::default()
        })
        .await?;
    assert!(future.is_empty());

    let past = db
        .query(&RecordFilter {
            until: Some(committed_at - Duration::minutes(1)),
            ..Default::default()
        })
        .await?;
    assert!(past.is_empty());
    Ok(())
}

#[tokio::test]
async fn test_commit_rejects_mismatched_patient() -> anyhow::Result<()> {
    let (db, _temp_dir) = create_test_db().await;
    let (_amina, amina_bottle) = seed_patient(&db, "Amina", "BOTTLE-1").await?;
    let (wanjiru, _) = seed_patient(&db, "Wanjiru", "BOTTLE-2").await?;

    let result = db.commit(&ai_record(30, 0.9), wanjiru, amina_bottle).await;
    assert!(result.is_err());

    let missing = db
        .commit(&ai_record(30, 0.9), wanjiru, SupplementRef(404))
        .await;
    assert!(missing.is_err());

    assert!(db.query(&RecordFilter::default()).await?.is_empty());
    Ok(())
}

#[tokio::test]
async fn test_committed_records_are_immutable() -> anyhow::Result<()> {
    let dir = tempfile::TempDir::new()?;
    let path = dir.path().join("test.db");
    let db = PillDb::open(&path).await?;
    let (patient, supplement) = seed_patient(&db, "Amina", "BOTTLE-1").await?;
    let id = db.commit(&ai_record(30, 0.9), patient, supplement).await?;
    db.close().await?;

    let mut conn = SqliteConnectOptions::new().filename(&path).connect().await?;
    let update = sqlx::query("UPDATE record SET final_count = 31 WHERE id = $1")
        .bind(id.to_string())
        .execute(&mut conn)
        .await;
    let delete = sqlx::query("DELETE FROM record WHERE id = $1")
        .bind(id.to_string())
        .execute(&mut conn)
        .await;
    conn.close().await?;

    for result in [update.map(|_| ()), delete.map(|_| ())] {
        let error_msg = result.unwrap_err().to_string();
        assert!(
            error_msg.contains("immutable"),
            "Error should come from the immutability trigger, got: {}",
            error_msg
        );
    }

    let db = PillDb::open(&path).await?;
    let stored = db.get_record(id).await?.expect("record survives");
    assert_eq!(stored.record.final_count, 30);
    Ok(())
}

#[tokio::test]
async fn test_reopen_keeps_records() -> anyhow::Result<()> {
    let dir = tempfile::TempDir::new()?;
    let path = dir.path().join("test.db");

    let db = PillDb::open(&path).await?;
    let (patient, supplement) = seed_patient(&db, "Amina", "BOTTLE-1").await?;
    let id = db.commit(&ai_record(30, 0.9), patient, supplement).await?;
    db.close().await?;

    let reopened = PillDb::open(&path).await?;
    assert!(reopened.get_record(id).await?.is_some());
    Ok(())
}

#[tokio::test]
async fn test_csv_export() -> anyhow::Result<()> {
    let (db, _temp_dir) = create_test_db().await;
    let (patient, supplement) = seed_patient(&db, "Amina", "BOTTLE-1").await?;
    db.commit(&ai_record(30, 0.9), patient, supplement).await?;
    let manual = reconcile(None, Some(&ManualOverride::new(28, "cap stuck, counted by hand")))?;
    let manual_id = db.commit(&manual, patient, supplement).await?;

    let csv = to_csv_string(&db.query(&RecordFilter::default()).await?)?;
    let lines: Vec<&str> = csv.lines().collect();

    assert_eq!(lines.len(), 3);
    assert_eq!(lines[0], CSV_HEADER);
    let expected_prefix = format!(
        "{},{},{},28,manual,,,\"cap stuck, counted by hand\",",
        manual_id, patient, supplement
    );
    assert!(lines[1].starts_with(&expected_prefix), "got: {}", lines[1]);
    assert!(lines[2].contains(",30,ai,0.9000,,,"), "got: {}", lines[2]);
    Ok(())
}
