use chrono::NaiveDate;
use hemicycle_core::models::{
    BallotRecord, DeputyProfile, DeputyRecord, DeputySummary, EndOfMandate,
};
use hemicycle_core::traits::IngestionStore;
use hemicycle_db::{Database, StoreStatus};

use crate::integration::common::setup_test_db;

fn deputy(id: &str) -> DeputyRecord {
    DeputyRecord {
        summary: DeputySummary {
            official_id: id.into(),
            first_name: "Anne".into(),
            last_name: format!("Petit{id}"),
            constituency: None,
        },
        profile: DeputyProfile::default(),
        mandates: None,
        instances: vec![],
        works: vec![],
        declarations: vec![],
        missing: vec![],
    }
}

fn ballot(id: &str) -> BallotRecord {
    BallotRecord {
        official_id: id.into(),
        title: "Motion de censure".into(),
        date: NaiveDate::from_ymd_opt(2023, 3, 20),
        kind: None,
        total_votes: None,
        yes_votes: None,
        no_votes: None,
        is_adopted: Some(false),
        file_url: None,
        analysis_url: None,
        theme: None,
        unclassified_theme: None,
        votes: vec![],
        non_voting: 0,
    }
}

#[tokio::test]
async fn status_counts_stored_records() {
    let (pool, _container) = setup_test_db().await;
    let db = Database::from_pool(pool);

    assert_eq!(
        db.status().await.unwrap(),
        StoreStatus {
            deputies: 0,
            active_deputies: 0,
            ballots: 0,
        }
    );

    let store = db.store();
    store.upsert_deputy(&deputy("1")).await.unwrap();
    store.upsert_deputy(&deputy("2")).await.unwrap();
    store.upsert_ballot(&ballot("3301")).await.unwrap();
    let end = EndOfMandate {
        date: NaiveDate::from_ymd_opt(2024, 6, 9),
        reason: "Dissolution".into(),
    };
    store.record_end_of_mandate("2", &end).await.unwrap();

    assert_eq!(
        db.status().await.unwrap(),
        StoreStatus {
            deputies: 2,
            active_deputies: 1,
            ballots: 1,
        }
    );
}

#[tokio::test]
async fn status_fails_without_schema() {
    let (pool, _container) = setup_test_db().await;
    sqlx::query("DROP TABLE ballots").execute(&pool).await.unwrap();

    let result = Database::from_pool(pool).status().await;
    assert!(matches!(result, Err(hemicycle_core::AppError::DatabaseError(_))));
}
