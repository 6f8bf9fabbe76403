use chrono::{Duration, NaiveDate, Utc};
use hemicycle_core::models::{
    BallotRecord, DeputyProfile, DeputyRecord, DeputySummary, EndOfMandate, ExtraInfo,
    InstanceRole, ThemeRef, UpsertOutcome, VoteEntry, VoteValue, WorkItemRecord, WorkKind,
};
use hemicycle_core::traits::IngestionStore;
use hemicycle_db::{Database, PgIngestionStore};

use crate::integration::common::setup_test_db;

fn deputy(id: &str, last_name: &str) -> DeputyRecord {
    DeputyRecord {
        summary: DeputySummary {
            official_id: id.into(),
            first_name: "Jean".into(),
            last_name: last_name.into(),
            constituency: Some("Ain (1ère)".into()),
        },
        profile: DeputyProfile {
            job: Some("Avocat".into()),
            ..DeputyProfile::default()
        },
        mandates: None,
        instances: vec![InstanceRole {
            instance: "Commission des lois".into(),
            role: Some("Membre".into()),
        }],
        works: vec![
            WorkItemRecord {
                external_id: "Q1".into(),
                date: NaiveDate::from_ymd_opt(2024, 2, 1),
                kind: WorkKind::Question,
                subtype: "Question écrite".into(),
                description: "Sur la pêche".into(),
                url: Some("https://example.com/q1".into()),
                theme: None,
                unclassified_theme: Some("Pêche maritime".into()),
                is_creation: false,
                extra_infos: vec![],
            },
            WorkItemRecord {
                external_id: "P1".into(),
                date: NaiveDate::from_ymd_opt(2024, 3, 12),
                kind: WorkKind::LawProposal,
                subtype: "Proposition de loi".into(),
                description: "Sur l'énergie".into(),
                url: None,
                theme: Some(ThemeRef {
                    id: 1,
                    name: "Énergie".into(),
                }),
                unclassified_theme: None,
                is_creation: true,
                extra_infos: vec![ExtraInfo {
                    label: "Rapporteur".into(),
                    value: "Mme Martin".into(),
                }],
            },
        ],
        declarations: vec![],
        missing: vec![],
    }
}

#[tokio::test]
async fn deputy_upsert_is_idempotent() {
    let (pool, _container) = setup_test_db().await;
    let store = PgIngestionStore::new(pool);
    let record = deputy("1012", "Dupont");

    assert_eq!(store.upsert_deputy(&record).await.unwrap(), UpsertOutcome::Created);
    assert_eq!(store.upsert_deputy(&record).await.unwrap(), UpsertOutcome::Unchanged);

    let mut changed = record.clone();
    changed.profile.job = Some("Médecin".into());
    assert_eq!(store.upsert_deputy(&changed).await.unwrap(), UpsertOutcome::Updated);

    let stored = store
        .find_deputy("1012")
        .await
        .unwrap()
        .expect("deputy should be stored");
    assert_eq!(stored.record, changed);
    assert_eq!(stored.last_work_date, NaiveDate::from_ymd_opt(2024, 3, 12));
    assert_eq!(stored.data_hash.len(), 64);
    assert!(store.find_deputy("404").await.unwrap().is_none());
}

#[tokio::test]
async fn unseen_deputies_and_end_of_mandate() {
    let (pool, _container) = setup_test_db().await;
    let store = Database::from_pool(pool).store();
    store.upsert_deputy(&deputy("1012", "Dupont")).await.unwrap();

    let cutoff = Utc::now() + Duration::seconds(1);
    let stale = store.deputies_not_seen_since(cutoff).await.unwrap();
    assert_eq!(stale.len(), 1);
    assert_eq!(stale[0].official_id, "1012");

    let end = EndOfMandate {
        date: NaiveDate::from_ymd_opt(2022, 6, 20),
        reason: "Fin de législature".into(),
    };
    store.record_end_of_mandate("1012", &end).await.unwrap();
    assert!(store.deputies_not_seen_since(cutoff).await.unwrap().is_empty());

    let stored = store.find_deputy("1012").await.unwrap().unwrap();
    assert_eq!(stored.record.profile.end_of_mandate, Some(end.clone()));
    assert!(store.record_end_of_mandate("404", &end).await.is_err());
}

#[tokio::test]
async fn unclassified_works_can_be_themed() {
    let (pool, _container) = setup_test_db().await;
    let store = PgIngestionStore::new(pool);
    store.upsert_deputy(&deputy("1012", "Dupont")).await.unwrap();

    let pending = store.unclassified_works().await.unwrap();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].work_id, "Q1");
    assert_eq!(pending[0].label, "Pêche maritime");
    assert_eq!(pending[0].url.as_deref(), Some("https://example.com/q1"));

    let theme = ThemeRef {
        id: 9,
        name: "Pêche".into(),
    };
    store.assign_work_theme("1012", "Q1", &theme).await.unwrap();
    assert!(store.unclassified_works().await.unwrap().is_empty());

    let stored = store.find_deputy("1012").await.unwrap().unwrap();
    let question = stored
        .record
        .works
        .iter()
        .find(|w| w.external_id == "Q1")
        .unwrap();
    assert_eq!(question.theme, Some(theme));
    assert_eq!(
        stored.data_hash,
        hemicycle_core::models::record_hash(&stored.record).unwrap()
    );
}

#[tokio::test]
async fn roster_is_sorted() {
    let (pool, _container) = setup_test_db().await;
    let store = PgIngestionStore::new(pool);
    for (id, name) in [("3", "Petit"), ("1", "Dupont"), ("2", "Martin")] {
        store.upsert_deputy(&deputy(id, name)).await.unwrap();
    }

    let roster = store.roster().await.unwrap();
    let names: Vec<_> = roster.iter().map(|r| r.last_name.as_str()).collect();
    assert_eq!(names, ["Dupont", "Martin", "Petit"]);
}

#[tokio::test]
async fn ballot_upsert_is_idempotent() {
    let (pool, _container) = setup_test_db().await;
    let store = PgIngestionStore::new(pool);
    let mut ballot = BallotRecord {
        official_id: "1201".into(),
        title: "Projet de loi pour la confiance".into(),
        date: NaiveDate::from_ymd_opt(2017, 8, 1),
        kind: Some("Scrutin public solennel".into()),
        total_votes: Some(486),
        yes_votes: Some(412),
        no_votes: Some(74),
        is_adopted: Some(true),
        file_url: None,
        analysis_url: None,
        theme: None,
        unclassified_theme: None,
        votes: vec![VoteEntry {
            deputy_name: "Jean Dupont".into(),
            official_id: Some("1012".into()),
            value: VoteValue::For,
        }],
        non_voting: 0,
    };

    assert_eq!(store.upsert_ballot(&ballot).await.unwrap(), UpsertOutcome::Created);
    assert_eq!(store.upsert_ballot(&ballot).await.unwrap(), UpsertOutcome::Unchanged);
    ballot.non_voting = 2;
    assert_eq!(store.upsert_ballot(&ballot).await.unwrap(), UpsertOutcome::Updated);
}
