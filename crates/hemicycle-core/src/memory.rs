//! In-process [`IngestionStore`], used for dry runs and tests.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{DateTime, Utc};

use crate::error::AppError;
use crate::models::{
    BallotRecord, DeputyRecord, EndOfMandate, RosterEntry, StoredDeputy, ThemeRef,
    UnclassifiedWork, UpsertOutcome, record_hash,
};
use crate::traits::IngestionStore;

#[derive(Default)]
struct State {
    deputies: HashMap<String, StoredDeputy>,
    /// Ballot and the hash of its last written form.
    ballots: HashMap<String, (BallotRecord, String)>,
}

/// Store keeping everything in a shared map. Clones share the same data.
#[derive(Clone, Default)]
pub struct MemoryStore {
    state: Arc<Mutex<State>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn ballot(&self, official_id: &str) -> Option<BallotRecord> {
        let state = self.state().ok()?;
        state.ballots.get(official_id).map(|(b, _)| b.clone())
    }

    pub fn deputy_count(&self) -> usize {
        self.state().map(|s| s.deputies.len()).unwrap_or(0)
    }

    pub fn ballot_count(&self) -> usize {
        self.state().map(|s| s.ballots.len()).unwrap_or(0)
    }

    /// Seed a deputy as if it had been written at `seen_at`.
    pub fn insert_deputy(
        &self,
        record: DeputyRecord,
        seen_at: DateTime<Utc>,
    ) -> Result<(), AppError> {
        let stored = StoredDeputy {
            data_hash: record_hash(&record)?,
            last_work_date: record.last_work_date(),
            last_seen_at: seen_at,
            record,
        };
        self.state()?
            .deputies
            .insert(stored.record.official_id().to_string(), stored);
        Ok(())
    }

    fn state(&self) -> Result<MutexGuard<'_, State>, AppError> {
        self.state
            .lock()
            .map_err(|_| AppError::Generic("memory store lock poisoned".into()))
    }

    fn rehash(stored: &mut StoredDeputy) -> Result<(), AppError> {
        stored.data_hash = record_hash(&stored.record)?;
        stored.last_work_date = stored.record.last_work_date();
        Ok(())
    }
}

impl IngestionStore for MemoryStore {
    async fn find_deputy(&self, official_id: &str) -> Result<Option<StoredDeputy>, AppError> {
        Ok(self.state()?.deputies.get(official_id).cloned())
    }

    async fn upsert_deputy(&self, record: &DeputyRecord) -> Result<UpsertOutcome, AppError> {
        let hash = record_hash(record)?;
        let now = Utc::now();
        let mut state = self.state()?;

        if let Some(existing) = state.deputies.get_mut(record.official_id()) {
            existing.last_seen_at = now;
            if existing.data_hash == hash {
                return Ok(UpsertOutcome::Unchanged);
            }
            existing.record = record.clone();
            existing.data_hash = hash;
            existing.last_work_date = record.last_work_date();
            return Ok(UpsertOutcome::Updated);
        }

        state.deputies.insert(
            record.official_id().to_string(),
            StoredDeputy {
                record: record.clone(),
                data_hash: hash,
                last_work_date: record.last_work_date(),
                last_seen_at: now,
            },
        );
        Ok(UpsertOutcome::Created)
    }

    async fn upsert_ballot(&self, record: &BallotRecord) -> Result<UpsertOutcome, AppError> {
        let hash = record_hash(record)?;
        let mut state = self.state()?;
        let outcome = match state.ballots.get(&record.official_id) {
            Some((_, existing)) if *existing == hash => return Ok(UpsertOutcome::Unchanged),
            Some(_) => UpsertOutcome::Updated,
            None => UpsertOutcome::Created,
        };
        state
            .ballots
            .insert(record.official_id.clone(), (record.clone(), hash));
        Ok(outcome)
    }

    async fn deputies_not_seen_since(
        &self,
        instant: DateTime<Utc>,
    ) -> Result<Vec<RosterEntry>, AppError> {
        let state = self.state()?;
        let mut stale: Vec<RosterEntry> = state
            .deputies
            .values()
            .filter(|d| d.last_seen_at < instant && d.record.profile.end_of_mandate.is_none())
            .map(|d| RosterEntry::from(&d.record.summary))
            .collect();
        stale.sort_by(|a, b| a.official_id.cmp(&b.official_id));
        Ok(stale)
    }

    async fn record_end_of_mandate(
        &self,
        official_id: &str,
        end: &EndOfMandate,
    ) -> Result<(), AppError> {
        let mut state = self.state()?;
        let stored = state.deputies.get_mut(official_id).ok_or_else(|| {
            AppError::DatabaseError(format!("Unknown deputy {official_id}"))
        })?;
        stored.record.profile.end_of_mandate = Some(end.clone());
        Self::rehash(stored)
    }

    async fn roster(&self) -> Result<Vec<RosterEntry>, AppError> {
        let state = self.state()?;
        let mut roster: Vec<RosterEntry> = state
            .deputies
            .values()
            .map(|d| RosterEntry::from(&d.record.summary))
            .collect();
        roster.sort_by(|a, b| a.official_id.cmp(&b.official_id));
        Ok(roster)
    }

    async fn unclassified_works(&self) -> Result<Vec<UnclassifiedWork>, AppError> {
        let state = self.state()?;
        let mut works: Vec<UnclassifiedWork> = state
            .deputies
            .values()
            .flat_map(|d| {
                d.record
                    .works
                    .iter()
                    .filter(|w| w.is_unclassified())
                    .filter_map(|w| {
                        Some(UnclassifiedWork {
                            deputy_official_id: d.record.official_id().to_string(),
                            work_id: w.external_id.clone(),
                            label: w.unclassified_theme.clone()?,
                            url: w.url.clone(),
                        })
                    })
            })
            .collect();
        works.sort_by(|a, b| {
            (&a.deputy_official_id, &a.work_id).cmp(&(&b.deputy_official_id, &b.work_id))
        });
        Ok(works)
    }

    async fn assign_work_theme(
        &self,
        deputy_official_id: &str,
        work_id: &str,
        theme: &ThemeRef,
    ) -> Result<(), AppError> {
        let mut state = self.state()?;
        let Some(stored) = state.deputies.get_mut(deputy_official_id) else {
            return Ok(());
        };
        let mut changed = false;
        for work in stored
            .record
            .works
            .iter_mut()
            .filter(|w| w.external_id == work_id)
        {
            work.theme = Some(theme.clone());
            work.unclassified_theme = None;
            changed = true;
        }
        if changed {
            Self::rehash(stored)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, NaiveDate};

    use super::*;
    use crate::models::{DeputyProfile, DeputySummary, WorkItemRecord, WorkKind};

    fn deputy(id: &str) -> DeputyRecord {
        DeputyRecord {
            summary: DeputySummary {
                official_id: id.into(),
                first_name: "Jean".into(),
                last_name: format!("Dupont{id}"),
                constituency: None,
            },
            profile: DeputyProfile::default(),
            mandates: None,
            instances: vec![],
            works: vec![WorkItemRecord {
                external_id: "W1".into(),
                date: NaiveDate::from_ymd_opt(2024, 3, 1),
                kind: WorkKind::Question,
                subtype: "Question écrite".into(),
                description: "Sur les abeilles".into(),
                url: Some("http://example.com/q/1".into()),
                theme: None,
                unclassified_theme: Some("Apiculture".into()),
                is_creation: false,
                extra_infos: vec![],
            }],
            declarations: vec![],
            missing: vec![],
        }
    }

    #[tokio::test]
    async fn test_upsert_is_idempotent() {
        let store = MemoryStore::new();
        let record = deputy("1");

        assert_eq!(store.upsert_deputy(&record).await.unwrap(), UpsertOutcome::Created);
        assert_eq!(store.upsert_deputy(&record).await.unwrap(), UpsertOutcome::Unchanged);
        assert_eq!(store.deputy_count(), 1);

        let mut changed = record.clone();
        changed.profile.job = Some("Avocat".into());
        assert_eq!(store.upsert_deputy(&changed).await.unwrap(), UpsertOutcome::Updated);

        let stored = store.find_deputy("1").await.unwrap().unwrap();
        assert_eq!(stored.record, changed);
        assert_eq!(stored.last_work_date, NaiveDate::from_ymd_opt(2024, 3, 1));
    }

    #[tokio::test]
    async fn test_ballot_upsert_is_idempotent() {
        let store = MemoryStore::new();
        let ballot = BallotRecord {
            official_id: "12".into(),
            title: "Motion".into(),
            date: None,
            kind: None,
            total_votes: Some(3),
            yes_votes: Some(2),
            no_votes: Some(1),
            is_adopted: Some(true),
            file_url: None,
            analysis_url: None,
            theme: None,
            unclassified_theme: None,
            votes: vec![],
            non_voting: 0,
        };
        assert_eq!(store.upsert_ballot(&ballot).await.unwrap(), UpsertOutcome::Created);
        assert_eq!(store.upsert_ballot(&ballot).await.unwrap(), UpsertOutcome::Unchanged);
        assert_eq!(store.ballot("12"), Some(ballot));
        assert_eq!(store.ballot_count(), 1);
    }

    #[tokio::test]
    async fn test_not_seen_since_and_end_of_mandate() {
        let store = MemoryStore::new();
        let old = Utc::now() - Duration::days(2);
        store.insert_deputy(deputy("1"), old).unwrap();
        store.upsert_deputy(&deputy("2")).await.unwrap();

        let cutoff = Utc::now() - Duration::days(1);
        let stale = store.deputies_not_seen_since(cutoff).await.unwrap();
        assert_eq!(stale.len(), 1);
        assert_eq!(stale[0].official_id, "1");

        let end = EndOfMandate {
            date: NaiveDate::from_ymd_opt(2024, 6, 9),
            reason: "Dissolution".into(),
        };
        store.record_end_of_mandate("1", &end).await.unwrap();
        assert!(store.deputies_not_seen_since(cutoff).await.unwrap().is_empty());
        assert!(store.record_end_of_mandate("404", &end).await.is_err());
    }

    #[tokio::test]
    async fn test_unclassified_works_and_assignment() {
        let store = MemoryStore::new();
        store.upsert_deputy(&deputy("1")).await.unwrap();

        let theme = ThemeRef {
            id: 7,
            name: "Agriculture".into(),
        };
        let mut themed = deputy("2");
        themed.works[0].theme = Some(theme.clone());
        store.upsert_deputy(&themed).await.unwrap();

        let pending = store.unclassified_works().await.unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].deputy_official_id, "1");
        assert_eq!(pending[0].label, "Apiculture");

        store.assign_work_theme("1", "W1", &theme).await.unwrap();
        assert!(store.unclassified_works().await.unwrap().is_empty());

        let stored = store.find_deputy("1").await.unwrap().unwrap();
        assert_eq!(stored.record.works[0].theme, Some(theme));
        assert_eq!(stored.data_hash, record_hash(&stored.record).unwrap());
    }

    #[tokio::test]
    async fn test_roster_is_sorted() {
        let store = MemoryStore::new();
        for id in ["3", "1", "2"] {
            store.upsert_deputy(&deputy(id)).await.unwrap();
        }
        let ids: Vec<_> = store
            .roster()
            .await
            .unwrap()
            .into_iter()
            .map(|r| r.official_id)
            .collect();
        assert_eq!(ids, ["1", "2", "3"]);
    }
}
