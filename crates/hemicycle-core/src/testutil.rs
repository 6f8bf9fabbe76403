//! Test utilities: mock implementations of the core traits.
//!
//! Handwritten mocks for dependency injection in unit tests.
//! All mocks use `Arc<Mutex<_>>` for interior mutability, allowing
//! test assertions on recorded calls.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};

use crate::batch::{BatchEvent, BatchReporter};
use crate::error::AppError;
use crate::memory::MemoryStore;
use crate::models::{
    BallotRecord, DeputyRecord, EndOfMandate, FetchRequest, RosterEntry, StoredDeputy, ThemeRef,
    UnclassifiedWork, UpsertOutcome,
};
use crate::taxonomy::UnclassifiedLabel;
use crate::traits::{Fetcher, IngestionStore, Notifier};

// ---------------------------------------------------------------------------
// MockFetcher
// ---------------------------------------------------------------------------

/// Mock fetcher answering from a per-URL routing table.
///
/// A route holds a queue of responses: each call pops the front one, except
/// that a final successful body is repeated forever. Unrouted URLs answer 404.
#[derive(Clone, Default)]
pub struct MockFetcher {
    routes: Arc<Mutex<HashMap<String, VecDeque<Result<String, AppError>>>>>,
    requests: Arc<Mutex<Vec<FetchRequest>>>,
}

impl MockFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Always answer `body` for `url`.
    pub fn route(self, url: &str, body: impl Into<String>) -> Self {
        self.route_sequence(url, vec![Ok(body.into())])
    }

    /// Answer `responses` in order for `url`.
    pub fn route_sequence(self, url: &str, responses: Vec<Result<String, AppError>>) -> Self {
        self.routes
            .lock()
            .unwrap()
            .insert(url.to_string(), responses.into());
        self
    }

    pub fn requests(&self) -> Vec<FetchRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn requested_urls(&self) -> Vec<String> {
        self.requests().into_iter().map(|r| r.url).collect()
    }

    /// How many times `url` was requested.
    pub fn hits(&self, url: &str) -> usize {
        self.requests().iter().filter(|r| r.url == url).count()
    }
}

impl Fetcher for MockFetcher {
    async fn fetch(&self, request: &FetchRequest) -> Result<String, AppError> {
        self.requests.lock().unwrap().push(request.clone());

        let not_found = || AppError::UpstreamStatus {
            status: 404,
            url: request.url.clone(),
        };
        let mut routes = self.routes.lock().unwrap();
        let Some(queue) = routes.get_mut(&request.url) else {
            return Err(not_found());
        };
        if queue.len() > 1 {
            return queue.pop_front().unwrap();
        }
        match queue.front() {
            Some(Ok(body)) => Ok(body.clone()),
            Some(Err(_)) => queue.pop_front().unwrap(),
            None => Err(not_found()),
        }
    }
}

// ---------------------------------------------------------------------------
// MockStore
// ---------------------------------------------------------------------------

/// In-memory store whose reads and upserts can be made to fail per official id.
#[derive(Clone, Default)]
pub struct MockStore {
    pub inner: MemoryStore,
    failing: Arc<Mutex<HashSet<String>>>,
    failing_reads: Arc<Mutex<HashSet<String>>>,
}

impl MockStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every upsert of this deputy or ballot returns a database error.
    pub fn fail_upsert_for(self, official_id: &str) -> Self {
        self.failing.lock().unwrap().insert(official_id.to_string());
        self
    }

    /// Every `find_deputy` of this deputy returns a database error.
    pub fn fail_read_for(self, official_id: &str) -> Self {
        self.failing_reads
            .lock()
            .unwrap()
            .insert(official_id.to_string());
        self
    }

    fn check(&self, official_id: &str) -> Result<(), AppError> {
        Self::check_in(&self.failing, official_id)
    }

    fn check_in(set: &Mutex<HashSet<String>>, official_id: &str) -> Result<(), AppError> {
        if set.lock().unwrap().contains(official_id) {
            return Err(AppError::DatabaseError(format!(
                "simulated failure for {official_id}"
            )));
        }
        Ok(())
    }
}

impl IngestionStore for MockStore {
    async fn find_deputy(&self, official_id: &str) -> Result<Option<StoredDeputy>, AppError> {
        Self::check_in(&self.failing_reads, official_id)?;
        self.inner.find_deputy(official_id).await
    }

    async fn upsert_deputy(&self, record: &DeputyRecord) -> Result<UpsertOutcome, AppError> {
        self.check(record.official_id())?;
        self.inner.upsert_deputy(record).await
    }

    async fn upsert_ballot(&self, record: &BallotRecord) -> Result<UpsertOutcome, AppError> {
        self.check(&record.official_id)?;
        self.inner.upsert_ballot(record).await
    }

    async fn deputies_not_seen_since(
        &self,
        instant: DateTime<Utc>,
    ) -> Result<Vec<RosterEntry>, AppError> {
        self.inner.deputies_not_seen_since(instant).await
    }

    async fn record_end_of_mandate(
        &self,
        official_id: &str,
        end: &EndOfMandate,
    ) -> Result<(), AppError> {
        self.inner.record_end_of_mandate(official_id, end).await
    }

    async fn roster(&self) -> Result<Vec<RosterEntry>, AppError> {
        self.inner.roster().await
    }

    async fn unclassified_works(&self) -> Result<Vec<UnclassifiedWork>, AppError> {
        self.inner.unclassified_works().await
    }

    async fn assign_work_theme(
        &self,
        deputy_official_id: &str,
        work_id: &str,
        theme: &ThemeRef,
    ) -> Result<(), AppError> {
        self.inner
            .assign_work_theme(deputy_official_id, work_id, theme)
            .await
    }
}

// ---------------------------------------------------------------------------
// MockNotifier
// ---------------------------------------------------------------------------

/// Notifier that records every signal.
#[derive(Clone, Default)]
pub struct MockNotifier {
    pub updated: Arc<Mutex<Vec<String>>>,
    pub batches: Arc<Mutex<Vec<(String, usize)>>>,
    pub unclassified: Arc<Mutex<Vec<UnclassifiedLabel>>>,
}

impl MockNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn updated(&self) -> Vec<String> {
        self.updated.lock().unwrap().clone()
    }

    pub fn unclassified_texts(&self) -> Vec<String> {
        self.unclassified
            .lock()
            .unwrap()
            .iter()
            .map(|l| l.raw_text.clone())
            .collect()
    }
}

impl Notifier for MockNotifier {
    fn entity_updated(&self, official_id: &str) {
        self.updated.lock().unwrap().push(official_id.to_string());
    }

    fn batch_completed(&self, batch: &str, updated: usize) {
        self.batches
            .lock()
            .unwrap()
            .push((batch.to_string(), updated));
    }

    fn unclassified_label(&self, label: &UnclassifiedLabel) {
        self.unclassified.lock().unwrap().push(label.clone());
    }
}

// ---------------------------------------------------------------------------
// MockReporter
// ---------------------------------------------------------------------------

/// Mock batch reporter that records events as short strings.
#[derive(Default)]
pub struct MockReporter {
    pub events: Arc<Mutex<Vec<String>>>,
}

impl MockReporter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<String> {
        self.events.lock().unwrap().clone()
    }
}

impl BatchReporter for MockReporter {
    fn report(&self, event: BatchEvent<'_>) {
        let label = match &event {
            BatchEvent::RangeStarted { start, end, .. } => format!("RangeStarted {start}..{end}"),
            BatchEvent::RangeCompleted { start, end, .. } => {
                format!("RangeCompleted {start}..{end}")
            }
            BatchEvent::PageFetched { page, kept, .. } => format!("PageFetched {page} kept {kept}"),
            BatchEvent::PaginationHalted { reason, .. } => format!("PaginationHalted {reason:?}"),
        };
        self.events.lock().unwrap().push(label);
    }
}
