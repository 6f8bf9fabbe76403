use std::future::Future;

use chrono::{DateTime, Utc};

use crate::error::AppError;
use crate::models::{
    BallotRecord, DeputyRecord, EndOfMandate, FetchRequest, RosterEntry, StoredDeputy, ThemeRef,
    UnclassifiedWork, UpsertOutcome,
};
use crate::taxonomy::UnclassifiedLabel;

/// Performs a single raw fetch attempt.
///
/// Retries, redirect markers and "absent content" policy live in
/// [`crate::resilient::ResilientFetcher`]; implementations only report what
/// one GET returned.
pub trait Fetcher: Send + Sync + Clone {
    fn fetch(
        &self,
        request: &FetchRequest,
    ) -> impl Future<Output = Result<String, AppError>> + Send;
}

/// Persists ingested entities, keyed by their official identifier.
///
/// Upserts must be idempotent: writing an identical record twice reports
/// [`UpsertOutcome::Unchanged`] the second time and changes nothing.
pub trait IngestionStore: Send + Sync + Clone {
    fn find_deputy(
        &self,
        official_id: &str,
    ) -> impl Future<Output = Result<Option<StoredDeputy>, AppError>> + Send;

    fn upsert_deputy(
        &self,
        record: &DeputyRecord,
    ) -> impl Future<Output = Result<UpsertOutcome, AppError>> + Send;

    fn upsert_ballot(
        &self,
        record: &BallotRecord,
    ) -> impl Future<Output = Result<UpsertOutcome, AppError>> + Send;

    /// Deputies whose last upsert predates `instant`.
    fn deputies_not_seen_since(
        &self,
        instant: DateTime<Utc>,
    ) -> impl Future<Output = Result<Vec<RosterEntry>, AppError>> + Send;

    fn record_end_of_mandate(
        &self,
        official_id: &str,
        end: &EndOfMandate,
    ) -> impl Future<Output = Result<(), AppError>> + Send;

    /// Every known deputy, for name-based vote resolution.
    fn roster(&self) -> impl Future<Output = Result<Vec<RosterEntry>, AppError>> + Send;

    fn unclassified_works(
        &self,
    ) -> impl Future<Output = Result<Vec<UnclassifiedWork>, AppError>> + Send;

    fn assign_work_theme(
        &self,
        deputy_official_id: &str,
        work_id: &str,
        theme: &ThemeRef,
    ) -> impl Future<Output = Result<(), AppError>> + Send;
}

/// Fire-and-forget signals to downstream consumers.
///
/// Signatures are infallible on purpose: a notifier must never fail or block
/// the pipeline. Implementations that do I/O spawn it and log failures.
pub trait Notifier: Send + Sync {
    fn entity_updated(&self, official_id: &str) {
        let _ = official_id;
    }

    fn batch_completed(&self, batch: &str, updated: usize) {
        let _ = (batch, updated);
    }

    /// A label needs a human to theme it.
    fn unclassified_label(&self, label: &UnclassifiedLabel) {
        let _ = label;
    }
}

/// Notifier that only logs through `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingNotifier;

impl Notifier for TracingNotifier {
    fn entity_updated(&self, official_id: &str) {
        tracing::info!(%official_id, "Entity updated");
    }

    fn batch_completed(&self, batch: &str, updated: usize) {
        tracing::info!(%batch, %updated, "Batch completed");
    }

    fn unclassified_label(&self, label: &UnclassifiedLabel) {
        tracing::warn!(
            raw_text = %label.raw_text,
            context_url = ?label.context_url,
            reason = ?label.reason,
            "Theme not recognized"
        );
    }
}
