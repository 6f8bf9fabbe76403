//! Recurring cycles at fixed hours of the local day.

use std::future::Future;

use chrono::{Duration, Local, NaiveDateTime, NaiveTime};
use tokio_util::sync::CancellationToken;

use crate::models::CycleReport;

/// Runs a cycle now, then at each configured hour until cancelled.
#[derive(Debug, Clone)]
pub struct Scheduler {
    hours: Vec<u32>,
}

impl Scheduler {
    /// Hours outside `0..24` are ignored; an empty list falls back to 10 and 18.
    pub fn new(hours: impl IntoIterator<Item = u32>) -> Self {
        let mut hours: Vec<u32> = hours.into_iter().filter(|h| *h < 24).collect();
        hours.sort_unstable();
        hours.dedup();
        if hours.is_empty() {
            hours = vec![10, 18];
        }
        Self { hours }
    }

    pub fn hours(&self) -> &[u32] {
        &self.hours
    }

    /// First scheduled instant strictly after `now`.
    pub fn next_run_after(&self, now: NaiveDateTime) -> NaiveDateTime {
        let today = now.date();
        self.hours
            .iter()
            .filter_map(|&h| NaiveTime::from_hms_opt(h, 0, 0))
            .map(|t| today.and_time(t))
            .find(|candidate| *candidate > now)
            .unwrap_or_else(|| {
                let first = self.hours.first().and_then(|&h| NaiveTime::from_hms_opt(h, 0, 0));
                let first = first.unwrap_or(NaiveTime::MIN);
                (today + Duration::days(1)).and_time(first)
            })
    }

    /// Run `cycle` once, then at every scheduled hour.
    ///
    /// Cycles never overlap: the next wait starts only after the previous
    /// cycle returned. Cancellation stops the wait; a cycle already running
    /// is allowed to finish.
    pub async fn run<F, Fut>(&self, cancel: CancellationToken, mut cycle: F)
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = CycleReport>,
    {
        tracing::info!(hours = ?self.hours, "Scheduler started");
        loop {
            let report = cycle().await;
            tracing::info!(
                run_id = %report.run_id,
                deputies_updated = report.deputies_updated,
                ballots_updated = report.ballots_updated,
                "Scheduled cycle finished"
            );

            let now = Local::now().naive_local();
            let next = self.next_run_after(now);
            let wait = (next - now).to_std().unwrap_or_default();
            tracing::info!(next_run = %next, "Waiting for next cycle");

            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(wait) => {}
            }
        }
        tracing::info!("Scheduler stopped");
    }
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new([10, 18])
    }
}
