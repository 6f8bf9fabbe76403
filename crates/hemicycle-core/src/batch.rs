use std::future::Future;

use chrono::NaiveDate;
use futures::future::join_all;

use crate::models::{PaginationCursor, WorkItemRecord};

/// Events emitted while a batch runs, for monitoring/logging.
#[derive(Debug, Clone)]
pub enum BatchEvent<'a> {
    RangeStarted {
        batch: &'a str,
        start: usize,
        end: usize,
    },
    RangeCompleted {
        batch: &'a str,
        start: usize,
        end: usize,
        produced: usize,
        skipped: usize,
    },
    PageFetched {
        batch: &'a str,
        page: usize,
        fetched: usize,
        kept: usize,
    },
    PaginationHalted {
        batch: &'a str,
        page: usize,
        reason: HaltReason,
    },
}

/// Trait for receiving batch events (decoupled logging).
pub trait BatchReporter: Send + Sync {
    fn report(&self, event: BatchEvent<'_>) {
        let _ = event;
    }
}

/// Reporter that uses the `tracing` crate.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingBatchReporter;

impl BatchReporter for TracingBatchReporter {
    fn report(&self, event: BatchEvent<'_>) {
        match event {
            BatchEvent::RangeStarted { batch, start, end } => {
                tracing::info!(%batch, %start, %end, "Processing range");
            }
            BatchEvent::RangeCompleted {
                batch,
                start,
                end,
                produced,
                skipped,
            } => {
                tracing::info!(%batch, %start, %end, %produced, %skipped, "Range completed");
            }
            BatchEvent::PageFetched {
                batch,
                page,
                fetched,
                kept,
            } => {
                tracing::debug!(%batch, %page, %fetched, %kept, "Page fetched");
            }
            BatchEvent::PaginationHalted {
                batch,
                page,
                reason,
            } => {
                tracing::debug!(%batch, %page, ?reason, "Pagination halted");
            }
        }
    }
}

/// Why delta pagination stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HaltReason {
    /// The page could not be fetched or parsed.
    Absent,
    /// Fewer items than a full page: this was the last one.
    ShortPage,
    /// Nothing on the page is as recent as the watermark.
    BelowWatermark,
    /// Safety bound on the number of pages reached.
    MaxPages,
}

/// Result of [`BatchOrchestrator::process_in_ranges`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchOutcome<T> {
    pub records: Vec<T>,
    /// Items whose operation produced nothing.
    pub skipped: usize,
}

impl<T> Default for BatchOutcome<T> {
    fn default() -> Self {
        Self {
            records: Vec::new(),
            skipped: 0,
        }
    }
}

/// Result of [`BatchOrchestrator::paginate`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaginationOutcome<T> {
    pub items: Vec<T>,
    /// Pages successfully fetched, the halting page included.
    pub pages: usize,
    pub halted: HaltReason,
}

impl<T> PaginationOutcome<T> {
    /// The very first page was absent, so nothing is known about the collection.
    pub fn failed(&self) -> bool {
        self.pages == 0 && self.halted == HaltReason::Absent
    }
}

/// Anything that can be compared against a delta watermark.
pub trait Dated {
    fn date(&self) -> Option<NaiveDate>;
}

impl Dated for WorkItemRecord {
    fn date(&self) -> Option<NaiveDate> {
        self.date
    }
}

/// Slices collections into sequential ranges of concurrent work.
#[derive(Debug, Clone, Copy)]
pub struct BatchOrchestrator {
    range_size: usize,
    max_pages: usize,
}

impl BatchOrchestrator {
    pub fn new(range_size: usize, max_pages: usize) -> Self {
        Self {
            range_size: range_size.max(1),
            max_pages: max_pages.max(1),
        }
    }

    pub fn range_size(&self) -> usize {
        self.range_size
    }

    /// Run `op` over every item, `range_size` at a time.
    ///
    /// Items of one range run concurrently; the next range starts only once
    /// every item of the current one has finished. An item whose operation
    /// yields `None` is counted as skipped and does not affect its siblings.
    pub async fn process_in_ranges<'a, I, T, F, Fut, R>(
        &self,
        batch: &str,
        items: &'a [I],
        op: F,
        reporter: &R,
    ) -> BatchOutcome<T>
    where
        F: Fn(&'a I) -> Fut,
        Fut: Future<Output = Option<T>>,
        R: BatchReporter,
    {
        let mut outcome = BatchOutcome::default();

        for (index, range) in items.chunks(self.range_size).enumerate() {
            let start = index * self.range_size;
            let end = start + range.len();
            reporter.report(BatchEvent::RangeStarted { batch, start, end });

            let results = join_all(range.iter().map(&op)).await;
            let before = outcome.skipped;
            let produced = outcome.records.len();
            for result in results {
                match result {
                    Some(record) => outcome.records.push(record),
                    None => outcome.skipped += 1,
                }
            }

            reporter.report(BatchEvent::RangeCompleted {
                batch,
                start,
                end,
                produced: outcome.records.len() - produced,
                skipped: outcome.skipped - before,
            });
        }
        outcome
    }

    /// Request pages until the collection is exhausted or older than `watermark`.
    ///
    /// With a watermark, items dated before it (or undated) are dropped, and
    /// a page keeping none of its items is the last one requested. Without a
    /// watermark every item is kept and only short or absent pages halt.
    pub async fn paginate<T, F, Fut, R>(
        &self,
        batch: &str,
        watermark: Option<NaiveDate>,
        page_size: usize,
        mut fetch_page: F,
        reporter: &R,
    ) -> PaginationOutcome<T>
    where
        T: Dated,
        F: FnMut(PaginationCursor) -> Fut,
        Fut: Future<Output = Option<Vec<T>>>,
        R: BatchReporter,
    {
        let page_size = page_size.max(1);
        let mut cursor = PaginationCursor::first(page_size);
        let mut items = Vec::new();
        let mut pages = 0;

        let halted = loop {
            if pages >= self.max_pages {
                break HaltReason::MaxPages;
            }
            let Some(page) = fetch_page(cursor).await else {
                break HaltReason::Absent;
            };
            pages += 1;

            let fetched = page.len();
            let before = items.len();
            items.extend(page.into_iter().filter(|item| match watermark {
                Some(mark) => item.date().is_some_and(|d| d >= mark),
                None => true,
            }));
            let kept = items.len() - before;
            reporter.report(BatchEvent::PageFetched {
                batch,
                page: cursor.page(),
                fetched,
                kept,
            });

            if fetched < page_size {
                break HaltReason::ShortPage;
            }
            if watermark.is_some() && kept == 0 {
                break HaltReason::BelowWatermark;
            }
            cursor = cursor.advance();
        };

        reporter.report(BatchEvent::PaginationHalted {
            batch,
            page: cursor.page(),
            reason: halted,
        });
        PaginationOutcome {
            items,
            pages,
            halted,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    use super::*;
    use crate::testutil::MockReporter;

    #[derive(Debug, Clone, PartialEq)]
    struct Item(Option<NaiveDate>);

    impl Dated for Item {
        fn date(&self) -> Option<NaiveDate> {
            self.0
        }
    }

    fn day(d: u32) -> Option<NaiveDate> {
        NaiveDate::from_ymd_opt(2024, 1, d)
    }

    #[tokio::test]
    async fn twenty_five_items_in_ranges_of_twenty() {
        let reporter = MockReporter::new();
        let items: Vec<usize> = (0..25).collect();

        let outcome = BatchOrchestrator::new(20, 10)
            .process_in_ranges(
                "test",
                &items,
                |i| {
                    let i = *i;
                    async move { (i % 5 != 0).then_some(i) }
                },
                &reporter,
            )
            .await;

        assert_eq!(outcome.records.len(), 20);
        assert_eq!(outcome.skipped, 5);
        assert_eq!(
            reporter.events(),
            vec![
                "RangeStarted 0..20",
                "RangeCompleted 0..20",
                "RangeStarted 20..25",
                "RangeCompleted 20..25",
            ]
        );
    }

    #[tokio::test]
    async fn ranges_never_overlap() {
        let in_flight = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));
        let order = Arc::new(Mutex::new(Vec::new()));
        let items: Vec<usize> = (0..7).collect();

        let outcome = BatchOrchestrator::new(3, 10)
            .process_in_ranges(
                "test",
                &items,
                |i| {
                    let i = *i;
                    let in_flight = in_flight.clone();
                    let peak = peak.clone();
                    let order = order.clone();
                    async move {
                        let now = in_flight.fetch_add(1, Ordering::SeqCst) + 1;
                        peak.fetch_max(now, Ordering::SeqCst);
                        // Later items finish first inside a range.
                        tokio::time::sleep(Duration::from_millis(10 * (3 - i as u64 % 3))).await;
                        order.lock().unwrap().push(i);
                        in_flight.fetch_sub(1, Ordering::SeqCst);
                        Some(i)
                    }
                },
                &TracingBatchReporter,
            )
            .await;

        assert_eq!(outcome.records, vec![0, 1, 2, 3, 4, 5, 6]);
        assert_eq!(peak.load(Ordering::SeqCst), 3);
        let order = order.lock().unwrap();
        for (range, chunk) in order.chunks(3).enumerate() {
            assert!(chunk.iter().all(|i| i / 3 == range), "{order:?}");
        }
    }

    #[tokio::test]
    async fn empty_collection_runs_nothing() {
        let items: Vec<u8> = Vec::new();
        let outcome = BatchOrchestrator::new(20, 10)
            .process_in_ranges("test", &items, |_| async { Some(()) }, &TracingBatchReporter)
            .await;
        assert_eq!(outcome, BatchOutcome::default());
    }

    #[tokio::test]
    async fn paginate_without_watermark_stops_on_short_page() {
        let requested = Mutex::new(Vec::new());
        let outcome = BatchOrchestrator::new(20, 10)
            .paginate(
                "works",
                None,
                2,
                |cursor| {
                    requested.lock().unwrap().push(cursor.range_start);
                    let page = match cursor.page() {
                        0 | 1 => vec![Item(day(1)), Item(None)],
                        _ => vec![Item(day(2))],
                    };
                    async move { Some(page) }
                },
                &TracingBatchReporter,
            )
            .await;

        assert_eq!(outcome.items.len(), 5);
        assert_eq!(outcome.halted, HaltReason::ShortPage);
        assert_eq!(*requested.lock().unwrap(), vec![0, 2, 4]);
    }

    #[tokio::test]
    async fn paginate_stops_at_first_page_below_watermark() {
        let requested = Mutex::new(Vec::new());
        let outcome = BatchOrchestrator::new(20, 10)
            .paginate(
                "works",
                day(10),
                2,
                |cursor| {
                    requested.lock().unwrap().push(cursor.page());
                    let page = match cursor.page() {
                        0 => vec![Item(day(20)), Item(day(15))],
                        1 => vec![Item(day(10)), Item(day(3))],
                        2 => vec![Item(day(5)), Item(day(4))],
                        _ => vec![Item(day(1)), Item(day(1))],
                    };
                    async move { Some(page) }
                },
                &TracingBatchReporter,
            )
            .await;

        assert_eq!(outcome.items, vec![Item(day(20)), Item(day(15)), Item(day(10))]);
        assert_eq!(outcome.halted, HaltReason::BelowWatermark);
        assert_eq!(*requested.lock().unwrap(), vec![0, 1, 2]);
    }

    #[tokio::test]
    async fn paginate_absent_first_page_is_failure() {
        let outcome: PaginationOutcome<Item> = BatchOrchestrator::new(20, 10)
            .paginate("works", None, 10, |_| async { None }, &TracingBatchReporter)
            .await;
        assert!(outcome.failed());
        assert!(outcome.items.is_empty());
    }

    #[tokio::test]
    async fn paginate_is_bounded_by_max_pages() {
        let reporter = MockReporter::new();
        let outcome = BatchOrchestrator::new(20, 3)
            .paginate(
                "works",
                None,
                1,
                |_| async { Some(vec![Item(day(1))]) },
                &reporter,
            )
            .await;
        assert_eq!(outcome.pages, 3);
        assert_eq!(outcome.halted, HaltReason::MaxPages);
        assert!(!outcome.failed());
        assert_eq!(
            reporter.events().last().map(String::as_str),
            Some("PaginationHalted MaxPages")
        );
    }
}
