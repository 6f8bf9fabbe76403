pub mod batch;
pub mod config;
pub mod error;
pub mod extract;
pub mod ingest;
pub mod memory;
pub mod models;
pub mod resilient;
pub mod schedule;
pub mod sources;
pub mod taxonomy;
#[cfg(any(test, feature = "testutil"))]
pub mod testutil;
pub mod traits;
pub mod util;

pub use batch::{BatchOrchestrator, BatchReporter, TracingBatchReporter};
pub use config::IngestConfig;
pub use error::AppError;
pub use ingest::IngestionCoordinator;
pub use memory::MemoryStore;
pub use models::{CycleReport, EncodingMode, FetchRequest, UpsertOutcome, compute_hash};
pub use resilient::{FetchPolicy, ResilientFetcher};
pub use schedule::Scheduler;
pub use taxonomy::{Resolution, Taxonomy, UnclassifiedLabel};
pub use traits::{Fetcher, IngestionStore, Notifier, TracingNotifier};
