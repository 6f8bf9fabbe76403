pub mod config;
pub mod database;
pub mod store;

pub use config::DatabaseConfig;
pub use database::{Database, StoreStatus};
pub use store::PgIngestionStore;
