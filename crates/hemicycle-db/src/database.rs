use hemicycle_core::AppError;
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;

use crate::config::DatabaseConfig;
use crate::store::PgIngestionStore;

/// What the store holds, read before a cycle starts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StoreStatus {
    pub deputies: i64,
    pub active_deputies: i64,
    pub ballots: i64,
}

/// Owns the connection pool, runs migrations and vends the store.
#[derive(Clone)]
pub struct Database {
    pool: PgPool,
}

impl Database {
    pub async fn connect(config: &DatabaseConfig) -> Result<Self, AppError> {
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .connect(&config.url)
            .await
            .map_err(|e| AppError::DatabaseError(format!("Failed to connect: {e}")))?;
        tracing::debug!(max_connections = config.max_connections, "Database pool ready");
        Ok(Self { pool })
    }

    /// Wrap an existing pool (tests).
    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Apply the embedded migrations.
    pub async fn migrate(&self) -> Result<(), AppError> {
        sqlx::migrate!("../../migrations")
            .run(&self.pool)
            .await
            .map_err(|e| AppError::DatabaseError(format!("Migration failed: {e}")))?;
        Ok(())
    }

    pub fn store(&self) -> PgIngestionStore {
        PgIngestionStore::new(self.pool.clone())
    }

    /// Count stored records; fails when the schema is missing or unreachable.
    pub async fn status(&self) -> Result<StoreStatus, AppError> {
        let (deputies, active_deputies, ballots): (i64, i64, i64) = sqlx::query_as(
            r#"
            SELECT
                (SELECT COUNT(*) FROM deputies),
                (SELECT COUNT(*) FROM deputies WHERE NOT mandate_ended),
                (SELECT COUNT(*) FROM ballots)
            "#,
        )
        .fetch_one(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(format!("Store check failed: {e}")))?;

        Ok(StoreStatus {
            deputies,
            active_deputies,
            ballots,
        })
    }
}
