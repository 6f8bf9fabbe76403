use chrono::{DateTime, NaiveDate, Utc};
use hemicycle_core::error::AppError;
use hemicycle_core::models::{
    BallotRecord, DeputyRecord, EndOfMandate, RosterEntry, StoredDeputy, ThemeRef,
    UnclassifiedWork, UpsertOutcome, record_hash,
};
use hemicycle_core::traits::IngestionStore;
use sqlx::{PgPool, Postgres, Transaction};

/// [`IngestionStore`] backed by PostgreSQL.
///
/// Records are stored whole as JSONB next to the SHA-256 of their JSON form.
/// An upsert whose hash matches the stored one only refreshes `last_seen_at`.
#[derive(Clone)]
pub struct PgIngestionStore {
    pool: PgPool,
}

impl PgIngestionStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Load a deputy for update inside `tx`.
    async fn lock_deputy(
        tx: &mut Transaction<'_, Postgres>,
        official_id: &str,
    ) -> Result<Option<DeputyRecord>, AppError> {
        let row: Option<(serde_json::Value,)> =
            sqlx::query_as("SELECT record FROM deputies WHERE official_id = $1 FOR UPDATE")
                .bind(official_id)
                .fetch_optional(&mut **tx)
                .await
                .map_err(db_error)?;
        row.map(|(record,)| serde_json::from_value(record).map_err(AppError::from))
            .transpose()
    }

    /// Rewrite a deputy's record without touching `last_seen_at`.
    async fn rewrite_deputy(
        tx: &mut Transaction<'_, Postgres>,
        record: &DeputyRecord,
    ) -> Result<(), AppError> {
        sqlx::query(
            r#"
            UPDATE deputies
            SET record = $2, data_hash = $3, last_work_date = $4, mandate_ended = $5,
                updated_at = NOW()
            WHERE official_id = $1
            "#,
        )
        .bind(record.official_id())
        .bind(serde_json::to_value(record)?)
        .bind(record_hash(record)?)
        .bind(record.last_work_date())
        .bind(record.profile.end_of_mandate.is_some())
        .execute(&mut **tx)
        .await
        .map_err(db_error)?;
        Ok(())
    }
}

fn db_error(e: sqlx::Error) -> AppError {
    AppError::DatabaseError(e.to_string())
}

/// `None` when the row did not exist before the upsert.
fn outcome(previous_hash: Option<String>, hash: &str) -> UpsertOutcome {
    match previous_hash {
        None => UpsertOutcome::Created,
        Some(previous) if previous == hash => UpsertOutcome::Unchanged,
        Some(_) => UpsertOutcome::Updated,
    }
}

#[derive(sqlx::FromRow)]
struct DeputyRow {
    record: serde_json::Value,
    data_hash: String,
    last_work_date: Option<NaiveDate>,
    last_seen_at: DateTime<Utc>,
}

impl TryFrom<DeputyRow> for StoredDeputy {
    type Error = AppError;

    fn try_from(row: DeputyRow) -> Result<Self, Self::Error> {
        Ok(StoredDeputy {
            record: serde_json::from_value(row.record)?,
            data_hash: row.data_hash,
            last_work_date: row.last_work_date,
            last_seen_at: row.last_seen_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct RosterRow {
    official_id: String,
    first_name: String,
    last_name: String,
}

impl From<RosterRow> for RosterEntry {
    fn from(row: RosterRow) -> Self {
        RosterEntry {
            official_id: row.official_id,
            first_name: row.first_name,
            last_name: row.last_name,
        }
    }
}

#[derive(sqlx::FromRow)]
struct UnclassifiedRow {
    deputy_official_id: String,
    work_id: String,
    label: String,
    url: Option<String>,
}

impl From<UnclassifiedRow> for UnclassifiedWork {
    fn from(row: UnclassifiedRow) -> Self {
        UnclassifiedWork {
            deputy_official_id: row.deputy_official_id,
            work_id: row.work_id,
            label: row.label,
            url: row.url,
        }
    }
}

impl IngestionStore for PgIngestionStore {
    async fn find_deputy(&self, official_id: &str) -> Result<Option<StoredDeputy>, AppError> {
        let row = sqlx::query_as::<_, DeputyRow>(
            r#"
            SELECT record, data_hash, last_work_date, last_seen_at
            FROM deputies
            WHERE official_id = $1
            "#,
        )
        .bind(official_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_error)?;

        row.map(StoredDeputy::try_from).transpose()
    }

    async fn upsert_deputy(&self, record: &DeputyRecord) -> Result<UpsertOutcome, AppError> {
        let hash = record_hash(record)?;
        let (previous,): (Option<String>,) = sqlx::query_as(
            r#"
            WITH previous AS (
                SELECT data_hash FROM deputies WHERE official_id = $1
            )
            INSERT INTO deputies
                (official_id, first_name, last_name, record, data_hash, last_work_date,
                 mandate_ended, last_seen_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            ON CONFLICT (official_id) DO UPDATE SET
                first_name = EXCLUDED.first_name,
                last_name = EXCLUDED.last_name,
                record = EXCLUDED.record,
                data_hash = EXCLUDED.data_hash,
                last_work_date = EXCLUDED.last_work_date,
                mandate_ended = EXCLUDED.mandate_ended,
                last_seen_at = EXCLUDED.last_seen_at,
                updated_at = CASE
                    WHEN deputies.data_hash = EXCLUDED.data_hash THEN deputies.updated_at
                    ELSE NOW()
                END
            RETURNING (SELECT data_hash FROM previous)
            "#,
        )
        .bind(record.official_id())
        .bind(&record.summary.first_name)
        .bind(&record.summary.last_name)
        .bind(serde_json::to_value(record)?)
        .bind(&hash)
        .bind(record.last_work_date())
        .bind(record.profile.end_of_mandate.is_some())
        .bind(Utc::now())
        .fetch_one(&self.pool)
        .await
        .map_err(db_error)?;

        Ok(outcome(previous, &hash))
    }

    async fn upsert_ballot(&self, record: &BallotRecord) -> Result<UpsertOutcome, AppError> {
        let hash = record_hash(record)?;
        let (previous,): (Option<String>,) = sqlx::query_as(
            r#"
            WITH previous AS (
                SELECT data_hash FROM ballots WHERE official_id = $1
            )
            INSERT INTO ballots (official_id, record, data_hash)
            VALUES ($1, $2, $3)
            ON CONFLICT (official_id) DO UPDATE SET
                record = EXCLUDED.record,
                data_hash = EXCLUDED.data_hash,
                updated_at = CASE
                    WHEN ballots.data_hash = EXCLUDED.data_hash THEN ballots.updated_at
                    ELSE NOW()
                END
            RETURNING (SELECT data_hash FROM previous)
            "#,
        )
        .bind(&record.official_id)
        .bind(serde_json::to_value(record)?)
        .bind(&hash)
        .fetch_one(&self.pool)
        .await
        .map_err(db_error)?;

        Ok(outcome(previous, &hash))
    }

    async fn deputies_not_seen_since(
        &self,
        instant: DateTime<Utc>,
    ) -> Result<Vec<RosterEntry>, AppError> {
        let rows = sqlx::query_as::<_, RosterRow>(
            r#"
            SELECT official_id, first_name, last_name
            FROM deputies
            WHERE last_seen_at < $1 AND NOT mandate_ended
            ORDER BY official_id
            "#,
        )
        .bind(instant)
        .fetch_all(&self.pool)
        .await
        .map_err(db_error)?;

        Ok(rows.into_iter().map(Into::into).collect())
    }

    async fn record_end_of_mandate(
        &self,
        official_id: &str,
        end: &EndOfMandate,
    ) -> Result<(), AppError> {
        let mut tx = self.pool.begin().await.map_err(db_error)?;
        let mut record = Self::lock_deputy(&mut tx, official_id)
            .await?
            .ok_or_else(|| AppError::DatabaseError(format!("Unknown deputy {official_id}")))?;
        record.profile.end_of_mandate = Some(end.clone());
        Self::rewrite_deputy(&mut tx, &record).await?;
        tx.commit().await.map_err(db_error)
    }

    async fn roster(&self) -> Result<Vec<RosterEntry>, AppError> {
        let rows = sqlx::query_as::<_, RosterRow>(
            "SELECT official_id, first_name, last_name FROM deputies ORDER BY official_id",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(db_error)?;

        Ok(rows.into_iter().map(Into::into).collect())
    }

    async fn unclassified_works(&self) -> Result<Vec<UnclassifiedWork>, AppError> {
        let rows = sqlx::query_as::<_, UnclassifiedRow>(
            r#"
            SELECT d.official_id AS deputy_official_id,
                   w->>'external_id' AS work_id,
                   w->>'unclassified_theme' AS label,
                   w->>'url' AS url
            FROM deputies d, jsonb_array_elements(d.record->'works') AS w
            WHERE w->>'theme' IS NULL AND w->>'unclassified_theme' IS NOT NULL
            ORDER BY deputy_official_id, work_id
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(db_error)?;

        Ok(rows.into_iter().map(Into::into).collect())
    }

    async fn assign_work_theme(
        &self,
        deputy_official_id: &str,
        work_id: &str,
        theme: &ThemeRef,
    ) -> Result<(), AppError> {
        let mut tx = self.pool.begin().await.map_err(db_error)?;
        let Some(mut record) = Self::lock_deputy(&mut tx, deputy_official_id).await? else {
            return Ok(());
        };

        let mut changed = false;
        for work in record.works.iter_mut().filter(|w| w.external_id == work_id) {
            work.theme = Some(theme.clone());
            work.unclassified_theme = None;
            changed = true;
        }
        if changed {
            Self::rewrite_deputy(&mut tx, &record).await?;
        }
        tx.commit().await.map_err(db_error)
    }
}
