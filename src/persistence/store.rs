//! SQLite-based run origin store

use crate::core::origin::{ExternalPipelineOrigin, Origin, PipelinePythonOrigin};
use crate::persistence::{PersistenceBackend, RunOriginRecord};
use anyhow::{Context, Result};
use chrono::{DateTime, NaiveDateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions, SqliteRow};
use sqlx::{Row, SqlitePool};
use std::str::FromStr;
use uuid::Uuid;

/// SQLite run store
pub struct SqliteRunStore {
    pool: SqlitePool,
}

impl SqliteRunStore {
    /// Create a new SQLite store
    pub async fn new(db_path: &str) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(&format!("sqlite:{}", db_path))?
            .create_if_missing(true);
        let pool = SqlitePool::connect_with(options)
            .await
            .context("Failed to connect to database")?;

        Self::with_pool(pool).await
    }

    /// Create a store backed by a private in-memory database
    pub async fn in_memory() -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(SqliteConnectOptions::from_str("sqlite::memory:")?)
            .await
            .context("Failed to open in-memory database")?;

        Self::with_pool(pool).await
    }

    async fn with_pool(pool: SqlitePool) -> Result<Self> {
        let store = Self { pool };
        store.init().await?;
        Ok(store)
    }

    /// Create store with default path
    pub async fn with_default_path() -> Result<Self> {
        let data_dir = dirs::data_local_dir().unwrap_or_else(|| std::path::PathBuf::from("."));
        let db_dir = data_dir.join("pipeline-origin");
        std::fs::create_dir_all(&db_dir)?;

        let db_path = db_dir.join("runs.db");
        let db_path = db_path
            .to_str()
            .context("Database path is not valid UTF-8")?;
        Self::new(db_path).await
    }

    /// Initialize database schema
    async fn init(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS run_origins (
                id TEXT PRIMARY KEY,
                pipeline_name TEXT NOT NULL,
                python_origin TEXT NOT NULL,
                python_origin_id TEXT NOT NULL,
                external_origin TEXT NOT NULL,
                external_origin_id TEXT NOT NULL,
                reoriginated INTEGER NOT NULL DEFAULT 0,
                created_at TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_run_origins_pipeline ON run_origins(pipeline_name);
            CREATE INDEX IF NOT EXISTS idx_run_origins_external ON run_origins(external_origin_id);
            "#,
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Convert DateTime<Utc> to NaiveDateTime for SQLite
    fn to_naive(dt: DateTime<Utc>) -> NaiveDateTime {
        dt.naive_utc()
    }

    /// Convert NaiveDateTime to DateTime<Utc>
    fn from_naive(dt: NaiveDateTime) -> DateTime<Utc> {
        DateTime::from_naive_utc_and_offset(dt, Utc)
    }

    fn record_from_row(row: &SqliteRow) -> Result<RunOriginRecord> {
        let python_origin = PipelinePythonOrigin::from_json(&row.get::<String, _>("python_origin"))
            .context("Stored python origin is not valid JSON")?;
        let external_origin = ExternalPipelineOrigin::from_json(&row.get::<String, _>("external_origin"))
            .context("Stored external origin is not valid JSON")?;

        Ok(RunOriginRecord {
            run_id: Uuid::parse_str(&row.get::<String, _>("id"))?,
            pipeline_name: row.get("pipeline_name"),
            python_origin,
            external_origin,
            reoriginated: row.get::<i64, _>("reoriginated") != 0,
            created_at: Self::from_naive(row.get("created_at")),
        })
    }
}

#[async_trait::async_trait]
impl PersistenceBackend for SqliteRunStore {
    async fn save_run(&self, record: &RunOriginRecord) -> Result<()> {
        sqlx::query(
            r#"
            INSERT OR REPLACE INTO run_origins
            (id, pipeline_name, python_origin, python_origin_id, external_origin, external_origin_id, reoriginated, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
            "#,
        )
        .bind(record.run_id.to_string())
        .bind(&record.pipeline_name)
        .bind(record.python_origin.to_json()?)
        .bind(record.python_origin_id().to_string())
        .bind(record.external_origin.to_json()?)
        .bind(record.external_origin_id().to_string())
        .bind(record.reoriginated as i64)
        .bind(Self::to_naive(record.created_at))
        .execute(&self.pool)
        .await
        .context("Failed to save run")?;

        Ok(())
    }

    async fn load_run(&self, run_id: Uuid) -> Result<Option<RunOriginRecord>> {
        let row = sqlx::query(
            r#"
            SELECT id, pipeline_name, python_origin, external_origin, reoriginated, created_at
            FROM run_origins
            WHERE id = ?1
            "#,
        )
        .bind(run_id.to_string())
        .fetch_optional(&self.pool)
        .await
        .context("Failed to load run")?;

        row.as_ref().map(Self::record_from_row).transpose()
    }

    async fn list_runs(&self, pipeline_name: &str) -> Result<Vec<RunOriginRecord>> {
        let rows = sqlx::query(
            r#"
            SELECT id, pipeline_name, python_origin, external_origin, reoriginated, created_at
            FROM run_origins
            WHERE pipeline_name = ?1
            ORDER BY created_at DESC
            "#,
        )
        .bind(pipeline_name)
        .fetch_all(&self.pool)
        .await
        .context("Failed to list runs")?;

        rows.iter().map(Self::record_from_row).collect()
    }

    async fn list_pipelines(&self) -> Result<Vec<String>> {
        let rows = sqlx::query(
            r#"
            SELECT DISTINCT pipeline_name
            FROM run_origins
            ORDER BY pipeline_name ASC
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .context("Failed to list pipelines")?;

        Ok(rows.iter().map(|row| row.get("pipeline_name")).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::OriginSource;
    use crate::persistence::create_record;
    use crate::testing::get_test_project_external_pipeline;

    #[tokio::test]
    async fn test_sqlite_store() {
        let store = SqliteRunStore::in_memory().await.unwrap();

        let pipeline = get_test_project_external_pipeline("demo_pipeline_celery").unwrap();
        let record = create_record(pipeline.get_origins().unwrap(), false);

        store.save_run(&record).await.unwrap();

        let loaded = store.load_run(record.run_id).await.unwrap().unwrap();
        assert_eq!(loaded.pipeline_name, "demo_pipeline_celery");
        assert_eq!(loaded.python_origin, record.python_origin);
        assert_eq!(loaded.external_origin_id(), record.external_origin_id());

        let runs = store.list_runs("demo_pipeline_celery").await.unwrap();
        assert_eq!(runs.len(), 1);
        assert_eq!(store.list_pipelines().await.unwrap(), vec!["demo_pipeline_celery".to_string()]);
    }
}
