//! Persistence for the origins recorded with submitted runs
//!
//! A run is stored with both of its origins so a worker that picks it up
//! later can re-resolve the pipeline without sharing memory with the
//! submitter.

#[cfg(feature = "sqlite")]
pub mod store;

#[cfg(feature = "sqlite")]
pub use store::SqliteRunStore;

use crate::core::origin::{ExternalPipelineOrigin, Origin, PipelinePythonOrigin};
use crate::host::PipelineOrigins;
use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A submitted run and the origins it was submitted with
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunOriginRecord {
    /// Unique run ID
    pub run_id: Uuid,

    /// Pipeline name
    pub pipeline_name: String,

    pub python_origin: PipelinePythonOrigin,

    pub external_origin: ExternalPipelineOrigin,

    /// Whether the origins were re-derived for another context
    pub reoriginated: bool,

    /// When the run was submitted
    pub created_at: DateTime<Utc>,
}

impl RunOriginRecord {
    pub fn python_origin_id(&self) -> Uuid {
        self.python_origin.get_id()
    }

    pub fn external_origin_id(&self) -> Uuid {
        self.external_origin.get_id()
    }
}

/// Trait for persistence backends
#[async_trait::async_trait]
pub trait PersistenceBackend: Send + Sync {
    /// Save a run record
    async fn save_run(&self, record: &RunOriginRecord) -> Result<()>;

    /// Load a run by ID
    async fn load_run(&self, run_id: Uuid) -> Result<Option<RunOriginRecord>>;

    /// List runs of a pipeline, newest first
    async fn list_runs(&self, pipeline_name: &str) -> Result<Vec<RunOriginRecord>>;

    /// List all pipeline names with runs
    async fn list_pipelines(&self) -> Result<Vec<String>>;
}

/// In-memory persistence (for testing or ephemeral use)
pub struct InMemoryPersistence {
    runs: tokio::sync::RwLock<std::collections::HashMap<Uuid, RunOriginRecord>>,
    by_pipeline: tokio::sync::RwLock<std::collections::HashMap<String, Vec<Uuid>>>,
}

impl InMemoryPersistence {
    pub fn new() -> Self {
        Self {
            runs: tokio::sync::RwLock::new(std::collections::HashMap::new()),
            by_pipeline: tokio::sync::RwLock::new(std::collections::HashMap::new()),
        }
    }
}

impl Default for InMemoryPersistence {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl PersistenceBackend for InMemoryPersistence {
    async fn save_run(&self, record: &RunOriginRecord) -> Result<()> {
        let mut runs = self.runs.write().await;
        let is_new = runs.insert(record.run_id, record.clone()).is_none();

        if is_new {
            let mut by_pipeline = self.by_pipeline.write().await;
            by_pipeline
                .entry(record.pipeline_name.clone())
                .or_insert_with(Vec::new)
                .push(record.run_id);
        }

        Ok(())
    }

    async fn load_run(&self, run_id: Uuid) -> Result<Option<RunOriginRecord>> {
        let runs = self.runs.read().await;
        Ok(runs.get(&run_id).cloned())
    }

    async fn list_runs(&self, pipeline_name: &str) -> Result<Vec<RunOriginRecord>> {
        let runs = self.runs.read().await;
        let by_pipeline = self.by_pipeline.read().await;

        let mut result: Vec<RunOriginRecord> = by_pipeline
            .get(pipeline_name)
            .map(|ids| ids.iter().filter_map(|id| runs.get(id).cloned()).collect())
            .unwrap_or_default();
        result.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(result)
    }

    async fn list_pipelines(&self) -> Result<Vec<String>> {
        let by_pipeline = self.by_pipeline.read().await;
        let mut names: Vec<String> = by_pipeline.keys().cloned().collect();
        names.sort();
        Ok(names)
    }
}

/// Create a run record from resolved origins
pub fn create_record(origins: PipelineOrigins, reoriginated: bool) -> RunOriginRecord {
    RunOriginRecord {
        run_id: Uuid::new_v4(),
        pipeline_name: origins.external_origin.pipeline_name.clone(),
        python_origin: origins.python_origin,
        external_origin: origins.external_origin,
        reoriginated,
        created_at: Utc::now(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::origin::{CodePointer, RepositoryLocationOrigin, RepositoryPythonOrigin};

    fn origins(pipeline_name: &str) -> PipelineOrigins {
        let pointer = CodePointer::for_file("/srv/repo.yaml", "define_repo");
        PipelineOrigins {
            python_origin: PipelinePythonOrigin::new(
                pipeline_name,
                RepositoryPythonOrigin::new("python", pointer.clone()),
            ),
            external_origin: ExternalPipelineOrigin::new(
                RepositoryLocationOrigin::in_process(pointer),
                "repo",
                pipeline_name,
            ),
        }
    }

    #[tokio::test]
    async fn test_in_memory_round_trip() {
        let store = InMemoryPersistence::new();
        let record = create_record(origins("demo_pipeline"), false);
        store.save_run(&record).await.unwrap();

        let loaded = store.load_run(record.run_id).await.unwrap().unwrap();
        assert_eq!(loaded, record);
        assert_eq!(loaded.external_origin_id(), record.external_origin.get_id());
        assert!(store.load_run(Uuid::new_v4()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_in_memory_lists_by_pipeline() {
        let store = InMemoryPersistence::new();
        let first = create_record(origins("demo_pipeline"), false);
        let second = create_record(origins("demo_pipeline"), true);
        let other = create_record(origins("demo_pipeline_celery"), true);
        for record in [&first, &second, &other] {
            store.save_run(record).await.unwrap();
        }
        // Saving again does not duplicate the index entry
        store.save_run(&first).await.unwrap();

        assert_eq!(store.list_runs("demo_pipeline").await.unwrap().len(), 2);
        assert_eq!(
            store.list_pipelines().await.unwrap(),
            vec!["demo_pipeline".to_string(), "demo_pipeline_celery".to_string()]
        );
        assert!(store.list_runs("missing").await.unwrap().is_empty());
    }
}
