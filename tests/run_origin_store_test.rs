//! Recording runs with their origins and handing them to a worker

use pipeline_origin::core::origin::Origin;
use pipeline_origin::host::{OriginSource, ReOriginatedPipeline};
use pipeline_origin::persistence::{create_record, InMemoryPersistence, PersistenceBackend};
use pipeline_origin::testing::{get_test_project_external_pipeline, test_project_workspace};
use std::sync::Arc;

#[tokio::test]
async fn test_worker_resolves_recorded_run() {
    let store: Arc<dyn PersistenceBackend> = Arc::new(InMemoryPersistence::new());

    let record = {
        let pipeline = get_test_project_external_pipeline("demo_pipeline_celery").unwrap();
        create_record(pipeline.get_origins().unwrap(), false)
    };
    store.save_run(&record).await.unwrap();

    // The worker only sees what the store returns
    let loaded = store.load_run(record.run_id).await.unwrap().unwrap();
    let workspace = test_project_workspace();
    let pipeline = workspace.get_external_pipeline(&loaded.external_origin).unwrap();

    assert_eq!(pipeline.name(), "demo_pipeline_celery");
    assert_eq!(
        pipeline.get_python_origin().unwrap().get_id(),
        loaded.python_origin_id()
    );
}

#[tokio::test]
async fn test_reoriginated_runs_are_marked() {
    let store = InMemoryPersistence::new();

    let (local, reoriginated) = {
        let pipeline = get_test_project_external_pipeline("demo_pipeline_docker").unwrap();
        let local = create_record(pipeline.get_origins().unwrap(), false);
        let reoriginated = create_record(
            ReOriginatedPipeline::for_test(&pipeline)
                .with_container_image("demo/docker:latest")
                .get_origins()
                .unwrap(),
            true,
        );
        (local, reoriginated)
    };

    store.save_run(&local).await.unwrap();
    store.save_run(&reoriginated).await.unwrap();

    let runs = store.list_runs("demo_pipeline_docker").await.unwrap();
    assert_eq!(runs.len(), 2);
    assert_eq!(runs.iter().filter(|r| r.reoriginated).count(), 1);

    let loaded = store.load_run(reoriginated.run_id).await.unwrap().unwrap();
    assert_eq!(
        loaded.python_origin.repository_origin.container_image.as_deref(),
        Some("demo/docker:latest")
    );
    assert_ne!(loaded.external_origin_id(), local.external_origin_id());
}
