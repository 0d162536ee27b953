//! Test project fixtures
//!
//! The bundled test project under `test_project/` defines the
//! `demo_execution_repo` repository. Pipelines are handed out through scoped
//! guards so the repository location is always released, even when an
//! assertion inside the scope panics.

use crate::core::origin::{CodePointer, RepositoryLocationOrigin};
use crate::core::LocationError;
use crate::host::{ExternalPipeline, ExternalPipelineGuard, ReOriginatedPipeline, ReoriginConfig, Workspace};
use std::path::PathBuf;

/// Repository defined by the test project
pub const TEST_REPOSITORY_NAME: &str = "demo_execution_repo";

/// Symbol that addresses the test repository
pub const TEST_REPOSITORY_SYMBOL: &str = "define_demo_execution_repo";

/// Where the test project lives inside deployed test images
pub const TEST_DEPLOY_ROOT: &str = "/pipeline_test/test_project";

/// Root of the bundled test project
pub fn test_project_root() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("test_project")
}

/// Repository file of the test project
pub fn test_repository_file() -> PathBuf {
    test_project_root().join("test_pipelines").join("repo.yaml")
}

/// Workspace file listing the test project's locations
pub fn test_workspace_file() -> PathBuf {
    test_project_root().join("workspace.yaml")
}

/// In-process location over the test repository
pub fn test_project_location_origin() -> RepositoryLocationOrigin {
    RepositoryLocationOrigin::in_process(CodePointer::for_file(
        test_repository_file(),
        TEST_REPOSITORY_SYMBOL,
    ))
}

/// Workspace containing only the in-process test location
pub fn test_project_workspace() -> Workspace {
    Workspace::new(vec![test_project_location_origin()])
}

/// Acquire a test project pipeline from the given workspace
pub fn get_test_project_external_pipeline_in(
    workspace: &Workspace,
    pipeline_name: &str,
) -> Result<ExternalPipelineGuard, LocationError> {
    workspace.acquire_external_pipeline(
        &test_project_location_origin(),
        TEST_REPOSITORY_NAME,
        pipeline_name,
    )
}

/// Acquire a test project pipeline; the location is released when the guard drops
pub fn get_test_project_external_pipeline(
    pipeline_name: &str,
) -> Result<ExternalPipelineGuard, LocationError> {
    get_test_project_external_pipeline_in(&test_project_workspace(), pipeline_name)
}

/// Run `f` against a test project pipeline inside a scoped location
pub fn with_test_project_external_pipeline<F, R>(pipeline_name: &str, f: F) -> Result<R, LocationError>
where
    F: FnOnce(&ExternalPipeline) -> R,
{
    let pipeline = get_test_project_external_pipeline(pipeline_name)?;
    Ok(f(&*pipeline))
}

/// Re-origin settings matching the layout of deployed test images
pub fn test_reorigin_config() -> ReoriginConfig {
    ReoriginConfig::new()
        .with_deploy_root(TEST_DEPLOY_ROOT)
        .with_source_root(test_project_root())
}

impl<'a> ReOriginatedPipeline<'a> {
    /// Re-originate a test project pipeline into the deployed test layout
    pub fn for_test(pipeline: &'a ExternalPipeline) -> Self {
        ReOriginatedPipeline::new(pipeline, test_reorigin_config())
    }
}
