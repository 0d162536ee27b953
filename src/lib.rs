//! pipeline-origin - resolve where pipelines come from, across process boundaries

pub mod cli;
pub mod core;
pub mod host;
pub mod persistence;
pub mod testing;

// Re-export commonly used types
pub use crate::core::{
    CodePointer, ExternalPipelineOrigin, LocationError, Origin, PipelinePythonOrigin,
    RepositoryLocationOrigin, ResolutionError,
};
pub use crate::host::{
    ExternalPipeline, ExternalPipelineGuard, OriginSource, PipelineOrigins, ReOriginatedPipeline,
    ReoriginConfig, Workspace,
};
pub use crate::testing::get_test_project_external_pipeline;
