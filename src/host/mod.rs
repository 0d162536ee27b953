//! Host-side view of repositories and pipelines loaded from locations

pub mod external;
pub mod handle;
pub mod reoriginated;
pub mod workspace;

use crate::core::origin::{ExternalPipelineOrigin, PipelinePythonOrigin};
use crate::core::ResolutionError;
use serde::{Deserialize, Serialize};

pub use external::{ExternalPipeline, ExternalRepository, RepositoryHandle};
pub use handle::{ExternalPipelineGuard, GrpcServerRegistry, HandleTracker, RepositoryLocationHandle, ServedRepository};
pub use reoriginated::{ReOriginatedPipeline, ReoriginConfig};
pub use workspace::Workspace;

/// Anything that can say where a pipeline comes from
///
/// Both derivations are pure: they read metadata already held by the
/// implementor and return equal values on every call.
pub trait OriginSource {
    fn pipeline_name(&self) -> &str;

    /// Pointer to the code defining the pipeline, for re-import in the same runtime
    fn get_python_origin(&self) -> Result<PipelinePythonOrigin, ResolutionError>;

    /// Process independent descriptor a remote worker can re-resolve
    fn get_external_origin(&self) -> Result<ExternalPipelineOrigin, ResolutionError>;

    /// Both origins at once
    fn get_origins(&self) -> Result<PipelineOrigins, ResolutionError> {
        Ok(PipelineOrigins {
            python_origin: self.get_python_origin()?,
            external_origin: self.get_external_origin()?,
        })
    }
}

/// The pair of origins recorded for a pipeline
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineOrigins {
    pub python_origin: PipelinePythonOrigin,
    pub external_origin: ExternalPipelineOrigin,
}
