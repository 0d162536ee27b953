//! Repositories and pipelines as seen from outside their defining process

use crate::core::origin::{
    CodePointer, ExternalPipelineOrigin, ExternalRepositoryOrigin, PipelinePythonOrigin,
    RepositoryLocationOrigin, RepositoryPythonOrigin,
};
use crate::core::pipeline::{PipelineSnapshot, RepositoryDefinition};
use crate::core::{LocationError, ResolutionError};
use crate::host::OriginSource;
use tracing::debug;
use uuid::Uuid;

/// Identifies a repository inside a repository location
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepositoryHandle {
    pub repository_name: String,
    pub location_origin: RepositoryLocationOrigin,

    /// Code pointer reported by the location (`None` when a server withholds it)
    pub code_pointer: Option<CodePointer>,

    pub executable_path: String,
    pub container_image: Option<String>,
}

impl RepositoryHandle {
    pub fn location_name(&self) -> String {
        self.location_origin.location_name()
    }

    /// Locate the repository's code from this process
    pub fn get_python_origin(&self) -> Result<RepositoryPythonOrigin, ResolutionError> {
        let pointer = self
            .code_pointer
            .as_ref()
            .ok_or_else(|| ResolutionError::MissingCodePointer {
                location: self.location_name(),
            })?;

        // Servers may keep code in a filesystem we cannot see
        if self.location_origin.is_local() {
            pointer.locate()?;
        } else {
            pointer.check_not_empty()?;
        }

        Ok(RepositoryPythonOrigin::new(self.executable_path.clone(), pointer.clone())
            .with_container_image(self.container_image.clone()))
    }

    pub fn get_external_origin(&self) -> Result<ExternalRepositoryOrigin, ResolutionError> {
        if let Some(pointer) = self.location_origin.code_pointer() {
            pointer.locate()?;
        }

        Ok(ExternalRepositoryOrigin {
            repository_location_origin: self.location_origin.clone(),
            repository_name: self.repository_name.clone(),
        })
    }
}

/// A repository loaded through a location handle
#[derive(Debug, Clone)]
pub struct ExternalRepository {
    handle: RepositoryHandle,
    definition: RepositoryDefinition,
}

impl ExternalRepository {
    pub fn new(handle: RepositoryHandle, definition: RepositoryDefinition) -> Self {
        Self { handle, definition }
    }

    pub fn name(&self) -> &str {
        &self.handle.repository_name
    }

    pub fn handle(&self) -> &RepositoryHandle {
        &self.handle
    }

    pub fn pipeline_names(&self) -> Vec<String> {
        self.definition.pipeline_names()
    }

    pub fn has_pipeline(&self, name: &str) -> bool {
        self.definition.has_pipeline(name)
    }

    /// Get a pipeline with its full structure snapshot
    pub fn get_full_external_pipeline(&self, name: &str) -> Result<ExternalPipeline, LocationError> {
        let definition = self
            .definition
            .pipeline(name)
            .ok_or_else(|| LocationError::PipelineNotFound {
                pipeline: name.to_string(),
                repository: self.name().to_string(),
            })?;

        Ok(ExternalPipeline {
            name: definition.name.clone(),
            repository_handle: self.handle.clone(),
            snapshot: definition.snapshot(),
        })
    }

    pub fn get_all_external_pipelines(&self) -> Vec<ExternalPipeline> {
        self.definition
            .pipelines()
            .map(|definition| ExternalPipeline {
                name: definition.name.clone(),
                repository_handle: self.handle.clone(),
                snapshot: definition.snapshot(),
            })
            .collect()
    }
}

/// Handle to a pipeline definition observed from outside its process
#[derive(Debug, Clone)]
pub struct ExternalPipeline {
    name: String,
    repository_handle: RepositoryHandle,
    snapshot: PipelineSnapshot,
}

impl ExternalPipeline {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn repository_handle(&self) -> &RepositoryHandle {
        &self.repository_handle
    }

    pub fn snapshot(&self) -> &PipelineSnapshot {
        &self.snapshot
    }

    pub fn snapshot_id(&self) -> Uuid {
        self.snapshot.snapshot_id
    }

    pub fn solid_names(&self) -> Vec<&str> {
        self.snapshot.solid_names()
    }

    pub fn modes(&self) -> &[String] {
        &self.snapshot.modes
    }
}

impl OriginSource for ExternalPipeline {
    fn pipeline_name(&self) -> &str {
        &self.name
    }

    fn get_python_origin(&self) -> Result<PipelinePythonOrigin, ResolutionError> {
        let repository_origin = self.repository_handle.get_python_origin()?;
        debug!(
            "Resolved python origin for {} at {}",
            self.name,
            repository_origin.code_pointer.describe()
        );
        Ok(PipelinePythonOrigin::new(self.name.clone(), repository_origin))
    }

    fn get_external_origin(&self) -> Result<ExternalPipelineOrigin, ResolutionError> {
        let repository_origin = self.repository_handle.get_external_origin()?;
        Ok(ExternalPipelineOrigin {
            external_repository_origin: repository_origin,
            pipeline_name: self.name.clone(),
        })
    }
}
