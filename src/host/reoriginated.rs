//! Re-originated pipelines
//!
//! Wraps an [`ExternalPipeline`] and derives its origins as if the pipeline
//! had been discovered from another context, such as a container whose
//! filesystem layout differs from the caller's.

use crate::core::origin::{
    CodePointer, ExternalPipelineOrigin, PipelinePythonOrigin, RepositoryLocationOrigin,
    RepositoryPythonOrigin, DEFAULT_EXECUTABLE_PATH,
};
use crate::core::ResolutionError;
use crate::host::external::ExternalPipeline;
use crate::host::OriginSource;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Where the deployed copy of the code lives
pub const DEFAULT_DEPLOY_ROOT: &str = "/opt/pipeline";

/// How to translate origins into the target context
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReoriginConfig {
    /// Executable used in the target context
    pub executable_path: String,

    /// Root of the code in the target context
    pub deploy_root: PathBuf,

    /// Root of the code in this context; file pointers under it keep their
    /// relative layout when moved
    pub source_root: Option<PathBuf>,

    /// Image the target context runs
    pub container_image: Option<String>,
}

impl Default for ReoriginConfig {
    fn default() -> Self {
        Self {
            executable_path: DEFAULT_EXECUTABLE_PATH.to_string(),
            deploy_root: PathBuf::from(DEFAULT_DEPLOY_ROOT),
            source_root: None,
            container_image: None,
        }
    }
}

impl ReoriginConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_deploy_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.deploy_root = root.into();
        self
    }

    pub fn with_source_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.source_root = Some(root.into());
        self
    }

    pub fn with_container_image(mut self, image: Option<String>) -> Self {
        self.container_image = image;
        self
    }

    pub fn with_executable_path(mut self, executable_path: impl Into<String>) -> Self {
        self.executable_path = executable_path.into();
        self
    }

    /// Move a code pointer under the deploy root
    pub fn relocate(&self, pointer: &CodePointer) -> CodePointer {
        match pointer {
            CodePointer::File {
                python_file,
                fn_name,
                working_directory,
            } => {
                let full = pointer.source_path();
                let relative = self
                    .relative_to_roots(&full, working_directory.as_deref())
                    .unwrap_or_else(|| {
                        python_file
                            .file_name()
                            .map(PathBuf::from)
                            .unwrap_or_else(|| python_file.clone())
                    });
                CodePointer::for_file(self.deploy_root.join(relative), fn_name.clone())
            }
            CodePointer::Module { module, fn_name, .. } => {
                CodePointer::for_module(module.clone(), fn_name.clone())
                    .with_working_directory(self.deploy_root.clone())
            }
        }
    }

    fn relative_to_roots(&self, path: &Path, working_directory: Option<&Path>) -> Option<PathBuf> {
        self.source_root
            .as_deref()
            .into_iter()
            .chain(working_directory)
            .find_map(|root| path.strip_prefix(root).ok())
            .map(Path::to_path_buf)
    }
}

/// An external pipeline whose origins point into another context
///
/// Borrows the wrapped pipeline, so it can never outlive the location
/// handle that produced it.
#[derive(Debug, Clone)]
pub struct ReOriginatedPipeline<'a> {
    pipeline: &'a ExternalPipeline,
    config: ReoriginConfig,
}

impl<'a> ReOriginatedPipeline<'a> {
    pub fn new(pipeline: &'a ExternalPipeline, config: ReoriginConfig) -> Self {
        Self { pipeline, config }
    }

    pub fn with_container_image(mut self, image: impl Into<String>) -> Self {
        self.config.container_image = Some(image.into());
        self
    }

    pub fn pipeline(&self) -> &ExternalPipeline {
        self.pipeline
    }

    pub fn config(&self) -> &ReoriginConfig {
        &self.config
    }

    fn relocated_pointer(&self) -> Result<CodePointer, ResolutionError> {
        // Fails when the wrapped pipeline's code cannot be located
        let original = self.pipeline.get_python_origin()?;
        let relocated = self.config.relocate(original.code_pointer());
        debug!(
            "Re-originated {} from {} to {}",
            self.pipeline.name(),
            original.code_pointer().describe(),
            relocated.describe()
        );
        Ok(relocated)
    }
}

impl OriginSource for ReOriginatedPipeline<'_> {
    fn pipeline_name(&self) -> &str {
        self.pipeline.name()
    }

    fn get_python_origin(&self) -> Result<PipelinePythonOrigin, ResolutionError> {
        let repository_origin =
            RepositoryPythonOrigin::new(self.config.executable_path.clone(), self.relocated_pointer()?)
                .with_container_image(self.config.container_image.clone());
        Ok(PipelinePythonOrigin::new(self.pipeline.name(), repository_origin))
    }

    fn get_external_origin(&self) -> Result<ExternalPipelineOrigin, ResolutionError> {
        let location_origin = RepositoryLocationOrigin::InProcess {
            code_pointer: self.relocated_pointer()?,
            container_image: self.config.container_image.clone(),
        };
        Ok(ExternalPipelineOrigin::new(
            location_origin,
            self.pipeline.repository_handle().repository_name.clone(),
            self.pipeline.name(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_relocate_file_under_source_root() {
        let config = ReoriginConfig::new()
            .with_deploy_root("/deploy/project")
            .with_source_root("/home/dev/project");
        let pointer = CodePointer::for_file("/home/dev/project/pipelines/repo.yaml", "define_repo");

        assert_eq!(
            config.relocate(&pointer),
            CodePointer::for_file("/deploy/project/pipelines/repo.yaml", "define_repo")
        );
    }

    #[test]
    fn test_relocate_file_under_working_directory() {
        let config = ReoriginConfig::new().with_deploy_root("/deploy");
        let pointer = CodePointer::for_file("pipelines/repo.yaml", "define_repo")
            .with_working_directory("/home/dev/project");

        assert_eq!(
            config.relocate(&pointer),
            CodePointer::for_file("/deploy/pipelines/repo.yaml", "define_repo")
        );
    }

    #[test]
    fn test_relocate_file_outside_roots_keeps_file_name() {
        let config = ReoriginConfig::new().with_source_root("/home/dev/project");
        let pointer = CodePointer::for_file("/tmp/elsewhere/repo.yaml", "define_repo");

        assert_eq!(
            config.relocate(&pointer),
            CodePointer::for_file("/opt/pipeline/repo.yaml", "define_repo")
        );
    }

    #[test]
    fn test_relocate_module_pointer() {
        let config = ReoriginConfig::new().with_deploy_root("/deploy");
        let pointer = CodePointer::for_module("pipelines.repo", "define_repo")
            .with_working_directory("/home/dev/project");

        let relocated = config.relocate(&pointer);
        assert_eq!(relocated.working_directory(), Some(Path::new("/deploy")));
        assert_eq!(relocated.source_path(), PathBuf::from("/deploy/pipelines/repo.yaml"));
    }
}
