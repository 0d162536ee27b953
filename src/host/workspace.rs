//! Workspace: the set of repository locations a host process knows about

use crate::core::config::WorkspaceConfig;
use crate::core::origin::{ExternalPipelineOrigin, RepositoryLocationOrigin};
use crate::core::LocationError;
use crate::host::external::{ExternalPipeline, ExternalRepository};
use crate::host::handle::{
    ExternalPipelineGuard, GrpcServerRegistry, HandleTracker, RepositoryLocationHandle,
    ServedRepository,
};
use crate::host::reoriginated::ReoriginConfig;
use anyhow::Result;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Repository locations available to this process
#[derive(Debug, Clone, Default)]
pub struct Workspace {
    origins: Vec<RepositoryLocationOrigin>,
    servers: GrpcServerRegistry,
    tracker: HandleTracker,

    /// Directory of the workspace file, when loaded from one
    source_root: Option<PathBuf>,
}

impl Workspace {
    pub fn new(origins: Vec<RepositoryLocationOrigin>) -> Self {
        Self {
            origins,
            ..Self::default()
        }
    }

    /// Build a workspace from its configuration, registering the servers it lists
    pub fn from_config(config: &WorkspaceConfig) -> Self {
        let mut workspace = Self::new(config.location_origins());
        workspace.source_root = config.base_dir().map(Path::to_path_buf);
        for (server, pointer) in config.served_repositories() {
            match pointer {
                Some(code_pointer) => workspace.servers.register(
                    &server.host,
                    server.port,
                    ServedRepository {
                        code_pointer,
                        report_code_pointer: server.report_code_pointer,
                    },
                ),
                None => debug!(
                    "No served repository configured for {}:{}",
                    server.host, server.port
                ),
            }
        }
        workspace
    }

    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let config = WorkspaceConfig::from_file(path)?;
        Ok(Self::from_config(&config))
    }

    pub fn with_tracker(mut self, tracker: HandleTracker) -> Self {
        self.tracker = tracker;
        self
    }

    pub fn location_origins(&self) -> &[RepositoryLocationOrigin] {
        &self.origins
    }

    pub fn servers(&self) -> &GrpcServerRegistry {
        &self.servers
    }

    pub fn tracker(&self) -> &HandleTracker {
        &self.tracker
    }

    pub fn source_root(&self) -> Option<&Path> {
        self.source_root.as_deref()
    }

    /// Re-origin settings that keep this workspace's layout under the deploy root
    pub fn reorigin_config(&self) -> ReoriginConfig {
        match &self.source_root {
            Some(root) => ReoriginConfig::new().with_source_root(root.clone()),
            None => ReoriginConfig::new(),
        }
    }

    /// Open one of this workspace's locations
    pub fn open_location(
        &self,
        origin: &RepositoryLocationOrigin,
    ) -> Result<RepositoryLocationHandle, LocationError> {
        if !self.origins.contains(origin) {
            return Err(LocationError::UnknownLocation(origin.location_name()));
        }
        RepositoryLocationHandle::create(origin.clone(), &self.servers, &self.tracker)
    }

    /// Acquire a pipeline from a location of this workspace
    pub fn acquire_external_pipeline(
        &self,
        origin: &RepositoryLocationOrigin,
        repository_name: &str,
        pipeline_name: &str,
    ) -> Result<ExternalPipelineGuard, LocationError> {
        let handle = self.open_location(origin)?;
        ExternalPipelineGuard::acquire(handle, repository_name, pipeline_name)
    }

    /// Re-resolve a pipeline from its external origin
    pub fn get_external_pipeline(
        &self,
        origin: &ExternalPipelineOrigin,
    ) -> Result<ExternalPipelineGuard, LocationError> {
        self.acquire_external_pipeline(
            origin.location_origin(),
            origin.repository_name(),
            &origin.pipeline_name,
        )
    }

    /// Find a pipeline by name in any location of this workspace
    pub fn find_pipeline(&self, pipeline_name: &str) -> Result<ExternalPipelineGuard, LocationError> {
        for origin in &self.origins {
            let handle = match self.open_location(origin) {
                Ok(handle) => handle,
                Err(e) => {
                    warn!("Skipping location {}: {}", origin.location_name(), e);
                    continue;
                }
            };

            let repository = handle
                .repositories()
                .into_iter()
                .find(|r| r.has_pipeline(pipeline_name));

            if let Some(repository) = repository {
                let name = repository.name().to_string();
                return ExternalPipelineGuard::acquire(handle, &name, pipeline_name);
            }
        }

        Err(LocationError::PipelineNotFound {
            pipeline: pipeline_name.to_string(),
            repository: "<any>".to_string(),
        })
    }

    /// Run `f` with a pipeline; the location is released before returning
    pub fn with_external_pipeline<F, R>(
        &self,
        origin: &ExternalPipelineOrigin,
        f: F,
    ) -> Result<R, LocationError>
    where
        F: FnOnce(&ExternalPipeline) -> R,
    {
        let guard = self.get_external_pipeline(origin)?;
        Ok(f(&*guard))
    }

    /// Load every repository in the workspace, skipping locations that fail
    pub fn list_repositories(&self) -> Vec<(String, Result<Vec<ExternalRepository>, LocationError>)> {
        self.origins
            .iter()
            .map(|origin| {
                let result = self.open_location(origin).map(|handle| handle.repositories());
                (origin.location_name(), result)
            })
            .collect()
    }
}
