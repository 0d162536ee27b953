//! Origin descriptors for pipelines and repositories
//!
//! A *python origin* points at the code that defines a pipeline and is
//! enough to re-import it inside the same runtime. An *external origin*
//! names the repository location the pipeline was loaded from and can be
//! handed to another process that re-resolves the pipeline on its own.

use crate::core::config::RepositoryConfig;
use crate::core::error::ResolutionError;
use crate::core::pipeline::PipelineDefinition;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use uuid::Uuid;

/// Extension used by repository definition files
pub const REPOSITORY_FILE_EXTENSION: &str = "yaml";

/// Default executable recorded in python origins
pub const DEFAULT_EXECUTABLE_PATH: &str = "python";

const ORIGIN_ID_NAMESPACE: Uuid = Uuid::from_u128(0x6f72_6967_696e_4a5c_9d2e_7b31_c0a8_f15e);

/// Common behaviour of origin descriptors
///
/// Origins cross process boundaries as JSON. Their id is a UUIDv5 over the
/// serialized form, so equal origins always share an id.
pub trait Origin: Serialize + DeserializeOwned {
    /// Tag mixed into the id so different origin kinds never collide
    const KIND: &'static str;

    /// Deterministic id of this origin
    fn get_id(&self) -> Uuid {
        // Origins are plain data with string keys; serializing cannot fail
        let body = serde_json::to_string(self).expect("origin serializes to JSON");
        Uuid::new_v5(&ORIGIN_ID_NAMESPACE, format!("{}:{}", Self::KIND, body).as_bytes())
    }

    fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }

    fn from_json(json: &str) -> serde_json::Result<Self> {
        serde_json::from_str(json)
    }
}

/// Pointer to a repository definition symbol inside a file or module
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CodePointer {
    /// A repository definition file
    File {
        python_file: PathBuf,
        fn_name: String,
        #[serde(default)]
        working_directory: Option<PathBuf>,
    },
    /// A dotted module path, resolved relative to the working directory
    Module {
        module: String,
        fn_name: String,
        #[serde(default)]
        working_directory: Option<PathBuf>,
    },
}

impl CodePointer {
    pub fn for_file(python_file: impl Into<PathBuf>, fn_name: impl Into<String>) -> Self {
        CodePointer::File {
            python_file: python_file.into(),
            fn_name: fn_name.into(),
            working_directory: None,
        }
    }

    pub fn for_module(module: impl Into<String>, fn_name: impl Into<String>) -> Self {
        CodePointer::Module {
            module: module.into(),
            fn_name: fn_name.into(),
            working_directory: None,
        }
    }

    pub fn with_working_directory(mut self, dir: impl Into<PathBuf>) -> Self {
        match &mut self {
            CodePointer::File { working_directory, .. }
            | CodePointer::Module { working_directory, .. } => *working_directory = Some(dir.into()),
        }
        self
    }

    /// Name of the repository definition symbol
    pub fn fn_name(&self) -> &str {
        match self {
            CodePointer::File { fn_name, .. } | CodePointer::Module { fn_name, .. } => fn_name,
        }
    }

    pub fn working_directory(&self) -> Option<&Path> {
        match self {
            CodePointer::File { working_directory, .. }
            | CodePointer::Module { working_directory, .. } => working_directory.as_deref(),
        }
    }

    /// Human readable form, e.g. `repo.yaml::define_repo`
    pub fn describe(&self) -> String {
        match self {
            CodePointer::File { python_file, fn_name, .. } => {
                format!("{}::{}", python_file.display(), fn_name)
            }
            CodePointer::Module { module, fn_name, .. } => format!("{}::{}", module, fn_name),
        }
    }

    /// Path of the file this pointer addresses, without touching the filesystem
    pub fn source_path(&self) -> PathBuf {
        match self {
            CodePointer::File { python_file, working_directory, .. } => match working_directory {
                Some(dir) if python_file.is_relative() => dir.join(python_file),
                _ => python_file.clone(),
            },
            CodePointer::Module { module, working_directory, .. } => {
                let relative = PathBuf::from(module.replace('.', "/"))
                    .with_extension(REPOSITORY_FILE_EXTENSION);
                match working_directory {
                    Some(dir) => dir.join(relative),
                    None => relative,
                }
            }
        }
    }

    /// Check that the pointer has a target and a symbol
    pub fn check_not_empty(&self) -> Result<(), ResolutionError> {
        if self.fn_name().trim().is_empty() {
            return Err(ResolutionError::EmptyPointer("fn_name".to_string()));
        }
        match self {
            CodePointer::File { python_file, .. } if python_file.as_os_str().is_empty() => {
                Err(ResolutionError::EmptyPointer("python_file".to_string()))
            }
            CodePointer::Module { module, .. } if module.trim().is_empty() => {
                Err(ResolutionError::EmptyPointer("module".to_string()))
            }
            _ => Ok(()),
        }
    }

    /// Locate the source file on the local filesystem
    pub fn locate(&self) -> Result<PathBuf, ResolutionError> {
        self.check_not_empty()?;
        let path = self.source_path();
        if path.is_file() {
            return Ok(path);
        }
        match self {
            CodePointer::File { .. } => Err(ResolutionError::FileNotFound { path }),
            CodePointer::Module { module, .. } => Err(ResolutionError::ModuleNotFound {
                module: module.clone(),
                path,
            }),
        }
    }
}

/// In-runtime origin of a repository
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RepositoryPythonOrigin {
    /// Executable that loads the repository code
    pub executable_path: String,

    pub code_pointer: CodePointer,

    /// Image the code is deployed in, when it runs in a container
    #[serde(default)]
    pub container_image: Option<String>,
}

impl RepositoryPythonOrigin {
    pub fn new(executable_path: impl Into<String>, code_pointer: CodePointer) -> Self {
        Self {
            executable_path: executable_path.into(),
            code_pointer,
            container_image: None,
        }
    }

    pub fn with_container_image(mut self, image: Option<String>) -> Self {
        self.container_image = image;
        self
    }
}

impl Origin for RepositoryPythonOrigin {
    const KIND: &'static str = "repository_python_origin";
}

/// In-runtime origin of a pipeline: which repository code defines it
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PipelinePythonOrigin {
    pub pipeline_name: String,
    pub repository_origin: RepositoryPythonOrigin,
}

impl PipelinePythonOrigin {
    pub fn new(pipeline_name: impl Into<String>, repository_origin: RepositoryPythonOrigin) -> Self {
        Self {
            pipeline_name: pipeline_name.into(),
            repository_origin,
        }
    }

    pub fn code_pointer(&self) -> &CodePointer {
        &self.repository_origin.code_pointer
    }

    /// True when every identifying field is filled in
    pub fn is_complete(&self) -> bool {
        !self.pipeline_name.is_empty()
            && !self.repository_origin.executable_path.is_empty()
            && self.code_pointer().check_not_empty().is_ok()
    }

    /// Re-import the pipeline definition this origin points at
    pub fn load_definition(&self) -> Result<PipelineDefinition, ResolutionError> {
        let repository = RepositoryConfig::load_from_pointer(self.code_pointer())?;
        repository
            .pipelines
            .iter()
            .find(|p| p.name == self.pipeline_name)
            .map(|p| p.to_definition())
            .ok_or_else(|| ResolutionError::PipelineNotInRepository {
                pipeline: self.pipeline_name.clone(),
                repository: repository.repository.clone(),
            })
    }
}

impl Origin for PipelinePythonOrigin {
    const KIND: &'static str = "pipeline_python_origin";
}

/// How a repository location is reached
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RepositoryLocationOrigin {
    /// Code loaded into the current process
    InProcess {
        code_pointer: CodePointer,
        #[serde(default)]
        container_image: Option<String>,
    },
    /// A server process started and owned by the host
    ManagedGrpcServer {
        loadable_target: CodePointer,
        location_name: String,
    },
    /// A server started elsewhere
    GrpcServer {
        host: String,
        port: u16,
        location_name: String,
    },
}

impl RepositoryLocationOrigin {
    pub fn in_process(code_pointer: CodePointer) -> Self {
        RepositoryLocationOrigin::InProcess {
            code_pointer,
            container_image: None,
        }
    }

    /// Explicit name, or the repository symbol for in-process locations
    pub fn location_name(&self) -> String {
        match self {
            RepositoryLocationOrigin::InProcess { code_pointer, .. } => {
                code_pointer.fn_name().to_string()
            }
            RepositoryLocationOrigin::ManagedGrpcServer { location_name, .. }
            | RepositoryLocationOrigin::GrpcServer { location_name, .. } => location_name.clone(),
        }
    }

    /// Code pointer known to the caller without asking the location
    pub fn code_pointer(&self) -> Option<&CodePointer> {
        match self {
            RepositoryLocationOrigin::InProcess { code_pointer, .. } => Some(code_pointer),
            RepositoryLocationOrigin::ManagedGrpcServer { loadable_target, .. } => Some(loadable_target),
            RepositoryLocationOrigin::GrpcServer { .. } => None,
        }
    }

    pub fn container_image(&self) -> Option<&str> {
        match self {
            RepositoryLocationOrigin::InProcess { container_image, .. } => container_image.as_deref(),
            _ => None,
        }
    }

    /// Whether the location's code lives on this machine's filesystem
    pub fn is_local(&self) -> bool {
        !matches!(self, RepositoryLocationOrigin::GrpcServer { .. })
    }
}

impl Origin for RepositoryLocationOrigin {
    const KIND: &'static str = "repository_location_origin";
}

/// Process independent origin of a repository
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ExternalRepositoryOrigin {
    pub repository_location_origin: RepositoryLocationOrigin,
    pub repository_name: String,
}

impl Origin for ExternalRepositoryOrigin {
    const KIND: &'static str = "external_repository_origin";
}

/// Process independent origin of a pipeline
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ExternalPipelineOrigin {
    pub external_repository_origin: ExternalRepositoryOrigin,
    pub pipeline_name: String,
}

impl ExternalPipelineOrigin {
    pub fn new(
        repository_location_origin: RepositoryLocationOrigin,
        repository_name: impl Into<String>,
        pipeline_name: impl Into<String>,
    ) -> Self {
        Self {
            external_repository_origin: ExternalRepositoryOrigin {
                repository_location_origin,
                repository_name: repository_name.into(),
            },
            pipeline_name: pipeline_name.into(),
        }
    }

    pub fn location_origin(&self) -> &RepositoryLocationOrigin {
        &self.external_repository_origin.repository_location_origin
    }

    pub fn repository_name(&self) -> &str {
        &self.external_repository_origin.repository_name
    }

    pub fn is_complete(&self) -> bool {
        !self.pipeline_name.is_empty()
            && !self.repository_name().is_empty()
            && !self.location_origin().location_name().is_empty()
    }
}

impl Origin for ExternalPipelineOrigin {
    const KIND: &'static str = "external_pipeline_origin";
}
