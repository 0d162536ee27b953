//! Repository and workspace configuration from YAML

use crate::core::error::ResolutionError;
use crate::core::origin::{CodePointer, RepositoryLocationOrigin};
use crate::core::pipeline::{PipelineDefinition, RepositoryDefinition};
use anyhow::{Context, Result};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

fn name_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^[A-Za-z0-9_]+$").expect("valid name pattern"))
}

/// Check that a repository, pipeline or solid name is usable as an identifier
pub fn validate_name(kind: &str, name: &str) -> Result<()> {
    if !name_pattern().is_match(name) {
        anyhow::bail!(
            "{} name '{}' must contain only letters, digits and underscores",
            kind,
            name
        );
    }
    Ok(())
}

/// A repository definition file
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RepositoryConfig {
    /// Repository name
    pub repository: String,

    /// Symbol that code pointers use to address this repository
    pub symbol: String,

    /// Optional description
    #[serde(default)]
    pub description: Option<String>,

    /// Pipelines defined in the repository
    pub pipelines: Vec<PipelineConfig>,
}

/// Pipeline as defined in a repository file
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    pub name: String,

    #[serde(default)]
    pub description: Option<String>,

    /// Modes the pipeline can run in
    #[serde(default = "default_modes")]
    pub modes: Vec<String>,

    #[serde(default)]
    pub tags: BTreeMap<String, String>,

    pub solids: Vec<SolidConfig>,
}

/// A single computation inside a pipeline
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SolidConfig {
    pub name: String,

    #[serde(default)]
    pub description: Option<String>,

    #[serde(default)]
    pub inputs: Vec<String>,

    #[serde(default = "default_outputs")]
    pub outputs: Vec<String>,

    /// Solids whose outputs feed this one
    #[serde(default)]
    pub depends_on: Vec<String>,
}

fn default_modes() -> Vec<String> {
    vec!["default".to_string()]
}

fn default_outputs() -> Vec<String> {
    vec!["result".to_string()]
}

impl RepositoryConfig {
    /// Load a repository definition from a YAML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read repository file {}", path.display()))?;
        Self::from_yaml(&content)
    }

    /// Parse a repository definition from a YAML string
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: RepositoryConfig = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Import the repository a code pointer addresses
    pub fn load_from_pointer(pointer: &CodePointer) -> Result<Self, ResolutionError> {
        let path = pointer.locate()?;
        let config = Self::from_file(&path).map_err(|e| ResolutionError::Load {
            path: path.clone(),
            reason: format!("{:#}", e),
        })?;

        if config.symbol != pointer.fn_name() {
            return Err(ResolutionError::SymbolMismatch {
                expected: pointer.fn_name().to_string(),
                found: config.symbol,
            });
        }

        Ok(config)
    }

    /// Validate the repository definition
    pub fn validate(&self) -> Result<()> {
        validate_name("Repository", &self.repository)?;
        validate_name("Symbol", &self.symbol)?;

        let mut seen_pipelines = HashSet::new();
        for pipeline in &self.pipelines {
            if !seen_pipelines.insert(&pipeline.name) {
                anyhow::bail!("Duplicate pipeline name: {}", pipeline.name);
            }
            pipeline.validate()?;
        }

        Ok(())
    }

    /// Convert into the repository domain model
    pub fn to_definition(&self) -> RepositoryDefinition {
        RepositoryDefinition::from_config(self)
    }
}

impl PipelineConfig {
    pub fn validate(&self) -> Result<()> {
        validate_name("Pipeline", &self.name)?;

        if self.modes.is_empty() {
            anyhow::bail!("Pipeline '{}' must define at least one mode", self.name);
        }

        let mut seen_ids = HashSet::new();
        for solid in &self.solids {
            validate_name("Solid", &solid.name)?;
            if !seen_ids.insert(&solid.name) {
                anyhow::bail!("Duplicate solid '{}' in pipeline '{}'", solid.name, self.name);
            }
        }

        for solid in &self.solids {
            for dep in &solid.depends_on {
                if !seen_ids.contains(dep) {
                    anyhow::bail!(
                        "Solid '{}' in pipeline '{}' depends on non-existent solid '{}'",
                        solid.name,
                        self.name,
                        dep
                    );
                }
            }
        }

        self.check_cycles()
    }

    fn check_cycles(&self) -> Result<()> {
        let mut visited = HashSet::new();
        let mut recursion_stack = HashSet::new();

        for solid in &self.solids {
            if !visited.contains(&solid.name) {
                self.dfs_check(&solid.name, &mut visited, &mut recursion_stack)?;
            }
        }

        Ok(())
    }

    fn dfs_check(
        &self,
        solid_name: &str,
        visited: &mut HashSet<String>,
        recursion_stack: &mut HashSet<String>,
    ) -> Result<()> {
        visited.insert(solid_name.to_string());
        recursion_stack.insert(solid_name.to_string());

        if let Some(solid) = self.solids.iter().find(|s| s.name == solid_name) {
            for dep in &solid.depends_on {
                if recursion_stack.contains(dep) {
                    anyhow::bail!(
                        "Cycle detected in pipeline '{}' involving solid '{}'",
                        self.name,
                        dep
                    );
                }
                if !visited.contains(dep) {
                    self.dfs_check(dep, visited, recursion_stack)?;
                }
            }
        }

        recursion_stack.remove(solid_name);
        Ok(())
    }

    pub fn to_definition(&self) -> PipelineDefinition {
        PipelineDefinition::from_config(self)
    }
}

/// Workspace file listing the repository locations to load
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkspaceConfig {
    pub load_from: Vec<LocationConfig>,

    /// Directory relative paths are resolved against (not serialized)
    #[serde(skip)]
    base_dir: Option<PathBuf>,
}

/// One entry of a workspace file
///
/// Exactly one of `python_file`, `python_module` or `grpc_server` must be set.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LocationConfig {
    #[serde(default)]
    pub python_file: Option<PathBuf>,

    #[serde(default)]
    pub python_module: Option<String>,

    #[serde(default)]
    pub fn_name: Option<String>,

    #[serde(default)]
    pub working_directory: Option<PathBuf>,

    /// When set, the code is served by a managed server under this name
    #[serde(default)]
    pub location_name: Option<String>,

    #[serde(default)]
    pub grpc_server: Option<GrpcServerConfig>,
}

/// A server started outside this process
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GrpcServerConfig {
    pub host: String,
    pub port: u16,
    pub location_name: String,

    /// Repository file the server has loaded
    #[serde(default)]
    pub serving: Option<PathBuf>,

    #[serde(default)]
    pub serving_fn_name: Option<String>,

    /// Whether the server reports its code pointer to clients
    #[serde(default = "default_true")]
    pub report_code_pointer: bool,
}

fn default_true() -> bool {
    true
}

impl WorkspaceConfig {
    /// Load a workspace from a YAML file; relative paths resolve against its directory
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read workspace file {}", path.display()))?;
        let mut config = Self::from_yaml(&content)?;
        config.base_dir = path.parent().map(Path::to_path_buf);
        Ok(config)
    }

    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: WorkspaceConfig = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    pub fn with_base_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.base_dir = Some(dir.into());
        self
    }

    /// Directory the workspace file was loaded from
    pub fn base_dir(&self) -> Option<&Path> {
        self.base_dir.as_deref()
    }

    pub fn validate(&self) -> Result<()> {
        let mut names = HashSet::new();
        for (index, location) in self.load_from.iter().enumerate() {
            location
                .validate()
                .with_context(|| format!("Invalid workspace entry #{}", index + 1))?;
            let name = location
                .to_origin(Path::to_path_buf)
                .map(|origin| origin.location_name());
            if let Some(name) = name {
                if !names.insert(name.clone()) {
                    anyhow::bail!("Duplicate location name: {}", name);
                }
            }
        }
        Ok(())
    }

    fn resolve(&self, path: &Path) -> PathBuf {
        match &self.base_dir {
            Some(base) if path.is_relative() => base.join(path),
            _ => path.to_path_buf(),
        }
    }

    /// Location origins described by this workspace
    pub fn location_origins(&self) -> Vec<RepositoryLocationOrigin> {
        self.load_from
            .iter()
            .filter_map(|location| location.to_origin(|p| self.resolve(p)))
            .collect()
    }

    /// Servers this workspace expects to be running, with what they serve
    pub fn served_repositories(&self) -> Vec<(GrpcServerConfig, Option<CodePointer>)> {
        self.load_from
            .iter()
            .filter_map(|location| location.grpc_server.clone())
            .map(|server| {
                let pointer = match (&server.serving, &server.serving_fn_name) {
                    (Some(file), Some(fn_name)) => {
                        Some(CodePointer::for_file(self.resolve(file), fn_name.clone()))
                    }
                    _ => None,
                };
                (server, pointer)
            })
            .collect()
    }
}

impl LocationConfig {
    pub fn validate(&self) -> Result<()> {
        let kinds = [
            self.python_file.is_some(),
            self.python_module.is_some(),
            self.grpc_server.is_some(),
        ]
        .iter()
        .filter(|set| **set)
        .count();

        if kinds != 1 {
            anyhow::bail!("Exactly one of python_file, python_module or grpc_server must be set");
        }

        if self.grpc_server.is_none() && self.fn_name.as_deref().map_or(true, str::is_empty) {
            anyhow::bail!("fn_name is required for python_file and python_module locations");
        }

        if let Some(server) = &self.grpc_server {
            if server.host.is_empty() {
                anyhow::bail!("gRPC server host must not be empty");
            }
            if server.serving.is_some() != server.serving_fn_name.is_some() {
                anyhow::bail!(
                    "gRPC server '{}' must set both serving and serving_fn_name",
                    server.location_name
                );
            }
        }

        Ok(())
    }

    fn to_origin(&self, resolve: impl Fn(&Path) -> PathBuf) -> Option<RepositoryLocationOrigin> {
        if let Some(server) = &self.grpc_server {
            return Some(RepositoryLocationOrigin::GrpcServer {
                host: server.host.clone(),
                port: server.port,
                location_name: server.location_name.clone(),
            });
        }

        let fn_name = self.fn_name.clone()?;
        let mut pointer = match (&self.python_file, &self.python_module) {
            (Some(file), _) => CodePointer::for_file(resolve(file), fn_name),
            (None, Some(module)) => CodePointer::for_module(module.clone(), fn_name),
            (None, None) => return None,
        };
        if let Some(dir) = &self.working_directory {
            pointer = pointer.with_working_directory(resolve(dir));
        } else if self.python_module.is_some() {
            pointer = pointer.with_working_directory(resolve(Path::new("")));
        }

        Some(match &self.location_name {
            Some(name) => RepositoryLocationOrigin::ManagedGrpcServer {
                loadable_target: pointer,
                location_name: name.clone(),
            },
            None => RepositoryLocationOrigin::in_process(pointer),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const REPO_YAML: &str = r#"
repository: demo_execution_repo
symbol: define_demo_execution_repo
pipelines:
  - name: demo_pipeline
    solids:
      - name: count_letters
        inputs: [word]
      - name: multiply_the_word
        depends_on: [count_letters]
"#;

    #[test]
    fn test_parse_repository() {
        let config = RepositoryConfig::from_yaml(REPO_YAML).unwrap();
        assert_eq!(config.repository, "demo_execution_repo");
        assert_eq!(config.pipelines.len(), 1);

        let pipeline = &config.pipelines[0];
        assert_eq!(pipeline.modes, vec!["default".to_string()]);
        assert_eq!(pipeline.solids[0].outputs, vec!["result".to_string()]);
    }

    #[test]
    fn test_duplicate_pipeline_fails() {
        let yaml = r#"
repository: repo
symbol: define_repo
pipelines:
  - name: one
    solids: []
  - name: one
    solids: []
"#;
        assert!(RepositoryConfig::from_yaml(yaml).is_err());
    }

    #[test]
    fn test_invalid_dependency_fails() {
        let yaml = r#"
repository: repo
symbol: define_repo
pipelines:
  - name: one
    solids:
      - name: a
        depends_on: [missing]
"#;
        let err = RepositoryConfig::from_yaml(yaml).unwrap_err();
        assert!(err.to_string().contains("missing"));
    }

    #[test]
    fn test_cycle_fails() {
        let yaml = r#"
repository: repo
symbol: define_repo
pipelines:
  - name: one
    solids:
      - name: a
        depends_on: [b]
      - name: b
        depends_on: [a]
"#;
        let err = RepositoryConfig::from_yaml(yaml).unwrap_err();
        assert!(err.to_string().contains("Cycle detected"));
    }

    #[test]
    fn test_invalid_name_fails() {
        let yaml = r#"
repository: "demo repo"
symbol: define_repo
pipelines: []
"#;
        let err = RepositoryConfig::from_yaml(yaml).unwrap_err();
        assert!(err.to_string().contains("demo repo"));
    }

    #[test]
    fn test_load_from_pointer_checks_symbol() {
        let path = std::env::temp_dir().join(format!("origin_repo_{}.yaml", uuid::Uuid::new_v4()));
        std::fs::write(&path, REPO_YAML).unwrap();

        let pointer = CodePointer::for_file(&path, "define_demo_execution_repo");
        let config = RepositoryConfig::load_from_pointer(&pointer).unwrap();
        assert_eq!(config.repository, "demo_execution_repo");

        let wrong = CodePointer::for_file(&path, "define_other_repo");
        match RepositoryConfig::load_from_pointer(&wrong) {
            Err(ResolutionError::SymbolMismatch { expected, found }) => {
                assert_eq!(expected, "define_other_repo");
                assert_eq!(found, "define_demo_execution_repo");
            }
            other => panic!("Expected SymbolMismatch, got {:?}", other),
        }

        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn test_workspace_location_origins() {
        let yaml = r#"
load_from:
  - python_file: test_pipelines/repo.yaml
    fn_name: define_demo_execution_repo
  - python_module: test_pipelines.repo
    fn_name: define_demo_execution_repo
    location_name: managed
  - grpc_server:
      host: localhost
      port: 4266
      location_name: remote
"#;
        let config = WorkspaceConfig::from_yaml(yaml).unwrap().with_base_dir("/srv/project");
        let origins = config.location_origins();
        assert_eq!(origins.len(), 3);

        assert_eq!(
            origins[0],
            RepositoryLocationOrigin::in_process(CodePointer::for_file(
                "/srv/project/test_pipelines/repo.yaml",
                "define_demo_execution_repo"
            ))
        );
        assert_eq!(origins[1].location_name(), "managed");
        assert_eq!(
            origins[1].code_pointer().map(CodePointer::source_path),
            Some(PathBuf::from("/srv/project/test_pipelines/repo.yaml"))
        );
        assert_eq!(origins[0].location_name(), "define_demo_execution_repo");
        assert_eq!(origins[2].location_name(), "remote");
    }

    #[test]
    fn test_in_process_locations_need_distinct_symbols() {
        let yaml = r#"
load_from:
  - python_file: first/repo.yaml
    fn_name: define_repo
  - python_file: second/repo.yaml
    fn_name: define_repo
"#;
        let err = WorkspaceConfig::from_yaml(yaml).unwrap_err();
        assert!(err.to_string().contains("Duplicate location name: define_repo"));

        let yaml = r#"
load_from:
  - python_file: repo.yaml
    fn_name: define_repo
  - python_module: other.repo
    fn_name: define_other_repo
  - grpc_server:
      host: localhost
      port: 4266
      location_name: define_repo
"#;
        assert!(WorkspaceConfig::from_yaml(yaml).is_err());
    }

    #[test]
    fn test_workspace_entry_needs_exactly_one_kind() {
        let yaml = r#"
load_from:
  - python_file: repo.yaml
    python_module: repo
    fn_name: define_repo
"#;
        assert!(WorkspaceConfig::from_yaml(yaml).is_err());

        let yaml = r#"
load_from:
  - python_file: repo.yaml
"#;
        assert!(WorkspaceConfig::from_yaml(yaml).is_err());
    }
}
