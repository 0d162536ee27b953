//! CLI command definitions

use crate::core::ResolutionError;
use crate::host::{
    ExternalPipeline, OriginSource, PipelineOrigins, ReOriginatedPipeline, ReoriginConfig,
    Workspace,
};
use clap::Args;

/// List repositories and pipelines
#[derive(Debug, Args, Clone)]
pub struct ListCommand {
    /// Output in JSON format
    #[arg(long)]
    pub json: bool,
}

/// Options for re-deriving origins for another context
#[derive(Debug, Args, Clone)]
pub struct ReoriginArgs {
    /// Derive origins as seen from the deployed context
    #[arg(long)]
    pub reoriginate: bool,

    /// Root of the code in the deployed context
    #[arg(long)]
    pub deploy_root: Option<String>,

    /// Container image of the deployed context
    #[arg(long)]
    pub image: Option<String>,

    /// Executable used in the deployed context
    #[arg(long)]
    pub executable: Option<String>,
}

impl ReoriginArgs {
    /// Build re-origin settings on top of `base`
    pub fn to_config(&self, base: ReoriginConfig) -> ReoriginConfig {
        let mut config = base;
        if let Some(root) = &self.deploy_root {
            config = config.with_deploy_root(root);
        }
        if let Some(executable) = &self.executable {
            config = config.with_executable_path(executable.clone());
        }
        if self.image.is_some() {
            config = config.with_container_image(self.image.clone());
        }
        config
    }

    /// Origins of `pipeline`, re-originated when requested
    ///
    /// File pointers keep their layout relative to the workspace directory.
    pub fn resolve_origins(
        &self,
        pipeline: &ExternalPipeline,
        workspace: &Workspace,
    ) -> Result<PipelineOrigins, ResolutionError> {
        if self.reoriginate {
            let config = self.to_config(workspace.reorigin_config());
            ReOriginatedPipeline::new(pipeline, config).get_origins()
        } else {
            pipeline.get_origins()
        }
    }
}

/// Show a pipeline's origins
#[derive(Debug, Args, Clone)]
pub struct OriginCommand {
    /// Pipeline name
    pub pipeline: String,

    #[command(flatten)]
    pub reorigin: ReoriginArgs,

    /// Output in JSON format
    #[arg(long)]
    pub json: bool,
}

/// Record a run with its origins
#[derive(Debug, Args, Clone)]
pub struct SubmitCommand {
    /// Pipeline name
    pub pipeline: String,

    #[command(flatten)]
    pub reorigin: ReoriginArgs,

    /// Don't save the run to history
    #[arg(long)]
    pub no_history: bool,
}

/// Show recorded runs
#[derive(Debug, Args, Clone)]
pub struct RunsCommand {
    /// Pipeline name to filter by
    #[arg(short, long)]
    pub pipeline: Option<String>,

    /// Number of recent runs to show
    #[arg(short, long, default_value_t = 10)]
    pub limit: usize,

    /// Show a specific run
    #[arg(long)]
    pub run_id: Option<String>,

    /// Output in JSON format
    #[arg(long)]
    pub json: bool,
}

/// Validate a repository definition file
#[derive(Debug, Args, Clone)]
pub struct ValidateCommand {
    /// Path to repository YAML file
    #[arg(short, long)]
    pub file: String,

    /// Output in JSON format
    #[arg(long)]
    pub json: bool,
}
