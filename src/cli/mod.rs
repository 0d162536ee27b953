//! Command-line interface

pub mod commands;
pub mod output;

use clap::{Parser, Subcommand};
use commands::{ListCommand, OriginCommand, RunsCommand, SubmitCommand, ValidateCommand};
use std::ffi::OsString;

/// Resolve pipeline origins across process boundaries
#[derive(Debug, Parser, Clone)]
#[command(name = "pipeline-origin")]
#[command(author = "Pipeline Contributors")]
#[command(version = "0.1.0")]
#[command(about = "Resolve and record pipeline origins", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Path to a workspace file (defaults to ./workspace.yaml)
    #[arg(short, long, global = true)]
    pub workspace: Option<String>,
}

/// Available commands
#[derive(Debug, Subcommand, Clone)]
pub enum Command {
    /// List repositories and pipelines in the workspace
    List(ListCommand),

    /// Show the origins of a pipeline
    Origin(OriginCommand),

    /// Record a run together with its origins
    Submit(SubmitCommand),

    /// Show recorded runs
    Runs(RunsCommand),

    /// Validate a repository definition file
    Validate(ValidateCommand),
}

impl Cli {
    /// Parse CLI arguments from environment
    pub fn from_args() -> Self {
        Self::parse()
    }

    /// Parse CLI arguments from a slice
    pub fn try_parse_from<I, T>(itr: I) -> Result<Self, clap::Error>
    where
        I: IntoIterator<Item = T>,
        T: Into<OsString> + Clone,
    {
        <Self as Parser>::try_parse_from(itr)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_origin_command() {
        let cli = Cli::try_parse_from([
            "pipeline-origin",
            "origin",
            "demo_pipeline_celery",
            "--reoriginate",
            "--image",
            "registry/demo:latest",
        ])
        .unwrap();

        match cli.command {
            Command::Origin(cmd) => {
                assert_eq!(cmd.pipeline, "demo_pipeline_celery");
                assert!(cmd.reorigin.reoriginate);
                assert_eq!(cmd.reorigin.image.as_deref(), Some("registry/demo:latest"));
            }
            other => panic!("Expected origin command, got {:?}", other),
        }
    }

    #[test]
    fn test_global_workspace_flag() {
        let cli = Cli::try_parse_from(["pipeline-origin", "list", "--workspace", "ws.yaml", "-v"]).unwrap();
        assert_eq!(cli.workspace.as_deref(), Some("ws.yaml"));
        assert!(cli.verbose);
    }

    #[test]
    fn test_runs_defaults() {
        let cli = Cli::try_parse_from(["pipeline-origin", "runs"]).unwrap();
        match cli.command {
            Command::Runs(cmd) => {
                assert_eq!(cmd.limit, 10);
                assert!(cmd.pipeline.is_none());
            }
            other => panic!("Expected runs command, got {:?}", other),
        }
    }
}
