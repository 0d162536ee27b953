use anyhow::{Context, Result};
use pipeline_origin::cli::commands::{
    ListCommand, OriginCommand, RunsCommand, SubmitCommand, ValidateCommand,
};
use pipeline_origin::cli::output::*;
use pipeline_origin::cli::{Cli, Command};
use pipeline_origin::core::config::RepositoryConfig;
use pipeline_origin::host::Workspace;
use pipeline_origin::persistence::{
    create_record, InMemoryPersistence, PersistenceBackend, RunOriginRecord, SqliteRunStore,
};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

/// Workspace file looked up in the current directory
const DEFAULT_WORKSPACE_FILE: &str = "workspace.yaml";

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::from_args();

    // Initialize logging
    let log_level = if cli.verbose { Level::DEBUG } else { Level::INFO };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)
        .context("Failed to set logging subscriber")?;

    match &cli.command {
        Command::List(cmd) => list_pipelines(cmd, &load_workspace(&cli)?)?,
        Command::Origin(cmd) => show_origin(cmd, &load_workspace(&cli)?)?,
        Command::Submit(cmd) => submit_run(cmd, &load_workspace(&cli)?).await?,
        Command::Runs(cmd) => show_runs(cmd).await?,
        Command::Validate(cmd) => validate_repository(cmd)?,
    }

    Ok(())
}

fn load_workspace(cli: &Cli) -> Result<Workspace> {
    let path = cli
        .workspace
        .clone()
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_WORKSPACE_FILE));
    info!("Loading workspace from {}", path.display());
    Workspace::from_file(&path).with_context(|| format!("Failed to load workspace {}", path.display()))
}

fn list_pipelines(cmd: &ListCommand, workspace: &Workspace) -> Result<()> {
    let mut json_data = Vec::new();

    for (location_name, result) in workspace.list_repositories() {
        match result {
            Ok(repositories) => {
                println!("{} Location {}", INFO, style(&location_name).bold());
                for repository in repositories {
                    println!("  {}", style(repository.name()).cyan());
                    for pipeline in repository.pipeline_names() {
                        println!("    {}", pipeline);
                    }
                    json_data.push(serde_json::json!({
                        "location": location_name,
                        "repository": repository.name(),
                        "pipelines": repository.pipeline_names(),
                    }));
                }
            }
            Err(e) => {
                println!("{} Location {}: {}", WARN, style(&location_name).bold(), style(e).red());
            }
        }
    }

    if cmd.json {
        let data = serde_json::json!({ "repositories": json_data });
        println!("\n{}", serde_json::to_string_pretty(&data)?);
    }

    Ok(())
}

fn show_origin(cmd: &OriginCommand, workspace: &Workspace) -> Result<()> {
    let pipeline = workspace.find_pipeline(&cmd.pipeline)?;
    let origins = cmd.reorigin.resolve_origins(&pipeline, workspace)?;

    if cmd.json {
        println!("{}", serde_json::to_string_pretty(&origins)?);
    } else {
        println!("{}", format_python_origin(&origins.python_origin));
        println!("{}", format_external_origin(&origins.external_origin));
    }

    Ok(())
}

async fn submit_run(cmd: &SubmitCommand, workspace: &Workspace) -> Result<()> {
    let record = {
        let pipeline = workspace.find_pipeline(&cmd.pipeline)?;
        create_record(
            cmd.reorigin.resolve_origins(&pipeline, workspace)?,
            cmd.reorigin.reoriginate,
        )
    };

    let store: Arc<dyn PersistenceBackend> = if cmd.no_history {
        Arc::new(InMemoryPersistence::new())
    } else {
        Arc::new(SqliteRunStore::with_default_path().await?)
    };
    store.save_run(&record).await?;

    println!(
        "{} Submitted {} (run {})",
        CHECK,
        style(&record.pipeline_name).bold(),
        style(&record.run_id.to_string()[..8]).dim()
    );
    println!("{}", format_external_origin(&record.external_origin));

    Ok(())
}

async fn show_runs(cmd: &RunsCommand) -> Result<()> {
    let store = SqliteRunStore::with_default_path().await?;

    if let Some(run_id) = &cmd.run_id {
        let run_id = uuid::Uuid::parse_str(run_id).context("Invalid run ID format")?;
        match store.load_run(run_id).await? {
            Some(record) => print_run_details(&record, cmd.json)?,
            None => println!("{} Run not found", WARN),
        }
        return Ok(());
    }

    let mut runs: Vec<RunOriginRecord> = match &cmd.pipeline {
        Some(pipeline_name) => store.list_runs(pipeline_name).await?,
        None => {
            let mut all_runs = Vec::new();
            for pipeline in store.list_pipelines().await? {
                all_runs.extend(store.list_runs(&pipeline).await?);
            }
            all_runs
        }
    };
    runs.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    runs.truncate(cmd.limit);

    if runs.is_empty() {
        println!("{} No runs found", INFO);
        return Ok(());
    }

    if cmd.json {
        let data = serde_json::json!({ "runs": runs });
        println!("{}", serde_json::to_string_pretty(&data)?);
    } else {
        println!("{} Recorded runs (showing latest {}):", INFO, cmd.limit);
        for record in &runs {
            println!("  {}", format_run_record(record));
        }
    }

    Ok(())
}

fn print_run_details(record: &RunOriginRecord, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(record)?);
        return Ok(());
    }

    println!("{} Run {}", INFO, style(record.run_id).cyan());
    println!("  Submitted: {}", style(record.created_at.to_rfc3339()).dim());
    println!("{}", format_python_origin(&record.python_origin));
    println!("{}", format_external_origin(&record.external_origin));
    Ok(())
}

fn validate_repository(cmd: &ValidateCommand) -> Result<()> {
    println!("{} Validating repository...", INFO);

    match RepositoryConfig::from_file(&cmd.file) {
        Ok(config) => {
            println!("{} Repository definition is valid!", CHECK);
            println!("  Name: {}", style(&config.repository).bold());
            println!("  Symbol: {}", style(&config.symbol).cyan());
            println!("  Pipelines: {}", style(config.pipelines.len()).cyan());

            if cmd.json {
                let json = serde_json::to_string_pretty(&config)?;
                println!("\n{}", json);
            }
            Ok(())
        }
        Err(e) => {
            println!("{} Validation failed:", CROSS);
            println!("  {}", style(format!("{:#}", e)).red());
            std::process::exit(1);
        }
    }
}
