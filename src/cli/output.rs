//! CLI output formatting

use crate::core::origin::{
    CodePointer, ExternalPipelineOrigin, Origin, PipelinePythonOrigin, RepositoryLocationOrigin,
};
use crate::persistence::RunOriginRecord;
use console::Emoji;

// Re-export style
pub use console::style;

// Emojis for output
pub static CHECK: Emoji<'_, '_> = Emoji("✅ ", "✓ ");
pub static CROSS: Emoji<'_, '_> = Emoji("❌ ", "✗ ");
pub static INFO: Emoji<'_, '_> = Emoji("ℹ️  ", "i ");
pub static WARN: Emoji<'_, '_> = Emoji("⚠️  ", "!");
pub static PIN: Emoji<'_, '_> = Emoji("📍 ", "@ ");

/// Format a code pointer for display
pub fn format_code_pointer(pointer: &CodePointer) -> String {
    let kind = match pointer {
        CodePointer::File { .. } => "file",
        CodePointer::Module { .. } => "module",
    };
    let mut line = format!("{} {}", style(kind).dim(), style(pointer.describe()).cyan());
    if let Some(dir) = pointer.working_directory() {
        line.push_str(&format!(" (cwd {})", style(dir.display()).dim()));
    }
    line
}

/// Format a repository location origin for display
pub fn format_location_origin(origin: &RepositoryLocationOrigin) -> String {
    match origin {
        RepositoryLocationOrigin::InProcess { code_pointer, container_image } => {
            let mut line = format!("in-process {}", format_code_pointer(code_pointer));
            if let Some(image) = container_image {
                line.push_str(&format!(" [image {}]", style(image).yellow()));
            }
            line
        }
        RepositoryLocationOrigin::ManagedGrpcServer { loadable_target, location_name } => format!(
            "managed server {} serving {}",
            style(location_name).bold(),
            format_code_pointer(loadable_target)
        ),
        RepositoryLocationOrigin::GrpcServer { host, port, location_name } => format!(
            "gRPC server {} at {}",
            style(location_name).bold(),
            style(format!("{}:{}", host, port)).cyan()
        ),
    }
}

/// Format a python origin as indented lines
pub fn format_python_origin(origin: &PipelinePythonOrigin) -> String {
    let repository = &origin.repository_origin;
    let mut lines = vec![
        format!("{}Python origin {}", PIN, style(&origin.get_id().to_string()[..8]).dim()),
        format!("  Pipeline:   {}", style(&origin.pipeline_name).bold()),
        format!("  Executable: {}", repository.executable_path),
        format!("  Code:       {}", format_code_pointer(&repository.code_pointer)),
    ];
    if let Some(image) = &repository.container_image {
        lines.push(format!("  Image:      {}", style(image).yellow()));
    }
    lines.join("\n")
}

/// Format an external origin as indented lines
pub fn format_external_origin(origin: &ExternalPipelineOrigin) -> String {
    [
        format!("{}External origin {}", PIN, style(&origin.get_id().to_string()[..8]).dim()),
        format!("  Pipeline:   {}", style(&origin.pipeline_name).bold()),
        format!("  Repository: {}", origin.repository_name()),
        format!("  Location:   {}", format_location_origin(origin.location_origin())),
    ]
    .join("\n")
}

/// Format a run record as a single line
pub fn format_run_record(record: &RunOriginRecord) -> String {
    let marker = if record.reoriginated {
        style("re-originated").yellow().to_string()
    } else {
        style("local").dim().to_string()
    };

    format!(
        "{} {} - {} - {} - external {}",
        INFO,
        style(&record.run_id.to_string()[..8]).dim(),
        style(&record.pipeline_name).bold(),
        marker,
        style(&record.external_origin_id().to_string()[..8]).cyan()
    )
}
