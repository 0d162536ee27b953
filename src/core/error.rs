//! Error types for origin resolution and repository locations

use std::path::PathBuf;
use thiserror::Error;

/// Raised when an origin cannot be derived because the code defining a
/// pipeline can no longer be located
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ResolutionError {
    #[error("Module '{module}' not found at {}", .path.display())]
    ModuleNotFound { module: String, path: PathBuf },

    #[error("Repository file not found: {}", .path.display())]
    FileNotFound { path: PathBuf },

    #[error("Location '{location}' did not report a code pointer")]
    MissingCodePointer { location: String },

    #[error("Code pointer is empty: {0}")]
    EmptyPointer(String),

    #[error("Code pointer expects symbol '{expected}' but the repository defines '{found}'")]
    SymbolMismatch { expected: String, found: String },

    #[error("Pipeline '{pipeline}' is not defined in repository '{repository}'")]
    PipelineNotInRepository { pipeline: String, repository: String },

    #[error("Failed to load {}: {reason}", .path.display())]
    Load { path: PathBuf, reason: String },
}

/// Errors raised while acquiring a repository location or looking up
/// objects inside it
#[derive(Debug, Error)]
pub enum LocationError {
    #[error("Failed to load repository location '{location}': {reason}")]
    Load { location: String, reason: String },

    #[error("Repository '{repository}' not found in location '{location}'")]
    RepositoryNotFound { repository: String, location: String },

    #[error("Pipeline '{pipeline}' not found in repository '{repository}'")]
    PipelineNotFound { pipeline: String, repository: String },

    #[error("Cannot load from gRPC server at {host}:{port}: no server is registered there")]
    UnreachableServer { host: String, port: u16 },

    #[error("Location '{0}' is not part of this workspace")]
    UnknownLocation(String),

    #[error(transparent)]
    Resolution(#[from] ResolutionError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolution_error_messages() {
        let err = ResolutionError::ModuleNotFound {
            module: "test_pipelines.repo".to_string(),
            path: PathBuf::from("/srv/test_pipelines/repo.yaml"),
        };
        let msg = err.to_string();
        assert!(msg.contains("test_pipelines.repo"));
        assert!(msg.contains("/srv/test_pipelines/repo.yaml"));
    }

    #[test]
    fn test_location_error_wraps_resolution_error() {
        let err: LocationError = ResolutionError::EmptyPointer("fn_name".to_string()).into();
        assert!(matches!(err, LocationError::Resolution(ResolutionError::EmptyPointer(_))));
        assert_eq!(err.to_string(), "Code pointer is empty: fn_name");
    }
}
