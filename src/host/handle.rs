//! Scoped repository location handles

use crate::core::config::RepositoryConfig;
use crate::core::origin::{CodePointer, RepositoryLocationOrigin, DEFAULT_EXECUTABLE_PATH};
use crate::core::pipeline::RepositoryDefinition;
use crate::core::LocationError;
use crate::host::external::{ExternalPipeline, ExternalRepository, RepositoryHandle};
use std::collections::HashMap;
use std::ops::Deref;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, PoisonError, RwLock};
use tracing::{debug, info};

/// Counts location handles so callers can check they were released
#[derive(Debug, Clone, Default)]
pub struct HandleTracker {
    active: Arc<AtomicUsize>,
    acquired: Arc<AtomicUsize>,
}

impl HandleTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Handles currently held
    pub fn active_count(&self) -> usize {
        self.active.load(Ordering::SeqCst)
    }

    /// Handles acquired over the tracker's lifetime
    pub fn total_acquired(&self) -> usize {
        self.acquired.load(Ordering::SeqCst)
    }

    fn acquire(&self) {
        self.active.fetch_add(1, Ordering::SeqCst);
        self.acquired.fetch_add(1, Ordering::SeqCst);
    }

    fn release(&self) {
        self.active.fetch_sub(1, Ordering::SeqCst);
    }
}

/// What a server process has loaded
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServedRepository {
    pub code_pointer: CodePointer,

    /// Whether the server tells clients where its code lives
    pub report_code_pointer: bool,
}

/// Servers reachable from this host, keyed by host and port
#[derive(Debug, Clone, Default)]
pub struct GrpcServerRegistry {
    servers: Arc<RwLock<HashMap<(String, u16), ServedRepository>>>,
}

impl GrpcServerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, host: &str, port: u16, served: ServedRepository) {
        // Entries are inserted whole, so a poisoned map is still consistent
        let mut servers = self.servers.write().unwrap_or_else(PoisonError::into_inner);
        servers.insert((host.to_string(), port), served);
    }

    pub fn lookup(&self, host: &str, port: u16) -> Option<ServedRepository> {
        let servers = self.servers.read().unwrap_or_else(PoisonError::into_inner);
        servers.get(&(host.to_string(), port)).cloned()
    }
}

/// An open repository location
///
/// Holding the handle keeps the location loaded; dropping it releases the
/// location on every exit path, including unwinding.
#[derive(Debug)]
pub struct RepositoryLocationHandle {
    origin: RepositoryLocationOrigin,
    repositories: Vec<RepositoryDefinition>,

    /// Code pointer known for this location, if any
    code_pointer: Option<CodePointer>,

    tracker: HandleTracker,
}

impl RepositoryLocationHandle {
    /// Load the location an origin describes
    pub fn create(
        origin: RepositoryLocationOrigin,
        servers: &GrpcServerRegistry,
        tracker: &HandleTracker,
    ) -> Result<Self, LocationError> {
        let location_name = origin.location_name();
        debug!("Opening repository location {}", location_name);

        let (pointer, reported) = match &origin {
            RepositoryLocationOrigin::InProcess { code_pointer, .. } => {
                (code_pointer.clone(), Some(code_pointer.clone()))
            }
            RepositoryLocationOrigin::ManagedGrpcServer { loadable_target, .. } => {
                (loadable_target.clone(), Some(loadable_target.clone()))
            }
            RepositoryLocationOrigin::GrpcServer { host, port, .. } => {
                let served = servers
                    .lookup(host, *port)
                    .ok_or_else(|| LocationError::UnreachableServer {
                        host: host.clone(),
                        port: *port,
                    })?;
                let reported = served
                    .report_code_pointer
                    .then(|| served.code_pointer.clone());
                (served.code_pointer, reported)
            }
        };

        let repository = RepositoryConfig::load_from_pointer(&pointer)
            .map_err(|e| LocationError::Load {
                location: location_name.clone(),
                reason: e.to_string(),
            })?
            .to_definition();

        tracker.acquire();
        info!(
            "Acquired repository location {} ({})",
            location_name,
            pointer.describe()
        );

        Ok(Self {
            origin,
            repositories: vec![repository],
            code_pointer: reported,
            tracker: tracker.clone(),
        })
    }

    pub fn origin(&self) -> &RepositoryLocationOrigin {
        &self.origin
    }

    pub fn location_name(&self) -> String {
        self.origin.location_name()
    }

    pub fn repository_names(&self) -> Vec<String> {
        self.repositories.iter().map(|r| r.name.clone()).collect()
    }

    /// Get a repository loaded by this location
    pub fn get_repository(&self, name: &str) -> Result<ExternalRepository, LocationError> {
        let definition = self
            .repositories
            .iter()
            .find(|r| r.name == name)
            .ok_or_else(|| LocationError::RepositoryNotFound {
                repository: name.to_string(),
                location: self.location_name(),
            })?;

        let handle = RepositoryHandle {
            repository_name: definition.name.clone(),
            location_origin: self.origin.clone(),
            code_pointer: self.code_pointer.clone(),
            executable_path: DEFAULT_EXECUTABLE_PATH.to_string(),
            container_image: self.origin.container_image().map(str::to_string),
        };

        Ok(ExternalRepository::new(handle, definition.clone()))
    }

    /// All repositories loaded by this location
    pub fn repositories(&self) -> Vec<ExternalRepository> {
        self.repository_names()
            .iter()
            .filter_map(|name| self.get_repository(name).ok())
            .collect()
    }
}

impl Drop for RepositoryLocationHandle {
    fn drop(&mut self) {
        self.tracker.release();
        debug!("Released repository location {}", self.origin.location_name());
    }
}

/// An external pipeline together with the location handle it came from
///
/// Dereferences to the pipeline. The location is released when the guard
/// goes out of scope.
#[derive(Debug)]
pub struct ExternalPipelineGuard {
    pipeline: ExternalPipeline,
    handle: RepositoryLocationHandle,
}

impl ExternalPipelineGuard {
    /// Acquire a pipeline from an open location
    pub fn acquire(
        handle: RepositoryLocationHandle,
        repository_name: &str,
        pipeline_name: &str,
    ) -> Result<Self, LocationError> {
        let pipeline = handle
            .get_repository(repository_name)?
            .get_full_external_pipeline(pipeline_name)?;
        Ok(Self { pipeline, handle })
    }

    pub fn location(&self) -> &RepositoryLocationHandle {
        &self.handle
    }
}

impl Deref for ExternalPipelineGuard {
    type Target = ExternalPipeline;

    fn deref(&self) -> &ExternalPipeline {
        &self.pipeline
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tracker_counts() {
        let tracker = HandleTracker::new();
        tracker.acquire();
        tracker.acquire();
        tracker.release();
        assert_eq!(tracker.active_count(), 1);
        assert_eq!(tracker.total_acquired(), 2);
    }

    #[test]
    fn test_registry_lookup() {
        let registry = GrpcServerRegistry::new();
        let served = ServedRepository {
            code_pointer: CodePointer::for_file("/srv/repo.yaml", "define_repo"),
            report_code_pointer: false,
        };
        registry.register("localhost", 4266, served.clone());

        assert_eq!(registry.lookup("localhost", 4266), Some(served));
        assert!(registry.lookup("localhost", 4000).is_none());
    }

    #[test]
    fn test_registry_survives_poisoned_lock() {
        let registry = GrpcServerRegistry::new();
        let servers = Arc::clone(&registry.servers);
        let _ = std::thread::spawn(move || {
            let _guard = servers.write().unwrap();
            panic!("server thread failed while registering");
        })
        .join();
        assert!(registry.servers.is_poisoned());

        let served = ServedRepository {
            code_pointer: CodePointer::for_file("/srv/repo.yaml", "define_repo"),
            report_code_pointer: true,
        };
        registry.register("localhost", 4266, served.clone());
        assert_eq!(registry.lookup("localhost", 4266), Some(served));
    }

    #[test]
    fn test_unreachable_server_fails_without_acquiring() {
        let tracker = HandleTracker::new();
        let origin = RepositoryLocationOrigin::GrpcServer {
            host: "localhost".to_string(),
            port: 4266,
            location_name: "remote".to_string(),
        };

        let result = RepositoryLocationHandle::create(origin, &GrpcServerRegistry::new(), &tracker);
        assert!(matches!(result, Err(LocationError::UnreachableServer { port: 4266, .. })));
        assert_eq!(tracker.total_acquired(), 0);
    }

    #[test]
    fn test_missing_repository_file_fails_to_load() {
        let tracker = HandleTracker::new();
        let origin = RepositoryLocationOrigin::in_process(CodePointer::for_file(
            "/nonexistent_location_dir_12345/repo.yaml",
            "define_repo",
        ));

        let result = RepositoryLocationHandle::create(origin, &GrpcServerRegistry::new(), &tracker);
        match result {
            Err(LocationError::Load { reason, .. }) => assert!(reason.contains("not found")),
            other => panic!("Expected Load error, got {:?}", other),
        }
        assert_eq!(tracker.active_count(), 0);
    }
}
