//! Application state management.

use crate::config::Config;
use crate::discovery::{DiscoveryError, NetworkScanner};
use crate::live_sync::LiveSync;
use crate::mediamtx;
use crate::probe::{ProbeError, StreamProber};
use crate::registry::{self, StreamRegistry};
use crate::storage::{self, PostgresStorage, StoreKind, YamlFileStorage};
use camsync_types::{DiscoveredStream, Stream, StreamBackend};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{info, warn};

/// Shared application state.
///
/// Cheap to clone; every clone drives the same registry.
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    /// Canonical stream definitions
    registry: StreamRegistry,
    /// Mirrors mutations into the running engine
    live_sync: LiveSync,
    scanner: NetworkScanner,
    prober: StreamProber,
    /// MediaMTX config regenerated after each mutation, if set
    mediamtx_config_path: Option<PathBuf>,
    /// Orders mutations together with their engine sync and MediaMTX rewrite
    mutations: Mutex<()>,
}

/// Whether a mutation result left the registry changed.
fn committed(result: &storage::Result<()>) -> bool {
    match result {
        Ok(()) => true,
        Err(e) => e.is_committed(),
    }
}

impl AppState {
    pub fn new(
        registry: StreamRegistry,
        live_sync: LiveSync,
        scanner: NetworkScanner,
        prober: StreamProber,
        mediamtx_config_path: Option<PathBuf>,
    ) -> Self {
        Self {
            inner: Arc::new(AppStateInner {
                registry,
                live_sync,
                scanner,
                prober,
                mediamtx_config_path,
                mutations: Mutex::new(()),
            }),
        }
    }

    /// Bind the registry selected by `config` and build the collaborators.
    ///
    /// With a database URL the relational store becomes the source of truth
    /// and the config file is rewritten from it once before returning.
    pub async fn from_config(config: &Config) -> anyhow::Result<Self> {
        let file_storage = YamlFileStorage::new(&config.config_path);
        file_storage.ensure_exists().await?;

        let registry = match &config.database_url {
            Some(database_url) => {
                let store = PostgresStorage::connect(database_url).await?;
                StreamRegistry::relational(store, file_storage)
            }
            None => StreamRegistry::file(file_storage),
        };
        registry::log_binding(&registry);

        if registry.kind() == StoreKind::Relational {
            registry.resync().await?;
            info!("Synchronized {:?} from PostgreSQL", config.config_path);
        }

        let state = Self::new(
            registry,
            LiveSync::new(config.engine_api_url.as_str())?,
            NetworkScanner::new(config.discovery.clone()),
            StreamProber::new().with_deadline(config.probe_timeout),
            config.mediamtx_config_path.clone(),
        );
        state.regenerate_mediamtx().await;
        Ok(state)
    }

    pub fn registry(&self) -> &StreamRegistry {
        &self.inner.registry
    }

    pub fn live_sync(&self) -> &LiveSync {
        &self.inner.live_sync
    }

    pub async fn list_streams(&self) -> storage::Result<Vec<Stream>> {
        self.inner.registry.list().await
    }

    /// Register a stream, then mirror it to the engine.
    ///
    /// A committed mutation is mirrored even when the derived config file
    /// could not be rewritten; that error is still returned.
    pub async fn add_stream(&self, name: &str, url: &str) -> storage::Result<()> {
        let _guard = self.inner.mutations.lock().await;
        let result = self.inner.registry.add(name, url).await;
        if committed(&result) {
            self.inner.live_sync.push(name, url).await;
            self.regenerate_mediamtx().await;
        }
        result
    }

    pub async fn update_stream(
        &self,
        old_name: &str,
        new_name: &str,
        url: &str,
        backend: Option<StreamBackend>,
    ) -> storage::Result<()> {
        let _guard = self.inner.mutations.lock().await;
        let result = self
            .inner
            .registry
            .update(old_name, new_name, url, backend)
            .await;
        if committed(&result) {
            self.inner
                .live_sync
                .mirror_update(old_name, new_name, url)
                .await;
            self.regenerate_mediamtx().await;
        }
        result
    }

    pub async fn remove_stream(&self, name: &str) -> storage::Result<()> {
        let _guard = self.inner.mutations.lock().await;
        let result = self.inner.registry.remove(name).await;
        if committed(&result) {
            self.inner.live_sync.retract(name).await;
            self.regenerate_mediamtx().await;
        }
        result
    }

    /// Scan the local subnet. Results are not added to the registry.
    pub async fn discover(&self) -> Result<Vec<DiscoveredStream>, DiscoveryError> {
        self.inner.scanner.scan().await
    }

    pub async fn probe(&self, url: &str) -> Result<(), ProbeError> {
        self.inner.prober.validate(url).await
    }

    /// Callers other than `from_config` must hold `mutations`.
    async fn regenerate_mediamtx(&self) {
        let Some(path) = &self.inner.mediamtx_config_path else {
            return;
        };

        let result = match self.inner.registry.list().await {
            Ok(streams) => mediamtx::write_config(&streams, path).await,
            Err(e) => Err(e),
        };
        if let Err(e) = result {
            warn!(path = %path.display(), error = %e, "Failed to regenerate MediaMTX config");
        }
    }
}
