//! Stream registry facade over the bound storage backend.

use crate::storage::{Result, StorageError, StoreKind, StreamStore, YamlFileStorage};
use camsync_types::{Stream, StreamBackend};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info};

/// Canonical set of stream definitions.
///
/// Exactly one store is bound for the lifetime of the registry. With a
/// relational store the YAML document the engine reads becomes a derived
/// projection, rewritten after every successful mutation. Mutations are
/// serialized so the last projection written reflects the last mutation.
pub struct StreamRegistry {
    store: Arc<dyn StreamStore>,
    projection: Option<YamlFileStorage>,
    /// Held from the store mutation until its projection is written
    mutation_lock: Mutex<()>,
}

impl StreamRegistry {
    /// Registry persisting directly into the engine's config file.
    pub fn file(storage: YamlFileStorage) -> Self {
        Self {
            store: Arc::new(storage),
            projection: None,
            mutation_lock: Mutex::new(()),
        }
    }

    /// Registry backed by a relational store, projecting into `projection`.
    pub fn relational(store: impl StreamStore + 'static, projection: YamlFileStorage) -> Self {
        Self {
            store: Arc::new(store),
            projection: Some(projection),
            mutation_lock: Mutex::new(()),
        }
    }

    pub fn kind(&self) -> StoreKind {
        self.store.kind()
    }

    pub async fn list(&self) -> Result<Vec<Stream>> {
        self.store.list_streams().await
    }

    /// Register a new stream.
    ///
    /// `StorageError::Projection` means the stream was stored but the derived
    /// config file is stale.
    pub async fn add(&self, name: &str, url: &str) -> Result<()> {
        let _guard = self.mutation_lock.lock().await;
        self.store.add_stream(&Stream::new(name, url)).await?;
        self.project_after_mutation().await
    }

    pub async fn remove(&self, name: &str) -> Result<()> {
        let _guard = self.mutation_lock.lock().await;
        self.store.remove_stream(name).await?;
        self.project_after_mutation().await
    }

    /// Rename and/or re-point a stream. An unset backend means `go2rtc`.
    pub async fn update(
        &self,
        old_name: &str,
        new_name: &str,
        url: &str,
        backend: Option<StreamBackend>,
    ) -> Result<()> {
        let stream = Stream::new(new_name, url).with_backend(backend.unwrap_or_default());
        let _guard = self.mutation_lock.lock().await;
        self.store.update_stream(old_name, &stream).await?;
        self.project_after_mutation().await
    }

    /// Rewrite the derived config file from the store. No-op in file mode.
    pub async fn resync(&self) -> Result<()> {
        let _guard = self.mutation_lock.lock().await;
        self.project().await
    }

    async fn project_after_mutation(&self) -> Result<()> {
        self.project()
            .await
            .map_err(|e| StorageError::Projection(Box::new(e)))
    }

    /// Callers must hold `mutation_lock`.
    async fn project(&self) -> Result<()> {
        let Some(projection) = &self.projection else {
            return Ok(());
        };

        let streams = self.store.list_streams().await?;
        projection.replace_streams(&streams).await?;

        debug!(
            "Projected {} streams into {:?}",
            streams.len(),
            projection.path()
        );
        Ok(())
    }
}

impl std::fmt::Debug for StreamRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamRegistry")
            .field("kind", &self.kind())
            .field("projection", &self.projection.as_ref().map(|p| p.path()))
            .finish()
    }
}

/// Log which registry variant was bound.
pub(crate) fn log_binding(registry: &StreamRegistry) {
    match registry.kind() {
        StoreKind::File => info!("Stream registry bound to config file"),
        StoreKind::Relational => info!("Stream registry bound to PostgreSQL"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::collections::BTreeMap;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::time::Duration;
    use tempfile::tempdir;

    /// In-memory stand-in for the relational store.
    #[derive(Default)]
    struct MemoryStore {
        streams: Mutex<BTreeMap<String, Stream>>,
    }

    #[async_trait]
    impl StreamStore for MemoryStore {
        async fn list_streams(&self) -> Result<Vec<Stream>> {
            Ok(self.streams.lock().await.values().cloned().collect())
        }

        async fn add_stream(&self, stream: &Stream) -> Result<()> {
            let mut streams = self.streams.lock().await;
            if streams.contains_key(&stream.name) {
                return Err(StorageError::NameConflict(stream.name.clone()));
            }
            streams.insert(stream.name.clone(), stream.clone());
            Ok(())
        }

        async fn set_stream(&self, stream: &Stream) -> Result<()> {
            self.streams
                .lock()
                .await
                .insert(stream.name.clone(), stream.clone());
            Ok(())
        }

        async fn remove_stream(&self, name: &str) -> Result<()> {
            self.streams.lock().await.remove(name);
            Ok(())
        }

        async fn update_stream(&self, old_name: &str, stream: &Stream) -> Result<()> {
            let mut streams = self.streams.lock().await;
            if !streams.contains_key(old_name) {
                return Err(StorageError::NotFound(old_name.to_string()));
            }
            if old_name != stream.name && streams.contains_key(&stream.name) {
                return Err(StorageError::NameConflict(stream.name.clone()));
            }
            streams.remove(old_name);
            streams.insert(stream.name.clone(), stream.clone());
            Ok(())
        }

        fn kind(&self) -> StoreKind {
            StoreKind::Relational
        }
    }

    /// Store whose first listing stalls after taking its snapshot.
    #[derive(Default)]
    struct StallingStore {
        inner: MemoryStore,
        stalled: AtomicBool,
    }

    #[async_trait]
    impl StreamStore for StallingStore {
        async fn list_streams(&self) -> Result<Vec<Stream>> {
            let streams = self.inner.list_streams().await?;
            if !self.stalled.swap(true, Ordering::SeqCst) {
                tokio::time::sleep(Duration::from_millis(300)).await;
            }
            Ok(streams)
        }

        async fn add_stream(&self, stream: &Stream) -> Result<()> {
            self.inner.add_stream(stream).await
        }

        async fn set_stream(&self, stream: &Stream) -> Result<()> {
            self.inner.set_stream(stream).await
        }

        async fn remove_stream(&self, name: &str) -> Result<()> {
            self.inner.remove_stream(name).await
        }

        async fn update_stream(&self, old_name: &str, stream: &Stream) -> Result<()> {
            self.inner.update_stream(old_name, stream).await
        }

        fn kind(&self) -> StoreKind {
            StoreKind::Relational
        }
    }

    async fn projected_names(projection: &YamlFileStorage) -> Vec<String> {
        projection
            .load()
            .await
            .unwrap()
            .streams
            .into_keys()
            .collect()
    }

    #[tokio::test]
    async fn test_file_registry_add_list_remove() {
        let dir = tempdir().unwrap();
        let registry = StreamRegistry::file(YamlFileStorage::new(dir.path().join("go2rtc.yaml")));
        assert_eq!(registry.kind(), StoreKind::File);

        registry.add("cam1", "rtsp://10.0.0.5:554/stream1").await.unwrap();
        let streams = registry.list().await.unwrap();
        assert_eq!(streams.len(), 1);
        assert_eq!(streams[0].name, "cam1");
        assert_eq!(streams[0].url, "rtsp://10.0.0.5:554/stream1");
        assert_eq!(streams[0].backend, StreamBackend::Go2rtc);

        registry.remove("cam1").await.unwrap();
        registry.remove("cam1").await.unwrap();
        assert!(registry.list().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_rename_without_backend_defaults_to_go2rtc() {
        let dir = tempdir().unwrap();
        let projection = YamlFileStorage::new(dir.path().join("go2rtc.yaml"));
        let registry = StreamRegistry::relational(MemoryStore::default(), projection);

        registry.add("cam1", "rtsp://a").await.unwrap();
        registry.update("cam1", "cam1b", "rtsp://a", None).await.unwrap();

        let streams = registry.list().await.unwrap();
        assert_eq!(streams.len(), 1);
        assert_eq!(streams[0].name, "cam1b");
        assert_eq!(streams[0].backend, StreamBackend::Go2rtc);
    }

    #[tokio::test]
    async fn test_relational_mutations_rewrite_projection() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("go2rtc.yaml");
        std::fs::write(&path, "api:\n  listen: \":1984\"\nstreams:\n  stale: rtsp://old\n").unwrap();

        let registry =
            StreamRegistry::relational(MemoryStore::default(), YamlFileStorage::new(&path));
        let projection = YamlFileStorage::new(&path);

        registry.add("a", "rtsp://a").await.unwrap();
        assert_eq!(projected_names(&projection).await, vec!["a"]);

        registry.add("b", "rtsp://b").await.unwrap();
        registry
            .update("a", "c", "rtsp://c", Some(StreamBackend::Mediamtx))
            .await
            .unwrap();
        assert_eq!(projected_names(&projection).await, vec!["b", "c"]);

        registry.remove("b").await.unwrap();
        assert_eq!(projected_names(&projection).await, vec!["c"]);

        let document = projection.load().await.unwrap();
        assert!(document.rest.contains_key("api"));
    }

    #[tokio::test]
    async fn test_failed_mutation_leaves_projection_alone() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("go2rtc.yaml");
        let registry =
            StreamRegistry::relational(MemoryStore::default(), YamlFileStorage::new(&path));

        registry.add("a", "rtsp://a").await.unwrap();
        registry.add("b", "rtsp://b").await.unwrap();

        let result = registry.update("a", "b", "rtsp://a", None).await;
        assert!(matches!(result, Err(StorageError::NameConflict(_))));

        let streams = registry.list().await.unwrap();
        assert_eq!(streams[0], Stream::new("a", "rtsp://a"));
        assert_eq!(
            projected_names(&YamlFileStorage::new(&path)).await,
            vec!["a", "b"]
        );
    }

    #[tokio::test]
    async fn test_concurrent_mutations_project_latest_state() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("go2rtc.yaml");
        let registry = Arc::new(StreamRegistry::relational(
            StallingStore::default(),
            YamlFileStorage::new(&path),
        ));

        let first = {
            let registry = registry.clone();
            tokio::spawn(async move { registry.add("a", "rtsp://a").await })
        };
        // Let the first mutation reach its stalled listing
        tokio::time::sleep(Duration::from_millis(50)).await;
        registry.add("b", "rtsp://b").await.unwrap();
        first.await.unwrap().unwrap();

        let stored: Vec<String> = registry
            .list()
            .await
            .unwrap()
            .into_iter()
            .map(|s| s.name)
            .collect();
        assert_eq!(stored, vec!["a", "b"]);
        assert_eq!(projected_names(&YamlFileStorage::new(&path)).await, stored);
    }

    #[tokio::test]
    async fn test_projection_failure_reports_committed_mutation() {
        let dir = tempdir().unwrap();
        // A directory cannot be read as the config document
        let registry = StreamRegistry::relational(
            MemoryStore::default(),
            YamlFileStorage::new(dir.path()),
        );

        let err = registry.add("cam1", "rtsp://a").await.unwrap_err();
        assert!(matches!(err, StorageError::Projection(_)));
        assert!(err.is_committed());
        assert_eq!(
            registry.list().await.unwrap(),
            vec![Stream::new("cam1", "rtsp://a")]
        );

        let err = registry.add("cam1", "rtsp://b").await.unwrap_err();
        assert!(!err.is_committed());
    }

    #[tokio::test]
    async fn test_resync_is_noop_in_file_mode() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("go2rtc.yaml");
        let registry = StreamRegistry::file(YamlFileStorage::new(&path));

        registry.resync().await.unwrap();
        assert!(!path.exists());
    }
}
