//! YAML file-based storage implementation.

use super::{validate, ConfigDocument, Result, StorageError, StoreKind, StreamSource, StreamStore};
use async_trait::async_trait;
use camsync_types::Stream;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::sync::RwLock;
use tracing::{debug, info};

/// Storage backend that keeps streams in the engine's own YAML config.
///
/// Every operation re-reads the file; there is no in-memory cache, so edits
/// made by the engine between operations are picked up. The lock orders
/// load-mutate-save sequences issued through this instance only.
pub struct YamlFileStorage {
    path: PathBuf,
    lock: RwLock<()>,
}

impl YamlFileStorage {
    /// Create a new YAML file storage.
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            lock: RwLock::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the document. A missing file is an empty document.
    pub async fn load(&self) -> Result<ConfigDocument> {
        let _guard = self.lock.read().await;
        self.read_document().await
    }

    /// Overwrite the document.
    pub async fn save(&self, document: &ConfigDocument) -> Result<()> {
        let _guard = self.lock.write().await;
        self.write_document(document).await
    }

    /// Write an empty document if the file does not exist yet.
    ///
    /// An existing file is never replaced, even if it fails to parse.
    pub async fn ensure_exists(&self) -> Result<()> {
        let _guard = self.lock.write().await;
        if fs::try_exists(&self.path).await? {
            self.read_document().await?;
            return Ok(());
        }
        info!("Creating empty stream config at {:?}", self.path);
        self.write_document(&ConfigDocument::default()).await
    }

    /// Replace the full `streams` mapping, keeping every other key.
    pub async fn replace_streams(&self, streams: &[Stream]) -> Result<()> {
        let _guard = self.lock.write().await;
        let mut document = self.read_document().await?;
        document.replace_streams(streams);
        self.write_document(&document).await
    }

    async fn read_document(&self) -> Result<ConfigDocument> {
        debug!("Loading stream config from {:?}", self.path);

        let contents = match fs::read_to_string(&self.path).await {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("Stream config does not exist, starting empty");
                return Ok(ConfigDocument::default());
            }
            Err(e) => return Err(e.into()),
        };

        Ok(ConfigDocument::from_yaml(&contents)?)
    }

    async fn write_document(&self, document: &ConfigDocument) -> Result<()> {
        debug!(
            "Writing {} streams to {:?}",
            document.streams.len(),
            self.path
        );

        let yaml = document.to_yaml()?;

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                fs::create_dir_all(parent).await?;
            }
        }

        // Write to temporary file first, then rename (atomic operation)
        let temp_path = self.path.with_extension("tmp");
        fs::write(&temp_path, yaml).await?;
        fs::rename(&temp_path, &self.path).await?;

        Ok(())
    }
}

#[async_trait]
impl StreamStore for YamlFileStorage {
    async fn list_streams(&self) -> Result<Vec<Stream>> {
        Ok(self.load().await?.streams())
    }

    async fn add_stream(&self, stream: &Stream) -> Result<()> {
        validate(stream)?;
        let _guard = self.lock.write().await;
        let mut document = self.read_document().await?;
        if document.streams.contains_key(&stream.name) {
            return Err(StorageError::NameConflict(stream.name.clone()));
        }
        document
            .streams
            .insert(stream.name.clone(), StreamSource::Url(stream.url.clone()));
        self.write_document(&document).await?;
        info!(stream = %stream.name, "Added stream to config file");
        Ok(())
    }

    async fn set_stream(&self, stream: &Stream) -> Result<()> {
        validate(stream)?;
        let _guard = self.lock.write().await;
        let mut document = self.read_document().await?;
        document
            .streams
            .insert(stream.name.clone(), StreamSource::Url(stream.url.clone()));
        self.write_document(&document).await
    }

    async fn remove_stream(&self, name: &str) -> Result<()> {
        let _guard = self.lock.write().await;
        let mut document = self.read_document().await?;
        if document.streams.remove(name).is_none() {
            debug!(stream = %name, "Remove of absent stream ignored");
            return Ok(());
        }
        self.write_document(&document).await?;
        info!(stream = %name, "Removed stream from config file");
        Ok(())
    }

    async fn update_stream(&self, old_name: &str, stream: &Stream) -> Result<()> {
        validate(stream)?;
        let _guard = self.lock.write().await;
        let mut document = self.read_document().await?;

        if !document.streams.contains_key(old_name) {
            return Err(StorageError::NotFound(old_name.to_string()));
        }
        if old_name != stream.name && document.streams.contains_key(&stream.name) {
            return Err(StorageError::NameConflict(stream.name.clone()));
        }

        document.streams.remove(old_name);
        document
            .streams
            .insert(stream.name.clone(), StreamSource::Url(stream.url.clone()));
        self.write_document(&document).await?;

        info!(from = %old_name, to = %stream.name, "Updated stream in config file");
        Ok(())
    }

    fn kind(&self) -> StoreKind {
        StoreKind::File
    }
}
