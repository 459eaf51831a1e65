//! Storage layer for persisting stream definitions.

mod document;
mod postgres_storage;
mod yaml_storage;

pub use document::{ConfigDocument, StreamSource, COMPLEX_SOURCE_PLACEHOLDER};
pub use postgres_storage::PostgresStorage;
pub use yaml_storage::YamlFileStorage;

use async_trait::async_trait;
use camsync_types::Stream;

/// Error type for storage operations.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("Stream not found: {0}")]
    NotFound(String),

    #[error("Stream name '{0}' already exists")]
    NameConflict(String),

    #[error("Invalid stream: {0}")]
    Invalid(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// The store mutation committed but the derived config file was not rewritten.
    #[error("Failed to rewrite derived config: {0}")]
    Projection(#[source] Box<StorageError>),
}

impl StorageError {
    /// Whether the failed call still changed the stored stream set.
    pub fn is_committed(&self) -> bool {
        matches!(self, StorageError::Projection(_))
    }
}

pub type Result<T> = std::result::Result<T, StorageError>;

/// Which persistence substrate a store writes to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreKind {
    File,
    Relational,
}

/// Trait for stream storage backends.
#[async_trait]
pub trait StreamStore: Send + Sync {
    /// All streams, ordered by name.
    async fn list_streams(&self) -> Result<Vec<Stream>>;

    /// Insert a new stream, failing with `NameConflict` if the name is taken.
    async fn add_stream(&self, stream: &Stream) -> Result<()>;

    /// Insert or replace a stream.
    async fn set_stream(&self, stream: &Stream) -> Result<()>;

    /// Delete a stream. Deleting an absent name succeeds.
    async fn remove_stream(&self, name: &str) -> Result<()>;

    /// Rename and/or update the stream currently stored as `old_name`.
    async fn update_stream(&self, old_name: &str, stream: &Stream) -> Result<()>;

    fn kind(&self) -> StoreKind;
}

/// Reject streams the engine could not address.
pub(crate) fn validate(stream: &Stream) -> Result<()> {
    if stream.name.trim().is_empty() {
        return Err(StorageError::Invalid("name must not be empty".to_string()));
    }
    if stream.url.trim().is_empty() {
        return Err(StorageError::Invalid(format!(
            "url for '{}' must not be empty",
            stream.name
        )));
    }
    Ok(())
}
