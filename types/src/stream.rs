//! Stream definitions.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Tag naming the media engine a stream belongs to.
///
/// Stored as plain text (`go2rtc`, `mediamtx`, ...). Unknown tags are kept
/// as-is so rows written by newer versions survive a round trip.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum StreamBackend {
    #[default]
    Go2rtc,
    Mediamtx,
    Other(String),
}

impl StreamBackend {
    /// Parse a stored tag, falling back to the default for empty values.
    pub fn from_tag(tag: &str) -> Self {
        match tag.trim() {
            "" | "go2rtc" => Self::Go2rtc,
            "mediamtx" => Self::Mediamtx,
            other => Self::Other(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::Go2rtc => "go2rtc",
            Self::Mediamtx => "mediamtx",
            Self::Other(tag) => tag,
        }
    }
}

impl fmt::Display for StreamBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<String> for StreamBackend {
    fn from(tag: String) -> Self {
        Self::from_tag(&tag)
    }
}

impl From<&str> for StreamBackend {
    fn from(tag: &str) -> Self {
        Self::from_tag(tag)
    }
}

impl From<StreamBackend> for String {
    fn from(backend: StreamBackend) -> Self {
        backend.as_str().to_string()
    }
}

fn is_false(value: &bool) -> bool {
    !*value
}

/// A named media source managed by the registry.
///
/// `url` is opaque: it may be a bare network URL (`rtsp://...`) or a
/// pipeline expression understood by the engine (`ffmpeg:...`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Stream {
    /// Unique key within the active backend, also the engine-side source name
    pub name: String,
    /// Source specification forwarded verbatim to the engine
    pub url: String,
    /// Engine that claims this stream
    #[serde(default)]
    pub backend: StreamBackend,
    /// Inert recording flag
    #[serde(default, skip_serializing_if = "is_false")]
    pub recording: bool,
}

impl Stream {
    /// Create a go2rtc stream.
    pub fn new(name: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            url: url.into(),
            backend: StreamBackend::default(),
            recording: false,
        }
    }

    /// Set the engine tag.
    pub fn with_backend(mut self, backend: StreamBackend) -> Self {
        self.backend = backend;
        self
    }
}
