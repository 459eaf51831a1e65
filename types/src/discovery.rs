//! Network discovery results.

use serde::{Deserialize, Serialize};

/// A host found answering on the media-control port.
///
/// Discovery never persists these; callers decide whether to add them.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DiscoveredStream {
    /// IPv4 address of the responding host
    pub address: String,
    /// Suggested source URL (`rtsp://<address>:<port>/stream`)
    pub url: String,
}

impl DiscoveredStream {
    pub fn new(address: impl Into<String>, port: u16) -> Self {
        let address = address.into();
        let url = format!("rtsp://{}:{}/stream", address, port);
        Self { address, url }
    }
}
