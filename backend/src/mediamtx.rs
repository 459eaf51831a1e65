//! Derived MediaMTX configuration.
//!
//! MediaMTX has no runtime stream API we drive, so its config file is
//! regenerated from the registry: every stream tagged `mediamtx` becomes a
//! path, everything else is fixed engine settings.

use crate::storage::Result;
use camsync_types::{Stream, StreamBackend};
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::Path;
use tracing::debug;

/// Path emitted when no stream is tagged for MediaMTX.
pub const DEFAULT_PATH: &str = "all";

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MediaMtxConfig {
    pub log_level: String,
    pub log_destinations: Vec<String>,
    pub api: bool,
    pub api_address: String,
    pub hls: bool,
    pub hls_address: String,
    pub hls_variant: String,
    pub hls_segment_count: u32,
    pub hls_segment_duration: String,
    pub hls_part_duration: String,
    pub hls_segment_max_size: String,
    pub webrtc: bool,
    pub webrtc_address: String,
    #[serde(rename = "webrtcICEServers")]
    pub webrtc_ice_servers: Vec<IceServer>,
    pub rtsp: bool,
    pub rtsp_address: String,
    pub protocols: Vec<String>,
    pub paths: BTreeMap<String, MediaMtxPath>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IceServer {
    pub url: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct MediaMtxPath {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
}

/// Build the MediaMTX config for the streams tagged `mediamtx`.
pub fn generate_config(streams: &[Stream]) -> MediaMtxConfig {
    let mut paths: BTreeMap<String, MediaMtxPath> = streams
        .iter()
        .filter(|s| s.backend == StreamBackend::Mediamtx)
        .map(|s| {
            (
                s.name.clone(),
                MediaMtxPath {
                    source: Some(s.url.clone()),
                },
            )
        })
        .collect();

    if paths.is_empty() {
        paths.insert(DEFAULT_PATH.to_string(), MediaMtxPath::default());
    }

    MediaMtxConfig {
        log_level: "info".to_string(),
        log_destinations: vec!["stdout".to_string()],
        api: true,
        api_address: ":9997".to_string(),
        hls: true,
        hls_address: ":8888".to_string(),
        hls_variant: "mpegts".to_string(),
        hls_segment_count: 3,
        hls_segment_duration: "1s".to_string(),
        hls_part_duration: "200ms".to_string(),
        hls_segment_max_size: "50M".to_string(),
        webrtc: true,
        webrtc_address: ":8889".to_string(),
        webrtc_ice_servers: vec![IceServer {
            url: "stun:stun.l.google.com:19302".to_string(),
        }],
        rtsp: true,
        rtsp_address: ":8555".to_string(),
        protocols: vec!["tcp".to_string()],
        paths,
    }
}

/// Generate the config and write it to `path`, replacing the previous file.
pub async fn write_config(streams: &[Stream], path: &Path) -> Result<()> {
    let config = generate_config(streams);
    let yaml = serde_yaml::to_string(&config)?;

    let temp_path = path.with_extension("tmp");
    tokio::fs::write(&temp_path, yaml).await?;
    tokio::fs::rename(&temp_path, path).await?;

    debug!("Wrote {} MediaMTX paths to {:?}", config.paths.len(), path);
    Ok(())
}
