//! Shared types for the camsync stream registry.
//!
//! This crate contains the domain models shared between the registry
//! backend and any outer surface (HTTP handlers, CLI) built on top of it.

/// Default base URL of the go2rtc runtime control API.
pub const DEFAULT_ENGINE_API_URL: &str = "http://localhost:1984";

/// Well-known RTSP media-control port probed during discovery.
pub const DEFAULT_CONTROL_PORT: u16 = 554;

pub mod discovery;
pub mod stream;

pub use discovery::DiscoveredStream;
pub use stream::{Stream, StreamBackend};
