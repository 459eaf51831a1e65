//! camsync backend library.
//!
//! Stream registry over a go2rtc YAML document or PostgreSQL, with live
//! synchronization into the running engine, subnet discovery and ffprobe
//! validation of candidate sources.

pub mod config;
pub mod discovery;
pub mod live_sync;
pub mod mediamtx;
pub mod network;
pub mod paths;
pub mod probe;
pub mod registry;
pub mod state;
pub mod storage;
pub mod supervisor;

pub use registry::StreamRegistry;
pub use state::AppState;
