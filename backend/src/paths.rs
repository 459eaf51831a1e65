//! Executable lookup for external tools.
//!
//! go2rtc, MediaMTX and ffprobe are commonly dropped next to the service
//! instead of installed, so the working directory is searched before `PATH`.

use std::env;
use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Platform file name for an executable (`go2rtc` or `go2rtc.exe`).
pub fn executable_name(base: &str) -> String {
    format!("{}{}", base, env::consts::EXE_SUFFIX)
}

/// Locate `base` in the current directory, then on `PATH`.
pub fn locate_executable(base: &str) -> Option<PathBuf> {
    let cwd = env::current_dir().ok();
    let search_path = env::var_os("PATH");
    let found = locate_in(base, cwd.as_deref(), search_path.as_deref());

    match &found {
        Some(path) => debug!("Found {} at {}", base, path.display()),
        None => debug!("{} not found in working directory or PATH", base),
    }
    found
}

/// Lookup against an explicit working directory and search path.
pub fn locate_in(base: &str, cwd: Option<&Path>, search_path: Option<&OsStr>) -> Option<PathBuf> {
    let name = executable_name(base);

    if let Some(candidate) = cwd.map(|dir| dir.join(&name)) {
        if candidate.is_file() {
            return Some(candidate);
        }
    }

    search_path
        .into_iter()
        .flat_map(env::split_paths)
        .map(|dir| dir.join(&name))
        .find(|candidate| candidate.is_file())
}
