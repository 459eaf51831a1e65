//! Stream validation through `ffprobe`.

use crate::paths;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::{Duration, Instant};
use tokio::process::Command;
use tracing::{debug, warn};

/// Overall deadline for one probe, on top of ffprobe's own connect timeout.
pub const DEFAULT_PROBE_DEADLINE: Duration = Duration::from_secs(15);

/// ffprobe connection timeout, in microseconds.
const FFPROBE_CONNECT_TIMEOUT_US: &str = "10000000";

#[derive(Debug, thiserror::Error)]
pub enum ProbeError {
    #[error("connection timeout ({0:?}) - stream might be too slow or unreachable")]
    Timeout(Duration),

    #[error("stream validation failed: {0}")]
    ValidationFailed(String),

    #[error("cannot connect to stream - check URL, credentials, and network connectivity")]
    ConnectivityFailed,

    #[error("failed to run probe: {0}")]
    Spawn(#[from] std::io::Error),
}

#[derive(Debug, Clone)]
pub struct StreamProber {
    program: PathBuf,
    leading_args: Vec<String>,
    deadline: Duration,
}

impl Default for StreamProber {
    fn default() -> Self {
        Self::new()
    }
}

impl StreamProber {
    /// Probe with `ffprobe` from the working directory or `PATH`.
    pub fn new() -> Self {
        let program = paths::locate_executable("ffprobe")
            .unwrap_or_else(|| PathBuf::from(paths::executable_name("ffprobe")));

        Self {
            program,
            leading_args: Vec::new(),
            deadline: DEFAULT_PROBE_DEADLINE,
        }
    }

    /// Probe with a custom program. `leading_args` go before the ffprobe arguments.
    pub fn with_command(
        program: impl Into<PathBuf>,
        leading_args: Vec<String>,
        deadline: Duration,
    ) -> Self {
        Self {
            program: program.into(),
            leading_args,
            deadline,
        }
    }

    pub fn with_deadline(mut self, deadline: Duration) -> Self {
        self.deadline = deadline;
        self
    }

    pub fn deadline(&self) -> Duration {
        self.deadline
    }

    fn probe_args(url: &str) -> [&str; 10] {
        [
            "-v",
            "error",
            "-show_entries",
            "stream=codec_type",
            "-rtsp_transport",
            "tcp",
            "-timeout",
            FFPROBE_CONNECT_TIMEOUT_US,
            "-i",
            url,
        ]
    }

    /// Check that `url` can be opened and exposes streams.
    pub async fn validate(&self, url: &str) -> Result<(), ProbeError> {
        debug!(program = %self.program.display(), url = %url, "Probing stream");
        let started = Instant::now();

        let child = Command::new(&self.program)
            .args(&self.leading_args)
            .args(Self::probe_args(url))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()?;

        // On timeout the child is dropped and killed
        let output = match tokio::time::timeout(self.deadline, child.wait_with_output()).await {
            Ok(output) => output?,
            Err(_) => {
                warn!(url = %url, deadline = ?self.deadline, "Probe timed out");
                return Err(ProbeError::Timeout(self.deadline));
            }
        };

        if output.status.success() {
            debug!(url = %url, elapsed = ?started.elapsed(), "Probe succeeded");
            return Ok(());
        }

        let mut combined = String::from_utf8_lossy(&output.stderr).into_owned();
        combined.push_str(&String::from_utf8_lossy(&output.stdout));
        let detail = combined.trim();

        if detail.is_empty() {
            Err(ProbeError::ConnectivityFailed)
        } else {
            Err(ProbeError::ValidationFailed(detail.to_string()))
        }
    }
}
