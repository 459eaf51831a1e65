//! Engine process supervisor.
//!
//! Starts the media engine as a child process and relays its output into
//! the service log. There is no restart loop: a crashed engine stays down
//! until the next `start`.

use crate::paths;
use camsync_types::StreamBackend;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::{Child, Command};
use tokio::task::JoinHandle;
use tracing::{info, warn};

#[derive(Debug, thiserror::Error)]
pub enum SupervisorError {
    #[error("{0} binary not found in working directory or PATH")]
    BinaryNotFound(String),

    #[error("Failed to spawn engine: {0}")]
    Spawn(#[source] std::io::Error),

    #[error("Failed to stop engine: {0}")]
    Stop(#[source] std::io::Error),
}

struct RunningEngine {
    child: Child,
    relay: JoinHandle<()>,
}

/// Owns the engine child process. Dropping the supervisor kills the child.
pub struct EngineSupervisor {
    engine: StreamBackend,
    program: PathBuf,
    args: Vec<OsString>,
    running: Option<RunningEngine>,
}

/// Command-line arguments pointing the engine at its config file.
pub fn engine_args(engine: &StreamBackend, config_path: &Path) -> Vec<OsString> {
    match engine {
        StreamBackend::Mediamtx => vec![config_path.as_os_str().to_owned()],
        StreamBackend::Go2rtc | StreamBackend::Other(_) => {
            vec![OsString::from("-c"), config_path.as_os_str().to_owned()]
        }
    }
}

impl EngineSupervisor {
    /// Supervisor for the engine binary named after `engine`.
    pub fn for_engine(engine: StreamBackend, config_path: &Path) -> Result<Self, SupervisorError> {
        let program = paths::locate_executable(engine.as_str())
            .ok_or_else(|| SupervisorError::BinaryNotFound(engine.to_string()))?;
        let args = engine_args(&engine, config_path);
        Ok(Self::with_command(engine, program, args))
    }

    /// Supervisor for an explicit program and argument list.
    pub fn with_command(
        engine: StreamBackend,
        program: impl Into<PathBuf>,
        args: Vec<OsString>,
    ) -> Self {
        Self {
            engine,
            program: program.into(),
            args,
            running: None,
        }
    }

    pub fn engine(&self) -> &StreamBackend {
        &self.engine
    }

    pub fn program(&self) -> &Path {
        &self.program
    }

    /// Spawn the engine. Starting while it runs is a no-op.
    pub fn start(&mut self) -> Result<(), SupervisorError> {
        if self.is_running() {
            warn!(engine = %self.engine, "Engine already running, not starting another");
            return Ok(());
        }

        info!(
            engine = %self.engine,
            program = %self.program.display(),
            "Starting engine"
        );

        let mut child = Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(SupervisorError::Spawn)?;

        let relay = spawn_relay(self.engine.to_string(), child.stdout.take(), child.stderr.take());

        info!(engine = %self.engine, pid = ?child.id(), "Engine started");
        self.running = Some(RunningEngine { child, relay });
        Ok(())
    }

    /// Kill the engine and wait for it to exit. Safe to call repeatedly.
    pub async fn stop(&mut self) -> Result<(), SupervisorError> {
        let Some(mut running) = self.running.take() else {
            return Ok(());
        };

        match running.child.try_wait() {
            Ok(Some(status)) => {
                info!(engine = %self.engine, %status, "Engine had already exited");
            }
            _ => {
                info!(engine = %self.engine, "Stopping engine");
                running.child.kill().await.map_err(SupervisorError::Stop)?;
            }
        }

        running.relay.abort();
        Ok(())
    }

    /// Whether the child is alive. Reaps it if it has exited.
    pub fn is_running(&mut self) -> bool {
        let Some(running) = self.running.as_mut() else {
            return false;
        };

        match running.child.try_wait() {
            Ok(None) => true,
            Ok(Some(status)) => {
                warn!(engine = %self.engine, %status, "Engine exited");
                false
            }
            Err(e) => {
                warn!(engine = %self.engine, error = %e, "Failed to poll engine status");
                false
            }
        }
    }

    pub fn pid(&self) -> Option<u32> {
        self.running.as_ref().and_then(|r| r.child.id())
    }
}

/// Forward engine output lines to tracing until both pipes close.
fn spawn_relay<O, E>(engine: String, stdout: Option<O>, stderr: Option<E>) -> JoinHandle<()>
where
    O: AsyncRead + Unpin + Send + 'static,
    E: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut stdout = stdout.map(|s| BufReader::new(s).lines());
        let mut stderr = stderr.map(|s| BufReader::new(s).lines());

        while stdout.is_some() || stderr.is_some() {
            tokio::select! {
                result = async { stdout.as_mut()?.next_line().await.ok().flatten() }, if stdout.is_some() => {
                    match result {
                        Some(line) => info!(target: "engine", engine = %engine, "{}", line),
                        None => stdout = None,
                    }
                }
                result = async { stderr.as_mut()?.next_line().await.ok().flatten() }, if stderr.is_some() => {
                    match result {
                        Some(line) => warn!(target: "engine", engine = %engine, "{}", line),
                        None => stderr = None,
                    }
                }
            }
        }
    })
}
