//! camsync service and operator CLI.

use anyhow::Context;
use camsync::{
    config::{Config, ConfigOverrides},
    state::AppState,
    supervisor::EngineSupervisor,
};
use camsync_types::StreamBackend;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::{error, info};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// camsync - camera stream registry for go2rtc and MediaMTX
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Engine YAML config the registry reads and writes
    #[arg(long, global = true)]
    config_path: Option<PathBuf>,

    /// PostgreSQL URL; enables the database backend
    #[arg(long, env = "DATABASE_URL", global = true)]
    database_url: Option<String>,

    /// Engine to supervise (go2rtc, mediamtx, ...)
    #[arg(long, global = true)]
    engine: Option<String>,

    /// Base URL of the engine control API
    #[arg(long, global = true)]
    api_url: Option<String>,

    /// Regenerate this MediaMTX config after every change
    #[arg(long, global = true)]
    mediamtx_config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, global = true)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Bind the registry and supervise the engine until Ctrl+C (default)
    Run,
    /// List registered streams
    List,
    /// Register a stream and push it to the engine
    Add { name: String, url: String },
    /// Remove a stream from the registry and the engine
    Remove { name: String },
    /// Rename and/or re-point a stream
    Rename {
        old_name: String,
        new_name: String,
        url: String,
        /// Engine tag for the stream (defaults to go2rtc)
        #[arg(long)]
        backend: Option<String>,
    },
    /// Scan the local subnet for RTSP hosts
    Discover,
    /// Check that a source URL can be opened
    Probe { url: String },
}

impl Args {
    fn overrides(&self) -> ConfigOverrides {
        ConfigOverrides {
            config_path: self.config_path.clone(),
            database_url: self.database_url.clone(),
            engine: self.engine.as_deref().map(StreamBackend::from_tag),
            api_url: self.api_url.clone(),
            mediamtx_config_path: self.mediamtx_config.clone(),
            log_level: self.log_level.clone(),
        }
    }
}

/// Initialize logging: RUST_LOG, else the configured level, else info.
fn init_logging(config: &Config) -> anyhow::Result<Option<WorkerGuard>> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.log_level.as_deref().unwrap_or("info")));
    let stdout_layer = fmt::layer().with_target(false).compact();

    let Some(log_file) = &config.log_file else {
        tracing_subscriber::registry()
            .with(filter)
            .with(stdout_layer)
            .init();
        return Ok(None);
    };

    let file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(log_file)
        .with_context(|| format!("Failed to open log file {}", log_file.display()))?;
    let (writer, guard) = tracing_appender::non_blocking(file);

    tracing_subscriber::registry()
        .with(filter)
        .with(stdout_layer)
        .with(fmt::layer().with_writer(writer).with_ansi(false))
        .init();

    Ok(Some(guard))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Parse command line arguments
    let args = Args::parse();

    // Load configuration
    let config = Config::from_figment(args.overrides())?;
    let _log_guard = init_logging(&config)?;
    info!("Configuration loaded");

    let state = AppState::from_config(&config).await?;

    match args.command.unwrap_or(Command::Run) {
        Command::Run => run(&config).await?,
        Command::List => {
            for stream in state.list_streams().await? {
                println!("{}\t{}\t{}", stream.name, stream.backend, stream.url);
            }
        }
        Command::Add { name, url } => {
            state.add_stream(&name, &url).await?;
            info!(stream = %name, "Stream added");
        }
        Command::Remove { name } => {
            state.remove_stream(&name).await?;
            info!(stream = %name, "Stream removed");
        }
        Command::Rename {
            old_name,
            new_name,
            url,
            backend,
        } => {
            let backend = backend.as_deref().map(StreamBackend::from_tag);
            state
                .update_stream(&old_name, &new_name, &url, backend)
                .await?;
            info!(from = %old_name, to = %new_name, "Stream updated");
        }
        Command::Discover => {
            for found in state.discover().await? {
                println!("{}\t{}", found.address, found.url);
            }
        }
        Command::Probe { url } => match state.probe(&url).await {
            Ok(()) => println!("OK"),
            Err(e) => {
                error!(url = %url, "Probe failed: {}", e);
                return Err(e.into());
            }
        },
    }

    Ok(())
}

/// Supervise the engine until Ctrl+C.
async fn run(config: &Config) -> anyhow::Result<()> {
    let engine_config = match config.engine {
        StreamBackend::Mediamtx => config
            .mediamtx_config_path
            .clone()
            .context("engine.mediamtx_config_path must be set to run MediaMTX")?,
        _ => config.config_path.clone(),
    };

    let mut supervisor = EngineSupervisor::for_engine(config.engine.clone(), &engine_config)
        .with_context(|| {
            format!(
                "Ensure {} is in the current directory or PATH",
                config.engine
            )
        })?;
    supervisor.start()?;

    tokio::signal::ctrl_c()
        .await
        .context("Failed to install Ctrl+C handler")?;
    info!("Received Ctrl+C, shutting down gracefully...");

    supervisor.stop().await?;
    info!("Engine stopped");
    Ok(())
}
