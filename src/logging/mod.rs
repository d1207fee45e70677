pub mod config;
pub mod layers;

pub use layers::console::ConsoleOutput;

use crate::logging::config::LoggingConfig;
use crate::logging::layers::{console, file};
use crate::Result;
use anyhow::{anyhow, Context};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use tracing_subscriber::filter::EnvFilter;
use tracing_subscriber::prelude::*;
use tracing_subscriber::registry::Registry;

static LOGGER_INITIALIZED: AtomicBool = AtomicBool::new(false);

/// Keeps the file sink flushing for the duration of the command.
pub struct LoggingGuard {
    _file_guard: Option<tracing_appender::non_blocking::WorkerGuard>,
    console_output: ConsoleOutput,
    log_file_path: PathBuf,
}

impl LoggingGuard {
    /// Returns the console output configuration used during initialization.
    pub fn console_output(&self) -> ConsoleOutput {
        self.console_output
    }

    /// Returns the log file path backed by the file sink.
    pub fn log_file_path(&self) -> &Path {
        &self.log_file_path
    }
}

/// Install the global tracing subscriber.
///
/// `RUST_LOG` wins over `logging.default_level`. Errors when called more than
/// once per process.
pub fn init(config_file: Option<&Path>, workspace_root: Option<&Path>) -> Result<LoggingGuard> {
    if LOGGER_INITIALIZED
        .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
        .is_err()
    {
        return Err(anyhow!("logging already initialized"));
    }

    let config = LoggingConfig::load(config_file, workspace_root)?;

    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.default_level))
        .context("failed to configure tracing level")?;
    let log_file_path = file::log_file_path(&config, workspace_root)?;

    type BaseRegistry = Registry;
    type FileSubscriber = file::FileLayerStack<BaseRegistry>;

    let (file_layer, file_guard) =
        file::file_layer::<BaseRegistry>(&log_file_path, config.enable_file)?;

    let console_output = console::select_console_output(config.console_output);
    let console_layer = console::console_layer::<FileSubscriber>(console_output);

    tracing_subscriber::registry()
        .with(file_layer)
        .with(console_layer)
        .with(env_filter)
        .try_init()
        .context("failed to install tracing subscriber")?;

    Ok(LoggingGuard {
        _file_guard: file_guard,
        console_output,
        log_file_path,
    })
}
