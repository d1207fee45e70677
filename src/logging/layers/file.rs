use crate::logging::config::LoggingConfig;
use crate::Result;
use anyhow::{anyhow, Context};
use std::fs::{self, OpenOptions};
use std::io;
use std::path::{Component, Path, PathBuf};
use tracing::Subscriber;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::fmt::{self as tracing_fmt, format, writer::BoxMakeWriter};
use tracing_subscriber::registry::LookupSpan;

const LOG_FILE_NAME: &str = "scrivener.log";

/// Layer type produced by the file sink builder.
pub type FileFmtLayer<S> =
    tracing_fmt::Layer<S, format::DefaultFields, format::Format<format::Full>, BoxMakeWriter>;

/// Layer stack that already wraps the provided subscriber.
pub type FileLayerStack<S> = tracing_subscriber::layer::Layered<FileFmtLayer<S>, S>;

/// Where the log file goes.
///
/// An absolute `log_dir` is used as is. A relative one is joined onto the
/// workspace and must not climb out of it. Without a workspace the logs go
/// to the per-user data directory.
pub fn log_file_path(config: &LoggingConfig, workspace_root: Option<&Path>) -> Result<PathBuf> {
    let directory = match (&config.log_dir, workspace_root) {
        (Some(dir), _) if dir.is_absolute() => dir.clone(),
        (Some(dir), Some(workspace)) => {
            if dir
                .components()
                .any(|component| matches!(component, Component::ParentDir))
            {
                return Err(anyhow!(
                    "logging.log_dir {} must stay inside the workspace",
                    dir.display()
                ));
            }
            workspace.join(dir)
        }
        (None, Some(workspace)) => workspace.join(".scrivener").join("logs"),
        (custom, None) => {
            let base = dirs_next::data_local_dir()
                .ok_or_else(|| anyhow!("no local data directory for log files"))?
                .join("scrivener");
            match custom {
                Some(dir) => base.join(dir),
                None => base.join("logs"),
            }
        }
    };
    Ok(directory.join(LOG_FILE_NAME))
}

/// File sink behind a non-blocking writer. A disabled sink discards events
/// and creates nothing on disk.
pub fn file_layer<S>(
    log_file: &Path,
    enabled: bool,
) -> Result<(FileFmtLayer<S>, Option<WorkerGuard>)>
where
    S: Subscriber + for<'a> LookupSpan<'a>,
{
    if !enabled {
        return Ok((make_layer(BoxMakeWriter::new(io::sink)), None));
    }

    if let Some(directory) = log_file.parent() {
        fs::create_dir_all(directory)
            .with_context(|| format!("failed to create log directory {}", directory.display()))?;
    }
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(log_file)
        .with_context(|| format!("failed to open log file {}", log_file.display()))?;

    let (writer, guard) = tracing_appender::non_blocking(file);
    Ok((make_layer(BoxMakeWriter::new(writer)), Some(guard)))
}

// Span fields (run_id, transformation_id) are kept so every line can be traced back to a run.
fn make_layer<S>(writer: BoxMakeWriter) -> FileFmtLayer<S>
where
    S: Subscriber + for<'a> LookupSpan<'a>,
{
    tracing_fmt::layer()
        .with_writer(writer)
        .with_ansi(false)
        .with_target(true)
}
