use serde::Deserialize;
use std::fmt;
use std::io;
use std::str::FromStr;
use tracing::Subscriber;
use tracing_subscriber::fmt::{self as tracing_fmt, format, writer::BoxMakeWriter};
use tracing_subscriber::registry::LookupSpan;

/// Layer type returned by the console builder.
pub type ConsoleFmtLayer<S> =
    tracing_fmt::Layer<S, format::DefaultFields, format::Format<format::Full>, BoxMakeWriter>;

/// Where console logs should be emitted.
#[derive(Deserialize, Clone, Copy, Debug, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum ConsoleOutput {
    Stdout,
    #[default]
    Stderr,
    None,
}

impl ConsoleOutput {
    fn as_str(&self) -> &'static str {
        match self {
            ConsoleOutput::Stdout => "stdout",
            ConsoleOutput::Stderr => "stderr",
            ConsoleOutput::None => "none",
        }
    }

    fn make_writer(self) -> BoxMakeWriter {
        match self {
            ConsoleOutput::Stdout => BoxMakeWriter::new(io::stdout),
            ConsoleOutput::Stderr => BoxMakeWriter::new(io::stderr),
            ConsoleOutput::None => BoxMakeWriter::new(io::sink),
        }
    }
}

impl fmt::Display for ConsoleOutput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ConsoleOutput {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let wanted = value.trim().to_lowercase();
        [ConsoleOutput::Stdout, ConsoleOutput::Stderr, ConsoleOutput::None]
            .into_iter()
            .find(|output| output.as_str() == wanted)
            .ok_or_else(|| {
                format!(
                    "invalid logging.console_output '{}'; supported values are stdout, stderr, none",
                    value
                )
            })
    }
}

/// Console sink for a command: the user override, else stderr so stdout stays
/// reserved for command output such as `--format json`.
pub fn select_console_output(configured: Option<ConsoleOutput>) -> ConsoleOutput {
    configured.unwrap_or_default()
}

pub fn console_layer<S>(output: ConsoleOutput) -> ConsoleFmtLayer<S>
where
    S: Subscriber + for<'a> LookupSpan<'a>,
{
    layer_with_writer(output.make_writer())
}

fn layer_with_writer<S>(writer: BoxMakeWriter) -> ConsoleFmtLayer<S>
where
    S: Subscriber + for<'a> LookupSpan<'a>,
{
    tracing_fmt::layer()
        .with_writer(writer)
        .with_ansi(false)
        .with_target(false)
}
