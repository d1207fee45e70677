use crate::core::OutputFormat;
use clap::{Args, Subcommand};
use std::path::PathBuf;

#[derive(Args)]
pub struct TransformationsArgs {
    #[command(subcommand)]
    pub command: TransformationsCommand,
}

#[derive(Subcommand)]
pub enum TransformationsCommand {
    /// List stored transformation definitions
    List {
        /// Output format
        #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
        format: OutputFormat,
    },
    /// Print one definition with its steps
    Show {
        /// Transformation identifier
        #[arg(value_name = "ID")]
        id: String,

        /// Output format
        #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
        format: OutputFormat,
    },
    /// Load definitions from a JSON file (one object or an array)
    Import {
        /// JSON file holding the definitions
        #[arg(value_name = "FILE")]
        file: PathBuf,

        /// Overwrite definitions whose id already exists
        #[arg(long)]
        replace: bool,
    },
    /// Remove a definition; its run history is kept
    Delete {
        /// Transformation identifier
        #[arg(value_name = "ID")]
        id: String,
    },
}

#[derive(Args)]
pub struct RunArgs {
    /// Transformation to execute
    #[arg(value_name = "TRANSFORMATION_ID")]
    pub transformation_id: String,

    /// Text to transform (default: read from stdin)
    #[arg(long, value_name = "TEXT", conflicts_with = "input_file")]
    pub input: Option<String>,

    /// Read the text to transform from a file
    #[arg(long, value_name = "FILE")]
    pub input_file: Option<PathBuf>,

    /// Recording the input text was transcribed from
    #[arg(long, value_name = "ID")]
    pub recording_id: Option<String>,

    /// Deadline for each step in seconds (overrides execution.step_timeout_seconds)
    #[arg(long, value_name = "SECONDS")]
    pub step_timeout: Option<u64>,

    /// Print the full run record instead of only the final output
    #[arg(long)]
    pub details: bool,

    /// Output format
    #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
    pub format: OutputFormat,
}

#[derive(Args)]
pub struct RunsArgs {
    #[command(subcommand)]
    pub command: RunsCommand,
}

#[derive(Subcommand)]
pub enum RunsCommand {
    /// Run history for a transformation or a recording, newest first
    List {
        /// Filter by transformation
        #[arg(long, value_name = "ID", required_unless_present = "recording")]
        transformation: Option<String>,

        /// Filter by recording
        #[arg(long, value_name = "ID", conflicts_with = "transformation")]
        recording: Option<String>,

        /// Output format
        #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
        format: OutputFormat,
    },
    /// Audit trail of a single run
    Show {
        /// Run identifier
        #[arg(value_name = "RUN_ID")]
        run_id: uuid::Uuid,

        /// Output format
        #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
        format: OutputFormat,
    },
}
