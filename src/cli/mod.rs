pub mod args;
pub mod commands;
pub mod context;

pub use args::{RunArgs, RunsArgs, TransformationsArgs};
use clap::{Parser, Subcommand};
use context::CommandContext;
use std::path::PathBuf;

const HELP_TEMPLATE: &str = "\
{name} {version}\n\
{about-with-newline}\n\
USAGE:\n    {usage}\n\
\nOPTIONS:\n{options}\n\
PIPELINE COMMANDS:\n{subcommands}\n";

#[derive(Parser)]
#[command(name = "scrivener")]
#[command(version = crate::VERSION)]
#[command(about = "Run transformation pipelines over transcribed text")]
#[command(help_template = HELP_TEMPLATE)]
#[command(
    after_long_help = "Typical flow: import transformation definitions, run one over some text, then inspect the run history."
)]
pub struct Args {
    /// Configuration file (default: ./scrivener.toml when present)
    #[arg(long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Run store database (overrides storage.database_path)
    #[arg(long, global = true, value_name = "FILE")]
    pub database: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    #[command(
        about = "Manage transformation definitions",
        long_about = "Transformations are named, ordered lists of find/replace and prompt steps stored in the run database.",
        after_help = "Examples:\n    scrivener transformations import ./cleanup.json\n    scrivener transformations show cleanup"
    )]
    Transformations(TransformationsArgs),
    #[command(
        about = "Execute a transformation over some text",
        long_about = "Run feeds the input through every step in order, recording each step's input and outcome. A failed step stops the run and the command exits with status 1.",
        after_help = "Examples:\n    scrivener run cleanup --input \"um so hello\"\n    cat transcript.txt | scrivener run cleanup --recording-id rec-42"
    )]
    Run(RunArgs),
    #[command(
        about = "Inspect recorded runs",
        long_about = "Runs lists the history for a transformation or a recording, newest first, and shows the per-step audit trail of a single run.",
        after_help = "Examples:\n    scrivener runs list --transformation cleanup\n    scrivener runs show 6f1c0e5e-2a4b-4c77-9d3e-3f1b2f0d9a11"
    )]
    Runs(RunsArgs),
    #[command(about = "List the environment variables that override configuration")]
    Env,
}

pub async fn run(args: Args) -> crate::Result<()> {
    let workspace = std::env::current_dir()?;
    let _logging = crate::logging::init(args.config.as_deref(), Some(&workspace))?;

    if let Command::Env = args.command {
        for line in crate::core::ConfigLoader::env_var_documentation() {
            println!("{}", line);
        }
        return Ok(());
    }

    let ctx =
        CommandContext::open(args.config.as_deref(), args.database.as_deref(), &workspace).await?;
    let result = match args.command {
        Command::Transformations(transformations) => {
            commands::transformations(&ctx, transformations.command).await
        }
        Command::Run(run_args) => commands::run(&ctx, run_args).await,
        Command::Runs(runs) => commands::runs(&ctx, runs.command).await,
        Command::Env => Ok(()),
    };
    ctx.close().await;
    result
}
