use clap::Parser;
use scrivener::cli::{self, Args};
use scrivener::core::{AppError, DefaultErrorReporter, ErrorReporter};

#[tokio::main]
async fn main() {
    let args = Args::parse();
    if let Err(err) = cli::run(args).await {
        match err.downcast_ref::<AppError>() {
            Some(app_error) => DefaultErrorReporter::new().report_error(app_error),
            None => eprintln!("Error: {:#}", err),
        }
        std::process::exit(1);
    }
}
