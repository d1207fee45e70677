#![allow(clippy::result_large_err)]

use crate::cli::args::{RunArgs, RunsCommand, TransformationsCommand};
use crate::cli::context::CommandContext;
use crate::core::{
    AppError, EngineError, ErrorCategory, ErrorSeverity, OutputFormat, ReportGenerator, RunOptions,
};
use crate::Result;
use anyhow::Context;
use scrivener_backend::{RunStore, StoreError, TransformationStore};
use scrivener_types::{StepKind, Transformation, TransformationRun, TransformationStep};
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;
use tokio::io::AsyncReadExt;
use tokio_util::sync::CancellationToken;

/// On-disk shape of a definition. Ids and timestamps are optional.
#[derive(Debug, Deserialize)]
struct TransformationFile {
    id: Option<String>,
    title: String,
    #[serde(default)]
    description: String,
    #[serde(default)]
    steps: Vec<StepFile>,
}

#[derive(Debug, Deserialize)]
struct StepFile {
    id: Option<String>,
    #[serde(flatten)]
    kind: StepKind,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ImportDocument {
    Many(Vec<TransformationFile>),
    One(TransformationFile),
}

impl TransformationFile {
    fn into_transformation(self) -> Transformation {
        let mut transformation = Transformation::new(self.title, self.description);
        if let Some(id) = self.id {
            transformation = transformation.with_id(id);
        }
        for step in self.steps {
            let mut definition = TransformationStep::new(step.kind);
            if let Some(id) = step.id {
                definition = definition.with_id(id);
            }
            transformation = transformation.with_step(definition);
        }
        transformation
    }
}

pub async fn transformations(ctx: &CommandContext, command: TransformationsCommand) -> Result<()> {
    match command {
        TransformationsCommand::List { format } => {
            let transformations = ctx
                .store
                .list_transformations()
                .await
                .map_err(AppError::from)?;
            print!(
                "{}",
                ReportGenerator::new(format).transformation_list(&transformations)?
            );
        }
        TransformationsCommand::Show { id, format } => {
            let transformation = ctx
                .store
                .get_transformation(&id)
                .await
                .map_err(AppError::from)?;
            print_report(ReportGenerator::new(format).transformation_detail(&transformation)?);
        }
        TransformationsCommand::Import { file, replace } => {
            let imported = import_transformations(ctx, &file, replace).await?;
            println!("Imported {} transformation(s).", imported);
        }
        TransformationsCommand::Delete { id } => {
            ctx.store
                .delete_transformation(&id)
                .await
                .map_err(AppError::from)?;
            println!("Deleted transformation '{}'.", id);
        }
    }
    Ok(())
}

async fn import_transformations(ctx: &CommandContext, file: &Path, replace: bool) -> Result<usize> {
    let content = tokio::fs::read_to_string(file)
        .await
        .with_context(|| format!("failed to read {}", file.display()))?;
    let document: ImportDocument = serde_json::from_str(&content).map_err(|e| {
        AppError::with_source(
            ErrorCategory::SerializationError,
            format!("Invalid transformation file {}: {}", file.display(), e),
            Box::new(e),
        )
        .with_code("IMPORT-001")
    })?;
    let files = match document {
        ImportDocument::Many(files) => files,
        ImportDocument::One(file) => vec![file],
    };

    let mut imported = 0;
    for definition in files {
        let transformation = definition.into_transformation();
        match ctx.store.create_transformation(&transformation).await {
            Ok(_) => {}
            Err(StoreError::Conflict(_)) if replace => {
                ctx.store
                    .update_transformation(&transformation)
                    .await
                    .map_err(AppError::from)?;
            }
            Err(e) => {
                return Err(AppError::from(e)
                    .with_suggestion("Use --replace to overwrite existing definitions")
                    .into())
            }
        }
        tracing::info!(transformation_id = %transformation.id, "Imported transformation");
        imported += 1;
    }
    Ok(imported)
}

pub async fn run(ctx: &CommandContext, args: RunArgs) -> Result<()> {
    let input = read_input(&args).await?;
    let orchestrator = ctx.orchestrator()?;

    let cancellation = CancellationToken::new();
    let on_interrupt = cancellation.clone();
    let interrupt_watcher = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupt received, cancelling run");
            on_interrupt.cancel();
        }
    });

    let step_timeout = args
        .step_timeout
        .map(Duration::from_secs)
        .or_else(|| ctx.config.execution.step_timeout());
    let options = RunOptions::default()
        .with_cancellation(cancellation.clone())
        .with_step_timeout(step_timeout);

    let outcome = orchestrator
        .run_with(
            &args.transformation_id,
            &input,
            args.recording_id.as_deref(),
            options,
        )
        .await;
    interrupt_watcher.abort();

    let run = outcome.map_err(engine_error)?;
    let generator = ReportGenerator::new(args.format);
    if args.details || args.format == OutputFormat::Json {
        let transformation = ctx.store.get_transformation(&run.transformation_id).await.ok();
        print_report(generator.run_detail(&run, transformation.as_ref())?);
    } else if let Some(output) = run.output() {
        println!("{}", output);
    }

    match run_failure(&run, cancellation.is_cancelled()) {
        Some(error) => Err(error.into()),
        None => Ok(()),
    }
}

/// The command error for a recorded failed run. An interrupted run is a warning.
pub(crate) fn run_failure(run: &TransformationRun, cancelled: bool) -> Option<AppError> {
    let error = run.error()?;
    let (code, severity) = if cancelled {
        ("RUN-CANCELLED", ErrorSeverity::Warning)
    } else {
        ("RUN-FAILED", ErrorSeverity::Error)
    };
    let mut failure = AppError::new(
        ErrorCategory::PipelineError,
        format!("Run {} failed: {}", run.id, error),
    )
    .with_code(code)
    .with_severity(severity)
    .with_suggestion(format!("Inspect the audit trail with `scrivener runs show {}`", run.id));
    failure.add_context("transformation", &run.transformation_id);
    Some(failure)
}

pub async fn runs(ctx: &CommandContext, command: RunsCommand) -> Result<()> {
    match command {
        RunsCommand::List {
            transformation,
            recording,
            format,
        } => {
            let runs = match (transformation, recording) {
                (_, Some(recording)) => ctx.store.list_runs_by_recording(&recording).await,
                (Some(transformation), None) => {
                    ctx.store
                        .list_runs_by_transformation(&transformation)
                        .await
                }
                (None, None) => Ok(Vec::new()),
            }
            .map_err(AppError::from)?;
            print!("{}", ReportGenerator::new(format).run_history(&runs)?);
        }
        RunsCommand::Show { run_id, format } => {
            let run = ctx.store.get_run(run_id).await.map_err(AppError::from)?;
            let transformation = ctx.store.get_transformation(&run.transformation_id).await.ok();
            print_report(ReportGenerator::new(format).run_detail(&run, transformation.as_ref())?);
        }
    }
    Ok(())
}

async fn read_input(args: &RunArgs) -> Result<String> {
    if let Some(input) = &args.input {
        return Ok(input.clone());
    }
    if let Some(path) = &args.input_file {
        return tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("failed to read input file {}", path.display()));
    }
    let mut input = String::new();
    tokio::io::stdin()
        .read_to_string(&mut input)
        .await
        .context("failed to read input from stdin")?;
    Ok(input)
}

fn engine_error(err: EngineError) -> AppError {
    let (category, code) = match &err {
        EngineError::EmptyInput | EngineError::NoStepsConfigured => {
            (ErrorCategory::ValidationError, "ENGINE-400")
        }
        EngineError::TransformationNotFound(_) => (ErrorCategory::ValidationError, "ENGINE-404"),
        EngineError::TransformationLoadFailed(_)
        | EngineError::RunCreationFailed(_)
        | EngineError::StepRunCreationFailed(_)
        | EngineError::StepResultRecordingFailed(_)
        | EngineError::RunCompletionFailed(_) => (ErrorCategory::StorageError, "ENGINE-500"),
    };
    let error = AppError::with_source(category, err.to_string(), Box::new(err)).with_code(code);
    match code {
        "ENGINE-404" => error.with_suggestion("List definitions with `scrivener transformations list`"),
        _ => error,
    }
}

fn print_report(report: String) {
    if report.ends_with('\n') {
        print!("{}", report);
    } else {
        println!("{}", report);
    }
}
