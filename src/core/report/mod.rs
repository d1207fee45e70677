#![allow(clippy::result_large_err)]

//! Text and JSON views over transformations and their run history.

use crate::core::error::AppError;
use crate::core::types::ErrorCategory;
use scrivener_types::{StepKind, Transformation, TransformationRun, TransformationStepRun};
use serde::Serialize;

const PREVIEW_CHARS: usize = 60;
const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S UTC";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

/// Renders records for the command line. Holds no state of its own.
#[derive(Debug, Clone, Copy, Default)]
pub struct ReportGenerator {
    format: OutputFormat,
}

impl ReportGenerator {
    pub fn new(format: OutputFormat) -> Self {
        ReportGenerator { format }
    }

    pub fn format(&self) -> OutputFormat {
        self.format
    }

    /// Full audit trail of one run. `transformation` supplies step labels
    /// when the definition is still available.
    pub fn run_detail(
        &self,
        run: &TransformationRun,
        transformation: Option<&Transformation>,
    ) -> Result<String, AppError> {
        tracing::debug!(run_id = %run.id, "Generating run report");
        match self.format {
            OutputFormat::Json => to_json(run),
            OutputFormat::Text => {
                let mut report = String::new();
                report.push_str(&build_run_header(run, transformation));
                report.push_str(&build_steps_section(&run.step_runs, transformation));
                report.push_str(&build_result_section(run));
                Ok(report)
            }
        }
    }

    /// One line per run, in the order given.
    pub fn run_history(&self, runs: &[TransformationRun]) -> Result<String, AppError> {
        match self.format {
            OutputFormat::Json => to_json(&runs),
            OutputFormat::Text => {
                if runs.is_empty() {
                    return Ok("No runs recorded.\n".to_string());
                }
                let mut table = format!(
                    "{:<36}  {:<9}  {:<23}  {:>5}  {}\n",
                    "RUN ID", "STATUS", "STARTED", "STEPS", "TRANSFORMATION"
                );
                for run in runs {
                    table.push_str(&format!(
                        "{:<36}  {:<9}  {:<23}  {:>5}  {}\n",
                        run.id,
                        run.status.as_str(),
                        run.started_at.format(TIMESTAMP_FORMAT),
                        run.step_runs.len(),
                        run.transformation_id
                    ));
                }
                Ok(table)
            }
        }
    }

    pub fn transformation_list(
        &self,
        transformations: &[Transformation],
    ) -> Result<String, AppError> {
        match self.format {
            OutputFormat::Json => to_json(&transformations),
            OutputFormat::Text => {
                if transformations.is_empty() {
                    return Ok("No transformations defined.\n".to_string());
                }
                let width = transformations
                    .iter()
                    .map(|t| t.id.chars().count())
                    .max()
                    .unwrap_or(0)
                    .max(2);
                let mut table = format!("{:<width$}  {:>5}  {}\n", "ID", "STEPS", "TITLE");
                for transformation in transformations {
                    table.push_str(&format!(
                        "{:<width$}  {:>5}  {}\n",
                        transformation.id,
                        transformation.steps.len(),
                        transformation.title
                    ));
                }
                Ok(table)
            }
        }
    }

    pub fn transformation_detail(
        &self,
        transformation: &Transformation,
    ) -> Result<String, AppError> {
        match self.format {
            OutputFormat::Json => to_json(transformation),
            OutputFormat::Text => {
                let mut section = format!("=== {} ===\n\n", transformation.title);
                section.push_str(&format!("ID: {}\n", transformation.id));
                if !transformation.description.is_empty() {
                    section.push_str(&format!("Description: {}\n", transformation.description));
                }
                section.push_str(&format!(
                    "Updated At: {}\n",
                    transformation.updated_at.format(TIMESTAMP_FORMAT)
                ));
                section.push_str("\n=== Steps ===\n");
                if transformation.steps.is_empty() {
                    section.push_str("\n(no steps configured)\n");
                }
                for (index, step) in transformation.steps.iter().enumerate() {
                    section.push_str(&format!(
                        "\n{}. {} ({})\n",
                        index + 1,
                        step.kind.label(),
                        step.id
                    ));
                    section.push_str(&describe_step_kind(&step.kind));
                }
                Ok(section)
            }
        }
    }
}

fn to_json<T: Serialize + ?Sized>(value: &T) -> Result<String, AppError> {
    serde_json::to_string_pretty(value).map_err(|e| {
        AppError::new(
            ErrorCategory::SerializationError,
            format!("Failed to generate JSON report: {}", e),
        )
        .with_code("REPORT-JSON-001")
    })
}

fn build_run_header(run: &TransformationRun, transformation: Option<&Transformation>) -> String {
    let mut section = String::new();
    section.push_str("=== Transformation Run ===\n\n");
    section.push_str(&format!("Run ID: {}\n", run.id));
    match transformation {
        Some(t) => section.push_str(&format!("Transformation: {} ({})\n", t.title, t.id)),
        None => section.push_str(&format!("Transformation: {}\n", run.transformation_id)),
    }
    if let Some(recording_id) = &run.recording_id {
        section.push_str(&format!("Recording: {}\n", recording_id));
    }
    section.push_str(&format!("Status: {}\n", run.status.as_str()));
    section.push_str(&format!(
        "Started At: {}\n",
        run.started_at.format(TIMESTAMP_FORMAT)
    ));
    if let Some(completed_at) = run.completed_at {
        section.push_str(&format!(
            "Completed At: {}\n",
            completed_at.format(TIMESTAMP_FORMAT)
        ));
        let elapsed = completed_at.signed_duration_since(run.started_at);
        section.push_str(&format!("Duration: {}ms\n", elapsed.num_milliseconds()));
    }
    section.push_str(&format!("Input: {}\n", preview(&run.input)));
    section
}

fn build_steps_section(
    step_runs: &[TransformationStepRun],
    transformation: Option<&Transformation>,
) -> String {
    let mut section = String::new();
    section.push_str("\n=== Steps ===\n");

    for (index, step_run) in step_runs.iter().enumerate() {
        let label = transformation
            .and_then(|t| t.step(&step_run.step_id))
            .map(|step| step.kind.label())
            .unwrap_or("Removed step");
        section.push_str(&format!(
            "\nStep {} [{}] ({}):\n",
            index + 1,
            label,
            step_run.step_id
        ));
        section.push_str(&format!("  Status: {}\n", step_run.status.as_str()));
        section.push_str(&format!("  Input: {}\n", preview(&step_run.input)));
        if let Some(output) = step_run.output() {
            section.push_str(&format!("  Output: {}\n", preview(output)));
        }
        if let Some(error) = step_run.error() {
            section.push_str(&format!("  Error: {}\n", error));
        }
        if let Some(completed_at) = step_run.completed_at {
            let elapsed = completed_at.signed_duration_since(step_run.started_at);
            section.push_str(&format!("  Time: {}ms\n", elapsed.num_milliseconds()));
        }
    }
    section
}

fn build_result_section(run: &TransformationRun) -> String {
    match (run.output(), run.error()) {
        (Some(output), _) => format!("\n=== Output ===\n\n{}\n", output),
        (_, Some(error)) => format!("\n=== Error ===\n\n{}\n", error),
        _ => "\n(run still in progress)\n".to_string(),
    }
}

fn describe_step_kind(kind: &StepKind) -> String {
    match kind {
        StepKind::FindReplace {
            find_text,
            replace_text,
            use_regex,
        } => format!(
            "   Find: {:?}\n   Replace: {:?}\n   Regex: {}\n",
            find_text, replace_text, use_regex
        ),
        StepKind::PromptTransform {
            provider,
            model,
            system_prompt_template,
            user_prompt_template,
        } => format!(
            "   Provider: {}\n   Model: {}\n   System: {}\n   User: {}\n",
            provider,
            model,
            preview(system_prompt_template),
            preview(user_prompt_template)
        ),
    }
}

/// Single-line excerpt of `text`, cut on a char boundary.
fn preview(text: &str) -> String {
    let flat: String = text
        .chars()
        .map(|c| if c.is_control() { ' ' } else { c })
        .collect();
    if flat.chars().count() <= PREVIEW_CHARS {
        return flat;
    }
    let mut cut: String = flat.chars().take(PREVIEW_CHARS).collect();
    cut.push_str("...");
    cut
}
