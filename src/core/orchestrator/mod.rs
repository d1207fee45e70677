//! Drives a transformation's steps in order and records every outcome.
//!
//! A step failure is a recorded outcome: the failed run comes back as `Ok`.
//! An [`EngineError`] means the engine could not attempt the run or could not
//! record what happened; in that case the in-memory run is discarded and the
//! store is the only source of truth.

use crate::core::evaluator::{StepError, StepEvaluator};
use scrivener_backend::{RunStore, StoreError, TransformationStore};
use scrivener_types::{Transformation, TransformationRun, TransformationStep};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("Empty input. Please enter some text to transform")]
    EmptyInput,
    #[error("Could not find the selected transformation '{0}'")]
    TransformationNotFound(String),
    #[error("Unable to load transformation: {0}")]
    TransformationLoadFailed(#[source] StoreError),
    #[error("No steps configured. Please add at least one transformation step")]
    NoStepsConfigured,
    #[error("Unable to start transformation run: {0}")]
    RunCreationFailed(#[source] StoreError),
    #[error("Unable to initialize transformation step: {0}")]
    StepRunCreationFailed(#[source] StoreError),
    #[error("Unable to save transformation step result: {0}")]
    StepResultRecordingFailed(#[source] StoreError),
    #[error("Unable to save completed transformation run: {0}")]
    RunCompletionFailed(#[source] StoreError),
}

/// Per-call execution controls.
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    /// Cancelling fails the in-flight step and stops the run.
    pub cancellation: CancellationToken,
    /// Deadline applied to each step separately.
    pub step_timeout: Option<Duration>,
}

impl RunOptions {
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation = token;
        self
    }

    pub fn with_step_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.step_timeout = timeout;
        self
    }
}

#[derive(Clone)]
pub struct PipelineOrchestrator {
    store: Arc<dyn RunStore>,
    evaluator: StepEvaluator,
}

impl PipelineOrchestrator {
    pub fn new(store: Arc<dyn RunStore>, evaluator: StepEvaluator) -> Self {
        PipelineOrchestrator { store, evaluator }
    }

    pub fn store(&self) -> &Arc<dyn RunStore> {
        &self.store
    }

    pub async fn run(
        &self,
        transformation_id: &str,
        input: &str,
        recording_id: Option<&str>,
    ) -> Result<TransformationRun, EngineError> {
        self.run_with(transformation_id, input, recording_id, RunOptions::default())
            .await
    }

    pub async fn run_with(
        &self,
        transformation_id: &str,
        input: &str,
        recording_id: Option<&str>,
        options: RunOptions,
    ) -> Result<TransformationRun, EngineError> {
        if input.trim().is_empty() {
            return Err(EngineError::EmptyInput);
        }

        let transformation = match self.store.get_transformation(transformation_id).await {
            Ok(transformation) => transformation,
            Err(err) if err.is_not_found() => {
                return Err(EngineError::TransformationNotFound(
                    transformation_id.to_string(),
                ))
            }
            Err(err) => return Err(EngineError::TransformationLoadFailed(err)),
        };
        if transformation.steps.is_empty() {
            return Err(EngineError::NoStepsConfigured);
        }

        let run = self
            .store
            .create_run(&transformation.id, recording_id, input)
            .await
            .map_err(EngineError::RunCreationFailed)?;

        let span = tracing::info_span!(
            "transformation_run",
            run_id = %run.id,
            transformation_id = %transformation.id
        );
        self.execute_steps(&transformation, run, &options)
            .instrument(span)
            .await
    }

    async fn execute_steps(
        &self,
        transformation: &Transformation,
        mut run: TransformationRun,
        options: &RunOptions,
    ) -> Result<TransformationRun, EngineError> {
        tracing::info!(steps = transformation.steps.len(), "Run started");
        let mut current_input = run.input.clone();

        for (position, step) in transformation.steps.iter().enumerate() {
            let (next, step_run) = self
                .store
                .append_step_run(&run, &step.id, &current_input)
                .await
                .map_err(EngineError::StepRunCreationFailed)?;
            run = next;
            tracing::debug!(
                step_id = %step.id,
                position,
                kind = step.kind.label(),
                "Step started"
            );

            match self.evaluate_step(step, &current_input, options).await {
                Ok(output) => {
                    run = self
                        .store
                        .complete_step_run(&run, step_run.id, &output)
                        .await
                        .map_err(EngineError::StepResultRecordingFailed)?;
                    tracing::debug!(step_id = %step.id, position, "Step completed");
                    current_input = output;
                }
                Err(err) => {
                    let message = err.to_string();
                    tracing::warn!(step_id = %step.id, position, error = %message, "Step failed");
                    let failed = self
                        .store
                        .fail_run(&run, step_run.id, &message)
                        .await
                        .map_err(EngineError::StepResultRecordingFailed)?;
                    return Ok(failed);
                }
            }
        }

        let completed = self
            .store
            .complete_run(&run, &current_input)
            .await
            .map_err(EngineError::RunCompletionFailed)?;
        tracing::info!("Run completed");
        Ok(completed)
    }

    async fn evaluate_step(
        &self,
        step: &TransformationStep,
        input: &str,
        options: &RunOptions,
    ) -> Result<String, StepError> {
        if options.cancellation.is_cancelled() {
            return Err(StepError::Cancelled);
        }

        let evaluation = self.evaluator.evaluate(step, input);
        let bounded = async {
            match options.step_timeout {
                Some(limit) => match tokio::time::timeout(limit, evaluation).await {
                    Ok(result) => result,
                    Err(_) => Err(StepError::TimedOut(limit)),
                },
                None => evaluation.await,
            }
        };

        tokio::select! {
            biased;
            _ = options.cancellation.cancelled() => Err(StepError::Cancelled),
            result = bounded => result,
        }
    }
}
