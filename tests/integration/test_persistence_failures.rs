use async_trait::async_trait;
use scrivener::core::{Credentials, EngineError, PipelineOrchestrator, ProviderRegistry, StepEvaluator};
use scrivener_backend::{MemoryStore, RunStore, StoreError, StoreResult, TransformationStore};
use scrivener_types::{Transformation, TransformationRun, TransformationStep, TransformationStepRun};
use std::sync::Arc;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Fault {
    LoadTransformation,
    CreateRun,
    AppendStepRun,
    CompleteStepRun,
    FailRun,
    CompleteRun,
}

/// Delegates to a [`MemoryStore`] but refuses one operation.
struct FlakyStore {
    inner: MemoryStore,
    fault: Fault,
}

impl FlakyStore {
    fn check(&self, operation: Fault) -> StoreResult<()> {
        if self.fault == operation {
            Err(StoreError::Unavailable(format!("{:?} refused", operation)))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl TransformationStore for FlakyStore {
    async fn list_transformations(&self) -> StoreResult<Vec<Transformation>> {
        self.inner.list_transformations().await
    }

    async fn get_transformation(&self, id: &str) -> StoreResult<Transformation> {
        self.check(Fault::LoadTransformation)?;
        self.inner.get_transformation(id).await
    }

    async fn create_transformation(&self, transformation: &Transformation) -> StoreResult<Transformation> {
        self.inner.create_transformation(transformation).await
    }

    async fn update_transformation(&self, transformation: &Transformation) -> StoreResult<Transformation> {
        self.inner.update_transformation(transformation).await
    }

    async fn delete_transformation(&self, id: &str) -> StoreResult<()> {
        self.inner.delete_transformation(id).await
    }
}

#[async_trait]
impl RunStore for FlakyStore {
    async fn create_run(
        &self,
        transformation_id: &str,
        recording_id: Option<&str>,
        input: &str,
    ) -> StoreResult<TransformationRun> {
        self.check(Fault::CreateRun)?;
        self.inner.create_run(transformation_id, recording_id, input).await
    }

    async fn append_step_run(
        &self,
        run: &TransformationRun,
        step_id: &str,
        input: &str,
    ) -> StoreResult<(TransformationRun, TransformationStepRun)> {
        self.check(Fault::AppendStepRun)?;
        self.inner.append_step_run(run, step_id, input).await
    }

    async fn complete_step_run(
        &self,
        run: &TransformationRun,
        step_run_id: Uuid,
        output: &str,
    ) -> StoreResult<TransformationRun> {
        self.check(Fault::CompleteStepRun)?;
        self.inner.complete_step_run(run, step_run_id, output).await
    }

    async fn fail_run(
        &self,
        run: &TransformationRun,
        step_run_id: Uuid,
        error: &str,
    ) -> StoreResult<TransformationRun> {
        self.check(Fault::FailRun)?;
        self.inner.fail_run(run, step_run_id, error).await
    }

    async fn complete_run(&self, run: &TransformationRun, output: &str) -> StoreResult<TransformationRun> {
        self.check(Fault::CompleteRun)?;
        self.inner.complete_run(run, output).await
    }

    async fn get_run(&self, id: Uuid) -> StoreResult<TransformationRun> {
        self.inner.get_run(id).await
    }

    async fn list_runs_by_transformation(&self, transformation_id: &str) -> StoreResult<Vec<TransformationRun>> {
        self.inner.list_runs_by_transformation(transformation_id).await
    }

    async fn list_runs_by_recording(&self, recording_id: &str) -> StoreResult<Vec<TransformationRun>> {
        self.inner.list_runs_by_recording(recording_id).await
    }
}

async fn run_with_fault(fault: Fault, find: &str, use_regex: bool) -> (Arc<FlakyStore>, EngineError) {
    let transformation = Transformation::new("Replace", "")
        .with_id("t1")
        .with_step(TransformationStep::find_replace(find, "x", use_regex).with_id("s1"));
    let store = Arc::new(FlakyStore {
        inner: MemoryStore::with_transformations([transformation]).await.unwrap(),
        fault,
    });
    let evaluator = StepEvaluator::new(ProviderRegistry::new(), Credentials::new());
    let orchestrator = PipelineOrchestrator::new(store.clone(), evaluator);
    let err = orchestrator.run("t1", "abc", None).await.unwrap_err();
    (store, err)
}

#[tokio::test]
async fn unreadable_definition_is_not_reported_as_missing() {
    let (_, err) = run_with_fault(Fault::LoadTransformation, "a", false).await;
    assert!(matches!(err, EngineError::TransformationLoadFailed(_)));
}

#[tokio::test]
async fn run_creation_failure_aborts() {
    let (store, err) = run_with_fault(Fault::CreateRun, "a", false).await;
    assert!(matches!(err, EngineError::RunCreationFailed(_)));
    assert!(err.to_string().starts_with("Unable to start transformation run"));
    assert!(store.list_runs_by_transformation("t1").await.unwrap().is_empty());
}

#[tokio::test]
async fn step_run_creation_failure_leaves_the_run_running() {
    let (store, err) = run_with_fault(Fault::AppendStepRun, "a", false).await;
    assert!(matches!(err, EngineError::StepRunCreationFailed(_)));

    let runs = store.list_runs_by_transformation("t1").await.unwrap();
    assert_eq!(runs.len(), 1);
    assert_eq!(runs[0].status.as_str(), "running");
    assert!(runs[0].step_runs.is_empty());
}

#[tokio::test]
async fn step_result_failure_aborts_after_success() {
    let (_, err) = run_with_fault(Fault::CompleteStepRun, "a", false).await;
    assert!(matches!(err, EngineError::StepResultRecordingFailed(_)));
}

#[tokio::test]
async fn step_result_failure_aborts_after_step_error() {
    let (store, err) = run_with_fault(Fault::FailRun, "(", true).await;
    assert!(matches!(err, EngineError::StepResultRecordingFailed(_)));

    let runs = store.list_runs_by_transformation("t1").await.unwrap();
    assert_eq!(runs[0].step_runs.len(), 1);
    assert_eq!(runs[0].step_runs[0].status.as_str(), "running");
}

#[tokio::test]
async fn run_completion_failure_aborts() {
    let (store, err) = run_with_fault(Fault::CompleteRun, "a", false).await;
    assert!(matches!(err, EngineError::RunCompletionFailed(_)));

    let runs = store.list_runs_by_transformation("t1").await.unwrap();
    assert_eq!(runs[0].status.as_str(), "running");
    assert_eq!(runs[0].step_runs[0].output(), Some("xbc"));
}
