use async_trait::async_trait;
use uuid::Uuid;

use scrivener_types::{Transformation, TransformationRun, TransformationStepRun};

use crate::error::StoreResult;

/// Durable bookkeeping for transformation runs.
///
/// ## Snapshot semantics
///
/// Mutating operations take the caller's last [`TransformationRun`] snapshot
/// but only use its `id`: the stored record is loaded, the transition is
/// applied to it, and the fresh record is written and returned. Callers must
/// continue with the returned snapshot. A transition that would break the
/// run lifecycle is rejected with [`StoreError::InvalidTransition`] and
/// nothing is written.
///
/// ## Durability
///
/// An `Ok` return means the change has been committed. `fail_run` updates
/// the step run and the run in one commit.
///
/// Definitions are read through the [`TransformationStore`] supertrait.
///
/// [`StoreError::InvalidTransition`]: crate::StoreError::InvalidTransition
#[async_trait]
pub trait RunStore: TransformationStore {
    /// Create a `running` run with no step runs.
    async fn create_run(
        &self,
        transformation_id: &str,
        recording_id: Option<&str>,
        input: &str,
    ) -> StoreResult<TransformationRun>;

    /// Append a `running` step run fed with `input`.
    async fn append_step_run(
        &self,
        run: &TransformationRun,
        step_id: &str,
        input: &str,
    ) -> StoreResult<(TransformationRun, TransformationStepRun)>;

    async fn complete_step_run(
        &self,
        run: &TransformationRun,
        step_run_id: Uuid,
        output: &str,
    ) -> StoreResult<TransformationRun>;

    /// Fail the step run and the run with the same error, atomically.
    async fn fail_run(
        &self,
        run: &TransformationRun,
        step_run_id: Uuid,
        error: &str,
    ) -> StoreResult<TransformationRun>;

    async fn complete_run(
        &self,
        run: &TransformationRun,
        output: &str,
    ) -> StoreResult<TransformationRun>;

    async fn get_run(&self, id: Uuid) -> StoreResult<TransformationRun>;

    /// Runs of one transformation, newest first.
    async fn list_runs_by_transformation(
        &self,
        transformation_id: &str,
    ) -> StoreResult<Vec<TransformationRun>>;

    /// Runs fed from one recording, newest first.
    async fn list_runs_by_recording(&self, recording_id: &str)
        -> StoreResult<Vec<TransformationRun>>;
}

/// CRUD over transformation definitions.
#[async_trait]
pub trait TransformationStore: Send + Sync + 'static {
    /// All transformations ordered by title.
    async fn list_transformations(&self) -> StoreResult<Vec<Transformation>>;

    async fn get_transformation(&self, id: &str) -> StoreResult<Transformation>;

    /// Insert a new definition; an existing id is a conflict.
    async fn create_transformation(&self, transformation: &Transformation)
        -> StoreResult<Transformation>;

    /// Replace an existing definition and bump `updated_at`.
    async fn update_transformation(&self, transformation: &Transformation)
        -> StoreResult<Transformation>;

    /// Remove a definition. Runs that reference it are kept.
    async fn delete_transformation(&self, id: &str) -> StoreResult<()>;
}
