//! Non-durable store backed by in-process maps.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;
use uuid::Uuid;

use scrivener_types::{Transformation, TransformationRun, TransformationStepRun};

use crate::error::{StoreError, StoreResult};
use crate::traits::{RunStore, TransformationStore};

#[derive(Debug, Default)]
pub struct MemoryStore {
    transformations: RwLock<HashMap<String, Transformation>>,
    runs: RwLock<HashMap<Uuid, TransformationRun>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed definitions without the conflict check of `create_transformation`.
    pub async fn with_transformations(
        transformations: impl IntoIterator<Item = Transformation>,
    ) -> StoreResult<Self> {
        let store = Self::new();
        {
            let mut map = store.transformations.write().await;
            for transformation in transformations {
                transformation.validate()?;
                map.insert(transformation.id.clone(), transformation);
            }
        }
        Ok(store)
    }

    /// Load the stored run, apply `transition` and store the result.
    async fn transition<T, F>(&self, run_id: Uuid, transition: F) -> StoreResult<T>
    where
        F: FnOnce(&TransformationRun) -> StoreResult<(TransformationRun, T)>,
    {
        let mut runs = self.runs.write().await;
        let stored = runs
            .get(&run_id)
            .ok_or_else(|| StoreError::run_not_found(run_id))?;
        let (next, extra) = transition(stored)?;
        runs.insert(run_id, next);
        Ok(extra)
    }

    async fn list_runs_where<P>(&self, predicate: P) -> Vec<TransformationRun>
    where
        P: Fn(&TransformationRun) -> bool,
    {
        let runs = self.runs.read().await;
        let mut matching: Vec<TransformationRun> =
            runs.values().filter(|run| predicate(run)).cloned().collect();
        matching.sort_by(|a, b| b.started_at.cmp(&a.started_at));
        matching
    }
}

#[async_trait]
impl TransformationStore for MemoryStore {
    async fn list_transformations(&self) -> StoreResult<Vec<Transformation>> {
        let map = self.transformations.read().await;
        let mut all: Vec<Transformation> = map.values().cloned().collect();
        all.sort_by(|a, b| a.title.cmp(&b.title).then_with(|| a.id.cmp(&b.id)));
        Ok(all)
    }

    async fn get_transformation(&self, id: &str) -> StoreResult<Transformation> {
        self.transformations
            .read()
            .await
            .get(id)
            .cloned()
            .ok_or_else(|| StoreError::transformation_not_found(id))
    }

    async fn create_transformation(
        &self,
        transformation: &Transformation,
    ) -> StoreResult<Transformation> {
        transformation.validate()?;
        let mut map = self.transformations.write().await;
        if map.contains_key(&transformation.id) {
            return Err(StoreError::Conflict(format!(
                "transformation '{}' already exists",
                transformation.id
            )));
        }
        map.insert(transformation.id.clone(), transformation.clone());
        Ok(transformation.clone())
    }

    async fn update_transformation(
        &self,
        transformation: &Transformation,
    ) -> StoreResult<Transformation> {
        transformation.validate()?;
        let mut map = self.transformations.write().await;
        let stored = map
            .get_mut(&transformation.id)
            .ok_or_else(|| StoreError::transformation_not_found(&transformation.id))?;
        let mut updated = transformation.clone();
        updated.created_at = stored.created_at;
        updated.updated_at = Utc::now();
        *stored = updated.clone();
        Ok(updated)
    }

    async fn delete_transformation(&self, id: &str) -> StoreResult<()> {
        self.transformations
            .write()
            .await
            .remove(id)
            .map(|_| ())
            .ok_or_else(|| StoreError::transformation_not_found(id))
    }
}

#[async_trait]
impl RunStore for MemoryStore {
    async fn create_run(
        &self,
        transformation_id: &str,
        recording_id: Option<&str>,
        input: &str,
    ) -> StoreResult<TransformationRun> {
        let run = TransformationRun::start(
            transformation_id,
            recording_id.map(str::to_string),
            input,
            Utc::now(),
        );
        self.runs.write().await.insert(run.id, run.clone());
        Ok(run)
    }

    async fn append_step_run(
        &self,
        run: &TransformationRun,
        step_id: &str,
        input: &str,
    ) -> StoreResult<(TransformationRun, TransformationStepRun)> {
        self.transition(run.id, |stored| {
            let (next, step_run) = stored.append_step_run(step_id, input, Utc::now())?;
            Ok((next.clone(), (next, step_run)))
        })
        .await
    }

    async fn complete_step_run(
        &self,
        run: &TransformationRun,
        step_run_id: Uuid,
        output: &str,
    ) -> StoreResult<TransformationRun> {
        self.transition(run.id, |stored| {
            let next = stored.complete_step_run(step_run_id, output, Utc::now())?;
            Ok((next.clone(), next))
        })
        .await
    }

    async fn fail_run(
        &self,
        run: &TransformationRun,
        step_run_id: Uuid,
        error: &str,
    ) -> StoreResult<TransformationRun> {
        self.transition(run.id, |stored| {
            let next = stored.fail(step_run_id, error, Utc::now())?;
            Ok((next.clone(), next))
        })
        .await
    }

    async fn complete_run(
        &self,
        run: &TransformationRun,
        output: &str,
    ) -> StoreResult<TransformationRun> {
        self.transition(run.id, |stored| {
            let next = stored.complete(output, Utc::now())?;
            Ok((next.clone(), next))
        })
        .await
    }

    async fn get_run(&self, id: Uuid) -> StoreResult<TransformationRun> {
        self.runs
            .read()
            .await
            .get(&id)
            .cloned()
            .ok_or_else(|| StoreError::run_not_found(id))
    }

    async fn list_runs_by_transformation(
        &self,
        transformation_id: &str,
    ) -> StoreResult<Vec<TransformationRun>> {
        Ok(self
            .list_runs_where(|run| run.transformation_id == transformation_id)
            .await)
    }

    async fn list_runs_by_recording(
        &self,
        recording_id: &str,
    ) -> StoreResult<Vec<TransformationRun>> {
        Ok(self
            .list_runs_where(|run| run.recording_id.as_deref() == Some(recording_id))
            .await)
    }
}
