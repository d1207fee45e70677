//! Run and step-run audit records plus the run state machine.
//!
//! Every mutation of a run goes through the transition methods on
//! [`TransformationRun`]. They never mutate in place; each returns a new
//! snapshot or a [`TransitionError`] describing which invariant would break.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Lifecycle of a run or step run. `Completed` and `Failed` are terminal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum RunStatus {
    Running,
    Completed { output: String },
    Failed { error: String },
}

/// Step runs share the run lifecycle.
pub type StepRunStatus = RunStatus;

impl RunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunStatus::Running => "running",
            RunStatus::Completed { .. } => "completed",
            RunStatus::Failed { .. } => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, RunStatus::Running)
    }

    pub fn output(&self) -> Option<&str> {
        match self {
            RunStatus::Completed { output } => Some(output),
            _ => None,
        }
    }

    pub fn error(&self) -> Option<&str> {
        match self {
            RunStatus::Failed { error } => Some(error),
            _ => None,
        }
    }
}

/// Audit record of one step's execution within a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransformationStepRun {
    pub id: Uuid,
    pub step_id: String,
    pub input: String,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(flatten)]
    pub status: StepRunStatus,
}

impl TransformationStepRun {
    pub fn output(&self) -> Option<&str> {
        self.status.output()
    }

    pub fn error(&self) -> Option<&str> {
        self.status.error()
    }
}

/// One execution of a transformation against one input.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransformationRun {
    pub id: Uuid,
    pub transformation_id: String,
    /// Lookup-only back reference to the recording the input came from.
    pub recording_id: Option<String>,
    /// Snapshot of the text at invocation time.
    pub input: String,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(flatten)]
    pub status: RunStatus,
    #[serde(default)]
    pub step_runs: Vec<TransformationStepRun>,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransitionError {
    #[error("run {run_id} is already {status}")]
    RunTerminal { run_id: Uuid, status: &'static str },
    #[error("step run {step_run_id} is still running")]
    StepRunInProgress { step_run_id: Uuid },
    #[error("input for step '{step_id}' does not match the previous output")]
    InputMismatch { step_id: String },
    #[error("step run {step_run_id} not found")]
    StepRunNotFound { step_run_id: Uuid },
    #[error("step run {step_run_id} is already {status}")]
    StepRunTerminal {
        step_run_id: Uuid,
        status: &'static str,
    },
    #[error("run {run_id} has no step runs to complete")]
    NoStepRuns { run_id: Uuid },
    #[error("run {run_id} still has unfinished step runs")]
    StepsIncomplete { run_id: Uuid },
    #[error("run {run_id} output does not match the last step output")]
    OutputMismatch { run_id: Uuid },
}

impl TransformationRun {
    /// Start a new run in `running` status with no step runs.
    pub fn start(
        transformation_id: impl Into<String>,
        recording_id: Option<String>,
        input: impl Into<String>,
        now: DateTime<Utc>,
    ) -> Self {
        TransformationRun {
            id: Uuid::new_v4(),
            transformation_id: transformation_id.into(),
            recording_id,
            input: input.into(),
            started_at: now,
            completed_at: None,
            status: RunStatus::Running,
            step_runs: Vec::new(),
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    pub fn output(&self) -> Option<&str> {
        self.status.output()
    }

    pub fn error(&self) -> Option<&str> {
        self.status.error()
    }

    pub fn step_run(&self, step_run_id: Uuid) -> Option<&TransformationStepRun> {
        self.step_runs.iter().find(|step_run| step_run.id == step_run_id)
    }

    /// Text the next step must receive: the run input, or the last completed output.
    pub fn next_input(&self) -> Option<&str> {
        match self.step_runs.last() {
            None => Some(&self.input),
            Some(last) => last.output(),
        }
    }

    fn ensure_running(&self) -> Result<(), TransitionError> {
        if self.is_terminal() {
            return Err(TransitionError::RunTerminal {
                run_id: self.id,
                status: self.status.as_str(),
            });
        }
        Ok(())
    }

    fn running_step_index(&self, step_run_id: Uuid) -> Result<usize, TransitionError> {
        let index = self
            .step_runs
            .iter()
            .position(|step_run| step_run.id == step_run_id)
            .ok_or(TransitionError::StepRunNotFound { step_run_id })?;
        let status = &self.step_runs[index].status;
        if status.is_terminal() {
            return Err(TransitionError::StepRunTerminal {
                step_run_id,
                status: status.as_str(),
            });
        }
        Ok(index)
    }

    /// Append a `running` step run fed with `input`.
    pub fn append_step_run(
        &self,
        step_id: &str,
        input: &str,
        now: DateTime<Utc>,
    ) -> Result<(TransformationRun, TransformationStepRun), TransitionError> {
        self.ensure_running()?;
        if let Some(last) = self.step_runs.last() {
            if !last.status.is_terminal() {
                return Err(TransitionError::StepRunInProgress {
                    step_run_id: last.id,
                });
            }
        }
        if self.next_input() != Some(input) {
            return Err(TransitionError::InputMismatch {
                step_id: step_id.to_string(),
            });
        }

        let step_run = TransformationStepRun {
            id: Uuid::new_v4(),
            step_id: step_id.to_string(),
            input: input.to_string(),
            started_at: now,
            completed_at: None,
            status: RunStatus::Running,
        };
        let mut next = self.clone();
        next.step_runs.push(step_run.clone());
        Ok((next, step_run))
    }

    pub fn complete_step_run(
        &self,
        step_run_id: Uuid,
        output: &str,
        now: DateTime<Utc>,
    ) -> Result<TransformationRun, TransitionError> {
        self.ensure_running()?;
        let index = self.running_step_index(step_run_id)?;
        let mut next = self.clone();
        let step_run = &mut next.step_runs[index];
        step_run.status = RunStatus::Completed {
            output: output.to_string(),
        };
        step_run.completed_at = Some(now);
        Ok(next)
    }

    /// Fail the step run and the run together with the same error.
    pub fn fail(
        &self,
        step_run_id: Uuid,
        error: &str,
        now: DateTime<Utc>,
    ) -> Result<TransformationRun, TransitionError> {
        self.ensure_running()?;
        let index = self.running_step_index(step_run_id)?;
        let mut next = self.clone();
        let step_run = &mut next.step_runs[index];
        step_run.status = RunStatus::Failed {
            error: error.to_string(),
        };
        step_run.completed_at = Some(now);
        next.status = RunStatus::Failed {
            error: error.to_string(),
        };
        next.completed_at = Some(now);
        Ok(next)
    }

    /// Complete the run. Every step run must be completed and the last output must match.
    pub fn complete(
        &self,
        output: &str,
        now: DateTime<Utc>,
    ) -> Result<TransformationRun, TransitionError> {
        self.ensure_running()?;
        let last = self
            .step_runs
            .last()
            .ok_or(TransitionError::NoStepRuns { run_id: self.id })?;
        if self
            .step_runs
            .iter()
            .any(|step_run| step_run.output().is_none())
        {
            return Err(TransitionError::StepsIncomplete { run_id: self.id });
        }
        if last.output() != Some(output) {
            return Err(TransitionError::OutputMismatch { run_id: self.id });
        }
        let mut next = self.clone();
        next.status = RunStatus::Completed {
            output: output.to_string(),
        };
        next.completed_at = Some(now);
        Ok(next)
    }
}
