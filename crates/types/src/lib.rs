//! Shared record types for Scrivener transformations and their runs.

pub mod run;
pub mod transformation;

pub use run::{RunStatus, StepRunStatus, TransformationRun, TransformationStepRun, TransitionError};
pub use transformation::{
    InferenceProvider, StepKind, Transformation, TransformationStep, ValidationError,
};
