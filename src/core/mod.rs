pub mod config;
pub mod error;
pub mod evaluator;
pub mod orchestrator;
pub mod provider;
pub mod report;
pub mod types;

pub use config::{ConfigLoader, ConfigValidator, ScrivenerConfig};
pub use error::{AppError, DefaultErrorReporter, ErrorReporter};
pub use evaluator::{StepError, StepEvaluator};
pub use orchestrator::{EngineError, PipelineOrchestrator, RunOptions};
pub use provider::{CompletionError, CompletionProvider, Credentials, ProviderRegistry};
pub use report::{OutputFormat, ReportGenerator};
pub use types::*;
