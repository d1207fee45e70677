use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Text-completion vendors a prompt step can dispatch to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum InferenceProvider {
    #[serde(rename = "OpenAI")]
    OpenAi,
    Groq,
    Anthropic,
    Google,
}

impl InferenceProvider {
    pub const ALL: [InferenceProvider; 4] = [
        InferenceProvider::OpenAi,
        InferenceProvider::Groq,
        InferenceProvider::Anthropic,
        InferenceProvider::Google,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            InferenceProvider::OpenAi => "OpenAI",
            InferenceProvider::Groq => "Groq",
            InferenceProvider::Anthropic => "Anthropic",
            InferenceProvider::Google => "Google",
        }
    }
}

impl fmt::Display for InferenceProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for InferenceProvider {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_lowercase().as_str() {
            "openai" => Ok(InferenceProvider::OpenAi),
            "groq" => Ok(InferenceProvider::Groq),
            "anthropic" => Ok(InferenceProvider::Anthropic),
            "google" => Ok(InferenceProvider::Google),
            _ => Err(format!(
                "unknown provider '{}'; supported values are OpenAI, Groq, Anthropic, Google",
                value
            )),
        }
    }
}

/// What a single step does to its input.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StepKind {
    FindReplace {
        find_text: String,
        replace_text: String,
        #[serde(default)]
        use_regex: bool,
    },
    PromptTransform {
        provider: InferenceProvider,
        model: String,
        #[serde(default)]
        system_prompt_template: String,
        #[serde(default)]
        user_prompt_template: String,
    },
}

impl StepKind {
    pub fn label(&self) -> &'static str {
        match self {
            StepKind::FindReplace { .. } => "Find Replace",
            StepKind::PromptTransform { .. } => "Prompt Transform",
        }
    }
}

/// One stage of a transformation. The id correlates step runs back to this definition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransformationStep {
    pub id: String,
    #[serde(flatten)]
    pub kind: StepKind,
}

impl TransformationStep {
    pub fn new(kind: StepKind) -> Self {
        TransformationStep {
            id: Uuid::new_v4().to_string(),
            kind,
        }
    }

    pub fn find_replace(
        find_text: impl Into<String>,
        replace_text: impl Into<String>,
        use_regex: bool,
    ) -> Self {
        Self::new(StepKind::FindReplace {
            find_text: find_text.into(),
            replace_text: replace_text.into(),
            use_regex,
        })
    }

    pub fn prompt_transform(
        provider: InferenceProvider,
        model: impl Into<String>,
        system_prompt_template: impl Into<String>,
        user_prompt_template: impl Into<String>,
    ) -> Self {
        Self::new(StepKind::PromptTransform {
            provider,
            model: model.into(),
            system_prompt_template: system_prompt_template.into(),
            user_prompt_template: user_prompt_template.into(),
        })
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }
}

/// A named, ordered pipeline of steps. Step order is execution order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transformation {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub steps: Vec<TransformationStep>,
}

impl Transformation {
    pub fn new(title: impl Into<String>, description: impl Into<String>) -> Self {
        let now = Utc::now();
        Transformation {
            id: Uuid::new_v4().to_string(),
            title: title.into(),
            description: description.into(),
            created_at: now,
            updated_at: now,
            steps: Vec::new(),
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    pub fn with_step(mut self, step: TransformationStep) -> Self {
        self.steps.push(step);
        self
    }

    pub fn step(&self, step_id: &str) -> Option<&TransformationStep> {
        self.steps.iter().find(|step| step.id == step_id)
    }

    /// Check structural rules that must hold before the definition is stored.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.id.trim().is_empty() {
            return Err(ValidationError::EmptyId);
        }
        let mut seen = HashSet::new();
        for step in &self.steps {
            if step.id.trim().is_empty() {
                return Err(ValidationError::EmptyStepId);
            }
            if !seen.insert(step.id.as_str()) {
                return Err(ValidationError::DuplicateStepId(step.id.clone()));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("transformation id must not be empty")]
    EmptyId,
    #[error("step id must not be empty")]
    EmptyStepId,
    #[error("duplicate step id '{0}'")]
    DuplicateStepId(String),
}
