//! Evaluation of a single transformation step.

use crate::core::provider::{CompletionError, Credentials, ProviderRegistry};
use regex::Regex;
use std::borrow::Cow;
use scrivener_types::{InferenceProvider, StepKind, TransformationStep};
use std::sync::Arc;
use std::time::Duration;

/// Placeholder substituted with the step input in prompt templates.
pub const INPUT_PLACEHOLDER: &str = "{{input}}";

/// Why a step failed. The `Display` text is what gets recorded on the run.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StepError {
    #[error("Invalid regex pattern: {0}")]
    InvalidPattern(String),
    #[error(transparent)]
    Provider(#[from] CompletionError),
    #[error("No completion provider is registered for {0}")]
    UnsupportedProvider(InferenceProvider),
    #[error("Step timed out after {0:?}")]
    TimedOut(Duration),
    #[error("Transformation run was cancelled")]
    Cancelled,
}

/// Stateless dispatcher from a step definition to its output.
#[derive(Clone)]
pub struct StepEvaluator {
    providers: ProviderRegistry,
    credentials: Arc<Credentials>,
}

impl StepEvaluator {
    pub fn new(providers: ProviderRegistry, credentials: Credentials) -> Self {
        StepEvaluator {
            providers,
            credentials: Arc::new(credentials),
        }
    }

    pub async fn evaluate(&self, step: &TransformationStep, input: &str) -> Result<String, StepError> {
        match &step.kind {
            StepKind::FindReplace {
                find_text,
                replace_text,
                use_regex,
            } => find_replace(input, find_text, replace_text, *use_regex),
            StepKind::PromptTransform {
                provider,
                model,
                system_prompt_template,
                user_prompt_template,
            } => {
                let adapter = self
                    .providers
                    .get(*provider)
                    .ok_or(StepError::UnsupportedProvider(*provider))?;
                let system_prompt = render_template(system_prompt_template, input);
                let user_prompt = render_template(user_prompt_template, input);
                tracing::debug!(%provider, model = %model, "Dispatching prompt step");
                let output = adapter
                    .complete(&self.credentials, model, &system_prompt, &user_prompt)
                    .await?;
                Ok(output)
            }
        }
    }
}

/// Replace every non-overlapping match of `find_text`.
///
/// In regex mode `$1` and `${name}` in `replace_text` expand capture groups.
/// An empty `find_text` leaves the input unchanged.
pub fn find_replace(
    input: &str,
    find_text: &str,
    replace_text: &str,
    use_regex: bool,
) -> Result<String, StepError> {
    if find_text.is_empty() {
        return Ok(input.to_string());
    }
    if use_regex {
        let pattern =
            Regex::new(find_text).map_err(|err| StepError::InvalidPattern(err.to_string()))?;
        let replacement = brace_group_references(replace_text);
        Ok(pattern.replace_all(input, replacement.as_ref()).into_owned())
    } else {
        Ok(input.replace(find_text, replace_text))
    }
}

/// Rewrite `$1x` as `${1}x` so a numeric group reference ends at its last
/// digit. The regex crate would otherwise read `1x` as a group name.
fn brace_group_references(replacement: &str) -> Cow<'_, str> {
    if !replacement.contains('$') {
        return Cow::Borrowed(replacement);
    }
    let mut rewritten = String::with_capacity(replacement.len() + 4);
    let mut chars = replacement.chars().peekable();
    while let Some(c) = chars.next() {
        if c != '$' {
            rewritten.push(c);
            continue;
        }
        match chars.peek() {
            Some('$') => {
                chars.next();
                rewritten.push_str("$$");
            }
            Some(d) if d.is_ascii_digit() => {
                rewritten.push_str("${");
                while let Some(d) = chars.next_if(|d| d.is_ascii_digit()) {
                    rewritten.push(d);
                }
                rewritten.push('}');
            }
            _ => rewritten.push('$'),
        }
    }
    Cow::Owned(rewritten)
}

/// Substitute every `{{input}}` in `template`.
pub fn render_template(template: &str, input: &str) -> String {
    template.replace(INPUT_PLACEHOLDER, input)
}
