use async_trait::async_trait;
use scrivener::core::evaluator::{find_replace, StepError};
use scrivener::core::provider::ErrorDetail;
use scrivener::core::{CompletionError, CompletionProvider, Credentials, ProviderRegistry, StepEvaluator};
use scrivener_types::{InferenceProvider, TransformationStep};
use std::sync::{Arc, Mutex};

type Calls = Arc<Mutex<Vec<(String, String, String)>>>;

/// Records the prompts it was called with.
#[derive(Default)]
struct RecordingProvider {
    calls: Calls,
}

#[async_trait]
impl CompletionProvider for RecordingProvider {
    fn provider(&self) -> InferenceProvider {
        InferenceProvider::Groq
    }

    async fn complete(
        &self,
        credentials: &Credentials,
        model: &str,
        system_prompt: &str,
        user_prompt: &str,
    ) -> Result<String, CompletionError> {
        credentials.require(InferenceProvider::Groq)?;
        self.calls.lock().unwrap().push((
            model.to_string(),
            system_prompt.to_string(),
            user_prompt.to_string(),
        ));
        Ok("done".to_string())
    }
}

fn prompt_step() -> TransformationStep {
    TransformationStep::prompt_transform(
        InferenceProvider::Groq,
        "llama-3.3-70b-versatile",
        "You clean up {{input}}-style transcripts.",
        "Transcript:\n{{input}}\nAgain: {{input}}",
    )
}

#[tokio::test]
async fn prompt_templates_are_rendered_before_dispatch() {
    let recorder = RecordingProvider::default();
    let calls = recorder.calls.clone();
    let registry = ProviderRegistry::builder().register(recorder).build();
    let evaluator = StepEvaluator::new(
        registry,
        Credentials::new().with_key(InferenceProvider::Groq, "gsk"),
    );

    let output = evaluator.evaluate(&prompt_step(), "meeting").await.unwrap();
    assert_eq!(output, "done");

    let calls = calls.lock().unwrap();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].0, "llama-3.3-70b-versatile");
    assert_eq!(calls[0].1, "You clean up meeting-style transcripts.");
    assert_eq!(calls[0].2, "Transcript:\nmeeting\nAgain: meeting");
}

#[tokio::test]
async fn missing_credentials_surface_as_provider_error() {
    let recorder = RecordingProvider::default();
    let calls = recorder.calls.clone();
    let registry = ProviderRegistry::builder().register(recorder).build();
    let evaluator = StepEvaluator::new(registry, Credentials::new());

    let err = evaluator.evaluate(&prompt_step(), "x").await.unwrap_err();
    assert!(matches!(
        err,
        StepError::Provider(CompletionError::AuthenticationFailed(ErrorDetail { status: None, .. }))
    ));
    assert!(calls.lock().unwrap().is_empty());
}

#[tokio::test]
async fn unregistered_provider_is_unsupported() {
    let evaluator = StepEvaluator::new(ProviderRegistry::new(), Credentials::new());
    let err = evaluator.evaluate(&prompt_step(), "x").await.unwrap_err();
    assert_eq!(err, StepError::UnsupportedProvider(InferenceProvider::Groq));
}

#[tokio::test]
async fn find_replace_steps_need_no_providers() {
    let evaluator = StepEvaluator::new(ProviderRegistry::new(), Credentials::new());
    let step = TransformationStep::find_replace(r"(?i)\bteh\b", "the", true);
    assert_eq!(
        evaluator.evaluate(&step, "Teh cat and teh hat").await.unwrap(),
        "the cat and the hat"
    );
}

#[test]
fn named_groups_expand_in_regex_mode() {
    assert_eq!(
        find_replace(
            "Smith, Jane",
            r"(?P<last>\w+),\s+(?P<first>\w+)",
            "${first} ${last}",
            true
        )
        .unwrap(),
        "Jane Smith"
    );
}

#[test]
fn literal_mode_keeps_dollar_signs() {
    assert_eq!(find_replace("cost: X", "X", "$1", false).unwrap(), "cost: $1");
}

#[test]
fn regex_matching_nothing_returns_input() {
    assert_eq!(find_replace("abc", r"\d+", "#", true).unwrap(), "abc");
}
