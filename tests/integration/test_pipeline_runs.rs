use async_trait::async_trait;
use futures::future::join_all;
use scrivener::core::provider::{CompletionError, ErrorDetail};
use scrivener::core::{
    CompletionProvider, Credentials, EngineError, PipelineOrchestrator, ProviderRegistry,
    RunOptions, StepEvaluator,
};
use scrivener_backend::{MemoryStore, RunStore, SqliteStore, TransformationStore};
use scrivener_types::{InferenceProvider, Transformation, TransformationStep};
use std::sync::Arc;
use std::time::Duration;
use tokio_test::assert_err;
use tokio_util::sync::CancellationToken;

/// Returns the rendered user prompt unchanged.
struct EchoProvider;

#[async_trait]
impl CompletionProvider for EchoProvider {
    fn provider(&self) -> InferenceProvider {
        InferenceProvider::OpenAi
    }

    async fn complete(
        &self,
        _credentials: &Credentials,
        _model: &str,
        _system_prompt: &str,
        user_prompt: &str,
    ) -> Result<String, CompletionError> {
        Ok(user_prompt.to_string())
    }
}

struct RejectingProvider;

#[async_trait]
impl CompletionProvider for RejectingProvider {
    fn provider(&self) -> InferenceProvider {
        InferenceProvider::Anthropic
    }

    async fn complete(
        &self,
        _credentials: &Credentials,
        _model: &str,
        _system_prompt: &str,
        _user_prompt: &str,
    ) -> Result<String, CompletionError> {
        Err(CompletionError::AuthenticationFailed(ErrorDetail::new(
            InferenceProvider::Anthropic,
            Some(401),
            "invalid x-api-key",
        )))
    }
}

/// Never answers within a test's patience.
struct StalledProvider;

#[async_trait]
impl CompletionProvider for StalledProvider {
    fn provider(&self) -> InferenceProvider {
        InferenceProvider::Google
    }

    async fn complete(
        &self,
        _credentials: &Credentials,
        _model: &str,
        _system_prompt: &str,
        _user_prompt: &str,
    ) -> Result<String, CompletionError> {
        tokio::time::sleep(Duration::from_secs(30)).await;
        Ok("too late".to_string())
    }
}

fn evaluator() -> StepEvaluator {
    let registry = ProviderRegistry::builder()
        .register(EchoProvider)
        .register(RejectingProvider)
        .register(StalledProvider)
        .build();
    StepEvaluator::new(registry, Credentials::new())
}

async fn stores(transformations: &[Transformation]) -> Vec<(&'static str, Arc<dyn RunStore>)> {
    let memory: Arc<dyn RunStore> = Arc::new(MemoryStore::new());
    let sqlite: Arc<dyn RunStore> = Arc::new(SqliteStore::in_memory().await.unwrap());
    for store in [&memory, &sqlite] {
        for transformation in transformations {
            store.create_transformation(transformation).await.unwrap();
        }
    }
    vec![("memory", memory), ("sqlite", sqlite)]
}

fn replace(id: &str, find: &str, replace: &str, use_regex: bool) -> TransformationStep {
    TransformationStep::find_replace(find, replace, use_regex).with_id(id)
}

fn echo_prompt(id: &str, template: &str) -> TransformationStep {
    TransformationStep::prompt_transform(InferenceProvider::OpenAi, "gpt-4o", "", template)
        .with_id(id)
}

#[tokio::test]
async fn single_literal_replace_completes() {
    let transformation = Transformation::new("Replace foo", "")
        .with_id("t-foo")
        .with_step(replace("s1", "foo", "bar", false));

    for (name, store) in stores(&[transformation]).await {
        let orchestrator = PipelineOrchestrator::new(store.clone(), evaluator());
        let run = orchestrator.run("t-foo", "foo foo baz", None).await.unwrap();

        assert_eq!(run.output(), Some("bar bar baz"), "{name}");
        assert_eq!(run.step_runs.len(), 1, "{name}");
        assert!(run.completed_at.is_some(), "{name}");
        assert_eq!(store.get_run(run.id).await.unwrap(), run, "{name}");
    }
}

#[tokio::test]
async fn replace_output_feeds_prompt_template() {
    let transformation = Transformation::new("Shout then ask", "")
        .with_id("t-chain")
        .with_step(replace("s1", "hello", "HELLO", false))
        .with_step(echo_prompt("s2", "Rewrite politely: {{input}}"));

    for (name, store) in stores(&[transformation]).await {
        let orchestrator = PipelineOrchestrator::new(store, evaluator());
        let run = orchestrator.run("t-chain", "hello", None).await.unwrap();

        assert_eq!(run.output(), Some("Rewrite politely: HELLO"), "{name}");
        assert_eq!(run.step_runs[1].input, "HELLO", "{name}");
    }
}

#[tokio::test]
async fn step_inputs_chain_through_every_step() {
    let transformation = Transformation::new("Chain", "")
        .with_id("t-chain")
        .with_step(replace("s1", "a", "b", false))
        .with_step(replace("s2", r"b+", "c", true))
        .with_step(echo_prompt("s3", "[{{input}}]"))
        .with_step(replace("s4", "[", "<", false));

    for (name, store) in stores(&[transformation]).await {
        let orchestrator = PipelineOrchestrator::new(store, evaluator());
        let run = orchestrator.run("t-chain", "aab", None).await.unwrap();

        assert_eq!(run.step_runs[0].input, "aab", "{name}");
        for pair in run.step_runs.windows(2) {
            assert_eq!(Some(pair[1].input.as_str()), pair[0].output(), "{name}");
        }
        assert_eq!(run.output(), run.step_runs.last().unwrap().output(), "{name}");
        assert_eq!(run.output(), Some("<c]"), "{name}");
        let step_ids: Vec<_> = run.step_runs.iter().map(|s| s.step_id.as_str()).collect();
        assert_eq!(step_ids, ["s1", "s2", "s3", "s4"], "{name}");
    }
}

#[tokio::test]
async fn transformation_without_steps_creates_no_run() {
    let transformation = Transformation::new("Empty", "").with_id("t-empty");

    for (name, store) in stores(&[transformation]).await {
        let orchestrator = PipelineOrchestrator::new(store.clone(), evaluator());
        let err = orchestrator.run("t-empty", "anything", None).await.unwrap_err();

        assert!(matches!(err, EngineError::NoStepsConfigured), "{name}");
        assert!(
            store.list_runs_by_transformation("t-empty").await.unwrap().is_empty(),
            "{name}"
        );
    }
}

#[tokio::test]
async fn blank_input_is_rejected() {
    let transformation = Transformation::new("Replace", "")
        .with_id("t1")
        .with_step(replace("s1", "a", "b", false));

    for (name, store) in stores(&[transformation]).await {
        let orchestrator = PipelineOrchestrator::new(store.clone(), evaluator());
        for input in ["", "   ", "\n\t"] {
            let err = orchestrator.run("t1", input, None).await.unwrap_err();
            assert!(matches!(err, EngineError::EmptyInput), "{name}");
        }
        assert!(store.list_runs_by_transformation("t1").await.unwrap().is_empty());
    }
}

#[tokio::test]
async fn finished_runs_reject_further_transitions() {
    let transformation = Transformation::new("Replace", "")
        .with_id("t1")
        .with_step(replace("s1", "a", "b", false));

    for (name, store) in stores(&[transformation]).await {
        let orchestrator = PipelineOrchestrator::new(store.clone(), evaluator());
        let run = orchestrator.run("t1", "abc", None).await.unwrap();
        let step_run_id = run.step_runs[0].id;

        assert_err!(store.append_step_run(&run, "s1", "bbc").await, "{name}");
        assert_err!(store.complete_step_run(&run, step_run_id, "x").await, "{name}");
        assert_err!(store.fail_run(&run, step_run_id, "late").await, "{name}");
        assert_err!(store.complete_run(&run, "again").await, "{name}");
        assert_eq!(store.get_run(run.id).await.unwrap(), run, "{name}");
    }
}

#[tokio::test]
async fn invalid_regex_stops_at_the_offending_step() {
    let transformation = Transformation::new("Broken", "")
        .with_id("t-broken")
        .with_step(replace("s1", "(", "x", true))
        .with_step(replace("s2", "a", "b", false))
        .with_step(echo_prompt("s3", "{{input}}"));

    for (name, store) in stores(&[transformation]).await {
        let orchestrator = PipelineOrchestrator::new(store.clone(), evaluator());
        let run = orchestrator.run("t-broken", "abc", None).await.unwrap();

        assert_eq!(run.status.as_str(), "failed", "{name}");
        assert_eq!(run.step_runs.len(), 1, "{name}");
        assert_eq!(run.step_runs[0].step_id, "s1", "{name}");
        assert!(run.error().unwrap().starts_with("Invalid regex pattern"), "{name}");
        assert_eq!(run.step_runs[0].error(), run.error(), "{name}");
    }
}

#[tokio::test]
async fn provider_rejection_fails_the_run() {
    let transformation = Transformation::new("Claude", "")
        .with_id("t-auth")
        .with_step(
            TransformationStep::prompt_transform(
                InferenceProvider::Anthropic,
                "claude-3-5-sonnet-latest",
                "Be brief.",
                "{{input}}",
            )
            .with_id("p1"),
        )
        .with_step(replace("s2", "a", "b", false));

    for (name, store) in stores(&[transformation]).await {
        let orchestrator = PipelineOrchestrator::new(store.clone(), evaluator());
        let run = orchestrator
            .run("t-auth", "hello", Some("rec-1"))
            .await
            .unwrap();

        assert_eq!(run.status.as_str(), "failed", "{name}");
        assert_eq!(run.step_runs.len(), 1, "{name}");
        let error = run.step_runs[0].error().unwrap();
        assert!(error.contains("Authentication failed"), "{name}: {error}");
        assert!(error.contains("invalid x-api-key"), "{name}: {error}");

        let history = store.list_runs_by_recording("rec-1").await.unwrap();
        assert_eq!(history.len(), 1, "{name}");
        assert_eq!(history[0].id, run.id, "{name}");
    }
}

#[tokio::test]
async fn concurrent_runs_stay_independent() {
    let transformation = Transformation::new("Chain", "")
        .with_id("t-shared")
        .with_step(replace("s1", "x", "y", false))
        .with_step(echo_prompt("s2", "<{{input}}>"));

    for (name, store) in stores(&[transformation]).await {
        let orchestrator = PipelineOrchestrator::new(store.clone(), evaluator());
        let first = orchestrator.clone();
        let second = orchestrator.clone();
        let (left, right) = tokio::join!(
            async move { first.run("t-shared", "xx one", None).await },
            async move { second.run("t-shared", "x two", None).await },
        );
        let (left, right) = (left.unwrap(), right.unwrap());

        assert_ne!(left.id, right.id, "{name}");
        assert_eq!(left.output(), Some("<yy one>"), "{name}");
        assert_eq!(right.output(), Some("<y two>"), "{name}");
        for run in [&left, &right] {
            assert_eq!(run.step_runs.len(), 2, "{name}");
            assert_eq!(run.step_runs[1].input, run.step_runs[0].output().unwrap());
            assert_eq!(&store.get_run(run.id).await.unwrap(), run, "{name}");
        }
        assert_eq!(
            store.list_runs_by_transformation("t-shared").await.unwrap().len(),
            2,
            "{name}"
        );
    }
}

#[tokio::test]
async fn many_parallel_runs_each_chain_their_own_input() {
    let transformation = Transformation::new("Tag", "")
        .with_id("t-tag")
        .with_step(replace("s1", "n", "#", false))
        .with_step(echo_prompt("s2", "{{input}}!"));

    for (name, store) in stores(&[transformation]).await {
        let orchestrator = PipelineOrchestrator::new(store.clone(), evaluator());
        let runs = join_all((0..8).map(|index| {
            let orchestrator = orchestrator.clone();
            async move { orchestrator.run("t-tag", &format!("n{index}"), None).await }
        }))
        .await;

        for (index, run) in runs.into_iter().enumerate() {
            let run = run.unwrap();
            assert_eq!(run.input, format!("n{index}"), "{name}");
            assert_eq!(run.output(), Some(format!("#{index}!").as_str()), "{name}");
        }
        assert_eq!(
            store.list_runs_by_transformation("t-tag").await.unwrap().len(),
            8,
            "{name}"
        );
    }
}

#[tokio::test]
async fn history_lists_newest_first() {
    let transformation = Transformation::new("Replace", "")
        .with_id("t1")
        .with_step(replace("s1", "a", "b", false));

    for (name, store) in stores(&[transformation]).await {
        let orchestrator = PipelineOrchestrator::new(store.clone(), evaluator());
        let older = orchestrator.run("t1", "first", None).await.unwrap();
        tokio::time::sleep(Duration::from_millis(5)).await;
        let newer = orchestrator.run("t1", "second", None).await.unwrap();

        let history = store.list_runs_by_transformation("t1").await.unwrap();
        let ids: Vec<_> = history.iter().map(|run| run.id).collect();
        assert_eq!(ids, [newer.id, older.id], "{name}");
    }
}

#[tokio::test]
async fn step_deadline_fails_the_stalled_step() {
    let transformation = Transformation::new("Slow", "")
        .with_id("t-slow")
        .with_step(replace("s1", "a", "b", false))
        .with_step(
            TransformationStep::prompt_transform(InferenceProvider::Google, "gemini", "", "{{input}}")
                .with_id("p1"),
        );

    for (name, store) in stores(&[transformation]).await {
        let orchestrator = PipelineOrchestrator::new(store, evaluator());
        let options = RunOptions::default().with_step_timeout(Some(Duration::from_millis(50)));
        let run = orchestrator
            .run_with("t-slow", "abc", None, options)
            .await
            .unwrap();

        assert_eq!(run.step_runs.len(), 2, "{name}");
        assert_eq!(run.step_runs[0].output(), Some("bbc"), "{name}");
        assert!(run.error().unwrap().starts_with("Step timed out"), "{name}");
    }
}

#[tokio::test]
async fn cancellation_interrupts_the_in_flight_step() {
    let transformation = Transformation::new("Slow", "")
        .with_id("t-slow")
        .with_step(
            TransformationStep::prompt_transform(InferenceProvider::Google, "gemini", "", "{{input}}")
                .with_id("p1"),
        )
        .with_step(replace("s2", "a", "b", false));

    for (name, store) in stores(&[transformation]).await {
        let orchestrator = PipelineOrchestrator::new(store.clone(), evaluator());
        let token = CancellationToken::new();
        let trigger = token.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            trigger.cancel();
        });

        let run = orchestrator
            .run_with("t-slow", "abc", None, RunOptions::default().with_cancellation(token))
            .await
            .unwrap();

        assert_eq!(run.error(), Some("Transformation run was cancelled"), "{name}");
        assert_eq!(run.step_runs.len(), 1, "{name}");
        assert_eq!(store.get_run(run.id).await.unwrap(), run, "{name}");
    }
}
