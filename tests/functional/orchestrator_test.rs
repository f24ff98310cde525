//! Functional tests for the fallback orchestrator

mod support;

use imagegen_orchestrator::config::{LoadingPolicy, OrchestratorConfig, Settings};
use imagegen_orchestrator::error::{FailureClass, GenerationError};
use imagegen_orchestrator::gateway::{GenerateOptions, Orchestrator, ProviderSelection};
use imagegen_orchestrator::imaging::placeholder::PlaceholderSynthesizer;
use imagegen_orchestrator::provider::{
    GenerationOutcome, ModelOverrides, ProviderAdapter, ProviderRegistry, TransientKind,
};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use support::{loading, RecordingSleeper, ScriptedProvider, Step};
use tokio_util::sync::CancellationToken;

fn orchestrator_with(
    providers: &[Arc<ScriptedProvider>],
    policy: OrchestratorConfig,
    sleeper: Arc<RecordingSleeper>,
) -> Orchestrator {
    let mut registry = ProviderRegistry::new();
    for provider in providers {
        let adapter: Arc<dyn ProviderAdapter> = provider.clone();
        registry.register(adapter).unwrap();
    }
    Orchestrator::new(
        Arc::new(registry),
        policy,
        PlaceholderSynthesizer::new(64, 48, 80, None),
        sleeper,
    )
}

fn orchestrator(providers: &[Arc<ScriptedProvider>]) -> Orchestrator {
    orchestrator_with(providers, OrchestratorConfig::default(), RecordingSleeper::new())
}

fn wait_and_retry(budget: u32) -> OrchestratorConfig {
    OrchestratorConfig {
        loading_policy: LoadingPolicy::WaitAndRetry,
        retry_budget: budget,
        ..OrchestratorConfig::default()
    }
}

fn with_placeholder() -> GenerateOptions {
    GenerateOptions {
        placeholder: Some(true),
        ..Default::default()
    }
}

#[tokio::test]
async fn test_first_provider_success_skips_the_rest() {
    let a = ScriptedProvider::succeeding("a");
    let b = ScriptedProvider::succeeding("b");
    let orchestrator = orchestrator(&[a.clone(), b.clone()]);

    let generated = orchestrator
        .generate("a lighthouse at dusk", GenerateOptions::default())
        .await
        .unwrap();

    assert_eq!(generated.provider_name, "a");
    assert_eq!(generated.attempts, 1);
    assert_eq!(generated.image.mime_type, "image/png");
    assert_eq!(a.calls(), 1);
    assert_eq!(b.calls(), 0);
}

#[tokio::test]
async fn test_blank_prompt_makes_no_calls() {
    let a = ScriptedProvider::succeeding("a");
    let orchestrator = orchestrator(&[a.clone()]);

    for prompt in ["", "   ", "\n\t"] {
        let failure = orchestrator.generate(prompt, with_placeholder()).await.unwrap_err();
        assert_eq!(failure.error, GenerationError::EmptyPrompt);
        assert!(failure.placeholder.is_none());
        assert_eq!(failure.attempts, 0);
    }
    assert_eq!(a.calls(), 0);
}

#[tokio::test]
async fn test_all_failing_providers_tried_once_each() {
    let a = ScriptedProvider::failing("a", GenerationOutcome::permanent("HTTP 400: bad request"));
    let b = ScriptedProvider::failing("b", GenerationOutcome::quota("HTTP 402: out of credits"));
    let c = ScriptedProvider::failing(
        "c",
        GenerationOutcome::transient(TransientKind::Unreachable, "unreachable: refused", None),
    );
    let orchestrator = orchestrator(&[a.clone(), b.clone(), c.clone()]);

    let failure = orchestrator
        .generate("a cat", GenerateOptions::default())
        .await
        .unwrap_err();

    assert_eq!((a.calls(), b.calls(), c.calls()), (1, 1, 1));
    assert_eq!(failure.attempts, 3);
    assert!(failure.placeholder.is_none());
    match failure.error {
        GenerationError::AllProvidersExhausted(reason) => {
            assert_eq!(reason.provider, "b");
            assert_eq!(reason.class, FailureClass::QuotaExhausted);
            assert!(reason.message.contains("402"));
        }
        other => panic!("unexpected error: {:?}", other),
    }
}

#[tokio::test]
async fn test_equally_ranked_failures_report_the_latest() {
    let a = ScriptedProvider::failing("a", GenerationOutcome::permanent("first"));
    let b = ScriptedProvider::failing("b", GenerationOutcome::permanent("second"));
    let orchestrator = orchestrator(&[a, b]);

    let failure = orchestrator.generate("a cat", GenerateOptions::default()).await.unwrap_err();
    match failure.error {
        GenerationError::AllProvidersExhausted(reason) => assert_eq!(reason.message, "second"),
        other => panic!("unexpected error: {:?}", other),
    }
}

#[tokio::test]
async fn test_loading_provider_is_skipped_by_default() {
    let a = ScriptedProvider::failing("a", loading(20));
    let b = ScriptedProvider::succeeding("b");
    let sleeper = RecordingSleeper::new();
    let orchestrator = orchestrator_with(
        &[a.clone(), b.clone()],
        OrchestratorConfig::default(),
        sleeper.clone(),
    );

    let generated = orchestrator.generate("a cat", GenerateOptions::default()).await.unwrap();

    assert_eq!(generated.provider_name, "b");
    assert_eq!(generated.attempts, 2);
    assert_eq!(a.calls(), 1);
    assert_eq!(b.calls(), 1);
    assert!(sleeper.sleeps().is_empty());
}

#[tokio::test]
async fn test_shipped_policy_waits_out_loading_before_falling_back() {
    let shipped = Path::new(env!("CARGO_MANIFEST_DIR")).join("config/default.toml");
    let policy = Settings::load_from_path(shipped).unwrap().orchestrator;
    assert_eq!(policy.loading_policy, LoadingPolicy::WaitAndRetry);

    let a = ScriptedProvider::failing("a", loading(20));
    let b = ScriptedProvider::succeeding("b");
    let sleeper = RecordingSleeper::new();
    let orchestrator = orchestrator_with(&[a.clone(), b.clone()], policy, sleeper.clone());

    let generated = orchestrator
        .generate("a red cube on a table", GenerateOptions::default())
        .await
        .unwrap();

    // Three tries five seconds apart, then the next provider
    assert_eq!(generated.provider_name, "b");
    assert_eq!(a.calls(), 3);
    assert_eq!(b.calls(), 1);
    assert_eq!(sleeper.sleeps(), vec![Duration::from_secs(5); 2]);
}

#[tokio::test]
async fn test_wait_and_retry_recovers_a_loading_provider() {
    let a = ScriptedProvider::new(
        "a",
        vec![Step::Answer(loading(2)), Step::Answer(support::success("a"))],
    );
    let b = ScriptedProvider::succeeding("b");
    let sleeper = RecordingSleeper::new();
    let orchestrator = orchestrator_with(&[a.clone(), b.clone()], wait_and_retry(2), sleeper.clone());

    let generated = orchestrator.generate("a cat", GenerateOptions::default()).await.unwrap();

    assert_eq!(generated.provider_name, "a");
    assert_eq!(a.calls(), 2);
    assert_eq!(b.calls(), 0);
    assert_eq!(sleeper.sleeps(), vec![Duration::from_secs(2)]);
}

#[tokio::test]
async fn test_loading_wait_is_capped() {
    let a = ScriptedProvider::failing("a", loading(120));
    let sleeper = RecordingSleeper::new();
    let policy = OrchestratorConfig {
        max_loading_wait_secs: 5,
        ..wait_and_retry(1)
    };
    let orchestrator = orchestrator_with(&[a.clone()], policy, sleeper.clone());

    let failure = orchestrator.generate("a cat", GenerateOptions::default()).await.unwrap_err();

    assert!(matches!(failure.error, GenerationError::AllProvidersExhausted(_)));
    assert_eq!(a.calls(), 2);
    assert_eq!(sleeper.sleeps(), vec![Duration::from_secs(5)]);
}

#[tokio::test]
async fn test_retry_budget_is_shared_across_providers() {
    let a = ScriptedProvider::failing("a", loading(1));
    let b = ScriptedProvider::failing("b", loading(1));
    let sleeper = RecordingSleeper::new();
    let orchestrator = orchestrator_with(&[a.clone(), b.clone()], wait_and_retry(2), sleeper.clone());

    let failure = orchestrator.generate("a cat", GenerateOptions::default()).await.unwrap_err();

    assert_eq!(a.calls(), 3);
    assert_eq!(b.calls(), 1);
    assert_eq!(failure.attempts, 4);
    assert_eq!(sleeper.sleeps().len(), 2);
}

#[tokio::test]
async fn test_non_loading_failures_are_never_retried() {
    let a = ScriptedProvider::failing(
        "a",
        GenerationOutcome::transient(TransientKind::RateLimited, "rate limited", Some(Duration::from_secs(1))),
    );
    let b = ScriptedProvider::succeeding("b");
    let sleeper = RecordingSleeper::new();
    let orchestrator = orchestrator_with(&[a.clone(), b.clone()], wait_and_retry(5), sleeper.clone());

    orchestrator.generate("a cat", GenerateOptions::default()).await.unwrap();

    assert_eq!(a.calls(), 1);
    assert!(sleeper.sleeps().is_empty());
}

#[tokio::test]
async fn test_placeholder_attached_on_exhaustion_when_requested() {
    let a = ScriptedProvider::failing("a", GenerationOutcome::permanent("HTTP 500"));
    let orchestrator = orchestrator(&[a]);

    let failure = orchestrator.generate("a quiet harbour", with_placeholder()).await.unwrap_err();

    assert!(matches!(failure.error, GenerationError::AllProvidersExhausted(_)));
    let placeholder = failure.placeholder.expect("placeholder requested");
    assert_eq!((placeholder.width(), placeholder.height()), (64, 48));
    assert!(!placeholder.png.is_empty());

    let failure = orchestrator
        .generate("a quiet harbour", GenerateOptions::default())
        .await
        .unwrap_err();
    assert!(failure.placeholder.is_none());
}

#[tokio::test]
async fn test_placeholder_default_comes_from_policy() {
    let a = ScriptedProvider::failing("a", GenerationOutcome::permanent("HTTP 500"));
    let policy = OrchestratorConfig {
        placeholder_on_failure: true,
        ..OrchestratorConfig::default()
    };
    let orchestrator = orchestrator_with(&[a], policy, RecordingSleeper::new());

    let failure = orchestrator.generate("a cat", GenerateOptions::default()).await.unwrap_err();
    assert!(failure.placeholder.is_some());

    let opt_out = GenerateOptions {
        placeholder: Some(false),
        ..Default::default()
    };
    let failure = orchestrator.generate("a cat", opt_out).await.unwrap_err();
    assert!(failure.placeholder.is_none());
}

#[tokio::test]
async fn test_placeholder_seed_follows_request_seed() {
    let a = ScriptedProvider::failing("a", GenerationOutcome::permanent("HTTP 500"));
    let orchestrator = orchestrator(&[a]);
    let options = GenerateOptions {
        placeholder: Some(true),
        overrides: ModelOverrides {
            seed: Some(1234),
            ..Default::default()
        },
        ..Default::default()
    };

    let failure = orchestrator.generate("a cat", options).await.unwrap_err();
    assert_eq!(failure.placeholder.unwrap().seed, 1234);
}

#[tokio::test]
async fn test_no_providers_configured() {
    let orchestrator = orchestrator(&[]);

    let failure = orchestrator.generate("a cat", GenerateOptions::default()).await.unwrap_err();
    assert_eq!(failure.error, GenerationError::NoProvidersConfigured);
    assert!(failure.placeholder.is_none());

    let failure = orchestrator.generate("a cat", with_placeholder()).await.unwrap_err();
    assert_eq!(failure.error, GenerationError::NoProvidersConfigured);
    assert!(failure.placeholder.is_some());
}

#[tokio::test]
async fn test_single_provider_selection() {
    let a = ScriptedProvider::succeeding("a");
    let b = ScriptedProvider::succeeding("b");
    let orchestrator = orchestrator(&[a.clone(), b.clone()]);

    let options = GenerateOptions {
        selection: ProviderSelection::Single("b".into()),
        ..Default::default()
    };
    let generated = orchestrator.generate("a cat", options).await.unwrap();
    assert_eq!(generated.provider_name, "b");
    assert_eq!(a.calls(), 0);

    let options = GenerateOptions {
        selection: ProviderSelection::Single("missing".into()),
        placeholder: Some(true),
        ..Default::default()
    };
    let failure = orchestrator.generate("a cat", options).await.unwrap_err();
    assert_eq!(failure.error, GenerationError::UnknownProvider("missing".into()));
    assert!(failure.placeholder.is_none());
}

#[tokio::test]
async fn test_style_reaches_the_provider() {
    let a = ScriptedProvider::succeeding("a");
    let orchestrator = orchestrator(&[a.clone()]);
    let options = GenerateOptions {
        style: Some("watercolor".into()),
        ..Default::default()
    };

    orchestrator.generate("  a fox  ", options).await.unwrap();
    assert_eq!(a.prompts(), vec!["a fox, watercolor style".to_string()]);
}

#[tokio::test]
async fn test_cancelled_before_start() {
    let a = ScriptedProvider::succeeding("a");
    let orchestrator = orchestrator(&[a.clone()]);
    let cancel = CancellationToken::new();
    cancel.cancel();

    let options = GenerateOptions {
        cancel: Some(cancel),
        placeholder: Some(true),
        ..Default::default()
    };
    let failure = orchestrator.generate("a cat", options).await.unwrap_err();

    assert_eq!(failure.error, GenerationError::Cancelled);
    assert!(failure.placeholder.is_none());
    assert_eq!(a.calls(), 0);
}

#[tokio::test]
async fn test_cancel_during_attempt_stops_the_run() {
    let a = ScriptedProvider::new("a", vec![Step::Hang]);
    let b = ScriptedProvider::succeeding("b");
    let orchestrator = orchestrator(&[a.clone(), b.clone()]);
    let cancel = CancellationToken::new();

    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(20)).await;
        trigger.cancel();
    });

    let options = GenerateOptions {
        cancel: Some(cancel),
        ..Default::default()
    };
    let failure = orchestrator.generate("a cat", options).await.unwrap_err();

    assert_eq!(failure.error, GenerationError::Cancelled);
    assert_eq!(a.calls(), 1);
    assert_eq!(b.calls(), 0);
}

#[tokio::test]
async fn test_attempt_deadline_moves_on() {
    let a = ScriptedProvider::with_deadline("a", vec![Step::Hang], Duration::from_millis(50));
    let b = ScriptedProvider::succeeding("b");
    let orchestrator = orchestrator(&[a.clone(), b.clone()]);

    let generated = tokio::time::timeout(
        Duration::from_secs(5),
        orchestrator.generate("a cat", GenerateOptions::default()),
    )
    .await
    .expect("deadline should bound the hanging provider")
    .unwrap();

    assert_eq!(generated.provider_name, "b");
    assert_eq!(a.calls(), 1);
}
