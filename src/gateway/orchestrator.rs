//! Sequential fallback orchestration over provider adapters
//!
//! One request walks its provider sequence in order. The first success
//! wins; every failure is classified, and only a loading provider may be
//! retried, within a retry budget shared by the whole request.

use std::sync::Arc;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::{LoadingPolicy, OrchestratorConfig, Settings};
use crate::error::{GenerationError, ProviderFailure, Result};
use crate::gateway::strategy::{resolve_sequence, ProviderSelection};
use crate::imaging::placeholder::{PlaceholderImage, PlaceholderSynthesizer};
use crate::imaging::ImagePayload;
use crate::provider::{
    GenerationOutcome, GenerationRequest, ModelOverrides, ProviderAdapter, ProviderRegistry, Sleeper,
    TokioSleeper, TransientKind,
};

/// Per-call options of [`Orchestrator::generate`]
#[derive(Debug, Clone, Default)]
pub struct GenerateOptions {
    pub selection: ProviderSelection,
    pub style: Option<String>,
    pub negative_prompt: Option<String>,
    pub overrides: ModelOverrides,
    /// Attach a placeholder on failure; `None` defers to configuration
    pub placeholder: Option<bool>,
    pub cancel: Option<CancellationToken>,
}

/// A genuine generation
#[derive(Debug, Clone)]
pub struct GeneratedImage {
    pub image: ImagePayload,
    pub provider_name: String,
    /// Provider attempts made, including the successful one
    pub attempts: u32,
}

/// A terminal failure, possibly with a stand-in image
#[derive(Debug, Error)]
#[error("{error}")]
pub struct OrchestrationFailure {
    pub error: GenerationError,
    pub placeholder: Option<PlaceholderImage>,
    pub attempts: u32,
}

pub type OrchestrationResult = std::result::Result<GeneratedImage, OrchestrationFailure>;

/// Drives a request through its provider sequence
pub struct Orchestrator {
    registry: Arc<ProviderRegistry>,
    policy: OrchestratorConfig,
    placeholder: PlaceholderSynthesizer,
    sleeper: Arc<dyn Sleeper>,
}

impl Orchestrator {
    pub fn new(
        registry: Arc<ProviderRegistry>,
        policy: OrchestratorConfig,
        placeholder: PlaceholderSynthesizer,
        sleeper: Arc<dyn Sleeper>,
    ) -> Self {
        Self {
            registry,
            policy,
            placeholder,
            sleeper,
        }
    }

    /// Wire up providers, policy and placeholder drawing from settings
    pub fn from_settings(settings: &Settings) -> Result<Self> {
        let sleeper: Arc<dyn Sleeper> = Arc::new(TokioSleeper);
        let registry = ProviderRegistry::from_config(&settings.providers, sleeper.clone())?;
        Ok(Self::new(
            Arc::new(registry),
            settings.orchestrator.clone(),
            PlaceholderSynthesizer::from_config(&settings.placeholder),
            sleeper,
        ))
    }

    pub fn registry(&self) -> &ProviderRegistry {
        &self.registry
    }

    pub fn policy(&self) -> &OrchestratorConfig {
        &self.policy
    }

    /// Generate an image for `prompt`
    pub async fn generate(&self, prompt: &str, options: GenerateOptions) -> OrchestrationResult {
        let request = match GenerationRequest::new(prompt) {
            Ok(request) => request
                .with_style(options.style.clone())
                .with_negative_prompt(options.negative_prompt.clone())
                .with_overrides(options.overrides.clone()),
            Err(error) => {
                debug!("Rejected blank prompt");
                return Err(OrchestrationFailure {
                    error,
                    placeholder: None,
                    attempts: 0,
                });
            }
        };

        let want_placeholder = options
            .placeholder
            .unwrap_or(self.policy.placeholder_on_failure);
        let placeholder_seed = request.overrides().seed.map(|s| s as u64);
        let fail = |error: GenerationError, attempts: u32| OrchestrationFailure {
            placeholder: match error {
                GenerationError::AllProvidersExhausted(_) | GenerationError::NoProvidersConfigured
                    if want_placeholder =>
                {
                    Some(self.placeholder.synthesize(request.prompt(), placeholder_seed))
                }
                _ => None,
            },
            error,
            attempts,
        };

        let sequence = match resolve_sequence(&self.registry, &options.selection) {
            Ok(sequence) => sequence,
            Err(error) => {
                warn!(error = %error, "No provider sequence for request");
                return Err(fail(error, 0));
            }
        };

        let cancel = options.cancel.unwrap_or_default();
        let mut retries_left = self.policy.retry_budget;
        let mut attempts = 0u32;
        let mut best_failure: Option<ProviderFailure> = None;

        info!(
            providers = sequence.len(),
            prompt_chars = request.prompt().chars().count(),
            "Starting generation"
        );

        for provider in &sequence {
            loop {
                if cancel.is_cancelled() {
                    return Err(fail(GenerationError::Cancelled, attempts));
                }

                attempts += 1;
                info!(provider = %provider.name(), attempt = attempts, "Trying provider");
                let outcome = self.attempt(provider.as_ref(), &request, &cancel).await;

                let retry_after = match &outcome {
                    GenerationOutcome::Success { .. } => None,
                    GenerationOutcome::TransientFailure {
                        kind: TransientKind::Cancelled,
                        ..
                    } => return Err(fail(GenerationError::Cancelled, attempts)),
                    GenerationOutcome::TransientFailure {
                        kind: TransientKind::Loading,
                        retry_after,
                        ..
                    } => Some(retry_after.unwrap_or_default()),
                    _ => None,
                };

                if let GenerationOutcome::Success {
                    image,
                    provider_name,
                } = outcome
                {
                    info!(provider = %provider_name, attempts, "Generation succeeded");
                    return Ok(GeneratedImage {
                        image,
                        provider_name,
                        attempts,
                    });
                }

                if let Some(failure) = outcome.to_failure(provider.name()) {
                    warn!(
                        provider = %failure.provider,
                        class = ?failure.class,
                        reason = %failure.message,
                        "Provider attempt failed"
                    );
                    best_failure = Some(more_actionable(best_failure, failure));
                }

                match retry_after {
                    Some(wait)
                        if self.policy.loading_policy == LoadingPolicy::WaitAndRetry
                            && retries_left > 0 =>
                    {
                        retries_left -= 1;
                        let wait = wait.min(self.policy.max_loading_wait());
                        info!(
                            provider = %provider.name(),
                            wait_ms = wait.as_millis() as u64,
                            retries_left,
                            "Provider is loading, waiting before retry"
                        );
                        tokio::select! {
                            _ = cancel.cancelled() => {
                                return Err(fail(GenerationError::Cancelled, attempts));
                            }
                            _ = self.sleeper.sleep(wait) => {}
                        }
                    }
                    _ => break,
                }
            }
        }

        let failure = best_failure.unwrap_or_else(|| ProviderFailure {
            provider: "none".to_string(),
            class: crate::error::FailureClass::Transient,
            message: "no provider produced an outcome".to_string(),
        });
        warn!(attempts, reason = %failure, "All providers exhausted");
        Err(fail(GenerationError::AllProvidersExhausted(failure), attempts))
    }

    /// One bounded attempt against one provider
    async fn attempt(
        &self,
        provider: &dyn ProviderAdapter,
        request: &GenerationRequest,
        cancel: &CancellationToken,
    ) -> GenerationOutcome {
        let deadline = provider.deadline();
        match tokio::time::timeout(deadline, provider.generate(request, cancel)).await {
            Ok(outcome) => outcome,
            Err(_) => GenerationOutcome::transient(
                TransientKind::Timeout,
                format!("timeout: no answer within {}s", deadline.as_secs()),
                None,
            ),
        }
    }
}

/// Keep whichever failure tells the caller more; later wins ties
fn more_actionable(current: Option<ProviderFailure>, candidate: ProviderFailure) -> ProviderFailure {
    match current {
        Some(current) if current.class.rank() > candidate.class.rank() => current,
        _ => candidate,
    }
}
