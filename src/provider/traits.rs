//! Common traits and types for image generation providers

use async_trait::async_trait;
use serde::Serialize;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use crate::config::{Protocol, ProviderConfig};
use crate::error::{FailureClass, GenerationError, ProviderFailure};
use crate::imaging::ImagePayload;

/// Per-call overrides of a provider's default parameters
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ModelOverrides {
    pub model: Option<String>,
    pub num_inference_steps: Option<u32>,
    pub guidance_scale: Option<f32>,
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub seed: Option<i64>,
}

/// A validated generation request. The prompt is never blank.
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationRequest {
    prompt: String,
    style: Option<String>,
    negative_prompt: Option<String>,
    overrides: ModelOverrides,
}

impl GenerationRequest {
    /// Create a request, rejecting blank prompts
    pub fn new(prompt: &str) -> Result<Self, GenerationError> {
        let prompt = prompt.trim();
        if prompt.is_empty() {
            return Err(GenerationError::EmptyPrompt);
        }
        Ok(Self {
            prompt: prompt.to_string(),
            style: None,
            negative_prompt: None,
            overrides: ModelOverrides::default(),
        })
    }

    pub fn with_style(mut self, style: Option<String>) -> Self {
        self.style = style.filter(|s| !s.trim().is_empty());
        self
    }

    pub fn with_negative_prompt(mut self, negative_prompt: Option<String>) -> Self {
        self.negative_prompt = negative_prompt.filter(|s| !s.trim().is_empty());
        self
    }

    pub fn with_overrides(mut self, overrides: ModelOverrides) -> Self {
        self.overrides = overrides;
        self
    }

    pub fn prompt(&self) -> &str {
        &self.prompt
    }

    pub fn style(&self) -> Option<&str> {
        self.style.as_deref()
    }

    pub fn overrides(&self) -> &ModelOverrides {
        &self.overrides
    }

    /// The prompt as sent to providers, with the style folded in
    pub fn effective_prompt(&self) -> String {
        match &self.style {
            Some(style) => format!("{}, {} style", self.prompt, style.trim()),
            None => self.prompt.clone(),
        }
    }

    /// Merge this request with a provider's defaults. Request values win.
    pub fn params_for(&self, config: &ProviderConfig) -> GenerationParams {
        let defaults = &config.defaults;
        GenerationParams {
            prompt: self.effective_prompt(),
            negative_prompt: self
                .negative_prompt
                .clone()
                .or_else(|| defaults.negative_prompt.clone()),
            model: self.overrides.model.clone().or_else(|| config.model.clone()),
            num_inference_steps: self
                .overrides
                .num_inference_steps
                .or(defaults.num_inference_steps),
            guidance_scale: self.overrides.guidance_scale.or(defaults.guidance_scale),
            width: self.overrides.width.or(defaults.width),
            height: self.overrides.height.or(defaults.height),
            seed: self.overrides.seed,
        }
    }
}

/// Fully resolved parameters for one provider call
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GenerationParams {
    pub prompt: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub negative_prompt: Option<String>,
    #[serde(skip)]
    pub model: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub num_inference_steps: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub guidance_scale: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub width: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub height: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seed: Option<i64>,
}

/// Why a transient failure happened
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransientKind {
    /// Model is cold-loading (HTTP 503)
    Loading,
    /// HTTP 429
    RateLimited,
    /// Connection refused, DNS failure, request timeout
    Unreachable,
    /// A job did not finish within its poll budget
    Timeout,
    /// The caller cancelled the run
    Cancelled,
}

/// Result of one attempt against one provider
#[derive(Debug, Clone, PartialEq)]
pub enum GenerationOutcome {
    Success {
        image: ImagePayload,
        provider_name: String,
    },
    TransientFailure {
        kind: TransientKind,
        reason: String,
        retry_after: Option<Duration>,
    },
    PermanentFailure {
        reason: String,
    },
    QuotaExhausted {
        reason: String,
    },
}

impl GenerationOutcome {
    pub fn transient(kind: TransientKind, reason: impl Into<String>, retry_after: Option<Duration>) -> Self {
        Self::TransientFailure {
            kind,
            reason: reason.into(),
            retry_after,
        }
    }

    pub fn permanent(reason: impl Into<String>) -> Self {
        Self::PermanentFailure {
            reason: reason.into(),
        }
    }

    pub fn quota(reason: impl Into<String>) -> Self {
        Self::QuotaExhausted {
            reason: reason.into(),
        }
    }

    pub fn cancelled() -> Self {
        Self::transient(TransientKind::Cancelled, "cancelled", None)
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success { .. })
    }

    /// Failure class, `None` for successes
    pub fn failure_class(&self) -> Option<FailureClass> {
        match self {
            Self::Success { .. } => None,
            Self::TransientFailure { .. } => Some(FailureClass::Transient),
            Self::PermanentFailure { .. } => Some(FailureClass::Permanent),
            Self::QuotaExhausted { .. } => Some(FailureClass::QuotaExhausted),
        }
    }

    /// Describe a failure as attributed to `provider`
    pub fn to_failure(&self, provider: &str) -> Option<ProviderFailure> {
        let class = self.failure_class()?;
        let message = match self {
            Self::TransientFailure { reason, .. }
            | Self::PermanentFailure { reason }
            | Self::QuotaExhausted { reason } => reason.clone(),
            Self::Success { .. } => return None,
        };
        Some(ProviderFailure {
            provider: provider.to_string(),
            class,
            message,
        })
    }
}

/// Provider status information
#[derive(Debug, Clone, Serialize)]
pub struct ProviderStatus {
    pub name: String,
    pub protocol: &'static str,
    pub endpoints: Vec<String>,
    pub model: Option<String>,
    pub enabled: bool,
    pub fast: bool,
    pub quality: u8,
    pub credentials_present: bool,
}

/// Trait for image generation provider adapters.
///
/// Adapters never fail with an error: every way a call can go wrong is
/// reported as a [`GenerationOutcome`].
#[async_trait]
pub trait ProviderAdapter: Send + Sync {
    /// Static configuration of the provider
    fn config(&self) -> &ProviderConfig;

    /// Whether the adapter holds every credential it needs
    fn has_credentials(&self) -> bool;

    /// Upper bound for one complete attempt, used by the orchestrator
    fn deadline(&self) -> Duration;

    /// Run one generation attempt
    async fn generate(
        &self,
        request: &GenerationRequest,
        cancel: &CancellationToken,
    ) -> GenerationOutcome;

    fn name(&self) -> &str {
        &self.config().name
    }

    fn protocol(&self) -> Protocol {
        self.config().protocol
    }

    fn is_enabled(&self) -> bool {
        self.config().enabled
    }

    /// Get current status
    fn status(&self) -> ProviderStatus {
        let config = self.config();
        ProviderStatus {
            name: config.name.clone(),
            protocol: config.protocol.as_str(),
            endpoints: config.base_urls.clone(),
            model: config.model.clone(),
            enabled: config.enabled,
            fast: config.fast,
            quality: config.quality,
            credentials_present: self.has_credentials(),
        }
    }
}
