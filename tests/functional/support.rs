//! Shared fakes for the functional tests

#![allow(dead_code)]

use async_trait::async_trait;
use image::{DynamicImage, Rgb, RgbImage};
use imagegen_orchestrator::config::{Protocol, ProviderConfig};
use imagegen_orchestrator::imaging::{encode_png, normalize_to_png, ImagePayload};
use imagegen_orchestrator::provider::{
    GenerationOutcome, GenerationRequest, ProviderAdapter, Sleeper, TransientKind,
};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// What a scripted provider does on one call
#[derive(Debug, Clone)]
pub enum Step {
    Answer(GenerationOutcome),
    /// Block until cancelled
    Hang,
}

/// Provider that replays a fixed script and counts its calls.
/// The last step repeats once the script runs out.
pub struct ScriptedProvider {
    config: ProviderConfig,
    script: Mutex<VecDeque<Step>>,
    last: Mutex<Option<Step>>,
    calls: Mutex<u32>,
    prompts: Mutex<Vec<String>>,
    deadline: Duration,
}

impl ScriptedProvider {
    pub fn new(name: &str, steps: Vec<Step>) -> Arc<Self> {
        Self::with_config(
            ProviderConfig::new(name, Protocol::Sync, format!("https://{}.invalid", name)),
            steps,
        )
    }

    pub fn with_config(config: ProviderConfig, steps: Vec<Step>) -> Arc<Self> {
        Arc::new(Self {
            config,
            script: Mutex::new(steps.into()),
            last: Mutex::new(None),
            calls: Mutex::new(0),
            prompts: Mutex::new(Vec::new()),
            deadline: Duration::from_secs(30),
        })
    }

    pub fn with_deadline(name: &str, steps: Vec<Step>, deadline: Duration) -> Arc<Self> {
        Arc::new(Self {
            config: ProviderConfig::new(name, Protocol::Sync, format!("https://{}.invalid", name)),
            script: Mutex::new(steps.into()),
            last: Mutex::new(None),
            calls: Mutex::new(0),
            prompts: Mutex::new(Vec::new()),
            deadline,
        })
    }

    pub fn succeeding(name: &str) -> Arc<Self> {
        Self::new(name, vec![Step::Answer(success(name))])
    }

    pub fn failing(name: &str, outcome: GenerationOutcome) -> Arc<Self> {
        Self::new(name, vec![Step::Answer(outcome)])
    }

    pub fn calls(&self) -> u32 {
        *self.calls.lock()
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().clone()
    }

    fn next_step(&self) -> Step {
        let next = self.script.lock().pop_front();
        let mut last = self.last.lock();
        match next {
            Some(step) => {
                *last = Some(step.clone());
                step
            }
            None => last
                .clone()
                .unwrap_or_else(|| Step::Answer(GenerationOutcome::permanent("empty script"))),
        }
    }
}

#[async_trait]
impl ProviderAdapter for ScriptedProvider {
    fn config(&self) -> &ProviderConfig {
        &self.config
    }

    fn has_credentials(&self) -> bool {
        true
    }

    fn deadline(&self) -> Duration {
        self.deadline
    }

    async fn generate(
        &self,
        request: &GenerationRequest,
        cancel: &CancellationToken,
    ) -> GenerationOutcome {
        *self.calls.lock() += 1;
        self.prompts.lock().push(request.effective_prompt());
        match self.next_step() {
            Step::Answer(outcome) => outcome,
            Step::Hang => {
                cancel.cancelled().await;
                GenerationOutcome::cancelled()
            }
        }
    }
}

/// Sleeper that returns at once and remembers what it was asked for
#[derive(Default)]
pub struct RecordingSleeper {
    sleeps: Mutex<Vec<Duration>>,
}

impl RecordingSleeper {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn sleeps(&self) -> Vec<Duration> {
        self.sleeps.lock().clone()
    }
}

#[async_trait]
impl Sleeper for RecordingSleeper {
    async fn sleep(&self, duration: Duration) {
        self.sleeps.lock().push(duration);
        tokio::task::yield_now().await;
    }
}

/// A small solid PNG
pub fn png_bytes(width: u32, height: u32) -> Vec<u8> {
    let bitmap = RgbImage::from_pixel(width, height, Rgb([200, 40, 90]));
    encode_png(&DynamicImage::ImageRgb8(bitmap)).unwrap()
}

pub fn payload() -> ImagePayload {
    normalize_to_png(&png_bytes(4, 4)).unwrap()
}

pub fn success(provider: &str) -> GenerationOutcome {
    GenerationOutcome::Success {
        image: payload(),
        provider_name: provider.to_string(),
    }
}

pub fn loading(retry_after_secs: u64) -> GenerationOutcome {
    GenerationOutcome::transient(
        TransientKind::Loading,
        "model is loading",
        Some(Duration::from_secs(retry_after_secs)),
    )
}
