//! Job-based provider adapter: submit a prediction, poll it, download the output

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::{ProviderConfig, Secret};
use crate::error::Result;
use crate::imaging::normalize_to_png;
use crate::provider::http_client::{classify_response, read_body, ProviderHttp};
use crate::provider::sleeper::Sleeper;
use crate::provider::traits::{
    GenerationOutcome, GenerationParams, GenerationRequest, ProviderAdapter, TransientKind,
};

/// A submitted job. Lives only as long as the polling loop that owns it.
#[derive(Debug)]
pub struct JobHandle {
    pub id: String,
    pub provider: String,
    pub status_url: String,
}

#[derive(Debug, Serialize)]
struct SubmitRequest<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    version: Option<&'a str>,
    input: &'a GenerationParams,
}

#[derive(Debug, Deserialize)]
struct SubmitResponse {
    id: Value,
    #[serde(default)]
    urls: Option<JobUrls>,
}

#[derive(Debug, Deserialize)]
struct JobUrls {
    #[serde(default)]
    get: Option<String>,
}

#[derive(Debug, Deserialize)]
struct StatusResponse {
    status: String,
    #[serde(default)]
    output: Option<JobOutput>,
    #[serde(default)]
    error: Option<Value>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum JobOutput {
    One(String),
    Many(Vec<String>),
}

impl JobOutput {
    fn first_url(self) -> Option<String> {
        match self {
            JobOutput::One(url) => Some(url),
            JobOutput::Many(urls) => urls.into_iter().next(),
        }
    }
}

/// Provider that runs generations as asynchronous jobs
pub struct PollAdapter {
    config: ProviderConfig,
    http: ProviderHttp,
    sleeper: Arc<dyn Sleeper>,
}

impl PollAdapter {
    /// Create an adapter, reading its credential from the environment
    pub fn new(config: ProviderConfig, sleeper: Arc<dyn Sleeper>) -> Result<Self> {
        let api_key = config.resolve_api_key();
        Self::with_api_key(config, api_key, sleeper)
    }

    /// Create an adapter with an explicitly supplied credential
    pub fn with_api_key(
        config: ProviderConfig,
        api_key: Option<Secret>,
        sleeper: Arc<dyn Sleeper>,
    ) -> Result<Self> {
        let http = ProviderHttp::new(&config, api_key)?;
        Ok(Self {
            config,
            http,
            sleeper,
        })
    }

    fn submit_urls(&self) -> Vec<String> {
        self.config
            .base_urls
            .iter()
            .map(|base| format!("{}/predictions", base.trim_end_matches('/')))
            .collect()
    }

    async fn submit(
        &self,
        params: &GenerationParams,
        cancel: &CancellationToken,
    ) -> std::result::Result<JobHandle, GenerationOutcome> {
        let body = SubmitRequest {
            version: params.model.as_deref(),
            input: params,
        };

        let response = self
            .http
            .post_json(&self.submit_urls(), &body, "application/json", cancel)
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let outcome = classify_response(response, cancel).await;
            warn!(provider = %self.config.name, status = %status, "Provider rejected job submission");
            return Err(outcome);
        }

        let submit_url = response.url().as_str().trim_end_matches('/').to_string();
        let body = read_body(response, cancel).await?;
        let submitted: SubmitResponse = serde_json::from_slice(&body).map_err(|e| {
            GenerationOutcome::permanent(format!("malformed job submission response: {}", e))
        })?;

        let id = match submitted.id {
            Value::String(id) if !id.is_empty() => id,
            Value::Number(id) => id.to_string(),
            other => {
                return Err(GenerationOutcome::permanent(format!(
                    "job submission returned no usable id: {}",
                    other
                )))
            }
        };
        let status_url = submitted
            .urls
            .and_then(|urls| urls.get)
            .unwrap_or_else(|| format!("{}/{}", submit_url, id));

        Ok(JobHandle {
            id,
            provider: self.config.name.clone(),
            status_url,
        })
    }

    /// Poll until the job settles or the attempt budget runs out
    async fn poll(&self, handle: JobHandle, cancel: &CancellationToken) -> GenerationOutcome {
        let poll = &self.config.poll;

        for attempt in 1..=poll.max_attempts {
            if cancel.is_cancelled() {
                return GenerationOutcome::cancelled();
            }

            match self.check_status(&handle, attempt, cancel).await {
                Ok(Some(status)) => match status.status.as_str() {
                    "succeeded" => return self.fetch_output(&handle, status.output, cancel).await,
                    "failed" | "canceled" | "cancelled" => {
                        let detail = match status.error {
                            Some(Value::String(s)) => s,
                            Some(other) => other.to_string(),
                            None => "no error detail".to_string(),
                        };
                        return GenerationOutcome::permanent(format!(
                            "job {} {}: {}",
                            handle.id, status.status, detail
                        ));
                    }
                    _ => {}
                },
                Ok(None) => {}
                Err(outcome) => return outcome,
            }

            if !self.pause(attempt, cancel).await {
                return GenerationOutcome::cancelled();
            }
        }

        warn!(provider = %handle.provider, job_id = %handle.id, attempts = poll.max_attempts, "Job did not finish in time");
        GenerationOutcome::transient(
            TransientKind::Timeout,
            format!(
                "timeout: job {} unfinished after {} status checks",
                handle.id, poll.max_attempts
            ),
            None,
        )
    }

    /// One status call. `Ok(None)` means the call itself failed in a way
    /// worth another attempt; `Err` ends the polling loop.
    async fn check_status(
        &self,
        handle: &JobHandle,
        attempt: u32,
        cancel: &CancellationToken,
    ) -> std::result::Result<Option<StatusResponse>, GenerationOutcome> {
        let timeout = Some(self.config.poll.status_timeout());
        let response = match self.http.get(&handle.status_url, timeout, true, cancel).await {
            Ok(response) => response,
            Err(_) if cancel.is_cancelled() => return Err(GenerationOutcome::cancelled()),
            Err(outcome) => {
                warn!(provider = %handle.provider, job_id = %handle.id, attempt, outcome = ?outcome, "Job status check failed");
                return Ok(None);
            }
        };

        if !response.status().is_success() {
            return Err(classify_response(response, cancel).await);
        }

        let body = match read_body(response, cancel).await {
            Ok(body) => body,
            Err(_) if cancel.is_cancelled() => return Err(GenerationOutcome::cancelled()),
            Err(outcome) => {
                warn!(provider = %handle.provider, job_id = %handle.id, attempt, outcome = ?outcome, "Failed to read job status");
                return Ok(None);
            }
        };

        let status: StatusResponse = serde_json::from_slice(&body).map_err(|e| {
            GenerationOutcome::permanent(format!("malformed job status response: {}", e))
        })?;
        debug!(provider = %handle.provider, job_id = %handle.id, attempt, status = %status.status, "Polled job");
        Ok(Some(status))
    }

    /// Sleep between polls unless this was the last attempt.
    /// Returns false when cancelled while waiting.
    async fn pause(&self, attempt: u32, cancel: &CancellationToken) -> bool {
        if attempt >= self.config.poll.max_attempts {
            return true;
        }
        tokio::select! {
            _ = cancel.cancelled() => false,
            _ = self.sleeper.sleep(self.config.poll.interval()) => true,
        }
    }

    async fn fetch_output(
        &self,
        handle: &JobHandle,
        output: Option<JobOutput>,
        cancel: &CancellationToken,
    ) -> GenerationOutcome {
        let Some(url) = output.and_then(JobOutput::first_url) else {
            return GenerationOutcome::permanent(format!("job {} succeeded without output", handle.id));
        };

        debug!(provider = %handle.provider, job_id = %handle.id, url = %url, "Downloading job output");

        let response = match self.http.get(&url, None, false, cancel).await {
            Ok(response) => response,
            Err(outcome) => return outcome,
        };
        if !response.status().is_success() {
            return classify_response(response, cancel).await;
        }
        let bytes = match read_body(response, cancel).await {
            Ok(bytes) => bytes,
            Err(outcome) => return outcome,
        };

        match normalize_to_png(&bytes) {
            Ok(image) => {
                info!(provider = %handle.provider, job_id = %handle.id, "Job produced an image");
                GenerationOutcome::Success {
                    image,
                    provider_name: handle.provider.clone(),
                }
            }
            Err(e) => GenerationOutcome::permanent(format!("corrupt image payload: {}", e)),
        }
    }
}

#[async_trait]
impl ProviderAdapter for PollAdapter {
    fn config(&self) -> &ProviderConfig {
        &self.config
    }

    fn has_credentials(&self) -> bool {
        self.http.has_credentials()
    }

    fn deadline(&self) -> Duration {
        let poll = &self.config.poll;
        let per_poll = poll.interval() + poll.status_timeout();
        // submit + polls + download
        self.config.timeout() * 2 + per_poll * poll.max_attempts
    }

    async fn generate(
        &self,
        request: &GenerationRequest,
        cancel: &CancellationToken,
    ) -> GenerationOutcome {
        if let Err(outcome) = self.http.require_credentials() {
            return outcome;
        }

        let params = request.params_for(&self.config);
        let handle = match self.submit(&params, cancel).await {
            Ok(handle) => handle,
            Err(outcome) => return outcome,
        };

        info!(provider = %handle.provider, job_id = %handle.id, "Submitted generation job");
        self.poll(handle, cancel).await
    }
}
