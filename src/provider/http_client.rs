//! HTTP plumbing shared by the provider adapters

use reqwest::header::ACCEPT;
use reqwest::{Client, RequestBuilder, Response};
use serde::Serialize;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::config::{AuthMode, ProviderConfig, Secret};
use crate::error::{AppError, Result};
use crate::provider::classify::{classify_http_status, classify_transport_error};
use crate::provider::traits::GenerationOutcome;

/// HTTP client bound to one provider's credentials and timeouts
pub struct ProviderHttp {
    provider: String,
    client: Client,
    auth: AuthMode,
    api_key: Option<Secret>,
    api_key_env: Option<String>,
}

impl ProviderHttp {
    pub fn new(config: &ProviderConfig, api_key: Option<Secret>) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.timeout())
            .connect_timeout(config.connect_timeout())
            .build()
            .map_err(|e| AppError::Internal(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            provider: config.name.clone(),
            client,
            auth: config.auth,
            api_key,
            api_key_env: config.api_key_env.clone(),
        })
    }

    pub fn has_credentials(&self) -> bool {
        self.auth == AuthMode::None || self.api_key.is_some()
    }

    /// Fails fast when a bearer provider has no token configured
    pub fn require_credentials(&self) -> std::result::Result<(), GenerationOutcome> {
        if self.has_credentials() {
            return Ok(());
        }
        Err(GenerationOutcome::permanent(format!(
            "missing credentials: set {}",
            self.api_key_env.as_deref().unwrap_or("the provider API key")
        )))
    }

    fn authorize(&self, builder: RequestBuilder) -> RequestBuilder {
        match &self.api_key {
            Some(key) if self.auth == AuthMode::Bearer => builder.bearer_auth(key.expose()),
            _ => builder,
        }
    }

    /// POST `body` to each URL in turn until one answers.
    ///
    /// Later URLs are mirrors and only tried when the previous one could not
    /// be reached. The response is returned whatever its status.
    pub async fn post_json<B: Serialize + ?Sized>(
        &self,
        urls: &[String],
        body: &B,
        accept: &str,
        cancel: &CancellationToken,
    ) -> std::result::Result<Response, GenerationOutcome> {
        let mut last_failure = None;

        for url in urls {
            debug!(provider = %self.provider, url = %url, "Sending generation request");
            let request = self.authorize(self.client.post(url).header(ACCEPT, accept).json(body));

            match send(request, cancel).await {
                Ok(response) => return Ok(response),
                Err(outcome @ GenerationOutcome::TransientFailure { .. }) if !cancel.is_cancelled() => {
                    warn!(provider = %self.provider, url = %url, "Provider endpoint unreachable");
                    last_failure = Some(outcome);
                }
                Err(outcome) => return Err(outcome),
            }
        }

        Err(last_failure.unwrap_or_else(|| {
            GenerationOutcome::permanent("no base URL configured")
        }))
    }

    /// GET `url`, optionally with a tighter timeout than the client default
    pub async fn get(
        &self,
        url: &str,
        timeout: Option<Duration>,
        authorized: bool,
        cancel: &CancellationToken,
    ) -> std::result::Result<Response, GenerationOutcome> {
        let mut request = self.client.get(url);
        if let Some(timeout) = timeout {
            request = request.timeout(timeout);
        }
        if authorized {
            request = self.authorize(request);
        }
        send(request, cancel).await
    }
}

async fn send(
    request: RequestBuilder,
    cancel: &CancellationToken,
) -> std::result::Result<Response, GenerationOutcome> {
    tokio::select! {
        _ = cancel.cancelled() => Err(GenerationOutcome::cancelled()),
        result = request.send() => result.map_err(|e| classify_transport_error(&e)),
    }
}

/// Read the body of a successful response
pub async fn read_body(
    response: Response,
    cancel: &CancellationToken,
) -> std::result::Result<Vec<u8>, GenerationOutcome> {
    tokio::select! {
        _ = cancel.cancelled() => Err(GenerationOutcome::cancelled()),
        result = response.bytes() => result
            .map(|b| b.to_vec())
            .map_err(|e| classify_transport_error(&e)),
    }
}

/// Turn a non-success response into an outcome.
///
/// A body that cannot be read still classifies on the status alone.
pub async fn classify_response(response: Response, cancel: &CancellationToken) -> GenerationOutcome {
    let status = response.status();
    let headers = response.headers().clone();
    let body = tokio::select! {
        _ = cancel.cancelled() => return GenerationOutcome::cancelled(),
        result = response.bytes() => match result {
            Ok(body) => body,
            Err(e) => {
                warn!(status = %status, error = %e, "Failed to read error response body");
                Default::default()
            }
        },
    };
    classify_http_status(status, &headers, &body)
}
