//! Synchronous provider adapter: one POST, image in the response

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::{ProviderConfig, RequestFormat, ResponseFormat, Secret};
use crate::error::Result;
use crate::imaging::{base64, normalize_to_png};
use crate::provider::http_client::{classify_response, read_body, ProviderHttp};
use crate::provider::traits::{GenerationOutcome, GenerationParams, GenerationRequest, ProviderAdapter};

/// Token in a base URL replaced with the effective model name
const MODEL_TOKEN: &str = "{model}";

/// Provider that answers a generation POST with the image itself
pub struct SyncAdapter {
    config: ProviderConfig,
    http: ProviderHttp,
}

/// Inference-style request body
#[derive(Debug, Serialize)]
struct InferenceRequest<'a> {
    inputs: &'a str,
    parameters: InferenceParameters<'a>,
}

#[derive(Debug, Serialize)]
struct InferenceParameters<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    negative_prompt: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    guidance_scale: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    num_inference_steps: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    width: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    height: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    seed: Option<i64>,
}

/// Flat request body
#[derive(Debug, Serialize)]
struct FlatRequest<'a> {
    #[serde(flatten)]
    params: &'a GenerationParams,
    #[serde(skip_serializing_if = "Option::is_none")]
    model: Option<&'a str>,
}

/// JSON response carrying base64 images
#[derive(Debug, Deserialize)]
struct ApiGenerateResponse {
    #[serde(default)]
    images: Vec<ApiImageData>,
    #[serde(default)]
    data: Vec<ApiImageData>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ApiImageData {
    Encoded(String),
    Object {
        #[serde(default)]
        b64_json: Option<String>,
        #[serde(default)]
        base64: Option<String>,
    },
}

impl ApiImageData {
    fn into_encoded(self) -> Option<String> {
        match self {
            ApiImageData::Encoded(s) => Some(s),
            ApiImageData::Object { b64_json, base64 } => b64_json.or(base64),
        }
    }
}

impl SyncAdapter {
    /// Create an adapter, reading its credential from the environment
    pub fn new(config: ProviderConfig) -> Result<Self> {
        let api_key = config.resolve_api_key();
        Self::with_api_key(config, api_key)
    }

    /// Create an adapter with an explicitly supplied credential
    pub fn with_api_key(config: ProviderConfig, api_key: Option<Secret>) -> Result<Self> {
        let http = ProviderHttp::new(&config, api_key)?;
        Ok(Self { config, http })
    }

    fn endpoint_urls(&self, model: Option<&str>) -> Vec<String> {
        self.config
            .base_urls
            .iter()
            .map(|base| match model {
                Some(model) => base.replace(MODEL_TOKEN, model),
                None => base.clone(),
            })
            .collect()
    }

    fn build_body(&self, params: &GenerationParams) -> Value {
        let body = match self.config.request_format {
            RequestFormat::Inference => serde_json::to_value(InferenceRequest {
                inputs: &params.prompt,
                parameters: InferenceParameters {
                    negative_prompt: params.negative_prompt.as_deref(),
                    guidance_scale: params.guidance_scale,
                    num_inference_steps: params.num_inference_steps,
                    width: params.width,
                    height: params.height,
                    seed: params.seed,
                },
            }),
            RequestFormat::Flat => serde_json::to_value(FlatRequest {
                params,
                model: params.model.as_deref(),
            }),
        };
        // Plain structs of strings and numbers always serialize
        let mut body = body.unwrap_or(Value::Null);
        if let Value::Object(fields) = &mut body {
            for (key, value) in &self.config.extra_body {
                fields.entry(key.clone()).or_insert_with(|| value.clone());
            }
        }
        body
    }

    fn decode_payload(&self, body: &[u8]) -> GenerationOutcome {
        let raw = match self.config.response_format {
            ResponseFormat::Binary => body.to_vec(),
            ResponseFormat::JsonBase64 => match extract_base64_image(body) {
                Ok(raw) => raw,
                Err(reason) => return GenerationOutcome::permanent(reason),
            },
        };

        match normalize_to_png(&raw) {
            Ok(image) => GenerationOutcome::Success {
                image,
                provider_name: self.config.name.clone(),
            },
            Err(e) => GenerationOutcome::permanent(format!("corrupt image payload: {}", e)),
        }
    }
}

/// Pull the first image out of a JSON body of base64 images
fn extract_base64_image(body: &[u8]) -> std::result::Result<Vec<u8>, String> {
    let response: ApiGenerateResponse = serde_json::from_slice(body)
        .map_err(|e| format!("malformed JSON response: {}", e))?;

    // Combine images from both possible response formats
    let encoded = response
        .images
        .into_iter()
        .chain(response.data)
        .find_map(ApiImageData::into_encoded)
        .ok_or_else(|| "response contained no images".to_string())?;

    base64::decode(&encoded).map_err(|e| format!("corrupt image payload: {}", e))
}

#[async_trait]
impl ProviderAdapter for SyncAdapter {
    fn config(&self) -> &ProviderConfig {
        &self.config
    }

    fn has_credentials(&self) -> bool {
        self.http.has_credentials()
    }

    fn deadline(&self) -> Duration {
        let mirrors = self.config.base_urls.len().max(1) as u32;
        (self.config.timeout() + self.config.connect_timeout()) * mirrors
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
        let urls = self.endpoint_urls(params.model.as_deref());
        let body = self.build_body(&params);

        let accept = self.config.response_format.accept_header();
        let response = match self.http.post_json(&urls, &body, accept, cancel).await {
            Ok(response) => response,
            Err(outcome) => return outcome,
        };

        let status = response.status();
        if !status.is_success() {
            let outcome = classify_response(response, cancel).await;
            warn!(provider = %self.config.name, status = %status, "Provider rejected generation request");
            return outcome;
        }

        let bytes = match read_body(response, cancel).await {
            Ok(bytes) => bytes,
            Err(outcome) => return outcome,
        };
        debug!(provider = %self.config.name, size = bytes.len(), "Received provider response");

        let outcome = self.decode_payload(&bytes);
        if outcome.is_success() {
            info!(provider = %self.config.name, "Provider returned an image");
        }
        outcome
    }
}
