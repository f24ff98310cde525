//! Request handlers

use axum::{
    extract::{rejection::JsonRejection, State},
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use tracing::{info, warn};

use crate::error::{AppError, ErrorDetail, Result};
use crate::gateway::{GenerateOptions, ProviderSelection};
use crate::imaging::base64;
use crate::provider::ModelOverrides;
use crate::AppState;

/// Body of `POST /v1/images/generations`
#[derive(Debug, Default, Deserialize)]
pub struct GenerateBody {
    pub prompt: String,
    #[serde(default)]
    pub style: Option<String>,
    #[serde(default)]
    pub negative_prompt: Option<String>,
    /// Use exactly this provider
    #[serde(default)]
    pub provider: Option<String>,
    /// `priority`, `fastest` or `quality`; ignored when `provider` is set
    #[serde(default)]
    pub strategy: Option<String>,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default, alias = "num_inference_steps")]
    pub steps: Option<u32>,
    #[serde(default)]
    pub guidance_scale: Option<f32>,
    #[serde(default)]
    pub width: Option<u32>,
    #[serde(default)]
    pub height: Option<u32>,
    #[serde(default)]
    pub seed: Option<i64>,
    /// Return a placeholder when every provider fails
    #[serde(default)]
    pub placeholder: Option<bool>,
}

impl GenerateBody {
    fn selection(&self) -> Result<ProviderSelection> {
        if let Some(name) = self.provider.as_deref().filter(|n| !n.trim().is_empty()) {
            return Ok(ProviderSelection::Single(name.trim().to_string()));
        }
        match self.strategy.as_deref() {
            None => Ok(ProviderSelection::Priority),
            Some(name) => ProviderSelection::from_strategy(name)
                .ok_or_else(|| AppError::InvalidRequest(format!("Unknown strategy '{}'", name))),
        }
    }

    fn into_options(self) -> Result<(String, GenerateOptions)> {
        let selection = self.selection()?;
        let options = GenerateOptions {
            selection,
            style: self.style,
            negative_prompt: self.negative_prompt,
            overrides: ModelOverrides {
                model: self.model,
                num_inference_steps: self.steps,
                guidance_scale: self.guidance_scale,
                width: self.width,
                height: self.height,
                seed: self.seed,
            },
            placeholder: self.placeholder,
            cancel: None,
        };
        Ok((self.prompt, options))
    }
}

#[derive(Debug, Serialize)]
pub struct ImageData {
    pub b64_json: String,
    pub mime_type: &'static str,
    pub width: u32,
    pub height: u32,
}

/// Response of `POST /v1/images/generations`
#[derive(Serialize)]
pub struct GenerateResponse {
    pub created: i64,
    pub provider: Option<String>,
    pub placeholder: bool,
    pub attempts: u32,
    pub data: Vec<ImageData>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorDetail>,
}

pub async fn health() -> impl IntoResponse {
    Json(json!({ "status": "ok" }))
}

pub async fn list_providers(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(json!({
        "object": "list",
        "data": state.orchestrator.registry().statuses(),
    }))
}

pub async fn generate_image(
    State(state): State<Arc<AppState>>,
    body: std::result::Result<Json<GenerateBody>, JsonRejection>,
) -> Result<Response> {
    let Json(body) = body.map_err(|e| AppError::InvalidRequest(e.body_text()))?;
    let (prompt, options) = body.into_options()?;

    let _permit = state
        .generation_slots
        .acquire()
        .await
        .map_err(|_| AppError::Internal("generation gate closed".to_string()))?;

    let created = chrono::Utc::now().timestamp();
    match state.orchestrator.generate(&prompt, options).await {
        Ok(generated) => {
            info!(provider = %generated.provider_name, attempts = generated.attempts, "Served generation");
            let image = generated.image;
            Ok(Json(GenerateResponse {
                created,
                provider: Some(generated.provider_name),
                placeholder: false,
                attempts: generated.attempts,
                data: vec![ImageData {
                    b64_json: base64::encode(&image.bytes),
                    mime_type: image.mime_type,
                    width: image.width,
                    height: image.height,
                }],
                error: None,
            })
            .into_response())
        }
        Err(failure) => {
            let error = AppError::from(failure.error);
            let Some(placeholder) = failure.placeholder else {
                return Err(error);
            };
            warn!(error = %error, "Serving placeholder instead of a generation");
            Ok(Json(GenerateResponse {
                created,
                provider: None,
                placeholder: true,
                attempts: failure.attempts,
                data: vec![ImageData {
                    b64_json: base64::encode(&placeholder.png),
                    mime_type: placeholder.mime_type(),
                    width: placeholder.width(),
                    height: placeholder.height(),
                }],
                error: Some(error.to_error_response().error),
            })
            .into_response())
        }
    }
}
