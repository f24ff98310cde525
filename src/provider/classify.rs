//! Mapping of provider HTTP responses and transport errors to outcomes

use reqwest::header::{HeaderMap, RETRY_AFTER};
use reqwest::StatusCode;
use serde::Deserialize;
use std::time::Duration;

use crate::provider::traits::{GenerationOutcome, TransientKind};

/// Assumed cold-start time when a 503 carries no estimate
pub const DEFAULT_LOADING_WAIT: Duration = Duration::from_secs(30);

/// Assumed backoff when a 429 carries no Retry-After header
pub const DEFAULT_RATE_LIMIT_WAIT: Duration = Duration::from_secs(60);

const BODY_SNIPPET_CHARS: usize = 200;

/// Estimates in a 503 body beyond this are ignored
const MAX_LOADING_ESTIMATE_SECS: f64 = 3600.0;

#[derive(Deserialize)]
struct LoadingBody {
    estimated_time: Option<f64>,
}

/// Classify a non-success HTTP response
pub fn classify_http_status(status: StatusCode, headers: &HeaderMap, body: &[u8]) -> GenerationOutcome {
    match status.as_u16() {
        503 => {
            let wait = loading_estimate(body).unwrap_or(DEFAULT_LOADING_WAIT);
            GenerationOutcome::transient(
                TransientKind::Loading,
                format!("model is loading (estimated {}s)", wait.as_secs()),
                Some(wait),
            )
        }
        429 => {
            let wait = retry_after(headers).unwrap_or(DEFAULT_RATE_LIMIT_WAIT);
            GenerationOutcome::transient(
                TransientKind::RateLimited,
                format!("rate limited (retry after {}s)", wait.as_secs()),
                Some(wait),
            )
        }
        401 | 403 => GenerationOutcome::permanent(format!(
            "credentials rejected (HTTP {}): {}",
            status.as_u16(),
            snippet(body)
        )),
        402 => GenerationOutcome::quota(format!("quota exhausted (HTTP 402): {}", snippet(body))),
        _ => GenerationOutcome::permanent(format!("HTTP {}: {}", status.as_u16(), snippet(body))),
    }
}

/// Classify a failure to get any response at all
pub fn classify_transport_error(error: &reqwest::Error) -> GenerationOutcome {
    let detail = if error.is_timeout() {
        "request timed out".to_string()
    } else if error.is_connect() {
        format!("connection failed: {}", error)
    } else {
        error.to_string()
    };
    GenerationOutcome::transient(TransientKind::Unreachable, format!("unreachable: {}", detail), None)
}

fn loading_estimate(body: &[u8]) -> Option<Duration> {
    let seconds = serde_json::from_slice::<LoadingBody>(body).ok()?.estimated_time?;
    if seconds.is_finite() && (0.0..=MAX_LOADING_ESTIMATE_SECS).contains(&seconds) {
        Some(Duration::from_secs_f64(seconds))
    } else {
        None
    }
}

fn retry_after(headers: &HeaderMap) -> Option<Duration> {
    let value = headers.get(RETRY_AFTER)?.to_str().ok()?;
    value.trim().parse::<u64>().ok().map(Duration::from_secs)
}

/// Lossy, truncated rendering of a response body for diagnostics
pub fn snippet(body: &[u8]) -> String {
    let text = String::from_utf8_lossy(body);
    let text = text.trim();
    if text.chars().count() <= BODY_SNIPPET_CHARS {
        return text.to_string();
    }
    let mut truncated: String = text.chars().take(BODY_SNIPPET_CHARS).collect();
    truncated.push_str("...");
    truncated
}
