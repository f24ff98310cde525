//! Application settings and configuration management

use crate::config::Secret;
use crate::error::{AppError, Result};
use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Root configuration structure
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Settings {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub orchestrator: OrchestratorConfig,
    #[serde(default)]
    pub placeholder: PlaceholderConfig,
    #[serde(default)]
    pub providers: Vec<ProviderConfig>,
}

/// Server configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Generations admitted at once; the rest wait their turn
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent_generations: usize,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_max_concurrent() -> usize {
    1
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            max_concurrent_generations: default_max_concurrent(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default = "default_log_format")]
    pub format: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "json".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

/// What to do when a provider reports that its model is still loading
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum LoadingPolicy {
    /// Move on to the next provider right away
    #[default]
    Advance,
    /// Wait out the suggested delay (capped) and retry the same provider
    WaitAndRetry,
}

/// Retry and fallback policy
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct OrchestratorConfig {
    #[serde(default)]
    pub loading_policy: LoadingPolicy,
    /// Same-provider retries allowed per request, shared by all providers
    #[serde(default = "default_retry_budget")]
    pub retry_budget: u32,
    /// Ceiling on a single loading wait
    #[serde(default = "default_max_loading_wait")]
    pub max_loading_wait_secs: u64,
    #[serde(default)]
    pub placeholder_on_failure: bool,
}

fn default_retry_budget() -> u32 {
    2
}

fn default_max_loading_wait() -> u64 {
    5
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            loading_policy: LoadingPolicy::default(),
            retry_budget: default_retry_budget(),
            max_loading_wait_secs: default_max_loading_wait(),
            placeholder_on_failure: false,
        }
    }
}

impl OrchestratorConfig {
    pub fn max_loading_wait(&self) -> Duration {
        Duration::from_secs(self.max_loading_wait_secs)
    }
}

/// Placeholder image configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PlaceholderConfig {
    #[serde(default = "default_placeholder_side")]
    pub width: u32,
    #[serde(default = "default_placeholder_side")]
    pub height: u32,
    #[serde(default = "default_max_prompt_chars")]
    pub max_prompt_chars: usize,
    /// TrueType/OpenType font used for the prompt overlay
    #[serde(default)]
    pub font_path: Option<PathBuf>,
}

/// Largest placeholder width or height accepted
pub const MAX_PLACEHOLDER_SIDE: u32 = 4096;

fn default_placeholder_side() -> u32 {
    512
}

fn default_max_prompt_chars() -> usize {
    80
}

impl Default for PlaceholderConfig {
    fn default() -> Self {
        Self {
            width: default_placeholder_side(),
            height: default_placeholder_side(),
            max_prompt_chars: default_max_prompt_chars(),
            font_path: None,
        }
    }
}

/// Wire protocol shape of a provider
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Protocol {
    /// One POST, image in the response
    Sync,
    /// Submit a job, poll its status, download the output URL
    Poll,
}

impl Protocol {
    pub fn as_str(&self) -> &'static str {
        match self {
            Protocol::Sync => "sync",
            Protocol::Poll => "poll",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum AuthMode {
    #[default]
    None,
    Bearer,
}

/// Body layout of a synchronous generation request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum RequestFormat {
    /// `{"inputs": prompt, "parameters": {...}}`
    #[default]
    Inference,
    /// `{"prompt": prompt, "negative_prompt": ..., ...}`
    Flat,
}

/// Body layout of a synchronous generation response
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ResponseFormat {
    /// Raw image bytes
    #[default]
    Binary,
    /// JSON with base64 encoded images
    JsonBase64,
}

impl ResponseFormat {
    pub fn accept_header(&self) -> &'static str {
        match self {
            ResponseFormat::Binary => "image/png",
            ResponseFormat::JsonBase64 => "application/json",
        }
    }
}

/// Default generation parameters of a provider
#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq)]
pub struct GenerationDefaults {
    #[serde(default)]
    pub num_inference_steps: Option<u32>,
    #[serde(default)]
    pub guidance_scale: Option<f32>,
    #[serde(default)]
    pub width: Option<u32>,
    #[serde(default)]
    pub height: Option<u32>,
    #[serde(default)]
    pub negative_prompt: Option<String>,
}

/// Polling parameters of job-based providers
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PollConfig {
    #[serde(default = "default_poll_interval")]
    pub interval_ms: u64,
    #[serde(default = "default_poll_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_status_timeout")]
    pub status_timeout_ms: u64,
}

fn default_poll_interval() -> u64 {
    1500
}

fn default_poll_attempts() -> u32 {
    40
}

fn default_status_timeout() -> u64 {
    10_000
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            interval_ms: default_poll_interval(),
            max_attempts: default_poll_attempts(),
            status_timeout_ms: default_status_timeout(),
        }
    }
}

impl PollConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }

    pub fn status_timeout(&self) -> Duration {
        Duration::from_millis(self.status_timeout_ms)
    }
}

/// Provider configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ProviderConfig {
    pub name: String,
    pub protocol: Protocol,
    pub base_urls: Vec<String>,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub auth: AuthMode,
    /// Environment variable holding the bearer token
    #[serde(default)]
    pub api_key_env: Option<String>,
    #[serde(default)]
    pub request_format: RequestFormat,
    #[serde(default)]
    pub response_format: ResponseFormat,
    /// Extra top-level fields sent with every sync request body, e.g.
    /// `response_format = "b64_json"` for OpenAI-style image routes.
    /// Never overrides a field the adapter already sets.
    #[serde(default)]
    pub extra_body: BTreeMap<String, serde_json::Value>,
    #[serde(default)]
    pub defaults: GenerationDefaults,
    #[serde(default = "default_timeout")]
    pub timeout_ms: u64,
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_ms: u64,
    #[serde(default)]
    pub poll: PollConfig,
    #[serde(default)]
    pub fast: bool,
    #[serde(default = "default_quality")]
    pub quality: u8,
    #[serde(default = "default_true")]
    pub enabled: bool,
}

fn default_timeout() -> u64 {
    120_000
}

fn default_connect_timeout() -> u64 {
    10_000
}

fn default_quality() -> u8 {
    5
}

fn default_true() -> bool {
    true
}

impl ProviderConfig {
    /// A provider with default parameters and no authentication
    pub fn new(name: impl Into<String>, protocol: Protocol, base_url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            protocol,
            base_urls: vec![base_url.into()],
            model: None,
            auth: AuthMode::None,
            api_key_env: None,
            request_format: RequestFormat::default(),
            response_format: ResponseFormat::default(),
            extra_body: BTreeMap::new(),
            defaults: GenerationDefaults::default(),
            timeout_ms: default_timeout(),
            connect_timeout_ms: default_connect_timeout(),
            poll: PollConfig::default(),
            fast: false,
            quality: default_quality(),
            enabled: true,
        }
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    /// Look up the credential for this provider, if it needs one
    pub fn resolve_api_key(&self) -> Option<Secret> {
        match self.auth {
            AuthMode::None => None,
            AuthMode::Bearer => self.api_key_env.as_deref().and_then(Secret::from_env),
        }
    }
}

impl Settings {
    /// Load settings from configuration files and environment variables
    pub fn load() -> Result<Self> {
        let path = std::env::var("IMAGEGEN_CONFIG").unwrap_or_else(|_| "config/default.toml".to_string());
        Self::load_from_path(path)
    }

    /// Load settings from a specific configuration file path
    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let config = Config::builder()
            // Start with default values
            .set_default("server.host", "0.0.0.0")?
            .set_default("server.port", 8080)?
            .set_default("logging.level", "info")?
            .set_default("logging.format", "json")?
            // Load from configuration file
            .add_source(File::from(path.as_ref()).required(false))
            // Override with environment variables (prefixed with IMAGEGEN_)
            .add_source(
                Environment::with_prefix("IMAGEGEN")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let settings: Settings = config.try_deserialize()?;
        Ok(settings)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.server.port == 0 {
            return Err(invalid("Server port cannot be 0".to_string()));
        }
        if self.server.max_concurrent_generations == 0 {
            return Err(invalid(
                "server.max_concurrent_generations must be at least 1".to_string(),
            ));
        }
        if self.placeholder.width == 0 || self.placeholder.height == 0 {
            return Err(invalid("Placeholder dimensions must be non-zero".to_string()));
        }
        if self.placeholder.width > MAX_PLACEHOLDER_SIDE || self.placeholder.height > MAX_PLACEHOLDER_SIDE {
            return Err(invalid(format!(
                "Placeholder dimensions must not exceed {}x{}",
                MAX_PLACEHOLDER_SIDE, MAX_PLACEHOLDER_SIDE
            )));
        }

        let mut seen = HashSet::new();
        for provider in &self.providers {
            if provider.name.trim().is_empty() {
                return Err(invalid("Provider name cannot be empty".to_string()));
            }
            if !seen.insert(provider.name.as_str()) {
                return Err(invalid(format!("Duplicate provider name '{}'", provider.name)));
            }
            if provider.base_urls.is_empty() {
                return Err(invalid(format!(
                    "Provider '{}' must have at least one base URL",
                    provider.name
                )));
            }
            for url in &provider.base_urls {
                if !(url.starts_with("http://") || url.starts_with("https://")) {
                    return Err(invalid(format!(
                        "Provider '{}' has invalid URL '{}'. Must start with http:// or https://",
                        provider.name, url
                    )));
                }
            }
            if provider.auth == AuthMode::Bearer && provider.api_key_env.is_none() {
                return Err(invalid(format!(
                    "Provider '{}' uses bearer auth but names no api_key_env",
                    provider.name
                )));
            }
            if provider.protocol == Protocol::Poll {
                if provider.poll.max_attempts == 0 {
                    return Err(invalid(format!(
                        "Provider '{}' must allow at least one poll attempt",
                        provider.name
                    )));
                }
                if provider.poll.interval_ms == 0 {
                    return Err(invalid(format!(
                        "Provider '{}' poll interval cannot be 0",
                        provider.name
                    )));
                }
            }
        }

        Ok(())
    }
}

fn invalid(message: String) -> AppError {
    AppError::Config(config::ConfigError::Message(message))
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            logging: LoggingConfig::default(),
            orchestrator: OrchestratorConfig::default(),
            placeholder: PlaceholderConfig::default(),
            providers: vec![],
        }
    }
}
