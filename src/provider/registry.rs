//! Ordered registry of configured provider adapters

use std::sync::Arc;
use tracing::{info, warn};

use crate::config::{Protocol, ProviderConfig};
use crate::error::{AppError, Result};
use crate::provider::poll_adapter::PollAdapter;
use crate::provider::sleeper::Sleeper;
use crate::provider::sync_adapter::SyncAdapter;
use crate::provider::traits::{ProviderAdapter, ProviderStatus};

/// Providers in priority order. Registration order is the fallback order.
#[derive(Default)]
pub struct ProviderRegistry {
    providers: Vec<Arc<dyn ProviderAdapter>>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build adapters for every configured provider
    pub fn from_config(configs: &[ProviderConfig], sleeper: Arc<dyn Sleeper>) -> Result<Self> {
        let mut registry = Self::new();
        for config in configs {
            let adapter = build_adapter(config.clone(), sleeper.clone())?;
            if !adapter.has_credentials() {
                warn!(
                    provider = %config.name,
                    env = config.api_key_env.as_deref().unwrap_or(""),
                    "Provider credentials missing, attempts will fail until they are set"
                );
            }
            registry.register(adapter)?;
        }
        info!(count = registry.len(), "Registered providers");
        Ok(registry)
    }

    /// Append a provider at the lowest priority
    pub fn register(&mut self, adapter: Arc<dyn ProviderAdapter>) -> Result<()> {
        if self.get(adapter.name()).is_some() {
            return Err(AppError::Internal(format!(
                "Provider '{}' registered twice",
                adapter.name()
            )));
        }
        self.providers.push(adapter);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn ProviderAdapter>> {
        self.providers.iter().find(|p| p.name() == name).cloned()
    }

    pub fn all(&self) -> &[Arc<dyn ProviderAdapter>] {
        &self.providers
    }

    pub fn len(&self) -> usize {
        self.providers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }

    pub fn statuses(&self) -> Vec<ProviderStatus> {
        self.providers.iter().map(|p| p.status()).collect()
    }
}

/// Create the adapter matching a provider's protocol
pub fn build_adapter(config: ProviderConfig, sleeper: Arc<dyn Sleeper>) -> Result<Arc<dyn ProviderAdapter>> {
    let adapter: Arc<dyn ProviderAdapter> = match config.protocol {
        Protocol::Sync => Arc::new(SyncAdapter::new(config)?),
        Protocol::Poll => Arc::new(PollAdapter::new(config, sleeper)?),
    };
    Ok(adapter)
}
