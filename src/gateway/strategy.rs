//! Provider selection strategies

use std::sync::Arc;
use tracing::debug;

use crate::error::GenerationError;
use crate::provider::{ProviderAdapter, ProviderRegistry};

/// How the provider sequence for a request is chosen
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum ProviderSelection {
    /// Configured priority order
    #[default]
    Priority,
    /// Exactly one named provider
    Single(String),
    /// Providers flagged `fast`, in priority order
    Fastest,
    /// Highest `quality` first
    HighestQuality,
}

impl ProviderSelection {
    /// Parse a strategy name as used on the HTTP surface
    pub fn from_strategy(name: &str) -> Option<Self> {
        match name.to_lowercase().as_str() {
            "priority" | "default" => Some(Self::Priority),
            "fastest" | "fast" => Some(Self::Fastest),
            "quality" | "highest_quality" | "best" => Some(Self::HighestQuality),
            _ => None,
        }
    }
}

/// Resolve the ordered providers to try for a request
pub fn resolve_sequence(
    registry: &ProviderRegistry,
    selection: &ProviderSelection,
) -> Result<Vec<Arc<dyn ProviderAdapter>>, GenerationError> {
    let enabled: Vec<Arc<dyn ProviderAdapter>> = registry
        .all()
        .iter()
        .filter(|p| p.is_enabled())
        .cloned()
        .collect();

    let sequence = match selection {
        ProviderSelection::Single(name) => {
            let provider = registry
                .get(name)
                .ok_or_else(|| GenerationError::UnknownProvider(name.clone()))?;
            if !provider.is_enabled() {
                return Err(GenerationError::UnknownProvider(format!("{} (disabled)", name)));
            }
            vec![provider]
        }
        ProviderSelection::Priority => enabled,
        ProviderSelection::Fastest => {
            let fast: Vec<_> = enabled.iter().filter(|p| p.config().fast).cloned().collect();
            if fast.is_empty() {
                enabled
            } else {
                fast
            }
        }
        ProviderSelection::HighestQuality => {
            let mut ranked = enabled;
            // Stable, so equal quality keeps priority order
            ranked.sort_by(|a, b| b.config().quality.cmp(&a.config().quality));
            ranked
        }
    };

    if sequence.is_empty() {
        return Err(GenerationError::NoProvidersConfigured);
    }

    debug!(
        selection = ?selection,
        providers = ?sequence.iter().map(|p| p.name()).collect::<Vec<_>>(),
        "Resolved provider sequence"
    );

    Ok(sequence)
}
