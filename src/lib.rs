//! Image generation orchestrator
//!
//! Turns a text prompt into an image by trying hosted text-to-image
//! providers in order, classifying every failure, and optionally falling
//! back to a locally drawn placeholder.

pub mod api;
pub mod config;
pub mod error;
pub mod gateway;
pub mod imaging;
pub mod provider;

pub use error::{AppError, Result};

use std::sync::Arc;
use tokio::sync::Semaphore;

use gateway::Orchestrator;

/// Application state shared across all handlers
pub struct AppState {
    pub settings: Arc<config::Settings>,
    pub orchestrator: Arc<Orchestrator>,
    /// Admits `server.max_concurrent_generations` generations at once
    pub generation_slots: Arc<Semaphore>,
}

impl AppState {
    pub fn new(settings: config::Settings, orchestrator: Orchestrator) -> Self {
        let slots = settings.server.max_concurrent_generations.max(1);
        Self {
            settings: Arc::new(settings),
            orchestrator: Arc::new(orchestrator),
            generation_slots: Arc::new(Semaphore::new(slots)),
        }
    }
}
