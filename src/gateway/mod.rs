//! Gateway module - provider sequencing and fallback orchestration

pub mod orchestrator;
pub mod strategy;

pub use orchestrator::{
    GenerateOptions, GeneratedImage, OrchestrationFailure, OrchestrationResult, Orchestrator,
};
pub use strategy::{resolve_sequence, ProviderSelection};
