//! Configuration module - settings loading and credential handling

pub mod secret;
pub mod settings;

pub use secret::Secret;
pub use settings::*;
