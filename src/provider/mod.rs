//! Provider module - adapter trait, HTTP adapters, outcome classification and registry

pub mod classify;
pub mod http_client;
pub mod poll_adapter;
pub mod registry;
pub mod sleeper;
pub mod sync_adapter;
pub mod traits;

pub use poll_adapter::{JobHandle, PollAdapter};
pub use registry::ProviderRegistry;
pub use sleeper::{Sleeper, TokioSleeper};
pub use sync_adapter::SyncAdapter;
pub use traits::{
    GenerationOutcome, GenerationParams, GenerationRequest, ModelOverrides, ProviderAdapter,
    ProviderStatus, TransientKind,
};
