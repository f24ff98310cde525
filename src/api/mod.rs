//! HTTP surface over the orchestrator

pub mod handlers;
pub mod routes;
