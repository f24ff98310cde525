//! Main entry point for the image generation server

use imagegen_orchestrator::{api, config::Settings, gateway::Orchestrator, AppState};
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Credentials may live in .env
    dotenvy::dotenv().ok();

    let settings = Settings::load()?;
    settings.validate()?;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&settings.logging.level));
    let registry = tracing_subscriber::registry().with(filter);
    if settings.logging.format == "json" {
        registry.with(fmt::layer().json()).init();
    } else {
        registry.with(fmt::layer().pretty()).init();
    }

    info!("Starting image generation orchestrator");
    info!(
        "Loaded configuration: server={}:{}, providers={}",
        settings.server.host,
        settings.server.port,
        settings.providers.len()
    );

    let orchestrator = Orchestrator::from_settings(&settings)?;
    let addr = format!("{}:{}", settings.server.host, settings.server.port);
    let app_state = Arc::new(AppState::new(settings, orchestrator));

    let app = api::routes::create_router(app_state);

    info!("Server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
