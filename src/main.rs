// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Crawl-Tracker API Server
//!
//! Hosts one crawl session per user and accepts location fixes, photos and
//! finalize requests from the mobile client.

use crawl_tracker::{
    config::Config,
    services::{
        BoundingBoxCityResolver, CrawlHistory, MemoryCrawlStore, MemoryPhotoStore,
        SessionRegistry, StaticBarCatalog, SystemClock, UploadGateway,
    },
    AppState,
};
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const PHOTO_BASE_URL: &str = "memory://photos";

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize structured JSON logging
    init_logging();

    // Load configuration from environment
    let config = Config::from_env().expect("Failed to load configuration");
    tracing::info!(port = config.port, "Starting Crawl-Tracker API");

    // Load bar catalog
    let catalog = match &config.bar_catalog_path {
        Some(path) => {
            tracing::info!(path = %path, "Loading bar catalog");
            StaticBarCatalog::load_from_file(path).expect("Failed to load bar catalog")
        }
        None => {
            tracing::info!("Using built-in bar catalog");
            StaticBarCatalog::builtin()
        }
    }
    .with_threshold(config.session.proximity_threshold_miles);
    tracing::info!(
        count = catalog.bars().len(),
        threshold_miles = catalog.threshold_miles(),
        "Bar catalog loaded"
    );

    let cities = Arc::new(BoundingBoxCityResolver::builtin());
    let clock = Arc::new(SystemClock);

    let sessions = SessionRegistry::new(
        config.session.clone(),
        Arc::new(catalog),
        cities.clone(),
        clock,
    );

    // Crawl and photo storage stay in process
    let gateway = UploadGateway::new(
        Arc::new(MemoryCrawlStore::new()),
        Arc::new(MemoryPhotoStore::new(PHOTO_BASE_URL)),
        cities,
    );
    tracing::info!("Upload gateway initialized");

    // Build shared state
    let state = Arc::new(AppState {
        config: config.clone(),
        sessions,
        gateway,
        history: CrawlHistory::new(),
    });

    // Build router
    let app = crawl_tracker::routes::create_router(state.clone());

    // Start server
    let addr = format!("0.0.0.0:{}", config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!(address = %addr, "Server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    state.sessions.shutdown().await;
    tracing::info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
    }
}

/// Initialize structured JSON logging.
fn init_logging() {
    let format = tracing_subscriber::fmt::layer()
        .json()
        .with_target(false)
        .with_current_span(true)
        .flatten_event(true);

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("crawl_tracker=debug".parse().unwrap())
                .add_directive("info".parse().unwrap()),
        )
        .with(format)
        .init();
}
