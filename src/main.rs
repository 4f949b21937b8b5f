//! Perp Book Feed - Producer Process
//!
//! Streams the book side accounts of the configured perp markets, rebuilds
//! their L2 books and forwards normalized messages to the fan-out process.

use anyhow::Context;
use axum::{extract::State, http::StatusCode, routing::get, Json, Router};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tokio::task::JoinSet;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn, Level};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use perp_book_feed::{
    AppState, Bus, Config, FeedMetrics, FeedOrchestrator, MarketCatalog, MarketMeta, Publisher,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(fmt::layer().json())
        .with(EnvFilter::from_default_env().add_directive(Level::INFO.into()))
        .init();

    info!("Starting perp book feed");

    // Load configuration
    let config = Config::load()?;
    let catalog = MarketCatalog::load(&config.markets_file)
        .with_context(|| format!("loading market catalog {}", config.markets_file))?;
    let markets = catalog.select(&config.markets)?;
    let names: Vec<String> = markets.iter().map(|m| m.name.clone()).collect();
    info!(markets = ?names, ws_endpoint = %config.ws_endpoint(), "Configuration loaded");

    let metrics = FeedMetrics::new(prometheus::default_registry())?;
    let state = Arc::new(AppState::new(names));

    // Start health check server
    let health_state = state.clone();
    let health_port = config.health_port;
    tokio::spawn(async move {
        if let Err(e) = start_health_server(health_state, health_port).await {
            warn!(error = %e, "Health server error");
        }
    });

    // Publisher first, producers only start once it listens
    let bus = Bus::new(config.bus_capacity);
    let mut minion_ready = bus.minion_ready.subscribe();
    let publisher = Publisher::new(&config.ipc_socket_path).await;
    let publisher_task = tokio::spawn(publisher.run(bus.clone()));
    minion_ready.recv().await?;

    let mut producer_ready = bus.producer_ready.subscribe();
    let mut producers = JoinSet::new();
    for market in &markets {
        let orchestrator = FeedOrchestrator::connect(
            config.rpc_client_config(),
            market,
            bus.clone(),
            metrics.clone(),
        )?;
        producers.spawn(orchestrator.run());
    }

    let catalog: Arc<[MarketMeta]> = Arc::from(markets);
    let mut ready = 0usize;
    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    let result: anyhow::Result<()> = loop {
        tokio::select! {
            _ = &mut shutdown => {
                info!("Shutdown requested");
                break Ok(());
            }
            signal = producer_ready.recv(), if ready < catalog.len() => {
                if signal.is_err() {
                    continue;
                }
                ready += 1;
                state.set_producers_ready(ready);
                if ready == catalog.len() {
                    bus.markets.publish(catalog.clone());
                    info!(markets = catalog.len(), "All producers ready");
                }
            }
            finished = producers.join_next() => match finished {
                Some(Ok(Ok(()))) => warn!("Producer stopped"),
                Some(Ok(Err(e))) => {
                    error!(error = %e, "Producer failed");
                    break Err(e).context("producer failed");
                }
                Some(Err(e)) => {
                    error!(error = %e, "Producer task aborted");
                    break Err(e).context("producer task aborted");
                }
                None => break Ok(()),
            },
        }
    };

    bus.cleanup.publish(());
    while producers.join_next().await.is_some() {}
    if let Err(e) = publisher_task.await {
        warn!(error = %e, "Publisher task failed");
    }

    info!("Perp book feed stopped");
    result
}

/// Start HTTP server for health checks and metrics
async fn start_health_server(state: Arc<AppState>, port: u16) -> anyhow::Result<()> {
    use std::net::SocketAddr;

    let app = Router::new()
        .route("/health", get(health_check))
        .route("/metrics", get(metrics))
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    info!(addr = %addr, "Starting health check server");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

async fn health_check(State(state): State<Arc<AppState>>) -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": if state.is_ready() { "healthy" } else { "starting" },
        "component": "perp-book-feed",
        "markets": state.markets,
        "producers_ready": state.producers_ready.load(Ordering::Relaxed),
        "timestamp": chrono::Utc::now().to_rfc3339()
    }))
}

async fn metrics() -> Result<String, StatusCode> {
    use prometheus::{Encoder, TextEncoder};
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    encoder
        .encode(&metric_families, &mut buffer)
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;
    String::from_utf8(buffer).map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)
}
