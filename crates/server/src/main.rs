mod routes;
mod state;

use std::sync::Arc;

use anyhow::{Context, Result};
use axum::Router;
use dayplan_core::SyncWindow;
use dayplan_domain::Provider;
use dayplan_infra::calendar::create_gateway;
use dayplan_infra::database::{SqliteCalendarEventStore, SqliteIntegrationStore};
use dayplan_infra::scheduling::SyncScheduler;
use dayplan_infra::storage::DbPool;
use dayplan_infra::{HttpClient, SuggestionClient, SyncService};
use tower_http::cors::{Any, CorsLayer};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use crate::state::AppState;

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = dayplan_infra::config::load().context("loading configuration")?;

    let pool = Arc::new(
        DbPool::new(&config.database.path, config.database.pool_size)
            .context("opening database")?,
    );
    let events = Arc::new(SqliteCalendarEventStore::new(pool.clone()));
    let integrations = Arc::new(SqliteIntegrationStore::new(pool));

    let http = HttpClient::builder()
        .user_agent(concat!("dayplan/", env!("CARGO_PKG_VERSION")))
        .build()
        .context("building HTTP client")?;

    let window = SyncWindow::new(config.sync.lookback_days, config.sync.lookahead_days);
    let mut service = SyncService::new(events, integrations, window);
    for provider in Provider::ALL {
        match create_gateway(provider, http.clone()) {
            Ok(gateway) => {
                info!(%provider, "calendar gateway registered");
                service.register_gateway(gateway);
            }
            Err(err) => {
                warn!(%provider, error = %err, "calendar gateway not configured");
            }
        }
    }
    let service = Arc::new(service);

    let suggestions = config
        .ai
        .api_key
        .clone()
        .map(|key| Arc::new(SuggestionClient::new(key, config.ai.model.clone(), http.clone())));
    if suggestions.is_none() {
        warn!("no suggestion API key configured; /suggestions is disabled");
    }

    let mut scheduler = if config.sync.enabled && !config.sync.users.is_empty() {
        let mut scheduler = SyncScheduler::new(
            config.sync.cron_expression.clone(),
            config.sync.users.clone(),
            service.clone(),
        )
        .context("creating sync scheduler")?;
        scheduler.start().await.context("starting sync scheduler")?;
        Some(scheduler)
    } else {
        info!("periodic sync disabled");
        None
    };

    let cors = CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any);

    let app = Router::new()
        .merge(routes::router())
        .with_state(AppState::new(service, suggestions))
        .layer(cors);

    let listener = tokio::net::TcpListener::bind(&config.server.bind_addr)
        .await
        .with_context(|| format!("binding {}", config.server.bind_addr))?;
    info!(addr = %config.server.bind_addr, "dayplan-server listening");

    axum::serve(listener, app).with_graceful_shutdown(shutdown_signal()).await?;

    if let Some(scheduler) = scheduler.as_mut() {
        if let Err(err) = scheduler.stop().await {
            warn!(error = %err, "sync scheduler did not stop cleanly");
        }
    }

    info!("shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        warn!(error = %err, "failed to listen for shutdown signal");
    }
}
