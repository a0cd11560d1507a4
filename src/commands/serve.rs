//! Serve command - starts the HTTP server.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use crate::api::{create_router, AppState};
use crate::cli::args::ServeArgs;
use crate::commands::build_data_service;
use crate::config::Config;
use crate::errors::{AppError, AppResult};
use crate::infra::Cache;

pub async fn execute(args: ServeArgs, config: Config) -> AppResult<()> {
    tracing::info!("Starting server...");

    let data = build_data_service(&config).await?;
    let monitor = data
        .clone()
        .spawn_health_monitor(Duration::from_secs(config.health_probe_interval_seconds.max(1)));

    // Redis is optional: without it rate limiting is off and rates are
    // cached per process.
    let cache = match config.redis_url.as_deref() {
        Some(url) => match Cache::connect(url).await {
            Ok(cache) => Some(Arc::new(cache)),
            Err(e) => {
                tracing::warn!(error = %e, "Redis unavailable, continuing without it");
                None
            }
        },
        None => None,
    };

    let app_state = AppState::from_config(data, cache, &config)?;
    let app = create_router(app_state);

    let addr = format!("{}:{}", args.host, args.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(|e| AppError::internal(format!("Failed to bind to {}: {}", addr, e)))?;

    tracing::info!("Server running on http://{}", addr);

    let served = axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await
    .map_err(|e| AppError::internal(format!("Server error: {}", e)));

    monitor.abort();
    served
}
