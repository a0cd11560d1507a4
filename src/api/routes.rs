//! Application route configuration.

use axum::{extract::State, middleware, response::Json, routing::get, Router};
use serde::{Deserialize, Serialize};
use tower_http::trace::TraceLayer;
use utoipa::{OpenApi, ToSchema};
use utoipa_swagger_ui::SwaggerUi;

use super::handlers::{
    auth_routes, invoice_routes, rates_routes, settings_routes, sync_routes, user_routes,
};
use super::middleware::{auth_middleware, rate_limit_auth_middleware, rate_limit_middleware};
use super::openapi::ApiDoc;
use super::AppState;
use crate::infra::BackendKind;
use crate::services::{HealthState, TierStatus};

/// Create the application router with all routes configured
pub fn create_router(state: AppState) -> Router {
    let protected = Router::new()
        .nest("/users", user_routes())
        .nest("/invoices", invoice_routes())
        .nest("/sync", sync_routes())
        .nest("/settings", settings_routes())
        .route_layer(middleware::from_fn_with_state(state.clone(), auth_middleware))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            rate_limit_middleware,
        ));

    let api = Router::new()
        .route("/health", get(health))
        .nest(
            "/auth",
            auth_routes().route_layer(middleware::from_fn_with_state(
                state.clone(),
                rate_limit_auth_middleware,
            )),
        )
        .nest("/rates", rates_routes())
        .merge(protected);

    Router::new()
        .route("/", get(root))
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .nest("/api", api)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn root() -> &'static str {
    "invoice-desk"
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct HealthResponse {
    /// `healthy` when the top configured tier serves requests, else `degraded`
    pub status: String,
    pub active_backend: BackendKind,
    pub tiers: Vec<TierStatus>,
    pub pending_wal: usize,
    pub redis: ServiceStatus,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ServiceStatus {
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Health of every storage tier and of Redis
///
/// Always 200: the local store keeps the service usable when remote
/// tiers are down.
#[utoipa::path(
    get,
    path = "/api/health",
    tag = "Health",
    responses((status = 200, description = "Service health", body = HealthResponse))
)]
pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    let sync = state.data.status().await;

    let redis = match &state.cache {
        None => ServiceStatus {
            status: "disabled".into(),
            error: None,
        },
        Some(cache) => match cache.ping().await {
            Ok(()) => ServiceStatus {
                status: "healthy".into(),
                error: None,
            },
            Err(e) => ServiceStatus {
                status: "unhealthy".into(),
                error: Some(e.to_string()),
            },
        },
    };

    let degraded_tier = sync
        .tiers
        .iter()
        .any(|t| matches!(t.state, HealthState::Degraded | HealthState::Down));
    let primary = sync.tiers.first().map(|t| t.kind).unwrap_or(BackendKind::Local);
    let healthy = sync.active == primary
        && sync.pending_wal == 0
        && !degraded_tier
        && redis.status != "unhealthy";

    Json(HealthResponse {
        status: if healthy { "healthy" } else { "degraded" }.into(),
        active_backend: sync.active,
        tiers: sync.tiers,
        pending_wal: sync.pending_wal,
        redis,
    })
}
