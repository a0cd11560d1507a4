//! Storage tier status and offline change replay.

use axum::{
    extract::State,
    response::Json,
    routing::{get, post},
    Extension, Router,
};

use crate::api::middleware::{require_admin, CurrentUser};
use crate::api::AppState;
use crate::errors::AppResult;
use crate::services::{ReplayReport, SyncStatus};

pub fn sync_routes() -> Router<AppState> {
    Router::new()
        .route("/status", get(sync_status))
        .route("/replay", post(replay))
}

/// Active tier, per-tier health and pending offline changes
#[utoipa::path(
    get,
    path = "/api/sync/status",
    tag = "Sync",
    security(("bearer_auth" = [])),
    responses((status = 200, description = "Sync status", body = SyncStatus))
)]
pub async fn sync_status(State(state): State<AppState>) -> Json<SyncStatus> {
    Json(state.data.status().await)
}

/// Replay the write-ahead log now (admin only)
#[utoipa::path(
    post,
    path = "/api/sync/replay",
    tag = "Sync",
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "Replay outcome", body = ReplayReport),
        (status = 403, description = "Admin access required"),
        (status = 503, description = "No remote tier reachable")
    )
)]
pub async fn replay(
    State(state): State<AppState>,
    Extension(current_user): Extension<CurrentUser>,
) -> AppResult<Json<ReplayReport>> {
    require_admin(&current_user)?;
    let report = state.data.replay().await?;
    tracing::info!(actor_id = %current_user.id, applied = report.applied, "Manual replay finished");
    Ok(Json(report))
}
