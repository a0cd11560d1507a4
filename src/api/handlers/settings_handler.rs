//! Notification gateway settings (admin only).
//!
//! Secrets are masked on read. Sending the mask back on write keeps the
//! stored secret.

use axum::{extract::State, response::Json, routing::get, Extension, Router};

use crate::api::middleware::{require_admin, CurrentUser};
use crate::api::AppState;
use crate::config::GatewaySettings;
use crate::errors::AppResult;

const SECRET_MASK: &str = "********";

pub fn settings_routes() -> Router<AppState> {
    Router::new().route("/gateways", get(get_gateways).put(save_gateways))
}

fn redact(mut settings: GatewaySettings) -> GatewaySettings {
    if let Some(smtp) = settings.smtp.as_mut() {
        if smtp.password.as_deref().is_some_and(|p| !p.is_empty()) {
            smtp.password = Some(SECRET_MASK.to_string());
        }
    }
    if let Some(whatsapp) = settings.whatsapp.as_mut() {
        if !whatsapp.api_key.is_empty() {
            whatsapp.api_key = SECRET_MASK.to_string();
        }
    }
    settings
}

/// Put back secrets the client only saw masked.
fn merge_secrets(mut incoming: GatewaySettings, current: &GatewaySettings) -> GatewaySettings {
    if let (Some(smtp), Some(old)) = (incoming.smtp.as_mut(), current.smtp.as_ref()) {
        if smtp.password.as_deref() == Some(SECRET_MASK) {
            smtp.password = old.password.clone();
        }
    }
    if let (Some(whatsapp), Some(old)) = (incoming.whatsapp.as_mut(), current.whatsapp.as_ref()) {
        if whatsapp.api_key == SECRET_MASK {
            whatsapp.api_key = old.api_key.clone();
        }
    }
    incoming
}

async fn current(state: &AppState) -> GatewaySettings {
    state.data.gateway_settings().await.unwrap_or_default()
}

#[utoipa::path(
    get,
    path = "/api/settings/gateways",
    tag = "Settings",
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "Gateway settings with secrets masked", body = GatewaySettings),
        (status = 403, description = "Admin access required")
    )
)]
pub async fn get_gateways(
    State(state): State<AppState>,
    Extension(current_user): Extension<CurrentUser>,
) -> AppResult<Json<GatewaySettings>> {
    require_admin(&current_user)?;
    Ok(Json(redact(current(&state).await)))
}

#[utoipa::path(
    put,
    path = "/api/settings/gateways",
    tag = "Settings",
    security(("bearer_auth" = [])),
    request_body = GatewaySettings,
    responses(
        (status = 200, description = "Saved settings with secrets masked", body = GatewaySettings),
        (status = 403, description = "Admin access required")
    )
)]
pub async fn save_gateways(
    State(state): State<AppState>,
    Extension(current_user): Extension<CurrentUser>,
    Json(payload): Json<GatewaySettings>,
) -> AppResult<Json<GatewaySettings>> {
    require_admin(&current_user)?;
    let settings = merge_secrets(payload, &current(&state).await);
    state.data.save_gateway_settings(settings.clone()).await?;
    tracing::info!(actor_id = %current_user.id, "Gateway settings updated");
    Ok(Json(redact(settings)))
}
