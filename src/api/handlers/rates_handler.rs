//! Exchange rate handlers (public).

use axum::{
    extract::{Query, State},
    response::Json,
    routing::get,
    Router,
};
use rust_decimal::Decimal;
use serde::Deserialize;
use utoipa::IntoParams;

use crate::api::AppState;
use crate::domain::ExchangeRates;
use crate::errors::AppResult;
use crate::services::Conversion;

#[derive(Debug, Deserialize, IntoParams)]
pub struct ConvertQuery {
    #[param(value_type = String, example = "100")]
    pub amount: Decimal,
    #[param(example = "EUR")]
    pub from: String,
    #[param(example = "USD")]
    pub to: String,
    /// Reject unknown currencies instead of returning the amount as-is
    #[serde(default)]
    pub strict: bool,
}

pub fn rates_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(get_rates))
        .route("/convert", get(convert))
}

/// USD-based exchange rates, refreshed every 30 minutes
#[utoipa::path(
    get,
    path = "/api/rates",
    tag = "Rates",
    responses((status = 200, description = "Current rates", body = ExchangeRates))
)]
pub async fn get_rates(State(state): State<AppState>) -> Json<ExchangeRates> {
    Json(state.currency_service.rates().await)
}

#[utoipa::path(
    get,
    path = "/api/rates/convert",
    tag = "Rates",
    params(ConvertQuery),
    responses(
        (status = 200, description = "Converted amount", body = Conversion),
        (status = 400, description = "Unknown currency in strict mode")
    )
)]
pub async fn convert(
    State(state): State<AppState>,
    Query(query): Query<ConvertQuery>,
) -> AppResult<Json<Conversion>> {
    let conversion = state
        .currency_service
        .convert(query.amount, &query.from, &query.to, query.strict)
        .await?;
    Ok(Json(conversion))
}
