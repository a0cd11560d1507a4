//! Invoice handlers, including the per-user draft autosave.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::Json,
    routing::{get, patch},
    Extension, Router,
};
use serde::Deserialize;
use utoipa::IntoParams;
use uuid::Uuid;

use crate::api::extractors::ValidatedJson;
use crate::api::middleware::CurrentUser;
use crate::api::AppState;
use crate::config::{DEFAULT_PAGE_NUMBER, DEFAULT_PAGE_SIZE};
use crate::domain::{Invoice, InvoiceDraft, InvoiceFilter, InvoiceStatus};
use crate::errors::AppResult;
use crate::services::{CreateInvoiceRequest, StatusUpdate};
use crate::types::{Paginated, PaginatedInvoices, PaginationParams};

#[derive(Debug, Deserialize, IntoParams)]
pub struct InvoiceListQuery {
    pub status: Option<InvoiceStatus>,
    /// Matches number, client name or email, company name
    pub q: Option<String>,
    /// Admins only; ignored for members
    pub owner_id: Option<Uuid>,
    pub page: Option<u64>,
    pub per_page: Option<u64>,
}

#[derive(Debug, Deserialize, IntoParams)]
pub struct SearchQuery {
    #[serde(default)]
    pub q: String,
}

pub fn invoice_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(list_invoices).post(create_invoice))
        .route("/search", get(search_invoices))
        .route("/draft", get(get_draft).put(save_draft).delete(clear_draft))
        .route(
            "/:id",
            get(get_invoice).put(update_invoice).delete(delete_invoice),
        )
        .route("/:id/status", patch(update_status))
}

/// List invoices, newest first
#[utoipa::path(
    get,
    path = "/api/invoices",
    tag = "Invoices",
    security(("bearer_auth" = [])),
    params(InvoiceListQuery),
    responses((status = 200, description = "One page of invoices", body = PaginatedInvoices))
)]
pub async fn list_invoices(
    State(state): State<AppState>,
    Extension(current_user): Extension<CurrentUser>,
    Query(query): Query<InvoiceListQuery>,
) -> AppResult<Json<Paginated<Invoice>>> {
    let filter = InvoiceFilter {
        owner_id: query.owner_id,
        status: query.status,
        query: query.q,
    };
    let page = PaginationParams::new(
        query.page.unwrap_or(DEFAULT_PAGE_NUMBER),
        query.per_page.unwrap_or(DEFAULT_PAGE_SIZE),
    );

    let invoices = state
        .invoice_service
        .list(current_user.actor(), filter, page)
        .await?;
    Ok(Json(invoices))
}

/// Create an invoice; totals are computed server side
#[utoipa::path(
    post,
    path = "/api/invoices",
    tag = "Invoices",
    security(("bearer_auth" = [])),
    request_body = CreateInvoiceRequest,
    responses(
        (status = 201, description = "Invoice created", body = Invoice),
        (status = 400, description = "Validation error"),
        (status = 409, description = "Invoice id already exists")
    )
)]
pub async fn create_invoice(
    State(state): State<AppState>,
    Extension(current_user): Extension<CurrentUser>,
    ValidatedJson(payload): ValidatedJson<CreateInvoiceRequest>,
) -> AppResult<(StatusCode, Json<Invoice>)> {
    let invoice = state
        .invoice_service
        .create(current_user.actor(), payload)
        .await?;
    Ok((StatusCode::CREATED, Json(invoice)))
}

/// Full-text search over the caller's invoices
#[utoipa::path(
    get,
    path = "/api/invoices/search",
    tag = "Invoices",
    security(("bearer_auth" = [])),
    params(SearchQuery),
    responses((status = 200, description = "Matching invoices", body = Vec<Invoice>))
)]
pub async fn search_invoices(
    State(state): State<AppState>,
    Extension(current_user): Extension<CurrentUser>,
    Query(query): Query<SearchQuery>,
) -> AppResult<Json<Vec<Invoice>>> {
    let invoices = state
        .invoice_service
        .search(current_user.actor(), &query.q)
        .await?;
    Ok(Json(invoices))
}

#[utoipa::path(
    get,
    path = "/api/invoices/{id}",
    tag = "Invoices",
    security(("bearer_auth" = [])),
    params(("id" = Uuid, Path, description = "Invoice id")),
    responses(
        (status = 200, description = "Invoice", body = Invoice),
        (status = 404, description = "Invoice not found")
    )
)]
pub async fn get_invoice(
    State(state): State<AppState>,
    Extension(current_user): Extension<CurrentUser>,
    Path(id): Path<Uuid>,
) -> AppResult<Json<Invoice>> {
    let invoice = state.invoice_service.get(current_user.actor(), id).await?;
    Ok(Json(invoice))
}

/// Replace the editable content of an invoice
#[utoipa::path(
    put,
    path = "/api/invoices/{id}",
    tag = "Invoices",
    security(("bearer_auth" = [])),
    params(("id" = Uuid, Path, description = "Invoice id")),
    request_body = InvoiceDraft,
    responses(
        (status = 200, description = "Invoice updated", body = Invoice),
        (status = 400, description = "Validation error"),
        (status = 404, description = "Invoice not found")
    )
)]
pub async fn update_invoice(
    State(state): State<AppState>,
    Extension(current_user): Extension<CurrentUser>,
    Path(id): Path<Uuid>,
    ValidatedJson(payload): ValidatedJson<InvoiceDraft>,
) -> AppResult<Json<Invoice>> {
    let invoice = state
        .invoice_service
        .update(current_user.actor(), id, payload)
        .await?;
    Ok(Json(invoice))
}

#[utoipa::path(
    patch,
    path = "/api/invoices/{id}/status",
    tag = "Invoices",
    security(("bearer_auth" = [])),
    params(("id" = Uuid, Path, description = "Invoice id")),
    request_body = StatusUpdate,
    responses(
        (status = 200, description = "Status changed", body = Invoice),
        (status = 400, description = "Transition not allowed"),
        (status = 404, description = "Invoice not found")
    )
)]
pub async fn update_status(
    State(state): State<AppState>,
    Extension(current_user): Extension<CurrentUser>,
    Path(id): Path<Uuid>,
    Json(payload): Json<StatusUpdate>,
) -> AppResult<Json<Invoice>> {
    let invoice = state
        .invoice_service
        .update_status(current_user.actor(), id, payload.status)
        .await?;
    Ok(Json(invoice))
}

#[utoipa::path(
    delete,
    path = "/api/invoices/{id}",
    tag = "Invoices",
    security(("bearer_auth" = [])),
    params(("id" = Uuid, Path, description = "Invoice id")),
    responses(
        (status = 204, description = "Invoice deleted"),
        (status = 404, description = "Invoice not found")
    )
)]
pub async fn delete_invoice(
    State(state): State<AppState>,
    Extension(current_user): Extension<CurrentUser>,
    Path(id): Path<Uuid>,
) -> AppResult<StatusCode> {
    state
        .invoice_service
        .delete(current_user.actor(), id)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Autosaved editor state; `null` when nothing is saved
#[utoipa::path(
    get,
    path = "/api/invoices/draft",
    tag = "Invoices",
    security(("bearer_auth" = [])),
    responses((status = 200, description = "Saved draft", body = Option<InvoiceDraft>))
)]
pub async fn get_draft(
    State(state): State<AppState>,
    Extension(current_user): Extension<CurrentUser>,
) -> AppResult<Json<Option<InvoiceDraft>>> {
    let draft = state.invoice_service.get_draft(current_user.actor()).await?;
    Ok(Json(draft))
}

#[utoipa::path(
    put,
    path = "/api/invoices/draft",
    tag = "Invoices",
    security(("bearer_auth" = [])),
    request_body = InvoiceDraft,
    responses((status = 204, description = "Draft saved"))
)]
pub async fn save_draft(
    State(state): State<AppState>,
    Extension(current_user): Extension<CurrentUser>,
    Json(payload): Json<InvoiceDraft>,
) -> AppResult<StatusCode> {
    state
        .invoice_service
        .save_draft(current_user.actor(), payload)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

#[utoipa::path(
    delete,
    path = "/api/invoices/draft",
    tag = "Invoices",
    security(("bearer_auth" = [])),
    responses((status = 204, description = "Draft cleared"))
)]
pub async fn clear_draft(
    State(state): State<AppState>,
    Extension(current_user): Extension<CurrentUser>,
) -> AppResult<StatusCode> {
    state
        .invoice_service
        .clear_draft(current_user.actor())
        .await?;
    Ok(StatusCode::NO_CONTENT)
}
