//! OpenAPI documentation configuration.
//!
//! Provides Swagger UI for API exploration and testing.

use utoipa::openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme};
use utoipa::{Modify, OpenApi};

use crate::api::handlers::{
    auth_handler, invoice_handler, rates_handler, settings_handler, sync_handler, user_handler,
};
use crate::api::routes;
use crate::config::{GatewaySettings, SmtpSettings, WhatsAppSettings};
use crate::domain::{
    ExchangeRates, Invoice, InvoiceDraft, InvoiceItem, InvoiceStatus, ItemInput, Party,
    RateSource, ResetChannel, UserResponse, UserRole,
};
use crate::infra::BackendKind;
use crate::services::{
    AdminUserUpdate, Conversion, CreateInvoiceRequest, HealthState, ProfileUpdate, ReplayReport,
    StatusUpdate, SyncStatus, TierStatus, TokenResponse,
};
use crate::types::{MessageResponse, PaginatedInvoices, PaginationMeta};

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Invoice Desk",
        version = "0.1.0",
        description = "Invoices, users and exchange rates over MySQL, a hosted database, a REST API or local storage",
        license(name = "MIT", url = "https://opensource.org/licenses/MIT")
    ),
    servers(
        (url = "http://localhost:3000", description = "Local development server")
    ),
    paths(
        routes::health,
        auth_handler::register,
        auth_handler::login,
        auth_handler::request_reset,
        auth_handler::validate_reset,
        auth_handler::confirm_reset,
        user_handler::get_current_user,
        user_handler::update_current_user,
        user_handler::list_users,
        user_handler::create_user,
        user_handler::get_user,
        user_handler::update_user,
        user_handler::set_password,
        user_handler::delete_user,
        invoice_handler::list_invoices,
        invoice_handler::create_invoice,
        invoice_handler::search_invoices,
        invoice_handler::get_invoice,
        invoice_handler::update_invoice,
        invoice_handler::update_status,
        invoice_handler::delete_invoice,
        invoice_handler::get_draft,
        invoice_handler::save_draft,
        invoice_handler::clear_draft,
        rates_handler::get_rates,
        rates_handler::convert,
        sync_handler::sync_status,
        sync_handler::replay,
        settings_handler::get_gateways,
        settings_handler::save_gateways,
    ),
    components(
        schemas(
            UserRole,
            UserResponse,
            Invoice,
            InvoiceDraft,
            InvoiceItem,
            InvoiceStatus,
            ItemInput,
            Party,
            ExchangeRates,
            RateSource,
            ResetChannel,
            GatewaySettings,
            SmtpSettings,
            WhatsAppSettings,
            BackendKind,
            HealthState,
            TierStatus,
            SyncStatus,
            ReplayReport,
            TokenResponse,
            Conversion,
            CreateInvoiceRequest,
            StatusUpdate,
            ProfileUpdate,
            AdminUserUpdate,
            MessageResponse,
            PaginatedInvoices,
            PaginationMeta,
            routes::HealthResponse,
            routes::ServiceStatus,
            auth_handler::RegisterRequest,
            auth_handler::LoginRequest,
            auth_handler::ResetRequest,
            auth_handler::ResetTokenRequest,
            auth_handler::ResetConfirmRequest,
            auth_handler::TokenValidity,
            user_handler::CreateUserRequest,
            user_handler::SetPasswordRequest,
        )
    ),
    modifiers(&SecurityAddon),
    tags(
        (name = "Health", description = "Storage tier and cache health"),
        (name = "Authentication", description = "Registration, login and password reset"),
        (name = "Users", description = "Profile and admin user management"),
        (name = "Invoices", description = "Invoice management and draft autosave"),
        (name = "Rates", description = "Exchange rates and conversion"),
        (name = "Sync", description = "Offline change log"),
        (name = "Settings", description = "Notification gateways")
    )
)]
pub struct ApiDoc;

/// Security scheme modifier for JWT Bearer authentication
struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer_auth",
                SecurityScheme::Http(
                    HttpBuilder::new()
                        .scheme(HttpAuthScheme::Bearer)
                        .bearer_format("JWT")
                        .description(Some("JWT token obtained from /api/auth/login"))
                        .build(),
                ),
            );
        }
    }
}
