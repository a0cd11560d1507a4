//! HTTP API tests against the full router.
//!
//! Storage is a local-only in-memory data service; exchange rates and
//! notification gateways are replaced with in-process fakes.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use axum::{
    body::Body,
    http::{header, Method, Request, StatusCode},
    Router,
};
use http_body_util::BodyExt;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde_json::{json, Value};
use tower::ServiceExt;

use invoice_desk::api::{create_router, AppState};
use invoice_desk::config::{Config, GatewaySettings};
use invoice_desk::errors::AppResult;
use invoice_desk::infra::notifier::OutgoingMessage;
use invoice_desk::infra::{LocalStore, Notifier};
use invoice_desk::services::{DataService, RateFetcher, Services};

const JWT_SECRET: &str = "test-secret-key-for-testing-only-32chars";
const ADMIN_EMAIL: &str = "admin@example.com";
const ADMIN_PASSWORD: &str = "AdminPass123";

// =============================================================================
// Fakes
// =============================================================================

struct FixedRates;

#[async_trait]
impl RateFetcher for FixedRates {
    async fn fetch(&self) -> AppResult<BTreeMap<String, Decimal>> {
        Ok(BTreeMap::from([
            ("USD".to_string(), dec!(1)),
            ("EUR".to_string(), dec!(0.5)),
        ]))
    }
}

/// Keeps every message instead of sending it.
#[derive(Default)]
struct Outbox {
    sent: Mutex<Vec<OutgoingMessage>>,
}

impl Outbox {
    fn last_token(&self) -> Option<String> {
        let sent = self.sent.lock().unwrap();
        sent.last().and_then(|message| {
            message
                .body
                .lines()
                .map(str::trim)
                .find(|line| line.len() == 64 && line.chars().all(|c| c.is_ascii_hexdigit()))
                .map(str::to_string)
        })
    }
}

#[async_trait]
impl Notifier for Outbox {
    async fn deliver(&self, _gateways: &GatewaySettings, message: &OutgoingMessage) -> AppResult<()> {
        self.sent.lock().unwrap().push(message.clone());
        Ok(())
    }
}

// =============================================================================
// Test Helpers
// =============================================================================

struct TestApp {
    router: Router,
    outbox: Arc<Outbox>,
}

async fn app() -> TestApp {
    let local = Arc::new(LocalStore::in_memory());
    local
        .seed_admin(ADMIN_EMAIL, ADMIN_PASSWORD, "Admin")
        .await
        .unwrap();
    let data = Arc::new(DataService::local_only(local));
    data.initialize().await;

    let outbox = Arc::new(Outbox::default());
    let config = Config::for_tests(JWT_SECRET);
    let services = Services::with_adapters(
        data,
        &config,
        None,
        Arc::new(FixedRates),
        outbox.clone(),
        outbox.clone(),
    );

    TestApp {
        router: create_router(AppState::from_services(services, None)),
        outbox,
    }
}

async fn send(
    router: &Router,
    method: Method,
    uri: &str,
    token: Option<&str>,
    body: Option<Value>,
) -> (StatusCode, Value) {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
    }
    let request = match body {
        Some(body) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };

    let response = router.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or(Value::Null)
    };
    (status, value)
}

async fn login(router: &Router, email: &str, password: &str) -> String {
    let (status, body) = send(
        router,
        Method::POST,
        "/api/auth/login",
        None,
        Some(json!({ "email": email, "password": password })),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "login failed: {}", body);
    body["access_token"].as_str().unwrap().to_string()
}

async fn register(router: &Router, email: &str) -> String {
    let (status, _) = send(
        router,
        Method::POST,
        "/api/auth/register",
        None,
        Some(json!({ "email": email, "password": "Password123", "name": "Member" })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    login(router, email, "Password123").await
}

fn invoice_body(number: &str) -> Value {
    json!({
        "number": number,
        "company": { "name": "Acme" },
        "client": { "name": "Globex", "email": "billing@globex.test" },
        "items": [
            { "description": "Widget", "quantity": "2", "unit_price": "10" },
            { "description": "Gadget", "quantity": "1", "unit_price": "5" }
        ],
        "tax_rate": "10",
        "discount_rate": "0",
        "currency": "usd"
    })
}

fn decimal(value: &Value) -> Decimal {
    match value {
        Value::String(s) => s.parse().unwrap(),
        other => other.to_string().parse().unwrap(),
    }
}

// =============================================================================
// Health
// =============================================================================

#[tokio::test]
async fn test_health_reports_local_backend() {
    let app = app().await;
    let (status, body) = send(&app.router, Method::GET, "/api/health", None, None).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["active_backend"], "local");
    assert_eq!(body["pending_wal"], 0);
    assert_eq!(body["redis"]["status"], "disabled");
}

// =============================================================================
// Authentication
// =============================================================================

#[tokio::test]
async fn test_register_login_and_profile() {
    let app = app().await;
    let token = register(&app.router, "Member@Example.com").await;

    let (status, body) = send(&app.router, Method::GET, "/api/users/me", Some(&token), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["email"], "member@example.com");
    assert_eq!(body["role"], "member");
    assert!(body.get("password_hash").is_none());
}

#[tokio::test]
async fn test_register_duplicate_email_conflicts() {
    let app = app().await;
    register(&app.router, "dup@example.com").await;

    let (status, _) = send(
        &app.router,
        Method::POST,
        "/api/auth/register",
        None,
        Some(json!({ "email": "dup@example.com", "password": "Password123", "name": "Again" })),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
}

#[tokio::test]
async fn test_register_rejects_invalid_email() {
    let app = app().await;
    let (status, _) = send(
        &app.router,
        Method::POST,
        "/api/auth/register",
        None,
        Some(json!({ "email": "not-an-email", "password": "Password123", "name": "X" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_wrong_password_is_unauthorized() {
    let app = app().await;
    let (status, _) = send(
        &app.router,
        Method::POST,
        "/api/auth/login",
        None,
        Some(json!({ "email": ADMIN_EMAIL, "password": "wrong-password" })),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_protected_routes_require_token() {
    let app = app().await;
    let (status, _) = send(&app.router, Method::GET, "/api/invoices", None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = send(&app.router, Method::GET, "/api/invoices", Some("garbage"), None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

// =============================================================================
// Users
// =============================================================================

#[tokio::test]
async fn test_user_admin_routes_are_admin_only() {
    let app = app().await;
    let member = register(&app.router, "member@example.com").await;
    let (status, _) = send(&app.router, Method::GET, "/api/users", Some(&member), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let admin = login(&app.router, ADMIN_EMAIL, ADMIN_PASSWORD).await;
    let (status, body) = send(&app.router, Method::GET, "/api/users", Some(&admin), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body.as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn test_tokens_of_disabled_or_demoted_accounts_lose_access() {
    let app = app().await;
    let admin = login(&app.router, ADMIN_EMAIL, ADMIN_PASSWORD).await;

    let member = register(&app.router, "member@example.com").await;
    let (_, me) = send(&app.router, Method::GET, "/api/users/me", Some(&member), None).await;
    let member_id = me["id"].as_str().unwrap().to_string();

    let (status, _) = send(
        &app.router,
        Method::POST,
        "/api/users",
        Some(&admin),
        Some(json!({
            "email": "deputy@example.com",
            "password": "Password123",
            "name": "Deputy",
            "role": "admin"
        })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    let deputy = login(&app.router, "deputy@example.com", "Password123").await;
    let (_, me) = send(&app.router, Method::GET, "/api/users/me", Some(&deputy), None).await;
    let deputy_id = me["id"].as_str().unwrap().to_string();

    let (status, _) = send(
        &app.router,
        Method::PUT,
        &format!("/api/users/{}", member_id),
        Some(&admin),
        Some(json!({ "is_active": false })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let (status, _) = send(&app.router, Method::GET, "/api/users/me", Some(&member), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = send(
        &app.router,
        Method::PUT,
        &format!("/api/users/{}", deputy_id),
        Some(&admin),
        Some(json!({ "role": "member" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    // the old token still says admin, the account no longer is
    let (status, _) = send(&app.router, Method::GET, "/api/users", Some(&deputy), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = send(
        &app.router,
        Method::DELETE,
        &format!("/api/users/{}", deputy_id),
        Some(&admin),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    let (status, _) = send(&app.router, Method::GET, "/api/users/me", Some(&deputy), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_admin_cannot_delete_self() {
    let app = app().await;
    let admin = login(&app.router, ADMIN_EMAIL, ADMIN_PASSWORD).await;
    let (_, me) = send(&app.router, Method::GET, "/api/users/me", Some(&admin), None).await;
    let uri = format!("/api/users/{}", me["id"].as_str().unwrap());

    let (status, _) = send(&app.router, Method::DELETE, &uri, Some(&admin), None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

// =============================================================================
// Invoices
// =============================================================================

#[tokio::test]
async fn test_create_and_list_invoice() {
    let app = app().await;
    let token = register(&app.router, "clerk@example.com").await;

    let (status, created) = send(
        &app.router,
        Method::POST,
        "/api/invoices",
        Some(&token),
        Some(invoice_body("INV-100")),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "{}", created);
    assert_eq!(decimal(&created["subtotal"]), dec!(25));
    assert_eq!(decimal(&created["tax_amount"]), dec!(2.5));
    assert_eq!(decimal(&created["total"]), dec!(27.5));
    assert_eq!(created["currency"], "USD");
    assert_eq!(created["status"], "draft");

    let (status, page) = send(&app.router, Method::GET, "/api/invoices", Some(&token), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(page["meta"]["total"], 1);
    assert_eq!(page["data"][0]["number"], "INV-100");

    let (status, found) = send(
        &app.router,
        Method::GET,
        "/api/invoices/search?q=globex",
        Some(&token),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(found.as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn test_other_members_invoice_is_not_found() {
    let app = app().await;
    let owner = register(&app.router, "owner@example.com").await;
    let other = register(&app.router, "other@example.com").await;

    let (_, created) = send(
        &app.router,
        Method::POST,
        "/api/invoices",
        Some(&owner),
        Some(invoice_body("INV-200")),
    )
    .await;
    let uri = format!("/api/invoices/{}", created["id"].as_str().unwrap());

    let (status, _) = send(&app.router, Method::GET, &uri, Some(&other), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let admin = login(&app.router, ADMIN_EMAIL, ADMIN_PASSWORD).await;
    let (status, _) = send(&app.router, Method::GET, &uri, Some(&admin), None).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_status_change_and_delete() {
    let app = app().await;
    let token = register(&app.router, "clerk@example.com").await;
    let (_, created) = send(
        &app.router,
        Method::POST,
        "/api/invoices",
        Some(&token),
        Some(invoice_body("INV-300")),
    )
    .await;
    let uri = format!("/api/invoices/{}", created["id"].as_str().unwrap());

    let (status, updated) = send(
        &app.router,
        Method::PATCH,
        &format!("{}/status", uri),
        Some(&token),
        Some(json!({ "status": "pending" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(updated["status"], "pending");

    let (status, _) = send(&app.router, Method::DELETE, &uri, Some(&token), None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    let (status, _) = send(&app.router, Method::GET, &uri, Some(&token), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_draft_autosave_roundtrip() {
    let app = app().await;
    let token = register(&app.router, "clerk@example.com").await;

    let (status, empty) = send(&app.router, Method::GET, "/api/invoices/draft", Some(&token), None).await;
    assert_eq!(status, StatusCode::OK);
    assert!(empty.is_null());

    let (status, _) = send(
        &app.router,
        Method::PUT,
        "/api/invoices/draft",
        Some(&token),
        Some(invoice_body("INV-DRAFT")),
    )
    .await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (_, saved) = send(&app.router, Method::GET, "/api/invoices/draft", Some(&token), None).await;
    assert_eq!(saved["number"], "INV-DRAFT");

    let (status, _) = send(&app.router, Method::DELETE, "/api/invoices/draft", Some(&token), None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
}

// =============================================================================
// Rates
// =============================================================================

#[tokio::test]
async fn test_rates_and_conversion() {
    let app = app().await;

    let (status, rates) = send(&app.router, Method::GET, "/api/rates", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(rates["base"], "USD");
    assert_eq!(decimal(&rates["rates"]["EUR"]), dec!(0.5));

    let (status, conversion) = send(
        &app.router,
        Method::GET,
        "/api/rates/convert?amount=10&from=USD&to=EUR",
        None,
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(decimal(&conversion["result"]), dec!(5));

    let (status, _) = send(
        &app.router,
        Method::GET,
        "/api/rates/convert?amount=10&from=USD&to=XYZ&strict=true",
        None,
        None,
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_conversion_overflow_is_rejected() {
    let app = app().await;
    let max = "79228162514264337593543950335";

    let (status, body) = send(
        &app.router,
        Method::GET,
        &format!("/api/rates/convert?amount={}&from=EUR&to=USD&strict=true", max),
        None,
        None,
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["message"], "Amount out of range");

    let (status, conversion) = send(
        &app.router,
        Method::GET,
        &format!("/api/rates/convert?amount={}&from=EUR&to=USD", max),
        None,
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(decimal(&conversion["result"]), Decimal::MAX);
}

// =============================================================================
// Password reset
// =============================================================================

#[tokio::test]
async fn test_password_reset_flow() {
    let app = app().await;
    register(&app.router, "forgetful@example.com").await;

    let (status, _) = send(
        &app.router,
        Method::POST,
        "/api/auth/password-reset/request",
        None,
        Some(json!({ "email": "forgetful@example.com" })),
    )
    .await;
    assert_eq!(status, StatusCode::ACCEPTED);
    let token = app.outbox.last_token().expect("reset token delivered");

    let (status, validity) = send(
        &app.router,
        Method::POST,
        "/api/auth/password-reset/validate",
        None,
        Some(json!({ "token": token })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(validity["valid"], true);

    let (status, _) = send(
        &app.router,
        Method::POST,
        "/api/auth/password-reset/confirm",
        None,
        Some(json!({ "token": token, "password": "BrandNew456" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    login(&app.router, "forgetful@example.com", "BrandNew456").await;

    // tokens are single use
    let (status, _) = send(
        &app.router,
        Method::POST,
        "/api/auth/password-reset/confirm",
        None,
        Some(json!({ "token": token, "password": "Another789" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_reset_request_for_unknown_email_is_accepted() {
    let app = app().await;
    let (status, _) = send(
        &app.router,
        Method::POST,
        "/api/auth/password-reset/request",
        None,
        Some(json!({ "email": "nobody@example.com" })),
    )
    .await;
    assert_eq!(status, StatusCode::ACCEPTED);
    assert!(app.outbox.last_token().is_none());
}
