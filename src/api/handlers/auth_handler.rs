//! Authentication and password reset handlers.

use axum::{
    extract::State,
    http::StatusCode,
    response::Json,
    routing::post,
    Router,
};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use validator::Validate;

use crate::api::extractors::ValidatedJson;
use crate::api::AppState;
use crate::domain::{ResetChannel, UserResponse};
use crate::errors::AppResult;
use crate::services::TokenResponse;
use crate::types::MessageResponse;

/// User registration request
#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct RegisterRequest {
    /// User email address
    #[validate(email(message = "Invalid email format"))]
    #[schema(example = "user@example.com")]
    pub email: String,
    /// User password (minimum 8 characters)
    #[validate(length(min = 8, message = "Password must be at least 8 characters"))]
    #[schema(example = "SecurePass123!", min_length = 8)]
    pub password: String,
    /// User display name
    #[validate(length(min = 1, message = "Name is required"))]
    #[schema(example = "John Doe")]
    pub name: String,
}

/// User login request
#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct LoginRequest {
    /// User email address
    #[validate(email(message = "Invalid email format"))]
    #[schema(example = "user@example.com")]
    pub email: String,
    /// User password
    #[schema(example = "SecurePass123!")]
    pub password: String,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct ResetRequest {
    #[validate(email(message = "Invalid email format"))]
    #[schema(example = "user@example.com")]
    pub email: String,
    #[serde(default = "default_channel")]
    pub channel: ResetChannel,
}

fn default_channel() -> ResetChannel {
    ResetChannel::Email
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct ResetTokenRequest {
    #[validate(length(min = 1, message = "Token is required"))]
    pub token: String,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct ResetConfirmRequest {
    #[validate(length(min = 1, message = "Token is required"))]
    pub token: String,
    #[validate(length(min = 8, message = "Password must be at least 8 characters"))]
    pub password: String,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct TokenValidity {
    pub valid: bool,
}

/// Create authentication routes
pub fn auth_routes() -> Router<AppState> {
    Router::new()
        .route("/register", post(register))
        .route("/login", post(login))
        .route("/password-reset/request", post(request_reset))
        .route("/password-reset/validate", post(validate_reset))
        .route("/password-reset/confirm", post(confirm_reset))
}

/// Register a new user
#[utoipa::path(
    post,
    path = "/api/auth/register",
    tag = "Authentication",
    request_body = RegisterRequest,
    responses(
        (status = 201, description = "User registered successfully", body = UserResponse),
        (status = 400, description = "Validation error"),
        (status = 409, description = "User already exists")
    )
)]
pub async fn register(
    State(state): State<AppState>,
    ValidatedJson(payload): ValidatedJson<RegisterRequest>,
) -> AppResult<(StatusCode, Json<UserResponse>)> {
    let user = state
        .auth_service
        .register(payload.email, payload.password, payload.name)
        .await?;

    Ok((StatusCode::CREATED, Json(UserResponse::from(user))))
}

/// Login and get JWT token
#[utoipa::path(
    post,
    path = "/api/auth/login",
    tag = "Authentication",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Login successful", body = TokenResponse),
        (status = 400, description = "Validation error"),
        (status = 401, description = "Invalid credentials"),
        (status = 403, description = "Account disabled")
    )
)]
pub async fn login(
    State(state): State<AppState>,
    ValidatedJson(payload): ValidatedJson<LoginRequest>,
) -> AppResult<Json<TokenResponse>> {
    let token = state
        .auth_service
        .login(payload.email, payload.password)
        .await?;

    Ok(Json(token))
}

/// Request a password reset token
///
/// Always answers 202 for well-formed requests, whether or not the account exists.
#[utoipa::path(
    post,
    path = "/api/auth/password-reset/request",
    tag = "Authentication",
    request_body = ResetRequest,
    responses(
        (status = 202, description = "Reset requested", body = MessageResponse),
        (status = 400, description = "Validation error"),
        (status = 503, description = "Delivery gateway unavailable")
    )
)]
pub async fn request_reset(
    State(state): State<AppState>,
    ValidatedJson(payload): ValidatedJson<ResetRequest>,
) -> AppResult<(StatusCode, Json<MessageResponse>)> {
    state
        .reset_service
        .request(&payload.email, payload.channel)
        .await?;

    Ok((
        StatusCode::ACCEPTED,
        Json(MessageResponse::new(
            "If the account exists, a reset code has been sent",
        )),
    ))
}

/// Check whether a reset token is still usable
#[utoipa::path(
    post,
    path = "/api/auth/password-reset/validate",
    tag = "Authentication",
    request_body = ResetTokenRequest,
    responses((status = 200, description = "Token validity", body = TokenValidity))
)]
pub async fn validate_reset(
    State(state): State<AppState>,
    ValidatedJson(payload): ValidatedJson<ResetTokenRequest>,
) -> AppResult<Json<TokenValidity>> {
    let valid = state.reset_service.validate(&payload.token).await?;
    Ok(Json(TokenValidity { valid }))
}

/// Set a new password with a reset token
#[utoipa::path(
    post,
    path = "/api/auth/password-reset/confirm",
    tag = "Authentication",
    request_body = ResetConfirmRequest,
    responses(
        (status = 200, description = "Password changed", body = MessageResponse),
        (status = 400, description = "Invalid, expired or used token")
    )
)]
pub async fn confirm_reset(
    State(state): State<AppState>,
    ValidatedJson(payload): ValidatedJson<ResetConfirmRequest>,
) -> AppResult<Json<MessageResponse>> {
    state
        .reset_service
        .reset(&payload.token, &payload.password)
        .await?;

    Ok(Json(MessageResponse::new("Password has been reset")))
}
