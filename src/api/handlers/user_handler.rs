//! User handlers: own profile and the admin user panel.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::Json,
    routing::{get, put},
    Extension, Router,
};
use serde::Deserialize;
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;
use validator::Validate;

use crate::api::extractors::ValidatedJson;
use crate::api::middleware::{require_admin, require_self_or_admin, CurrentUser};
use crate::api::AppState;
use crate::domain::{NewUser, UserResponse, UserRole};
use crate::errors::AppResult;
use crate::services::{AdminUserUpdate, ProfileUpdate};
use crate::types::MessageResponse;

#[derive(Debug, Deserialize, IntoParams)]
pub struct UserListQuery {
    /// Exact email lookup
    pub email: Option<String>,
}

/// Admin account creation
#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct CreateUserRequest {
    #[validate(email(message = "Invalid email format"))]
    #[schema(example = "user@example.com")]
    pub email: String,
    #[validate(length(min = 8, message = "Password must be at least 8 characters"))]
    pub password: String,
    #[validate(length(min = 1, message = "Name is required"))]
    pub name: String,
    #[serde(default = "default_role")]
    pub role: UserRole,
    #[validate(length(max = 32))]
    pub phone: Option<String>,
}

fn default_role() -> UserRole {
    UserRole::Member
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct SetPasswordRequest {
    #[validate(length(min = 8, message = "Password must be at least 8 characters"))]
    pub password: String,
}

pub fn user_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(list_users).post(create_user))
        .route("/me", get(get_current_user).put(update_current_user))
        .route("/:id", get(get_user).put(update_user).delete(delete_user))
        .route("/:id/password", put(set_password))
}

/// Get the authenticated user
#[utoipa::path(
    get,
    path = "/api/users/me",
    tag = "Users",
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "Current user", body = UserResponse),
        (status = 401, description = "Unauthorized")
    )
)]
pub async fn get_current_user(
    State(state): State<AppState>,
    Extension(current_user): Extension<CurrentUser>,
) -> AppResult<Json<UserResponse>> {
    let user = state.user_service.get_user(current_user.id).await?;
    Ok(Json(UserResponse::from(user)))
}

/// Update own name, phone or preferences
#[utoipa::path(
    put,
    path = "/api/users/me",
    tag = "Users",
    security(("bearer_auth" = [])),
    request_body = ProfileUpdate,
    responses(
        (status = 200, description = "Profile updated", body = UserResponse),
        (status = 503, description = "No backend accepts user writes")
    )
)]
pub async fn update_current_user(
    State(state): State<AppState>,
    Extension(current_user): Extension<CurrentUser>,
    ValidatedJson(payload): ValidatedJson<ProfileUpdate>,
) -> AppResult<Json<UserResponse>> {
    let user = state
        .user_service
        .update_profile(current_user.id, payload)
        .await?;
    Ok(Json(UserResponse::from(user)))
}

/// List users, or look one up by email (admin only)
#[utoipa::path(
    get,
    path = "/api/users",
    tag = "Users",
    security(("bearer_auth" = [])),
    params(UserListQuery),
    responses(
        (status = 200, description = "Users", body = Vec<UserResponse>),
        (status = 403, description = "Admin access required")
    )
)]
pub async fn list_users(
    State(state): State<AppState>,
    Extension(current_user): Extension<CurrentUser>,
    Query(query): Query<UserListQuery>,
) -> AppResult<Json<Vec<UserResponse>>> {
    require_admin(&current_user)?;

    let users = match query.email.filter(|e| !e.trim().is_empty()) {
        Some(email) => state
            .user_service
            .find_by_email(&email)
            .await?
            .into_iter()
            .collect(),
        None => state.user_service.list_users().await?,
    };
    Ok(Json(users.into_iter().map(UserResponse::from).collect()))
}

/// Create a user with any role (admin only)
#[utoipa::path(
    post,
    path = "/api/users",
    tag = "Users",
    security(("bearer_auth" = [])),
    request_body = CreateUserRequest,
    responses(
        (status = 201, description = "User created", body = UserResponse),
        (status = 403, description = "Admin access required"),
        (status = 409, description = "Email already registered")
    )
)]
pub async fn create_user(
    State(state): State<AppState>,
    Extension(current_user): Extension<CurrentUser>,
    ValidatedJson(payload): ValidatedJson<CreateUserRequest>,
) -> AppResult<(StatusCode, Json<UserResponse>)> {
    require_admin(&current_user)?;

    let user = state
        .user_service
        .create_user(NewUser {
            email: payload.email,
            password: payload.password,
            name: payload.name,
            role: payload.role,
            phone: payload.phone,
        })
        .await?;
    Ok((StatusCode::CREATED, Json(UserResponse::from(user))))
}

/// Get a user by id (self or admin)
#[utoipa::path(
    get,
    path = "/api/users/{id}",
    tag = "Users",
    security(("bearer_auth" = [])),
    params(("id" = Uuid, Path, description = "User id")),
    responses(
        (status = 200, description = "User", body = UserResponse),
        (status = 403, description = "Not allowed"),
        (status = 404, description = "User not found")
    )
)]
pub async fn get_user(
    State(state): State<AppState>,
    Extension(current_user): Extension<CurrentUser>,
    Path(id): Path<Uuid>,
) -> AppResult<Json<UserResponse>> {
    require_self_or_admin(&current_user, id)?;
    let user = state.user_service.get_user(id).await?;
    Ok(Json(UserResponse::from(user)))
}

/// Change name, role, active flag or phone (admin only)
#[utoipa::path(
    put,
    path = "/api/users/{id}",
    tag = "Users",
    security(("bearer_auth" = [])),
    params(("id" = Uuid, Path, description = "User id")),
    request_body = AdminUserUpdate,
    responses(
        (status = 200, description = "User updated", body = UserResponse),
        (status = 400, description = "Would remove the last admin"),
        (status = 403, description = "Admin access required"),
        (status = 404, description = "User not found")
    )
)]
pub async fn update_user(
    State(state): State<AppState>,
    Extension(current_user): Extension<CurrentUser>,
    Path(id): Path<Uuid>,
    ValidatedJson(payload): ValidatedJson<AdminUserUpdate>,
) -> AppResult<Json<UserResponse>> {
    require_admin(&current_user)?;
    let user = state
        .user_service
        .update_user(current_user.actor(), id, payload)
        .await?;
    Ok(Json(UserResponse::from(user)))
}

/// Set a user's password (admin only)
#[utoipa::path(
    put,
    path = "/api/users/{id}/password",
    tag = "Users",
    security(("bearer_auth" = [])),
    params(("id" = Uuid, Path, description = "User id")),
    request_body = SetPasswordRequest,
    responses(
        (status = 200, description = "Password changed", body = MessageResponse),
        (status = 403, description = "Admin access required"),
        (status = 404, description = "User not found")
    )
)]
pub async fn set_password(
    State(state): State<AppState>,
    Extension(current_user): Extension<CurrentUser>,
    Path(id): Path<Uuid>,
    ValidatedJson(payload): ValidatedJson<SetPasswordRequest>,
) -> AppResult<Json<MessageResponse>> {
    require_admin(&current_user)?;
    state.user_service.set_password(id, &payload.password).await?;
    Ok(Json(MessageResponse::new("Password updated")))
}

/// Delete a user (admin only)
#[utoipa::path(
    delete,
    path = "/api/users/{id}",
    tag = "Users",
    security(("bearer_auth" = [])),
    params(("id" = Uuid, Path, description = "User id")),
    responses(
        (status = 204, description = "User deleted"),
        (status = 400, description = "Self-delete or last admin"),
        (status = 403, description = "Admin access required"),
        (status = 404, description = "User not found")
    )
)]
pub async fn delete_user(
    State(state): State<AppState>,
    Extension(current_user): Extension<CurrentUser>,
    Path(id): Path<Uuid>,
) -> AppResult<StatusCode> {
    require_admin(&current_user)?;
    state
        .user_service
        .delete_user(current_user.actor(), id)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}
