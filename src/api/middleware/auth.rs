//! JWT authentication middleware.

use axum::{
    extract::{Request, State},
    http::{header::AUTHORIZATION, HeaderMap},
    middleware::Next,
    response::Response,
};
use uuid::Uuid;

use crate::api::AppState;
use crate::config::BEARER_TOKEN_PREFIX;
use crate::domain::{Actor, UserRole};
use crate::errors::AppError;

/// Authenticated user extracted from JWT token
#[derive(Clone, Debug)]
pub struct CurrentUser {
    pub id: Uuid,
    pub email: String,
    pub role: UserRole,
}

impl CurrentUser {
    pub fn is_admin(&self) -> bool {
        self.role.is_admin()
    }

    pub fn actor(&self) -> Actor {
        Actor::new(self.id, self.role)
    }
}

/// Token from an `Authorization: Bearer <token>` header. The scheme is
/// matched case-insensitively.
fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    let value = headers.get(AUTHORIZATION)?.to_str().ok()?;
    let (scheme, token) = value.split_at_checked(BEARER_TOKEN_PREFIX.len())?;
    let token = token.trim();
    (scheme.eq_ignore_ascii_case(BEARER_TOKEN_PREFIX) && !token.is_empty()).then_some(token)
}

/// Verifies the bearer token and injects [`CurrentUser`] into the request
/// extensions. The account behind the token must still exist and be
/// active; role and email come from the stored account, not the claims.
pub async fn auth_middleware(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let token = bearer_token(request.headers()).ok_or(AppError::Unauthorized)?;
    let claims = state.auth_service.verify_token(token)?;

    let user = match state.data.find_user(claims.sub).await? {
        Some(user) if user.is_active => user,
        found => {
            tracing::warn!(
                user_id = %claims.sub,
                exists = found.is_some(),
                "Token presented for a missing or disabled account"
            );
            return Err(AppError::Forbidden);
        }
    };
    if user.role != claims.role() {
        tracing::debug!(user_id = %user.id, token_role = %claims.role(), role = %user.role, "Role changed since token was issued");
    }

    let current_user = CurrentUser {
        id: user.id,
        email: user.email,
        role: user.role,
    };
    tracing::debug!(user_id = %current_user.id, role = %current_user.role, "Request authenticated");

    request.extensions_mut().insert(current_user);

    Ok(next.run(request).await)
}

/// Require admin role, returns Forbidden error if not admin.
pub fn require_admin(user: &CurrentUser) -> Result<(), AppError> {
    if user.is_admin() {
        Ok(())
    } else {
        Err(AppError::Forbidden)
    }
}

/// Admins may act on anyone; everybody else only on themselves.
pub fn require_self_or_admin(user: &CurrentUser, target: Uuid) -> Result<(), AppError> {
    if user.is_admin() || user.id == target {
        Ok(())
    } else {
        Err(AppError::Forbidden)
    }
}
