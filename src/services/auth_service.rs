//! Authentication service - registration, login and token verification.
//!
//! Credentials are checked by whichever tier the data service reaches, so
//! login keeps working offline against mirrored users.

use async_trait::async_trait;
use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::config::{Config, SECONDS_PER_HOUR, TOKEN_TYPE_BEARER};
use crate::domain::{user::normalize_email, NewUser, Password, User, UserResponse, UserRole};
use crate::errors::{AppError, AppResult};
use crate::services::DataService;

/// JWT claims payload
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: Uuid,
    pub email: String,
    pub role: String,
    pub exp: i64,
    pub iat: i64,
}

impl Claims {
    pub fn role(&self) -> UserRole {
        UserRole::from(self.role.as_str())
    }
}

/// Token response returned after successful authentication
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct TokenResponse {
    /// JWT access token
    #[schema(example = "eyJhbGciOiJIUzI1NiIsInR5cCI6IkpXVCJ9...")]
    pub access_token: String,
    /// Token type (always "Bearer")
    #[schema(example = "Bearer")]
    pub token_type: String,
    /// Token expiration time in seconds
    #[schema(example = 86400)]
    pub expires_in: i64,
    /// The authenticated account
    pub user: UserResponse,
}

#[async_trait]
pub trait AuthService: Send + Sync {
    /// Register a new member account
    async fn register(&self, email: String, password: String, name: String) -> AppResult<User>;

    /// Login and return JWT token
    async fn login(&self, email: String, password: String) -> AppResult<TokenResponse>;

    /// Verify JWT token and extract claims
    fn verify_token(&self, token: &str) -> AppResult<Claims>;
}

fn generate_token(user: &User, config: &Config) -> AppResult<TokenResponse> {
    let now = Utc::now();
    let expires_at = now + Duration::hours(config.jwt_expiration_hours);

    let claims = Claims {
        sub: user.id,
        email: user.email.clone(),
        role: user.role.to_string(),
        exp: expires_at.timestamp(),
        iat: now.timestamp(),
    };

    let token = encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(config.jwt_secret_bytes()),
    )?;

    Ok(TokenResponse {
        access_token: token,
        token_type: TOKEN_TYPE_BEARER.to_string(),
        expires_in: config.jwt_expiration_hours * SECONDS_PER_HOUR,
        user: UserResponse::from(user.clone()),
    })
}

fn verify_token_internal(token: &str, config: &Config) -> AppResult<Claims> {
    let token_data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(config.jwt_secret_bytes()),
        &Validation::default(),
    )?;

    Ok(token_data.claims)
}

/// Concrete implementation of AuthService on top of the data service.
pub struct Authenticator {
    data: Arc<DataService>,
    config: Config,
}

impl Authenticator {
    pub fn new(data: Arc<DataService>, config: Config) -> Self {
        Self { data, config }
    }
}

#[async_trait]
impl AuthService for Authenticator {
    async fn register(&self, email: String, password: String, name: String) -> AppResult<User> {
        Password::check_strength(&password)?;
        let email = normalize_email(&email);

        if self.data.find_user_by_email(&email).await?.is_some() {
            return Err(AppError::conflict("User with this email"));
        }

        let user = self
            .data
            .create_user(NewUser {
                email,
                password,
                name: name.trim().to_string(),
                role: UserRole::Member,
                phone: None,
            })
            .await?;

        tracing::info!(user_id = %user.id, "User registered");
        Ok(user)
    }

    async fn login(&self, email: String, password: String) -> AppResult<TokenResponse> {
        let email = normalize_email(&email);
        let Some(user) = self.data.login(&email, &password).await? else {
            tracing::debug!("Login rejected: invalid credentials");
            return Err(AppError::InvalidCredentials);
        };

        if !user.is_active {
            tracing::info!(user_id = %user.id, "Login rejected: account disabled");
            return Err(AppError::Forbidden);
        }

        generate_token(&user, &self.config)
    }

    fn verify_token(&self, token: &str) -> AppResult<Claims> {
        verify_token_internal(token, &self.config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::UserChanges;
    use crate::infra::LocalStore;

    const SECRET: &str = "test-secret-key-minimum-32-characters";

    fn service() -> Authenticator {
        let data = Arc::new(DataService::local_only(Arc::new(LocalStore::in_memory())));
        Authenticator::new(data, Config::for_tests(SECRET))
    }

    #[tokio::test]
    async fn test_register_then_login() {
        let auth = service();
        let user = auth
            .register("  Ana@Example.com ".into(), "Password123".into(), "Ana".into())
            .await
            .unwrap();
        assert_eq!(user.email, "ana@example.com");
        assert_eq!(user.role, UserRole::Member);

        let token = auth
            .login("ana@example.com".into(), "Password123".into())
            .await
            .unwrap();
        assert_eq!(token.token_type, "Bearer");
        assert_eq!(token.user.id, user.id);

        let claims = auth.verify_token(&token.access_token).unwrap();
        assert_eq!(claims.sub, user.id);
        assert_eq!(claims.role(), UserRole::Member);
    }

    #[tokio::test]
    async fn test_register_duplicate_email() {
        let auth = service();
        auth.register("ana@example.com".into(), "Password123".into(), "Ana".into())
            .await
            .unwrap();
        let err = auth
            .register("ANA@example.com".into(), "Password456".into(), "Other".into())
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));
    }

    #[tokio::test]
    async fn test_register_rejects_weak_password() {
        let err = service()
            .register("ana@example.com".into(), "short".into(), "Ana".into())
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }

    #[tokio::test]
    async fn test_login_wrong_password() {
        let auth = service();
        auth.register("ana@example.com".into(), "Password123".into(), "Ana".into())
            .await
            .unwrap();
        let err = auth
            .login("ana@example.com".into(), "Wrong-password".into())
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::InvalidCredentials));

        let err = auth
            .login("nobody@example.com".into(), "Password123".into())
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::InvalidCredentials));
    }

    #[tokio::test]
    async fn test_inactive_user_cannot_login() {
        let auth = service();
        let user = auth
            .register("ana@example.com".into(), "Password123".into(), "Ana".into())
            .await
            .unwrap();
        auth.data
            .update_user(
                user.id,
                UserChanges {
                    is_active: Some(false),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        let err = auth
            .login("ana@example.com".into(), "Password123".into())
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Forbidden));
    }

    #[test]
    fn test_verify_rejects_foreign_signature() {
        let auth = service();
        let other = Authenticator::new(
            Arc::new(DataService::local_only(Arc::new(LocalStore::in_memory()))),
            Config::for_tests("another-secret-key-minimum-32-characters"),
        );
        let user = User::new("a@example.com".into(), String::new(), "A".into(), UserRole::Admin);
        let token = generate_token(&user, &other.config).unwrap();

        assert!(auth.verify_token(&token.access_token).is_err());
        assert!(other.verify_token(&token.access_token).is_ok());
    }
}
