//! Password reset flow: `requested -> sent -> reset`.
//!
//! Tokens live in the local store, so the single-use guarantee holds per
//! instance only.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;

use crate::config::{GatewaySettings, RESET_TOKEN_TTL_SECONDS};
use crate::domain::{user::normalize_email, Password, ResetChannel, ResetToken, User};
use crate::errors::{AppError, AppResult};
use crate::infra::notifier::OutgoingMessage;
use crate::infra::Notifier;
use crate::services::DataService;

#[async_trait]
pub trait ResetService: Send + Sync {
    /// Unknown or disabled accounts still return `Ok`.
    async fn request(&self, email: &str, channel: ResetChannel) -> AppResult<()>;

    async fn validate(&self, token: &str) -> AppResult<bool>;

    async fn reset(&self, token: &str, new_password: &str) -> AppResult<()>;
}

pub struct ResetManager {
    data: Arc<DataService>,
    email: Arc<dyn Notifier>,
    whatsapp: Arc<dyn Notifier>,
    /// Used until an admin saves settings into the local store
    default_gateways: GatewaySettings,
    /// Serializes consumption so a token cannot be spent twice concurrently
    consume_lock: tokio::sync::Mutex<()>,
}

impl ResetManager {
    pub fn new(
        data: Arc<DataService>,
        email: Arc<dyn Notifier>,
        whatsapp: Arc<dyn Notifier>,
        default_gateways: GatewaySettings,
    ) -> Self {
        Self {
            data,
            email,
            whatsapp,
            default_gateways,
            consume_lock: tokio::sync::Mutex::new(()),
        }
    }

    async fn gateways(&self) -> GatewaySettings {
        self.data
            .gateway_settings()
            .await
            .unwrap_or_else(|| self.default_gateways.clone())
    }

    fn message(user: &User, token: &ResetToken) -> Option<OutgoingMessage> {
        let to = match token.channel {
            ResetChannel::Email => user.email.clone(),
            ResetChannel::WhatsApp => user.phone.clone()?,
        };
        Some(OutgoingMessage {
            to,
            subject: "Password reset".to_string(),
            body: format!(
                "Hello {},\n\nUse this code to reset your password:\n\n{}\n\n\
                 The code expires in {} minutes. If you did not ask for a reset, ignore this message.",
                user.name,
                token.token,
                RESET_TOKEN_TTL_SECONDS / 60
            ),
        })
    }

    async fn prune(&self) {
        match self.data.prune_reset_tokens(Utc::now()).await {
            Ok(0) => {}
            Ok(removed) => tracing::debug!(removed, "Pruned stale reset tokens"),
            Err(e) => tracing::warn!(error = %e, "Failed to prune reset tokens"),
        }
    }

    fn invalid() -> AppError {
        AppError::validation("Invalid or expired reset token")
    }
}

#[async_trait]
impl ResetService for ResetManager {
    async fn request(&self, email: &str, channel: ResetChannel) -> AppResult<()> {
        self.prune().await;

        let email = normalize_email(email);
        let user = match self.data.find_user_by_email(&email).await? {
            Some(user) if user.is_active => user,
            Some(user) => {
                tracing::info!(user_id = %user.id, "Reset requested for disabled account, ignoring");
                return Ok(());
            }
            None => {
                tracing::info!("Reset requested for unknown email, ignoring");
                return Ok(());
            }
        };

        let mut token = ResetToken::issue(user.id, user.email.clone(), channel);
        let Some(message) = Self::message(&user, &token) else {
            tracing::warn!(user_id = %user.id, channel = %channel, "No destination for reset channel, ignoring");
            return Ok(());
        };
        self.data.save_reset_token(token.clone()).await?;

        let notifier = match channel {
            ResetChannel::Email => &self.email,
            ResetChannel::WhatsApp => &self.whatsapp,
        };
        notifier.deliver(&self.gateways().await, &message).await?;

        token.mark_sent();
        self.data.save_reset_token(token).await?;
        tracing::info!(user_id = %user.id, channel = %channel, "Reset token sent");
        Ok(())
    }

    async fn validate(&self, token: &str) -> AppResult<bool> {
        Ok(self
            .data
            .find_reset_token(token)
            .await
            .is_some_and(|t| t.validate(Utc::now()).is_ok()))
    }

    async fn reset(&self, token: &str, new_password: &str) -> AppResult<()> {
        Password::check_strength(new_password)?;

        let _guard = self.consume_lock.lock().await;
        let mut stored = self.data.find_reset_token(token).await.ok_or_else(Self::invalid)?;
        let now = Utc::now();
        stored.validate(now)?;

        self.data.set_password(stored.user_id, new_password).await?;
        stored.consume(now)?;
        let user_id = stored.user_id;
        self.data.save_reset_token(stored).await?;

        tracing::info!(user_id = %user_id, "Password reset completed");
        Ok(())
    }
}
