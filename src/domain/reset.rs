//! Password reset tokens.

use chrono::{DateTime, Duration, Utc};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::config::{RESET_TOKEN_BYTES, RESET_TOKEN_TTL_SECONDS};
use crate::errors::{AppError, AppResult};

/// Delivery channel for a reset token
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum ResetChannel {
    Email,
    #[serde(alias = "whats_app")]
    WhatsApp,
}

impl std::fmt::Display for ResetChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ResetChannel::Email => write!(f, "email"),
            ResetChannel::WhatsApp => write!(f, "whatsapp"),
        }
    }
}

/// `Requested -> Sent -> Reset`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResetState {
    Requested,
    Sent,
    Reset,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResetToken {
    pub token: String,
    pub user_id: Uuid,
    pub email: String,
    pub channel: ResetChannel,
    pub state: ResetState,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub used: bool,
}

impl ResetToken {
    /// Issue a fresh random token valid for one hour.
    pub fn issue(user_id: Uuid, email: String, channel: ResetChannel) -> Self {
        Self::issue_at(user_id, email, channel, Utc::now())
    }

    pub fn issue_at(user_id: Uuid, email: String, channel: ResetChannel, now: DateTime<Utc>) -> Self {
        let mut bytes = [0u8; RESET_TOKEN_BYTES];
        rand::thread_rng().fill_bytes(&mut bytes);

        Self {
            token: hex::encode(bytes),
            user_id,
            email,
            channel,
            state: ResetState::Requested,
            created_at: now,
            expires_at: now + Duration::seconds(RESET_TOKEN_TTL_SECONDS),
            used: false,
        }
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }

    /// Token is usable: not consumed and not expired.
    pub fn validate(&self, now: DateTime<Utc>) -> AppResult<()> {
        if self.used {
            return Err(AppError::validation("Reset token has already been used"));
        }
        if self.is_expired(now) {
            return Err(AppError::validation("Reset token has expired"));
        }
        Ok(())
    }

    pub fn mark_sent(&mut self) {
        if self.state == ResetState::Requested {
            self.state = ResetState::Sent;
        }
    }

    /// Single use: validates, then flips `used`.
    pub fn consume(&mut self, now: DateTime<Utc>) -> AppResult<()> {
        self.validate(now)?;
        self.used = true;
        self.state = ResetState::Reset;
        Ok(())
    }

    /// Tokens that can never be used again.
    pub fn is_stale(&self, now: DateTime<Utc>) -> bool {
        self.used || self.is_expired(now)
    }
}
