//! Outbound notification gateways for password reset delivery.
//!
//! Gateway settings are passed per call: admins can change them at
//! runtime through the local store.

use std::time::Duration;

use async_trait::async_trait;
use lettre::{
    message::header::ContentType, transport::smtp::authentication::Credentials,
    AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
};
use reqwest::Client;
use serde::Serialize;

use crate::config::{GatewaySettings, RESET_TOKEN_BYTES};
use crate::errors::{AppError, AppResult};

#[cfg(any(test, feature = "test-utils"))]
use mockall::automock;

/// A message ready to hand to a gateway.
#[derive(Debug, Clone, PartialEq)]
pub struct OutgoingMessage {
    /// Email address or phone number, depending on the channel
    pub to: String,
    pub subject: String,
    pub body: String,
}

#[cfg_attr(any(test, feature = "test-utils"), automock)]
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn deliver(&self, gateways: &GatewaySettings, message: &OutgoingMessage) -> AppResult<()>;
}

/// Mask every word that looks like a reset token.
fn redact_tokens(body: &str) -> String {
    let is_token = |word: &str| {
        word.len() == RESET_TOKEN_BYTES * 2 && word.bytes().all(|b| b.is_ascii_hexdigit())
    };
    body.lines()
        .map(|line| {
            line.split(' ')
                .map(|word| if is_token(word) { "[REDACTED]" } else { word })
                .collect::<Vec<_>>()
                .join(" ")
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Without a configured gateway, debug builds log the message instead.
fn log_undelivered(channel: &str, message: &OutgoingMessage) -> AppResult<()> {
    if cfg!(debug_assertions) {
        tracing::warn!(channel = %channel, "Gateway not configured - logging message instead of sending");
        tracing::debug!(
            "=== {} (not sent) ===\n\
             To: {}\n\
             Subject: {}\n\
             Body:\n{}\n\
             ========================",
            channel.to_uppercase(),
            message.to,
            message.subject,
            redact_tokens(&message.body)
        );
        return Ok(());
    }
    Err(AppError::unavailable(format!("{} gateway is not configured", channel)))
}

/// SMTP delivery through lettre.
pub struct EmailNotifier {
    timeout: Duration,
}

impl EmailNotifier {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }
}

#[async_trait]
impl Notifier for EmailNotifier {
    async fn deliver(&self, gateways: &GatewaySettings, message: &OutgoingMessage) -> AppResult<()> {
        let Some(smtp) = gateways.smtp.as_ref().filter(|s| !s.host.is_empty()) else {
            return log_undelivered("email", message);
        };

        let email = Message::builder()
            .from(
                smtp.from
                    .parse()
                    .map_err(|e| AppError::validation(format!("Invalid sender address: {}", e)))?,
            )
            .to(message
                .to
                .parse()
                .map_err(|e| AppError::validation(format!("Invalid recipient address: {}", e)))?)
            .subject(&message.subject)
            .header(ContentType::TEXT_PLAIN)
            .body(message.body.clone())
            .map_err(|e| AppError::internal(format!("Failed to build email: {}", e)))?;

        let builder = if smtp.tls {
            AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&smtp.host)
                .map_err(|e| AppError::unavailable(format!("SMTP relay error: {}", e)))?
        } else {
            AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(&smtp.host)
        };

        let mut builder = builder.port(smtp.port).timeout(Some(self.timeout));
        if let Some(username) = &smtp.username {
            builder = builder.credentials(Credentials::new(
                username.clone(),
                smtp.password.clone().unwrap_or_default(),
            ));
        }

        builder
            .build()
            .send(email)
            .await
            .map_err(|e| AppError::unavailable(format!("SMTP send failed: {}", e)))?;

        tracing::info!(to = %message.to, "Reset email sent");
        Ok(())
    }
}

#[derive(Serialize)]
struct WhatsAppPayload<'a> {
    to: &'a str,
    from: Option<&'a str>,
    message: &'a str,
}

/// WhatsApp delivery through an HTTP gateway.
pub struct WhatsAppNotifier {
    client: Client,
}

impl WhatsAppNotifier {
    pub fn new(timeout: Duration) -> AppResult<Self> {
        Ok(Self {
            client: Client::builder().timeout(timeout).build()?,
        })
    }
}

#[async_trait]
impl Notifier for WhatsAppNotifier {
    async fn deliver(&self, gateways: &GatewaySettings, message: &OutgoingMessage) -> AppResult<()> {
        let Some(gateway) = gateways.whatsapp.as_ref().filter(|w| !w.api_url.is_empty()) else {
            return log_undelivered("whatsapp", message);
        };

        let text = format!("{}\n\n{}", message.subject, message.body);
        self.client
            .post(&gateway.api_url)
            .bearer_auth(&gateway.api_key)
            .json(&WhatsAppPayload {
                to: &message.to,
                from: gateway.sender.as_deref(),
                message: &text,
            })
            .send()
            .await?
            .error_for_status()?;

        tracing::info!(to = %message.to, "Reset message sent via WhatsApp");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn message() -> OutgoingMessage {
        OutgoingMessage {
            to: "a@example.com".into(),
            subject: "Reset".into(),
            body: "token".into(),
        }
    }

    #[tokio::test]
    async fn test_unconfigured_gateways_log_in_debug_builds() {
        let gateways = GatewaySettings::default();

        let email = EmailNotifier::new(Duration::from_secs(1));
        let whatsapp = WhatsAppNotifier::new(Duration::from_secs(1)).unwrap();

        assert_eq!(email.deliver(&gateways, &message()).await.is_ok(), cfg!(debug_assertions));
        assert_eq!(whatsapp.deliver(&gateways, &message()).await.is_ok(), cfg!(debug_assertions));
    }

    #[test]
    fn test_logged_body_hides_reset_token() {
        let token = "ab".repeat(RESET_TOKEN_BYTES);
        let body = format!("Hello Ana,\n\nUse this code:\n\n{}\n\nIt expires soon.", token);

        let logged = redact_tokens(&body);
        assert!(!logged.contains(&token));
        assert_eq!(logged, "Hello Ana,\n\nUse this code:\n\n[REDACTED]\n\nIt expires soon.");

        // shorter hex words such as amounts or ids are kept
        assert_eq!(redact_tokens("code cafe 2024"), "code cafe 2024");
    }

    #[tokio::test]
    async fn test_invalid_recipient_is_rejected() {
        let gateways = GatewaySettings {
            smtp: Some(crate::config::SmtpSettings {
                host: "localhost".into(),
                port: 2525,
                username: None,
                password: None,
                from: "noreply@example.com".into(),
                tls: false,
            }),
            whatsapp: None,
        };
        let mut msg = message();
        msg.to = "not an address".into();

        let err = EmailNotifier::new(Duration::from_millis(200))
            .deliver(&gateways, &msg)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }
}
