//! Application settings loaded from environment variables.

use std::env;
use std::path::PathBuf;

use super::constants::{
    DEFAULT_BACKEND_FAILURE_THRESHOLD, DEFAULT_EXCHANGE_RATES_TTL_SECONDS,
    DEFAULT_EXCHANGE_RATES_URL, DEFAULT_HEALTH_PROBE_INTERVAL_SECONDS,
    DEFAULT_HTTP_TIMEOUT_SECONDS, DEFAULT_JWT_EXPIRATION_HOURS, DEFAULT_LOCAL_STORE_PATH,
    DEFAULT_SERVER_HOST, DEFAULT_SERVER_PORT, DEFAULT_SMTP_FROM, DEFAULT_SMTP_PORT,
    MIN_JWT_SECRET_LENGTH,
};

/// SMTP settings used by the email reset channel.
#[derive(Clone, Default, PartialEq, serde::Serialize, serde::Deserialize, utoipa::ToSchema)]
pub struct SmtpSettings {
    pub host: String,
    pub port: u16,
    pub username: Option<String>,
    pub password: Option<String>,
    pub from: String,
    pub tls: bool,
}

impl std::fmt::Debug for SmtpSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SmtpSettings")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("username", &self.username)
            .field("password", &"[REDACTED]")
            .field("from", &self.from)
            .field("tls", &self.tls)
            .finish()
    }
}

/// WhatsApp gateway settings used by the WhatsApp reset channel.
#[derive(Clone, Default, PartialEq, serde::Serialize, serde::Deserialize, utoipa::ToSchema)]
pub struct WhatsAppSettings {
    pub api_url: String,
    pub api_key: String,
    pub sender: Option<String>,
}

impl std::fmt::Debug for WhatsAppSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WhatsAppSettings")
            .field("api_url", &self.api_url)
            .field("api_key", &"[REDACTED]")
            .field("sender", &self.sender)
            .finish()
    }
}

/// Notification gateway settings. Persisted in the local store and
/// editable by admins; the environment provides the initial values.
#[derive(Clone, Debug, Default, PartialEq, serde::Serialize, serde::Deserialize, utoipa::ToSchema)]
pub struct GatewaySettings {
    pub smtp: Option<SmtpSettings>,
    pub whatsapp: Option<WhatsAppSettings>,
}

/// Application configuration
#[derive(Clone)]
pub struct Config {
    jwt_secret: String,
    pub jwt_expiration_hours: i64,
    pub server_host: String,
    pub server_port: u16,
    /// MySQL pool URL (first tier)
    pub mysql_url: Option<String>,
    /// Hosted Postgres-style backend URL (second tier)
    pub hosted_database_url: Option<String>,
    /// Companion REST API base URL (third tier)
    pub rest_api_url: Option<String>,
    rest_api_token: Option<String>,
    /// Local store document path; `None` keeps it in memory only
    pub local_store_path: Option<PathBuf>,
    pub redis_url: Option<String>,
    pub exchange_rates_url: String,
    pub exchange_rates_ttl_seconds: u64,
    pub health_probe_interval_seconds: u64,
    pub backend_failure_threshold: u32,
    pub http_timeout_seconds: u64,
    pub gateways: GatewaySettings,
    pub bootstrap_admin_email: Option<String>,
    bootstrap_admin_password: Option<String>,
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("jwt_secret", &"[REDACTED]")
            .field("jwt_expiration_hours", &self.jwt_expiration_hours)
            .field("server_host", &self.server_host)
            .field("server_port", &self.server_port)
            .field("mysql_url", &self.mysql_url.as_ref().map(|_| "[REDACTED]"))
            .field(
                "hosted_database_url",
                &self.hosted_database_url.as_ref().map(|_| "[REDACTED]"),
            )
            .field("rest_api_url", &self.rest_api_url)
            .field("rest_api_token", &"[REDACTED]")
            .field("local_store_path", &self.local_store_path)
            .field("redis_url", &self.redis_url.as_ref().map(|_| "[REDACTED]"))
            .field("exchange_rates_url", &self.exchange_rates_url)
            .field("exchange_rates_ttl_seconds", &self.exchange_rates_ttl_seconds)
            .field("health_probe_interval_seconds", &self.health_probe_interval_seconds)
            .field("backend_failure_threshold", &self.backend_failure_threshold)
            .field("http_timeout_seconds", &self.http_timeout_seconds)
            .field("gateways", &self.gateways)
            .field("bootstrap_admin_email", &self.bootstrap_admin_email)
            .finish()
    }
}

fn non_empty_var(name: &str) -> Option<String> {
    env::var(name).ok().filter(|v| !v.trim().is_empty())
}

fn parsed_var<T: std::str::FromStr>(name: &str, default: T) -> T {
    env::var(name)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// # Panics
    /// Panics if JWT_SECRET is not set or is too short (security requirement).
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();

        let jwt_secret = env::var("JWT_SECRET").unwrap_or_else(|_| {
            if cfg!(debug_assertions) {
                tracing::warn!("JWT_SECRET not set, using insecure default for development");
                "dev-secret-key-minimum-32-chars!!".to_string()
            } else {
                panic!("JWT_SECRET environment variable must be set in production");
            }
        });

        if jwt_secret.len() < MIN_JWT_SECRET_LENGTH {
            panic!(
                "JWT_SECRET must be at least {} characters long",
                MIN_JWT_SECRET_LENGTH
            );
        }

        let smtp = non_empty_var("SMTP_HOST").map(|host| SmtpSettings {
            host,
            port: parsed_var("SMTP_PORT", DEFAULT_SMTP_PORT),
            username: non_empty_var("SMTP_USER"),
            password: non_empty_var("SMTP_PASS"),
            from: non_empty_var("SMTP_FROM").unwrap_or_else(|| DEFAULT_SMTP_FROM.to_string()),
            tls: env::var("SMTP_TLS")
                .map(|v| v == "true" || v == "1")
                .unwrap_or(true),
        });

        let whatsapp = match (non_empty_var("WHATSAPP_API_URL"), non_empty_var("WHATSAPP_API_KEY")) {
            (Some(api_url), Some(api_key)) => Some(WhatsAppSettings {
                api_url,
                api_key,
                sender: non_empty_var("WHATSAPP_SENDER"),
            }),
            _ => None,
        };

        Self {
            jwt_secret,
            jwt_expiration_hours: parsed_var("JWT_EXPIRATION_HOURS", DEFAULT_JWT_EXPIRATION_HOURS),
            server_host: env::var("SERVER_HOST")
                .unwrap_or_else(|_| DEFAULT_SERVER_HOST.to_string()),
            server_port: parsed_var("SERVER_PORT", DEFAULT_SERVER_PORT),
            mysql_url: non_empty_var("MYSQL_URL"),
            hosted_database_url: non_empty_var("HOSTED_DATABASE_URL"),
            rest_api_url: non_empty_var("REST_API_URL"),
            rest_api_token: non_empty_var("REST_API_TOKEN"),
            local_store_path: match env::var("LOCAL_STORE_PATH") {
                Ok(v) if v == ":memory:" => None,
                Ok(v) if !v.trim().is_empty() => Some(PathBuf::from(v)),
                _ => Some(PathBuf::from(DEFAULT_LOCAL_STORE_PATH)),
            },
            redis_url: non_empty_var("REDIS_URL"),
            exchange_rates_url: non_empty_var("EXCHANGE_RATES_URL")
                .unwrap_or_else(|| DEFAULT_EXCHANGE_RATES_URL.to_string()),
            exchange_rates_ttl_seconds: parsed_var(
                "EXCHANGE_RATES_TTL_SECONDS",
                DEFAULT_EXCHANGE_RATES_TTL_SECONDS,
            ),
            health_probe_interval_seconds: parsed_var(
                "HEALTH_PROBE_INTERVAL_SECONDS",
                DEFAULT_HEALTH_PROBE_INTERVAL_SECONDS,
            ),
            backend_failure_threshold: parsed_var(
                "BACKEND_FAILURE_THRESHOLD",
                DEFAULT_BACKEND_FAILURE_THRESHOLD,
            )
            .max(1),
            http_timeout_seconds: parsed_var("HTTP_TIMEOUT_SECONDS", DEFAULT_HTTP_TIMEOUT_SECONDS),
            gateways: GatewaySettings { smtp, whatsapp },
            bootstrap_admin_email: non_empty_var("BOOTSTRAP_ADMIN_EMAIL"),
            bootstrap_admin_password: non_empty_var("BOOTSTRAP_ADMIN_PASSWORD"),
        }
    }

    /// Configuration for tests: local store only, in memory.
    pub fn for_tests(jwt_secret: impl Into<String>) -> Self {
        Self {
            jwt_secret: jwt_secret.into(),
            jwt_expiration_hours: DEFAULT_JWT_EXPIRATION_HOURS,
            server_host: DEFAULT_SERVER_HOST.to_string(),
            server_port: DEFAULT_SERVER_PORT,
            mysql_url: None,
            hosted_database_url: None,
            rest_api_url: None,
            rest_api_token: None,
            local_store_path: None,
            redis_url: None,
            exchange_rates_url: DEFAULT_EXCHANGE_RATES_URL.to_string(),
            exchange_rates_ttl_seconds: DEFAULT_EXCHANGE_RATES_TTL_SECONDS,
            health_probe_interval_seconds: DEFAULT_HEALTH_PROBE_INTERVAL_SECONDS,
            backend_failure_threshold: DEFAULT_BACKEND_FAILURE_THRESHOLD,
            http_timeout_seconds: DEFAULT_HTTP_TIMEOUT_SECONDS,
            gateways: GatewaySettings::default(),
            bootstrap_admin_email: None,
            bootstrap_admin_password: None,
        }
    }

    /// Get JWT secret bytes for token signing/verification.
    pub fn jwt_secret_bytes(&self) -> &[u8] {
        self.jwt_secret.as_bytes()
    }

    /// Service token presented to the companion REST API.
    pub fn rest_api_token(&self) -> Option<&str> {
        self.rest_api_token.as_deref()
    }

    /// Credentials of the admin seeded into an empty local store.
    pub fn bootstrap_admin(&self) -> Option<(&str, &str)> {
        match (&self.bootstrap_admin_email, &self.bootstrap_admin_password) {
            (Some(email), Some(password)) => Some((email.as_str(), password.as_str())),
            _ => None,
        }
    }

    /// Get the full server address.
    pub fn server_addr(&self) -> String {
        format!("{}:{}", self.server_host, self.server_port)
    }
}
