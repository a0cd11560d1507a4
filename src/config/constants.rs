//! Application-wide constants
//!
//! Centralized location for magic values to improve maintainability.

// =============================================================================
// Pagination
// =============================================================================

/// Default number of items per page
pub const DEFAULT_PAGE_SIZE: u64 = 20;

/// Maximum allowed items per page to prevent excessive queries
pub const MAX_PAGE_SIZE: u64 = 100;

/// Default starting page number (1-indexed)
pub const DEFAULT_PAGE_NUMBER: u64 = 1;

// =============================================================================
// Authentication & Security
// =============================================================================

/// Default JWT token expiration in hours
pub const DEFAULT_JWT_EXPIRATION_HOURS: i64 = 24;

/// Minimum JWT secret length (security requirement)
pub const MIN_JWT_SECRET_LENGTH: usize = 32;

/// Seconds per hour (for token expiration calculation)
pub const SECONDS_PER_HOUR: i64 = 3600;

/// Authorization header prefix for Bearer tokens
pub const BEARER_TOKEN_PREFIX: &str = "Bearer ";

/// JWT token type identifier
pub const TOKEN_TYPE_BEARER: &str = "Bearer";

// =============================================================================
// User Roles
// =============================================================================

/// Default role assigned to new users
pub const ROLE_MEMBER: &str = "member";

/// Administrator role with elevated privileges
pub const ROLE_ADMIN: &str = "admin";

// =============================================================================
// Server Configuration
// =============================================================================

/// Default server host address
pub const DEFAULT_SERVER_HOST: &str = "0.0.0.0";

/// Default server port
pub const DEFAULT_SERVER_PORT: u16 = 3000;

// =============================================================================
// Storage backends
// =============================================================================

/// Default path of the local store document
pub const DEFAULT_LOCAL_STORE_PATH: &str = "./data/local_store.json";

/// Consecutive backend failures before a tier is marked down
pub const DEFAULT_BACKEND_FAILURE_THRESHOLD: u32 = 3;

/// Interval between health probes of remote tiers
pub const DEFAULT_HEALTH_PROBE_INTERVAL_SECONDS: u64 = 30;

/// Timeout applied to every outbound HTTP request
pub const DEFAULT_HTTP_TIMEOUT_SECONDS: u64 = 10;

// =============================================================================
// Cache (Redis)
// =============================================================================

/// Cache key prefix for rate limiting
pub const CACHE_PREFIX_RATE_LIMIT: &str = "rate_limit:";

/// Cache key holding the shared exchange-rate snapshot
pub const CACHE_KEY_EXCHANGE_RATES: &str = "exchange_rates:usd";

// =============================================================================
// Rate Limiting
// =============================================================================

/// Default rate limit: requests per window
pub const RATE_LIMIT_REQUESTS: u64 = 100;

/// Default rate limit window in seconds (1 minute)
pub const RATE_LIMIT_WINDOW_SECONDS: u64 = 60;

/// Stricter rate limit for auth endpoints: requests per window
pub const RATE_LIMIT_AUTH_REQUESTS: u64 = 10;

/// Auth rate limit window in seconds (1 minute)
pub const RATE_LIMIT_AUTH_WINDOW_SECONDS: u64 = 60;

// =============================================================================
// Exchange rates
// =============================================================================

/// Default exchange-rate source (USD base)
pub const DEFAULT_EXCHANGE_RATES_URL: &str = "https://open.er-api.com/v6/latest/USD";

/// Exchange rates are refreshed after 30 minutes
pub const DEFAULT_EXCHANGE_RATES_TTL_SECONDS: u64 = 1800;

/// Pivot currency for conversions
pub const BASE_CURRENCY: &str = "USD";

// =============================================================================
// Password reset
// =============================================================================

/// Reset tokens expire one hour after creation
pub const RESET_TOKEN_TTL_SECONDS: i64 = 3600;

/// Random bytes per reset token (hex encoded to twice the length)
pub const RESET_TOKEN_BYTES: usize = 32;

/// Default SMTP port
pub const DEFAULT_SMTP_PORT: u16 = 587;

/// Default sender for outgoing mail
pub const DEFAULT_SMTP_FROM: &str = "noreply@example.com";

// =============================================================================
// Validation
// =============================================================================

/// Minimum password length requirement
pub const MIN_PASSWORD_LENGTH: u64 = 8;

/// Maximum percentage accepted for tax and discount rates
pub const MAX_RATE_PERCENT: u32 = 100;

/// Decimal places kept for monetary amounts
pub const MONEY_SCALE: u32 = 2;

/// Decimal places accepted on tax and discount rates (`DECIMAL(7,4)` columns)
pub const MAX_RATE_SCALE: u32 = 4;

/// Decimal places accepted on item quantities
pub const MAX_QUANTITY_SCALE: u32 = 2;

/// Decimal places accepted on unit prices. Together with the quantity limit
/// this keeps line totals and subtotals within the six places of the SQL
/// `subtotal` and `total` columns.
pub const MAX_PRICE_SCALE: u32 = 4;
