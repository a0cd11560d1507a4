//! Application services layer - Use cases and business logic.
//!
//! Every service reaches storage through [`DataService`]; none of them
//! knows which backend tier answers.

mod auth_service;
pub mod container;
mod currency_service;
pub mod data_service;
mod invoice_service;
mod reset_service;
mod user_service;

pub use container::Services;
pub use data_service::{BackendHealth, DataService, HealthState, ReplayReport, SyncStatus, TierStatus};

pub use auth_service::{AuthService, Authenticator, Claims, TokenResponse};
pub use currency_service::{Conversion, CurrencyService, HttpRateFetcher, RateFetcher, RatesCache};
pub use invoice_service::{CreateInvoiceRequest, InvoiceManager, InvoiceService, StatusUpdate};
pub use reset_service::{ResetManager, ResetService};
pub use user_service::{AdminUserUpdate, ProfileUpdate, UserManager, UserService};

#[cfg(any(test, feature = "test-utils"))]
pub use currency_service::MockRateFetcher;
