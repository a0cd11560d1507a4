//! Domain layer - Core business entities and logic
//!
//! Invoices and their totals engine, users and credentials, exchange
//! rates and password reset tokens. Nothing here touches a backend.

pub mod currency;
pub mod invoice;
pub mod password;
pub mod reset;
pub mod totals;
pub mod user;

pub use currency::{ExchangeRates, RateSource};
pub use invoice::{
    Invoice, InvoiceDraft, InvoiceFilter, InvoiceItem, InvoiceStatus, ItemInput, Party,
};
pub use password::Password;
pub use reset::{ResetChannel, ResetState, ResetToken};
pub use totals::Totals;
pub use user::{Actor, NewUser, User, UserChanges, UserResponse, UserRole};
