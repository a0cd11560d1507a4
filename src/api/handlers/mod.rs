//! HTTP request handlers.

pub mod auth_handler;
pub mod invoice_handler;
pub mod rates_handler;
pub mod settings_handler;
pub mod sync_handler;
pub mod user_handler;

pub use auth_handler::auth_routes;
pub use invoice_handler::invoice_routes;
pub use rates_handler::rates_routes;
pub use settings_handler::settings_routes;
pub use sync_handler::sync_routes;
pub use user_handler::user_routes;
