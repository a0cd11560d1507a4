//! Infrastructure layer - External systems integration
//!
//! - Database connections and migrations (SeaORM)
//! - Store adapters for every storage tier
//! - Redis cache
//! - Outbound notification gateways (SMTP, WhatsApp)

pub mod cache;
pub mod db;
pub mod notifier;
pub mod stores;

pub use cache::Cache;
pub use db::{Database, MigrationState, Migrator};
pub use notifier::{EmailNotifier, Notifier, WhatsAppNotifier};
pub use stores::{BackendKind, LocalStore, RestStore, SqlStore, Store, WalEntry, WalOp};

#[cfg(any(test, feature = "test-utils"))]
pub use stores::MockStore;
