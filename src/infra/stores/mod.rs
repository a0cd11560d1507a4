//! Store adapters - one per storage tier.
//!
//! Every backend exposes the same operation set so the data service can
//! swap between them without the callers noticing.

pub(crate) mod entities;
mod local_store;
mod rest_store;
mod sql_store;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::domain::{Invoice, InvoiceFilter, NewUser, User, UserChanges};
use crate::errors::AppResult;

pub use local_store::{LocalDocument, LocalStore, WalEntry, WalOp};
pub use rest_store::RestStore;
pub use sql_store::SqlStore;

#[cfg(any(test, feature = "test-utils"))]
use mockall::automock;

/// Storage tiers, in fallback priority order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    MySql,
    Hosted,
    Rest,
    Local,
}

impl BackendKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            BackendKind::MySql => "mysql",
            BackendKind::Hosted => "hosted",
            BackendKind::Rest => "rest",
            BackendKind::Local => "local",
        }
    }

    pub fn is_remote(&self) -> bool {
        !matches!(self, BackendKind::Local)
    }
}

impl std::fmt::Display for BackendKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Operations every storage tier supports.
///
/// Stores persist what they are given: ids and timestamps on invoices are
/// set by the domain layer, never by the adapter.
#[cfg_attr(any(test, feature = "test-utils"), automock)]
#[async_trait]
pub trait Store: Send + Sync {
    fn kind(&self) -> BackendKind;

    /// Cheap connectivity check
    async fn ping(&self) -> AppResult<()>;

    /// Return the user when the email/password pair is valid.
    async fn verify_credentials(&self, email: &str, password: &str) -> AppResult<Option<User>>;

    async fn find_user(&self, id: Uuid) -> AppResult<Option<User>>;

    async fn find_user_by_email(&self, email: &str) -> AppResult<Option<User>>;

    async fn list_users(&self) -> AppResult<Vec<User>>;

    /// Create a user, hashing (or forwarding) the plain password.
    async fn create_user(&self, user: NewUser) -> AppResult<User>;

    async fn update_user(&self, id: Uuid, changes: UserChanges) -> AppResult<User>;

    async fn set_password(&self, id: Uuid, password: &str) -> AppResult<()>;

    async fn delete_user(&self, id: Uuid) -> AppResult<()>;

    async fn get_invoice(&self, id: Uuid) -> AppResult<Option<Invoice>>;

    /// Newest first. A filter with `query` set is a search.
    async fn list_invoices(&self, filter: InvoiceFilter) -> AppResult<Vec<Invoice>>;

    async fn create_invoice(&self, invoice: &Invoice) -> AppResult<Invoice>;

    async fn update_invoice(&self, invoice: &Invoice) -> AppResult<Invoice>;

    async fn delete_invoice(&self, id: Uuid) -> AppResult<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backend_priority_order() {
        let mut kinds = vec![
            BackendKind::Local,
            BackendKind::Rest,
            BackendKind::MySql,
            BackendKind::Hosted,
        ];
        kinds.sort();
        assert_eq!(
            kinds,
            vec![
                BackendKind::MySql,
                BackendKind::Hosted,
                BackendKind::Rest,
                BackendKind::Local
            ]
        );
        assert!(!BackendKind::Local.is_remote());
    }

    #[test]
    fn test_backend_kind_serialization() {
        assert_eq!(serde_json::to_string(&BackendKind::MySql).unwrap(), "\"mysql\"");
    }
}
