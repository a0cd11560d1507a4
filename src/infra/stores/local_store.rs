//! Local store: a single JSON document on disk, or in memory only.
//!
//! Besides the user/invoice tables it holds state that only ever lives on
//! this instance: per-user drafts, reset tokens, gateway settings and the
//! write-ahead log of mutations made while every remote tier was down.
//!
//! Writes go to a copy of the document, which is persisted (temp file +
//! rename) before it replaces the in-memory state.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use uuid::Uuid;

use super::{BackendKind, Store};
use crate::config::GatewaySettings;
use crate::domain::invoice::sort_newest_first;
use crate::domain::password::verify_for;
use crate::domain::user::normalize_email;
use crate::domain::{
    Invoice, InvoiceDraft, InvoiceFilter, NewUser, Password, ResetToken, User, UserChanges,
    UserRole,
};
use crate::errors::{AppError, AppResult, OptionExt};

/// A mutation recorded while offline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WalOp {
    Upsert {
        invoice: Invoice,
        /// `updated_at` of the last version seen on a remote tier.
        base_updated_at: Option<DateTime<Utc>>,
    },
    Delete {
        id: Uuid,
        base_updated_at: Option<DateTime<Utc>>,
    },
}

impl WalOp {
    pub fn invoice_id(&self) -> Uuid {
        match self {
            WalOp::Upsert { invoice, .. } => invoice.id,
            WalOp::Delete { id, .. } => *id,
        }
    }

    pub fn base_updated_at(&self) -> Option<DateTime<Utc>> {
        match self {
            WalOp::Upsert { base_updated_at, .. } | WalOp::Delete { base_updated_at, .. } => {
                *base_updated_at
            }
        }
    }

    fn rebase(&mut self, at: DateTime<Utc>) {
        match self {
            WalOp::Upsert { base_updated_at, .. } | WalOp::Delete { base_updated_at, .. } => {
                *base_updated_at = Some(at);
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WalEntry {
    pub seq: u64,
    pub recorded_at: DateTime<Utc>,
    pub op: WalOp,
}

/// Everything the local store persists.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LocalDocument {
    #[serde(default)]
    pub users: BTreeMap<Uuid, User>,
    #[serde(default)]
    pub invoices: BTreeMap<Uuid, Invoice>,
    #[serde(default)]
    pub drafts: BTreeMap<Uuid, InvoiceDraft>,
    #[serde(default)]
    pub reset_tokens: Vec<ResetToken>,
    #[serde(default)]
    pub gateways: Option<GatewaySettings>,
    #[serde(default)]
    pub wal: Vec<WalEntry>,
    /// Last sequence number handed out; never reused.
    #[serde(default)]
    pub last_seq: u64,
}

impl LocalDocument {
    fn user_by_email(&self, email: &str) -> Option<&User> {
        let email = normalize_email(email);
        self.users.values().find(|u| u.email == email)
    }

    /// Base version for a new WAL entry on this invoice. A pending entry
    /// keeps the base it was recorded with.
    fn base_for(&self, id: Uuid) -> Option<DateTime<Utc>> {
        match self.wal.iter().find(|entry| entry.op.invoice_id() == id) {
            Some(entry) => entry.op.base_updated_at(),
            None => self.invoices.get(&id).map(|invoice| invoice.updated_at),
        }
    }

    fn push_wal(&mut self, op: WalOp) -> WalEntry {
        self.last_seq += 1;
        let entry = WalEntry {
            seq: self.last_seq,
            recorded_at: Utc::now(),
            op,
        };
        self.wal.push(entry.clone());
        entry
    }
}

pub struct LocalStore {
    path: Option<PathBuf>,
    doc: RwLock<LocalDocument>,
}

impl LocalStore {
    /// Open the document at `path`, or start empty if it does not exist.
    /// `None` keeps everything in memory.
    pub async fn open(path: Option<PathBuf>) -> AppResult<Self> {
        let doc = match &path {
            Some(path) => Self::load(path).await?,
            None => LocalDocument::default(),
        };

        tracing::info!(
            path = ?path,
            users = doc.users.len(),
            invoices = doc.invoices.len(),
            pending_wal = doc.wal.len(),
            "Local store opened"
        );

        Ok(Self {
            path,
            doc: RwLock::new(doc),
        })
    }

    pub fn in_memory() -> Self {
        Self {
            path: None,
            doc: RwLock::new(LocalDocument::default()),
        }
    }

    async fn load(path: &Path) -> AppResult<LocalDocument> {
        match tokio::fs::read(path).await {
            Ok(bytes) if bytes.is_empty() => Ok(LocalDocument::default()),
            Ok(bytes) => Ok(serde_json::from_slice(&bytes)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(LocalDocument::default()),
            Err(e) => Err(e.into()),
        }
    }

    async fn persist(&self, doc: &LocalDocument) -> AppResult<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }
        let bytes = serde_json::to_vec_pretty(doc)?;
        let tmp = path.with_extension("tmp");
        tokio::fs::write(&tmp, bytes).await?;
        tokio::fs::rename(&tmp, path).await?;
        Ok(())
    }

    async fn read<T>(&self, f: impl FnOnce(&LocalDocument) -> T) -> T {
        let doc = self.doc.read().await;
        f(&doc)
    }

    /// Apply `f` to a copy, persist it, then swap it in.
    async fn mutate<T>(&self, f: impl FnOnce(&mut LocalDocument) -> AppResult<T>) -> AppResult<T> {
        let mut doc = self.doc.write().await;
        let mut next = doc.clone();
        let out = f(&mut next)?;
        self.persist(&next).await?;
        *doc = next;
        Ok(out)
    }

    // =========================================================================
    // Mirror
    // =========================================================================

    /// Cache a remote invoice version.
    pub async fn mirror_invoice(&self, invoice: &Invoice) -> AppResult<()> {
        let invoice = invoice.clone();
        self.mutate(|doc| {
            doc.invoices.insert(invoice.id, invoice);
            Ok(())
        })
        .await
    }

    pub async fn forget_invoice(&self, id: Uuid) -> AppResult<()> {
        self.mutate(|doc| {
            doc.invoices.remove(&id);
            Ok(())
        })
        .await
    }

    /// Cache a remote user. Records without a hash keep the local one.
    pub async fn mirror_user(&self, user: &User) -> AppResult<()> {
        let mut user = user.clone();
        self.mutate(|doc| {
            if user.password_hash.is_empty() {
                if let Some(existing) = doc.users.get(&user.id) {
                    user.password_hash = existing.password_hash.clone();
                }
            }
            // the email is unique; drop a stale record under another id
            doc.users.retain(|id, u| *id == user.id || u.email != user.email);
            doc.users.insert(user.id, user);
            Ok(())
        })
        .await
    }

    pub async fn forget_user(&self, id: Uuid) -> AppResult<()> {
        self.mutate(|doc| {
            doc.users.remove(&id);
            Ok(())
        })
        .await
    }

    // =========================================================================
    // Write-ahead log
    // =========================================================================

    /// Apply an offline upsert locally and log it, in one write.
    pub async fn record_upsert(&self, invoice: &Invoice) -> AppResult<WalEntry> {
        let invoice = invoice.clone();
        self.mutate(|doc| {
            let base_updated_at = doc.base_for(invoice.id);
            doc.invoices.insert(invoice.id, invoice.clone());
            Ok(doc.push_wal(WalOp::Upsert {
                invoice,
                base_updated_at,
            }))
        })
        .await
    }

    /// Apply an offline delete locally and log it, in one write.
    pub async fn record_delete(&self, id: Uuid) -> AppResult<WalEntry> {
        self.mutate(|doc| {
            if !doc.invoices.contains_key(&id) {
                return Err(AppError::NotFound);
            }
            let base_updated_at = doc.base_for(id);
            doc.invoices.remove(&id);
            Ok(doc.push_wal(WalOp::Delete { id, base_updated_at }))
        })
        .await
    }

    /// Pending entries in `seq` order.
    pub async fn wal_entries(&self) -> Vec<WalEntry> {
        self.read(|doc| {
            let mut entries = doc.wal.clone();
            entries.sort_by_key(|entry| entry.seq);
            entries
        })
        .await
    }

    pub async fn wal_len(&self) -> usize {
        self.read(|doc| doc.wal.len()).await
    }

    /// Drop every entry up to and including `seq`. When the acked entry
    /// left a new version of an invoice on the remote, `written` carries its
    /// id and `updated_at`; later entries for that invoice take it as their
    /// base, in the same write.
    pub async fn ack_wal(&self, seq: u64, written: Option<(Uuid, DateTime<Utc>)>) -> AppResult<()> {
        self.mutate(|doc| {
            doc.wal.retain(|entry| entry.seq > seq);
            if let Some((id, at)) = written {
                doc.wal
                    .iter_mut()
                    .filter(|entry| entry.op.invoice_id() == id)
                    .for_each(|entry| entry.op.rebase(at));
            }
            Ok(())
        })
        .await
    }

    // =========================================================================
    // Drafts
    // =========================================================================

    pub async fn get_draft(&self, user_id: Uuid) -> Option<InvoiceDraft> {
        self.read(|doc| doc.drafts.get(&user_id).cloned()).await
    }

    pub async fn save_draft(&self, user_id: Uuid, draft: InvoiceDraft) -> AppResult<()> {
        self.mutate(|doc| {
            doc.drafts.insert(user_id, draft);
            Ok(())
        })
        .await
    }

    pub async fn clear_draft(&self, user_id: Uuid) -> AppResult<()> {
        self.mutate(|doc| {
            doc.drafts.remove(&user_id);
            Ok(())
        })
        .await
    }

    // =========================================================================
    // Reset tokens
    // =========================================================================

    pub async fn save_reset_token(&self, token: ResetToken) -> AppResult<()> {
        self.mutate(|doc| {
            doc.reset_tokens.retain(|t| t.token != token.token);
            doc.reset_tokens.push(token);
            Ok(())
        })
        .await
    }

    pub async fn find_reset_token(&self, token: &str) -> Option<ResetToken> {
        self.read(|doc| doc.reset_tokens.iter().find(|t| t.token == token).cloned())
            .await
    }

    /// Remove used and expired tokens, returning how many were dropped.
    pub async fn prune_reset_tokens(&self, now: DateTime<Utc>) -> AppResult<usize> {
        self.mutate(|doc| {
            let before = doc.reset_tokens.len();
            doc.reset_tokens.retain(|t| !t.is_stale(now));
            Ok(before - doc.reset_tokens.len())
        })
        .await
    }

    // =========================================================================
    // Gateway settings
    // =========================================================================

    pub async fn gateway_settings(&self) -> Option<GatewaySettings> {
        self.read(|doc| doc.gateways.clone()).await
    }

    pub async fn save_gateway_settings(&self, settings: GatewaySettings) -> AppResult<()> {
        self.mutate(|doc| {
            doc.gateways = Some(settings);
            Ok(())
        })
        .await
    }

    /// Create the configured admin account if the email is not taken.
    /// Returns whether a user was created.
    pub async fn seed_admin(&self, email: &str, password: &str, name: &str) -> AppResult<bool> {
        if self.find_user_by_email(email).await?.is_some() {
            return Ok(false);
        }
        self.create_user(NewUser {
            email: email.to_string(),
            password: password.to_string(),
            name: name.to_string(),
            role: UserRole::Admin,
            phone: None,
        })
        .await?;
        tracing::info!(email = %email, "Bootstrap admin created in local store");
        Ok(true)
    }
}

#[async_trait]
impl Store for LocalStore {
    fn kind(&self) -> BackendKind {
        BackendKind::Local
    }

    async fn ping(&self) -> AppResult<()> {
        Ok(())
    }

    async fn verify_credentials(&self, email: &str, password: &str) -> AppResult<Option<User>> {
        let user = self.find_user_by_email(email).await?;
        let valid = verify_for(user.as_ref().map(|u| u.password_hash.as_str()), password);
        Ok(user.filter(|_| valid))
    }

    async fn find_user(&self, id: Uuid) -> AppResult<Option<User>> {
        Ok(self.read(|doc| doc.users.get(&id).cloned()).await)
    }

    async fn find_user_by_email(&self, email: &str) -> AppResult<Option<User>> {
        Ok(self.read(|doc| doc.user_by_email(email).cloned()).await)
    }

    async fn list_users(&self) -> AppResult<Vec<User>> {
        let mut users: Vec<User> = self.read(|doc| doc.users.values().cloned().collect()).await;
        users.sort_by_key(|u| u.created_at);
        Ok(users)
    }

    async fn create_user(&self, new_user: NewUser) -> AppResult<User> {
        let hash = Password::new(&new_user.password)?;
        let mut user = User::new(
            normalize_email(&new_user.email),
            hash.into_string(),
            new_user.name,
            new_user.role,
        );
        user.phone = new_user.phone;

        self.mutate(|doc| {
            if doc.user_by_email(&user.email).is_some() {
                return Err(AppError::conflict("User with this email"));
            }
            doc.users.insert(user.id, user.clone());
            Ok(user)
        })
        .await
    }

    async fn update_user(&self, id: Uuid, changes: UserChanges) -> AppResult<User> {
        self.mutate(|doc| {
            let user = doc.users.get_mut(&id).ok_or_not_found()?;
            user.apply(changes);
            Ok(user.clone())
        })
        .await
    }

    async fn set_password(&self, id: Uuid, password: &str) -> AppResult<()> {
        let hash = Password::new(password)?;
        self.mutate(|doc| {
            let user = doc.users.get_mut(&id).ok_or_not_found()?;
            user.password_hash = hash.into_string();
            user.updated_at = Utc::now();
            Ok(())
        })
        .await
    }

    async fn delete_user(&self, id: Uuid) -> AppResult<()> {
        self.mutate(|doc| {
            doc.users.remove(&id).ok_or_not_found()?;
            doc.drafts.remove(&id);
            Ok(())
        })
        .await
    }

    async fn get_invoice(&self, id: Uuid) -> AppResult<Option<Invoice>> {
        Ok(self.read(|doc| doc.invoices.get(&id).cloned()).await)
    }

    async fn list_invoices(&self, filter: InvoiceFilter) -> AppResult<Vec<Invoice>> {
        let mut invoices: Vec<Invoice> = self
            .read(|doc| {
                doc.invoices
                    .values()
                    .filter(|invoice| invoice.matches(&filter))
                    .cloned()
                    .collect()
            })
            .await;
        sort_newest_first(&mut invoices);
        Ok(invoices)
    }

    async fn create_invoice(&self, invoice: &Invoice) -> AppResult<Invoice> {
        let invoice = invoice.clone();
        self.mutate(|doc| {
            if doc.invoices.contains_key(&invoice.id) {
                return Err(AppError::conflict("Invoice"));
            }
            doc.invoices.insert(invoice.id, invoice.clone());
            Ok(invoice)
        })
        .await
    }

    async fn update_invoice(&self, invoice: &Invoice) -> AppResult<Invoice> {
        let invoice = invoice.clone();
        self.mutate(|doc| {
            let slot = doc.invoices.get_mut(&invoice.id).ok_or_not_found()?;
            *slot = invoice.clone();
            Ok(invoice)
        })
        .await
    }

    async fn delete_invoice(&self, id: Uuid) -> AppResult<()> {
        self.mutate(|doc| {
            doc.invoices.remove(&id).ok_or_not_found()?;
            Ok(())
        })
        .await
    }
}
