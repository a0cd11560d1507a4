//! Data service: the single entry point to storage.
//!
//! Remote tiers are tried in priority order (MySQL, hosted, REST) with the
//! local store as the last resort. Each remote tier carries a health state:
//!
//! ```text
//! Unknown --ok--> Healthy
//! Unknown/Healthy --fail--> Degraded(1) --fail--> ... --fail--> Down
//! Down --successful probe--> Healthy
//! ```
//!
//! Down tiers are skipped until the health monitor re-promotes them.
//! Invoice writes that no remote tier accepts are applied locally and
//! appended to the write-ahead log, which is replayed against the first
//! available tier once one comes back.

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::config::GatewaySettings;
use crate::domain::{
    Invoice, InvoiceDraft, InvoiceFilter, NewUser, Password, ResetToken, User, UserChanges,
};
use crate::errors::{AppError, AppResult};
use crate::infra::{BackendKind, LocalStore, Store, WalEntry, WalOp};

/// Health of one remote tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendHealth {
    Unknown,
    Healthy,
    /// Consecutive backend failures below the threshold
    Degraded(u32),
    Down,
}

impl BackendHealth {
    pub fn on_success(self) -> Self {
        match self {
            BackendHealth::Down => BackendHealth::Down,
            _ => BackendHealth::Healthy,
        }
    }

    pub fn on_failure(self, threshold: u32) -> Self {
        let failures = match self {
            BackendHealth::Unknown | BackendHealth::Healthy => 1,
            BackendHealth::Degraded(n) => n + 1,
            BackendHealth::Down => return BackendHealth::Down,
        };
        if failures >= threshold {
            BackendHealth::Down
        } else {
            BackendHealth::Degraded(failures)
        }
    }

    pub fn on_probe_success(self) -> Self {
        BackendHealth::Healthy
    }

    pub fn is_down(&self) -> bool {
        matches!(self, BackendHealth::Down)
    }

    pub fn state(&self) -> HealthState {
        match self {
            BackendHealth::Unknown => HealthState::Unknown,
            BackendHealth::Healthy => HealthState::Healthy,
            BackendHealth::Degraded(_) => HealthState::Degraded,
            BackendHealth::Down => HealthState::Down,
        }
    }

    pub fn failures(&self) -> u32 {
        match self {
            BackendHealth::Degraded(n) => *n,
            _ => 0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum HealthState {
    Unknown,
    Healthy,
    Degraded,
    Down,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct TierStatus {
    pub kind: BackendKind,
    pub state: HealthState,
    pub consecutive_failures: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct SyncStatus {
    /// Tier serving requests right now
    pub active: BackendKind,
    pub tiers: Vec<TierStatus>,
    /// Offline mutations waiting for replay
    pub pending_wal: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct ReplayReport {
    pub target: Option<BackendKind>,
    pub applied: usize,
    pub conflicts: usize,
    pub remaining: usize,
}

/// How one WAL entry was settled.
enum Settled {
    Applied,
    Conflict,
}

struct Tier {
    store: Arc<dyn Store>,
    health: Mutex<BackendHealth>,
}

impl Tier {
    fn kind(&self) -> BackendKind {
        self.store.kind()
    }

    fn health(&self) -> BackendHealth {
        *self.health.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Swap the state, returning the previous one.
    fn transition(&self, f: impl FnOnce(BackendHealth) -> BackendHealth) -> (BackendHealth, BackendHealth) {
        let mut health = self.health.lock().unwrap_or_else(|e| e.into_inner());
        let before = *health;
        *health = f(before);
        (before, *health)
    }
}

pub struct DataService {
    tiers: Vec<Tier>,
    local: Arc<LocalStore>,
    failure_threshold: u32,
    replay_lock: tokio::sync::Mutex<()>,
}

impl DataService {
    /// Remote stores are ordered by tier priority; the local store is
    /// always the final fallback.
    pub fn new(remotes: Vec<Arc<dyn Store>>, local: Arc<LocalStore>, failure_threshold: u32) -> Self {
        let mut tiers: Vec<Tier> = remotes
            .into_iter()
            .filter(|store| {
                let remote = store.kind().is_remote();
                if !remote {
                    tracing::warn!("Ignoring local store passed as a remote tier");
                }
                remote
            })
            .map(|store| Tier {
                store,
                health: Mutex::new(BackendHealth::Unknown),
            })
            .collect();
        tiers.sort_by_key(|tier| tier.kind());

        Self {
            tiers,
            local,
            failure_threshold: failure_threshold.max(1),
            replay_lock: tokio::sync::Mutex::new(()),
        }
    }

    /// Local store only.
    pub fn local_only(local: Arc<LocalStore>) -> Self {
        Self::new(Vec::new(), local, 1)
    }

    pub fn local(&self) -> &LocalStore {
        &self.local
    }

    pub fn has_remote(&self) -> bool {
        !self.tiers.is_empty()
    }

    pub fn health_of(&self, kind: BackendKind) -> Option<BackendHealth> {
        self.tiers
            .iter()
            .find(|tier| tier.kind() == kind)
            .map(Tier::health)
    }

    // =========================================================================
    // Health
    // =========================================================================

    fn available(&self) -> impl Iterator<Item = &Tier> + '_ {
        self.tiers.iter().filter(|tier| !tier.health().is_down())
    }

    fn record_success(&self, tier: &Tier) {
        let (before, after) = tier.transition(BackendHealth::on_success);
        if before != after {
            tracing::info!(backend = %tier.kind(), from = ?before, to = ?after, "Backend health changed");
        }
    }

    fn record_failure(&self, tier: &Tier, error: &AppError) {
        if !error.is_backend_failure() {
            return;
        }
        let threshold = self.failure_threshold;
        let (before, after) = tier.transition(|h| h.on_failure(threshold));
        if after.is_down() && !before.is_down() {
            tracing::error!(backend = %tier.kind(), error = %error, "Backend marked down");
        } else {
            tracing::warn!(backend = %tier.kind(), health = ?after, error = %error, "Backend failure recorded");
        }
    }

    /// Ping every remote tier once and record the outcome. Leaves the
    /// write-ahead log alone.
    pub async fn check_tiers(&self) {
        for tier in &self.tiers {
            match tier.store.ping().await {
                Ok(()) => self.record_success(tier),
                Err(e) => self.record_failure(tier, &e),
            }
        }
    }

    /// Ping every remote tier once, replay pending offline changes and
    /// report the selected primary.
    pub async fn initialize(&self) -> BackendKind {
        self.check_tiers().await;

        if self.local.wal_len().await > 0 {
            if let Err(e) = self.replay().await {
                tracing::warn!(error = %e, "Startup replay of offline changes failed");
            }
        }

        let active = self.active_backend().await;
        tracing::info!(backend = %active, tiers = self.tiers.len(), "Data service initialized");
        active
    }

    /// The tier that currently serves requests.
    pub async fn active_backend(&self) -> BackendKind {
        if self.local.wal_len().await > 0 {
            return BackendKind::Local;
        }
        self.available()
            .next()
            .map(Tier::kind)
            .unwrap_or(BackendKind::Local)
    }

    /// Ping tiers that are not healthy; a successful ping re-promotes the
    /// tier and triggers a replay of pending offline changes.
    pub async fn probe(&self) {
        let mut recovered = false;
        for tier in &self.tiers {
            if tier.health() == BackendHealth::Healthy {
                continue;
            }
            match tier.store.ping().await {
                Ok(()) => {
                    let (before, _) = tier.transition(BackendHealth::on_probe_success);
                    tracing::info!(backend = %tier.kind(), from = ?before, "Backend re-promoted after probe");
                    recovered = true;
                }
                Err(e) => self.record_failure(tier, &e),
            }
        }

        let pending = self.local.wal_len().await;
        if pending > 0 && (recovered || self.available().next().is_some()) {
            match self.replay().await {
                Ok(report) => tracing::info!(
                    applied = report.applied,
                    conflicts = report.conflicts,
                    remaining = report.remaining,
                    "Replayed offline changes"
                ),
                Err(e) => tracing::warn!(error = %e, pending, "Replay after probe failed"),
            }
        }
    }

    /// Run `probe` on a fixed interval in the background.
    pub fn spawn_health_monitor(self: Arc<Self>, interval: Duration) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            // first tick fires immediately
            ticker.tick().await;
            loop {
                ticker.tick().await;
                self.probe().await;
            }
        })
    }

    pub async fn status(&self) -> SyncStatus {
        let mut tiers: Vec<TierStatus> = self
            .tiers
            .iter()
            .map(|tier| {
                let health = tier.health();
                TierStatus {
                    kind: tier.kind(),
                    state: health.state(),
                    consecutive_failures: health.failures(),
                }
            })
            .collect();
        tiers.push(TierStatus {
            kind: BackendKind::Local,
            state: HealthState::Healthy,
            consecutive_failures: 0,
        });

        SyncStatus {
            active: self.active_backend().await,
            tiers,
            pending_wal: self.local.wal_len().await,
        }
    }

    // =========================================================================
    // Dispatch
    // =========================================================================

    /// Try available remote tiers in order. `None` means none of them
    /// answered; domain errors are an answer.
    async fn try_remotes<T, F, Fut>(&self, op: &'static str, f: &F) -> Option<AppResult<T>>
    where
        F: Fn(Arc<dyn Store>) -> Fut,
        Fut: Future<Output = AppResult<T>>,
    {
        for tier in self.available() {
            match f(tier.store.clone()).await {
                Ok(value) => {
                    self.record_success(tier);
                    return Some(Ok(value));
                }
                Err(e) if e.is_backend_failure() => {
                    self.record_failure(tier, &e);
                    tracing::warn!(backend = %tier.kind(), op, "Backend failed, trying next tier");
                }
                Err(e) => return Some(Err(e)),
            }
        }
        None
    }

    fn local_dyn(&self) -> Arc<dyn Store> {
        self.local.clone()
    }

    /// Remote tiers may serve invoice data only when no offline change is
    /// pending; this replays the log first when possible.
    async fn ensure_synced(&self) -> bool {
        if self.local.wal_len().await == 0 {
            return true;
        }
        if self.available().next().is_none() {
            return false;
        }
        match self.replay().await {
            Ok(report) => report.remaining == 0,
            Err(e) => {
                tracing::debug!(error = %e, "Offline changes still pending");
                false
            }
        }
    }

    async fn read<T, F, Fut>(&self, op: &'static str, needs_sync: bool, f: F) -> AppResult<T>
    where
        F: Fn(Arc<dyn Store>) -> Fut,
        Fut: Future<Output = AppResult<T>>,
    {
        if !needs_sync || self.ensure_synced().await {
            if let Some(result) = self.try_remotes(op, &f).await {
                return result;
            }
        }
        if self.has_remote() {
            tracing::debug!(op, "Serving from local store");
        }
        f(self.local_dyn()).await
    }

    /// User mutations need an authoritative backend.
    async fn write_user<T, F, Fut>(&self, op: &'static str, f: F) -> AppResult<T>
    where
        F: Fn(Arc<dyn Store>) -> Fut,
        Fut: Future<Output = AppResult<T>>,
    {
        if !self.has_remote() {
            return f(self.local_dyn()).await;
        }
        match self.try_remotes(op, &f).await {
            Some(result) => result,
            None => Err(AppError::unavailable(format!(
                "no remote backend available for {}",
                op
            ))),
        }
    }

    async fn mirror_user(&self, user: &User) {
        if let Err(e) = self.local.mirror_user(user).await {
            tracing::warn!(user_id = %user.id, error = %e, "Failed to mirror user into local store");
        }
    }

    async fn mirror_invoice(&self, invoice: &Invoice) {
        if let Err(e) = self.local.mirror_invoice(invoice).await {
            tracing::warn!(invoice_id = %invoice.id, error = %e, "Failed to mirror invoice into local store");
        }
    }

    // =========================================================================
    // Users
    // =========================================================================

    pub async fn login(&self, email: &str, password: &str) -> AppResult<Option<User>> {
        let user = self
            .read("login", false, |store| async move {
                store.verify_credentials(email, password).await
            })
            .await?;

        if self.has_remote() {
            if let Some(user) = &user {
                let mut mirrored = user.clone();
                if mirrored.password_hash.is_empty() {
                    // keep offline login possible for tiers that hide hashes
                    if let Ok(hash) = Password::new(password) {
                        mirrored.password_hash = hash.into_string();
                    }
                }
                self.mirror_user(&mirrored).await;
            }
        }
        Ok(user)
    }

    pub async fn find_user(&self, id: Uuid) -> AppResult<Option<User>> {
        self.read("find_user", false, |store| async move { store.find_user(id).await })
            .await
    }

    pub async fn find_user_by_email(&self, email: &str) -> AppResult<Option<User>> {
        self.read("find_user_by_email", false, |store| async move {
            store.find_user_by_email(email).await
        })
        .await
    }

    pub async fn list_users(&self) -> AppResult<Vec<User>> {
        self.read("list_users", false, |store| async move { store.list_users().await })
            .await
    }

    pub async fn create_user(&self, new_user: NewUser) -> AppResult<User> {
        let user = self
            .write_user("create_user", |store| {
                let new_user = new_user.clone();
                async move { store.create_user(new_user).await }
            })
            .await?;

        if self.has_remote() {
            let mut mirrored = user.clone();
            if mirrored.password_hash.is_empty() {
                if let Ok(hash) = Password::new(&new_user.password) {
                    mirrored.password_hash = hash.into_string();
                }
            }
            self.mirror_user(&mirrored).await;
        }
        Ok(user)
    }

    pub async fn update_user(&self, id: Uuid, changes: UserChanges) -> AppResult<User> {
        let user = self
            .write_user("update_user", |store| {
                let changes = changes.clone();
                async move { store.update_user(id, changes).await }
            })
            .await?;

        if self.has_remote() {
            self.mirror_user(&user).await;
        }
        Ok(user)
    }

    pub async fn set_password(&self, id: Uuid, password: &str) -> AppResult<()> {
        self.write_user("set_password", |store| async move {
            store.set_password(id, password).await
        })
        .await?;

        if self.has_remote() {
            if let Ok(Some(_)) = self.local.find_user(id).await {
                if let Err(e) = self.local.set_password(id, password).await {
                    tracing::warn!(user_id = %id, error = %e, "Failed to update mirrored password");
                }
            }
        }
        Ok(())
    }

    pub async fn delete_user(&self, id: Uuid) -> AppResult<()> {
        self.write_user("delete_user", |store| async move { store.delete_user(id).await })
            .await?;

        if self.has_remote() {
            if let Err(e) = self.local.forget_user(id).await {
                tracing::warn!(user_id = %id, error = %e, "Failed to drop mirrored user");
            }
        }
        Ok(())
    }

    // =========================================================================
    // Invoices
    // =========================================================================

    pub async fn get_invoice(&self, id: Uuid) -> AppResult<Option<Invoice>> {
        self.read("get_invoice", true, |store| async move { store.get_invoice(id).await })
            .await
    }

    pub async fn list_invoices(&self, filter: InvoiceFilter) -> AppResult<Vec<Invoice>> {
        self.read("list_invoices", true, |store| {
            let filter = filter.clone();
            async move { store.list_invoices(filter).await }
        })
        .await
    }

    pub async fn create_invoice(&self, invoice: &Invoice) -> AppResult<Invoice> {
        if !self.has_remote() {
            return self.local.create_invoice(invoice).await;
        }

        if self.ensure_synced().await {
            let outcome = self
                .try_remotes("create_invoice", &|store: Arc<dyn Store>| async move {
                    store.create_invoice(invoice).await
                })
                .await;
            if let Some(result) = outcome {
                let created = result?;
                self.mirror_invoice(&created).await;
                return Ok(created);
            }
        }

        if self.local.get_invoice(invoice.id).await?.is_some() {
            return Err(AppError::conflict("Invoice"));
        }
        let entry = self.local.record_upsert(invoice).await?;
        tracing::warn!(invoice_id = %invoice.id, seq = entry.seq, "Invoice created offline");
        Ok(invoice.clone())
    }

    pub async fn update_invoice(&self, invoice: &Invoice) -> AppResult<Invoice> {
        if !self.has_remote() {
            return self.local.update_invoice(invoice).await;
        }

        if self.ensure_synced().await {
            let outcome = self
                .try_remotes("update_invoice", &|store: Arc<dyn Store>| async move {
                    store.update_invoice(invoice).await
                })
                .await;
            if let Some(result) = outcome {
                let updated = result?;
                self.mirror_invoice(&updated).await;
                return Ok(updated);
            }
        }

        if self.local.get_invoice(invoice.id).await?.is_none() {
            return Err(AppError::NotFound);
        }
        let entry = self.local.record_upsert(invoice).await?;
        tracing::warn!(invoice_id = %invoice.id, seq = entry.seq, "Invoice updated offline");
        Ok(invoice.clone())
    }

    pub async fn delete_invoice(&self, id: Uuid) -> AppResult<()> {
        if !self.has_remote() {
            return self.local.delete_invoice(id).await;
        }

        if self.ensure_synced().await {
            let outcome = self
                .try_remotes("delete_invoice", &|store: Arc<dyn Store>| async move {
                    store.delete_invoice(id).await
                })
                .await;
            if let Some(result) = outcome {
                result?;
                if let Err(e) = self.local.forget_invoice(id).await {
                    tracing::warn!(invoice_id = %id, error = %e, "Failed to drop mirrored invoice");
                }
                return Ok(());
            }
        }

        let entry = self.local.record_delete(id).await?;
        tracing::warn!(invoice_id = %id, seq = entry.seq, "Invoice deleted offline");
        Ok(())
    }

    // =========================================================================
    // Write-ahead log replay
    // =========================================================================

    pub async fn pending_changes(&self) -> Vec<WalEntry> {
        self.local.wal_entries().await
    }

    /// Replay offline changes, in `seq` order, against the first available
    /// remote tier. Stops at the first backend failure.
    pub async fn replay(&self) -> AppResult<ReplayReport> {
        let _guard = self.replay_lock.lock().await;

        let entries = self.local.wal_entries().await;
        if entries.is_empty() {
            return Ok(ReplayReport::default());
        }
        let Some(target) = self.available().next() else {
            return Err(AppError::unavailable("no remote backend to replay against"));
        };

        let mut report = ReplayReport {
            target: Some(target.kind()),
            ..Default::default()
        };
        // remote versions written by this replay count as the new base;
        // acks persist them into the remaining entries
        let mut written: HashMap<Uuid, DateTime<Utc>> = HashMap::new();
        let mut interrupted = false;

        for entry in &entries {
            match self.settle(target.store.as_ref(), entry, &mut written).await {
                Ok(Settled::Applied) => report.applied += 1,
                Ok(Settled::Conflict) => report.conflicts += 1,
                Err(e) if e.is_backend_failure() => {
                    self.record_failure(target, &e);
                    tracing::warn!(backend = %target.kind(), seq = entry.seq, error = %e, "Replay interrupted");
                    interrupted = true;
                    break;
                }
                Err(e) => {
                    // the remote will never accept this entry; its state wins
                    tracing::warn!(seq = entry.seq, error = %e, "Offline change rejected by remote");
                    self.restore_mirror(target.store.as_ref(), entry.op.invoice_id()).await;
                    report.conflicts += 1;
                }
            }
            let id = entry.op.invoice_id();
            let rebase = written.get(&id).map(|at| (id, *at));
            self.local.ack_wal(entry.seq, rebase).await?;
        }

        if !interrupted {
            self.record_success(target);
        }
        report.remaining = self.local.wal_len().await;
        tracing::info!(
            backend = %target.kind(),
            applied = report.applied,
            conflicts = report.conflicts,
            remaining = report.remaining,
            "Write-ahead log replayed"
        );
        Ok(report)
    }

    async fn settle(
        &self,
        target: &dyn Store,
        entry: &WalEntry,
        written: &mut HashMap<Uuid, DateTime<Utc>>,
    ) -> AppResult<Settled> {
        let id = entry.op.invoice_id();
        let remote = target.get_invoice(id).await?;
        let base = match (entry.op.base_updated_at(), written.get(&id)) {
            (Some(base), Some(w)) => Some(base.max(*w)),
            (base, w) => base.or(w.copied()),
        };
        let unchanged = |remote: &Invoice| base.map_or(false, |b| remote.updated_at <= b);

        match &entry.op {
            WalOp::Upsert { invoice, .. } => match remote {
                None => {
                    let stored = target.create_invoice(invoice).await?;
                    written.insert(id, stored.updated_at);
                    self.mirror_invoice(&stored).await;
                    Ok(Settled::Applied)
                }
                Some(remote) if unchanged(&remote) => {
                    let stored = target.update_invoice(invoice).await?;
                    written.insert(id, stored.updated_at);
                    self.mirror_invoice(&stored).await;
                    Ok(Settled::Applied)
                }
                Some(remote) => {
                    if invoice.updated_at > remote.updated_at {
                        let stored = target.update_invoice(invoice).await?;
                        written.insert(id, stored.updated_at);
                        self.mirror_invoice(&stored).await;
                    } else {
                        self.mirror_invoice(&remote).await;
                    }
                    tracing::info!(invoice_id = %id, seq = entry.seq, "Replay conflict resolved by last write");
                    Ok(Settled::Conflict)
                }
            },
            WalOp::Delete { .. } => match remote {
                None => Ok(Settled::Applied),
                Some(remote) if unchanged(&remote) => {
                    match target.delete_invoice(id).await {
                        Ok(()) | Err(AppError::NotFound) => {}
                        Err(e) => return Err(e),
                    }
                    written.remove(&id);
                    Ok(Settled::Applied)
                }
                Some(remote) => {
                    self.mirror_invoice(&remote).await;
                    tracing::info!(invoice_id = %id, seq = entry.seq, "Delete lost to a newer remote version");
                    Ok(Settled::Conflict)
                }
            },
        }
    }

    async fn restore_mirror(&self, target: &dyn Store, id: Uuid) {
        match target.get_invoice(id).await {
            Ok(Some(remote)) => self.mirror_invoice(&remote).await,
            Ok(None) => {
                if let Err(e) = self.local.forget_invoice(id).await {
                    tracing::warn!(invoice_id = %id, error = %e, "Failed to drop mirrored invoice");
                }
            }
            Err(e) => tracing::warn!(invoice_id = %id, error = %e, "Failed to refresh mirrored invoice"),
        }
    }

    // =========================================================================
    // Local-only state
    // =========================================================================

    pub async fn get_draft(&self, user_id: Uuid) -> Option<InvoiceDraft> {
        self.local.get_draft(user_id).await
    }

    pub async fn save_draft(&self, user_id: Uuid, draft: InvoiceDraft) -> AppResult<()> {
        self.local.save_draft(user_id, draft).await
    }

    pub async fn clear_draft(&self, user_id: Uuid) -> AppResult<()> {
        self.local.clear_draft(user_id).await
    }

    pub async fn save_reset_token(&self, token: ResetToken) -> AppResult<()> {
        self.local.save_reset_token(token).await
    }

    pub async fn find_reset_token(&self, token: &str) -> Option<ResetToken> {
        self.local.find_reset_token(token).await
    }

    pub async fn prune_reset_tokens(&self, now: DateTime<Utc>) -> AppResult<usize> {
        self.local.prune_reset_tokens(now).await
    }

    pub async fn gateway_settings(&self) -> Option<GatewaySettings> {
        self.local.gateway_settings().await
    }

    pub async fn save_gateway_settings(&self, settings: GatewaySettings) -> AppResult<()> {
        self.local.save_gateway_settings(settings).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::UserRole;
    use crate::infra::MockStore;

    fn mock(kind: BackendKind) -> MockStore {
        let mut store = MockStore::new();
        store.expect_kind().return_const(kind);
        store
    }

    fn user() -> User {
        User::new("a@example.com".into(), String::new(), "A".into(), UserRole::Member)
    }

    #[test]
    fn test_health_transitions() {
        let h = BackendHealth::Unknown;
        assert_eq!(h.on_success(), BackendHealth::Healthy);
        assert_eq!(h.on_failure(3), BackendHealth::Degraded(1));
        assert_eq!(BackendHealth::Degraded(1).on_failure(3), BackendHealth::Degraded(2));
        assert_eq!(BackendHealth::Degraded(2).on_failure(3), BackendHealth::Down);
        assert_eq!(BackendHealth::Healthy.on_failure(1), BackendHealth::Down);
        // only the health monitor brings a down tier back
        assert_eq!(BackendHealth::Down.on_success(), BackendHealth::Down);
        assert_eq!(BackendHealth::Down.on_probe_success(), BackendHealth::Healthy);
    }

    #[tokio::test]
    async fn test_tiers_sorted_by_priority() {
        let rest: Arc<dyn Store> = Arc::new(mock(BackendKind::Rest));
        let mysql: Arc<dyn Store> = Arc::new(mock(BackendKind::MySql));
        let service = DataService::new(vec![rest, mysql], Arc::new(LocalStore::in_memory()), 3);

        let status = service.status().await;
        let kinds: Vec<BackendKind> = status.tiers.iter().map(|t| t.kind).collect();
        assert_eq!(kinds, vec![BackendKind::MySql, BackendKind::Rest, BackendKind::Local]);
        assert_eq!(status.active, BackendKind::MySql);
    }

    #[tokio::test]
    async fn test_read_falls_through_on_backend_failure() {
        let mut mysql = mock(BackendKind::MySql);
        mysql
            .expect_find_user()
            .returning(|_| Err(AppError::unavailable("connection refused")));
        let mut hosted = mock(BackendKind::Hosted);
        let expected = user();
        let returned = expected.clone();
        hosted
            .expect_find_user()
            .times(1)
            .returning(move |_| Ok(Some(returned.clone())));

        let service = DataService::new(
            vec![Arc::new(mysql), Arc::new(hosted)],
            Arc::new(LocalStore::in_memory()),
            3,
        );

        let found = service.find_user(expected.id).await.unwrap();
        assert_eq!(found, Some(expected));
        assert_eq!(service.health_of(BackendKind::MySql), Some(BackendHealth::Degraded(1)));
        assert_eq!(service.health_of(BackendKind::Hosted), Some(BackendHealth::Healthy));
    }

    #[tokio::test]
    async fn test_domain_error_does_not_fall_through() {
        let mut mysql = mock(BackendKind::MySql);
        mysql
            .expect_delete_user()
            .times(1)
            .returning(|_| Err(AppError::NotFound));
        let mut rest = mock(BackendKind::Rest);
        rest.expect_delete_user().never();

        let service = DataService::new(
            vec![Arc::new(mysql), Arc::new(rest)],
            Arc::new(LocalStore::in_memory()),
            3,
        );

        let err = service.delete_user(Uuid::new_v4()).await.unwrap_err();
        assert!(matches!(err, AppError::NotFound));
        assert_eq!(service.health_of(BackendKind::MySql), Some(BackendHealth::Unknown));
    }

    #[tokio::test]
    async fn test_down_tier_is_skipped() {
        let mut mysql = mock(BackendKind::MySql);
        mysql
            .expect_list_users()
            .times(2)
            .returning(|| Err(AppError::unavailable("timeout")));

        let service = DataService::new(vec![Arc::new(mysql)], Arc::new(LocalStore::in_memory()), 2);

        // two failures reach the threshold, the third call never hits mysql
        for _ in 0..3 {
            assert!(service.list_users().await.unwrap().is_empty());
        }
        assert_eq!(service.health_of(BackendKind::MySql), Some(BackendHealth::Down));
        assert_eq!(service.active_backend().await, BackendKind::Local);
    }

    #[tokio::test]
    async fn test_user_writes_require_remote() {
        let mut mysql = mock(BackendKind::MySql);
        mysql
            .expect_update_user()
            .returning(|_, _| Err(AppError::unavailable("down")));

        let service = DataService::new(vec![Arc::new(mysql)], Arc::new(LocalStore::in_memory()), 3);

        let err = service
            .update_user(Uuid::new_v4(), UserChanges::default())
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Unavailable(_)));
    }
}
