//! Tier failover, offline logging and replay against a remote tier that
//! can be switched off.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration as StdDuration;

use async_trait::async_trait;
use chrono::{Duration, Utc};
use rust_decimal_macros::dec;
use uuid::Uuid;

use invoice_desk::domain::{
    Invoice, InvoiceDraft, InvoiceFilter, ItemInput, NewUser, Party, User, UserChanges, UserRole,
};
use invoice_desk::errors::{AppError, AppResult};
use invoice_desk::infra::{BackendKind, LocalStore, Store};
use invoice_desk::services::{BackendHealth, DataService};

const UNLIMITED: usize = usize::MAX;

/// A remote tier backed by an in-memory store that can be taken offline,
/// or made to fail after a number of calls.
struct SwitchableStore {
    inner: LocalStore,
    online: AtomicBool,
    calls_left: AtomicUsize,
    /// Stamp `updated_at` on writes, the way the REST tier does
    restamp: bool,
}

impl SwitchableStore {
    fn new() -> Self {
        Self {
            inner: LocalStore::in_memory(),
            online: AtomicBool::new(true),
            calls_left: AtomicUsize::new(UNLIMITED),
            restamp: false,
        }
    }

    fn restamping() -> Self {
        Self {
            restamp: true,
            ..Self::new()
        }
    }

    fn set_online(&self, online: bool) {
        self.calls_left.store(UNLIMITED, Ordering::SeqCst);
        self.online.store(online, Ordering::SeqCst);
    }

    /// Come back online, but drop the connection after `calls` calls.
    fn fail_after(&self, calls: usize) {
        self.calls_left.store(calls, Ordering::SeqCst);
        self.online.store(true, Ordering::SeqCst);
    }

    fn check(&self) -> AppResult<()> {
        let allowed = self.online.load(Ordering::SeqCst)
            && self
                .calls_left
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |left| match left {
                    UNLIMITED => Some(left),
                    0 => None,
                    n => Some(n - 1),
                })
                .is_ok();
        if allowed {
            Ok(())
        } else {
            Err(AppError::unavailable("connection refused"))
        }
    }

    fn stamped(&self, invoice: &Invoice) -> Invoice {
        let mut stored = invoice.clone();
        if self.restamp {
            stored.updated_at = Utc::now();
        }
        stored
    }
}

#[async_trait]
impl Store for SwitchableStore {
    fn kind(&self) -> BackendKind {
        BackendKind::MySql
    }

    async fn ping(&self) -> AppResult<()> {
        self.check()
    }

    async fn verify_credentials(&self, email: &str, password: &str) -> AppResult<Option<User>> {
        self.check()?;
        self.inner.verify_credentials(email, password).await
    }

    async fn find_user(&self, id: Uuid) -> AppResult<Option<User>> {
        self.check()?;
        self.inner.find_user(id).await
    }

    async fn find_user_by_email(&self, email: &str) -> AppResult<Option<User>> {
        self.check()?;
        self.inner.find_user_by_email(email).await
    }

    async fn list_users(&self) -> AppResult<Vec<User>> {
        self.check()?;
        self.inner.list_users().await
    }

    async fn create_user(&self, user: NewUser) -> AppResult<User> {
        self.check()?;
        self.inner.create_user(user).await
    }

    async fn update_user(&self, id: Uuid, changes: UserChanges) -> AppResult<User> {
        self.check()?;
        self.inner.update_user(id, changes).await
    }

    async fn set_password(&self, id: Uuid, password: &str) -> AppResult<()> {
        self.check()?;
        self.inner.set_password(id, password).await
    }

    async fn delete_user(&self, id: Uuid) -> AppResult<()> {
        self.check()?;
        self.inner.delete_user(id).await
    }

    async fn get_invoice(&self, id: Uuid) -> AppResult<Option<Invoice>> {
        self.check()?;
        self.inner.get_invoice(id).await
    }

    async fn list_invoices(&self, filter: InvoiceFilter) -> AppResult<Vec<Invoice>> {
        self.check()?;
        self.inner.list_invoices(filter).await
    }

    async fn create_invoice(&self, invoice: &Invoice) -> AppResult<Invoice> {
        self.check()?;
        self.inner.create_invoice(&self.stamped(invoice)).await
    }

    async fn update_invoice(&self, invoice: &Invoice) -> AppResult<Invoice> {
        self.check()?;
        self.inner.update_invoice(&self.stamped(invoice)).await
    }

    async fn delete_invoice(&self, id: Uuid) -> AppResult<()> {
        self.check()?;
        self.inner.delete_invoice(id).await
    }
}

fn draft(number: &str) -> InvoiceDraft {
    InvoiceDraft {
        number: number.into(),
        company: Party {
            name: "Acme".into(),
            ..Default::default()
        },
        client: Party {
            name: "Globex".into(),
            ..Default::default()
        },
        items: vec![ItemInput {
            description: "Support".into(),
            quantity: dec!(3),
            unit_price: dec!(40),
        }],
        tax_rate: dec!(0),
        discount_rate: dec!(0),
        currency: "EUR".into(),
        locale: None,
        theme: None,
        notes: None,
        issue_date: None,
        due_date: None,
    }
}

async fn setup_with_threshold(
    threshold: u32,
) -> (Arc<SwitchableStore>, Arc<LocalStore>, DataService) {
    setup_remote(SwitchableStore::new(), threshold).await
}

async fn setup_remote(
    remote: SwitchableStore,
    threshold: u32,
) -> (Arc<SwitchableStore>, Arc<LocalStore>, DataService) {
    let remote = Arc::new(remote);
    let local = Arc::new(LocalStore::in_memory());
    let data = DataService::new(vec![remote.clone() as Arc<dyn Store>], local.clone(), threshold);
    assert_eq!(data.initialize().await, BackendKind::MySql);
    (remote, local, data)
}

async fn setup() -> (Arc<SwitchableStore>, Arc<LocalStore>, DataService) {
    setup_with_threshold(1).await
}

#[tokio::test]
async fn test_online_writes_go_to_remote_and_are_mirrored() {
    let (remote, local, data) = setup().await;
    let invoice = Invoice::new(Uuid::new_v4(), draft("INV-1")).unwrap();

    data.create_invoice(&invoice).await.unwrap();

    assert!(remote.inner.get_invoice(invoice.id).await.unwrap().is_some());
    assert!(local.get_invoice(invoice.id).await.unwrap().is_some());
    assert!(data.pending_changes().await.is_empty());
}

#[tokio::test]
async fn test_offline_write_is_logged_and_replayed_after_recovery() {
    let (remote, _local, data) = setup().await;
    let owner = Uuid::new_v4();
    let online = Invoice::new(owner, draft("INV-1")).unwrap();
    data.create_invoice(&online).await.unwrap();

    remote.set_online(false);
    let offline = Invoice::new(owner, draft("INV-2")).unwrap();
    data.create_invoice(&offline).await.unwrap();

    assert_eq!(data.health_of(BackendKind::MySql), Some(BackendHealth::Down));
    assert_eq!(data.active_backend().await, BackendKind::Local);
    assert_eq!(data.pending_changes().await.len(), 1);

    // reads are served locally and include both invoices
    let listed = data
        .list_invoices(InvoiceFilter {
            owner_id: Some(owner),
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(listed.len(), 2);

    remote.set_online(true);
    data.probe().await;

    assert_eq!(data.health_of(BackendKind::MySql), Some(BackendHealth::Healthy));
    assert!(data.pending_changes().await.is_empty());
    assert_eq!(data.active_backend().await, BackendKind::MySql);
    assert!(remote.inner.get_invoice(offline.id).await.unwrap().is_some());
}

#[tokio::test]
async fn test_tier_check_leaves_pending_changes_in_the_log() {
    let (remote, local, data) = setup().await;
    remote.set_online(false);
    let offline = Invoice::new(Uuid::new_v4(), draft("INV-9")).unwrap();
    data.create_invoice(&offline).await.unwrap();
    assert_eq!(data.pending_changes().await.len(), 1);

    // a fresh service over the same stores, as `sync status` builds it
    remote.set_online(true);
    let inspect = DataService::new(vec![remote.clone() as Arc<dyn Store>], local.clone(), 1);
    inspect.check_tiers().await;

    assert_eq!(inspect.health_of(BackendKind::MySql), Some(BackendHealth::Healthy));
    let status = inspect.status().await;
    assert_eq!(status.active, BackendKind::Local);
    assert_eq!(status.pending_wal, 1);
    assert!(remote.inner.get_invoice(offline.id).await.unwrap().is_none());

    assert_eq!(inspect.initialize().await, BackendKind::MySql);
    assert!(inspect.pending_changes().await.is_empty());
    assert!(remote.inner.get_invoice(offline.id).await.unwrap().is_some());
}

#[tokio::test]
async fn test_replay_without_remote_keeps_log() {
    let (remote, _local, data) = setup().await;
    remote.set_online(false);

    let invoice = Invoice::new(Uuid::new_v4(), draft("INV-3")).unwrap();
    data.create_invoice(&invoice).await.unwrap();

    let err = data.replay().await.unwrap_err();
    assert!(matches!(err, AppError::Unavailable(_)));
    assert_eq!(data.pending_changes().await.len(), 1);
}

#[tokio::test]
async fn test_newer_remote_version_wins_replay_conflict() {
    let (remote, local, data) = setup().await;
    let mut invoice = Invoice::new(Uuid::new_v4(), draft("INV-4")).unwrap();
    data.create_invoice(&invoice).await.unwrap();

    remote.set_online(false);
    invoice.apply(draft("INV-4-offline")).unwrap();
    data.update_invoice(&invoice).await.unwrap();

    // someone else edits the remote copy later than the offline edit
    let mut theirs = invoice.clone();
    theirs.number = "INV-4-remote".into();
    theirs.updated_at = Utc::now() + Duration::minutes(1);
    remote.inner.update_invoice(&theirs).await.unwrap();

    remote.set_online(true);
    data.probe().await;

    assert!(data.pending_changes().await.is_empty());
    let stored = remote.inner.get_invoice(invoice.id).await.unwrap().unwrap();
    assert_eq!(stored.number, "INV-4-remote");
    let mirrored = local.get_invoice(invoice.id).await.unwrap().unwrap();
    assert_eq!(mirrored.number, "INV-4-remote");
}

#[tokio::test]
async fn test_offline_delete_is_replayed() {
    // one failure leaves the tier degraded, so it stays a replay target
    let (remote, local, data) = setup_with_threshold(2).await;
    let invoice = Invoice::new(Uuid::new_v4(), draft("INV-5")).unwrap();
    data.create_invoice(&invoice).await.unwrap();

    remote.set_online(false);
    data.delete_invoice(invoice.id).await.unwrap();
    assert_eq!(data.health_of(BackendKind::MySql), Some(BackendHealth::Degraded(1)));
    assert!(local.get_invoice(invoice.id).await.unwrap().is_none());

    remote.set_online(true);
    let report = data.replay().await.unwrap();
    assert_eq!(report.target, Some(BackendKind::MySql));
    assert_eq!(report.applied, 1);
    assert_eq!(report.conflicts, 0);
    assert!(remote.inner.get_invoice(invoice.id).await.unwrap().is_none());
}

#[tokio::test]
async fn test_users_mirrored_for_offline_login() {
    let (remote, _local, data) = setup().await;
    data.create_user(NewUser {
        email: "clerk@example.com".into(),
        password: "Password123".into(),
        name: "Clerk".into(),
        role: UserRole::Member,
        phone: None,
    })
    .await
    .unwrap();

    remote.set_online(false);
    let user = data.login("clerk@example.com", "Password123").await.unwrap();
    assert!(user.is_some());

    // account changes need a remote tier
    let err = data
        .update_user(user.unwrap().id, UserChanges::default())
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Unavailable(_)));
}

#[tokio::test]
async fn test_replay_stops_at_backend_failure_and_keeps_the_rest() {
    // a high threshold keeps the tier a replay target throughout
    let (remote, _local, data) = setup_with_threshold(10).await;
    remote.set_online(false);
    let owner = Uuid::new_v4();
    let invoices: Vec<Invoice> = ["INV-A", "INV-B", "INV-C"]
        .into_iter()
        .map(|number| Invoice::new(owner, draft(number)).unwrap())
        .collect();
    for invoice in &invoices {
        data.create_invoice(invoice).await.unwrap();
    }
    let logged = data.pending_changes().await;
    assert_eq!(logged.len(), 3);

    // first entry takes a lookup and a create, then the link drops
    remote.fail_after(2);
    let report = data.replay().await.unwrap();
    assert_eq!(report.applied, 1);
    assert_eq!(report.remaining, 2);

    let pending = data.pending_changes().await;
    assert_eq!(
        pending.iter().map(|e| e.seq).collect::<Vec<_>>(),
        logged[1..].iter().map(|e| e.seq).collect::<Vec<_>>()
    );
    assert!(remote.inner.get_invoice(invoices[0].id).await.unwrap().is_some());
    assert!(remote.inner.get_invoice(invoices[1].id).await.unwrap().is_none());

    remote.set_online(true);
    let report = data.replay().await.unwrap();
    assert_eq!(report.applied, 2);
    assert_eq!(report.remaining, 0);
}

#[tokio::test]
async fn test_interrupted_replay_keeps_later_edits_of_the_same_invoice() {
    let (remote, _local, data) = setup_remote(SwitchableStore::restamping(), 10).await;
    let mut invoice = Invoice::new(Uuid::new_v4(), draft("INV-6")).unwrap();
    invoice = data.create_invoice(&invoice).await.unwrap();

    remote.set_online(false);
    invoice.apply(draft("INV-6-first")).unwrap();
    data.update_invoice(&invoice).await.unwrap();
    invoice.apply(draft("INV-6-second")).unwrap();
    data.update_invoice(&invoice).await.unwrap();
    assert_eq!(data.pending_changes().await.len(), 2);

    // the first edit lands and is restamped by the remote, then the link drops
    remote.fail_after(2);
    let report = data.replay().await.unwrap();
    assert_eq!(report.applied, 1);
    assert_eq!(report.remaining, 1);

    remote.set_online(true);
    let report = data.replay().await.unwrap();
    assert_eq!(report.applied, 1);
    assert_eq!(report.conflicts, 0);
    let stored = remote.inner.get_invoice(invoice.id).await.unwrap().unwrap();
    assert_eq!(stored.number, "INV-6-second");
}

#[tokio::test]
async fn test_newer_local_version_wins_replay_conflict() {
    let (remote, local, data) = setup().await;
    let mut invoice = Invoice::new(Uuid::new_v4(), draft("INV-7")).unwrap();
    data.create_invoice(&invoice).await.unwrap();

    remote.set_online(false);
    invoice.apply(draft("INV-7-offline")).unwrap();
    invoice.updated_at = Utc::now() + Duration::minutes(5);
    data.update_invoice(&invoice).await.unwrap();

    // the remote copy changed too, but earlier than the offline edit
    let mut theirs = invoice.clone();
    theirs.number = "INV-7-remote".into();
    theirs.updated_at = Utc::now() + Duration::minutes(1);
    remote.inner.update_invoice(&theirs).await.unwrap();

    remote.set_online(true);
    let report = data.replay().await;
    // the tier is down after one failure, so the health check does the replay
    assert!(report.is_err());
    data.probe().await;

    assert!(data.pending_changes().await.is_empty());
    let stored = remote.inner.get_invoice(invoice.id).await.unwrap().unwrap();
    assert_eq!(stored.number, "INV-7-offline");
    let mirrored = local.get_invoice(invoice.id).await.unwrap().unwrap();
    assert_eq!(mirrored.number, "INV-7-offline");
}

#[tokio::test]
async fn test_offline_delete_loses_to_newer_remote_version() {
    let (remote, local, data) = setup_with_threshold(2).await;
    let invoice = Invoice::new(Uuid::new_v4(), draft("INV-8")).unwrap();
    data.create_invoice(&invoice).await.unwrap();

    remote.set_online(false);
    data.delete_invoice(invoice.id).await.unwrap();

    let mut theirs = invoice.clone();
    theirs.number = "INV-8-remote".into();
    theirs.updated_at = Utc::now() + Duration::minutes(1);
    remote.inner.update_invoice(&theirs).await.unwrap();

    remote.set_online(true);
    let report = data.replay().await.unwrap();
    assert_eq!(report.applied, 0);
    assert_eq!(report.conflicts, 1);
    assert!(remote.inner.get_invoice(invoice.id).await.unwrap().is_some());
    // the surviving remote version is restored locally
    let mirrored = local.get_invoice(invoice.id).await.unwrap().unwrap();
    assert_eq!(mirrored.number, "INV-8-remote");
}

#[tokio::test]
async fn test_health_monitor_repromotes_and_replays() {
    let (remote, _local, data) = setup().await;
    let data = Arc::new(data);
    remote.set_online(false);
    let invoice = Invoice::new(Uuid::new_v4(), draft("INV-10")).unwrap();
    data.create_invoice(&invoice).await.unwrap();
    assert_eq!(data.health_of(BackendKind::MySql), Some(BackendHealth::Down));

    let monitor = data.clone().spawn_health_monitor(StdDuration::from_millis(20));
    remote.set_online(true);

    let mut recovered = false;
    for _ in 0..100 {
        tokio::time::sleep(StdDuration::from_millis(20)).await;
        if data.health_of(BackendKind::MySql) == Some(BackendHealth::Healthy)
            && data.pending_changes().await.is_empty()
        {
            recovered = true;
            break;
        }
    }
    monitor.abort();

    assert!(recovered, "monitor did not re-promote the tier");
    assert!(remote.inner.get_invoice(invoice.id).await.unwrap().is_some());
    assert_eq!(data.active_backend().await, BackendKind::MySql);
}
