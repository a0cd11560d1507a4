//! Invoice service - ownership rules over the data service.
//!
//! Members only see and edit their own invoices; a lookup of someone
//! else's invoice reads as not found. Admins see everything and may
//! create invoices on behalf of another user.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

use crate::domain::{Actor, Invoice, InvoiceDraft, InvoiceFilter, InvoiceStatus};
use crate::errors::{AppError, AppResult};
use crate::services::DataService;
use crate::types::{Paginated, PaginationParams};

/// Body of `POST /api/invoices`.
#[derive(Debug, Clone, Serialize, Deserialize, Validate, ToSchema)]
pub struct CreateInvoiceRequest {
    /// Client-generated id, kept when offline clients sync their work
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<Uuid>,
    /// Owner override; only honoured for admins
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owner_id: Option<Uuid>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<InvoiceStatus>,
    #[serde(flatten)]
    #[validate(nested)]
    pub draft: InvoiceDraft,
}

impl CreateInvoiceRequest {
    pub fn new(draft: InvoiceDraft) -> Self {
        Self {
            id: None,
            owner_id: None,
            status: None,
            draft,
        }
    }
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct StatusUpdate {
    pub status: InvoiceStatus,
}

#[async_trait]
pub trait InvoiceService: Send + Sync {
    async fn list(
        &self,
        actor: Actor,
        filter: InvoiceFilter,
        page: PaginationParams,
    ) -> AppResult<Paginated<Invoice>>;

    async fn search(&self, actor: Actor, query: &str) -> AppResult<Vec<Invoice>>;

    async fn get(&self, actor: Actor, id: Uuid) -> AppResult<Invoice>;

    async fn create(&self, actor: Actor, request: CreateInvoiceRequest) -> AppResult<Invoice>;

    async fn update(&self, actor: Actor, id: Uuid, draft: InvoiceDraft) -> AppResult<Invoice>;

    async fn update_status(&self, actor: Actor, id: Uuid, status: InvoiceStatus) -> AppResult<Invoice>;

    async fn delete(&self, actor: Actor, id: Uuid) -> AppResult<()>;

    /// Autosaved editor state of the actor
    async fn get_draft(&self, actor: Actor) -> AppResult<Option<InvoiceDraft>>;

    async fn save_draft(&self, actor: Actor, draft: InvoiceDraft) -> AppResult<()>;

    async fn clear_draft(&self, actor: Actor) -> AppResult<()>;
}

pub struct InvoiceManager {
    data: Arc<DataService>,
}

impl InvoiceManager {
    pub fn new(data: Arc<DataService>) -> Self {
        Self { data }
    }

    /// Members are always confined to their own invoices.
    fn scope(actor: Actor, mut filter: InvoiceFilter) -> InvoiceFilter {
        if !actor.is_admin() {
            filter.owner_id = Some(actor.id);
        }
        filter.query = filter.query.filter(|q| !q.trim().is_empty());
        filter
    }

    async fn owned(&self, actor: Actor, id: Uuid) -> AppResult<Invoice> {
        match self.data.get_invoice(id).await? {
            Some(invoice) if actor.can_access(invoice.owner_id) => Ok(invoice),
            _ => Err(AppError::NotFound),
        }
    }
}

#[async_trait]
impl InvoiceService for InvoiceManager {
    async fn list(
        &self,
        actor: Actor,
        filter: InvoiceFilter,
        page: PaginationParams,
    ) -> AppResult<Paginated<Invoice>> {
        let invoices = self.data.list_invoices(Self::scope(actor, filter)).await?;
        Ok(Paginated::from_vec(invoices, page))
    }

    async fn search(&self, actor: Actor, query: &str) -> AppResult<Vec<Invoice>> {
        let filter = InvoiceFilter {
            query: Some(query.to_string()),
            ..Default::default()
        };
        self.data.list_invoices(Self::scope(actor, filter)).await
    }

    async fn get(&self, actor: Actor, id: Uuid) -> AppResult<Invoice> {
        self.owned(actor, id).await
    }

    async fn create(&self, actor: Actor, request: CreateInvoiceRequest) -> AppResult<Invoice> {
        let owner_id = match request.owner_id {
            Some(owner) if actor.is_admin() => owner,
            _ => actor.id,
        };

        let mut invoice = Invoice::new(owner_id, request.draft)?;
        if let Some(id) = request.id {
            invoice.id = id;
        }
        if let Some(status) = request.status {
            invoice.set_status(status)?;
        }

        let created = self.data.create_invoice(&invoice).await?;
        tracing::info!(invoice_id = %created.id, owner_id = %created.owner_id, "Invoice created");
        Ok(created)
    }

    async fn update(&self, actor: Actor, id: Uuid, draft: InvoiceDraft) -> AppResult<Invoice> {
        let mut invoice = self.owned(actor, id).await?;
        if invoice.status == InvoiceStatus::Cancelled {
            return Err(AppError::validation("Cancelled invoices cannot be edited"));
        }
        invoice.apply(draft)?;
        self.data.update_invoice(&invoice).await
    }

    async fn update_status(&self, actor: Actor, id: Uuid, status: InvoiceStatus) -> AppResult<Invoice> {
        let mut invoice = self.owned(actor, id).await?;
        let previous = invoice.status;
        invoice.set_status(status)?;
        if previous == status {
            return Ok(invoice);
        }

        let updated = self.data.update_invoice(&invoice).await?;
        tracing::info!(invoice_id = %id, from = %previous, to = %status, "Invoice status changed");
        Ok(updated)
    }

    async fn delete(&self, actor: Actor, id: Uuid) -> AppResult<()> {
        self.owned(actor, id).await?;
        self.data.delete_invoice(id).await?;
        tracing::info!(invoice_id = %id, "Invoice deleted");
        Ok(())
    }

    async fn get_draft(&self, actor: Actor) -> AppResult<Option<InvoiceDraft>> {
        Ok(self.data.get_draft(actor.id).await)
    }

    async fn save_draft(&self, actor: Actor, draft: InvoiceDraft) -> AppResult<()> {
        self.data.save_draft(actor.id, draft).await
    }

    async fn clear_draft(&self, actor: Actor) -> AppResult<()> {
        self.data.clear_draft(actor.id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{ItemInput, Party, UserRole};
    use crate::infra::LocalStore;
    use rust_decimal_macros::dec;

    fn service() -> InvoiceManager {
        InvoiceManager::new(Arc::new(DataService::local_only(Arc::new(LocalStore::in_memory()))))
    }

    fn member() -> Actor {
        Actor::new(Uuid::new_v4(), UserRole::Member)
    }

    fn admin() -> Actor {
        Actor::new(Uuid::new_v4(), UserRole::Admin)
    }

    fn draft(number: &str, client: &str) -> InvoiceDraft {
        InvoiceDraft {
            number: number.into(),
            company: Party {
                name: "Acme".into(),
                ..Default::default()
            },
            client: Party {
                name: client.into(),
                ..Default::default()
            },
            items: vec![
                ItemInput {
                    description: "Widget".into(),
                    quantity: dec!(2),
                    unit_price: dec!(10),
                },
                ItemInput {
                    description: "Gadget".into(),
                    quantity: dec!(1),
                    unit_price: dec!(5),
                },
            ],
            tax_rate: dec!(10),
            discount_rate: dec!(0),
            currency: "usd".into(),
            locale: None,
            theme: None,
            notes: None,
            issue_date: None,
            due_date: None,
        }
    }

    #[tokio::test]
    async fn test_create_computes_totals() {
        let invoices = service();
        let actor = member();
        let created = invoices
            .create(actor, CreateInvoiceRequest::new(draft("INV-1", "Globex")))
            .await
            .unwrap();

        assert_eq!(created.owner_id, actor.id);
        assert_eq!(created.status, InvoiceStatus::Draft);
        assert_eq!(created.currency, "USD");
        assert_eq!(created.subtotal, dec!(25));
        assert_eq!(created.tax_amount, dec!(2.5));
        assert_eq!(created.total, dec!(27.5));
    }

    #[tokio::test]
    async fn test_members_only_see_their_own() {
        let invoices = service();
        let (ana, ben) = (member(), member());
        let mine = invoices
            .create(ana, CreateInvoiceRequest::new(draft("INV-1", "Globex")))
            .await
            .unwrap();
        invoices
            .create(ben, CreateInvoiceRequest::new(draft("INV-2", "Initech")))
            .await
            .unwrap();

        let page = invoices
            .list(ana, InvoiceFilter::default(), PaginationParams::default())
            .await
            .unwrap();
        assert_eq!(page.meta.total, 1);
        assert_eq!(page.data[0].id, mine.id);

        // an explicit owner filter cannot widen a member's view
        let filter = InvoiceFilter {
            owner_id: Some(ben.id),
            ..Default::default()
        };
        let page = invoices.list(ana, filter, PaginationParams::default()).await.unwrap();
        assert!(page.data.iter().all(|i| i.owner_id == ana.id));

        assert!(matches!(invoices.get(ben, mine.id).await, Err(AppError::NotFound)));
        assert!(matches!(invoices.delete(ben, mine.id).await, Err(AppError::NotFound)));

        let all = invoices
            .list(admin(), InvoiceFilter::default(), PaginationParams::default())
            .await
            .unwrap();
        assert_eq!(all.meta.total, 2);
    }

    #[tokio::test]
    async fn test_owner_override_requires_admin() {
        let invoices = service();
        let target = Uuid::new_v4();

        let mut request = CreateInvoiceRequest::new(draft("INV-1", "Globex"));
        request.owner_id = Some(target);
        let actor = member();
        let created = invoices.create(actor, request.clone()).await.unwrap();
        assert_eq!(created.owner_id, actor.id);

        request.draft.number = "INV-2".into();
        let created = invoices.create(admin(), request).await.unwrap();
        assert_eq!(created.owner_id, target);
    }

    #[tokio::test]
    async fn test_search_matches_client_name() {
        let invoices = service();
        let actor = member();
        invoices
            .create(actor, CreateInvoiceRequest::new(draft("INV-1", "Globex")))
            .await
            .unwrap();
        invoices
            .create(actor, CreateInvoiceRequest::new(draft("INV-2", "Initech")))
            .await
            .unwrap();

        let found = invoices.search(actor, "glob").await.unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].number, "INV-1");
    }

    #[tokio::test]
    async fn test_update_recomputes_and_status_flow() {
        let invoices = service();
        let actor = member();
        let created = invoices
            .create(actor, CreateInvoiceRequest::new(draft("INV-1", "Globex")))
            .await
            .unwrap();

        let mut changed = draft("INV-1", "Globex");
        changed.discount_rate = dec!(10);
        let updated = invoices.update(actor, created.id, changed).await.unwrap();
        assert_eq!(updated.discount_amount, dec!(2.5));
        assert_eq!(updated.total, dec!(25));

        invoices
            .update_status(actor, created.id, InvoiceStatus::Paid)
            .await
            .unwrap();
        let err = invoices
            .update_status(actor, created.id, InvoiceStatus::Pending)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));

        invoices
            .update_status(actor, created.id, InvoiceStatus::Cancelled)
            .await
            .unwrap();
        let err = invoices
            .update(actor, created.id, draft("INV-1", "Globex"))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }

    #[tokio::test]
    async fn test_drafts_are_per_user() {
        let invoices = service();
        let (ana, ben) = (member(), member());

        invoices.save_draft(ana, draft("WIP", "Globex")).await.unwrap();
        assert_eq!(invoices.get_draft(ana).await.unwrap().unwrap().number, "WIP");
        assert!(invoices.get_draft(ben).await.unwrap().is_none());

        invoices.clear_draft(ana).await.unwrap();
        assert!(invoices.get_draft(ana).await.unwrap().is_none());
    }
}
