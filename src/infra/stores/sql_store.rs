//! SeaORM store, shared by the MySQL pool and the hosted backend.

use std::sync::Arc;

use async_trait::async_trait;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder, Set,
};
use tokio::sync::OnceCell;
use uuid::Uuid;

use super::entities::{invoice, user, InvoiceActiveModel, InvoiceEntity, UserActiveModel, UserEntity};
use super::{BackendKind, Store};
use crate::domain::invoice::sort_newest_first;
use crate::domain::password::verify_for;
use crate::domain::user::normalize_email;
use crate::domain::{Invoice, InvoiceFilter, NewUser, Password, User, UserChanges};
use crate::errors::{AppError, AppResult, OptionExt};
use crate::infra::Database;

/// Relational store backed by a SeaORM connection pool.
///
/// Pending migrations run on the first query that reaches the server, so a
/// tier built while its server was down gets its schema once it recovers.
#[derive(Clone)]
pub struct SqlStore {
    kind: BackendKind,
    db: Database,
    schema: Arc<OnceCell<()>>,
}

impl SqlStore {
    pub fn new(kind: BackendKind, db: Database) -> Self {
        Self {
            kind,
            db,
            schema: Arc::new(OnceCell::new()),
        }
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    pub fn schema_ready(&self) -> bool {
        self.schema.initialized()
    }

    async fn conn(&self) -> AppResult<&DatabaseConnection> {
        self.schema
            .get_or_try_init(|| async {
                self.db.migrate_up().await?;
                tracing::info!(tier = %self.kind, "Schema migrations applied");
                Ok::<(), sea_orm::DbErr>(())
            })
            .await?;
        Ok(self.db.connection())
    }

    async fn user_model(&self, id: Uuid) -> AppResult<user::Model> {
        UserEntity::find_by_id(id)
            .one(self.conn().await?)
            .await?
            .ok_or_not_found()
    }
}

#[async_trait]
impl Store for SqlStore {
    fn kind(&self) -> BackendKind {
        self.kind
    }

    async fn ping(&self) -> AppResult<()> {
        self.db.ping().await?;
        self.conn().await?;
        Ok(())
    }

    async fn verify_credentials(&self, email: &str, password: &str) -> AppResult<Option<User>> {
        let user = self.find_user_by_email(email).await?;
        let valid = verify_for(user.as_ref().map(|u| u.password_hash.as_str()), password);
        Ok(user.filter(|_| valid))
    }

    async fn find_user(&self, id: Uuid) -> AppResult<Option<User>> {
        let model = UserEntity::find_by_id(id).one(self.conn().await?).await?;
        Ok(model.map(User::from))
    }

    async fn find_user_by_email(&self, email: &str) -> AppResult<Option<User>> {
        let model = UserEntity::find()
            .filter(user::Column::Email.eq(normalize_email(email)))
            .one(self.conn().await?)
            .await?;
        Ok(model.map(User::from))
    }

    async fn list_users(&self) -> AppResult<Vec<User>> {
        let models = UserEntity::find()
            .order_by_asc(user::Column::CreatedAt)
            .all(self.conn().await?)
            .await?;
        Ok(models.into_iter().map(User::from).collect())
    }

    async fn create_user(&self, new_user: NewUser) -> AppResult<User> {
        let email = normalize_email(&new_user.email);
        if self.find_user_by_email(&email).await?.is_some() {
            return Err(AppError::conflict("User with this email"));
        }

        let hash = Password::new(&new_user.password)?;
        let mut user = User::new(email, hash.into_string(), new_user.name, new_user.role);
        user.phone = new_user.phone;

        let model = UserActiveModel::from(&user)
            .insert(self.conn().await?)
            .await?;
        Ok(User::from(model))
    }

    async fn update_user(&self, id: Uuid, changes: UserChanges) -> AppResult<User> {
        let mut user = User::from(self.user_model(id).await?);
        user.apply(changes);

        let model = UserActiveModel::from(&user)
            .update(self.conn().await?)
            .await?;
        Ok(User::from(model))
    }

    async fn set_password(&self, id: Uuid, password: &str) -> AppResult<()> {
        let hash = Password::new(password)?;
        let mut active: UserActiveModel = self.user_model(id).await?.into();
        active.password_hash = Set(hash.into_string());
        active.updated_at = Set(chrono::Utc::now());

        active.update(self.conn().await?).await?;
        Ok(())
    }

    async fn delete_user(&self, id: Uuid) -> AppResult<()> {
        let result = UserEntity::delete_by_id(id)
            .exec(self.conn().await?)
            .await?;

        if result.rows_affected == 0 {
            return Err(AppError::NotFound);
        }
        Ok(())
    }

    async fn get_invoice(&self, id: Uuid) -> AppResult<Option<Invoice>> {
        InvoiceEntity::find_by_id(id)
            .one(self.conn().await?)
            .await?
            .map(Invoice::try_from)
            .transpose()
    }

    async fn list_invoices(&self, filter: InvoiceFilter) -> AppResult<Vec<Invoice>> {
        let mut query = InvoiceEntity::find();
        if let Some(owner_id) = filter.owner_id {
            query = query.filter(invoice::Column::OwnerId.eq(owner_id));
        }
        if let Some(status) = filter.status {
            query = query.filter(invoice::Column::Status.eq(status.as_str()));
        }

        let models = query
            .order_by_desc(invoice::Column::CreatedAt)
            .all(self.conn().await?)
            .await?;

        // Parties live in JSON columns, so text search runs here.
        let mut invoices = models
            .into_iter()
            .map(Invoice::try_from)
            .collect::<AppResult<Vec<_>>>()?;
        if let Some(q) = filter.query.as_deref() {
            invoices.retain(|invoice| invoice.matches_query(q));
        }
        sort_newest_first(&mut invoices);
        Ok(invoices)
    }

    async fn create_invoice(&self, invoice: &Invoice) -> AppResult<Invoice> {
        if InvoiceEntity::find_by_id(invoice.id)
            .one(self.conn().await?)
            .await?
            .is_some()
        {
            return Err(AppError::conflict("Invoice"));
        }

        let model = InvoiceActiveModel::from_invoice(invoice)?
            .insert(self.conn().await?)
            .await?;
        Invoice::try_from(model)
    }

    async fn update_invoice(&self, invoice: &Invoice) -> AppResult<Invoice> {
        InvoiceEntity::find_by_id(invoice.id)
            .one(self.conn().await?)
            .await?
            .ok_or_not_found()?;

        let model = InvoiceActiveModel::from_invoice(invoice)?
            .update(self.conn().await?)
            .await?;
        Invoice::try_from(model)
    }

    async fn delete_invoice(&self, id: Uuid) -> AppResult<()> {
        let result = InvoiceEntity::delete_by_id(id)
            .exec(self.conn().await?)
            .await?;

        if result.rows_affected == 0 {
            return Err(AppError::NotFound);
        }
        Ok(())
    }
}
