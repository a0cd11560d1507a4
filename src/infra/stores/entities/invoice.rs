//! Invoice database entity for SeaORM.
//!
//! Parties and line items live in JSON columns; they are owned by the
//! invoice and never queried on their own.

use sea_orm::entity::prelude::*;
use sea_orm::Set;

use crate::domain::{Invoice, InvoiceItem, Party};
use crate::errors::{AppError, AppResult};

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "invoices")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub number: String,
    pub owner_id: Uuid,
    pub status: String,
    pub company: Json,
    pub client: Json,
    pub items: Json,
    #[sea_orm(column_type = "Decimal(Some((7, 4)))")]
    pub tax_rate: Decimal,
    #[sea_orm(column_type = "Decimal(Some((7, 4)))")]
    pub discount_rate: Decimal,
    #[sea_orm(column_type = "Decimal(Some((24, 6)))")]
    pub subtotal: Decimal,
    #[sea_orm(column_type = "Decimal(Some((24, 2)))")]
    pub tax_amount: Decimal,
    #[sea_orm(column_type = "Decimal(Some((24, 2)))")]
    pub discount_amount: Decimal,
    #[sea_orm(column_type = "Decimal(Some((24, 6)))")]
    pub total: Decimal,
    pub currency: String,
    pub locale: Option<String>,
    pub theme: Option<String>,
    #[sea_orm(column_type = "Text", nullable)]
    pub notes: Option<String>,
    pub issue_date: Option<Date>,
    pub due_date: Option<Date>,
    pub created_at: DateTimeUtc,
    pub updated_at: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

impl TryFrom<Model> for Invoice {
    type Error = AppError;

    fn try_from(model: Model) -> AppResult<Self> {
        let company: Party = serde_json::from_value(model.company)?;
        let client: Party = serde_json::from_value(model.client)?;
        let items: Vec<InvoiceItem> = serde_json::from_value(model.items)?;

        Ok(Invoice {
            id: model.id,
            number: model.number,
            owner_id: model.owner_id,
            status: model.status.parse()?,
            company,
            client,
            items,
            tax_rate: model.tax_rate,
            discount_rate: model.discount_rate,
            subtotal: model.subtotal,
            tax_amount: model.tax_amount,
            discount_amount: model.discount_amount,
            total: model.total,
            currency: model.currency,
            locale: model.locale,
            theme: model.theme,
            notes: model.notes,
            issue_date: model.issue_date,
            due_date: model.due_date,
            created_at: model.created_at,
            updated_at: model.updated_at,
        })
    }
}

impl ActiveModel {
    pub fn from_invoice(invoice: &Invoice) -> AppResult<Self> {
        Ok(ActiveModel {
            id: Set(invoice.id),
            number: Set(invoice.number.clone()),
            owner_id: Set(invoice.owner_id),
            status: Set(invoice.status.as_str().to_string()),
            company: Set(serde_json::to_value(&invoice.company)?),
            client: Set(serde_json::to_value(&invoice.client)?),
            items: Set(serde_json::to_value(&invoice.items)?),
            tax_rate: Set(invoice.tax_rate),
            discount_rate: Set(invoice.discount_rate),
            subtotal: Set(invoice.subtotal),
            tax_amount: Set(invoice.tax_amount),
            discount_amount: Set(invoice.discount_amount),
            total: Set(invoice.total),
            currency: Set(invoice.currency.clone()),
            locale: Set(invoice.locale.clone()),
            theme: Set(invoice.theme.clone()),
            notes: Set(invoice.notes.clone()),
            issue_date: Set(invoice.issue_date),
            due_date: Set(invoice.due_date),
            created_at: Set(invoice.created_at),
            updated_at: Set(invoice.updated_at),
        })
    }
}
