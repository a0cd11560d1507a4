//! Invoice domain entity and related types.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

use super::totals::{item_total, significant_scale, validate_rate, Totals};
use crate::config::{MAX_PRICE_SCALE, MAX_QUANTITY_SCALE};
use crate::errors::{AppError, AppResult};

/// Largest quantity or unit price accepted on a line item.
const MAX_LINE_VALUE: i64 = 100_000_000;

/// Invoice lifecycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum InvoiceStatus {
    Draft,
    Pending,
    Paid,
    Cancelled,
}

impl InvoiceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            InvoiceStatus::Draft => "draft",
            InvoiceStatus::Pending => "pending",
            InvoiceStatus::Paid => "paid",
            InvoiceStatus::Cancelled => "cancelled",
        }
    }

    /// Cancelled is terminal and paid invoices can only be cancelled.
    pub fn can_transition_to(&self, next: InvoiceStatus) -> bool {
        if *self == next {
            return true;
        }
        match self {
            InvoiceStatus::Draft | InvoiceStatus::Pending => true,
            InvoiceStatus::Paid => next == InvoiceStatus::Cancelled,
            InvoiceStatus::Cancelled => false,
        }
    }
}

impl std::fmt::Display for InvoiceStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for InvoiceStatus {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "draft" => Ok(InvoiceStatus::Draft),
            "pending" => Ok(InvoiceStatus::Pending),
            "paid" => Ok(InvoiceStatus::Paid),
            "cancelled" => Ok(InvoiceStatus::Cancelled),
            other => Err(AppError::validation(format!("Unknown invoice status '{}'", other))),
        }
    }
}

/// Company or client details printed on an invoice.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, Validate, ToSchema)]
pub struct Party {
    #[schema(example = "Acme Ltd")]
    pub name: String,
    #[serde(default)]
    #[validate(email(message = "Invalid party email"))]
    pub email: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub address: Option<String>,
}

/// Line item owned by an invoice. `total` is always derived.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct InvoiceItem {
    #[schema(example = "Consulting hours")]
    pub description: String,
    #[schema(value_type = String, example = "2")]
    pub quantity: Decimal,
    #[schema(value_type = String, example = "10.00")]
    pub unit_price: Decimal,
    #[schema(value_type = String, example = "20.00")]
    pub total: Decimal,
}

impl InvoiceItem {
    pub fn new(description: impl Into<String>, quantity: Decimal, unit_price: Decimal) -> Self {
        Self {
            description: description.into(),
            quantity,
            unit_price,
            total: item_total(quantity, unit_price),
        }
    }
}

/// Line item as submitted by a client (no total).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct ItemInput {
    pub description: String,
    #[schema(value_type = String, example = "2")]
    pub quantity: Decimal,
    #[schema(value_type = String, example = "10.00")]
    pub unit_price: Decimal,
}

/// Editable invoice content. Totals are never part of it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate, ToSchema)]
pub struct InvoiceDraft {
    #[schema(example = "INV-2024-0001")]
    pub number: String,
    #[validate(nested)]
    pub company: Party,
    #[validate(nested)]
    pub client: Party,
    #[serde(default)]
    pub items: Vec<ItemInput>,
    #[serde(default)]
    #[schema(value_type = String, example = "10")]
    pub tax_rate: Decimal,
    #[serde(default)]
    #[schema(value_type = String, example = "0")]
    pub discount_rate: Decimal,
    #[validate(length(equal = 3, message = "Currency must be a 3-letter ISO code"))]
    #[schema(example = "USD")]
    pub currency: String,
    #[serde(default)]
    #[schema(example = "en-US")]
    pub locale: Option<String>,
    #[serde(default)]
    #[schema(example = "classic")]
    pub theme: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default)]
    pub issue_date: Option<NaiveDate>,
    #[serde(default)]
    pub due_date: Option<NaiveDate>,
}

impl InvoiceDraft {
    /// Domain checks beyond field-level validation.
    pub fn check(&self) -> AppResult<()> {
        if self.number.trim().is_empty() {
            return Err(AppError::validation("Invoice number is required"));
        }
        if self.client.name.trim().is_empty() {
            return Err(AppError::validation("Client name is required"));
        }
        if !self.currency.chars().all(|c| c.is_ascii_alphabetic()) || self.currency.len() != 3 {
            return Err(AppError::validation("Currency must be a 3-letter ISO code"));
        }
        validate_rate("tax_rate", self.tax_rate)?;
        validate_rate("discount_rate", self.discount_rate)?;

        let max = Decimal::from(MAX_LINE_VALUE);
        for (index, item) in self.items.iter().enumerate() {
            if item.quantity < Decimal::ZERO || item.quantity > max {
                return Err(AppError::validation(format!(
                    "Item {}: quantity must be between 0 and {}",
                    index + 1,
                    MAX_LINE_VALUE
                )));
            }
            if item.unit_price < Decimal::ZERO || item.unit_price > max {
                return Err(AppError::validation(format!(
                    "Item {}: unit price must be between 0 and {}",
                    index + 1,
                    MAX_LINE_VALUE
                )));
            }
            if significant_scale(item.quantity) > MAX_QUANTITY_SCALE {
                return Err(AppError::validation(format!(
                    "Item {}: quantity allows at most {} decimal places",
                    index + 1,
                    MAX_QUANTITY_SCALE
                )));
            }
            if significant_scale(item.unit_price) > MAX_PRICE_SCALE {
                return Err(AppError::validation(format!(
                    "Item {}: unit price allows at most {} decimal places",
                    index + 1,
                    MAX_PRICE_SCALE
                )));
            }
        }

        if let (Some(issued), Some(due)) = (self.issue_date, self.due_date) {
            if due < issued {
                return Err(AppError::validation("Due date cannot be before issue date"));
            }
        }
        Ok(())
    }
}

/// Invoice aggregate
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct Invoice {
    pub id: Uuid,
    pub number: String,
    pub owner_id: Uuid,
    pub status: InvoiceStatus,
    pub company: Party,
    pub client: Party,
    pub items: Vec<InvoiceItem>,
    #[schema(value_type = String)]
    pub tax_rate: Decimal,
    #[schema(value_type = String)]
    pub discount_rate: Decimal,
    #[schema(value_type = String)]
    pub subtotal: Decimal,
    #[schema(value_type = String)]
    pub tax_amount: Decimal,
    #[schema(value_type = String)]
    pub discount_amount: Decimal,
    #[schema(value_type = String)]
    pub total: Decimal,
    pub currency: String,
    pub locale: Option<String>,
    pub theme: Option<String>,
    pub notes: Option<String>,
    pub issue_date: Option<NaiveDate>,
    pub due_date: Option<NaiveDate>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Invoice {
    /// Create a draft invoice from validated content.
    pub fn new(owner_id: Uuid, draft: InvoiceDraft) -> AppResult<Self> {
        draft.check()?;
        let now = Utc::now();
        let mut invoice = Self {
            id: Uuid::new_v4(),
            number: String::new(),
            owner_id,
            status: InvoiceStatus::Draft,
            company: Party::default(),
            client: Party::default(),
            items: Vec::new(),
            tax_rate: Decimal::ZERO,
            discount_rate: Decimal::ZERO,
            subtotal: Decimal::ZERO,
            tax_amount: Decimal::ZERO,
            discount_amount: Decimal::ZERO,
            total: Decimal::ZERO,
            currency: String::new(),
            locale: None,
            theme: None,
            notes: None,
            issue_date: None,
            due_date: None,
            created_at: now,
            updated_at: now,
        };
        invoice.fill(draft);
        Ok(invoice)
    }

    /// Replace the editable content and recompute totals.
    pub fn apply(&mut self, draft: InvoiceDraft) -> AppResult<()> {
        draft.check()?;
        self.fill(draft);
        self.updated_at = Utc::now();
        Ok(())
    }

    fn fill(&mut self, draft: InvoiceDraft) {
        self.number = draft.number.trim().to_string();
        self.company = draft.company;
        self.client = draft.client;
        self.items = draft
            .items
            .into_iter()
            .map(|item| InvoiceItem::new(item.description, item.quantity, item.unit_price))
            .collect();
        self.tax_rate = draft.tax_rate;
        self.discount_rate = draft.discount_rate;
        self.currency = draft.currency.to_uppercase();
        self.locale = draft.locale;
        self.theme = draft.theme;
        self.notes = draft.notes;
        self.issue_date = draft.issue_date;
        self.due_date = draft.due_date;
        self.recompute_totals();
    }

    /// Recompute line totals and the invoice totals from items and rates.
    pub fn recompute_totals(&mut self) {
        for item in &mut self.items {
            item.total = item_total(item.quantity, item.unit_price);
        }
        let totals = self.computed_totals();
        self.subtotal = totals.subtotal;
        self.tax_amount = totals.tax_amount;
        self.discount_amount = totals.discount_amount;
        self.total = totals.total;
    }

    fn computed_totals(&self) -> Totals {
        Totals::compute(
            self.items.iter().map(|item| (item.quantity, item.unit_price)),
            self.tax_rate,
            self.discount_rate,
        )
    }

    pub fn totals(&self) -> Totals {
        Totals {
            subtotal: self.subtotal,
            tax_amount: self.tax_amount,
            discount_amount: self.discount_amount,
            total: self.total,
        }
    }

    /// Change status, enforcing the allowed transitions.
    pub fn set_status(&mut self, status: InvoiceStatus) -> AppResult<()> {
        if !self.status.can_transition_to(status) {
            return Err(AppError::validation(format!(
                "Cannot change invoice status from {} to {}",
                self.status, status
            )));
        }
        if self.status != status {
            self.status = status;
            self.updated_at = Utc::now();
        }
        Ok(())
    }

    /// The editable content of this invoice.
    pub fn to_draft(&self) -> InvoiceDraft {
        InvoiceDraft {
            number: self.number.clone(),
            company: self.company.clone(),
            client: self.client.clone(),
            items: self
                .items
                .iter()
                .map(|item| ItemInput {
                    description: item.description.clone(),
                    quantity: item.quantity,
                    unit_price: item.unit_price,
                })
                .collect(),
            tax_rate: self.tax_rate,
            discount_rate: self.discount_rate,
            currency: self.currency.clone(),
            locale: self.locale.clone(),
            theme: self.theme.clone(),
            notes: self.notes.clone(),
            issue_date: self.issue_date,
            due_date: self.due_date,
        }
    }

    /// Case-insensitive match against number, client and company.
    pub fn matches_query(&self, query: &str) -> bool {
        let needle = query.trim().to_lowercase();
        if needle.is_empty() {
            return true;
        }
        let haystacks = [
            Some(self.number.as_str()),
            Some(self.client.name.as_str()),
            self.client.email.as_deref(),
            Some(self.company.name.as_str()),
        ];
        haystacks
            .into_iter()
            .flatten()
            .any(|h| h.to_lowercase().contains(&needle))
    }

    /// Whether this invoice passes a list filter.
    pub fn matches(&self, filter: &InvoiceFilter) -> bool {
        filter.owner_id.map_or(true, |owner| owner == self.owner_id)
            && filter.status.map_or(true, |status| status == self.status)
            && filter.query.as_deref().map_or(true, |q| self.matches_query(q))
    }
}

/// Invoice list filter. Search is a list with `query` set.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InvoiceFilter {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owner_id: Option<Uuid>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<InvoiceStatus>,
    #[serde(default, rename = "q", skip_serializing_if = "Option::is_none")]
    pub query: Option<String>,
}

/// Order used by every store when listing: newest first, id as tie break.
pub fn sort_newest_first(invoices: &mut [Invoice]) {
    invoices.sort_by(|a, b| {
        b.created_at
            .cmp(&a.created_at)
            .then_with(|| a.id.cmp(&b.id))
    });
}
