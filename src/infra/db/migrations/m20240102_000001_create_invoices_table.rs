//! Migration: Create invoices table.
//!
//! Parties and line items are JSON documents owned by the row.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Invoices::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(Invoices::Id).uuid().not_null().primary_key())
                    .col(ColumnDef::new(Invoices::Number).string_len(64).not_null())
                    .col(ColumnDef::new(Invoices::OwnerId).uuid().not_null())
                    .col(
                        ColumnDef::new(Invoices::Status)
                            .string_len(16)
                            .not_null()
                            .default("draft"),
                    )
                    .col(ColumnDef::new(Invoices::Company).json().not_null())
                    .col(ColumnDef::new(Invoices::Client).json().not_null())
                    .col(ColumnDef::new(Invoices::Items).json().not_null())
                    .col(ColumnDef::new(Invoices::TaxRate).decimal_len(7, 4).not_null())
                    .col(ColumnDef::new(Invoices::DiscountRate).decimal_len(7, 4).not_null())
                    .col(ColumnDef::new(Invoices::Subtotal).decimal_len(24, 6).not_null())
                    .col(ColumnDef::new(Invoices::TaxAmount).decimal_len(24, 2).not_null())
                    .col(ColumnDef::new(Invoices::DiscountAmount).decimal_len(24, 2).not_null())
                    .col(ColumnDef::new(Invoices::Total).decimal_len(24, 6).not_null())
                    .col(ColumnDef::new(Invoices::Currency).string_len(3).not_null())
                    .col(ColumnDef::new(Invoices::Locale).string_len(16).null())
                    .col(ColumnDef::new(Invoices::Theme).string_len(32).null())
                    .col(ColumnDef::new(Invoices::Notes).text().null())
                    .col(ColumnDef::new(Invoices::IssueDate).date().null())
                    .col(ColumnDef::new(Invoices::DueDate).date().null())
                    .col(
                        ColumnDef::new(Invoices::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(Invoices::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_invoices_owner_id")
                    .table(Invoices::Table)
                    .col(Invoices::OwnerId)
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_invoices_status")
                    .table(Invoices::Table)
                    .col(Invoices::Status)
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(Invoices::Table).to_owned())
            .await
    }
}

#[derive(Iden)]
enum Invoices {
    Table,
    Id,
    Number,
    OwnerId,
    Status,
    Company,
    Client,
    Items,
    TaxRate,
    DiscountRate,
    Subtotal,
    TaxAmount,
    DiscountAmount,
    Total,
    Currency,
    Locale,
    Theme,
    Notes,
    IssueDate,
    DueDate,
    CreatedAt,
    UpdatedAt,
}
