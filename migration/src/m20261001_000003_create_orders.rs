//! Orders, their content payloads and the audit log for explicit repairs.

use sea_orm_migration::prelude::*;

use super::m20261001_000001_create_users_and_listings::Listings;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Orders::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Orders::Id)
                            .integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(Orders::AdvertiserId).integer().not_null())
                    .col(ColumnDef::new(Orders::PublisherId).integer())
                    .col(ColumnDef::new(Orders::ListingId).integer().not_null())
                    .col(ColumnDef::new(Orders::TotalAmount).decimal_len(16, 4).not_null())
                    .col(ColumnDef::new(Orders::FeeRate).decimal_len(10, 6).not_null())
                    .col(ColumnDef::new(Orders::PlatformFee).decimal_len(16, 4).not_null())
                    .col(ColumnDef::new(Orders::EscrowHeld).decimal_len(16, 4).not_null())
                    .col(ColumnDef::new(Orders::Status).string().not_null())
                    .col(ColumnDef::new(Orders::RevisionStatus).string().not_null())
                    .col(ColumnDef::new(Orders::ProofUrl).text())
                    .col(ColumnDef::new(Orders::DisputeReason).text())
                    .col(ColumnDef::new(Orders::RevisionNotes).text())
                    .col(ColumnDef::new(Orders::OrderDate).timestamp_with_time_zone().not_null())
                    .col(ColumnDef::new(Orders::AcceptedDate).timestamp_with_time_zone())
                    .col(ColumnDef::new(Orders::DeliveredDate).timestamp_with_time_zone())
                    .col(ColumnDef::new(Orders::DisputeDate).timestamp_with_time_zone())
                    .col(ColumnDef::new(Orders::CompletedDate).timestamp_with_time_zone())
                    .col(ColumnDef::new(Orders::RevisionRequestedAt).timestamp_with_time_zone())
                    .col(ColumnDef::new(Orders::RevisionDeadline).timestamp_with_time_zone())
                    .col(ColumnDef::new(Orders::CreatedAt).timestamp_with_time_zone().not_null())
                    .col(ColumnDef::new(Orders::UpdatedAt).timestamp_with_time_zone().not_null())
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_orders_listing")
                            .from(Orders::Table, Orders::ListingId)
                            .to(Listings::Table, Listings::Id),
                    )
                    .to_owned(),
            )
            .await?;

        // Duplicate-submission lookups
        manager
            .create_index(
                Index::create()
                    .name("idx_orders_advertiser_listing_created")
                    .table(Orders::Table)
                    .col(Orders::AdvertiserId)
                    .col(Orders::ListingId)
                    .col(Orders::CreatedAt)
                    .to_owned(),
            )
            .await?;

        // TAT recompute scans completed orders per listing
        manager
            .create_index(
                Index::create()
                    .name("idx_orders_listing_status")
                    .table(Orders::Table)
                    .col(Orders::ListingId)
                    .col(Orders::Status)
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(OrderContents::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(OrderContents::Id)
                            .integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(OrderContents::OrderId).integer().not_null())
                    .col(ColumnDef::new(OrderContents::Title).string())
                    .col(ColumnDef::new(OrderContents::Body).text())
                    .col(ColumnDef::new(OrderContents::Links).json_binary())
                    .col(ColumnDef::new(OrderContents::Keywords).json_binary())
                    .col(ColumnDef::new(OrderContents::CreatedAt).timestamp_with_time_zone().not_null())
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(OrderAuditLog::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(OrderAuditLog::Id)
                            .integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(OrderAuditLog::OrderId).integer().not_null())
                    .col(ColumnDef::new(OrderAuditLog::Action).string().not_null())
                    .col(ColumnDef::new(OrderAuditLog::ActorId).integer().not_null())
                    .col(ColumnDef::new(OrderAuditLog::PreviousValue).string())
                    .col(ColumnDef::new(OrderAuditLog::NewValue).string())
                    .col(ColumnDef::new(OrderAuditLog::CreatedAt).timestamp_with_time_zone().not_null())
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_order_audit_log_order")
                    .table(OrderAuditLog::Table)
                    .col(OrderAuditLog::OrderId)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(OrderAuditLog::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(OrderContents::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Orders::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum Orders {
    Table,
    Id,
    AdvertiserId,
    PublisherId,
    ListingId,
    TotalAmount,
    FeeRate,
    PlatformFee,
    EscrowHeld,
    Status,
    RevisionStatus,
    ProofUrl,
    DisputeReason,
    RevisionNotes,
    OrderDate,
    AcceptedDate,
    DeliveredDate,
    DisputeDate,
    CompletedDate,
    RevisionRequestedAt,
    RevisionDeadline,
    CreatedAt,
    UpdatedAt,
}

#[derive(DeriveIden)]
enum OrderContents {
    Table,
    Id,
    OrderId,
    Title,
    Body,
    Links,
    Keywords,
    CreatedAt,
}

#[derive(DeriveIden)]
enum OrderAuditLog {
    Table,
    Id,
    OrderId,
    Action,
    ActorId,
    PreviousValue,
    NewValue,
    CreatedAt,
}
