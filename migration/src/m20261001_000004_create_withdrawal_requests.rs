//! Publisher withdrawal requests

use sea_orm_migration::prelude::*;

use super::m20261001_000002_create_wallets_and_transactions::Wallets;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(WithdrawalRequests::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(WithdrawalRequests::Id)
                            .integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(WithdrawalRequests::PublisherId).integer().not_null())
                    .col(ColumnDef::new(WithdrawalRequests::WalletId).integer().not_null())
                    .col(ColumnDef::new(WithdrawalRequests::Amount).decimal_len(16, 4).not_null())
                    .col(ColumnDef::new(WithdrawalRequests::AmountFromWallet).decimal_len(16, 4).not_null())
                    .col(ColumnDef::new(WithdrawalRequests::AmountFromOrders).decimal_len(16, 4).not_null())
                    .col(ColumnDef::new(WithdrawalRequests::Method).string().not_null())
                    .col(ColumnDef::new(WithdrawalRequests::Details).json_binary())
                    .col(ColumnDef::new(WithdrawalRequests::Status).string().not_null())
                    .col(ColumnDef::new(WithdrawalRequests::DenialReason).text())
                    .col(
                        ColumnDef::new(WithdrawalRequests::PayoutInFlight)
                            .boolean()
                            .not_null()
                            .default(false),
                    )
                    .col(ColumnDef::new(WithdrawalRequests::GatewayPayoutId).string())
                    .col(ColumnDef::new(WithdrawalRequests::ResolvedAt).timestamp_with_time_zone())
                    .col(ColumnDef::new(WithdrawalRequests::CreatedAt).timestamp_with_time_zone().not_null())
                    .col(ColumnDef::new(WithdrawalRequests::UpdatedAt).timestamp_with_time_zone().not_null())
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_withdrawal_requests_wallet")
                            .from(WithdrawalRequests::Table, WithdrawalRequests::WalletId)
                            .to(Wallets::Table, Wallets::Id),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_withdrawal_requests_status")
                    .table(WithdrawalRequests::Table)
                    .col(WithdrawalRequests::Status)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(WithdrawalRequests::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum WithdrawalRequests {
    Table,
    Id,
    PublisherId,
    WalletId,
    Amount,
    AmountFromWallet,
    AmountFromOrders,
    Method,
    Details,
    Status,
    DenialReason,
    PayoutInFlight,
    GatewayPayoutId,
    ResolvedAt,
    CreatedAt,
    UpdatedAt,
}
