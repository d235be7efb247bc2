//! Wallet ledger: one wallet per (owner, type) and the transaction log
//! that records every balance movement.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Wallets::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Wallets::Id)
                            .integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(Wallets::OwnerId).integer().not_null())
                    .col(ColumnDef::new(Wallets::WalletType).string().not_null())
                    .col(ColumnDef::new(Wallets::Balance).decimal_len(16, 4).not_null())
                    .col(ColumnDef::new(Wallets::EscrowBalance).decimal_len(16, 4).not_null())
                    .col(ColumnDef::new(Wallets::CreatedAt).timestamp_with_time_zone().not_null())
                    .col(ColumnDef::new(Wallets::UpdatedAt).timestamp_with_time_zone().not_null())
                    .to_owned(),
            )
            .await?;

        // Lazy creation races resolve on this index
        manager
            .create_index(
                Index::create()
                    .name("idx_wallets_owner_type")
                    .table(Wallets::Table)
                    .col(Wallets::OwnerId)
                    .col(Wallets::WalletType)
                    .unique()
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(Transactions::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Transactions::Id)
                            .integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(Transactions::WalletId).integer().not_null())
                    .col(ColumnDef::new(Transactions::SourceWalletId).integer())
                    .col(ColumnDef::new(Transactions::OrderId).integer())
                    .col(ColumnDef::new(Transactions::WithdrawalRequestId).integer())
                    .col(ColumnDef::new(Transactions::TxType).string().not_null())
                    .col(ColumnDef::new(Transactions::Amount).decimal_len(16, 4).not_null())
                    .col(ColumnDef::new(Transactions::Fee).decimal_len(16, 4).not_null())
                    .col(ColumnDef::new(Transactions::NetAmount).decimal_len(16, 4).not_null())
                    .col(ColumnDef::new(Transactions::Status).string().not_null())
                    .col(ColumnDef::new(Transactions::GatewayId).string())
                    .col(ColumnDef::new(Transactions::Description).text())
                    .col(ColumnDef::new(Transactions::CreatedAt).timestamp_with_time_zone().not_null())
                    .col(ColumnDef::new(Transactions::UpdatedAt).timestamp_with_time_zone().not_null())
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_transactions_wallet")
                            .from(Transactions::Table, Transactions::WalletId)
                            .to(Wallets::Table, Wallets::Id),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_transactions_wallet_type_status")
                    .table(Transactions::Table)
                    .col(Transactions::WalletId)
                    .col(Transactions::TxType)
                    .col(Transactions::Status)
                    .to_owned(),
            )
            .await?;

        // Gateway confirmations are applied at most once per kind
        manager
            .create_index(
                Index::create()
                    .name("idx_transactions_type_gateway_id")
                    .table(Transactions::Table)
                    .col(Transactions::TxType)
                    .col(Transactions::GatewayId)
                    .unique()
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(Transactions::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Wallets::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
pub enum Wallets {
    Table,
    Id,
    OwnerId,
    WalletType,
    Balance,
    EscrowBalance,
    CreatedAt,
    UpdatedAt,
}

#[derive(DeriveIden)]
enum Transactions {
    Table,
    Id,
    WalletId,
    SourceWalletId,
    OrderId,
    WithdrawalRequestId,
    TxType,
    Amount,
    Fee,
    NetAmount,
    Status,
    GatewayId,
    Description,
    CreatedAt,
    UpdatedAt,
}
