//! SeaORM Entity for ledger transactions
//!
//! One row per balance movement. Effects by kind:
//! - deposit: wallet.balance += net_amount (once `success`)
//! - escrow_hold: wallet.balance -= amount, wallet.escrow += amount
//! - escrow_release: wallet.balance += net_amount, source.escrow -= amount
//! - platform_fee: wallet.balance += amount, source.escrow -= amount
//! - refund: wallet.balance += amount, wallet.escrow -= amount
//! - payout: wallet.escrow -= amount (once `success`)

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

use super::sea_orm_active_enums::{TransactionStatus, TransactionType};

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "transactions")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    /// Wallet the row belongs to
    pub wallet_id: i32,
    /// Wallet whose escrow funded a release or fee
    pub source_wallet_id: Option<i32>,
    pub order_id: Option<i32>,
    /// Set when a credit has been pulled into a withdrawal
    pub withdrawal_request_id: Option<i32>,
    pub tx_type: TransactionType,
    pub amount: Decimal,
    pub fee: Decimal,
    pub net_amount: Decimal,
    pub status: TransactionStatus,
    /// Payment/payout gateway reference
    pub gateway_id: Option<String>,
    #[sea_orm(column_type = "Text", nullable)]
    pub description: Option<String>,
    pub created_at: DateTimeWithTimeZone,
    pub updated_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::wallets::Entity",
        from = "Column::WalletId",
        to = "super::wallets::Column::Id"
    )]
    Wallet,
}

impl Related<super::wallets::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Wallet.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
