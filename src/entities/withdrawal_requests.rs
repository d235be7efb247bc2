//! SeaORM Entity for publisher withdrawal requests

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

use super::sea_orm_active_enums::WithdrawalStatus;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "withdrawal_requests")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    pub publisher_id: i32,
    pub wallet_id: i32,
    pub amount: Decimal,
    /// Portion drawn from the wallet's non-earmarked balance
    pub amount_from_wallet: Decimal,
    /// Portion drawn from pending escrow_release credits
    pub amount_from_orders: Decimal,
    /// Payout method (e.g. "paypal", "bank_transfer")
    pub method: String,
    /// Payout destination
    #[sea_orm(column_type = "JsonBinary", nullable)]
    pub details: Option<Json>,
    pub status: WithdrawalStatus,
    #[sea_orm(column_type = "Text", nullable)]
    pub denial_reason: Option<String>,
    /// Claimed by an approval that is waiting on the payout gateway
    pub payout_in_flight: bool,
    pub gateway_payout_id: Option<String>,
    pub resolved_at: Option<DateTimeWithTimeZone>,
    pub created_at: DateTimeWithTimeZone,
    pub updated_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
