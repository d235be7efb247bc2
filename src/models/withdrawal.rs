use chrono::{DateTime, FixedOffset};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::entities::{sea_orm_active_enums::WithdrawalStatus, withdrawal_requests};

#[derive(Debug, Clone, Deserialize)]
pub struct CreateWithdrawalRequest {
    pub amount: Decimal,
    pub method: String,
    pub details: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DenyWithdrawalRequest {
    pub reason: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WithdrawalResponse {
    pub id: i32,
    pub publisher_id: i32,
    pub amount: Decimal,
    pub amount_from_wallet: Decimal,
    pub amount_from_orders: Decimal,
    pub method: String,
    pub status: WithdrawalStatus,
    pub denial_reason: Option<String>,
    pub gateway_payout_id: Option<String>,
    pub resolved_at: Option<DateTime<FixedOffset>>,
    pub created_at: DateTime<FixedOffset>,
}

impl From<withdrawal_requests::Model> for WithdrawalResponse {
    fn from(w: withdrawal_requests::Model) -> Self {
        Self {
            id: w.id,
            publisher_id: w.publisher_id,
            amount: w.amount,
            amount_from_wallet: w.amount_from_wallet,
            amount_from_orders: w.amount_from_orders,
            method: w.method,
            status: w.status,
            denial_reason: w.denial_reason,
            gateway_payout_id: w.gateway_payout_id,
            resolved_at: w.resolved_at,
            created_at: w.created_at,
        }
    }
}
