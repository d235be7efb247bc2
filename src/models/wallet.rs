use chrono::{DateTime, FixedOffset};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::entities::sea_orm_active_enums::{TransactionStatus, TransactionType, WalletType};
use crate::entities::{transactions, wallets};

#[derive(Debug, Clone, Deserialize)]
pub struct WalletQuery {
    #[serde(rename = "type")]
    pub wallet_type: Option<WalletType>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WalletResponse {
    pub id: i32,
    pub owner_id: i32,
    #[serde(rename = "type")]
    pub wallet_type: WalletType,
    pub balance: Decimal,
    pub escrow_balance: Decimal,
    /// Part of `balance` that came from completed orders not yet withdrawn
    pub credit_pool: Decimal,
    pub transactions: Vec<TransactionResponse>,
}

impl WalletResponse {
    pub fn new(wallet: wallets::Model, credit_pool: Decimal, txs: Vec<transactions::Model>) -> Self {
        Self {
            id: wallet.id,
            owner_id: wallet.owner_id,
            wallet_type: wallet.wallet_type,
            balance: wallet.balance,
            escrow_balance: wallet.escrow_balance,
            credit_pool,
            transactions: txs.into_iter().map(TransactionResponse::from).collect(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionResponse {
    pub id: i32,
    #[serde(rename = "type")]
    pub tx_type: TransactionType,
    pub amount: Decimal,
    pub fee: Decimal,
    pub net_amount: Decimal,
    pub status: TransactionStatus,
    pub order_id: Option<i32>,
    pub withdrawal_request_id: Option<i32>,
    pub gateway_id: Option<String>,
    pub description: Option<String>,
    pub created_at: DateTime<FixedOffset>,
}

impl From<transactions::Model> for TransactionResponse {
    fn from(t: transactions::Model) -> Self {
        Self {
            id: t.id,
            tx_type: t.tx_type,
            amount: t.amount,
            fee: t.fee,
            net_amount: t.net_amount,
            status: t.status,
            order_id: t.order_id,
            withdrawal_request_id: t.withdrawal_request_id,
            gateway_id: t.gateway_id,
            description: t.description,
            created_at: t.created_at,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfirmDepositRequest {
    pub gateway_transaction_id: String,
    pub amount: Decimal,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfirmDepositResponse {
    pub transaction: TransactionResponse,
    /// True when this confirmation had already been applied
    pub replayed: bool,
}
