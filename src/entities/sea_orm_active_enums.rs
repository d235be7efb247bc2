//! Closed enumerations stored as strings.
//!
//! Every status or kind column in the ledger goes through one of these, so
//! adding a variant forces every `match` in settlement and release to be
//! revisited.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Order lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, EnumIter, DeriveActiveEnum, Serialize, Deserialize)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::None)")]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    #[sea_orm(string_value = "pending")]
    Pending,
    #[sea_orm(string_value = "accepted")]
    Accepted,
    #[sea_orm(string_value = "delivered")]
    Delivered,
    #[sea_orm(string_value = "disputed")]
    Disputed,
    /// Buyer approved the delivery; escrow has been released
    #[sea_orm(string_value = "approved")]
    Approved,
}

impl OrderStatus {
    /// Value as stored in the database
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Accepted => "accepted",
            Self::Delivered => "delivered",
            Self::Disputed => "disputed",
            Self::Approved => "approved",
        }
    }
}

/// Revision sub-state of a delivered order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, EnumIter, DeriveActiveEnum, Serialize, Deserialize)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::None)")]
#[serde(rename_all = "snake_case")]
pub enum RevisionStatus {
    #[sea_orm(string_value = "none")]
    None,
    #[sea_orm(string_value = "requested")]
    Requested,
    #[sea_orm(string_value = "in_progress")]
    InProgress,
    #[sea_orm(string_value = "completed")]
    Completed,
}

impl RevisionStatus {
    /// Value as stored in the database
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Requested => "requested",
            Self::InProgress => "in_progress",
            Self::Completed => "completed",
        }
    }
}

/// Which side of an order a wallet can take part in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, EnumIter, DeriveActiveEnum, Serialize, Deserialize)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::None)")]
#[serde(rename_all = "snake_case")]
pub enum WalletType {
    #[sea_orm(string_value = "advertiser")]
    Advertiser,
    #[sea_orm(string_value = "publisher")]
    Publisher,
    /// Single house wallet collecting platform fees
    #[sea_orm(string_value = "platform")]
    Platform,
}

impl WalletType {
    /// Value as stored in the database
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Advertiser => "advertiser",
            Self::Publisher => "publisher",
            Self::Platform => "platform",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, EnumIter, DeriveActiveEnum, Serialize, Deserialize)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::None)")]
#[serde(rename_all = "snake_case")]
pub enum TransactionType {
    #[sea_orm(string_value = "deposit")]
    Deposit,
    #[sea_orm(string_value = "withdrawal")]
    Withdrawal,
    #[sea_orm(string_value = "escrow_hold")]
    EscrowHold,
    #[sea_orm(string_value = "escrow_release")]
    EscrowRelease,
    #[sea_orm(string_value = "platform_fee")]
    PlatformFee,
    #[sea_orm(string_value = "payout")]
    Payout,
    #[sea_orm(string_value = "refund")]
    Refund,
}

impl TransactionType {
    /// Value as stored in the database
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Deposit => "deposit",
            Self::Withdrawal => "withdrawal",
            Self::EscrowHold => "escrow_hold",
            Self::EscrowRelease => "escrow_release",
            Self::PlatformFee => "platform_fee",
            Self::Payout => "payout",
            Self::Refund => "refund",
        }
    }
}

/// Transaction status; only moves forward: pending -> processing -> success | failed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, EnumIter, DeriveActiveEnum, Serialize, Deserialize)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::None)")]
#[serde(rename_all = "snake_case")]
pub enum TransactionStatus {
    #[sea_orm(string_value = "pending")]
    Pending,
    #[sea_orm(string_value = "processing")]
    Processing,
    #[sea_orm(string_value = "success")]
    Success,
    #[sea_orm(string_value = "failed")]
    Failed,
}

impl TransactionStatus {
    /// Whether a row in this status may be promoted to `target`
    pub const fn can_promote_to(&self, target: &Self) -> bool {
        use TransactionStatus::{Failed, Pending, Processing, Success};

        matches!(
            (self, target),
            (Pending, Processing) | (Pending | Processing, Success) | (Pending | Processing, Failed)
        )
    }
}

impl TransactionStatus {
    /// Value as stored in the database
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Processing => "processing",
            Self::Success => "success",
            Self::Failed => "failed",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, EnumIter, DeriveActiveEnum, Serialize, Deserialize)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::None)")]
#[serde(rename_all = "snake_case")]
pub enum WithdrawalStatus {
    #[sea_orm(string_value = "pending")]
    Pending,
    #[sea_orm(string_value = "paid")]
    Paid,
    #[sea_orm(string_value = "denied")]
    Denied,
}

impl WithdrawalStatus {
    /// Value as stored in the database
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Paid => "paid",
            Self::Denied => "denied",
        }
    }
}
