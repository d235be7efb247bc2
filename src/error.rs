//! Error taxonomy shared by the ledger, order and withdrawal services.
//!
//! Every variant maps to a distinct HTTP status and machine code so a
//! client can tell "not enough money" from "not your order" from
//! "wrong state".

use axum::http::StatusCode;
use rust_decimal::Decimal;
use sea_orm::DbErr;
use thiserror::Error;

/// Errors surfaced by escrow operations.
///
/// `Clone` so that callers coalesced by the duplicate-submission guard all
/// receive the same failure.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum EscrowError {
    /// Missing or malformed input; never retried automatically
    #[error("validation error: {0}")]
    Validation(String),

    #[error("{0} not found")]
    NotFound(String),

    /// Illegal transition or a lost race against a concurrent caller
    #[error("conflict: {0}")]
    Conflict(String),

    #[error("forbidden: {0}")]
    Forbidden(String),

    #[error("insufficient funds: required {required}, available {available}")]
    InsufficientFunds {
        required: Decimal,
        available: Decimal,
    },

    /// The wallet did not exist; a zero-balance one may have been created
    #[error("{0}")]
    WalletNotFound(String),

    /// Payout/payment collaborator failure; retryable by the caller
    #[error("gateway error: {0}")]
    ExternalGateway(String),

    #[error("database error: {0}")]
    Database(String),
}

impl EscrowError {
    pub fn not_found(what: impl std::fmt::Display) -> Self {
        Self::NotFound(what.to_string())
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::Conflict(msg.into())
    }

    pub fn forbidden(msg: impl Into<String>) -> Self {
        Self::Forbidden(msg.into())
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    /// HTTP status the API layer answers with
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::Validation(_) => StatusCode::BAD_REQUEST,
            Self::NotFound(_) | Self::WalletNotFound(_) => StatusCode::NOT_FOUND,
            Self::Conflict(_) => StatusCode::CONFLICT,
            Self::Forbidden(_) => StatusCode::FORBIDDEN,
            Self::InsufficientFunds { .. } => StatusCode::PAYMENT_REQUIRED,
            Self::ExternalGateway(_) => StatusCode::BAD_GATEWAY,
            Self::Database(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Stable code for programmatic handling
    pub fn code(&self) -> &'static str {
        match self {
            Self::Validation(_) => "VALIDATION_ERROR",
            Self::NotFound(_) => "NOT_FOUND",
            Self::WalletNotFound(_) => "WALLET_NOT_FOUND",
            Self::Conflict(_) => "CONFLICT",
            Self::Forbidden(_) => "FORBIDDEN",
            Self::InsufficientFunds { .. } => "INSUFFICIENT_FUNDS",
            Self::ExternalGateway(_) => "GATEWAY_ERROR",
            Self::Database(_) => "DATABASE_ERROR",
        }
    }
}

impl From<DbErr> for EscrowError {
    fn from(e: DbErr) -> Self {
        Self::Database(e.to_string())
    }
}
