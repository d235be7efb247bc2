//! Withdrawal settlement engine.
//!
//! A publisher's spendable balance has two parts: free funds and the credit
//! pool (pending escrow_release rows from completed orders). A request is
//! funded from free funds first, then from credits oldest-first, splitting
//! the last credit it touches. The full amount moves to escrow until an
//! admin approves (payout) or denies (refund) the request.

use chrono::Utc;
use rust_decimal::Decimal;
use sea_orm::{
    sea_query::Expr, ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection,
    EntityTrait, QueryFilter, QueryOrder, Set, TransactionTrait,
};
use std::sync::Arc;
use std::time::Duration;

use crate::entities::{
    prelude::WithdrawalRequests,
    sea_orm_active_enums::{TransactionStatus, WalletType, WithdrawalStatus},
    transactions, withdrawal_requests,
};
use crate::error::EscrowError;
use crate::services::ledger::{self, LedgerCause};
use crate::services::notifications::{dispatch, EventKind, Notification, Notifier};
use crate::services::payout_gateway::{PayoutDestination, PayoutGateway, PayoutStatus};

#[derive(Debug, Clone, PartialEq)]
pub struct Allocation {
    pub from_wallet: Decimal,
    pub from_orders: Decimal,
    /// (credit id, amount taken) in consumption order
    pub credits: Vec<(i32, Decimal)>,
}

/// Split `amount` between free balance and pending credits (oldest first).
///
/// `credits` must already be ordered oldest first.
pub fn allocate(
    amount: Decimal,
    balance: Decimal,
    credits: &[transactions::Model],
) -> Result<Allocation, EscrowError> {
    if amount <= Decimal::ZERO {
        return Err(EscrowError::validation("withdrawal amount must be positive"));
    }

    let pool: Decimal = credits.iter().map(|c| c.net_amount).sum();
    let free = (balance - pool).max(Decimal::ZERO);
    if amount > free + pool {
        return Err(EscrowError::InsufficientFunds {
            required: amount,
            available: free + pool,
        });
    }

    let from_wallet = amount.min(free);
    let mut remaining = amount - from_wallet;
    let mut taken = Vec::new();

    for credit in credits {
        if remaining == Decimal::ZERO {
            break;
        }
        let take = remaining.min(credit.net_amount);
        taken.push((credit.id, take));
        remaining -= take;
    }

    Ok(Allocation {
        from_wallet,
        from_orders: amount - from_wallet,
        credits: taken,
    })
}

#[derive(Clone)]
pub struct WithdrawalService {
    db: DatabaseConnection,
    gateway: Arc<dyn PayoutGateway>,
    notifier: Arc<dyn Notifier>,
    payout_timeout: Duration,
}

async fn load<C: ConnectionTrait>(
    conn: &C,
    withdrawal_id: i32,
) -> Result<withdrawal_requests::Model, EscrowError> {
    WithdrawalRequests::find_by_id(withdrawal_id)
        .one(conn)
        .await?
        .ok_or_else(|| EscrowError::not_found(format!("withdrawal request {}", withdrawal_id)))
}

fn already_resolved(request: &withdrawal_requests::Model) -> EscrowError {
    EscrowError::conflict(format!(
        "withdrawal request {} is already {}",
        request.id,
        request.status.as_str()
    ))
}

impl WithdrawalService {
    pub fn new(
        db: DatabaseConnection,
        gateway: Arc<dyn PayoutGateway>,
        notifier: Arc<dyn Notifier>,
        payout_timeout: Duration,
    ) -> Self {
        Self {
            db,
            gateway,
            notifier,
            payout_timeout,
        }
    }

    pub async fn get(&self, withdrawal_id: i32) -> Result<withdrawal_requests::Model, EscrowError> {
        load(&self.db, withdrawal_id).await
    }

    pub async fn list_for_publisher(
        &self,
        publisher_id: i32,
    ) -> Result<Vec<withdrawal_requests::Model>, EscrowError> {
        Ok(WithdrawalRequests::find()
            .filter(withdrawal_requests::Column::PublisherId.eq(publisher_id))
            .order_by_desc(withdrawal_requests::Column::CreatedAt)
            .all(&self.db)
            .await?)
    }

    pub async fn request_withdrawal(
        &self,
        publisher_id: i32,
        amount: Decimal,
        method: &str,
        details: Option<serde_json::Value>,
    ) -> Result<withdrawal_requests::Model, EscrowError> {
        let method = method.trim();
        if method.is_empty() {
            return Err(EscrowError::validation("payout method is required"));
        }
        if amount <= Decimal::ZERO {
            return Err(EscrowError::validation("withdrawal amount must be positive"));
        }

        let txn = self.db.begin().await?;

        // Concurrent requests on one wallet queue here
        let wallet = ledger::lock_wallet(&txn, publisher_id, WalletType::Publisher)
            .await?
            .ok_or_else(|| EscrowError::not_found("publisher wallet"))?;
        let credits = ledger::pending_credits(&txn, wallet.id).await?;
        let allocation = allocate(amount, wallet.balance, &credits)?;

        let now = Utc::now().fixed_offset();
        let request = withdrawal_requests::ActiveModel {
            publisher_id: Set(publisher_id),
            wallet_id: Set(wallet.id),
            amount: Set(amount),
            amount_from_wallet: Set(allocation.from_wallet),
            amount_from_orders: Set(allocation.from_orders),
            method: Set(method.to_string()),
            details: Set(details),
            status: Set(WithdrawalStatus::Pending),
            denial_reason: Set(None),
            payout_in_flight: Set(false),
            gateway_payout_id: Set(None),
            resolved_at: Set(None),
            created_at: Set(now),
            updated_at: Set(now),
            ..Default::default()
        }
        .insert(&txn)
        .await?;

        for (credit_id, take) in &allocation.credits {
            let Some(credit) = credits.iter().find(|c| c.id == *credit_id) else {
                continue;
            };
            let split = ledger::consume_credit(&txn, credit, *take, request.id).await?;
            if let Some(rest) = split {
                tracing::debug!(
                    credit_id = credit.id,
                    remainder_id = rest.id,
                    remainder = %rest.net_amount,
                    "Split partially consumed credit"
                );
            }
        }

        ledger::apply_hold(
            &txn,
            wallet.id,
            amount,
            &LedgerCause::withdrawal(request.id, "funds held for withdrawal"),
        )
        .await?;

        txn.commit().await?;

        tracing::info!(
            withdrawal_id = request.id,
            publisher_id = publisher_id,
            amount = %amount,
            from_wallet = %allocation.from_wallet,
            from_orders = %allocation.from_orders,
            "Withdrawal requested"
        );

        Ok(request)
    }

    /// Pay a pending request out through the gateway.
    ///
    /// The request is claimed before the gateway call so two admins cannot
    /// both pay it. On any gateway failure (error, timeout, non-success
    /// status) the request stays `pending` and can be approved again.
    pub async fn approve(&self, withdrawal_id: i32) -> Result<withdrawal_requests::Model, EscrowError> {
        let request = load(&self.db, withdrawal_id).await?;
        if request.status != WithdrawalStatus::Pending {
            return Err(already_resolved(&request));
        }

        let txn = self.db.begin().await?;
        let claimed = WithdrawalRequests::update_many()
            .col_expr(withdrawal_requests::Column::PayoutInFlight, Expr::value(true))
            .col_expr(withdrawal_requests::Column::UpdatedAt, Expr::value(Utc::now().fixed_offset()))
            .filter(withdrawal_requests::Column::Id.eq(withdrawal_id))
            .filter(withdrawal_requests::Column::Status.eq(WithdrawalStatus::Pending))
            .filter(withdrawal_requests::Column::PayoutInFlight.eq(false))
            .exec(&txn)
            .await?;
        if claimed.rows_affected == 0 {
            return Err(EscrowError::conflict(format!(
                "withdrawal request {} is already being paid or was resolved",
                withdrawal_id
            )));
        }
        let payout = ledger::begin_payout(
            &txn,
            request.wallet_id,
            request.amount,
            &LedgerCause::withdrawal(withdrawal_id, format!("payout via {}", request.method)),
        )
        .await?;
        txn.commit().await?;

        dispatch(
            &self.notifier,
            Notification::withdrawal(request.publisher_id, withdrawal_id, EventKind::WithdrawalApproved),
        );

        let destination = PayoutDestination {
            method: request.method.clone(),
            details: request.details.clone(),
        };
        let outcome = match tokio::time::timeout(
            self.payout_timeout,
            self.gateway.create_payout(request.amount, &destination),
        )
        .await
        {
            Err(_) => Err(format!("payout timed out after {:?}", self.payout_timeout)),
            Ok(Err(e)) => Err(e.to_string()),
            Ok(Ok(receipt)) if receipt.status != PayoutStatus::Success => Err(format!(
                "payout {} reported {:?}",
                receipt.transaction_id, receipt.status
            )),
            Ok(Ok(receipt)) => Ok(receipt),
        };

        let receipt = match outcome {
            Ok(receipt) => receipt,
            Err(reason) => {
                tracing::warn!(withdrawal_id = withdrawal_id, error = %reason, "Payout failed, request left pending");
                if let Err(e) = self.release_claim(withdrawal_id, &payout).await {
                    tracing::error!(withdrawal_id = withdrawal_id, error = %e, "Failed to release payout claim");
                }
                return Err(EscrowError::ExternalGateway(reason));
            }
        };

        let settled = self.settle_paid(&request, &payout, &receipt.transaction_id).await;
        if let Err(e) = &settled {
            // Money has left; the claim stays set so nobody pays twice
            tracing::error!(
                withdrawal_id = withdrawal_id,
                gateway_id = %receipt.transaction_id,
                error = %e,
                "Payout succeeded but ledger finalization failed"
            );
        }
        let paid = settled?;

        tracing::info!(
            withdrawal_id = withdrawal_id,
            amount = %request.amount,
            gateway_id = %receipt.transaction_id,
            "Withdrawal paid"
        );
        dispatch(
            &self.notifier,
            Notification::withdrawal(request.publisher_id, withdrawal_id, EventKind::WithdrawalPaid),
        );

        Ok(paid)
    }

    async fn release_claim(
        &self,
        withdrawal_id: i32,
        payout: &transactions::Model,
    ) -> Result<(), EscrowError> {
        let txn = self.db.begin().await?;
        ledger::fail_payout(&txn, payout).await?;
        WithdrawalRequests::update_many()
            .col_expr(withdrawal_requests::Column::PayoutInFlight, Expr::value(false))
            .col_expr(withdrawal_requests::Column::UpdatedAt, Expr::value(Utc::now().fixed_offset()))
            .filter(withdrawal_requests::Column::Id.eq(withdrawal_id))
            .exec(&txn)
            .await?;
        txn.commit().await?;
        Ok(())
    }

    async fn settle_paid(
        &self,
        request: &withdrawal_requests::Model,
        payout: &transactions::Model,
        gateway_id: &str,
    ) -> Result<withdrawal_requests::Model, EscrowError> {
        let now = Utc::now().fixed_offset();
        let txn = self.db.begin().await?;

        ledger::complete_payout(&txn, payout, gateway_id).await?;

        let result = WithdrawalRequests::update_many()
            .col_expr(withdrawal_requests::Column::Status, Expr::value(WithdrawalStatus::Paid))
            .col_expr(withdrawal_requests::Column::PayoutInFlight, Expr::value(false))
            .col_expr(
                withdrawal_requests::Column::GatewayPayoutId,
                Expr::value(Some(gateway_id.to_string())),
            )
            .col_expr(withdrawal_requests::Column::ResolvedAt, Expr::value(Some(now)))
            .col_expr(withdrawal_requests::Column::UpdatedAt, Expr::value(now))
            .filter(withdrawal_requests::Column::Id.eq(request.id))
            .filter(withdrawal_requests::Column::Status.eq(WithdrawalStatus::Pending))
            .filter(withdrawal_requests::Column::PayoutInFlight.eq(true))
            .exec(&txn)
            .await?;
        if result.rows_affected == 0 {
            return Err(EscrowError::conflict(format!(
                "withdrawal request {} changed while its payout was in flight",
                request.id
            )));
        }

        ledger::settle_credits(&txn, request.id, TransactionStatus::Success).await?;

        let paid = load(&txn, request.id).await?;
        txn.commit().await?;
        Ok(paid)
    }

    /// Reject a pending request and return the funds to spendable balance
    pub async fn deny(
        &self,
        withdrawal_id: i32,
        reason: &str,
    ) -> Result<withdrawal_requests::Model, EscrowError> {
        let reason = reason.trim();
        if reason.is_empty() {
            return Err(EscrowError::validation("a denial reason is required"));
        }

        let now = Utc::now().fixed_offset();
        let txn = self.db.begin().await?;

        let result = WithdrawalRequests::update_many()
            .col_expr(withdrawal_requests::Column::Status, Expr::value(WithdrawalStatus::Denied))
            .col_expr(
                withdrawal_requests::Column::DenialReason,
                Expr::value(Some(reason.to_string())),
            )
            .col_expr(withdrawal_requests::Column::ResolvedAt, Expr::value(Some(now)))
            .col_expr(withdrawal_requests::Column::UpdatedAt, Expr::value(now))
            .filter(withdrawal_requests::Column::Id.eq(withdrawal_id))
            .filter(withdrawal_requests::Column::Status.eq(WithdrawalStatus::Pending))
            .filter(withdrawal_requests::Column::PayoutInFlight.eq(false))
            .exec(&txn)
            .await?;

        if result.rows_affected == 0 {
            let current = load(&txn, withdrawal_id).await?;
            if current.payout_in_flight {
                return Err(EscrowError::conflict(format!(
                    "withdrawal request {} has a payout in flight",
                    withdrawal_id
                )));
            }
            return Err(already_resolved(&current));
        }

        let request = load(&txn, withdrawal_id).await?;
        ledger::apply_refund(
            &txn,
            request.wallet_id,
            request.amount,
            &LedgerCause::withdrawal(withdrawal_id, format!("withdrawal denied: {}", reason)),
        )
        .await?;
        ledger::settle_credits(&txn, withdrawal_id, TransactionStatus::Success).await?;

        txn.commit().await?;

        tracing::info!(withdrawal_id = withdrawal_id, reason = reason, "Withdrawal denied");
        dispatch(
            &self.notifier,
            Notification::withdrawal(request.publisher_id, withdrawal_id, EventKind::WithdrawalDenied),
        );

        Ok(request)
    }
}
