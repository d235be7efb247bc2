//! Ledger Store
//!
//! The only code path that changes `wallets.balance` / `wallets.escrow_balance`
//! and the only one that inserts `transactions` rows. Every balance change is a
//! conditional `UPDATE ... SET balance = balance - ? WHERE id = ? AND balance >= ?`
//! executed by the database, never a read-modify-write in memory, and is paired
//! with exactly one transaction row in the same database transaction.
//!
//! The `apply_*` building blocks take any `ConnectionTrait` so the order state
//! machine and the withdrawal engine can compose them with their own status
//! updates inside one `DatabaseTransaction`. The `LedgerStore` methods wrap a
//! single building block in its own transaction.

use chrono::Utc;
use rust_decimal::Decimal;
use sea_orm::{
    sea_query::{Expr, OnConflict},
    ActiveModelTrait, ColumnTrait, Condition, ConnectionTrait, DatabaseConnection, EntityTrait,
    QueryFilter, QueryOrder, Set, TransactionTrait,
};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::entities::{
    prelude::{Transactions, Wallets},
    sea_orm_active_enums::{TransactionStatus, TransactionType, WalletType},
    transactions, wallets,
};
use crate::error::EscrowError;

/// Owner id of the house wallet that collects platform fees
pub const PLATFORM_OWNER_ID: i32 = 0;

/// Why a ledger movement happened; copied onto the transaction row
#[derive(Debug, Clone, Default)]
pub struct LedgerCause {
    pub order_id: Option<i32>,
    pub withdrawal_request_id: Option<i32>,
    pub description: Option<String>,
}

impl LedgerCause {
    pub fn order(order_id: i32, description: impl Into<String>) -> Self {
        Self {
            order_id: Some(order_id),
            withdrawal_request_id: None,
            description: Some(description.into()),
        }
    }

    pub fn withdrawal(withdrawal_request_id: i32, description: impl Into<String>) -> Self {
        Self {
            order_id: None,
            withdrawal_request_id: Some(withdrawal_request_id),
            description: Some(description.into()),
        }
    }
}

/// Rows written by a release
#[derive(Debug, Clone)]
pub struct ReleaseReceipt {
    pub release: transactions::Model,
    pub platform_fee: transactions::Model,
}

/// Result of applying a settled deposit
#[derive(Debug, Clone)]
pub struct DepositOutcome {
    pub transaction: transactions::Model,
    /// True when the gateway id had already been applied
    pub replayed: bool,
}

/// Stored balances next to the balances rebuilt from the transaction log
#[derive(Debug, Clone, Serialize)]
pub struct Reconciliation {
    pub wallet_id: i32,
    pub stored_balance: Decimal,
    pub stored_escrow_balance: Decimal,
    pub derived_balance: Decimal,
    pub derived_escrow_balance: Decimal,
    pub transactions_replayed: usize,
    pub consistent: bool,
}

#[derive(Clone)]
pub struct LedgerStore {
    db: DatabaseConnection,
}

impl LedgerStore {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    pub fn db(&self) -> &DatabaseConnection {
        &self.db
    }

    pub async fn wallet(&self, wallet_id: i32) -> Result<wallets::Model, EscrowError> {
        Wallets::find_by_id(wallet_id)
            .one(&self.db)
            .await?
            .ok_or_else(|| EscrowError::not_found(format!("wallet {}", wallet_id)))
    }

    pub async fn find_wallet(
        &self,
        owner_id: i32,
        wallet_type: WalletType,
    ) -> Result<Option<wallets::Model>, EscrowError> {
        find_wallet(&self.db, owner_id, wallet_type).await
    }

    /// Lazily create the wallet for (owner, type)
    pub async fn ensure_wallet(
        &self,
        owner_id: i32,
        wallet_type: WalletType,
    ) -> Result<wallets::Model, EscrowError> {
        ensure_wallet(&self.db, owner_id, wallet_type).await
    }

    pub async fn hold(
        &self,
        wallet_id: i32,
        amount: Decimal,
        cause: LedgerCause,
    ) -> Result<transactions::Model, EscrowError> {
        let txn = self.db.begin().await?;
        let tx = apply_hold(&txn, wallet_id, amount, &cause).await?;
        txn.commit().await?;
        Ok(tx)
    }

    pub async fn release(
        &self,
        source_wallet_id: i32,
        dest_wallet_id: i32,
        gross_amount: Decimal,
        fee: Decimal,
        cause: LedgerCause,
    ) -> Result<ReleaseReceipt, EscrowError> {
        let txn = self.db.begin().await?;
        let receipt =
            apply_release(&txn, source_wallet_id, dest_wallet_id, gross_amount, fee, &cause).await?;
        txn.commit().await?;
        Ok(receipt)
    }

    pub async fn refund(
        &self,
        wallet_id: i32,
        amount: Decimal,
        cause: LedgerCause,
    ) -> Result<transactions::Model, EscrowError> {
        let txn = self.db.begin().await?;
        let tx = apply_refund(&txn, wallet_id, amount, &cause).await?;
        txn.commit().await?;
        Ok(tx)
    }

    /// Credit a deposit confirmed by the payment gateway.
    ///
    /// Idempotent per `gateway_id`: a replayed confirmation returns the
    /// original row without crediting again.
    pub async fn deposit_settled(
        &self,
        wallet_id: i32,
        amount: Decimal,
        gateway_id: &str,
    ) -> Result<DepositOutcome, EscrowError> {
        let txn = self.db.begin().await?;
        let outcome = apply_deposit(&txn, wallet_id, amount, gateway_id).await?;
        txn.commit().await?;
        Ok(outcome)
    }

    /// Sum of pending escrow_release credits (the credit pool) for a wallet
    pub async fn credit_pool(&self, wallet_id: i32) -> Result<Decimal, EscrowError> {
        let credits = pending_credits(&self.db, wallet_id).await?;
        Ok(credits.iter().map(|c| c.net_amount).sum())
    }

    pub async fn transactions_for(
        &self,
        wallet_id: i32,
    ) -> Result<Vec<transactions::Model>, EscrowError> {
        Ok(Transactions::find()
            .filter(transactions::Column::WalletId.eq(wallet_id))
            .order_by_asc(transactions::Column::CreatedAt)
            .order_by_asc(transactions::Column::Id)
            .all(&self.db)
            .await?)
    }

    /// Rebuild a wallet's balances by replaying its transaction log
    pub async fn reconcile(&self, wallet_id: i32) -> Result<Reconciliation, EscrowError> {
        let wallet = self.wallet(wallet_id).await?;

        let rows = Transactions::find()
            .filter(
                Condition::any()
                    .add(transactions::Column::WalletId.eq(wallet_id))
                    .add(transactions::Column::SourceWalletId.eq(wallet_id)),
            )
            .order_by_asc(transactions::Column::Id)
            .all(&self.db)
            .await?;

        let mut balance = Decimal::ZERO;
        let mut escrow = Decimal::ZERO;

        for row in &rows {
            let effect = effect_of(row);
            if row.wallet_id == wallet_id {
                balance += effect.balance;
                escrow += effect.escrow;
            }
            if row.source_wallet_id == Some(wallet_id) {
                escrow += effect.source_escrow;
            }
        }

        let consistent = balance == wallet.balance && escrow == wallet.escrow_balance;
        if !consistent {
            warn!(
                wallet_id = wallet_id,
                stored_balance = %wallet.balance,
                derived_balance = %balance,
                stored_escrow = %wallet.escrow_balance,
                derived_escrow = %escrow,
                "Wallet does not match its transaction log"
            );
        }

        Ok(Reconciliation {
            wallet_id,
            stored_balance: wallet.balance,
            stored_escrow_balance: wallet.escrow_balance,
            derived_balance: balance,
            derived_escrow_balance: escrow,
            transactions_replayed: rows.len(),
            consistent,
        })
    }
}

/// Balance deltas a transaction row stands for
#[derive(Debug, Default, PartialEq)]
struct Effect {
    balance: Decimal,
    escrow: Decimal,
    source_escrow: Decimal,
}

fn effect_of(row: &transactions::Model) -> Effect {
    match row.tx_type {
        TransactionType::Deposit => match row.status {
            TransactionStatus::Success => Effect {
                balance: row.net_amount,
                ..Default::default()
            },
            TransactionStatus::Pending | TransactionStatus::Processing | TransactionStatus::Failed => {
                Effect::default()
            }
        },
        // Not emitted by this service
        TransactionType::Withdrawal => Effect::default(),
        TransactionType::EscrowHold => Effect {
            balance: -row.amount,
            escrow: row.amount,
            ..Default::default()
        },
        // The credit's status tracks withdrawal pulls, not the balance effect
        TransactionType::EscrowRelease => Effect {
            balance: row.net_amount,
            source_escrow: -row.amount,
            ..Default::default()
        },
        TransactionType::PlatformFee => Effect {
            balance: row.amount,
            source_escrow: -row.amount,
            ..Default::default()
        },
        TransactionType::Refund => Effect {
            balance: row.amount,
            escrow: -row.amount,
            ..Default::default()
        },
        TransactionType::Payout => match row.status {
            TransactionStatus::Success => Effect {
                escrow: -row.amount,
                ..Default::default()
            },
            TransactionStatus::Pending | TransactionStatus::Processing | TransactionStatus::Failed => {
                Effect::default()
            }
        },
    }
}

fn ensure_positive(amount: Decimal, what: &str) -> Result<(), EscrowError> {
    if amount <= Decimal::ZERO {
        return Err(EscrowError::validation(format!("{} must be positive", what)));
    }
    Ok(())
}

pub async fn find_wallet<C: ConnectionTrait>(
    conn: &C,
    owner_id: i32,
    wallet_type: WalletType,
) -> Result<Option<wallets::Model>, EscrowError> {
    Ok(Wallets::find()
        .filter(wallets::Column::OwnerId.eq(owner_id))
        .filter(wallets::Column::WalletType.eq(wallet_type))
        .one(conn)
        .await?)
}

/// Take the row lock on the (owner, type) wallet for the rest of the
/// transaction and return its current state.
///
/// Reads made after this call see every change committed by transactions
/// that held the lock before, so a caller can compute over balance and
/// credits without another writer moving them underneath.
pub async fn lock_wallet<C: ConnectionTrait>(
    conn: &C,
    owner_id: i32,
    wallet_type: WalletType,
) -> Result<Option<wallets::Model>, EscrowError> {
    let touched = Wallets::update_many()
        .col_expr(wallets::Column::UpdatedAt, Expr::value(Utc::now().fixed_offset()))
        .filter(wallets::Column::OwnerId.eq(owner_id))
        .filter(wallets::Column::WalletType.eq(wallet_type))
        .exec(conn)
        .await?;
    if touched.rows_affected == 0 {
        return Ok(None);
    }
    find_wallet(conn, owner_id, wallet_type).await
}

/// Get or create the wallet for (owner, type). Concurrent creators collapse
/// onto the unique (owner_id, wallet_type) index.
pub async fn ensure_wallet<C: ConnectionTrait>(
    conn: &C,
    owner_id: i32,
    wallet_type: WalletType,
) -> Result<wallets::Model, EscrowError> {
    if let Some(wallet) = find_wallet(conn, owner_id, wallet_type).await? {
        return Ok(wallet);
    }

    let now = Utc::now().fixed_offset();
    let new_wallet = wallets::ActiveModel {
        owner_id: Set(owner_id),
        wallet_type: Set(wallet_type),
        balance: Set(Decimal::ZERO),
        escrow_balance: Set(Decimal::ZERO),
        created_at: Set(now),
        updated_at: Set(now),
        ..Default::default()
    };

    Wallets::insert(new_wallet)
        .on_conflict(
            OnConflict::columns([wallets::Column::OwnerId, wallets::Column::WalletType])
                .do_nothing()
                .to_owned(),
        )
        .exec_without_returning(conn)
        .await?;

    info!(owner_id = owner_id, wallet_type = wallet_type.as_str(), "Created wallet");

    find_wallet(conn, owner_id, wallet_type)
        .await?
        .ok_or_else(|| EscrowError::Database(format!("wallet for owner {} vanished", owner_id)))
}

async fn insert_transaction<C: ConnectionTrait>(
    conn: &C,
    row: transactions::ActiveModel,
) -> Result<transactions::Model, EscrowError> {
    Ok(row.insert(conn).await?)
}

fn new_row(
    wallet_id: i32,
    tx_type: TransactionType,
    amount: Decimal,
    status: TransactionStatus,
    cause: &LedgerCause,
) -> transactions::ActiveModel {
    let now = Utc::now().fixed_offset();
    transactions::ActiveModel {
        wallet_id: Set(wallet_id),
        source_wallet_id: Set(None),
        order_id: Set(cause.order_id),
        withdrawal_request_id: Set(cause.withdrawal_request_id),
        tx_type: Set(tx_type),
        amount: Set(amount),
        fee: Set(Decimal::ZERO),
        net_amount: Set(amount),
        status: Set(status),
        gateway_id: Set(None),
        description: Set(cause.description.clone()),
        created_at: Set(now),
        updated_at: Set(now),
        ..Default::default()
    }
}

/// balance -= amount; escrow_balance += amount. Fails InsufficientFunds
/// (leaving the wallet untouched) when balance < amount.
pub async fn apply_hold<C: ConnectionTrait>(
    conn: &C,
    wallet_id: i32,
    amount: Decimal,
    cause: &LedgerCause,
) -> Result<transactions::Model, EscrowError> {
    ensure_positive(amount, "hold amount")?;

    let result = Wallets::update_many()
        .col_expr(wallets::Column::Balance, Expr::col(wallets::Column::Balance).sub(amount))
        .col_expr(
            wallets::Column::EscrowBalance,
            Expr::col(wallets::Column::EscrowBalance).add(amount),
        )
        .col_expr(wallets::Column::UpdatedAt, Expr::value(Utc::now().fixed_offset()))
        .filter(wallets::Column::Id.eq(wallet_id))
        .filter(wallets::Column::Balance.gte(amount))
        .exec(conn)
        .await?;

    if result.rows_affected == 0 {
        let wallet = Wallets::find_by_id(wallet_id)
            .one(conn)
            .await?
            .ok_or_else(|| EscrowError::not_found(format!("wallet {}", wallet_id)))?;
        return Err(EscrowError::InsufficientFunds {
            required: amount,
            available: wallet.balance,
        });
    }

    let tx = insert_transaction(
        conn,
        new_row(wallet_id, TransactionType::EscrowHold, amount, TransactionStatus::Success, cause),
    )
    .await?;

    debug!(wallet_id = wallet_id, amount = %amount, tx_id = tx.id, "Escrow hold applied");
    Ok(tx)
}

/// Move `gross_amount` out of the source wallet's escrow: `gross - fee` to
/// the destination balance, `fee` to the platform wallet. Writes one
/// escrow_release row (pending, it joins the destination's credit pool) and
/// one platform_fee row.
pub async fn apply_release<C: ConnectionTrait>(
    conn: &C,
    source_wallet_id: i32,
    dest_wallet_id: i32,
    gross_amount: Decimal,
    fee: Decimal,
    cause: &LedgerCause,
) -> Result<ReleaseReceipt, EscrowError> {
    ensure_positive(gross_amount, "release amount")?;
    if fee < Decimal::ZERO || fee > gross_amount {
        return Err(EscrowError::validation("fee must be within [0, gross amount]"));
    }
    let net = gross_amount - fee;
    let now = Utc::now().fixed_offset();

    let debited = Wallets::update_many()
        .col_expr(
            wallets::Column::EscrowBalance,
            Expr::col(wallets::Column::EscrowBalance).sub(gross_amount),
        )
        .col_expr(wallets::Column::UpdatedAt, Expr::value(now))
        .filter(wallets::Column::Id.eq(source_wallet_id))
        .filter(wallets::Column::EscrowBalance.gte(gross_amount))
        .exec(conn)
        .await?;

    if debited.rows_affected == 0 {
        let wallet = Wallets::find_by_id(source_wallet_id)
            .one(conn)
            .await?
            .ok_or_else(|| EscrowError::not_found(format!("wallet {}", source_wallet_id)))?;
        return Err(EscrowError::InsufficientFunds {
            required: gross_amount,
            available: wallet.escrow_balance,
        });
    }

    credit_balance(conn, dest_wallet_id, net).await?;

    let platform = ensure_wallet(conn, PLATFORM_OWNER_ID, WalletType::Platform).await?;
    if fee > Decimal::ZERO {
        credit_balance(conn, platform.id, fee).await?;
    }

    let mut release_row = new_row(
        dest_wallet_id,
        TransactionType::EscrowRelease,
        net,
        TransactionStatus::Pending,
        cause,
    );
    release_row.source_wallet_id = Set(Some(source_wallet_id));
    let release = insert_transaction(conn, release_row).await?;

    let mut fee_row = new_row(
        platform.id,
        TransactionType::PlatformFee,
        fee,
        TransactionStatus::Success,
        cause,
    );
    fee_row.source_wallet_id = Set(Some(source_wallet_id));
    let platform_fee = insert_transaction(conn, fee_row).await?;

    debug!(
        source_wallet_id = source_wallet_id,
        dest_wallet_id = dest_wallet_id,
        gross = %gross_amount,
        fee = %fee,
        "Escrow release applied"
    );

    Ok(ReleaseReceipt {
        release,
        platform_fee,
    })
}

async fn credit_balance<C: ConnectionTrait>(
    conn: &C,
    wallet_id: i32,
    amount: Decimal,
) -> Result<(), EscrowError> {
    let result = Wallets::update_many()
        .col_expr(wallets::Column::Balance, Expr::col(wallets::Column::Balance).add(amount))
        .col_expr(wallets::Column::UpdatedAt, Expr::value(Utc::now().fixed_offset()))
        .filter(wallets::Column::Id.eq(wallet_id))
        .exec(conn)
        .await?;

    if result.rows_affected == 0 {
        return Err(EscrowError::not_found(format!("wallet {}", wallet_id)));
    }
    Ok(())
}

/// balance += amount; escrow_balance -= amount
pub async fn apply_refund<C: ConnectionTrait>(
    conn: &C,
    wallet_id: i32,
    amount: Decimal,
    cause: &LedgerCause,
) -> Result<transactions::Model, EscrowError> {
    ensure_positive(amount, "refund amount")?;

    let result = Wallets::update_many()
        .col_expr(wallets::Column::Balance, Expr::col(wallets::Column::Balance).add(amount))
        .col_expr(
            wallets::Column::EscrowBalance,
            Expr::col(wallets::Column::EscrowBalance).sub(amount),
        )
        .col_expr(wallets::Column::UpdatedAt, Expr::value(Utc::now().fixed_offset()))
        .filter(wallets::Column::Id.eq(wallet_id))
        .filter(wallets::Column::EscrowBalance.gte(amount))
        .exec(conn)
        .await?;

    if result.rows_affected == 0 {
        let wallet = Wallets::find_by_id(wallet_id)
            .one(conn)
            .await?
            .ok_or_else(|| EscrowError::not_found(format!("wallet {}", wallet_id)))?;
        return Err(EscrowError::InsufficientFunds {
            required: amount,
            available: wallet.escrow_balance,
        });
    }

    insert_transaction(
        conn,
        new_row(wallet_id, TransactionType::Refund, amount, TransactionStatus::Success, cause),
    )
    .await
}

pub async fn apply_deposit<C: ConnectionTrait>(
    conn: &C,
    wallet_id: i32,
    amount: Decimal,
    gateway_id: &str,
) -> Result<DepositOutcome, EscrowError> {
    ensure_positive(amount, "deposit amount")?;
    if gateway_id.trim().is_empty() {
        return Err(EscrowError::validation("gateway transaction id is required"));
    }

    let mut row = new_row(
        wallet_id,
        TransactionType::Deposit,
        amount,
        TransactionStatus::Success,
        &LedgerCause {
            description: Some("deposit confirmed by payment gateway".to_string()),
            ..Default::default()
        },
    );
    row.gateway_id = Set(Some(gateway_id.to_string()));

    // The unique (tx_type, gateway_id) index turns a replay into a no-op insert
    let inserted = Transactions::insert(row)
        .on_conflict(
            OnConflict::columns([transactions::Column::TxType, transactions::Column::GatewayId])
                .do_nothing()
                .to_owned(),
        )
        .exec_without_returning(conn)
        .await?;

    let transaction = Transactions::find()
        .filter(transactions::Column::TxType.eq(TransactionType::Deposit))
        .filter(transactions::Column::GatewayId.eq(gateway_id))
        .one(conn)
        .await?
        .ok_or_else(|| EscrowError::Database(format!("deposit {} vanished", gateway_id)))?;

    if inserted == 0 {
        if transaction.wallet_id != wallet_id {
            warn!(
                gateway_id = gateway_id,
                wallet_id = wallet_id,
                owner_wallet_id = transaction.wallet_id,
                "Deposit confirmation for a gateway id credited to another wallet"
            );
            return Err(EscrowError::conflict(format!(
                "gateway transaction {} belongs to another wallet",
                gateway_id
            )));
        }
        info!(gateway_id = gateway_id, "Deposit confirmation replayed, not crediting again");
        return Ok(DepositOutcome {
            transaction,
            replayed: true,
        });
    }

    credit_balance(conn, wallet_id, amount).await?;
    info!(wallet_id = wallet_id, amount = %amount, gateway_id = gateway_id, "Deposit settled");

    Ok(DepositOutcome {
        transaction,
        replayed: false,
    })
}

/// Pending escrow_release credits for a wallet, oldest first
pub async fn pending_credits<C: ConnectionTrait>(
    conn: &C,
    wallet_id: i32,
) -> Result<Vec<transactions::Model>, EscrowError> {
    Ok(Transactions::find()
        .filter(transactions::Column::WalletId.eq(wallet_id))
        .filter(transactions::Column::TxType.eq(TransactionType::EscrowRelease))
        .filter(transactions::Column::Status.eq(TransactionStatus::Pending))
        .order_by_asc(transactions::Column::CreatedAt)
        .order_by_asc(transactions::Column::Id)
        .all(conn)
        .await?)
}

/// Pull `take` out of a pending credit into a withdrawal.
///
/// The consumed part stays on the original row (now `processing`, tagged
/// with the withdrawal id). A partial pull writes the remainder as a new
/// pending escrow_release row so it stays available to later withdrawals.
/// Balance effects are unchanged: the split rows sum to the original.
pub async fn consume_credit<C: ConnectionTrait>(
    conn: &C,
    credit: &transactions::Model,
    take: Decimal,
    withdrawal_request_id: i32,
) -> Result<Option<transactions::Model>, EscrowError> {
    if take <= Decimal::ZERO || take > credit.net_amount {
        return Err(EscrowError::validation(format!(
            "cannot consume {} from credit {} of {}",
            take, credit.id, credit.net_amount
        )));
    }
    let remainder = credit.net_amount - take;
    let now = Utc::now().fixed_offset();

    let claimed = Transactions::update_many()
        .col_expr(transactions::Column::Amount, Expr::value(take))
        .col_expr(transactions::Column::NetAmount, Expr::value(take))
        .col_expr(transactions::Column::Status, Expr::value(TransactionStatus::Processing))
        .col_expr(
            transactions::Column::WithdrawalRequestId,
            Expr::value(Some(withdrawal_request_id)),
        )
        .col_expr(transactions::Column::UpdatedAt, Expr::value(now))
        .filter(transactions::Column::Id.eq(credit.id))
        .filter(transactions::Column::Status.eq(TransactionStatus::Pending))
        .exec(conn)
        .await?;

    if claimed.rows_affected == 0 {
        return Err(EscrowError::conflict(format!(
            "credit {} was pulled by a concurrent withdrawal",
            credit.id
        )));
    }

    if remainder == Decimal::ZERO {
        return Ok(None);
    }

    let split = transactions::ActiveModel {
        wallet_id: Set(credit.wallet_id),
        source_wallet_id: Set(credit.source_wallet_id),
        order_id: Set(credit.order_id),
        withdrawal_request_id: Set(None),
        tx_type: Set(TransactionType::EscrowRelease),
        amount: Set(remainder),
        fee: Set(Decimal::ZERO),
        net_amount: Set(remainder),
        status: Set(TransactionStatus::Pending),
        gateway_id: Set(None),
        description: Set(Some(format!("remainder of credit {}", credit.id))),
        // Keeps its place in the oldest-first queue
        created_at: Set(credit.created_at),
        updated_at: Set(now),
        ..Default::default()
    };

    Ok(Some(insert_transaction(conn, split).await?))
}

/// Promote every credit pulled into a withdrawal to `status`
pub async fn settle_credits<C: ConnectionTrait>(
    conn: &C,
    withdrawal_request_id: i32,
    status: TransactionStatus,
) -> Result<u64, EscrowError> {
    let result = Transactions::update_many()
        .col_expr(transactions::Column::Status, Expr::value(status))
        .col_expr(transactions::Column::UpdatedAt, Expr::value(Utc::now().fixed_offset()))
        .filter(transactions::Column::WithdrawalRequestId.eq(withdrawal_request_id))
        .filter(transactions::Column::TxType.eq(TransactionType::EscrowRelease))
        .filter(transactions::Column::Status.eq(TransactionStatus::Processing))
        .exec(conn)
        .await?;
    Ok(result.rows_affected)
}

/// Record a payout the gateway is about to execute. No balance effect until
/// `complete_payout`.
pub async fn begin_payout<C: ConnectionTrait>(
    conn: &C,
    wallet_id: i32,
    amount: Decimal,
    cause: &LedgerCause,
) -> Result<transactions::Model, EscrowError> {
    ensure_positive(amount, "payout amount")?;
    insert_transaction(
        conn,
        new_row(wallet_id, TransactionType::Payout, amount, TransactionStatus::Processing, cause),
    )
    .await
}

/// Funds left the platform: escrow_balance -= amount, payout row -> success
pub async fn complete_payout<C: ConnectionTrait>(
    conn: &C,
    payout: &transactions::Model,
    gateway_id: &str,
) -> Result<transactions::Model, EscrowError> {
    if !payout.status.can_promote_to(&TransactionStatus::Success) {
        return Err(EscrowError::conflict(format!(
            "payout {} is already {}",
            payout.id,
            payout.status.as_str()
        )));
    }

    let result = Wallets::update_many()
        .col_expr(
            wallets::Column::EscrowBalance,
            Expr::col(wallets::Column::EscrowBalance).sub(payout.amount),
        )
        .col_expr(wallets::Column::UpdatedAt, Expr::value(Utc::now().fixed_offset()))
        .filter(wallets::Column::Id.eq(payout.wallet_id))
        .filter(wallets::Column::EscrowBalance.gte(payout.amount))
        .exec(conn)
        .await?;

    if result.rows_affected == 0 {
        let wallet = Wallets::find_by_id(payout.wallet_id)
            .one(conn)
            .await?
            .ok_or_else(|| EscrowError::not_found(format!("wallet {}", payout.wallet_id)))?;
        return Err(EscrowError::InsufficientFunds {
            required: payout.amount,
            available: wallet.escrow_balance,
        });
    }

    promote(conn, payout.id, payout.status, TransactionStatus::Success, Some(gateway_id)).await
}

pub async fn fail_payout<C: ConnectionTrait>(
    conn: &C,
    payout: &transactions::Model,
) -> Result<transactions::Model, EscrowError> {
    promote(conn, payout.id, payout.status, TransactionStatus::Failed, None).await
}

async fn promote<C: ConnectionTrait>(
    conn: &C,
    tx_id: i32,
    from: TransactionStatus,
    to: TransactionStatus,
    gateway_id: Option<&str>,
) -> Result<transactions::Model, EscrowError> {
    let mut update = Transactions::update_many()
        .col_expr(transactions::Column::Status, Expr::value(to))
        .col_expr(transactions::Column::UpdatedAt, Expr::value(Utc::now().fixed_offset()));
    if let Some(id) = gateway_id {
        update = update.col_expr(transactions::Column::GatewayId, Expr::value(Some(id.to_string())));
    }

    let result = update
        .filter(transactions::Column::Id.eq(tx_id))
        .filter(transactions::Column::Status.eq(from))
        .exec(conn)
        .await?;

    if result.rows_affected == 0 {
        return Err(EscrowError::conflict(format!(
            "transaction {} changed status concurrently",
            tx_id
        )));
    }

    Transactions::find_by_id(tx_id)
        .one(conn)
        .await?
        .ok_or_else(|| EscrowError::not_found(format!("transaction {}", tx_id)))
}
