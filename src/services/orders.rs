//! Order lifecycle service.
//!
//! Every transition is a compare-and-set `UPDATE ... WHERE id = ? AND
//! status = <required prior status>`; a caller that loses a race sees zero
//! affected rows and gets a Conflict instead of a second ledger effect.
//! Ledger effects run in the same database transaction as the status write.

use chrono::{DateTime, Duration as ChronoDuration, FixedOffset, Utc};
use rust_decimal::Decimal;
use sea_orm::{
    sea_query::{Expr, Func},
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection,
    EntityTrait, QueryFilter, Set, TransactionTrait,
};
use std::sync::Arc;
use std::time::Duration;

use crate::entities::{
    order_audit_log, orders,
    prelude::{OrderAuditLog, Orders, Users},
    sea_orm_active_enums::{OrderStatus, RevisionStatus, WalletType},
    users,
};
use crate::error::EscrowError;
use crate::services::content_store::{ContentPayload, ContentStore};
use crate::services::duplicate_guard::{DuplicateGuard, Submission, SubmissionKey};
use crate::services::ledger::{self, LedgerCause};
use crate::services::listing_directory::{resolve_listing, ListingDirectory};
use crate::services::notifications::{dispatch, EventKind, Notification, Notifier};
use crate::services::order_state::{
    add_working_days, escrow_amounts, revision_transition, transition, within_revision_window,
    OrderAction, RevisionAction,
};
use crate::services::tat_estimator::{TatEstimator, TatOptions};

pub const AUDIT_PUBLISHER_REASSIGNED: &str = "publisher_reassigned";

#[derive(Debug, Clone, Default)]
pub struct NewOrder {
    pub listing_ref: Option<String>,
    pub total_amount: Option<Decimal>,
    pub fee_rate: Option<Decimal>,
    pub content: ContentPayload,
}

#[derive(Debug, Clone, Copy)]
pub struct OrderPolicy {
    pub default_fee_rate: Decimal,
    pub duplicate_window: Duration,
    pub revision_window_days: u32,
}

#[derive(Clone)]
pub struct OrderService {
    db: DatabaseConnection,
    directory: Arc<dyn ListingDirectory>,
    content: Arc<dyn ContentStore>,
    notifier: Arc<dyn Notifier>,
    tat: TatEstimator,
    guard: DuplicateGuard,
    policy: OrderPolicy,
}

fn now() -> DateTime<FixedOffset> {
    Utc::now().fixed_offset()
}

/// Zero affected rows on a compare-and-set means the precondition was lost
fn require_one(rows_affected: u64, order_id: i32, action: &str) -> Result<(), EscrowError> {
    if rows_affected == 0 {
        return Err(EscrowError::conflict(format!(
            "order {} changed concurrently, {} not applied",
            order_id, action
        )));
    }
    Ok(())
}

async fn load<C: ConnectionTrait>(conn: &C, order_id: i32) -> Result<orders::Model, EscrowError> {
    Orders::find_by_id(order_id)
        .one(conn)
        .await?
        .ok_or_else(|| EscrowError::not_found(format!("order {}", order_id)))
}

impl OrderService {
    pub fn new(
        db: DatabaseConnection,
        directory: Arc<dyn ListingDirectory>,
        content: Arc<dyn ContentStore>,
        notifier: Arc<dyn Notifier>,
        tat: TatEstimator,
        policy: OrderPolicy,
    ) -> Self {
        Self {
            db,
            directory,
            content,
            notifier,
            tat,
            guard: DuplicateGuard::new(policy.duplicate_window),
            policy,
        }
    }

    fn notify(&self, notification: Notification) {
        dispatch(&self.notifier, notification);
    }

    pub async fn get_order(&self, order_id: i32) -> Result<orders::Model, EscrowError> {
        load(&self.db, order_id).await
    }

    /// The order plus its content, for a party to the order or the listing owner
    pub async fn order_for(
        &self,
        order_id: i32,
        actor_id: i32,
    ) -> Result<(orders::Model, Option<ContentPayload>), EscrowError> {
        let order = load(&self.db, order_id).await?;
        let is_party = order.advertiser_id == actor_id || order.publisher_id == Some(actor_id);
        if !is_party && !self.owns_listing(actor_id, order.listing_id).await? {
            return Err(EscrowError::forbidden("not a party to this order"));
        }

        let content = match self.content.load(order_id).await {
            Ok(c) => c,
            Err(e) => {
                tracing::warn!(order_id = order_id, error = %e, "Failed to load order content");
                None
            }
        };
        Ok((order, content))
    }

    async fn user_email(&self, user_id: i32) -> Result<Option<String>, EscrowError> {
        Ok(Users::find_by_id(user_id)
            .one(&self.db)
            .await?
            .map(|u| u.email))
    }

    /// Whether the user's email matches the publisher of the listing
    async fn owns_listing(&self, user_id: i32, listing_id: i32) -> Result<bool, EscrowError> {
        let Some(email) = self.user_email(user_id).await? else {
            return Ok(false);
        };
        let owned = self.directory.find_by_publisher_email(&email).await?;
        Ok(owned.iter().any(|l| l.id == listing_id))
    }

    async fn listing_owner_id(&self, listing_id: i32) -> Result<Option<i32>, EscrowError> {
        let Some(listing) = self.directory.find_by_id(listing_id).await? else {
            return Ok(None);
        };
        Ok(Users::find()
            .filter(
                Expr::expr(Func::lower(Expr::col(users::Column::Email)))
                    .eq(listing.publisher_email.trim().to_lowercase()),
            )
            .one(&self.db)
            .await?
            .map(|u| u.id))
    }

    /// Create an order and hold its escrow.
    ///
    /// A second submission with the same advertiser, listing and amount
    /// inside the duplicate window returns the first order.
    pub async fn create_order(
        &self,
        advertiser_id: i32,
        request: NewOrder,
    ) -> Result<Submission, EscrowError> {
        let total_amount = request
            .total_amount
            .ok_or_else(|| EscrowError::validation("totalAmount is required"))?;
        let listing_ref = request
            .listing_ref
            .as_deref()
            .filter(|r| !r.trim().is_empty())
            .ok_or_else(|| EscrowError::validation("listing reference is required"))?;
        let fee_rate = request.fee_rate.unwrap_or(self.policy.default_fee_rate);
        let (platform_fee, escrow_held) = escrow_amounts(total_amount, fee_rate)?;

        let listing = resolve_listing(self.directory.as_ref(), listing_ref).await?;
        let key = SubmissionKey::new(advertiser_id, listing.id, total_amount);

        let submission = self
            .guard
            .submit(
                key,
                self.insert_order(advertiser_id, listing.id, total_amount, fee_rate, platform_fee, escrow_held),
            )
            .await?;

        if submission.created {
            if !request.content.is_empty() {
                if let Err(e) = self.content.save(submission.order.id, &request.content).await {
                    tracing::warn!(
                        order_id = submission.order.id,
                        error = %e,
                        "Failed to store order content, order kept"
                    );
                }
            }

            match self.listing_owner_id(listing.id).await {
                Ok(Some(owner)) => self.notify(Notification::order(
                    owner,
                    advertiser_id,
                    submission.order.id,
                    EventKind::NewOrder,
                )),
                Ok(None) => {}
                Err(e) => tracing::warn!(listing_id = listing.id, error = %e, "Could not resolve listing owner"),
            }
        }

        Ok(submission)
    }

    async fn insert_order(
        &self,
        advertiser_id: i32,
        listing_id: i32,
        total_amount: Decimal,
        fee_rate: Decimal,
        platform_fee: Decimal,
        escrow_held: Decimal,
    ) -> Result<Submission, EscrowError> {
        // Covers submissions that landed in another process or before a restart.
        // Not part of the creating transaction: two processes submitting at
        // the same instant can both miss it and both create an order.
        let window = ChronoDuration::from_std(self.policy.duplicate_window)
            .unwrap_or_else(|_| ChronoDuration::seconds(60));
        let recent = Orders::find()
            .filter(orders::Column::AdvertiserId.eq(advertiser_id))
            .filter(orders::Column::ListingId.eq(listing_id))
            .filter(orders::Column::TotalAmount.eq(total_amount))
            .filter(orders::Column::CreatedAt.gte(now() - window))
            .one(&self.db)
            .await?;
        if let Some(order) = recent {
            return Ok(Submission {
                order,
                created: false,
            });
        }

        let txn = self.db.begin().await?;

        let Some(wallet) = ledger::find_wallet(&txn, advertiser_id, WalletType::Advertiser).await?
        else {
            ledger::ensure_wallet(&txn, advertiser_id, WalletType::Advertiser).await?;
            txn.commit().await?;
            return Err(EscrowError::WalletNotFound(
                "advertiser wallet created with zero balance, fund it before placing orders"
                    .to_string(),
            ));
        };

        let created_at = now();
        let order = orders::ActiveModel {
            advertiser_id: Set(advertiser_id),
            publisher_id: Set(None),
            listing_id: Set(listing_id),
            total_amount: Set(total_amount),
            fee_rate: Set(fee_rate),
            platform_fee: Set(platform_fee),
            escrow_held: Set(escrow_held),
            status: Set(OrderStatus::Pending),
            revision_status: Set(RevisionStatus::None),
            order_date: Set(created_at),
            created_at: Set(created_at),
            updated_at: Set(created_at),
            ..Default::default()
        }
        .insert(&txn)
        .await?;

        ledger::apply_hold(
            &txn,
            wallet.id,
            escrow_held,
            &LedgerCause::order(order.id, "escrow hold for new order"),
        )
        .await?;

        txn.commit().await?;

        tracing::info!(
            order_id = order.id,
            advertiser_id = advertiser_id,
            listing_id = listing_id,
            escrow_held = %escrow_held,
            "Order created"
        );

        Ok(Submission {
            order,
            created: true,
        })
    }

    pub async fn accept_order(
        &self,
        order_id: i32,
        actor_id: i32,
    ) -> Result<orders::Model, EscrowError> {
        let order = load(&self.db, order_id).await?;
        if order.publisher_id.is_some() {
            return Err(EscrowError::conflict(format!("order {} is already accepted", order_id)));
        }
        transition(order.status, OrderAction::Accept)?;

        let self_assigned = order.advertiser_id == actor_id;
        if !self_assigned && !self.owns_listing(actor_id, order.listing_id).await? {
            return Err(EscrowError::forbidden("only the listing owner can accept this order"));
        }

        let ts = now();
        let result = Orders::update_many()
            .col_expr(orders::Column::PublisherId, Expr::value(Some(actor_id)))
            .col_expr(orders::Column::Status, Expr::value(OrderStatus::Accepted))
            .col_expr(orders::Column::AcceptedDate, Expr::value(Some(ts)))
            .col_expr(orders::Column::UpdatedAt, Expr::value(ts))
            .filter(orders::Column::Id.eq(order_id))
            .filter(orders::Column::Status.eq(OrderStatus::Pending))
            .filter(orders::Column::PublisherId.is_null())
            .exec(&self.db)
            .await?;
        require_one(result.rows_affected, order_id, "accept")?;

        tracing::info!(order_id = order_id, publisher_id = actor_id, self_assigned, "Order accepted");
        if !self_assigned {
            self.notify(Notification::order(
                order.advertiser_id,
                actor_id,
                order_id,
                EventKind::OrderAccepted,
            ));
        }

        load(&self.db, order_id).await
    }

    /// Reassign the publisher of an accepted order to the listing owner.
    ///
    /// Used when the stored publisher no longer matches who owns the
    /// listing. Recorded in `order_audit_log`.
    pub async fn repair_publisher_assignment(
        &self,
        order_id: i32,
        actor_id: i32,
    ) -> Result<orders::Model, EscrowError> {
        let order = load(&self.db, order_id).await?;
        if order.status != OrderStatus::Accepted {
            return Err(EscrowError::conflict(format!(
                "publisher can only be repaired on an accepted order, this one is {}",
                order.status.as_str()
            )));
        }
        if order.publisher_id == Some(actor_id) {
            return Err(EscrowError::conflict("already the assigned publisher"));
        }
        if !self.owns_listing(actor_id, order.listing_id).await? {
            return Err(EscrowError::forbidden("only the listing owner can take over this order"));
        }

        let ts = now();
        let txn = self.db.begin().await?;

        let mut update = Orders::update_many()
            .col_expr(orders::Column::PublisherId, Expr::value(Some(actor_id)))
            .col_expr(orders::Column::UpdatedAt, Expr::value(ts))
            .filter(orders::Column::Id.eq(order_id))
            .filter(orders::Column::Status.eq(OrderStatus::Accepted));
        update = match order.publisher_id {
            Some(previous) => update.filter(orders::Column::PublisherId.eq(previous)),
            None => update.filter(orders::Column::PublisherId.is_null()),
        };
        let result = update.exec(&txn).await?;
        require_one(result.rows_affected, order_id, "publisher repair")?;

        order_audit_log::ActiveModel {
            order_id: Set(order_id),
            action: Set(AUDIT_PUBLISHER_REASSIGNED.to_string()),
            actor_id: Set(actor_id),
            previous_value: Set(order.publisher_id.map(|id| id.to_string())),
            new_value: Set(Some(actor_id.to_string())),
            created_at: Set(ts),
            ..Default::default()
        }
        .insert(&txn)
        .await?;

        txn.commit().await?;

        tracing::warn!(
            order_id = order_id,
            previous_publisher = ?order.publisher_id,
            new_publisher = actor_id,
            "Publisher reassigned to listing owner"
        );

        load(&self.db, order_id).await
    }

    pub async fn audit_log(&self, order_id: i32) -> Result<Vec<order_audit_log::Model>, EscrowError> {
        Ok(OrderAuditLog::find()
            .filter(order_audit_log::Column::OrderId.eq(order_id))
            .all(&self.db)
            .await?)
    }

    pub async fn deliver_order(
        &self,
        order_id: i32,
        actor_id: i32,
        proof: &str,
    ) -> Result<orders::Model, EscrowError> {
        let proof = proof.trim();
        if proof.is_empty() {
            return Err(EscrowError::validation("proof of delivery is required"));
        }

        let order = load(&self.db, order_id).await?;
        transition(order.status, OrderAction::Deliver)?;

        if order.publisher_id != Some(actor_id) {
            if !self.owns_listing(actor_id, order.listing_id).await? {
                return Err(EscrowError::forbidden("only the assigned publisher can deliver"));
            }
            self.repair_publisher_assignment(order_id, actor_id).await?;
        }

        let ts = now();
        let result = Orders::update_many()
            .col_expr(orders::Column::Status, Expr::value(OrderStatus::Delivered))
            .col_expr(orders::Column::DeliveredDate, Expr::value(Some(ts)))
            .col_expr(orders::Column::ProofUrl, Expr::value(Some(proof.to_string())))
            .col_expr(orders::Column::UpdatedAt, Expr::value(ts))
            .filter(orders::Column::Id.eq(order_id))
            .filter(orders::Column::Status.eq(OrderStatus::Accepted))
            .filter(orders::Column::PublisherId.eq(actor_id))
            .exec(&self.db)
            .await?;
        require_one(result.rows_affected, order_id, "deliver")?;

        tracing::info!(order_id = order_id, publisher_id = actor_id, "Order delivered");
        self.notify(Notification::order(
            order.advertiser_id,
            actor_id,
            order_id,
            EventKind::OrderDelivered,
        ));

        load(&self.db, order_id).await
    }

    /// Flag a delivery as disputed. Funds stay in escrow.
    pub async fn dispute_order(
        &self,
        order_id: i32,
        actor_id: i32,
        reason: &str,
    ) -> Result<orders::Model, EscrowError> {
        let reason = reason.trim();
        if reason.is_empty() {
            return Err(EscrowError::validation("a dispute reason is required"));
        }

        let order = load(&self.db, order_id).await?;
        if order.advertiser_id != actor_id {
            return Err(EscrowError::forbidden("only the advertiser can dispute"));
        }
        transition(order.status, OrderAction::Dispute)?;

        let ts = now();
        let result = Orders::update_many()
            .col_expr(orders::Column::Status, Expr::value(OrderStatus::Disputed))
            .col_expr(orders::Column::DisputeDate, Expr::value(Some(ts)))
            .col_expr(orders::Column::DisputeReason, Expr::value(Some(reason.to_string())))
            .col_expr(orders::Column::UpdatedAt, Expr::value(ts))
            .filter(orders::Column::Id.eq(order_id))
            .filter(orders::Column::Status.eq(OrderStatus::Delivered))
            .exec(&self.db)
            .await?;
        require_one(result.rows_affected, order_id, "dispute")?;

        tracing::info!(order_id = order_id, "Order disputed");
        if let Some(publisher_id) = order.publisher_id {
            self.notify(Notification::order(
                publisher_id,
                actor_id,
                order_id,
                EventKind::OrderDisputed,
            ));
        }

        load(&self.db, order_id).await
    }

    /// Approve a delivery and release escrow to the publisher.
    ///
    /// Idempotent: completing an approved order returns it unchanged and
    /// moves no money.
    pub async fn complete_order(
        &self,
        order_id: i32,
        actor_id: i32,
    ) -> Result<orders::Model, EscrowError> {
        let order = load(&self.db, order_id).await?;
        if order.advertiser_id != actor_id {
            return Err(EscrowError::forbidden("only the advertiser can complete"));
        }
        if order.status == OrderStatus::Approved {
            return Ok(order);
        }
        transition(order.status, OrderAction::Complete)?;
        let publisher_id = order
            .publisher_id
            .ok_or_else(|| EscrowError::conflict("delivered order has no publisher"))?;

        let ts = now();
        let txn = self.db.begin().await?;

        let result = Orders::update_many()
            .col_expr(orders::Column::Status, Expr::value(OrderStatus::Approved))
            .col_expr(orders::Column::CompletedDate, Expr::value(Some(ts)))
            .col_expr(orders::Column::UpdatedAt, Expr::value(ts))
            .filter(orders::Column::Id.eq(order_id))
            .filter(orders::Column::Status.eq(OrderStatus::Delivered))
            .exec(&txn)
            .await?;

        if result.rows_affected == 0 {
            let current = load(&txn, order_id).await?;
            drop(txn);
            if current.status == OrderStatus::Approved {
                return Ok(current);
            }
            return Err(EscrowError::conflict(format!(
                "order {} is {}, cannot complete",
                order_id,
                current.status.as_str()
            )));
        }

        let advertiser_wallet = ledger::find_wallet(&txn, order.advertiser_id, WalletType::Advertiser)
            .await?
            .ok_or_else(|| EscrowError::WalletNotFound("advertiser wallet not found".to_string()))?;
        let publisher_wallet = ledger::ensure_wallet(&txn, publisher_id, WalletType::Publisher).await?;

        ledger::apply_release(
            &txn,
            advertiser_wallet.id,
            publisher_wallet.id,
            order.escrow_held,
            order.platform_fee,
            &LedgerCause::order(order_id, "escrow release on order completion"),
        )
        .await?;

        txn.commit().await?;

        tracing::info!(
            order_id = order_id,
            publisher_id = publisher_id,
            released = %order.escrow_held,
            fee = %order.platform_fee,
            "Order completed"
        );

        let tat = self.tat.clone();
        let listing_id = order.listing_id;
        tokio::spawn(async move {
            if let Err(e) = tat.recompute(listing_id, TatOptions::default()).await {
                tracing::warn!(listing_id = listing_id, error = %e, "TAT recompute after completion failed");
            }
        });

        self.notify(Notification::order(
            publisher_id,
            actor_id,
            order_id,
            EventKind::OrderCompleted,
        ));

        load(&self.db, order_id).await
    }

    pub async fn request_revision(
        &self,
        order_id: i32,
        actor_id: i32,
        notes: Option<String>,
    ) -> Result<orders::Model, EscrowError> {
        let order = load(&self.db, order_id).await?;
        if order.advertiser_id != actor_id {
            return Err(EscrowError::forbidden("only the advertiser can request a revision"));
        }
        revision_transition(order.status, order.revision_status, RevisionAction::Request)?;

        let delivered = order
            .delivered_date
            .ok_or_else(|| EscrowError::conflict("order has no delivery date"))?;
        let ts = now();
        let window = self.policy.revision_window_days;
        if !within_revision_window(delivered.date_naive(), ts.date_naive(), window) {
            return Err(EscrowError::conflict(format!(
                "revision window of {} working days after delivery has closed",
                window
            )));
        }
        let deadline_date = add_working_days(delivered.date_naive(), window);
        let deadline = delivered + ChronoDuration::days((deadline_date - delivered.date_naive()).num_days());

        let result = Orders::update_many()
            .col_expr(orders::Column::RevisionStatus, Expr::value(RevisionStatus::Requested))
            .col_expr(orders::Column::RevisionRequestedAt, Expr::value(Some(ts)))
            .col_expr(orders::Column::RevisionDeadline, Expr::value(Some(deadline)))
            .col_expr(orders::Column::RevisionNotes, Expr::value(notes))
            .col_expr(orders::Column::UpdatedAt, Expr::value(ts))
            .filter(orders::Column::Id.eq(order_id))
            .filter(orders::Column::Status.eq(OrderStatus::Delivered))
            .filter(orders::Column::RevisionStatus.eq(RevisionStatus::None))
            .exec(&self.db)
            .await?;
        require_one(result.rows_affected, order_id, "revision request")?;

        tracing::info!(order_id = order_id, deadline = %deadline, "Revision requested");
        if let Some(publisher_id) = order.publisher_id {
            self.notify(Notification::order(
                publisher_id,
                actor_id,
                order_id,
                EventKind::RevisionRequested,
            ));
        }

        load(&self.db, order_id).await
    }

    pub async fn start_revision(
        &self,
        order_id: i32,
        actor_id: i32,
    ) -> Result<orders::Model, EscrowError> {
        let order = load(&self.db, order_id).await?;
        if order.publisher_id != Some(actor_id) {
            return Err(EscrowError::forbidden("only the assigned publisher can work on revisions"));
        }
        revision_transition(order.status, order.revision_status, RevisionAction::Start)?;

        let result = Orders::update_many()
            .col_expr(orders::Column::RevisionStatus, Expr::value(RevisionStatus::InProgress))
            .col_expr(orders::Column::UpdatedAt, Expr::value(now()))
            .filter(orders::Column::Id.eq(order_id))
            .filter(orders::Column::Status.eq(OrderStatus::Delivered))
            .filter(orders::Column::RevisionStatus.eq(RevisionStatus::Requested))
            .exec(&self.db)
            .await?;
        require_one(result.rows_affected, order_id, "revision start")?;

        self.notify(Notification::order(
            order.advertiser_id,
            actor_id,
            order_id,
            EventKind::RevisionStarted,
        ));

        load(&self.db, order_id).await
    }

    pub async fn complete_revision(
        &self,
        order_id: i32,
        actor_id: i32,
        proof: Option<String>,
    ) -> Result<orders::Model, EscrowError> {
        let order = load(&self.db, order_id).await?;
        if order.publisher_id != Some(actor_id) {
            return Err(EscrowError::forbidden("only the assigned publisher can work on revisions"));
        }
        revision_transition(order.status, order.revision_status, RevisionAction::Complete)?;

        let mut update = Orders::update_many()
            .col_expr(orders::Column::RevisionStatus, Expr::value(RevisionStatus::Completed))
            .col_expr(orders::Column::UpdatedAt, Expr::value(now()));
        if let Some(proof) = proof.map(|p| p.trim().to_string()).filter(|p| !p.is_empty()) {
            update = update.col_expr(orders::Column::ProofUrl, Expr::value(Some(proof)));
        }

        let result = update
            .filter(orders::Column::Id.eq(order_id))
            .filter(orders::Column::Status.eq(OrderStatus::Delivered))
            .filter(orders::Column::RevisionStatus.eq(RevisionStatus::InProgress))
            .exec(&self.db)
            .await?;
        require_one(result.rows_affected, order_id, "revision completion")?;

        tracing::info!(order_id = order_id, "Revision completed");
        self.notify(Notification::order(
            order.advertiser_id,
            actor_id,
            order_id,
            EventKind::RevisionCompleted,
        ));

        load(&self.db, order_id).await
    }
}
