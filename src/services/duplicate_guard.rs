//! Short-window idempotency for order creation.
//!
//! Concurrent submissions with the same key are coalesced by the cache entry
//! API: exactly one caller runs the create future, the others wait for it
//! and receive its result. A successful submission stays cached for the
//! window; a failed one is not cached so the caller may retry.

use moka::future::Cache;
use rust_decimal::Decimal;
use std::future::Future;
use std::time::Duration;

use crate::entities::orders;
use crate::error::EscrowError;

/// What makes two order submissions "the same"
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SubmissionKey {
    pub advertiser_id: i32,
    pub listing_id: i32,
    pub total_amount: Decimal,
}

impl SubmissionKey {
    pub fn new(advertiser_id: i32, listing_id: i32, total_amount: Decimal) -> Self {
        Self {
            advertiser_id,
            listing_id,
            // 100 and 100.00 are the same submission
            total_amount: total_amount.normalize(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Submission {
    pub order: orders::Model,
    /// False when an existing order was returned
    pub created: bool,
}

#[derive(Clone)]
pub struct DuplicateGuard {
    cache: Cache<SubmissionKey, Submission>,
    window: Duration,
}

impl DuplicateGuard {
    pub fn new(window: Duration) -> Self {
        let cache = Cache::builder()
            .max_capacity(10_000)
            .time_to_live(window)
            .build();

        Self { cache, window }
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    /// Run `create` unless a submission with the same key finished (or is
    /// running) within the window.
    pub async fn submit<F>(&self, key: SubmissionKey, create: F) -> Result<Submission, EscrowError>
    where
        F: Future<Output = Result<Submission, EscrowError>>,
    {
        let entry = self
            .cache
            .entry(key.clone())
            .or_try_insert_with(create)
            .await
            .map_err(|e| (*e).clone())?;

        let fresh = entry.is_fresh();
        let mut submission = entry.into_value();
        submission.created = fresh && submission.created;

        if !submission.created {
            tracing::info!(
                advertiser_id = key.advertiser_id,
                listing_id = key.listing_id,
                order_id = submission.order.id,
                "Duplicate order submission, returning existing order"
            );
        }

        Ok(submission)
    }
}
