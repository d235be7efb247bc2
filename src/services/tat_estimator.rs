//! Turnaround-time (TAT) estimator.
//!
//! A listing's `tat` is the recency-weighted average of how many days its
//! recent approved orders took from placement to completion, and
//! `placement_speed` is the bucket that average falls in.

use chrono::{DateTime, Duration as ChronoDuration, FixedOffset, Utc};
use futures_util::future::join_all;
use sea_orm::{
    sea_query::Expr, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder,
    QuerySelect,
};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;

use crate::entities::{orders, prelude::Orders, sea_orm_active_enums::OrderStatus};
use crate::error::EscrowError;
use crate::services::listing_directory::ListingDirectory;

/// Most recent orders considered per listing
pub const MAX_ORDERS_ANALYZED: u64 = 50;
const RECENCY_DECAY: f64 = 0.9;
const SECONDS_PER_DAY: i64 = 86_400;

#[derive(Debug, Clone, Copy)]
pub struct TatOptions {
    pub lookback_days: i64,
    pub min_order_count: usize,
    pub use_weighted_average: bool,
}

impl Default for TatOptions {
    fn default() -> Self {
        Self {
            lookback_days: 90,
            min_order_count: 3,
            use_weighted_average: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TatRecompute {
    pub listing_id: i32,
    /// False when too few orders qualified; the listing was left untouched
    pub updated: bool,
    pub orders_analyzed: usize,
    pub previous_tat: Option<i32>,
    pub previous_placement_speed: Option<String>,
    pub new_tat: Option<i32>,
    pub placement_speed: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TatFailure {
    pub listing_id: i32,
    pub error: String,
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TatBatchReport {
    pub listings_considered: usize,
    pub updated: usize,
    pub skipped: usize,
    pub failures: Vec<TatFailure>,
}

/// Whole days from placement to completion, rounded up, never negative
pub fn tat_days(order_date: DateTime<FixedOffset>, completed_date: DateTime<FixedOffset>) -> i64 {
    let seconds = (completed_date - order_date).num_seconds();
    if seconds <= 0 {
        return 0;
    }
    (seconds + SECONDS_PER_DAY - 1) / SECONDS_PER_DAY
}

/// Average of `days` (most recent first), weighted 0.9^i when `weighted`,
/// rounded half-up to a whole day
pub fn average_tat(days: &[i64], weighted: bool) -> Option<i32> {
    if days.is_empty() {
        return None;
    }

    let mut weighted_sum = 0.0;
    let mut weight_sum = 0.0;
    for (i, d) in days.iter().enumerate() {
        let w = if weighted { RECENCY_DECAY.powi(i as i32) } else { 1.0 };
        weighted_sum += *d as f64 * w;
        weight_sum += w;
    }

    Some((weighted_sum / weight_sum + 0.5).floor() as i32)
}

/// Placement speed bucket. Unknown (None) and negative values are "Normal",
/// not "Slow".
pub fn placement_speed(tat: Option<i32>) -> &'static str {
    match tat {
        None => "Normal",
        Some(t) if t < 0 => "Normal",
        Some(0..=2) => "Ultra Fast",
        Some(3..=5) => "Fast",
        Some(6..=8) => "Normal",
        Some(_) => "Slow",
    }
}

#[derive(Clone)]
pub struct TatEstimator {
    db: DatabaseConnection,
    directory: Arc<dyn ListingDirectory>,
}

impl TatEstimator {
    pub fn new(db: DatabaseConnection, directory: Arc<dyn ListingDirectory>) -> Self {
        Self { db, directory }
    }

    fn cutoff(options: &TatOptions) -> DateTime<FixedOffset> {
        (Utc::now() - ChronoDuration::days(options.lookback_days)).fixed_offset()
    }

    pub async fn recompute(
        &self,
        listing_id: i32,
        options: TatOptions,
    ) -> Result<TatRecompute, EscrowError> {
        let listing = self
            .directory
            .find_by_id(listing_id)
            .await?
            .ok_or_else(|| EscrowError::not_found(format!("listing {}", listing_id)))?;

        let recent = Orders::find()
            .filter(orders::Column::ListingId.eq(listing_id))
            .filter(orders::Column::Status.eq(OrderStatus::Approved))
            .filter(orders::Column::CompletedDate.is_not_null())
            .filter(orders::Column::CompletedDate.gte(Self::cutoff(&options)))
            .order_by_desc(orders::Column::CompletedDate)
            .order_by_desc(orders::Column::Id)
            .limit(MAX_ORDERS_ANALYZED)
            .all(&self.db)
            .await?;

        let days: Vec<i64> = recent
            .iter()
            .filter_map(|o| o.completed_date.map(|c| tat_days(o.order_date, c)))
            .collect();

        let mut outcome = TatRecompute {
            listing_id,
            updated: false,
            orders_analyzed: days.len(),
            previous_tat: listing.tat,
            previous_placement_speed: listing.placement_speed.clone(),
            new_tat: None,
            placement_speed: None,
        };

        if days.len() < options.min_order_count {
            tracing::debug!(
                listing_id = listing_id,
                orders = days.len(),
                min = options.min_order_count,
                "Not enough completed orders to recompute TAT"
            );
            return Ok(outcome);
        }

        let new_tat = average_tat(&days, options.use_weighted_average);
        let speed = placement_speed(new_tat);

        if let Some(tat) = new_tat {
            self.directory.update_tat(listing_id, tat, speed).await?;
            outcome.updated = true;
        }
        outcome.new_tat = new_tat;
        outcome.placement_speed = Some(speed.to_string());

        tracing::info!(
            listing_id = listing_id,
            previous_tat = ?listing.tat,
            new_tat = ?new_tat,
            placement_speed = speed,
            orders = days.len(),
            "Recomputed listing TAT"
        );

        Ok(outcome)
    }

    /// Listings with at least `min_order_count` approved orders in the window
    async fn eligible_listings(&self, options: &TatOptions) -> Result<Vec<i32>, EscrowError> {
        Ok(Orders::find()
            .select_only()
            .column(orders::Column::ListingId)
            .filter(orders::Column::Status.eq(OrderStatus::Approved))
            .filter(orders::Column::CompletedDate.gte(Self::cutoff(options)))
            .group_by(orders::Column::ListingId)
            .having(
                Expr::expr(Expr::col(orders::Column::Id).count())
                    .gte(options.min_order_count as i64),
            )
            .order_by_asc(orders::Column::ListingId)
            .into_tuple::<i32>()
            .all(&self.db)
            .await?)
    }

    /// Recompute every eligible listing in batches of `batch_size`, pausing
    /// `batch_delay` between batches. One listing failing does not stop the run.
    pub async fn recompute_all(
        &self,
        options: TatOptions,
        batch_size: usize,
        batch_delay: Duration,
    ) -> Result<TatBatchReport, EscrowError> {
        let listing_ids = self.eligible_listings(&options).await?;
        let mut report = TatBatchReport {
            listings_considered: listing_ids.len(),
            ..Default::default()
        };

        let batches: Vec<&[i32]> = listing_ids.chunks(batch_size.max(1)).collect();
        let batch_count = batches.len();

        for (index, batch) in batches.into_iter().enumerate() {
            let results = join_all(batch.iter().map(|id| self.recompute(*id, options))).await;

            for (listing_id, result) in batch.iter().zip(results) {
                match result {
                    Ok(r) if r.updated => report.updated += 1,
                    Ok(_) => report.skipped += 1,
                    Err(e) => {
                        tracing::warn!(listing_id = *listing_id, error = %e, "TAT recompute failed");
                        report.failures.push(TatFailure {
                            listing_id: *listing_id,
                            error: e.to_string(),
                        });
                    }
                }
            }

            if index + 1 < batch_count && !batch_delay.is_zero() {
                tokio::time::sleep(batch_delay).await;
            }
        }

        tracing::info!(
            considered = report.listings_considered,
            updated = report.updated,
            skipped = report.skipped,
            failed = report.failures.len(),
            "Bulk TAT recompute finished"
        );

        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(day: u32, hour: u32) -> DateTime<FixedOffset> {
        Utc.with_ymd_and_hms(2026, 9, day, hour, 0, 0).unwrap().fixed_offset()
    }

    #[test]
    fn test_tat_days_rounds_up() {
        assert_eq!(tat_days(at(1, 0), at(1, 0)), 0);
        assert_eq!(tat_days(at(1, 0), at(1, 1)), 1);
        assert_eq!(tat_days(at(1, 0), at(3, 0)), 2);
        assert_eq!(tat_days(at(1, 0), at(3, 1)), 3);
        // Clock skew never yields negative days
        assert_eq!(tat_days(at(3, 0), at(1, 0)), 0);
    }

    #[test]
    fn test_weighted_average_example() {
        let days = [4, 6, 3, 8, 5, 7, 2, 9, 4, 6];
        let tat = average_tat(&days, true);
        assert_eq!(tat, Some(5));
        assert_eq!(placement_speed(tat), "Fast");
    }

    #[test]
    fn test_unweighted_average_rounds_half_up() {
        assert_eq!(average_tat(&[2, 3], false), Some(3));
        assert_eq!(average_tat(&[2, 2, 3], false), Some(2));
        assert_eq!(average_tat(&[], false), None);
    }

    #[test]
    fn test_recent_orders_dominate() {
        let fast_lately = average_tat(&[1, 1, 1, 10, 10, 10], true).unwrap();
        let slow_lately = average_tat(&[10, 10, 10, 1, 1, 1], true).unwrap();
        assert!(fast_lately < slow_lately);
    }

    #[test]
    fn test_placement_speed_buckets() {
        assert_eq!(placement_speed(Some(0)), "Ultra Fast");
        assert_eq!(placement_speed(Some(2)), "Ultra Fast");
        assert_eq!(placement_speed(Some(3)), "Fast");
        assert_eq!(placement_speed(Some(5)), "Fast");
        assert_eq!(placement_speed(Some(6)), "Normal");
        assert_eq!(placement_speed(Some(8)), "Normal");
        assert_eq!(placement_speed(Some(9)), "Slow");
        assert_eq!(placement_speed(Some(40)), "Slow");
        assert_eq!(placement_speed(None), "Normal");
        assert_eq!(placement_speed(Some(-1)), "Normal");
    }
}
