//! TAT Sync Job
//!
//! Periodically recomputes turnaround time and placement speed for every
//! listing with enough recently approved orders. Order completion already
//! refreshes its own listing; this pass catches listings whose orders aged
//! out of the lookback window.

use std::time::Duration;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{error, info};

use crate::services::tat_estimator::{TatEstimator, TatOptions};

pub async fn start_tat_sync_job(
    estimator: TatEstimator,
    every: Duration,
    batch_size: usize,
    batch_delay: Duration,
) {
    tokio::spawn(async move {
        info!(
            interval_secs = every.as_secs(),
            batch_size = batch_size,
            "TAT sync job started"
        );

        let mut interval = interval(every);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => {
                    info!("Shutdown signal received, stopping TAT sync job");
                    break;
                }
                _ = interval.tick() => {
                    match estimator.recompute_all(TatOptions::default(), batch_size, batch_delay).await {
                        Ok(report) if !report.failures.is_empty() => {
                            error!(failed = report.failures.len(), "TAT sync finished with failures");
                        }
                        Ok(_) => {}
                        Err(e) => error!(error = %e, "TAT sync cycle failed"),
                    }
                }
            }
        }

        info!("TAT sync job stopped");
    });
}
