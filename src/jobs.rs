//! Background jobs. These are advisory, read-only sweeps; they never mutate
//! state and share nothing with the request path beyond the pool.

use crate::services::ReportService;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Spawns a periodic sweep that reports transactions stuck in `pending`.
pub fn spawn_stale_transaction_sweep(
    reports: ReportService,
    interval_secs: u64,
    max_age_mins: i64,
) -> JoinHandle<()> {
    info!(
        interval_secs = interval_secs,
        max_age_mins = max_age_mins,
        "Starting stale-transaction sweep"
    );

    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(interval_secs));
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            interval.tick().await;

            match reports.stale_pending_transactions(max_age_mins).await {
                Ok(stale) if stale.is_empty() => {
                    debug!("Stale-transaction sweep found nothing");
                }
                Ok(stale) => {
                    for transaction in &stale {
                        warn!(
                            transaction_id = %transaction.id,
                            transaction_number = %transaction.transaction_number,
                            created_at = %transaction.created_at,
                            "Transaction pending for longer than {} minutes",
                            max_age_mins
                        );
                    }
                }
                Err(e) => {
                    warn!(error = %e, "Stale-transaction sweep failed");
                }
            }
        }
    })
}
