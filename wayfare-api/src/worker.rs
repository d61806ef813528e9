use std::sync::Arc;
use tokio::time::{interval, Duration, MissedTickBehavior};
use tracing::{error, info};
use wayfare_reservation::Reconciler;

/// Periodically settles payment sessions nobody told us about and retries
/// receipts that failed to issue.
pub async fn start_reconciliation_worker(reconciler: Arc<Reconciler>, every: Duration) {
    let mut ticker = interval(every);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    info!("Reconciliation worker started, running every {:?}", every);

    loop {
        ticker.tick().await;
        match reconciler.run_once().await {
            Ok(report) if report.sessions_checked > 0 || report.receipts_issued > 0 || report.errors > 0 => {
                info!(
                    sessions_checked = report.sessions_checked,
                    outcomes_recorded = report.outcomes_recorded,
                    receipts_issued = report.receipts_issued,
                    errors = report.errors,
                    "Reconciliation pass"
                );
            }
            Ok(_) => {}
            Err(e) => error!("Reconciliation pass failed: {}", e),
        }
    }
}
