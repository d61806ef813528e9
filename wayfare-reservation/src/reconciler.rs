use std::sync::Arc;
use tracing::{debug, warn};

use crate::lifecycle::LifecycleResult;
use crate::orchestrator::{PaymentOrchestrator, Reconciliation};
use crate::receipt::ReceiptIssuer;
use crate::repository::ReservationRepository;

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ReconcileReport {
    pub sessions_checked: usize,
    pub outcomes_recorded: usize,
    pub receipts_issued: usize,
    pub errors: usize,
}

/// Catches up on anything a missed webhook or a failed receipt left behind.
pub struct Reconciler {
    repo: Arc<dyn ReservationRepository>,
    payments: Arc<PaymentOrchestrator>,
    receipts: Arc<ReceiptIssuer>,
    batch_size: usize,
}

impl Reconciler {
    pub fn new(
        repo: Arc<dyn ReservationRepository>,
        payments: Arc<PaymentOrchestrator>,
        receipts: Arc<ReceiptIssuer>,
        batch_size: usize,
    ) -> Self {
        Self {
            repo,
            payments,
            receipts,
            batch_size: batch_size.max(1),
        }
    }

    /// One pass: poll open payment sessions, then retry missing receipts.
    /// Individual failures are counted and logged, never propagated.
    pub async fn run_once(&self) -> LifecycleResult<ReconcileReport> {
        let mut report = ReconcileReport::default();

        for reservation in self.repo.list_awaiting_payment(self.batch_size).await? {
            let Some(session_id) = reservation.payment_session_id.as_deref() else {
                continue;
            };
            report.sessions_checked += 1;

            match self.payments.reconcile_session(reservation.id, session_id).await {
                Ok(Reconciliation::Recorded(_)) => report.outcomes_recorded += 1,
                Ok(Reconciliation::StillOpen(_)) => {}
                Err(e) => {
                    report.errors += 1;
                    warn!(reservation_id = %reservation.id, session_id = %session_id, error = %e, "Session reconciliation failed");
                }
            }
        }

        for reservation in self.repo.list_missing_receipts(self.batch_size).await? {
            match self.receipts.issue(reservation.id).await {
                Ok(_) => report.receipts_issued += 1,
                Err(e) => {
                    report.errors += 1;
                    warn!(reservation_id = %reservation.id, error = %e, "Receipt retry failed");
                }
            }
        }

        debug!(?report, "Reconciliation pass finished");
        Ok(report)
    }
}
