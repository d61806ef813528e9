pub mod assignment;
pub mod lifecycle;
pub mod memory;
pub mod models;
pub mod orchestrator;
pub mod receipt;
pub mod reconciler;
pub mod repository;

pub use assignment::DriverAssignmentService;
pub use lifecycle::{LifecycleError, LifecycleManager, LifecycleResult};
pub use models::{
    Actor, ContactInfo, NewReservation, PaymentStatus, Receipt, Reservation, ReservationDetails,
    ReservationKind, ReservationStatus, Schedule,
};
pub use orchestrator::{MockPaymentGateway, PaymentOrchestrator, Reconciliation};
pub use receipt::{ReceiptError, ReceiptIssuer};
pub use reconciler::{ReconcileReport, Reconciler};
pub use repository::{ReservationRepository, StoreError, StoreResult, WriteGuard};
