pub mod documents;
pub mod events;
pub mod payment;

pub use documents::DocumentStore;
pub use events::{EventPublisher, NoopPublisher};
pub use payment::{PaymentGateway, PaymentOutcome, PaymentSession, SessionMetadata, SessionStatus, SessionVerification};

/// Failures reported by the collaborators the reservation core calls into.
#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("Validation failed: {0}")]
    ValidationError(String),
    #[error("Payment gateway error: {0}")]
    GatewayError(String),
    #[error("Document store error: {0}")]
    DocumentError(String),
    #[error("Event publishing failed: {0}")]
    PublishError(String),
    #[error("Internal service error: {0}")]
    InternalError(String),
}

pub type CoreResult<T> = Result<T, CoreError>;
