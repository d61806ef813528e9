use async_trait::async_trait;
use wayfare_shared::ReservationEvent;

use crate::CoreResult;

#[async_trait]
pub trait EventPublisher: Send + Sync {
    async fn publish(&self, event: &ReservationEvent) -> CoreResult<()>;
}

/// Publisher for deployments without a message bus.
pub struct NoopPublisher;

#[async_trait]
impl EventPublisher for NoopPublisher {
    async fn publish(&self, event: &ReservationEvent) -> CoreResult<()> {
        tracing::debug!(
            reservation_id = %event.reservation_id,
            kind = ?event.kind,
            "Dropping reservation event (no publisher configured)"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;
    use wayfare_shared::ReservationEventKind;

    #[tokio::test]
    async fn test_noop_publisher_accepts_everything() {
        let event = ReservationEvent::new(Uuid::new_v4(), "customer-1", ReservationEventKind::Confirmed);
        assert!(NoopPublisher.publish(&event).await.is_ok());
    }
}
