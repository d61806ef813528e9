use async_trait::async_trait;
use rdkafka::config::ClientConfig;
use rdkafka::producer::{FutureProducer, FutureRecord};
use rdkafka::util::Timeout;
use std::time::Duration;
use tracing::{debug, error};
use wayfare_core::{CoreError, CoreResult, EventPublisher};
use wayfare_shared::ReservationEvent;

/// Kafka producer for reservation lifecycle events, keyed by reservation id
/// so every event of one reservation lands on the same partition.
#[derive(Clone)]
pub struct EventProducer {
    producer: FutureProducer,
}

impl EventProducer {
    pub fn new(brokers: &str) -> Result<Self, rdkafka::error::KafkaError> {
        let producer: FutureProducer = ClientConfig::new()
            .set("bootstrap.servers", brokers)
            .set("message.timeout.ms", "5000")
            .create()?;

        Ok(Self { producer })
    }

    pub async fn send(&self, topic: &str, key: &str, payload: &str) -> Result<(), rdkafka::error::KafkaError> {
        let record = FutureRecord::to(topic).key(key).payload(payload);

        match self.producer.send(record, Timeout::After(Duration::from_secs(0))).await {
            Ok(_) => {
                debug!("Sent message to {}/{}", topic, key);
                Ok(())
            }
            Err((e, _msg)) => {
                error!("Failed to send message to {}: {}", topic, e);
                Err(e)
            }
        }
    }
}

#[async_trait]
impl EventPublisher for EventProducer {
    async fn publish(&self, event: &ReservationEvent) -> CoreResult<()> {
        let payload = serde_json::to_string(event).map_err(|e| CoreError::PublishError(e.to_string()))?;

        self.send(event.kind.topic(), &event.reservation_id.to_string(), &payload)
            .await
            .map_err(|e| CoreError::PublishError(e.to_string()))
    }
}
