pub mod app_config;
pub mod database;
pub mod document_repo;
pub mod events;
pub mod redis_repo;
pub mod reservation_repo;
pub mod stripe_gateway;

pub use database::DbClient;
pub use document_repo::PgDocumentStore;
pub use events::EventProducer;
pub use redis_repo::{RateLimitDecision, RedisClient};
pub use reservation_repo::PgReservationRepository;
pub use stripe_gateway::StripeGateway;
