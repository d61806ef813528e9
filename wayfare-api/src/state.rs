use std::sync::Arc;
use wayfare_catalog::PriceTable;
use wayfare_reservation::{
    DriverAssignmentService, LifecycleManager, MockPaymentGateway, PaymentOrchestrator, ReceiptIssuer,
};
use wayfare_store::RedisClient;

use crate::middleware::resiliency::ResiliencyState;

#[derive(Clone)]
pub struct AuthConfig {
    pub secret: String,
    pub expiration: u64,
}

#[derive(Clone, Copy)]
pub struct RateLimitConfig {
    pub limit: i64,
    pub window_seconds: i64,
}

#[derive(Clone)]
pub struct AppState {
    pub lifecycle: Arc<LifecycleManager>,
    pub assignments: Arc<DriverAssignmentService>,
    pub payments: Arc<PaymentOrchestrator>,
    pub receipts: Arc<ReceiptIssuer>,
    pub pricing: Arc<PriceTable>,
    /// Rate limiting is skipped when Redis is not configured
    pub redis: Option<Arc<RedisClient>>,
    pub rate_limit: RateLimitConfig,
    pub auth: AuthConfig,
    pub webhook_secret: String,
    pub resiliency: Arc<ResiliencyState>,
    /// Present only when the mock provider is active
    pub mock_gateway: Option<Arc<MockPaymentGateway>>,
}
