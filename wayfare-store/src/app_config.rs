use serde::Deserialize;
use std::env;
use wayfare_catalog::PriceTable;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub redis: RedisConfig,
    pub kafka: KafkaConfig,
    pub auth: AuthConfig,
    pub payments: PaymentsConfig,
    #[serde(default)]
    pub lifecycle: LifecycleConfig,
    #[serde(default)]
    pub pricing: PriceTable,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    pub port: u16,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct DatabaseConfig {
    pub url: String,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
    #[serde(default = "default_acquire_timeout")]
    pub acquire_timeout_seconds: u64,
}

fn default_max_connections() -> u32 {
    5
}

fn default_acquire_timeout() -> u64 {
    3
}

#[derive(Debug, Deserialize, Clone)]
pub struct RedisConfig {
    pub url: String,
    /// Requests allowed per client IP within one window
    #[serde(default = "default_rate_limit")]
    pub rate_limit: i64,
    #[serde(default = "default_rate_window")]
    pub rate_window_seconds: i64,
}

fn default_rate_limit() -> i64 {
    100
}

fn default_rate_window() -> i64 {
    60
}

#[derive(Debug, Deserialize, Clone)]
pub struct KafkaConfig {
    pub brokers: String,
    /// With Kafka disabled lifecycle events are only logged
    #[serde(default = "default_true")]
    pub enabled: bool,
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Deserialize, Clone)]
pub struct AuthConfig {
    pub jwt_secret: String,
    pub jwt_expiration_seconds: u64,
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum PaymentProvider {
    Mock,
    Stripe,
}

#[derive(Debug, Deserialize, Clone)]
pub struct PaymentsConfig {
    pub provider: PaymentProvider,
    #[serde(default = "default_api_base")]
    pub api_base: String,
    pub secret_key: Option<String>,
    pub success_url: String,
    pub cancel_url: String,
    /// Shared secret the provider sends with every webhook delivery
    pub webhook_secret: String,
    #[serde(default = "default_gateway_timeout")]
    pub timeout_seconds: u64,
    #[serde(default = "default_mock_checkout_base")]
    pub mock_checkout_base: String,
}

fn default_api_base() -> String {
    "https://api.stripe.com".to_string()
}

fn default_gateway_timeout() -> u64 {
    10
}

fn default_mock_checkout_base() -> String {
    "http://localhost:8080/mock-checkout".to_string()
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ReceiptStoreKind {
    Postgres,
    Memory,
}

#[derive(Debug, Deserialize, Clone)]
pub struct LifecycleConfig {
    pub max_write_attempts: usize,
    pub reconcile_interval_seconds: u64,
    pub reconcile_batch_size: usize,
    pub receipt_store: ReceiptStoreKind,
}

impl Default for LifecycleConfig {
    fn default() -> Self {
        Self {
            max_write_attempts: 3,
            reconcile_interval_seconds: 30,
            reconcile_batch_size: 50,
            receipt_store: ReceiptStoreKind::Postgres,
        }
    }
}

impl Config {
    pub fn load() -> Result<Self, config::ConfigError> {
        let run_mode = env::var("RUN_MODE").unwrap_or_else(|_| "development".into());

        let s = config::Config::builder()
            .add_source(config::File::with_name("config/default"))
            // Per-environment overrides, optional
            .add_source(config::File::with_name(&format!("config/{}", run_mode)).required(false))
            // Developer overrides, never checked in
            .add_source(config::File::with_name("config/local").required(false))
            // e.g. `WAYFARE__PAYMENTS__SECRET_KEY=sk_live_...`
            .add_source(config::Environment::with_prefix("WAYFARE").separator("__"))
            .build()?;

        s.try_deserialize()
    }

    pub fn from_toml(contents: &str) -> Result<Self, config::ConfigError> {
        config::Config::builder()
            .add_source(config::File::from_str(contents, config::FileFormat::Toml))
            .build()?
            .try_deserialize()
    }
}
