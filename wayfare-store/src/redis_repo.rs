use redis::RedisResult;
use tracing::debug;

/// Counts the hit and starts the window on the first one only, so a steady
/// stream of requests can not keep extending it.
const FIXED_WINDOW_SCRIPT: &str = r#"
    local count = redis.call("INCR", KEYS[1])
    if count == 1 then
        redis.call("EXPIRE", KEYS[1], ARGV[1])
    end
    return {count, redis.call("TTL", KEYS[1])}
"#;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitDecision {
    pub count: i64,
    pub limit: i64,
    /// Seconds until the current window closes
    pub reset_in: i64,
}

impl RateLimitDecision {
    pub fn allowed(&self) -> bool {
        self.count <= self.limit
    }
}

#[derive(Clone)]
pub struct RedisClient {
    client: redis::Client,
}

impl RedisClient {
    pub async fn new(connection_string: &str) -> Result<Self, redis::RedisError> {
        let client = redis::Client::open(connection_string)?;
        Ok(Self { client })
    }

    pub async fn check_rate_limit(
        &self,
        key: &str,
        limit: i64,
        window_seconds: i64,
    ) -> RedisResult<RateLimitDecision> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;

        let (count, ttl): (i64, i64) = redis::Script::new(FIXED_WINDOW_SCRIPT)
            .key(key)
            .arg(window_seconds)
            .invoke_async(&mut conn)
            .await?;

        let decision = RateLimitDecision {
            count,
            limit,
            reset_in: ttl.max(0),
        };
        if !decision.allowed() {
            debug!(key = %key, count, limit, reset_in = decision.reset_in, "Rate limit exceeded");
        }
        Ok(decision)
    }
}
