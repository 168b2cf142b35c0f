use async_trait::async_trait;
use redis::AsyncCommands;
use redis::aio::MultiplexedConnection;
use tracing::warn;

use crate::{AvailabilityCounter, CounterResult};

/// Default Redis key of the availability counter.
pub const AVAILABILITY_KEY: &str = "availability:count";

/// Decrements the key and clamps the stored value at zero in one round trip.
const DECREMENT_CLAMPED: &str = r#"
    local value = redis.call("DECR", KEYS[1])
    if value < 0 then
        redis.call("SET", KEYS[1], 0)
        return 0
    end
    return value
"#;

/// Availability counter stored in a single Redis key.
#[derive(Clone)]
pub struct RedisAvailabilityCounter {
    conn: MultiplexedConnection,
    key: String,
}

impl RedisAvailabilityCounter {
    /// Connects to Redis and uses the default key.
    pub async fn connect(url: &str) -> CounterResult<Self> {
        Self::connect_with_key(url, AVAILABILITY_KEY).await
    }

    /// Connects to Redis and stores the counter under `key`.
    pub async fn connect_with_key(url: &str, key: impl Into<String>) -> CounterResult<Self> {
        let client = redis::Client::open(url)?;
        let conn = client.get_multiplexed_async_connection().await?;
        Ok(Self {
            conn,
            key: key.into(),
        })
    }

    /// Deletes the key.
    pub async fn clear(&self) -> CounterResult<()> {
        let mut conn = self.conn.clone();
        conn.del::<_, ()>(&self.key).await?;
        Ok(())
    }
}

#[async_trait]
impl AvailabilityCounter for RedisAvailabilityCounter {
    async fn has_value(&self) -> CounterResult<bool> {
        let mut conn = self.conn.clone();
        Ok(conn.exists(&self.key).await?)
    }

    async fn get(&self) -> CounterResult<i64> {
        let mut conn = self.conn.clone();
        let raw: Option<String> = conn.get(&self.key).await?;
        match raw {
            None => Ok(0),
            Some(raw) => match raw.trim().parse::<i64>() {
                Ok(value) => Ok(value),
                Err(_) => {
                    warn!(key = %self.key, value = %raw, "Non-numeric availability value, resetting to 0");
                    conn.set::<_, _, ()>(&self.key, 0).await?;
                    Ok(0)
                }
            },
        }
    }

    async fn set(&self, value: i64) -> CounterResult<()> {
        let mut conn = self.conn.clone();
        conn.set::<_, _, ()>(&self.key, value).await?;
        Ok(())
    }

    async fn increment(&self) -> CounterResult<i64> {
        let mut conn = self.conn.clone();
        Ok(conn.incr(&self.key, 1).await?)
    }

    async fn decrement_clamped(&self) -> CounterResult<i64> {
        let mut conn = self.conn.clone();
        let script = redis::Script::new(DECREMENT_CLAMPED);
        Ok(script.key(&self.key).invoke_async(&mut conn).await?)
    }
}
