use super::lua_scripts::CONSUME_WINDOW_SCRIPT;
use super::store::WindowStore;
use super::types::WindowState;
use crate::error::{LimiterError, Result};
use async_trait::async_trait;
use redis::{aio::ConnectionManager, AsyncCommands, Script};
use tracing::debug;

/// Redis-backed window store.
///
/// Each namespace is a Redis hash and each rate limit key a field in it, holding
/// the JSON window. `consume` runs as a single Lua script.
#[derive(Clone)]
pub struct RedisStore {
    /// Redis connection manager
    connection: ConnectionManager,
    script: Script,
}

impl RedisStore {
    /// Connect to Redis
    pub async fn new(redis_url: &str) -> Result<Self> {
        let client = redis::Client::open(redis_url)?;
        let connection = ConnectionManager::new(client).await?;

        Ok(Self {
            connection,
            script: Script::new(CONSUME_WINDOW_SCRIPT),
        })
    }

    /// Test Redis connection
    pub async fn ping(&self) -> Result<()> {
        let mut connection = self.connection.clone();
        redis::cmd("PING")
            .query_async::<_, String>(&mut connection)
            .await?;
        Ok(())
    }
}

#[async_trait]
impl WindowStore for RedisStore {
    async fn get(&self, namespace: &str, key: &str) -> Result<Option<String>> {
        let mut connection = self.connection.clone();
        let value: Option<String> = connection.hget(namespace, key).await?;
        Ok(value)
    }

    async fn set(&self, namespace: &str, key: &str, value: String) -> Result<()> {
        let mut connection = self.connection.clone();
        connection.hset::<_, _, _, ()>(namespace, key, value).await?;
        Ok(())
    }

    async fn consume(
        &self,
        namespace: &str,
        key: &str,
        count: u32,
        expire_ms: u64,
        now: u64,
    ) -> Result<WindowState> {
        let mut connection = self.connection.clone();

        let result: Vec<i64> = self
            .script
            .key(namespace)
            .arg(key)
            .arg(count)
            .arg(expire_ms)
            .arg(now)
            .invoke_async(&mut connection)
            .await?;

        let &[total, remaining, reset] = result.as_slice() else {
            return Err(LimiterError::Store(format!(
                "Unexpected script reply for key {}: {:?}",
                key, result
            )));
        };

        debug!(
            "Window consumed for key {}: total={}, remaining={}, reset={}",
            key, total, remaining, reset
        );

        Ok(WindowState {
            total: u64::try_from(total).unwrap_or(0),
            remaining,
            reset: u64::try_from(reset).unwrap_or(0),
        })
    }
}
