use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Client, Script};
use tracing::{debug, error, info};

use super::TokenStore;
use crate::error::{AdapterError, AdapterResult};

// GET, compare, TTL, DEL in one server-side step.
const TAKE_IF_SCRIPT: &str = r#"
local value = redis.call('GET', KEYS[1])
if not value or value ~= ARGV[1] then
    return nil
end
local ttl = redis.call('TTL', KEYS[1])
redis.call('DEL', KEYS[1])
return {value, ttl}
"#;

#[derive(Clone)]
pub struct RedisTokenStore {
    connection: ConnectionManager,
    take_if: Script,
}

impl RedisTokenStore {
    pub async fn connect(url: &str) -> AdapterResult<Self> {
        let client = Client::open(url).map_err(|e| {
            error!(error = %e, "invalid redis url");
            AdapterError::StoreUnavailable(format!("redis client creation failed: {}", e))
        })?;
        let connection = ConnectionManager::new(client).await.map_err(|e| {
            error!(error = %e, "redis connection failed");
            AdapterError::StoreUnavailable(format!("redis connection failed: {}", e))
        })?;
        info!("redis connection established");
        Ok(Self {
            connection,
            take_if: Script::new(TAKE_IF_SCRIPT),
        })
    }
}

#[async_trait]
impl TokenStore for RedisTokenStore {
    async fn set_ex(&self, key: &str, value: &str, ttl_secs: u64) -> AdapterResult<()> {
        debug!(ttl_secs, "redis SET EX");
        let mut conn = self.connection.clone();
        let _: () = conn.set_ex(key, value, ttl_secs).await?;
        Ok(())
    }

    async fn refresh(&self, key: &str, value: &str, ttl_secs: u64) -> AdapterResult<bool> {
        debug!(ttl_secs, "redis SET EX XX");
        let mut conn = self.connection.clone();
        let reply: Option<String> = redis::cmd("SET")
            .arg(key)
            .arg(value)
            .arg("EX")
            .arg(ttl_secs)
            .arg("XX")
            .query_async(&mut conn)
            .await?;
        Ok(reply.is_some())
    }

    async fn get_with_ttl(&self, key: &str) -> AdapterResult<Option<(String, i64)>> {
        let mut conn = self.connection.clone();
        let (value, ttl): (Option<String>, i64) = redis::pipe()
            .atomic()
            .get(key)
            .ttl(key)
            .query_async(&mut conn)
            .await?;
        Ok(value.map(|v| (v, ttl)))
    }

    async fn del(&self, key: &str) -> AdapterResult<()> {
        let mut conn = self.connection.clone();
        let _: i64 = conn.del(key).await?;
        Ok(())
    }

    async fn take_if(&self, key: &str, expected: &str) -> AdapterResult<Option<(String, i64)>> {
        let mut conn = self.connection.clone();
        let taken: Option<(String, i64)> = self
            .take_if
            .key(key)
            .arg(expected)
            .invoke_async(&mut conn)
            .await?;
        Ok(taken)
    }
}
