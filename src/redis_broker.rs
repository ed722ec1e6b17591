use anyhow::{Context, Result};
use async_trait::async_trait;
use redis::AsyncCommands;
use redis::aio::ConnectionManager;
use std::collections::BTreeMap;
use std::time::Duration;
use tracing::{debug, info};

use crate::working_set::{DeltaPublisher, WorkingSetCache};

/// Redis-backed working-set cache and pub/sub publisher
///
/// Keys and channels are used verbatim (`pilots`, `PILOT:UAL123`, `PILOT:DELETE`) because the
/// web frontend reads and subscribes to the same names.
#[derive(Clone)]
pub struct RedisBroker {
    manager: ConnectionManager,
}

impl RedisBroker {
    /// Connect and verify the server answers; the differencer cannot run without it
    pub async fn connect(redis_url: &str) -> Result<Self> {
        info!("Connecting to Redis at {}", redis_url);
        let client = redis::Client::open(redis_url).context("Invalid Redis URL")?;
        let mut manager = ConnectionManager::new(client)
            .await
            .context("Failed to connect to Redis")?;

        let pong: String = redis::cmd("PING")
            .query_async(&mut manager)
            .await
            .context("Redis did not answer PING")?;
        debug!("Redis PING -> {}", pong);

        Ok(Self { manager })
    }
}

fn ttl_secs(ttl: Duration) -> u64 {
    ttl.as_secs().max(1)
}

#[async_trait]
impl WorkingSetCache for RedisBroker {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        let mut conn = self.manager.clone();
        let value: Option<String> = conn
            .get(key)
            .await
            .with_context(|| format!("Redis GET {key} failed"))?;
        Ok(value)
    }

    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<()> {
        let mut conn = self.manager.clone();
        match ttl {
            Some(ttl) => {
                let _: () = conn
                    .set_ex(key, value, ttl_secs(ttl))
                    .await
                    .with_context(|| format!("Redis SETEX {key} failed"))?;
            }
            None => {
                let _: () = conn
                    .set(key, value)
                    .await
                    .with_context(|| format!("Redis SET {key} failed"))?;
            }
        }
        Ok(())
    }

    async fn get_fields(&self, key: &str) -> Result<Option<BTreeMap<String, String>>> {
        let mut conn = self.manager.clone();
        let fields: BTreeMap<String, String> = conn
            .hgetall(key)
            .await
            .with_context(|| format!("Redis HGETALL {key} failed"))?;
        Ok((!fields.is_empty()).then_some(fields))
    }

    async fn set_fields(
        &self,
        key: &str,
        fields: &[(&str, String)],
        ttl: Option<Duration>,
    ) -> Result<()> {
        let mut conn = self.manager.clone();
        let mut pipe = redis::pipe();
        pipe.atomic().hset_multiple(key, fields).ignore();
        if let Some(ttl) = ttl {
            pipe.expire(key, ttl_secs(ttl) as i64).ignore();
        }
        let _: () = pipe
            .query_async(&mut conn)
            .await
            .with_context(|| format!("Redis HSET {key} failed"))?;
        Ok(())
    }

    async fn expire(&self, key: &str, ttl: Duration) -> Result<()> {
        let mut conn = self.manager.clone();
        let _: bool = conn
            .expire(key, ttl_secs(ttl) as i64)
            .await
            .with_context(|| format!("Redis EXPIRE {key} failed"))?;
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        let mut conn = self.manager.clone();
        let _: i64 = conn
            .del(key)
            .await
            .with_context(|| format!("Redis DEL {key} failed"))?;
        Ok(())
    }
}

#[async_trait]
impl DeltaPublisher for RedisBroker {
    async fn publish(&self, channel: &str, payload: &str) -> Result<()> {
        let mut conn = self.manager.clone();
        let receivers: i64 = conn
            .publish(channel, payload)
            .await
            .with_context(|| format!("Redis PUBLISH {channel} failed"))?;
        debug!("Published {} on {} ({} receivers)", payload, channel, receivers);
        Ok(())
    }
}
