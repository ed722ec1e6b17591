//! Working-set cache and delta publishing seams.
//!
//! The online tables are fully replaced every cycle, so the only memory of what was online in
//! the previous cycle is the working-set cache: a short-lived `|`-joined identifier list per
//! entity class. Entries expire on their own (65 s by default), which doubles as a dead-man's
//! switch: if cycles stop running, the lists age out instead of pinning stale connections.
//!
//! Any store with per-key expiry and read/overwrite semantics can back the cache. Redis is used in
//! production; [`MemoryBroker`] keeps everything in-process.

use anyhow::Result;
use async_trait::async_trait;
use moka::Expiry;
use moka::future::Cache;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;

/// Expiry of the per-class identifier lists
pub const ONLINE_SET_TTL: Duration = Duration::from_secs(65);

/// Expiry of `PILOT:<callsign>` position maps
pub const PILOT_POSITION_TTL: Duration = Duration::from_secs(300);

/// Key/value store with per-key expiry
#[async_trait]
pub trait WorkingSetCache: Send + Sync {
    /// Read a string value; `None` when absent or expired
    async fn get(&self, key: &str) -> Result<Option<String>>;

    /// Overwrite a string value; `ttl = None` means no expiry
    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<()>;

    /// Read a field map; `None` when absent or expired
    async fn get_fields(&self, key: &str) -> Result<Option<BTreeMap<String, String>>>;

    /// Write fields into a map and reset its expiry
    async fn set_fields(
        &self,
        key: &str,
        fields: &[(&str, String)],
        ttl: Option<Duration>,
    ) -> Result<()>;

    /// Reset the expiry of an existing key; missing keys are ignored
    async fn expire(&self, key: &str, ttl: Duration) -> Result<()>;

    async fn delete(&self, key: &str) -> Result<()>;
}

/// Best-effort, at-most-once event transport
#[async_trait]
pub trait DeltaPublisher: Send + Sync {
    /// Publish `payload` (a bare identifier) on `channel`
    async fn publish(&self, channel: &str, payload: &str) -> Result<()>;
}

/// Read an identifier list; absent or empty entries are the empty list
pub async fn read_id_list(cache: &dyn WorkingSetCache, key: &str) -> Result<Vec<String>> {
    Ok(cache
        .get(key)
        .await?
        .filter(|joined| !joined.is_empty())
        .map(|joined| joined.split('|').map(str::to_string).collect())
        .unwrap_or_default())
}

/// Overwrite an identifier list
pub async fn write_id_list(
    cache: &dyn WorkingSetCache,
    key: &str,
    ids: &[String],
    ttl: Duration,
) -> Result<()> {
    cache.set(key, &ids.join("|"), Some(ttl)).await
}

#[derive(Debug, Clone)]
enum CachedValue {
    Text(String),
    Fields(BTreeMap<String, String>),
}

#[derive(Debug, Clone)]
struct CacheEntry {
    value: CachedValue,
    ttl: Option<Duration>,
}

/// Each entry carries its own time-to-live, reset on every write
struct EntryExpiry;

impl Expiry<String, CacheEntry> for EntryExpiry {
    fn expire_after_create(
        &self,
        _key: &String,
        value: &CacheEntry,
        _created_at: Instant,
    ) -> Option<Duration> {
        value.ttl
    }

    fn expire_after_update(
        &self,
        _key: &String,
        value: &CacheEntry,
        _updated_at: Instant,
        _duration_until_expiry: Option<Duration>,
    ) -> Option<Duration> {
        value.ttl
    }
}

/// Message recorded by [`MemoryBroker`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishedMessage {
    pub channel: String,
    pub payload: String,
}

/// In-process cache and publisher, used for dry runs and tests
#[derive(Clone)]
pub struct MemoryBroker {
    entries: Cache<String, CacheEntry>,
    published: Arc<Mutex<Vec<PublishedMessage>>>,
}

impl MemoryBroker {
    pub fn new() -> Self {
        Self {
            entries: Cache::builder()
                .max_capacity(100_000)
                .expire_after(EntryExpiry)
                .build(),
            published: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Every message published so far, oldest first
    pub async fn published(&self) -> Vec<PublishedMessage> {
        self.published.lock().await.clone()
    }

    /// Payloads published on one channel, oldest first
    pub async fn published_on(&self, channel: &str) -> Vec<String> {
        self.published
            .lock()
            .await
            .iter()
            .filter(|m| m.channel == channel)
            .map(|m| m.payload.clone())
            .collect()
    }

    /// Drop the publish log
    pub async fn clear_published(&self) {
        self.published.lock().await.clear();
    }
}

impl Default for MemoryBroker {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl WorkingSetCache for MemoryBroker {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(match self.entries.get(key).await {
            Some(CacheEntry {
                value: CachedValue::Text(text),
                ..
            }) => Some(text),
            _ => None,
        })
    }

    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<()> {
        let entry = CacheEntry {
            value: CachedValue::Text(value.to_string()),
            ttl,
        };
        self.entries.insert(key.to_string(), entry).await;
        Ok(())
    }

    async fn get_fields(&self, key: &str) -> Result<Option<BTreeMap<String, String>>> {
        Ok(match self.entries.get(key).await {
            Some(CacheEntry {
                value: CachedValue::Fields(fields),
                ..
            }) => Some(fields),
            _ => None,
        })
    }

    async fn set_fields(
        &self,
        key: &str,
        fields: &[(&str, String)],
        ttl: Option<Duration>,
    ) -> Result<()> {
        let mut map = match self.entries.get(key).await {
            Some(CacheEntry {
                value: CachedValue::Fields(existing),
                ..
            }) => existing,
            _ => BTreeMap::new(),
        };
        for (name, value) in fields {
            map.insert(name.to_string(), value.clone());
        }

        let entry = CacheEntry {
            value: CachedValue::Fields(map),
            ttl,
        };
        self.entries.insert(key.to_string(), entry).await;
        Ok(())
    }

    async fn expire(&self, key: &str, ttl: Duration) -> Result<()> {
        if let Some(mut entry) = self.entries.get(key).await {
            entry.ttl = Some(ttl);
            self.entries.insert(key.to_string(), entry).await;
        }
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        self.entries.invalidate(key).await;
        Ok(())
    }
}

#[async_trait]
impl DeltaPublisher for MemoryBroker {
    async fn publish(&self, channel: &str, payload: &str) -> Result<()> {
        self.published.lock().await.push(PublishedMessage {
            channel: channel.to_string(),
            payload: payload.to_string(),
        });
        Ok(())
    }
}
