//! Online-set differencing.
//!
//! Once per cycle and per entity class, the differencer compares the identifiers found in the
//! current poll with the list remembered from the previous poll, publishes a delete event for
//! every identifier that disappeared and an update heartbeat for every identifier still present,
//! then overwrites the remembered list.

use anyhow::{Context, Result};
use std::collections::HashSet;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::working_set::{
    DeltaPublisher, ONLINE_SET_TTL, WorkingSetCache, read_id_list, write_id_list,
};

/// Entity classes that keep an online set
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntityClass {
    Pilots,
    Controllers,
    Atis,
    Neighbors,
}

impl EntityClass {
    pub const ALL: [EntityClass; 4] = [
        EntityClass::Pilots,
        EntityClass::Controllers,
        EntityClass::Atis,
        EntityClass::Neighbors,
    ];

    /// Cache key holding the class's `|`-joined identifier list
    pub fn cache_key(self) -> &'static str {
        match self {
            EntityClass::Pilots => "pilots",
            EntityClass::Controllers => "controllers",
            EntityClass::Atis => "atis",
            EntityClass::Neighbors => "neighbors",
        }
    }

    /// Channel for identifiers that went offline
    pub fn delete_channel(self) -> Option<&'static str> {
        match self {
            EntityClass::Pilots => Some("PILOT:DELETE"),
            EntityClass::Controllers => Some("CONTROLLER:DELETE"),
            EntityClass::Atis => Some("ATIS:DELETE"),
            EntityClass::Neighbors => None,
        }
    }

    /// Channel for the per-cycle heartbeat of identifiers still online
    pub fn update_channel(self) -> Option<&'static str> {
        match self {
            EntityClass::Pilots => Some("PILOT:UPDATE"),
            _ => None,
        }
    }
}

impl std::fmt::Display for EntityClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.cache_key())
    }
}

/// Outcome of one class's reconciliation
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OnlineDelta {
    /// In the previous set but not the current one, in previous-set order
    pub removed: Vec<String>,
    /// The current set, in feed order
    pub present: Vec<String>,
}

impl OnlineDelta {
    /// Compute `removed = previous − current`
    pub fn between(previous: &[String], current: &[String]) -> Self {
        let current_set: HashSet<&str> = current.iter().map(String::as_str).collect();
        let removed = previous
            .iter()
            .filter(|id| !current_set.contains(id.as_str()))
            .cloned()
            .collect();

        Self {
            removed,
            present: current.to_vec(),
        }
    }
}

/// Remove duplicates while keeping first-seen order
pub fn dedup_ids(ids: impl IntoIterator<Item = String>) -> Vec<String> {
    let mut seen = HashSet::new();
    ids.into_iter()
        .filter(|id| seen.insert(id.clone()))
        .collect()
}

/// Keeps one online set per [`EntityClass`] in the working-set cache
#[derive(Clone)]
pub struct OnlineSetDifferencer {
    cache: Arc<dyn WorkingSetCache>,
    publisher: Arc<dyn DeltaPublisher>,
    ttl: Duration,
}

impl OnlineSetDifferencer {
    pub fn new(cache: Arc<dyn WorkingSetCache>, publisher: Arc<dyn DeltaPublisher>) -> Self {
        Self {
            cache,
            publisher,
            ttl: ONLINE_SET_TTL,
        }
    }

    /// Override the online-set expiry
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    /// Identifiers remembered from the previous cycle
    pub async fn previous_set(&self, class: EntityClass) -> Result<Vec<String>> {
        read_id_list(self.cache.as_ref(), class.cache_key()).await
    }

    /// Reconcile one class.
    ///
    /// `persist` runs after the previous set has been read and before anything is published. If
    /// it fails, the class is aborted: no events go out and the remembered list is left as is, so
    /// the next cycle diffs against the last complete set.
    ///
    /// If the previous set cannot be read, the class still persists and publishes heartbeats, but
    /// no delete events are emitted for this cycle.
    #[tracing::instrument(skip(self, current, persist), fields(class = %class, current = current.len()))]
    pub async fn reconcile<F>(
        &self,
        class: EntityClass,
        current: Vec<String>,
        persist: F,
    ) -> Result<OnlineDelta>
    where
        F: Future<Output = Result<()>> + Send,
    {
        let previous = match self.previous_set(class).await {
            Ok(previous) => Some(previous),
            Err(e) => {
                warn!("Failed to read previous {} set, skipping removals: {:#}", class, e);
                metrics::counter!("sync.cache.read_failed", "class" => class.cache_key())
                    .increment(1);
                None
            }
        };

        persist
            .await
            .with_context(|| format!("Failed to persist {} snapshot", class))?;

        let delta = match &previous {
            Some(previous) => OnlineDelta::between(previous, &current),
            None => OnlineDelta {
                removed: Vec::new(),
                present: current,
            },
        };

        if let Some(channel) = class.delete_channel() {
            for id in &delta.removed {
                self.publish(channel, id).await;
            }
        }
        if let Some(channel) = class.update_channel() {
            for id in &delta.present {
                self.publish(channel, id).await;
            }
        }

        write_id_list(self.cache.as_ref(), class.cache_key(), &delta.present, self.ttl)
            .await
            .with_context(|| format!("Failed to store {} set", class))?;

        metrics::gauge!("sync.online", "class" => class.cache_key())
            .set(delta.present.len() as f64);
        metrics::counter!("sync.delta.removed", "class" => class.cache_key())
            .increment(delta.removed.len() as u64);

        if delta.removed.is_empty() {
            debug!("{} online: {}", class, delta.present.len());
        } else {
            info!(
                "{} online: {}, went offline: {}",
                class,
                delta.present.len(),
                delta.removed.join(", ")
            );
        }

        Ok(delta)
    }

    /// At-most-once publish; failures are logged and counted, never propagated
    async fn publish(&self, channel: &str, id: &str) {
        match self.publisher.publish(channel, id).await {
            Ok(()) => {
                metrics::counter!("sync.events.published", "channel" => channel.to_string())
                    .increment(1);
            }
            Err(e) => {
                warn!("Failed to publish {} on {}: {:#}", id, channel, e);
                metrics::counter!("sync.events.publish_failed", "channel" => channel.to_string())
                    .increment(1);
            }
        }
    }
}
