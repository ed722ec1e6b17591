use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use std::time::Duration;
use tracing::{debug, warn};

/// Notified when a controller opens a new duty session
#[async_trait]
pub trait SessionObserver: Send + Sync {
    async fn session_opened(&self, cid: i32);
}

/// Does nothing; used when no statistics endpoint is configured
pub struct NoopObserver;

#[async_trait]
impl SessionObserver for NoopObserver {
    async fn session_opened(&self, _cid: i32) {}
}

/// Posts `<base_url>/<cid>` to the statistics service so it refreshes the controller's totals
#[derive(Clone)]
pub struct StatsClient {
    client: Client,
    base_url: String,
}

impl StatsClient {
    pub fn new(base_url: String, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    /// Endpoint for one controller
    pub fn url_for(&self, cid: i32) -> String {
        format!("{}/{}", self.base_url, cid)
    }

    async fn notify(&self, cid: i32) -> Result<()> {
        let response = self
            .client
            .post(self.url_for(cid))
            .send()
            .await
            .context("Stats request failed")?;
        response
            .error_for_status()
            .context("Stats endpoint returned an error")?;
        Ok(())
    }
}

#[async_trait]
impl SessionObserver for StatsClient {
    /// Fire-and-forget: the request runs on its own task and never blocks the cycle
    async fn session_opened(&self, cid: i32) {
        let stats = self.clone();
        tokio::spawn(async move {
            match stats.notify(cid).await {
                Ok(()) => debug!("Notified stats service for {}", cid),
                Err(e) => {
                    warn!("Failed to notify stats service for {}: {:#}", cid, e);
                    metrics::counter!("sync.stats.notify_failed").increment(1);
                }
            }
        });
    }
}
