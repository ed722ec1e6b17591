use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use std::time::Duration;
use tracing::debug;

use crate::pirep_normalizer::RawReport;

/// GeoJSON PIREPs from the last two hours over the southwestern US
pub const DEFAULT_PIREP_URL: &str =
    "https://aviationweather.gov/api/data/pirep?format=geojson&age=2&bbox=30,-115,38,-100";

/// Source of raw pilot reports
#[async_trait]
pub trait PirepFeed: Send + Sync {
    async fn fetch_reports(&self) -> Result<Vec<RawReport>>;
}

/// AviationWeather HTTP client; accepts either the legacy XML or the GeoJSON response
pub struct PirepClient {
    client: Client,
    url: String,
}

impl PirepClient {
    pub fn new(url: String, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(concat!("artcc-sync/", env!("CARGO_PKG_VERSION")))
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self { client, url })
    }
}

#[async_trait]
impl PirepFeed for PirepClient {
    async fn fetch_reports(&self) -> Result<Vec<RawReport>> {
        let body = self
            .client
            .get(&self.url)
            .send()
            .await
            .context("PIREP request failed")?
            .error_for_status()
            .context("PIREP endpoint returned an error")?
            .text()
            .await
            .context("Failed to read PIREP response")?;

        let reports = RawReport::parse_batch(&body)?;
        debug!("Fetched {} PIREPs", reports.len());
        Ok(reports)
    }
}
