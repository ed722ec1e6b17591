//! VATSIM network snapshot feed.
//!
//! The v3 data feed is a single JSON document that lists every connected pilot, controller and
//! ATIS station. METARs come from a separate plain-text endpoint, one report per line.

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, info};

pub const DEFAULT_DATA_URL: &str = "https://data.vatsim.net/v3/vatsim-data.json";
pub const DEFAULT_METAR_URL: &str = "https://metar.vatsim.net";

/// One poll of the network
#[derive(Debug, Clone, Default, Deserialize)]
pub struct VatsimSnapshot {
    #[serde(default)]
    pub pilots: Vec<VatsimPilot>,
    #[serde(default)]
    pub controllers: Vec<VatsimController>,
    #[serde(default)]
    pub atis: Vec<VatsimAtis>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct VatsimPilot {
    pub cid: i32,
    #[serde(default)]
    pub name: String,
    pub callsign: String,
    pub latitude: f64,
    pub longitude: f64,
    #[serde(default)]
    pub altitude: i32,
    #[serde(default)]
    pub heading: i32,
    #[serde(default)]
    pub groundspeed: i32,
    #[serde(default)]
    pub flight_plan: Option<FlightPlan>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct FlightPlan {
    #[serde(default)]
    pub aircraft: String,
    #[serde(default)]
    pub departure: String,
    #[serde(default)]
    pub arrival: String,
    /// Filed cruise altitude, either feet ("35000") or flight level shorthand ("FL350")
    #[serde(default)]
    pub altitude: String,
    #[serde(default)]
    pub route: String,
    #[serde(default)]
    pub remarks: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct VatsimController {
    pub cid: i32,
    #[serde(default)]
    pub name: String,
    pub callsign: String,
    #[serde(default)]
    pub frequency: String,
    /// Facility type; 0 is an observer connection
    #[serde(default)]
    pub facility: i32,
    #[serde(default)]
    pub rating: i32,
    #[serde(default)]
    pub text_atis: Option<Vec<String>>,
    pub logon_time: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct VatsimAtis {
    pub cid: i32,
    pub callsign: String,
    #[serde(default)]
    pub frequency: String,
    #[serde(default)]
    pub atis_code: Option<String>,
    #[serde(default)]
    pub text_atis: Option<Vec<String>>,
}

/// Source of network snapshots and METARs
#[async_trait]
pub trait SnapshotFeed: Send + Sync {
    /// Fetch the current network snapshot
    async fn fetch_snapshot(&self) -> Result<VatsimSnapshot>;

    /// Fetch the latest METAR for each airport, one raw report per entry
    async fn fetch_metars(&self, airports: &[String]) -> Result<Vec<String>>;
}

/// HTTP client for the VATSIM data and METAR endpoints
pub struct VatsimClient {
    client: Client,
    data_url: String,
    metar_url: String,
}

impl VatsimClient {
    /// Create a new client; `timeout` bounds every request
    pub fn new(data_url: String, metar_url: String, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(concat!("artcc-sync/", env!("CARGO_PKG_VERSION")))
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            client,
            data_url,
            metar_url: metar_url.trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait]
impl SnapshotFeed for VatsimClient {
    async fn fetch_snapshot(&self) -> Result<VatsimSnapshot> {
        debug!("Fetching network snapshot from {}", self.data_url);

        let response = self
            .client
            .get(&self.data_url)
            .send()
            .await
            .context("Failed to send request to VATSIM data feed")?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("VATSIM data feed error {}: {}", status, body);
        }

        let snapshot: VatsimSnapshot = response
            .json()
            .await
            .context("Failed to parse VATSIM data feed")?;

        info!(
            "Fetched snapshot: {} pilots, {} controllers, {} ATIS",
            snapshot.pilots.len(),
            snapshot.controllers.len(),
            snapshot.atis.len()
        );
        Ok(snapshot)
    }

    async fn fetch_metars(&self, airports: &[String]) -> Result<Vec<String>> {
        let url = format!("{}/{}", self.metar_url, airports.join(","));

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .context("Failed to send request to VATSIM METAR service")?;

        if !response.status().is_success() {
            anyhow::bail!("VATSIM METAR service error {}", response.status());
        }

        let body = response
            .text()
            .await
            .context("Failed to read METAR response")?;
        Ok(parse_metar_lines(&body))
    }
}

/// Split a newline-delimited METAR response into individual reports
pub fn parse_metar_lines(body: &str) -> Vec<String> {
    body.lines()
        .map(str::trim)
        .filter(|line| line.len() >= 4)
        .map(str::to_string)
        .collect()
}
