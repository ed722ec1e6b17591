use anyhow::{Context, Result, bail};
use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::pirep_client::DEFAULT_PIREP_URL;
use crate::vatsim::{DEFAULT_DATA_URL, DEFAULT_METAR_URL};

const DEFAULT_REDIS_URL: &str = "redis://127.0.0.1:6379";
const DEFAULT_NATS_URL: &str = "nats://localhost:4222";
const DEFAULT_POLL_INTERVAL_SECS: u64 = 15;
const DEFAULT_PIREP_INTERVAL_SECS: u64 = 120;
const DEFAULT_FETCH_TIMEOUT_SECS: u64 = 10;
const DEFAULT_METRICS_PORT: u16 = 9090;
const DEFAULT_DB_POOL_SIZE: u32 = 5;

/// Where online-set delta events are published
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventTransport {
    Redis,
    Nats,
}

impl FromStr for EventTransport {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "redis" => Ok(EventTransport::Redis),
            "nats" => Ok(EventTransport::Nats),
            other => bail!("Unknown EVENT_TRANSPORT {:?} (expected redis or nats)", other),
        }
    }
}

/// Runtime settings, read from the environment (and `.env`)
#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub db_pool_size: u32,
    pub redis_url: String,
    pub nats_url: String,
    pub event_transport: EventTransport,
    pub vatsim_data_url: String,
    pub vatsim_metar_url: String,
    pub pirep_url: String,
    /// Statistics refresh endpoint; no notifications when unset
    pub stats_url: Option<String>,
    pub region_file: Option<PathBuf>,
    pub poll_interval: Duration,
    pub pirep_interval: Duration,
    pub fetch_timeout: Duration,
    pub metrics_port: u16,
}

fn var_or(name: &str, default: &str) -> String {
    env::var(name)
        .ok()
        .filter(|v| !v.trim().is_empty())
        .unwrap_or_else(|| default.to_string())
}

fn parsed_or<T: FromStr>(name: &str, default: T) -> Result<T>
where
    T::Err: std::fmt::Display,
{
    match env::var(name) {
        Ok(value) if !value.trim().is_empty() => value
            .trim()
            .parse::<T>()
            .map_err(|e| anyhow::anyhow!("Invalid {}={:?}: {}", name, value, e)),
        _ => Ok(default),
    }
}

impl Config {
    pub fn from_env() -> Result<Self> {
        let database_url = env::var("DATABASE_URL").context("DATABASE_URL must be set")?;

        let poll_interval_secs = parsed_or("POLL_INTERVAL_SECS", DEFAULT_POLL_INTERVAL_SECS)?;
        let pirep_interval_secs = parsed_or("PIREP_INTERVAL_SECS", DEFAULT_PIREP_INTERVAL_SECS)?;
        let fetch_timeout_secs = parsed_or("FETCH_TIMEOUT_SECS", DEFAULT_FETCH_TIMEOUT_SECS)?;
        if poll_interval_secs == 0 || pirep_interval_secs == 0 || fetch_timeout_secs == 0 {
            bail!("Intervals and timeouts must be at least one second");
        }

        Ok(Self {
            database_url,
            db_pool_size: parsed_or("DB_POOL_SIZE", DEFAULT_DB_POOL_SIZE)?,
            redis_url: var_or("REDIS_URL", DEFAULT_REDIS_URL),
            nats_url: var_or("NATS_URL", DEFAULT_NATS_URL),
            event_transport: parsed_or("EVENT_TRANSPORT", EventTransport::Redis)?,
            vatsim_data_url: var_or("VATSIM_DATA_URL", DEFAULT_DATA_URL),
            vatsim_metar_url: var_or("VATSIM_METAR_URL", DEFAULT_METAR_URL),
            pirep_url: var_or("PIREP_URL", DEFAULT_PIREP_URL),
            stats_url: env::var("STATS_URL")
                .ok()
                .filter(|v| !v.trim().is_empty()),
            region_file: env::var("REGION_FILE")
                .ok()
                .filter(|v| !v.trim().is_empty())
                .map(PathBuf::from),
            poll_interval: Duration::from_secs(poll_interval_secs),
            pirep_interval: Duration::from_secs(pirep_interval_secs),
            fetch_timeout: Duration::from_secs(fetch_timeout_secs),
            metrics_port: parsed_or("METRICS_PORT", DEFAULT_METRICS_PORT)?,
        })
    }

    /// Cycle duration past which the scheduler reports an overrun
    pub fn cycle_overrun_threshold(&self, interval: Duration) -> Duration {
        interval.max(self.fetch_timeout * 3)
    }
}
