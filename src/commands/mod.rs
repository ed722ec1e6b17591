pub mod check_region;
pub mod migrate;
pub mod pireps_once;
pub mod poll_once;
pub mod run;

pub use check_region::handle_check_region;
pub use migrate::handle_migrate;
pub use pireps_once::handle_pireps_once;
pub use poll_once::handle_poll_once;
pub use run::handle_run;

use anyhow::Result;
use artcc_sync::config::{Config, EventTransport};
use artcc_sync::controller_hours_repo::ControllerHoursRepository;
use artcc_sync::db::PgPool;
use artcc_sync::differencer::OnlineSetDifferencer;
use artcc_sync::duty_tracker::DutySessionTracker;
use artcc_sync::nats_publisher::NatsDeltaPublisher;
use artcc_sync::online_repo::OnlineRepository;
use artcc_sync::pirep_client::PirepClient;
use artcc_sync::pirep_ingest::PirepIngestor;
use artcc_sync::pireps_repo::PirepsRepository;
use artcc_sync::reconciler::Reconciler;
use artcc_sync::redis_broker::RedisBroker;
use artcc_sync::region::{Region, region_file_path};
use artcc_sync::stats_client::{NoopObserver, SessionObserver, StatsClient};
use artcc_sync::vatsim::VatsimClient;
use artcc_sync::working_set::{DeltaPublisher, WorkingSetCache};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

/// Load the region from the CLI flag, `REGION_FILE`, `./region.toml`, or the built-in default
pub fn load_region(explicit: Option<PathBuf>) -> Result<Arc<Region>> {
    let path = region_file_path(explicit);
    let region = Region::load(path.as_deref())?;
    match &path {
        Some(path) => info!("Loaded region {} from {:?}", region.name(), path),
        None => info!("Using built-in region {}", region.name()),
    }
    Ok(Arc::new(region))
}

/// Connect the working-set cache and the configured delta publisher; both must be reachable
pub async fn connect_broker(
    config: &Config,
) -> Result<(Arc<dyn WorkingSetCache>, Arc<dyn DeltaPublisher>)> {
    let redis = RedisBroker::connect(&config.redis_url).await?;

    let publisher: Arc<dyn DeltaPublisher> = match config.event_transport {
        EventTransport::Redis => Arc::new(redis.clone()),
        EventTransport::Nats => Arc::new(NatsDeltaPublisher::new(&config.nats_url).await?),
    };
    info!("Publishing online-set deltas via {:?}", config.event_transport);

    Ok((Arc::new(redis), publisher))
}

pub fn build_reconciler(
    config: &Config,
    region: Arc<Region>,
    pool: PgPool,
    cache: Arc<dyn WorkingSetCache>,
    publisher: Arc<dyn DeltaPublisher>,
) -> Result<Reconciler> {
    let feed = VatsimClient::new(
        config.vatsim_data_url.clone(),
        config.vatsim_metar_url.clone(),
        config.fetch_timeout,
    )?;

    let observer: Arc<dyn SessionObserver> = match &config.stats_url {
        Some(url) => Arc::new(StatsClient::new(url.clone(), config.fetch_timeout)?),
        None => Arc::new(NoopObserver),
    };

    let sessions = DutySessionTracker::new(
        Arc::new(ControllerHoursRepository::new(pool.clone())),
        observer,
    );

    Ok(Reconciler::new(
        region,
        Arc::new(feed),
        Arc::new(OnlineRepository::new(pool)),
        cache.clone(),
        OnlineSetDifferencer::new(cache, publisher),
        sessions,
    ))
}

pub fn build_ingestor(config: &Config, region: Arc<Region>, pool: PgPool) -> Result<PirepIngestor> {
    let feed = PirepClient::new(config.pirep_url.clone(), config.fetch_timeout)?;
    Ok(PirepIngestor::new(
        Arc::new(feed),
        Arc::new(PirepsRepository::new(pool)),
        region,
    ))
}
