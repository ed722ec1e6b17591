use anyhow::Result;
use artcc_sync::config::Config;
use artcc_sync::db::{create_pool, run_migrations};
use artcc_sync::scheduler::{Scheduler, shutdown_signal};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::Instrument;
use tracing::{error, info};

use super::{build_ingestor, build_reconciler, connect_broker, load_region};

pub async fn handle_run(config: Config, region_file: Option<PathBuf>) -> Result<()> {
    sentry::configure_scope(|scope| {
        scope.set_tag("operation", "run");
    });

    let region = load_region(region_file.or_else(|| config.region_file.clone()))?;

    let metrics_port = config.metrics_port;
    tokio::spawn(
        async move {
            if let Err(e) = artcc_sync::metrics::start_metrics_server(metrics_port).await {
                error!("Metrics server stopped: {:#}", e);
            }
        }
        .instrument(tracing::info_span!("metrics_server")),
    );

    let pool = create_pool(&config.database_url, config.db_pool_size)?;
    let applied = run_migrations(&pool).await?;
    info!("Database ready ({} migrations applied)", applied);

    let (cache, publisher) = connect_broker(&config).await?;

    let reconciler = build_reconciler(&config, region.clone(), pool.clone(), cache, publisher)?;
    reconciler.publish_static().await?;
    let ingestor = build_ingestor(&config, region, pool)?;

    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
    tokio::spawn(async move {
        shutdown_signal().await;
        let _ = shutdown_tx.send(true);
    });

    Scheduler::new(
        Arc::new(reconciler),
        Arc::new(ingestor),
        config.poll_interval,
        config.pirep_interval,
    )
    .with_overrun_thresholds(
        config.cycle_overrun_threshold(config.poll_interval),
        config.cycle_overrun_threshold(config.pirep_interval),
    )
    .run(shutdown_rx)
    .await
}
