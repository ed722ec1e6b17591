use anyhow::Result;
use artcc_sync::config::Config;
use artcc_sync::db::create_pool;
use artcc_sync::working_set::{DeltaPublisher, MemoryBroker, WorkingSetCache};
use chrono::Utc;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

use super::{build_reconciler, connect_broker, load_region};

/// Run a single polling cycle. With `no_broker`, deltas go to an in-process cache and are logged.
pub async fn handle_poll_once(
    config: Config,
    region_file: Option<PathBuf>,
    no_broker: bool,
) -> Result<()> {
    let region = load_region(region_file.or_else(|| config.region_file.clone()))?;
    let pool = create_pool(&config.database_url, config.db_pool_size)?;

    let memory = MemoryBroker::new();
    let (cache, publisher): (Arc<dyn WorkingSetCache>, Arc<dyn DeltaPublisher>) = if no_broker {
        (Arc::new(memory.clone()), Arc::new(memory.clone()))
    } else {
        connect_broker(&config).await?
    };

    let reconciler = build_reconciler(&config, region, pool, cache, publisher)?;
    reconciler.publish_static().await?;
    let summary = reconciler.run_cycle(Utc::now()).await?;

    for (class, delta) in &summary.deltas {
        info!(
            "{}: {} online, {} removed",
            class,
            delta.present.len(),
            delta.removed.len()
        );
    }
    if no_broker {
        for message in memory.published().await {
            info!("{} {}", message.channel, message.payload);
        }
    }

    if !summary.failed.is_empty() {
        anyhow::bail!("Classes failed: {:?}", summary.failed);
    }
    Ok(())
}
