use anyhow::Result;
use artcc_sync::config::Config;
use artcc_sync::db::create_pool;
use chrono::Utc;
use std::path::PathBuf;

use super::{build_ingestor, load_region};

pub async fn handle_pireps_once(config: Config, region_file: Option<PathBuf>) -> Result<()> {
    let region = load_region(region_file.or_else(|| config.region_file.clone()))?;
    let pool = create_pool(&config.database_url, config.db_pool_size)?;

    let ingestor = build_ingestor(&config, region, pool)?;
    ingestor.ingest(Utc::now()).await?;
    Ok(())
}
