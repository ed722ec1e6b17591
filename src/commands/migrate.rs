use anyhow::Result;
use artcc_sync::config::Config;
use artcc_sync::db::{create_pool, run_migrations};
use tracing::info;

pub async fn handle_migrate(config: Config) -> Result<()> {
    let pool = create_pool(&config.database_url, 1)?;
    let applied = run_migrations(&pool).await?;
    if applied == 0 {
        info!("Database schema is up to date");
    } else {
        info!("Applied {} migrations", applied);
    }
    Ok(())
}
