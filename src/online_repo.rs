use anyhow::Result;
use async_trait::async_trait;
use diesel::prelude::*;
use tracing::debug;

use crate::db::PgPool;
use crate::online::{NewMetar, NewOnlineController, NewOnlinePilot};

/// Rows per INSERT statement, well below PostgreSQL's bind parameter limit
const INSERT_CHUNK_SIZE: usize = 1000;

/// Destination of the per-cycle snapshot tables.
///
/// Each call replaces the whole table: after it returns, the table holds exactly the given rows.
#[async_trait]
pub trait SnapshotSink: Send + Sync {
    async fn replace_pilots(&self, pilots: Vec<NewOnlinePilot>) -> Result<()>;
    async fn replace_controllers(&self, controllers: Vec<NewOnlineController>) -> Result<()>;
    async fn replace_metars(&self, metars: Vec<NewMetar>) -> Result<()>;
}

pub struct OnlineRepository {
    pool: PgPool,
}

impl OnlineRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl SnapshotSink for OnlineRepository {
    async fn replace_pilots(&self, pilots: Vec<NewOnlinePilot>) -> Result<()> {
        use crate::schema::pilots_online::dsl::*;

        let pool = self.pool.clone();
        let count = pilots.len();
        tokio::task::spawn_blocking(move || {
            let mut conn = pool.get()?;
            conn.transaction::<_, anyhow::Error, _>(|conn| {
                diesel::delete(pilots_online).execute(conn)?;
                for chunk in pilots.chunks(INSERT_CHUNK_SIZE) {
                    diesel::insert_into(pilots_online)
                        .values(chunk)
                        .execute(conn)?;
                }
                Ok(())
            })
        })
        .await??;

        debug!("Replaced pilots_online with {} rows", count);
        Ok(())
    }

    async fn replace_controllers(&self, controllers: Vec<NewOnlineController>) -> Result<()> {
        use crate::schema::controllers_online::dsl::*;

        let pool = self.pool.clone();
        let count = controllers.len();
        tokio::task::spawn_blocking(move || {
            let mut conn = pool.get()?;
            conn.transaction::<_, anyhow::Error, _>(|conn| {
                diesel::delete(controllers_online).execute(conn)?;
                for chunk in controllers.chunks(INSERT_CHUNK_SIZE) {
                    diesel::insert_into(controllers_online)
                        .values(chunk)
                        .execute(conn)?;
                }
                Ok(())
            })
        })
        .await??;

        debug!("Replaced controllers_online with {} rows", count);
        Ok(())
    }

    async fn replace_metars(&self, new_metars: Vec<NewMetar>) -> Result<()> {
        use crate::schema::metars::dsl::*;

        let pool = self.pool.clone();
        let count = new_metars.len();
        tokio::task::spawn_blocking(move || {
            let mut conn = pool.get()?;
            conn.transaction::<_, anyhow::Error, _>(|conn| {
                diesel::delete(metars).execute(conn)?;
                if !new_metars.is_empty() {
                    diesel::insert_into(metars)
                        .values(&new_metars)
                        .execute(conn)?;
                }
                Ok(())
            })
        })
        .await??;

        debug!("Replaced metars with {} rows", count);
        Ok(())
    }
}
