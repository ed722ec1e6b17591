use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use diesel::prelude::*;
use tracing::debug;

use crate::db::PgPool;
use crate::pireps::{NewPirep, Pirep};

/// Storage for pilot reports
#[async_trait]
pub trait PirepStore: Send + Sync {
    /// Delete automatic reports observed before `cutoff`; returns the number removed
    async fn purge_stale(&self, cutoff: DateTime<Utc>) -> Result<usize>;

    /// Insert a report; returns false when the same (report_time, raw) is already stored
    async fn insert(&self, pirep: &NewPirep) -> Result<bool>;
}

pub struct PirepsRepository {
    pool: PgPool,
}

impl PirepsRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Reports observed at or after `since`, newest first
    pub async fn recent(&self, since: DateTime<Utc>) -> Result<Vec<Pirep>> {
        use crate::schema::pireps::dsl::*;

        let pool = self.pool.clone();
        tokio::task::spawn_blocking(move || {
            let mut conn = pool.get()?;
            let rows = pireps
                .filter(report_time.ge(since))
                .order(report_time.desc())
                .select(Pirep::as_select())
                .load(&mut conn)?;
            Ok::<Vec<Pirep>, anyhow::Error>(rows)
        })
        .await?
    }
}

#[async_trait]
impl PirepStore for PirepsRepository {
    async fn purge_stale(&self, cutoff: DateTime<Utc>) -> Result<usize> {
        use crate::schema::pireps::dsl::*;

        let pool = self.pool.clone();
        let deleted = tokio::task::spawn_blocking(move || {
            let mut conn = pool.get()?;
            let deleted = diesel::delete(
                pireps
                    .filter(manual.eq(false))
                    .filter(report_time.lt(cutoff)),
            )
            .execute(&mut conn)?;
            Ok::<usize, anyhow::Error>(deleted)
        })
        .await??;

        debug!("Purged {} PIREPs older than {}", deleted, cutoff);
        Ok(deleted)
    }

    async fn insert(&self, pirep: &NewPirep) -> Result<bool> {
        use crate::schema::pireps::dsl::*;

        let pool = self.pool.clone();
        let new_pirep = pirep.clone();
        let inserted = tokio::task::spawn_blocking(move || {
            let mut conn = pool.get()?;
            let inserted = diesel::insert_into(pireps)
                .values(&new_pirep)
                .on_conflict((report_time, raw))
                .do_nothing()
                .execute(&mut conn)?;
            Ok::<usize, anyhow::Error>(inserted)
        })
        .await??;

        Ok(inserted > 0)
    }
}
