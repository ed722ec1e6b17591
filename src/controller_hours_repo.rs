use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use diesel::prelude::*;
use tracing::debug;
use uuid::Uuid;

use crate::controller_hours::{DutySession, NewDutySession};
use crate::db::PgPool;

/// Storage for controller duty sessions
#[async_trait]
pub trait DutySessionStore: Send + Sync {
    /// Find the session with exactly this (cid, time_start)
    async fn find_session(&self, cid: i32, time_start: DateTime<Utc>)
    -> Result<Option<DutySession>>;

    /// Insert a new session; an existing (cid, time_start) row is left untouched.
    ///
    /// Returns whether a row was inserted.
    async fn open_session(&self, session: &NewDutySession) -> Result<bool>;

    /// Move a session's end time
    async fn extend_session(&self, id: Uuid, time_end: DateTime<Utc>) -> Result<()>;
}

pub struct ControllerHoursRepository {
    pool: PgPool,
}

impl ControllerHoursRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Sessions for one controller, most recent first
    pub async fn sessions_for(&self, cid_filter: i32, limit: i64) -> Result<Vec<DutySession>> {
        use crate::schema::controller_hours::dsl::*;

        let pool = self.pool.clone();
        tokio::task::spawn_blocking(move || {
            let mut conn = pool.get()?;
            let rows = controller_hours
                .filter(cid.eq(cid_filter))
                .order(time_start.desc())
                .limit(limit)
                .select(DutySession::as_select())
                .load(&mut conn)?;
            Ok::<Vec<DutySession>, anyhow::Error>(rows)
        })
        .await?
    }
}

#[async_trait]
impl DutySessionStore for ControllerHoursRepository {
    async fn find_session(
        &self,
        cid_filter: i32,
        start: DateTime<Utc>,
    ) -> Result<Option<DutySession>> {
        use crate::schema::controller_hours::dsl::*;

        let pool = self.pool.clone();
        tokio::task::spawn_blocking(move || {
            let mut conn = pool.get()?;
            let session = controller_hours
                .filter(cid.eq(cid_filter))
                .filter(time_start.eq(start))
                .select(DutySession::as_select())
                .first(&mut conn)
                .optional()?;
            Ok::<Option<DutySession>, anyhow::Error>(session)
        })
        .await?
    }

    async fn open_session(&self, session: &NewDutySession) -> Result<bool> {
        use crate::schema::controller_hours::dsl::*;

        let pool = self.pool.clone();
        let new_session = session.clone();

        let inserted = tokio::task::spawn_blocking(move || {
            let mut conn = pool.get()?;
            let inserted = diesel::insert_into(controller_hours)
                .values(&new_session)
                .on_conflict((cid, time_start))
                .do_nothing()
                .execute(&mut conn)?;
            Ok::<usize, anyhow::Error>(inserted)
        })
        .await??;

        debug!(
            "Opened duty session for {} on {} ({} row)",
            session.cid, session.position, inserted
        );
        Ok(inserted > 0)
    }

    async fn extend_session(&self, session_id: Uuid, end: DateTime<Utc>) -> Result<()> {
        use crate::schema::controller_hours::dsl::*;

        let pool = self.pool.clone();
        tokio::task::spawn_blocking(move || {
            let mut conn = pool.get()?;
            diesel::update(controller_hours.filter(id.eq(session_id)))
                .set((time_end.eq(end), updated_at.eq(Utc::now())))
                .execute(&mut conn)?;
            Ok::<(), anyhow::Error>(())
        })
        .await?
    }
}
