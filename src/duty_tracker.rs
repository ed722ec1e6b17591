use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::{debug, info};
use uuid::Uuid;

use crate::controller_hours::NewDutySession;
use crate::controller_hours_repo::DutySessionStore;
use crate::stats_client::SessionObserver;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionUpdate {
    /// First poll of a new connection
    Opened,
    /// Known connection, end time moved forward
    Extended,
}

/// Records how long controllers stay on position.
///
/// A session is identified by (cid, logon time). There is no explicit close: a session's end is
/// simply the last poll in which it was seen, and a reconnect with a new logon time opens a
/// second session.
#[derive(Clone)]
pub struct DutySessionTracker {
    store: Arc<dyn DutySessionStore>,
    observer: Arc<dyn SessionObserver>,
}

impl DutySessionTracker {
    pub fn new(store: Arc<dyn DutySessionStore>, observer: Arc<dyn SessionObserver>) -> Self {
        Self { store, observer }
    }

    pub async fn track_session(
        &self,
        cid: i32,
        position: &str,
        session_start: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<SessionUpdate> {
        let existing = self
            .store
            .find_session(cid, session_start)
            .await
            .with_context(|| format!("Failed to look up duty session for {}", cid))?;

        if let Some(session) = existing {
            return self.extend(session.id, cid, position, now).await;
        }

        let inserted = self
            .store
            .open_session(&NewDutySession::new(cid, position, session_start, now))
            .await
            .with_context(|| format!("Failed to open duty session for {}", cid))?;
        if inserted {
            info!("{} opened {} (logon {})", cid, position, session_start);
            metrics::counter!("sync.sessions.opened").increment(1);
            self.observer.session_opened(cid).await;
            return Ok(SessionUpdate::Opened);
        }

        // Another writer opened it between lookup and insert
        let session = self
            .store
            .find_session(cid, session_start)
            .await
            .with_context(|| format!("Failed to look up duty session for {}", cid))?
            .with_context(|| format!("Duty session for {} vanished after conflict", cid))?;
        self.extend(session.id, cid, position, now).await
    }

    async fn extend(
        &self,
        id: Uuid,
        cid: i32,
        position: &str,
        now: DateTime<Utc>,
    ) -> Result<SessionUpdate> {
        self.store
            .extend_session(id, now)
            .await
            .with_context(|| format!("Failed to extend duty session for {}", cid))?;
        debug!("Extended duty session for {} on {}", cid, position);
        Ok(SessionUpdate::Extended)
    }
}
