use chrono::{DateTime, Utc};
use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One continuous connection of a controller on a position.
///
/// Keyed by (cid, time_start); `time_end` is advanced on every poll while the connection lasts
/// and simply stops moving when it ends.
#[derive(Debug, Clone, PartialEq, Queryable, Selectable, Serialize, Deserialize)]
#[diesel(table_name = crate::schema::controller_hours)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct DutySession {
    pub id: Uuid,
    pub cid: i32,
    pub position: String,
    pub time_start: DateTime<Utc>,
    pub time_end: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl DutySession {
    /// Time on position so far
    pub fn duration(&self) -> chrono::Duration {
        self.time_end - self.time_start
    }
}

/// Insert model for the controller_hours table
#[derive(Debug, Clone, PartialEq, Insertable, Serialize, Deserialize)]
#[diesel(table_name = crate::schema::controller_hours)]
pub struct NewDutySession {
    pub id: Uuid,
    pub cid: i32,
    pub position: String,
    pub time_start: DateTime<Utc>,
    pub time_end: DateTime<Utc>,
}

impl NewDutySession {
    /// Open a session that started at `time_start` and was last seen at `now`
    pub fn new(cid: i32, position: &str, time_start: DateTime<Utc>, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::now_v7(),
            cid,
            position: position.to_string(),
            time_start,
            time_end: now,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_new_session_spans_start_to_now() {
        let start = Utc::now() - Duration::minutes(42);
        let now = Utc::now();
        let session = NewDutySession::new(1234567, "PHX_APP", start, now);
        assert_eq!(session.time_start, start);
        assert_eq!(session.time_end, now);
        assert_eq!(session.position, "PHX_APP");
    }
}
