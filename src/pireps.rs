use chrono::{DateTime, Utc};
use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// How long automatically ingested reports are kept
pub const PIREP_RETENTION: chrono::Duration = chrono::Duration::hours(2);

/// Diesel model for the pireps table
#[derive(Debug, Clone, Queryable, Selectable, Serialize, Deserialize)]
#[diesel(table_name = crate::schema::pireps)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct Pirep {
    pub id: Uuid,
    pub report_time: DateTime<Utc>,
    /// Region tag; set for reports that were geofenced on ingest
    pub location: Option<String>,
    pub aircraft: String,
    /// Hundreds of feet, "350"
    pub flight_level: String,
    /// "OVC 080-120"
    pub sky_cond: String,
    pub turbulence: String,
    /// "LGT RIME 080-120"
    pub icing: String,
    pub vis: String,
    pub temp: String,
    /// "270@45"
    pub wind: String,
    pub urgent: bool,
    pub raw: String,
    /// Entered by hand; exempt from retention
    pub manual: bool,
    pub created_at: DateTime<Utc>,
}

/// Insert model for the pireps table
#[derive(Debug, Clone, PartialEq, Insertable, Serialize, Deserialize)]
#[diesel(table_name = crate::schema::pireps)]
pub struct NewPirep {
    pub id: Uuid,
    pub report_time: DateTime<Utc>,
    pub location: Option<String>,
    pub aircraft: String,
    pub flight_level: String,
    pub sky_cond: String,
    pub turbulence: String,
    pub icing: String,
    pub vis: String,
    pub temp: String,
    pub wind: String,
    pub urgent: bool,
    pub raw: String,
    pub manual: bool,
}

/// Automatic reports observed before this instant are out of the retention window
pub fn retention_cutoff(now: DateTime<Utc>) -> DateTime<Utc> {
    now - PIREP_RETENTION
}
