//! Rows of the "currently online" tables.
//!
//! These tables hold only the latest poll: every cycle deletes all rows of a class and inserts the
//! current set, so rows carry no identity beyond the callsign.

use chrono::{DateTime, Utc};
use diesel::prelude::*;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::vatsim::{VatsimController, VatsimPilot};

/// Filed aircraft types are cut to this many characters
const AIRCRAFT_TYPE_LEN: usize = 8;

/// Separator between ATIS text lines
const ATIS_LINE_SEPARATOR: &str = " - ";

/// "FL350", "fl 350"
static FLIGHT_LEVEL_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)^\s*FL\s*(?P<level>\d{1,3})\s*$").unwrap());

/// Normalize a filed cruise altitude to feet.
///
/// Flight level shorthand is expanded ("FL350" → "35000"); anything else passes through.
pub fn normalize_cruise_altitude(filed: &str) -> String {
    match FLIGHT_LEVEL_RE
        .captures(filed)
        .and_then(|caps| caps["level"].parse::<u32>().ok())
    {
        Some(level) => (level * 100).to_string(),
        None => filed.trim().to_string(),
    }
}

/// Diesel model for the pilots_online table
#[derive(Debug, Clone, Queryable, Selectable, Serialize, Deserialize)]
#[diesel(table_name = crate::schema::pilots_online)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct OnlinePilot {
    pub id: Uuid,
    pub cid: i32,
    pub name: String,
    pub callsign: String,
    pub aircraft: String,
    pub dep: String,
    pub dest: String,
    pub lat: f64,
    pub lng: f64,
    pub altitude: i32,
    pub heading: i32,
    pub speed: i32,
    pub planned_cruise: String,
    pub route: String,
    pub remarks: String,
    pub created_at: DateTime<Utc>,
}

/// Insert model for the pilots_online table
#[derive(Debug, Clone, PartialEq, Insertable, Serialize, Deserialize)]
#[diesel(table_name = crate::schema::pilots_online)]
pub struct NewOnlinePilot {
    pub id: Uuid,
    pub cid: i32,
    pub name: String,
    pub callsign: String,
    pub aircraft: String,
    pub dep: String,
    pub dest: String,
    pub lat: f64,
    pub lng: f64,
    pub altitude: i32,
    pub heading: i32,
    pub speed: i32,
    pub planned_cruise: String,
    pub route: String,
    pub remarks: String,
}

impl NewOnlinePilot {
    /// Field map stored under `PILOT:<callsign>` for map clients
    pub fn position_fields(&self) -> Vec<(&'static str, String)> {
        vec![
            ("callsign", self.callsign.clone()),
            ("lat", self.lat.to_string()),
            ("lng", self.lng.to_string()),
            ("speed", self.speed.to_string()),
            ("heading", self.heading.to_string()),
            ("altitude", self.altitude.to_string()),
            ("cruise", self.planned_cruise.clone()),
            ("destination", self.dest.clone()),
        ]
    }
}

impl From<&VatsimPilot> for NewOnlinePilot {
    fn from(pilot: &VatsimPilot) -> Self {
        let plan = pilot.flight_plan.clone().unwrap_or_default();

        Self {
            id: Uuid::now_v7(),
            cid: pilot.cid,
            name: pilot.name.clone(),
            callsign: pilot.callsign.clone(),
            aircraft: plan.aircraft.chars().take(AIRCRAFT_TYPE_LEN).collect(),
            dep: plan.departure,
            dest: plan.arrival,
            lat: pilot.latitude,
            lng: pilot.longitude,
            altitude: pilot.altitude,
            heading: pilot.heading,
            speed: pilot.groundspeed,
            planned_cruise: normalize_cruise_altitude(&plan.altitude),
            route: plan.route,
            remarks: plan.remarks,
        }
    }
}

/// Diesel model for the controllers_online table
#[derive(Debug, Clone, Queryable, Selectable, Serialize, Deserialize)]
#[diesel(table_name = crate::schema::controllers_online)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct OnlineController {
    pub id: Uuid,
    pub cid: i32,
    pub name: String,
    pub rating: i32,
    pub pos: String,
    pub time_start: DateTime<Utc>,
    pub atis: String,
    pub frequency: String,
    pub created_at: DateTime<Utc>,
}

/// Insert model for the controllers_online table
#[derive(Debug, Clone, PartialEq, Insertable, Serialize, Deserialize)]
#[diesel(table_name = crate::schema::controllers_online)]
pub struct NewOnlineController {
    pub id: Uuid,
    pub cid: i32,
    pub name: String,
    pub rating: i32,
    pub pos: String,
    pub time_start: DateTime<Utc>,
    pub atis: String,
    pub frequency: String,
}

impl From<&VatsimController> for NewOnlineController {
    fn from(controller: &VatsimController) -> Self {
        Self {
            id: Uuid::now_v7(),
            cid: controller.cid,
            name: controller.name.clone(),
            rating: controller.rating,
            pos: controller.callsign.clone(),
            time_start: controller.logon_time,
            atis: controller
                .text_atis
                .as_ref()
                .map(|lines| lines.join(ATIS_LINE_SEPARATOR))
                .unwrap_or_default(),
            frequency: controller.frequency.clone(),
        }
    }
}

/// Diesel model for the metars table
#[derive(Debug, Clone, Queryable, Selectable, Serialize, Deserialize)]
#[diesel(table_name = crate::schema::metars)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct Metar {
    pub id: Uuid,
    pub airport: String,
    pub metar: String,
    pub created_at: DateTime<Utc>,
}

/// Insert model for the metars table
#[derive(Debug, Clone, PartialEq, Insertable, Serialize, Deserialize)]
#[diesel(table_name = crate::schema::metars)]
pub struct NewMetar {
    pub id: Uuid,
    pub airport: String,
    pub metar: String,
}

impl NewMetar {
    /// Build a row from a raw METAR; the station id is the first four characters
    pub fn from_raw(raw: &str) -> Option<Self> {
        let airport = raw.get(..4)?;
        Some(Self {
            id: Uuid::now_v7(),
            airport: airport.to_string(),
            metar: raw.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vatsim::FlightPlan;

    #[test]
    fn test_cruise_flight_level_expands_to_feet() {
        assert_eq!(normalize_cruise_altitude("FL350"), "35000");
        assert_eq!(normalize_cruise_altitude("fl090"), "9000");
        assert_eq!(normalize_cruise_altitude("FL 410"), "41000");
    }

    #[test]
    fn test_cruise_feet_pass_through() {
        assert_eq!(normalize_cruise_altitude("35000"), "35000");
        assert_eq!(normalize_cruise_altitude("VFR"), "VFR");
        assert_eq!(normalize_cruise_altitude(""), "");
    }

    #[test]
    fn test_pilot_row_from_feed() {
        let pilot = VatsimPilot {
            cid: 1234567,
            name: "Jane Doe".to_string(),
            callsign: "UAL123".to_string(),
            latitude: 33.4,
            longitude: -112.0,
            altitude: 12000,
            heading: 270,
            groundspeed: 310,
            flight_plan: Some(FlightPlan {
                aircraft: "H/B772/L-SDE2E3FGHIJ1J3J4J5M1RWXY/LB1D1".to_string(),
                departure: "KPHX".to_string(),
                arrival: "KORD".to_string(),
                altitude: "FL370".to_string(),
                route: "PXR3 BLH".to_string(),
                remarks: "/v/".to_string(),
            }),
        };

        let row = NewOnlinePilot::from(&pilot);
        assert_eq!(row.aircraft, "H/B772/L");
        assert_eq!(row.planned_cruise, "37000");
        assert_eq!(row.dep, "KPHX");
        assert_eq!(row.speed, 310);

        let fields = row.position_fields();
        assert!(fields.contains(&("cruise", "37000".to_string())));
        assert!(fields.contains(&("destination", "KORD".to_string())));
    }

    #[test]
    fn test_pilot_row_without_flight_plan() {
        let pilot = VatsimPilot {
            cid: 1,
            callsign: "N123AB".to_string(),
            ..VatsimPilot::default()
        };
        let row = NewOnlinePilot::from(&pilot);
        assert_eq!(row.dep, "");
        assert_eq!(row.planned_cruise, "");
    }

    #[test]
    fn test_controller_atis_lines_joined() {
        let controller = VatsimController {
            cid: 1,
            name: "Sam".to_string(),
            callsign: "ABQ_CTR".to_string(),
            frequency: "134.650".to_string(),
            facility: 6,
            rating: 5,
            text_atis: Some(vec!["Albuquerque Center".to_string(), "Say hi".to_string()]),
            logon_time: Utc::now(),
        };
        let row = NewOnlineController::from(&controller);
        assert_eq!(row.atis, "Albuquerque Center - Say hi");
        assert_eq!(row.pos, "ABQ_CTR");
    }

    #[test]
    fn test_metar_row() {
        let row = NewMetar::from_raw("KPHX 011251Z 09004KT 10SM CLR").unwrap();
        assert_eq!(row.airport, "KPHX");
        assert!(NewMetar::from_raw("KP").is_none());
    }
}
