//! One polling cycle of the online tracker.
//!
//! fetch → classify → per class: persist, diff, publish → duty sessions. The feed fetch is the
//! only step whose failure aborts the whole cycle; every later failure is confined to its class.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, warn};

use crate::differencer::{EntityClass, OnlineDelta, OnlineSetDifferencer, dedup_ids};
use crate::duty_tracker::{DutySessionTracker, SessionUpdate};
use crate::geofence::{atis_airport, controller_in_region, neighbor_center, pilot_in_region};
use crate::online::{NewMetar, NewOnlineController, NewOnlinePilot};
use crate::online_repo::SnapshotSink;
use crate::region::Region;
use crate::vatsim::{SnapshotFeed, VatsimController, VatsimSnapshot};
use crate::working_set::{ONLINE_SET_TTL, PILOT_POSITION_TTL, WorkingSetCache};

/// Cache key holding the `|`-joined airport whitelist
pub const AIRPORTS_KEY: &str = "airports";

pub fn pilot_key(callsign: &str) -> String {
    format!("PILOT:{}", callsign)
}

pub fn metar_key(airport: &str) -> String {
    format!("METAR:{}", airport)
}

pub fn atis_key(airport: &str) -> String {
    format!("ATIS:{}", airport)
}

/// What one cycle did
#[derive(Debug, Clone, Default)]
pub struct CycleSummary {
    /// Classes that completed, in processing order
    pub deltas: Vec<(EntityClass, OnlineDelta)>,
    /// Classes aborted by a persist or cache write failure
    pub failed: Vec<EntityClass>,
    pub metars: usize,
    pub sessions_opened: usize,
    pub sessions_extended: usize,
}

impl CycleSummary {
    pub fn delta(&self, class: EntityClass) -> Option<&OnlineDelta> {
        self.deltas
            .iter()
            .find(|(c, _)| *c == class)
            .map(|(_, delta)| delta)
    }

    fn record(&mut self, class: EntityClass, result: Result<OnlineDelta>) {
        match result {
            Ok(delta) => self.deltas.push((class, delta)),
            Err(e) => {
                error!("Aborted {} for this cycle: {:#}", class, e);
                metrics::counter!("sync.class.failed", "class" => class.cache_key()).increment(1);
                self.failed.push(class);
            }
        }
    }
}

/// Region-filtered view of one snapshot
#[derive(Debug, Clone, Default)]
pub struct ClassifiedSnapshot {
    pub pilots: Vec<NewOnlinePilot>,
    pub controllers: Vec<VatsimController>,
    /// Neighboring center facility ids, first-seen order
    pub neighbors: Vec<String>,
    /// Airports with an ATIS station online, first-seen order
    pub atis_airports: Vec<String>,
}

impl ClassifiedSnapshot {
    pub fn classify(region: &Region, snapshot: &VatsimSnapshot) -> Self {
        let pilots = snapshot
            .pilots
            .iter()
            .filter(|pilot| pilot_in_region(region, pilot))
            .map(NewOnlinePilot::from)
            .collect();

        let controllers = snapshot
            .controllers
            .iter()
            .filter(|controller| controller_in_region(region, controller))
            .cloned()
            .collect();

        let neighbors = dedup_ids(
            snapshot
                .controllers
                .iter()
                .filter_map(|controller| neighbor_center(region, &controller.callsign))
                .map(str::to_string),
        );

        let atis_airports = dedup_ids(
            snapshot
                .atis
                .iter()
                .filter_map(|atis| atis_airport(region, atis))
                .map(str::to_string),
        );

        Self {
            pilots,
            controllers,
            neighbors,
            atis_airports,
        }
    }
}

/// Runs polling cycles against one region
pub struct Reconciler {
    region: Arc<Region>,
    feed: Arc<dyn SnapshotFeed>,
    sink: Arc<dyn SnapshotSink>,
    cache: Arc<dyn WorkingSetCache>,
    differencer: OnlineSetDifferencer,
    sessions: DutySessionTracker,
}

impl Reconciler {
    pub fn new(
        region: Arc<Region>,
        feed: Arc<dyn SnapshotFeed>,
        sink: Arc<dyn SnapshotSink>,
        cache: Arc<dyn WorkingSetCache>,
        differencer: OnlineSetDifferencer,
        sessions: DutySessionTracker,
    ) -> Self {
        Self {
            region,
            feed,
            sink,
            cache,
            differencer,
            sessions,
        }
    }

    /// Write the static airport whitelist; done once at startup
    pub async fn publish_static(&self) -> Result<()> {
        self.cache
            .set(AIRPORTS_KEY, &self.region.airports().join("|"), None)
            .await
            .context("Failed to store airport list")
    }

    /// Run one cycle. Errors only when the snapshot cannot be fetched; nothing is touched then.
    #[tracing::instrument(skip(self), fields(region = %self.region.name()))]
    pub async fn run_cycle(&self, now: DateTime<Utc>) -> Result<CycleSummary> {
        let start = Instant::now();

        let snapshot = self
            .feed
            .fetch_snapshot()
            .await
            .context("Failed to fetch network snapshot")?;

        let metars = match self.feed.fetch_metars(self.region.airports()).await {
            Ok(metars) => Some(metars),
            Err(e) => {
                warn!("Failed to fetch METARs, keeping previous: {:#}", e);
                metrics::counter!("sync.metars.fetch_failed").increment(1);
                None
            }
        };

        let classified = ClassifiedSnapshot::classify(&self.region, &snapshot);
        let mut summary = CycleSummary::default();

        let result = self.sync_pilots(classified.pilots).await;
        summary.record(EntityClass::Pilots, result);

        let controllers_synced = {
            let result = self.sync_controllers(&classified.controllers).await;
            let ok = result.is_ok();
            summary.record(EntityClass::Controllers, result);
            ok
        };
        if controllers_synced {
            self.track_sessions(&classified.controllers, now, &mut summary)
                .await;
        }

        let result = self
            .differencer
            .reconcile(EntityClass::Neighbors, classified.neighbors, async {
                Ok::<(), anyhow::Error>(())
            })
            .await;
        summary.record(EntityClass::Neighbors, result);

        if let Some(metars) = metars {
            match self.sync_metars(metars).await {
                Ok(count) => summary.metars = count,
                Err(e) => error!("Failed to store METARs: {:#}", e),
            }
        }

        let result = self.sync_atis(classified.atis_airports).await;
        summary.record(EntityClass::Atis, result);

        metrics::counter!("sync.cycles").increment(1);
        metrics::histogram!("sync.cycle.duration_ms").record(start.elapsed().as_millis() as f64);

        info!(
            "Cycle done in {:?}: {} pilots, {} controllers, {} neighbors, {} ATIS, {} METARs, {} new sessions{}",
            start.elapsed(),
            summary.delta(EntityClass::Pilots).map_or(0, |d| d.present.len()),
            summary
                .delta(EntityClass::Controllers)
                .map_or(0, |d| d.present.len()),
            summary
                .delta(EntityClass::Neighbors)
                .map_or(0, |d| d.present.len()),
            summary.delta(EntityClass::Atis).map_or(0, |d| d.present.len()),
            summary.metars,
            summary.sessions_opened,
            if summary.failed.is_empty() {
                String::new()
            } else {
                format!(", failed: {:?}", summary.failed)
            }
        );

        Ok(summary)
    }

    async fn sync_pilots(&self, pilots: Vec<NewOnlinePilot>) -> Result<OnlineDelta> {
        let callsigns = dedup_ids(pilots.iter().map(|p| p.callsign.clone()));
        let positions: Vec<(String, Vec<(&'static str, String)>)> = pilots
            .iter()
            .map(|p| (pilot_key(&p.callsign), p.position_fields()))
            .collect();

        self.differencer
            .reconcile(EntityClass::Pilots, callsigns, async {
                self.sink.replace_pilots(pilots).await?;
                for (key, fields) in &positions {
                    if let Err(e) = self
                        .cache
                        .set_fields(key, fields, Some(PILOT_POSITION_TTL))
                        .await
                    {
                        warn!("Failed to cache {}: {:#}", key, e);
                    }
                }
                Ok::<(), anyhow::Error>(())
            })
            .await
    }

    async fn sync_controllers(&self, controllers: &[VatsimController]) -> Result<OnlineDelta> {
        let rows: Vec<NewOnlineController> =
            controllers.iter().map(NewOnlineController::from).collect();
        let callsigns = dedup_ids(controllers.iter().map(|c| c.callsign.clone()));

        self.differencer
            .reconcile(
                EntityClass::Controllers,
                callsigns,
                self.sink.replace_controllers(rows),
            )
            .await
    }

    /// Advance duty sessions; the first store failure stops tracking for this cycle
    async fn track_sessions(
        &self,
        controllers: &[VatsimController],
        now: DateTime<Utc>,
        summary: &mut CycleSummary,
    ) {
        for controller in controllers {
            match self
                .sessions
                .track_session(
                    controller.cid,
                    &controller.callsign,
                    controller.logon_time,
                    now,
                )
                .await
            {
                Ok(SessionUpdate::Opened) => summary.sessions_opened += 1,
                Ok(SessionUpdate::Extended) => summary.sessions_extended += 1,
                Err(e) => {
                    error!("Duty session tracking stopped: {:#}", e);
                    metrics::counter!("sync.sessions.failed").increment(1);
                    return;
                }
            }
        }
    }

    async fn sync_metars(&self, metars: Vec<String>) -> Result<usize> {
        let rows: Vec<NewMetar> = metars
            .iter()
            .filter_map(|raw| NewMetar::from_raw(raw))
            .collect();
        let count = rows.len();

        let entries: Vec<(String, String)> = rows
            .iter()
            .map(|row| (metar_key(&row.airport), row.metar.clone()))
            .collect();

        self.sink
            .replace_metars(rows)
            .await
            .context("Failed to replace METARs")?;

        for (key, metar) in &entries {
            if let Err(e) = self.cache.set(key, metar, None).await {
                warn!("Failed to cache {}: {:#}", key, e);
            }
        }

        debug!("Stored {} METARs", count);
        Ok(count)
    }

    async fn sync_atis(&self, airports: Vec<String>) -> Result<OnlineDelta> {
        let keys: Vec<String> = airports.iter().map(|a| atis_key(a)).collect();

        let delta = self
            .differencer
            .reconcile(EntityClass::Atis, airports, async {
                for key in &keys {
                    if let Err(e) = self.cache.expire(key, ONLINE_SET_TTL).await {
                        warn!("Failed to refresh {}: {:#}", key, e);
                    }
                }
                Ok::<(), anyhow::Error>(())
            })
            .await?;

        for airport in &delta.removed {
            let key = atis_key(airport);
            if let Err(e) = self.cache.delete(&key).await {
                warn!("Failed to delete {}: {:#}", key, e);
            }
        }

        Ok(delta)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vatsim::{FlightPlan, VatsimAtis, VatsimPilot};

    fn pilot(callsign: &str, dep: &str, arr: &str, lat: f64, lon: f64) -> VatsimPilot {
        VatsimPilot {
            cid: 1,
            callsign: callsign.to_string(),
            latitude: lat,
            longitude: lon,
            flight_plan: Some(FlightPlan {
                departure: dep.to_string(),
                arrival: arr.to_string(),
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    fn controller(callsign: &str) -> VatsimController {
        VatsimController {
            cid: 2,
            name: "Test".to_string(),
            callsign: callsign.to_string(),
            frequency: "199.998".to_string(),
            facility: 6,
            rating: 5,
            text_atis: None,
            logon_time: Utc::now(),
        }
    }

    fn atis(callsign: &str) -> VatsimAtis {
        VatsimAtis {
            cid: 3,
            callsign: callsign.to_string(),
            frequency: "127.575".to_string(),
            atis_code: None,
            text_atis: None,
        }
    }

    #[test]
    fn test_classify_snapshot() {
        let snapshot = VatsimSnapshot {
            pilots: vec![
                pilot("UAL123", "KPHX", "KORD", 41.9, -87.9),
                pilot("DAL456", "KLAX", "KJFK", 35.0, -106.0),
                pilot("SWA789", "KLAX", "KJFK", 40.6, -73.7),
            ],
            controllers: vec![
                controller("PHX_APP"),
                controller("PRC_FSS"),
                controller("LAX_CTR"),
                controller("LAX_33_CTR"),
                controller("ZOA_CTR"),
            ],
            atis: vec![atis("KPHX_ATIS"), atis("KPHX_D_ATIS"), atis("KLAX_ATIS")],
        };

        let classified = ClassifiedSnapshot::classify(&Region::default(), &snapshot);
        let callsigns: Vec<_> = classified.pilots.iter().map(|p| p.callsign.as_str()).collect();
        assert_eq!(callsigns, vec!["UAL123", "DAL456"]);
        let positions: Vec<_> = classified
            .controllers
            .iter()
            .map(|c| c.callsign.as_str())
            .collect();
        assert_eq!(positions, vec!["PHX_APP"]);
        assert_eq!(classified.neighbors, vec!["LAX"]);
        assert_eq!(classified.atis_airports, vec!["KPHX"]);
    }

    #[test]
    fn test_cache_keys() {
        assert_eq!(pilot_key("UAL123"), "PILOT:UAL123");
        assert_eq!(metar_key("KPHX"), "METAR:KPHX");
        assert_eq!(atis_key("KABQ"), "ATIS:KABQ");
    }
}
