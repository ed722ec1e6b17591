//! Shared test fixtures: in-memory fakes for every external collaborator, snapshot builders, and
//! an isolated PostgreSQL database for repository tests.
//!
//! Database tests need `TEST_DATABASE_URL` pointing at a server where the user may create
//! databases (e.g. `postgresql://localhost/artcc_test`); they are `#[ignore]`d by default.

#![allow(dead_code)]

use anyhow::{Context, Result, bail};
use artcc_sync::controller_hours::{DutySession, NewDutySession};
use artcc_sync::controller_hours_repo::DutySessionStore;
use artcc_sync::db::{MIGRATIONS, PgPool};
use artcc_sync::online::{NewMetar, NewOnlineController, NewOnlinePilot};
use artcc_sync::online_repo::SnapshotSink;
use artcc_sync::pirep_client::PirepFeed;
use artcc_sync::pirep_normalizer::RawReport;
use artcc_sync::pireps::NewPirep;
use artcc_sync::pireps_repo::PirepStore;
use artcc_sync::stats_client::SessionObserver;
use artcc_sync::vatsim::{
    FlightPlan, SnapshotFeed, VatsimAtis, VatsimController, VatsimPilot, VatsimSnapshot,
};
use artcc_sync::working_set::{MemoryBroker, WorkingSetCache};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use diesel::prelude::*;
use diesel::r2d2::{ConnectionManager, Pool};
use diesel_migrations::MigrationHarness;
use std::collections::BTreeMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Snapshot builders
// ---------------------------------------------------------------------------

pub fn pilot(callsign: &str, departure: &str, arrival: &str) -> VatsimPilot {
    VatsimPilot {
        cid: 1000000 + callsign.len() as i32,
        name: format!("Pilot {}", callsign),
        callsign: callsign.to_string(),
        // Phoenix
        latitude: 33.43,
        longitude: -112.01,
        altitude: 11000,
        heading: 90,
        groundspeed: 280,
        flight_plan: Some(FlightPlan {
            aircraft: "B738/L".to_string(),
            departure: departure.to_string(),
            arrival: arrival.to_string(),
            altitude: "FL350".to_string(),
            route: "DCT".to_string(),
            remarks: "/v/".to_string(),
        }),
    }
}

pub fn controller(cid: i32, callsign: &str, logon_time: DateTime<Utc>) -> VatsimController {
    VatsimController {
        cid,
        name: format!("Controller {}", cid),
        callsign: callsign.to_string(),
        frequency: "124.500".to_string(),
        facility: 5,
        rating: 5,
        text_atis: Some(vec!["Phoenix Approach".to_string()]),
        logon_time,
    }
}

pub fn atis(callsign: &str) -> VatsimAtis {
    VatsimAtis {
        cid: 3000000,
        callsign: callsign.to_string(),
        frequency: "127.575".to_string(),
        atis_code: Some("A".to_string()),
        text_atis: None,
    }
}

// ---------------------------------------------------------------------------
// Network feed
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct FakeFeed {
    snapshot: Mutex<VatsimSnapshot>,
    metars: Mutex<Vec<String>>,
    failing: AtomicBool,
    metars_failing: AtomicBool,
}

impl FakeFeed {
    pub fn set_snapshot(&self, snapshot: VatsimSnapshot) {
        *self.snapshot.lock().unwrap() = snapshot;
    }

    pub fn set_metars(&self, metars: &[&str]) {
        *self.metars.lock().unwrap() = metars.iter().map(|m| m.to_string()).collect();
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn set_metars_failing(&self, failing: bool) {
        self.metars_failing.store(failing, Ordering::SeqCst);
    }
}

#[async_trait]
impl SnapshotFeed for FakeFeed {
    async fn fetch_snapshot(&self) -> Result<VatsimSnapshot> {
        if self.failing.load(Ordering::SeqCst) {
            bail!("VATSIM data feed error 503 Service Unavailable");
        }
        Ok(self.snapshot.lock().unwrap().clone())
    }

    async fn fetch_metars(&self, _airports: &[String]) -> Result<Vec<String>> {
        if self.metars_failing.load(Ordering::SeqCst) {
            bail!("VATSIM METAR service error 500");
        }
        Ok(self.metars.lock().unwrap().clone())
    }
}

// ---------------------------------------------------------------------------
// Snapshot tables
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct MemorySink {
    pub pilots: Mutex<Vec<NewOnlinePilot>>,
    pub controllers: Mutex<Vec<NewOnlineController>>,
    pub metars: Mutex<Vec<NewMetar>>,
    pub writes: Mutex<usize>,
    fail_controllers: AtomicBool,
}

impl MemorySink {
    pub fn set_fail_controllers(&self, fail: bool) {
        self.fail_controllers.store(fail, Ordering::SeqCst);
    }

    pub fn pilot_callsigns(&self) -> Vec<String> {
        self.pilots
            .lock()
            .unwrap()
            .iter()
            .map(|p| p.callsign.clone())
            .collect()
    }

    pub fn controller_positions(&self) -> Vec<String> {
        self.controllers
            .lock()
            .unwrap()
            .iter()
            .map(|c| c.pos.clone())
            .collect()
    }

    pub fn write_count(&self) -> usize {
        *self.writes.lock().unwrap()
    }
}

#[async_trait]
impl SnapshotSink for MemorySink {
    async fn replace_pilots(&self, pilots: Vec<NewOnlinePilot>) -> Result<()> {
        *self.writes.lock().unwrap() += 1;
        *self.pilots.lock().unwrap() = pilots;
        Ok(())
    }

    async fn replace_controllers(&self, controllers: Vec<NewOnlineController>) -> Result<()> {
        if self.fail_controllers.load(Ordering::SeqCst) {
            bail!("connection refused");
        }
        *self.writes.lock().unwrap() += 1;
        *self.controllers.lock().unwrap() = controllers;
        Ok(())
    }

    async fn replace_metars(&self, metars: Vec<NewMetar>) -> Result<()> {
        *self.writes.lock().unwrap() += 1;
        *self.metars.lock().unwrap() = metars;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Duty sessions
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct MemorySessionStore {
    pub sessions: Mutex<Vec<DutySession>>,
    /// Lookups that report nothing, as if another writer had not committed yet
    missed_lookups: AtomicUsize,
}

impl MemorySessionStore {
    pub fn miss_next_lookups(&self, count: usize) {
        self.missed_lookups.store(count, Ordering::SeqCst);
    }

    pub fn sessions_for(&self, cid: i32) -> Vec<DutySession> {
        self.sessions
            .lock()
            .unwrap()
            .iter()
            .filter(|s| s.cid == cid)
            .cloned()
            .collect()
    }
}

#[async_trait]
impl DutySessionStore for MemorySessionStore {
    async fn find_session(
        &self,
        cid: i32,
        time_start: DateTime<Utc>,
    ) -> Result<Option<DutySession>> {
        if self
            .missed_lookups
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
        {
            return Ok(None);
        }
        Ok(self
            .sessions
            .lock()
            .unwrap()
            .iter()
            .find(|s| s.cid == cid && s.time_start == time_start)
            .cloned())
    }

    async fn open_session(&self, session: &NewDutySession) -> Result<bool> {
        let mut sessions = self.sessions.lock().unwrap();
        if sessions
            .iter()
            .any(|s| s.cid == session.cid && s.time_start == session.time_start)
        {
            return Ok(false);
        }
        let now = Utc::now();
        sessions.push(DutySession {
            id: session.id,
            cid: session.cid,
            position: session.position.clone(),
            time_start: session.time_start,
            time_end: session.time_end,
            created_at: now,
            updated_at: now,
        });
        Ok(true)
    }

    async fn extend_session(&self, id: Uuid, time_end: DateTime<Utc>) -> Result<()> {
        let mut sessions = self.sessions.lock().unwrap();
        let session = sessions
            .iter_mut()
            .find(|s| s.id == id)
            .context("no such session")?;
        session.time_end = time_end;
        session.updated_at = Utc::now();
        Ok(())
    }
}

#[derive(Default)]
pub struct RecordingObserver {
    pub opened: Mutex<Vec<i32>>,
}

impl RecordingObserver {
    pub fn opened(&self) -> Vec<i32> {
        self.opened.lock().unwrap().clone()
    }
}

#[async_trait]
impl SessionObserver for RecordingObserver {
    async fn session_opened(&self, cid: i32) {
        self.opened.lock().unwrap().push(cid);
    }
}

// ---------------------------------------------------------------------------
// PIREPs
// ---------------------------------------------------------------------------

pub struct FakePirepFeed {
    body: Mutex<Option<String>>,
}

impl FakePirepFeed {
    /// Serve `body` as the upstream response
    pub fn serving(body: &str) -> Self {
        Self {
            body: Mutex::new(Some(body.to_string())),
        }
    }

    /// Fail every fetch
    pub fn unavailable() -> Self {
        Self {
            body: Mutex::new(None),
        }
    }
}

#[async_trait]
impl PirepFeed for FakePirepFeed {
    async fn fetch_reports(&self) -> Result<Vec<RawReport>> {
        match self.body.lock().unwrap().as_deref() {
            Some(body) => RawReport::parse_batch(body),
            None => bail!("PIREP endpoint returned an error: 502 Bad Gateway"),
        }
    }
}

#[derive(Default)]
pub struct MemoryPirepStore {
    pub pireps: Mutex<Vec<NewPirep>>,
}

impl MemoryPirepStore {
    pub fn with(pireps: Vec<NewPirep>) -> Self {
        Self {
            pireps: Mutex::new(pireps),
        }
    }

    pub fn raw_texts(&self) -> Vec<String> {
        self.pireps
            .lock()
            .unwrap()
            .iter()
            .map(|p| p.raw.clone())
            .collect()
    }
}

#[async_trait]
impl PirepStore for MemoryPirepStore {
    async fn purge_stale(&self, cutoff: DateTime<Utc>) -> Result<usize> {
        let mut pireps = self.pireps.lock().unwrap();
        let before = pireps.len();
        pireps.retain(|p| p.manual || p.report_time >= cutoff);
        Ok(before - pireps.len())
    }

    async fn insert(&self, pirep: &NewPirep) -> Result<bool> {
        let mut pireps = self.pireps.lock().unwrap();
        if pireps
            .iter()
            .any(|p| p.report_time == pirep.report_time && p.raw == pirep.raw)
        {
            return Ok(false);
        }
        pireps.push(pirep.clone());
        Ok(true)
    }
}

pub fn stored_pirep(raw: &str, report_time: DateTime<Utc>, manual: bool) -> NewPirep {
    NewPirep {
        id: Uuid::now_v7(),
        report_time,
        location: None,
        aircraft: "C172".to_string(),
        flight_level: "065".to_string(),
        sky_cond: String::new(),
        turbulence: String::new(),
        icing: String::new(),
        vis: String::new(),
        temp: String::new(),
        wind: "@".to_string(),
        urgent: false,
        raw: raw.to_string(),
        manual,
    }
}

// ---------------------------------------------------------------------------
// Working-set cache with injectable read failures
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct FlakyCache {
    pub inner: MemoryBroker,
    fail_reads: AtomicBool,
}

impl FlakyCache {
    pub fn set_fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl WorkingSetCache for FlakyCache {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        if self.fail_reads.load(Ordering::SeqCst) {
            bail!("Redis GET {} failed: broken pipe", key);
        }
        self.inner.get(key).await
    }

    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<()> {
        self.inner.set(key, value, ttl).await
    }

    async fn get_fields(&self, key: &str) -> Result<Option<BTreeMap<String, String>>> {
        self.inner.get_fields(key).await
    }

    async fn set_fields(
        &self,
        key: &str,
        fields: &[(&str, String)],
        ttl: Option<Duration>,
    ) -> Result<()> {
        self.inner.set_fields(key, fields, ttl).await
    }

    async fn expire(&self, key: &str, ttl: Duration) -> Result<()> {
        self.inner.expire(key, ttl).await
    }

    async fn delete(&self, key: &str) -> Result<()> {
        self.inner.delete(key).await
    }
}

// ---------------------------------------------------------------------------
// PostgreSQL
// ---------------------------------------------------------------------------

/// A throwaway database with migrations applied, dropped again on drop
pub struct TestDatabase {
    db_name: String,
    admin_url: String,
    pool: PgPool,
}

impl TestDatabase {
    pub async fn new() -> Result<Self> {
        dotenvy::dotenv().ok();
        let base_url = std::env::var("TEST_DATABASE_URL")
            .unwrap_or_else(|_| "postgresql://localhost/artcc_test".to_string());

        let (server, _) = base_url
            .rsplit_once('/')
            .context("TEST_DATABASE_URL has no database name")?;
        let admin_url = format!("{}/postgres", server);
        let db_name = format!("artcc_test_{}", Uuid::new_v4().simple());
        let test_url = format!("{}/{}", server, db_name);

        let pool = {
            let admin_url = admin_url.clone();
            let db_name = db_name.clone();
            tokio::task::spawn_blocking(move || {
                let mut admin = PgConnection::establish(&admin_url)
                    .context("Failed to connect to admin database")?;
                diesel::sql_query(format!("CREATE DATABASE {}", db_name)).execute(&mut admin)?;

                let pool = Pool::builder()
                    .max_size(4)
                    .build(ConnectionManager::<PgConnection>::new(&test_url))?;
                let mut conn = pool.get()?;
                conn.run_pending_migrations(MIGRATIONS)
                    .map_err(|e| anyhow::anyhow!("Failed to run migrations: {}", e))?;
                Ok::<PgPool, anyhow::Error>(pool)
            })
            .await??
        };

        Ok(Self {
            db_name,
            admin_url,
            pool,
        })
    }

    pub fn pool(&self) -> PgPool {
        self.pool.clone()
    }
}

impl Drop for TestDatabase {
    fn drop(&mut self) {
        if let Ok(mut admin) = PgConnection::establish(&self.admin_url) {
            let _ = diesel::sql_query(format!("DROP DATABASE IF EXISTS {} WITH (FORCE)", self.db_name))
                .execute(&mut admin);
        }
    }
}
