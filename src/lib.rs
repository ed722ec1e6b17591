//! artcc-sync - online tracker and reconciliation engine for one ARTCC
//!
//! Polls the VATSIM network snapshot, keeps the region's pilots, controllers, neighboring
//! centers and ATIS stations in PostgreSQL and a short-lived working-set cache, publishes what
//! went offline since the previous poll, records controller duty sessions, and ingests recent
//! pilot weather reports.

pub mod config;
pub mod controller_hours;
pub mod controller_hours_repo;
pub mod db;
pub mod differencer;
pub mod duty_tracker;
pub mod geofence;
pub mod metrics;
pub mod nats_publisher;
pub mod online;
pub mod online_repo;
pub mod pirep_client;
pub mod pirep_ingest;
pub mod pirep_normalizer;
pub mod pireps;
pub mod pireps_repo;
pub mod reconciler;
pub mod redis_broker;
pub mod region;
pub mod scheduler;
pub mod schema;
pub mod stats_client;
pub mod telemetry;
pub mod vatsim;
pub mod working_set;

pub use differencer::{EntityClass, OnlineDelta, OnlineSetDifferencer};
pub use reconciler::{CycleSummary, Reconciler};
pub use region::Region;
pub use working_set::{DeltaPublisher, MemoryBroker, WorkingSetCache};
