use anyhow::{Context, Result};
use axum::{Router, extract::State, routing::get};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder, PrometheusHandle};
use std::net::SocketAddr;
use std::time::{Duration, Instant};
use tracing::info;

use crate::differencer::EntityClass;

/// Install the Prometheus recorder
pub fn init_metrics() -> Result<PrometheusHandle> {
    PrometheusBuilder::new()
        // 10ms .. 30s; a cycle is a handful of HTTP requests plus a few transactions
        .set_buckets_for_metric(
            Matcher::Suffix("duration_ms".to_string()),
            &[
                10.0, 50.0, 100.0, 250.0, 500.0, 1000.0, 2500.0, 5000.0, 10000.0, 30000.0,
            ],
        )
        .context("Failed to set duration buckets")?
        .install_recorder()
        .context("Failed to install Prometheus recorder")
}

/// Background task to update process metrics
pub async fn process_metrics_task() {
    let start_time = Instant::now();

    loop {
        metrics::gauge!("process.uptime.seconds").set(start_time.elapsed().as_secs() as f64);
        metrics::gauge!("process.is_up").set(1.0);

        #[cfg(target_os = "linux")]
        {
            if let Ok(status) = std::fs::read_to_string("/proc/self/status")
                && let Some(kb) = status
                    .lines()
                    .find(|line| line.starts_with("VmRSS:"))
                    .and_then(|line| line.split_whitespace().nth(1))
                    .and_then(|kb| kb.parse::<f64>().ok())
            {
                metrics::gauge!("process.memory.bytes").set(kb * 1024.0);
            }
        }

        tokio::time::sleep(Duration::from_secs(5)).await;
    }
}

/// Initialize sync metrics to zero so they appear in Prometheus before the first event
pub fn initialize_sync_metrics() {
    metrics::counter!("sync.cycles").absolute(0);
    metrics::counter!("sync.cycles.failed").absolute(0);
    for name in ["poll", "pireps"] {
        metrics::counter!("sync.cycles.overrun", "loop" => name).absolute(0);
        metrics::counter!("sync.ticks.missed", "loop" => name).absolute(0);
    }
    metrics::counter!("sync.metars.fetch_failed").absolute(0);
    metrics::counter!("sync.sessions.opened").absolute(0);
    metrics::counter!("sync.sessions.failed").absolute(0);
    metrics::counter!("sync.stats.notify_failed").absolute(0);

    for class in EntityClass::ALL {
        let label = class.cache_key();
        metrics::gauge!("sync.online", "class" => label).set(0.0);
        metrics::counter!("sync.delta.removed", "class" => label).absolute(0);
        metrics::counter!("sync.class.failed", "class" => label).absolute(0);
        metrics::counter!("sync.cache.read_failed", "class" => label).absolute(0);
    }

    metrics::counter!("pireps.cycles").absolute(0);
    metrics::counter!("pireps.cycles.failed").absolute(0);
    metrics::counter!("pireps.fetched").absolute(0);
    metrics::counter!("pireps.stored").absolute(0);
    metrics::counter!("pireps.purged").absolute(0);
    for reason in ["not_pirep", "stale", "outside_region", "malformed"] {
        metrics::counter!("pireps.skipped", "reason" => reason).absolute(0);
    }
}

async fn render_metrics(State(handle): State<PrometheusHandle>) -> String {
    handle.render()
}

/// Serve `/metrics` until the process exits
pub async fn start_metrics_server(port: u16) -> Result<()> {
    let handle = init_metrics()?;
    initialize_sync_metrics();

    tokio::spawn(process_metrics_task());

    let app = Router::new()
        .route("/metrics", get(render_metrics))
        .with_state(handle);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    info!("Starting metrics server on http://{}/metrics", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind metrics server to {}", addr))?;

    axum::serve(listener, app)
        .await
        .context("Metrics server failed")
}
