use anyhow::Result;
use chrono::Utc;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{Instrument, error, info, warn};

use crate::pirep_ingest::PirepIngestor;
use crate::reconciler::Reconciler;

/// Drives the online poll and PIREP ingestion loops
pub struct Scheduler {
    reconciler: Arc<Reconciler>,
    ingestor: Arc<PirepIngestor>,
    poll_interval: Duration,
    pirep_interval: Duration,
    poll_overrun: Duration,
    pirep_overrun: Duration,
}

impl Scheduler {
    pub fn new(
        reconciler: Arc<Reconciler>,
        ingestor: Arc<PirepIngestor>,
        poll_interval: Duration,
        pirep_interval: Duration,
    ) -> Self {
        Self {
            reconciler,
            ingestor,
            poll_interval,
            pirep_interval,
            poll_overrun: poll_interval,
            pirep_overrun: pirep_interval,
        }
    }

    /// Cycle duration past which an overrun is reported; defaults to the loop's interval.
    ///
    /// An overrunning cycle is still awaited, so its database writes never race the next one.
    pub fn with_overrun_thresholds(mut self, poll: Duration, pireps: Duration) -> Self {
        self.poll_overrun = poll;
        self.pirep_overrun = pireps;
        self
    }

    /// Run both loops until `shutdown` flips; each loop finishes its in-flight cycle first
    pub async fn run(self, shutdown: watch::Receiver<bool>) -> Result<()> {
        info!(
            "Polling every {:?}, ingesting PIREPs every {:?}",
            self.poll_interval, self.pirep_interval
        );

        let reconciler = self.reconciler.clone();
        let poll_overrun = self.poll_overrun;
        let poll = tokio::spawn(
            run_periodic("poll", self.poll_interval, shutdown.clone(), move || {
                let reconciler = reconciler.clone();
                async move {
                    let cycle = reconciler.run_cycle(Utc::now());
                    if let Err(e) = run_to_completion("poll", poll_overrun, cycle).await {
                        error!("Poll cycle failed: {:#}", e);
                        metrics::counter!("sync.cycles.failed").increment(1);
                    }
                }
            })
            .instrument(tracing::info_span!("poll_loop")),
        );

        let ingestor = self.ingestor.clone();
        let pirep_overrun = self.pirep_overrun;
        let pireps = tokio::spawn(
            run_periodic("pireps", self.pirep_interval, shutdown, move || {
                let ingestor = ingestor.clone();
                async move {
                    metrics::counter!("pireps.cycles").increment(1);
                    let cycle = ingestor.ingest(Utc::now());
                    if let Err(e) = run_to_completion("pireps", pirep_overrun, cycle).await {
                        error!("PIREP cycle failed: {:#}", e);
                        metrics::counter!("pireps.cycles.failed").increment(1);
                    }
                }
            })
            .instrument(tracing::info_span!("pirep_loop")),
        );

        let (poll_result, pirep_result) = tokio::join!(poll, pireps);
        poll_result?;
        pirep_result?;
        info!("Scheduler stopped");
        Ok(())
    }
}

/// Await `cycle` to completion; past `limit` it is logged and counted as an overrun, never dropped
async fn run_to_completion<T>(
    name: &'static str,
    limit: Duration,
    cycle: impl Future<Output = T>,
) -> T {
    tokio::pin!(cycle);
    tokio::select! {
        output = &mut cycle => output,
        _ = tokio::time::sleep(limit) => {
            warn!("{} cycle exceeded {:?}, waiting for it to finish", name, limit);
            metrics::counter!("sync.cycles.overrun", "loop" => name).increment(1);
            cycle.await
        }
    }
}

/// Call `cycle` every `period`, never overlapping itself; late ticks are skipped, not queued
pub async fn run_periodic<F, Fut>(
    name: &'static str,
    period: Duration,
    mut shutdown: watch::Receiver<bool>,
    mut cycle: F,
) where
    F: FnMut() -> Fut,
    Fut: Future<Output = ()>,
{
    let mut interval = tokio::time::interval(period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut last_tick: Option<Instant> = None;

    loop {
        tokio::select! {
            biased;
            _ = shutdown.changed() => {
                info!("{} loop stopping", name);
                break;
            }
            tick = interval.tick() => {
                if let Some(previous) = last_tick {
                    let skipped = ((tick - previous).as_millis() / period.as_millis().max(1))
                        .saturating_sub(1);
                    if skipped > 0 {
                        warn!("{} loop skipped {} tick(s) behind a slow cycle", name, skipped);
                        metrics::counter!("sync.ticks.missed", "loop" => name)
                            .increment(skipped as u64);
                    }
                }
                last_tick = Some(tick);
                cycle().await;
            }
        }

        if *shutdown.borrow() {
            info!("{} loop stopping", name);
            break;
        }
    }
}

/// Resolve on SIGTERM or Ctrl-C
pub async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};

        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = sigterm.recv() => info!("Received SIGTERM, shutting down..."),
                    _ = tokio::signal::ctrl_c() => info!("Received SIGINT (Ctrl+C), shutting down..."),
                }
                return;
            }
            Err(e) => error!("Failed to register SIGTERM handler: {}", e),
        }
    }

    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("Received SIGINT (Ctrl+C), shutting down..."),
        Err(e) => error!("Failed to listen for SIGINT: {}", e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test(start_paused = true)]
    async fn test_periodic_loop_runs_until_shutdown() {
        let (tx, rx) = watch::channel(false);
        let count = Arc::new(AtomicUsize::new(0));

        let counter = count.clone();
        let handle = tokio::spawn(run_periodic(
            "test",
            Duration::from_secs(15),
            rx,
            move || {
                let counter = counter.clone();
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                }
            },
        ));

        // ticks at 0s, 15s, 30s
        tokio::time::sleep(Duration::from_secs(31)).await;
        tx.send(true).unwrap();
        handle.await.unwrap();

        assert_eq!(count.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_cycle_does_not_overlap() {
        let (tx, rx) = watch::channel(false);
        let running = Arc::new(AtomicUsize::new(0));
        let max_running = Arc::new(AtomicUsize::new(0));

        let (r, m) = (running.clone(), max_running.clone());
        let handle = tokio::spawn(run_periodic(
            "slow",
            Duration::from_secs(1),
            rx,
            move || {
                let (r, m) = (r.clone(), m.clone());
                async move {
                    let now_running = r.fetch_add(1, Ordering::SeqCst) + 1;
                    m.fetch_max(now_running, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(2500)).await;
                    r.fetch_sub(1, Ordering::SeqCst);
                }
            },
        ));

        tokio::time::sleep(Duration::from_secs(10)).await;
        tx.send(true).unwrap();
        handle.await.unwrap();

        assert_eq!(max_running.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_overrunning_cycle_is_awaited() {
        let started = Instant::now();
        let output = run_to_completion("slow", Duration::from_secs(1), async {
            tokio::time::sleep(Duration::from_secs(3)).await;
            42
        })
        .await;

        assert_eq!(output, 42);
        assert!(started.elapsed() >= Duration::from_secs(3));
    }
}
