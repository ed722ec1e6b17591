use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, warn};

use crate::pirep_client::PirepFeed;
use crate::pirep_normalizer::normalize;
use crate::pireps::retention_cutoff;
use crate::pireps_repo::PirepStore;
use crate::region::Region;

/// Counts from one ingestion cycle
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PirepIngestSummary {
    pub fetched: usize,
    pub purged: usize,
    pub stored: usize,
    /// Already stored from an earlier fetch of the same window
    pub duplicates: usize,
    /// Skip reason label → count
    pub skipped: BTreeMap<&'static str, usize>,
}

impl PirepIngestSummary {
    pub fn skipped_total(&self) -> usize {
        self.skipped.values().sum()
    }
}

/// Fetches, filters and stores pilot reports
pub struct PirepIngestor {
    feed: Arc<dyn PirepFeed>,
    store: Arc<dyn PirepStore>,
    region: Arc<Region>,
}

impl PirepIngestor {
    pub fn new(feed: Arc<dyn PirepFeed>, store: Arc<dyn PirepStore>, region: Arc<Region>) -> Self {
        Self {
            feed,
            store,
            region,
        }
    }

    /// Run one ingestion cycle.
    ///
    /// Stale automatic reports are purged before the fetch, so retention holds while the feed is
    /// down. Individual reports that cannot be normalized are skipped; a store failure aborts the
    /// rest of the batch.
    #[tracing::instrument(skip(self))]
    pub async fn ingest(&self, now: DateTime<Utc>) -> Result<PirepIngestSummary> {
        let start = Instant::now();

        let purged = self
            .store
            .purge_stale(retention_cutoff(now))
            .await
            .context("Failed to purge stale PIREPs")?;
        metrics::counter!("pireps.purged").increment(purged as u64);

        let reports = self
            .feed
            .fetch_reports()
            .await
            .context("Failed to fetch PIREPs")?;

        let mut summary = PirepIngestSummary {
            fetched: reports.len(),
            purged,
            ..Default::default()
        };

        for report in &reports {
            let pirep = match normalize(report, &self.region, now) {
                Ok(pirep) => pirep,
                Err(reason) => {
                    warn!("Skipping report: {}", reason);
                    metrics::counter!("pireps.skipped", "reason" => reason.label()).increment(1);
                    *summary.skipped.entry(reason.label()).or_default() += 1;
                    continue;
                }
            };

            if self
                .store
                .insert(&pirep)
                .await
                .context("Failed to store PIREP")?
            {
                summary.stored += 1;
            } else {
                summary.duplicates += 1;
            }
        }

        metrics::counter!("pireps.fetched").increment(summary.fetched as u64);
        metrics::counter!("pireps.stored").increment(summary.stored as u64);
        metrics::histogram!("pireps.cycle.duration_ms").record(start.elapsed().as_millis() as f64);

        info!(
            "PIREPs: fetched {}, stored {}, already known {}, skipped {}, purged {}",
            summary.fetched,
            summary.stored,
            summary.duplicates,
            summary.skipped_total(),
            summary.purged
        );

        Ok(summary)
    }
}
