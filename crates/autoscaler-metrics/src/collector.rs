//! Metrics collector — turns envelope batches into snapshots and history.
//!
//! Each ingested batch is normalized and aggregated per application. The
//! latest snapshot per (application, metric) is kept in memory for the
//! decision engine; per-instance history is persisted to the state store
//! and pruned after the retention window.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use tokio::sync::{mpsc, watch, RwLock};
use tracing::{debug, error, info, warn};

use autoscaler_state::{Metric, MetricName, StateStore};

use crate::aggregator;
use crate::envelope::{normalize, Envelope, RawEnvelope};

/// Latest snapshots for one application.
struct AppSnapshots {
    by_metric: HashMap<MetricName, Metric>,
}

/// Result of ingesting one batch.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IngestSummary {
    pub envelopes: usize,
    pub apps: usize,
    pub history_records: usize,
}

/// Aggregates telemetry batches and serves the latest snapshots.
pub struct MetricsCollector {
    /// Latest snapshots: app_id → per-metric snapshot.
    latest: Arc<RwLock<HashMap<String, AppSnapshots>>>,
    /// The state store for persisting history.
    state: StateStore,
    /// How long history records are kept.
    retention: Duration,
    /// How often the pruning pass runs.
    prune_interval: Duration,
}

impl MetricsCollector {
    /// Create a new metrics collector.
    pub fn new(state: StateStore, retention: Duration, prune_interval: Duration) -> Self {
        Self {
            latest: Arc::new(RwLock::new(HashMap::new())),
            state,
            retention,
            prune_interval,
        }
    }

    /// Aggregate one batch of raw envelopes.
    ///
    /// Every application present in the batch gets a fresh snapshot for
    /// each metric kind; its history records are persisted with the
    /// current time as `collected_at`.
    pub async fn ingest(&self, batch: &[RawEnvelope]) -> anyhow::Result<IngestSummary> {
        let envelopes: Vec<Envelope> = batch.iter().map(normalize).collect();
        self.ingest_normalized(&envelopes, epoch_nanos()).await
    }

    /// Aggregate an already-normalized batch at a given collection time.
    pub async fn ingest_normalized(
        &self,
        envelopes: &[Envelope],
        collected_at: i64,
    ) -> anyhow::Result<IngestSummary> {
        let apps = aggregator::app_ids(envelopes);
        let mut records = Vec::new();
        let mut fresh = Vec::with_capacity(apps.len());

        for app_id in &apps {
            let mut by_metric = HashMap::new();
            for name in MetricName::ALL {
                by_metric.insert(name, aggregator::snapshot(app_id, name, envelopes));
                records.extend(aggregator::history(collected_at, app_id, name, envelopes));
            }
            fresh.push((app_id.clone(), AppSnapshots { by_metric }));
        }

        self.state.put_app_metrics(&records)?;

        {
            let mut latest = self.latest.write().await;
            for (app_id, snapshots) in fresh {
                latest.insert(app_id, snapshots);
            }
        }

        let summary = IngestSummary {
            envelopes: envelopes.len(),
            apps: apps.len(),
            history_records: records.len(),
        };
        debug!(
            envelopes = summary.envelopes,
            apps = summary.apps,
            records = summary.history_records,
            "envelope batch aggregated"
        );
        Ok(summary)
    }

    /// The most recent snapshot of `name` for an application.
    pub async fn latest(&self, app_id: &str, name: MetricName) -> Option<Metric> {
        let latest = self.latest.read().await;
        latest
            .get(app_id)
            .and_then(|s| s.by_metric.get(&name))
            .cloned()
    }

    /// All latest snapshots, for exposition.
    pub async fn all_latest(&self) -> Vec<Metric> {
        let latest = self.latest.read().await;
        latest
            .values()
            .flat_map(|s| s.by_metric.values().cloned())
            .collect()
    }

    /// Drop an application's snapshots (e.g. after its policy is detached).
    pub async fn forget(&self, app_id: &str) {
        let mut latest = self.latest.write().await;
        if latest.remove(app_id).is_some() {
            debug!(%app_id, "snapshots dropped");
        }
    }

    /// List application ids with at least one snapshot.
    pub async fn tracked_apps(&self) -> Vec<String> {
        let latest = self.latest.read().await;
        latest.keys().cloned().collect()
    }

    /// Delete history older than the retention window.
    pub fn prune(&self) -> anyhow::Result<u32> {
        let cutoff = epoch_nanos().saturating_sub(self.retention.as_nanos() as i64);
        Ok(self.state.prune_app_metrics(cutoff)?)
    }

    /// Consume envelope batches until the channel closes or shutdown.
    pub async fn run(
        &self,
        mut batches: mpsc::Receiver<Vec<RawEnvelope>>,
        mut shutdown: watch::Receiver<bool>,
    ) {
        info!(
            retention_secs = self.retention.as_secs(),
            "metrics collector started"
        );
        let mut prune_tick = tokio::time::interval(self.prune_interval);

        loop {
            tokio::select! {
                batch = batches.recv() => match batch {
                    Some(batch) => {
                        if let Err(e) = self.ingest(&batch).await {
                            error!(error = %e, "envelope batch ingest failed");
                        }
                    }
                    None => {
                        info!("envelope channel closed, metrics collector stopping");
                        break;
                    }
                },
                _ = prune_tick.tick() => {
                    match self.prune() {
                        Ok(0) => {}
                        Ok(n) => debug!(pruned = n, "metric history pruned"),
                        Err(e) => warn!(error = %e, "metric history prune failed"),
                    }
                }
                _ = shutdown.changed() => {
                    info!("metrics collector shutting down");
                    break;
                }
            }
        }
    }
}

/// Current time in nanoseconds since the epoch.
pub fn epoch_nanos() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos() as i64
}
