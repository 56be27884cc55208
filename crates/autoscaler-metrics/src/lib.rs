//! autoscaler-metrics — telemetry ingestion for the autoscaler.
//!
//! Normalizes raw container-metric envelopes, aggregates them into
//! per-application snapshots and per-instance history records, persists the
//! history to the state store, and provides Prometheus-compatible text
//! exposition of the latest snapshots.
//!
//! # Architecture
//!
//! ```text
//! RawEnvelope batch
//!   └── normalize() → Envelope { ContainerMetric | Other }
//!         ├── aggregator::snapshot_*() → Metric (latest per instance)
//!         └── aggregator::history_*()  → Vec<AppInstanceMetric> → StateStore
//!
//! MetricsCollector
//!   ├── ingest()  ← one batch from the firehose
//!   ├── latest()  → snapshot read by the decision engine
//!   └── run()     → channel-driven ingest loop + history pruning
//!
//! Prometheus exposition
//!   └── render_prometheus() → text/plain for /metrics endpoint
//! ```

pub mod aggregator;
pub mod collector;
pub mod envelope;
pub mod prometheus;

pub use aggregator::{history, history_memory, snapshot, snapshot_memory};
pub use collector::{epoch_nanos, IngestSummary, MetricsCollector};
pub use envelope::{ContainerMetric, Envelope, EnvelopePayload, RawContainerMetric, RawEnvelope};
pub use prometheus::render_prometheus;
