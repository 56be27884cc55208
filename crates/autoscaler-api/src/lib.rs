//! autoscaler-api — HTTP surface of the autoscaler.
//!
//! Thin axum handlers over the broker, the state store and the metrics
//! collector. No scaling logic lives here.
//!
//! # API Routes
//!
//! | Method | Path | Description |
//! |---|---|---|
//! | PUT | `/v2/service_instances/{instance_id}/service_bindings/{binding_id}` | Bind a policy to an app |
//! | DELETE | `/v2/service_instances/{instance_id}/service_bindings/{binding_id}?app_id=` | Unbind |
//! | GET | `/v1/apps/{app_id}/policy` | Active policy |
//! | GET | `/v1/apps/{app_id}/metric_histories/{metric_type}?start=&end=` | Metric history |
//! | POST | `/v1/envelopes` | Ingest a batch of telemetry envelopes |
//! | GET | `/metrics` | Prometheus exposition |

pub mod handlers;

use std::sync::Arc;

use axum::Router;
use axum::routing::{get, post, put};
use tokio::sync::mpsc;

use autoscaler_broker::BindingService;
use autoscaler_metrics::{MetricsCollector, RawEnvelope};
use autoscaler_state::StateStore;

/// Shared state for API handlers.
#[derive(Clone)]
pub struct ApiState {
    pub store: StateStore,
    pub collector: Arc<MetricsCollector>,
    pub bindings: Arc<BindingService>,
    /// Feeds the collector's ingest loop.
    pub envelopes: mpsc::Sender<Vec<RawEnvelope>>,
}

/// Build the complete API router.
pub fn build_router(state: ApiState) -> Router {
    Router::new()
        .route(
            "/v2/service_instances/{instance_id}/service_bindings/{binding_id}",
            put(handlers::bind).delete(handlers::unbind),
        )
        .route("/v1/apps/{app_id}/policy", get(handlers::get_policy))
        .route(
            "/v1/apps/{app_id}/metric_histories/{metric_type}",
            get(handlers::metric_history),
        )
        .route("/v1/envelopes", post(handlers::ingest_envelopes))
        .route("/metrics", get(handlers::prometheus_metrics))
        .with_state(state)
}
