//! HTTP handlers.
//!
//! JSON responses use the `ApiResponse` wrapper, except policy validation
//! failures which return `{"error": [...]}` with one entry per violation.

use axum::Json;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, warn};

use autoscaler_broker::BrokerError;
use autoscaler_metrics::RawEnvelope;
use autoscaler_state::MetricName;

use crate::ApiState;

/// Response wrapper for consistent API format.
#[derive(serde::Serialize)]
struct ApiResponse<T: serde::Serialize> {
    success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl<T: serde::Serialize> ApiResponse<T> {
    fn ok(data: T) -> Json<Self> {
        Json(Self {
            success: true,
            data: Some(data),
            error: None,
        })
    }
}

fn error_response(msg: &str, status: StatusCode) -> impl IntoResponse {
    (
        status,
        Json(ApiResponse::<()> {
            success: false,
            data: None,
            error: Some(msg.to_string()),
        }),
    )
}

// ── Bindings ───────────────────────────────────────────────────

/// Bind request body.
#[derive(Deserialize)]
pub struct BindRequest {
    pub app_id: String,
    /// The raw scaling policy.
    #[serde(default)]
    pub parameters: Value,
}

/// PUT /v2/service_instances/:instance_id/service_bindings/:binding_id
pub async fn bind(
    State(state): State<ApiState>,
    Path((instance_id, binding_id)): Path<(String, String)>,
    Json(req): Json<BindRequest>,
) -> impl IntoResponse {
    match state
        .bindings
        .bind(&instance_id, &binding_id, &req.app_id, &req.parameters)
        .await
    {
        Ok(binding) => (StatusCode::CREATED, ApiResponse::ok(binding)).into_response(),
        Err(BrokerError::Validation(errors)) => {
            debug!(app_id = %req.app_id, %errors, "policy rejected");
            (
                StatusCode::BAD_REQUEST,
                Json(serde_json::json!({ "error": errors })),
            )
                .into_response()
        }
        Err(e) => error_response(&e.to_string(), StatusCode::INTERNAL_SERVER_ERROR).into_response(),
    }
}

#[derive(Deserialize)]
pub struct UnbindQuery {
    pub app_id: String,
}

/// DELETE /v2/service_instances/:instance_id/service_bindings/:binding_id?app_id=
pub async fn unbind(
    State(state): State<ApiState>,
    Path((instance_id, binding_id)): Path<(String, String)>,
    Query(q): Query<UnbindQuery>,
) -> impl IntoResponse {
    match state.bindings.unbind(&instance_id, &binding_id, &q.app_id).await {
        Ok(()) => {
            state.collector.forget(&q.app_id).await;
            ApiResponse::ok("unbound").into_response()
        }
        Err(e) => error_response(&e.to_string(), StatusCode::INTERNAL_SERVER_ERROR).into_response(),
    }
}

// ── Policies ───────────────────────────────────────────────────

/// GET /v1/apps/:app_id/policy
pub async fn get_policy(
    State(state): State<ApiState>,
    Path(app_id): Path<String>,
) -> impl IntoResponse {
    match state.store.get_active_policy(&app_id) {
        Ok(Some(policy)) => ApiResponse::ok(policy).into_response(),
        Ok(None) => error_response("policy not found", StatusCode::NOT_FOUND).into_response(),
        Err(e) => error_response(&e.to_string(), StatusCode::INTERNAL_SERVER_ERROR).into_response(),
    }
}

// ── Metrics ────────────────────────────────────────────────────

/// Inclusive `collected_at` range, nanoseconds since the epoch.
#[derive(Deserialize)]
pub struct HistoryQuery {
    pub start: Option<i64>,
    pub end: Option<i64>,
}

/// GET /v1/apps/:app_id/metric_histories/:metric_type
pub async fn metric_history(
    State(state): State<ApiState>,
    Path((app_id, metric_type)): Path<(String, String)>,
    Query(q): Query<HistoryQuery>,
) -> impl IntoResponse {
    let name: MetricName = match metric_type.parse() {
        Ok(n) => n,
        Err(e) => {
            return error_response(&format!("{e}"), StatusCode::BAD_REQUEST).into_response();
        }
    };
    let start = q.start.unwrap_or(0);
    let end = q.end.unwrap_or(i64::MAX);

    match state.store.list_app_metrics(&app_id, name, start, end) {
        Ok(records) => ApiResponse::ok(records).into_response(),
        Err(e) => error_response(&e.to_string(), StatusCode::INTERNAL_SERVER_ERROR).into_response(),
    }
}

/// POST /v1/envelopes
pub async fn ingest_envelopes(
    State(state): State<ApiState>,
    Json(batch): Json<Vec<RawEnvelope>>,
) -> impl IntoResponse {
    let count = batch.len();
    match state.envelopes.send(batch).await {
        Ok(()) => (StatusCode::ACCEPTED, ApiResponse::ok(serde_json::json!({ "accepted": count })))
            .into_response(),
        Err(_) => {
            warn!(count, "envelope channel closed, batch dropped");
            error_response("ingestion is shutting down", StatusCode::SERVICE_UNAVAILABLE)
                .into_response()
        }
    }
}

// ── Prometheus ─────────────────────────────────────────────────

/// GET /metrics
pub async fn prometheus_metrics(State(state): State<ApiState>) -> impl IntoResponse {
    let snapshots = state.collector.all_latest().await;
    let body = autoscaler_metrics::render_prometheus(&snapshots);
    (
        StatusCode::OK,
        [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
        body,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    use async_trait::async_trait;
    use serde_json::json;
    use tokio::sync::mpsc;

    use autoscaler_broker::{BindingService, RegistrarError, ScheduleRegistrar};
    use autoscaler_metrics::MetricsCollector;
    use autoscaler_state::{AppInstanceMetric, Schedules, StateStore, Unit};

    struct OkRegistrar;

    #[async_trait]
    impl ScheduleRegistrar for OkRegistrar {
        async fn register(&self, _app_id: &str, _s: &Schedules) -> Result<(), RegistrarError> {
            Ok(())
        }

        async fn unregister(&self, _app_id: &str) -> Result<(), RegistrarError> {
            Ok(())
        }
    }

    fn test_state() -> (ApiState, mpsc::Receiver<Vec<RawEnvelope>>) {
        let store = StateStore::open_in_memory().unwrap();
        let collector = Arc::new(MetricsCollector::new(
            store.clone(),
            Duration::from_secs(3600),
            Duration::from_secs(60),
        ));
        let bindings = Arc::new(BindingService::new(store.clone(), Arc::new(OkRegistrar)));
        let (tx, rx) = mpsc::channel(4);
        let state = ApiState {
            store,
            collector,
            bindings,
            envelopes: tx,
        };
        (state, rx)
    }

    fn bind_request(parameters: Value) -> BindRequest {
        BindRequest {
            app_id: "app-1".to_string(),
            parameters,
        }
    }

    fn policy() -> Value {
        json!({
            "instance_min_count": 1,
            "instance_max_count": 4,
            "scaling_rules": [{
                "metric_type": "memory",
                "threshold": 30,
                "operator": "<",
                "adjustment": "-1"
            }]
        })
    }

    fn ids() -> Path<(String, String)> {
        Path(("si-1".to_string(), "b-1".to_string()))
    }

    #[tokio::test]
    async fn bind_then_get_policy() {
        let (state, _rx) = test_state();
        let resp = bind(State(state.clone()), ids(), Json(bind_request(policy()))).await;
        assert_eq!(resp.into_response().status(), StatusCode::CREATED);

        let resp = get_policy(State(state), Path("app-1".to_string())).await;
        assert_eq!(resp.into_response().status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn bind_invalid_policy_is_bad_request() {
        let (state, _rx) = test_state();
        let mut p = policy();
        p["scaling_rules"][0]["cool_down_secs"] = json!(-300);

        let resp = bind(State(state.clone()), ids(), Json(bind_request(p))).await;
        assert_eq!(resp.into_response().status(), StatusCode::BAD_REQUEST);

        let resp = get_policy(State(state), Path("app-1".to_string())).await;
        assert_eq!(resp.into_response().status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn unbind_is_ok_without_policy() {
        let (state, _rx) = test_state();
        let q = Query(UnbindQuery {
            app_id: "app-1".to_string(),
        });
        let resp = unbind(State(state), ids(), q).await;
        assert_eq!(resp.into_response().status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn history_rejects_unknown_metric() {
        let (state, _rx) = test_state();
        let resp = metric_history(
            State(state),
            Path(("app-1".to_string(), "throughput".to_string())),
            Query(HistoryQuery { start: None, end: None }),
        )
        .await;
        assert_eq!(resp.into_response().status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn history_reads_store() {
        let (state, _rx) = test_state();
        state
            .store
            .put_app_metrics(&[AppInstanceMetric {
                app_id: "app-1".to_string(),
                instance_index: 0,
                collected_at: 100,
                timestamp: 90,
                name: MetricName::Memory,
                unit: Unit::Bytes,
                value: "42".to_string(),
            }])
            .unwrap();

        let resp = metric_history(
            State(state),
            Path(("app-1".to_string(), "memory".to_string())),
            Query(HistoryQuery { start: Some(50), end: Some(150) }),
        )
        .await;
        assert_eq!(resp.into_response().status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn envelopes_are_forwarded() {
        let (state, mut rx) = test_state();
        let resp = ingest_envelopes(State(state), Json(vec![RawEnvelope::default()])).await;
        assert_eq!(resp.into_response().status(), StatusCode::ACCEPTED);
        assert_eq!(rx.recv().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn envelopes_rejected_when_channel_closed() {
        let (state, rx) = test_state();
        drop(rx);
        let resp = ingest_envelopes(State(state), Json(vec![])).await;
        assert_eq!(resp.into_response().status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn prometheus_endpoint_returns_text() {
        let (state, _rx) = test_state();
        let resp = prometheus_metrics(State(state)).await.into_response();
        assert_eq!(resp.status(), StatusCode::OK);
        let content_type = resp.headers().get("content-type").unwrap().to_str().unwrap();
        assert!(content_type.contains("text/plain"));
    }
}
