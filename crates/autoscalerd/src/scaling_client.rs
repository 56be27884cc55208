//! HTTP client for the scaling engine.
//!
//! `GET {url}/v1/apps/{app_id}/instances` returns `{"instances": n}`;
//! `PUT` to the same path with the same body sets the count.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use autoscaler_engine::{EngineError, EngineResult, ScalingClient};

#[derive(Debug, Serialize, Deserialize)]
struct InstanceCount {
    instances: u32,
}

#[derive(Debug, Clone)]
pub struct HttpScalingClient {
    base_url: String,
    client: reqwest::Client,
}

impl HttpScalingClient {
    pub fn new(base_url: impl Into<String>, client: reqwest::Client) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client,
        }
    }

    fn url(&self, app_id: &str) -> String {
        format!("{}/v1/apps/{app_id}/instances", self.base_url)
    }
}

#[async_trait]
impl ScalingClient for HttpScalingClient {
    async fn instance_count(&self, app_id: &str) -> EngineResult<u32> {
        let upstream = |e: reqwest::Error| EngineError::Upstream(e.to_string());
        let count: InstanceCount = self
            .client
            .get(self.url(app_id))
            .send()
            .await
            .map_err(upstream)?
            .error_for_status()
            .map_err(upstream)?
            .json()
            .await
            .map_err(upstream)?;
        Ok(count.instances)
    }

    async fn set_instance_count(&self, app_id: &str, target: u32) -> EngineResult<()> {
        let dispatch = |e: reqwest::Error| EngineError::Dispatch(e.to_string());
        self.client
            .put(self.url(app_id))
            .json(&InstanceCount { instances: target })
            .send()
            .await
            .map_err(dispatch)?
            .error_for_status()
            .map_err(dispatch)?;
        debug!(%app_id, target, "instance count set");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};

    use axum::Json;
    use axum::Router;
    use axum::extract::State;
    use axum::routing::get;

    async fn spawn_engine(initial: u32) -> (String, Arc<AtomicU32>) {
        let count = Arc::new(AtomicU32::new(initial));
        let app = Router::new()
            .route(
                "/v1/apps/{app_id}/instances",
                get(|State(c): State<Arc<AtomicU32>>| async move {
                    Json(InstanceCount {
                        instances: c.load(Ordering::SeqCst),
                    })
                })
                .put(
                    |State(c): State<Arc<AtomicU32>>, Json(body): Json<InstanceCount>| async move {
                        c.store(body.instances, Ordering::SeqCst);
                    },
                ),
            )
            .with_state(count.clone());

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move { axum::serve(listener, app).await.unwrap() });
        (format!("http://{addr}"), count)
    }

    #[tokio::test]
    async fn reads_and_sets_instance_count() {
        let (url, count) = spawn_engine(2).await;
        let client = HttpScalingClient::new(url, reqwest::Client::new());

        assert_eq!(client.instance_count("app-1").await.unwrap(), 2);
        client.set_instance_count("app-1", 5).await.unwrap();
        assert_eq!(count.load(Ordering::SeqCst), 5);
        assert_eq!(client.instance_count("app-1").await.unwrap(), 5);
    }

    #[tokio::test]
    async fn unknown_path_is_an_error() {
        let (url, _) = spawn_engine(1).await;
        let client = HttpScalingClient::new(format!("{url}/nope"), reqwest::Client::new());

        assert!(matches!(
            client.instance_count("app-1").await,
            Err(EngineError::Upstream(_))
        ));
        assert!(matches!(
            client.set_instance_count("app-1", 3).await,
            Err(EngineError::Dispatch(_))
        ));
    }
}
