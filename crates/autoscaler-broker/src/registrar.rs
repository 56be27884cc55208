//! Schedule registration with the scheduler service.

use async_trait::async_trait;
use reqwest::StatusCode;
use tracing::debug;

use autoscaler_state::Schedules;

use crate::error::RegistrarError;

/// Registers and removes an application's schedules downstream.
#[async_trait]
pub trait ScheduleRegistrar: Send + Sync {
    async fn register(&self, app_id: &str, schedules: &Schedules) -> Result<(), RegistrarError>;

    async fn unregister(&self, app_id: &str) -> Result<(), RegistrarError>;
}

/// Talks to the scheduler over HTTP: `PUT` / `DELETE
/// {base_url}/v2/schedules/{app_id}`.
#[derive(Debug, Clone)]
pub struct HttpScheduleRegistrar {
    base_url: String,
    /// Shared HTTP client (connection pooling).
    client: reqwest::Client,
}

impl HttpScheduleRegistrar {
    pub fn new(base_url: impl Into<String>, client: reqwest::Client) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client,
        }
    }

    fn url(&self, app_id: &str) -> String {
        format!("{}/v2/schedules/{app_id}", self.base_url)
    }
}

async fn check(response: reqwest::Response) -> Result<(), RegistrarError> {
    let status = response.status();
    if status.is_success() {
        return Ok(());
    }
    let body = response.text().await.unwrap_or_default();
    Err(RegistrarError::Status {
        status: status.as_u16(),
        body,
    })
}

#[async_trait]
impl ScheduleRegistrar for HttpScheduleRegistrar {
    async fn register(&self, app_id: &str, schedules: &Schedules) -> Result<(), RegistrarError> {
        let response = self.client.put(self.url(app_id)).json(schedules).send().await?;
        check(response).await?;
        debug!(%app_id, overrides = schedules.overrides.len(), "schedules registered");
        Ok(())
    }

    async fn unregister(&self, app_id: &str) -> Result<(), RegistrarError> {
        let response = self.client.delete(self.url(app_id)).send().await?;
        // Nothing registered is as good as removed.
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(());
        }
        check(response).await?;
        debug!(%app_id, "schedules unregistered");
        Ok(())
    }
}
