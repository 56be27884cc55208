//! Collaborator traits the decision engine depends on.
//!
//! Each external system (policy store, schedule registry, metrics, the
//! scaling engine) sits behind a trait so the engine can be driven by
//! in-memory fakes in tests and by the store, the collector and HTTP
//! clients in the daemon.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tracing::debug;

use autoscaler_metrics::MetricsCollector;
use autoscaler_state::{AppId, Metric, MetricName, ScalingPolicy, ScheduledOverride, StateStore};

use crate::error::{EngineError, EngineResult};

/// Source of active scaling policies.
#[async_trait]
pub trait PolicySource: Send + Sync {
    /// The active policy for `app_id`; `None` when the app has none.
    async fn get_policy(&self, app_id: &str) -> EngineResult<Option<ScalingPolicy>>;

    /// Applications with an active policy.
    async fn list_apps(&self) -> EngineResult<Vec<AppId>>;
}

/// Source of schedule overrides.
#[async_trait]
pub trait ScheduleSource: Send + Sync {
    async fn active_override(
        &self,
        app_id: &str,
        now: DateTime<Utc>,
    ) -> EngineResult<Option<ScheduledOverride>>;
}

/// Source of the latest metric snapshots.
#[async_trait]
pub trait MetricsSource: Send + Sync {
    async fn latest(&self, app_id: &str, name: MetricName) -> Option<Metric>;
}

/// Client of the component that actually changes instance counts.
#[async_trait]
pub trait ScalingClient: Send + Sync {
    async fn instance_count(&self, app_id: &str) -> EngineResult<u32>;

    async fn set_instance_count(&self, app_id: &str, target: u32) -> EngineResult<()>;
}

fn upstream(e: autoscaler_state::StateError) -> EngineError {
    EngineError::Upstream(e.to_string())
}

#[async_trait]
impl PolicySource for StateStore {
    async fn get_policy(&self, app_id: &str) -> EngineResult<Option<ScalingPolicy>> {
        let policy = self.get_active_policy(app_id).map_err(upstream)?;
        if policy.is_none() {
            debug!(%app_id, "no active policy");
        }
        Ok(policy)
    }

    async fn list_apps(&self) -> EngineResult<Vec<AppId>> {
        self.list_active_app_ids().map_err(upstream)
    }
}

/// Resolves overrides from the schedules stored with the active policy.
#[async_trait]
impl ScheduleSource for StateStore {
    async fn active_override(
        &self,
        app_id: &str,
        now: DateTime<Utc>,
    ) -> EngineResult<Option<ScheduledOverride>> {
        let policy = self.get_active_policy(app_id).map_err(upstream)?;
        Ok(policy
            .as_ref()
            .and_then(|p| p.schedules.as_ref())
            .and_then(|s| s.active_override(now))
            .cloned())
    }
}

#[async_trait]
impl MetricsSource for MetricsCollector {
    async fn latest(&self, app_id: &str, name: MetricName) -> Option<Metric> {
        MetricsCollector::latest(self, app_id, name).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use autoscaler_state::{
        ActiveWindow, PolicyRecord, PolicyStatus, Recurrence, ScheduledOverride, Schedules,
    };
    use chrono::{NaiveTime, TimeZone};

    fn policy_with_schedule() -> ScalingPolicy {
        ScalingPolicy {
            instance_min_count: 1,
            instance_max_count: 4,
            scaling_rules: vec![],
            schedules: Some(Schedules {
                timezone: "UTC".to_string(),
                overrides: vec![ScheduledOverride {
                    window: ActiveWindow::Recurring {
                        start_time: NaiveTime::from_hms_opt(0, 0, 0).unwrap(),
                        end_time: NaiveTime::from_hms_opt(23, 59, 0).unwrap(),
                        recurrence: Recurrence::DaysOfWeek(vec![1, 2, 3, 4, 5, 6, 7]),
                        start_date: None,
                        end_date: None,
                    },
                    instance_min_count: 3,
                    instance_max_count: 6,
                }],
            }),
        }
    }

    fn put(store: &StateStore, app_id: &str, status: PolicyStatus) {
        store
            .put_policy(&PolicyRecord {
                app_id: app_id.to_string(),
                policy: policy_with_schedule(),
                status,
                updated_at: 1,
            })
            .unwrap();
    }

    #[tokio::test]
    async fn store_policy_source_hides_pending() {
        let store = StateStore::open_in_memory().unwrap();
        put(&store, "active", PolicyStatus::Active);
        put(&store, "pending", PolicyStatus::Pending);

        assert!(PolicySource::get_policy(&store, "active").await.unwrap().is_some());
        assert!(PolicySource::get_policy(&store, "pending").await.unwrap().is_none());
        assert!(PolicySource::get_policy(&store, "missing").await.unwrap().is_none());
        assert_eq!(store.list_apps().await.unwrap(), vec!["active".to_string()]);
    }

    #[tokio::test]
    async fn store_schedule_source_resolves_override() {
        let store = StateStore::open_in_memory().unwrap();
        put(&store, "app", PolicyStatus::Active);

        let now = Utc.with_ymd_and_hms(2026, 3, 2, 12, 0, 0).unwrap();
        let active = ScheduleSource::active_override(&store, "app", now)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(active.instance_max_count, 6);
        assert!(
            ScheduleSource::active_override(&store, "other", now)
                .await
                .unwrap()
                .is_none()
        );
    }
}
