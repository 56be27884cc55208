//! Binding lifecycle: attach and detach an application's scaling policy.
//!
//! Bind is a small saga over the policy store and the schedule registrar:
//!
//! ```text
//! validate ─✗→ ValidationError (no writes, no registrar call)
//!    │
//! persist PolicyRecord{Pending}
//!    │
//! sync schedules ─✗→ restore previous record, UpstreamUnavailable
//!    │   (register the new ones, or unregister the replaced policy's)
//!    │
//! PolicyRecord{Active} + BindingRecord
//! ```
//!
//! Pending records are never visible to the decision engine.

use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use serde_json::Value;
use tracing::{debug, info, warn};

use autoscaler_state::{BindingRecord, PolicyRecord, PolicyStatus, StateStore};

use crate::error::BrokerResult;
use crate::registrar::ScheduleRegistrar;
use crate::validation::validate_policy;

pub struct BindingService {
    store: StateStore,
    registrar: Arc<dyn ScheduleRegistrar>,
}

impl BindingService {
    pub fn new(store: StateStore, registrar: Arc<dyn ScheduleRegistrar>) -> Self {
        Self { store, registrar }
    }

    /// Attach `raw_policy` to `app_id`.
    ///
    /// Rebinding replaces the existing policy. Schedules of the replaced
    /// policy are unregistered when the new one has none; if the scheduler
    /// call fails the previous policy is restored.
    pub async fn bind(
        &self,
        service_instance_id: &str,
        binding_id: &str,
        app_id: &str,
        raw_policy: &Value,
    ) -> BrokerResult<BindingRecord> {
        let policy = validate_policy(raw_policy)?;
        let previous = self.store.get_policy_record(app_id)?;

        let mut record = PolicyRecord {
            app_id: app_id.to_string(),
            policy,
            status: PolicyStatus::Pending,
            updated_at: epoch_secs(),
        };
        self.store.put_policy(&record)?;
        debug!(%app_id, %binding_id, "policy pending");

        let had_schedules = previous.as_ref().is_some_and(|p| p.policy.has_schedules());
        let registered = match &record.policy.schedules {
            Some(schedules) if record.policy.has_schedules() => {
                self.registrar.register(app_id, schedules).await
            }
            // The replacement drops every schedule the old policy armed.
            _ if had_schedules => self.registrar.unregister(app_id).await,
            _ => Ok(()),
        };
        if let Err(e) = registered {
            warn!(%app_id, %binding_id, error = %e, "schedule update failed, rolling back");
            match previous {
                Some(prev) => self.store.put_policy(&prev)?,
                None => {
                    self.store.delete_policy(app_id)?;
                }
            }
            return Err(e.into());
        }

        record.status = PolicyStatus::Active;
        self.store.put_policy(&record)?;

        let binding = BindingRecord {
            binding_id: binding_id.to_string(),
            service_instance_id: service_instance_id.to_string(),
            app_id: app_id.to_string(),
            created_at: record.updated_at,
        };
        self.store.put_binding(&binding)?;
        info!(%app_id, %binding_id, %service_instance_id, "policy bound");
        Ok(binding)
    }

    /// Detach the policy of `app_id`.
    ///
    /// Succeeds when no policy exists. When schedule removal fails the
    /// policy is already gone but the binding record is kept so the
    /// unbind can be retried.
    pub async fn unbind(
        &self,
        service_instance_id: &str,
        binding_id: &str,
        app_id: &str,
    ) -> BrokerResult<()> {
        let Some(record) = self.store.get_policy_record(app_id)? else {
            self.store.delete_binding(binding_id)?;
            debug!(%app_id, %binding_id, "no policy to detach");
            return Ok(());
        };

        self.store.delete_policy(app_id)?;
        if record.policy.has_schedules()
            && let Err(e) = self.registrar.unregister(app_id).await
        {
            warn!(%app_id, %binding_id, error = %e, "schedule removal failed");
            return Err(e.into());
        }

        self.store.delete_binding(binding_id)?;
        info!(%app_id, %binding_id, %service_instance_id, "policy unbound");
        Ok(())
    }

    pub fn store(&self) -> &StateStore {
        &self.store
    }
}

fn epoch_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}
