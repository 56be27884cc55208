//! Scaling decision engine.
//!
//! One evaluation cycle per application: resolve the effective bounds,
//! evaluate rules against the latest snapshots, check the cooldown and
//! dispatch the new instance count to the scaling engine.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::{Semaphore, watch};
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use autoscaler_state::{AppId, Metric, MetricName};

use crate::cooldown::{CooldownResult, CooldownTracker};
use crate::error::{EngineError, EngineResult};
use crate::rules::{self, NoActionReason, Verdict};
use crate::sources::{MetricsSource, PolicySource, ScalingClient, ScheduleSource};

/// A scaling decision for a single application.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScalingDecision {
    NoAction { reason: NoActionReason },
    CooldownBlocked { remaining_secs: u64 },
    /// The cooldown was taken and the new count dispatched.
    ActionPending { from: u32, to: u32 },
}

/// What one evaluation cycle did.
#[derive(Debug)]
pub struct CycleOutcome {
    pub app_id: AppId,
    pub decision: ScalingDecision,
    /// Set when an `ActionPending` dispatch failed or timed out.
    pub dispatch_error: Option<EngineError>,
}

#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Time between evaluation passes.
    pub interval: Duration,
    /// Maximum applications evaluated at once.
    pub max_concurrency: usize,
    /// Upper bound on a single scale dispatch.
    pub dispatch_timeout: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(30),
            max_concurrency: 16,
            dispatch_timeout: Duration::from_secs(10),
        }
    }
}

/// Evaluates scaling policies and drives the scaling engine.
pub struct ScalingDecisionEngine {
    policies: Arc<dyn PolicySource>,
    schedules: Arc<dyn ScheduleSource>,
    metrics: Arc<dyn MetricsSource>,
    scaling: Arc<dyn ScalingClient>,
    cooldowns: CooldownTracker,
    config: EngineConfig,
}

impl ScalingDecisionEngine {
    pub fn new(
        policies: Arc<dyn PolicySource>,
        schedules: Arc<dyn ScheduleSource>,
        metrics: Arc<dyn MetricsSource>,
        scaling: Arc<dyn ScalingClient>,
        config: EngineConfig,
    ) -> Self {
        Self {
            policies,
            schedules,
            metrics,
            scaling,
            cooldowns: CooldownTracker::new(),
            config,
        }
    }

    pub fn cooldowns(&self) -> &CooldownTracker {
        &self.cooldowns
    }

    /// Run one evaluation cycle for `app_id`.
    ///
    /// Lookup failures return `Err` and skip the cycle. A failed dispatch is
    /// not an error: it is reported in the outcome and the cooldown stays
    /// taken, so the next attempt waits for the next eligible cycle.
    pub async fn evaluate_app(
        &self,
        app_id: &str,
        now: DateTime<Utc>,
    ) -> EngineResult<CycleOutcome> {
        let outcome = |decision| CycleOutcome {
            app_id: app_id.to_string(),
            decision,
            dispatch_error: None,
        };

        let Some(policy) = self.policies.get_policy(app_id).await? else {
            return Ok(outcome(ScalingDecision::NoAction {
                reason: NoActionReason::NoPolicy,
            }));
        };

        let bounds = match self.schedules.active_override(app_id, now).await? {
            Some(o) => {
                debug!(
                    %app_id,
                    min = o.instance_min_count,
                    max = o.instance_max_count,
                    "schedule override active"
                );
                o.bounds()
            }
            None => policy.bounds(),
        };

        let mut snapshots: HashMap<MetricName, Metric> = HashMap::new();
        for rule in &policy.scaling_rules {
            if snapshots.contains_key(&rule.metric_type) {
                continue;
            }
            if let Some(metric) = self.metrics.latest(app_id, rule.metric_type).await {
                snapshots.insert(rule.metric_type, metric);
            }
        }
        if snapshots.values().all(|m| m.instances.is_empty()) {
            return Ok(outcome(ScalingDecision::NoAction {
                reason: NoActionReason::NoMetrics,
            }));
        }

        let current = self.scaling.instance_count(app_id).await?;

        let (from, to, rule_index, cool_down_secs) =
            match rules::decide(&policy, bounds, current, &snapshots) {
                Verdict::NoAction(reason) => {
                    debug!(%app_id, current, ?reason, "no scaling action");
                    return Ok(outcome(ScalingDecision::NoAction { reason }));
                }
                Verdict::Scale {
                    from,
                    to,
                    rule_index,
                    cool_down_secs,
                } => (from, to, rule_index, cool_down_secs),
            };

        let now_secs = u64::try_from(now.timestamp()).unwrap_or(0);
        if let CooldownResult::Blocked { remaining_secs } = self
            .cooldowns
            .try_acquire(app_id, cool_down_secs, now_secs)
            .await
        {
            debug!(%app_id, from, to, remaining_secs, "scaling blocked by cooldown");
            return Ok(outcome(ScalingDecision::CooldownBlocked { remaining_secs }));
        }

        info!(%app_id, from, to, rule = rule_index, "scaling");
        let mut result = outcome(ScalingDecision::ActionPending { from, to });
        result.dispatch_error = self.dispatch(app_id, to).await.err();
        if let Some(e) = &result.dispatch_error {
            warn!(%app_id, to, error = %e, "scaling action failed");
        }
        Ok(result)
    }

    async fn dispatch(&self, app_id: &str, target: u32) -> EngineResult<()> {
        match tokio::time::timeout(
            self.config.dispatch_timeout,
            self.scaling.set_instance_count(app_id, target),
        )
        .await
        {
            Ok(Ok(())) => Ok(()),
            Ok(Err(EngineError::Dispatch(msg))) => Err(EngineError::Dispatch(msg)),
            Ok(Err(other)) => Err(EngineError::Dispatch(other.to_string())),
            Err(_) => Err(EngineError::Timeout(self.config.dispatch_timeout)),
        }
    }

    /// Evaluate several applications concurrently.
    ///
    /// At most `max_concurrency` cycles run at once; one application's
    /// failure never affects another's.
    pub async fn evaluate_all(
        self: &Arc<Self>,
        app_ids: Vec<AppId>,
        now: DateTime<Utc>,
    ) -> Vec<(AppId, EngineResult<CycleOutcome>)> {
        let semaphore = Arc::new(Semaphore::new(self.config.max_concurrency.max(1)));
        let mut join_set = JoinSet::new();

        for app_id in app_ids {
            let engine = Arc::clone(self);
            let semaphore = Arc::clone(&semaphore);
            join_set.spawn(async move {
                let result = match semaphore.acquire().await {
                    Ok(_permit) => engine.evaluate_app(&app_id, now).await,
                    Err(e) => Err(EngineError::Upstream(format!("evaluator closed: {e}"))),
                };
                (app_id, result)
            });
        }

        let mut results = Vec::new();
        while let Some(joined) = join_set.join_next().await {
            match joined {
                Ok(r) => results.push(r),
                Err(e) => error!(error = %e, "evaluation task panicked"),
            }
        }
        results
    }

    /// One pass over every application with an active policy.
    ///
    /// Cooldowns of applications whose policy was detached are dropped
    /// first, so a later rebind starts fresh.
    pub async fn evaluate_active(
        self: &Arc<Self>,
    ) -> EngineResult<Vec<(AppId, EngineResult<CycleOutcome>)>> {
        let apps = self.policies.list_apps().await?;
        let forgotten = self.cooldowns.retain_apps(&apps).await;
        if forgotten > 0 {
            debug!(forgotten, "cooldowns of detached apps dropped");
        }
        let results = self.evaluate_all(apps, Utc::now()).await;
        for (app_id, result) in &results {
            if let Err(e) = result {
                warn!(%app_id, error = %e, "evaluation skipped");
            }
        }
        Ok(results)
    }

    /// Run the evaluation loop until shutdown.
    ///
    /// A pass that is already running completes before the loop exits.
    pub async fn run(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) {
        info!(
            interval_secs = self.config.interval.as_secs(),
            max_concurrency = self.config.max_concurrency,
            "decision engine started"
        );

        loop {
            tokio::select! {
                _ = tokio::time::sleep(self.config.interval) => {
                    if let Err(e) = self.evaluate_active().await {
                        error!(error = %e, "evaluation pass failed");
                    }
                }
                _ = shutdown.changed() => {
                    info!("decision engine shutting down");
                    break;
                }
            }
        }
    }
}
