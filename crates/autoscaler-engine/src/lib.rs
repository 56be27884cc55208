//! autoscaler-engine — policy-driven scaling decisions.
//!
//! Reads the latest metric snapshots, evaluates an application's threshold
//! rules against them and, subject to instance bounds, schedule overrides
//! and a per-application cooldown, sets a new instance count through the
//! scaling engine.
//!
//! # Evaluation cycle
//!
//! ```text
//! policy   = PolicySource::get_policy(app)          (none → NoAction)
//! bounds   = active schedule override ?: policy bounds
//! snapshot = MetricsSource::latest(app, rule.metric) per rule metric
//!
//! for rule in policy.scaling_rules (in order):
//!     if breach(rule, snapshot):
//!         to = clamp(rule.adjustment.apply(current), bounds)
//!         to == current → NoAction(WithinBounds)
//!         cooldown held → CooldownBlocked
//!         else          → ActionPending, dispatch set_instance_count(app, to)
//! no breach → NoAction(NoRuleFired)
//! ```
//!
//! The cooldown is recorded before dispatch and is never rolled back, so a
//! failed dispatch is retried only once the cooldown elapses.

pub mod cooldown;
pub mod engine;
pub mod error;
pub mod rules;
pub mod sources;

pub use cooldown::{CooldownResult, CooldownTracker};
pub use engine::{CycleOutcome, EngineConfig, ScalingDecision, ScalingDecisionEngine};
pub use error::{EngineError, EngineResult};
pub use rules::{NoActionReason, Verdict};
pub use sources::{MetricsSource, PolicySource, ScalingClient, ScheduleSource};
