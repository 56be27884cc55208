//! Domain types for the autoscaler.
//!
//! These types represent aggregated metrics, metric history, scaling
//! policies (rules, bounds, schedules), and service bindings. All types are
//! serializable to/from JSON for storage in redb tables and for the HTTP
//! surfaces.

use std::fmt;
use std::str::FromStr;

use chrono::{FixedOffset, NaiveDate, NaiveDateTime, NaiveTime};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Unique identifier for an application.
pub type AppId = String;

// ── Metrics ───────────────────────────────────────────────────────

/// Unit of an instance metric value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Unit {
    Bytes,
    Percentage,
}

/// Kind of container metric.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetricName {
    Memory,
    Cpu,
    Disk,
}

impl MetricName {
    pub const ALL: [MetricName; 3] = [MetricName::Memory, MetricName::Cpu, MetricName::Disk];

    /// The unit every value of this metric kind is reported in.
    pub fn unit(self) -> Unit {
        match self {
            MetricName::Memory | MetricName::Disk => Unit::Bytes,
            MetricName::Cpu => Unit::Percentage,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            MetricName::Memory => "memory",
            MetricName::Cpu => "cpu",
            MetricName::Disk => "disk",
        }
    }
}

impl fmt::Display for MetricName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Error)]
#[error("unknown metric type: {0}")]
pub struct UnknownMetric(pub String);

impl FromStr for MetricName {
    type Err = UnknownMetric;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "memory" => Ok(MetricName::Memory),
            "cpu" => Ok(MetricName::Cpu),
            "disk" => Ok(MetricName::Disk),
            other => Err(UnknownMetric(other.to_string())),
        }
    }
}

/// One instance's reading for one metric kind.
///
/// `value` is a decimal string so it survives serialization boundaries
/// without float round-trip loss.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct InstanceMetric {
    pub index: u32,
    pub value: String,
    pub unit: Unit,
}

impl InstanceMetric {
    /// Parse the stored decimal string. `None` if it is not a number.
    pub fn numeric_value(&self) -> Option<f64> {
        self.value.parse().ok()
    }
}

/// Point-in-time snapshot of one metric kind across the live instances of
/// an application. Instance indices are unique; order is unspecified.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Metric {
    pub app_id: AppId,
    pub name: MetricName,
    pub instances: Vec<InstanceMetric>,
}

impl Metric {
    pub fn empty(app_id: &str, name: MetricName) -> Self {
        Self {
            app_id: app_id.to_string(),
            name,
            instances: Vec::new(),
        }
    }
}

/// Persisted history record: one per (app, instance, aggregation run).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AppInstanceMetric {
    pub app_id: AppId,
    pub instance_index: u32,
    /// When the aggregator ran.
    pub collected_at: i64,
    /// When the instance emitted the underlying sample.
    pub timestamp: i64,
    pub name: MetricName,
    pub unit: Unit,
    pub value: String,
}

impl AppInstanceMetric {
    /// Build the composite key for the metrics history table.
    pub fn table_key(&self) -> String {
        format!(
            "{}:{}:{:020}:{}",
            self.app_id, self.name, self.collected_at, self.instance_index
        )
    }
}

// ── Policy ────────────────────────────────────────────────────────

/// Default cooldown applied when a rule omits `cool_down_secs`.
pub const DEFAULT_COOL_DOWN_SECS: u64 = 300;

fn default_cool_down_secs() -> u64 {
    DEFAULT_COOL_DOWN_SECS
}

/// Inclusive min/max instance count.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstanceBounds {
    pub min: u32,
    pub max: u32,
}

impl InstanceBounds {
    /// Clamp a (possibly negative or oversized) candidate into the bounds.
    pub fn clamp(&self, candidate: i64) -> u32 {
        candidate.clamp(self.min as i64, self.max as i64) as u32
    }

    pub fn contains(&self, count: u32) -> bool {
        (self.min..=self.max).contains(&count)
    }
}

/// A tenant's scaling policy for one application.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScalingPolicy {
    pub instance_min_count: u32,
    pub instance_max_count: u32,
    /// Evaluated in order; the first firing rule wins.
    #[serde(default)]
    pub scaling_rules: Vec<ScalingRule>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schedules: Option<Schedules>,
}

impl ScalingPolicy {
    pub fn bounds(&self) -> InstanceBounds {
        InstanceBounds {
            min: self.instance_min_count,
            max: self.instance_max_count,
        }
    }

    pub fn has_schedules(&self) -> bool {
        self.schedules
            .as_ref()
            .is_some_and(|s| !s.overrides.is_empty())
    }
}

/// A threshold rule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScalingRule {
    pub metric_type: MetricName,
    pub threshold: f64,
    pub operator: Operator,
    pub adjustment: Adjustment,
    #[serde(default = "default_cool_down_secs")]
    pub cool_down_secs: u64,
    #[serde(default)]
    pub aggregation: Aggregation,
}

/// Breach comparison between an observed value and a rule threshold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Operator {
    #[serde(rename = ">")]
    Gt,
    #[serde(rename = "<")]
    Lt,
    #[serde(rename = ">=")]
    Ge,
    #[serde(rename = "<=")]
    Le,
}

impl Operator {
    /// Whether `value <op> threshold` holds.
    pub fn holds(self, value: f64, threshold: f64) -> bool {
        match self {
            Operator::Gt => value > threshold,
            Operator::Lt => value < threshold,
            Operator::Ge => value >= threshold,
            Operator::Le => value <= threshold,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Operator::Gt => ">",
            Operator::Lt => "<",
            Operator::Ge => ">=",
            Operator::Le => "<=",
        }
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How a firing rule changes the instance count.
///
/// String form: `+N` / `-N` (delta), `+N%` / `-N%` (percentage of the
/// current count, rounded up), bare `N` (absolute target).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Adjustment {
    Delta(i64),
    Percent(i64),
    Exact(u32),
}

impl Adjustment {
    /// Unclamped candidate instance count for a given current count.
    ///
    /// Saturates at the `i64` range; the caller clamps into bounds.
    pub fn apply(&self, current: u32) -> i64 {
        match *self {
            Adjustment::Delta(d) => i64::from(current).saturating_add(d),
            Adjustment::Percent(p) => {
                (current as f64 * (1.0 + p as f64 / 100.0)).ceil() as i64
            }
            Adjustment::Exact(n) => n as i64,
        }
    }
}

#[derive(Debug, Clone, Error)]
#[error("invalid adjustment '{0}': expected +N, -N, +N%, -N% or N")]
pub struct AdjustmentParseError(pub String);

impl FromStr for Adjustment {
    type Err = AdjustmentParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let err = || AdjustmentParseError(s.to_string());
        let trimmed = s.trim();
        let signed = trimmed.starts_with('+') || trimmed.starts_with('-');

        if let Some(pct) = trimmed.strip_suffix('%') {
            if !signed {
                return Err(err());
            }
            return pct.parse::<i64>().map(Adjustment::Percent).map_err(|_| err());
        }
        if signed {
            trimmed.parse::<i64>().map(Adjustment::Delta).map_err(|_| err())
        } else {
            trimmed.parse::<u32>().map(Adjustment::Exact).map_err(|_| err())
        }
    }
}

impl TryFrom<String> for Adjustment {
    type Error = AdjustmentParseError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<Adjustment> for String {
    fn from(a: Adjustment) -> Self {
        a.to_string()
    }
}

impl fmt::Display for Adjustment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Adjustment::Delta(d) => write!(f, "{d:+}"),
            Adjustment::Percent(p) => write!(f, "{p:+}%"),
            Adjustment::Exact(n) => write!(f, "{n}"),
        }
    }
}

/// How per-instance values are combined before the threshold comparison.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Aggregation {
    /// Mean over all instances.
    #[default]
    Avg,
    /// Fires when at least `ratio` of the instances breach individually.
    Proportion { ratio: f64 },
}

// ── Schedules ─────────────────────────────────────────────────────

/// Time-based overrides of a policy's static bounds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Schedules {
    /// Fixed UTC offset (`"+08:00"`, `"-05:30"`) or `"UTC"`.
    pub timezone: String,
    #[serde(default)]
    pub overrides: Vec<ScheduledOverride>,
}

impl Schedules {
    pub fn utc_offset(&self) -> Option<FixedOffset> {
        parse_utc_offset(&self.timezone)
    }
}

/// Parse `"UTC"`, `"Z"` or a `±HH:MM` offset.
pub fn parse_utc_offset(s: &str) -> Option<FixedOffset> {
    let s = s.trim();
    if s.eq_ignore_ascii_case("utc") || s == "Z" {
        return FixedOffset::east_opt(0);
    }
    let sign = match s.as_bytes().first()? {
        b'+' => 1,
        b'-' => -1,
        _ => return None,
    };
    let (hours, mins) = s[1..].split_once(':')?;
    if hours.len() != 2 || mins.len() != 2 {
        return None;
    }
    let hours: i32 = hours.parse().ok()?;
    let mins: i32 = mins.parse().ok()?;
    if hours > 14 || mins > 59 {
        return None;
    }
    FixedOffset::east_opt(sign * (hours * 3600 + mins * 60))
}

/// Replaces the static bounds while its window is active.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScheduledOverride {
    pub window: ActiveWindow,
    pub instance_min_count: u32,
    pub instance_max_count: u32,
}

impl ScheduledOverride {
    pub fn bounds(&self) -> InstanceBounds {
        InstanceBounds {
            min: self.instance_min_count,
            max: self.instance_max_count,
        }
    }
}

/// When a scheduled override applies, in the schedule's local time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ActiveWindow {
    /// One-off window, `[start, end)`.
    SpecificDate {
        start: NaiveDateTime,
        end: NaiveDateTime,
    },
    /// Daily `[start_time, end_time)` on matching days, optionally limited
    /// to an inclusive date range.
    Recurring {
        start_time: NaiveTime,
        end_time: NaiveTime,
        recurrence: Recurrence,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        start_date: Option<NaiveDate>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        end_date: Option<NaiveDate>,
    },
}

/// Which days a recurring window fires on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Recurrence {
    /// ISO weekdays, Monday = 1 … Sunday = 7.
    DaysOfWeek(Vec<u8>),
    DaysOfMonth(Vec<u8>),
}

// ── Policy records & bindings ─────────────────────────────────────

/// Lifecycle of a stored policy during a bind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PolicyStatus {
    /// Written, waiting for downstream schedule registration.
    Pending,
    /// Visible to the decision engine.
    Active,
}

/// A stored policy plus its saga status.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PolicyRecord {
    pub app_id: AppId,
    pub policy: ScalingPolicy,
    pub status: PolicyStatus,
    /// Unix timestamp (seconds) of the last write.
    pub updated_at: u64,
}

/// A service binding attaching a policy to an application.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BindingRecord {
    pub binding_id: String,
    pub service_instance_id: String,
    pub app_id: AppId,
    pub created_at: u64,
}
