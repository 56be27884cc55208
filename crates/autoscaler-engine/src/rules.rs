//! Rule breach evaluation and the pure scaling decision.

use std::collections::HashMap;

use autoscaler_state::{Aggregation, InstanceBounds, Metric, MetricName, ScalingPolicy, ScalingRule};

/// Why a cycle ended without a scaling action.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoActionReason {
    /// The application has no active policy.
    NoPolicy,
    /// None of the rules' metrics has any instance reading.
    NoMetrics,
    /// Metrics exist but no rule breached its threshold.
    NoRuleFired,
    /// A rule fired but clamping to the bounds left the count unchanged.
    WithinBounds,
}

/// Result of the side-effect-free part of a cycle.
#[derive(Debug, Clone, PartialEq)]
pub enum Verdict {
    NoAction(NoActionReason),
    Scale {
        from: u32,
        to: u32,
        rule_index: usize,
        cool_down_secs: u64,
    },
}

/// Observed value for `rule` if it breaches, `None` otherwise.
///
/// For `Avg` the value is the mean across instances; for `Proportion` it is
/// the fraction of instances that breach individually. Readings that do not
/// parse as numbers are ignored; an empty snapshot never breaches.
pub fn breach(rule: &ScalingRule, metric: &Metric) -> Option<f64> {
    let values: Vec<f64> = metric
        .instances
        .iter()
        .filter_map(|i| i.numeric_value())
        .collect();
    if values.is_empty() {
        return None;
    }

    match rule.aggregation {
        Aggregation::Avg => {
            let avg = values.iter().sum::<f64>() / values.len() as f64;
            rule.operator.holds(avg, rule.threshold).then_some(avg)
        }
        Aggregation::Proportion { ratio } => {
            let breaching = values
                .iter()
                .filter(|&&v| rule.operator.holds(v, rule.threshold))
                .count();
            let fraction = breaching as f64 / values.len() as f64;
            (fraction >= ratio).then_some(fraction)
        }
    }
}

/// Decide a candidate instance count from a policy and the latest snapshots.
///
/// Rules are checked in policy order and the first breach wins; its
/// adjustment is applied to `current` and clamped to `bounds`.
pub fn decide(
    policy: &ScalingPolicy,
    bounds: InstanceBounds,
    current: u32,
    snapshots: &HashMap<MetricName, Metric>,
) -> Verdict {
    let mut any_metrics = false;

    for (rule_index, rule) in policy.scaling_rules.iter().enumerate() {
        let Some(metric) = snapshots.get(&rule.metric_type) else {
            continue;
        };
        if !metric.instances.is_empty() {
            any_metrics = true;
        }
        if breach(rule, metric).is_none() {
            continue;
        }

        let to = bounds.clamp(rule.adjustment.apply(current));
        if to == current {
            return Verdict::NoAction(NoActionReason::WithinBounds);
        }
        return Verdict::Scale {
            from: current,
            to,
            rule_index,
            cool_down_secs: rule.cool_down_secs,
        };
    }

    if any_metrics {
        Verdict::NoAction(NoActionReason::NoRuleFired)
    } else {
        Verdict::NoAction(NoActionReason::NoMetrics)
    }
}
