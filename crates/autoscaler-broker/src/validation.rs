//! Policy validation with structured errors.
//!
//! The raw policy JSON is checked field by field before it is
//! deserialized, so every violation is reported at once with the path of
//! the offending property (`instance.scaling_rules[0].cool_down_secs`).

use std::fmt;

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use autoscaler_state::{Adjustment, MetricName, ScalingPolicy, parse_utc_offset};

pub const MIN_COOL_DOWN_SECS: i64 = 60;
pub const MAX_COOL_DOWN_SECS: i64 = 3600;

/// Largest `+N` / `-N` step or `N` absolute target.
pub const MAX_ADJUSTMENT_STEP: i64 = 1000;
/// Percentage adjustments must lie in `-100%..=+1000%`.
pub const MIN_ADJUSTMENT_PERCENT: i64 = -100;
pub const MAX_ADJUSTMENT_PERCENT: i64 = 1000;

const OPERATORS: [&str; 4] = [">", "<", ">=", "<="];

/// One violation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationError {
    /// Path of the offending property, rooted at `instance`.
    pub property: String,
    pub message: String,
    /// The offending value.
    pub instance: Value,
    /// `property` and `message` joined, for log lines.
    pub stack: String,
}

/// Every violation found in one policy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ValidationErrors(pub Vec<ValidationError>);

impl fmt::Display for ValidationErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let stacks: Vec<&str> = self.0.iter().map(|e| e.stack.as_str()).collect();
        write!(f, "invalid policy: {}", stacks.join("; "))
    }
}

impl std::error::Error for ValidationErrors {}

#[derive(Default)]
struct Validator {
    errors: Vec<ValidationError>,
}

impl Validator {
    fn error(&mut self, property: impl Into<String>, message: impl Into<String>, instance: &Value) {
        let property = property.into();
        let message = message.into();
        self.errors.push(ValidationError {
            stack: format!("{property} {message}"),
            property,
            message,
            instance: instance.clone(),
        });
    }

    /// A required integer `>= min`. Returns the value when it is usable.
    fn count(
        &mut self,
        obj: &Map<String, Value>,
        parent: &str,
        key: &str,
        min: i64,
    ) -> Option<i64> {
        let path = format!("{parent}.{key}");
        let Some(value) = obj.get(key) else {
            self.error(parent, format!("requires property \"{key}\""), &Value::Object(obj.clone()));
            return None;
        };
        let Some(n) = value.as_i64() else {
            self.error(path, "is not of a type(s) integer", value);
            return None;
        };
        if n < min {
            self.error(path, format!("must have a minimum value of {min}"), value);
            return None;
        }
        Some(n)
    }

    fn bounds(&mut self, obj: &Map<String, Value>, parent: &str) {
        let min = self.count(obj, parent, "instance_min_count", 1);
        let max = self.count(obj, parent, "instance_max_count", 1);
        if let (Some(min), Some(max)) = (min, max)
            && min > max
        {
            let pair = serde_json::json!({
                "instance_min_count": min,
                "instance_max_count": max,
            });
            self.error(
                parent,
                "instance_min_count must be less than or equal to instance_max_count",
                &pair,
            );
        }
    }

    fn rule(&mut self, rule: &Value, path: &str) {
        let Some(obj) = rule.as_object() else {
            self.error(path, "is not of a type(s) object", rule);
            return;
        };

        match obj.get("metric_type") {
            None => self.error(path, "requires property \"metric_type\"", rule),
            Some(v) => {
                if v.as_str().and_then(|s| s.parse::<MetricName>().ok()).is_none() {
                    self.error(
                        format!("{path}.metric_type"),
                        "is not one of enum values: memory,cpu,disk",
                        v,
                    );
                }
            }
        }

        match obj.get("threshold") {
            None => self.error(path, "requires property \"threshold\"", rule),
            Some(v) if !v.is_number() => {
                self.error(format!("{path}.threshold"), "is not of a type(s) number", v)
            }
            Some(_) => {}
        }

        match obj.get("operator") {
            None => self.error(path, "requires property \"operator\"", rule),
            Some(v) => {
                if !v.as_str().is_some_and(|s| OPERATORS.contains(&s)) {
                    self.error(
                        format!("{path}.operator"),
                        "is not one of enum values: >,<,>=,<=",
                        v,
                    );
                }
            }
        }

        match obj.get("adjustment") {
            None => self.error(path, "requires property \"adjustment\"", rule),
            Some(v) => match v.as_str().and_then(|s| s.parse::<Adjustment>().ok()) {
                None => self.error(
                    format!("{path}.adjustment"),
                    "does not match pattern +N, -N, +N%, -N% or N",
                    v,
                ),
                Some(adjustment) => {
                    if let Some(message) = adjustment_out_of_range(adjustment) {
                        self.error(format!("{path}.adjustment"), message, v);
                    }
                }
            },
        }

        if let Some(v) = obj.get("cool_down_secs") {
            let prop = format!("{path}.cool_down_secs");
            match v.as_i64() {
                None => self.error(prop, "is not of a type(s) integer", v),
                Some(n) if n < MIN_COOL_DOWN_SECS => self.error(
                    prop,
                    format!("must have a minimum value of {MIN_COOL_DOWN_SECS}"),
                    v,
                ),
                Some(n) if n > MAX_COOL_DOWN_SECS => self.error(
                    prop,
                    format!("must have a maximum value of {MAX_COOL_DOWN_SECS}"),
                    v,
                ),
                Some(_) => {}
            }
        }

        if let Some(agg) = obj.get("aggregation") {
            self.aggregation(agg, &format!("{path}.aggregation"));
        }
    }

    fn aggregation(&mut self, agg: &Value, path: &str) {
        match agg.get("type").and_then(Value::as_str) {
            Some("avg") => {}
            Some("proportion") => {
                let ratio = agg.get("ratio").and_then(Value::as_f64);
                if !ratio.is_some_and(|r| r > 0.0 && r <= 1.0) {
                    self.error(
                        format!("{path}.ratio"),
                        "must be greater than 0 and at most 1",
                        agg.get("ratio").unwrap_or(&Value::Null),
                    );
                }
            }
            _ => self.error(
                format!("{path}.type"),
                "is not one of enum values: avg,proportion",
                agg.get("type").unwrap_or(agg),
            ),
        }
    }

    fn schedules(&mut self, schedules: &Value, path: &str) {
        let Some(obj) = schedules.as_object() else {
            self.error(path, "is not of a type(s) object", schedules);
            return;
        };

        match obj.get("timezone") {
            None => self.error(path, "requires property \"timezone\"", schedules),
            Some(tz) => {
                if tz.as_str().and_then(parse_utc_offset).is_none() {
                    self.error(
                        format!("{path}.timezone"),
                        "is not a supported timezone (UTC or ±HH:MM)",
                        tz,
                    );
                }
            }
        }

        let Some(overrides) = obj.get("overrides") else {
            return;
        };
        let Some(overrides) = overrides.as_array() else {
            self.error(format!("{path}.overrides"), "is not of a type(s) array", overrides);
            return;
        };

        let mut specific: Vec<(usize, NaiveDateTime, NaiveDateTime)> = Vec::new();
        for (i, o) in overrides.iter().enumerate() {
            let opath = format!("{path}.overrides[{i}]");
            let Some(oobj) = o.as_object() else {
                self.error(opath, "is not of a type(s) object", o);
                continue;
            };
            self.bounds(oobj, &opath);

            let wpath = format!("{opath}.window");
            let Some(window) = oobj.get("window") else {
                self.error(opath, "requires property \"window\"", o);
                continue;
            };
            match window.get("type").and_then(Value::as_str) {
                Some("specific_date") => {
                    if let Some((start, end)) = self.specific_window(window, &wpath) {
                        specific.push((i, start, end));
                    }
                }
                Some("recurring") => self.recurring_window(window, &wpath),
                _ => self.error(
                    format!("{wpath}.type"),
                    "is not one of enum values: specific_date,recurring",
                    window.get("type").unwrap_or(window),
                ),
            }
        }

        specific.sort_by_key(|&(_, start, _)| start);
        for pair in specific.windows(2) {
            let (prev_idx, _, prev_end) = pair[0];
            let (idx, start, _) = pair[1];
            if start < prev_end {
                self.error(
                    format!("{path}.overrides[{idx}].window"),
                    format!("overlaps with overrides[{prev_idx}]"),
                    &overrides[idx]["window"],
                );
            }
        }
    }

    fn parsed<T>(
        &mut self,
        window: &Value,
        path: &str,
        key: &str,
        parse: impl Fn(&str) -> Option<T>,
        expected: &str,
    ) -> Option<T> {
        let Some(v) = window.get(key) else {
            self.error(path, format!("requires property \"{key}\""), window);
            return None;
        };
        let parsed = v.as_str().and_then(parse);
        if parsed.is_none() {
            self.error(format!("{path}.{key}"), format!("is not a valid {expected}"), v);
        }
        parsed
    }

    fn specific_window(
        &mut self,
        window: &Value,
        path: &str,
    ) -> Option<(NaiveDateTime, NaiveDateTime)> {
        let parse = |s: &str| s.parse::<NaiveDateTime>().ok();
        let start = self.parsed(window, path, "start", parse, "date-time");
        let end = self.parsed(window, path, "end", parse, "date-time");
        let (start, end) = (start?, end?);
        if start >= end {
            self.error(path, "start must be before end", window);
            return None;
        }
        Some((start, end))
    }

    fn recurring_window(&mut self, window: &Value, path: &str) {
        let parse_time = |s: &str| s.parse::<NaiveTime>().ok();
        let start = self.parsed(window, path, "start_time", parse_time, "time");
        let end = self.parsed(window, path, "end_time", parse_time, "time");
        if let (Some(start), Some(end)) = (start, end)
            && start >= end
        {
            self.error(path, "start_time must be before end_time", window);
        }

        let parse_date = |s: &str| s.parse::<NaiveDate>().ok();
        let start_date = window
            .get("start_date")
            .and_then(|_| self.parsed(window, path, "start_date", parse_date, "date"));
        let end_date = window
            .get("end_date")
            .and_then(|_| self.parsed(window, path, "end_date", parse_date, "date"));
        if let (Some(s), Some(e)) = (start_date, end_date)
            && s > e
        {
            self.error(path, "start_date must not be after end_date", window);
        }

        let rpath = format!("{path}.recurrence");
        let Some(recurrence) = window.get("recurrence") else {
            self.error(path, "requires property \"recurrence\"", window);
            return;
        };
        let week = recurrence.get("days_of_week");
        let month = recurrence.get("days_of_month");
        match (week, month) {
            (Some(days), None) => self.days(days, &format!("{rpath}.days_of_week"), 7),
            (None, Some(days)) => self.days(days, &format!("{rpath}.days_of_month"), 31),
            _ => self.error(
                rpath,
                "must have exactly one of days_of_week or days_of_month",
                recurrence,
            ),
        }
    }

    fn days(&mut self, days: &Value, path: &str, max: u64) {
        let Some(list) = days.as_array() else {
            self.error(path, "is not of a type(s) array", days);
            return;
        };
        if list.is_empty() {
            self.error(path, "must not be empty", days);
        }
        for (i, d) in list.iter().enumerate() {
            if !d.as_u64().is_some_and(|n| (1..=max).contains(&n)) {
                self.error(format!("{path}[{i}]"), format!("must be between 1 and {max}"), d);
            }
        }
    }
}

/// Validate a raw policy and deserialize it.
fn adjustment_out_of_range(adjustment: Adjustment) -> Option<String> {
    let percent_range = MIN_ADJUSTMENT_PERCENT..=MAX_ADJUSTMENT_PERCENT;
    match adjustment {
        Adjustment::Delta(d) if d.unsigned_abs() > MAX_ADJUSTMENT_STEP as u64 => Some(format!(
            "must change the instance count by at most {MAX_ADJUSTMENT_STEP}"
        )),
        Adjustment::Exact(n) if i64::from(n) > MAX_ADJUSTMENT_STEP => {
            Some(format!("must have a maximum value of {MAX_ADJUSTMENT_STEP}"))
        }
        Adjustment::Percent(p) if !percent_range.contains(&p) => Some(format!(
            "must be between {MIN_ADJUSTMENT_PERCENT}% and +{MAX_ADJUSTMENT_PERCENT}%"
        )),
        _ => None,
    }
}

pub fn validate_policy(raw: &Value) -> Result<ScalingPolicy, ValidationErrors> {
    let mut v = Validator::default();
    let Some(obj) = raw.as_object() else {
        v.error("instance", "is not of a type(s) object", raw);
        return Err(ValidationErrors(v.errors));
    };

    v.bounds(obj, "instance");

    if let Some(rules) = obj.get("scaling_rules") {
        match rules.as_array() {
            Some(rules) => {
                for (i, rule) in rules.iter().enumerate() {
                    v.rule(rule, &format!("instance.scaling_rules[{i}]"));
                }
            }
            None => v.error("instance.scaling_rules", "is not of a type(s) array", rules),
        }
    }

    if let Some(schedules) = obj.get("schedules") {
        v.schedules(schedules, "instance.schedules");
    }

    if !v.errors.is_empty() {
        return Err(ValidationErrors(v.errors));
    }

    serde_json::from_value(raw.clone()).map_err(|e| {
        v.error("instance", e.to_string(), raw);
        ValidationErrors(v.errors)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn valid_policy() -> Value {
        json!({
            "instance_min_count": 1,
            "instance_max_count": 4,
            "scaling_rules": [{
                "metric_type": "memory",
                "threshold": 300,
                "operator": ">=",
                "adjustment": "+1",
                "cool_down_secs": 300
            }],
            "schedules": {
                "timezone": "+08:00",
                "overrides": [
                    {
                        "window": {
                            "type": "recurring",
                            "start_time": "10:00:00",
                            "end_time": "18:00:00",
                            "recurrence": { "days_of_week": [1, 2, 3] }
                        },
                        "instance_min_count": 2,
                        "instance_max_count": 4
                    },
                    {
                        "window": {
                            "type": "specific_date",
                            "start": "2026-12-24T00:00:00",
                            "end": "2026-12-26T00:00:00"
                        },
                        "instance_min_count": 3,
                        "instance_max_count": 4
                    }
                ]
            }
        })
    }

    fn properties(err: &ValidationErrors) -> Vec<&str> {
        err.0.iter().map(|e| e.property.as_str()).collect()
    }

    #[test]
    fn valid_policy_deserializes() {
        let policy = validate_policy(&valid_policy()).unwrap();
        assert_eq!(policy.instance_max_count, 4);
        assert_eq!(policy.scaling_rules[0].cool_down_secs, 300);
        assert_eq!(policy.schedules.unwrap().overrides.len(), 2);
    }

    #[test]
    fn negative_cool_down_is_reported() {
        let mut policy = valid_policy();
        policy["scaling_rules"][0]["cool_down_secs"] = json!(-300);

        let err = validate_policy(&policy).unwrap_err();
        assert_eq!(err.0.len(), 1);
        let e = &err.0[0];
        assert_eq!(e.property, "instance.scaling_rules[0].cool_down_secs");
        assert_eq!(e.message, "must have a minimum value of 60");
        assert_eq!(e.instance, json!(-300));
        assert_eq!(
            e.stack,
            "instance.scaling_rules[0].cool_down_secs must have a minimum value of 60"
        );
    }

    #[test]
    fn cool_down_upper_bound_and_default() {
        let mut policy = valid_policy();
        policy["scaling_rules"][0]["cool_down_secs"] = json!(7200);
        let err = validate_policy(&policy).unwrap_err();
        assert_eq!(err.0[0].message, "must have a maximum value of 3600");

        policy["scaling_rules"][0]
            .as_object_mut()
            .unwrap()
            .remove("cool_down_secs");
        let policy = validate_policy(&policy).unwrap();
        assert_eq!(policy.scaling_rules[0].cool_down_secs, 300);
    }

    #[test]
    fn min_greater_than_max() {
        let err = validate_policy(&json!({
            "instance_min_count": 10,
            "instance_max_count": 4
        }))
        .unwrap_err();
        assert_eq!(properties(&err), vec!["instance"]);
        assert_eq!(
            err.0[0].instance,
            json!({"instance_min_count": 10, "instance_max_count": 4})
        );
    }

    #[test]
    fn all_rule_errors_are_collected() {
        let err = validate_policy(&json!({
            "instance_min_count": 0,
            "instance_max_count": 2,
            "scaling_rules": [{
                "metric_type": "throughput",
                "threshold": "high",
                "operator": "==",
                "adjustment": "50%",
                "aggregation": { "type": "proportion", "ratio": 1.5 }
            }]
        }))
        .unwrap_err();

        assert_eq!(
            properties(&err),
            vec![
                "instance.instance_min_count",
                "instance.scaling_rules[0].metric_type",
                "instance.scaling_rules[0].threshold",
                "instance.scaling_rules[0].operator",
                "instance.scaling_rules[0].adjustment",
                "instance.scaling_rules[0].aggregation.ratio",
            ]
        );
    }

    #[test]
    fn missing_bounds_are_required() {
        let err = validate_policy(&json!({})).unwrap_err();
        assert_eq!(err.0.len(), 2);
        assert_eq!(err.0[0].message, "requires property \"instance_min_count\"");
    }

    #[test]
    fn bad_timezone() {
        let mut policy = valid_policy();
        policy["schedules"]["timezone"] = json!("Asia/Shanghai");
        let err = validate_policy(&policy).unwrap_err();
        assert_eq!(properties(&err), vec!["instance.schedules.timezone"]);
    }

    #[test]
    fn overlapping_specific_dates_are_rejected() {
        let mut policy = valid_policy();
        let overrides = policy["schedules"]["overrides"].as_array_mut().unwrap();
        overrides.push(json!({
            "window": {
                "type": "specific_date",
                "start": "2026-12-20T00:00:00",
                "end": "2026-12-25T00:00:00"
            },
            "instance_min_count": 1,
            "instance_max_count": 2
        }));

        let err = validate_policy(&policy).unwrap_err();
        // Sorted by start, the existing window (index 1) follows the new one.
        assert_eq!(properties(&err), vec!["instance.schedules.overrides[1].window"]);
        assert_eq!(err.0[0].message, "overlaps with overrides[2]");
    }

    #[test]
    fn adjacent_specific_dates_do_not_overlap() {
        let mut policy = valid_policy();
        let overrides = policy["schedules"]["overrides"].as_array_mut().unwrap();
        overrides.push(json!({
            "window": {
                "type": "specific_date",
                "start": "2026-12-26T00:00:00",
                "end": "2026-12-27T00:00:00"
            },
            "instance_min_count": 1,
            "instance_max_count": 2
        }));
        assert!(validate_policy(&policy).is_ok());
    }

    #[test]
    fn recurring_window_checks() {
        let mut policy = valid_policy();
        policy["schedules"]["overrides"][0]["window"] = json!({
            "type": "recurring",
            "start_time": "18:00:00",
            "end_time": "10:00:00",
            "start_date": "2026-05-01",
            "end_date": "2026-04-01",
            "recurrence": { "days_of_week": [0, 8], "days_of_month": [1] }
        });

        let err = validate_policy(&policy).unwrap_err();
        let messages: Vec<&str> = err.0.iter().map(|e| e.message.as_str()).collect();
        assert_eq!(
            messages,
            vec![
                "start_time must be before end_time",
                "start_date must not be after end_date",
                "must have exactly one of days_of_week or days_of_month",
            ]
        );
    }

    #[test]
    fn day_values_in_range() {
        let mut policy = valid_policy();
        policy["schedules"]["overrides"][0]["window"]["recurrence"] =
            json!({ "days_of_month": [1, 32] });
        let err = validate_policy(&policy).unwrap_err();
        assert_eq!(
            properties(&err),
            vec!["instance.schedules.overrides[0].window.recurrence.days_of_month[1]"]
        );
    }

    #[test]
    fn oversized_adjustments_are_rejected() {
        for adjustment in ["+9223372036854775807", "-1001", "1001", "+1001%", "-101%"] {
            let mut policy = valid_policy();
            policy["scaling_rules"][0]["adjustment"] = json!(adjustment);

            let err = validate_policy(&policy).unwrap_err();
            assert_eq!(
                properties(&err),
                vec!["instance.scaling_rules[0].adjustment"],
                "{adjustment}"
            );
        }
    }

    #[test]
    fn adjustment_limits_are_inclusive() {
        for adjustment in ["+1000", "-1000", "1000", "+1000%", "-100%"] {
            let mut policy = valid_policy();
            policy["scaling_rules"][0]["adjustment"] = json!(adjustment);
            assert!(validate_policy(&policy).is_ok(), "{adjustment}");
        }
    }

    #[test]
    fn non_object_policy() {
        let err = validate_policy(&json!("nope")).unwrap_err();
        assert_eq!(err.0[0].property, "instance");
        assert_eq!(err.to_string(), "invalid policy: instance is not of a type(s) object");
    }
}
