//! Aggregation of normalized envelopes into snapshots and history.
//!
//! Pure functions of their inputs. Envelopes for other applications and
//! non-container payloads are skipped without error.
//!
//! The two operations resolve duplicate readings for the same instance
//! differently: [`snapshot`] keeps the last envelope in iteration order,
//! [`history`] keeps the envelope with the greatest origin timestamp.

use std::collections::HashMap;
use std::collections::hash_map::Entry;

use autoscaler_state::{AppInstanceMetric, Metric, MetricName};

use crate::envelope::{ContainerMetric, Envelope, EnvelopePayload};

/// Snapshot of one metric kind across the instances of `app_id`.
///
/// Never absent: with no matching envelope the result has an empty
/// instance list.
pub fn snapshot(app_id: &str, name: MetricName, envelopes: &[Envelope]) -> Metric {
    let mut by_index = HashMap::new();
    for cm in envelopes.iter().filter_map(|e| e.for_app(app_id)) {
        by_index.insert(cm.instance_index, cm.reading(name));
    }

    Metric {
        app_id: app_id.to_string(),
        name,
        instances: by_index.into_values().collect(),
    }
}

/// History records for `app_id`: one per instance, taken from the
/// envelope with the latest origin timestamp. Ties keep the first seen.
pub fn history(
    collected_at: i64,
    app_id: &str,
    name: MetricName,
    envelopes: &[Envelope],
) -> Vec<AppInstanceMetric> {
    let mut latest: HashMap<u32, (i64, &ContainerMetric)> = HashMap::new();
    for env in envelopes {
        let Some(cm) = env.for_app(app_id) else {
            continue;
        };
        match latest.entry(cm.instance_index) {
            Entry::Occupied(mut slot) => {
                if env.timestamp > slot.get().0 {
                    slot.insert((env.timestamp, cm));
                }
            }
            Entry::Vacant(slot) => {
                slot.insert((env.timestamp, cm));
            }
        }
    }

    latest
        .into_values()
        .map(|(timestamp, cm)| {
            let reading = cm.reading(name);
            AppInstanceMetric {
                app_id: app_id.to_string(),
                instance_index: cm.instance_index,
                collected_at,
                timestamp,
                name,
                unit: reading.unit,
                value: reading.value,
            }
        })
        .collect()
}

pub fn snapshot_memory(app_id: &str, envelopes: &[Envelope]) -> Metric {
    snapshot(app_id, MetricName::Memory, envelopes)
}

pub fn snapshot_cpu(app_id: &str, envelopes: &[Envelope]) -> Metric {
    snapshot(app_id, MetricName::Cpu, envelopes)
}

pub fn snapshot_disk(app_id: &str, envelopes: &[Envelope]) -> Metric {
    snapshot(app_id, MetricName::Disk, envelopes)
}

pub fn history_memory(
    collected_at: i64,
    app_id: &str,
    envelopes: &[Envelope],
) -> Vec<AppInstanceMetric> {
    history(collected_at, app_id, MetricName::Memory, envelopes)
}

pub fn history_cpu(
    collected_at: i64,
    app_id: &str,
    envelopes: &[Envelope],
) -> Vec<AppInstanceMetric> {
    history(collected_at, app_id, MetricName::Cpu, envelopes)
}

pub fn history_disk(
    collected_at: i64,
    app_id: &str,
    envelopes: &[Envelope],
) -> Vec<AppInstanceMetric> {
    history(collected_at, app_id, MetricName::Disk, envelopes)
}

/// Distinct application ids carried by container metrics in a batch.
pub fn app_ids(envelopes: &[Envelope]) -> Vec<String> {
    let mut ids: Vec<String> = envelopes
        .iter()
        .filter_map(|e| match &e.payload {
            EnvelopePayload::ContainerMetric(cm) => Some(cm.app_id.clone()),
            EnvelopePayload::Other => None,
        })
        .collect();
    ids.sort();
    ids.dedup();
    ids
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    use autoscaler_state::{InstanceMetric, Unit};

    fn container_envelope(
        timestamp: i64,
        app_id: &str,
        index: u32,
        cpu: f64,
        memory: u64,
        disk: u64,
    ) -> Envelope {
        Envelope::container_metric(
            timestamp,
            ContainerMetric {
                app_id: app_id.to_string(),
                instance_index: index,
                cpu_percentage: cpu,
                memory_bytes: memory,
                disk_bytes: disk,
            },
        )
    }

    fn mem(index: u32, value: &str) -> InstanceMetric {
        InstanceMetric {
            index,
            value: value.to_string(),
            unit: Unit::Bytes,
        }
    }

    fn as_set<T: std::hash::Hash + Eq>(items: Vec<T>) -> HashSet<T> {
        items.into_iter().collect()
    }

    // ── snapshot ───────────────────────────────────────────────────

    #[test]
    fn snapshot_of_empty_batch_is_empty_metric() {
        let metric = snapshot_memory("app-id", &[]);
        assert_eq!(metric.app_id, "app-id");
        assert_eq!(metric.name, MetricName::Memory);
        assert!(metric.instances.is_empty());
    }

    #[test]
    fn snapshot_with_no_matching_app_is_empty_metric() {
        let batch = vec![
            container_envelope(0, "different-app-id", 0, 12.11, 622222, 233300000),
            container_envelope(0, "different-app-id", 1, 31.21, 23662, 3424553333),
            container_envelope(0, "another-different-app-id", 0, 0.211, 88623692, 9876384949),
        ];

        let metric = snapshot_memory("app-id", &batch);
        assert_eq!(metric.app_id, "app-id");
        assert_eq!(metric.name, MetricName::Memory);
        assert!(metric.instances.is_empty());
    }

    #[test]
    fn snapshot_keeps_only_the_given_app() {
        let batch = vec![
            container_envelope(0, "app-id", 0, 12.11, 622222, 233300000),
            container_envelope(0, "app-id", 1, 31.21, 23662, 3424553333),
            container_envelope(0, "different-app-id", 2, 0.211, 88623692, 9876384949),
        ];

        let metric = snapshot_memory("app-id", &batch);
        assert_eq!(metric.instances.len(), 2);
        assert_eq!(
            as_set(metric.instances),
            as_set(vec![mem(0, "622222"), mem(1, "23662")])
        );
    }

    #[test]
    fn snapshot_duplicate_index_last_in_iteration_wins() {
        // The later envelope in the batch wins even though its sample is older.
        let batch = vec![
            container_envelope(500, "app-id", 0, 1.0, 111, 1),
            container_envelope(100, "app-id", 0, 1.0, 222, 1),
        ];

        let metric = snapshot_memory("app-id", &batch);
        assert_eq!(metric.instances, vec![mem(0, "222")]);
    }

    #[test]
    fn snapshot_skips_other_payloads() {
        let batch = vec![
            Envelope {
                timestamp: 1,
                payload: EnvelopePayload::Other,
            },
            container_envelope(2, "app-id", 4, 55.5, 10, 20),
        ];

        let cpu = snapshot_cpu("app-id", &batch);
        assert_eq!(cpu.instances.len(), 1);
        assert_eq!(cpu.instances[0].value, "55.5");
        assert_eq!(cpu.instances[0].unit, Unit::Percentage);

        let disk = snapshot_disk("app-id", &batch);
        assert_eq!(disk.instances[0].value, "20");
    }

    // ── history ────────────────────────────────────────────────────

    #[test]
    fn history_of_empty_batch_is_empty() {
        assert!(history_memory(123456, "an-app-id", &[]).is_empty());
    }

    #[test]
    fn history_with_no_matching_app_is_empty() {
        let batch = vec![
            container_envelope(111111, "different-app-id", 0, 12.11, 622222, 233300000),
            container_envelope(222222, "different-app-id", 1, 31.21, 23662, 3424553333),
            container_envelope(333333, "another-different-app-id", 0, 0.211, 88623692, 9876384949),
        ];
        assert!(history_memory(123456, "an-app-id", &batch).is_empty());
    }

    #[test]
    fn history_keeps_only_the_given_app() {
        let batch = vec![
            container_envelope(111111, "app-id", 0, 12.11, 622222, 233300000),
            container_envelope(222222, "other-app", 2, 0.211, 88623692, 9876384949),
            container_envelope(333333, "app-id", 1, 31.21, 23662, 3424553333),
        ];

        let records = history_memory(123456, "app-id", &batch);
        let expected = vec![
            AppInstanceMetric {
                app_id: "app-id".to_string(),
                instance_index: 0,
                collected_at: 123456,
                timestamp: 111111,
                name: MetricName::Memory,
                unit: Unit::Bytes,
                value: "622222".to_string(),
            },
            AppInstanceMetric {
                app_id: "app-id".to_string(),
                instance_index: 1,
                collected_at: 123456,
                timestamp: 333333,
                name: MetricName::Memory,
                unit: Unit::Bytes,
                value: "23662".to_string(),
            },
        ];
        assert_eq!(records.len(), 2);
        assert_eq!(as_set(records), as_set(expected));
    }

    #[test]
    fn history_duplicate_index_latest_timestamp_wins() {
        // Arrival order disagrees with sample time; sample time decides.
        let batch = vec![
            container_envelope(900, "app-id", 0, 1.0, 999, 1),
            container_envelope(100, "app-id", 0, 1.0, 111, 1),
        ];

        let records = history_memory(5000, "app-id", &batch);
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].value, "999");
        assert_eq!(records[0].timestamp, 900);
        assert_eq!(records[0].collected_at, 5000);
    }

    #[test]
    fn history_and_snapshot_diverge_on_duplicates() {
        let batch = vec![
            container_envelope(900, "app-id", 0, 1.0, 999, 1),
            container_envelope(100, "app-id", 0, 1.0, 111, 1),
        ];

        assert_eq!(snapshot_memory("app-id", &batch).instances[0].value, "111");
        assert_eq!(history_memory(1, "app-id", &batch)[0].value, "999");
    }

    #[test]
    fn history_for_cpu_and_disk() {
        let batch = vec![container_envelope(10, "app-id", 0, 3.25, 1, 77)];

        let cpu = history_cpu(20, "app-id", &batch);
        assert_eq!(cpu[0].value, "3.25");
        assert_eq!(cpu[0].unit, Unit::Percentage);

        let disk = history_disk(20, "app-id", &batch);
        assert_eq!(disk[0].value, "77");
        assert_eq!(disk[0].name, MetricName::Disk);
    }

    #[test]
    fn aggregation_does_not_consume_input() {
        let batch = vec![container_envelope(1, "app-id", 0, 1.0, 5, 1)];
        let before = batch.clone();
        let _ = snapshot_memory("app-id", &batch);
        let _ = history_memory(1, "app-id", &batch);
        assert_eq!(batch, before);
    }

    #[test]
    fn app_ids_are_distinct_and_sorted() {
        let batch = vec![
            container_envelope(1, "b", 0, 1.0, 1, 1),
            container_envelope(1, "a", 0, 1.0, 1, 1),
            container_envelope(1, "b", 1, 1.0, 1, 1),
            Envelope {
                timestamp: 1,
                payload: EnvelopePayload::Other,
            },
        ];
        assert_eq!(app_ids(&batch), vec!["a", "b"]);
    }
}
