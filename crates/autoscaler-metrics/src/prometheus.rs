//! Prometheus text exposition format.
//!
//! Renders the latest metric snapshots into the Prometheus text exposition
//! format for scraping by a Prometheus server or compatible agent.

use std::collections::BTreeMap;

use autoscaler_state::{Metric, MetricName};

fn family(name: MetricName) -> (&'static str, &'static str) {
    match name {
        MetricName::Memory => (
            "autoscaler_instance_memory_bytes",
            "Memory usage of one application instance in bytes.",
        ),
        MetricName::Cpu => (
            "autoscaler_instance_cpu_percentage",
            "CPU usage of one application instance in percent.",
        ),
        MetricName::Disk => (
            "autoscaler_instance_disk_bytes",
            "Disk usage of one application instance in bytes.",
        ),
    }
}

/// Render a list of metric snapshots into Prometheus text format.
///
/// Produces one gauge family per metric kind with `app_id` and `instance`
/// labels, plus `autoscaler_app_instances` with the number of instances
/// reporting per application. Output is sorted so scrapes are stable.
pub fn render_prometheus(snapshots: &[Metric]) -> String {
    let mut out = String::new();
    let mut instance_counts: BTreeMap<&str, usize> = BTreeMap::new();

    for name in MetricName::ALL {
        let mut rows: Vec<(&str, u32, &str)> = snapshots
            .iter()
            .filter(|m| m.name == name)
            .flat_map(|m| {
                m.instances
                    .iter()
                    .map(move |i| (m.app_id.as_str(), i.index, i.value.as_str()))
            })
            .collect();
        if rows.is_empty() {
            continue;
        }
        rows.sort();

        let (metric, help) = family(name);
        out.push_str(&format!("# HELP {metric} {help}\n"));
        out.push_str(&format!("# TYPE {metric} gauge\n"));
        for (app_id, index, value) in rows {
            out.push_str(&format!(
                "{metric}{{app_id=\"{app_id}\",instance=\"{index}\"}} {value}\n"
            ));
        }
    }

    for m in snapshots.iter().filter(|m| m.name == MetricName::Memory) {
        instance_counts.insert(&m.app_id, m.instances.len());
    }
    if !instance_counts.is_empty() {
        out.push_str("# HELP autoscaler_app_instances Number of instances reporting metrics.\n");
        out.push_str("# TYPE autoscaler_app_instances gauge\n");
        for (app_id, count) in instance_counts {
            out.push_str(&format!(
                "autoscaler_app_instances{{app_id=\"{app_id}\"}} {count}\n"
            ));
        }
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use autoscaler_state::InstanceMetric;

    fn snapshot(app_id: &str, name: MetricName, values: &[(u32, &str)]) -> Metric {
        Metric {
            app_id: app_id.to_string(),
            name,
            instances: values
                .iter()
                .map(|(index, value)| InstanceMetric {
                    index: *index,
                    value: value.to_string(),
                    unit: name.unit(),
                })
                .collect(),
        }
    }

    #[test]
    fn render_single_app() {
        let output = render_prometheus(&[
            snapshot("app-1", MetricName::Memory, &[(1, "2048"), (0, "1024")]),
            snapshot("app-1", MetricName::Cpu, &[(0, "12.5")]),
        ]);

        assert!(output.contains("# TYPE autoscaler_instance_memory_bytes gauge"));
        assert!(output.contains(
            "autoscaler_instance_memory_bytes{app_id=\"app-1\",instance=\"0\"} 1024"
        ));
        assert!(output.contains(
            "autoscaler_instance_cpu_percentage{app_id=\"app-1\",instance=\"0\"} 12.5"
        ));
        assert!(output.contains("autoscaler_app_instances{app_id=\"app-1\"} 2"));
        assert!(!output.contains("autoscaler_instance_disk_bytes"));
    }

    #[test]
    fn rows_are_sorted() {
        let output = render_prometheus(&[
            snapshot("b", MetricName::Memory, &[(0, "1")]),
            snapshot("a", MetricName::Memory, &[(1, "2"), (0, "3")]),
        ]);
        let rows: Vec<&str> = output
            .lines()
            .filter(|l| l.starts_with("autoscaler_instance_memory_bytes"))
            .collect();
        assert_eq!(rows.len(), 3);
        assert!(rows[0].contains("app_id=\"a\",instance=\"0\""));
        assert!(rows[1].contains("app_id=\"a\",instance=\"1\""));
        assert!(rows[2].contains("app_id=\"b\""));
    }

    #[test]
    fn render_empty() {
        assert!(render_prometheus(&[]).is_empty());
    }
}
