//! Telemetry envelopes and the sample normalizer.
//!
//! The firehose delivers envelopes whose fields are all optional. The
//! normalizer collapses them into a tagged [`EnvelopePayload`]: a complete
//! container metric, or `Other` for anything else.

use serde::{Deserialize, Serialize};

use autoscaler_state::{InstanceMetric, MetricName};

/// Envelope as it arrives on the wire.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawEnvelope {
    #[serde(default)]
    pub origin: Option<String>,
    /// Origin timestamp (nanoseconds since the epoch).
    #[serde(default)]
    pub timestamp: Option<i64>,
    #[serde(default)]
    pub container_metric: Option<RawContainerMetric>,
}

/// Container metric payload as it arrives on the wire.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawContainerMetric {
    #[serde(default)]
    pub application_id: Option<String>,
    #[serde(default)]
    pub instance_index: Option<i32>,
    #[serde(default)]
    pub cpu_percentage: Option<f64>,
    #[serde(default)]
    pub memory_bytes: Option<u64>,
    #[serde(default)]
    pub disk_bytes: Option<u64>,
}

/// A normalized envelope.
#[derive(Debug, Clone, PartialEq)]
pub struct Envelope {
    pub timestamp: i64,
    pub payload: EnvelopePayload,
}

#[derive(Debug, Clone, PartialEq)]
pub enum EnvelopePayload {
    ContainerMetric(ContainerMetric),
    /// Non-container or malformed payload; ignored by aggregation.
    Other,
}

/// A complete container metric for one instance.
#[derive(Debug, Clone, PartialEq)]
pub struct ContainerMetric {
    pub app_id: String,
    pub instance_index: u32,
    pub cpu_percentage: f64,
    pub memory_bytes: u64,
    pub disk_bytes: u64,
}

impl ContainerMetric {
    /// This instance's reading for one metric kind.
    pub fn reading(&self, name: MetricName) -> InstanceMetric {
        let value = match name {
            MetricName::Memory => self.memory_bytes.to_string(),
            MetricName::Cpu => self.cpu_percentage.to_string(),
            MetricName::Disk => self.disk_bytes.to_string(),
        };
        InstanceMetric {
            index: self.instance_index,
            value,
            unit: name.unit(),
        }
    }
}

impl Envelope {
    pub fn container_metric(timestamp: i64, metric: ContainerMetric) -> Self {
        Self {
            timestamp,
            payload: EnvelopePayload::ContainerMetric(metric),
        }
    }

    /// The container metric if this envelope carries one for `app_id`.
    pub fn for_app(&self, app_id: &str) -> Option<&ContainerMetric> {
        match &self.payload {
            EnvelopePayload::ContainerMetric(cm) if cm.app_id == app_id => Some(cm),
            _ => None,
        }
    }
}

/// Normalize a wire envelope.
///
/// A missing timestamp reads as 0. Any missing container field, or a
/// negative instance index, yields `EnvelopePayload::Other`.
pub fn normalize(raw: &RawEnvelope) -> Envelope {
    let payload = raw
        .container_metric
        .as_ref()
        .and_then(normalize_container_metric)
        .map(EnvelopePayload::ContainerMetric)
        .unwrap_or(EnvelopePayload::Other);

    Envelope {
        timestamp: raw.timestamp.unwrap_or(0),
        payload,
    }
}

fn normalize_container_metric(raw: &RawContainerMetric) -> Option<ContainerMetric> {
    Some(ContainerMetric {
        app_id: raw.application_id.clone()?,
        instance_index: u32::try_from(raw.instance_index?).ok()?,
        cpu_percentage: raw.cpu_percentage?,
        memory_bytes: raw.memory_bytes?,
        disk_bytes: raw.disk_bytes?,
    })
}
