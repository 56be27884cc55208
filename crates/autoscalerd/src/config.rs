//! autoscaler.toml configuration.
//!
//! Every section and field is optional; missing values take the defaults
//! below.
//!
//! ```toml
//! [server]
//! port = 8080
//!
//! [storage]
//! data_dir = "/var/lib/autoscaler"
//!
//! [evaluator]
//! interval_secs = 30
//! max_concurrency = 16
//! dispatch_timeout_secs = 10
//!
//! [collector]
//! retention_secs = 86400
//! prune_interval_secs = 300
//! channel_capacity = 256
//!
//! [scaling_engine]
//! url = "http://127.0.0.1:8081"
//!
//! [scheduler]
//! url = "http://127.0.0.1:8082"
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use autoscaler_engine::EngineConfig;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AutoscalerConfig {
    pub server: ServerConfig,
    pub storage: StorageConfig,
    pub evaluator: EvaluatorConfig,
    pub collector: CollectorConfig,
    pub scaling_engine: UpstreamConfig,
    pub scheduler: UpstreamConfig,
}

impl Default for AutoscalerConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            storage: StorageConfig::default(),
            evaluator: EvaluatorConfig::default(),
            collector: CollectorConfig::default(),
            scaling_engine: UpstreamConfig::default(),
            scheduler: UpstreamConfig {
                url: "http://127.0.0.1:8082".to_string(),
                ..UpstreamConfig::default()
            },
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0".to_string(),
            port: 8080,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub data_dir: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("/var/lib/autoscaler"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EvaluatorConfig {
    pub interval_secs: u64,
    pub max_concurrency: usize,
    pub dispatch_timeout_secs: u64,
}

impl Default for EvaluatorConfig {
    fn default() -> Self {
        Self {
            interval_secs: 30,
            max_concurrency: 16,
            dispatch_timeout_secs: 10,
        }
    }
}

impl EvaluatorConfig {
    pub fn engine_config(&self) -> EngineConfig {
        EngineConfig {
            interval: Duration::from_secs(self.interval_secs),
            max_concurrency: self.max_concurrency,
            dispatch_timeout: Duration::from_secs(self.dispatch_timeout_secs),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CollectorConfig {
    /// How long metric history is kept.
    pub retention_secs: u64,
    pub prune_interval_secs: u64,
    /// Envelope batches buffered between the API and the collector.
    pub channel_capacity: usize,
}

impl Default for CollectorConfig {
    fn default() -> Self {
        Self {
            retention_secs: 24 * 60 * 60,
            prune_interval_secs: 300,
            channel_capacity: 256,
        }
    }
}

/// An HTTP collaborator.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct UpstreamConfig {
    pub url: String,
    pub timeout_secs: u64,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            url: "http://127.0.0.1:8081".to_string(),
            timeout_secs: 10,
        }
    }
}

impl AutoscalerConfig {
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: AutoscalerConfig = toml::from_str(&content)?;
        Ok(config)
    }

    pub fn to_toml_string(&self) -> anyhow::Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }
}
