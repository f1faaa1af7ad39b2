// --- File: src/config.rs ---

//! Metric configuration loaded from YAML.
//!
//! ```yaml
//! metrics:
//!   accuracy:
//!     function: classification.accuracy
//!   f1_weighted:
//!     function: classification.f1
//!     kwargs:
//!       average: weighted
//! sink:
//!   log_dir: runs/avmnist
//!   record_only: ["accuracy_.*", "loss"]
//! ```
//!
//! The declaration order of `metrics` is kept: metrics are evaluated and
//! reported in that order.

use crate::metrics::MetricKwargs;
use serde::de::{MapAccess, Visitor};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::HashSet;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Invalid or unreadable metric configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("config must contain at least one metric definition")]
    Empty,

    #[error("metric '{0}' is defined more than once")]
    DuplicateMetric(String),

    #[error("metric #{0} has an empty name")]
    EmptyName(usize),

    #[error("metric '{0}' has no function reference")]
    MissingFunction(String),

    #[error("invalid record_only pattern '{pattern}': {source}")]
    InvalidPattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },

    #[error("failed to read config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse metric YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("record_only patterns given but no sink is configured")]
    RecordOnlyWithoutSink,
}

/// One configured metric.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricEntry {
    /// Result-key prefix, e.g. `accuracy`
    #[serde(skip)]
    pub name: String,
    /// Registry identifier, e.g. `classification.accuracy`
    pub function: String,
    #[serde(default, skip_serializing_if = "MetricKwargs::is_empty")]
    pub kwargs: MetricKwargs,
}

/// Where and what to stream after each finalize.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SinkConfig {
    /// Directory receiving `scalars.jsonl`
    pub log_dir: PathBuf,
    /// Allow-list of key patterns; everything is forwarded when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub record_only: Option<Vec<String>>,
}

/// Ordered metric definitions plus an optional sink.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MetricConfig {
    #[serde(
        deserialize_with = "deserialize_metrics",
        serialize_with = "serialize_metrics"
    )]
    pub metrics: Vec<MetricEntry>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sink: Option<SinkConfig>,
}

impl MetricConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a metric without keyword arguments.
    pub fn with_metric(self, name: &str, function: &str) -> Self {
        self.with_metric_kwargs(name, function, MetricKwargs::new())
    }

    pub fn with_metric_kwargs(mut self, name: &str, function: &str, kwargs: MetricKwargs) -> Self {
        self.metrics.push(MetricEntry {
            name: name.to_string(),
            function: function.to_string(),
            kwargs,
        });
        self
    }

    pub fn with_sink(mut self, log_dir: impl Into<PathBuf>, record_only: Option<Vec<String>>) -> Self {
        self.sink = Some(SinkConfig {
            log_dir: log_dir.into(),
            record_only,
        });
        self
    }

    /// Applies sink settings given outside the YAML file.
    ///
    /// `log_dir` replaces the sink directory (creating the section if
    /// needed) and a non-empty `record_only` replaces the allow-list.
    /// Patterns with nowhere to go are an error.
    pub fn override_sink(
        &mut self,
        log_dir: Option<PathBuf>,
        record_only: Vec<String>,
    ) -> Result<(), ConfigError> {
        if let Some(log_dir) = log_dir {
            match self.sink.as_mut() {
                Some(sink) => sink.log_dir = log_dir,
                None => {
                    self.sink = Some(SinkConfig {
                        log_dir,
                        record_only: None,
                    })
                }
            }
        }
        if !record_only.is_empty() {
            let sink = self.sink.as_mut().ok_or(ConfigError::RecordOnlyWithoutSink)?;
            sink.record_only = Some(record_only);
        }
        Ok(())
    }

    /// Parses and validates a YAML document.
    pub fn from_yaml_str(yaml: &str) -> Result<Self, ConfigError> {
        let config: MetricConfig = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Reads, parses and validates a YAML file.
    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_yaml_str(&content)
    }

    pub fn to_yaml(&self) -> Result<String, ConfigError> {
        Ok(serde_yaml::to_string(self)?)
    }

    /// Checks the structural invariants: at least one metric, unique
    /// non-empty names, non-empty function references.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.metrics.is_empty() {
            return Err(ConfigError::Empty);
        }
        let mut seen = HashSet::new();
        for (i, entry) in self.metrics.iter().enumerate() {
            if entry.name.trim().is_empty() {
                return Err(ConfigError::EmptyName(i));
            }
            if entry.function.trim().is_empty() {
                return Err(ConfigError::MissingFunction(entry.name.clone()));
            }
            if !seen.insert(entry.name.as_str()) {
                return Err(ConfigError::DuplicateMetric(entry.name.clone()));
            }
        }
        Ok(())
    }

    pub fn metric_names(&self) -> Vec<&str> {
        self.metrics.iter().map(|m| m.name.as_str()).collect()
    }
}

// ============================================================================
// Ordered metrics mapping
// ============================================================================

fn deserialize_metrics<'de, D>(deserializer: D) -> Result<Vec<MetricEntry>, D::Error>
where
    D: Deserializer<'de>,
{
    struct MetricsVisitor;

    impl<'de> Visitor<'de> for MetricsVisitor {
        type Value = Vec<MetricEntry>;

        fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
            f.write_str("a mapping of metric name to {function, kwargs}")
        }

        fn visit_unit<E>(self) -> Result<Self::Value, E>
        where
            E: serde::de::Error,
        {
            Ok(Vec::new())
        }

        fn visit_map<A>(self, mut map: A) -> Result<Self::Value, A::Error>
        where
            A: MapAccess<'de>,
        {
            use serde::de::Error;

            let mut entries: Vec<MetricEntry> = Vec::new();
            while let Some((name, mut entry)) = map.next_entry::<String, MetricEntry>()? {
                if entries.iter().any(|e| e.name == name) {
                    return Err(A::Error::custom(format!(
                        "metric '{}' is defined more than once",
                        name
                    )));
                }
                entry.name = name;
                entries.push(entry);
            }
            Ok(entries)
        }
    }

    deserializer.deserialize_map(MetricsVisitor)
}

fn serialize_metrics<S>(metrics: &[MetricEntry], serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    use serde::ser::SerializeMap;

    let mut map = serializer.serialize_map(Some(metrics.len()))?;
    for entry in metrics {
        map.serialize_entry(&entry.name, entry)?;
    }
    map.end()
}
