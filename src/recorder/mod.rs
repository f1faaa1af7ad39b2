// --- File: src/recorder/mod.rs ---

//! Epoch-scoped metric recorder.
//!
//! `MetricRecorder` buffers prediction/target pairs per group during an
//! epoch and, on finalize, evaluates every configured metric on each group's
//! concatenated data. Results come back as a flat mapping whose keys combine
//! the metric name with a normalised group label (`accuracy_AUDIO`,
//! `prf_recall_T`).
//!
//! Only configuration and input-shape problems are returned as errors. A
//! group that cannot be concatenated, or a metric that fails on one group,
//! is logged and recorded in [`MetricRecorder::issues`] while the rest of
//! the epoch is still reported.
//!
//! # Example
//!
//! ```rust,ignore
//! let config = MetricConfig::new().with_metric("accuracy", "classification.accuracy");
//! let mut recorder = MetricRecorder::new(config, &MetricRegistry::with_builtins())?;
//!
//! recorder.update(&predictions, &targets, Some("a"))?;
//! let results = recorder.finalize(Some(0.42));
//! println!("{}", results.get("accuracy_A").unwrap_or_default());
//! ```

mod buffer;
mod results;

pub use buffer::{group_label, result_key};
pub use results::MetricResults;

use crate::config::{ConfigError, MetricConfig};
use crate::metrics::{MetricError, MetricValue};
use crate::registry::{MetricRegistry, RegistryError, ResolvedMetric};
use crate::sink::{JsonlSink, RecordFilter, ScalarSink, SinkError};
use buffer::{partition, GroupBuffer};
use ndarray::{ArrayD, Axis};
use std::collections::HashMap;
use std::fmt;
use std::path::Path;
use thiserror::Error;
use tracing::{debug, error, info, trace, warn};

/// Fatal recorder failures: bad configuration or bad input shapes.
#[derive(Error, Debug)]
pub enum RecorderError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("{0}")]
    Registry(#[from] RegistryError),

    #[error("failed to open metric sink: {0}")]
    Sink(#[from] SinkError),

    #[error("shape mismatch: predictions {predictions:?} vs targets {targets:?}")]
    ShapeMismatch {
        predictions: Vec<usize>,
        targets: Vec<usize>,
    },

    #[error("expected one group label per sample ({batch}), got {groups}")]
    GroupCountMismatch { groups: usize, batch: usize },

    #[error("cannot split a 0-dimensional batch into groups")]
    ScalarInput,
}

/// A failure absorbed during finalize.
#[derive(Debug, Clone, PartialEq)]
pub enum FinalizeIssue {
    /// A group's buffered pairs could not be concatenated; the group was skipped.
    Aggregation {
        group: Option<String>,
        message: String,
    },
    /// A metric failed on one group; other metrics and groups still ran.
    MetricComputation {
        metric: String,
        group: Option<String>,
        error: MetricError,
    },
    /// A result could not be written to the sink.
    Sink { tag: String, message: String },
}

impl fmt::Display for FinalizeIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FinalizeIssue::Aggregation { group, message } => {
                write!(f, "aggregation of group {:?} failed: {}", group, message)
            }
            FinalizeIssue::MetricComputation {
                metric,
                group,
                error,
            } => write!(f, "metric '{}' failed for group {:?}: {}", metric, group, error),
            FinalizeIssue::Sink { tag, message } => {
                write!(f, "failed to record '{}': {}", tag, message)
            }
        }
    }
}

/// Collects per-group predictions during an epoch and evaluates the
/// configured metrics at its end.
pub struct MetricRecorder {
    name: Option<String>,
    config: MetricConfig,
    metrics: Vec<ResolvedMetric>,
    buffers: Vec<GroupBuffer>,
    current_results: MetricResults,
    issues: Vec<FinalizeIssue>,
    sink: Option<Box<dyn ScalarSink>>,
    filter: RecordFilter,
}

impl MetricRecorder {
    /// Validates `config`, resolves its metrics against `registry` and opens
    /// the configured sink, if any.
    pub fn new(config: MetricConfig, registry: &MetricRegistry) -> Result<Self, RecorderError> {
        Self::build(config, registry, None)
    }

    fn build(
        config: MetricConfig,
        registry: &MetricRegistry,
        sink_subdir: Option<&str>,
    ) -> Result<Self, RecorderError> {
        config.validate()?;
        let metrics = registry.resolve(&config)?;

        let mut recorder = Self {
            name: None,
            config,
            metrics,
            buffers: Vec::new(),
            current_results: MetricResults::new(),
            issues: Vec::new(),
            sink: None,
            filter: RecordFilter::allow_all(),
        };

        if let Some(sink_config) = recorder.config.sink.clone() {
            let filter = RecordFilter::from_option(sink_config.record_only.as_deref())?;
            let log_dir = match sink_subdir {
                Some(sub) => sink_config.log_dir.join(sub),
                None => sink_config.log_dir,
            };
            let sink = JsonlSink::create(&log_dir)?;
            recorder = recorder.attach(Box::new(sink), filter);
        }

        Ok(recorder)
    }

    /// Attaches `sink`, forwarding only keys that match `record_only`
    /// (everything when `None` or empty).
    pub fn with_sink<S>(self, sink: S, record_only: Option<&[String]>) -> Result<Self, RecorderError>
    where
        S: ScalarSink + 'static,
    {
        let filter = RecordFilter::from_option(record_only)?;
        Ok(self.attach(Box::new(sink), filter))
    }

    fn attach(mut self, sink: Box<dyn ScalarSink>, filter: RecordFilter) -> Self {
        info!(recorder = %self.label(), sink = %sink.describe(), "Logging metrics to sink");
        if !filter.is_allow_all() {
            info!(recorder = %self.label(), patterns = ?filter.patterns(), "Only logging matching metrics");
        }
        self.sink = Some(sink);
        self.filter = filter;
        self
    }

    /// Label carried by every diagnostic event of this recorder.
    pub fn with_name(mut self, name: &str) -> Self {
        self.name = Some(name.to_string());
        self
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    fn label(&self) -> &str {
        self.name.as_deref().unwrap_or("metrics")
    }

    pub fn config(&self) -> &MetricConfig {
        &self.config
    }

    /// Configured metrics, in evaluation order.
    pub fn metrics(&self) -> &[ResolvedMetric] {
        &self.metrics
    }

    // ------------------------------------------------------------------------
    // Accumulation
    // ------------------------------------------------------------------------

    /// Buffers one batch for `group`.
    ///
    /// Fails without touching the buffer when the shapes differ.
    pub fn update(
        &mut self,
        predictions: &ArrayD<f32>,
        targets: &ArrayD<f32>,
        group: Option<&str>,
    ) -> Result<(), RecorderError> {
        ensure_same_shape(predictions, targets)?;
        self.buffer_mut(group)
            .push(predictions.clone(), targets.clone());
        Ok(())
    }

    /// Buffers a mixed batch, routing each sample (row of axis 0) to the
    /// group named by the matching entry of `groups`.
    ///
    /// All checks run before any buffer is touched. Groups are appended in
    /// order of first appearance within the batch.
    pub fn update_all<S: AsRef<str>>(
        &mut self,
        predictions: &ArrayD<f32>,
        targets: &ArrayD<f32>,
        groups: &[S],
    ) -> Result<(), RecorderError> {
        ensure_same_shape(predictions, targets)?;
        let batch = match predictions.shape().first() {
            Some(&n) => n,
            None => return Err(RecorderError::ScalarInput),
        };
        if groups.len() != batch {
            return Err(RecorderError::GroupCountMismatch {
                groups: groups.len(),
                batch,
            });
        }

        for (group, indices) in partition(groups) {
            let preds = predictions.select(Axis(0), &indices);
            let targs = targets.select(Axis(0), &indices);
            self.buffer_mut(Some(group)).push(preds, targs);
        }
        Ok(())
    }

    fn buffer_mut(&mut self, group: Option<&str>) -> &mut GroupBuffer {
        let pos = match self.buffers.iter().position(|b| b.key.as_deref() == group) {
            Some(pos) => pos,
            None => {
                self.buffers.push(GroupBuffer::new(group));
                self.buffers.len() - 1
            }
        };
        &mut self.buffers[pos]
    }

    // ------------------------------------------------------------------------
    // Finalize
    // ------------------------------------------------------------------------

    /// Evaluates every metric on the buffered epoch.
    pub fn finalize(&mut self, loss: Option<f64>) -> MetricResults {
        self.calculate_metrics(None, None, loss)
    }

    /// Evaluates every metric on every non-empty group and forwards the
    /// results to the sink under `metric_group` at `step` (default 0).
    ///
    /// Buffers are left untouched; call [`reset`](Self::reset) to start the
    /// next epoch.
    pub fn calculate_metrics(
        &mut self,
        metric_group: Option<&str>,
        step: Option<u64>,
        loss: Option<f64>,
    ) -> MetricResults {
        let mut results = MetricResults::new();
        let mut issues = Vec::new();

        if let Some(loss) = loss {
            results.insert("loss", loss);
        }

        for buffer in self.buffers.iter().filter(|b| !b.is_empty()) {
            let group = buffer.key.as_deref();
            let (predictions, targets) = match buffer.concatenated() {
                Ok(pair) => pair,
                Err(e) => {
                    error!(
                        recorder = %self.label(),
                        group = ?group,
                        batches = buffer.len(),
                        error = %e,
                        "Failed to concatenate buffered batches, skipping group"
                    );
                    issues.push(FinalizeIssue::Aggregation {
                        group: buffer.key.clone(),
                        message: e.to_string(),
                    });
                    continue;
                }
            };

            for resolved in &self.metrics {
                let label = group_label(group, &resolved.name);
                match resolved.metric.compute(&targets, &predictions) {
                    Ok(MetricValue::Scalar(v)) => {
                        results.insert(&result_key(&resolved.name, None, &label), v);
                    }
                    Ok(MetricValue::Named(entries)) => {
                        for (sub, v) in entries {
                            results.insert(&result_key(&resolved.name, Some(&sub), &label), v);
                        }
                    }
                    Err(e) => {
                        error!(
                            recorder = %self.label(),
                            metric = %resolved.name,
                            group = ?group,
                            error = %e,
                            "Error calculating metric"
                        );
                        issues.push(FinalizeIssue::MetricComputation {
                            metric: resolved.name.clone(),
                            group: buffer.key.clone(),
                            error: e,
                        });
                    }
                }
            }
        }

        self.forward(&results, metric_group, step.unwrap_or(0), &mut issues);

        self.current_results = results.clone();
        self.issues = issues;
        results
    }

    fn forward(
        &mut self,
        results: &MetricResults,
        metric_group: Option<&str>,
        step: u64,
        issues: &mut Vec<FinalizeIssue>,
    ) {
        let label = self.name.as_deref().unwrap_or("metrics");
        let Some(sink) = self.sink.as_mut() else {
            return;
        };

        for (key, value) in results.iter() {
            if !self.filter.matches(key) {
                trace!(recorder = %label, key, "Skipping metric not in record_only");
                continue;
            }
            let tag = match metric_group {
                Some(g) => format!("{}_{}", g, key),
                None => key.to_string(),
            };
            match sink.add_scalar(&tag, value, step) {
                Ok(()) => debug!(recorder = %label, tag = %tag, value, step, "Logged metric"),
                Err(e) => {
                    warn!(recorder = %label, tag = %tag, error = %e, "Failed to log metric");
                    issues.push(FinalizeIssue::Sink {
                        tag,
                        message: e.to_string(),
                    });
                }
            }
        }

        if let Err(e) = sink.flush() {
            warn!(recorder = %label, error = %e, "Failed to flush metric sink");
            issues.push(FinalizeIssue::Sink {
                tag: String::new(),
                message: e.to_string(),
            });
        }
    }

    // ------------------------------------------------------------------------
    // Lookups and lifecycle
    // ------------------------------------------------------------------------

    /// Value of `key` from the last finalize.
    pub fn get(&self, key: &str) -> Option<f64> {
        self.current_results.get(key)
    }

    pub fn get_or(&self, key: &str, default: f64) -> f64 {
        self.get(key).unwrap_or(default)
    }

    pub fn results(&self) -> &MetricResults {
        &self.current_results
    }

    /// Failures absorbed by the last finalize.
    pub fn issues(&self) -> &[FinalizeIssue] {
        &self.issues
    }

    /// Clears buffers, results and issues. Configuration and sink are kept.
    pub fn reset(&mut self) {
        self.buffers.clear();
        self.current_results.clear();
        self.issues.clear();
    }

    /// Group keys with buffered data, in insertion order.
    pub fn buffered_groups(&self) -> Vec<Option<&str>> {
        self.buffers
            .iter()
            .filter(|b| !b.is_empty())
            .map(|b| b.key.as_deref())
            .collect()
    }

    /// Number of pairs buffered for `group`.
    pub fn buffered_len(&self, group: Option<&str>) -> usize {
        self.buffers
            .iter()
            .find(|b| b.key.as_deref() == group)
            .map_or(0, GroupBuffer::len)
    }

    /// Independent recorder with the same configuration and metrics, empty
    /// buffers and no sink.
    pub fn fresh(&self) -> Self {
        Self {
            name: self.name.clone(),
            config: self.config.clone(),
            metrics: self.metrics.clone(),
            buffers: Vec::new(),
            current_results: MetricResults::new(),
            issues: Vec::new(),
            sink: None,
            filter: RecordFilter::allow_all(),
        }
    }

    // ------------------------------------------------------------------------
    // Bulk construction
    // ------------------------------------------------------------------------

    /// One named recorder per entry of `names`, sharing `config`.
    ///
    /// When the config has a sink section, each recorder writes under its
    /// own `log_dir/<name>` directory.
    pub fn create_instances<S: AsRef<str>>(
        config: &MetricConfig,
        registry: &MetricRegistry,
        names: &[S],
    ) -> Result<HashMap<String, MetricRecorder>, RecorderError> {
        names
            .iter()
            .map(|name| {
                let name = name.as_ref();
                let recorder =
                    Self::build(config.clone(), registry, Some(name))?.with_name(name);
                Ok((name.to_string(), recorder))
            })
            .collect()
    }

    /// Loads a YAML config and builds it against the built-in registry.
    pub fn from_yaml(path: impl AsRef<Path>) -> Result<Self, RecorderError> {
        let config = MetricConfig::from_yaml_file(path)?;
        Self::new(config, &MetricRegistry::with_builtins())
    }

    pub fn from_yaml_multi<S: AsRef<str>>(
        path: impl AsRef<Path>,
        names: &[S],
    ) -> Result<HashMap<String, MetricRecorder>, RecorderError> {
        let config = MetricConfig::from_yaml_file(path)?;
        Self::create_instances(&config, &MetricRegistry::with_builtins(), names)
    }
}

fn ensure_same_shape(predictions: &ArrayD<f32>, targets: &ArrayD<f32>) -> Result<(), RecorderError> {
    if predictions.shape() != targets.shape() {
        return Err(RecorderError::ShapeMismatch {
            predictions: predictions.shape().to_vec(),
            targets: targets.shape().to_vec(),
        });
    }
    Ok(())
}

impl fmt::Debug for MetricRecorder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MetricRecorder")
            .field("name", &self.name)
            .field("metrics", &self.metrics)
            .field("buffered_groups", &self.buffered_groups())
            .field("current_results", &self.current_results)
            .field("has_sink", &self.sink.is_some())
            .finish()
    }
}

impl fmt::Display for MetricRecorder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "MetricRecorder:")?;
        writeln!(f, "Configured Metrics:")?;
        for m in &self.metrics {
            writeln!(f, "  {}: {}", m.name, m.function)?;
        }
        write!(f, "Current Results:")?;
        for (key, value) in self.current_results.iter() {
            write!(f, "\n  {}: {:.4}", key, value)?;
        }
        Ok(())
    }
}
