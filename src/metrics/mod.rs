// --- File: src/metrics/mod.rs ---

//! Metric functions evaluated by the recorder at epoch boundaries.
//!
//! Every metric is a stateless reducer: it receives the whole epoch's
//! concatenated targets and predictions for one group and returns either a
//! single scalar or a set of named sub-values.
//!
//! - **Classification**: Accuracy, Balanced Accuracy, Precision, Recall, F1, Top-K
//! - **Regression**: MSE, MAE, RMSE, R², MAPE, Explained Variance, Max Error, Pearson
//! - **Sentiment**: binarised has0/non0 scores and clipped multi-class accuracy
//!
//! # Example
//!
//! ```rust,ignore
//! use mml_metrics::metrics::{Accuracy, Metric, MetricValue};
//!
//! let accuracy = Accuracy::new();
//! let value = accuracy.compute(&targets, &predictions)?;
//! assert_eq!(value, MetricValue::Scalar(2.0 / 3.0));
//! ```

pub mod classification;
pub mod regression;
pub mod running;
pub mod sentiment;

pub use classification::{
    Accuracy, Average, BalancedAccuracy, BinaryConfusionMatrix, ConfusionCounts, F1Score,
    MultiClassConfusionMatrix, Precision, PrecisionRecallF1, Recall, TopKAccuracy,
};
pub use regression::{
    ExplainedVariance, MaxError, MeanAbsoluteError, MeanAbsolutePercentageError,
    MeanSquaredError, PearsonCorrelation, RSquared, RootMeanSquaredError,
};
pub use running::{Direction, EarlyStopping, MetricHistory, MetricSummary, RunningMean};
pub use sentiment::{BinarySentiment, MulticlassSentiment};

use ndarray::{ArrayD, Axis};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

/// Failure of a single metric computation.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum MetricError {
    #[error("metric received no samples")]
    Empty,

    #[error("prediction shape {predictions:?} does not match target shape {targets:?}")]
    ShapeMismatch {
        predictions: Vec<usize>,
        targets: Vec<usize>,
    },

    #[error("expected {expected}, got array of shape {shape:?}")]
    InvalidShape {
        expected: &'static str,
        shape: Vec<usize>,
    },

    #[error("{0}")]
    Unsupported(String),

    #[error("{0}")]
    Custom(String),
}

/// Value produced by a metric.
#[derive(Debug, Clone, PartialEq)]
pub enum MetricValue {
    /// A single number, reported as `{metric}_{group}`.
    Scalar(f64),
    /// Named sub-values, each reported as `{metric}_{sub}_{group}`.
    Named(Vec<(String, f64)>),
}

impl MetricValue {
    /// Builds a named value from `(name, value)` pairs, keeping their order.
    pub fn named<I, S>(entries: I) -> Self
    where
        I: IntoIterator<Item = (S, f64)>,
        S: Into<String>,
    {
        MetricValue::Named(entries.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }

    pub fn as_scalar(&self) -> Option<f64> {
        match self {
            MetricValue::Scalar(v) => Some(*v),
            MetricValue::Named(_) => None,
        }
    }
}

impl From<f64> for MetricValue {
    fn from(value: f64) -> Self {
        MetricValue::Scalar(value)
    }
}

/// Base trait for every metric the registry can build.
pub trait Metric: Send + Sync {
    /// Reduces the epoch's data for one group. Arguments follow the
    /// `(targets, predictions)` order used throughout the suite.
    fn compute(
        &self,
        targets: &ArrayD<f32>,
        predictions: &ArrayD<f32>,
    ) -> Result<MetricValue, MetricError>;

    /// Returns the metric's display name.
    fn name(&self) -> &str;

    /// Whether larger values are better. Error metrics return `false`.
    fn higher_is_better(&self) -> bool {
        true
    }
}

/// Metric backed by a plain closure.
pub struct FnMetric<F> {
    name: String,
    func: F,
    higher_is_better: bool,
}

impl<F> FnMetric<F>
where
    F: Fn(&ArrayD<f32>, &ArrayD<f32>) -> Result<MetricValue, MetricError> + Send + Sync,
{
    pub fn new(name: &str, func: F) -> Self {
        Self {
            name: name.to_string(),
            func,
            higher_is_better: true,
        }
    }

    /// Marks the metric as an error measure (lower is better).
    pub fn lower_is_better(mut self) -> Self {
        self.higher_is_better = false;
        self
    }
}

impl<F> Metric for FnMetric<F>
where
    F: Fn(&ArrayD<f32>, &ArrayD<f32>) -> Result<MetricValue, MetricError> + Send + Sync,
{
    fn compute(
        &self,
        targets: &ArrayD<f32>,
        predictions: &ArrayD<f32>,
    ) -> Result<MetricValue, MetricError> {
        (self.func)(targets, predictions)
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn higher_is_better(&self) -> bool {
        self.higher_is_better
    }
}

/// Errors raised while reading keyword arguments.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum KwargsError {
    #[error("unknown keyword argument '{0}'")]
    Unknown(String),

    #[error("keyword argument '{name}' must be {expected}, got {found}")]
    WrongType {
        name: String,
        expected: &'static str,
        found: String,
    },

    #[error("keyword argument '{name}' is invalid: {reason}")]
    Invalid { name: String, reason: String },
}

/// Keyword arguments attached to a configured metric.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MetricKwargs(Map<String, Value>);

impl MetricKwargs {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds an argument.
    pub fn with(mut self, name: &str, value: impl Into<Value>) -> Self {
        self.0.insert(name.to_string(), value.into());
        self
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.0.iter()
    }

    /// Rejects any argument not listed in `allowed`.
    pub fn ensure_only(&self, allowed: &[&str]) -> Result<(), KwargsError> {
        match self.0.keys().find(|k| !allowed.contains(&k.as_str())) {
            Some(unknown) => Err(KwargsError::Unknown(unknown.clone())),
            None => Ok(()),
        }
    }

    pub fn get_f64(&self, name: &str) -> Result<Option<f64>, KwargsError> {
        match self.0.get(name) {
            None | Some(Value::Null) => Ok(None),
            Some(v) => v
                .as_f64()
                .map(Some)
                .ok_or_else(|| wrong_type(name, "a number", v)),
        }
    }

    pub fn get_usize(&self, name: &str) -> Result<Option<usize>, KwargsError> {
        match self.0.get(name) {
            None | Some(Value::Null) => Ok(None),
            Some(v) => v
                .as_u64()
                .map(|n| Some(n as usize))
                .ok_or_else(|| wrong_type(name, "a non-negative integer", v)),
        }
    }

    pub fn get_i64(&self, name: &str) -> Result<Option<i64>, KwargsError> {
        match self.0.get(name) {
            None | Some(Value::Null) => Ok(None),
            Some(v) => v
                .as_i64()
                .map(Some)
                .ok_or_else(|| wrong_type(name, "an integer", v)),
        }
    }

    pub fn get_str(&self, name: &str) -> Result<Option<&str>, KwargsError> {
        match self.0.get(name) {
            None | Some(Value::Null) => Ok(None),
            Some(v) => v
                .as_str()
                .map(Some)
                .ok_or_else(|| wrong_type(name, "a string", v)),
        }
    }

    pub fn get_bool(&self, name: &str) -> Result<Option<bool>, KwargsError> {
        match self.0.get(name) {
            None | Some(Value::Null) => Ok(None),
            Some(v) => v
                .as_bool()
                .map(Some)
                .ok_or_else(|| wrong_type(name, "a boolean", v)),
        }
    }
}

fn wrong_type(name: &str, expected: &'static str, found: &Value) -> KwargsError {
    KwargsError::WrongType {
        name: name.to_string(),
        expected,
        found: found.to_string(),
    }
}

/// Fails unless both arrays have the same shape and at least one element.
pub(crate) fn ensure_comparable(
    targets: &ArrayD<f32>,
    predictions: &ArrayD<f32>,
) -> Result<(), MetricError> {
    if targets.shape() != predictions.shape() {
        return Err(MetricError::ShapeMismatch {
            predictions: predictions.shape().to_vec(),
            targets: targets.shape().to_vec(),
        });
    }
    if targets.is_empty() {
        return Err(MetricError::Empty);
    }
    Ok(())
}

/// True when the last axis holds per-class scores (`[batch, classes]`, classes > 1).
pub(crate) fn has_class_axis(values: &ArrayD<f32>) -> bool {
    values.ndim() > 1 && values.shape().last().copied().unwrap_or(1) > 1
}

/// Resolves an array to one integer label per sample.
///
/// Score arrays are reduced by argmax over the last axis, everything else is
/// read as class indices.
pub(crate) fn class_labels(values: &ArrayD<f32>) -> Vec<i64> {
    if has_class_axis(values) {
        let last = Axis(values.ndim() - 1);
        values
            .lanes(last)
            .into_iter()
            .map(|lane| {
                lane.iter()
                    .enumerate()
                    .max_by(|a, b| a.1.partial_cmp(b.1).unwrap_or(std::cmp::Ordering::Equal))
                    .map(|(i, _)| i as i64)
                    .unwrap_or(0)
            })
            .collect()
    } else {
        values.iter().map(|v| v.round() as i64).collect()
    }
}

/// Labels for predictions, optionally thresholding binary scores.
pub(crate) fn predicted_labels(predictions: &ArrayD<f32>, threshold: Option<f32>) -> Vec<i64> {
    match threshold {
        Some(t) if !has_class_axis(predictions) => predictions
            .iter()
            .map(|&p| if p >= t { 1 } else { 0 })
            .collect(),
        _ => class_labels(predictions),
    }
}
