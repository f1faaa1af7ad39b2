// --- File: src/recorder/buffer.rs ---

//! Per-group buffers of prediction/target pairs.

use ndarray::{concatenate, ArrayD, ArrayViewD, Axis, ShapeError};
use std::collections::HashMap;

/// Marker for an absent modality in pattern-style group keys (`"AzT"`).
const MISSING_MODALITY: char = 'z';

/// Label used in result keys for `group`.
///
/// Missing-modality markers are dropped and the rest upper-cased
/// (`"audio"` → `"AUDIO"`, `"AzT"` → `"AT"`). Without a group (or with an
/// empty one) the metric name stands in.
pub fn group_label(group: Option<&str>, metric_name: &str) -> String {
    match group {
        Some(g) if !g.is_empty() => g.replace(MISSING_MODALITY, "").to_uppercase(),
        _ => metric_name.to_string(),
    }
}

/// `{metric}_{label}` or `{metric}_{sub}_{label}`.
pub fn result_key(metric_name: &str, sub_key: Option<&str>, label: &str) -> String {
    match sub_key {
        Some(sub) => format!("{}_{}_{}", metric_name, sub, label),
        None => format!("{}_{}", metric_name, label),
    }
}

/// Everything buffered for one group during an epoch.
#[derive(Debug, Clone)]
pub(crate) struct GroupBuffer {
    pub key: Option<String>,
    predictions: Vec<ArrayD<f32>>,
    targets: Vec<ArrayD<f32>>,
}

impl GroupBuffer {
    pub fn new(key: Option<&str>) -> Self {
        Self {
            key: key.map(str::to_string),
            predictions: Vec::new(),
            targets: Vec::new(),
        }
    }

    pub fn push(&mut self, predictions: ArrayD<f32>, targets: ArrayD<f32>) {
        self.predictions.push(predictions);
        self.targets.push(targets);
    }

    /// Number of buffered pairs.
    pub fn len(&self) -> usize {
        self.predictions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.predictions.is_empty()
    }

    /// Concatenates every buffered pair along the batch axis, returning
    /// `(predictions, targets)`.
    pub fn concatenated(&self) -> Result<(ArrayD<f32>, ArrayD<f32>), ShapeError> {
        Ok((concat(&self.predictions)?, concat(&self.targets)?))
    }
}

fn concat(arrays: &[ArrayD<f32>]) -> Result<ArrayD<f32>, ShapeError> {
    let views: Vec<ArrayViewD<'_, f32>> = arrays.iter().map(|a| a.view()).collect();
    concatenate(Axis(0), &views)
}

/// Sample indices per distinct label, in order of first appearance.
pub(crate) fn partition<S: AsRef<str>>(groups: &[S]) -> Vec<(&str, Vec<usize>)> {
    let mut order: Vec<(&str, Vec<usize>)> = Vec::new();
    let mut slots: HashMap<&str, usize> = HashMap::new();
    for (i, g) in groups.iter().enumerate() {
        let g = g.as_ref();
        let slot = *slots.entry(g).or_insert_with(|| {
            order.push((g, Vec::new()));
            order.len() - 1
        });
        order[slot].1.push(i);
    }
    order
}
