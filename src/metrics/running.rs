// --- File: src/metrics/running.rs ---

//! Cross-batch and cross-epoch bookkeeping for recorded metrics.
//!
//! `RunningMean` averages per-batch losses within an epoch, `MetricHistory`
//! keeps every epoch's results, and `EarlyStopping` watches one result key.
//! Both know which direction is an improvement for each key, derived from
//! the metric that produced it.

use super::Metric;
use crate::recorder::MetricResults;
use crate::registry::ResolvedMetric;
use std::collections::HashMap;

/// Online mean.
///
/// Uses the incremental update for numerical stability.
#[derive(Debug, Clone, Default)]
pub struct RunningMean {
    mean: f64,
    count: usize,
}

impl RunningMean {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a value.
    pub fn update(&mut self, value: f64) {
        self.count += 1;
        let delta = value - self.mean;
        self.mean += delta / self.count as f64;
    }

    /// Adds several values.
    pub fn update_batch(&mut self, values: &[f64]) {
        for &v in values {
            self.update(v);
        }
    }

    /// Current mean, or `None` before the first value.
    pub fn compute(&self) -> Option<f64> {
        if self.count == 0 {
            None
        } else {
            Some(self.mean)
        }
    }

    pub fn count(&self) -> usize {
        self.count
    }

    pub fn reset(&mut self) {
        self.mean = 0.0;
        self.count = 0;
    }
}

/// Which way a result key improves.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Lower is better (loss, MAE, MSE, ...)
    Min,
    /// Higher is better (accuracy, F1, R², ...)
    Max,
}

impl Direction {
    /// Direction of the values produced by `metric`.
    pub fn of(metric: &dyn Metric) -> Self {
        if metric.higher_is_better() {
            Direction::Max
        } else {
            Direction::Min
        }
    }

    fn improves(self, value: f64, best: f64, min_delta: f64) -> bool {
        match self {
            Direction::Min => value < best - min_delta,
            Direction::Max => value > best + min_delta,
        }
    }
}

/// Per-epoch history of result mappings.
#[derive(Debug, Clone, Default)]
pub struct MetricHistory {
    /// Values per key, one entry per epoch the key appeared in
    history: HashMap<String, Vec<(usize, f64)>>,
    /// Best value per key: (value, epoch)
    best: HashMap<String, (f64, usize)>,
    /// Explicit direction per result key
    key_directions: HashMap<String, Direction>,
    /// Direction per metric name, matched as a `{name}_` key prefix
    metric_directions: Vec<(String, Direction)>,
    epoch: usize,
}

impl MetricHistory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Takes the direction of every key produced by `metrics` from the
    /// metric itself, so `mae_T` is minimised and `accuracy_T` maximised.
    pub fn with_metrics(mut self, metrics: &[ResolvedMetric]) -> Self {
        for resolved in metrics {
            self.metric_directions.push((
                format!("{}_", resolved.name),
                Direction::of(resolved.metric.as_ref()),
            ));
        }
        self
    }

    /// Overrides the direction used for one result key.
    pub fn with_direction(mut self, key: &str, direction: Direction) -> Self {
        self.key_directions.insert(key.to_string(), direction);
        self
    }

    /// Explicit override first, then the metric whose name is the longest
    /// prefix of `key`. Remaining keys starting with `loss` are minimised
    /// and everything else is maximised.
    pub fn direction_for(&self, key: &str) -> Direction {
        if let Some(direction) = self.key_directions.get(key) {
            return *direction;
        }
        let by_metric = self
            .metric_directions
            .iter()
            .filter(|(prefix, _)| key.starts_with(prefix.as_str()))
            .max_by_key(|(prefix, _)| prefix.len())
            .map(|(_, direction)| *direction);
        match by_metric {
            Some(direction) => direction,
            None if key.starts_with("loss") => Direction::Min,
            None => Direction::Max,
        }
    }

    /// Stores one epoch's results and advances the epoch counter.
    pub fn end_epoch(&mut self, results: &MetricResults) {
        for (name, value) in results.iter() {
            self.history
                .entry(name.to_string())
                .or_default()
                .push((self.epoch, value));

            let direction = self.direction_for(name);
            let is_better = match self.best.get(name) {
                Some((best_val, _)) => direction.improves(value, *best_val, 0.0),
                None => true,
            };
            if is_better {
                self.best.insert(name.to_string(), (value, self.epoch));
            }
        }
        self.epoch += 1;
    }

    /// Values of `name` as `(epoch, value)` pairs.
    pub fn get_history(&self, name: &str) -> Option<&Vec<(usize, f64)>> {
        self.history.get(name)
    }

    pub fn get_best(&self, name: &str) -> Option<(f64, usize)> {
        self.best.get(name).copied()
    }

    pub fn get_last(&self, name: &str) -> Option<f64> {
        self.history
            .get(name)
            .and_then(|h| h.last().map(|(_, v)| *v))
    }

    /// Number of completed epochs.
    pub fn epochs(&self) -> usize {
        self.epoch
    }

    /// Sorted key names.
    pub fn metric_names(&self) -> Vec<&String> {
        let mut names: Vec<&String> = self.history.keys().collect();
        names.sort();
        names
    }

    /// Summary for every key.
    pub fn summary(&self) -> HashMap<String, MetricSummary> {
        self.history
            .iter()
            .map(|(name, history)| {
                let best = self.best.get(name).copied();
                let mean = if history.is_empty() {
                    None
                } else {
                    Some(history.iter().map(|(_, v)| v).sum::<f64>() / history.len() as f64)
                };
                let summary = MetricSummary {
                    last: history.last().map(|(_, v)| *v),
                    best_value: best.map(|(v, _)| v),
                    best_epoch: best.map(|(_, e)| e),
                    mean,
                    epochs: history.len(),
                };
                (name.clone(), summary)
            })
            .collect()
    }

    /// One line per key: last value, best value and the epoch it was reached.
    pub fn format_summary(&self) -> String {
        let summary = self.summary();
        self.metric_names()
            .into_iter()
            .filter_map(|name| {
                summary.get(name).map(|s| {
                    format!(
                        "{}: last {:.4} | best {:.4} (epoch {})",
                        name,
                        s.last.unwrap_or(f64::NAN),
                        s.best_value.unwrap_or(f64::NAN),
                        s.best_epoch.unwrap_or(0)
                    )
                })
            })
            .collect::<Vec<_>>()
            .join("\n")
    }

    pub fn reset(&mut self) {
        self.history.clear();
        self.best.clear();
        self.epoch = 0;
    }
}

/// Summary of one key across epochs.
#[derive(Debug, Clone, PartialEq)]
pub struct MetricSummary {
    pub last: Option<f64>,
    pub best_value: Option<f64>,
    pub best_epoch: Option<usize>,
    /// Mean over all recorded epochs
    pub mean: Option<f64>,
    pub epochs: usize,
}

/// Stops a run once a result key has not improved for `patience` epochs.
#[derive(Debug, Clone)]
pub struct EarlyStopping {
    key: String,
    direction: Direction,
    patience: usize,
    /// Minimum change that counts as improvement
    min_delta: f64,
    /// Best value so far and its epoch
    best: Option<(f64, usize)>,
    stale_epochs: usize,
}

impl EarlyStopping {
    pub fn new(key: &str, direction: Direction, patience: usize) -> Self {
        Self {
            key: key.to_string(),
            direction,
            patience,
            min_delta: 0.0,
            best: None,
            stale_epochs: 0,
        }
    }

    /// Watches `key` in the direction `history` uses for it.
    pub fn watching(key: &str, history: &MetricHistory, patience: usize) -> Self {
        Self::new(key, history.direction_for(key), patience)
    }

    pub fn with_min_delta(mut self, min_delta: f64) -> Self {
        self.min_delta = min_delta;
        self
    }

    /// Feeds one epoch's value; returns whether the run should stop.
    pub fn observe(&mut self, value: f64, epoch: usize) -> bool {
        let improved = match self.best {
            Some((best, _)) => self.direction.improves(value, best, self.min_delta),
            None => true,
        };
        if improved {
            self.best = Some((value, epoch));
            self.stale_epochs = 0;
        } else {
            self.stale_epochs += 1;
        }
        self.should_stop()
    }

    /// Looks up the watched key in `results`; `None` when it is absent.
    pub fn observe_results(&mut self, results: &MetricResults, epoch: usize) -> Option<bool> {
        let value = results.get(&self.key)?;
        Some(self.observe(value, epoch))
    }

    pub fn should_stop(&self) -> bool {
        self.stale_epochs > 0 && self.stale_epochs >= self.patience
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn direction(&self) -> Direction {
        self.direction
    }

    /// Best value and the epoch it was reached.
    pub fn best(&self) -> Option<(f64, usize)> {
        self.best
    }

    pub fn stale_epochs(&self) -> usize {
        self.stale_epochs
    }

    pub fn reset(&mut self) {
        self.best = None;
        self.stale_epochs = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MetricConfig;
    use crate::registry::MetricRegistry;

    fn results(entries: &[(&str, f64)]) -> MetricResults {
        let mut r = MetricResults::new();
        for (k, v) in entries {
            r.insert(k, *v);
        }
        r
    }

    fn resolved(config: MetricConfig) -> Vec<ResolvedMetric> {
        MetricRegistry::with_builtins().resolve(&config).unwrap()
    }

    #[test]
    fn test_running_mean() {
        let mut rm = RunningMean::new();
        assert_eq!(rm.compute(), None);
        rm.update_batch(&[1.0, 2.0, 3.0, 4.0, 5.0]);

        assert!((rm.compute().unwrap() - 3.0).abs() < 1e-10);
        assert_eq!(rm.count(), 5);
    }

    #[test]
    fn test_metric_history_defaults() {
        let mut history = MetricHistory::new();

        history.end_epoch(&results(&[("loss", 1.0), ("accuracy_A", 0.7)]));
        history.end_epoch(&results(&[("loss", 0.6), ("accuracy_A", 0.65)]));
        history.end_epoch(&results(&[("loss", 0.8), ("accuracy_A", 0.9)]));

        assert_eq!(history.epochs(), 3);
        assert_eq!(history.get_best("loss"), Some((0.6, 1)));
        assert_eq!(history.get_best("accuracy_A"), Some((0.9, 2)));
        assert_eq!(history.get_last("loss"), Some(0.8));

        let summary = history.summary();
        assert_eq!(summary["accuracy_A"].epochs, 3);
        assert!((summary["loss"].mean.unwrap() - 0.8).abs() < 1e-10);
    }

    #[test]
    fn test_metric_history_error_metrics_are_minimised() {
        let metrics = resolved(
            MetricConfig::new()
                .with_metric("mae", "regression.mae")
                .with_metric("max_error", "regression.max_error")
                .with_metric("r2", "regression.r2"),
        );
        let mut history = MetricHistory::new().with_metrics(&metrics);

        history.end_epoch(&results(&[("mae_T", 0.2), ("max_error_T", 1.0), ("r2_T", 0.4)]));
        history.end_epoch(&results(&[("mae_T", 0.9), ("max_error_T", 0.5), ("r2_T", 0.8)]));

        assert_eq!(history.get_best("mae_T"), Some((0.2, 0)));
        assert_eq!(history.get_best("max_error_T"), Some((0.5, 1)));
        assert_eq!(history.get_best("r2_T"), Some((0.8, 1)));
        assert!(history.format_summary().contains("mae_T: last 0.9000 | best 0.2000 (epoch 0)"));
    }

    #[test]
    fn test_direction_longest_prefix_and_override() {
        let metrics = resolved(
            MetricConfig::new()
                .with_metric("f1", "classification.f1")
                .with_metric("f1_err", "regression.mae"),
        );
        let history = MetricHistory::new()
            .with_metrics(&metrics)
            .with_direction("f1_A", Direction::Min);

        assert_eq!(history.direction_for("f1_err_A"), Direction::Min);
        assert_eq!(history.direction_for("f1_T"), Direction::Max);
        assert_eq!(history.direction_for("f1_A"), Direction::Min);
        assert_eq!(history.direction_for("loss"), Direction::Min);
    }

    #[test]
    fn test_early_stopping_patience() {
        let mut es = EarlyStopping::new("loss", Direction::Min, 3);

        assert!(!es.observe(1.0, 0));
        assert!(!es.observe(0.9, 1));
        assert!(!es.observe(0.8, 2));

        assert!(!es.observe(0.85, 3));
        assert!(!es.observe(0.9, 4));
        assert!(es.observe(0.95, 5));

        assert_eq!(es.stale_epochs(), 3);
        assert_eq!(es.best(), Some((0.8, 2)));
    }

    #[test]
    fn test_early_stopping_follows_metric_direction() {
        let metrics = resolved(MetricConfig::new().with_metric("mse", "regression.mse"));
        let history = MetricHistory::new().with_metrics(&metrics);
        let mut es = EarlyStopping::watching("mse_AUDIO", &history, 1).with_min_delta(0.01);
        assert_eq!(es.direction(), Direction::Min);

        assert_eq!(es.observe_results(&results(&[("mse_AUDIO", 0.5)]), 0), Some(false));
        assert_eq!(es.observe_results(&results(&[("loss", 0.1)]), 1), None);
        assert_eq!(es.observe_results(&results(&[("mse_AUDIO", 0.3)]), 2), Some(false));
        // within min_delta: not an improvement
        assert_eq!(es.observe_results(&results(&[("mse_AUDIO", 0.295)]), 3), Some(true));
        assert_eq!(es.best(), Some((0.3, 2)));

        es.reset();
        assert!(!es.should_stop());
        assert_eq!(es.best(), None);
    }
}
