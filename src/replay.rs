// --- File: src/replay.rs ---

//! Replays recorded batches through a recorder, epoch by epoch.
//!
//! Input format:
//!
//! ```json
//! {"epochs": [{"batches": [
//!     {"shape": [3], "predictions": [1, 0, 1], "targets": [1, 0, 0],
//!      "group": "a", "loss": 0.7},
//!     {"shape": [2], "predictions": [1, 0], "targets": [1, 1],
//!      "groups": ["a", "t"]}
//! ]}]}
//! ```
//!
//! A batch with `groups` (one label per sample) is split with
//! `update_all`; `group` is then ignored.

use crate::metrics::{Direction, EarlyStopping, MetricHistory, RunningMean};
use crate::recorder::{MetricRecorder, MetricResults, RecorderError};
use ndarray::{ArrayD, IxDyn, ShapeError};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{info, warn};

#[derive(Error, Debug)]
pub enum ReplayError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid batch file: {0}")]
    Json(#[from] serde_json::Error),

    #[error("epoch {epoch} batch {batch}: {source}")]
    Shape {
        epoch: usize,
        batch: usize,
        #[source]
        source: ShapeError,
    },

    #[error(transparent)]
    Recorder(#[from] RecorderError),
}

/// Every epoch of a recorded run.
#[derive(Debug, Clone, Deserialize)]
pub struct ReplayInput {
    pub epochs: Vec<EpochBatches>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EpochBatches {
    pub batches: Vec<RecordedBatch>,
}

/// One batch as flat row-major values plus its shape.
#[derive(Debug, Clone, Deserialize)]
pub struct RecordedBatch {
    pub shape: Vec<usize>,
    pub predictions: Vec<f32>,
    pub targets: Vec<f32>,
    /// One label per sample; takes precedence over `group`
    #[serde(default)]
    pub groups: Option<Vec<String>>,
    #[serde(default)]
    pub group: Option<String>,
    #[serde(default)]
    pub loss: Option<f64>,
}

impl ReplayInput {
    pub fn from_json_str(json: &str) -> Result<Self, ReplayError> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ReplayError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|source| ReplayError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json_str(&content)
    }
}

impl RecordedBatch {
    fn into_arrays(self) -> Result<(ArrayD<f32>, ArrayD<f32>), ShapeError> {
        let predictions = ArrayD::from_shape_vec(IxDyn(&self.shape), self.predictions)?;
        let targets = ArrayD::from_shape_vec(IxDyn(&self.shape), self.targets)?;
        Ok((predictions, targets))
    }
}

/// How results are tagged and when to stop.
#[derive(Debug, Clone, Default)]
pub struct ReplayOptions {
    /// Prefix for sink tags (e.g. `val`)
    pub metric_group: Option<String>,
    /// Result key watched for early stopping
    pub monitor: Option<String>,
    /// Overrides the direction derived from the monitored metric
    pub direction: Option<Direction>,
    pub patience: usize,
}

/// What a replay produced.
#[derive(Debug, Clone)]
pub struct ReplayOutcome {
    /// Results of every epoch that ran
    pub epochs: Vec<MetricResults>,
    pub history: MetricHistory,
    /// Epoch at which early stopping fired
    pub stopped_at: Option<usize>,
}

/// Feeds every epoch of `input` into `recorder`, finalizing with the mean
/// batch loss and `options.metric_group` as the sink prefix. `on_epoch` sees
/// each epoch's results before the recorder is reset.
pub fn replay<F>(
    recorder: &mut MetricRecorder,
    input: ReplayInput,
    options: &ReplayOptions,
    mut on_epoch: F,
) -> Result<ReplayOutcome, ReplayError>
where
    F: FnMut(usize, &MetricResults),
{
    let mut history = MetricHistory::new().with_metrics(recorder.metrics());
    if let (Some(key), Some(direction)) = (&options.monitor, options.direction) {
        history = history.with_direction(key, direction);
    }
    let mut stopper = options
        .monitor
        .as_deref()
        .map(|key| EarlyStopping::watching(key, &history, options.patience));

    let mut epochs = Vec::with_capacity(input.epochs.len());
    let mut stopped_at = None;

    for (epoch, epoch_input) in input.epochs.into_iter().enumerate() {
        let mut loss = RunningMean::new();

        for (batch, recorded) in epoch_input.batches.into_iter().enumerate() {
            let batch_loss = recorded.loss;
            let groups = recorded.groups.clone();
            let group = recorded.group.clone();
            let (predictions, targets) = recorded
                .into_arrays()
                .map_err(|source| ReplayError::Shape {
                    epoch,
                    batch,
                    source,
                })?;

            match groups {
                Some(labels) => recorder.update_all(&predictions, &targets, labels.as_slice())?,
                None => recorder.update(&predictions, &targets, group.as_deref())?,
            }
            if let Some(l) = batch_loss {
                loss.update(l);
            }
        }

        let results = recorder.calculate_metrics(
            options.metric_group.as_deref(),
            Some(epoch as u64),
            loss.compute(),
        );
        for issue in recorder.issues() {
            warn!(epoch, "{}", issue);
        }

        on_epoch(epoch, &results);
        history.end_epoch(&results);
        recorder.reset();

        let stop = stopper
            .as_mut()
            .and_then(|s| s.observe_results(&results, epoch).map(|stop| (s, stop)));
        epochs.push(results);

        match stop {
            Some((s, true)) => {
                info!(epoch, key = s.key(), best = ?s.best(), "Early stopping");
                stopped_at = Some(epoch);
                break;
            }
            Some((_, false)) => {}
            None => {
                if let Some(key) = options.monitor.as_deref() {
                    warn!(epoch, key, "Monitored key missing from results");
                }
            }
        }
    }

    Ok(ReplayOutcome {
        epochs,
        history,
        stopped_at,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MetricConfig;
    use crate::registry::MetricRegistry;
    use crate::sink::MemorySink;

    const RUN: &str = r#"{"epochs": [
        {"batches": [
            {"shape": [3], "predictions": [1, 0, 1], "targets": [1, 0, 0], "group": "a", "loss": 1.0},
            {"shape": [4], "predictions": [1, 1, 0, 0], "targets": [1, 0, 0, 0],
             "groups": ["t", "a", "t", "a"], "group": "ignored", "loss": 0.5}
        ]},
        {"batches": [
            {"shape": [2], "predictions": [0, 0], "targets": [1, 1], "group": "a", "loss": 2.0},
            {"shape": [1], "predictions": [0], "targets": [1], "group": "a", "loss": 4.0}
        ]},
        {"batches": [
            {"shape": [2], "predictions": [0, 0], "targets": [1, 1], "group": "a"}
        ]},
        {"batches": [
            {"shape": [2], "predictions": [1, 1], "targets": [1, 1], "group": "a"}
        ]}
    ]}"#;

    fn accuracy_recorder() -> MetricRecorder {
        let config = MetricConfig::new().with_metric("accuracy", "classification.accuracy");
        MetricRecorder::new(config, &MetricRegistry::with_builtins()).unwrap()
    }

    #[test]
    fn test_replay_routes_averages_and_stops() {
        let sink = MemorySink::new();
        let mut recorder = accuracy_recorder().with_sink(sink.clone(), None).unwrap();
        let options = ReplayOptions {
            metric_group: Some("val".to_string()),
            monitor: Some("accuracy_A".to_string()),
            direction: None,
            patience: 2,
        };

        let mut seen = Vec::new();
        let outcome = replay(
            &mut recorder,
            ReplayInput::from_json_str(RUN).unwrap(),
            &options,
            |epoch, results| seen.push((epoch, results.len())),
        )
        .unwrap();

        // epoch 3 would improve, but patience ran out at epoch 2
        assert_eq!(outcome.stopped_at, Some(2));
        assert_eq!(outcome.epochs.len(), 3);
        assert_eq!(seen, vec![(0, 3), (1, 2), (2, 1)]);

        let first = &outcome.epochs[0];
        assert!((first.get("loss").unwrap() - 0.75).abs() < 1e-12);
        // a: [1,0,1] vs [1,0,0] plus rows 1 and 3 of the mixed batch
        assert!((first.get("accuracy_A").unwrap() - 0.6).abs() < 1e-9);
        assert_eq!(first.get("accuracy_T"), Some(1.0));
        assert_eq!(first.get("accuracy_IGNORED"), None);

        assert!((outcome.epochs[1].get("loss").unwrap() - 3.0).abs() < 1e-12);
        assert_eq!(outcome.epochs[2].get("loss"), None);
        assert_eq!(outcome.history.get_best("accuracy_A"), Some((0.6, 0)));

        let records = sink.records();
        assert_eq!(records[0].tag, "val_loss");
        assert_eq!(records[0].step, 0);
        assert!(records
            .iter()
            .any(|r| r.tag == "val_accuracy_A" && r.step == 1 && r.value == 0.0));
        assert!(recorder.buffered_groups().is_empty());
    }

    #[test]
    fn test_replay_minimises_error_metrics() {
        let config = MetricConfig::new().with_metric("mae", "regression.mae");
        let mut recorder = MetricRecorder::new(config, &MetricRegistry::with_builtins()).unwrap();
        let run = r#"{"epochs": [
            {"batches": [{"shape": [1], "predictions": [0.5], "targets": [0], "group": "a"}]},
            {"batches": [{"shape": [1], "predictions": [0.2], "targets": [0], "group": "a"}]},
            {"batches": [{"shape": [1], "predictions": [0.4], "targets": [0], "group": "a"}]},
            {"batches": [{"shape": [1], "predictions": [0.6], "targets": [0], "group": "a"}]}
        ]}"#;
        let options = ReplayOptions {
            monitor: Some("mae_A".to_string()),
            patience: 2,
            ..ReplayOptions::default()
        };

        let outcome = replay(
            &mut recorder,
            ReplayInput::from_json_str(run).unwrap(),
            &options,
            |_, _| {},
        )
        .unwrap();

        assert_eq!(outcome.stopped_at, Some(3));
        let (best, epoch) = outcome.history.get_best("mae_A").unwrap();
        assert!((best - 0.2).abs() < 1e-6);
        assert_eq!(epoch, 1);
    }

    #[test]
    fn test_replay_direction_override() {
        let mut recorder = accuracy_recorder();
        let options = ReplayOptions {
            monitor: Some("accuracy_A".to_string()),
            direction: Some(Direction::Min),
            patience: 1,
            ..ReplayOptions::default()
        };
        let outcome = replay(
            &mut recorder,
            ReplayInput::from_json_str(RUN).unwrap(),
            &options,
            |_, _| {},
        )
        .unwrap();
        // 0.6 -> 0.0 improves when minimising; 0.0 -> 0.0 does not
        assert_eq!(outcome.stopped_at, Some(2));
        assert_eq!(outcome.history.get_best("accuracy_A"), Some((0.0, 1)));
    }

    #[test]
    fn test_replay_rejects_bad_shape() {
        let mut recorder = accuracy_recorder();
        let run = r#"{"epochs": [{"batches": [
            {"shape": [2], "predictions": [1, 0, 1], "targets": [1, 0, 1]}
        ]}]}"#;
        let err = replay(
            &mut recorder,
            ReplayInput::from_json_str(run).unwrap(),
            &ReplayOptions::default(),
            |_, _| {},
        )
        .unwrap_err();
        assert!(matches!(err, ReplayError::Shape { epoch: 0, batch: 0, .. }));

        let run = r#"{"epochs": [{"batches": [
            {"shape": [2], "predictions": [1, 0], "targets": [1, 0], "groups": ["a"]}
        ]}]}"#;
        let err = replay(
            &mut recorder,
            ReplayInput::from_json_str(run).unwrap(),
            &ReplayOptions::default(),
            |_, _| {},
        )
        .unwrap_err();
        assert!(matches!(
            err,
            ReplayError::Recorder(RecorderError::GroupCountMismatch { groups: 1, batch: 2 })
        ));
    }

    #[test]
    fn test_input_from_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = ReplayInput::from_file(dir.path().join("run.json")).unwrap_err();
        assert!(matches!(err, ReplayError::Io { .. }));
        assert!(matches!(
            ReplayInput::from_json_str("{\"epochs\": 3}"),
            Err(ReplayError::Json(_))
        ));
    }
}
