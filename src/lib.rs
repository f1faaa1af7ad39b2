// --- File: src/lib.rs ---

//! # mml-metrics: epoch-scoped metric recording for multimodal models
//!
//! A `MetricRecorder` buffers predictions and targets per modality group
//! while an epoch runs, then evaluates every configured metric on each
//! group's concatenated data and returns a flat mapping such as
//! `accuracy_AUDIO` or `f1_T`. Results can be streamed to a scalar sink
//! (`scalars.jsonl`) through a regex allow-list.
//!
//! ## Usage Example
//!
//! ```no_run
//! use mml_metrics::config::MetricConfig;
//! use mml_metrics::recorder::MetricRecorder;
//! use mml_metrics::registry::MetricRegistry;
//! use ndarray::{ArrayD, IxDyn};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! // 1. Describe the metrics
//! let config = MetricConfig::new()
//!     .with_metric("accuracy", "classification.accuracy")
//!     .with_metric("f1", "classification.f1");
//!
//! // 2. Build a recorder against the built-in registry
//! let mut recorder = MetricRecorder::new(config, &MetricRegistry::with_builtins())?;
//!
//! // 3. Feed batches during the epoch
//! let preds = ArrayD::from_shape_vec(IxDyn(&[3]), vec![1.0, 0.0, 1.0])?;
//! let targets = ArrayD::from_shape_vec(IxDyn(&[3]), vec![1.0, 0.0, 0.0])?;
//! recorder.update(&preds, &targets, Some("audio"))?;
//!
//! // 4. Evaluate at the epoch boundary
//! let results = recorder.finalize(Some(0.42));
//! assert!(results.get("accuracy_AUDIO").is_some());
//! recorder.reset();
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod metrics;
pub mod recorder;
pub mod registry;
pub mod replay;
pub mod sink;

pub use config::{ConfigError, MetricConfig};
pub use recorder::{FinalizeIssue, MetricRecorder, MetricResults, RecorderError};
pub use registry::MetricRegistry;
