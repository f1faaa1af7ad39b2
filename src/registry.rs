// --- File: src/registry.rs ---

//! Registry of metric factories, addressed by identifier.
//!
//! A configuration names metrics by identifier (`classification.f1`) plus
//! keyword arguments. The registry turns each entry into a ready `Metric`
//! when the recorder is built, so unknown identifiers and bad arguments fail
//! immediately instead of at the end of the first epoch.

use crate::config::MetricConfig;
use crate::metrics::{
    Accuracy, Average, BalancedAccuracy, BinarySentiment, ConfusionCounts, ExplainedVariance,
    F1Score, FnMetric, KwargsError, MaxError, MeanAbsoluteError, MeanAbsolutePercentageError,
    MeanSquaredError, Metric, MetricError, MetricKwargs, MetricValue, MulticlassSentiment,
    PearsonCorrelation, Precision, PrecisionRecallF1, RSquared, Recall, RootMeanSquaredError,
    TopKAccuracy,
};
use ndarray::ArrayD;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

/// Builds a metric from its keyword arguments.
pub type MetricFactory =
    Arc<dyn Fn(&MetricKwargs) -> Result<Box<dyn Metric>, KwargsError> + Send + Sync>;

#[derive(Error, Debug)]
pub enum RegistryError {
    #[error("metric '{metric}': unknown function '{function}'")]
    UnknownFunction { metric: String, function: String },

    #[error("metric '{metric}' ({function}): {source}")]
    InvalidKwargs {
        metric: String,
        function: String,
        #[source]
        source: KwargsError,
    },

    #[error("alias '{alias}' points to unregistered function '{target}'")]
    DanglingAlias { alias: String, target: String },
}

/// A configured metric ready to run.
#[derive(Clone)]
pub struct ResolvedMetric {
    /// Result-key prefix from the config
    pub name: String,
    /// Identifier as written in the config
    pub function: String,
    pub metric: Arc<dyn Metric>,
}

impl fmt::Debug for ResolvedMetric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResolvedMetric")
            .field("name", &self.name)
            .field("function", &self.function)
            .field("metric", &self.metric.name())
            .finish()
    }
}

#[derive(Clone, Default)]
pub struct MetricRegistry {
    factories: BTreeMap<String, MetricFactory>,
    aliases: BTreeMap<String, String>,
}

impl fmt::Debug for MetricRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MetricRegistry")
            .field("functions", &self.factories.keys().collect::<Vec<_>>())
            .field("aliases", &self.aliases)
            .finish()
    }
}

impl MetricRegistry {
    /// Empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with every built-in metric and the sklearn-style aliases.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        register_classification(&mut registry);
        register_regression(&mut registry);
        register_sentiment(&mut registry);
        register_sklearn_aliases(&mut registry);
        registry
    }

    /// Registers (or replaces) a factory under `id`.
    pub fn register<F>(&mut self, id: &str, factory: F) -> &mut Self
    where
        F: Fn(&MetricKwargs) -> Result<Box<dyn Metric>, KwargsError> + Send + Sync + 'static,
    {
        self.factories.insert(id.to_string(), Arc::new(factory));
        self
    }

    /// Registers a closure metric that takes no keyword arguments.
    pub fn register_fn<F>(&mut self, id: &str, func: F) -> &mut Self
    where
        F: Fn(&ArrayD<f32>, &ArrayD<f32>) -> Result<MetricValue, MetricError>
            + Send
            + Sync
            + Clone
            + 'static,
    {
        let name = id.to_string();
        self.register(id, move |kwargs| {
            kwargs.ensure_only(&[])?;
            let metric: Box<dyn Metric> = Box::new(FnMetric::new(&name, func.clone()));
            Ok(metric)
        })
    }

    /// Makes `alias` resolve to the already registered `target`.
    pub fn alias(&mut self, alias: &str, target: &str) -> Result<&mut Self, RegistryError> {
        if !self.factories.contains_key(target) {
            return Err(RegistryError::DanglingAlias {
                alias: alias.to_string(),
                target: target.to_string(),
            });
        }
        self.aliases.insert(alias.to_string(), target.to_string());
        Ok(self)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.factory(id).is_some()
    }

    /// Registered identifiers followed by aliases, each sorted.
    pub fn identifiers(&self) -> Vec<&str> {
        self.factories
            .keys()
            .chain(self.aliases.keys())
            .map(String::as_str)
            .collect()
    }

    /// Alias target for `id`, if `id` is an alias.
    pub fn alias_target(&self, id: &str) -> Option<&str> {
        self.aliases.get(id).map(String::as_str)
    }

    fn factory(&self, id: &str) -> Option<&MetricFactory> {
        let id = self.aliases.get(id).map(String::as_str).unwrap_or(id);
        self.factories.get(id)
    }

    /// Builds one metric.
    pub fn build(
        &self,
        name: &str,
        function: &str,
        kwargs: &MetricKwargs,
    ) -> Result<ResolvedMetric, RegistryError> {
        let factory = self
            .factory(function)
            .ok_or_else(|| RegistryError::UnknownFunction {
                metric: name.to_string(),
                function: function.to_string(),
            })?;
        let metric = factory(kwargs).map_err(|source| RegistryError::InvalidKwargs {
            metric: name.to_string(),
            function: function.to_string(),
            source,
        })?;
        Ok(ResolvedMetric {
            name: name.to_string(),
            function: function.to_string(),
            metric: Arc::from(metric),
        })
    }

    /// Builds every metric of `config`, in declaration order.
    pub fn resolve(&self, config: &MetricConfig) -> Result<Vec<ResolvedMetric>, RegistryError> {
        config
            .metrics
            .iter()
            .map(|entry| self.build(&entry.name, &entry.function, &entry.kwargs))
            .collect()
    }
}

// ============================================================================
// Keyword argument helpers
// ============================================================================

fn threshold(kwargs: &MetricKwargs) -> Result<Option<f32>, KwargsError> {
    Ok(kwargs.get_f64("threshold")?.map(|t| t as f32))
}

fn average(kwargs: &MetricKwargs) -> Result<Average, KwargsError> {
    match kwargs.get_str("average")? {
        None => Ok(Average::Binary),
        Some(s) => s.parse().map_err(|reason| KwargsError::Invalid {
            name: "average".to_string(),
            reason,
        }),
    }
}

/// Accepts a number or sklearn's `"warn"` (reported as 0).
fn zero_division(kwargs: &MetricKwargs) -> Result<f64, KwargsError> {
    if let Ok(Some("warn")) = kwargs.get_str("zero_division") {
        return Ok(0.0);
    }
    Ok(kwargs.get_f64("zero_division")?.unwrap_or(0.0))
}

fn pos_label(kwargs: &MetricKwargs) -> Result<i64, KwargsError> {
    Ok(kwargs.get_i64("pos_label")?.unwrap_or(1))
}

const SCORE_KWARGS: &[&str] = &["average", "pos_label", "zero_division", "threshold"];

macro_rules! score_factory {
    ($ty:ident) => {
        |kwargs: &MetricKwargs| -> Result<Box<dyn Metric>, KwargsError> {
            kwargs.ensure_only(SCORE_KWARGS)?;
            let mut metric = $ty::new()
                .with_average(average(kwargs)?)
                .with_pos_label(pos_label(kwargs)?)
                .with_zero_division(zero_division(kwargs)?);
            if let Some(t) = threshold(kwargs)? {
                metric = metric.with_threshold(t);
            }
            Ok(Box::new(metric))
        }
    };
}

fn no_kwargs<M: Metric + 'static>(
    make: fn() -> M,
) -> impl Fn(&MetricKwargs) -> Result<Box<dyn Metric>, KwargsError> + Send + Sync + 'static {
    move |kwargs: &MetricKwargs| {
        kwargs.ensure_only(&[])?;
        let metric: Box<dyn Metric> = Box::new(make());
        Ok(metric)
    }
}

// ============================================================================
// Built-in registrations
// ============================================================================

fn register_classification(registry: &mut MetricRegistry) {
    registry.register("classification.accuracy", |kwargs| {
        kwargs.ensure_only(&["threshold"])?;
        let mut metric = Accuracy::new();
        if let Some(t) = threshold(kwargs)? {
            metric = metric.with_threshold(t);
        }
        Ok(Box::new(metric))
    });
    registry.register("classification.balanced_accuracy", |kwargs| {
        kwargs.ensure_only(&["threshold"])?;
        let mut metric = BalancedAccuracy::new();
        if let Some(t) = threshold(kwargs)? {
            metric = metric.with_threshold(t);
        }
        Ok(Box::new(metric))
    });
    registry.register("classification.precision", score_factory!(Precision));
    registry.register("classification.recall", score_factory!(Recall));
    registry.register("classification.f1", score_factory!(F1Score));
    registry.register(
        "classification.precision_recall_f1",
        score_factory!(PrecisionRecallF1),
    );
    registry.register("classification.top_k_accuracy", |kwargs| {
        kwargs.ensure_only(&["k"])?;
        let k = kwargs.get_usize("k")?.unwrap_or(2);
        if k == 0 {
            return Err(KwargsError::Invalid {
                name: "k".to_string(),
                reason: "must be at least 1".to_string(),
            });
        }
        Ok(Box::new(TopKAccuracy::new(k)))
    });
    registry.register("classification.confusion_counts", |kwargs| {
        kwargs.ensure_only(&["pos_label", "threshold"])?;
        let mut metric = ConfusionCounts::new().with_pos_label(pos_label(kwargs)?);
        if let Some(t) = threshold(kwargs)? {
            metric = metric.with_threshold(t);
        }
        Ok(Box::new(metric))
    });
}

fn register_regression(registry: &mut MetricRegistry) {
    registry.register("regression.mse", no_kwargs(MeanSquaredError::new));
    registry.register("regression.rmse", no_kwargs(RootMeanSquaredError::new));
    registry.register("regression.mae", no_kwargs(MeanAbsoluteError::new));
    registry.register("regression.r2", no_kwargs(RSquared::new));
    registry.register("regression.explained_variance", no_kwargs(ExplainedVariance::new));
    registry.register("regression.max_error", no_kwargs(MaxError::new));
    registry.register("regression.pearson", no_kwargs(PearsonCorrelation::new));
    registry.register("regression.mape", |kwargs| {
        kwargs.ensure_only(&["eps"])?;
        let mut metric = MeanAbsolutePercentageError::new();
        if let Some(eps) = kwargs.get_f64("eps")? {
            metric = metric.with_eps(eps);
        }
        Ok(Box::new(metric))
    });
}

fn register_sentiment(registry: &mut MetricRegistry) {
    registry.register("sentiment.binary", |kwargs| {
        kwargs.ensure_only(&["offset"])?;
        let mut metric = BinarySentiment::new();
        if let Some(offset) = kwargs.get_f64("offset")? {
            metric = metric.with_offset(offset as f32);
        }
        Ok(Box::new(metric))
    });
    registry.register("sentiment.multiclass_accuracy", |kwargs| {
        kwargs.ensure_only(&["bound"])?;
        let bound = kwargs.get_f64("bound")?.unwrap_or(3.0);
        if bound <= 0.0 {
            return Err(KwargsError::Invalid {
                name: "bound".to_string(),
                reason: "must be positive".to_string(),
            });
        }
        Ok(Box::new(MulticlassSentiment::new(bound as f32)))
    });
}

const SKLEARN_ALIASES: &[(&str, &str)] = &[
    ("sklearn.metrics.accuracy_score", "classification.accuracy"),
    (
        "sklearn.metrics.balanced_accuracy_score",
        "classification.balanced_accuracy",
    ),
    ("sklearn.metrics.precision_score", "classification.precision"),
    ("sklearn.metrics.recall_score", "classification.recall"),
    ("sklearn.metrics.f1_score", "classification.f1"),
    (
        "sklearn.metrics.top_k_accuracy_score",
        "classification.top_k_accuracy",
    ),
    ("sklearn.metrics.mean_squared_error", "regression.mse"),
    ("sklearn.metrics.mean_absolute_error", "regression.mae"),
    ("sklearn.metrics.r2_score", "regression.r2"),
    (
        "sklearn.metrics.explained_variance_score",
        "regression.explained_variance",
    ),
    ("sklearn.metrics.max_error", "regression.max_error"),
];

fn register_sklearn_aliases(registry: &mut MetricRegistry) {
    for (alias, target) in SKLEARN_ALIASES {
        // targets are registered above
        let _ = registry.alias(alias, target);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::IxDyn;

    #[test]
    fn test_builtins_cover_aliases() {
        let registry = MetricRegistry::with_builtins();
        for (alias, target) in SKLEARN_ALIASES {
            assert!(registry.contains(alias), "missing alias {}", alias);
            assert_eq!(registry.alias_target(alias), Some(*target));
        }
        assert!(registry.contains("regression.pearson"));
        assert!(!registry.contains("regression.unknown"));
    }

    #[test]
    fn test_resolve_in_order() {
        let config = MetricConfig::new()
            .with_metric("acc", "sklearn.metrics.accuracy_score")
            .with_metric_kwargs(
                "f1",
                "classification.f1",
                MetricKwargs::new().with("average", "macro"),
            );
        let resolved = MetricRegistry::with_builtins().resolve(&config).unwrap();
        let names: Vec<&str> = resolved.iter().map(|m| m.name.as_str()).collect();
        assert_eq!(names, vec!["acc", "f1"]);
        assert_eq!(resolved[0].function, "sklearn.metrics.accuracy_score");
        assert_eq!(resolved[0].metric.name(), "Accuracy");
        assert_eq!(resolved[1].metric.name(), "F1Score");
    }

    #[test]
    fn test_unknown_function_rejected() {
        let config = MetricConfig::new().with_metric("acc", "sklearn.metrics.not_a_metric");
        let err = MetricRegistry::with_builtins().resolve(&config).unwrap_err();
        assert!(matches!(
            err,
            RegistryError::UnknownFunction { ref metric, ref function }
                if metric == "acc" && function == "sklearn.metrics.not_a_metric"
        ));
    }

    #[test]
    fn test_invalid_kwargs_rejected() {
        let registry = MetricRegistry::with_builtins();

        let unknown = registry.build("f1", "classification.f1", &MetricKwargs::new().with("beta", 2));
        assert!(matches!(
            unknown,
            Err(RegistryError::InvalidKwargs { source: KwargsError::Unknown(_), .. })
        ));

        let bad_average = registry.build(
            "f1",
            "classification.f1",
            &MetricKwargs::new().with("average", "samples"),
        );
        assert!(matches!(
            bad_average,
            Err(RegistryError::InvalidKwargs { source: KwargsError::Invalid { .. }, .. })
        ));

        let zero_k = registry.build(
            "top",
            "classification.top_k_accuracy",
            &MetricKwargs::new().with("k", 0),
        );
        assert!(zero_k.is_err());
    }

    #[test]
    fn test_zero_division_warn_accepted() {
        let registry = MetricRegistry::with_builtins();
        let kwargs = MetricKwargs::new()
            .with("zero_division", "warn")
            .with("average", "binary");
        assert!(registry.build("p", "sklearn.metrics.precision_score", &kwargs).is_ok());
    }

    #[test]
    fn test_register_fn_and_alias() {
        let mut registry = MetricRegistry::new();
        registry.register_fn("custom.count", |t: &ArrayD<f32>, _p: &ArrayD<f32>| {
            Ok(MetricValue::Scalar(t.len() as f64))
        });
        registry.alias("count", "custom.count").unwrap();
        assert!(registry.alias("broken", "custom.missing").is_err());

        let metric = registry.build("n", "count", &MetricKwargs::new()).unwrap();
        let a = ArrayD::from_shape_vec(IxDyn(&[2]), vec![1.0, 2.0]).unwrap();
        assert_eq!(metric.metric.compute(&a, &a).unwrap(), MetricValue::Scalar(2.0));
        assert_eq!(registry.identifiers(), vec!["custom.count", "count"]);
    }
}
