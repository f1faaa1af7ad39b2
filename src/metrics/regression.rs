// --- File: src/metrics/regression.rs ---

//! Metrics for regression tasks.

use super::{ensure_comparable, Metric, MetricError, MetricValue};
use ndarray::ArrayD;

/// Flattens a target/prediction pair into `f64` vectors.
fn paired(
    targets: &ArrayD<f32>,
    predictions: &ArrayD<f32>,
) -> Result<(Vec<f64>, Vec<f64>), MetricError> {
    ensure_comparable(targets, predictions)?;
    let t = targets.iter().map(|&x| x as f64).collect();
    let p = predictions.iter().map(|&x| x as f64).collect();
    Ok((t, p))
}

fn mean(values: &[f64]) -> f64 {
    values.iter().sum::<f64>() / values.len() as f64
}

/// Mean Squared Error (MSE).
///
/// MSE = (1/n) * Σ(y_pred - y_true)²
#[derive(Debug, Clone, Default)]
pub struct MeanSquaredError;

impl MeanSquaredError {
    pub fn new() -> Self {
        Self
    }
}

impl Metric for MeanSquaredError {
    fn compute(
        &self,
        targets: &ArrayD<f32>,
        predictions: &ArrayD<f32>,
    ) -> Result<MetricValue, MetricError> {
        let (t, p) = paired(targets, predictions)?;
        let sse: f64 = t.iter().zip(p.iter()).map(|(a, b)| (b - a).powi(2)).sum();
        Ok(MetricValue::Scalar(sse / t.len() as f64))
    }

    fn name(&self) -> &str {
        "MSE"
    }

    fn higher_is_better(&self) -> bool {
        false
    }
}

/// Root Mean Squared Error (RMSE).
///
/// RMSE = √MSE
#[derive(Debug, Clone, Default)]
pub struct RootMeanSquaredError {
    mse: MeanSquaredError,
}

impl RootMeanSquaredError {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Metric for RootMeanSquaredError {
    fn compute(
        &self,
        targets: &ArrayD<f32>,
        predictions: &ArrayD<f32>,
    ) -> Result<MetricValue, MetricError> {
        match self.mse.compute(targets, predictions)? {
            MetricValue::Scalar(mse) => Ok(MetricValue::Scalar(mse.sqrt())),
            named => Ok(named),
        }
    }

    fn name(&self) -> &str {
        "RMSE"
    }

    fn higher_is_better(&self) -> bool {
        false
    }
}

/// Mean Absolute Error (MAE).
///
/// MAE = (1/n) * Σ|y_pred - y_true|
#[derive(Debug, Clone, Default)]
pub struct MeanAbsoluteError;

impl MeanAbsoluteError {
    pub fn new() -> Self {
        Self
    }
}

impl Metric for MeanAbsoluteError {
    fn compute(
        &self,
        targets: &ArrayD<f32>,
        predictions: &ArrayD<f32>,
    ) -> Result<MetricValue, MetricError> {
        let (t, p) = paired(targets, predictions)?;
        let sae: f64 = t.iter().zip(p.iter()).map(|(a, b)| (b - a).abs()).sum();
        Ok(MetricValue::Scalar(sae / t.len() as f64))
    }

    fn name(&self) -> &str {
        "MAE"
    }

    fn higher_is_better(&self) -> bool {
        false
    }
}

/// R-Squared (coefficient of determination).
///
/// R² = 1 - SS_res / SS_tot
/// where SS_res = Σ(y_true - y_pred)²
///       SS_tot = Σ(y_true - mean(y_true))²
///
/// Constant targets (SS_tot = 0) give 1 for a perfect fit and 0 otherwise.
#[derive(Debug, Clone, Default)]
pub struct RSquared;

impl RSquared {
    pub fn new() -> Self {
        Self
    }
}

impl Metric for RSquared {
    fn compute(
        &self,
        targets: &ArrayD<f32>,
        predictions: &ArrayD<f32>,
    ) -> Result<MetricValue, MetricError> {
        let (t, p) = paired(targets, predictions)?;
        let mean_target = mean(&t);
        let ss_res: f64 = t.iter().zip(p.iter()).map(|(a, b)| (a - b).powi(2)).sum();
        let ss_tot: f64 = t.iter().map(|a| (a - mean_target).powi(2)).sum();

        if ss_tot == 0.0 {
            return Ok(MetricValue::Scalar(if ss_res == 0.0 { 1.0 } else { 0.0 }));
        }
        Ok(MetricValue::Scalar(1.0 - ss_res / ss_tot))
    }

    fn name(&self) -> &str {
        "R²"
    }
}

/// Mean Absolute Percentage Error (MAPE), in percent.
///
/// MAPE = (1/n) * Σ|((y_true - y_pred) / y_true)| * 100
///
/// Samples with |y_true| <= eps are skipped.
#[derive(Debug, Clone)]
pub struct MeanAbsolutePercentageError {
    eps: f64,
}

impl MeanAbsolutePercentageError {
    pub fn new() -> Self {
        Self { eps: 1e-8 }
    }

    pub fn with_eps(mut self, eps: f64) -> Self {
        self.eps = eps;
        self
    }
}

impl Default for MeanAbsolutePercentageError {
    fn default() -> Self {
        Self::new()
    }
}

impl Metric for MeanAbsolutePercentageError {
    fn compute(
        &self,
        targets: &ArrayD<f32>,
        predictions: &ArrayD<f32>,
    ) -> Result<MetricValue, MetricError> {
        let (t, p) = paired(targets, predictions)?;
        let ape: Vec<f64> = t
            .iter()
            .zip(p.iter())
            .filter(|(a, _)| a.abs() > self.eps)
            .map(|(a, b)| ((a - b) / a).abs())
            .collect();
        if ape.is_empty() {
            return Err(MetricError::Unsupported(
                "MAPE is undefined when every target is zero".to_string(),
            ));
        }
        Ok(MetricValue::Scalar(mean(&ape) * 100.0))
    }

    fn name(&self) -> &str {
        "MAPE"
    }

    fn higher_is_better(&self) -> bool {
        false
    }
}

/// Explained Variance Score.
///
/// EVS = 1 - Var(y_true - y_pred) / Var(y_true)
///
/// With constant targets the score is 1 when the residuals are constant too,
/// else 0.
#[derive(Debug, Clone, Default)]
pub struct ExplainedVariance;

impl ExplainedVariance {
    pub fn new() -> Self {
        Self
    }
}

impl Metric for ExplainedVariance {
    fn compute(
        &self,
        targets: &ArrayD<f32>,
        predictions: &ArrayD<f32>,
    ) -> Result<MetricValue, MetricError> {
        let (t, p) = paired(targets, predictions)?;
        let residuals: Vec<f64> = t.iter().zip(p.iter()).map(|(a, b)| a - b).collect();
        let var_res = population_variance(&residuals);
        let var_target = population_variance(&t);

        if var_target == 0.0 {
            return Ok(MetricValue::Scalar(if var_res == 0.0 { 1.0 } else { 0.0 }));
        }
        Ok(MetricValue::Scalar(1.0 - var_res / var_target))
    }

    fn name(&self) -> &str {
        "ExplainedVariance"
    }
}

/// Max Error: largest absolute deviation.
#[derive(Debug, Clone, Default)]
pub struct MaxError;

impl MaxError {
    pub fn new() -> Self {
        Self
    }
}

impl Metric for MaxError {
    fn compute(
        &self,
        targets: &ArrayD<f32>,
        predictions: &ArrayD<f32>,
    ) -> Result<MetricValue, MetricError> {
        let (t, p) = paired(targets, predictions)?;
        let max = t
            .iter()
            .zip(p.iter())
            .map(|(a, b)| (a - b).abs())
            .fold(0.0_f64, f64::max);
        Ok(MetricValue::Scalar(max))
    }

    fn name(&self) -> &str {
        "MaxError"
    }

    fn higher_is_better(&self) -> bool {
        false
    }
}

/// Pearson correlation between targets and predictions.
///
/// Fails for constant input, where the correlation is undefined.
#[derive(Debug, Clone, Default)]
pub struct PearsonCorrelation;

impl PearsonCorrelation {
    pub fn new() -> Self {
        Self
    }
}

impl Metric for PearsonCorrelation {
    fn compute(
        &self,
        targets: &ArrayD<f32>,
        predictions: &ArrayD<f32>,
    ) -> Result<MetricValue, MetricError> {
        let (t, p) = paired(targets, predictions)?;
        let (mt, mp) = (mean(&t), mean(&p));
        let mut cov = 0.0;
        let mut var_t = 0.0;
        let mut var_p = 0.0;
        for (a, b) in t.iter().zip(p.iter()) {
            cov += (a - mt) * (b - mp);
            var_t += (a - mt).powi(2);
            var_p += (b - mp).powi(2);
        }
        if var_t == 0.0 || var_p == 0.0 {
            return Err(MetricError::Unsupported(
                "correlation is undefined for constant input".to_string(),
            ));
        }
        Ok(MetricValue::Scalar(cov / (var_t.sqrt() * var_p.sqrt())))
    }

    fn name(&self) -> &str {
        "Pearson"
    }
}

fn population_variance(values: &[f64]) -> f64 {
    let m = mean(values);
    values.iter().map(|v| (v - m).powi(2)).sum::<f64>() / values.len() as f64
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::IxDyn;

    fn array(values: Vec<f32>) -> ArrayD<f32> {
        ArrayD::from_shape_vec(IxDyn(&[values.len()]), values).unwrap()
    }

    fn scalar(metric: &dyn Metric, targets: &ArrayD<f32>, preds: &ArrayD<f32>) -> f64 {
        metric
            .compute(targets, preds)
            .unwrap()
            .as_scalar()
            .expect("scalar metric")
    }

    #[test]
    fn test_mse() {
        let preds = array(vec![1.0, 2.0, 3.0, 4.0]);
        let targets = array(vec![1.0, 2.0, 3.0, 4.0]);
        assert!((scalar(&MeanSquaredError::new(), &targets, &preds) - 0.0).abs() < 1e-6);
    }

    #[test]
    fn test_mae_and_rmse() {
        let preds = array(vec![1.0, 2.0, 3.0, 4.0]);
        let targets = array(vec![2.0, 3.0, 4.0, 5.0]);
        assert!((scalar(&MeanAbsoluteError::new(), &targets, &preds) - 1.0).abs() < 1e-6);
        assert!((scalar(&RootMeanSquaredError::new(), &targets, &preds) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_r_squared() {
        // perfect fit => R² = 1
        let values = array(vec![1.0, 2.0, 3.0, 4.0]);
        assert!((scalar(&RSquared::new(), &values, &values) - 1.0).abs() < 1e-6);

        // predicting the mean => R² = 0
        let mean_preds = array(vec![2.5, 2.5, 2.5, 2.5]);
        assert!(scalar(&RSquared::new(), &values, &mean_preds).abs() < 1e-6);
    }

    #[test]
    fn test_direction() {
        assert!(!MeanSquaredError::new().higher_is_better());
        assert!(!MeanAbsolutePercentageError::new().higher_is_better());
        assert!(!MaxError::new().higher_is_better());
        assert!(RSquared::new().higher_is_better());
        assert!(PearsonCorrelation::new().higher_is_better());
    }

    #[test]
    fn test_r_squared_constant_targets() {
        let targets = array(vec![2.0, 2.0, 2.0]);
        assert!((scalar(&RSquared::new(), &targets, &targets) - 1.0).abs() < 1e-9);

        let off = array(vec![2.0, 3.0, 2.0]);
        assert!(scalar(&RSquared::new(), &targets, &off).abs() < 1e-9);
    }

    #[test]
    fn test_explained_variance_constant_targets() {
        let targets = array(vec![2.0, 2.0, 2.0]);
        // constant residual of -1: nothing left unexplained
        let shifted = array(vec![3.0, 3.0, 3.0]);
        assert!((scalar(&ExplainedVariance::new(), &targets, &shifted) - 1.0).abs() < 1e-9);

        let noisy = array(vec![1.0, 2.0, 4.0]);
        assert!(scalar(&ExplainedVariance::new(), &targets, &noisy).abs() < 1e-9);
    }

    #[test]
    fn test_mape_skips_zero_targets() {
        let targets = array(vec![0.0, 2.0, 4.0]);
        let preds = array(vec![5.0, 1.0, 5.0]);
        // (0.5 + 0.25) / 2 * 100
        let value = scalar(&MeanAbsolutePercentageError::new(), &targets, &preds);
        assert!((value - 37.5).abs() < 1e-6);

        let zeros = array(vec![0.0, 0.0]);
        assert!(MeanAbsolutePercentageError::new()
            .compute(&zeros, &zeros)
            .is_err());
    }

    #[test]
    fn test_max_error() {
        let preds = array(vec![1.0, 2.0, 3.0, 10.0]);
        let targets = array(vec![1.0, 2.0, 3.0, 4.0]);
        assert!((scalar(&MaxError::new(), &targets, &preds) - 6.0).abs() < 1e-6);
    }

    #[test]
    fn test_explained_variance_offset() {
        // constant offset leaves residual variance at zero
        let targets = array(vec![1.0, 2.0, 3.0]);
        let preds = array(vec![2.0, 3.0, 4.0]);
        assert!((scalar(&ExplainedVariance::new(), &targets, &preds) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_pearson() {
        let targets = array(vec![1.0, 2.0, 3.0, 4.0]);
        let preds = array(vec![2.0, 4.0, 6.0, 8.0]);
        assert!((scalar(&PearsonCorrelation::new(), &targets, &preds) - 1.0).abs() < 1e-9);

        let reversed = array(vec![4.0, 3.0, 2.0, 1.0]);
        assert!((scalar(&PearsonCorrelation::new(), &targets, &reversed) + 1.0).abs() < 1e-9);

        let constant = array(vec![1.0, 1.0, 1.0, 1.0]);
        assert!(matches!(
            PearsonCorrelation::new().compute(&targets, &constant),
            Err(MetricError::Unsupported(_))
        ));
    }
}
