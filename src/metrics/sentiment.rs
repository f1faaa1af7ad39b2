// --- File: src/metrics/sentiment.rs ---

//! Metrics for multimodal sentiment analysis (MSA).
//!
//! Sentiment scores are centred on a neutral value. The binary metrics split
//! samples into negative / non-negative after subtracting `offset`, both with
//! neutral samples included ("has0") and excluded ("non0").

use super::classification::weighted_f1;
use super::{ensure_comparable, Metric, MetricError, MetricValue};
use ndarray::ArrayD;

/// Binarised sentiment labels.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BinarizedSentiment {
    pub predictions: Vec<bool>,
    pub targets: Vec<bool>,
    /// `true` where the shifted target is not neutral.
    pub non_zero: Vec<bool>,
}

/// Shifts both arrays by `offset` and marks non-negative values.
pub fn msa_binarize(
    predictions: &ArrayD<f32>,
    targets: &ArrayD<f32>,
    offset: f32,
) -> BinarizedSentiment {
    let shifted_targets: Vec<f32> = targets.iter().map(|t| t - offset).collect();
    BinarizedSentiment {
        predictions: predictions.iter().map(|p| p - offset >= 0.0).collect(),
        targets: shifted_targets.iter().map(|&t| t >= 0.0).collect(),
        non_zero: shifted_targets.iter().map(|&t| t != 0.0).collect(),
    }
}

/// Binary sentiment accuracy and weighted F1, reported as
/// `acc_has0`, `f1_has0`, `acc_non0`, `f1_non0`.
#[derive(Debug, Clone)]
pub struct BinarySentiment {
    offset: f32,
}

impl BinarySentiment {
    /// Labels in `{0, 1, 2}` with 1 as neutral use the default offset of 1.
    pub fn new() -> Self {
        Self { offset: 1.0 }
    }

    pub fn with_offset(mut self, offset: f32) -> Self {
        self.offset = offset;
        self
    }
}

impl Default for BinarySentiment {
    fn default() -> Self {
        Self::new()
    }
}

fn accuracy_and_f1(truth: &[i64], preds: &[i64]) -> (f64, f64) {
    if truth.is_empty() {
        return (0.0, 0.0);
    }
    let correct = truth.iter().zip(preds.iter()).filter(|(t, p)| t == p).count();
    (correct as f64 / truth.len() as f64, weighted_f1(truth, preds))
}

impl Metric for BinarySentiment {
    fn compute(
        &self,
        targets: &ArrayD<f32>,
        predictions: &ArrayD<f32>,
    ) -> Result<MetricValue, MetricError> {
        ensure_comparable(targets, predictions)?;
        let b = msa_binarize(predictions, targets, self.offset);

        let truth: Vec<i64> = b.targets.iter().map(|&t| t as i64).collect();
        let preds: Vec<i64> = b.predictions.iter().map(|&p| p as i64).collect();
        let (acc_has0, f1_has0) = accuracy_and_f1(&truth, &preds);

        let (truth_non0, preds_non0): (Vec<i64>, Vec<i64>) = truth
            .iter()
            .zip(preds.iter())
            .zip(b.non_zero.iter())
            .filter(|(_, keep)| **keep)
            .map(|((&t, &p), _)| (t, p))
            .unzip();
        let (acc_non0, f1_non0) = accuracy_and_f1(&truth_non0, &preds_non0);

        Ok(MetricValue::named([
            ("acc_has0", acc_has0),
            ("f1_has0", f1_has0),
            ("acc_non0", acc_non0),
            ("f1_non0", f1_non0),
        ]))
    }

    fn name(&self) -> &str {
        "BinarySentiment"
    }
}

/// Multi-class sentiment accuracy on scores clipped to `[-bound, bound]` and
/// rounded: bound 3 gives acc7, bound 2 gives acc5.
#[derive(Debug, Clone)]
pub struct MulticlassSentiment {
    bound: f32,
}

impl MulticlassSentiment {
    pub fn new(bound: f32) -> Self {
        Self { bound }
    }
}

impl Default for MulticlassSentiment {
    fn default() -> Self {
        Self::new(3.0)
    }
}

impl Metric for MulticlassSentiment {
    fn compute(
        &self,
        targets: &ArrayD<f32>,
        predictions: &ArrayD<f32>,
    ) -> Result<MetricValue, MetricError> {
        ensure_comparable(targets, predictions)?;
        let bucket = |v: f32| v.clamp(-self.bound, self.bound).round() as i64;
        let correct = targets
            .iter()
            .zip(predictions.iter())
            .filter(|(t, p)| bucket(**t) == bucket(**p))
            .count();
        Ok(MetricValue::Scalar(correct as f64 / targets.len() as f64))
    }

    fn name(&self) -> &str {
        "MulticlassSentiment"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::IxDyn;

    fn array(values: Vec<f32>) -> ArrayD<f32> {
        ArrayD::from_shape_vec(IxDyn(&[values.len()]), values).unwrap()
    }

    #[test]
    fn test_msa_binarize() {
        let preds = array(vec![0.0, 1.0, 2.0]);
        let targets = array(vec![2.0, 1.0, 0.0]);
        let b = msa_binarize(&preds, &targets, 1.0);
        assert_eq!(b.predictions, vec![false, true, true]);
        assert_eq!(b.targets, vec![true, true, false]);
        assert_eq!(b.non_zero, vec![true, false, true]);
    }

    #[test]
    fn test_binary_sentiment_keys() {
        let targets = array(vec![0.0, 1.0, 2.0, 2.0]);
        let preds = array(vec![0.0, 2.0, 2.0, 0.0]);
        let value = BinarySentiment::new().compute(&targets, &preds).unwrap();

        let MetricValue::Named(entries) = value else {
            panic!("expected named value");
        };
        let keys: Vec<&str> = entries.iter().map(|(k, _)| k.as_str()).collect();
        assert_eq!(keys, vec!["acc_has0", "f1_has0", "acc_non0", "f1_non0"]);

        // has0: truth [F, T, T, T], preds [F, T, T, F] -> 3/4
        assert!((entries[0].1 - 0.75).abs() < 1e-9);
        // non0 drops the neutral sample: truth [F, T, T], preds [F, T, F] -> 2/3
        assert!((entries[2].1 - 2.0 / 3.0).abs() < 1e-9);
    }

    #[test]
    fn test_multiclass_sentiment_clips() {
        let targets = array(vec![-3.0, 0.2, 2.6, 1.4]);
        let preds = array(vec![-5.0, -0.3, 3.4, 2.0]);
        // -5 clips to -3; 0.2/-0.3 both round to 0; 2.6 -> 3, 3.4 -> 3; 1.4 -> 1 vs 2
        let acc7 = MulticlassSentiment::new(3.0)
            .compute(&targets, &preds)
            .unwrap()
            .as_scalar()
            .unwrap();
        assert!((acc7 - 0.75).abs() < 1e-9);
    }
}
