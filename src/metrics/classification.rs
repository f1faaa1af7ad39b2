// --- File: src/metrics/classification.rs ---

//! Metrics for classification tasks.
//!
//! Inputs are either class indices (`[batch]` or `[batch, 1]`) or per-class
//! scores / one-hot rows (`[batch, classes]`), which are reduced by argmax.

use super::{
    class_labels, ensure_comparable, has_class_axis, predicted_labels, Metric, MetricError,
    MetricValue,
};
use ndarray::{ArrayD, Axis};
use std::collections::BTreeSet;
use std::str::FromStr;

/// Averaging strategy for multi-class precision, recall and F1.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Average {
    /// Score of `pos_label` only; multi-class input is rejected.
    #[default]
    Binary,
    /// Global counts of true positives, false positives and false negatives.
    Micro,
    /// Unweighted mean over classes.
    Macro,
    /// Mean over classes weighted by support.
    Weighted,
}

impl FromStr for Average {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "binary" => Ok(Average::Binary),
            "micro" => Ok(Average::Micro),
            "macro" => Ok(Average::Macro),
            "weighted" => Ok(Average::Weighted),
            other => Err(format!(
                "unknown average '{}', expected binary, micro, macro or weighted",
                other
            )),
        }
    }
}

/// Accuracy: fraction of samples whose predicted label equals the target.
#[derive(Debug, Clone, Default)]
pub struct Accuracy {
    threshold: Option<f32>,
}

impl Accuracy {
    pub fn new() -> Self {
        Self::default()
    }

    /// Binarises score predictions at `threshold` before comparing.
    pub fn with_threshold(mut self, threshold: f32) -> Self {
        self.threshold = Some(threshold);
        self
    }
}

impl Metric for Accuracy {
    fn compute(
        &self,
        targets: &ArrayD<f32>,
        predictions: &ArrayD<f32>,
    ) -> Result<MetricValue, MetricError> {
        ensure_comparable(targets, predictions)?;
        let truth = class_labels(targets);
        let preds = predicted_labels(predictions, self.threshold);
        let correct = truth.iter().zip(preds.iter()).filter(|(t, p)| t == p).count();
        Ok(MetricValue::Scalar(correct as f64 / truth.len() as f64))
    }

    fn name(&self) -> &str {
        "Accuracy"
    }
}

/// Confusion matrix for binary classification.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BinaryConfusionMatrix {
    pub true_positives: usize,
    pub true_negatives: usize,
    pub false_positives: usize,
    pub false_negatives: usize,
}

impl BinaryConfusionMatrix {
    pub fn new() -> Self {
        Self::default()
    }

    /// Counts outcomes with `pos_label` as the positive class.
    pub fn from_labels(truth: &[i64], preds: &[i64], pos_label: i64) -> Self {
        let mut cm = Self::new();
        for (&t, &p) in truth.iter().zip(preds.iter()) {
            match (p == pos_label, t == pos_label) {
                (true, true) => cm.true_positives += 1,
                (true, false) => cm.false_positives += 1,
                (false, true) => cm.false_negatives += 1,
                (false, false) => cm.true_negatives += 1,
            }
        }
        cm
    }

    /// Total number of samples.
    pub fn total(&self) -> usize {
        self.true_positives + self.true_negatives + self.false_positives + self.false_negatives
    }

    pub fn accuracy(&self) -> f64 {
        ratio(self.true_positives + self.true_negatives, self.total(), 0.0)
    }

    pub fn precision(&self, zero_division: f64) -> f64 {
        ratio(
            self.true_positives,
            self.true_positives + self.false_positives,
            zero_division,
        )
    }

    pub fn recall(&self, zero_division: f64) -> f64 {
        ratio(
            self.true_positives,
            self.true_positives + self.false_negatives,
            zero_division,
        )
    }

    pub fn specificity(&self, zero_division: f64) -> f64 {
        ratio(
            self.true_negatives,
            self.true_negatives + self.false_positives,
            zero_division,
        )
    }

    pub fn f1_score(&self, zero_division: f64) -> f64 {
        let denom = 2 * self.true_positives + self.false_positives + self.false_negatives;
        ratio(2 * self.true_positives, denom, zero_division)
    }
}

/// Confusion matrix over the union of observed labels.
#[derive(Debug, Clone)]
pub struct MultiClassConfusionMatrix {
    classes: Vec<i64>,
    matrix: Vec<Vec<usize>>, // [actual][predicted]
}

impl MultiClassConfusionMatrix {
    /// Builds the matrix from per-sample labels. Classes are the sorted union
    /// of target and predicted labels.
    pub fn from_labels(truth: &[i64], preds: &[i64]) -> Self {
        let classes: Vec<i64> = truth
            .iter()
            .chain(preds.iter())
            .copied()
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();
        let n = classes.len();
        let mut matrix = vec![vec![0; n]; n];
        for (t, p) in truth.iter().zip(preds.iter()) {
            // both labels are in `classes` by construction
            if let (Ok(a), Ok(b)) = (classes.binary_search(t), classes.binary_search(p)) {
                matrix[a][b] += 1;
            }
        }
        Self { classes, matrix }
    }

    pub fn classes(&self) -> &[i64] {
        &self.classes
    }

    pub fn num_classes(&self) -> usize {
        self.classes.len()
    }

    pub fn get_matrix(&self) -> &Vec<Vec<usize>> {
        &self.matrix
    }

    pub fn total(&self) -> usize {
        self.matrix.iter().flat_map(|row| row.iter()).sum()
    }

    pub fn accuracy(&self) -> f64 {
        let correct: usize = (0..self.num_classes()).map(|i| self.matrix[i][i]).sum();
        ratio(correct, self.total(), 0.0)
    }

    /// Number of target samples per class.
    pub fn support_per_class(&self) -> Vec<usize> {
        self.matrix.iter().map(|row| row.iter().sum()).collect()
    }

    fn predicted_per_class(&self) -> Vec<usize> {
        (0..self.num_classes())
            .map(|c| (0..self.num_classes()).map(|a| self.matrix[a][c]).sum())
            .collect()
    }

    pub fn precision_per_class(&self, zero_division: f64) -> Vec<f64> {
        self.predicted_per_class()
            .iter()
            .enumerate()
            .map(|(c, &predicted)| ratio(self.matrix[c][c], predicted, zero_division))
            .collect()
    }

    pub fn recall_per_class(&self, zero_division: f64) -> Vec<f64> {
        self.support_per_class()
            .iter()
            .enumerate()
            .map(|(c, &support)| ratio(self.matrix[c][c], support, zero_division))
            .collect()
    }

    pub fn f1_per_class(&self, zero_division: f64) -> Vec<f64> {
        let predicted = self.predicted_per_class();
        let support = self.support_per_class();
        (0..self.num_classes())
            .map(|c| {
                let tp = self.matrix[c][c];
                ratio(2 * tp, predicted[c] + support[c], zero_division)
            })
            .collect()
    }

    /// Macro-averaged F1-Score.
    pub fn macro_f1(&self, zero_division: f64) -> f64 {
        mean(&self.f1_per_class(zero_division))
    }

    /// Averages per-class scores according to `average`.
    fn averaged(&self, per_class: &[f64], average: Average) -> f64 {
        match average {
            Average::Macro => mean(per_class),
            Average::Weighted => {
                let support = self.support_per_class();
                let total: usize = support.iter().sum();
                if total == 0 {
                    return 0.0;
                }
                per_class
                    .iter()
                    .zip(support.iter())
                    .map(|(score, &s)| score * s as f64)
                    .sum::<f64>()
                    / total as f64
            }
            // single-label input: micro precision == micro recall == micro F1 == accuracy
            Average::Micro => self.accuracy(),
            Average::Binary => 0.0,
        }
    }
}

/// Shared options of precision, recall and F1.
#[derive(Debug, Clone, Copy)]
struct ScoreOptions {
    average: Average,
    pos_label: i64,
    zero_division: f64,
    threshold: Option<f32>,
}

impl Default for ScoreOptions {
    fn default() -> Self {
        Self {
            average: Average::Binary,
            pos_label: 1,
            zero_division: 0.0,
            threshold: None,
        }
    }
}

/// Precision, recall and F1 of one label set.
#[derive(Debug, Clone, Copy, PartialEq)]
struct Scores {
    precision: f64,
    recall: f64,
    f1: f64,
}

impl ScoreOptions {
    fn scores(
        &self,
        targets: &ArrayD<f32>,
        predictions: &ArrayD<f32>,
    ) -> Result<Scores, MetricError> {
        ensure_comparable(targets, predictions)?;
        let truth = class_labels(targets);
        let preds = predicted_labels(predictions, self.threshold);
        scores_from_labels(&truth, &preds, self.average, self.pos_label, self.zero_division)
    }
}

fn scores_from_labels(
    truth: &[i64],
    preds: &[i64],
    average: Average,
    pos_label: i64,
    zero_division: f64,
) -> Result<Scores, MetricError> {
    if average == Average::Binary {
        let observed: BTreeSet<i64> = truth.iter().chain(preds.iter()).copied().collect();
        if observed.len() > 2 {
            return Err(MetricError::Unsupported(format!(
                "target is multiclass ({} labels) but average is 'binary'; \
                 choose micro, macro or weighted",
                observed.len()
            )));
        }
        if observed.len() == 2 && !observed.contains(&pos_label) {
            return Err(MetricError::Unsupported(format!(
                "pos_label={} is not a valid label: {:?}",
                pos_label, observed
            )));
        }
        let cm = BinaryConfusionMatrix::from_labels(truth, preds, pos_label);
        return Ok(Scores {
            precision: cm.precision(zero_division),
            recall: cm.recall(zero_division),
            f1: cm.f1_score(zero_division),
        });
    }

    let cm = MultiClassConfusionMatrix::from_labels(truth, preds);
    Ok(Scores {
        precision: cm.averaged(&cm.precision_per_class(zero_division), average),
        recall: cm.averaged(&cm.recall_per_class(zero_division), average),
        f1: cm.averaged(&cm.f1_per_class(zero_division), average),
    })
}

/// Weighted F1 over already-resolved labels.
pub(crate) fn weighted_f1(truth: &[i64], preds: &[i64]) -> f64 {
    if truth.is_empty() {
        return 0.0;
    }
    let cm = MultiClassConfusionMatrix::from_labels(truth, preds);
    cm.averaged(&cm.f1_per_class(0.0), Average::Weighted)
}

macro_rules! score_metric {
    ($(#[$doc:meta])* $ty:ident, $field:ident, $label:literal) => {
        $(#[$doc])*
        #[derive(Debug, Clone, Default)]
        pub struct $ty {
            options: ScoreOptions,
        }

        impl $ty {
            pub fn new() -> Self {
                Self::default()
            }

            pub fn with_average(mut self, average: Average) -> Self {
                self.options.average = average;
                self
            }

            pub fn with_pos_label(mut self, pos_label: i64) -> Self {
                self.options.pos_label = pos_label;
                self
            }

            /// Value reported when the denominator is zero.
            pub fn with_zero_division(mut self, value: f64) -> Self {
                self.options.zero_division = value;
                self
            }

            pub fn with_threshold(mut self, threshold: f32) -> Self {
                self.options.threshold = Some(threshold);
                self
            }
        }

        impl Metric for $ty {
            fn compute(
                &self,
                targets: &ArrayD<f32>,
                predictions: &ArrayD<f32>,
            ) -> Result<MetricValue, MetricError> {
                let scores = self.options.scores(targets, predictions)?;
                Ok(MetricValue::Scalar(scores.$field))
            }

            fn name(&self) -> &str {
                $label
            }
        }
    };
}

score_metric!(
    /// Precision = TP / (TP + FP).
    Precision,
    precision,
    "Precision"
);
score_metric!(
    /// Recall = TP / (TP + FN).
    Recall,
    recall,
    "Recall"
);
score_metric!(
    /// F1 = 2 · precision · recall / (precision + recall).
    F1Score,
    f1,
    "F1Score"
);

/// Precision, recall and F1 reported together as `precision`, `recall`, `f1`.
#[derive(Debug, Clone, Default)]
pub struct PrecisionRecallF1 {
    options: ScoreOptions,
}

impl PrecisionRecallF1 {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_average(mut self, average: Average) -> Self {
        self.options.average = average;
        self
    }

    pub fn with_pos_label(mut self, pos_label: i64) -> Self {
        self.options.pos_label = pos_label;
        self
    }

    pub fn with_zero_division(mut self, value: f64) -> Self {
        self.options.zero_division = value;
        self
    }

    pub fn with_threshold(mut self, threshold: f32) -> Self {
        self.options.threshold = Some(threshold);
        self
    }
}

impl Metric for PrecisionRecallF1 {
    fn compute(
        &self,
        targets: &ArrayD<f32>,
        predictions: &ArrayD<f32>,
    ) -> Result<MetricValue, MetricError> {
        let s = self.options.scores(targets, predictions)?;
        Ok(MetricValue::named([
            ("precision", s.precision),
            ("recall", s.recall),
            ("f1", s.f1),
        ]))
    }

    fn name(&self) -> &str {
        "PrecisionRecallF1"
    }
}

/// Balanced accuracy: mean recall over the classes present in the targets.
#[derive(Debug, Clone, Default)]
pub struct BalancedAccuracy {
    threshold: Option<f32>,
}

impl BalancedAccuracy {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_threshold(mut self, threshold: f32) -> Self {
        self.threshold = Some(threshold);
        self
    }
}

impl Metric for BalancedAccuracy {
    fn compute(
        &self,
        targets: &ArrayD<f32>,
        predictions: &ArrayD<f32>,
    ) -> Result<MetricValue, MetricError> {
        ensure_comparable(targets, predictions)?;
        let truth = class_labels(targets);
        let preds = predicted_labels(predictions, self.threshold);
        let cm = MultiClassConfusionMatrix::from_labels(&truth, &preds);
        let recalls: Vec<f64> = cm
            .support_per_class()
            .iter()
            .zip(cm.recall_per_class(0.0))
            .filter(|(support, _)| **support > 0)
            .map(|(_, r)| r)
            .collect();
        Ok(MetricValue::Scalar(mean(&recalls)))
    }

    fn name(&self) -> &str {
        "BalancedAccuracy"
    }
}

/// Binary outcome counts reported as `tp`, `fp`, `tn`, `fn`.
#[derive(Debug, Clone)]
pub struct ConfusionCounts {
    pos_label: i64,
    threshold: Option<f32>,
}

impl ConfusionCounts {
    pub fn new() -> Self {
        Self {
            pos_label: 1,
            threshold: None,
        }
    }

    pub fn with_pos_label(mut self, pos_label: i64) -> Self {
        self.pos_label = pos_label;
        self
    }

    pub fn with_threshold(mut self, threshold: f32) -> Self {
        self.threshold = Some(threshold);
        self
    }
}

impl Default for ConfusionCounts {
    fn default() -> Self {
        Self::new()
    }
}

impl Metric for ConfusionCounts {
    fn compute(
        &self,
        targets: &ArrayD<f32>,
        predictions: &ArrayD<f32>,
    ) -> Result<MetricValue, MetricError> {
        ensure_comparable(targets, predictions)?;
        let truth = class_labels(targets);
        let preds = predicted_labels(predictions, self.threshold);
        let cm = BinaryConfusionMatrix::from_labels(&truth, &preds, self.pos_label);
        Ok(MetricValue::named([
            ("tp", cm.true_positives as f64),
            ("fp", cm.false_positives as f64),
            ("tn", cm.true_negatives as f64),
            ("fn", cm.false_negatives as f64),
        ]))
    }

    fn name(&self) -> &str {
        "ConfusionCounts"
    }
}

/// Top-K accuracy for score predictions of shape `[batch, classes]`.
///
/// Targets share the prediction shape, so they are one-hot (or score) rows.
#[derive(Debug, Clone)]
pub struct TopKAccuracy {
    k: usize,
}

impl TopKAccuracy {
    pub fn new(k: usize) -> Self {
        Self { k }
    }
}

impl Metric for TopKAccuracy {
    fn compute(
        &self,
        targets: &ArrayD<f32>,
        predictions: &ArrayD<f32>,
    ) -> Result<MetricValue, MetricError> {
        ensure_comparable(targets, predictions)?;
        if predictions.ndim() != 2 || !has_class_axis(predictions) {
            return Err(MetricError::InvalidShape {
                expected: "scores of shape [batch, classes]",
                shape: predictions.shape().to_vec(),
            });
        }

        let truth = class_labels(targets);
        let mut correct = 0usize;
        for (row, &actual) in predictions.axis_iter(Axis(0)).zip(truth.iter()) {
            let mut scores: Vec<(usize, f32)> = row.iter().copied().enumerate().collect();
            scores.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
            if scores.iter().take(self.k).any(|(c, _)| *c as i64 == actual) {
                correct += 1;
            }
        }
        Ok(MetricValue::Scalar(correct as f64 / truth.len() as f64))
    }

    fn name(&self) -> &str {
        "TopKAccuracy"
    }
}

fn ratio(numerator: usize, denominator: usize, zero_division: f64) -> f64 {
    if denominator == 0 {
        zero_division
    } else {
        numerator as f64 / denominator as f64
    }
}

fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        0.0
    } else {
        values.iter().sum::<f64>() / values.len() as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::IxDyn;

    fn array(shape: &[usize], values: Vec<f32>) -> ArrayD<f32> {
        ArrayD::from_shape_vec(IxDyn(shape), values).unwrap()
    }

    fn scalar(value: MetricValue) -> f64 {
        value.as_scalar().expect("scalar metric")
    }

    #[test]
    fn test_accuracy_labels() {
        let targets = array(&[3], vec![1.0, 0.0, 0.0]);
        let preds = array(&[3], vec![1.0, 0.0, 1.0]);
        let acc = scalar(Accuracy::new().compute(&targets, &preds).unwrap());
        assert!((acc - 2.0 / 3.0).abs() < 1e-9);
    }

    #[test]
    fn test_accuracy_threshold() {
        let targets = array(&[4], vec![1.0, 1.0, 0.0, 0.0]);
        let preds = array(&[4], vec![0.9, 0.8, 0.3, 0.1]);
        let acc = scalar(
            Accuracy::new()
                .with_threshold(0.5)
                .compute(&targets, &preds)
                .unwrap(),
        );
        assert!((acc - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_accuracy_empty_fails() {
        let empty = array(&[0], vec![]);
        assert_eq!(
            Accuracy::new().compute(&empty, &empty),
            Err(MetricError::Empty)
        );
    }

    #[test]
    fn test_binary_confusion_matrix() {
        let truth = [1, 0, 0, 1];
        let preds = [1, 1, 0, 1];
        let cm = BinaryConfusionMatrix::from_labels(&truth, &preds, 1);

        assert_eq!(cm.true_positives, 2);
        assert_eq!(cm.false_positives, 1);
        assert_eq!(cm.true_negatives, 1);
        assert_eq!(cm.false_negatives, 0);
        assert!((cm.accuracy() - 0.75).abs() < 1e-9);
    }

    #[test]
    fn test_precision_recall_binary() {
        let targets = array(&[6], vec![1.0, 1.0, 0.0, 0.0, 1.0, 0.0]);
        let preds = array(&[6], vec![0.9, 0.8, 0.7, 0.3, 0.2, 0.6]);

        // TP=2 (0.9, 0.8), FP=2 (0.7, 0.6), FN=1 (0.2)
        let precision = scalar(
            Precision::new()
                .with_threshold(0.5)
                .compute(&targets, &preds)
                .unwrap(),
        );
        let recall = scalar(
            Recall::new()
                .with_threshold(0.5)
                .compute(&targets, &preds)
                .unwrap(),
        );
        assert!((precision - 0.5).abs() < 1e-6);
        assert!((recall - 2.0 / 3.0).abs() < 1e-6);
    }

    #[test]
    fn test_binary_average_rejects_multiclass() {
        let targets = array(&[3], vec![0.0, 1.0, 2.0]);
        let result = F1Score::new().compute(&targets, &targets);
        assert!(matches!(result, Err(MetricError::Unsupported(_))));
    }

    #[test]
    fn test_binary_average_requires_pos_label() {
        let targets = array(&[3], vec![0.0, 2.0, 0.0]);
        let preds = array(&[3], vec![0.0, 2.0, 2.0]);
        assert!(matches!(
            F1Score::new().compute(&targets, &preds),
            Err(MetricError::Unsupported(_))
        ));

        let f1 = scalar(
            F1Score::new()
                .with_pos_label(2)
                .compute(&targets, &preds)
                .unwrap(),
        );
        assert!((f1 - 2.0 / 3.0).abs() < 1e-9);

        // a single observed label never conflicts with pos_label
        let zeros = array(&[2], vec![0.0, 0.0]);
        assert!(F1Score::new().compute(&zeros, &zeros).is_ok());
    }

    #[test]
    fn test_macro_and_weighted_f1() {
        // class 0: support 2, class 1: support 1, class 2: support 1
        let targets = array(&[4], vec![0.0, 0.0, 1.0, 2.0]);
        let preds = array(&[4], vec![0.0, 1.0, 1.0, 2.0]);

        // per-class F1: c0 = 2/3, c1 = 2/3, c2 = 1
        let macro_f1 = scalar(
            F1Score::new()
                .with_average(Average::Macro)
                .compute(&targets, &preds)
                .unwrap(),
        );
        assert!((macro_f1 - (2.0 / 3.0 + 2.0 / 3.0 + 1.0) / 3.0).abs() < 1e-9);

        let weighted = scalar(
            F1Score::new()
                .with_average(Average::Weighted)
                .compute(&targets, &preds)
                .unwrap(),
        );
        assert!((weighted - (2.0 * 2.0 / 3.0 + 2.0 / 3.0 + 1.0) / 4.0).abs() < 1e-9);

        let micro = scalar(
            F1Score::new()
                .with_average(Average::Micro)
                .compute(&targets, &preds)
                .unwrap(),
        );
        assert!((micro - 0.75).abs() < 1e-9);
    }

    #[test]
    fn test_precision_recall_f1_named() {
        let targets = array(&[4], vec![1.0, 0.0, 1.0, 1.0]);
        let preds = array(&[4], vec![1.0, 1.0, 0.0, 1.0]);
        let value = PrecisionRecallF1::new().compute(&targets, &preds).unwrap();
        match value {
            MetricValue::Named(entries) => {
                let keys: Vec<&str> = entries.iter().map(|(k, _)| k.as_str()).collect();
                assert_eq!(keys, vec!["precision", "recall", "f1"]);
                assert!((entries[0].1 - 2.0 / 3.0).abs() < 1e-9);
                assert!((entries[1].1 - 2.0 / 3.0).abs() < 1e-9);
            }
            other => panic!("expected named value, got {:?}", other),
        }
    }

    #[test]
    fn test_multiclass_confusion_one_hot() {
        let preds = array(
            &[3, 3],
            vec![
                0.7, 0.2, 0.1, // class 0
                0.1, 0.8, 0.1, // class 1
                0.2, 0.3, 0.5, // class 2
            ],
        );
        let targets = array(
            &[3, 3],
            vec![
                1.0, 0.0, 0.0, //
                0.0, 1.0, 0.0, //
                0.0, 0.0, 1.0, //
            ],
        );

        let cm = MultiClassConfusionMatrix::from_labels(&class_labels(&targets), &class_labels(&preds));
        assert_eq!(cm.classes(), &[0, 1, 2]);
        assert!((cm.accuracy() - 1.0).abs() < 1e-6);
        assert!((cm.macro_f1(0.0) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_balanced_accuracy() {
        let targets = array(&[6], vec![0.0, 0.0, 0.0, 0.0, 1.0, 1.0]);
        let preds = array(&[6], vec![0.0, 0.0, 0.0, 0.0, 1.0, 0.0]);
        // recall c0 = 1.0, recall c1 = 0.5
        let value = scalar(BalancedAccuracy::new().compute(&targets, &preds).unwrap());
        assert!((value - 0.75).abs() < 1e-9);
    }

    #[test]
    fn test_top_k_accuracy() {
        let preds = array(&[2, 3], vec![0.5, 0.3, 0.2, 0.1, 0.2, 0.7]);
        let targets = array(&[2, 3], vec![0.0, 1.0, 0.0, 1.0, 0.0, 0.0]);

        let top1 = scalar(TopKAccuracy::new(1).compute(&targets, &preds).unwrap());
        let top2 = scalar(TopKAccuracy::new(2).compute(&targets, &preds).unwrap());
        assert!((top1 - 0.0).abs() < 1e-9);
        assert!((top2 - 0.5).abs() < 1e-9);

        let flat = array(&[2], vec![0.0, 1.0]);
        assert!(matches!(
            TopKAccuracy::new(1).compute(&flat, &flat),
            Err(MetricError::InvalidShape { .. })
        ));
    }

    #[test]
    fn test_average_from_str() {
        assert_eq!("Weighted".parse::<Average>(), Ok(Average::Weighted));
        assert!("samples".parse::<Average>().is_err());
    }
}
