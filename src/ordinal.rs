/**
This module scores ordinal classification. Normalized scores in `[0, 1]` are scaled to one of
`num_labels` integer classes, optionally binned with explicit bounds, and compared with the
labels with the accuracy and the per-class precision, recall and f-score.
*/
use crate::metrics::{
    ComputationError, DivByZeroStrat, DivisionByZeroError, FloatExt, InconsistentLengthError,
    ItemArrayExt,
};
use crate::reporter::Average;
use ahash::{HashMap as AHashMap, HashSet as AHashSet};
use itertools::multizip;
use log::debug;
use ndarray::{prelude::*, Zip};
use ndarray_stats::SummaryStatisticsExt;
use num::{Num, ToPrimitive};
use std::{collections::BTreeSet, fmt::Debug};

/// Type alias for representing the output of the `precision_recall_fscore_support`. Each arrays
/// contain a vector of f32. The first array contains the precision, the second the recall, the
/// third the f-score and the last one the support.
pub type PrecisionRecallFScoreTrueSum = (
    Array<f32, Dim<[usize; 1]>>,
    Array<f32, Dim<[usize; 1]>>,
    Array<f32, Dim<[usize; 1]>>,
    Array<usize, Dim<[usize; 1]>>,
);

/// Weighted, micro and macro averaged f-scores.
pub type WeightedMicroMacro = (f32, f32, f32);

/// Scales a normalized score to its ordinal class: `value * (num_labels - 1)` rounded half to
/// even. With `clamp`, the class is kept in `[0, num_labels - 1]`.
///
/// ```rust
/// use spaneval::to_ordinal;
///
/// assert_eq!(to_ordinal(0.5, 3, true), 1);
/// assert_eq!(to_ordinal(0.25, 3, true), 0);
/// assert_eq!(to_ordinal(1.4, 3, false), 3);
/// assert_eq!(to_ordinal(1.4, 3, true), 2);
/// ```
pub fn to_ordinal(value: f64, num_labels: usize, clamp: bool) -> i64 {
    let top = num_labels.saturating_sub(1) as i64;
    let class = (value * top as f64).round_ties_even() as i64;
    if clamp {
        class.clamp(0, top)
    } else {
        class
    }
}

/// Index of the first bound strictly greater than `value`. Values past every bound fall in the
/// last class.
pub fn bin_label(value: f64, bounds: &[f64], num_labels: usize) -> i64 {
    bounds
        .iter()
        .position(|b| value < *b)
        .map_or(num_labels.saturating_sub(1) as i64, |b| b as i64)
}

/// Maps both sides to their ordinal classes. Only the predictions are clamped and binned.
fn ordinal_classes<F: FloatExt, D: Dimension>(
    preds: ArrayView<F, D>,
    labels: ArrayView<F, D>,
    num_labels: usize,
    bounds: Option<&[f64]>,
) -> Result<(Array1<i64>, Array1<i64>), ComputationError> {
    if num_labels == 0 {
        return Err(ComputationError::InvalidNumLabels(num_labels));
    }
    if preds.len() != labels.len() {
        return Err(InconsistentLengthError(preds.len(), labels.len()).into());
    }
    if preds.is_empty() {
        return Err(ComputationError::EmptyInput(String::from("preds")));
    }
    let to_f64 = |v: &F| v.to_f64().unwrap_or(f64::NAN);
    let y_pred: Array1<i64> = preds
        .iter()
        .map(|v| {
            let class = to_ordinal(to_f64(v), num_labels, true);
            match bounds {
                Some(b) => bin_label(class as f64, b, num_labels),
                None => class,
            }
        })
        .collect();
    let y_true: Array1<i64> = labels
        .iter()
        .map(|v| to_ordinal(to_f64(v), num_labels, false))
        .collect();
    Ok((y_pred, y_true))
}

/// Fraction of the predictions landing in the same ordinal class as their label. Both arrays are
/// flattened.
///
/// * `preds`: Normalized predicted scores
/// * `labels`: Normalized labels
/// * `num_labels`: Number of ordinal classes
/// * `bounds`: Optional bounds used to bin the predicted classes
pub fn flat_accuracy<F: FloatExt, D: Dimension>(
    preds: ArrayView<F, D>,
    labels: ArrayView<F, D>,
    num_labels: usize,
    bounds: Option<&[f64]>,
) -> Result<f32, ComputationError> {
    let (y_pred, y_true) = ordinal_classes(preds, labels, num_labels, bounds)?;
    let correct = Zip::from(&y_pred)
        .and(&y_true)
        .fold(0usize, |acc, p, t| acc + usize::from(p == t));
    Ok(correct as f32 / y_pred.len() as f32)
}

/// Weighted, micro and macro f1 of the ordinal classes. The classes are the sorted union of the
/// predicted and true classes; the weighted average uses the true support.
pub fn compute_f1<F: FloatExt, D: Dimension>(
    preds: ArrayView<F, D>,
    labels: ArrayView<F, D>,
    num_labels: usize,
    bounds: Option<&[f64]>,
) -> Result<WeightedMicroMacro, ComputationError> {
    let (y_pred, y_true) = ordinal_classes(preds, labels, num_labels, bounds)?;
    let fscore = |average| -> Result<f32, ComputationError> {
        let (_, _, f, _) = precision_recall_fscore_support(
            y_true.view(),
            y_pred.view(),
            1.0,
            average,
            DivByZeroStrat::ReplaceBy0,
            false,
        )?;
        Ok(f.item()?)
    };
    let scores = (
        fscore(Average::Weighted)?,
        fscore(Average::Micro)?,
        fscore(Average::Macro)?,
    );
    debug!(
        "Ordinal f1 of {} predictions over {} labels: weighted {}, micro {}, macro {}",
        y_pred.len(),
        num_labels,
        scores.0,
        scores.1,
        scores.2
    );
    Ok(scores)
}

/// Counts the true positives, the predictions and the true occurences of every class. The
/// classes are sorted.
fn extract_tp_actual_correct(
    y_true: ArrayView1<i64>,
    y_pred: ArrayView1<i64>,
) -> (Array1<usize>, Array1<usize>, Array1<usize>) {
    let unique: AHashSet<i64> = y_true.iter().chain(y_pred.iter()).copied().collect();
    let classes: BTreeSet<i64> = unique.into_iter().collect();
    let index: AHashMap<i64, usize> = classes.iter().enumerate().map(|(i, c)| (*c, i)).collect();
    let mut pred_sum = Array1::zeros(classes.len());
    let mut tp_sum = Array1::zeros(classes.len());
    let mut true_sum = Array1::zeros(classes.len());
    for (t, p) in multizip((y_true.iter(), y_pred.iter())) {
        let (t_idx, p_idx) = (index[t], index[p]);
        true_sum[t_idx] += 1;
        pred_sum[p_idx] += 1;
        if t == p {
            tp_sum[t_idx] += 1;
        }
    }
    (pred_sum, tp_sum, true_sum)
}

/// Computes the precision, recall, fscore and support of every class of `y_true` and `y_pred`.
/// With an average other than `Average::None`, every array holds a single value.
///
/// * `y_true`: True classes
/// * `y_pred`: Predicted classes
/// * `beta`: Value of the `beta` parameter of the fscore. `beta=1` for F1 and `beta=0.5` for F0.5.
/// * `average`: What type of average to use.
/// * `zero_division`: What to do in case of division by zero.
/// * `parallel`: Can we use multiple cores for computations?
pub fn precision_recall_fscore_support<F: FloatExt>(
    y_true: ArrayView1<i64>,
    y_pred: ArrayView1<i64>,
    beta: F,
    average: Average,
    zero_division: DivByZeroStrat,
    parallel: bool,
) -> Result<PrecisionRecallFScoreTrueSum, ComputationError> {
    if y_true.len() != y_pred.len() {
        return Err(InconsistentLengthError(y_true.len(), y_pred.len()).into());
    }
    if y_true.is_empty() {
        return Err(ComputationError::EmptyInput(String::from("y_true")));
    }
    if beta.is_sign_negative() {
        return Err(ComputationError::BetaNotPositive);
    };
    let (mut pred_sum, mut tp_sum, mut true_sum) = extract_tp_actual_correct(y_true, y_pred);
    let beta2 = beta.powi(2).to_f32().unwrap_or(f32::INFINITY);
    if matches!(average, Average::Micro) {
        tp_sum = array![tp_sum.sum()];
        pred_sum = array![pred_sum.sum()];
        true_sum = array![true_sum.sum()];
    };
    let tp_sum_f32 = tp_sum.mapv(|x| x as f32);
    let precision = prf_divide(
        tp_sum_f32.clone(),
        pred_sum.mapv(|x| x as f32).view_mut(),
        parallel,
        zero_division,
    )?;
    let recall = prf_divide(
        tp_sum_f32,
        true_sum.mapv(|x| x as f32).view_mut(),
        parallel,
        zero_division,
    )?;
    let f_score: Array1<f32> = if beta2.is_infinite() {
        recall.clone()
    } else {
        Zip::from(&precision)
            .and(&recall)
            .map_collect(|&p, &r| {
                let denom = beta2 * p + r;
                if denom == 0.0 {
                    0.0
                } else {
                    (1.0 + beta2) * p * r / denom
                }
            })
    };
    match average {
        Average::Weighted => {
            let weights = true_sum.mapv(|x| x as f32);
            if true_sum.sum() == 0 {
                zero_division.zero_denominator_value()?;
                return Ok((precision, recall, f_score, array![0]));
            };
            let final_precision = array![precision.weighted_mean(&weights)?];
            let final_recall = array![recall.weighted_mean(&weights)?];
            let final_f_score = array![f_score.weighted_mean(&weights)?];
            Ok((final_precision, final_recall, final_f_score, array![true_sum.sum()]))
        }
        Average::None => Ok((precision, recall, f_score, true_sum)),
        _ => {
            let mean = |values: &Array1<f32>, name: &str| {
                values
                    .mean()
                    .ok_or_else(|| ComputationError::EmptyArray(String::from(name)))
            };
            let final_precision = array![mean(&precision, "precision")?];
            let final_recall = array![mean(&recall, "recall")?];
            let final_f_score = array![mean(&f_score, "fscore")?];
            Ok((final_precision, final_recall, final_f_score, array![true_sum.sum()]))
        }
    }
}

/// Divides `numerator` by `denominator`, element by element. The entries with a zero
/// denominator are resolved with `zero_division`.
fn prf_divide<I: Debug + Num + Clone + Send + Sync + Copy, D: Dimension>(
    numerator: Array<I, D>,
    denominator: ArrayViewMut<I, D>,
    parallel: bool,
    zero_division: DivByZeroStrat,
) -> Result<Array<I, D>, DivisionByZeroError> {
    let (mut result, non_zero_mask) = if parallel {
        par_prf_divide_results_and_mask(numerator, denominator)
    } else {
        prf_divide_results_and_mask(numerator, denominator)
    };
    if non_zero_mask.iter().all(|m| *m) {
        return Ok(result);
    }
    let replacement = match zero_division {
        DivByZeroStrat::ReturnError => return Err(DivisionByZeroError),
        DivByZeroStrat::ReplaceBy1 => I::one(),
        DivByZeroStrat::ReplaceBy0 => I::zero(),
    };
    let zip = Zip::from(&mut result).and(&non_zero_mask);
    let replace = |r: &mut I, non_zero: &bool| {
        if !*non_zero {
            *r = replacement
        }
    };
    if parallel {
        zip.par_for_each(replace);
    } else {
        zip.for_each(replace);
    }
    Ok(result)
}

/// This function computes the result in parallel. For a synchronous
/// version of this function, see `prf_divide_results_and_mask`.
///
/// * `numerator`: Numerator of the division
/// * `denominator`: Denominator of the division
fn par_prf_divide_results_and_mask<I: Debug + Num + Clone + Send + Sync + Copy, D: Dimension>(
    numerator: Array<I, D>,
    mut denominator: ArrayViewMut<I, D>,
) -> (Array<I, D>, Array<bool, D>) {
    let non_zero_mask = Zip::from(&denominator).par_map_collect(|d| *d != I::zero());
    denominator.par_mapv_inplace(|v| if v == I::zero() { I::one() } else { v });
    (numerator / denominator, non_zero_mask)
}

/// This function computes the result synchronously. For a parallel
/// version of this function, see `par_prf_divide_results_and_mask`.
///
/// * `numerator`: Numerator of the division
/// * `denominator`: Denominator of the division
fn prf_divide_results_and_mask<I: Debug + Num + Clone + Copy, D: Dimension>(
    numerator: Array<I, D>,
    mut denominator: ArrayViewMut<I, D>,
) -> (Array<I, D>, Array<bool, D>) {
    let non_zero_mask = Zip::from(&denominator).map_collect(|d| *d != I::zero());
    denominator.mapv_inplace(|v| if v == I::zero() { I::one() } else { v });
    (numerator / denominator, non_zero_mask)
}

#[cfg(test)]
mod tests {
    use super::*;
    use quickcheck::{QuickCheck, TestResult};
    use rstest::rstest;

    trait CloseEnough {
        fn are_close(&self, other: &Self, eps: f32) -> bool;
    }

    impl CloseEnough for f32 {
        fn are_close(&self, other: &Self, eps: f32) -> bool {
            (self - other).abs() < eps
        }
    }

    impl CloseEnough for Array1<f32> {
        fn are_close(&self, other: &Self, eps: f32) -> bool {
            self.len() == other.len() && self.iter().zip(other).all(|(a, b)| a.are_close(b, eps))
        }
    }

    #[rstest]
    #[case(0.5, 3, true, 1)]
    #[case(0.25, 3, true, 0)]
    #[case(0.75, 3, true, 2)]
    #[case(1.4, 3, true, 2)]
    #[case(1.4, 3, false, 3)]
    #[case(-0.3, 3, true, 0)]
    #[case(-0.3, 3, false, -1)]
    #[case(0.7, 1, true, 0)]
    fn test_to_ordinal(
        #[case] value: f64,
        #[case] num_labels: usize,
        #[case] clamp: bool,
        #[case] expected: i64,
    ) {
        assert_eq!(to_ordinal(value, num_labels, clamp), expected)
    }

    #[rstest]
    #[case(0.0, 0)]
    #[case(1.0, 1)]
    #[case(1.5, 2)]
    #[case(2.0, 2)]
    fn test_bin_label(#[case] value: f64, #[case] expected: i64) {
        assert_eq!(bin_label(value, &[0.5, 1.5], 3), expected)
    }

    #[test]
    fn test_flat_accuracy() {
        let preds = array![0.1, 0.5, 0.9, 1.2];
        let labels = array![0.0, 0.5, 0.5, 1.0];
        let actual = flat_accuracy(preds.view(), labels.view(), 3, None).unwrap();
        assert_eq!(actual, 0.75);
        let actual = flat_accuracy(preds.view(), labels.view(), 3, Some(&[1.5, 2.5])).unwrap();
        assert_eq!(actual, 0.5);
    }

    #[test]
    fn test_flat_accuracy_flattens() {
        let preds = array![[0.0, 1.0], [0.5, 0.5]];
        let labels = array![[0.0, 1.0], [1.0, 0.5]];
        let actual = flat_accuracy(preds.view(), labels.view(), 2, None).unwrap();
        // 0.5 * 1 rounds half to even, down to class 0.
        assert_eq!(actual, 0.75);
    }

    #[test]
    fn test_flat_accuracy_errors() {
        let preds = array![0.1, 0.5];
        let labels = array![0.0];
        assert_eq!(
            flat_accuracy(preds.view(), labels.view(), 3, None),
            Err(ComputationError::InconsistentLength(
                InconsistentLengthError(2, 1)
            ))
        );
        assert_eq!(
            flat_accuracy(preds.view(), preds.view(), 0, None),
            Err(ComputationError::InvalidNumLabels(0))
        );
        let empty = Array1::<f64>::zeros(0);
        assert!(matches!(
            flat_accuracy(empty.view(), empty.view(), 3, None),
            Err(ComputationError::EmptyInput(_))
        ));
    }

    #[test]
    fn test_compute_f1() {
        let preds = array![0.0, 0.5, 1.0, 1.0];
        let labels = array![0.0, 0.5, 0.5, 1.0];
        let (weighted, micro, macro_) = compute_f1(preds.view(), labels.view(), 3, None).unwrap();
        assert!(weighted.are_close(&0.75, 1e-6));
        assert!(micro.are_close(&0.75, 1e-6));
        assert!(macro_.are_close(&(7.0 / 9.0), 1e-6));
    }

    #[test]
    fn test_compute_f1_weighted_by_true_support() {
        // Per-class f1 is [2/3, 1/2, 0]. The true support is [1, 3, 0] while the predicted
        // support is [2, 1, 1], which would give 11/24.
        let preds = array![0.0, 0.0, 0.5, 1.0];
        let labels = array![0.0, 0.5, 0.5, 0.5];
        let (weighted, micro, macro_) = compute_f1(preds.view(), labels.view(), 3, None).unwrap();
        assert!(weighted.are_close(&(13.0 / 24.0), 1e-6));
        assert!(micro.are_close(&0.5, 1e-6));
        assert!(macro_.are_close(&(7.0 / 18.0), 1e-6));
    }

    #[test]
    fn test_precision_recall_fscore_support_no_average() {
        let y_true = array![0, 1, 1, 2];
        let y_pred = array![0, 1, 2, 2];
        let (p, r, f, s) = precision_recall_fscore_support(
            y_true.view(),
            y_pred.view(),
            1.0,
            Average::None,
            DivByZeroStrat::ReplaceBy0,
            false,
        )
        .unwrap();
        assert!(p.are_close(&array![1.0, 1.0, 0.5], 1e-6));
        assert!(r.are_close(&array![1.0, 0.5, 1.0], 1e-6));
        assert!(f.are_close(&array![1.0, 2.0 / 3.0, 2.0 / 3.0], 1e-6));
        assert_eq!(s, array![1, 2, 1]);
    }

    #[rstest]
    #[case(DivByZeroStrat::ReplaceBy0, array![0.5, 0.0])]
    #[case(DivByZeroStrat::ReplaceBy1, array![0.5, 1.0])]
    fn test_precision_zero_division(
        #[case] strat: DivByZeroStrat,
        #[case] expected: Array1<f32>,
        #[values(true, false)] parallel: bool,
    ) {
        let y_true = array![0, 1];
        let y_pred = array![0, 0];
        let (p, r, _, _) = precision_recall_fscore_support(
            y_true.view(),
            y_pred.view(),
            1.0,
            Average::None,
            strat,
            parallel,
        )
        .unwrap();
        assert!(p.are_close(&expected, 1e-6));
        assert!(r.are_close(&array![1.0, 0.0], 1e-6));
    }

    #[test]
    fn test_precision_recall_fscore_support_errors() {
        let y_true = array![0, 1];
        let y_pred = array![0, 0];
        let actual = precision_recall_fscore_support(
            y_true.view(),
            y_pred.view(),
            1.0,
            Average::Macro,
            DivByZeroStrat::ReturnError,
            false,
        );
        assert_eq!(
            actual,
            Err(ComputationError::DivisionByZero(DivisionByZeroError))
        );
        let actual = precision_recall_fscore_support(
            y_true.view(),
            y_pred.view(),
            -1.0,
            Average::Macro,
            DivByZeroStrat::ReplaceBy0,
            false,
        );
        assert_eq!(actual, Err(ComputationError::BetaNotPositive));
        let actual = precision_recall_fscore_support(
            y_true.view(),
            y_pred.slice(s![..1]),
            1.0,
            Average::Macro,
            DivByZeroStrat::ReplaceBy0,
            false,
        );
        assert_eq!(
            actual,
            Err(ComputationError::InconsistentLength(
                InconsistentLengthError(2, 1)
            ))
        );
    }

    #[test]
    fn test_propertie_dimension_of_averages() {
        fn dimension_of_averages(pairs: Vec<(u8, u8)>, average: u8) -> TestResult {
            if pairs.is_empty() {
                return TestResult::discard();
            }
            let average = match average % 3 {
                0 => Average::Micro,
                1 => Average::Macro,
                _ => Average::Weighted,
            };
            let y_true: Array1<i64> = pairs.iter().map(|(t, _)| (*t % 4) as i64).collect();
            let y_pred: Array1<i64> = pairs.iter().map(|(_, p)| (*p % 4) as i64).collect();
            let (p, r, f, s) = precision_recall_fscore_support(
                y_true.view(),
                y_pred.view(),
                1.0,
                average,
                DivByZeroStrat::ReplaceBy0,
                false,
            )
            .unwrap();
            TestResult::from_bool(p.len() == 1 && r.len() == 1 && f.len() == 1 && s.len() == 1)
        }
        let mut qc = QuickCheck::new().tests(500);
        qc.quickcheck(dimension_of_averages as fn(Vec<(u8, u8)>, u8) -> TestResult)
    }

    #[test]
    fn test_propertie_micro_f1_is_accuracy() {
        fn micro_f1_is_accuracy(pairs: Vec<(u8, u8)>) -> TestResult {
            if pairs.is_empty() {
                return TestResult::discard();
            }
            let y_true: Array1<i64> = pairs.iter().map(|(t, _)| (*t % 4) as i64).collect();
            let y_pred: Array1<i64> = pairs.iter().map(|(_, p)| (*p % 4) as i64).collect();
            let accuracy = Zip::from(&y_true)
                .and(&y_pred)
                .fold(0usize, |acc, t, p| acc + usize::from(t == p)) as f32
                / y_true.len() as f32;
            let (_, _, f, _) = precision_recall_fscore_support(
                y_true.view(),
                y_pred.view(),
                1.0,
                Average::Micro,
                DivByZeroStrat::ReplaceBy0,
                true,
            )
            .unwrap();
            TestResult::from_bool(f[0].are_close(&accuracy, 1e-5))
        }
        let mut qc = QuickCheck::new().tests(500);
        qc.quickcheck(micro_f1_is_accuracy as fn(Vec<(u8, u8)>) -> TestResult)
    }
}
