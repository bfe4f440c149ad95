use crate::config::{EmptyExamplePolicy, RationaleConfig};
use crate::datastructure::TagBatch;
/**
This module computes the span-level IoU F1 of rationale predictions, along with the token-level
accuracy and F1 baselines. Every example is trimmed, parsed into spans and scored on its own;
the batch result is the mean of the per-example scores.
*/
use crate::reporter::{ExampleScore, OverallScore, Reporter};
use crate::span::{get_spans, match_spans, InvalidTag, MatchRecord};
use core::fmt;
use enum_iterator::Sequence;
use itertools::multizip;
use log::{debug, trace, warn};
use ndarray::{prelude::*, Data, ScalarOperand};
use ndarray_stats::{errors::MultiInputError, QuantileExt};
use num::{Float, PrimInt};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::{
    error::Error,
    fmt::{Debug, Display},
    str::FromStr,
};

#[derive(Debug, Clone, PartialEq)]
pub struct ArrayNotUniqueOrEmpty(usize);

impl Display for ArrayNotUniqueOrEmpty {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "This array contains more than one element or is empty. It has length: {} Cannot call `item` on it", self.0
        )
    }
}
impl Error for ArrayNotUniqueOrEmpty {}

pub(crate) trait ItemArrayExt<Output> {
    /// Returns the element out of the Array. Can return an error if the array is empty of if the
    /// array has a length superior to 1.
    fn item(&self) -> Result<Output, ArrayNotUniqueOrEmpty>;
}

impl<F: Clone, T: Data<Elem = F>> ItemArrayExt<F> for ArrayBase<T, Dim<[usize; 1]>> {
    fn item(&self) -> Result<F, ArrayNotUniqueOrEmpty> {
        match (self.len(), self.first()) {
            (1, Some(first)) => Ok(first.clone()),
            (n, _) => Err(ArrayNotUniqueOrEmpty(n)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Sequence, Serialize, Deserialize, Default)]
/// How do we handle ratios with a zero denominator? Do we define them as 0, as 1, or return an
/// error? The rationale scores define them as 0 (`ReplaceBy0`), which is the default. It is not
/// recommended to use the ReturnError; it will stop the computation. It can be useful if you
/// believe there should be no 0 in the denominator.
pub enum DivByZeroStrat {
    /// Returns 1 when the denominator is 0
    ReplaceBy1,
    /// Returns an error
    ReturnError,
    /// Returns 0 when the denominator is 0
    #[default]
    ReplaceBy0,
}

impl DivByZeroStrat {
    /// Value given to a ratio whose denominator is 0.
    pub(crate) fn zero_denominator_value(self) -> Result<f32, DivisionByZeroError> {
        match self {
            Self::ReplaceBy0 => Ok(0.0),
            Self::ReplaceBy1 => Ok(1.0),
            Self::ReturnError => Err(DivisionByZeroError),
        }
    }
}

#[derive(Debug)]
pub struct ParsingDivisionByZeroStrategyError<S: Debug + Display>(S);

impl<S: Debug + Display> Display for ParsingDivisionByZeroStrategyError<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Could not parse the {} into a a `DivisionByZeroStrategy`",
            self.0
        )
    }
}
impl<S: Debug + Display> Error for ParsingDivisionByZeroStrategyError<S> {}

impl FromStr for DivByZeroStrat {
    type Err = ParsingDivisionByZeroStrategyError<String>;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_ref() {
            "replaceby1" | "replacebyone" => Ok(DivByZeroStrat::ReplaceBy1),
            "replaceby0" | "replacebyzero" => Ok(DivByZeroStrat::ReplaceBy0),
            "returnerror" | "error" => Ok(DivByZeroStrat::ReturnError),
            _ => Err(ParsingDivisionByZeroStrategyError(String::from(s))),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct DivisionByZeroError;

impl Display for DivisionByZeroError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Encountered division by zero")
    }
}

impl Error for DivisionByZeroError {}

/// Internal extension trait for Num's Float trait
pub trait FloatExt: Float + Send + Sync + Clone + ScalarOperand + Debug {}

impl<T: Float + Send + Sync + Clone + Copy + ScalarOperand + Debug> FloatExt for T {}

/// Single place where ratios are computed. A zero denominator is resolved with the
/// `zero_division` strategy.
pub(crate) fn safe_divide(
    numerator: f32,
    denominator: f32,
    zero_division: DivByZeroStrat,
) -> Result<f32, DivisionByZeroError> {
    if denominator == 0.0 {
        zero_division.zero_denominator_value()
    } else {
        Ok(numerator / denominator)
    }
}

/// Harmonic mean of the precision and the recall. It is 0 as soon as one of them is 0.
///
/// ```rust
/// use spaneval::f1;
///
/// assert_eq!(f1(1.0, 1.0), 1.0);
/// assert_eq!(f1(0.0, 0.7), 0.0);
/// assert!((f1(0.5, 1.0) - 2.0 / 3.0).abs() < 1e-6);
/// ```
pub fn f1(precision: f32, recall: f32) -> f32 {
    if precision == 0.0 || recall == 0.0 {
        0.0
    } else {
        2.0 * precision * recall / (precision + recall)
    }
}

#[derive(Debug, PartialEq, Clone, Copy)]
/// Error type to represent when two lists or arrays are not of the
/// same length (when they should be).
pub struct InconsistentLengthError(pub(crate) usize, pub(crate) usize);

impl Display for InconsistentLengthError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Inconsistent length between two lists. The first one is length {}, the second one is length {}",
            self.0, self.1
        )
    }
}
impl Error for InconsistentLengthError {}

/// Checks that predictions, labels and lengths describe the same number of examples.
fn check_consistent_length(
    y_pred_len: usize,
    y_true_len: usize,
    lens_len: usize,
) -> Result<(), InconsistentLengthError> {
    if y_pred_len != y_true_len {
        return Err(InconsistentLengthError(y_pred_len, y_true_len));
    }
    if y_pred_len != lens_len {
        return Err(InconsistentLengthError(y_pred_len, lens_len));
    }
    Ok(())
}

#[derive(Debug, Clone, PartialEq)]
/// Enum error encompassing many type of failures that could happen when computing the metrics.
pub enum ComputationError {
    BetaNotPositive,
    InconsistentLength(InconsistentLengthError),
    /// `lens[example]` asks for more tokens than the sequence holds once the structural token is
    /// dropped.
    LengthOutOfBounds {
        example: usize,
        len: usize,
        available: usize,
    },
    InvalidTag(InvalidTag),
    InvalidThreshold(f32),
    InvalidAxis(usize),
    /// The argmax of the scores of this example is undefined (NaN or no tag classes).
    UndefinedArgmax(usize),
    InvalidNumLabels(usize),
    DivisionByZero(DivisionByZeroError),
    InputError(MultiInputError),
    EmptyArray(String),
    EmptyOrNotUnique(ArrayNotUniqueOrEmpty),
    EmptyInput(String),
}
impl Display for ComputationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::BetaNotPositive => write!(f, "Beta value is not positive"),
            Self::InconsistentLength(length_err) => std::fmt::Display::fmt(length_err, f),
            Self::LengthOutOfBounds {
                example,
                len,
                available,
            } => write!(
                f,
                "Example {} has a length of {} but only {} tokens are available",
                example, len, available
            ),
            Self::InvalidTag(tag_err) => std::fmt::Display::fmt(tag_err, f),
            Self::InvalidThreshold(threshold) => write!(
                f,
                "The IoU threshold must be a non-negative number, got {}",
                threshold
            ),
            Self::InvalidAxis(axis) => write!(
                f,
                "The tag axis {} is invalid, the tags must lie on axis 1 or 2 of the scores",
                axis
            ),
            Self::UndefinedArgmax(example) => write!(
                f,
                "Could not reduce the scores of example {} with an argmax",
                example
            ),
            Self::InvalidNumLabels(n) => {
                write!(f, "The number of labels must be at least 1, got {}", n)
            }
            Self::DivisionByZero(div_err) => std::fmt::Display::fmt(&div_err, f),
            Self::InputError(input_err) => std::fmt::Display::fmt(&input_err, f),
            Self::EmptyArray(empty_err) => write!(f, "Found an empty array in {}", empty_err),
            Self::EmptyOrNotUnique(size_err) => std::fmt::Display::fmt(size_err, f),
            Self::EmptyInput(which) => write!(f, "Received an empty input {}", which),
        }
    }
}
impl Error for ComputationError {}

impl From<InvalidTag> for ComputationError {
    fn from(value: InvalidTag) -> Self {
        Self::InvalidTag(value)
    }
}

impl From<InconsistentLengthError> for ComputationError {
    fn from(value: InconsistentLengthError) -> Self {
        Self::InconsistentLength(value)
    }
}

impl From<DivisionByZeroError> for ComputationError {
    fn from(value: DivisionByZeroError) -> Self {
        Self::DivisionByZero(value)
    }
}

impl From<MultiInputError> for ComputationError {
    fn from(value: MultiInputError) -> Self {
        Self::InputError(value)
    }
}

impl From<ArrayNotUniqueOrEmpty> for ComputationError {
    fn from(value: ArrayNotUniqueOrEmpty) -> Self {
        Self::EmptyOrNotUnique(value)
    }
}

/// Reduces the prediction scores to one tag per token with an argmax over `axis`. Ties go to the
/// lowest tag index.
///
/// * `scores`: Scores of shape (examples x sequence x tags) when `axis` is 2.
/// * `axis`: Axis enumerating the tag classes. Must be 1 or 2.
pub fn argmax_tags<F: FloatExt>(
    scores: ArrayView3<F>,
    axis: usize,
) -> Result<Array2<usize>, ComputationError> {
    // Axis 0 enumerates the examples.
    if axis == 0 || axis >= scores.ndim() {
        return Err(ComputationError::InvalidAxis(axis));
    }
    let reduced = scores.map_axis(Axis(axis), |lane| lane.argmax().ok());
    if let Some(((example, _), _)) = reduced.indexed_iter().find(|(_, v)| v.is_none()) {
        return Err(ComputationError::UndefinedArgmax(example));
    }
    Ok(reduced.mapv(|v| v.unwrap_or_default()))
}

fn rows<A: Clone>(array: ArrayView2<A>) -> Vec<Vec<A>> {
    array.outer_iter().map(|row| row.to_vec()).collect()
}

/// Validates the batch and trims every example. Returns the predicted and the true tags.
fn prepare_batch<A, P, T>(
    y_pred: &[P],
    y_true: &[T],
    lens: &[usize],
) -> Result<(TagBatch, TagBatch), ComputationError>
where
    A: PrimInt + Debug,
    P: AsRef<[A]>,
    T: AsRef<[A]>,
{
    check_consistent_length(y_pred.len(), y_true.len(), lens.len())?;
    if y_pred.is_empty() {
        return Err(ComputationError::EmptyInput(String::from("y_pred")));
    }
    let y_pred_batch = TagBatch::try_new(y_pred, lens)?;
    let y_true_batch = TagBatch::try_new(y_true, lens)?;
    Ok((y_pred_batch, y_true_batch))
}

/// Scores the spans of a single example: true positives are the predicted spans whose best IoU
/// reaches `threshold`, precision is computed over the predicted spans and recall over the
/// reference spans.
///
/// * `record`: Best IoU of each predicted span.
/// * `reference_spans`: Number of reference spans.
/// * `threshold`: Minimum IoU (inclusive) of a true positive.
/// * `zero_division`: What to do when there is no predicted or no reference span.
///
/// An example without any span on either side scores 0, whatever the `zero_division` strategy.
pub fn score_example(
    record: &MatchRecord,
    reference_spans: usize,
    threshold: f32,
    zero_division: DivByZeroStrat,
) -> Result<ExampleScore, DivisionByZeroError> {
    let predicted_spans = record.len();
    if predicted_spans == 0 && reference_spans == 0 {
        return Ok(ExampleScore::default());
    }
    let true_positives = record.true_positives(threshold);
    let precision = safe_divide(
        true_positives as f32,
        predicted_spans as f32,
        zero_division,
    )?;
    let recall = safe_divide(
        true_positives as f32,
        reference_spans as f32,
        zero_division,
    )?;
    Ok(ExampleScore {
        precision,
        recall,
        fscore: f1(precision, recall),
        true_positives,
        predicted_spans,
        reference_spans,
    })
}

fn evaluate_example(
    example: usize,
    predicted: &[u8],
    reference: &[u8],
    config: &RationaleConfig,
) -> Result<ExampleScore, ComputationError> {
    let predicted_spans =
        get_spans(predicted, config.boundary()).map_err(|e| e.in_example(example))?;
    let reference_spans =
        get_spans(reference, config.boundary()).map_err(|e| e.in_example(example))?;
    let record = match_spans(&predicted_spans, &reference_spans);
    let score = score_example(
        &record,
        reference_spans.len(),
        config.threshold(),
        config.zero_division(),
    )?;
    trace!(
        "example {}: predicted {} reference {} matched {}",
        example,
        predicted_spans,
        reference_spans,
        score.true_positives
    );
    Ok(score)
}

fn score_batch(
    y_pred: &TagBatch,
    y_true: &TagBatch,
    config: &RationaleConfig,
) -> Result<Vec<ExampleScore>, ComputationError> {
    let pairs: Vec<(&[u8], &[u8])> = y_pred.iter_vec().zip(y_true.iter_vec()).collect();
    if config.parallel() {
        pairs
            .into_par_iter()
            .enumerate()
            .map(|(example, (p, t))| evaluate_example(example, p, t, config))
            .collect()
    } else {
        pairs
            .into_iter()
            .enumerate()
            .map(|(example, (p, t))| evaluate_example(example, p, t, config))
            .collect()
    }
}

/// Averages the scores of the examples kept by the policy. The values are summed in input order.
fn overall_score(
    examples: &[ExampleScore],
    policy: EmptyExamplePolicy,
) -> Result<OverallScore, ComputationError> {
    let counted: Vec<&ExampleScore> = examples.iter().filter(|s| policy.counts(s)).collect();
    if counted.is_empty() {
        warn!(
            "All {} examples were skipped: none has a predicted or a reference span",
            examples.len()
        );
        return Err(ComputationError::EmptyInput(String::from(
            "examples with at least one span",
        )));
    }
    let mean = |field: fn(&ExampleScore) -> f32, name: &str| {
        Array1::from_iter(counted.iter().map(|s| field(s)))
            .mean()
            .ok_or_else(|| ComputationError::EmptyArray(String::from(name)))
    };
    Ok(OverallScore {
        precision: mean(|s| s.precision, "precision")?,
        recall: mean(|s| s.recall, "recall")?,
        fscore: mean(|s| s.fscore, "fscore")?,
        examples: counted.len(),
    })
}

/// Main entrypoint of the library. Computes the span-level IoU F1 of every example and returns
/// their mean. The scores are reduced with an argmax over `config.tag_axis()`, then every example
/// drops its first token and keeps the next `lens[i]` tokens.
///
/// * `predictions`: Prediction scores (examples x sequence x tags).
/// * `labels`: True tags (examples x sequence), `0` or `1`.
/// * `lens`: Number of tokens to keep in each example.
/// * `config`: Threshold, span boundary and division by zero strategy.
///
/// # Example
/// ```rust
/// use ndarray::array;
/// use spaneval::{iou_f1, RationaleConfig};
///
/// let predictions = array![[[1.0, 0.0], [0.2, 0.8], [0.1, 0.9], [0.7, 0.3]]];
/// let labels = array![[0, 1, 1, 0]];
///
/// let score = iou_f1(predictions.view(), labels.view(), &[3], RationaleConfig::default());
/// assert_eq!(score.unwrap(), 1.0);
/// ```
pub fn iou_f1<F: FloatExt>(
    predictions: ArrayView3<F>,
    labels: ArrayView2<usize>,
    lens: &[usize],
    config: RationaleConfig,
) -> Result<f32, ComputationError> {
    Ok(iou_f1_report(predictions, labels, lens, config)?.overall().fscore)
}

/// Same as `iou_f1`, but returns the scores of every example in a `Reporter`.
pub fn iou_f1_report<F: FloatExt>(
    predictions: ArrayView3<F>,
    labels: ArrayView2<usize>,
    lens: &[usize],
    config: RationaleConfig,
) -> Result<Reporter, ComputationError> {
    config.validate()?;
    let y_pred = argmax_tags(predictions, config.tag_axis())?;
    iou_f1_report_tags(&rows(y_pred.view()), &rows(labels), lens, config)
}

/// Computes the span-level IoU F1 of tags that were already reduced to `0` and `1`. Every
/// sequence still starts with the structural token.
///
/// ```rust
/// use spaneval::{iou_f1_tags, RationaleConfig};
///
/// let y_pred: Vec<Vec<u8>> = vec![vec![0, 1, 1, 0, 0, 0]];
/// let y_true: Vec<Vec<u8>> = vec![vec![0, 0, 1, 1, 0, 0]];
///
/// // The spans (0, 2) and (1, 3) have an IoU of 1/3.
/// let score = iou_f1_tags(&y_pred, &y_true, &[5], RationaleConfig::default());
/// assert_eq!(score.unwrap(), 0.0);
/// ```
pub fn iou_f1_tags<A, P, T>(
    y_pred: &[P],
    y_true: &[T],
    lens: &[usize],
    config: RationaleConfig,
) -> Result<f32, ComputationError>
where
    A: PrimInt + Debug,
    P: AsRef<[A]>,
    T: AsRef<[A]>,
{
    Ok(iou_f1_report_tags(y_pred, y_true, lens, config)?
        .overall()
        .fscore)
}

/// Same as `iou_f1_tags`, but returns the scores of every example in a `Reporter`.
pub fn iou_f1_report_tags<A, P, T>(
    y_pred: &[P],
    y_true: &[T],
    lens: &[usize],
    config: RationaleConfig,
) -> Result<Reporter, ComputationError>
where
    A: PrimInt + Debug,
    P: AsRef<[A]>,
    T: AsRef<[A]>,
{
    config.validate()?;
    let (y_pred_batch, y_true_batch) = prepare_batch(y_pred, y_true, lens)?;
    debug!(
        "Scoring the spans of {} examples (threshold: {}, boundary: {}, parallel: {})",
        y_pred_batch.len(),
        config.threshold(),
        config.boundary(),
        config.parallel()
    );
    let examples = score_batch(&y_pred_batch, &y_true_batch, &config)?;
    let overall = overall_score(&examples, config.empty_examples())?;
    debug!(
        "Mean IoU F1 over {} examples: {}",
        overall.examples, overall.fscore
    );
    Ok(Reporter { examples, overall })
}

/// Fraction of the tokens of an example where the prediction equals the label.
fn example_accuracy(
    predicted: &[u8],
    reference: &[u8],
    zero_division: DivByZeroStrat,
) -> Result<f32, DivisionByZeroError> {
    let correct = predicted
        .iter()
        .zip(reference)
        .filter(|(p, t)| p == t)
        .count();
    safe_divide(correct as f32, predicted.len() as f32, zero_division)
}

/// Binary F1 of the positive tag, counted token by token.
fn example_token_f1(
    predicted: &[u8],
    reference: &[u8],
    zero_division: DivByZeroStrat,
) -> Result<f32, DivisionByZeroError> {
    let (mut tp, mut fp, mut fn_) = (0usize, 0usize, 0usize);
    for (p, t) in predicted.iter().zip(reference) {
        match (p, t) {
            (1, 1) => tp += 1,
            (1, _) => fp += 1,
            (_, 1) => fn_ += 1,
            _ => {}
        }
    }
    let precision = safe_divide(tp as f32, (tp + fp) as f32, zero_division)?;
    let recall = safe_divide(tp as f32, (tp + fn_) as f32, zero_division)?;
    Ok(f1(precision, recall))
}

type TokenMetric = fn(&[u8], &[u8], DivByZeroStrat) -> Result<f32, DivisionByZeroError>;

fn token_metric<A, P, T>(
    y_pred: &[P],
    y_true: &[T],
    lens: &[usize],
    zero_division: DivByZeroStrat,
    metric: TokenMetric,
) -> Result<f32, ComputationError>
where
    A: PrimInt + Debug,
    P: AsRef<[A]>,
    T: AsRef<[A]>,
{
    let (y_pred_batch, y_true_batch) = prepare_batch(y_pred, y_true, lens)?;
    let values = multizip((y_pred_batch.iter_vec(), y_true_batch.iter_vec()))
        .map(|(p, t)| metric(p, t, zero_division))
        .collect::<Result<Vec<f32>, _>>()?;
    Array::from_vec(values)
        .mean()
        .ok_or_else(|| ComputationError::EmptyInput(String::from("y_pred")))
}

/// Token-level accuracy of every example, averaged over the batch. The inputs are handled like
/// in `iou_f1`.
pub fn token_accuracy<F: FloatExt>(
    predictions: ArrayView3<F>,
    labels: ArrayView2<usize>,
    lens: &[usize],
    config: RationaleConfig,
) -> Result<f32, ComputationError> {
    let y_pred = argmax_tags(predictions, config.tag_axis())?;
    token_accuracy_tags(&rows(y_pred.view()), &rows(labels), lens, config)
}

/// Token-level accuracy of tags that were already reduced to `0` and `1`.
pub fn token_accuracy_tags<A, P, T>(
    y_pred: &[P],
    y_true: &[T],
    lens: &[usize],
    config: RationaleConfig,
) -> Result<f32, ComputationError>
where
    A: PrimInt + Debug,
    P: AsRef<[A]>,
    T: AsRef<[A]>,
{
    token_metric(
        y_pred,
        y_true,
        lens,
        config.zero_division(),
        example_accuracy,
    )
}

/// Token-level binary F1 of every example, averaged over the batch. The inputs are handled like
/// in `iou_f1`.
pub fn token_f1<F: FloatExt>(
    predictions: ArrayView3<F>,
    labels: ArrayView2<usize>,
    lens: &[usize],
    config: RationaleConfig,
) -> Result<f32, ComputationError> {
    let y_pred = argmax_tags(predictions, config.tag_axis())?;
    token_f1_tags(&rows(y_pred.view()), &rows(labels), lens, config)
}

/// Token-level binary F1 of tags that were already reduced to `0` and `1`.
pub fn token_f1_tags<A, P, T>(
    y_pred: &[P],
    y_true: &[T],
    lens: &[usize],
    config: RationaleConfig,
) -> Result<f32, ComputationError>
where
    A: PrimInt + Debug,
    P: AsRef<[A]>,
    T: AsRef<[A]>,
{
    token_metric(
        y_pred,
        y_true,
        lens,
        config.zero_division(),
        example_token_f1,
    )
}
