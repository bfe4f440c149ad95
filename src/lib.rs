/*!
This library scores rationale extraction models. A rationale is the set of tokens a model points
at to justify its prediction; it is tagged token by token with `1` (inside the rationale) and `0`
(outside). The library parses the tags into spans, matches every predicted span with the
reference spans through their intersection over union (IoU) and reports the mean span-level F1
of a batch. It also ships the token-level baselines and the ordinal classification scores that
usually come along with rationale models.

# Spans
A span is a maximal run of consecutive `1` tags, written as the half-open interval
`[start, end)`. With the default `SpanBoundary::Exclusive`, a run touching the end of the
sequence ends at the length of the sequence. `SpanBoundary::Legacy` closes such a run on its last
index instead, which shortens it by one token. Runs ending before the sequence does are the same
under both boundaries.

# Scoring
* Every example of a batch drops its first token (a structural token such as `[CLS]`) and keeps
    the next `lens[i]` tokens.
* A predicted span is a true positive when its best IoU with any reference span reaches the
    threshold (0.5 by default, inclusive).
* Precision is computed over the predicted spans and recall over the reference spans. Ratios
    with a zero denominator follow the `DivByZeroStrat` (0 by default).
* The batch score is the mean of the per-example F1.

# Terminology
* A tag is the `0` or `1` label of a token.
* The IoU of two spans is the size of their intersection divided by the size of their union.
* An ordinal label is the integer class of a normalized score scaled by `num_labels - 1`.
*/

mod config;
mod datastructure;
mod metrics;
mod ordinal;
mod reporter;
mod span;

// The public api starts here
pub use span::{
    get_spans, iou, match_spans, InvalidTag, MatchRecord, ParsingSpanBoundaryError, Span,
    SpanBoundary, SpanIter, Spans,
};

pub use metrics::{
    argmax_tags, f1, iou_f1, iou_f1_report, iou_f1_report_tags, iou_f1_tags, score_example,
    token_accuracy, token_accuracy_tags, token_f1, token_f1_tags, ComputationError,
    DivByZeroStrat, DivisionByZeroError, FloatExt, InconsistentLengthError,
    ParsingDivisionByZeroStrategyError,
};

pub use ordinal::{
    bin_label, compute_f1, flat_accuracy, precision_recall_fscore_support, to_ordinal,
    PrecisionRecallFScoreTrueSum, WeightedMicroMacro,
};

pub use reporter::{Average, AverageParsingError, ExampleScore, OverallScore, Reporter};

pub use config::{
    EmptyExamplePolicy, ParsingEmptyExamplePolicyError, RationaleConfig, RationaleConfigBuilder,
    DEFAULT_TAG_AXIS, DEFAULT_THRESHOLD,
};

/// Span-level IoU F1 of tags that were already reduced to `0` and `1`, with the default
/// configuration. See `iou_f1_tags` to customize the threshold, the span boundary or the
/// division by zero strategy.
///
/// * `y_pred`: Predicted tags. Every sequence starts with the structural token.
/// * `y_true`: True tags.
/// * `lens`: Number of tokens to keep in each example, after the structural token.
///
/// #Example
/// ```rust
/// use spaneval::{iou_f1_default, iou_f1_tags, RationaleConfigBuilder, SpanBoundary};
///
/// let y_pred: Vec<Vec<u8>> = vec![vec![0, 1, 1, 0, 0, 1, 1], vec![0, 0, 0, 1, 1]];
/// let y_true: Vec<Vec<u8>> = vec![vec![0, 1, 1, 0, 0, 1, 1], vec![0, 0, 1, 1, 1]];
///
/// // Example 0 matches exactly. In example 1, (2, 4) covers 2/3 of (1, 4).
/// assert_eq!(iou_f1_default(&y_pred, &y_true, &[6, 4]).unwrap(), 1.0);
///
/// // The terminal spans shrink to (2, 3) and (1, 3): their IoU drops to 1/2.
/// let legacy = RationaleConfigBuilder::default().boundary(SpanBoundary::Legacy).build();
/// assert_eq!(iou_f1_tags(&y_pred, &y_true, &[6, 4], legacy).unwrap(), 1.0);
///
/// let strict = RationaleConfigBuilder::default().threshold(0.7).build();
/// assert_eq!(iou_f1_tags(&y_pred, &y_true, &[6, 4], strict).unwrap(), 0.5);
/// ```
pub fn iou_f1_default<A, P, T>(
    y_pred: &[P],
    y_true: &[T],
    lens: &[usize],
) -> Result<f32, ComputationError>
where
    A: num::PrimInt + std::fmt::Debug,
    P: AsRef<[A]>,
    T: AsRef<[A]>,
{
    iou_f1_tags(y_pred, y_true, lens, RationaleConfig::default())
}
