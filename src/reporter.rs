/**
This modules gives a few tools to prettyprint the scores of every example and the overall mean.
*/
use enum_iterator::{all, Sequence};
use serde::{Deserialize, Serialize};
use std::fmt::Display;
use std::str::FromStr;

/// The reporter holds the scores of every example of a batch and their mean. It can be used to
/// display the results (i.e. prettyprint them) as if they were collected into a dataframe. The
/// reporter can be built with the `iou_f1_report` and `iou_f1_report_tags` functions.
///
/// # Example
///
/// ```rust
/// use spaneval::{iou_f1_report_tags, RationaleConfig};
///
/// let y_true: Vec<Vec<u8>> = vec![vec![0, 1, 1, 0, 0], vec![0, 0, 1, 1, 0]];
/// let y_pred: Vec<Vec<u8>> = vec![vec![0, 1, 1, 0, 0], vec![0, 1, 1, 0, 0]];
///
/// let reporter = iou_f1_report_tags(&y_pred, &y_true, &[4, 4], RationaleConfig::default()).unwrap();
///
/// let expected_report =
/// "Example, Precision, Recall, Fscore, Matched, Predicted, Reference
/// Overall_Mean, 0.5, 0.5, 0.5, 1, 2, 2
/// 0, 1, 1, 1, 1, 1, 1
/// 1, 0, 0, 0, 0, 1, 1\n";
///
/// assert_eq!(expected_report, reporter.to_string());
/// ```
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Default)]
pub struct Reporter {
    pub(crate) examples: Vec<ExampleScore>,
    pub(crate) overall: OverallScore,
}

impl Reporter {
    /// Scores of every example, in input order.
    pub fn examples(&self) -> &[ExampleScore] {
        &self.examples
    }
    pub fn overall(&self) -> &OverallScore {
        &self.overall
    }
}

impl From<Reporter> for Vec<ExampleScore> {
    fn from(value: Reporter) -> Self {
        value.examples
    }
}

/// The Reporter struct acts as a dataframe when displayed.
impl Display for Reporter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(
            f,
            "Example, Precision, Recall, Fscore, Matched, Predicted, Reference"
        )?;
        let (matched, predicted, reference) =
            self.examples
                .iter()
                .fold((0, 0, 0), |(m, p, r), s| {
                    (m + s.true_positives, p + s.predicted_spans, r + s.reference_spans)
                });
        writeln!(
            f,
            "Overall_Mean, {}, {}, {}, {}, {}, {}",
            self.overall.precision,
            self.overall.recall,
            self.overall.fscore,
            matched,
            predicted,
            reference
        )?;
        for (i, v) in self.examples.iter().enumerate() {
            writeln!(f, "{}, {}", i, v)?
        }
        Ok(())
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Default)]
/// Span-level scores of a single example.
pub struct ExampleScore {
    /// Fraction of the predicted spans that were matched
    pub precision: f32,
    /// Matched spans over the number of reference spans
    pub recall: f32,
    /// Harmonic mean of the precision and the recall
    pub fscore: f32,
    /// Number of predicted spans whose best IoU reaches the threshold
    pub true_positives: usize,
    pub predicted_spans: usize,
    pub reference_spans: usize,
}

/// The ExampleScore struct acts as a line in a dataframe when displayed.
impl Display for ExampleScore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}, {}, {}, {}, {}, {}",
            self.precision,
            self.recall,
            self.fscore,
            self.true_positives,
            self.predicted_spans,
            self.reference_spans
        )
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Default)]
/// Mean of the scores of the examples taking part in the batch mean.
pub struct OverallScore {
    pub precision: f32,
    pub recall: f32,
    pub fscore: f32,
    /// Number of examples averaged
    pub examples: usize,
}

/// Enumeration of the different types of averaging possible and supported by the ordinal
/// scores. &str can be parsed to create an `Average`.
#[derive(Debug, Hash, PartialEq, Eq, Copy, Clone, Serialize, Deserialize, Sequence)]
pub enum Average {
    None,
    Micro,
    Macro,
    Weighted,
}
impl Display for Average {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}", self)
    }
}
impl FromStr for Average {
    type Err = AverageParsingError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        all::<Average>()
            .find(|a| a.to_string().to_lowercase() == s.to_lowercase())
            .ok_or_else(|| AverageParsingError(String::from(s)))
    }
}

#[derive(Debug, PartialEq, PartialOrd, Eq, Ord, Clone)]
pub struct AverageParsingError(String);
impl Display for AverageParsingError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Impossible to parse the string ({}) into an Average",
            self.0
        )
    }
}
impl std::error::Error for AverageParsingError {}
