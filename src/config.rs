/*
 * This modules contains some quality of life structs. Most importantly, it contains the
 * `RationaleConfig` struct, which implements the default trait. This config is passed to the
 * `iou_f1` family of functions and to the token-level metrics to simplify their arguments.
*/
use crate::metrics::{ComputationError, DivByZeroStrat};
use crate::reporter::ExampleScore;
use crate::span::SpanBoundary;
use either::Either as LeftOrRight;
use enum_iterator::{all, Sequence};
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt::Display;
use std::str::FromStr;

/// Default IoU a predicted span must reach to count as a true positive.
pub const DEFAULT_THRESHOLD: f32 = 0.5;

/// Default axis enumerating the tag classes of the prediction scores
/// (examples x sequence x tags).
pub const DEFAULT_TAG_AXIS: usize = 2;

/// What to do with examples that have neither predicted nor reference spans.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Sequence, Serialize, Deserialize, Default)]
pub enum EmptyExamplePolicy {
    /// The example counts in the mean with an F1 of 0.
    #[default]
    Zero,
    /// The example is left out of the mean.
    Skip,
}

impl EmptyExamplePolicy {
    /// Does this example take part in the batch mean?
    pub(crate) fn counts(&self, score: &ExampleScore) -> bool {
        match self {
            Self::Zero => true,
            Self::Skip => score.predicted_spans > 0 || score.reference_spans > 0,
        }
    }
}

impl Display for EmptyExamplePolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Zero => write!(f, "zero"),
            Self::Skip => write!(f, "skip"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsingEmptyExamplePolicyError(String);

impl Display for ParsingEmptyExamplePolicyError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Could not parse {} into an `EmptyExamplePolicy`",
            self.0
        )
    }
}
impl Error for ParsingEmptyExamplePolicyError {}

impl FromStr for EmptyExamplePolicy {
    type Err = ParsingEmptyExamplePolicyError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        all::<EmptyExamplePolicy>()
            .find(|p| p.to_string() == s.to_lowercase())
            .ok_or_else(|| ParsingEmptyExamplePolicyError(String::from(s)))
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
/// Config struct used to simplify the inputs of parameters to the main functions of `spaneval`.
/// It implements the default trait.
pub struct RationaleConfig {
    /// Minimum IoU (inclusive) for a predicted span to count as a true positive. Must be
    /// non-negative.
    threshold: f32,
    /// Axis of the prediction scores holding the tag classes, 1 or 2. The scores are reduced
    /// with an argmax over this axis. Axis 0 always enumerates the examples.
    tag_axis: usize,
    /// How a run of positive tags touching the end of the sequence is closed.
    boundary: SpanBoundary,
    /// This parameter describe what to do when we encounter a division by zero when computing
    /// precision and recall. The most common solution is to replace the results by 0.
    zero_division: DivByZeroStrat,
    /// What to do with examples without any span on either side.
    empty_examples: EmptyExamplePolicy,
    /// Can we use multiple cores to score the examples? Each example is scored independently and
    /// the results are reduced in input order, so both modes return the same value.
    parallel: bool,
}

impl Default for RationaleConfig {
    fn default() -> Self {
        Self {
            threshold: DEFAULT_THRESHOLD,
            tag_axis: DEFAULT_TAG_AXIS,
            boundary: SpanBoundary::Exclusive,
            zero_division: DivByZeroStrat::ReplaceBy0,
            empty_examples: EmptyExamplePolicy::Zero,
            parallel: false,
        }
    }
}

impl RationaleConfig {
    pub fn new() -> Self {
        Self::default()
    }
    pub fn threshold(&self) -> f32 {
        self.threshold
    }
    pub fn tag_axis(&self) -> usize {
        self.tag_axis
    }
    pub fn boundary(&self) -> SpanBoundary {
        self.boundary
    }
    pub fn zero_division(&self) -> DivByZeroStrat {
        self.zero_division
    }
    pub fn empty_examples(&self) -> EmptyExamplePolicy {
        self.empty_examples
    }
    pub fn parallel(&self) -> bool {
        self.parallel
    }

    /// Rejects thresholds that would silently turn every prediction into a match.
    pub(crate) fn validate(&self) -> Result<(), ComputationError> {
        if self.threshold.is_nan() || self.threshold < 0.0 {
            return Err(ComputationError::InvalidThreshold(self.threshold));
        }
        Ok(())
    }
}

impl<ZeroDiv> From<RationaleConfigBuilder<ZeroDiv>> for RationaleConfig
where
    ZeroDiv: Into<DivByZeroStrat>,
{
    fn from(value: RationaleConfigBuilder<ZeroDiv>) -> Self {
        Self {
            threshold: value.threshold,
            tag_axis: value.tag_axis,
            boundary: value.boundary,
            zero_division: value.zero_division.either_into(),
            empty_examples: value.empty_examples,
            parallel: value.parallel,
        }
    }
}

impl Display for RationaleConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let string = format!("IoU threshold: {}\n Tag axis: {}\n Terminal span boundary: {}\n Strategy when encountering a division by zero: {:?}\n Examples without spans: {}\n Using parallel computations: {}", self.threshold, self.tag_axis, self.boundary, self.zero_division, self.empty_examples, self.parallel);
        write!(f, "{}", string)
    }
}

/// This builder can be used to build and customize a `RationaleConfig` stucture.
pub struct RationaleConfigBuilder<ZeroDiv>
where
    ZeroDiv: Into<DivByZeroStrat>,
{
    threshold: f32,
    tag_axis: usize,
    boundary: SpanBoundary,
    zero_division: LeftOrRight<ZeroDiv, DivByZeroStrat>,
    empty_examples: EmptyExamplePolicy,
    parallel: bool,
}

impl Default for RationaleConfigBuilder<DivByZeroStrat> {
    fn default() -> Self {
        Self::new()
    }
}

impl<ZeroDiv> RationaleConfigBuilder<ZeroDiv>
where
    ZeroDiv: Into<DivByZeroStrat>,
{
    pub fn threshold(mut self, threshold: f32) -> Self {
        self.threshold = threshold;
        self
    }
    pub fn tag_axis(mut self, tag_axis: usize) -> Self {
        self.tag_axis = tag_axis;
        self
    }
    pub fn boundary(mut self, boundary: SpanBoundary) -> Self {
        self.boundary = boundary;
        self
    }
    pub fn division_by_zero(mut self, division_by_zero: ZeroDiv) -> Self {
        self.zero_division = LeftOrRight::Left(division_by_zero);
        self
    }
    pub fn empty_examples(mut self, empty_examples: EmptyExamplePolicy) -> Self {
        self.empty_examples = empty_examples;
        self
    }
    pub fn parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }
    pub fn new() -> Self {
        Self {
            threshold: DEFAULT_THRESHOLD,
            tag_axis: DEFAULT_TAG_AXIS,
            boundary: SpanBoundary::Exclusive,
            zero_division: LeftOrRight::Right(DivByZeroStrat::ReplaceBy0),
            empty_examples: EmptyExamplePolicy::Zero,
            parallel: false,
        }
    }
    pub fn build(self) -> RationaleConfig {
        RationaleConfig::from(self)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(DivByZeroStrat::ReplaceBy1)]
    #[case(DivByZeroStrat::ReplaceBy0)]
    #[case(DivByZeroStrat::ReturnError)]
    fn test_builder_setters_division_by_zero(#[case] strat: DivByZeroStrat) {
        let builder = RationaleConfigBuilder::default();
        let config = builder.division_by_zero(strat).build();
        assert_eq!(config.zero_division, strat)
    }

    #[rstest]
    #[case(SpanBoundary::Exclusive)]
    #[case(SpanBoundary::Legacy)]
    fn test_builder_setters_boundary(#[case] boundary: SpanBoundary) {
        let config = RationaleConfigBuilder::default().boundary(boundary).build();
        assert_eq!(config.boundary(), boundary)
    }

    #[rstest]
    #[case(0.0)]
    #[case(0.5)]
    #[case(0.75)]
    fn test_builder_setters_threshold(#[case] threshold: f32) {
        let config = RationaleConfigBuilder::default()
            .threshold(threshold)
            .build();
        assert_eq!(config.threshold(), threshold);
        assert!(config.validate().is_ok());
    }

    #[rstest]
    #[case(-0.1)]
    #[case(f32::NAN)]
    fn test_invalid_threshold(#[case] threshold: f32) {
        let config = RationaleConfigBuilder::default()
            .threshold(threshold)
            .build();
        assert!(matches!(
            config.validate(),
            Err(ComputationError::InvalidThreshold(_))
        ));
    }

    #[rstest]
    #[case(true)]
    #[case(false)]
    fn test_builder_setters_parallel(#[case] parallel: bool) {
        let config = RationaleConfigBuilder::default().parallel(parallel).build();
        assert_eq!(config.parallel(), parallel)
    }

    #[rstest]
    #[case(EmptyExamplePolicy::Zero)]
    #[case(EmptyExamplePolicy::Skip)]
    fn test_builder_setters_empty_examples(#[case] policy: EmptyExamplePolicy) {
        let config = RationaleConfigBuilder::default()
            .empty_examples(policy)
            .tag_axis(1)
            .build();
        assert_eq!(config.empty_examples(), policy);
        assert_eq!(config.tag_axis(), 1);
    }

    #[test]
    fn test_default_config() {
        let config = RationaleConfig::default();
        assert_eq!(config, RationaleConfigBuilder::default().build());
        assert_eq!(config.threshold(), 0.5);
        assert_eq!(config.tag_axis(), 2);
        assert_eq!(config.boundary(), SpanBoundary::Exclusive);
        assert_eq!(config.zero_division(), DivByZeroStrat::ReplaceBy0);
        assert!(!config.parallel());
    }

    #[rstest]
    #[case("zero", Ok(EmptyExamplePolicy::Zero))]
    #[case("SKIP", Ok(EmptyExamplePolicy::Skip))]
    #[case("drop", Err(ParsingEmptyExamplePolicyError(String::from("drop"))))]
    fn test_parse_empty_example_policy(
        #[case] input: &str,
        #[case] expected: Result<EmptyExamplePolicy, ParsingEmptyExamplePolicyError>,
    ) {
        assert_eq!(EmptyExamplePolicy::from_str(input), expected)
    }
}
