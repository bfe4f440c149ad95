/*!
Overlap between predicted and reference spans. Every predicted span is matched with the reference
span it overlaps the most, measured by Intersection-over-Union. Predictions are matched
independently: two predictions can share the same reference span.
*/
use super::Span;
use serde::{Deserialize, Serialize};
use std::cmp;

/// Intersection-over-Union of the token sets covered by two spans. Returns `0` when both spans
/// are empty.
///
/// ```rust
/// use spaneval::{iou, Span};
///
/// let value = iou(&Span::new(0, 2), &Span::new(1, 3));
/// assert!((value - 1.0 / 3.0).abs() < 1e-6);
/// ```
pub fn iou(a: &Span, b: &Span) -> f32 {
    let intersection = cmp::min(a.end, b.end).saturating_sub(cmp::max(a.start, b.start));
    let union = a.len() + b.len() - intersection;
    if union == 0 {
        0.0
    } else {
        intersection as f32 / union as f32
    }
}

/// Best IoU of every predicted span of a single example, in prediction order.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct MatchRecord {
    matches: Vec<(Span, f32)>,
}

impl MatchRecord {
    /// Number of predicted spans.
    pub fn len(&self) -> usize {
        self.matches.len()
    }
    pub fn is_empty(&self) -> bool {
        self.matches.is_empty()
    }
    pub fn iter(&self) -> std::slice::Iter<'_, (Span, f32)> {
        self.matches.iter()
    }
    /// Best IoU recorded for a predicted span, if it was part of the predictions.
    pub fn best_iou(&self, span: &Span) -> Option<f32> {
        self.matches
            .iter()
            .find(|(s, _)| s == span)
            .map(|(_, value)| *value)
    }
    /// Number of predicted spans whose best IoU reaches the threshold (inclusive).
    pub fn true_positives(&self, threshold: f32) -> usize {
        self.matches
            .iter()
            .filter(|(_, value)| *value >= threshold)
            .count()
    }
}

/// Matches every predicted span against all reference spans and keeps the best IoU. A prediction
/// gets `0` when there is no reference span.
pub fn match_spans(predicted: &[Span], reference: &[Span]) -> MatchRecord {
    let matches = predicted
        .iter()
        .map(|p| {
            let best = reference
                .iter()
                .map(|t| iou(p, t))
                .fold(0.0, f32::max);
            (*p, best)
        })
        .collect();
    MatchRecord { matches }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ahash::AHashSet;
    use quickcheck::{self, TestResult};
    use rstest::rstest;

    /// IoU computed on explicit sets of token offsets.
    fn point_set_iou(a: &Span, b: &Span) -> f32 {
        let a_set: AHashSet<usize> = (a.start..a.end).collect();
        let b_set: AHashSet<usize> = (b.start..b.end).collect();
        let intersection = a_set.intersection(&b_set).count();
        let union = a_set.union(&b_set).count();
        if union == 0 {
            0.0
        } else {
            intersection as f32 / union as f32
        }
    }

    fn span_from(start: u8, length: u8) -> Span {
        Span::new(start as usize, start as usize + length as usize)
    }

    #[rstest]
    #[case((0, 2), (1, 3), 1.0 / 3.0)]
    #[case((2, 5), (2, 5), 1.0)]
    #[case((0, 2), (2, 4), 0.0)]
    #[case((0, 10), (2, 4), 0.2)]
    #[case((1, 1), (0, 4), 0.0)]
    #[case((1, 1), (1, 1), 0.0)]
    fn test_iou(#[case] a: (usize, usize), #[case] b: (usize, usize), #[case] expected: f32) {
        let actual = iou(&Span::from(a), &Span::from(b));
        assert!((actual - expected).abs() < 1e-6, "{} != {}", actual, expected);
    }

    #[test]
    fn test_match_spans() {
        let predicted = [Span::new(0, 2), Span::new(4, 6), Span::new(8, 9)];
        let reference = [Span::new(1, 3), Span::new(4, 7)];
        let record = match_spans(&predicted, &reference);
        assert_eq!(record.len(), 3);
        assert!((record.best_iou(&predicted[0]).unwrap() - 1.0 / 3.0).abs() < 1e-6);
        assert!((record.best_iou(&predicted[1]).unwrap() - 2.0 / 3.0).abs() < 1e-6);
        assert_eq!(record.best_iou(&predicted[2]), Some(0.0));
        assert_eq!(record.best_iou(&Span::new(5, 6)), None);
        assert_eq!(record.true_positives(0.5), 1);
        assert_eq!(record.true_positives(0.3), 2);
    }

    #[test]
    fn test_match_spans_no_reference() {
        let record = match_spans(&[Span::new(0, 3)], &[]);
        assert_eq!(record.iter().collect::<Vec<_>>(), vec![&(Span::new(0, 3), 0.0)]);
        assert_eq!(record.true_positives(0.0), 1);
        assert_eq!(record.true_positives(0.5), 0);
    }

    #[test]
    fn test_match_spans_no_prediction() {
        let record = match_spans(&[], &[Span::new(0, 3)]);
        assert!(record.is_empty());
        assert_eq!(record.true_positives(0.5), 0);
    }

    #[test]
    fn test_propertie_iou_bounds_and_symmetry() {
        fn iou_bounds_and_symmetry(a: (u8, u8), b: (u8, u8)) -> TestResult {
            let (a, b) = (span_from(a.0, a.1), span_from(b.0, b.1));
            let ab = iou(&a, &b);
            let ba = iou(&b, &a);
            let in_bounds = (0.0..=1.0).contains(&ab);
            let is_symmetric = ab == ba;
            let same_as_sets = (ab - point_set_iou(&a, &b)).abs() < 1e-6;
            let identity = a.is_empty() || iou(&a, &a) == 1.0;
            TestResult::from_bool(in_bounds && is_symmetric && same_as_sets && identity)
        }
        let mut qc = quickcheck::QuickCheck::new().tests(2000);
        qc.quickcheck(iou_bounds_and_symmetry as fn((u8, u8), (u8, u8)) -> TestResult)
    }

    #[test]
    fn test_propertie_threshold_monotonicity() {
        fn threshold_monotonicity(
            predicted: Vec<(u8, u8)>,
            reference: Vec<(u8, u8)>,
            low: u8,
            high: u8,
        ) -> TestResult {
            if low > high {
                return TestResult::discard();
            }
            let predicted: Vec<Span> = predicted.into_iter().map(|(s, l)| span_from(s, l)).collect();
            let reference: Vec<Span> = reference.into_iter().map(|(s, l)| span_from(s, l)).collect();
            let record = match_spans(&predicted, &reference);
            let low_tp = record.true_positives(low as f32 / 255.0);
            let high_tp = record.true_positives(high as f32 / 255.0);
            TestResult::from_bool(high_tp <= low_tp && low_tp <= record.len())
        }
        let mut qc = quickcheck::QuickCheck::new().tests(2000);
        qc.quickcheck(
            threshold_monotonicity as fn(Vec<(u8, u8)>, Vec<(u8, u8)>, u8, u8) -> TestResult,
        )
    }
}
