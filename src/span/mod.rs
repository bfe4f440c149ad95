/*!
This module parses a sequence of binary rationale tags into spans. A span is a maximal run of
positive tags, represented as a half-open interval of token offsets.
*/
use enum_iterator::{all, Sequence};
use num::PrimInt;
use serde::{Deserialize, Serialize};
use std::{
    error::Error,
    fmt::{Debug, Display},
    iter::Enumerate,
    ops::Deref,
    slice::Iter,
    str::FromStr,
};

mod matching;

// Re-exporting
pub use matching::{iou, match_spans, MatchRecord};

/// A span is a contiguous run of tokens tagged as part of the rationale. It contains a start and
/// an end (exclusive), both relative to the trimmed sequence it was extracted from.
#[derive(
    Debug, Hash, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, Default,
)]
pub struct Span {
    pub(crate) start: usize,
    pub(crate) end: usize,
}

impl Span {
    /// Builds a new span. `end` is exclusive.
    pub fn new(start: usize, end: usize) -> Self {
        Span { start, end }
    }
    pub fn start(&self) -> usize {
        self.start
    }
    pub fn end(&self) -> usize {
        self.end
    }
    /// Number of tokens covered by the span. Spans closed with the `Legacy` boundary can be empty.
    pub fn len(&self) -> usize {
        self.end.saturating_sub(self.start)
    }
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Display for Span {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "({}, {})", self.start, self.end)
    }
}

impl From<(usize, usize)> for Span {
    fn from(value: (usize, usize)) -> Self {
        Span::new(value.0, value.1)
    }
}

/// How to close a span that is still open when the sequence ends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Sequence, Serialize, Deserialize, Default)]
pub enum SpanBoundary {
    /// The terminal span ends at the length of the sequence and covers the whole run.
    #[default]
    Exclusive,
    /// The terminal span ends at the index of the last token visited. Its last token is lost, and
    /// a run of length one becomes an empty span. Reproduces historical scores.
    Legacy,
}

impl Display for SpanBoundary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Exclusive => write!(f, "exclusive"),
            Self::Legacy => write!(f, "legacy"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsingSpanBoundaryError(String);

impl Display for ParsingSpanBoundaryError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let expected: Vec<String> = all::<SpanBoundary>().map(|b| b.to_string()).collect();
        write!(
            f,
            "Could not parse {} into a `SpanBoundary`. Expected one of: {}",
            self.0,
            expected.join(", ")
        )
    }
}
impl Error for ParsingSpanBoundaryError {}

impl FromStr for SpanBoundary {
    type Err = ParsingSpanBoundaryError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        all::<SpanBoundary>()
            .find(|b| b.to_string() == s.to_lowercase())
            .ok_or_else(|| ParsingSpanBoundaryError(String::from(s)))
    }
}

/// Error returned when a tag is neither `0` nor `1`. The example index is filled in when the
/// tag comes from a batch.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct InvalidTag {
    pub(crate) example: Option<usize>,
    pub(crate) index: usize,
    pub(crate) value: String,
}

impl InvalidTag {
    pub(crate) fn new<T: Debug>(index: usize, value: T) -> Self {
        InvalidTag {
            example: None,
            index,
            value: format!("{:?}", value),
        }
    }
    pub(crate) fn in_example(mut self, example: usize) -> Self {
        self.example = Some(example);
        self
    }
}

impl Display for InvalidTag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.example {
            Some(example) => write!(
                f,
                "Invalid tag {} at position {} of example {}. Only 0 and 1 are allowed",
                self.value, self.index, example
            ),
            None => write!(
                f,
                "Invalid tag {} at position {}. Only 0 and 1 are allowed",
                self.value, self.index
            ),
        }
    }
}

impl Error for InvalidTag {}

/// Binary rationale tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) enum RationaleTag {
    Outside,
    Inside,
}

impl RationaleTag {
    pub(crate) fn try_from_int<T: PrimInt + Debug>(
        value: T,
        index: usize,
    ) -> Result<Self, InvalidTag> {
        match value.to_u8() {
            Some(0) => Ok(Self::Outside),
            Some(1) => Ok(Self::Inside),
            _ => Err(InvalidTag::new(index, value)),
        }
    }
}

impl From<RationaleTag> for u8 {
    fn from(value: RationaleTag) -> Self {
        match value {
            RationaleTag::Outside => 0,
            RationaleTag::Inside => 1,
        }
    }
}

/// State of the span parser. `Open` holds the start of the current run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SpanState {
    Closed,
    Open(usize),
}

/// This struct iterates over a *single* sequence of tags and returns the spans it contains.
pub struct SpanIter<'a, T> {
    /// The content on which we are iterating
    tags: Enumerate<Iter<'a, T>>,
    state: SpanState,
    boundary: SpanBoundary,
    /// Index of the last tag visited
    last_index: usize,
    len: usize,
}

impl<'a, T> SpanIter<'a, T> {
    pub fn new(tags: &'a [T], boundary: SpanBoundary) -> Self {
        SpanIter {
            tags: tags.iter().enumerate(),
            state: SpanState::Closed,
            boundary,
            last_index: 0,
            len: tags.len(),
        }
    }

    /// Closes the span still open at the end of the sequence, if any.
    fn close_terminal(&mut self) -> Option<Span> {
        match self.state {
            SpanState::Closed => None,
            SpanState::Open(start) => {
                self.state = SpanState::Closed;
                let end = match self.boundary {
                    SpanBoundary::Exclusive => self.len,
                    SpanBoundary::Legacy => self.last_index,
                };
                Some(Span::new(start, end))
            }
        }
    }
}

impl<'a, T: PrimInt + Debug> Iterator for SpanIter<'a, T> {
    type Item = Result<Span, InvalidTag>;
    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let Some((index, value)) = self.tags.next() else {
                return self.close_terminal().map(Ok);
            };
            self.last_index = index;
            let tag = match RationaleTag::try_from_int(*value, index) {
                Ok(tag) => tag,
                Err(e) => return Some(Err(e)),
            };
            match (self.state, tag) {
                (SpanState::Closed, RationaleTag::Inside) => self.state = SpanState::Open(index),
                (SpanState::Open(start), RationaleTag::Outside) => {
                    self.state = SpanState::Closed;
                    return Some(Ok(Span::new(start, index)));
                }
                (SpanState::Open(_), RationaleTag::Inside)
                | (SpanState::Closed, RationaleTag::Outside) => {}
            }
        }
    }
}

/// Ordered spans of a single sequence, as returned by `get_spans`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Spans(pub(crate) Vec<Span>);

impl Deref for Spans {
    type Target = [Span];
    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl From<Vec<Span>> for Spans {
    fn from(value: Vec<Span>) -> Self {
        Spans(value)
    }
}

impl From<Spans> for Vec<Span> {
    fn from(value: Spans) -> Self {
        value.0
    }
}

impl IntoIterator for Spans {
    type Item = Span;
    type IntoIter = std::vec::IntoIter<Span>;
    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

impl Display for Spans {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[")?;
        for (i, span) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}", span)?;
        }
        write!(f, "]")
    }
}

/// Extracts the spans of a trimmed tag sequence. Fails on the first tag that is neither `0` nor
/// `1`.
///
/// ```rust
/// use spaneval::{get_spans, Span, SpanBoundary};
///
/// let spans = get_spans(&[1, 1, 0, 0, 1, 1, 0], SpanBoundary::Exclusive).unwrap();
/// assert_eq!(&*spans, &[Span::new(0, 2), Span::new(4, 6)]);
/// ```
pub fn get_spans<T: PrimInt + Debug>(
    tags: &[T],
    boundary: SpanBoundary,
) -> Result<Spans, InvalidTag> {
    SpanIter::new(tags, boundary)
        .collect::<Result<Vec<_>, _>>()
        .map(Spans)
}
