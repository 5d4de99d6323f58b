use crate::xml::NodePath;

/// A byte range `[start, end)` into the flattened document text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, serde::Serialize)]
pub struct Span {
    /// Inclusive start byte offset.
    pub start: usize,
    /// Exclusive end byte offset.
    pub end: usize,
}

impl Span {
    pub fn new(start: usize, end: usize) -> Self {
        Self { start, end }
    }

    /// A collapsed span marking a position between characters.
    pub fn point(at: usize) -> Self {
        Self { start: at, end: at }
    }

    /// Returns the length in bytes. Uses saturating subtraction for safety.
    #[must_use]
    pub fn len(self) -> usize {
        self.end.saturating_sub(self.start)
    }

    /// Returns true if the span is empty (start >= end).
    #[must_use]
    pub fn is_empty(self) -> bool {
        self.len() == 0
    }

    #[must_use]
    pub fn contains(self, other: Span) -> bool {
        self.start <= other.start && other.end <= self.end
    }

    #[must_use]
    pub fn overlaps(self, other: Span) -> bool {
        self.start < other.end && other.start < self.end
    }
}

/// The part of one run covered by a span, in bytes of that run's text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fragment {
    pub run: NodePath,
    /// Length of the run's visible text when the span was resolved.
    pub run_len: usize,
    pub start: usize,
    pub end: usize,
}

impl Fragment {
    pub fn covers_whole_run(&self) -> bool {
        self.start == 0 && self.end == self.run_len
    }
}

/// A resolved location in the body.
///
/// Only valid for the body generation it was resolved against. For a
/// collapsed span the single fragment, if any, is the run the position
/// touches: the run ending at or containing it, otherwise the run that
/// follows it at a paragraph start.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextSpan {
    pub span: Span,
    /// Ordinal of the containing paragraph in document order.
    pub paragraph: usize,
    pub paragraph_path: NodePath,
    pub fragments: Vec<Fragment>,
    pub generation: u64,
}
