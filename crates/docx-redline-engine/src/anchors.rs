//! Offsets that stay meaningful while the body is edited.
//!
//! Comment anchors are located when their instruction is processed but
//! applied only after every revision, so each tracked span is moved through
//! the text changes made in between.

use crate::locator::Span;
use crate::revision::TextChange;

/// Maps `span` through one change of the visible text.
///
/// A start inside the removed text moves to where it was removed; an end
/// inside it moves to the end of the replacement.
pub fn transform(span: Span, change: &TextChange) -> Span {
    let removed = change.removed;
    let inserted = change.inserted_len;
    let shift = |offset: usize| offset - removed.len() + inserted;

    let start = if span.start < removed.start {
        span.start
    } else if span.start < removed.end {
        removed.start
    } else {
        shift(span.start)
    };
    let end = if span.end <= removed.start {
        span.end
    } else if span.end < removed.end {
        removed.start + inserted
    } else {
        shift(span.end)
    };
    Span::new(start, end.max(start))
}

/// Handle to a span tracked by an [`AnchorSet`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AnchorId(usize);

#[derive(Debug, Default)]
pub struct AnchorSet {
    spans: Vec<Span>,
}

impl AnchorSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn track(&mut self, span: Span) -> AnchorId {
        self.spans.push(span);
        AnchorId(self.spans.len() - 1)
    }

    pub fn get(&self, id: AnchorId) -> Option<Span> {
        self.spans.get(id.0).copied()
    }

    pub fn apply(&mut self, change: &TextChange) {
        for span in &mut self.spans {
            *span = transform(*span, change);
        }
    }

    pub fn len(&self) -> usize {
        self.spans.len()
    }

    pub fn is_empty(&self) -> bool {
        self.spans.is_empty()
    }
}
