//! Exact-text search over a document body.

mod index;
mod span;

pub use index::{IndexedParagraph, IndexedRun, TextIndex};
pub use span::{Fragment, Span, TextSpan};

use crate::package::Body;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LocateError {
    #[error("Text not found: {query:?}")]
    SpanNotFound { query: String },
    #[error("Text is ambiguous: {query:?} occurs {occurrences} times")]
    AmbiguousSpan { query: String, occurrences: usize },
    #[error("Search text is empty")]
    EmptyQuery,
    #[error("Text crosses a paragraph boundary: {text:?}")]
    CrossesParagraph { text: String },
    #[error("Offset {offset} is outside the document text")]
    OutOfRange { offset: usize },
}

/// Resolves text against a body, keeping the flattened-text index until the
/// body is mutated.
#[derive(Debug, Default)]
pub struct TextLocator {
    cache: Option<(u64, TextIndex)>,
}

impl TextLocator {
    pub fn new() -> Self {
        Self::default()
    }

    /// The index for the body's current generation, rebuilt if stale.
    pub fn index(&mut self, body: &Body) -> &TextIndex {
        let generation = body.generation();
        if self.cache.as_ref().is_some_and(|(built, _)| *built != generation) {
            self.cache = None;
        }
        &self
            .cache
            .get_or_insert_with(|| {
                log::trace!("Indexing body text at generation {generation}");
                (generation, TextIndex::build(body.root()))
            })
            .1
    }

    /// Finds the single occurrence of `query`.
    ///
    /// Matching is exact: case-sensitive, whitespace-literal, with tabs and
    /// line breaks written as `'\t'` and `'\u{b}'`.
    pub fn locate(&mut self, body: &Body, query: &str) -> Result<TextSpan, LocateError> {
        if query.is_empty() {
            return Err(LocateError::EmptyQuery);
        }
        let generation = body.generation();
        let index = self.index(body);
        match index.occurrences(query).as_slice() {
            [] => Err(LocateError::SpanNotFound {
                query: query.to_string(),
            }),
            [start] => index.resolve(Span::new(*start, start + query.len()), generation),
            many => Err(LocateError::AmbiguousSpan {
                query: query.to_string(),
                occurrences: many.len(),
            }),
        }
    }

    /// Resolves an already-known span, such as a collapsed insertion point.
    pub fn resolve(&mut self, body: &Body, span: Span) -> Result<TextSpan, LocateError> {
        let generation = body.generation();
        self.index(body).resolve(span, generation)
    }
}

/// One-shot [`TextLocator::locate`].
pub fn locate(body: &Body, query: &str) -> Result<TextSpan, LocateError> {
    TextLocator::new().locate(body, query)
}
