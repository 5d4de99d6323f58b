pub mod anchors;
pub mod clock;
pub mod comments;
pub mod engine;
pub mod extract;
pub mod ids;
pub mod instruction;
pub mod locator;
pub mod package;
pub mod revision;
pub mod wml;
pub mod xml;

#[cfg(test)]
#[path = "../tests/common/mod.rs"]
pub(crate) mod test_support;

// Re-export key types for easier usage
pub use clock::{Clock, FixedClock, SystemClock};
pub use comments::{CommentDraft, CommentError, CommentThread};
pub use engine::{
    ApplyReport, DEFAULT_AUTHOR, EngineError, EngineOptions, InstructionOutcome, OutcomeStatus,
    RevisedDocument, RevisionEngine,
};
pub use extract::{ParagraphText, extract_paragraphs, render_listing};
pub use ids::IdAllocator;
pub use instruction::{Action, EditInstruction, InstructionError, instructions_from_json};
pub use locator::{LocateError, Span, TextLocator, TextSpan, locate};
pub use package::{DocumentPackage, PackageError};
pub use revision::{Edit, RevisionError, RevisionKind, RevisionMark};
