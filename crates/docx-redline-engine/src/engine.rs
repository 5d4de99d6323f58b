//! The end-to-end pipeline: open the package, apply every instruction in
//! order, anchor the collected comments, save.

use std::collections::BTreeMap;

use log::{debug, info, warn};
use serde::Serialize;

use crate::anchors::{AnchorId, AnchorSet};
use crate::clock::{Clock, SystemClock};
use crate::comments::{self, CommentDraft, CommentError};
use crate::ids::IdAllocator;
use crate::instruction::{Action, EditInstruction, InstructionError, ValidInstruction};
use crate::locator::{LocateError, Span, TextLocator, TextSpan};
use crate::package::{Body, DocumentPackage, PackageError};
use crate::revision::{self, Attribution, Edit, RevisionError};

pub const DEFAULT_AUTHOR: &str = "Agente IA Revisor";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineOptions {
    /// Author recorded on every revision and comment.
    pub author: String,
    /// Comment each applied revision with its rationale.
    pub annotate_revisions: bool,
    /// Turn a later edit of already-edited text into a comment.
    pub demote_conflicts: bool,
    /// Switch on change tracking in the settings part once a revision is
    /// applied.
    pub track_revisions: bool,
    /// Presentation marker per category; unlisted categories get
    /// `[CATEGORY]`.
    pub category_markers: BTreeMap<String, String>,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            author: DEFAULT_AUTHOR.to_string(),
            annotate_revisions: true,
            demote_conflicts: true,
            track_revisions: true,
            category_markers: BTreeMap::new(),
        }
    }
}

impl EngineOptions {
    fn marker(&self, category: &str) -> String {
        self.category_markers
            .get(category)
            .cloned()
            .unwrap_or_else(|| format!("[{category}]"))
    }
}

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error(transparent)]
    Package(#[from] PackageError),
    #[error("Revision failed: {0}")]
    Revision(#[from] RevisionError),
    #[error("Comment anchoring failed: {0}")]
    Comment(#[from] CommentError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OutcomeStatus {
    Applied,
    Demoted,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InstructionOutcome {
    pub index: usize,
    pub category: String,
    pub action: String,
    pub status: OutcomeStatus,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub revision_ids: Vec<u64>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub comment_ids: Vec<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl InstructionOutcome {
    fn new(index: usize, instruction: &EditInstruction) -> Self {
        let action = instruction
            .action
            .parse::<Action>()
            .map_or_else(|_| instruction.action.clone(), |action| action.to_string());
        Self {
            index,
            category: instruction.category().to_string(),
            action,
            status: OutcomeStatus::Failed,
            revision_ids: Vec::new(),
            comment_ids: Vec::new(),
            reason: None,
        }
    }

    /// Records that this instruction's comment could not be anchored. An
    /// instruction that consisted only of that comment has failed.
    fn drop_comment(&mut self, err: &LocateError) {
        if self.revision_ids.is_empty() && self.status == OutcomeStatus::Applied {
            self.status = OutcomeStatus::Failed;
            self.reason = Some(err.to_string());
        } else {
            self.reason = Some(format!("Comment not anchored: {err}"));
        }
    }
}

/// What happened to each instruction, in order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ApplyReport {
    pub total: usize,
    pub applied: usize,
    pub demoted: usize,
    pub failed: usize,
    pub comments: usize,
    pub outcomes: Vec<InstructionOutcome>,
}

impl ApplyReport {
    fn new(outcomes: Vec<InstructionOutcome>, comments: usize) -> Self {
        let count = |status| outcomes.iter().filter(|o| o.status == status).count();
        Self {
            total: outcomes.len(),
            applied: count(OutcomeStatus::Applied),
            demoted: count(OutcomeStatus::Demoted),
            failed: count(OutcomeStatus::Failed),
            comments,
            outcomes,
        }
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}

#[derive(Debug, Clone)]
pub struct RevisedDocument {
    pub bytes: Vec<u8>,
    pub report: ApplyReport,
}

/// Applies edit instructions to word-processing packages as tracked
/// changes and comments.
///
/// Holds no per-document state; one engine can serve concurrent callers.
pub struct RevisionEngine {
    options: EngineOptions,
    clock: Box<dyn Clock + Send + Sync>,
}

impl RevisionEngine {
    pub fn new(options: EngineOptions) -> Self {
        Self {
            options,
            clock: Box::new(SystemClock),
        }
    }

    pub fn with_clock(mut self, clock: impl Clock + Send + Sync + 'static) -> Self {
        self.clock = Box::new(clock);
        self
    }

    pub fn options(&self) -> &EngineOptions {
        &self.options
    }

    pub fn apply(
        &self,
        bytes: &[u8],
        instructions: &[EditInstruction],
    ) -> Result<RevisedDocument, EngineError> {
        let mut package = DocumentPackage::open(bytes)?;
        let report = self.apply_to_package(&mut package, instructions)?;
        Ok(RevisedDocument {
            bytes: package.save()?,
            report,
        })
    }

    /// Applies `instructions` in order. Per-instruction failures are
    /// recorded in the report; only package-level and internal sequencing
    /// errors abort.
    pub fn apply_to_package(
        &self,
        package: &mut DocumentPackage,
        instructions: &[EditInstruction],
    ) -> Result<ApplyReport, EngineError> {
        let mut session = Session {
            options: &self.options,
            by: Attribution {
                author: &self.options.author,
                clock: &*self.clock,
            },
            ids: IdAllocator::for_package(package),
            locator: TextLocator::new(),
            anchors: AnchorSet::new(),
            pending: Vec::new(),
            consumed: Vec::new(),
            revisions: 0,
        };

        let mut outcomes = Vec::with_capacity(instructions.len());
        for (index, instruction) in instructions.iter().enumerate() {
            let mut outcome = InstructionOutcome::new(index, instruction);
            let step = instruction
                .validate()
                .map_err(StepError::from)
                .and_then(|valid| session.step(package.body_mut(), index, &valid));
            match step {
                Ok(Step::Applied(revision_ids)) => {
                    outcome.status = OutcomeStatus::Applied;
                    outcome.revision_ids = revision_ids;
                }
                Ok(Step::Demoted) => outcome.status = OutcomeStatus::Demoted,
                Err(StepError::Fatal(err)) => return Err(err),
                Err(err) => {
                    warn!("Instruction {index} ({}) failed: {err}", outcome.action);
                    outcome.reason = Some(err.to_string());
                }
            }
            debug!("Instruction {index}: {:?}", outcome.status);
            outcomes.push(outcome);
        }

        let comments = session.anchor_comments(package, &mut outcomes)?;
        if self.options.track_revisions && session.revisions > 0 && package.enable_track_revisions() {
            debug!("Enabled revision tracking in settings");
        }

        let report = ApplyReport::new(outcomes, comments);
        info!(
            "Applied {}/{} instructions ({} demoted, {} failed), {} comments",
            report.applied, report.total, report.demoted, report.failed, report.comments
        );
        Ok(report)
    }
}

enum Step {
    Applied(Vec<u64>),
    Demoted,
}

#[derive(Debug, thiserror::Error)]
enum StepError {
    #[error(transparent)]
    Instruction(#[from] InstructionError),
    #[error(transparent)]
    Locate(#[from] LocateError),
    #[error(transparent)]
    Fatal(#[from] EngineError),
}

impl From<RevisionError> for StepError {
    fn from(err: RevisionError) -> Self {
        StepError::Fatal(err.into())
    }
}

struct PendingComment {
    anchor: AnchorId,
    draft: CommentDraft,
    outcome: usize,
}

/// State for one `apply_to_package` call.
struct Session<'a> {
    options: &'a EngineOptions,
    by: Attribution<'a>,
    ids: IdAllocator,
    locator: TextLocator,
    anchors: AnchorSet,
    pending: Vec<PendingComment>,
    /// Original text of applied replacements and deletions, with the
    /// anchor of the edit that consumed it.
    consumed: Vec<(String, AnchorId)>,
    revisions: usize,
}

impl Session<'_> {
    fn step(
        &mut self,
        body: &mut Body,
        index: usize,
        valid: &ValidInstruction<'_>,
    ) -> Result<Step, StepError> {
        if self.options.demote_conflicts
            && valid.action != Action::Insert
            && let Some(original) = valid.original_text
            && let Some(earlier) = self.earlier_edit(original)
        {
            debug!("Instruction {index} targets text already edited; anchoring on that edit");
            return Ok(match valid.action {
                Action::Comment => {
                    self.defer(earlier, valid.category, valid.rationale.to_string(), index);
                    Step::Applied(Vec::new())
                }
                _ => {
                    self.defer(earlier, valid.category, conflict_note(valid), index);
                    Step::Demoted
                }
            });
        }

        let (edit, target) = match (valid.action, valid.original_text, valid.new_text) {
            (Action::Comment, Some(original), _) => {
                let span = self.locator.locate(body, original)?;
                let anchor = self.anchors.track(span.span);
                self.defer(anchor, valid.category, valid.rationale.to_string(), index);
                return Ok(Step::Applied(Vec::new()));
            }
            (Action::Delete, Some(original), _) => {
                (Edit::Delete, self.locator.locate(body, original)?)
            }
            (Action::Replace, Some(original), Some(new)) => (
                Edit::Replace(new.to_string()),
                self.locator.locate(body, original)?,
            ),
            (Action::Insert, after, Some(new)) => {
                (Edit::Insert(new.to_string()), self.insertion_point(body, after)?)
            }
            (action, _, _) => {
                return Err(InstructionError::MissingField {
                    action,
                    field: "texto_original",
                }
                .into());
            }
        };

        let applied = revision::apply(body, &target, &edit, &self.by, &mut self.ids)?;
        self.anchors.apply(&applied.change);
        self.revisions += applied.marks.len();

        let edited = match valid.action {
            Action::Delete => Span::point(applied.change.removed.start),
            _ => applied.change.inserted(),
        };
        let anchor = self.anchors.track(edited);
        if valid.action != Action::Insert
            && let Some(original) = valid.original_text
        {
            self.consumed.push((original.to_string(), anchor));
        }
        if self.options.annotate_revisions && !valid.rationale.is_empty() {
            let note = match valid.action {
                Action::Delete => format!("Removed: {}", valid.rationale),
                Action::Insert => format!("Inserted: {}", valid.rationale),
                _ => valid.rationale.to_string(),
            };
            self.defer(anchor, valid.category, note, index);
        }
        Ok(Step::Applied(applied.marks.iter().map(|mark| mark.id).collect()))
    }

    /// Where new text goes: right after `after`, or at the start of the body.
    fn insertion_point(&mut self, body: &Body, after: Option<&str>) -> Result<TextSpan, LocateError> {
        let at = match after {
            Some(text) => self.locator.locate(body, text)?.span.end,
            None => 0,
        };
        self.locator.resolve(body, Span::point(at))
    }

    fn earlier_edit(&self, original: &str) -> Option<AnchorId> {
        self.consumed
            .iter()
            .find(|(text, _)| text == original)
            .map(|(_, anchor)| *anchor)
    }

    fn defer(&mut self, anchor: AnchorId, category: &str, text: String, outcome: usize) {
        let draft = CommentDraft::new(category, text).with_marker(self.options.marker(category));
        self.pending.push(PendingComment {
            anchor,
            draft,
            outcome,
        });
    }

    /// Resolves every deferred comment against the final body and anchors
    /// them in one pass. Returns the number of comments written.
    fn anchor_comments(
        &mut self,
        package: &mut DocumentPackage,
        outcomes: &mut [InstructionOutcome],
    ) -> Result<usize, EngineError> {
        let mut spans = Vec::new();
        let mut drafts = Vec::new();
        let mut owners = Vec::new();
        for pending in std::mem::take(&mut self.pending) {
            let Some(span) = self.anchors.get(pending.anchor) else {
                continue;
            };
            match self.locator.resolve(package.body(), span) {
                Ok(resolved) => {
                    spans.push(resolved);
                    drafts.push(pending.draft);
                    owners.push(pending.outcome);
                }
                Err(err) => {
                    warn!("Dropping comment for instruction {}: {err}", pending.outcome);
                    if let Some(outcome) = outcomes.get_mut(pending.outcome) {
                        outcome.drop_comment(&err);
                    }
                }
            }
        }
        if drafts.is_empty() {
            return Ok(0);
        }

        let (body, store) = package.body_and_comments_mut();
        let threads = comments::apply(body, store, &spans, &drafts, &self.by, &mut self.ids)?;
        for (thread, owner) in threads.iter().zip(owners) {
            if let Some(outcome) = outcomes.get_mut(owner) {
                outcome.comment_ids.push(thread.id);
            }
        }
        Ok(threads.len())
    }
}

fn conflict_note(valid: &ValidInstruction<'_>) -> String {
    let mut note = format!("Conflicting revision ({}):", valid.action);
    if let Some(suggestion) = valid.new_text {
        note.push_str(&format!(" Suggestion: {suggestion}."));
    }
    note.push_str(&format!(" Reason: {}", valid.rationale));
    note
}
