//! Tracked insertions and deletions.
//!
//! Every edit isolates the affected text into whole runs first, then wraps
//! them in `w:del` or adds a fresh run in `w:ins`. Nothing is physically
//! removed, so each mark can be accepted or rejected on its own.

mod review;

pub use review::{accept, reject};

use chrono::{DateTime, Utc};
use log::debug;
use serde::Serialize;

use crate::clock::{Clock, format_timestamp};
use crate::ids::IdAllocator;
use crate::locator::{Fragment, Span, TextSpan};
use crate::package::Body;
use crate::wml;
use crate::xml::{Element, InsertionPoint, NodePath, XmlNode};

#[derive(Debug, thiserror::Error)]
pub enum RevisionError {
    #[error("Span is stale: {reason}")]
    StaleSpan { reason: String },
    #[error("No tracked change with id {id}")]
    UnknownRevision { id: u64 },
    #[error("Inserted text is empty")]
    EmptyInsertion,
}

fn stale(reason: impl Into<String>) -> RevisionError {
    RevisionError::StaleSpan {
        reason: reason.into(),
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Edit {
    Insert(String),
    Delete,
    Replace(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RevisionKind {
    Insertion,
    Deletion,
}

impl RevisionKind {
    fn element_name(self) -> &'static str {
        match self {
            RevisionKind::Insertion => wml::INS,
            RevisionKind::Deletion => wml::DEL,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RevisionMark {
    pub id: u64,
    pub author: String,
    pub timestamp: DateTime<Utc>,
    pub kind: RevisionKind,
}

impl RevisionMark {
    /// An empty `w:ins`/`w:del` carrying this mark.
    fn container(&self) -> Element {
        Element::new(self.kind.element_name())
            .with_attr(wml::ID, self.id.to_string())
            .with_attr(wml::AUTHOR, self.author.as_str())
            .with_attr(wml::DATE, format_timestamp(self.timestamp))
    }
}

/// Who is making an edit, and when.
#[derive(Clone, Copy)]
pub struct Attribution<'a> {
    pub author: &'a str,
    pub clock: &'a dyn Clock,
}

impl Attribution<'_> {
    fn mark(&self, id: u64, kind: RevisionKind) -> RevisionMark {
        RevisionMark {
            id,
            author: self.author.to_string(),
            timestamp: self.clock.now(),
            kind,
        }
    }
}

/// How an edit moved the visible text: `removed` was taken out and
/// `inserted_len` bytes now start at `removed.start`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TextChange {
    pub removed: Span,
    pub inserted_len: usize,
}

impl TextChange {
    /// The inserted text's span in the post-edit text.
    pub fn inserted(&self) -> Span {
        Span::new(self.removed.start, self.removed.start + self.inserted_len)
    }
}

#[derive(Debug, Clone)]
pub struct AppliedRevision {
    /// Marks in document order; deletions come before the insertion that
    /// replaces them.
    pub marks: Vec<RevisionMark>,
    pub change: TextChange,
}

/// Applies one edit at `span`, which must have been resolved against the
/// body's current generation.
///
/// `Insert` places its text at the span's start.
pub fn apply(
    body: &mut Body,
    span: &TextSpan,
    edit: &Edit,
    by: &Attribution<'_>,
    ids: &mut IdAllocator,
) -> Result<AppliedRevision, RevisionError> {
    if let Edit::Insert(text) | Edit::Replace(text) = edit
        && text.is_empty()
    {
        return Err(RevisionError::EmptyInsertion);
    }
    check_fresh(body, span)?;
    let root = body.root_mut();

    let applied = match edit {
        Edit::Delete => {
            let (marks, _) = delete(root, span, by, ids)?;
            AppliedRevision {
                marks,
                change: TextChange {
                    removed: span.span,
                    inserted_len: 0,
                },
            }
        }
        Edit::Insert(text) => {
            let (point, rpr) = point_at(root, span, ids)?;
            let point = lift_out_of_revisions(root, point, &span.paragraph_path, ids)?;
            let mark = insert(root, point, rpr.as_ref(), text, by, ids)?;
            AppliedRevision {
                marks: vec![mark],
                change: TextChange {
                    removed: Span::point(span.span.start),
                    inserted_len: text.len(),
                },
            }
        }
        Edit::Replace(text) => {
            let (mut marks, rpr) = delete(root, span, by, ids)?;
            let last = marks
                .last()
                .map(|mark| mark.id.to_string())
                .ok_or_else(|| stale("replacement matched no runs"))?;
            let deleted = root
                .find_path(|el| el.is(wml::DEL) && el.attr(wml::ID) == Some(last.as_str()))
                .ok_or_else(|| stale("deletion vanished before insertion"))?;
            let point = InsertionPoint::after(&deleted).ok_or_else(|| stale("deletion at root"))?;
            let point = lift_out_of_revisions(root, point, &span.paragraph_path, ids)?;
            marks.push(insert(root, point, rpr.as_ref(), text, by, ids)?);
            AppliedRevision {
                marks,
                change: TextChange {
                    removed: span.span,
                    inserted_len: text.len(),
                },
            }
        }
    };

    debug!(
        "Applied {:?} at {}..{} with ids {:?}",
        applied.marks.iter().map(|m| m.kind).collect::<Vec<_>>(),
        span.span.start,
        span.span.end,
        applied.marks.iter().map(|m| m.id).collect::<Vec<_>>()
    );
    Ok(applied)
}

fn check_fresh(body: &Body, span: &TextSpan) -> Result<(), RevisionError> {
    if span.generation != body.generation() {
        return Err(stale(format!(
            "resolved at generation {}, body is at {}",
            span.generation,
            body.generation()
        )));
    }
    for fragment in &span.fragments {
        let run = body
            .root()
            .get(&fragment.run)
            .filter(|el| el.is(wml::R))
            .ok_or_else(|| stale(format!("no run at {:?}", fragment.run.indices())))?;
        let len = wml::run_text(run).len();
        if len != fragment.run_len {
            return Err(stale(format!(
                "run at {:?} has {len} bytes of text, expected {}",
                fragment.run.indices(),
                fragment.run_len
            )));
        }
    }
    if !span.span.is_empty() && span.fragments.is_empty() {
        return Err(stale("span covers no runs"));
    }
    Ok(())
}

/// Splits the boundary runs so every fragment covers a whole run, and
/// returns the covered runs' paths.
fn isolate(
    root: &mut Element,
    fragments: &[Fragment],
    ids: &mut IdAllocator,
) -> Result<Vec<NodePath>, RevisionError> {
    let mut covered: Vec<NodePath> = fragments.iter().map(|f| f.run.clone()).collect();

    // Tail first: splitting the last run leaves earlier paths untouched.
    if let Some(last) = fragments.last()
        && last.end < last.run_len
        && !wml::split_run_in_place(root, &last.run, last.end, ids)
    {
        return Err(stale("cannot split the last run"));
    }
    if let Some(first) = fragments.first()
        && first.start > 0
    {
        if !wml::split_run_in_place(root, &first.run, first.start, ids) {
            return Err(stale("cannot split the first run"));
        }
        let added = InsertionPoint::after(&first.run).ok_or_else(|| stale("run at root"))?;
        for path in covered.iter_mut().skip(1) {
            *path = path.shifted_by_insert(&added);
        }
        if let Some(head) = covered.first_mut() {
            *head = added.parent.child(added.index);
        }
    }
    Ok(covered)
}

/// Consecutive covered runs under one parent with no other runs between
/// them.
struct SiblingGroup {
    parent: NodePath,
    first: usize,
    last: usize,
}

fn group_siblings(root: &Element, covered: &[NodePath]) -> Vec<SiblingGroup> {
    let mut groups: Vec<SiblingGroup> = Vec::new();
    for path in covered {
        let (Some(parent), Some(index)) = (path.parent(), path.last()) else {
            continue;
        };
        if let Some(group) = groups.last_mut()
            && group.parent == parent
            && run_free_between(root, &parent, group.last, index)
        {
            group.last = index;
            continue;
        }
        groups.push(SiblingGroup {
            parent,
            first: index,
            last: index,
        });
    }
    groups
}

fn run_free_between(root: &Element, parent: &NodePath, from: usize, to: usize) -> bool {
    root.get(parent)
        .and_then(|el| el.children.get(from + 1..to))
        .is_some_and(|between| {
            between
                .iter()
                .all(|node| node.as_element().is_none_or(|el| !el.contains(wml::R)))
        })
}

/// Wraps the span's runs in `w:del`, one container per sibling group.
/// Also returns the formatting of the first deleted run.
fn delete(
    root: &mut Element,
    span: &TextSpan,
    by: &Attribution<'_>,
    ids: &mut IdAllocator,
) -> Result<(Vec<RevisionMark>, Option<Element>), RevisionError> {
    let covered = isolate(root, &span.fragments, ids)?;
    let rpr = covered
        .first()
        .and_then(|path| root.get(path))
        .and_then(wml::inherited_rpr);
    let groups = group_siblings(root, &covered);
    let marks: Vec<RevisionMark> = groups
        .iter()
        .map(|_| by.mark(ids.allocate(), RevisionKind::Deletion))
        .collect();

    // Last group first so earlier groups keep their indices.
    for (group, mark) in groups.iter().zip(&marks).rev() {
        let parent = root
            .get_mut(&group.parent)
            .ok_or_else(|| stale("deleted run's parent vanished"))?;
        let mut container = mark.container();
        container.children = parent.children.drain(group.first..=group.last).collect();
        for node in &mut container.children {
            if let XmlNode::Element(el) = node {
                wml::mark_deleted(el);
            }
        }
        parent.children.insert(group.first, XmlNode::Element(container));
    }
    Ok((marks, rpr))
}

/// Where text inserted at the span's start goes, and the formatting it
/// borrows from the neighbouring run.
fn point_at(
    root: &mut Element,
    span: &TextSpan,
    ids: &mut IdAllocator,
) -> Result<(InsertionPoint, Option<Element>), RevisionError> {
    let Some(fragment) = span.fragments.first() else {
        let paragraph = root
            .get(&span.paragraph_path)
            .ok_or_else(|| stale("paragraph vanished"))?;
        let end = InsertionPoint::new(span.paragraph_path.clone(), paragraph.children.len());
        return Ok((end, None));
    };
    let rpr = root.get(&fragment.run).and_then(wml::inherited_rpr);
    let point = if fragment.start == 0 {
        InsertionPoint::before(&fragment.run)
    } else if fragment.start >= fragment.run_len {
        InsertionPoint::after(&fragment.run)
    } else {
        if !wml::split_run_in_place(root, &fragment.run, fragment.start, ids) {
            return Err(stale("cannot split the run at the insertion point"));
        }
        InsertionPoint::after(&fragment.run)
    };
    Ok((point.ok_or_else(|| stale("run at root"))?, rpr))
}

/// Moves an insertion point out of any `w:ins`/`w:del`/move container so
/// the new `w:ins` is never nested. A container the point falls inside of
/// is split in two, the tail half taking a fresh id.
fn lift_out_of_revisions(
    root: &mut Element,
    mut point: InsertionPoint,
    paragraph: &NodePath,
    ids: &mut IdAllocator,
) -> Result<InsertionPoint, RevisionError> {
    while has_tracked_ancestor(root, &point.parent, paragraph) {
        let container_path = point.parent.clone();
        let (Some(outer), Some(index)) = (container_path.parent(), container_path.last()) else {
            return Err(stale("revision container at root"));
        };
        let container = root
            .get_mut(&container_path)
            .ok_or_else(|| stale("revision container vanished"))?;

        if point.index > 0 && point.index < container.children.len() {
            let mut tail = Element {
                name: container.name.clone(),
                attributes: container.attributes.clone(),
                children: container.children.drain(point.index..).collect(),
            };
            if tail.attr(wml::ID).is_some() {
                tail.set_attr(wml::ID, ids.allocate().to_string());
            }
            let parent = root
                .get_mut(&outer)
                .ok_or_else(|| stale("revision container's parent vanished"))?;
            parent.children.insert(index + 1, XmlNode::Element(tail));
        }
        point = if point.index == 0 {
            InsertionPoint::new(outer, index)
        } else {
            InsertionPoint::new(outer, index + 1)
        };
    }
    Ok(point)
}

/// True if `path` or any ancestor below `paragraph` is a revision container.
fn has_tracked_ancestor(root: &Element, path: &NodePath, paragraph: &NodePath) -> bool {
    let indices = path.indices();
    let depth = paragraph.indices().len();
    (depth + 1..=indices.len()).any(|len| {
        root.get(&NodePath::from(indices[..len].to_vec()))
            .is_some_and(wml::is_tracked_container)
    })
}

fn insert(
    root: &mut Element,
    point: InsertionPoint,
    rpr: Option<&Element>,
    text: &str,
    by: &Attribution<'_>,
    ids: &mut IdAllocator,
) -> Result<RevisionMark, RevisionError> {
    let mark = by.mark(ids.allocate(), RevisionKind::Insertion);
    let container = mark
        .container()
        .with_child(wml::text_run(rpr, text));
    let parent = root
        .get_mut(&point.parent)
        .ok_or_else(|| stale("insertion parent vanished"))?;
    let index = point.index.min(parent.children.len());
    parent.children.insert(index, XmlNode::Element(container));
    Ok(mark)
}
