//! Anchoring comments to body text.
//!
//! All ranges of one request go in together: the planner orders their
//! markers so overlapping ranges nest, boundary runs are split so every
//! marker falls between runs, and the markers are spliced in back to front.

mod planner;
mod store;

pub use planner::{
    CommentRangeStack, MarkerKind, MarkerOp, Placement, check_nesting, plan_markers,
};
pub use store::{CommentThread, append, comment_ids};

use log::debug;

use crate::ids::IdAllocator;
use crate::locator::{Span, TextIndex, TextSpan};
use crate::package::{Body, Part};
use crate::revision::Attribution;
use crate::wml;
use crate::xml::{Element, InsertionPoint, NodePath, XmlNode};

#[derive(Debug, thiserror::Error)]
pub enum CommentError {
    #[error("Comment ranges do not nest: {reason}")]
    OverlapIntegrity { reason: String },
    #[error("Comment anchor is stale: {reason}")]
    StaleSpan { reason: String },
    #[error("Got {anchors} comment anchors for {drafts} comment bodies")]
    CountMismatch { anchors: usize, drafts: usize },
}

fn stale(reason: impl Into<String>) -> CommentError {
    CommentError::StaleSpan {
        reason: reason.into(),
    }
}

/// Text of a comment still to be anchored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommentDraft {
    pub category: String,
    /// Written ahead of the first paragraph, e.g. `[SEO]`.
    pub marker: String,
    pub paragraphs: Vec<String>,
}

impl CommentDraft {
    /// A one-paragraph comment marked with its bracketed category.
    pub fn new(category: impl Into<String>, text: impl Into<String>) -> Self {
        let category = category.into();
        Self {
            marker: format!("[{category}]"),
            category,
            paragraphs: vec![text.into()],
        }
    }

    pub fn with_marker(mut self, marker: impl Into<String>) -> Self {
        self.marker = marker.into();
        self
    }

    fn body(&self) -> Vec<String> {
        let mut body = self.paragraphs.clone();
        match body.first_mut() {
            Some(first) if !self.marker.is_empty() => {
                *first = format!("{} {first}", self.marker).trim_end().to_string();
            }
            None => body.push(self.marker.clone()),
            Some(_) => {}
        }
        body
    }
}

/// Anchors `drafts[i]` on `anchors[i]` and appends the comments to `store`.
///
/// Every anchor must have been resolved against the body's current
/// generation. Comment ids are allocated in draft order.
pub fn apply(
    body: &mut Body,
    store: &mut Part,
    anchors: &[TextSpan],
    drafts: &[CommentDraft],
    by: &Attribution<'_>,
    ids: &mut IdAllocator,
) -> Result<Vec<CommentThread>, CommentError> {
    if anchors.len() != drafts.len() {
        return Err(CommentError::CountMismatch {
            anchors: anchors.len(),
            drafts: drafts.len(),
        });
    }
    if anchors.is_empty() {
        return Ok(Vec::new());
    }
    if let Some(anchor) = anchors
        .iter()
        .find(|anchor| anchor.generation != body.generation())
    {
        return Err(stale(format!(
            "resolved at generation {}, body is at {}",
            anchor.generation,
            body.generation()
        )));
    }

    let spans: Vec<Span> = anchors.iter().map(|anchor| anchor.span).collect();
    let ops = plan_markers(&spans);
    check_nesting(&ops)?;

    let splits = split_points(&TextIndex::build(body.root()), anchors, &ops);
    let root = body.root_mut();
    for (run, at) in splits {
        if !wml::split_run_in_place(root, &run, at, ids) {
            return Err(stale(format!("no run to split at {:?}", run.indices())));
        }
    }

    let index = TextIndex::build(root);
    let points = ops
        .iter()
        .map(|op| marker_point(root, &index, anchors[op.range].paragraph, op))
        .collect::<Result<Vec<_>, _>>()?;
    if let Some(pair) = points.windows(2).find(|pair| pair[1] < pair[0]) {
        return Err(CommentError::OverlapIntegrity {
            reason: format!("marker at {:?} precedes marker at {:?}", pair[1], pair[0]),
        });
    }

    let threads: Vec<CommentThread> = drafts
        .iter()
        .map(|draft| CommentThread {
            id: ids.allocate(),
            author: by.author.to_string(),
            timestamp: by.clock.now(),
            category: draft.category.clone(),
            body: draft.body(),
        })
        .collect();

    // Markers landing in the same gap keep their planned order.
    let mut groups: Vec<(InsertionPoint, Vec<XmlNode>)> = Vec::new();
    for (op, point) in ops.iter().zip(points) {
        let nodes = marker_nodes(op.kind, threads[op.range].id);
        match groups.last_mut() {
            Some((at, pending)) if *at == point => pending.extend(nodes),
            _ => groups.push((point, nodes)),
        }
    }
    for (point, nodes) in groups.into_iter().rev() {
        let parent = root
            .get_mut(&point.parent)
            .ok_or_else(|| stale("marker parent vanished"))?;
        let at = point.index.min(parent.children.len());
        parent.children.splice(at..at, nodes);
    }

    let store_root = store.root_mut();
    for thread in &threads {
        append(store_root, thread);
    }
    debug!(
        "Anchored comments {:?}",
        threads.iter().map(|t| t.id).collect::<Vec<_>>()
    );
    Ok(threads)
}

/// Run splits needed so no marker offset falls inside a run, ordered so
/// each split leaves the remaining paths valid.
fn split_points(index: &TextIndex, anchors: &[TextSpan], ops: &[MarkerOp]) -> Vec<(NodePath, usize)> {
    let mut splits: Vec<(NodePath, usize)> = ops
        .iter()
        .filter_map(|op| {
            index
                .paragraph_runs(anchors[op.range].paragraph)
                .iter()
                .find(|run| run.span.start < op.offset && op.offset < run.span.end)
                .map(|run| (run.path.clone(), op.offset - run.span.start))
        })
        .collect();
    splits.sort();
    splits.dedup();
    splits.reverse();
    splits
}

fn marker_point(
    root: &Element,
    index: &TextIndex,
    paragraph: usize,
    op: &MarkerOp,
) -> Result<InsertionPoint, CommentError> {
    let runs = index.paragraph_runs(paragraph);
    let preceding = match op.placement {
        Placement::AfterPreceding => runs
            .iter()
            .rev()
            .find(|run| run.span.end == op.offset && !run.span.is_empty()),
        Placement::BeforeFollowing => None,
    };
    let point = match preceding {
        Some(run) => InsertionPoint::after(&run.path),
        None => match runs.iter().find(|run| run.span.start >= op.offset) {
            Some(run) => InsertionPoint::before(&run.path),
            None => {
                let path = &index
                    .paragraphs()
                    .get(paragraph)
                    .ok_or_else(|| stale(format!("no paragraph {paragraph}")))?
                    .path;
                let len = root
                    .get(path)
                    .map(|p| p.children.len())
                    .ok_or_else(|| stale("paragraph vanished"))?;
                Some(InsertionPoint::new(path.clone(), len))
            }
        },
    };
    point.ok_or_else(|| stale("run at document root"))
}

fn marker_nodes(kind: MarkerKind, id: u64) -> Vec<XmlNode> {
    let id = id.to_string();
    match kind {
        MarkerKind::Start => vec![XmlNode::Element(
            Element::new(wml::COMMENT_RANGE_START).with_attr(wml::ID, id),
        )],
        MarkerKind::End => vec![
            XmlNode::Element(Element::new(wml::COMMENT_RANGE_END).with_attr(wml::ID, id.as_str())),
            XmlNode::Element(
                Element::new(wml::R)
                    .with_child(Element::new(wml::COMMENT_REFERENCE).with_attr(wml::ID, id)),
            ),
        ],
    }
}
