//! WordprocessingML vocabulary and run-level helpers.
//!
//! Names carry the `w:` prefix because the main document part is required to
//! have a `w:document` root; the same prefix is declared on every part this
//! crate creates.

use crate::ids::IdAllocator;
use crate::xml::{Element, NodePath, XmlNode};

pub const W_NS: &str = "http://schemas.openxmlformats.org/wordprocessingml/2006/main";
pub const R_NS: &str = "http://schemas.openxmlformats.org/officeDocument/2006/relationships";

pub const DOCUMENT: &str = "w:document";
pub const BODY: &str = "w:body";
pub const P: &str = "w:p";
pub const PPR: &str = "w:pPr";
pub const PSTYLE: &str = "w:pStyle";
pub const R: &str = "w:r";
pub const RPR: &str = "w:rPr";
pub const T: &str = "w:t";
pub const DEL_TEXT: &str = "w:delText";
pub const INSTR_TEXT: &str = "w:instrText";
pub const DEL_INSTR_TEXT: &str = "w:delInstrText";
pub const TAB: &str = "w:tab";
pub const BR: &str = "w:br";
pub const CR: &str = "w:cr";
pub const INS: &str = "w:ins";
pub const DEL: &str = "w:del";
pub const MOVE_FROM: &str = "w:moveFrom";
pub const MOVE_TO: &str = "w:moveTo";
pub const SECT_PR: &str = "w:sectPr";
pub const COMMENTS: &str = "w:comments";
pub const COMMENT: &str = "w:comment";
pub const COMMENT_RANGE_START: &str = "w:commentRangeStart";
pub const COMMENT_RANGE_END: &str = "w:commentRangeEnd";
pub const COMMENT_REFERENCE: &str = "w:commentReference";
pub const ANNOTATION_REF: &str = "w:annotationRef";
pub const SETTINGS: &str = "w:settings";
pub const TRACK_REVISIONS: &str = "w:trackRevisions";

pub const ID: &str = "w:id";
pub const AUTHOR: &str = "w:author";
pub const DATE: &str = "w:date";
pub const INITIALS: &str = "w:initials";
pub const VAL: &str = "w:val";
pub const XML_SPACE: &str = "xml:space";

/// Flattened-text marker for a paragraph end.
pub const PARAGRAPH_MARK: char = '\n';
/// Flattened-text marker for `w:br` and `w:cr`.
pub const LINE_BREAK: char = '\u{b}';

/// Revision containers whose content must never receive a nested revision.
pub fn is_tracked_container(el: &Element) -> bool {
    el.is(INS) || el.is(DEL) || el.is(MOVE_FROM) || el.is(MOVE_TO)
}

/// Containers whose runs are not part of the visible text.
pub fn hides_content(el: &Element) -> bool {
    el.is(DEL) || el.is(MOVE_FROM)
}

/// Visible text contributed by one child of a run.
fn child_text(el: &Element) -> Option<String> {
    match el.name.as_str() {
        T => Some(el.text()),
        TAB => Some("\t".to_string()),
        BR | CR => Some(LINE_BREAK.to_string()),
        _ => None,
    }
}

/// Visible text of a `w:r`, with tabs and breaks mapped to their markers.
pub fn run_text(run: &Element) -> String {
    run.child_elements().filter_map(child_text).collect()
}

pub fn paragraph_style(paragraph: &Element) -> Option<String> {
    paragraph
        .find_child(PPR)?
        .find_child(PSTYLE)?
        .attr(VAL)
        .map(str::to_string)
}

/// Splits a run at byte offset `at` of its visible text.
///
/// Both halves keep the run's attributes and a copy of its `w:rPr`.
/// Children without visible text stay with the left half unless they sit
/// after the split point.
pub fn split_run(run: &Element, at: usize) -> (Element, Element) {
    let mut left = Element {
        name: run.name.clone(),
        attributes: run.attributes.clone(),
        children: Vec::new(),
    };
    let mut right = left.clone();
    let mut offset = 0;

    for child in &run.children {
        let XmlNode::Element(el) = child else {
            // Whitespace between run children is insignificant.
            continue;
        };
        if el.is(RPR) {
            left.children.push(child.clone());
            right.children.push(child.clone());
            continue;
        }
        let len = child_text(el).map_or(0, |t| t.len());
        if offset + len <= at {
            left.children.push(child.clone());
        } else if offset >= at {
            right.children.push(child.clone());
        } else {
            let text = el.text();
            let cut = at - offset;
            let (head, tail) = text.split_at(cut);
            left.children.push(XmlNode::Element(text_element(T, head)));
            right.children.push(XmlNode::Element(text_element(T, tail)));
        }
        offset += len;
    }
    (left, right)
}

/// Splits the run at `path` within the tree, leaving the left half at
/// `path` and the right half as its next sibling.
///
/// Tracked formatting changes in the right half's `w:rPr` get fresh ids.
/// Returns `false` when no run is at `path`.
pub fn split_run_in_place(
    root: &mut Element,
    path: &NodePath,
    at: usize,
    ids: &mut IdAllocator,
) -> bool {
    let (Some(parent_path), Some(index)) = (path.parent(), path.last()) else {
        return false;
    };
    let Some(parent) = root.get_mut(&parent_path) else {
        return false;
    };
    let Some(run) = parent
        .children
        .get(index)
        .and_then(XmlNode::as_element)
        .filter(|el| el.is(R))
    else {
        return false;
    };
    let (left, mut right) = split_run(run, at);
    if let Some(rpr) = right.find_child_mut(RPR) {
        renumber(rpr, ids);
    }
    parent.children[index] = XmlNode::Element(left);
    parent.children.insert(index + 1, XmlNode::Element(right));
    true
}

fn renumber(el: &mut Element, ids: &mut IdAllocator) {
    if el.attr(ID).is_some() {
        el.set_attr(ID, ids.allocate().to_string());
    }
    for child in el.children.iter_mut().filter_map(XmlNode::as_element_mut) {
        renumber(child, ids);
    }
}

fn text_element(name: &str, text: &str) -> Element {
    Element::new(name)
        .with_attr(XML_SPACE, "preserve")
        .with_text(text)
}

/// A new run carrying `text`, with tabs and breaks expanded back into
/// `w:tab` and `w:br` elements.
pub fn text_run(rpr: Option<&Element>, text: &str) -> Element {
    let mut run = Element::new(R);
    if let Some(rpr) = rpr {
        run.children.push(XmlNode::Element(rpr.clone()));
    }
    let mut pending = String::new();
    let flush = |run: &mut Element, pending: &mut String| {
        if !pending.is_empty() {
            run.children
                .push(XmlNode::Element(text_element(T, pending.as_str())));
            pending.clear();
        }
    };
    for ch in text.chars() {
        match ch {
            '\t' => {
                flush(&mut run, &mut pending);
                run.children.push(XmlNode::Element(Element::new(TAB)));
            }
            PARAGRAPH_MARK | LINE_BREAK => {
                flush(&mut run, &mut pending);
                run.children.push(XmlNode::Element(Element::new(BR)));
            }
            _ => pending.push(ch),
        }
    }
    flush(&mut run, &mut pending);
    run
}

/// Formatting for a run created next to `source`: its `w:rPr` without any
/// nested revision records, which carry ids of their own.
pub fn inherited_rpr(source: &Element) -> Option<Element> {
    let mut rpr = source.find_child(RPR)?.clone();
    rpr.children.retain(|child| match child {
        XmlNode::Element(el) => !(el.is("w:rPrChange") || is_tracked_container(el)),
        _ => true,
    });
    Some(rpr)
}

/// Renames text elements throughout `el` so the content reads as deleted.
pub fn mark_deleted(el: &mut Element) {
    rename_all(el, &[(T, DEL_TEXT), (INSTR_TEXT, DEL_INSTR_TEXT)]);
}

/// Reverses [`mark_deleted`].
pub fn mark_restored(el: &mut Element) {
    rename_all(el, &[(DEL_TEXT, T), (DEL_INSTR_TEXT, INSTR_TEXT)]);
}

fn rename_all(el: &mut Element, renames: &[(&str, &str)]) {
    if let Some((_, to)) = renames.iter().find(|(from, _)| el.is(from)) {
        el.name = to.to_string();
    }
    for child in el.children.iter_mut().filter_map(XmlNode::as_element_mut) {
        rename_all(child, renames);
    }
}

/// Initials for a comment author: the first letter of each word.
pub fn initials(author: &str) -> String {
    author
        .split_whitespace()
        .filter_map(|word| word.chars().next())
        .flat_map(char::to_uppercase)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn run(parts: &[Element]) -> Element {
        let mut run = Element::new(R).with_child(Element::new(RPR).with_child(Element::new("w:b")));
        for part in parts {
            run.children.push(XmlNode::Element(part.clone()));
        }
        run
    }

    fn t(text: &str) -> Element {
        Element::new(T).with_text(text)
    }

    #[test]
    fn test_run_text_maps_tabs_and_breaks() {
        let r = run(&[t("a"), Element::new(TAB), t("b"), Element::new(BR), Element::new(CR)]);
        assert_eq!(run_text(&r), "a\tb\u{b}\u{b}");
    }

    #[test]
    fn test_run_text_ignores_field_codes() {
        let r = run(&[Element::new(INSTR_TEXT).with_text(" PAGE "), t("3")]);
        assert_eq!(run_text(&r), "3");
    }

    #[test]
    fn test_split_run_inside_text() {
        let r = run(&[t("Hello world")]);
        let (left, right) = split_run(&r, 5);
        assert_eq!(run_text(&left), "Hello");
        assert_eq!(run_text(&right), " world");
        assert!(left.find_child(RPR).is_some());
        assert!(right.find_child(RPR).is_some());
        let right_t = right.find_child(T).unwrap();
        assert_eq!(right_t.attr(XML_SPACE), Some("preserve"));
    }

    #[test]
    fn test_split_run_between_children() {
        let r = run(&[t("ab"), Element::new(TAB), t("cd")]);
        let (left, right) = split_run(&r, 3);
        assert_eq!(run_text(&left), "ab\t");
        assert_eq!(run_text(&right), "cd");
    }

    #[test]
    fn test_split_run_in_place_renumbers_formatting_changes() {
        let rpr = Element::new(RPR).with_child(
            Element::new("w:rPrChange")
                .with_attr(ID, "4")
                .with_child(Element::new(RPR)),
        );
        let mut p = Element::new(P).with_child(Element::new(R).with_child(rpr).with_child(t("abcd")));
        let mut ids = IdAllocator::starting_at(10);

        assert!(split_run_in_place(&mut p, &NodePath::from(vec![0]), 1, &mut ids));
        assert!(!split_run_in_place(&mut p, &NodePath::from(vec![7]), 1, &mut ids));

        let runs: Vec<&Element> = p.child_elements().collect();
        assert_eq!(run_text(runs[0]), "a");
        assert_eq!(run_text(runs[1]), "bcd");
        let change_id = |run: &Element| {
            run.find_child(RPR)
                .and_then(|rpr| rpr.find_child("w:rPrChange"))
                .and_then(|change| change.attr(ID))
                .map(str::to_string)
        };
        assert_eq!(change_id(runs[0]).as_deref(), Some("4"));
        assert_eq!(change_id(runs[1]).as_deref(), Some("10"));
    }

    #[test]
    fn test_text_run_expands_tabs_and_breaks() {
        let r = text_run(None, "a\tb\nc");
        let names: Vec<&str> = r.child_elements().map(|el| el.name.as_str()).collect();
        assert_eq!(names, vec![T, TAB, T, BR, T]);
        assert_eq!(run_text(&r), "a\tb\u{b}c");
    }

    #[test]
    fn test_inherited_rpr_drops_revision_records() {
        let source = Element::new(R).with_child(
            Element::new(RPR)
                .with_child(Element::new("w:i"))
                .with_child(Element::new("w:rPrChange").with_attr(ID, "3")),
        );
        let rpr = inherited_rpr(&source).unwrap();
        assert!(rpr.find_child("w:i").is_some());
        assert!(rpr.find_child("w:rPrChange").is_none());
    }

    #[test]
    fn test_mark_deleted_and_restored() {
        let mut r = run(&[t("x"), Element::new(INSTR_TEXT).with_text("PAGE")]);
        mark_deleted(&mut r);
        assert!(r.find_child(DEL_TEXT).is_some());
        assert!(r.find_child(DEL_INSTR_TEXT).is_some());
        assert_eq!(run_text(&r), "");
        mark_restored(&mut r);
        assert_eq!(run_text(&r), "x");
    }

    #[test]
    fn test_initials() {
        assert_eq!(initials("Agente IA Revisor"), "AIR");
        assert_eq!(initials(""), "");
    }
}
