//! Open Packaging Conventions plumbing: relationship parts and the
//! content-type registry.

use crate::xml::{Element, XmlNode};

pub const CONTENT_TYPES_PART: &str = "[Content_Types].xml";
pub const PACKAGE_RELS_PART: &str = "_rels/.rels";
pub const DEFAULT_MAIN_PART: &str = "word/document.xml";

pub const RELS_NS: &str = "http://schemas.openxmlformats.org/package/2006/relationships";
pub const REL_TYPE_COMMENTS: &str =
    "http://schemas.openxmlformats.org/officeDocument/2006/relationships/comments";
pub const COMMENTS_CONTENT_TYPE: &str =
    "application/vnd.openxmlformats-officedocument.wordprocessingml.comments+xml";

const RELATIONSHIP: &str = "Relationship";
const OVERRIDE: &str = "Override";

/// First internal relationship whose `Type` ends with `/{kind}`.
pub fn find_relationship<'a>(rels: &'a Element, kind: &str) -> Option<&'a Element> {
    rels.child_elements().find(|rel| {
        rel.is(RELATIONSHIP)
            && rel.attr("TargetMode") != Some("External")
            && rel
                .attr("Type")
                .and_then(|t| t.rsplit_once('/'))
                .is_some_and(|(_, suffix)| suffix == kind)
    })
}

/// Adds a relationship with a fresh `rIdN` and returns that id.
pub fn add_relationship(rels: &mut Element, rel_type: &str, target: &str) -> String {
    let id = next_relationship_id(rels);
    rels.children.push(XmlNode::Element(
        Element::new(RELATIONSHIP)
            .with_attr("Id", id.as_str())
            .with_attr("Type", rel_type)
            .with_attr("Target", target),
    ));
    id
}

fn next_relationship_id(rels: &Element) -> String {
    let max = rels
        .child_elements()
        .filter_map(|rel| rel.attr("Id")?.strip_prefix("rId")?.parse::<u32>().ok())
        .max()
        .unwrap_or(0);
    format!("rId{}", max + 1)
}

pub fn has_override(types: &Element, part_name: &str) -> bool {
    types.child_elements().any(|el| {
        el.is(OVERRIDE)
            && el
                .attr("PartName")
                .is_some_and(|name| name.eq_ignore_ascii_case(part_name))
    })
}

pub fn add_override(types: &mut Element, part_name: &str, content_type: &str) {
    types.children.push(XmlNode::Element(
        Element::new(OVERRIDE)
            .with_attr("PartName", part_name)
            .with_attr("ContentType", content_type),
    ));
}

/// `word/document.xml` -> `word/_rels/document.xml.rels`
pub fn rels_part_name(part: &str) -> String {
    match part.rsplit_once('/') {
        Some((dir, file)) => format!("{dir}/_rels/{file}.rels"),
        None => format!("_rels/{part}.rels"),
    }
}

/// Directory of a part name, without the trailing slash.
pub fn part_dir(part: &str) -> &str {
    part.rsplit_once('/').map_or("", |(dir, _)| dir)
}

/// Resolves a relationship target against the directory of its source part,
/// producing a zip entry name.
pub fn resolve_target(base_dir: &str, target: &str) -> String {
    let (base, target) = match target.strip_prefix('/') {
        Some(absolute) => ("", absolute),
        None => (base_dir, target),
    };
    let mut segments: Vec<&str> = base.split('/').filter(|s| !s.is_empty()).collect();
    for segment in target.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                segments.pop();
            }
            other => segments.push(other),
        }
    }
    segments.join("/")
}

/// Path of a part relative to a relationship source in `base_dir`.
pub fn relative_target(base_dir: &str, part: &str) -> String {
    if !base_dir.is_empty()
        && let Some(rest) = part
            .strip_prefix(base_dir)
            .and_then(|rest| rest.strip_prefix('/'))
    {
        return rest.to_string();
    }
    format!("/{part}")
}
