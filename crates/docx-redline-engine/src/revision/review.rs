use super::{RevisionError, RevisionKind};
use crate::package::Body;
use crate::wml;
use crate::xml::XmlNode;

/// Accepts the `w:ins` or `w:del` with `id`: an insertion becomes plain
/// text, a deletion disappears.
pub fn accept(body: &mut Body, id: u64) -> Result<RevisionKind, RevisionError> {
    resolve(body, id, true)
}

/// Rejects the `w:ins` or `w:del` with `id`: an insertion disappears, a
/// deletion becomes plain text again.
pub fn reject(body: &mut Body, id: u64) -> Result<RevisionKind, RevisionError> {
    resolve(body, id, false)
}

fn resolve(body: &mut Body, id: u64, accepted: bool) -> Result<RevisionKind, RevisionError> {
    let wanted = id.to_string();
    let path = body
        .root()
        .find_path(|el| (el.is(wml::INS) || el.is(wml::DEL)) && el.attr(wml::ID) == Some(wanted.as_str()))
        .ok_or(RevisionError::UnknownRevision { id })?;
    let (Some(parent_path), Some(index)) = (path.parent(), path.last()) else {
        return Err(RevisionError::UnknownRevision { id });
    };

    let parent = body
        .root_mut()
        .get_mut(&parent_path)
        .ok_or(RevisionError::UnknownRevision { id })?;
    let XmlNode::Element(container) = parent.children.remove(index) else {
        return Err(RevisionError::UnknownRevision { id });
    };
    let kind = if container.is(wml::INS) {
        RevisionKind::Insertion
    } else {
        RevisionKind::Deletion
    };

    let keep_content = match kind {
        RevisionKind::Insertion => accepted,
        RevisionKind::Deletion => !accepted,
    };
    if keep_content {
        let mut content = container.children;
        if kind == RevisionKind::Deletion {
            for node in &mut content {
                if let XmlNode::Element(el) = node {
                    wml::mark_restored(el);
                }
            }
        }
        parent.children.splice(index..index, content);
    }
    log::debug!(
        "{} {kind:?} {id}",
        if accepted { "Accepted" } else { "Rejected" }
    );
    Ok(kind)
}
