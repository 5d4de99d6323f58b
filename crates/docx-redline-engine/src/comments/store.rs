use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::clock::format_timestamp;
use crate::wml;
use crate::xml::{Element, XmlNode};

/// One comment as written to the store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CommentThread {
    pub id: u64,
    pub author: String,
    pub timestamp: DateTime<Utc>,
    pub category: String,
    /// Paragraphs of the comment text; the first carries the category
    /// marker.
    pub body: Vec<String>,
}

impl CommentThread {
    /// The `w:comment` entry for this thread.
    pub fn to_element(&self) -> Element {
        let mut comment = Element::new(wml::COMMENT)
            .with_attr(wml::ID, self.id.to_string())
            .with_attr(wml::AUTHOR, self.author.as_str())
            .with_attr(wml::DATE, format_timestamp(self.timestamp))
            .with_attr(wml::INITIALS, wml::initials(&self.author));

        let annotation = Element::new(wml::R).with_child(Element::new(wml::ANNOTATION_REF));
        let mut paragraphs = self.body.iter();
        let mut first = Element::new(wml::P).with_child(annotation);
        if let Some(text) = paragraphs.next().filter(|text| !text.is_empty()) {
            first = first.with_child(wml::text_run(None, text));
        }
        comment = comment.with_child(first);
        for text in paragraphs {
            comment = comment.with_child(Element::new(wml::P).with_child(wml::text_run(None, text)));
        }
        comment
    }
}

/// Appends `thread` to a `w:comments` root.
pub fn append(store: &mut Element, thread: &CommentThread) {
    store.children.push(XmlNode::Element(thread.to_element()));
}

/// Ids of the comments already in a `w:comments` root.
pub fn comment_ids(store: &Element) -> Vec<u64> {
    store
        .child_elements()
        .filter(|el| el.is(wml::COMMENT))
        .filter_map(|el| el.attr(wml::ID)?.parse().ok())
        .collect()
}
