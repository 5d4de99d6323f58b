//! Owned XML trees for package parts.
//!
//! Parts are parsed with `quick-xml` into [`Element`] trees that keep
//! qualified names, attribute order, and inter-element whitespace, so an
//! edited part re-serializes with everything it did not touch intact.

mod element;
mod path;

pub use element::{Element, XmlNode};
pub use path::{InsertionPoint, NodePath};

use quick_xml::Reader;
use quick_xml::Writer;
use quick_xml::events::{BytesCData, BytesDecl, BytesEnd, BytesPI, BytesStart, BytesText, Event};

#[derive(Debug, thiserror::Error)]
pub enum XmlError {
    #[error("Malformed XML at byte {position}: {reason}")]
    Malformed { position: usize, reason: String },
    #[error("XML part has no root element")]
    MissingRoot,
    #[error("Unexpected root element: expected {expected}, found {found}")]
    UnexpectedRoot { expected: String, found: String },
    #[error("Failed to write XML: {0}")]
    Write(String),
}

/// A parsed part: comments and processing instructions ahead of the root,
/// then the root element itself.
#[derive(Debug, Clone, PartialEq)]
pub struct XmlDocument {
    pub prolog: Vec<XmlNode>,
    pub root: Element,
}

impl XmlDocument {
    pub fn new(root: Element) -> Self {
        Self {
            prolog: Vec::new(),
            root,
        }
    }

    pub fn parse(bytes: &[u8]) -> Result<Self, XmlError> {
        let mut reader = Reader::from_reader(bytes);
        let mut prolog = Vec::new();
        let mut stack: Vec<Element> = Vec::new();
        let mut root: Option<Element> = None;

        loop {
            let event = reader
                .read_event()
                .map_err(|e| malformed(reader.error_position(), e))?;
            let position = reader.buffer_position();
            match event {
                Event::Start(start) => stack.push(open_element(&start, position)?),
                Event::Empty(start) => {
                    let el = open_element(&start, position)?;
                    close_element(el, &mut stack, &mut root, position)?;
                }
                Event::End(_) => {
                    let el = stack
                        .pop()
                        .ok_or_else(|| malformed(position, "closing tag without opening tag"))?;
                    close_element(el, &mut stack, &mut root, position)?;
                }
                Event::Text(text) => {
                    if let Some(parent) = stack.last_mut() {
                        let text = text.unescape().map_err(|e| malformed(position, e))?;
                        parent.children.push(XmlNode::Text(text.into_owned()));
                    }
                }
                Event::CData(data) => {
                    let data = utf8(data.into_inner().into_owned(), position)?;
                    if let Some(parent) = stack.last_mut() {
                        parent.children.push(XmlNode::CData(data));
                    }
                }
                Event::Comment(comment) => {
                    let comment = utf8(comment.into_inner().into_owned(), position)?;
                    push_misc(XmlNode::Comment(comment), &mut stack, &root, &mut prolog);
                }
                Event::PI(pi) => {
                    let pi = utf8(pi.to_vec(), position)?;
                    push_misc(
                        XmlNode::ProcessingInstruction(pi),
                        &mut stack,
                        &root,
                        &mut prolog,
                    );
                }
                Event::Decl(_) | Event::DocType(_) => {}
                Event::Eof => break,
            }
        }

        if !stack.is_empty() {
            return Err(malformed(
                reader.buffer_position(),
                "unexpected end of input inside an element",
            ));
        }
        let root = root.ok_or(XmlError::MissingRoot)?;
        Ok(Self { prolog, root })
    }

    /// Parses a part and checks the root element's qualified name.
    pub fn parse_rooted(bytes: &[u8], expected: &str) -> Result<Self, XmlError> {
        let doc = Self::parse(bytes)?;
        if !doc.root.is(expected) {
            return Err(XmlError::UnexpectedRoot {
                expected: expected.to_string(),
                found: doc.root.name.clone(),
            });
        }
        Ok(doc)
    }

    /// Serializes with a standalone UTF-8 declaration, as Office writes parts.
    pub fn to_bytes(&self) -> Result<Vec<u8>, XmlError> {
        let mut writer = Writer::new(Vec::new());
        write(
            &mut writer,
            Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), Some("yes"))),
        )?;
        writer.get_mut().extend_from_slice(b"\r\n");
        for node in &self.prolog {
            write_node(&mut writer, node)?;
        }
        write_element(&mut writer, &self.root)?;
        Ok(writer.into_inner())
    }
}

/// Largest numeric value of any prefixed `*:id` attribute in a part.
///
/// Streams the part without building a tree; used to seed id allocation
/// from every XML part in a package.
pub fn max_numeric_id(bytes: &[u8]) -> Result<Option<u64>, XmlError> {
    let mut reader = Reader::from_reader(bytes);
    let mut max = None;
    loop {
        let event = reader
            .read_event()
            .map_err(|e| malformed(reader.error_position(), e))?;
        match event {
            Event::Start(start) | Event::Empty(start) => {
                for attr in start.attributes().with_checks(false).flatten() {
                    let key = attr.key.as_ref();
                    if !key.ends_with(b":id") {
                        continue;
                    }
                    let parsed = std::str::from_utf8(&attr.value)
                        .ok()
                        .and_then(|v| v.trim().parse::<u64>().ok());
                    if let Some(id) = parsed {
                        max = max.max(Some(id));
                    }
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }
    Ok(max)
}

fn malformed(position: impl TryInto<usize>, reason: impl std::fmt::Display) -> XmlError {
    XmlError::Malformed {
        position: position.try_into().unwrap_or(usize::MAX),
        reason: reason.to_string(),
    }
}

fn utf8(bytes: Vec<u8>, position: impl TryInto<usize>) -> Result<String, XmlError> {
    String::from_utf8(bytes).map_err(|e| malformed(position, e))
}

fn open_element(start: &BytesStart<'_>, position: impl TryInto<usize> + Copy) -> Result<Element, XmlError> {
    let name = utf8(start.name().as_ref().to_vec(), position)?;
    let mut el = Element::new(name);
    for attr in start.attributes() {
        let attr = attr.map_err(|e| malformed(position, e))?;
        let key = utf8(attr.key.as_ref().to_vec(), position)?;
        let value = attr.unescape_value().map_err(|e| malformed(position, e))?;
        el.attributes.push((key, value.into_owned()));
    }
    Ok(el)
}

fn close_element(
    el: Element,
    stack: &mut [Element],
    root: &mut Option<Element>,
    position: impl TryInto<usize>,
) -> Result<(), XmlError> {
    match stack.last_mut() {
        Some(parent) => parent.children.push(XmlNode::Element(el)),
        None if root.is_none() => *root = Some(el),
        None => return Err(malformed(position, "more than one root element")),
    }
    Ok(())
}

fn push_misc(node: XmlNode, stack: &mut [Element], root: &Option<Element>, prolog: &mut Vec<XmlNode>) {
    match stack.last_mut() {
        Some(parent) => parent.children.push(node),
        // Trailing comments after the root are dropped.
        None if root.is_none() => prolog.push(node),
        None => {}
    }
}

fn write(writer: &mut Writer<Vec<u8>>, event: Event<'_>) -> Result<(), XmlError> {
    writer
        .write_event(event)
        .map_err(|e| XmlError::Write(e.to_string()))
}

fn write_node(writer: &mut Writer<Vec<u8>>, node: &XmlNode) -> Result<(), XmlError> {
    match node {
        XmlNode::Element(el) => write_element(writer, el),
        XmlNode::Text(text) => write(writer, Event::Text(BytesText::new(text))),
        XmlNode::CData(data) => write(writer, Event::CData(BytesCData::new(data.as_str()))),
        XmlNode::Comment(comment) => {
            write(writer, Event::Comment(BytesText::from_escaped(comment.as_str())))
        }
        XmlNode::ProcessingInstruction(pi) => write(writer, Event::PI(BytesPI::new(pi.as_str()))),
    }
}

fn write_element(writer: &mut Writer<Vec<u8>>, el: &Element) -> Result<(), XmlError> {
    let mut start = BytesStart::new(el.name.as_str());
    for (key, value) in &el.attributes {
        start.push_attribute((key.as_str(), value.as_str()));
    }
    if el.children.is_empty() {
        return write(writer, Event::Empty(start));
    }
    write(writer, Event::Start(start))?;
    for child in &el.children {
        write_node(writer, child)?;
    }
    write(writer, Event::End(BytesEnd::new(el.name.as_str())))
}
