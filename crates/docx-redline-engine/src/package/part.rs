use crate::xml::{Element, XmlDocument, XmlError};

/// A structured part loaded from, or destined for, the container.
///
/// Parts are written back only once something has asked for mutable access.
#[derive(Debug, Clone)]
pub struct Part {
    name: String,
    doc: XmlDocument,
    dirty: bool,
}

impl Part {
    pub(crate) fn loaded(name: impl Into<String>, doc: XmlDocument) -> Self {
        Self {
            name: name.into(),
            doc,
            dirty: false,
        }
    }

    pub(crate) fn created(name: impl Into<String>, root: Element) -> Self {
        Self {
            name: name.into(),
            doc: XmlDocument::new(root),
            dirty: true,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn root(&self) -> &Element {
        &self.doc.root
    }

    pub fn root_mut(&mut self) -> &mut Element {
        self.dirty = true;
        &mut self.doc.root
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub(crate) fn to_bytes(&self) -> Result<Vec<u8>, XmlError> {
        self.doc.to_bytes()
    }
}

/// The main document part.
///
/// Every mutable borrow bumps the generation, which is how resolved spans
/// and cached text indexes detect that they no longer describe the tree.
#[derive(Debug, Clone)]
pub struct Body {
    part: Part,
    generation: u64,
}

impl Body {
    pub(crate) fn new(part: Part) -> Self {
        Self {
            part,
            generation: 0,
        }
    }

    /// The `w:document` element.
    pub fn root(&self) -> &Element {
        self.part.root()
    }

    pub fn root_mut(&mut self) -> &mut Element {
        self.generation += 1;
        self.part.root_mut()
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn part(&self) -> &Part {
        &self.part
    }
}

#[cfg(test)]
impl Body {
    /// A body parsed from fixture paragraph markup.
    pub(crate) fn from_paragraphs(paragraphs: &[String]) -> Self {
        let xml = crate::test_support::document_xml(paragraphs);
        let doc = XmlDocument::parse(xml.as_bytes()).expect("fixture document parses");
        Self::new(Part::loaded("word/document.xml", doc))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mutable_access_marks_dirty_and_bumps_generation() {
        let part = Part::loaded("word/document.xml", XmlDocument::new(Element::new("w:document")));
        let mut body = Body::new(part);
        assert!(!body.part().is_dirty());
        assert_eq!(body.generation(), 0);

        let _ = body.root();
        assert_eq!(body.generation(), 0);

        body.root_mut().set_attr("mc:Ignorable", "w14");
        assert!(body.part().is_dirty());
        assert_eq!(body.generation(), 1);
    }
}
