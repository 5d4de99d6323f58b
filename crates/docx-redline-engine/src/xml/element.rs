use super::path::NodePath;

/// A node in an owned XML tree.
#[derive(Debug, Clone, PartialEq)]
pub enum XmlNode {
    Element(Element),
    /// Unescaped character data.
    Text(String),
    CData(String),
    Comment(String),
    ProcessingInstruction(String),
}

impl XmlNode {
    pub fn as_element(&self) -> Option<&Element> {
        match self {
            XmlNode::Element(el) => Some(el),
            _ => None,
        }
    }

    pub fn as_element_mut(&mut self) -> Option<&mut Element> {
        match self {
            XmlNode::Element(el) => Some(el),
            _ => None,
        }
    }
}

/// An element with its qualified name (`w:r`, `Relationship`, ...) kept
/// exactly as written in the source part.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Element {
    pub name: String,
    pub attributes: Vec<(String, String)>,
    pub children: Vec<XmlNode>,
}

impl Element {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            attributes: Vec::new(),
            children: Vec::new(),
        }
    }

    pub fn with_attr(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.set_attr(key, value);
        self
    }

    pub fn with_child(mut self, child: Element) -> Self {
        self.children.push(XmlNode::Element(child));
        self
    }

    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.children.push(XmlNode::Text(text.into()));
        self
    }

    pub fn is(&self, name: &str) -> bool {
        self.name == name
    }

    pub fn attr(&self, key: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Sets an attribute, replacing the value in place if it already exists
    /// so attribute order survives a round trip.
    pub fn set_attr(&mut self, key: impl Into<String>, value: impl Into<String>) {
        let key = key.into();
        let value = value.into();
        match self.attributes.iter_mut().find(|(k, _)| *k == key) {
            Some(slot) => slot.1 = value,
            None => self.attributes.push((key, value)),
        }
    }

    pub fn child_elements(&self) -> impl Iterator<Item = &Element> {
        self.children.iter().filter_map(XmlNode::as_element)
    }

    pub fn find_child(&self, name: &str) -> Option<&Element> {
        self.child_elements().find(|el| el.is(name))
    }

    pub fn find_child_mut(&mut self, name: &str) -> Option<&mut Element> {
        self.children
            .iter_mut()
            .filter_map(XmlNode::as_element_mut)
            .find(|el| el.is(name))
    }

    /// Concatenated character data of the direct children.
    pub fn text(&self) -> String {
        let mut out = String::new();
        for child in &self.children {
            match child {
                XmlNode::Text(t) | XmlNode::CData(t) => out.push_str(t),
                _ => {}
            }
        }
        out
    }

    /// Replaces all children with a single text node.
    pub fn set_text(&mut self, text: impl Into<String>) {
        self.children = vec![XmlNode::Text(text.into())];
    }

    pub fn get(&self, path: &NodePath) -> Option<&Element> {
        let mut current = self;
        for &i in path.indices() {
            current = current.children.get(i)?.as_element()?;
        }
        Some(current)
    }

    pub fn get_mut(&mut self, path: &NodePath) -> Option<&mut Element> {
        let mut current = self;
        for &i in path.indices() {
            current = current.children.get_mut(i)?.as_element_mut()?;
        }
        Some(current)
    }

    /// True if this element or any descendant is named `name`.
    pub fn contains(&self, name: &str) -> bool {
        self.is(name) || self.child_elements().any(|child| child.contains(name))
    }

    /// Depth-first, document-order search for the first element matching
    /// `pred`, returning its path relative to `self`.
    pub fn find_path(&self, pred: impl Fn(&Element) -> bool) -> Option<NodePath> {
        fn walk(el: &Element, pred: &dyn Fn(&Element) -> bool, path: &mut Vec<usize>) -> bool {
            for (i, child) in el.children.iter().enumerate() {
                let XmlNode::Element(child) = child else {
                    continue;
                };
                path.push(i);
                if pred(child) || walk(child, pred, path) {
                    return true;
                }
                path.pop();
            }
            false
        }

        let mut path = Vec::new();
        walk(self, &pred, &mut path).then(|| NodePath::from(path))
    }
}
