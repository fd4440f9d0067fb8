//! Output tree nodes

use smallvec::SmallVec;
use std::fmt;

/// Unique identifier for a node in the tree
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub u32);

impl NodeId {
    /// Create a new node ID
    pub fn new(id: u32) -> Self {
        Self(id)
    }

    /// Get the raw ID value
    pub fn as_u32(self) -> u32 {
        self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NodeId({})", self.0)
    }
}

/// Value of a parsed attribute.
///
/// `True` is a bare boolean attribute (`<input disabled>`); everything written
/// with `=` carries its decoded text, even when that text is empty.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum AttributeValue {
    Text(String),
    True,
}

impl AttributeValue {
    /// Text of the value, `None` for boolean attributes
    pub fn as_str(&self) -> Option<&str> {
        match self {
            AttributeValue::Text(text) => Some(text),
            AttributeValue::True => None,
        }
    }

    pub fn is_boolean(&self) -> bool {
        matches!(self, AttributeValue::True)
    }
}

impl From<&str> for AttributeValue {
    fn from(value: &str) -> Self {
        AttributeValue::Text(value.to_string())
    }
}

impl From<String> for AttributeValue {
    fn from(value: String) -> Self {
        AttributeValue::Text(value)
    }
}

/// Attributes in source order, names lowercased
pub type Attributes = SmallVec<[(String, AttributeValue); 4]>;

/// Document compatibility mode, as decided by the DOCTYPE
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum CompatMode {
    Quirks,
    LimitedQuirks,
    #[default]
    NoQuirks,
}

impl fmt::Display for CompatMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            CompatMode::Quirks => "quirks",
            CompatMode::LimitedQuirks => "limited-quirks",
            CompatMode::NoQuirks => "no-quirks",
        })
    }
}

/// Type of tree node
#[derive(Debug, Clone, PartialEq)]
pub enum NodeType {
    /// Synthetic document root
    Document,
    /// Element created from a tag token
    Element(ElementData),
    /// Text content, coalesced on insertion
    Text(String),
}

/// Element-specific data
#[derive(Debug, Clone, PartialEq)]
pub struct ElementData {
    /// Tag name (lowercase)
    pub tag_name: String,
    /// Attributes in source order
    pub attributes: Attributes,
}

impl ElementData {
    /// Create a new element with the given tag name and attributes
    pub fn new(tag_name: impl Into<String>, attributes: Attributes) -> Self {
        Self {
            tag_name: tag_name.into().to_ascii_lowercase(),
            attributes,
        }
    }

    /// Get an attribute value
    pub fn get_attribute(&self, name: &str) -> Option<&AttributeValue> {
        self.attributes
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value)
    }

    /// Set an attribute value, keeping the position of an existing one
    pub fn set_attribute(&mut self, name: impl Into<String>, value: AttributeValue) {
        let name = name.into().to_ascii_lowercase();
        match self.attributes.iter_mut().find(|(key, _)| *key == name) {
            Some((_, existing)) => *existing = value,
            None => self.attributes.push((name, value)),
        }
    }

    /// Check if the element has a class
    pub fn has_class(&self, class: &str) -> bool {
        self.classes().any(|c| c == class)
    }

    /// Get the element's ID
    pub fn id(&self) -> Option<&str> {
        self.get_attribute("id").and_then(AttributeValue::as_str)
    }

    /// Iterate the tokens of the `class` attribute
    pub fn classes(&self) -> impl Iterator<Item = &str> {
        self.get_attribute("class")
            .and_then(AttributeValue::as_str)
            .unwrap_or_default()
            .split_ascii_whitespace()
    }
}

/// A node in the tree
#[derive(Debug, Clone)]
pub struct Node {
    /// Unique identifier
    pub id: NodeId,
    /// Node type and associated data
    pub node_type: NodeType,
    /// Parent node ID (None for the root and detached nodes)
    pub parent: Option<NodeId>,
    /// Child node IDs
    pub children: SmallVec<[NodeId; 8]>,
    /// Distance from the document root
    pub depth: u32,
}

impl Node {
    /// Create a new detached node
    pub fn new(id: NodeId, node_type: NodeType) -> Self {
        Self {
            id,
            node_type,
            parent: None,
            children: SmallVec::new(),
            depth: 0,
        }
    }

    pub fn is_document(&self) -> bool {
        matches!(self.node_type, NodeType::Document)
    }

    pub fn is_element(&self) -> bool {
        matches!(self.node_type, NodeType::Element(_))
    }

    pub fn is_text(&self) -> bool {
        matches!(self.node_type, NodeType::Text(_))
    }

    /// Get element data if this is an element
    pub fn as_element(&self) -> Option<&ElementData> {
        match &self.node_type {
            NodeType::Element(data) => Some(data),
            _ => None,
        }
    }

    /// Get mutable element data if this is an element
    pub fn as_element_mut(&mut self) -> Option<&mut ElementData> {
        match &mut self.node_type {
            NodeType::Element(data) => Some(data),
            _ => None,
        }
    }

    /// Get text content if this is a text node
    pub fn as_text(&self) -> Option<&str> {
        match &self.node_type {
            NodeType::Text(text) => Some(text),
            _ => None,
        }
    }

    /// Get the tag name if this is an element
    pub fn tag_name(&self) -> Option<&str> {
        self.as_element().map(|e| e.tag_name.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use smallvec::smallvec;

    #[test]
    fn test_element_lowercases_tag_name() {
        let element = ElementData::new("DIV", Attributes::new());
        assert_eq!(element.tag_name, "div");
    }

    #[test]
    fn test_classes_and_id() {
        let element = ElementData::new(
            "p",
            smallvec![
                ("id".to_string(), AttributeValue::from("intro")),
                ("class".to_string(), AttributeValue::from(" lead  wide\tnote ")),
            ],
        );
        assert_eq!(element.id(), Some("intro"));
        assert!(element.has_class("wide"));
        assert!(!element.has_class("lea"));
        assert_eq!(element.classes().collect::<Vec<_>>(), vec!["lead", "wide", "note"]);
    }

    #[test]
    fn test_boolean_attribute_has_no_text() {
        let mut element = ElementData::new("input", Attributes::new());
        element.set_attribute("Disabled", AttributeValue::True);
        assert_eq!(element.get_attribute("disabled"), Some(&AttributeValue::True));
        assert_eq!(element.get_attribute("DISABLED").and_then(AttributeValue::as_str), None);
    }

    #[test]
    fn test_set_attribute_keeps_position() {
        let mut element = ElementData::new("a", Attributes::new());
        element.set_attribute("href", AttributeValue::from("/a"));
        element.set_attribute("rel", AttributeValue::from("next"));
        element.set_attribute("href", AttributeValue::from("/b"));
        let names: Vec<_> = element.attributes.iter().map(|(k, _)| k.as_str()).collect();
        assert_eq!(names, vec!["href", "rel"]);
        assert_eq!(element.get_attribute("href"), Some(&AttributeValue::from("/b")));
    }
}
