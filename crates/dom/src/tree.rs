//! Output tree structure

use rustc_hash::FxHashMap;
use std::fmt;
use std::fmt::Write as _;

use crate::error::{DomError, DomResult};
use crate::node::{AttributeValue, Attributes, CompatMode, ElementData, Node, NodeId, NodeType};

/// Tree that owns all nodes
pub struct DomTree {
    /// All nodes in the tree
    nodes: FxHashMap<NodeId, Node>,
    /// Next available node ID
    next_id: u32,
    /// Root document node
    document_id: NodeId,
    /// Compatibility mode decided by the DOCTYPE
    compat_mode: CompatMode,
}

impl DomTree {
    /// Create a new tree holding only the document node
    pub fn new() -> Self {
        let document_id = NodeId::new(0);
        let document = Node::new(document_id, NodeType::Document);

        let mut nodes = FxHashMap::default();
        nodes.insert(document_id, document);

        Self {
            nodes,
            next_id: 1,
            document_id,
            compat_mode: CompatMode::default(),
        }
    }

    /// Get the document (root) node ID
    pub fn document_id(&self) -> NodeId {
        self.document_id
    }

    pub fn compat_mode(&self) -> CompatMode {
        self.compat_mode
    }

    pub fn set_compat_mode(&mut self, mode: CompatMode) {
        self.compat_mode = mode;
    }

    /// Get a node by ID
    pub fn get(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(&id)
    }

    /// Get a mutable node by ID
    pub fn get_mut(&mut self, id: NodeId) -> Option<&mut Node> {
        self.nodes.get_mut(&id)
    }

    fn node(&self, id: NodeId) -> DomResult<&Node> {
        self.nodes.get(&id).ok_or(DomError::NodeNotFound(id.0))
    }

    fn node_mut(&mut self, id: NodeId) -> DomResult<&mut Node> {
        self.nodes.get_mut(&id).ok_or(DomError::NodeNotFound(id.0))
    }

    fn allocate(&mut self, node_type: NodeType) -> NodeId {
        let id = NodeId::new(self.next_id);
        self.next_id += 1;
        self.nodes.insert(id, Node::new(id, node_type));
        id
    }

    /// Create a detached element node
    pub fn create_element(&mut self, tag_name: impl Into<String>, attributes: Attributes) -> NodeId {
        self.allocate(NodeType::Element(ElementData::new(tag_name, attributes)))
    }

    /// Create a detached text node
    pub fn create_text(&mut self, content: impl Into<String>) -> NodeId {
        self.allocate(NodeType::Text(content.into()))
    }

    /// Append `child_id` as the last child of `parent_id`.
    ///
    /// A child that already has a parent is detached from it first, so a node
    /// is never owned twice. Depths of the moved subtree are recomputed.
    pub fn append_child(&mut self, parent_id: NodeId, child_id: NodeId) -> DomResult<()> {
        let parent_depth = {
            let parent = self.node(parent_id)?;
            if parent.is_text() {
                return Err(DomError::InvalidNodeType);
            }
            parent.depth
        };
        self.node(child_id)?;
        if self.is_inclusive_ancestor(child_id, parent_id) {
            return Err(DomError::HierarchyCycle {
                parent: parent_id.0,
                child: child_id.0,
            });
        }

        self.detach(child_id)?;
        self.node_mut(child_id)?.parent = Some(parent_id);
        self.node_mut(parent_id)?.children.push(child_id);
        self.update_depths(child_id, parent_depth + 1);
        Ok(())
    }

    /// Remove a node from its parent's children; no-op for detached nodes
    pub fn detach(&mut self, id: NodeId) -> DomResult<()> {
        let Some(parent_id) = self.node_mut(id)?.parent.take() else {
            return Ok(());
        };
        self.node_mut(parent_id)?.children.retain(|child| *child != id);
        self.update_depths(id, 0);
        Ok(())
    }

    /// Remove a node from a specific parent
    pub fn remove_child(&mut self, parent_id: NodeId, child_id: NodeId) -> DomResult<()> {
        if self.node(child_id)?.parent != Some(parent_id) {
            return Err(DomError::NodeNotFound(child_id.0));
        }
        self.detach(child_id)
    }

    /// Move every child of `from` to the end of `to`, preserving order
    pub fn move_children(&mut self, from: NodeId, to: NodeId) -> DomResult<()> {
        let children = self.node(from)?.children.clone();
        for child in children {
            self.append_child(to, child)?;
        }
        Ok(())
    }

    /// Insert text as the last child of `parent_id`.
    ///
    /// When the last child is already a text node the content is appended to
    /// it instead of creating a sibling.
    pub fn insert_text(&mut self, parent_id: NodeId, text: &str) -> DomResult<()> {
        if text.is_empty() {
            return Ok(());
        }
        let last_child = self.node(parent_id)?.children.last().copied();
        if let Some(last_id) = last_child {
            if let NodeType::Text(existing) = &mut self.node_mut(last_id)?.node_type {
                existing.push_str(text);
                return Ok(());
            }
        }
        let text_id = self.create_text(text);
        self.append_child(parent_id, text_id)
    }

    fn is_inclusive_ancestor(&self, ancestor: NodeId, mut node: NodeId) -> bool {
        loop {
            if node == ancestor {
                return true;
            }
            match self.get(node).and_then(|n| n.parent) {
                Some(parent) => node = parent,
                None => return false,
            }
        }
    }

    fn update_depths(&mut self, id: NodeId, depth: u32) {
        let mut pending = vec![(id, depth)];
        while let Some((id, depth)) = pending.pop() {
            if let Some(node) = self.nodes.get_mut(&id) {
                node.depth = depth;
                pending.extend(node.children.iter().map(|&child| (child, depth + 1)));
            }
        }
    }

    /// Get all children of a node
    pub fn children(&self, id: NodeId) -> Vec<NodeId> {
        self.get(id)
            .map(|n| n.children.to_vec())
            .unwrap_or_default()
    }

    /// Iterate over all descendants of a node (depth-first)
    pub fn descendants(&self, id: NodeId) -> Vec<NodeId> {
        let mut result = Vec::new();
        self.collect_descendants(id, &mut result);
        result
    }

    fn collect_descendants(&self, id: NodeId, result: &mut Vec<NodeId>) {
        if let Some(node) = self.get(id) {
            for &child_id in &node.children {
                result.push(child_id);
                self.collect_descendants(child_id, result);
            }
        }
    }

    /// Get the text content of a node and all its descendants
    pub fn text_content(&self, id: NodeId) -> String {
        let mut result = String::new();
        for node_id in std::iter::once(id).chain(self.descendants(id)) {
            if let Some(text) = self.get(node_id).and_then(Node::as_text) {
                result.push_str(text);
            }
        }
        result
    }

    /// Get the number of nodes in the tree, detached ones included
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Check if the tree is empty (only has the document node)
    pub fn is_empty(&self) -> bool {
        self.nodes.len() <= 1
    }

    /// Render the document's subtree for diagnostics.
    ///
    /// One line per node, indented two spaces per level below the document:
    /// elements as `<tag name="value" flag>`, text as a quoted string.
    pub fn pretty_print(&self) -> String {
        let mut output = String::new();
        for child in self.children(self.document_id) {
            self.print_node(child, &mut output);
        }
        output
    }

    fn print_node(&self, id: NodeId, output: &mut String) {
        let Some(node) = self.get(id) else {
            return;
        };
        let indent = "  ".repeat(node.depth.saturating_sub(1) as usize);

        match &node.node_type {
            NodeType::Document => {}
            NodeType::Element(elem) => {
                output.push_str(&indent);
                output.push('<');
                output.push_str(&elem.tag_name);
                for (name, value) in &elem.attributes {
                    match value {
                        AttributeValue::Text(text) => {
                            let _ = write!(output, " {}=\"{}\"", name, text);
                        }
                        AttributeValue::True => {
                            let _ = write!(output, " {}", name);
                        }
                    }
                }
                output.push_str(">\n");
            }
            NodeType::Text(text) => {
                let _ = writeln!(output, "{}\"{}\"", indent, text);
            }
        }

        for &child_id in &node.children {
            self.print_node(child_id, output);
        }
    }
}

impl Default for DomTree {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for DomTree {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.pretty_print())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_elements() {
        let mut tree = DomTree::new();
        let div = tree.create_element("div", Attributes::new());
        let p = tree.create_element("p", Attributes::new());
        let text = tree.create_text("Hello, World!");

        tree.append_child(tree.document_id(), div).unwrap();
        tree.append_child(div, p).unwrap();
        tree.append_child(p, text).unwrap();

        assert_eq!(tree.len(), 4); // document + div + p + text
        assert_eq!(tree.text_content(div), "Hello, World!");
        assert_eq!(tree.get(text).unwrap().depth, 3);
    }

    #[test]
    fn test_append_reparents_instead_of_duplicating() {
        let mut tree = DomTree::new();
        let doc = tree.document_id();
        let a = tree.create_element("a", Attributes::new());
        let b = tree.create_element("b", Attributes::new());
        let c = tree.create_element("c", Attributes::new());
        tree.append_child(doc, a).unwrap();
        tree.append_child(doc, b).unwrap();
        tree.append_child(a, c).unwrap();

        tree.append_child(b, c).unwrap();

        assert!(tree.children(a).is_empty());
        assert_eq!(tree.children(b), vec![c]);
        assert_eq!(tree.get(c).unwrap().parent, Some(b));
    }

    #[test]
    fn test_depth_follows_moved_subtree() {
        let mut tree = DomTree::new();
        let doc = tree.document_id();
        let outer = tree.create_element("div", Attributes::new());
        let inner = tree.create_element("span", Attributes::new());
        let leaf = tree.create_text("x");
        tree.append_child(doc, outer).unwrap();
        tree.append_child(outer, inner).unwrap();
        tree.append_child(inner, leaf).unwrap();
        assert_eq!(tree.get(leaf).unwrap().depth, 3);

        tree.append_child(doc, inner).unwrap();
        assert_eq!(tree.get(inner).unwrap().depth, 1);
        assert_eq!(tree.get(leaf).unwrap().depth, 2);
    }

    #[test]
    fn test_cycle_is_rejected() {
        let mut tree = DomTree::new();
        let doc = tree.document_id();
        let outer = tree.create_element("div", Attributes::new());
        let inner = tree.create_element("div", Attributes::new());
        tree.append_child(doc, outer).unwrap();
        tree.append_child(outer, inner).unwrap();

        assert_eq!(
            tree.append_child(inner, outer),
            Err(DomError::HierarchyCycle { parent: inner.0, child: outer.0 })
        );
        assert!(tree.append_child(outer, outer).is_err());
    }

    #[test]
    fn test_text_is_coalesced() {
        let mut tree = DomTree::new();
        let doc = tree.document_id();
        tree.insert_text(doc, "one").unwrap();
        tree.insert_text(doc, " two").unwrap();
        let em = tree.create_element("em", Attributes::new());
        tree.append_child(doc, em).unwrap();
        tree.insert_text(doc, "three").unwrap();

        let children = tree.children(doc);
        assert_eq!(children.len(), 3);
        assert_eq!(tree.get(children[0]).unwrap().as_text(), Some("one two"));
        assert_eq!(tree.get(children[2]).unwrap().as_text(), Some("three"));
    }

    #[test]
    fn test_text_node_cannot_have_children() {
        let mut tree = DomTree::new();
        let text = tree.create_text("x");
        let span = tree.create_element("span", Attributes::new());
        assert_eq!(tree.append_child(text, span), Err(DomError::InvalidNodeType));
    }

    #[test]
    fn test_move_children() {
        let mut tree = DomTree::new();
        let doc = tree.document_id();
        let from = tree.create_element("p", Attributes::new());
        let to = tree.create_element("b", Attributes::new());
        tree.append_child(doc, from).unwrap();
        tree.insert_text(from, "2").unwrap();
        let i = tree.create_element("i", Attributes::new());
        tree.append_child(from, i).unwrap();

        tree.move_children(from, to).unwrap();
        tree.append_child(from, to).unwrap();

        assert_eq!(tree.pretty_print(), "<p>\n  <b>\n    \"2\"\n    <i>\n");
    }

    #[test]
    fn test_pretty_print_attributes() {
        let mut tree = DomTree::new();
        let doc = tree.document_id();
        let mut attributes = Attributes::new();
        attributes.push(("type".to_string(), AttributeValue::from("checkbox")));
        attributes.push(("checked".to_string(), AttributeValue::True));
        let input = tree.create_element("input", attributes);
        tree.append_child(doc, input).unwrap();

        assert_eq!(tree.pretty_print(), "<input type=\"checkbox\" checked>\n");
    }
}
