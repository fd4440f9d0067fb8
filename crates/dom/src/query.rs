//! Element lookups over the output tree

use crate::node::{ElementData, NodeId};
use crate::tree::DomTree;

/// Trait for querying the tree
pub trait Queryable {
    /// Find the first element whose `id` attribute matches
    fn get_element_by_id(&self, id: &str) -> Option<NodeId>;

    /// Find elements by tag name (case-insensitive)
    fn get_elements_by_tag_name(&self, tag_name: &str) -> Vec<NodeId>;

    /// Find elements carrying a class token
    fn get_elements_by_class_name(&self, class_name: &str) -> Vec<NodeId>;
}

impl DomTree {
    fn elements_matching(&self, predicate: impl Fn(&ElementData) -> bool) -> Vec<NodeId> {
        self.descendants(self.document_id())
            .into_iter()
            .filter(|&node_id| {
                self.get(node_id)
                    .and_then(|node| node.as_element())
                    .is_some_and(&predicate)
            })
            .collect()
    }
}

impl Queryable for DomTree {
    fn get_element_by_id(&self, id: &str) -> Option<NodeId> {
        self.elements_matching(|element| element.id() == Some(id))
            .into_iter()
            .next()
    }

    fn get_elements_by_tag_name(&self, tag_name: &str) -> Vec<NodeId> {
        self.elements_matching(|element| element.tag_name.eq_ignore_ascii_case(tag_name))
    }

    fn get_elements_by_class_name(&self, class_name: &str) -> Vec<NodeId> {
        self.elements_matching(|element| element.has_class(class_name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::{AttributeValue, Attributes};

    #[test]
    fn test_get_element_by_id() {
        let mut tree = DomTree::new();
        let section = tree.create_element("section", Attributes::new());
        let div = tree.create_element("div", Attributes::new());

        tree.get_mut(div)
            .unwrap()
            .as_element_mut()
            .unwrap()
            .set_attribute("id", AttributeValue::from("test"));

        tree.append_child(tree.document_id(), section).unwrap();
        tree.append_child(section, div).unwrap();

        assert_eq!(tree.get_element_by_id("test"), Some(div));
        assert_eq!(tree.get_element_by_id("nonexistent"), None);
    }

    #[test]
    fn test_detached_nodes_are_not_found() {
        let mut tree = DomTree::new();
        let attached = tree.create_element("li", Attributes::new());
        let _detached = tree.create_element("li", Attributes::new());
        tree.append_child(tree.document_id(), attached).unwrap();

        assert_eq!(tree.get_elements_by_tag_name("LI"), vec![attached]);
    }
}
