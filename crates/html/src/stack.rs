//! Stack of open elements and list of active formatting elements

use scalpel_dom::NodeId;

use crate::error::HtmlResult;
use crate::tag_name::TagName;
use crate::token::Token;

/// Entries equivalent to a new formatting element that may stay in the list
const NOAHS_ARK_LIMIT: usize = 3;

/// Entry in the stack of open elements
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct OpenElement {
    pub(crate) node: NodeId,
    pub(crate) tag: TagName,
}

/// Scope flavors used by end-tag handling
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Scope {
    Default,
    Button,
    ListItem,
    Table,
    /// Every element except OPTGROUP and OPTION is a boundary
    Select,
}

/// What a scope probe is looking for
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) enum ScopeTarget<'a> {
    Tag(&'a TagName),
    Node(NodeId),
    /// Any of H1 to H6
    Heading,
}

impl ScopeTarget<'_> {
    fn matches(&self, entry: &OpenElement) -> bool {
        match self {
            ScopeTarget::Tag(tag) => entry.tag == **tag,
            ScopeTarget::Node(node) => entry.node == *node,
            ScopeTarget::Heading => entry.tag.is_heading(),
        }
    }
}

fn is_scope_boundary(tag: &TagName, scope: Scope) -> bool {
    use TagName::*;
    match scope {
        Scope::Default => matches!(
            tag,
            Applet | Caption | Html | Table | Td | Th | Marquee | Object | Template
        ),
        Scope::Button => is_scope_boundary(tag, Scope::Default) || *tag == Button,
        Scope::ListItem => is_scope_boundary(tag, Scope::Default) || matches!(tag, Ol | Ul),
        Scope::Table => matches!(tag, Html | Table | Template),
        Scope::Select => !matches!(tag, Optgroup | Option),
    }
}

/// Stack of open elements. Entry 0 is the document root, which stands in
/// for HTML and is never popped.
#[derive(Debug, Clone)]
pub(crate) struct OpenElements {
    items: Vec<OpenElement>,
}

impl OpenElements {
    pub(crate) fn new(root: NodeId) -> Self {
        Self {
            items: vec![OpenElement {
                node: root,
                tag: TagName::Html,
            }],
        }
    }

    pub(crate) fn push(&mut self, node: NodeId, tag: TagName) {
        self.items.push(OpenElement { node, tag });
    }

    /// Pop the current node; the root stays
    pub(crate) fn pop(&mut self) -> Option<OpenElement> {
        if self.items.len() > 1 {
            self.items.pop()
        } else {
            None
        }
    }

    pub(crate) fn current(&self) -> &OpenElement {
        // The root is never popped
        &self.items[self.items.len() - 1]
    }

    pub(crate) fn current_node(&self) -> NodeId {
        self.current().node
    }

    pub(crate) fn current_tag(&self) -> &TagName {
        &self.current().tag
    }

    pub(crate) fn len(&self) -> usize {
        self.items.len()
    }

    pub(crate) fn get(&self, index: usize) -> Option<&OpenElement> {
        self.items.get(index)
    }

    pub(crate) fn iter(&self) -> impl DoubleEndedIterator<Item = &OpenElement> {
        self.items.iter()
    }

    pub(crate) fn position_of(&self, node: NodeId) -> Option<usize> {
        self.items.iter().rposition(|entry| entry.node == node)
    }

    pub(crate) fn contains_node(&self, node: NodeId) -> bool {
        self.position_of(node).is_some()
    }

    pub(crate) fn remove_node(&mut self, node: NodeId) -> bool {
        match self.position_of(node) {
            Some(index) if index > 0 => {
                self.items.remove(index);
                true
            }
            _ => false,
        }
    }

    pub(crate) fn insert(&mut self, index: usize, node: NodeId, tag: TagName) {
        self.items.insert(index.max(1), OpenElement { node, tag });
    }

    pub(crate) fn replace_node(&mut self, index: usize, node: NodeId) {
        if let Some(entry) = self.items.get_mut(index) {
            entry.node = node;
        }
    }

    /// Pop entries until one named `tag` has been popped
    pub(crate) fn pop_until_tag(&mut self, tag: &TagName) {
        while let Some(entry) = self.pop() {
            if entry.tag == *tag {
                break;
            }
        }
    }

    /// Pop entries until `node` has been popped
    pub(crate) fn pop_until_node(&mut self, node: NodeId) {
        while let Some(entry) = self.pop() {
            if entry.node == node {
                break;
            }
        }
    }

    pub(crate) fn pop_until_heading(&mut self) {
        while let Some(entry) = self.pop() {
            if entry.tag.is_heading() {
                break;
            }
        }
    }

    /// Walk from the current node down; a match found before any boundary
    /// of `scope` is in scope
    pub(crate) fn has_element_in_specific_scope(&self, target: ScopeTarget<'_>, scope: Scope) -> bool {
        for entry in self.items.iter().rev() {
            if target.matches(entry) {
                return true;
            }
            if is_scope_boundary(&entry.tag, scope) {
                return false;
            }
        }
        false
    }

    pub(crate) fn has_in_scope(&self, tag: &TagName) -> bool {
        self.has_element_in_specific_scope(ScopeTarget::Tag(tag), Scope::Default)
    }

    pub(crate) fn has_in_button_scope(&self, tag: &TagName) -> bool {
        self.has_element_in_specific_scope(ScopeTarget::Tag(tag), Scope::Button)
    }

    pub(crate) fn has_in_list_item_scope(&self, tag: &TagName) -> bool {
        self.has_element_in_specific_scope(ScopeTarget::Tag(tag), Scope::ListItem)
    }

    pub(crate) fn has_in_table_scope(&self, tag: &TagName) -> bool {
        self.has_element_in_specific_scope(ScopeTarget::Tag(tag), Scope::Table)
    }

    pub(crate) fn has_in_select_scope(&self, tag: &TagName) -> bool {
        self.has_element_in_specific_scope(ScopeTarget::Tag(tag), Scope::Select)
    }

    /// Lowercased tag names from the root up, for diagnostics
    pub(crate) fn names(&self) -> Vec<String> {
        self.items.iter().map(|entry| entry.tag.to_lowercase()).collect()
    }
}

/// Entry of the active formatting list; markers carry no node
#[derive(Debug, Clone, PartialEq)]
pub struct FormattingEntry {
    pub token: Token,
    pub node: Option<NodeId>,
}

impl FormattingEntry {
    pub fn marker() -> Self {
        Self {
            token: Token::marker(),
            node: None,
        }
    }

    pub fn element(token: Token, node: NodeId) -> Self {
        Self {
            token,
            node: Some(node),
        }
    }

    pub fn is_marker(&self) -> bool {
        self.token.is_marker()
    }
}

#[derive(Debug, Clone, Default)]
pub(crate) struct ActiveFormattingElements {
    entries: Vec<FormattingEntry>,
}

impl ActiveFormattingElements {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Push a formatting element, first evicting the earliest equivalent
    /// entry after the last marker when three are already present
    pub(crate) fn push(&mut self, token: Token, node: NodeId) -> HtmlResult<()> {
        let mut equivalent = Vec::new();
        for (index, entry) in self.entries.iter().enumerate().rev() {
            if entry.is_marker() {
                break;
            }
            if entry.token.equivalent(&token)? {
                equivalent.push(index);
            }
        }
        if equivalent.len() >= NOAHS_ARK_LIMIT {
            if let Some(&earliest) = equivalent.last() {
                self.entries.remove(earliest);
            }
        }
        self.entries.push(FormattingEntry::element(token, node));
        Ok(())
    }

    pub(crate) fn push_marker(&mut self) {
        self.entries.push(FormattingEntry::marker());
    }

    /// Remove entries up to and including the last marker
    pub(crate) fn clear_to_last_marker(&mut self) {
        while let Some(entry) = self.entries.pop() {
            if entry.is_marker() {
                break;
            }
        }
    }

    /// Index of the last element named `tag` after the last marker
    pub(crate) fn last_element_after_marker(&self, tag: &TagName) -> Option<usize> {
        for (index, entry) in self.entries.iter().enumerate().rev() {
            if entry.is_marker() {
                return None;
            }
            if entry.token.tag_name() == Some(tag) {
                return Some(index);
            }
        }
        None
    }

    pub(crate) fn position_of(&self, node: NodeId) -> Option<usize> {
        self.entries.iter().rposition(|entry| entry.node == Some(node))
    }

    pub(crate) fn contains_node(&self, node: NodeId) -> bool {
        self.position_of(node).is_some()
    }

    pub(crate) fn remove_node(&mut self, node: NodeId) -> bool {
        match self.position_of(node) {
            Some(index) => {
                self.entries.remove(index);
                true
            }
            None => false,
        }
    }

    pub(crate) fn insert(&mut self, index: usize, entry: FormattingEntry) {
        let index = index.min(self.entries.len());
        self.entries.insert(index, entry);
    }

    pub(crate) fn set_node(&mut self, index: usize, node: NodeId) {
        if let Some(entry) = self.entries.get_mut(index) {
            entry.node = Some(node);
        }
    }

    pub(crate) fn get(&self, index: usize) -> Option<&FormattingEntry> {
        self.entries.get(index)
    }

    pub(crate) fn last(&self) -> Option<&FormattingEntry> {
        self.entries.last()
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }

    pub(crate) fn names(&self) -> Vec<String> {
        self.entries.iter().map(|entry| entry.token.to_string()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use scalpel_dom::{AttributeValue, Attributes};
    use smallvec::smallvec;

    fn open(tags: &[TagName]) -> OpenElements {
        let mut stack = OpenElements::new(NodeId(0));
        for (i, tag) in tags.iter().enumerate() {
            stack.push(NodeId(i as u32 + 1), tag.clone());
        }
        stack
    }

    fn tag(name: TagName) -> Token {
        Token::tag(name, Attributes::new(), true, None)
    }

    #[test]
    fn test_root_is_never_popped() {
        let mut stack = open(&[TagName::Div]);
        assert!(stack.pop().is_some());
        assert!(stack.pop().is_none());
        assert_eq!(stack.len(), 1);
        assert_eq!(*stack.current_tag(), TagName::Html);

        stack.pop_until_tag(&TagName::P);
        assert_eq!(stack.current_node(), NodeId(0));
        assert!(!stack.remove_node(NodeId(0)));
    }

    #[test]
    fn test_default_scope() {
        let mut stack = open(&[TagName::P, TagName::B]);
        assert!(stack.has_in_scope(&TagName::P));
        stack.push(NodeId(10), TagName::Table);
        assert!(!stack.has_in_scope(&TagName::P));
        // The target wins over the boundary it is
        assert!(stack.has_in_scope(&TagName::Table));
        assert!(stack.has_in_table_scope(&TagName::Table));
    }

    #[test]
    fn test_button_and_list_item_scope() {
        let stack = open(&[TagName::P, TagName::Button]);
        assert!(stack.has_in_scope(&TagName::P));
        assert!(!stack.has_in_button_scope(&TagName::P));

        let stack = open(&[TagName::Li, TagName::Ul]);
        assert!(stack.has_in_scope(&TagName::Li));
        assert!(!stack.has_in_list_item_scope(&TagName::Li));
    }

    #[test]
    fn test_table_and_select_scope() {
        let stack = open(&[TagName::Div, TagName::Td, TagName::P]);
        assert!(stack.has_in_table_scope(&TagName::Div));
        assert!(!stack.has_in_scope(&TagName::Div));

        let stack = open(&[TagName::Select, TagName::Optgroup, TagName::Option]);
        assert!(stack.has_in_select_scope(&TagName::Select));
        let stack = open(&[TagName::Select, TagName::Div]);
        assert!(!stack.has_in_select_scope(&TagName::Select));
    }

    #[test]
    fn test_node_and_heading_targets() {
        let stack = open(&[TagName::H2, TagName::B]);
        assert!(stack.has_element_in_specific_scope(ScopeTarget::Heading, Scope::Default));
        assert!(stack.has_element_in_specific_scope(ScopeTarget::Node(NodeId(2)), Scope::Default));
        assert!(!stack.has_element_in_specific_scope(ScopeTarget::Node(NodeId(9)), Scope::Default));
    }

    #[test]
    fn test_pop_until() {
        let mut stack = open(&[TagName::Div, TagName::H3, TagName::B, TagName::I]);
        stack.pop_until_heading();
        assert_eq!(*stack.current_tag(), TagName::Div);
        stack.push(NodeId(7), TagName::from_name("span"));
        stack.pop_until_node(NodeId(1));
        assert_eq!(stack.current_node(), NodeId(0));
    }

    #[test]
    fn test_noahs_ark_keeps_three() {
        let mut list = ActiveFormattingElements::new();
        for id in 1..=5 {
            list.push(tag(TagName::B), NodeId(id)).unwrap();
        }
        assert_eq!(list.len(), 3);
        assert_eq!(list.get(0).and_then(|entry| entry.node), Some(NodeId(3)));
        assert_eq!(list.last().and_then(|entry| entry.node), Some(NodeId(5)));
    }

    #[test]
    fn test_noahs_ark_respects_attributes_and_markers() {
        let mut list = ActiveFormattingElements::new();
        list.push(tag(TagName::B), NodeId(1)).unwrap();
        list.push(tag(TagName::B), NodeId(2)).unwrap();
        list.push(tag(TagName::B), NodeId(3)).unwrap();
        list.push_marker();
        list.push(tag(TagName::B), NodeId(4)).unwrap();
        assert_eq!(list.len(), 5);

        let classy = Token::tag(
            TagName::B,
            smallvec![("class".to_string(), AttributeValue::from("x"))],
            true,
            None,
        );
        list.push(classy, NodeId(5)).unwrap();
        list.push(tag(TagName::B), NodeId(6)).unwrap();
        list.push(tag(TagName::B), NodeId(7)).unwrap();
        assert_eq!(list.len(), 8);
        assert!(list.contains_node(NodeId(4)));
    }

    #[test]
    fn test_markers_bound_lookups() {
        let mut list = ActiveFormattingElements::new();
        list.push(tag(TagName::A), NodeId(1)).unwrap();
        list.push_marker();
        list.push(tag(TagName::I), NodeId(2)).unwrap();
        assert_eq!(list.last_element_after_marker(&TagName::I), Some(2));
        assert_eq!(list.last_element_after_marker(&TagName::A), None);

        list.clear_to_last_marker();
        assert_eq!(list.len(), 1);
        assert_eq!(list.last_element_after_marker(&TagName::A), Some(0));
        assert!(list.remove_node(NodeId(1)));
        assert_eq!(list.len(), 0);
    }
}
