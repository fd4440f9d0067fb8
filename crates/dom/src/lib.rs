//! Scalpel DOM - output tree
//!
//! Arena-backed tree produced by the tree-construction engine. Nodes are
//! addressed by [`NodeId`]; a parent owns its children and children point
//! back at their parent by id only.

mod node;
mod tree;
mod error;
mod query;

pub use node::{AttributeValue, Attributes, CompatMode, ElementData, Node, NodeId, NodeType};
pub use tree::DomTree;
pub use error::{DomError, DomResult};
pub use query::Queryable;
