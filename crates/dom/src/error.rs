//! DOM error types

use thiserror::Error;

/// DOM operation result type
pub type DomResult<T> = Result<T, DomError>;

/// DOM errors
#[derive(Debug, Error, PartialEq, Eq)]
pub enum DomError {
    #[error("Node not found: {0}")]
    NodeNotFound(u32),

    #[error("Appending node {child} under {parent} would create a cycle")]
    HierarchyCycle { parent: u32, child: u32 },

    #[error("Invalid node type for operation")]
    InvalidNodeType,
}
