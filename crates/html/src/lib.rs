//! Scalpel HTML
//!
//! Linear tag scanner with in-place editing, and an HTML5 tree builder
//! for the "in body" insertion rules.

mod attributes;
mod entities;
mod error;
mod query;
mod quirks;
mod span;
mod stack;
mod tag_name;
mod tag_processor;
mod token;
mod tree_builder;

pub use attributes::{AttributeName, AttributeToken};
pub use entities::{decode_entity, decode_html, decode_numeric, escape_attribute};
pub use error::{HtmlError, HtmlResult};
pub use query::{TagClosers, TagQuery};
pub use quirks::DoctypeInfo;
pub use span::{Span, TextReplacement};
pub use stack::FormattingEntry;
pub use tag_name::TagName;
pub use tag_processor::{
    AttributeUpdate, ProcessorConfig, SkippedContent, TagProcessor, MAX_BOOKMARKS, MAX_SEEK_OPS,
};
pub use token::{TagToken, Token};
pub use tree_builder::{HtmlParser, ParseError, ParseErrorKind};

pub use scalpel_dom::{AttributeValue, Attributes, CompatMode, DomTree};
