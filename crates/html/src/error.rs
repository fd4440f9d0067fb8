//! HTML processing error types

use scalpel_dom::DomError;
use thiserror::Error;

/// HTML processing result type
pub type HtmlResult<T> = Result<T, HtmlError>;

/// Hard failures of the scanner and the tree builder.
///
/// Malformed markup is never an error; these cover resource limits, misuse of
/// the editing API and constructs the tree builder does not implement.
#[derive(Debug, Error)]
pub enum HtmlError {
    #[error("Too many bookmarks: cannot hold more than {0}")]
    TooManyBookmarks(usize),

    #[error("Too many calls to seek: limit of {0} reached")]
    SeekLimitExceeded(usize),

    #[error("Unknown bookmark: {0}")]
    UnknownBookmark(String),

    #[error("Invalid attribute name: {0:?}")]
    InvalidAttributeName(String),

    #[error("Token equivalence is only defined between tags, got {0}")]
    NotATag(String),

    #[error("Input ended inside a tag or raw text region starting at byte {offset}")]
    IncompleteInput { offset: usize },

    #[error("Unsupported construct {token} (open elements: [{}], active formatting: [{}])",
        .open_elements.join(", "), .active_formatting.join(", "))]
    Unsupported {
        token: String,
        open_elements: Vec<String>,
        active_formatting: Vec<String>,
    },

    #[error(transparent)]
    Dom(#[from] DomError),
}
