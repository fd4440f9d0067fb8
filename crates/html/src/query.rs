//! Tag matching queries for [`TagProcessor::next_tag`](crate::TagProcessor::next_tag)

/// Whether closing tags take part in matching
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TagClosers {
    Visit,
    #[default]
    Skip,
}

/// Criteria for the next tag to stop at
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TagQuery {
    /// Tag name, compared ignoring ASCII case
    pub tag_name: Option<String>,
    /// A class token the opener must carry
    pub class_name: Option<String>,
    /// Stop at the Nth match, starting from 1
    pub match_offset: usize,
    pub tag_closers: TagClosers,
}

impl Default for TagQuery {
    fn default() -> Self {
        Self {
            tag_name: None,
            class_name: None,
            match_offset: 1,
            tag_closers: TagClosers::Skip,
        }
    }
}

impl TagQuery {
    /// Match any opener
    pub fn any() -> Self {
        Self::default()
    }

    /// Match openers with the given name
    pub fn tag(name: impl Into<String>) -> Self {
        Self {
            tag_name: Some(name.into()),
            ..Self::default()
        }
    }

    pub fn with_class(mut self, class_name: impl Into<String>) -> Self {
        self.class_name = Some(class_name.into());
        self
    }

    pub fn nth(mut self, match_offset: usize) -> Self {
        self.match_offset = match_offset;
        self
    }

    pub fn visit_closers(mut self) -> Self {
        self.tag_closers = TagClosers::Visit;
        self
    }
}

impl From<&str> for TagQuery {
    fn from(name: &str) -> Self {
        TagQuery::tag(name)
    }
}
