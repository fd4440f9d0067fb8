//! Tokens handed from the tag scanner to the tree builder

use std::fmt;

use scalpel_dom::{AttributeValue, Attributes};

use crate::error::{HtmlError, HtmlResult};
use crate::tag_name::TagName;

/// A tag as seen by the tree builder
#[derive(Debug, Clone, PartialEq)]
pub struct TagToken {
    pub name: TagName,
    /// Lowercased names with decoded values, first occurrence only
    pub attributes: Attributes,
    pub is_opener: bool,
    /// Scanner bookmark of the source tag. `HtmlParser` leaves this empty;
    /// it is carried for callers that build tokens by hand.
    pub bookmark: Option<String>,
}

impl TagToken {
    pub fn attribute(&self, name: &str) -> Option<&AttributeValue> {
        self.attributes
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value)
    }
}

/// Unit of work for the tree builder
#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    /// Scope boundary in the active formatting list
    Marker,
    Tag(TagToken),
    Text(String),
}

impl Token {
    pub fn tag(
        name: impl Into<TagName>,
        attributes: Attributes,
        is_opener: bool,
        bookmark: Option<String>,
    ) -> Self {
        Token::Tag(TagToken {
            name: name.into(),
            attributes,
            is_opener,
            bookmark,
        })
    }

    pub fn text(value: impl Into<String>) -> Self {
        Token::Text(value.into())
    }

    pub fn marker() -> Self {
        Token::Marker
    }

    pub fn is_marker(&self) -> bool {
        matches!(self, Token::Marker)
    }

    pub fn as_tag(&self) -> Option<&TagToken> {
        match self {
            Token::Tag(tag) => Some(tag),
            _ => None,
        }
    }

    pub fn tag_name(&self) -> Option<&TagName> {
        self.as_tag().map(|tag| &tag.name)
    }

    /// Whether two tags count as the same formatting element: same name,
    /// same kind, and the same attributes in any order
    pub fn equivalent(&self, other: &Token) -> HtmlResult<bool> {
        let (Token::Tag(this), Token::Tag(that)) = (self, other) else {
            let culprit = if self.as_tag().is_none() { self } else { other };
            return Err(HtmlError::NotATag(culprit.to_string()));
        };
        if this.is_opener != that.is_opener
            || this.name != that.name
            || this.attributes.len() != that.attributes.len()
        {
            return Ok(false);
        }
        Ok(this
            .attributes
            .iter()
            .all(|(name, value)| that.attribute(name) == Some(value)))
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Token::Marker => f.write_str("#marker"),
            Token::Text(_) => f.write_str("#text"),
            Token::Tag(tag) if tag.is_opener => write!(f, "<{}>", tag.name.to_lowercase()),
            Token::Tag(tag) => write!(f, "</{}>", tag.name.to_lowercase()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use smallvec::smallvec;

    fn b(attributes: Attributes) -> Token {
        Token::tag(TagName::B, attributes, true, None)
    }

    #[test]
    fn test_equivalent_ignores_attribute_order() {
        let first = b(smallvec![
            ("class".to_string(), AttributeValue::from("x")),
            ("hidden".to_string(), AttributeValue::True),
        ]);
        let second = b(smallvec![
            ("hidden".to_string(), AttributeValue::True),
            ("class".to_string(), AttributeValue::from("x")),
        ]);
        assert!(first.equivalent(&second).unwrap());
    }

    #[test]
    fn test_not_equivalent() {
        let plain = b(Attributes::new());
        let classy = b(smallvec![("class".to_string(), AttributeValue::from("x"))]);
        let closer = Token::tag(TagName::B, Attributes::new(), false, None);
        let italic = Token::tag(TagName::I, Attributes::new(), true, None);
        assert!(!plain.equivalent(&classy).unwrap());
        assert!(!plain.equivalent(&closer).unwrap());
        assert!(!plain.equivalent(&italic).unwrap());

        let other_value = b(smallvec![("class".to_string(), AttributeValue::from("y"))]);
        assert!(!classy.equivalent(&other_value).unwrap());
    }

    #[test]
    fn test_equivalent_rejects_non_tags() {
        let tag = b(Attributes::new());
        assert!(matches!(tag.equivalent(&Token::marker()), Err(HtmlError::NotATag(t)) if t == "#marker"));
        assert!(matches!(Token::text("x").equivalent(&tag), Err(HtmlError::NotATag(t)) if t == "#text"));
    }

    #[test]
    fn test_bookmark_is_carried_not_compared() {
        let marked = Token::tag(TagName::B, Attributes::new(), true, Some("first-b".to_string()));
        assert_eq!(marked.as_tag().and_then(|tag| tag.bookmark.as_deref()), Some("first-b"));
        assert!(marked.equivalent(&b(Attributes::new())).unwrap());
    }

    #[test]
    fn test_display() {
        assert_eq!(b(Attributes::new()).to_string(), "<b>");
        assert_eq!(Token::tag("my-el", Attributes::new(), false, None).to_string(), "</my-el>");
        assert_eq!(Token::marker().to_string(), "#marker");
    }
}
