//! Attribute tokens and the attribute-level scanning rules

use std::borrow::Borrow;
use std::fmt;

/// Attribute name normalized to ASCII lowercase, used as the lookup key for
/// source attributes and pending edits alike
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AttributeName(String);

impl AttributeName {
    pub fn new(name: &str) -> Self {
        Self(name.to_ascii_lowercase())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for AttributeName {
    fn from(name: &str) -> Self {
        AttributeName::new(name)
    }
}

impl Borrow<str> for AttributeName {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AttributeName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One parsed attribute of the current tag.
///
/// `start..end` covers the whole attribute including its value and quotes;
/// `value_start..value_start + value_length` is the raw, undecoded value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttributeToken {
    pub name: String,
    pub value_start: usize,
    pub value_length: usize,
    pub start: usize,
    pub end: usize,
    pub is_boolean: bool,
}

/// Result of scanning at an attribute position
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum AttributeScan {
    Attribute(AttributeToken),
    /// No attribute here; the tag's `>` sits at this offset
    TagEnd(usize),
    /// Input ended before the tag did
    Incomplete,
}

pub(crate) fn is_html_whitespace(b: u8) -> bool {
    matches!(b, b' ' | b'\t' | b'\x0c' | b'\r' | b'\n')
}

/// Scan one attribute starting at `at`, skipping whitespace and stray `/`.
///
/// A leading `=` belongs to the name. Values are double-quoted,
/// single-quoted or run up to whitespace or `>`.
pub(crate) fn scan_attribute(html: &[u8], mut at: usize) -> AttributeScan {
    let len = html.len();
    while at < len && (is_html_whitespace(html[at]) || html[at] == b'/') {
        at += 1;
    }
    if at >= len {
        return AttributeScan::Incomplete;
    }

    let name_start = at;
    let leading_equals = usize::from(html[at] == b'=');
    let name_length = leading_equals
        + span_until(html, at + leading_equals, |b| {
            b == b'=' || b == b'/' || b == b'>' || is_html_whitespace(b)
        });
    if name_length == 0 {
        return AttributeScan::TagEnd(at);
    }

    at += name_length;
    if at >= len {
        return AttributeScan::Incomplete;
    }
    at += span_while(html, at, is_html_whitespace);
    if at >= len {
        return AttributeScan::Incomplete;
    }

    let name = String::from_utf8_lossy(&html[name_start..name_start + name_length]).into_owned();
    if html[at] != b'=' {
        return AttributeScan::Attribute(AttributeToken {
            name,
            value_start: name_start + name_length,
            value_length: 0,
            start: name_start,
            end: name_start + name_length,
            is_boolean: true,
        });
    }

    at += 1;
    at += span_while(html, at, is_html_whitespace);
    if at >= len {
        return AttributeScan::Incomplete;
    }

    let (value_start, value_length, attribute_end) = match html[at] {
        quote @ (b'"' | b'\'') => {
            let value_start = at + 1;
            match find_byte(html, quote, value_start) {
                Some(closing) => (value_start, closing - value_start, closing + 1),
                None => return AttributeScan::Incomplete,
            }
        }
        _ => {
            let value_length = span_until(html, at, |b| b == b'>' || is_html_whitespace(b));
            (at, value_length, at + value_length)
        }
    };
    if attribute_end >= len {
        return AttributeScan::Incomplete;
    }

    AttributeScan::Attribute(AttributeToken {
        name,
        value_start,
        value_length,
        start: name_start,
        end: attribute_end,
        is_boolean: false,
    })
}

/// Skip the attributes of a tag whose name ends at `at`, returning the offset
/// just past its `>`
pub(crate) fn skip_to_tag_end(html: &[u8], mut at: usize) -> Option<usize> {
    loop {
        match scan_attribute(html, at) {
            AttributeScan::Attribute(attribute) => at = attribute.end,
            AttributeScan::TagEnd(end) => return Some(end + 1),
            AttributeScan::Incomplete => return None,
        }
    }
}

/// Whether `name` may be written by the editing API.
///
/// Stricter than the HTML grammar: syntax characters, controls and Unicode
/// noncharacters are all refused.
pub(crate) fn is_valid_attribute_name(name: &str) -> bool {
    !name.is_empty()
        && !name.chars().any(|c| {
            matches!(c, '"' | '\'' | '>' | '&' | '<' | '/' | ' ' | '=')
                || c.is_ascii_control()
                || is_noncharacter(c)
        })
}

fn is_noncharacter(c: char) -> bool {
    let code = c as u32;
    (0xFDD0..=0xFDEF).contains(&code) || (code & 0xFFFE) == 0xFFFE
}

pub(crate) fn span_while(html: &[u8], at: usize, accept: impl Fn(u8) -> bool) -> usize {
    html.get(at..)
        .map_or(0, |rest| rest.iter().take_while(|&&b| accept(b)).count())
}

pub(crate) fn span_until(html: &[u8], at: usize, stop: impl Fn(u8) -> bool) -> usize {
    span_while(html, at, |b| !stop(b))
}

pub(crate) fn find_byte(html: &[u8], needle: u8, from: usize) -> Option<usize> {
    html.get(from..)?
        .iter()
        .position(|&b| b == needle)
        .map(|offset| from + offset)
}

pub(crate) fn find_bytes(html: &[u8], needle: &[u8], from: usize) -> Option<usize> {
    html.get(from..)?
        .windows(needle.len())
        .position(|window| window == needle)
        .map(|offset| from + offset)
}

pub(crate) fn starts_with_ignore_case(html: &[u8], at: usize, prefix: &[u8]) -> bool {
    html.get(at..at + prefix.len())
        .is_some_and(|candidate| candidate.eq_ignore_ascii_case(prefix))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn attribute(html: &str, at: usize) -> AttributeToken {
        match scan_attribute(html.as_bytes(), at) {
            AttributeScan::Attribute(token) => token,
            other => panic!("expected an attribute, got {other:?}"),
        }
    }

    #[test]
    fn test_quoted_and_unquoted_values() {
        let html = r#"<a href="/x y" title='t' data-n=5>"#;
        let href = attribute(html, 2);
        assert_eq!(href.name, "href");
        assert_eq!(&html[href.value_start..href.value_start + href.value_length], "/x y");
        assert_eq!(&html[href.start..href.end], r#"href="/x y""#);

        let title = attribute(html, href.end);
        assert_eq!(&html[title.value_start..title.value_start + title.value_length], "t");

        let data = attribute(html, title.end);
        assert_eq!(data.name, "data-n");
        assert_eq!(&html[data.start..data.end], "data-n=5");
        assert_eq!(scan_attribute(html.as_bytes(), data.end), AttributeScan::TagEnd(html.len() - 1));
    }

    #[test]
    fn test_boolean_and_spaced_equals() {
        let html = "<input disabled value = 'on' >";
        let disabled = attribute(html, 6);
        assert!(disabled.is_boolean);
        assert_eq!(&html[disabled.start..disabled.end], "disabled");

        let value = attribute(html, disabled.end);
        assert!(!value.is_boolean);
        assert_eq!(&html[value.start..value.end], "value = 'on'");
    }

    #[test]
    fn test_leading_equals_is_part_of_the_name() {
        let html = "<div =foo=bar>";
        let token = attribute(html, 4);
        assert_eq!(token.name, "=foo");
        assert_eq!(&html[token.value_start..token.value_start + token.value_length], "bar");
    }

    #[test]
    fn test_incomplete_attributes() {
        assert_eq!(scan_attribute(b"<div class=\"open", 4), AttributeScan::Incomplete);
        assert_eq!(scan_attribute(b"<div hidden", 4), AttributeScan::Incomplete);
        assert_eq!(scan_attribute(b"<div ", 4), AttributeScan::Incomplete);
    }

    #[test]
    fn test_skip_to_tag_end() {
        let html = br#"</script foo="a>b" >rest"#;
        assert_eq!(skip_to_tag_end(html, 8), Some(20));
        assert_eq!(skip_to_tag_end(b"</title", 7), None);
    }

    #[test]
    fn test_attribute_name_validation() {
        assert!(is_valid_attribute_name("data-wp-bind"));
        assert!(is_valid_attribute_name("ünïcode"));
        for bad in ["", "a b", "a=b", "a\"", "a'", "a>", "a&b", "a<", "a/b", "a\u{7}", "a\u{FDD0}", "a\u{FFFF}", "a\u{1FFFE}"] {
            assert!(!is_valid_attribute_name(bad), "{bad:?} should be rejected");
        }
    }

    #[test]
    fn test_byte_helpers() {
        assert_eq!(find_bytes(b"abc</def", b"</", 0), Some(3));
        assert_eq!(find_bytes(b"abc", b"</", 5), None);
        assert!(starts_with_ignore_case(b"</TiTlE>", 2, b"title"));
        assert!(!starts_with_ignore_case(b"</tit", 2, b"title"));
    }
}
