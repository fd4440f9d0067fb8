//! Lexical tag scanner
//!
//! Walks an HTML string tag by tag without building a tree. Attribute and
//! class edits are queued against the current tag and spliced into the
//! buffer only when [`TagProcessor::get_updated_html`] or
//! [`TagProcessor::seek`] flushes them; bookmarks follow every flushed edit.

use log::{debug, trace, warn};
use rustc_hash::FxHashMap;
use smallvec::SmallVec;

use scalpel_dom::{AttributeValue, Attributes};

use crate::attributes::{
    find_byte, find_bytes, is_html_whitespace, is_valid_attribute_name, scan_attribute,
    skip_to_tag_end, span_until, span_while, starts_with_ignore_case, AttributeName,
    AttributeScan, AttributeToken,
};
use crate::entities::{decode_html, escape_attribute};
use crate::error::{HtmlError, HtmlResult};
use crate::query::{TagClosers, TagQuery};
use crate::span::{apply_replacements, shift_offset, Span, TextReplacement};
use crate::tag_name::TagName;

/// Default number of bookmarks a processor may hold at once
pub const MAX_BOOKMARKS: usize = 10;

/// Default number of `seek` calls allowed over a processor's lifetime
pub const MAX_SEEK_OPS: usize = 1000;

/// Limits and misuse policy of a [`TagProcessor`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessorConfig {
    /// Report misuse (unknown bookmarks, invalid attribute names) as errors
    /// instead of logging a warning and returning `false`
    pub strict: bool,
    pub max_bookmarks: usize,
    pub max_seek_ops: usize,
}

impl Default for ProcessorConfig {
    fn default() -> Self {
        Self {
            strict: false,
            max_bookmarks: MAX_BOOKMARKS,
            max_seek_ops: MAX_SEEK_OPS,
        }
    }
}

impl ProcessorConfig {
    pub fn strict() -> Self {
        Self {
            strict: true,
            ..Self::default()
        }
    }
}

/// New value for an attribute; `Boolean(false)` removes it
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttributeUpdate {
    Value(String),
    Boolean(bool),
}

impl From<&str> for AttributeUpdate {
    fn from(value: &str) -> Self {
        AttributeUpdate::Value(value.to_string())
    }
}

impl From<String> for AttributeUpdate {
    fn from(value: String) -> Self {
        AttributeUpdate::Value(value)
    }
}

impl From<bool> for AttributeUpdate {
    fn from(value: bool) -> Self {
        AttributeUpdate::Boolean(value)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ParserState {
    Ready,
    MatchedTag,
    Complete,
    IncompleteInput,
}

/// Where the current tag sits in the buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct TagLocation {
    token_starts_at: usize,
    name_starts_at: usize,
    name_length: usize,
    /// One past the closing `>`
    ends_at: usize,
    is_closer: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct TagOpening {
    token_starts_at: usize,
    name_starts_at: usize,
    name_length: usize,
    is_closer: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ClassOperation {
    Add,
    Remove,
}

/// Identity of a queued edit; a new edit with the same key replaces the old
#[derive(Debug, Clone, PartialEq, Eq)]
enum UpdateKey {
    Attribute(AttributeName),
    Duplicate(AttributeName, usize),
    /// Edit of an earlier tag, no longer addressable
    Settled,
}

#[derive(Debug, Clone)]
struct LexicalUpdate {
    key: UpdateKey,
    replacement: TextReplacement,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ScriptState {
    Unescaped,
    Escaped,
    DoubleEscaped,
}

/// Content the scanner passes over between two tags
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkippedContent<'a> {
    Text(String),
    /// Source of a DOCTYPE, `<!` through `>`
    Doctype(&'a str),
}

/// Pull-based scanner over one HTML document
#[derive(Debug)]
pub struct TagProcessor {
    html: String,
    config: ProcessorConfig,
    state: ParserState,
    bytes_already_parsed: usize,
    current: Option<TagLocation>,
    attributes: Vec<(AttributeName, AttributeToken)>,
    duplicate_attributes: FxHashMap<AttributeName, SmallVec<[Span; 1]>>,
    text_segments: SmallVec<[Span; 2]>,
    raw_text: Option<Span>,
    doctypes: SmallVec<[Span; 1]>,
    incomplete_at: Option<usize>,
    classname_updates: Vec<(String, ClassOperation)>,
    lexical_updates: Vec<LexicalUpdate>,
    bookmarks: FxHashMap<String, Span>,
    seek_count: usize,
}

impl TagProcessor {
    /// Create a lenient processor over `html`
    pub fn new(html: impl Into<String>) -> Self {
        Self::with_config(html, ProcessorConfig::default())
    }

    pub fn with_config(html: impl Into<String>, config: ProcessorConfig) -> Self {
        Self {
            html: html.into(),
            config,
            state: ParserState::Ready,
            bytes_already_parsed: 0,
            current: None,
            attributes: Vec::new(),
            duplicate_attributes: FxHashMap::default(),
            text_segments: SmallVec::new(),
            raw_text: None,
            doctypes: SmallVec::new(),
            incomplete_at: None,
            classname_updates: Vec::new(),
            lexical_updates: Vec::new(),
            bookmarks: FxHashMap::default(),
            seek_count: 0,
        }
    }

    /// Advance to the next tag matching `query`.
    ///
    /// Returns `false` once the input is exhausted, or when it ends inside a
    /// tag or a raw text region (see [`Self::paused_at_incomplete_input`]).
    pub fn next_tag(&mut self, query: impl Into<TagQuery>) -> bool {
        let query = query.into();
        self.after_tag();

        if matches!(self.state, ParserState::Complete | ParserState::IncompleteInput) {
            return false;
        }

        let mut matched = 0;
        loop {
            if !self.parse_next_tag() {
                return false;
            }
            if self.matches(&query) {
                matched += 1;
                if matched >= query.match_offset {
                    if let Some(tag) = self.current {
                        trace!(
                            "matched {}{} at byte {}",
                            if self.is_tag_closer() { "/" } else { "" },
                            self.tag_name_str(),
                            tag.token_starts_at
                        );
                    }
                    return true;
                }
            }
        }
    }

    /// Upper-cased name of the current tag
    pub fn get_tag(&self) -> Option<String> {
        self.tag_name().map(|name| name.as_str().to_string())
    }

    pub fn tag_name(&self) -> Option<TagName> {
        self.current.map(|_| TagName::from_name(self.tag_name_str()))
    }

    /// Whether the current tag is a closer. `</br>` counts as an opener.
    pub fn is_tag_closer(&self) -> bool {
        self.current.is_some_and(|tag| tag.is_closer)
            && !self.tag_name_str().eq_ignore_ascii_case("br")
    }

    /// Whether the current opener's source `class` attribute contains `class_name`
    pub fn has_class(&self, class_name: &str) -> Option<bool> {
        if self.current.is_none() || self.is_tag_closer() {
            return None;
        }
        let classes = match self.source_attribute(&AttributeName::new("class")) {
            Some(AttributeValue::Text(value)) => value,
            _ => return Some(false),
        };
        Some(classes.split_ascii_whitespace().any(|token| token == class_name))
    }

    /// Read an attribute of the current opener, pending edits included
    pub fn get_attribute(&mut self, name: &str) -> Option<AttributeValue> {
        if self.current.is_none() || self.is_tag_closer() {
            return None;
        }
        let comparable = AttributeName::new(name);
        if comparable.as_str() == "class" {
            self.class_name_updates_to_attributes_updates();
        }
        match self.pending_update(&comparable) {
            Some(text) => enqueued_value(text),
            None => self.source_attribute(&comparable),
        }
    }

    /// Lowercased names of the current opener's source attributes starting
    /// with `prefix` (case-insensitive)
    pub fn get_attribute_names_with_prefix(&self, prefix: &str) -> Option<Vec<String>> {
        if self.current.is_none() || self.is_tag_closer() {
            return None;
        }
        let prefix = prefix.to_ascii_lowercase();
        Some(
            self.attributes
                .iter()
                .filter(|(name, _)| name.as_str().starts_with(&prefix))
                .map(|(name, _)| name.as_str().to_string())
                .collect(),
        )
    }

    /// Source attributes of the current opener, decoded, in document order
    pub fn attributes(&self) -> Attributes {
        self.attributes
            .iter()
            .map(|(name, token)| (name.as_str().to_string(), self.token_value(token)))
            .collect()
    }

    /// Queue a new value for an attribute of the current opener
    pub fn set_attribute(&mut self, name: &str, value: impl Into<AttributeUpdate>) -> HtmlResult<bool> {
        if self.current.is_none() || self.is_tag_closer() {
            return Ok(false);
        }
        if !is_valid_attribute_name(name) {
            return self.misuse(HtmlError::InvalidAttributeName(name.to_string()));
        }
        Ok(self.write_attribute(name, value.into()))
    }

    /// Queue removal of an attribute, or cancel a queued one that is not in
    /// the source
    pub fn remove_attribute(&mut self, name: &str) -> bool {
        if self.current.is_none() || self.is_tag_closer() {
            return false;
        }
        let comparable = AttributeName::new(name);
        if comparable.as_str() == "class" {
            self.classname_updates.clear();
        }

        let Some(existing) = self.find_attribute(&comparable).cloned() else {
            let queued = self.lexical_updates.len();
            let key = UpdateKey::Attribute(comparable);
            self.lexical_updates.retain(|update| update.key != key);
            return self.lexical_updates.len() != queued;
        };

        let duplicates = self
            .duplicate_attributes
            .get(&comparable)
            .cloned()
            .unwrap_or_default();
        for span in duplicates {
            self.enqueue(
                UpdateKey::Duplicate(comparable.clone(), span.start),
                TextReplacement::new(span.start, span.end, ""),
            );
        }
        self.enqueue(
            UpdateKey::Attribute(comparable),
            TextReplacement::new(existing.start, existing.end, ""),
        );
        true
    }

    pub fn add_class(&mut self, class_name: &str) -> bool {
        self.enqueue_class(class_name, ClassOperation::Add)
    }

    pub fn remove_class(&mut self, class_name: &str) -> bool {
        self.enqueue_class(class_name, ClassOperation::Remove)
    }

    /// Remember the current tag under `name`
    pub fn set_bookmark(&mut self, name: &str) -> HtmlResult<bool> {
        let Some(tag) = self.current else {
            return Ok(false);
        };
        if !self.bookmarks.contains_key(name) && self.bookmarks.len() >= self.config.max_bookmarks {
            return Err(HtmlError::TooManyBookmarks(self.config.max_bookmarks));
        }
        self.bookmarks
            .insert(name.to_string(), Span::new(tag.token_starts_at, tag.ends_at));
        Ok(true)
    }

    pub fn release_bookmark(&mut self, name: &str) -> bool {
        self.bookmarks.remove(name).is_some()
    }

    /// Current span of a bookmark in the scanned buffer
    pub fn bookmark_span(&self, name: &str) -> Option<Span> {
        self.bookmarks.get(name).copied()
    }

    pub fn has_bookmark(&self, name: &str) -> bool {
        self.bookmarks.contains_key(name)
    }

    /// Flush pending edits and move back (or forward) to a bookmarked tag
    pub fn seek(&mut self, name: &str) -> HtmlResult<bool> {
        if !self.bookmarks.contains_key(name) {
            return self.misuse(HtmlError::UnknownBookmark(name.to_string()));
        }
        self.seek_count += 1;
        if self.seek_count > self.config.max_seek_ops {
            return Err(HtmlError::SeekLimitExceeded(self.config.max_seek_ops));
        }

        self.flush();
        let Some(span) = self.bookmarks.get(name).copied() else {
            return Ok(false);
        };
        self.bytes_already_parsed = span.start;
        self.state = ParserState::Ready;
        Ok(self.next_tag(TagQuery::any().visit_closers()))
    }

    /// The document with every queued edit applied.
    ///
    /// Applying edits replaces the scanned buffer and re-parses the current
    /// tag from its new position, so scanning continues where it was.
    pub fn get_updated_html(&mut self) -> String {
        self.flush();
        self.html.clone()
    }

    /// Decoded text between the previous tag (or the start) and the current
    /// tag (or the end of input). Comments and other markup are left out.
    pub fn text(&self) -> String {
        self.text_segments
            .iter()
            .map(|span| decode_html(&self.html[span.start..span.end]))
            .collect()
    }

    /// Content of the raw text element just matched; character references
    /// are decoded for TEXTAREA and TITLE only
    pub fn raw_text(&self) -> Option<String> {
        let span = self.raw_text?;
        let raw = &self.html[span.start..span.end];
        match self.tag_name() {
            Some(name) if name.is_escapable_raw_text() => Some(decode_html(raw).into_owned()),
            _ => Some(raw.to_string()),
        }
    }

    /// Source of the first DOCTYPE skipped on the way to the current position
    pub fn doctype(&self) -> Option<&str> {
        self.doctypes
            .first()
            .map(|span| &self.html[span.start..span.end])
    }

    /// Decoded text and DOCTYPEs between the previous tag and the current
    /// one, in document order
    pub fn skipped_content(&self) -> Vec<SkippedContent<'_>> {
        let mut items: Vec<(usize, SkippedContent<'_>)> = self
            .text_segments
            .iter()
            .map(|span| {
                let text = decode_html(&self.html[span.start..span.end]).into_owned();
                (span.start, SkippedContent::Text(text))
            })
            .chain(self.doctypes.iter().map(|span| {
                (span.start, SkippedContent::Doctype(&self.html[span.start..span.end]))
            }))
            .collect();
        items.sort_by_key(|(start, _)| *start);
        items.into_iter().map(|(_, item)| item).collect()
    }

    pub fn paused_at_incomplete_input(&self) -> bool {
        self.state == ParserState::IncompleteInput
    }

    /// Start of the construct the input ended in
    pub fn incomplete_input_offset(&self) -> Option<usize> {
        self.incomplete_at
    }

    fn tag_name_str(&self) -> &str {
        match self.current {
            Some(tag) => &self.html[tag.name_starts_at..tag.name_starts_at + tag.name_length],
            None => "",
        }
    }

    fn misuse(&self, error: HtmlError) -> HtmlResult<bool> {
        if self.config.strict {
            Err(error)
        } else {
            warn!("{error}");
            Ok(false)
        }
    }

    fn matches(&self, query: &TagQuery) -> bool {
        if self.current.is_none() {
            return false;
        }
        let is_closer = self.is_tag_closer();
        if is_closer && query.tag_closers == TagClosers::Skip {
            return false;
        }
        if let Some(name) = &query.tag_name {
            if !self.tag_name_str().eq_ignore_ascii_case(name) {
                return false;
            }
        }
        if let Some(class_name) = &query.class_name {
            if is_closer || self.has_class(class_name) != Some(true) {
                return false;
            }
        }
        true
    }

    /// Settle the previous tag's edits before moving on
    fn after_tag(&mut self) {
        self.class_name_updates_to_attributes_updates();
        for update in &mut self.lexical_updates {
            update.key = UpdateKey::Settled;
        }
    }

    fn clear_tag_state(&mut self) {
        self.current = None;
        self.attributes.clear();
        self.duplicate_attributes.clear();
        self.raw_text = None;
    }

    /// Scan the next tag from the cursor, attributes and raw content included
    fn parse_next_tag(&mut self) -> bool {
        self.clear_tag_state();
        self.text_segments.clear();
        self.doctypes.clear();
        let Some(opening) = self.find_tag_opening() else {
            return false;
        };

        let mut at = opening.name_starts_at + opening.name_length;
        let tag_end = loop {
            let scan = scan_attribute(self.html.as_bytes(), at);
            match scan {
                AttributeScan::Attribute(token) => {
                    at = token.end;
                    if !opening.is_closer {
                        self.record_attribute(token);
                    }
                }
                AttributeScan::TagEnd(end) => break end,
                AttributeScan::Incomplete => return self.pause_incomplete(opening.token_starts_at),
            }
        };

        let tag = TagLocation {
            token_starts_at: opening.token_starts_at,
            name_starts_at: opening.name_starts_at,
            name_length: opening.name_length,
            ends_at: tag_end + 1,
            is_closer: opening.is_closer,
        };
        self.current = Some(tag);
        self.bytes_already_parsed = tag.ends_at;
        self.state = ParserState::MatchedTag;

        if tag.is_closer {
            return true;
        }
        let name = TagName::from_name(self.tag_name_str());
        if !name.is_raw_text() {
            return true;
        }

        let html = self.html.as_bytes();
        let closer = match name {
            TagName::Script => skip_script_data(html, tag.ends_at),
            _ => skip_raw_text(html, tag.ends_at, name.as_str().as_bytes()),
        };
        match closer {
            Some((closer_starts_at, closer_ends_at)) => {
                self.raw_text = Some(Span::new(tag.ends_at, closer_starts_at));
                self.bytes_already_parsed = closer_ends_at;
                true
            }
            None => self.pause_incomplete(tag.token_starts_at),
        }
    }

    /// Find the next `<name` or `</name`, skipping comments, DOCTYPEs and
    /// other markup declarations and collecting the text around them
    fn find_tag_opening(&mut self) -> Option<TagOpening> {
        let html = self.html.as_bytes();
        let len = html.len();
        let mut text_start = self.bytes_already_parsed;
        let mut at = text_start;

        while let Some(lt) = find_byte(html, b'<', at) {
            at = lt;
            let is_closer = html.get(at + 1) == Some(&b'/');
            let name_at = at + 1 + usize::from(is_closer);

            if html.get(name_at).is_some_and(u8::is_ascii_alphabetic) {
                push_segment(&mut self.text_segments, text_start, at);
                let name_length = span_until(html, name_at, |b| {
                    b == b'/' || b == b'>' || is_html_whitespace(b)
                });
                return Some(TagOpening {
                    token_starts_at: at,
                    name_starts_at: name_at,
                    name_length,
                    is_closer,
                });
            }

            let markup_end = match html.get(at + 1) {
                Some(b'!') => {
                    if starts_with_ignore_case(html, at + 2, b"doctype") {
                        let end = bogus_comment_end(html, at + 2);
                        self.doctypes.push(Span::new(at, end));
                        Some(end)
                    } else if html[at + 2..].starts_with(b"--") {
                        Some(comment_end(html, at + 4))
                    } else {
                        Some(bogus_comment_end(html, at + 2))
                    }
                }
                Some(b'?') => Some(bogus_comment_end(html, at + 2)),
                Some(b'/') if html.get(at + 2) == Some(&b'>') => Some(at + 3),
                Some(b'/') if at + 2 < len => Some(bogus_comment_end(html, at + 2)),
                _ => None,
            };

            match markup_end {
                Some(end) => {
                    push_segment(&mut self.text_segments, text_start, at);
                    text_start = end;
                    at = end;
                }
                None => at += 1,
            }
        }

        push_segment(&mut self.text_segments, text_start, len);
        self.bytes_already_parsed = len;
        self.state = ParserState::Complete;
        None
    }

    fn record_attribute(&mut self, token: AttributeToken) {
        let name = AttributeName::new(&token.name);
        if self.attributes.iter().any(|(existing, _)| *existing == name) {
            self.duplicate_attributes
                .entry(name)
                .or_default()
                .push(Span::new(token.start, token.end));
        } else {
            self.attributes.push((name, token));
        }
    }

    fn pause_incomplete(&mut self, starts_at: usize) -> bool {
        debug!("input ends inside the construct at byte {starts_at}");
        self.clear_tag_state();
        self.state = ParserState::IncompleteInput;
        self.incomplete_at = Some(starts_at);
        self.bytes_already_parsed = self.html.len();
        false
    }

    fn find_attribute(&self, name: &AttributeName) -> Option<&AttributeToken> {
        self.attributes
            .iter()
            .find(|(existing, _)| existing == name)
            .map(|(_, token)| token)
    }

    fn source_attribute(&self, name: &AttributeName) -> Option<AttributeValue> {
        self.find_attribute(name).map(|token| self.token_value(token))
    }

    fn token_value(&self, token: &AttributeToken) -> AttributeValue {
        if token.is_boolean {
            return AttributeValue::True;
        }
        let raw = &self.html[token.value_start..token.value_start + token.value_length];
        AttributeValue::Text(decode_html(raw).into_owned())
    }

    fn pending_update(&self, name: &AttributeName) -> Option<&str> {
        self.lexical_updates
            .iter()
            .find(|update| matches!(&update.key, UpdateKey::Attribute(key) if key == name))
            .map(|update| update.replacement.text.as_str())
    }

    fn enqueue(&mut self, key: UpdateKey, replacement: TextReplacement) {
        match self.lexical_updates.iter_mut().find(|update| update.key == key) {
            Some(update) => update.replacement = replacement,
            None => self.lexical_updates.push(LexicalUpdate { key, replacement }),
        }
    }

    fn write_attribute(&mut self, name: &str, value: AttributeUpdate) -> bool {
        let Some(tag) = self.current else {
            return false;
        };
        let updated = match value {
            AttributeUpdate::Boolean(false) => return self.remove_attribute(name),
            AttributeUpdate::Boolean(true) => name.to_string(),
            AttributeUpdate::Value(value) => format!("{}=\"{}\"", name, escape_attribute(&value)),
        };

        let comparable = AttributeName::new(name);
        let replacement = match self.find_attribute(&comparable) {
            Some(existing) => TextReplacement::new(existing.start, existing.end, updated),
            None => {
                let at = tag.name_starts_at + tag.name_length;
                TextReplacement::new(at, at, format!(" {updated}"))
            }
        };
        if comparable.as_str() == "class" {
            self.classname_updates.clear();
        }
        self.enqueue(UpdateKey::Attribute(comparable), replacement);
        true
    }

    fn enqueue_class(&mut self, class_name: &str, operation: ClassOperation) -> bool {
        if self.current.is_none() || self.is_tag_closer() {
            return false;
        }
        match self
            .classname_updates
            .iter_mut()
            .find(|(existing, _)| existing == class_name)
        {
            Some((_, existing)) => *existing = operation,
            None => self
                .classname_updates
                .push((class_name.to_string(), operation)),
        }
        true
    }

    /// Fold queued class edits into a single `class` attribute edit.
    ///
    /// Retained classes keep their order and the whitespace before them;
    /// additions are appended with a single space.
    fn class_name_updates_to_attributes_updates(&mut self) {
        if self.classname_updates.is_empty() {
            return;
        }
        let updates = std::mem::take(&mut self.classname_updates);
        let class_name = AttributeName::new("class");
        let existing = match self.pending_update(&class_name) {
            Some(text) => enqueued_value(text),
            None => self.source_attribute(&class_name),
        };
        let existing = match existing {
            Some(AttributeValue::Text(value)) => value,
            _ => String::new(),
        };

        let bytes = existing.as_bytes();
        let mut class = String::with_capacity(existing.len());
        let mut seen: Vec<&str> = Vec::new();
        let mut modified = false;
        let mut at = 0;
        while at < bytes.len() {
            let whitespace_at = at;
            let whitespace_length = span_while(bytes, at, is_html_whitespace);
            at += whitespace_length;

            let name_length = span_until(bytes, at, is_html_whitespace);
            if name_length == 0 {
                break;
            }
            let name = &existing[at..at + name_length];
            at += name_length;

            let removed = updates
                .iter()
                .any(|(candidate, operation)| candidate == name && *operation == ClassOperation::Remove);
            if removed {
                modified = true;
                continue;
            }
            seen.push(name);
            class.push_str(&existing[whitespace_at..whitespace_at + whitespace_length]);
            class.push_str(name);
        }

        for (name, operation) in &updates {
            if *operation == ClassOperation::Add && !seen.contains(&name.as_str()) {
                modified = true;
                seen.push(name);
                if !class.is_empty() {
                    class.push(' ');
                }
                class.push_str(name);
            }
        }

        if !modified {
            return;
        }
        if class.is_empty() {
            self.remove_attribute("class");
        } else {
            self.write_attribute("class", AttributeUpdate::Value(class));
        }
    }

    /// Apply every queued edit to the buffer, shift bookmarks, and re-parse
    /// the current tag at its new position
    fn flush(&mut self) {
        self.class_name_updates_to_attributes_updates();
        if self.lexical_updates.is_empty() {
            return;
        }

        let mut replacements: Vec<TextReplacement> = std::mem::take(&mut self.lexical_updates)
            .into_iter()
            .map(|update| update.replacement)
            .collect();
        replacements.sort_by(|a, b| a.start.cmp(&b.start).then_with(|| a.text.cmp(&b.text)));
        debug!("applying {} queued edit(s)", replacements.len());

        let updated = apply_replacements(&self.html, &replacements);
        for span in self.bookmarks.values_mut() {
            span.start = shift_offset(span.start, &replacements, false);
            span.end = shift_offset(span.end, &replacements, false);
        }
        let resume_at = self
            .current
            .map(|tag| shift_offset(tag.token_starts_at, &replacements, false));
        let cursor = shift_offset(self.bytes_already_parsed, &replacements, false);
        let shift_span = |span: &Span| {
            Span::new(
                shift_offset(span.start, &replacements, false),
                shift_offset(span.end, &replacements, false),
            )
        };
        let text_segments: SmallVec<[Span; 2]> = self.text_segments.iter().map(shift_span).collect();
        let doctypes: SmallVec<[Span; 1]> = self.doctypes.iter().map(shift_span).collect();
        self.html = updated;

        match resume_at {
            Some(at) => {
                self.bytes_already_parsed = at;
                self.state = ParserState::Ready;
                self.parse_next_tag();
                // The re-parse starts at the tag, so restore what led up to it
                self.text_segments = text_segments;
                self.doctypes = doctypes;
            }
            None => self.bytes_already_parsed = cursor,
        }
    }
}

/// Value a queued attribute edit will produce; `None` for a removal
fn enqueued_value(text: &str) -> Option<AttributeValue> {
    if text.is_empty() {
        return None;
    }
    let text = text.trim_start();
    match text.find('=') {
        None => Some(AttributeValue::True),
        Some(equals) => {
            let quoted = &text[equals + 1..];
            let value = quoted
                .strip_prefix('"')
                .and_then(|value| value.strip_suffix('"'))
                .unwrap_or(quoted);
            Some(AttributeValue::Text(decode_html(value).into_owned()))
        }
    }
}

fn push_segment(segments: &mut SmallVec<[Span; 2]>, start: usize, end: usize) {
    if end > start {
        segments.push(Span::new(start, end));
    }
}

/// End of a bogus comment whose content starts at `from`: past the next `>`,
/// or the end of input
fn bogus_comment_end(html: &[u8], from: usize) -> usize {
    find_byte(html, b'>', from).map_or(html.len(), |gt| gt + 1)
}

/// End of a comment whose content starts at `from` (just after `<!--`)
fn comment_end(html: &[u8], from: usize) -> usize {
    // `<!-->` and `<!--->` are complete, empty comments
    if html.get(from) == Some(&b'>') {
        return from + 1;
    }
    if html.get(from..from + 2) == Some(b"->".as_slice()) {
        return from + 2;
    }

    let mut at = from;
    while let Some(dashes) = find_bytes(html, b"--", at) {
        let after = dashes + 2 + span_while(html, dashes + 2, |b| b == b'-');
        match html.get(after) {
            Some(b'>') => return after + 1,
            Some(b'!') if html.get(after + 1) == Some(&b'>') => return after + 2,
            Some(_) => at = after,
            None => break,
        }
    }
    html.len()
}

/// Find the closer of a RAWTEXT or RCDATA element whose content starts at
/// `at`, returning where the closer starts and ends.
///
/// The closer's name must be followed by whitespace, `/` or `>`, so
/// `</textarearug>` does not close a TEXTAREA.
fn skip_raw_text(html: &[u8], mut at: usize, tag_name: &[u8]) -> Option<(usize, usize)> {
    loop {
        let closer = find_bytes(html, b"</", at)?;
        let name_at = closer + 2;
        if starts_with_ignore_case(html, name_at, tag_name) {
            let after = name_at + tag_name.len();
            match html.get(after) {
                Some(&b) if is_html_whitespace(b) || b == b'/' || b == b'>' => {
                    return skip_to_tag_end(html, after).map(|end| (closer, end));
                }
                None => return None,
                Some(_) => {}
            }
        }
        at = name_at;
    }
}

/// Find the `</script>` ending script data that starts at `at`.
///
/// `<!--` escapes the content; inside it a nested `<script>` switches to the
/// double-escaped state, where `</script>` only leaves the double escape.
/// `-->` always returns to plain script data.
fn skip_script_data(html: &[u8], mut at: usize) -> Option<(usize, usize)> {
    let mut state = ScriptState::Unescaped;
    loop {
        at += span_until(html, at, |b| b == b'-' || b == b'<');
        if at >= html.len() {
            return None;
        }

        if html[at] == b'-' {
            if html[at..].starts_with(b"-->") {
                at += 3;
                state = ScriptState::Unescaped;
            } else {
                at += 1;
            }
            continue;
        }

        let lt = at;
        at += 1;
        if html[at..].starts_with(b"!--") {
            // Only skip the `!` so that `<!-->` is seen as `-->`
            at += 1;
            if state == ScriptState::Unescaped {
                state = ScriptState::Escaped;
            }
            continue;
        }

        let is_closer = html.get(at) == Some(&b'/');
        if is_closer {
            at += 1;
        }
        if !starts_with_ignore_case(html, at, b"script") {
            continue;
        }
        at += b"script".len();
        match html.get(at) {
            None => return None,
            Some(&b) if is_html_whitespace(b) || b == b'/' || b == b'>' => {}
            Some(_) => continue,
        }

        match (state, is_closer) {
            (ScriptState::Escaped, false) => state = ScriptState::DoubleEscaped,
            (ScriptState::DoubleEscaped, true) => state = ScriptState::Escaped,
            (_, true) => return skip_to_tag_end(html, at).map(|end| (lt, end)),
            (_, false) => {}
        }
    }
}
