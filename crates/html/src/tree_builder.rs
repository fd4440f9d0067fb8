//! HTML Tree Builder
//!
//! Runs the "in body" insertion rules over the tags found by a
//! [`TagProcessor`]: stack of open elements, active formatting elements,
//! implied end tags and the adoption agency algorithm. The document node
//! stands in for HTML, HEAD and BODY, so those tags never create elements.

use std::collections::VecDeque;
use std::fmt;

use log::{debug, trace};
use scalpel_dom::{Attributes, CompatMode, DomTree, NodeId};

use crate::attributes::is_html_whitespace;
use crate::error::{HtmlError, HtmlResult};
use crate::query::TagQuery;
use crate::quirks::DoctypeInfo;
use crate::stack::{ActiveFormattingElements, FormattingEntry, OpenElements, Scope, ScopeTarget};
use crate::tag_name::TagName;
use crate::tag_processor::{ProcessorConfig, SkippedContent, TagProcessor};
use crate::token::{TagToken, Token};

const ADOPTION_AGENCY_OUTER_LOOP_LIMIT: usize = 8;
const ADOPTION_AGENCY_INNER_LOOP_LIMIT: usize = 3;

/// Recoverable deviations from well-formed markup
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseErrorKind {
    /// Opener the builder ignores, such as a second BODY
    UnexpectedStartTag,
    /// Closer with nothing to close in scope
    UnexpectedEndTag,
    /// Closer that had to close other elements on the way
    MisnestedEndTag,
    NestedHeading,
    NestedFormattingElement,
    FormattingElementNotOpen,
    FormattingElementNotInScope,
    ImageTag,
    LateDoctype,
}

impl fmt::Display for ParseErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let message = match self {
            ParseErrorKind::UnexpectedStartTag => "unexpected start tag",
            ParseErrorKind::UnexpectedEndTag => "end tag without a matching open element",
            ParseErrorKind::MisnestedEndTag => "end tag closes other open elements",
            ParseErrorKind::NestedHeading => "heading nested in another heading",
            ParseErrorKind::NestedFormattingElement => "formatting element opened inside itself",
            ParseErrorKind::FormattingElementNotOpen => "formatting element is no longer open",
            ParseErrorKind::FormattingElementNotInScope => "formatting element is not in scope",
            ParseErrorKind::ImageTag => "IMAGE treated as IMG",
            ParseErrorKind::LateDoctype => "DOCTYPE after content",
        };
        f.write_str(message)
    }
}

/// A parse error and the tag it was raised for
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseError {
    pub kind: ParseErrorKind,
    pub tag: String,
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.kind, self.tag)
    }
}

type ParseErrorHandler = Box<dyn FnMut(&ParseError)>;

/// Outcome of the adoption agency algorithm
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum AdoptionResult {
    Completed,
    ProcessAsAnyOther,
}

/// Where the new formatting element goes in the active formatting list
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FormattingBookmark {
    /// Take the formatting element's own slot
    Replace(NodeId),
    InsertAfter(NodeId),
}

/// HTML parser that builds a DOM tree
pub struct HtmlParser {
    tree: DomTree,
    open_elements: OpenElements,
    active_formatting: ActiveFormattingElements,
    pending: VecDeque<Token>,
    config: ProcessorConfig,
    compat_mode: Option<CompatMode>,
    on_parse_error: ParseErrorHandler,
}

impl HtmlParser {
    /// Create a new HTML parser
    pub fn new() -> Self {
        Self::with_config(ProcessorConfig::default())
    }

    /// Create a parser whose scanner uses `config`
    pub fn with_config(config: ProcessorConfig) -> Self {
        let tree = DomTree::new();
        let open_elements = OpenElements::new(tree.document_id());
        Self {
            tree,
            open_elements,
            active_formatting: ActiveFormattingElements::new(),
            pending: VecDeque::new(),
            config,
            compat_mode: None,
            on_parse_error: Box::new(|error| debug!("parse error: {error}")),
        }
    }

    /// Replace the parse error hook, which logs at debug level by default
    pub fn on_parse_error(mut self, handler: impl FnMut(&ParseError) + 'static) -> Self {
        self.on_parse_error = Box::new(handler);
        self
    }

    /// Parse HTML string into a DOM tree
    pub fn parse(mut self, html: &str) -> HtmlResult<DomTree> {
        let mut processor = TagProcessor::with_config(html, self.config.clone());

        loop {
            let found = processor.next_tag(TagQuery::any().visit_closers());
            // Text ahead of a DOCTYPE decides the compat mode before it does
            for item in processor.skipped_content() {
                match item {
                    SkippedContent::Text(text) => self.process_token(Token::Text(text))?,
                    SkippedContent::Doctype(source) => self.handle_doctype(source),
                }
            }
            if found {
                self.queue_tag(&processor);
            }
            self.drain_pending()?;

            if !found {
                break;
            }
        }

        if processor.paused_at_incomplete_input() {
            let offset = processor.incomplete_input_offset().unwrap_or(html.len());
            return Err(HtmlError::IncompleteInput { offset });
        }
        Ok(self.finish())
    }

    /// Hand the tree over, settling the compatibility mode
    pub fn finish(mut self) -> DomTree {
        let mode = self.compat_mode.unwrap_or(CompatMode::Quirks);
        self.tree.set_compat_mode(mode);
        self.tree
    }

    pub fn tree(&self) -> &DomTree {
        &self.tree
    }

    /// Process a single token
    pub fn process_token(&mut self, token: Token) -> HtmlResult<()> {
        trace!("processing {token}");
        match token {
            Token::Marker => Err(self.unsupported(&token)),
            Token::Text(text) => {
                if text.bytes().all(is_html_whitespace) {
                    // Whitespace ahead of the first node is dropped
                    if self.tree.children(self.tree.document_id()).is_empty() {
                        return Ok(());
                    }
                } else {
                    self.note_content();
                }
                self.insert_text(&text)
            }
            Token::Tag(tag) => {
                self.note_content();
                if tag.is_opener {
                    self.handle_opener(tag)
                } else {
                    self.handle_closer(tag)
                }
            }
        }
    }

    /// Queue the matched tag, plus the content and closer of a raw text
    /// element, which the scanner consumes in one step
    fn queue_tag(&mut self, processor: &TagProcessor) {
        let Some(name) = processor.tag_name() else {
            return;
        };
        let is_opener = !processor.is_tag_closer();
        let attributes = if is_opener {
            processor.attributes()
        } else {
            Attributes::new()
        };
        self.pending
            .push_back(Token::tag(name.clone(), attributes, is_opener, None));

        if let Some(raw_text) = processor.raw_text() {
            if !raw_text.is_empty() {
                self.pending.push_back(Token::Text(raw_text));
            }
            self.pending
                .push_back(Token::tag(name, Attributes::new(), false, None));
        }
    }

    fn drain_pending(&mut self) -> HtmlResult<()> {
        while let Some(token) = self.pending.pop_front() {
            self.process_token(token)?;
        }
        Ok(())
    }

    fn handle_doctype(&mut self, source: &str) {
        if self.compat_mode.is_some() {
            self.parse_error(ParseErrorKind::LateDoctype, "!doctype");
            return;
        }
        let mode = DoctypeInfo::parse(source).compat_mode();
        debug!("{source} selects {mode} mode");
        self.compat_mode = Some(mode);
    }

    /// Content without a DOCTYPE in front of it puts the document in quirks mode
    fn note_content(&mut self) {
        if self.compat_mode.is_none() {
            debug!("no DOCTYPE before content, using quirks mode");
            self.compat_mode = Some(CompatMode::Quirks);
        }
    }

    fn parse_error(&mut self, kind: ParseErrorKind, tag: &str) {
        let error = ParseError {
            kind,
            tag: tag.to_ascii_lowercase(),
        };
        (self.on_parse_error)(&error);
    }

    fn unsupported(&self, token: &Token) -> HtmlError {
        HtmlError::Unsupported {
            token: token.to_string(),
            open_elements: self.open_elements.names(),
            active_formatting: self.active_formatting.names(),
        }
    }

    fn handle_opener(&mut self, tag: TagToken) -> HtmlResult<()> {
        let name = tag.name.clone();
        match name {
            TagName::Html | TagName::Head | TagName::Body | TagName::Frameset => {
                self.parse_error(ParseErrorKind::UnexpectedStartTag, name.as_str());
            }

            TagName::Math | TagName::Svg | TagName::Plaintext => {
                return Err(self.unsupported(&Token::Tag(tag)));
            }

            TagName::Address
            | TagName::Article
            | TagName::Aside
            | TagName::Blockquote
            | TagName::Center
            | TagName::Details
            | TagName::Dialog
            | TagName::Dir
            | TagName::Div
            | TagName::Dl
            | TagName::Fieldset
            | TagName::Figcaption
            | TagName::Figure
            | TagName::Footer
            | TagName::Header
            | TagName::Hgroup
            | TagName::Main
            | TagName::Menu
            | TagName::Nav
            | TagName::Ol
            | TagName::P
            | TagName::Search
            | TagName::Section
            | TagName::Summary
            | TagName::Ul
            | TagName::Pre
            | TagName::Listing
            | TagName::Form => {
                self.close_p_in_button_scope();
                self.insert_element(&tag)?;
            }

            TagName::H1 | TagName::H2 | TagName::H3 | TagName::H4 | TagName::H5 | TagName::H6 => {
                self.close_p_in_button_scope();
                if self.open_elements.current_tag().is_heading() {
                    self.parse_error(ParseErrorKind::NestedHeading, name.as_str());
                    self.open_elements.pop();
                }
                self.insert_element(&tag)?;
            }

            TagName::Li => {
                self.close_list_item(&[TagName::Li]);
                self.close_p_in_button_scope();
                self.insert_element(&tag)?;
            }

            TagName::Dd | TagName::Dt => {
                self.close_list_item(&[TagName::Dd, TagName::Dt]);
                self.close_p_in_button_scope();
                self.insert_element(&tag)?;
            }

            TagName::Button => {
                if self.open_elements.has_in_scope(&TagName::Button) {
                    self.parse_error(ParseErrorKind::UnexpectedStartTag, name.as_str());
                    self.generate_implied_end_tags(&[], false);
                    self.open_elements.pop_until_tag(&TagName::Button);
                }
                self.reconstruct_active_formatting_elements()?;
                self.insert_element(&tag)?;
            }

            TagName::A => {
                if let Some(index) = self.active_formatting.last_element_after_marker(&TagName::A) {
                    self.parse_error(ParseErrorKind::NestedFormattingElement, name.as_str());
                    let previous = self.active_formatting.get(index).and_then(|entry| entry.node);
                    self.run_adoption_agency(&tag)?;
                    if let Some(previous) = previous {
                        self.active_formatting.remove_node(previous);
                        self.open_elements.remove_node(previous);
                    }
                }
                self.reconstruct_active_formatting_elements()?;
                let node = self.insert_element(&tag)?;
                self.active_formatting.push(Token::Tag(tag), node)?;
            }

            TagName::Nobr => {
                self.reconstruct_active_formatting_elements()?;
                if self.open_elements.has_in_scope(&TagName::Nobr) {
                    self.parse_error(ParseErrorKind::NestedFormattingElement, name.as_str());
                    self.run_adoption_agency(&tag)?;
                    self.reconstruct_active_formatting_elements()?;
                }
                let node = self.insert_element(&tag)?;
                self.active_formatting.push(Token::Tag(tag), node)?;
            }

            _ if name.is_formatting() => {
                self.reconstruct_active_formatting_elements()?;
                let node = self.insert_element(&tag)?;
                self.active_formatting.push(Token::Tag(tag), node)?;
            }

            TagName::Applet | TagName::Marquee | TagName::Object => {
                self.reconstruct_active_formatting_elements()?;
                self.insert_element(&tag)?;
                self.active_formatting.push_marker();
            }

            TagName::Template => {
                self.insert_element(&tag)?;
                self.active_formatting.push_marker();
            }

            TagName::Table => {
                if self.compat_mode != Some(CompatMode::Quirks) {
                    self.close_p_in_button_scope();
                }
                self.insert_element(&tag)?;
            }

            TagName::Area
            | TagName::Br
            | TagName::Embed
            | TagName::Img
            | TagName::Keygen
            | TagName::Wbr
            | TagName::Input => {
                self.reconstruct_active_formatting_elements()?;
                self.insert_element(&tag)?;
                self.open_elements.pop();
            }

            TagName::Param | TagName::Source | TagName::Track => {
                self.insert_element(&tag)?;
                self.open_elements.pop();
            }

            TagName::Hr => {
                self.close_p_in_button_scope();
                self.insert_element(&tag)?;
                self.open_elements.pop();
            }

            TagName::Image => {
                self.parse_error(ParseErrorKind::ImageTag, name.as_str());
                let mut tag = tag;
                tag.name = TagName::Img;
                return self.handle_opener(tag);
            }

            TagName::Textarea => {
                self.insert_element(&tag)?;
            }

            TagName::Select => {
                self.reconstruct_active_formatting_elements()?;
                self.insert_element(&tag)?;
            }

            TagName::Optgroup | TagName::Option => {
                if *self.open_elements.current_tag() == TagName::Option {
                    self.open_elements.pop();
                }
                self.reconstruct_active_formatting_elements()?;
                self.insert_element(&tag)?;
            }

            TagName::Rb | TagName::Rtc => {
                if self.open_elements.has_in_scope(&TagName::Ruby) {
                    self.generate_implied_end_tags(&[], false);
                    if *self.open_elements.current_tag() != TagName::Ruby {
                        self.parse_error(ParseErrorKind::UnexpectedStartTag, name.as_str());
                    }
                }
                self.insert_element(&tag)?;
            }

            TagName::Rp | TagName::Rt => {
                if self.open_elements.has_in_scope(&TagName::Ruby) {
                    self.generate_implied_end_tags(&[TagName::Rtc], false);
                    if !matches!(self.open_elements.current_tag(), TagName::Ruby | TagName::Rtc) {
                        self.parse_error(ParseErrorKind::UnexpectedStartTag, name.as_str());
                    }
                }
                self.insert_element(&tag)?;
            }

            TagName::Xmp => {
                self.close_p_in_button_scope();
                self.reconstruct_active_formatting_elements()?;
                self.insert_element(&tag)?;
            }

            // Raw text and metadata elements follow the "in head" rules
            TagName::Script
            | TagName::Style
            | TagName::Title
            | TagName::Noframes
            | TagName::Iframe
            | TagName::Noembed => {
                self.insert_element(&tag)?;
            }

            TagName::Base | TagName::Basefont | TagName::Bgsound | TagName::Link | TagName::Meta => {
                self.insert_element(&tag)?;
                self.open_elements.pop();
            }

            _ => {
                self.reconstruct_active_formatting_elements()?;
                self.insert_element(&tag)?;
                if name.is_void() {
                    self.open_elements.pop();
                }
            }
        }
        Ok(())
    }

    fn handle_closer(&mut self, tag: TagToken) -> HtmlResult<()> {
        let name = tag.name.clone();
        match name {
            TagName::Html | TagName::Head | TagName::Body => {}

            TagName::Address
            | TagName::Article
            | TagName::Aside
            | TagName::Blockquote
            | TagName::Button
            | TagName::Center
            | TagName::Details
            | TagName::Dialog
            | TagName::Dir
            | TagName::Div
            | TagName::Dl
            | TagName::Fieldset
            | TagName::Figcaption
            | TagName::Figure
            | TagName::Footer
            | TagName::Header
            | TagName::Hgroup
            | TagName::Listing
            | TagName::Main
            | TagName::Menu
            | TagName::Nav
            | TagName::Ol
            | TagName::Pre
            | TagName::Search
            | TagName::Section
            | TagName::Summary
            | TagName::Ul
            | TagName::Form => {
                if !self.open_elements.has_in_scope(&name) {
                    self.parse_error(ParseErrorKind::UnexpectedEndTag, name.as_str());
                    return Ok(());
                }
                self.generate_implied_end_tags(&[], false);
                self.expect_current(&name);
                self.open_elements.pop_until_tag(&name);
            }

            TagName::P => {
                if !self.open_elements.has_in_button_scope(&TagName::P) {
                    self.parse_error(ParseErrorKind::UnexpectedEndTag, name.as_str());
                    let opener = TagToken {
                        is_opener: true,
                        attributes: Attributes::new(),
                        ..tag
                    };
                    self.insert_element(&opener)?;
                }
                self.close_p();
            }

            TagName::Li => {
                if !self.open_elements.has_in_list_item_scope(&TagName::Li) {
                    self.parse_error(ParseErrorKind::UnexpectedEndTag, name.as_str());
                    return Ok(());
                }
                self.generate_implied_end_tags(&[TagName::Li], false);
                self.expect_current(&name);
                self.open_elements.pop_until_tag(&TagName::Li);
            }

            TagName::Dd | TagName::Dt => {
                if !self.open_elements.has_in_scope(&name) {
                    self.parse_error(ParseErrorKind::UnexpectedEndTag, name.as_str());
                    return Ok(());
                }
                self.generate_implied_end_tags(&[name.clone()], false);
                self.expect_current(&name);
                self.open_elements.pop_until_tag(&name);
            }

            TagName::H1 | TagName::H2 | TagName::H3 | TagName::H4 | TagName::H5 | TagName::H6 => {
                if !self
                    .open_elements
                    .has_element_in_specific_scope(ScopeTarget::Heading, Scope::Default)
                {
                    self.parse_error(ParseErrorKind::UnexpectedEndTag, name.as_str());
                    return Ok(());
                }
                self.generate_implied_end_tags(&[], false);
                self.expect_current(&name);
                self.open_elements.pop_until_heading();
            }

            _ if name.is_formatting() => {
                if self.run_adoption_agency(&tag)? == AdoptionResult::ProcessAsAnyOther {
                    self.any_other_end_tag(&tag);
                }
            }

            TagName::Applet | TagName::Marquee | TagName::Object => {
                if !self.open_elements.has_in_scope(&name) {
                    self.parse_error(ParseErrorKind::UnexpectedEndTag, name.as_str());
                    return Ok(());
                }
                self.generate_implied_end_tags(&[], false);
                self.expect_current(&name);
                self.open_elements.pop_until_tag(&name);
                self.active_formatting.clear_to_last_marker();
            }

            TagName::Template => {
                if !self.open_elements.iter().any(|entry| entry.tag == TagName::Template) {
                    self.parse_error(ParseErrorKind::UnexpectedEndTag, name.as_str());
                    return Ok(());
                }
                self.generate_implied_end_tags(&[], true);
                self.expect_current(&name);
                self.open_elements.pop_until_tag(&TagName::Template);
                self.active_formatting.clear_to_last_marker();
            }

            TagName::Br => {
                self.parse_error(ParseErrorKind::UnexpectedEndTag, name.as_str());
                let opener = TagToken {
                    is_opener: true,
                    attributes: Attributes::new(),
                    ..tag
                };
                return self.handle_opener(opener);
            }

            TagName::Table => {
                if !self.open_elements.has_in_table_scope(&TagName::Table) {
                    self.parse_error(ParseErrorKind::UnexpectedEndTag, name.as_str());
                    return Ok(());
                }
                self.open_elements.pop_until_tag(&TagName::Table);
            }

            TagName::Select => {
                if !self.open_elements.has_in_select_scope(&TagName::Select) {
                    self.parse_error(ParseErrorKind::UnexpectedEndTag, name.as_str());
                    return Ok(());
                }
                self.open_elements.pop_until_tag(&TagName::Select);
            }

            _ => self.any_other_end_tag(&tag),
        }
        Ok(())
    }

    /// Close the nearest open element named like `tag`, unless a special
    /// element sits above it
    fn any_other_end_tag(&mut self, tag: &TagToken) {
        for index in (1..self.open_elements.len()).rev() {
            let Some(entry) = self.open_elements.get(index) else {
                break;
            };
            if entry.tag == tag.name {
                let node = entry.node;
                self.generate_implied_end_tags(&[tag.name.clone()], false);
                if self.open_elements.current_node() != node {
                    self.parse_error(ParseErrorKind::MisnestedEndTag, tag.name.as_str());
                }
                self.open_elements.pop_until_node(node);
                return;
            }
            if entry.tag.is_special() {
                self.parse_error(ParseErrorKind::UnexpectedEndTag, tag.name.as_str());
                return;
            }
        }
    }

    fn expect_current(&mut self, name: &TagName) {
        let current = self.open_elements.current_tag();
        let matches = if name.is_heading() {
            current.is_heading()
        } else {
            current == name
        };
        if !matches {
            self.parse_error(ParseErrorKind::MisnestedEndTag, name.as_str());
        }
    }

    fn insert_element(&mut self, tag: &TagToken) -> HtmlResult<NodeId> {
        let node = self
            .tree
            .create_element(tag.name.to_lowercase(), tag.attributes.clone());
        self.tree
            .append_child(self.open_elements.current_node(), node)?;
        self.open_elements.push(node, tag.name.clone());
        Ok(node)
    }

    fn insert_text(&mut self, text: &str) -> HtmlResult<()> {
        if !self.open_elements.current_tag().is_raw_text() {
            self.reconstruct_active_formatting_elements()?;
        }
        let parent = self.open_elements.current_node();
        self.tree.insert_text(parent, text)?;
        Ok(())
    }

    fn close_p_in_button_scope(&mut self) {
        if self.open_elements.has_in_button_scope(&TagName::P) {
            self.close_p();
        }
    }

    fn close_p(&mut self) {
        self.generate_implied_end_tags(&[TagName::P], false);
        self.expect_current(&TagName::P);
        self.open_elements.pop_until_tag(&TagName::P);
    }

    /// Close an open list item before a new one, stopping at special
    /// elements other than ADDRESS, DIV and P
    fn close_list_item(&mut self, targets: &[TagName]) {
        for index in (1..self.open_elements.len()).rev() {
            let Some(entry) = self.open_elements.get(index) else {
                break;
            };
            let tag = entry.tag.clone();
            if targets.contains(&tag) {
                self.generate_implied_end_tags(&[tag.clone()], false);
                self.expect_current(&tag);
                self.open_elements.pop_until_tag(&tag);
                return;
            }
            if tag.is_special() && !matches!(tag, TagName::Address | TagName::Div | TagName::P) {
                return;
            }
        }
    }

    /// Pop elements whose end tag may be omitted until the current node is
    /// in `except`; `thoroughly` adds the table section elements
    fn generate_implied_end_tags(&mut self, except: &[TagName], thoroughly: bool) {
        loop {
            let current = self.open_elements.current_tag();
            if except.contains(current) {
                return;
            }
            let implied = matches!(
                current,
                TagName::Dd
                    | TagName::Dt
                    | TagName::Li
                    | TagName::Optgroup
                    | TagName::Option
                    | TagName::P
                    | TagName::Rb
                    | TagName::Rp
                    | TagName::Rt
                    | TagName::Rtc
            ) || (thoroughly
                && matches!(
                    current,
                    TagName::Caption
                        | TagName::Colgroup
                        | TagName::Tbody
                        | TagName::Td
                        | TagName::Tfoot
                        | TagName::Th
                        | TagName::Thead
                        | TagName::Tr
                ));
            if !implied || self.open_elements.pop().is_none() {
                return;
            }
        }
    }

    /// Reopen formatting elements closed by a block boundary
    fn reconstruct_active_formatting_elements(&mut self) -> HtmlResult<()> {
        let Some(last) = self.active_formatting.last() else {
            return Ok(());
        };
        if self.is_open_or_marker(last) {
            return Ok(());
        }

        // Rewind to the entry after the last open element or marker
        let mut index = self.active_formatting.len() - 1;
        while index > 0 {
            match self.active_formatting.get(index - 1) {
                Some(entry) if !self.is_open_or_marker(entry) => index -= 1,
                _ => break,
            }
        }

        // Advance, recreating each entry
        for index in index..self.active_formatting.len() {
            let entry = self.active_formatting.get(index).map(|entry| entry.token.clone());
            let Some(Token::Tag(tag)) = entry else {
                continue;
            };
            trace!("reconstructing {}", tag.name);
            let node = self.insert_element(&tag)?;
            self.active_formatting.set_node(index, node);
        }
        Ok(())
    }

    fn is_open_or_marker(&self, entry: &FormattingEntry) -> bool {
        match entry.node {
            Some(node) => self.open_elements.contains_node(node),
            None => true,
        }
    }

    /// The adoption agency algorithm for mis-nested formatting elements
    fn run_adoption_agency(&mut self, token: &TagToken) -> HtmlResult<AdoptionResult> {
        let subject = &token.name;

        // A current node that is not a formatting element just closes
        let current = self.open_elements.current_node();
        if self.open_elements.current_tag() == subject && !self.active_formatting.contains_node(current) {
            self.open_elements.pop();
            return Ok(AdoptionResult::Completed);
        }

        for _ in 0..ADOPTION_AGENCY_OUTER_LOOP_LIMIT {
            let Some(formatting_index) = self.active_formatting.last_element_after_marker(subject) else {
                return Ok(AdoptionResult::ProcessAsAnyOther);
            };
            let Some(formatting_entry) = self.active_formatting.get(formatting_index).cloned() else {
                return Ok(AdoptionResult::ProcessAsAnyOther);
            };
            let Some(formatting_node) = formatting_entry.node else {
                return Ok(AdoptionResult::ProcessAsAnyOther);
            };

            let Some(formatting_stack_index) = self.open_elements.position_of(formatting_node) else {
                self.parse_error(ParseErrorKind::FormattingElementNotOpen, subject.as_str());
                self.active_formatting.remove_node(formatting_node);
                return Ok(AdoptionResult::Completed);
            };

            if !self
                .open_elements
                .has_element_in_specific_scope(ScopeTarget::Node(formatting_node), Scope::Default)
            {
                self.parse_error(ParseErrorKind::FormattingElementNotInScope, subject.as_str());
                return Ok(AdoptionResult::Completed);
            }

            if formatting_node != self.open_elements.current_node() {
                self.parse_error(ParseErrorKind::MisnestedEndTag, subject.as_str());
            }

            // Furthest block: the topmost special element below the formatting element
            let furthest_block = self
                .open_elements
                .iter()
                .enumerate()
                .skip(formatting_stack_index + 1)
                .find(|(_, entry)| entry.tag.is_special())
                .map(|(index, entry)| (index, entry.node));
            let Some((furthest_index, furthest_node)) = furthest_block else {
                self.open_elements.pop_until_node(formatting_node);
                self.active_formatting.remove_node(formatting_node);
                return Ok(AdoptionResult::Completed);
            };

            let Some(common_ancestor) = self
                .open_elements
                .get(formatting_stack_index - 1)
                .map(|entry| entry.node)
            else {
                return Ok(AdoptionResult::Completed);
            };

            let mut bookmark = FormattingBookmark::Replace(formatting_node);
            let mut last_node = furthest_node;
            let mut node_index = furthest_index;
            let mut inner_loop_counter = 0;

            loop {
                inner_loop_counter += 1;
                node_index -= 1;
                let Some(node) = self.open_elements.get(node_index).map(|entry| entry.node) else {
                    break;
                };
                if node == formatting_node {
                    break;
                }

                if inner_loop_counter > ADOPTION_AGENCY_INNER_LOOP_LIMIT {
                    self.active_formatting.remove_node(node);
                }
                let Some(list_index) = self.active_formatting.position_of(node) else {
                    self.open_elements.remove_node(node);
                    continue;
                };

                let entry_token = self
                    .active_formatting
                    .get(list_index)
                    .map(|entry| entry.token.clone())
                    .unwrap_or(Token::Marker);
                let replacement = self.create_element_for(&entry_token)?;
                self.active_formatting.set_node(list_index, replacement);
                self.open_elements.replace_node(node_index, replacement);

                if last_node == furthest_node {
                    bookmark = FormattingBookmark::InsertAfter(replacement);
                }
                self.tree.append_child(replacement, last_node)?;
                last_node = replacement;
            }

            self.tree.append_child(common_ancestor, last_node)?;

            let new_element = self.create_element_for(&formatting_entry.token)?;
            self.tree.move_children(furthest_node, new_element)?;
            self.tree.append_child(furthest_node, new_element)?;

            match bookmark {
                FormattingBookmark::Replace(_) => {
                    if let Some(index) = self.active_formatting.position_of(formatting_node) {
                        self.active_formatting.set_node(index, new_element);
                    }
                }
                FormattingBookmark::InsertAfter(anchor) => {
                    self.active_formatting.remove_node(formatting_node);
                    let position = self
                        .active_formatting
                        .position_of(anchor)
                        .map_or(self.active_formatting.len(), |index| index + 1);
                    self.active_formatting.insert(
                        position,
                        FormattingEntry::element(formatting_entry.token.clone(), new_element),
                    );
                }
            }

            self.open_elements.remove_node(formatting_node);
            let below_furthest = self
                .open_elements
                .position_of(furthest_node)
                .map_or(self.open_elements.len(), |index| index + 1);
            self.open_elements
                .insert(below_furthest, new_element, subject.clone());
        }

        Ok(AdoptionResult::Completed)
    }

    /// Create a detached element from the token a formatting entry was made for
    fn create_element_for(&mut self, token: &Token) -> HtmlResult<NodeId> {
        match token {
            Token::Tag(tag) => Ok(self
                .tree
                .create_element(tag.name.to_lowercase(), tag.attributes.clone())),
            other => Err(HtmlError::NotATag(other.to_string())),
        }
    }
}

impl Default for HtmlParser {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use scalpel_dom::{AttributeValue, Queryable};
    use std::cell::RefCell;
    use std::rc::Rc;

    // Helper to parse HTML and return the tree
    fn parse(html: &str) -> DomTree {
        HtmlParser::new().parse(html).unwrap()
    }

    fn render(html: &str) -> String {
        parse(html).pretty_print()
    }

    fn parse_collecting_errors(html: &str) -> (DomTree, Vec<ParseErrorKind>) {
        let errors = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&errors);
        let tree = HtmlParser::new()
            .on_parse_error(move |error| sink.borrow_mut().push(error.kind))
            .parse(html)
            .unwrap();
        let kinds = errors.borrow().clone();
        (tree, kinds)
    }

    fn tag(name: TagName, is_opener: bool) -> Token {
        Token::tag(name, Attributes::new(), is_opener, None)
    }

    #[test]
    fn test_parse_with_attributes() {
        let tree = parse(r#"<div id="main" class="container">Content</div>"#);

        let main = tree.get_element_by_id("main");
        assert!(main.is_some());
        assert_eq!(tree.get_elements_by_class_name("container").len(), 1);
        assert_eq!(render(r#"<div id="main" hidden>"#), "<div id=\"main\" hidden>\n");
    }

    #[test]
    fn test_document_tags_are_absorbed_by_the_root() {
        let html = "<!DOCTYPE html>\n<html><head><title>Test</title></head><body><p>Hello</p></body></html>";
        let tree = parse(html);
        assert!(tree.get_elements_by_tag_name("html").is_empty());
        assert!(tree.get_elements_by_tag_name("body").is_empty());
        assert_eq!(tree.get_elements_by_tag_name("p").len(), 1);
        assert_eq!(tree.compat_mode(), CompatMode::NoQuirks);
        assert_eq!(render(html), "<title>\n  \"Test\"\n<p>\n  \"Hello\"\n");
    }

    #[test]
    fn test_div_closes_open_paragraph() {
        assert_eq!(render("<div><p>text</div>after"), "<div>\n  <p>\n    \"text\"\n\"after\"\n");
    }

    #[test]
    fn test_paragraphs_close_each_other() {
        assert_eq!(render("<p>one<p>two"), "<p>\n  \"one\"\n<p>\n  \"two\"\n");
        assert_eq!(render("<p>one<h1>two</h1>"), "<p>\n  \"one\"\n<h1>\n  \"two\"\n");
    }

    #[test]
    fn test_stray_paragraph_closer_inserts_empty_paragraph() {
        assert_eq!(render("a</p>b"), "\"a\"\n<p>\n\"b\"\n");
    }

    #[test]
    fn test_list_items_and_formatting_reconstruction() {
        let html = "<ul><li>1<li>2<li>3<li>Lorem<b>Ipsum<li>Dolor</ul>Sit<div>Amet";
        let expected = concat!(
            "<ul>\n",
            "  <li>\n    \"1\"\n",
            "  <li>\n    \"2\"\n",
            "  <li>\n    \"3\"\n",
            "  <li>\n    \"Lorem\"\n    <b>\n      \"Ipsum\"\n",
            "  <li>\n    <b>\n      \"Dolor\"\n",
            "<b>\n  \"Sit\"\n  <div>\n    \"Amet\"\n",
        );
        assert_eq!(render(html), expected);
        assert_eq!(parse(html).get_elements_by_tag_name("li").len(), 5);
    }

    #[test]
    fn test_nested_lists_keep_outer_item_open() {
        let html = "<ul><li>a<ul><li>b</ul><li>c</ul>";
        let expected = concat!(
            "<ul>\n",
            "  <li>\n    \"a\"\n    <ul>\n      <li>\n        \"b\"\n",
            "  <li>\n    \"c\"\n",
        );
        assert_eq!(render(html), expected);
    }

    #[test]
    fn test_definition_lists() {
        assert_eq!(
            render("<dl><dt>term<dd>one<dt>next</dl>"),
            "<dl>\n  <dt>\n    \"term\"\n  <dd>\n    \"one\"\n  <dt>\n    \"next\"\n"
        );
    }

    #[test]
    fn test_adoption_agency_across_paragraph() {
        let expected = "<b>\n  \"1\"\n<p>\n  <b>\n    \"2\"\n  \"3\"\n";
        assert_eq!(render("<b>1<p>2</b>3</p>"), expected);
    }

    #[test]
    fn test_adoption_agency_with_inner_formatting() {
        let expected = concat!(
            "<p>\n  \"One \"\n  <b>\n    \"Two \"\n    <i>\n      \"Three\"\n",
            "<b>\n  <i>\n    \" Four\"\n  \" Five\"\n",
            "\" Six\"\n",
        );
        let html = "<p>One <b>Two <i>Three</p> Four</i> Five</b> Six";
        assert_eq!(render(html), expected);
    }

    #[test]
    fn test_adoption_agency_drops_element_no_longer_open() {
        // </div> pops B off the stack, leaving it only in the formatting list
        let (tree, errors) = parse_collecting_errors("<div><b>x</div></b>y");
        assert_eq!(tree.pretty_print(), "<div>\n  <b>\n    \"x\"\n\"y\"\n");
        assert_eq!(
            errors,
            vec![ParseErrorKind::MisnestedEndTag, ParseErrorKind::FormattingElementNotOpen]
        );
    }

    #[test]
    fn test_adoption_agency_ignores_element_out_of_scope() {
        let (tree, errors) = parse_collecting_errors("<b><table><td></b>x");
        assert_eq!(
            tree.pretty_print(),
            "<b>\n  <table>\n    <td>\n      \"x\"\n"
        );
        assert_eq!(errors, vec![ParseErrorKind::FormattingElementNotInScope]);
    }

    #[test]
    fn test_adoption_agency_inner_loop_eviction() {
        // B sits four levels above the furthest block, so it is dropped
        let (tree, errors) = parse_collecting_errors("<a><b><i><u><s><div>x</a>y");
        let expected = concat!(
            "<a>\n  <b>\n    <i>\n      <u>\n        <s>\n",
            "<i>\n  <u>\n    <s>\n      <div>\n        <a>\n          \"x\"\n        \"y\"\n",
        );
        assert_eq!(tree.pretty_print(), expected);
        assert_eq!(errors, vec![ParseErrorKind::MisnestedEndTag]);
    }

    #[test]
    fn test_misnested_formatting_closers() {
        assert_eq!(render("<b><i>x</b>y</i>"), "<b>\n  <i>\n    \"x\"\n<i>\n  \"y\"\n");
    }

    #[test]
    fn test_nested_anchor_is_closed() {
        assert_eq!(
            render(r#"<a href="1">one<a href="2">two"#),
            "<a href=\"1\">\n  \"one\"\n<a href=\"2\">\n  \"two\"\n"
        );
    }

    #[test]
    fn test_nobr_nesting() {
        assert_eq!(render("<nobr>a<nobr>b"), "<nobr>\n  \"a\"\n<nobr>\n  \"b\"\n");
    }

    #[test]
    fn test_noahs_ark_limits_reconstruction() {
        let tree = parse("<p><b><b><b><b>x</p>y");
        // Four B elements were open, only three are reconstructed
        let expected = concat!(
            "<p>\n  <b>\n    <b>\n      <b>\n        <b>\n          \"x\"\n",
            "<b>\n  <b>\n    <b>\n      \"y\"\n",
        );
        assert_eq!(tree.pretty_print(), expected);
    }

    #[test]
    fn test_markers_stop_reconstruction() {
        assert_eq!(
            render("<b><object><i>x</object>y"),
            "<b>\n  <object>\n    <i>\n      \"x\"\n  \"y\"\n"
        );
    }

    #[test]
    fn test_void_elements_no_close() {
        let tree = parse("<div><br><hr><img><input></div>");
        let div = tree.get_elements_by_tag_name("div")[0];
        assert_eq!(tree.children(div).len(), 4);
        assert_eq!(render("<p>a<hr>b"), "<p>\n  \"a\"\n<hr>\n\"b\"\n");
    }

    #[test]
    fn test_br_closer_is_a_line_break() {
        assert_eq!(render("a</br>b"), "\"a\"\n<br>\n\"b\"\n");

        let mut parser = HtmlParser::new();
        parser.process_token(tag(TagName::Br, false)).unwrap();
        assert_eq!(parser.tree().pretty_print(), "<br>\n");
    }

    #[test]
    fn test_image_is_img() {
        assert_eq!(render("<image src=x>"), "<img src=\"x\">\n");
    }

    #[test]
    fn test_headings() {
        assert_eq!(render("<h1>a<h2>b</h1>c"), "<h1>\n  \"a\"\n<h2>\n  \"b\"\n\"c\"\n");
        assert_eq!(render("<h3>a</h4>b"), "<h3>\n  \"a\"\n\"b\"\n");
    }

    #[test]
    fn test_buttons_do_not_nest() {
        assert_eq!(render("<button>a<button>b"), "<button>\n  \"a\"\n<button>\n  \"b\"\n");
    }

    #[test]
    fn test_raw_text_elements() {
        let html = "<title>A &amp; <b></title><script>if (a<b) x()</script><textarea>1 &lt; 2</textarea>";
        let expected = concat!(
            "<title>\n  \"A & <b>\"\n",
            "<script>\n  \"if (a<b) x()\"\n",
            "<textarea>\n  \"1 < 2\"\n",
        );
        assert_eq!(render(html), expected);
    }

    #[test]
    fn test_options_and_select() {
        assert_eq!(
            render("<select><option>a<option>b</select>c"),
            "<select>\n  <option>\n    \"a\"\n  <option>\n    \"b\"\n\"c\"\n"
        );
    }

    #[test]
    fn test_ruby() {
        assert_eq!(
            render("<ruby>a<rb>b<rt>c<rp>d</ruby>"),
            "<ruby>\n  \"a\"\n  <rb>\n    \"b\"\n  <rt>\n    \"c\"\n  <rp>\n    \"d\"\n"
        );
    }

    #[test]
    fn test_table_and_quirks_mode() {
        assert_eq!(render("<p><table>"), "<p>\n  <table>\n");
        assert_eq!(render("<!DOCTYPE html><p><table>"), "<p>\n<table>\n");
        assert_eq!(render("<table><tr><td>x</table>y"), "<table>\n  <tr>\n    <td>\n      \"x\"\n\"y\"\n");
    }

    #[test]
    fn test_template_content() {
        assert_eq!(
            render("<b><template><i>x</template>y"),
            "<b>\n  <template>\n    <i>\n      \"x\"\n  \"y\"\n"
        );
    }

    #[test]
    fn test_unknown_end_tag_stops_at_special() {
        assert_eq!(render("<span><div>a</span>b</div>"), "<span>\n  <div>\n    \"ab\"\n");
    }

    #[test]
    fn test_compat_mode() {
        assert_eq!(parse("<p>").compat_mode(), CompatMode::Quirks);
        assert_eq!(parse("<!DOCTYPE html><p>").compat_mode(), CompatMode::NoQuirks);
        assert_eq!(parse("<p><!DOCTYPE html>").compat_mode(), CompatMode::Quirks);
        let limited = r#"<!DOCTYPE html PUBLIC "-//W3C//DTD XHTML 1.0 Transitional//EN" "x">"#;
        assert_eq!(parse(limited).compat_mode(), CompatMode::LimitedQuirks);
    }

    #[test]
    fn test_text_before_doctype_forces_quirks() {
        assert_eq!(parse("x<!DOCTYPE html><p>").compat_mode(), CompatMode::Quirks);
        assert_eq!(parse(" \n<!DOCTYPE html><p>").compat_mode(), CompatMode::NoQuirks);
        assert_eq!(parse("<!-- c --><!DOCTYPE html>").compat_mode(), CompatMode::NoQuirks);
    }

    #[test]
    fn test_first_doctype_wins() {
        let (tree, errors) = parse_collecting_errors("<!DOCTYPE html><!DOCTYPE foo><p>");
        assert_eq!(tree.compat_mode(), CompatMode::NoQuirks);
        assert_eq!(errors, vec![ParseErrorKind::LateDoctype]);
    }

    #[test]
    fn test_attributes_reach_the_tree() {
        let tree = parse(r#"<input type="checkbox" CHECKED value='a &amp; b' type="dup">"#);
        let input = tree.get_elements_by_tag_name("input")[0];
        let element = tree.get(input).and_then(|node| node.as_element()).unwrap();
        assert_eq!(element.get_attribute("checked"), Some(&AttributeValue::True));
        assert_eq!(element.get_attribute("value"), Some(&AttributeValue::from("a & b")));
        assert_eq!(element.get_attribute("type"), Some(&AttributeValue::from("checkbox")));
        assert_eq!(element.attributes.len(), 3);
    }

    #[test]
    fn test_parse_errors_reach_the_hook() {
        let errors = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&errors);
        HtmlParser::new()
            .on_parse_error(move |error| sink.borrow_mut().push(error.clone()))
            .parse("<div></span></div></div>")
            .unwrap();

        let errors = errors.borrow();
        assert_eq!(errors.len(), 2);
        assert_eq!(errors[0].tag, "span");
        assert_eq!(errors[1].kind, ParseErrorKind::UnexpectedEndTag);
        assert_eq!(errors[1].to_string(), "end tag without a matching open element (div)");
    }

    #[test]
    fn test_unsupported_constructs() {
        let error = HtmlParser::new().parse("<div><b><svg>").unwrap_err();
        match error {
            HtmlError::Unsupported {
                token,
                open_elements,
                active_formatting,
            } => {
                assert_eq!(token, "<svg>");
                assert_eq!(open_elements, vec!["html", "div", "b"]);
                assert_eq!(active_formatting, vec!["<b>"]);
            }
            other => panic!("unexpected error {other:?}"),
        }

        let mut parser = HtmlParser::new();
        assert!(matches!(parser.process_token(Token::marker()), Err(HtmlError::Unsupported { .. })));
    }

    #[test]
    fn test_incomplete_input() {
        let error = HtmlParser::new().parse("<p>ok<script>never").unwrap_err();
        assert!(matches!(error, HtmlError::IncompleteInput { offset: 5 }));
    }

    #[test]
    fn test_process_tokens_directly() {
        let mut parser = HtmlParser::new();
        for token in [
            tag(TagName::Div, true),
            Token::text("a"),
            Token::text("b"),
            tag(TagName::Div, false),
        ] {
            parser.process_token(token).unwrap();
        }
        let tree = parser.finish();
        assert_eq!(tree.pretty_print(), "<div>\n  \"ab\"\n");
        assert_eq!(tree.compat_mode(), CompatMode::Quirks);
    }
}
