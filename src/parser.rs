//! Grammar analysis.
//!
//! The parser consumes tokens one at a time, with one token of lookahead,
//! and produces one structural event per call. It follows the grammar
//!
//! ```text
//! stream  ::= STREAM-START document* STREAM-END
//! document ::= directives? DOCUMENT-START? node? DOCUMENT-END*
//! node    ::= ALIAS | properties? (scalar | sequence | mapping)
//! ```
//!
//! realized as an explicit state machine: each grammar continuation point is
//! an enum state pushed onto a stack before descending into a
//! sub-production, and popped to resume the caller's production. The
//! machine is resumable across calls by construction; nothing recurses.

use crate::error::{Error, Result};
use crate::event::{CollectionStyle, Event, EventData, TagDirective, VersionDirective};
use crate::mark::Mark;
use crate::reader::Input;
use crate::scanner::Scanner;
use crate::token::{ScalarStyle, Token, TokenData};

/// Built-in tag shorthands, always registered for every document.
const DEFAULT_TAG_DIRECTIVES: [(&str, &str); 2] =
    [("!", "!"), ("!!", "tag:yaml.org,2002:")];

/// Grammar continuation points.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    StreamStart,
    ImplicitDocumentStart,
    DocumentStart,
    DocumentContent,
    DocumentEnd,
    BlockNode,
    BlockNodeOrIndentlessSequence,
    FlowNode,
    BlockSequenceFirstEntry,
    BlockSequenceEntry,
    IndentlessSequenceEntry,
    BlockMappingFirstKey,
    BlockMappingKey,
    BlockMappingValue,
    FlowSequenceFirstEntry,
    FlowSequenceEntry,
    FlowSequenceEntryMappingKey,
    FlowSequenceEntryMappingValue,
    FlowSequenceEntryMappingEnd,
    FlowMappingFirstKey,
    FlowMappingKey,
    FlowMappingValue,
    FlowMappingEmptyValue,
    End,
}

/// Streaming event producer. Pull events with
/// [`next_event`](Parser::next_event), or iterate.
pub struct Parser {
    scanner: Scanner,
    state: State,
    states: Vec<State>,
    marks: Vec<Mark>,
    tag_directives: Vec<TagDirective>,
    /// One-token lookahead.
    token: Option<Token>,
    stream_end_produced: bool,
    error: Option<Error>,
    iter_done: bool,
}

impl Parser {
    /// Create a parser over the given input source.
    pub fn new(input: impl Into<Input>) -> Self {
        Self {
            scanner: Scanner::new(input),
            state: State::StreamStart,
            states: Vec::new(),
            marks: Vec::new(),
            tag_directives: Vec::new(),
            token: None,
            stream_end_produced: false,
            error: None,
            iter_done: false,
        }
    }

    /// Produce the next structural event.
    ///
    /// The first event is STREAM-START and the last is STREAM-END; after
    /// that, further calls keep returning STREAM-END. Once an error is
    /// returned, every subsequent call returns the same error.
    pub fn next_event(&mut self) -> Result<Event> {
        if let Some(error) = &self.error {
            return Err(error.clone());
        }
        if self.stream_end_produced || self.state == State::End {
            return Ok(Event::stream_end());
        }
        match self.state_machine() {
            Ok(event) => {
                if event.data == EventData::StreamEnd {
                    self.stream_end_produced = true;
                }
                Ok(event)
            }
            Err(error) => {
                self.error = Some(error.clone());
                Err(error)
            }
        }
    }

    fn peek_token(&mut self) -> Result<&Token> {
        if let Some(ref token) = self.token {
            return Ok(token);
        }
        let token = self.scanner.next_token()?;
        Ok(self.token.insert(token))
    }

    fn take_token(&mut self) -> Result<Token> {
        match self.token.take() {
            Some(token) => Ok(token),
            None => self.scanner.next_token(),
        }
    }

    fn skip_token(&mut self) {
        self.token = None;
    }

    fn pop_state(&mut self) -> State {
        self.states.pop().unwrap_or(State::End)
    }

    fn pop_mark(&mut self) -> Mark {
        self.marks.pop().unwrap_or_default()
    }

    fn state_machine(&mut self) -> Result<Event> {
        match self.state {
            State::StreamStart => self.parse_stream_start(),
            State::ImplicitDocumentStart => self.parse_document_start(true),
            State::DocumentStart => self.parse_document_start(false),
            State::DocumentContent => self.parse_document_content(),
            State::DocumentEnd => self.parse_document_end(),
            State::BlockNode => self.parse_node(true, false),
            State::BlockNodeOrIndentlessSequence => self.parse_node(true, true),
            State::FlowNode => self.parse_node(false, false),
            State::BlockSequenceFirstEntry => self.parse_block_sequence_entry(true),
            State::BlockSequenceEntry => self.parse_block_sequence_entry(false),
            State::IndentlessSequenceEntry => self.parse_indentless_sequence_entry(),
            State::BlockMappingFirstKey => self.parse_block_mapping_key(true),
            State::BlockMappingKey => self.parse_block_mapping_key(false),
            State::BlockMappingValue => self.parse_block_mapping_value(),
            State::FlowSequenceFirstEntry => self.parse_flow_sequence_entry(true),
            State::FlowSequenceEntry => self.parse_flow_sequence_entry(false),
            State::FlowSequenceEntryMappingKey => self.parse_flow_sequence_entry_mapping_key(),
            State::FlowSequenceEntryMappingValue => {
                self.parse_flow_sequence_entry_mapping_value()
            }
            State::FlowSequenceEntryMappingEnd => self.parse_flow_sequence_entry_mapping_end(),
            State::FlowMappingFirstKey => self.parse_flow_mapping_key(true),
            State::FlowMappingKey => self.parse_flow_mapping_key(false),
            State::FlowMappingValue => self.parse_flow_mapping_value(false),
            State::FlowMappingEmptyValue => self.parse_flow_mapping_value(true),
            State::End => Ok(Event::stream_end()),
        }
    }

    fn parse_stream_start(&mut self) -> Result<Event> {
        let token = self.peek_token()?;
        if let TokenData::StreamStart { encoding } = token.data {
            let event = Event::new(
                EventData::StreamStart { encoding },
                token.start_mark,
                token.end_mark,
            );
            self.state = State::ImplicitDocumentStart;
            self.skip_token();
            Ok(event)
        } else {
            Err(Error::parser(
                "did not find expected <stream-start>",
                token.start_mark,
            ))
        }
    }

    fn parse_document_start(&mut self, implicit: bool) -> Result<Event> {
        if !implicit {
            // Any number of DOCUMENT-END tokens may close the previous
            // document.
            while self.peek_token()?.data == TokenData::DocumentEnd {
                self.skip_token();
            }
        }

        let token = self.peek_token()?;
        let is_directive = matches!(
            token.data,
            TokenData::VersionDirective { .. } | TokenData::TagDirective { .. }
        );

        if implicit
            && !is_directive
            && token.data != TokenData::DocumentStart
            && token.data != TokenData::StreamEnd
        {
            // An implicit document: content with no preceding markers.
            let mark = token.start_mark;
            self.process_directives()?;
            self.states.push(State::DocumentEnd);
            self.state = State::BlockNode;
            return Ok(Event::new(
                EventData::DocumentStart {
                    version: None,
                    tags: Vec::new(),
                    implicit: true,
                },
                mark,
                mark,
            ));
        }

        if token.data != TokenData::StreamEnd {
            // An explicit document, possibly introduced by directives.
            let start_mark = self.peek_token()?.start_mark;
            let (version, tags) = self.process_directives()?;
            let token = self.peek_token()?;
            if token.data != TokenData::DocumentStart {
                return Err(Error::parser(
                    "did not find expected <document start>",
                    token.start_mark,
                ));
            }
            let end_mark = token.end_mark;
            self.states.push(State::DocumentEnd);
            self.state = State::DocumentContent;
            self.skip_token();
            return Ok(Event::new(
                EventData::DocumentStart {
                    version,
                    tags,
                    implicit: false,
                },
                start_mark,
                end_mark,
            ));
        }

        let token = self.take_token()?;
        self.state = State::End;
        Ok(Event::new(
            EventData::StreamEnd,
            token.start_mark,
            token.end_mark,
        ))
    }

    /// Consume directive tokens, validate them, and install the document's
    /// tag directive table (declared handles plus the two defaults).
    fn process_directives(&mut self) -> Result<(Option<VersionDirective>, Vec<TagDirective>)> {
        let mut version: Option<VersionDirective> = None;
        let mut tags: Vec<TagDirective> = Vec::new();

        loop {
            let token = self.peek_token()?;
            match &token.data {
                TokenData::VersionDirective { major, minor } => {
                    if version.is_some() {
                        return Err(Error::parser(
                            "found duplicate %YAML directive",
                            token.start_mark,
                        ));
                    }
                    if *major != 1 || *minor != 1 {
                        return Err(Error::parser(
                            "found incompatible YAML document",
                            token.start_mark,
                        ));
                    }
                    version = Some(VersionDirective {
                        major: *major,
                        minor: *minor,
                    });
                }
                TokenData::TagDirective { handle, prefix } => {
                    let directive = TagDirective {
                        handle: handle.clone(),
                        prefix: prefix.clone(),
                    };
                    let mark = token.start_mark;
                    self.append_tag_directive(directive.clone(), false, mark)?;
                    tags.push(directive);
                }
                _ => break,
            }
            self.skip_token();
        }

        let mark = self.peek_token()?.start_mark;
        for (handle, prefix) in DEFAULT_TAG_DIRECTIVES {
            self.append_tag_directive(
                TagDirective {
                    handle: handle.to_string(),
                    prefix: prefix.to_string(),
                },
                true,
                mark,
            )?;
        }
        Ok((version, tags))
    }

    fn append_tag_directive(
        &mut self,
        directive: TagDirective,
        allow_duplicates: bool,
        mark: Mark,
    ) -> Result<()> {
        if self
            .tag_directives
            .iter()
            .any(|d| d.handle == directive.handle)
        {
            if allow_duplicates {
                return Ok(());
            }
            return Err(Error::parser("found duplicate %TAG directive", mark));
        }
        self.tag_directives.push(directive);
        Ok(())
    }

    fn parse_document_content(&mut self) -> Result<Event> {
        let token = self.peek_token()?;
        if matches!(
            token.data,
            TokenData::VersionDirective { .. }
                | TokenData::TagDirective { .. }
                | TokenData::DocumentStart
                | TokenData::DocumentEnd
                | TokenData::StreamEnd
        ) {
            let mark = token.start_mark;
            self.state = self.pop_state();
            Ok(empty_scalar(mark))
        } else {
            self.parse_node(true, false)
        }
    }

    fn parse_document_end(&mut self) -> Result<Event> {
        let token = self.peek_token()?;
        let start_mark = token.start_mark;
        let mut end_mark = start_mark;
        let mut implicit = true;
        if token.data == TokenData::DocumentEnd {
            end_mark = token.end_mark;
            self.skip_token();
            implicit = false;
        }
        // Directive bindings do not cross document boundaries.
        self.tag_directives.clear();
        self.state = State::DocumentStart;
        Ok(Event::new(
            EventData::DocumentEnd { implicit },
            start_mark,
            end_mark,
        ))
    }

    /// Parse a node: alias, or properties followed by scalar/sequence/
    /// mapping content. `indentless` admits a sequence of `-` entries with
    /// no enclosing BLOCK-SEQUENCE-START, legal directly under a mapping
    /// value.
    fn parse_node(&mut self, block: bool, indentless: bool) -> Result<Event> {
        let token = self.peek_token()?;

        if let TokenData::Alias { value } = &token.data {
            let event = Event::new(
                EventData::Alias {
                    anchor: value.clone(),
                },
                token.start_mark,
                token.end_mark,
            );
            self.state = self.pop_state();
            self.skip_token();
            return Ok(event);
        }

        let start_mark = token.start_mark;
        let mut end_mark = token.start_mark;
        let mut anchor: Option<String> = None;
        let mut shorthand: Option<(String, String)> = None;
        let mut tag_mark = start_mark;

        // Properties may appear in either order.
        if let TokenData::Anchor { value } = &token.data {
            anchor = Some(value.clone());
            end_mark = token.end_mark;
            self.skip_token();
            let token = self.peek_token()?;
            if let TokenData::Tag { handle, suffix } = &token.data {
                tag_mark = token.start_mark;
                end_mark = token.end_mark;
                shorthand = Some((handle.clone(), suffix.clone()));
                self.skip_token();
            }
        } else if let TokenData::Tag { handle, suffix } = &token.data {
            tag_mark = token.start_mark;
            end_mark = token.end_mark;
            shorthand = Some((handle.clone(), suffix.clone()));
            self.skip_token();
            let token = self.peek_token()?;
            if let TokenData::Anchor { value } = &token.data {
                anchor = Some(value.clone());
                end_mark = token.end_mark;
                self.skip_token();
            }
        }

        let mut tag: Option<String> = None;
        if let Some((handle, suffix)) = shorthand {
            if handle.is_empty() {
                // A verbatim tag or the bare '!': the suffix is the tag.
                tag = Some(suffix);
            } else {
                match self
                    .tag_directives
                    .iter()
                    .find(|d| d.handle == handle)
                {
                    Some(directive) => {
                        tag = Some(format!("{}{}", directive.prefix, suffix));
                    }
                    None => {
                        return Err(Error::parser_context(
                            "while parsing a node",
                            start_mark,
                            "found undefined tag handle",
                            tag_mark,
                        ));
                    }
                }
            }
        }

        let implicit = tag.as_deref().map_or(true, |t| t.is_empty());
        let token = self.peek_token()?;

        if indentless && token.data == TokenData::BlockEntry {
            let end_mark = token.start_mark;
            self.state = State::IndentlessSequenceEntry;
            return Ok(Event::new(
                EventData::SequenceStart {
                    anchor,
                    tag,
                    implicit,
                    style: CollectionStyle::Block,
                },
                start_mark,
                end_mark,
            ));
        }

        if let TokenData::Scalar { value, style } = &token.data {
            let mut plain_implicit = false;
            let mut quoted_implicit = false;
            if (*style == ScalarStyle::Plain && tag.is_none()) || tag.as_deref() == Some("!") {
                plain_implicit = true;
            } else if tag.is_none() {
                quoted_implicit = true;
            }
            let event = Event::new(
                EventData::Scalar {
                    anchor,
                    tag,
                    value: value.clone(),
                    plain_implicit,
                    quoted_implicit,
                    style: *style,
                },
                start_mark,
                token.end_mark,
            );
            self.state = self.pop_state();
            self.skip_token();
            return Ok(event);
        }

        if token.data == TokenData::FlowSequenceStart {
            let end_mark = token.end_mark;
            self.state = State::FlowSequenceFirstEntry;
            return Ok(Event::new(
                EventData::SequenceStart {
                    anchor,
                    tag,
                    implicit,
                    style: CollectionStyle::Flow,
                },
                start_mark,
                end_mark,
            ));
        }

        if token.data == TokenData::FlowMappingStart {
            let end_mark = token.end_mark;
            self.state = State::FlowMappingFirstKey;
            return Ok(Event::new(
                EventData::MappingStart {
                    anchor,
                    tag,
                    implicit,
                    style: CollectionStyle::Flow,
                },
                start_mark,
                end_mark,
            ));
        }

        if block && token.data == TokenData::BlockSequenceStart {
            let end_mark = token.end_mark;
            self.state = State::BlockSequenceFirstEntry;
            return Ok(Event::new(
                EventData::SequenceStart {
                    anchor,
                    tag,
                    implicit,
                    style: CollectionStyle::Block,
                },
                start_mark,
                end_mark,
            ));
        }

        if block && token.data == TokenData::BlockMappingStart {
            let end_mark = token.end_mark;
            self.state = State::BlockMappingFirstKey;
            return Ok(Event::new(
                EventData::MappingStart {
                    anchor,
                    tag,
                    implicit,
                    style: CollectionStyle::Block,
                },
                start_mark,
                end_mark,
            ));
        }

        if anchor.is_some() || tag.is_some() {
            // Properties with no content: an empty node.
            let event = Event::new(
                EventData::Scalar {
                    anchor,
                    tag,
                    value: String::new(),
                    plain_implicit: implicit,
                    quoted_implicit: false,
                    style: ScalarStyle::Plain,
                },
                start_mark,
                end_mark,
            );
            self.state = self.pop_state();
            return Ok(event);
        }

        Err(Error::parser_context(
            if block {
                "while parsing a block node"
            } else {
                "while parsing a flow node"
            },
            start_mark,
            "did not find expected node content",
            token.start_mark,
        ))
    }

    fn parse_block_sequence_entry(&mut self, first: bool) -> Result<Event> {
        if first {
            let token = self.peek_token()?;
            let mark = token.start_mark;
            self.marks.push(mark);
            self.skip_token();
        }

        let token = self.peek_token()?;
        match token.data {
            TokenData::BlockEntry => {
                let mark = token.end_mark;
                self.skip_token();
                let token = self.peek_token()?;
                if !matches!(token.data, TokenData::BlockEntry | TokenData::BlockEnd) {
                    self.states.push(State::BlockSequenceEntry);
                    self.parse_node(true, false)
                } else {
                    self.state = State::BlockSequenceEntry;
                    Ok(empty_scalar(mark))
                }
            }
            TokenData::BlockEnd => {
                let event =
                    Event::new(EventData::SequenceEnd, token.start_mark, token.end_mark);
                self.pop_mark();
                self.state = self.pop_state();
                self.skip_token();
                Ok(event)
            }
            _ => {
                let problem_mark = token.start_mark;
                let context_mark = self.pop_mark();
                Err(Error::parser_context(
                    "while parsing a block collection",
                    context_mark,
                    "did not find expected '-' indicator",
                    problem_mark,
                ))
            }
        }
    }

    fn parse_indentless_sequence_entry(&mut self) -> Result<Event> {
        let token = self.peek_token()?;
        if token.data == TokenData::BlockEntry {
            let mark = token.end_mark;
            self.skip_token();
            let token = self.peek_token()?;
            if !matches!(
                token.data,
                TokenData::BlockEntry | TokenData::Key | TokenData::Value | TokenData::BlockEnd
            ) {
                self.states.push(State::IndentlessSequenceEntry);
                self.parse_node(true, false)
            } else {
                self.state = State::IndentlessSequenceEntry;
                Ok(empty_scalar(mark))
            }
        } else {
            // The sequence ends at whatever token follows; it is not
            // consumed, since it belongs to the enclosing production.
            let mark = token.start_mark;
            self.state = self.pop_state();
            Ok(Event::new(EventData::SequenceEnd, mark, mark))
        }
    }

    fn parse_block_mapping_key(&mut self, first: bool) -> Result<Event> {
        if first {
            let token = self.peek_token()?;
            let mark = token.start_mark;
            self.marks.push(mark);
            self.skip_token();
        }

        let token = self.peek_token()?;
        match token.data {
            TokenData::Key => {
                let mark = token.end_mark;
                self.skip_token();
                let token = self.peek_token()?;
                if !matches!(
                    token.data,
                    TokenData::Key | TokenData::Value | TokenData::BlockEnd
                ) {
                    self.states.push(State::BlockMappingValue);
                    self.parse_node(true, true)
                } else {
                    self.state = State::BlockMappingValue;
                    Ok(empty_scalar(mark))
                }
            }
            TokenData::BlockEnd => {
                let event = Event::new(EventData::MappingEnd, token.start_mark, token.end_mark);
                self.pop_mark();
                self.state = self.pop_state();
                self.skip_token();
                Ok(event)
            }
            _ => {
                let problem_mark = token.start_mark;
                let context_mark = self.pop_mark();
                Err(Error::parser_context(
                    "while parsing a block mapping",
                    context_mark,
                    "did not find expected key",
                    problem_mark,
                ))
            }
        }
    }

    fn parse_block_mapping_value(&mut self) -> Result<Event> {
        let token = self.peek_token()?;
        if token.data == TokenData::Value {
            let mark = token.end_mark;
            self.skip_token();
            let token = self.peek_token()?;
            if !matches!(
                token.data,
                TokenData::Key | TokenData::Value | TokenData::BlockEnd
            ) {
                self.states.push(State::BlockMappingKey);
                self.parse_node(true, true)
            } else {
                self.state = State::BlockMappingKey;
                Ok(empty_scalar(mark))
            }
        } else {
            let mark = token.start_mark;
            self.state = State::BlockMappingKey;
            Ok(empty_scalar(mark))
        }
    }

    fn parse_flow_sequence_entry(&mut self, first: bool) -> Result<Event> {
        if first {
            let token = self.peek_token()?;
            let mark = token.start_mark;
            self.marks.push(mark);
            self.skip_token();
        }

        let token = self.peek_token()?;
        if token.data != TokenData::FlowSequenceEnd {
            if !first {
                if token.data == TokenData::FlowEntry {
                    self.skip_token();
                } else {
                    let problem_mark = token.start_mark;
                    let context_mark = self.pop_mark();
                    return Err(Error::parser_context(
                        "while parsing a flow sequence",
                        context_mark,
                        "did not find expected ',' or ']'",
                        problem_mark,
                    ));
                }
            }

            let token = self.peek_token()?;
            if token.data == TokenData::Key {
                // A single-pair mapping inside a flow sequence.
                let event = Event::new(
                    EventData::MappingStart {
                        anchor: None,
                        tag: None,
                        implicit: true,
                        style: CollectionStyle::Flow,
                    },
                    token.start_mark,
                    token.end_mark,
                );
                self.state = State::FlowSequenceEntryMappingKey;
                self.skip_token();
                return Ok(event);
            }
            if token.data != TokenData::FlowSequenceEnd {
                self.states.push(State::FlowSequenceEntry);
                return self.parse_node(false, false);
            }
        }

        let token = self.take_token()?;
        self.pop_mark();
        self.state = self.pop_state();
        Ok(Event::new(
            EventData::SequenceEnd,
            token.start_mark,
            token.end_mark,
        ))
    }

    fn parse_flow_sequence_entry_mapping_key(&mut self) -> Result<Event> {
        let token = self.peek_token()?;
        if !matches!(
            token.data,
            TokenData::Value | TokenData::FlowEntry | TokenData::FlowSequenceEnd
        ) {
            self.states.push(State::FlowSequenceEntryMappingValue);
            self.parse_node(false, false)
        } else {
            let mark = token.end_mark;
            self.state = State::FlowSequenceEntryMappingValue;
            Ok(empty_scalar(mark))
        }
    }

    fn parse_flow_sequence_entry_mapping_value(&mut self) -> Result<Event> {
        let token = self.peek_token()?;
        if token.data == TokenData::Value {
            self.skip_token();
            let token = self.peek_token()?;
            if !matches!(
                token.data,
                TokenData::FlowEntry | TokenData::FlowSequenceEnd
            ) {
                self.states.push(State::FlowSequenceEntryMappingEnd);
                return self.parse_node(false, false);
            }
            let mark = token.start_mark;
            self.state = State::FlowSequenceEntryMappingEnd;
            Ok(empty_scalar(mark))
        } else {
            let mark = token.start_mark;
            self.state = State::FlowSequenceEntryMappingEnd;
            Ok(empty_scalar(mark))
        }
    }

    fn parse_flow_sequence_entry_mapping_end(&mut self) -> Result<Event> {
        let mark = self.peek_token()?.start_mark;
        self.state = State::FlowSequenceEntry;
        Ok(Event::new(EventData::MappingEnd, mark, mark))
    }

    fn parse_flow_mapping_key(&mut self, first: bool) -> Result<Event> {
        if first {
            let token = self.peek_token()?;
            let mark = token.start_mark;
            self.marks.push(mark);
            self.skip_token();
        }

        let token = self.peek_token()?;
        if token.data != TokenData::FlowMappingEnd {
            if !first {
                if token.data == TokenData::FlowEntry {
                    self.skip_token();
                } else {
                    let problem_mark = token.start_mark;
                    let context_mark = self.pop_mark();
                    return Err(Error::parser_context(
                        "while parsing a flow mapping",
                        context_mark,
                        "did not find expected ',' or '}'",
                        problem_mark,
                    ));
                }
            }

            let token = self.peek_token()?;
            if token.data == TokenData::Key {
                self.skip_token();
                let token = self.peek_token()?;
                if !matches!(
                    token.data,
                    TokenData::Value | TokenData::FlowEntry | TokenData::FlowMappingEnd
                ) {
                    self.states.push(State::FlowMappingValue);
                    return self.parse_node(false, false);
                }
                let mark = token.start_mark;
                self.state = State::FlowMappingValue;
                return Ok(empty_scalar(mark));
            }
            if token.data != TokenData::FlowMappingEnd {
                self.states.push(State::FlowMappingEmptyValue);
                return self.parse_node(false, false);
            }
        }

        let token = self.take_token()?;
        self.pop_mark();
        self.state = self.pop_state();
        Ok(Event::new(
            EventData::MappingEnd,
            token.start_mark,
            token.end_mark,
        ))
    }

    fn parse_flow_mapping_value(&mut self, empty: bool) -> Result<Event> {
        let token = self.peek_token()?;
        let mark = token.start_mark;
        if empty {
            self.state = State::FlowMappingKey;
            return Ok(empty_scalar(mark));
        }
        if token.data == TokenData::Value {
            self.skip_token();
            let token = self.peek_token()?;
            if !matches!(
                token.data,
                TokenData::FlowEntry | TokenData::FlowMappingEnd
            ) {
                self.states.push(State::FlowMappingKey);
                return self.parse_node(false, false);
            }
            let mark = token.start_mark;
            self.state = State::FlowMappingKey;
            return Ok(empty_scalar(mark));
        }
        self.state = State::FlowMappingKey;
        Ok(empty_scalar(mark))
    }
}

/// A node with no content: a zero-length plain scalar at the triggering
/// position.
fn empty_scalar(mark: Mark) -> Event {
    Event::new(
        EventData::Scalar {
            anchor: None,
            tag: None,
            value: String::new(),
            plain_implicit: true,
            quoted_implicit: false,
            style: ScalarStyle::Plain,
        },
        mark,
        mark,
    )
}

impl Iterator for Parser {
    type Item = Result<Event>;

    /// Yields events through STREAM-END, then fuses. An error is yielded
    /// once and ends the iteration.
    fn next(&mut self) -> Option<Self::Item> {
        if self.iter_done {
            return None;
        }
        match self.next_event() {
            Ok(event) => {
                if event.data == EventData::StreamEnd {
                    self.iter_done = true;
                }
                Some(Ok(event))
            }
            Err(error) => {
                self.iter_done = true;
                Some(Err(error))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Collect every event kind from the input, panicking on errors.
    fn event_kinds(input: &str) -> Vec<EventData> {
        Parser::new(input)
            .map(|result| result.expect("parse failed").data)
            .collect()
    }

    fn parse_error(input: &str) -> Error {
        for result in Parser::new(input) {
            if let Err(error) = result {
                return error;
            }
        }
        panic!("expected a parse error for {:?}", input);
    }

    fn plain(value: &str) -> EventData {
        EventData::Scalar {
            anchor: None,
            tag: None,
            value: value.to_string(),
            plain_implicit: true,
            quoted_implicit: false,
            style: ScalarStyle::Plain,
        }
    }

    #[test]
    fn test_block_sequence_events() {
        use crate::encoding::Encoding;
        assert_eq!(
            event_kinds("- 1\n- 2\n"),
            vec![
                EventData::StreamStart {
                    encoding: Encoding::Utf8
                },
                EventData::DocumentStart {
                    version: None,
                    tags: Vec::new(),
                    implicit: true,
                },
                EventData::SequenceStart {
                    anchor: None,
                    tag: None,
                    implicit: true,
                    style: CollectionStyle::Block,
                },
                plain("1"),
                plain("2"),
                EventData::SequenceEnd,
                EventData::DocumentEnd { implicit: true },
                EventData::StreamEnd,
            ]
        );
    }

    #[test]
    fn test_block_mapping_events() {
        let kinds = event_kinds("a: 1\nb: 2\n");
        assert!(matches!(
            kinds[2],
            EventData::MappingStart {
                style: CollectionStyle::Block,
                ..
            }
        ));
        assert_eq!(kinds[3], plain("a"));
        assert_eq!(kinds[4], plain("1"));
        assert!(kinds.contains(&EventData::MappingEnd));
    }

    #[test]
    fn test_empty_stream() {
        use crate::encoding::Encoding;
        assert_eq!(
            event_kinds(""),
            vec![
                EventData::StreamStart {
                    encoding: Encoding::Utf8
                },
                EventData::StreamEnd,
            ]
        );
    }

    #[test]
    fn test_explicit_document_markers_round_trip_flags() {
        let kinds = event_kinds("---\nvalue\n...\n");
        assert!(kinds.iter().any(
            |k| matches!(k, EventData::DocumentStart { implicit: false, .. })
        ));
        assert!(kinds.contains(&EventData::DocumentEnd { implicit: false }));
    }

    #[test]
    fn test_multiple_documents() {
        let kinds = event_kinds("---\none\n---\ntwo\n");
        let starts = kinds
            .iter()
            .filter(|k| matches!(k, EventData::DocumentStart { .. }))
            .count();
        assert_eq!(starts, 2);
    }

    #[test]
    fn test_secondary_tag_resolution() {
        let kinds = event_kinds("!!str text\n");
        assert!(kinds.iter().any(|k| matches!(
            k,
            EventData::Scalar { tag: Some(tag), .. } if tag == "tag:yaml.org,2002:str"
        )));
    }

    #[test]
    fn test_tag_directive_resolution() {
        let kinds = event_kinds("%TAG !e! tag:example.com,2000:app/\n---\n!e!thing data\n");
        assert!(kinds.iter().any(|k| matches!(
            k,
            EventData::Scalar { tag: Some(tag), .. } if tag == "tag:example.com,2000:app/thing"
        )));
    }

    #[test]
    fn test_undefined_tag_handle_is_an_error() {
        let error = parse_error("!e!thing data\n");
        assert!(error.to_string().contains("found undefined tag handle"));
    }

    #[test]
    fn test_tag_directive_does_not_leak_across_documents() {
        let error = parse_error(
            "%TAG !e! tag:example.com,2000:app/\n---\n!e!one 1\n---\n!e!two 2\n",
        );
        assert!(error.to_string().contains("found undefined tag handle"));
    }

    #[test]
    fn test_duplicate_yaml_directive_is_an_error() {
        let error = parse_error("%YAML 1.1\n%YAML 1.1\n---\nx\n");
        assert!(error.to_string().contains("found duplicate %YAML directive"));
    }

    #[test]
    fn test_incompatible_version_is_an_error() {
        let error = parse_error("%YAML 2.0\n---\nx\n");
        assert!(error
            .to_string()
            .contains("found incompatible YAML document"));
    }

    #[test]
    fn test_duplicate_tag_directive_is_an_error() {
        let error = parse_error("%TAG !e! tag:a/\n%TAG !e! tag:b/\n---\nx\n");
        assert!(error.to_string().contains("found duplicate %TAG directive"));
    }

    #[test]
    fn test_anchor_and_alias_events() {
        let kinds = event_kinds("- &a x\n- *a\n");
        assert!(kinds.iter().any(|k| matches!(
            k,
            EventData::Scalar { anchor: Some(anchor), .. } if anchor == "a"
        )));
        assert!(kinds.contains(&EventData::Alias {
            anchor: "a".to_string()
        }));
    }

    #[test]
    fn test_indentless_sequence_under_mapping() {
        let kinds = event_kinds("key:\n- a\n- b\n");
        // mapping start, key scalar, then the indentless sequence.
        assert!(matches!(kinds[2], EventData::MappingStart { .. }));
        assert_eq!(kinds[3], plain("key"));
        assert!(matches!(kinds[4], EventData::SequenceStart { .. }));
        assert_eq!(kinds[5], plain("a"));
        assert_eq!(kinds[6], plain("b"));
        assert!(matches!(kinds[7], EventData::SequenceEnd));
    }

    #[test]
    fn test_empty_mapping_value_synthesizes_scalar() {
        let kinds = event_kinds("a:\nb: 1\n");
        assert_eq!(kinds[3], plain("a"));
        assert_eq!(kinds[4], plain(""));
    }

    #[test]
    fn test_flow_sequence_events() {
        let kinds = event_kinds("[a, b]");
        assert!(matches!(
            kinds[2],
            EventData::SequenceStart {
                style: CollectionStyle::Flow,
                ..
            }
        ));
        assert!(kinds.contains(&EventData::SequenceEnd));
    }

    #[test]
    fn test_flow_mapping_events() {
        let kinds = event_kinds("{a: 1, b: 2}");
        assert!(matches!(
            kinds[2],
            EventData::MappingStart {
                style: CollectionStyle::Flow,
                ..
            }
        ));
        assert!(kinds.contains(&EventData::MappingEnd));
    }

    #[test]
    fn test_single_pair_mapping_in_flow_sequence() {
        let kinds = event_kinds("[a: 1]");
        // The pair becomes a nested implicit flow mapping.
        assert!(matches!(kinds[3], EventData::MappingStart { .. }));
        assert_eq!(kinds[4], plain("a"));
        assert_eq!(kinds[5], plain("1"));
        assert!(matches!(kinds[6], EventData::MappingEnd));
    }

    #[test]
    fn test_unclosed_flow_sequence_is_an_error() {
        let error = parse_error("[a, b\n");
        let text = error.to_string();
        assert!(
            text.contains("while parsing a flow sequence"),
            "unexpected error: {}",
            text
        );
    }

    #[test]
    fn test_quoted_scalar_implicit_flags() {
        let kinds = event_kinds("\"x\"\n");
        assert!(kinds.iter().any(|k| matches!(
            k,
            EventData::Scalar {
                plain_implicit: false,
                quoted_implicit: true,
                style: ScalarStyle::DoubleQuoted,
                ..
            }
        )));
    }

    #[test]
    fn test_non_specific_tag_keeps_plain_implicit() {
        let kinds = event_kinds("! x\n");
        assert!(kinds.iter().any(|k| matches!(
            k,
            EventData::Scalar {
                tag: Some(tag),
                plain_implicit: true,
                ..
            } if tag == "!"
        )));
    }

    #[test]
    fn test_error_is_sticky() {
        let mut parser = Parser::new("!e!x data\n");
        let first = loop {
            match parser.next_event() {
                Ok(_) => continue,
                Err(error) => break error,
            }
        };
        let second = parser.next_event().unwrap_err();
        assert_eq!(first, second);
    }

    #[test]
    fn test_stream_end_repeats_after_exhaustion() {
        let mut parser = Parser::new("x\n");
        while parser.next_event().expect("parse failed").data != EventData::StreamEnd {}
        assert_eq!(
            parser.next_event().expect("parse failed").data,
            EventData::StreamEnd
        );
    }
}
