//! Lexical analysis.
//!
//! The scanner consumes the reader's decoded buffer and produces a FIFO
//! queue of typed tokens. It demultiplexes the offside-rule grammar
//! (indentation implies structure) from explicit indicator characters:
//! an indentation increase inserts a synthetic collection-start token, a
//! decrease appends one end token per level popped.
//!
//! A position that might begin a mapping key is remembered as a "simple
//! key" candidate; when a later `:` confirms it, the KEY token (and possibly
//! a BLOCK-MAPPING-START) is inserted retroactively into the middle of the
//! queue at the recorded token number. This mid-queue insertion is the
//! reason the queue is index-addressable rather than append-only.

use std::collections::VecDeque;

use crate::error::{Error, Result};
use crate::mark::Mark;
use crate::reader::{Input, Reader};
use crate::token::{ScalarStyle, Token, TokenData};

/// A candidate key position which may be confirmed as a mapping key by a
/// later `:` on the same line.
#[derive(Debug, Clone, Copy, Default)]
struct SimpleKey {
    /// The position could still become a key.
    possible: bool,
    /// Its absence is a scan error (block context, at the active indent).
    required: bool,
    /// Absolute token number where the KEY token would be inserted.
    token_number: usize,
    /// Where the candidate starts.
    mark: Mark,
}

/// A candidate spanning more than this many characters can no longer be a
/// simple key.
const MAX_SIMPLE_KEY_LENGTH: usize = 1024;

/// Streaming tokenizer. Pull tokens with [`next_token`](Scanner::next_token).
pub struct Scanner {
    reader: Reader,
    tokens: VecDeque<Token>,
    /// Number of tokens already handed to the caller; token numbers used by
    /// simple-key bookkeeping are absolute, so queue positions are relative
    /// to this.
    tokens_taken: usize,
    stream_start_produced: bool,
    stream_end_produced: bool,
    /// Current indentation level, -1 at top level.
    indent: i64,
    /// Previous indentation levels, strictly increasing bottom to top.
    indents: Vec<i64>,
    /// Whether a simple key may start at the current position.
    simple_key_allowed: bool,
    /// One candidate slot per flow nesting level (plus the block level).
    simple_keys: Vec<SimpleKey>,
    /// Depth of nested `[]`/`{}` collections; zero means block context.
    flow_level: usize,
    error: Option<Error>,
}

impl Scanner {
    /// Create a scanner over the given input source.
    pub fn new(input: impl Into<Input>) -> Self {
        Self {
            reader: Reader::new(input.into()),
            tokens: VecDeque::new(),
            tokens_taken: 0,
            stream_start_produced: false,
            stream_end_produced: false,
            indent: -1,
            indents: Vec::new(),
            simple_key_allowed: false,
            simple_keys: Vec::new(),
            flow_level: 0,
            error: None,
        }
    }

    /// Return the next token.
    ///
    /// A single call may internally produce several tokens, since
    /// indentation changes imply synthetic start/end tokens in addition to
    /// the indicator actually scanned. After the STREAM-END token has been
    /// returned, further calls keep returning STREAM-END. Once an error is
    /// returned, every subsequent call returns the same error.
    pub fn next_token(&mut self) -> Result<Token> {
        if let Some(error) = &self.error {
            return Err(error.clone());
        }
        if self.stream_end_produced {
            let mark = self.reader.mark();
            return Ok(Token::new(TokenData::StreamEnd, mark, mark));
        }
        match self.take_token() {
            Ok(token) => {
                if token.data == TokenData::StreamEnd {
                    self.stream_end_produced = true;
                }
                self.tokens_taken += 1;
                Ok(token)
            }
            Err(error) => {
                self.error = Some(error.clone());
                Err(error)
            }
        }
    }

    /// True once the STREAM-END token has been handed out.
    pub fn stream_ended(&self) -> bool {
        self.stream_end_produced
    }

    fn take_token(&mut self) -> Result<Token> {
        loop {
            self.fetch_more_tokens()?;
            if let Some(token) = self.tokens.pop_front() {
                return Ok(token);
            }
        }
    }

    /// Fetch tokens until the front of the queue can no longer be affected
    /// by a pending simple key.
    fn fetch_more_tokens(&mut self) -> Result<()> {
        loop {
            let need = if self.tokens.is_empty() {
                true
            } else {
                self.stale_simple_keys()?;
                self.simple_keys
                    .iter()
                    .any(|key| key.possible && key.token_number == self.tokens_taken)
            };
            if !need {
                return Ok(());
            }
            self.fetch_next_token()?;
        }
    }

    fn fetch_next_token(&mut self) -> Result<()> {
        if !self.stream_start_produced {
            return self.fetch_stream_start();
        }

        self.scan_to_next_token()?;
        self.stale_simple_keys()?;
        self.unroll_indent(self.reader.mark().column as i64);

        self.reader.cache(4)?;
        let ch = self.reader.peek(0);
        let at_line_start = self.reader.mark().column == 0;

        if ch == '\0' {
            return self.fetch_stream_end();
        }

        if at_line_start && ch == '%' {
            return self.fetch_directive();
        }

        if at_line_start && self.check_document_indicator('-') {
            return self.fetch_document_indicator(TokenData::DocumentStart);
        }
        if at_line_start && self.check_document_indicator('.') {
            return self.fetch_document_indicator(TokenData::DocumentEnd);
        }

        match ch {
            '[' => return self.fetch_flow_collection_start(TokenData::FlowSequenceStart),
            '{' => return self.fetch_flow_collection_start(TokenData::FlowMappingStart),
            ']' => return self.fetch_flow_collection_end(TokenData::FlowSequenceEnd),
            '}' => return self.fetch_flow_collection_end(TokenData::FlowMappingEnd),
            ',' => return self.fetch_flow_entry(),
            '-' if is_blankz(self.reader.peek(1)) => return self.fetch_block_entry(),
            '?' if self.flow_level > 0 || is_blankz(self.reader.peek(1)) => {
                return self.fetch_key()
            }
            ':' if self.flow_level > 0 || is_blankz(self.reader.peek(1)) => {
                return self.fetch_value()
            }
            '*' => return self.fetch_anchor(true),
            '&' => return self.fetch_anchor(false),
            '!' => return self.fetch_tag(),
            '|' if self.flow_level == 0 => return self.fetch_block_scalar(true),
            '>' if self.flow_level == 0 => return self.fetch_block_scalar(false),
            '\'' => return self.fetch_flow_scalar(true),
            '"' => return self.fetch_flow_scalar(false),
            _ => {}
        }

        // Anything that is not an indicator (or is an indicator character in
        // a position where it cannot start a token) begins a plain scalar.
        let plain = !(is_blankz(ch)
            || matches!(
                ch,
                '-' | '?'
                    | ':'
                    | ','
                    | '['
                    | ']'
                    | '{'
                    | '}'
                    | '#'
                    | '&'
                    | '*'
                    | '!'
                    | '|'
                    | '>'
                    | '\''
                    | '"'
                    | '%'
                    | '@'
                    | '`'
            ))
            || (ch == '-' && !is_blank(self.reader.peek(1)))
            || (self.flow_level == 0
                && matches!(ch, '?' | ':')
                && !is_blankz(self.reader.peek(1)));
        if plain {
            return self.fetch_plain_scalar();
        }

        Err(Error::scanner_context(
            "while scanning for the next token",
            self.reader.mark(),
            "found character that cannot start any token",
            self.reader.mark(),
        ))
    }

    fn check_document_indicator(&self, indicator: char) -> bool {
        self.reader.peek(0) == indicator
            && self.reader.peek(1) == indicator
            && self.reader.peek(2) == indicator
            && is_blankz(self.reader.peek(3))
    }

    /// Skip spaces, comments, and line breaks until the next token.
    fn scan_to_next_token(&mut self) -> Result<()> {
        loop {
            self.reader.cache(1)?;
            // Tabs may separate tokens only where a simple key cannot start.
            while self.reader.peek(0) == ' '
                || (self.reader.peek(0) == '\t'
                    && (self.flow_level > 0 || !self.simple_key_allowed))
            {
                self.reader.skip();
                self.reader.cache(1)?;
            }
            if self.reader.peek(0) == '#' {
                while !is_breakz(self.reader.peek(0)) {
                    self.reader.skip();
                    self.reader.cache(1)?;
                }
            }
            if is_break(self.reader.peek(0)) {
                self.reader.cache(2)?;
                self.reader.skip_line_break();
                if self.flow_level == 0 {
                    self.simple_key_allowed = true;
                }
            } else {
                return Ok(());
            }
        }
    }

    // ------------------------------------------------------------------
    // Simple-key bookkeeping
    // ------------------------------------------------------------------

    /// Invalidate candidates that can no longer become keys: the line moved
    /// on, or the candidate has grown past the length ceiling.
    fn stale_simple_keys(&mut self) -> Result<()> {
        let mark = self.reader.mark();
        for key in &mut self.simple_keys {
            if key.possible
                && (key.mark.line < mark.line
                    || key.mark.index + MAX_SIMPLE_KEY_LENGTH < mark.index)
            {
                if key.required {
                    return Err(Error::scanner_context(
                        "while scanning a simple key",
                        key.mark,
                        "could not find expected ':'",
                        mark,
                    ));
                }
                key.possible = false;
            }
        }
        Ok(())
    }

    /// Record the current position as a possible simple key for the current
    /// flow level.
    fn save_simple_key(&mut self) -> Result<()> {
        let required =
            self.flow_level == 0 && self.indent == self.reader.mark().column as i64;
        if self.simple_key_allowed {
            let key = SimpleKey {
                possible: true,
                required,
                token_number: self.tokens_taken + self.tokens.len(),
                mark: self.reader.mark(),
            };
            self.remove_simple_key()?;
            if let Some(slot) = self.simple_keys.last_mut() {
                *slot = key;
            }
        }
        Ok(())
    }

    fn remove_simple_key(&mut self) -> Result<()> {
        let mark = self.reader.mark();
        if let Some(key) = self.simple_keys.last_mut() {
            if key.possible && key.required {
                return Err(Error::scanner_context(
                    "while scanning a simple key",
                    key.mark,
                    "could not find expected ':'",
                    mark,
                ));
            }
            key.possible = false;
        }
        Ok(())
    }

    fn increase_flow_level(&mut self) {
        self.simple_keys.push(SimpleKey::default());
        self.flow_level += 1;
    }

    fn decrease_flow_level(&mut self) {
        if self.flow_level > 0 {
            self.flow_level -= 1;
            self.simple_keys.pop();
        }
    }

    // ------------------------------------------------------------------
    // Indentation bookkeeping
    // ------------------------------------------------------------------

    /// Push a new indentation level and produce the synthetic collection
    /// start token. When `number` is set, the token is inserted mid-queue
    /// at that absolute token number; otherwise it is appended.
    fn roll_indent(&mut self, column: i64, number: Option<usize>, data: TokenData, mark: Mark) {
        if self.flow_level > 0 {
            return;
        }
        if self.indent < column {
            self.indents.push(self.indent);
            self.indent = column;
            let token = Token::new(data, mark, mark);
            match number {
                Some(n) => self.tokens.insert(n - self.tokens_taken, token),
                None => self.tokens.push_back(token),
            }
        }
    }

    /// Pop indentation levels until `column` is reached, appending one
    /// BLOCK-END token per level popped.
    fn unroll_indent(&mut self, column: i64) {
        if self.flow_level > 0 {
            return;
        }
        while self.indent > column {
            let mark = self.reader.mark();
            self.tokens
                .push_back(Token::new(TokenData::BlockEnd, mark, mark));
            self.indent = self.indents.pop().unwrap_or(-1);
        }
    }

    // ------------------------------------------------------------------
    // Token fetchers
    // ------------------------------------------------------------------

    fn fetch_stream_start(&mut self) -> Result<()> {
        // Cache one character so the encoding has been determined.
        self.reader.cache(1)?;
        let mark = self.reader.mark();
        self.indent = -1;
        self.simple_keys.push(SimpleKey::default());
        self.simple_key_allowed = true;
        self.stream_start_produced = true;
        self.tokens.push_back(Token::new(
            TokenData::StreamStart {
                encoding: self.reader.encoding(),
            },
            mark,
            mark,
        ));
        Ok(())
    }

    fn fetch_stream_end(&mut self) -> Result<()> {
        self.unroll_indent(-1);
        self.remove_simple_key()?;
        self.simple_key_allowed = false;
        let mark = self.reader.mark();
        self.tokens
            .push_back(Token::new(TokenData::StreamEnd, mark, mark));
        Ok(())
    }

    fn fetch_directive(&mut self) -> Result<()> {
        self.unroll_indent(-1);
        self.remove_simple_key()?;
        self.simple_key_allowed = false;
        let token = self.scan_directive()?;
        self.tokens.push_back(token);
        Ok(())
    }

    fn fetch_document_indicator(&mut self, data: TokenData) -> Result<()> {
        self.unroll_indent(-1);
        self.remove_simple_key()?;
        self.simple_key_allowed = false;
        let start_mark = self.reader.mark();
        self.reader.skip();
        self.reader.skip();
        self.reader.skip();
        let end_mark = self.reader.mark();
        self.tokens.push_back(Token::new(data, start_mark, end_mark));
        Ok(())
    }

    fn fetch_flow_collection_start(&mut self, data: TokenData) -> Result<()> {
        // The indicator itself may be a simple key (as in `[]: value`).
        self.save_simple_key()?;
        self.increase_flow_level();
        self.simple_key_allowed = true;
        let start_mark = self.reader.mark();
        self.reader.skip();
        let end_mark = self.reader.mark();
        self.tokens.push_back(Token::new(data, start_mark, end_mark));
        Ok(())
    }

    fn fetch_flow_collection_end(&mut self, data: TokenData) -> Result<()> {
        self.remove_simple_key()?;
        self.decrease_flow_level();
        self.simple_key_allowed = false;
        let start_mark = self.reader.mark();
        self.reader.skip();
        let end_mark = self.reader.mark();
        self.tokens.push_back(Token::new(data, start_mark, end_mark));
        Ok(())
    }

    fn fetch_flow_entry(&mut self) -> Result<()> {
        self.remove_simple_key()?;
        self.simple_key_allowed = true;
        let start_mark = self.reader.mark();
        self.reader.skip();
        let end_mark = self.reader.mark();
        self.tokens
            .push_back(Token::new(TokenData::FlowEntry, start_mark, end_mark));
        Ok(())
    }

    fn fetch_block_entry(&mut self) -> Result<()> {
        if self.flow_level == 0 {
            if !self.simple_key_allowed {
                return Err(Error::scanner(
                    "block sequence entries are not allowed in this context",
                    self.reader.mark(),
                ));
            }
            let mark = self.reader.mark();
            self.roll_indent(
                mark.column as i64,
                None,
                TokenData::BlockSequenceStart,
                mark,
            );
        }
        self.remove_simple_key()?;
        self.simple_key_allowed = true;
        let start_mark = self.reader.mark();
        self.reader.skip();
        let end_mark = self.reader.mark();
        self.tokens
            .push_back(Token::new(TokenData::BlockEntry, start_mark, end_mark));
        Ok(())
    }

    fn fetch_key(&mut self) -> Result<()> {
        if self.flow_level == 0 {
            if !self.simple_key_allowed {
                return Err(Error::scanner(
                    "mapping keys are not allowed in this context",
                    self.reader.mark(),
                ));
            }
            let mark = self.reader.mark();
            self.roll_indent(mark.column as i64, None, TokenData::BlockMappingStart, mark);
        }
        self.remove_simple_key()?;
        self.simple_key_allowed = self.flow_level == 0;
        let start_mark = self.reader.mark();
        self.reader.skip();
        let end_mark = self.reader.mark();
        self.tokens
            .push_back(Token::new(TokenData::Key, start_mark, end_mark));
        Ok(())
    }

    fn fetch_value(&mut self) -> Result<()> {
        let mark = self.reader.mark();
        let key = self.simple_keys.last().copied().unwrap_or_default();
        if key.possible {
            // Confirm the deferred simple key: insert KEY at its recorded
            // queue position, and open the block mapping at the key's
            // column if one is not already open.
            self.tokens.insert(
                key.token_number - self.tokens_taken,
                Token::new(TokenData::Key, key.mark, key.mark),
            );
            self.roll_indent(
                key.mark.column as i64,
                Some(key.token_number),
                TokenData::BlockMappingStart,
                key.mark,
            );
            if let Some(slot) = self.simple_keys.last_mut() {
                slot.possible = false;
            }
            self.simple_key_allowed = false;
        } else {
            // The ':' follows an explicit '?' key or appears bare.
            if self.flow_level == 0 {
                if !self.simple_key_allowed {
                    return Err(Error::scanner(
                        "mapping values are not allowed in this context",
                        mark,
                    ));
                }
                self.roll_indent(mark.column as i64, None, TokenData::BlockMappingStart, mark);
            }
            self.simple_key_allowed = self.flow_level == 0;
        }
        let start_mark = self.reader.mark();
        self.reader.skip();
        let end_mark = self.reader.mark();
        self.tokens
            .push_back(Token::new(TokenData::Value, start_mark, end_mark));
        Ok(())
    }

    fn fetch_anchor(&mut self, alias: bool) -> Result<()> {
        self.save_simple_key()?;
        self.simple_key_allowed = false;
        let token = self.scan_anchor(alias)?;
        self.tokens.push_back(token);
        Ok(())
    }

    fn fetch_tag(&mut self) -> Result<()> {
        self.save_simple_key()?;
        self.simple_key_allowed = false;
        let token = self.scan_tag()?;
        self.tokens.push_back(token);
        Ok(())
    }

    fn fetch_block_scalar(&mut self, literal: bool) -> Result<()> {
        // A block scalar always begins a new line, so it cannot be a key.
        self.remove_simple_key()?;
        self.simple_key_allowed = true;
        let token = self.scan_block_scalar(literal)?;
        self.tokens.push_back(token);
        Ok(())
    }

    fn fetch_flow_scalar(&mut self, single: bool) -> Result<()> {
        self.save_simple_key()?;
        self.simple_key_allowed = false;
        let token = self.scan_flow_scalar(single)?;
        self.tokens.push_back(token);
        Ok(())
    }

    fn fetch_plain_scalar(&mut self) -> Result<()> {
        self.save_simple_key()?;
        self.simple_key_allowed = false;
        let token = self.scan_plain_scalar()?;
        self.tokens.push_back(token);
        Ok(())
    }

    // ------------------------------------------------------------------
    // Directive scanning
    // ------------------------------------------------------------------

    fn scan_directive(&mut self) -> Result<Token> {
        let start_mark = self.reader.mark();
        self.reader.skip();

        let name = self.scan_directive_name(start_mark)?;
        let data = match name.as_str() {
            "YAML" => {
                let (major, minor) = self.scan_version_directive_value(start_mark)?;
                TokenData::VersionDirective { major, minor }
            }
            "TAG" => {
                let (handle, prefix) = self.scan_tag_directive_value(start_mark)?;
                TokenData::TagDirective { handle, prefix }
            }
            _ => {
                return Err(Error::scanner_context(
                    "while scanning a directive",
                    start_mark,
                    "found unknown directive name",
                    self.reader.mark(),
                ))
            }
        };
        let end_mark = self.reader.mark();

        // Eat trailing blanks and an optional comment up to the line break.
        self.reader.cache(1)?;
        while is_blank(self.reader.peek(0)) {
            self.reader.skip();
            self.reader.cache(1)?;
        }
        if self.reader.peek(0) == '#' {
            while !is_breakz(self.reader.peek(0)) {
                self.reader.skip();
                self.reader.cache(1)?;
            }
        }
        if !is_breakz(self.reader.peek(0)) {
            return Err(Error::scanner_context(
                "while scanning a directive",
                start_mark,
                "did not find expected comment or line break",
                self.reader.mark(),
            ));
        }
        if is_break(self.reader.peek(0)) {
            self.reader.cache(2)?;
            self.reader.skip_line_break();
        }

        Ok(Token::new(data, start_mark, end_mark))
    }

    fn scan_directive_name(&mut self, start_mark: Mark) -> Result<String> {
        let mut name = String::new();
        self.reader.cache(1)?;
        while is_alpha(self.reader.peek(0)) {
            self.reader.read_char(&mut name);
            self.reader.cache(1)?;
        }
        if name.is_empty() {
            return Err(Error::scanner_context(
                "while scanning a directive",
                start_mark,
                "could not find expected directive name",
                self.reader.mark(),
            ));
        }
        if !is_blankz(self.reader.peek(0)) {
            return Err(Error::scanner_context(
                "while scanning a directive",
                start_mark,
                "found unexpected non-alphabetical character",
                self.reader.mark(),
            ));
        }
        Ok(name)
    }

    fn scan_version_directive_value(&mut self, start_mark: Mark) -> Result<(u32, u32)> {
        self.reader.cache(1)?;
        while is_blank(self.reader.peek(0)) {
            self.reader.skip();
            self.reader.cache(1)?;
        }
        let major = self.scan_version_directive_number(start_mark)?;
        if self.reader.peek(0) != '.' {
            return Err(Error::scanner_context(
                "while scanning a %YAML directive",
                start_mark,
                "did not find expected digit or '.' character",
                self.reader.mark(),
            ));
        }
        self.reader.skip();
        let minor = self.scan_version_directive_number(start_mark)?;
        Ok((major, minor))
    }

    fn scan_version_directive_number(&mut self, start_mark: Mark) -> Result<u32> {
        let mut value: u32 = 0;
        let mut length = 0;
        self.reader.cache(1)?;
        while is_digit(self.reader.peek(0)) {
            length += 1;
            if length > 9 {
                return Err(Error::scanner_context(
                    "while scanning a %YAML directive",
                    start_mark,
                    "found extremely long version number",
                    self.reader.mark(),
                ));
            }
            value = value * 10 + as_digit(self.reader.peek(0));
            self.reader.skip();
            self.reader.cache(1)?;
        }
        if length == 0 {
            return Err(Error::scanner_context(
                "while scanning a %YAML directive",
                start_mark,
                "did not find expected version number",
                self.reader.mark(),
            ));
        }
        Ok(value)
    }

    fn scan_tag_directive_value(&mut self, start_mark: Mark) -> Result<(String, String)> {
        self.reader.cache(1)?;
        while is_blank(self.reader.peek(0)) {
            self.reader.skip();
            self.reader.cache(1)?;
        }
        let handle = self.scan_tag_handle(true, start_mark)?;
        self.reader.cache(1)?;
        if !is_blank(self.reader.peek(0)) {
            return Err(Error::scanner_context(
                "while scanning a %TAG directive",
                start_mark,
                "did not find expected whitespace",
                self.reader.mark(),
            ));
        }
        while is_blank(self.reader.peek(0)) {
            self.reader.skip();
            self.reader.cache(1)?;
        }
        let prefix = self.scan_tag_uri(true, None, start_mark)?;
        self.reader.cache(1)?;
        if !is_blankz(self.reader.peek(0)) {
            return Err(Error::scanner_context(
                "while scanning a %TAG directive",
                start_mark,
                "did not find expected whitespace or line break",
                self.reader.mark(),
            ));
        }
        Ok((handle, prefix))
    }

    // ------------------------------------------------------------------
    // Anchor and tag scanning
    // ------------------------------------------------------------------

    fn scan_anchor(&mut self, alias: bool) -> Result<Token> {
        let start_mark = self.reader.mark();
        self.reader.skip();

        let mut value = String::new();
        self.reader.cache(1)?;
        while is_alpha(self.reader.peek(0)) {
            self.reader.read_char(&mut value);
            self.reader.cache(1)?;
        }
        let end_mark = self.reader.mark();

        let followed_ok = is_blankz(self.reader.peek(0))
            || matches!(self.reader.peek(0), '?' | ':' | ',' | ']' | '}' | '%' | '@' | '`');
        if value.is_empty() || !followed_ok {
            return Err(Error::scanner_context(
                if alias {
                    "while scanning an alias"
                } else {
                    "while scanning an anchor"
                },
                start_mark,
                "did not find expected alphabetic or numeric character",
                self.reader.mark(),
            ));
        }

        let data = if alias {
            TokenData::Alias { value }
        } else {
            TokenData::Anchor { value }
        };
        Ok(Token::new(data, start_mark, end_mark))
    }

    fn scan_tag(&mut self) -> Result<Token> {
        let start_mark = self.reader.mark();
        self.reader.cache(2)?;

        let (handle, suffix);
        if self.reader.peek(1) == '<' {
            // Verbatim tag: !<uri>
            handle = String::new();
            self.reader.skip();
            self.reader.skip();
            suffix = self.scan_tag_uri(false, None, start_mark)?;
            if self.reader.peek(0) != '>' {
                return Err(Error::scanner_context(
                    "while scanning a tag",
                    start_mark,
                    "did not find the expected '>'",
                    self.reader.mark(),
                ));
            }
            self.reader.skip();
        } else {
            let first = self.scan_tag_handle(false, start_mark)?;
            if first.len() > 1 && first.starts_with('!') && first.ends_with('!') {
                handle = first;
                suffix = self.scan_tag_uri(false, None, start_mark)?;
            } else {
                // It was not a named handle after all; what we scanned is
                // the head of the suffix.
                let rest = self.scan_tag_uri(false, Some(&first), start_mark)?;
                if rest.is_empty() {
                    // The bare '!' tag.
                    handle = String::new();
                    suffix = "!".to_string();
                } else {
                    handle = "!".to_string();
                    suffix = rest;
                }
            }
        }

        self.reader.cache(1)?;
        if !is_blankz(self.reader.peek(0)) {
            return Err(Error::scanner_context(
                "while scanning a tag",
                start_mark,
                "did not find expected whitespace or line break",
                self.reader.mark(),
            ));
        }
        let end_mark = self.reader.mark();
        Ok(Token::new(
            TokenData::Tag { handle, suffix },
            start_mark,
            end_mark,
        ))
    }

    fn scan_tag_handle(&mut self, directive: bool, start_mark: Mark) -> Result<String> {
        let context = if directive {
            "while scanning a %TAG directive"
        } else {
            "while scanning a tag"
        };
        self.reader.cache(1)?;
        if self.reader.peek(0) != '!' {
            return Err(Error::scanner_context(
                context,
                start_mark,
                "did not find expected '!'",
                self.reader.mark(),
            ));
        }
        let mut handle = String::new();
        self.reader.read_char(&mut handle);
        self.reader.cache(1)?;
        while is_alpha(self.reader.peek(0)) {
            self.reader.read_char(&mut handle);
            self.reader.cache(1)?;
        }
        if self.reader.peek(0) == '!' {
            self.reader.read_char(&mut handle);
        } else if directive && handle != "!" {
            // A %TAG directive handle must be closed by '!'.
            return Err(Error::scanner_context(
                context,
                start_mark,
                "did not find expected '!'",
                self.reader.mark(),
            ));
        }
        Ok(handle)
    }

    fn scan_tag_uri(
        &mut self,
        directive: bool,
        head: Option<&str>,
        start_mark: Mark,
    ) -> Result<String> {
        let context = if directive {
            "while parsing a %TAG directive"
        } else {
            "while parsing a tag"
        };
        let mut uri = String::new();
        // The head, if any, begins with '!' which is not part of the
        // suffix, but it does count toward the tag being non-empty (the
        // bare '!' tag reaches this point with an empty remainder).
        let mut length = head.map_or(0, str::len);
        if let Some(head) = head {
            if head.len() > 1 {
                uri.push_str(&head[1..]);
            }
        }
        self.reader.cache(1)?;
        while is_uri_char(self.reader.peek(0)) {
            if self.reader.peek(0) == '%' {
                self.scan_uri_escapes(directive, start_mark, &mut uri)?;
            } else {
                self.reader.read_char(&mut uri);
            }
            length += 1;
            self.reader.cache(1)?;
        }
        if length == 0 {
            return Err(Error::scanner_context(
                context,
                start_mark,
                "did not find expected tag URI",
                self.reader.mark(),
            ));
        }
        Ok(uri)
    }

    /// Decode one `%xx`-escaped UTF-8 sequence into `out`.
    fn scan_uri_escapes(
        &mut self,
        directive: bool,
        start_mark: Mark,
        out: &mut String,
    ) -> Result<()> {
        let context = if directive {
            "while parsing a %TAG directive"
        } else {
            "while parsing a tag"
        };
        let mut width = 0usize;
        let mut bytes: Vec<u8> = Vec::new();
        loop {
            self.reader.cache(3)?;
            if !(self.reader.peek(0) == '%'
                && is_hex(self.reader.peek(1))
                && is_hex(self.reader.peek(2)))
            {
                return Err(Error::scanner_context(
                    context,
                    start_mark,
                    "did not find URI escaped octet",
                    self.reader.mark(),
                ));
            }
            let octet = (as_hex(self.reader.peek(1)) * 16 + as_hex(self.reader.peek(2))) as u8;
            if bytes.is_empty() {
                width = match octet {
                    0x00..=0x7F => 1,
                    0xC0..=0xDF => 2,
                    0xE0..=0xEF => 3,
                    0xF0..=0xF7 => 4,
                    _ => {
                        return Err(Error::scanner_context(
                            context,
                            start_mark,
                            "found an incorrect leading UTF-8 octet",
                            self.reader.mark(),
                        ))
                    }
                };
            } else if octet & 0xC0 != 0x80 {
                return Err(Error::scanner_context(
                    context,
                    start_mark,
                    "found an incorrect trailing UTF-8 octet",
                    self.reader.mark(),
                ));
            }
            bytes.push(octet);
            self.reader.skip();
            self.reader.skip();
            self.reader.skip();
            if bytes.len() == width {
                break;
            }
        }
        match std::str::from_utf8(&bytes) {
            Ok(s) => {
                out.push_str(s);
                Ok(())
            }
            Err(_) => Err(Error::scanner_context(
                context,
                start_mark,
                "found an incorrect UTF-8 octet sequence",
                self.reader.mark(),
            )),
        }
    }

    // ------------------------------------------------------------------
    // Block scalar scanning
    // ------------------------------------------------------------------

    fn scan_block_scalar(&mut self, literal: bool) -> Result<Token> {
        let start_mark = self.reader.mark();
        self.reader.skip();

        // Header: chomping indicator and indentation increment, either order.
        let mut chomping: i32 = 0;
        let mut increment: i64 = 0;
        self.reader.cache(1)?;
        if matches!(self.reader.peek(0), '+' | '-') {
            chomping = if self.reader.peek(0) == '+' { 1 } else { -1 };
            self.reader.skip();
            self.reader.cache(1)?;
            if is_digit(self.reader.peek(0)) {
                if self.reader.peek(0) == '0' {
                    return Err(Error::scanner_context(
                        "while scanning a block scalar",
                        start_mark,
                        "found an indentation indicator equal to 0",
                        self.reader.mark(),
                    ));
                }
                increment = as_digit(self.reader.peek(0)) as i64;
                self.reader.skip();
            }
        } else if is_digit(self.reader.peek(0)) {
            if self.reader.peek(0) == '0' {
                return Err(Error::scanner_context(
                    "while scanning a block scalar",
                    start_mark,
                    "found an indentation indicator equal to 0",
                    self.reader.mark(),
                ));
            }
            increment = as_digit(self.reader.peek(0)) as i64;
            self.reader.skip();
            self.reader.cache(1)?;
            if matches!(self.reader.peek(0), '+' | '-') {
                chomping = if self.reader.peek(0) == '+' { 1 } else { -1 };
                self.reader.skip();
            }
        }

        // Eat blanks and an optional comment to the end of the header line.
        self.reader.cache(1)?;
        while is_blank(self.reader.peek(0)) {
            self.reader.skip();
            self.reader.cache(1)?;
        }
        if self.reader.peek(0) == '#' {
            while !is_breakz(self.reader.peek(0)) {
                self.reader.skip();
                self.reader.cache(1)?;
            }
        }
        if !is_breakz(self.reader.peek(0)) {
            return Err(Error::scanner_context(
                "while scanning a block scalar",
                start_mark,
                "did not find expected comment or line break",
                self.reader.mark(),
            ));
        }
        if is_break(self.reader.peek(0)) {
            self.reader.cache(2)?;
            self.reader.skip_line_break();
        }

        let mut end_mark = self.reader.mark();
        let mut indent: i64 = if increment > 0 {
            if self.indent >= 0 {
                self.indent + increment
            } else {
                increment
            }
        } else {
            0
        };

        let mut string = String::new();
        let mut leading_break = String::new();
        let mut trailing_breaks = String::new();

        self.scan_block_scalar_breaks(&mut indent, &mut trailing_breaks, start_mark, &mut end_mark)?;

        self.reader.cache(1)?;
        let mut leading_blank = false;
        while self.reader.mark().column as i64 == indent && self.reader.peek(0) != '\0' {
            // At the beginning of a non-empty content line.
            let trailing_blank = is_blank(self.reader.peek(0));
            if !literal && leading_break.starts_with('\n') && !leading_blank && !trailing_blank {
                // Fold the break between two ordinary lines unless blank
                // lines already supplied the separation.
                if trailing_breaks.is_empty() {
                    string.push(' ');
                }
                leading_break.clear();
            } else {
                string.push_str(&leading_break);
                leading_break.clear();
            }
            string.push_str(&trailing_breaks);
            trailing_breaks.clear();

            leading_blank = is_blank(self.reader.peek(0));
            while !is_breakz(self.reader.peek(0)) {
                self.reader.read_char(&mut string);
                self.reader.cache(1)?;
            }
            end_mark = self.reader.mark();
            if self.reader.peek(0) != '\0' {
                self.reader.cache(2)?;
                self.reader.read_line_break(&mut leading_break);
            }

            self.scan_block_scalar_breaks(
                &mut indent,
                &mut trailing_breaks,
                start_mark,
                &mut end_mark,
            )?;
            self.reader.cache(1)?;
        }

        // Chomp the tail.
        if chomping != -1 {
            string.push_str(&leading_break);
        }
        if chomping == 1 {
            string.push_str(&trailing_breaks);
        }

        let style = if literal {
            ScalarStyle::Literal
        } else {
            ScalarStyle::Folded
        };
        Ok(Token::new(
            TokenData::Scalar {
                value: string,
                style,
            },
            start_mark,
            end_mark,
        ))
    }

    /// Consume indentation spaces and blank lines, inferring the content
    /// indentation when no explicit increment was given.
    fn scan_block_scalar_breaks(
        &mut self,
        indent: &mut i64,
        breaks: &mut String,
        start_mark: Mark,
        end_mark: &mut Mark,
    ) -> Result<()> {
        let mut max_indent: i64 = 0;
        *end_mark = self.reader.mark();
        loop {
            self.reader.cache(1)?;
            while (*indent == 0 || (self.reader.mark().column as i64) < *indent)
                && self.reader.peek(0) == ' '
            {
                self.reader.skip();
                self.reader.cache(1)?;
            }
            if self.reader.mark().column as i64 > max_indent {
                max_indent = self.reader.mark().column as i64;
            }
            if (*indent == 0 || (self.reader.mark().column as i64) < *indent)
                && self.reader.peek(0) == '\t'
            {
                return Err(Error::scanner_context(
                    "while scanning a block scalar",
                    start_mark,
                    "found a tab character where an indentation space is expected",
                    self.reader.mark(),
                ));
            }
            if !is_break(self.reader.peek(0)) {
                break;
            }
            self.reader.cache(2)?;
            self.reader.read_line_break(breaks);
            *end_mark = self.reader.mark();
        }
        if *indent == 0 {
            *indent = max_indent.max(self.indent + 1).max(1);
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Flow scalar scanning
    // ------------------------------------------------------------------

    fn scan_flow_scalar(&mut self, single: bool) -> Result<Token> {
        let start_mark = self.reader.mark();
        self.reader.skip();

        let quote = if single { '\'' } else { '"' };
        let mut string = String::new();
        let mut leading_break = String::new();
        let mut trailing_breaks = String::new();
        let mut whitespaces = String::new();

        loop {
            self.reader.cache(4)?;
            if self.reader.mark().column == 0
                && (self.check_document_indicator('-') || self.check_document_indicator('.'))
            {
                return Err(Error::scanner_context(
                    "while scanning a quoted scalar",
                    start_mark,
                    "found unexpected document indicator",
                    self.reader.mark(),
                ));
            }
            if self.reader.peek(0) == '\0' {
                return Err(Error::scanner_context(
                    "while scanning a quoted scalar",
                    start_mark,
                    "found unexpected end of stream",
                    self.reader.mark(),
                ));
            }

            // Consume non-blank characters.
            self.reader.cache(2)?;
            let mut leading_blanks = false;
            while !is_blankz(self.reader.peek(0)) {
                if single && self.reader.peek(0) == '\'' && self.reader.peek(1) == '\'' {
                    // An escaped single quote.
                    string.push('\'');
                    self.reader.skip();
                    self.reader.skip();
                } else if self.reader.peek(0) == quote {
                    break;
                } else if !single
                    && self.reader.peek(0) == '\\'
                    && is_break(self.reader.peek(1))
                {
                    // An escaped line break eats the break and the leading
                    // whitespace of the next line.
                    self.reader.cache(2)?;
                    self.reader.skip();
                    self.reader.skip_line_break();
                    leading_blanks = true;
                    break;
                } else if !single && self.reader.peek(0) == '\\' {
                    self.scan_flow_scalar_escape(start_mark, &mut string)?;
                } else {
                    self.reader.read_char(&mut string);
                }
                self.reader.cache(2)?;
            }

            // Are we at the closing quote?
            self.reader.cache(1)?;
            if self.reader.peek(0) == quote {
                break;
            }

            // Consume blank characters and line breaks.
            self.reader.cache(1)?;
            while is_blank(self.reader.peek(0)) || is_break(self.reader.peek(0)) {
                if is_blank(self.reader.peek(0)) {
                    if !leading_blanks {
                        self.reader.read_char(&mut whitespaces);
                    } else {
                        self.reader.skip();
                    }
                } else {
                    self.reader.cache(2)?;
                    if !leading_blanks {
                        whitespaces.clear();
                        self.reader.read_line_break(&mut leading_break);
                        leading_blanks = true;
                    } else {
                        self.reader.read_line_break(&mut trailing_breaks);
                    }
                }
                self.reader.cache(1)?;
            }

            // Join whitespaces, or fold the line breaks.
            if leading_blanks {
                if leading_break.starts_with('\n') {
                    if trailing_breaks.is_empty() {
                        string.push(' ');
                    } else {
                        string.push_str(&trailing_breaks);
                        trailing_breaks.clear();
                    }
                } else {
                    string.push_str(&leading_break);
                    string.push_str(&trailing_breaks);
                    trailing_breaks.clear();
                }
                leading_break.clear();
            } else {
                string.push_str(&whitespaces);
                whitespaces.clear();
            }
        }

        // Eat the closing quote.
        self.reader.skip();
        let end_mark = self.reader.mark();
        let style = if single {
            ScalarStyle::SingleQuoted
        } else {
            ScalarStyle::DoubleQuoted
        };
        Ok(Token::new(
            TokenData::Scalar {
                value: string,
                style,
            },
            start_mark,
            end_mark,
        ))
    }

    /// Decode one backslash escape in a double-quoted scalar.
    fn scan_flow_scalar_escape(&mut self, start_mark: Mark, out: &mut String) -> Result<()> {
        let mut code_length = 0usize;
        match self.reader.peek(1) {
            '0' => out.push('\0'),
            'a' => out.push('\x07'),
            'b' => out.push('\x08'),
            't' | '\t' => out.push('\t'),
            'n' => out.push('\n'),
            'v' => out.push('\x0B'),
            'f' => out.push('\x0C'),
            'r' => out.push('\r'),
            'e' => out.push('\x1B'),
            ' ' => out.push(' '),
            '"' => out.push('"'),
            '/' => out.push('/'),
            '\\' => out.push('\\'),
            'N' => out.push('\u{85}'),
            '_' => out.push('\u{A0}'),
            'L' => out.push('\u{2028}'),
            'P' => out.push('\u{2029}'),
            'x' => code_length = 2,
            'u' => code_length = 4,
            'U' => code_length = 8,
            _ => {
                return Err(Error::scanner_context(
                    "while parsing a quoted scalar",
                    start_mark,
                    "found unknown escape character",
                    self.reader.mark(),
                ))
            }
        }
        self.reader.skip();
        self.reader.skip();

        if code_length > 0 {
            self.reader.cache(code_length)?;
            let mut value: u32 = 0;
            for k in 0..code_length {
                if !is_hex(self.reader.peek(k)) {
                    return Err(Error::scanner_context(
                        "while parsing a quoted scalar",
                        start_mark,
                        "did not find expected hexadecimal number",
                        self.reader.mark(),
                    ));
                }
                value = value * 16 + as_hex(self.reader.peek(k));
            }
            // The escape must denote a real character, not a surrogate
            // half or an out-of-range value.
            let ch = match char::from_u32(value) {
                Some(ch) if !(0xD800..=0xDFFF).contains(&value) && value <= 0x10FFFF => ch,
                _ => {
                    return Err(Error::scanner_context(
                        "while parsing a quoted scalar",
                        start_mark,
                        "found invalid Unicode character escape",
                        self.reader.mark(),
                    ))
                }
            };
            out.push(ch);
            for _ in 0..code_length {
                self.reader.skip();
            }
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Plain scalar scanning
    // ------------------------------------------------------------------

    fn scan_plain_scalar(&mut self) -> Result<Token> {
        let start_mark = self.reader.mark();
        let mut end_mark = start_mark;
        let indent = self.indent + 1;

        let mut string = String::new();
        let mut leading_break = String::new();
        let mut trailing_breaks = String::new();
        let mut whitespaces = String::new();
        let mut leading_blanks = false;

        loop {
            self.reader.cache(4)?;
            if self.reader.mark().column == 0
                && (self.check_document_indicator('-') || self.check_document_indicator('.'))
            {
                break;
            }
            // A comment after whitespace ends the scalar; a '#' inside the
            // content (consumed below without preceding blanks) does not.
            if self.reader.peek(0) == '#' {
                break;
            }

            while !is_blankz(self.reader.peek(0)) {
                if self.flow_level > 0
                    && self.reader.peek(0) == ':'
                    && !is_blankz(self.reader.peek(1))
                {
                    return Err(Error::scanner_context(
                        "while scanning a plain scalar",
                        start_mark,
                        "found unexpected ':'",
                        self.reader.mark(),
                    ));
                }
                let ch = self.reader.peek(0);
                if (ch == ':' && is_blankz(self.reader.peek(1)))
                    || (self.flow_level > 0
                        && matches!(ch, ',' | ':' | '?' | '[' | ']' | '{' | '}'))
                {
                    break;
                }

                // Join pending whitespace or folded breaks before copying.
                if leading_blanks || !whitespaces.is_empty() {
                    if leading_blanks {
                        if leading_break.starts_with('\n') {
                            if trailing_breaks.is_empty() {
                                string.push(' ');
                            } else {
                                string.push_str(&trailing_breaks);
                                trailing_breaks.clear();
                            }
                        } else {
                            string.push_str(&leading_break);
                            string.push_str(&trailing_breaks);
                            trailing_breaks.clear();
                        }
                        leading_break.clear();
                        leading_blanks = false;
                    } else {
                        string.push_str(&whitespaces);
                        whitespaces.clear();
                    }
                }

                self.reader.read_char(&mut string);
                end_mark = self.reader.mark();
                self.reader.cache(2)?;
            }

            if !(is_blank(self.reader.peek(0)) || is_break(self.reader.peek(0))) {
                break;
            }

            self.reader.cache(1)?;
            while is_blank(self.reader.peek(0)) || is_break(self.reader.peek(0)) {
                if is_blank(self.reader.peek(0)) {
                    if leading_blanks
                        && (self.reader.mark().column as i64) < indent
                        && self.reader.peek(0) == '\t'
                    {
                        return Err(Error::scanner_context(
                            "while scanning a plain scalar",
                            start_mark,
                            "found a tab character that violates indentation",
                            self.reader.mark(),
                        ));
                    }
                    if !leading_blanks {
                        self.reader.read_char(&mut whitespaces);
                    } else {
                        self.reader.skip();
                    }
                } else {
                    self.reader.cache(2)?;
                    if !leading_blanks {
                        whitespaces.clear();
                        self.reader.read_line_break(&mut leading_break);
                        leading_blanks = true;
                    } else {
                        self.reader.read_line_break(&mut trailing_breaks);
                    }
                }
                self.reader.cache(1)?;
            }

            // The offside rule: content below the indentation floor belongs
            // to an enclosing construct.
            if self.flow_level == 0 && (self.reader.mark().column as i64) < indent {
                break;
            }
        }

        // A multiline plain scalar leaves us at a fresh line where a simple
        // key may start.
        if leading_blanks {
            self.simple_key_allowed = true;
        }

        Ok(Token::new(
            TokenData::Scalar {
                value: string,
                style: ScalarStyle::Plain,
            },
            start_mark,
            end_mark,
        ))
    }
}

// ----------------------------------------------------------------------
// Character classes
// ----------------------------------------------------------------------

fn is_blank(ch: char) -> bool {
    ch == ' ' || ch == '\t'
}

fn is_break(ch: char) -> bool {
    matches!(ch, '\r' | '\n' | '\u{85}' | '\u{2028}' | '\u{2029}')
}

fn is_breakz(ch: char) -> bool {
    is_break(ch) || ch == '\0'
}

fn is_blankz(ch: char) -> bool {
    is_blank(ch) || is_breakz(ch)
}

fn is_alpha(ch: char) -> bool {
    ch.is_ascii_alphanumeric() || ch == '_' || ch == '-'
}

fn is_digit(ch: char) -> bool {
    ch.is_ascii_digit()
}

fn as_digit(ch: char) -> u32 {
    ch as u32 - '0' as u32
}

fn is_hex(ch: char) -> bool {
    ch.is_ascii_hexdigit()
}

fn as_hex(ch: char) -> u32 {
    match ch {
        '0'..='9' => ch as u32 - '0' as u32,
        'a'..='f' => ch as u32 - 'a' as u32 + 10,
        _ => ch as u32 - 'A' as u32 + 10,
    }
}

fn is_uri_char(ch: char) -> bool {
    is_alpha(ch)
        || matches!(
            ch,
            ';' | '/'
                | '?'
                | ':'
                | '@'
                | '&'
                | '='
                | '+'
                | '$'
                | ','
                | '.'
                | '!'
                | '~'
                | '*'
                | '\''
                | '('
                | ')'
                | '['
                | ']'
                | '%'
        )
}
