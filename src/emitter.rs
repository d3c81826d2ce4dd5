//! Text emission.
//!
//! The emitter consumes one structural event at a time but holds a bounded
//! lookahead queue (one extra event after DOCUMENT-START, two after
//! SEQUENCE-START, three after MAPPING-START) before committing to output,
//! so it can render empty collections compactly and decide whether a
//! mapping key fits on one line. It drives the same state-stack
//! architecture as the parser, in reverse: each state names the event kind
//! expected next.
//!
//! Scalars are analyzed character by character and the requested style is
//! downgraded along plain, single-quoted, double-quoted as the content
//! rules styles out; literal and folded are honored only in block context
//! outside simple-key position.

use std::collections::VecDeque;
use std::io;

use crate::encoding::{Encoding, LineBreak};
use crate::error::{Error, Result};
use crate::event::{Event, EventData, TagDirective, VersionDirective};
use crate::token::ScalarStyle;

/// The longest anchor + tag + scalar content renderable as a simple key.
const MAX_SIMPLE_KEY_LENGTH: usize = 128;

/// A sink for emitted bytes. Selected exactly once, when the emitter is
/// constructed.
pub enum Output {
    /// Collect output in an in-memory buffer, retrieved with
    /// [`Emitter::into_buffer`].
    Buffer(Vec<u8>),
    /// A stream handle, written on every flush.
    Stream(Box<dyn io::Write>),
    /// A push callback, invoked with each flushed chunk.
    Callback(Box<dyn FnMut(&[u8]) -> io::Result<()>>),
}

impl Output {
    /// An empty in-memory buffer sink.
    pub fn buffer() -> Self {
        Output::Buffer(Vec::new())
    }

    /// Output to a stream handle.
    pub fn from_stream(stream: impl io::Write + 'static) -> Self {
        Output::Stream(Box::new(stream))
    }

    /// Output to a push callback.
    pub fn from_callback(callback: impl FnMut(&[u8]) -> io::Result<()> + 'static) -> Self {
        Output::Callback(Box::new(callback))
    }
}

/// Emitter configuration. Set once, before the first
/// [`emit`](Emitter::emit).
#[derive(Clone, Debug)]
pub struct EmitOptions {
    /// Force canonical form: explicit documents, explicit tags, and
    /// double-quoted scalars everywhere.
    pub canonical: bool,
    /// Indentation width; values outside 2..=9 fall back to 2.
    pub indent: i64,
    /// Preferred line width; non-positive means unbounded, and a value
    /// within twice the indent falls back to 80.
    pub width: i64,
    /// Emit non-ASCII characters unescaped.
    pub unicode: bool,
    /// Line break style for emitted breaks.
    pub line_break: LineBreak,
    /// Output encoding, independent of whatever encoding was read.
    pub encoding: Encoding,
}

impl Default for EmitOptions {
    fn default() -> Self {
        Self {
            canonical: false,
            indent: 2,
            width: 80,
            unicode: false,
            line_break: LineBreak::default(),
            encoding: Encoding::Utf8,
        }
    }
}

impl EmitOptions {
    /// Default options: block style, two-space indent, width 80, escaped
    /// non-ASCII, line feeds, UTF-8.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set canonical mode.
    pub fn with_canonical(mut self, canonical: bool) -> Self {
        self.canonical = canonical;
        self
    }

    /// Set the indentation width.
    pub fn with_indent(mut self, indent: i64) -> Self {
        self.indent = indent;
        self
    }

    /// Set the preferred line width.
    pub fn with_width(mut self, width: i64) -> Self {
        self.width = width;
        self
    }

    /// Allow unescaped non-ASCII output.
    pub fn with_unicode(mut self, unicode: bool) -> Self {
        self.unicode = unicode;
        self
    }

    /// Set the line break style.
    pub fn with_line_break(mut self, line_break: LineBreak) -> Self {
        self.line_break = line_break;
        self
    }

    /// Set the output encoding.
    pub fn with_encoding(mut self, encoding: Encoding) -> Self {
        self.encoding = encoding;
        self
    }
}

/// "Expecting X next" states, mirroring the parser's stack in reverse.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    StreamStart,
    FirstDocumentStart,
    DocumentStart,
    DocumentContent,
    DocumentEnd,
    FlowSequenceFirstItem,
    FlowSequenceItem,
    FlowMappingFirstKey,
    FlowMappingKey,
    FlowMappingSimpleValue,
    FlowMappingValue,
    BlockSequenceFirstItem,
    BlockSequenceItem,
    BlockMappingFirstKey,
    BlockMappingKey,
    BlockMappingSimpleValue,
    BlockMappingValue,
    End,
}

#[derive(Debug, Clone, Default)]
struct AnchorAnalysis {
    anchor: String,
    alias: bool,
}

#[derive(Debug, Clone, Default)]
struct TagAnalysis {
    handle: Option<String>,
    suffix: Option<String>,
}

#[derive(Debug, Clone, Default)]
struct ScalarAnalysis {
    value: String,
    multiline: bool,
    flow_plain_allowed: bool,
    block_plain_allowed: bool,
    single_quoted_allowed: bool,
    block_allowed: bool,
    style: ScalarStyle,
}

/// Streaming text emitter. Feed events with [`emit`](Emitter::emit).
pub struct Emitter {
    output: Output,
    options: EmitOptions,
    /// Pending output text, flushed to the sink at document boundaries.
    buffer: String,
    state: State,
    states: Vec<State>,
    events: VecDeque<Event>,
    indents: Vec<i64>,
    tag_directives: Vec<TagDirective>,
    indent: i64,
    flow_level: usize,
    mapping_context: bool,
    simple_key_context: bool,
    column: i64,
    /// The last written character is whitespace.
    whitespace: bool,
    /// The last written characters are an indentation prefix.
    indention: bool,
    /// The previous document ended with content that needs an explicit
    /// `...` before another document (or directives) can follow.
    open_ended: bool,
    anchor_data: Option<AnchorAnalysis>,
    tag_data: TagAnalysis,
    scalar_data: Option<ScalarAnalysis>,
    error: Option<Error>,
}

impl Emitter {
    /// Create an emitter with default options.
    pub fn new(output: Output) -> Self {
        Self::with_options(output, EmitOptions::default())
    }

    /// Create an emitter with the given options.
    pub fn with_options(output: Output, options: EmitOptions) -> Self {
        Self {
            output,
            options,
            buffer: String::new(),
            state: State::StreamStart,
            states: Vec::new(),
            events: VecDeque::new(),
            indents: Vec::new(),
            tag_directives: Vec::new(),
            indent: -1,
            flow_level: 0,
            mapping_context: false,
            simple_key_context: false,
            column: 0,
            whitespace: true,
            indention: true,
            open_ended: false,
            anchor_data: None,
            tag_data: TagAnalysis::default(),
            scalar_data: None,
            error: None,
        }
    }

    /// Buffer the event and emit as much output as the lookahead permits.
    ///
    /// Once an error is returned, every subsequent call returns the same
    /// error.
    pub fn emit(&mut self, event: Event) -> Result<()> {
        if let Some(error) = &self.error {
            return Err(error.clone());
        }
        match self.emit_inner(event) {
            Ok(()) => Ok(()),
            Err(error) => {
                self.error = Some(error.clone());
                Err(error)
            }
        }
    }

    /// Recover the in-memory sink, if that is what the emitter writes to.
    /// Unflushed text is flushed first; a flush failure yields `None`.
    pub fn into_buffer(mut self) -> Option<Vec<u8>> {
        if !self.buffer.is_empty() && self.flush().is_err() {
            return None;
        }
        match self.output {
            Output::Buffer(bytes) => Some(bytes),
            _ => None,
        }
    }

    fn emit_inner(&mut self, event: Event) -> Result<()> {
        self.events.push_back(event);
        while !self.need_more_events() {
            // The queue is non-empty here by construction.
            let event = match self.events.pop_front() {
                Some(event) => event,
                None => return Ok(()),
            };
            self.analyze_event(&event)?;
            self.run_state_machine(event)?;
        }
        Ok(())
    }

    /// True while the front event must not be processed yet because its
    /// rendering decision needs more lookahead.
    fn need_more_events(&self) -> bool {
        let first = match self.events.front() {
            Some(event) => event,
            None => return true,
        };
        let accumulate = match first.data {
            EventData::DocumentStart { .. } => 1,
            EventData::SequenceStart { .. } => 2,
            EventData::MappingStart { .. } => 3,
            _ => return false,
        };
        if self.events.len() > accumulate {
            return false;
        }
        // A balanced prefix also suffices: the collection closed within
        // the buffered events.
        let mut level: i64 = 0;
        for event in &self.events {
            match event.data {
                EventData::StreamStart { .. }
                | EventData::DocumentStart { .. }
                | EventData::SequenceStart { .. }
                | EventData::MappingStart { .. } => level += 1,
                EventData::StreamEnd
                | EventData::DocumentEnd { .. }
                | EventData::SequenceEnd
                | EventData::MappingEnd => level -= 1,
                _ => {}
            }
            if level == 0 {
                return false;
            }
        }
        true
    }

    fn emitter_error<T>(&self, problem: impl Into<String>) -> Result<T> {
        Err(Error::Emitter(problem.into()))
    }

    // ------------------------------------------------------------------
    // Event analysis
    // ------------------------------------------------------------------

    fn analyze_event(&mut self, event: &Event) -> Result<()> {
        self.anchor_data = None;
        self.tag_data = TagAnalysis::default();
        self.scalar_data = None;

        match &event.data {
            EventData::Alias { anchor } => {
                self.analyze_anchor(anchor, true)?;
            }
            EventData::Scalar {
                anchor,
                tag,
                value,
                plain_implicit,
                quoted_implicit,
                ..
            } => {
                if let Some(anchor) = anchor {
                    self.analyze_anchor(anchor, false)?;
                }
                if let Some(tag) = tag {
                    if self.options.canonical || (!plain_implicit && !quoted_implicit) {
                        self.analyze_tag(tag)?;
                    }
                }
                self.analyze_scalar(value);
            }
            EventData::SequenceStart {
                anchor,
                tag,
                implicit,
                ..
            }
            | EventData::MappingStart {
                anchor,
                tag,
                implicit,
                ..
            } => {
                if let Some(anchor) = anchor {
                    self.analyze_anchor(anchor, false)?;
                }
                if let Some(tag) = tag {
                    if self.options.canonical || !implicit {
                        self.analyze_tag(tag)?;
                    }
                }
            }
            _ => {}
        }
        Ok(())
    }

    fn analyze_anchor(&mut self, anchor: &str, alias: bool) -> Result<()> {
        if anchor.is_empty() || !anchor.chars().all(is_anchor_char) {
            return self.emitter_error(if alias {
                "alias value must contain alphanumerical characters only"
            } else {
                "anchor value must contain alphanumerical characters only"
            });
        }
        self.anchor_data = Some(AnchorAnalysis {
            anchor: anchor.to_string(),
            alias,
        });
        Ok(())
    }

    fn analyze_tag(&mut self, tag: &str) -> Result<()> {
        if tag.is_empty() {
            return self.emitter_error("tag value must not be empty");
        }
        for directive in &self.tag_directives {
            if tag.len() > directive.prefix.len() && tag.starts_with(&directive.prefix) {
                self.tag_data = TagAnalysis {
                    handle: Some(directive.handle.clone()),
                    suffix: Some(tag[directive.prefix.len()..].to_string()),
                };
                return Ok(());
            }
        }
        self.tag_data = TagAnalysis {
            handle: None,
            suffix: Some(tag.to_string()),
        };
        Ok(())
    }

    /// Classify scalar content: leading/trailing/inner space and break
    /// structure, indicator characters in indicator-sensitive positions,
    /// and special characters, yielding the set of permissible styles.
    fn analyze_scalar(&mut self, value: &str) {
        let chars: Vec<char> = value.chars().collect();

        if chars.is_empty() {
            // An empty scalar renders as '' in flow or key position and
            // has no block form.
            self.scalar_data = Some(ScalarAnalysis {
                value: String::new(),
                multiline: false,
                flow_plain_allowed: false,
                block_plain_allowed: true,
                single_quoted_allowed: true,
                block_allowed: false,
                style: ScalarStyle::Any,
            });
            return;
        }

        let mut block_indicators = false;
        let mut flow_indicators = false;
        let mut line_breaks = false;
        let mut special_characters = false;
        let mut leading_space = false;
        let mut leading_break = false;
        let mut trailing_space = false;
        let mut trailing_break = false;
        let mut break_space = false;
        let mut space_break = false;
        let mut previous_space = false;
        let mut previous_break = false;
        let mut preceded_by_whitespace = true;

        if chars.len() >= 3
            && (chars[..3] == ['-', '-', '-'] || chars[..3] == ['.', '.', '.'])
        {
            block_indicators = true;
            flow_indicators = true;
        }

        for (i, &ch) in chars.iter().enumerate() {
            let followed_by_whitespace = chars
                .get(i + 1)
                .map_or(true, |&next| is_blank(next) || is_break(next));

            if i == 0 {
                match ch {
                    '#' | ',' | '[' | ']' | '{' | '}' | '&' | '*' | '!' | '|' | '>' | '\''
                    | '"' | '%' | '@' | '`' => {
                        flow_indicators = true;
                        block_indicators = true;
                    }
                    '?' | ':' => {
                        flow_indicators = true;
                        if followed_by_whitespace {
                            block_indicators = true;
                        }
                    }
                    '-' if followed_by_whitespace => {
                        flow_indicators = true;
                        block_indicators = true;
                    }
                    _ => {}
                }
            } else {
                match ch {
                    ',' | '?' | '[' | ']' | '{' | '}' => flow_indicators = true,
                    ':' => {
                        flow_indicators = true;
                        if followed_by_whitespace {
                            block_indicators = true;
                        }
                    }
                    '#' if preceded_by_whitespace => {
                        flow_indicators = true;
                        block_indicators = true;
                    }
                    _ => {}
                }
            }

            if !is_printable(ch) || (!ch.is_ascii() && !self.options.unicode) {
                special_characters = true;
            }
            if is_break(ch) {
                line_breaks = true;
            }

            if ch == ' ' {
                if i == 0 {
                    leading_space = true;
                }
                if i == chars.len() - 1 {
                    trailing_space = true;
                }
                if previous_break {
                    break_space = true;
                }
                previous_space = true;
                previous_break = false;
            } else if is_break(ch) {
                if i == 0 {
                    leading_break = true;
                }
                if i == chars.len() - 1 {
                    trailing_break = true;
                }
                if previous_space {
                    space_break = true;
                }
                previous_space = false;
                previous_break = true;
            } else {
                previous_space = false;
                previous_break = false;
            }

            preceded_by_whitespace = is_blank(ch) || is_break(ch);
        }

        let mut flow_plain_allowed = true;
        let mut block_plain_allowed = true;
        let mut single_quoted_allowed = true;
        let mut block_allowed = true;

        if leading_space || leading_break || trailing_space || trailing_break {
            flow_plain_allowed = false;
            block_plain_allowed = false;
        }
        if trailing_space {
            block_allowed = false;
        }
        if break_space {
            flow_plain_allowed = false;
            block_plain_allowed = false;
            single_quoted_allowed = false;
        }
        if space_break || special_characters {
            flow_plain_allowed = false;
            block_plain_allowed = false;
            single_quoted_allowed = false;
            block_allowed = false;
        }
        if line_breaks {
            // A break folds unpredictably in plain and single-quoted
            // styles; only double quoting and block styles keep it intact.
            flow_plain_allowed = false;
            block_plain_allowed = false;
            single_quoted_allowed = false;
        }
        if flow_indicators {
            flow_plain_allowed = false;
        }
        if block_indicators {
            block_plain_allowed = false;
        }

        self.scalar_data = Some(ScalarAnalysis {
            value: value.to_string(),
            multiline: line_breaks,
            flow_plain_allowed,
            block_plain_allowed,
            single_quoted_allowed,
            block_allowed,
            style: ScalarStyle::Any,
        });
    }

    /// Downgrade the requested style along plain, single-quoted,
    /// double-quoted as the analysis rules styles out; force an explicit
    /// `!` tag on an untagged, non-implicit scalar.
    fn select_scalar_style(&mut self, event: &Event) -> Result<()> {
        let (event_style, plain_implicit, quoted_implicit) = match &event.data {
            EventData::Scalar {
                style,
                plain_implicit,
                quoted_implicit,
                ..
            } => (*style, *plain_implicit, *quoted_implicit),
            _ => return Ok(()),
        };
        let data = match &self.scalar_data {
            Some(data) => data,
            None => return Ok(()),
        };

        let no_tag = self.tag_data.handle.is_none() && self.tag_data.suffix.is_none();
        if no_tag && !plain_implicit && !quoted_implicit {
            return self.emitter_error("neither tag nor implicit flags are specified");
        }

        let mut style = event_style;
        if style == ScalarStyle::Any {
            style = ScalarStyle::Plain;
        }
        if self.options.canonical {
            style = ScalarStyle::DoubleQuoted;
        }
        if self.simple_key_context && data.multiline {
            style = ScalarStyle::DoubleQuoted;
        }

        if style == ScalarStyle::Plain {
            if (self.flow_level > 0 && !data.flow_plain_allowed)
                || (self.flow_level == 0 && !data.block_plain_allowed)
            {
                style = ScalarStyle::SingleQuoted;
            }
            if data.value.is_empty() && (self.flow_level > 0 || self.simple_key_context) {
                style = ScalarStyle::SingleQuoted;
            }
            if no_tag && !plain_implicit {
                style = ScalarStyle::SingleQuoted;
            }
        }
        if style == ScalarStyle::SingleQuoted && !data.single_quoted_allowed {
            style = ScalarStyle::DoubleQuoted;
        }
        if (style == ScalarStyle::Literal || style == ScalarStyle::Folded)
            && (!data.block_allowed || self.flow_level > 0 || self.simple_key_context)
        {
            style = ScalarStyle::DoubleQuoted;
        }

        if no_tag && !quoted_implicit && style != ScalarStyle::Plain {
            self.tag_data = TagAnalysis {
                handle: Some("!".to_string()),
                suffix: None,
            };
        }

        if let Some(data) = &mut self.scalar_data {
            data.style = style;
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // State machine
    // ------------------------------------------------------------------

    fn run_state_machine(&mut self, event: Event) -> Result<()> {
        match self.state {
            State::StreamStart => self.emit_stream_start(event),
            State::FirstDocumentStart => self.emit_document_start(event, true),
            State::DocumentStart => self.emit_document_start(event, false),
            State::DocumentContent => self.emit_document_content(event),
            State::DocumentEnd => self.emit_document_end(event),
            State::FlowSequenceFirstItem => self.emit_flow_sequence_item(event, true),
            State::FlowSequenceItem => self.emit_flow_sequence_item(event, false),
            State::FlowMappingFirstKey => self.emit_flow_mapping_key(event, true),
            State::FlowMappingKey => self.emit_flow_mapping_key(event, false),
            State::FlowMappingSimpleValue => self.emit_flow_mapping_value(event, true),
            State::FlowMappingValue => self.emit_flow_mapping_value(event, false),
            State::BlockSequenceFirstItem => self.emit_block_sequence_item(event, true),
            State::BlockSequenceItem => self.emit_block_sequence_item(event, false),
            State::BlockMappingFirstKey => self.emit_block_mapping_key(event, true),
            State::BlockMappingKey => self.emit_block_mapping_key(event, false),
            State::BlockMappingSimpleValue => self.emit_block_mapping_value(event, true),
            State::BlockMappingValue => self.emit_block_mapping_value(event, false),
            State::End => self.emitter_error("expected nothing after STREAM-END"),
        }
    }

    fn emit_stream_start(&mut self, event: Event) -> Result<()> {
        if !matches!(event.data, EventData::StreamStart { .. }) {
            return self.emitter_error("expected STREAM-START");
        }
        if !(2..=9).contains(&self.options.indent) {
            self.options.indent = 2;
        }
        if self.options.width <= 0 {
            self.options.width = i64::MAX;
        } else if self.options.width <= self.options.indent * 2 {
            self.options.width = 80;
        }
        self.indent = -1;
        self.column = 0;
        self.whitespace = true;
        self.indention = true;
        if self.options.encoding != Encoding::Utf8 {
            self.buffer.push('\u{FEFF}');
        }
        self.state = State::FirstDocumentStart;
        Ok(())
    }

    fn emit_document_start(&mut self, event: Event, first: bool) -> Result<()> {
        match &event.data {
            EventData::DocumentStart {
                version,
                tags,
                implicit,
            } => {
                if let Some(version) = version {
                    self.analyze_version_directive(*version)?;
                }
                for directive in tags.clone() {
                    self.analyze_tag_directive(&directive)?;
                    self.append_tag_directive(directive, false)?;
                }
                for (handle, prefix) in [("!", "!"), ("!!", "tag:yaml.org,2002:")] {
                    self.append_tag_directive(
                        TagDirective {
                            handle: handle.to_string(),
                            prefix: prefix.to_string(),
                        },
                        true,
                    )?;
                }

                let mut implicit = *implicit;
                if !first || self.options.canonical {
                    implicit = false;
                }

                if (version.is_some() || !tags.is_empty()) && self.open_ended {
                    self.write_indicator("...", true, false, false)?;
                    self.write_indent()?;
                }

                if let Some(version) = version {
                    implicit = false;
                    self.write_indicator("%YAML", true, false, false)?;
                    let text = format!("{}.{}", version.major, version.minor);
                    self.write_indicator(&text, true, false, false)?;
                    self.write_indent()?;
                }

                if !tags.is_empty() {
                    implicit = false;
                    for directive in tags.clone() {
                        self.write_indicator("%TAG", true, false, false)?;
                        self.write_tag_handle(&directive.handle)?;
                        self.write_tag_content(&directive.prefix, true)?;
                        self.write_indent()?;
                    }
                }

                if !implicit {
                    self.write_indent()?;
                    self.write_indicator("---", true, false, false)?;
                    if self.options.canonical {
                        self.write_indent()?;
                    }
                }

                self.state = State::DocumentContent;
                Ok(())
            }
            EventData::StreamEnd => {
                if self.open_ended {
                    self.write_indicator("...", true, false, false)?;
                    self.write_indent()?;
                }
                self.flush()?;
                self.state = State::End;
                Ok(())
            }
            _ => self.emitter_error("expected DOCUMENT-START or STREAM-END"),
        }
    }

    fn analyze_version_directive(&mut self, version: VersionDirective) -> Result<()> {
        if version.major != 1 || version.minor != 1 {
            return self.emitter_error("incompatible %YAML directive");
        }
        Ok(())
    }

    fn analyze_tag_directive(&mut self, directive: &TagDirective) -> Result<()> {
        let handle = &directive.handle;
        if handle.is_empty() {
            return self.emitter_error("tag handle must not be empty");
        }
        let chars: Vec<char> = handle.chars().collect();
        if chars[0] != '!' {
            return self.emitter_error("tag handle must start with '!'");
        }
        if chars[chars.len() - 1] != '!' {
            return self.emitter_error("tag handle must end with '!'");
        }
        if chars.len() > 1 && !chars[1..chars.len() - 1].iter().all(|&ch| is_anchor_char(ch)) {
            return self.emitter_error("tag handle must contain alphanumerical characters only");
        }
        if directive.prefix.is_empty() {
            return self.emitter_error("tag prefix must not be empty");
        }
        Ok(())
    }

    fn append_tag_directive(&mut self, directive: TagDirective, allow_duplicates: bool) -> Result<()> {
        if self
            .tag_directives
            .iter()
            .any(|d| d.handle == directive.handle)
        {
            if allow_duplicates {
                return Ok(());
            }
            return self.emitter_error("duplicate %TAG directive");
        }
        self.tag_directives.push(directive);
        Ok(())
    }

    fn emit_document_content(&mut self, event: Event) -> Result<()> {
        self.states.push(State::DocumentEnd);
        self.emit_node(event, false, false)
    }

    fn emit_document_end(&mut self, event: Event) -> Result<()> {
        if let EventData::DocumentEnd { implicit } = event.data {
            self.write_indent()?;
            if !implicit {
                self.write_indicator("...", true, false, false)?;
                self.write_indent()?;
            }
            self.flush()?;
            self.state = State::DocumentStart;
            self.tag_directives.clear();
            Ok(())
        } else {
            self.emitter_error("expected DOCUMENT-END")
        }
    }

    fn emit_node(&mut self, event: Event, mapping: bool, simple_key: bool) -> Result<()> {
        self.mapping_context = mapping;
        self.simple_key_context = simple_key;

        match &event.data {
            EventData::Alias { .. } => self.emit_alias(),
            EventData::Scalar { .. } => self.emit_scalar(event),
            EventData::SequenceStart { style, .. } => {
                let flow = *style == crate::event::CollectionStyle::Flow;
                self.emit_sequence_start(flow)
            }
            EventData::MappingStart { style, .. } => {
                let flow = *style == crate::event::CollectionStyle::Flow;
                self.emit_mapping_start(flow)
            }
            _ => self.emitter_error("expected SCALAR, SEQUENCE-START, MAPPING-START, or ALIAS"),
        }
    }

    fn emit_alias(&mut self) -> Result<()> {
        self.process_anchor()?;
        self.state = self.pop_state();
        Ok(())
    }

    fn emit_scalar(&mut self, event: Event) -> Result<()> {
        self.select_scalar_style(&event)?;
        self.process_anchor()?;
        self.process_tag()?;
        self.increase_indent(true, false);
        self.process_scalar()?;
        self.indent = self.pop_indent();
        self.state = self.pop_state();
        Ok(())
    }

    fn emit_sequence_start(&mut self, flow: bool) -> Result<()> {
        self.process_anchor()?;
        self.process_tag()?;
        if self.flow_level > 0
            || self.options.canonical
            || flow
            || self.check_empty_sequence()
        {
            self.state = State::FlowSequenceFirstItem;
        } else {
            self.state = State::BlockSequenceFirstItem;
        }
        Ok(())
    }

    fn emit_mapping_start(&mut self, flow: bool) -> Result<()> {
        self.process_anchor()?;
        self.process_tag()?;
        if self.flow_level > 0 || self.options.canonical || flow || self.check_empty_mapping() {
            self.state = State::FlowMappingFirstKey;
        } else {
            self.state = State::BlockMappingFirstKey;
        }
        Ok(())
    }

    fn emit_flow_sequence_item(&mut self, event: Event, first: bool) -> Result<()> {
        if first {
            self.write_indicator("[", true, true, false)?;
            self.increase_indent(true, false);
            self.flow_level += 1;
        }

        if event.data == EventData::SequenceEnd {
            self.flow_level -= 1;
            self.indent = self.pop_indent();
            if self.options.canonical && !first {
                self.write_indicator(",", false, false, false)?;
                self.write_indent()?;
            }
            self.write_indicator("]", false, false, false)?;
            self.state = self.pop_state();
            return Ok(());
        }

        if !first {
            self.write_indicator(",", false, false, false)?;
        }
        if self.options.canonical || self.column > self.options.width {
            self.write_indent()?;
        }
        self.states.push(State::FlowSequenceItem);
        self.emit_node(event, false, false)
    }

    fn emit_flow_mapping_key(&mut self, event: Event, first: bool) -> Result<()> {
        if first {
            self.write_indicator("{", true, true, false)?;
            self.increase_indent(true, false);
            self.flow_level += 1;
        }

        if event.data == EventData::MappingEnd {
            self.flow_level -= 1;
            self.indent = self.pop_indent();
            if self.options.canonical && !first {
                self.write_indicator(",", false, false, false)?;
                self.write_indent()?;
            }
            self.write_indicator("}", false, false, false)?;
            self.state = self.pop_state();
            return Ok(());
        }

        if !first {
            self.write_indicator(",", false, false, false)?;
        }
        if self.options.canonical || self.column > self.options.width {
            self.write_indent()?;
        }

        if !self.options.canonical && self.check_simple_key(&event) {
            self.states.push(State::FlowMappingSimpleValue);
            self.emit_node(event, true, true)
        } else {
            self.write_indicator("?", true, false, false)?;
            self.states.push(State::FlowMappingValue);
            self.emit_node(event, true, false)
        }
    }

    fn emit_flow_mapping_value(&mut self, event: Event, simple: bool) -> Result<()> {
        if simple {
            self.write_indicator(":", false, false, false)?;
        } else {
            if self.options.canonical || self.column > self.options.width {
                self.write_indent()?;
            }
            self.write_indicator(":", true, false, false)?;
        }
        self.states.push(State::FlowMappingKey);
        self.emit_node(event, true, false)
    }

    fn emit_block_sequence_item(&mut self, event: Event, first: bool) -> Result<()> {
        if first {
            let indentless = self.mapping_context && !self.indention;
            self.increase_indent(false, indentless);
        }

        if event.data == EventData::SequenceEnd {
            self.indent = self.pop_indent();
            self.state = self.pop_state();
            return Ok(());
        }

        self.write_indent()?;
        self.write_indicator("-", true, false, true)?;
        self.states.push(State::BlockSequenceItem);
        self.emit_node(event, false, false)
    }

    fn emit_block_mapping_key(&mut self, event: Event, first: bool) -> Result<()> {
        if first {
            self.increase_indent(false, false);
        }

        if event.data == EventData::MappingEnd {
            self.indent = self.pop_indent();
            self.state = self.pop_state();
            return Ok(());
        }

        self.write_indent()?;
        if self.check_simple_key(&event) {
            self.states.push(State::BlockMappingSimpleValue);
            self.emit_node(event, true, true)
        } else {
            self.write_indicator("?", true, false, true)?;
            self.states.push(State::BlockMappingValue);
            self.emit_node(event, true, false)
        }
    }

    fn emit_block_mapping_value(&mut self, event: Event, simple: bool) -> Result<()> {
        if simple {
            self.write_indicator(":", false, false, false)?;
        } else {
            self.write_indent()?;
            self.write_indicator(":", true, false, true)?;
        }
        self.states.push(State::BlockMappingKey);
        self.emit_node(event, true, false)
    }

    // ------------------------------------------------------------------
    // Lookahead checks
    // ------------------------------------------------------------------

    /// The current SEQUENCE-START is immediately followed by its end.
    fn check_empty_sequence(&self) -> bool {
        matches!(
            self.events.front().map(|e| &e.data),
            Some(EventData::SequenceEnd)
        )
    }

    /// The current MAPPING-START is immediately followed by its end.
    fn check_empty_mapping(&self) -> bool {
        matches!(
            self.events.front().map(|e| &e.data),
            Some(EventData::MappingEnd)
        )
    }

    /// A key is simple when it is not multiline and its rendered anchor,
    /// tag, and content together stay within the length ceiling.
    fn check_simple_key(&self, event: &Event) -> bool {
        let mut length = 0;
        if let Some(anchor) = &self.anchor_data {
            length += anchor.anchor.len();
        }
        length += self.tag_data.handle.as_deref().map_or(0, str::len);
        length += self.tag_data.suffix.as_deref().map_or(0, str::len);

        match &event.data {
            EventData::Alias { .. } => {}
            EventData::Scalar { .. } => {
                match &self.scalar_data {
                    Some(data) => {
                        if data.multiline {
                            return false;
                        }
                        length += data.value.len();
                    }
                    None => return false,
                }
            }
            EventData::SequenceStart { .. } => {
                if !self.check_empty_sequence() {
                    return false;
                }
            }
            EventData::MappingStart { .. } => {
                if !self.check_empty_mapping() {
                    return false;
                }
            }
            _ => return false,
        }

        length <= MAX_SIMPLE_KEY_LENGTH
    }

    // ------------------------------------------------------------------
    // Indentation
    // ------------------------------------------------------------------

    fn increase_indent(&mut self, flow: bool, indentless: bool) {
        self.indents.push(self.indent);
        if self.indent < 0 {
            self.indent = if flow { self.options.indent } else { 0 };
        } else if !indentless {
            self.indent += self.options.indent;
        }
    }

    fn pop_indent(&mut self) -> i64 {
        self.indents.pop().unwrap_or(-1)
    }

    fn pop_state(&mut self) -> State {
        self.states.pop().unwrap_or(State::End)
    }

    // ------------------------------------------------------------------
    // Processors
    // ------------------------------------------------------------------

    fn process_anchor(&mut self) -> Result<()> {
        let anchor = match self.anchor_data.take() {
            Some(anchor) => anchor,
            None => return Ok(()),
        };
        self.write_indicator(if anchor.alias { "*" } else { "&" }, true, false, false)?;
        self.write_string(&anchor.anchor);
        Ok(())
    }

    fn process_tag(&mut self) -> Result<()> {
        let tag = std::mem::take(&mut self.tag_data);
        if tag.handle.is_none() && tag.suffix.is_none() {
            return Ok(());
        }
        match tag.handle {
            Some(handle) => {
                self.write_tag_handle(&handle)?;
                if let Some(suffix) = tag.suffix {
                    self.write_tag_content(&suffix, false)?;
                }
            }
            None => {
                // A tag with no matching shorthand is written verbatim.
                if let Some(suffix) = tag.suffix {
                    self.write_indicator("!<", true, false, false)?;
                    self.write_tag_content(&suffix, false)?;
                    self.write_indicator(">", false, false, false)?;
                }
            }
        }
        Ok(())
    }

    fn process_scalar(&mut self) -> Result<()> {
        let data = match self.scalar_data.take() {
            Some(data) => data,
            None => return Ok(()),
        };
        let allow_breaks = !self.simple_key_context;
        match data.style {
            ScalarStyle::Plain => self.write_plain_scalar(&data.value, allow_breaks),
            ScalarStyle::SingleQuoted => self.write_single_quoted_scalar(&data.value, allow_breaks),
            ScalarStyle::DoubleQuoted => self.write_double_quoted_scalar(&data.value, allow_breaks),
            ScalarStyle::Literal => self.write_literal_scalar(&data.value),
            ScalarStyle::Folded => self.write_folded_scalar(&data.value),
            // Style selection never leaves Any in place.
            ScalarStyle::Any => self.write_plain_scalar(&data.value, allow_breaks),
        }
    }

    // ------------------------------------------------------------------
    // Low-level writers
    // ------------------------------------------------------------------

    fn put(&mut self, ch: char) {
        self.buffer.push(ch);
        self.column += 1;
    }

    fn put_break(&mut self) {
        self.buffer.push_str(self.options.line_break.as_str());
        self.column = 0;
    }

    /// Write one content character, treating LF as a configured break.
    fn write_char_or_break(&mut self, ch: char) {
        if ch == '\n' {
            self.put_break();
        } else if is_break(ch) {
            self.buffer.push(ch);
            self.column = 0;
        } else {
            self.put(ch);
        }
    }

    fn write_string(&mut self, text: &str) {
        for ch in text.chars() {
            self.put(ch);
        }
        self.whitespace = false;
        self.indention = false;
    }

    fn write_indicator(
        &mut self,
        indicator: &str,
        need_whitespace: bool,
        is_whitespace: bool,
        is_indention: bool,
    ) -> Result<()> {
        if need_whitespace && !self.whitespace {
            self.put(' ');
        }
        for ch in indicator.chars() {
            self.put(ch);
        }
        self.whitespace = is_whitespace;
        self.indention = self.indention && is_indention;
        self.open_ended = false;
        Ok(())
    }

    fn write_indent(&mut self) -> Result<()> {
        let indent = self.indent.max(0);
        if !self.indention || self.column > indent || (self.column == indent && !self.whitespace)
        {
            self.put_break();
        }
        while self.column < indent {
            self.put(' ');
        }
        self.whitespace = true;
        self.indention = true;
        Ok(())
    }

    fn write_tag_handle(&mut self, handle: &str) -> Result<()> {
        if !self.whitespace {
            self.put(' ');
        }
        self.write_string(handle);
        Ok(())
    }

    fn write_tag_content(&mut self, content: &str, need_whitespace: bool) -> Result<()> {
        if need_whitespace && !self.whitespace {
            self.put(' ');
        }
        for ch in content.chars() {
            if is_tag_content_char(ch) {
                self.put(ch);
            } else {
                let mut utf8 = [0u8; 4];
                for byte in ch.encode_utf8(&mut utf8).as_bytes() {
                    self.put('%');
                    for hex in format!("{:02X}", byte).chars() {
                        self.put(hex);
                    }
                }
            }
        }
        self.whitespace = false;
        self.indention = false;
        Ok(())
    }

    fn write_plain_scalar(&mut self, value: &str, allow_breaks: bool) -> Result<()> {
        let chars: Vec<char> = value.chars().collect();
        let mut spaces = false;
        let mut breaks = false;

        if !self.whitespace {
            self.put(' ');
        }

        let mut i = 0;
        while i < chars.len() {
            let ch = chars[i];
            if ch == ' ' {
                if allow_breaks
                    && !spaces
                    && self.column > self.options.width
                    && chars.get(i + 1) != Some(&' ')
                {
                    // Fold the space into a line break.
                    self.write_indent()?;
                } else {
                    self.put(ch);
                }
                spaces = true;
            } else if is_break(ch) {
                // A lone line feed must round-trip as a blank line, since a
                // single break would fold back into a space.
                if !breaks && ch == '\n' {
                    self.put_break();
                }
                self.write_char_or_break(ch);
                self.indention = true;
                breaks = true;
            } else {
                if breaks {
                    self.write_indent()?;
                }
                self.put(ch);
                self.indention = false;
                spaces = false;
                breaks = false;
            }
            i += 1;
        }

        self.whitespace = false;
        self.indention = false;
        Ok(())
    }

    fn write_single_quoted_scalar(&mut self, value: &str, allow_breaks: bool) -> Result<()> {
        let chars: Vec<char> = value.chars().collect();
        let mut spaces = false;
        let mut breaks = false;

        self.write_indicator("'", true, false, false)?;

        let mut i = 0;
        while i < chars.len() {
            let ch = chars[i];
            if ch == ' ' {
                if allow_breaks
                    && !spaces
                    && self.column > self.options.width
                    && i != 0
                    && i != chars.len() - 1
                    && chars.get(i + 1) != Some(&' ')
                {
                    self.write_indent()?;
                } else {
                    self.put(ch);
                }
                spaces = true;
            } else if is_break(ch) {
                if !breaks && ch == '\n' {
                    self.put_break();
                }
                self.write_char_or_break(ch);
                self.indention = true;
                breaks = true;
            } else {
                if breaks {
                    self.write_indent()?;
                }
                if ch == '\'' {
                    self.put('\'');
                }
                self.put(ch);
                self.indention = false;
                spaces = false;
                breaks = false;
            }
            i += 1;
        }

        self.write_indicator("'", false, false, false)?;
        Ok(())
    }

    fn write_double_quoted_scalar(&mut self, value: &str, allow_breaks: bool) -> Result<()> {
        let chars: Vec<char> = value.chars().collect();
        let mut spaces = false;

        self.write_indicator("\"", true, false, false)?;

        let mut i = 0;
        while i < chars.len() {
            let ch = chars[i];
            let needs_escape = !is_printable(ch)
                || (!ch.is_ascii() && !self.options.unicode)
                || is_break(ch)
                || ch == '"'
                || ch == '\\';
            if needs_escape {
                self.put('\\');
                match ch {
                    '\0' => self.put('0'),
                    '\x07' => self.put('a'),
                    '\x08' => self.put('b'),
                    '\t' => self.put('t'),
                    '\n' => self.put('n'),
                    '\x0B' => self.put('v'),
                    '\x0C' => self.put('f'),
                    '\r' => self.put('r'),
                    '\x1B' => self.put('e'),
                    '"' => self.put('"'),
                    '\\' => self.put('\\'),
                    '\u{85}' => self.put('N'),
                    '\u{A0}' => self.put('_'),
                    '\u{2028}' => self.put('L'),
                    '\u{2029}' => self.put('P'),
                    _ => {
                        let value = ch as u32;
                        let escaped = if value <= 0xFF {
                            format!("x{:02X}", value)
                        } else if value <= 0xFFFF {
                            format!("u{:04X}", value)
                        } else {
                            format!("U{:08X}", value)
                        };
                        for hex in escaped.chars() {
                            self.put(hex);
                        }
                    }
                }
                spaces = false;
            } else if ch == ' ' {
                if allow_breaks
                    && !spaces
                    && self.column > self.options.width
                    && i != 0
                    && i != chars.len() - 1
                {
                    self.write_indent()?;
                    if chars.get(i + 1) == Some(&' ') {
                        // Escape the following space so the fold does not
                        // swallow it.
                        self.put('\\');
                    }
                } else {
                    self.put(ch);
                }
                spaces = true;
            } else {
                self.put(ch);
                spaces = false;
            }
            i += 1;
        }

        self.write_indicator("\"", false, false, false)?;
        Ok(())
    }

    /// Write the explicit indent and chomping hints a block scalar header
    /// needs to reproduce the value exactly.
    fn write_block_scalar_hints(&mut self, chars: &[char]) -> Result<()> {
        if chars
            .first()
            .map_or(false, |&ch| is_blank(ch) || is_break(ch))
        {
            let hint = format!("{}", self.options.indent);
            self.write_indicator(&hint, false, false, false)?;
        }

        self.open_ended = false;
        let chomp_hint = match chars.last() {
            None => Some("-"),
            Some(&last) if !is_break(last) => Some("-"),
            _ => {
                if chars.len() == 1 || chars.get(chars.len() - 2).map_or(false, |&ch| is_break(ch))
                {
                    self.open_ended = true;
                    Some("+")
                } else {
                    None
                }
            }
        };
        if let Some(hint) = chomp_hint {
            self.write_indicator(hint, false, false, false)?;
        }
        Ok(())
    }

    fn write_literal_scalar(&mut self, value: &str) -> Result<()> {
        let chars: Vec<char> = value.chars().collect();
        let mut breaks = true;

        self.write_indicator("|", true, false, false)?;
        self.write_block_scalar_hints(&chars)?;
        self.put_break();
        self.indention = true;
        self.whitespace = true;

        for &ch in &chars {
            if is_break(ch) {
                self.write_char_or_break(ch);
                self.indention = true;
                breaks = true;
            } else {
                if breaks {
                    self.write_indent()?;
                }
                self.put(ch);
                self.indention = false;
                breaks = false;
            }
        }
        Ok(())
    }

    fn write_folded_scalar(&mut self, value: &str) -> Result<()> {
        let chars: Vec<char> = value.chars().collect();
        let mut breaks = true;
        let mut leading_spaces = true;

        self.write_indicator(">", true, false, false)?;
        self.write_block_scalar_hints(&chars)?;
        self.put_break();
        self.indention = true;
        self.whitespace = true;

        let mut i = 0;
        while i < chars.len() {
            let ch = chars[i];
            if is_break(ch) {
                if !breaks && !leading_spaces && ch == '\n' {
                    // An extra break keeps consecutive content lines from
                    // folding together, unless the next line is blank or
                    // more indented anyway.
                    let mut k = i;
                    while k < chars.len() && is_break(chars[k]) {
                        k += 1;
                    }
                    if k < chars.len() && !(is_blank(chars[k]) || is_break(chars[k])) {
                        self.put_break();
                    }
                }
                self.write_char_or_break(ch);
                self.indention = true;
                breaks = true;
            } else {
                if breaks {
                    self.write_indent()?;
                    leading_spaces = is_blank(ch);
                }
                if !breaks
                    && ch == ' '
                    && chars.get(i + 1) != Some(&' ')
                    && self.column > self.options.width
                {
                    self.write_indent()?;
                } else {
                    self.put(ch);
                }
                self.indention = false;
                breaks = false;
            }
            i += 1;
        }
        Ok(())
    }

    /// Send buffered text to the sink, transcoding to the configured
    /// output encoding.
    fn flush(&mut self) -> Result<()> {
        if self.buffer.is_empty() {
            return Ok(());
        }
        let text = std::mem::take(&mut self.buffer);
        let bytes: Vec<u8> = match self.options.encoding {
            Encoding::Utf8 => text.into_bytes(),
            Encoding::Utf16Le => text
                .encode_utf16()
                .flat_map(|unit| unit.to_le_bytes())
                .collect(),
            Encoding::Utf16Be => text
                .encode_utf16()
                .flat_map(|unit| unit.to_be_bytes())
                .collect(),
        };
        match &mut self.output {
            Output::Buffer(sink) => {
                sink.extend_from_slice(&bytes);
                Ok(())
            }
            Output::Stream(stream) => stream
                .write_all(&bytes)
                .and_then(|_| stream.flush())
                .map_err(|e| Error::Writer(e.to_string())),
            Output::Callback(callback) => {
                callback(&bytes).map_err(|e| Error::Writer(e.to_string()))
            }
        }
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

fn is_printable(ch: char) -> bool {
    matches!(ch as u32,
        0x09 | 0x0A | 0x0D | 0x85
        | 0x20..=0x7E
        | 0xA0..=0xD7FF
        | 0xE000..=0xFFFD
        | 0x10000..=0x10FFFF)
}

fn is_anchor_char(ch: char) -> bool {
    ch.is_ascii_alphanumeric() || ch == '_' || ch == '-'
}

fn is_tag_content_char(ch: char) -> bool {
    ch.is_ascii_alphanumeric()
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
                | '_'
                | '.'
                | '!'
                | '~'
                | '*'
                | '\''
                | '('
                | ')'
                | '['
                | ']'
        )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::CollectionStyle;

    /// Emit a full stream around the given node events and return the text.
    fn emit_document(nodes: Vec<Event>) -> String {
        emit_document_with(nodes, EmitOptions::default())
    }

    fn emit_document_with(nodes: Vec<Event>, options: EmitOptions) -> String {
        let mut emitter = Emitter::with_options(Output::buffer(), options);
        emitter.emit(Event::stream_start(Encoding::Utf8)).unwrap();
        emitter
            .emit(Event::document_start(None, Vec::new(), true))
            .unwrap();
        for event in nodes {
            emitter.emit(event).unwrap();
        }
        emitter.emit(Event::document_end(true)).unwrap();
        emitter.emit(Event::stream_end()).unwrap();
        let bytes = emitter.into_buffer().expect("buffer output");
        String::from_utf8(bytes).expect("utf8 output")
    }

    #[test]
    fn test_plain_scalar_document() {
        let text = emit_document(vec![Event::scalar("hello", ScalarStyle::Plain)]);
        assert_eq!(text, "hello\n");
    }

    #[test]
    fn test_block_sequence() {
        let text = emit_document(vec![
            Event::sequence_start(CollectionStyle::Block),
            Event::scalar("1", ScalarStyle::Plain),
            Event::scalar("2", ScalarStyle::Plain),
            Event::sequence_end(),
        ]);
        assert_eq!(text, "- 1\n- 2\n");
    }

    #[test]
    fn test_block_mapping() {
        let text = emit_document(vec![
            Event::mapping_start(CollectionStyle::Block),
            Event::scalar("key", ScalarStyle::Plain),
            Event::scalar("value", ScalarStyle::Plain),
            Event::mapping_end(),
        ]);
        assert_eq!(text, "key: value\n");
    }

    #[test]
    fn test_empty_flow_mapping_is_compact() {
        let text = emit_document(vec![
            Event::mapping_start(CollectionStyle::Block),
            Event::mapping_end(),
        ]);
        assert_eq!(text, "{}\n");
    }

    #[test]
    fn test_empty_flow_sequence_is_compact() {
        let text = emit_document(vec![
            Event::sequence_start(CollectionStyle::Block),
            Event::sequence_end(),
        ]);
        assert_eq!(text, "[]\n");
    }

    #[test]
    fn test_flow_sequence() {
        let text = emit_document(vec![
            Event::sequence_start(CollectionStyle::Flow),
            Event::scalar("a", ScalarStyle::Plain),
            Event::scalar("b", ScalarStyle::Plain),
            Event::sequence_end(),
        ]);
        assert_eq!(text, "[a, b]\n");
    }

    #[test]
    fn test_plain_with_break_downgrades_to_double_quoted() {
        let text = emit_document(vec![Event::scalar("a\nb", ScalarStyle::Plain)]);
        assert_eq!(text, "\"a\\nb\"\n");
    }

    #[test]
    fn test_plain_without_specials_stays_plain() {
        let text = emit_document(vec![Event::scalar("plain text", ScalarStyle::Plain)]);
        assert_eq!(text, "plain text\n");
    }

    #[test]
    fn test_literal_in_flow_downgrades_to_double_quoted() {
        let text = emit_document(vec![
            Event::sequence_start(CollectionStyle::Flow),
            Event::scalar("a\nb", ScalarStyle::Literal),
            Event::sequence_end(),
        ]);
        assert_eq!(text, "[\"a\\nb\"]\n");
    }

    #[test]
    fn test_literal_block_scalar_in_block_context() {
        let text = emit_document(vec![
            Event::mapping_start(CollectionStyle::Block),
            Event::scalar("key", ScalarStyle::Plain),
            Event::scalar("line1\nline2\n", ScalarStyle::Literal),
            Event::mapping_end(),
        ]);
        assert_eq!(text, "key: |\n  line1\n  line2\n");
    }

    #[test]
    fn test_leading_space_forces_quoting() {
        let text = emit_document(vec![Event::scalar(" padded", ScalarStyle::Plain)]);
        assert_eq!(text, "' padded'\n");
    }

    #[test]
    fn test_indicator_start_forces_quoting() {
        let text = emit_document(vec![Event::scalar("- not a list", ScalarStyle::Plain)]);
        assert_eq!(text, "'- not a list'\n");
    }

    #[test]
    fn test_single_quote_content_escapes() {
        let text = emit_document(vec![Event::scalar("it's", ScalarStyle::SingleQuoted)]);
        assert_eq!(text, "'it''s'\n");
    }

    #[test]
    fn test_non_ascii_escaped_by_default() {
        let text = emit_document(vec![Event::scalar("caf\u{E9}", ScalarStyle::Plain)]);
        assert_eq!(text, "\"caf\\xE9\"\n");
    }

    #[test]
    fn test_non_ascii_unescaped_with_unicode_option() {
        let text = emit_document_with(
            vec![Event::scalar("caf\u{E9}", ScalarStyle::Plain)],
            EmitOptions::new().with_unicode(true),
        );
        assert_eq!(text, "caf\u{E9}\n");
    }

    #[test]
    fn test_canonical_mode_forces_double_quotes() {
        let mut emitter = Emitter::with_options(
            Output::buffer(),
            EmitOptions::new().with_canonical(true),
        );
        emitter.emit(Event::stream_start(Encoding::Utf8)).unwrap();
        emitter
            .emit(Event::document_start(None, Vec::new(), true))
            .unwrap();
        emitter.emit(Event::scalar("x", ScalarStyle::Plain)).unwrap();
        emitter.emit(Event::document_end(true)).unwrap();
        emitter.emit(Event::stream_end()).unwrap();
        let text = String::from_utf8(emitter.into_buffer().unwrap()).unwrap();
        assert!(text.contains("\"x\""));
        assert!(text.contains("---"));
    }

    #[test]
    fn test_anchor_and_alias_round() {
        let mut anchored = Event::scalar("x", ScalarStyle::Plain);
        if let EventData::Scalar { anchor, .. } = &mut anchored.data {
            *anchor = Some("a".to_string());
        }
        let text = emit_document(vec![
            Event::sequence_start(CollectionStyle::Block),
            anchored,
            Event::alias("a"),
            Event::sequence_end(),
        ]);
        assert_eq!(text, "- &a x\n- *a\n");
    }

    #[test]
    fn test_invalid_anchor_name_rejected() {
        let mut emitter = Emitter::new(Output::buffer());
        emitter.emit(Event::stream_start(Encoding::Utf8)).unwrap();
        emitter
            .emit(Event::document_start(None, Vec::new(), true))
            .unwrap();
        let error = emitter.emit(Event::alias("not valid")).unwrap_err();
        assert!(error
            .to_string()
            .contains("alias value must contain alphanumerical characters only"));
    }

    #[test]
    fn test_misuse_without_stream_start() {
        let mut emitter = Emitter::new(Output::buffer());
        let error = emitter
            .emit(Event::scalar("x", ScalarStyle::Plain))
            .unwrap_err();
        assert!(error.to_string().contains("expected STREAM-START"));
    }

    #[test]
    fn test_misuse_after_stream_end() {
        let mut emitter = Emitter::new(Output::buffer());
        emitter.emit(Event::stream_start(Encoding::Utf8)).unwrap();
        emitter.emit(Event::stream_end()).unwrap();
        let error = emitter.emit(Event::stream_end()).unwrap_err();
        assert!(error
            .to_string()
            .contains("expected nothing after STREAM-END"));
    }

    #[test]
    fn test_scalar_without_tag_or_implicit_flags_rejected() {
        let mut emitter = Emitter::new(Output::buffer());
        emitter.emit(Event::stream_start(Encoding::Utf8)).unwrap();
        emitter
            .emit(Event::document_start(None, Vec::new(), true))
            .unwrap();
        let mut event = Event::scalar("x", ScalarStyle::Plain);
        if let EventData::Scalar {
            plain_implicit,
            quoted_implicit,
            ..
        } = &mut event.data
        {
            *plain_implicit = false;
            *quoted_implicit = false;
        }
        let error = emitter.emit(event).unwrap_err();
        assert!(error
            .to_string()
            .contains("neither tag nor implicit flags are specified"));
    }

    #[test]
    fn test_lookahead_gates_sequence_start_output() {
        let mut emitter = Emitter::new(Output::buffer());
        emitter.emit(Event::stream_start(Encoding::Utf8)).unwrap();
        emitter
            .emit(Event::document_start(None, Vec::new(), true))
            .unwrap();
        emitter
            .emit(Event::sequence_start(CollectionStyle::Block))
            .unwrap();
        // One more event is not enough to settle emptiness for the
        // sequence; nothing may have been flushed yet.
        emitter
            .emit(Event::scalar("x", ScalarStyle::Plain))
            .unwrap();
        let bytes = emitter.into_buffer().expect("buffer output");
        let text = String::from_utf8(bytes).unwrap();
        assert!(
            !text.contains('x'),
            "sequence content escaped before lookahead settled: {:?}",
            text
        );
    }

    #[test]
    fn test_mapping_key_too_long_for_simple_key() {
        let long_key = "k".repeat(200);
        let text = emit_document(vec![
            Event::mapping_start(CollectionStyle::Block),
            Event::scalar(long_key.clone(), ScalarStyle::Plain),
            Event::scalar("v", ScalarStyle::Plain),
            Event::mapping_end(),
        ]);
        assert!(text.starts_with("? "), "expected explicit key: {:?}", text);
        assert!(text.contains(&long_key));
    }

    #[test]
    fn test_explicit_document_markers() {
        let mut emitter = Emitter::new(Output::buffer());
        emitter.emit(Event::stream_start(Encoding::Utf8)).unwrap();
        emitter
            .emit(Event::document_start(None, Vec::new(), false))
            .unwrap();
        emitter.emit(Event::scalar("x", ScalarStyle::Plain)).unwrap();
        emitter.emit(Event::document_end(false)).unwrap();
        emitter.emit(Event::stream_end()).unwrap();
        let text = String::from_utf8(emitter.into_buffer().unwrap()).unwrap();
        assert_eq!(text, "--- x\n...\n");
    }

    #[test]
    fn test_version_directive_is_written() {
        let mut emitter = Emitter::new(Output::buffer());
        emitter.emit(Event::stream_start(Encoding::Utf8)).unwrap();
        emitter
            .emit(Event::document_start(
                Some(VersionDirective { major: 1, minor: 1 }),
                Vec::new(),
                true,
            ))
            .unwrap();
        emitter.emit(Event::scalar("x", ScalarStyle::Plain)).unwrap();
        emitter.emit(Event::document_end(true)).unwrap();
        emitter.emit(Event::stream_end()).unwrap();
        let text = String::from_utf8(emitter.into_buffer().unwrap()).unwrap();
        assert!(text.starts_with("%YAML 1.1\n--- "), "got {:?}", text);
    }

    #[test]
    fn test_duplicate_tag_directive_rejected() {
        let mut emitter = Emitter::new(Output::buffer());
        emitter.emit(Event::stream_start(Encoding::Utf8)).unwrap();
        let tags = vec![
            TagDirective {
                handle: "!e!".to_string(),
                prefix: "tag:a/".to_string(),
            },
            TagDirective {
                handle: "!e!".to_string(),
                prefix: "tag:b/".to_string(),
            },
        ];
        let error = emitter
            .emit(Event::document_start(None, tags, true))
            .unwrap_err();
        assert!(error.to_string().contains("duplicate %TAG directive"));
    }

    #[test]
    fn test_indent_clamping() {
        let text = emit_document_with(
            vec![
                Event::mapping_start(CollectionStyle::Block),
                Event::scalar("k", ScalarStyle::Plain),
                Event::sequence_start(CollectionStyle::Block),
                Event::scalar("v", ScalarStyle::Plain),
                Event::sequence_end(),
                Event::mapping_end(),
            ],
            EmitOptions::new().with_indent(100),
        );
        // The out-of-range indent falls back to 2.
        assert_eq!(text, "k:\n- v\n");
    }

    #[test]
    fn test_crlf_line_breaks() {
        let text = emit_document_with(
            vec![
                Event::sequence_start(CollectionStyle::Block),
                Event::scalar("a", ScalarStyle::Plain),
                Event::sequence_end(),
            ],
            EmitOptions::new().with_line_break(LineBreak::CrLn),
        );
        assert_eq!(text, "- a\r\n");
    }

    #[test]
    fn test_utf16le_output_has_bom() {
        let mut emitter = Emitter::with_options(
            Output::buffer(),
            EmitOptions::new().with_encoding(Encoding::Utf16Le),
        );
        emitter.emit(Event::stream_start(Encoding::Utf8)).unwrap();
        emitter
            .emit(Event::document_start(None, Vec::new(), true))
            .unwrap();
        emitter.emit(Event::scalar("a", ScalarStyle::Plain)).unwrap();
        emitter.emit(Event::document_end(true)).unwrap();
        emitter.emit(Event::stream_end()).unwrap();
        let bytes = emitter.into_buffer().unwrap();
        assert_eq!(&bytes[..2], &[0xFF, 0xFE]);
        assert_eq!(&bytes[2..4], &[b'a', 0x00]);
    }

    #[test]
    fn test_error_is_sticky() {
        let mut emitter = Emitter::new(Output::buffer());
        let first = emitter
            .emit(Event::scalar("x", ScalarStyle::Plain))
            .unwrap_err();
        let second = emitter.emit(Event::stream_end()).unwrap_err();
        assert_eq!(first, second);
    }

    #[test]
    fn test_writer_failure_surfaces_as_writer_error() {
        let output = Output::from_callback(|_| {
            Err(io::Error::new(io::ErrorKind::BrokenPipe, "pipe closed"))
        });
        let mut emitter = Emitter::new(output);
        emitter.emit(Event::stream_start(Encoding::Utf8)).unwrap();
        emitter
            .emit(Event::document_start(None, Vec::new(), true))
            .unwrap();
        emitter.emit(Event::scalar("x", ScalarStyle::Plain)).unwrap();
        let error = emitter.emit(Event::document_end(true)).unwrap_err();
        assert!(matches!(error, Error::Writer(_)));
    }

    #[test]
    fn test_nested_block_structures() {
        let text = emit_document(vec![
            Event::mapping_start(CollectionStyle::Block),
            Event::scalar("outer", ScalarStyle::Plain),
            Event::mapping_start(CollectionStyle::Block),
            Event::scalar("inner", ScalarStyle::Plain),
            Event::scalar("value", ScalarStyle::Plain),
            Event::mapping_end(),
            Event::mapping_end(),
        ]);
        assert_eq!(text, "outer:\n  inner: value\n");
    }

    #[test]
    fn test_tag_shorthand_resolution_on_output() {
        let mut emitter = Emitter::new(Output::buffer());
        emitter.emit(Event::stream_start(Encoding::Utf8)).unwrap();
        let tags = vec![TagDirective {
            handle: "!e!".to_string(),
            prefix: "tag:example.com,2000:app/".to_string(),
        }];
        emitter.emit(Event::document_start(None, tags, true)).unwrap();
        let mut event = Event::scalar("data", ScalarStyle::Plain);
        if let EventData::Scalar {
            tag,
            plain_implicit,
            quoted_implicit,
            ..
        } = &mut event.data
        {
            *tag = Some("tag:example.com,2000:app/thing".to_string());
            *plain_implicit = false;
            *quoted_implicit = false;
        }
        emitter.emit(event).unwrap();
        emitter.emit(Event::document_end(true)).unwrap();
        emitter.emit(Event::stream_end()).unwrap();
        let text = String::from_utf8(emitter.into_buffer().unwrap()).unwrap();
        assert!(text.contains("!e!thing data"), "got {:?}", text);
    }
}
