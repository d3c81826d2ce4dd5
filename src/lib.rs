//! Streaming YAML engine.
//!
//! This crate converts between human-authored YAML text and a stream of
//! structural events, and back, without ever building a document tree.
//!
//! # Pipeline
//!
//! The engine operates in four stages, each pull-based and resumable:
//!
//! 1. **Reader**: Accepts raw bytes from a buffer, stream, or callback;
//!    detects the encoding from a byte order mark; decodes into a
//!    validated, canonical character buffer.
//!
//! 2. **Scanner**: Converts the character stream into a token stream,
//!    tracking the indentation stack, flow nesting, and simple-key
//!    candidates that the offside-rule grammar requires.
//!
//! 3. **Parser**: Converts the token stream into a structural event
//!    stream, driving an explicit state machine that mirrors a
//!    recursive-descent grammar; tag shorthands are resolved against the
//!    per-document directive table.
//!
//! 4. **Emitter**: Converts an event stream back into formatted text,
//!    buffering bounded lookahead so it can choose compact renderings and
//!    the least-escaped scalar style that preserves the content.
//!
//! Interpretation of scalar content (as numbers, booleans, and so on) is
//! left entirely to the caller: the engine exposes raw scalar text, style
//! hints, and structural boundaries.
//!
//! # Example
//!
//! ```
//! use yamlet::{parse_events, emit_to_string, EventData};
//!
//! let events = parse_events("- 1\n- 2\n").unwrap();
//! assert!(events.iter().any(|e| matches!(e.data, EventData::SequenceStart { .. })));
//!
//! let text = emit_to_string(events).unwrap();
//! assert_eq!(text, "- 1\n- 2\n");
//! ```

mod emitter;
mod encoding;
mod error;
mod event;
mod mark;
mod parser;
mod reader;
mod scanner;
mod token;

pub use emitter::{EmitOptions, Emitter, Output};
pub use encoding::{Encoding, LineBreak};
pub use error::{Error, Problem, Result};
pub use event::{CollectionStyle, Event, EventData, TagDirective, VersionDirective};
pub use mark::Mark;
pub use parser::Parser;
pub use reader::Input;
pub use scanner::Scanner;
pub use token::{ScalarStyle, Token, TokenData};

/// Parse a complete stream into its event sequence.
///
/// The result always begins with STREAM-START and ends with STREAM-END;
/// the first failure aborts the parse.
pub fn parse_events(input: impl Into<Input>) -> Result<Vec<Event>> {
    Parser::new(input).collect()
}

/// Emit an event sequence as text with default options.
pub fn emit_to_string(events: impl IntoIterator<Item = Event>) -> Result<String> {
    emit_to_string_with(events, EmitOptions::default())
}

/// Emit an event sequence as text with the given options.
pub fn emit_to_string_with(
    events: impl IntoIterator<Item = Event>,
    options: EmitOptions,
) -> Result<String> {
    let mut emitter = Emitter::with_options(Output::buffer(), options);
    for event in events {
        emitter.emit(event)?;
    }
    match emitter.into_buffer() {
        Some(bytes) => String::from_utf8(bytes)
            .map_err(|_| Error::Writer("emitted text is not valid UTF-8".to_string())),
        None => Err(Error::Writer("output was not buffered".to_string())),
    }
}
