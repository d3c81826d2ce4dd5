//! Structural events produced by the parser and consumed by the emitter.

use crate::encoding::Encoding;
use crate::mark::Mark;
use crate::token::ScalarStyle;

/// A `%YAML` version declaration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VersionDirective {
    pub major: u32,
    pub minor: u32,
}

/// A `%TAG` handle-to-prefix shorthand binding, scoped to one document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TagDirective {
    /// The shorthand handle, e.g. `!`, `!!`, or `!name!`.
    pub handle: String,
    /// The prefix the handle expands to.
    pub prefix: String,
}

/// Rendering style of a sequence or mapping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CollectionStyle {
    /// Let the emitter decide.
    #[default]
    Any,
    /// Indentation-structured block style.
    Block,
    /// Explicitly delimited `[]`/`{}` flow style.
    Flow,
}

/// A structural unit of meaning with its source span.
///
/// Events are produced one per [`Parser::next_event`](crate::Parser) call,
/// in strict document order, and fed one at a time to
/// [`Emitter::emit`](crate::Emitter).
#[derive(Debug, Clone, PartialEq)]
pub struct Event {
    /// The kind of event and its payload.
    pub data: EventData,
    /// Where the corresponding source region begins.
    pub start_mark: Mark,
    /// Where the corresponding source region ends.
    pub end_mark: Mark,
}

/// The kind and payload of an [`Event`].
#[derive(Debug, Clone, PartialEq)]
pub enum EventData {
    /// Start of the stream, with the detected or requested encoding.
    StreamStart { encoding: Encoding },
    /// End of the stream.
    StreamEnd,
    /// Start of a document. `implicit` is false when an explicit `---` (or a
    /// directive) introduced the document; the flag round-trips.
    DocumentStart {
        version: Option<VersionDirective>,
        tags: Vec<TagDirective>,
        implicit: bool,
    },
    /// End of a document. `implicit` is false when an explicit `...` closed
    /// the document; the flag round-trips.
    DocumentEnd { implicit: bool },
    /// A reference to a previously anchored node, by name only. The engine
    /// never resolves the reference.
    Alias { anchor: String },
    /// A scalar node. `plain_implicit`/`quoted_implicit` record whether the
    /// tag may be omitted when the scalar is rendered plain or quoted.
    Scalar {
        anchor: Option<String>,
        tag: Option<String>,
        value: String,
        plain_implicit: bool,
        quoted_implicit: bool,
        style: ScalarStyle,
    },
    /// Start of a sequence node.
    SequenceStart {
        anchor: Option<String>,
        tag: Option<String>,
        implicit: bool,
        style: CollectionStyle,
    },
    /// End of the innermost open sequence.
    SequenceEnd,
    /// Start of a mapping node.
    MappingStart {
        anchor: Option<String>,
        tag: Option<String>,
        implicit: bool,
        style: CollectionStyle,
    },
    /// End of the innermost open mapping.
    MappingEnd,
}

impl Event {
    /// Wrap event data with an explicit source span.
    pub fn new(data: EventData, start_mark: Mark, end_mark: Mark) -> Self {
        Self {
            data,
            start_mark,
            end_mark,
        }
    }

    /// Event data with zeroed marks, for streams built by hand rather than
    /// parsed from text.
    pub fn from_data(data: EventData) -> Self {
        Self {
            data,
            start_mark: Mark::default(),
            end_mark: Mark::default(),
        }
    }

    /// A STREAM-START event.
    pub fn stream_start(encoding: Encoding) -> Self {
        Self::from_data(EventData::StreamStart { encoding })
    }

    /// A STREAM-END event.
    pub fn stream_end() -> Self {
        Self::from_data(EventData::StreamEnd)
    }

    /// A DOCUMENT-START event.
    pub fn document_start(
        version: Option<VersionDirective>,
        tags: Vec<TagDirective>,
        implicit: bool,
    ) -> Self {
        Self::from_data(EventData::DocumentStart {
            version,
            tags,
            implicit,
        })
    }

    /// A DOCUMENT-END event.
    pub fn document_end(implicit: bool) -> Self {
        Self::from_data(EventData::DocumentEnd { implicit })
    }

    /// An ALIAS event referencing `anchor`.
    pub fn alias(anchor: impl Into<String>) -> Self {
        Self::from_data(EventData::Alias {
            anchor: anchor.into(),
        })
    }

    /// A SCALAR event with both implicit flags set, the common case for
    /// untagged content.
    pub fn scalar(value: impl Into<String>, style: ScalarStyle) -> Self {
        Self::from_data(EventData::Scalar {
            anchor: None,
            tag: None,
            value: value.into(),
            plain_implicit: true,
            quoted_implicit: true,
            style,
        })
    }

    /// A SEQUENCE-START event.
    pub fn sequence_start(style: CollectionStyle) -> Self {
        Self::from_data(EventData::SequenceStart {
            anchor: None,
            tag: None,
            implicit: true,
            style,
        })
    }

    /// A SEQUENCE-END event.
    pub fn sequence_end() -> Self {
        Self::from_data(EventData::SequenceEnd)
    }

    /// A MAPPING-START event.
    pub fn mapping_start(style: CollectionStyle) -> Self {
        Self::from_data(EventData::MappingStart {
            anchor: None,
            tag: None,
            implicit: true,
            style,
        })
    }

    /// A MAPPING-END event.
    pub fn mapping_end() -> Self {
        Self::from_data(EventData::MappingEnd)
    }
}
