//! Stream encodings and line break styles.

/// Character encoding of an input or output stream.
///
/// Input encoding is detected from a byte order mark; without one, UTF-8 is
/// assumed. Whatever the source encoding, the engine re-encodes everything
/// into UTF-8 internally.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Encoding {
    /// UTF-8, the canonical internal form.
    #[default]
    Utf8,
    /// UTF-16 little-endian.
    Utf16Le,
    /// UTF-16 big-endian.
    Utf16Be,
}

/// Line break style used by the emitter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LineBreak {
    /// Carriage return only (old Mac style).
    Cr,
    /// Line feed only.
    #[default]
    Ln,
    /// Carriage return followed by line feed (DOS style).
    CrLn,
}

impl LineBreak {
    pub(crate) fn as_str(self) -> &'static str {
        match self {
            LineBreak::Cr => "\r",
            LineBreak::Ln => "\n",
            LineBreak::CrLn => "\r\n",
        }
    }
}
