//! Source positions.

use std::fmt;

/// A position in the source or output stream.
///
/// Marks are copied into every token, event, and error so that failures can
/// be reported as "line N, column M" and spans can be recovered later.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Mark {
    /// Offset from the start of the stream, in characters.
    pub index: usize,
    /// Zero-based line number.
    pub line: usize,
    /// Zero-based column number.
    pub column: usize,
}

impl Mark {
    /// Create a mark at the given position.
    pub fn new(index: usize, line: usize, column: usize) -> Self {
        Self {
            index,
            line,
            column,
        }
    }
}

impl fmt::Display for Mark {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "line {}, column {}", self.line + 1, self.column + 1)
    }
}
