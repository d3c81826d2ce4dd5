//! Error types for the YAML engine.

use crate::mark::Mark;
use std::fmt;
use thiserror::Error;

/// Result type for engine operations.
pub type Result<T> = std::result::Result<T, Error>;

/// A positioned failure, optionally wrapped in the context of the construct
/// that was being processed when it occurred.
///
/// Rendered as `while scanning a block scalar at line 3, column 1: found an
/// indentation indicator equal to 0 at line 3, column 7`, or without the
/// leading clause when there is no context.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Problem {
    /// What went wrong.
    pub problem: String,
    /// Where it went wrong.
    pub mark: Mark,
    /// The enclosing construct and its starting position, if any.
    pub context: Option<(String, Mark)>,
}

impl Problem {
    pub(crate) fn new(problem: impl Into<String>, mark: Mark) -> Self {
        Self {
            problem: problem.into(),
            mark,
            context: None,
        }
    }

    pub(crate) fn in_context(
        context: impl Into<String>,
        context_mark: Mark,
        problem: impl Into<String>,
        mark: Mark,
    ) -> Self {
        Self {
            problem: problem.into(),
            mark,
            context: Some((context.into(), context_mark)),
        }
    }
}

impl fmt::Display for Problem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some((context, context_mark)) = &self.context {
            write!(f, "{} at {}: ", context, context_mark)?;
        }
        write!(f, "{} at {}", self.problem, self.mark)
    }
}

/// Error type for all four pipeline stages.
///
/// Once a stage reports an error, the owning context latches it: every
/// subsequent pull returns a clone of the same error without further side
/// effects.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum Error {
    /// Byte-stream or decoding failure, with the offset of the offending
    /// byte and, where meaningful, its value.
    #[error("reader error: {problem} at byte {offset}")]
    Reader {
        problem: &'static str,
        offset: usize,
        value: Option<u32>,
    },

    /// Lexical failure.
    #[error("scanner error: {0}")]
    Scanner(Problem),

    /// Grammar failure.
    #[error("parser error: {0}")]
    Parser(Problem),

    /// Event-stream misuse or an event the current output state cannot
    /// accept.
    #[error("emitter error: {0}")]
    Emitter(String),

    /// Output sink failure. The underlying I/O error is captured as text so
    /// the latched error stays cloneable.
    #[error("writer error: {0}")]
    Writer(String),
}

impl Error {
    pub(crate) fn scanner(problem: impl Into<String>, mark: Mark) -> Self {
        Error::Scanner(Problem::new(problem, mark))
    }

    pub(crate) fn scanner_context(
        context: impl Into<String>,
        context_mark: Mark,
        problem: impl Into<String>,
        mark: Mark,
    ) -> Self {
        Error::Scanner(Problem::in_context(context, context_mark, problem, mark))
    }

    pub(crate) fn parser(problem: impl Into<String>, mark: Mark) -> Self {
        Error::Parser(Problem::new(problem, mark))
    }

    pub(crate) fn parser_context(
        context: impl Into<String>,
        context_mark: Mark,
        problem: impl Into<String>,
        mark: Mark,
    ) -> Self {
        Error::Parser(Problem::in_context(context, context_mark, problem, mark))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_problem_display_with_context() {
        let err = Error::scanner_context(
            "while scanning a simple key",
            Mark::new(0, 0, 0),
            "could not find expected ':'",
            Mark::new(10, 1, 3),
        );
        assert_eq!(
            err.to_string(),
            "scanner error: while scanning a simple key at line 1, column 1: \
             could not find expected ':' at line 2, column 4"
        );
    }

    #[test]
    fn test_problem_display_without_context() {
        let err = Error::parser("did not find expected <stream-start>", Mark::new(0, 0, 0));
        assert_eq!(
            err.to_string(),
            "parser error: did not find expected <stream-start> at line 1, column 1"
        );
    }
}
