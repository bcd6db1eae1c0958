//! Error types shared across the engine.
//!
//! | Type             | Raised                                 | Scope                 |
//! |------------------|----------------------------------------|-----------------------|
//! | [`ParseError`]   | loading a script                       | one line or section   |
//! | [`ExecError`]    | running a trigger                      | the whole invocation  |
//! | [`AggregateError`] | folding a multi-result into a scalar | wrapped in `ExecError` |
//! | [`ConfigError`]  | reading `lingo.toml`                   | host start-up         |
//!
//! Pattern compile errors live with the grammar engine in
//! [`crate::pattern::PatternError`].

use std::path::PathBuf;

use thiserror::Error;

use crate::script::change::ChangeMode;

/// Result alias for everything that runs at execution time.
pub type ExecResult<T> = Result<T, ExecError>;

/// A line or section that could not be turned into a node.
///
/// Loading continues with the next sibling construct.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error("line {line}: can't understand this: '{text}'")]
    NoMatch { line: usize, text: String },
    #[error("line {line}: {message}")]
    Invalid { line: usize, message: String },
    #[error("line {line}: expression nested too deeply (limit {limit})")]
    TooDeep { line: usize, limit: usize },
}

impl ParseError {
    pub fn invalid(line: usize, message: impl Into<String>) -> Self {
        ParseError::Invalid { line, message: message.into() }
    }

    /// Line the error belongs to.
    pub fn line(&self) -> usize {
        match self {
            ParseError::NoMatch { line, .. }
            | ParseError::Invalid { line, .. }
            | ParseError::TooDeep { line, .. } => *line,
        }
    }
}

/// Failure while reducing a multi-result to a single value.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AggregateError {
    #[error("{op} needs numbers, got '{value}'")]
    NotNumeric { op: &'static str, value: String },
    #[error("{op} of nothing is undefined")]
    Empty { op: &'static str },
}

/// Any runtime failure.  Aborts the current invocation.
#[derive(Debug, Error)]
pub enum ExecError {
    #[error("{0}")]
    Message(String),
    #[error("'{value}' is not a {wanted}")]
    Conversion { value: String, wanted: String },
    #[error("{target} can't be {mode}")]
    Unsupported { mode: ChangeMode, target: String },
    #[error("no {0} in this context")]
    MissingContext(&'static str),
    #[error(transparent)]
    Aggregate(#[from] AggregateError),
    #[error("line {line}: {source}")]
    AtLine {
        line: usize,
        #[source]
        source: Box<ExecError>,
    },
    #[error("{message}: {source}")]
    Host {
        message: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
}

impl ExecError {
    pub fn msg(message: impl Into<String>) -> Self {
        ExecError::Message(message.into())
    }

    /// Wrap a collaborator failure.
    pub fn host<E>(message: impl Into<String>, source: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        ExecError::Host { message: message.into(), source: Box::new(source) }
    }

    /// Attach the originating line, unless one is attached already.
    pub fn at_line(self, line: usize) -> Self {
        match self {
            e @ ExecError::AtLine { .. } => e,
            e => ExecError::AtLine { line, source: Box::new(e) },
        }
    }

    /// Line recorded by [`ExecError::at_line`], if any.
    pub fn line(&self) -> Option<usize> {
        match self {
            ExecError::AtLine { line, .. } => Some(*line),
            _ => None,
        }
    }
}

/// Configuration file problems.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("reading {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("parsing {path}: {source}")]
    Toml {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("{0}")]
    Invalid(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn at_line_wraps_once() {
        let e = ExecError::msg("boom").at_line(3).at_line(9);
        assert_eq!(e.line(), Some(3));
        assert_eq!(e.to_string(), "line 3: boom");
    }

    #[test]
    fn host_keeps_source() {
        let io = std::io::Error::new(std::io::ErrorKind::Other, "disk gone");
        let e = ExecError::host("saving", io);
        assert_eq!(e.to_string(), "saving: disk gone");
        assert!(std::error::Error::source(&e).is_some());
    }

    #[test]
    fn unsupported_names_verb() {
        let e = ExecError::Unsupported { mode: ChangeMode::Add, target: "3".into() };
        assert_eq!(e.to_string(), "3 can't be added to");
    }

    #[test]
    fn parse_error_line() {
        assert_eq!(ParseError::invalid(7, "nope").line(), 7);
        assert_eq!(
            ParseError::NoMatch { line: 2, text: "foo".into() }.to_string(),
            "line 2: can't understand this: 'foo'"
        );
    }
}
