use std::fmt;

use crate::Span;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ErrorKind {
    ReservedOperator(String),
    ExpectedValue,
    ExpectedClosingBracket,
    ExpectedClosingParenthesis,
    MalformedRange,
    MissingCollectionName,
    MisplacedNegation,
    InternalError(nom::error::ErrorKind),
}

/// A parse error over a borrowed input span, mirroring how the teacher's
/// filter grammar reports errors with exact byte offsets instead of a bare
/// `String`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Error<'a> {
    pub context: Span<'a>,
    pub kind: ErrorKind,
}

impl<'a> Error<'a> {
    pub fn new_from_kind(context: Span<'a>, kind: ErrorKind) -> Self {
        Self { context, kind }
    }
}

impl<'a> fmt::Display for Error<'a> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let line = self.context.location_line();
        let column = self.context.get_utf8_column();
        match &self.kind {
            ErrorKind::ReservedOperator(op) => {
                write!(f, "found unknown operator `{op}` at {line}:{column}")
            }
            ErrorKind::ExpectedValue => write!(f, "expected a value at {line}:{column}"),
            ErrorKind::ExpectedClosingBracket => {
                write!(f, "expected closing `]` at {line}:{column}")
            }
            ErrorKind::ExpectedClosingParenthesis => {
                write!(f, "expected closing `)` at {line}:{column}")
            }
            ErrorKind::MalformedRange => write!(f, "malformed `[lo..hi]` range at {line}:{column}"),
            ErrorKind::MissingCollectionName => {
                write!(f, "expected a collection name after `$` at {line}:{column}")
            }
            ErrorKind::MisplacedNegation => {
                write!(f, "`:!=` cannot be combined with a range at {line}:{column}")
            }
            ErrorKind::InternalError(kind) => write!(f, "{kind:?} at {line}:{column}"),
        }
    }
}

impl<'a> std::error::Error for Error<'a> {}

impl<'a> nom::error::ParseError<Span<'a>> for Error<'a> {
    fn from_error_kind(input: Span<'a>, kind: nom::error::ErrorKind) -> Self {
        Self::new_from_kind(input, ErrorKind::InternalError(kind))
    }

    fn append(_input: Span<'a>, _kind: nom::error::ErrorKind, other: Self) -> Self {
        other
    }
}
