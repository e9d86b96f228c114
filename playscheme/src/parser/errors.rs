use pest::error::{Error as PestError, LineColLocation};
use pest::iterators::Pair;
use thiserror::Error;

use super::Rule;

/// Where in the source a problem was found (1-based).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Location {
    pub line: usize,
    pub column: usize,
}

impl std::fmt::Display for Location {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "line {}, column {}", self.line, self.column)
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ParseError {
    #[error("syntax error at {location}: {message}")]
    Syntax { message: String, location: Location },

    #[error("invalid literal `{text}` at {location}: {message}")]
    InvalidLiteral {
        text: String,
        message: String,
        location: Location,
    },

    #[error("expected exactly one datum, found {0}")]
    DatumCount(usize),

    #[error("data nested deeper than {0} levels")]
    TooDeep(usize),

    #[error("unexpected rule {0} while reading")]
    UnexpectedRule(String),
}

pub type ParseResult<T> = Result<T, ParseError>;

impl From<PestError<Rule>> for ParseError {
    fn from(error: PestError<Rule>) -> Self {
        let (line, column) = match error.line_col {
            LineColLocation::Pos(pos) => pos,
            LineColLocation::Span(start, _) => start,
        };
        ParseError::Syntax {
            message: error.variant.message().to_string(),
            location: Location { line, column },
        }
    }
}

pub(crate) fn location_of(pair: &Pair<Rule>) -> Location {
    let (line, column) = pair.as_span().start_pos().line_col();
    Location { line, column }
}

pub(crate) fn invalid_literal(pair: &Pair<Rule>, message: impl Into<String>) -> ParseError {
    ParseError::InvalidLiteral {
        text: pair.as_str().to_string(),
        message: message.into(),
        location: location_of(pair),
    }
}
