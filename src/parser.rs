//! Textual board-file format: a `<rows>x<cols>` header line followed by
//! exactly `rows * cols` card-token lines, one per row-major position.

use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ParseError {
    #[error("missing header line")]
    MissingHeader,

    #[error("invalid header line {0:?}, expected `<rows>x<cols>`")]
    InvalidHeader(String),

    #[error("expected {expected} token lines, found {found}")]
    TooFewTokens { expected: usize, found: usize },

    #[error("expected {expected} token lines, found more than that")]
    TooManyTokens { expected: usize },

    #[error("invalid card token on line {line}: {token:?}")]
    InvalidToken { line: usize, token: String },
}

/// A parsed board file: dimensions plus the row-major token sequence, ready
/// to hand to [`crate::board::Board::new`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedBoard {
    pub rows: usize,
    pub cols: usize,
    pub tokens: Vec<String>,
}

/// Parses a complete board-file source. Trailing blank lines are ignored;
/// every other line is significant.
pub fn parse(source: &str) -> Result<ParsedBoard, ParseError> {
    let mut lines = source.lines();

    let header = lines.next().ok_or(ParseError::MissingHeader)?;
    let (rows, cols) = parse_header(header)?;
    let expected = rows * cols;

    let mut tokens = Vec::with_capacity(expected);
    for (offset, raw) in lines.enumerate() {
        if raw.trim().is_empty() {
            continue;
        }
        let line_number = offset + 2; // header is line 1
        if tokens.len() == expected {
            return Err(ParseError::TooManyTokens { expected });
        }
        validate_token(raw).map_err(|_| ParseError::InvalidToken {
            line: line_number,
            token: raw.to_string(),
        })?;
        tokens.push(raw.to_string());
    }

    if tokens.len() != expected {
        return Err(ParseError::TooFewTokens {
            expected,
            found: tokens.len(),
        });
    }

    Ok(ParsedBoard { rows, cols, tokens })
}

fn parse_header(header: &str) -> Result<(usize, usize), ParseError> {
    let (rows_str, cols_str) = header
        .split_once('x')
        .ok_or_else(|| ParseError::InvalidHeader(header.to_string()))?;

    let rows: usize = rows_str
        .parse()
        .map_err(|_| ParseError::InvalidHeader(header.to_string()))?;
    let cols: usize = cols_str
        .parse()
        .map_err(|_| ParseError::InvalidHeader(header.to_string()))?;

    if rows == 0 || cols == 0 {
        return Err(ParseError::InvalidHeader(header.to_string()));
    }

    Ok((rows, cols))
}

fn validate_token(token: &str) -> Result<(), ()> {
    if token.is_empty() || token.chars().any(char::is_whitespace) {
        Err(())
    } else {
        Ok(())
    }
}
