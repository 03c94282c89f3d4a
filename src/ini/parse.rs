// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! INI text parser.
//!
//! Turns raw configuration text into a [`Document`]. The grammar is the
//! line-based dialect Forgejo itself reads:
//!
//! - Blank lines carry no meaning and are skipped.
//! - Lines whose first non-whitespace character is `;` or `#` are comments and
//!   are skipped. A `;` or `#` further along a value line belongs to the value.
//! - `[name]` opens a section. Reopening a section adds to it.
//! - `KEY = value` splits on the first `=` only. Both sides are trimmed.
//!   Later duplicates of a key win.
//! - Key-value lines before the first header land in [`DEFAULT_SECTION`].
//! - A leading UTF-8 byte order mark is dropped.
//!
//! Malformed section headers are fatal. Any other line that is neither a
//! header, a comment, nor a key-value pair is skipped with a warning, because
//! rendered templates occasionally leave stray text behind that Forgejo itself
//! tolerates.

use crate::ini::{Document, DEFAULT_SECTION};

use tracing::warn;

/// Parse INI text into a document.
///
/// # Errors
///
/// - Return [`ParseError::UnterminatedHeader`] if a header lacks its `]`.
/// - Return [`ParseError::TrailingHeaderText`] if text follows a header's `]`.
/// - Return [`ParseError::EmptySectionName`] if a header names nothing.
pub fn parse(text: &str) -> Result<Document> {
    let mut document = Document::new();
    let mut current = DEFAULT_SECTION.to_string();

    // INVARIANT: Byte order mark never becomes part of the first line.
    let text = text.strip_prefix('\u{feff}').unwrap_or(text);

    for (index, raw) in text.lines().enumerate() {
        let line_number = index + 1;
        let line = raw.trim();

        if line.is_empty() || line.starts_with(';') || line.starts_with('#') {
            continue;
        }

        if line.starts_with('[') {
            current = parse_header(line, line_number)?;
            document.get_or_create_section(current.as_str());
            continue;
        }

        match line.split_once('=') {
            Some((key, value)) if !key.trim().is_empty() => {
                document
                    .get_or_create_section(current.as_str())
                    .insert(key.trim(), value.trim());
            }
            _ => warn!("skip unrecognized line {line_number}: {line:?}"),
        }
    }

    Ok(document)
}

/// Parse raw bytes into a document.
///
/// # Errors
///
/// - Return [`ParseError::InvalidUtf8`] if bytes are not valid UTF-8.
/// - Return any error that [`parse`] can return.
pub fn parse_bytes(bytes: &[u8]) -> Result<Document> {
    let text = std::str::from_utf8(bytes).map_err(|err| {
        let valid = &bytes[..err.valid_up_to()];
        ParseError::InvalidUtf8 {
            line: valid.iter().filter(|byte| **byte == b'\n').count() + 1,
        }
    })?;

    parse(text)
}

fn parse_header(line: &str, line_number: usize) -> Result<String> {
    let Some(close) = line.find(']') else {
        return Err(ParseError::UnterminatedHeader { line: line_number });
    };

    // INVARIANT: Nothing but whitespace may follow the closing bracket.
    if !line[close + 1..].trim().is_empty() {
        return Err(ParseError::TrailingHeaderText { line: line_number });
    }

    let name = line[1..close].trim();
    if name.is_empty() {
        return Err(ParseError::EmptySectionName { line: line_number });
    }

    Ok(name.to_string())
}

/// INI parsing error types.
///
/// Line numbers are 1-based and count every line of the input, blank lines and
/// comments included.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum ParseError {
    /// Section header is missing its closing bracket.
    #[error("line {line}: unterminated section header")]
    UnterminatedHeader { line: usize },

    /// Section header has text after its closing bracket.
    #[error("line {line}: unexpected text after section header")]
    TrailingHeaderText { line: usize },

    /// Section header has nothing between its brackets.
    #[error("line {line}: empty section name")]
    EmptySectionName { line: usize },

    /// Input is not valid UTF-8.
    #[error("line {line}: invalid utf-8")]
    InvalidUtf8 { line: usize },
}

/// Friendly result alias :3
pub type Result<T, E = ParseError> = std::result::Result<T, E>;
