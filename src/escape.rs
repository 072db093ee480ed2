//! Value escaping for embedding into query text.
//!
//! Every character found in [`ESCAPE_TABLE`] is replaced by its two-character
//! escape sequence in a single left-to-right pass. A backslash inserted by the
//! pass is never looked at again, so a literal backslash becomes exactly `\\`.
//!
//! ```
//! use framehouse::escape::{escape_str, Quote};
//!
//! assert_eq!(escape_str("it's", Quote::Single), r"'it\'s'");
//! assert_eq!(escape_str("my table", Quote::Backtick), "`my table`");
//! ```

use crate::value::Value;
use std::borrow::Cow;
use std::fmt;

/// Special characters and the sequences that replace them.
pub const ESCAPE_TABLE: [(char, &str); 8] = [
    ('\u{8}', "\\b"),
    ('\u{c}', "\\f"),
    ('\r', "\\r"),
    ('\n', "\\n"),
    ('\t', "\\t"),
    ('\0', "\\0"),
    ('\\', "\\\\"),
    ('\'', "\\'"),
];

/// Look up the escape sequence for a character, if it has one.
pub fn escape_sequence(c: char) -> Option<&'static str> {
    ESCAPE_TABLE
        .iter()
        .find(|(special, _)| *special == c)
        .map(|(_, seq)| *seq)
}

/// Delimiter wrapped around an escaped value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Quote {
    /// Identifier quoting: `` `name` ``.
    #[default]
    Backtick,
    /// String literal quoting: `'text'`.
    Single,
    /// Escape only, no delimiter.
    None,
}

impl Quote {
    /// Backtick and single quote select their delimiter; anything else means no quoting.
    pub fn from_char(c: char) -> Self {
        match c {
            '`' => Quote::Backtick,
            '\'' => Quote::Single,
            _ => Quote::None,
        }
    }

    fn delimiter(self) -> Option<char> {
        match self {
            Quote::Backtick => Some('`'),
            Quote::Single => Some('\''),
            Quote::None => None,
        }
    }
}

/// A value handed to [`escape`].
#[derive(Debug, Clone, Copy)]
pub enum Scalar<'a> {
    Text(&'a str),
    Binary(&'a [u8]),
    /// Numbers and other values that are embedded as-is.
    Other(&'a Value),
}

impl<'a> From<&'a str> for Scalar<'a> {
    fn from(s: &'a str) -> Self {
        Scalar::Text(s)
    }
}

impl<'a> From<&'a [u8]> for Scalar<'a> {
    fn from(b: &'a [u8]) -> Self {
        Scalar::Binary(b)
    }
}

impl<'a> From<&'a Value> for Scalar<'a> {
    fn from(v: &'a Value) -> Self {
        match v {
            Value::Str(s) => Scalar::Text(s),
            other => Scalar::Other(other),
        }
    }
}

/// Result of [`escape`].
#[derive(Debug, Clone, PartialEq)]
pub enum Escaped<'a> {
    Text(String),
    Binary(Vec<u8>),
    Passthrough(&'a Value),
}

impl Escaped<'_> {
    /// Bytes ready to be spliced into a query or payload.
    pub fn as_bytes(&self) -> Cow<'_, [u8]> {
        match self {
            Escaped::Text(s) => Cow::Borrowed(s.as_bytes()),
            Escaped::Binary(b) => Cow::Borrowed(b),
            Escaped::Passthrough(v) => Cow::Owned(v.to_string().into_bytes()),
        }
    }
}

impl fmt::Display for Escaped<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Escaped::Text(s) => f.write_str(s),
            Escaped::Binary(b) => f.write_str(&String::from_utf8_lossy(b)),
            Escaped::Passthrough(v) => write!(f, "{}", v),
        }
    }
}

/// Escape a scalar and wrap it in `quote`.
///
/// Text and binary values are escaped; every other value is returned untouched.
pub fn escape<'a>(value: impl Into<Scalar<'a>>, quote: Quote) -> Escaped<'a> {
    match value.into() {
        Scalar::Text(s) => Escaped::Text(escape_str(s, quote)),
        Scalar::Binary(b) => Escaped::Binary(escape_bytes(b, quote)),
        Scalar::Other(v) => Escaped::Passthrough(v),
    }
}

/// Escape text and wrap it in `quote`.
pub fn escape_str(s: &str, quote: Quote) -> String {
    let delimiter = quote.delimiter();
    let mut out = String::with_capacity(s.len() + 2);
    out.extend(delimiter);
    for c in s.chars() {
        match escape_sequence(c) {
            Some(seq) => out.push_str(seq),
            None => out.push(c),
        }
    }
    out.extend(delimiter);
    out
}

/// Escape raw bytes with the same table; every entry is ASCII.
pub fn escape_bytes(b: &[u8], quote: Quote) -> Vec<u8> {
    let delimiter = quote.delimiter().map(|c| c as u8);
    let mut out = Vec::with_capacity(b.len() + 2);
    out.extend(delimiter);
    for &byte in b {
        match escape_sequence(byte as char).filter(|_| byte.is_ascii()) {
            Some(seq) => out.extend_from_slice(seq.as_bytes()),
            None => out.push(byte),
        }
    }
    out.extend(delimiter);
    out
}

/// Quote a table or column name for use in a query.
///
/// The escape table has no entry for the backtick, so an embedded one is
/// doubled before wrapping.
pub fn quote_identifier(name: &str) -> String {
    escape_str(&name.replace('`', "``"), Quote::Backtick)
}
