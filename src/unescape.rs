//! Escape-sequence decoding.
//!
//! Resolves backslash escape tokens in text returned by the server. Tokens are
//! matched left to right without overlap, trying each shape in this order:
//!
//! ```text
//! \UXXXXXXXX   8 hex digits
//! \uXXXX       4 hex digits
//! \xXX         2 hex digits
//! \o \oo \ooo  1-3 octal digits
//! \N{NAME}     unicode character name
//! \\ \' \" \a \b \f \n \r \t \v
//! ```
//!
//! Anything else, including a token whose code point is not a valid `char`,
//! is copied through unchanged.

use nom::{
    branch::alt,
    bytes::complete::{tag, take_till1, take_while_m_n},
    character::complete::{char, one_of},
    combinator::map,
    sequence::{delimited, preceded},
    IResult,
};
use std::borrow::Cow;

/// Replace every escape token in `s` with the character it denotes.
///
/// Input without a backslash is returned borrowed.
pub fn decode_escapes(s: &str) -> Cow<'_, str> {
    if !s.contains('\\') {
        return Cow::Borrowed(s);
    }

    let mut out = String::with_capacity(s.len());
    let mut rest = s;
    while let Some(idx) = rest.find('\\') {
        out.push_str(&rest[..idx]);
        let candidate = &rest[idx..];
        match escape_token(candidate) {
            Ok((after, Some(c))) => {
                out.push(c);
                rest = after;
            }
            Ok((after, None)) => {
                // Well-formed token with no character behind it
                out.push_str(&candidate[..candidate.len() - after.len()]);
                rest = after;
            }
            Err(_) => {
                out.push('\\');
                rest = &candidate[1..];
            }
        }
    }
    out.push_str(rest);
    Cow::Owned(out)
}

/// Parse one escape token starting at a backslash.
fn escape_token(input: &str) -> IResult<&str, Option<char>> {
    alt((
        hex_escape("\\U", 8),
        hex_escape("\\u", 4),
        hex_escape("\\x", 2),
        octal_escape,
        named_escape,
        single_char_escape,
    ))(input)
}

fn hex_escape(prefix: &'static str, digits: usize) -> impl Fn(&str) -> IResult<&str, Option<char>> {
    move |input| {
        map(
            preceded(
                tag(prefix),
                take_while_m_n(digits, digits, |c: char| c.is_ascii_hexdigit()),
            ),
            |hex: &str| u32::from_str_radix(hex, 16).ok().and_then(char::from_u32),
        )(input)
    }
}

fn octal_escape(input: &str) -> IResult<&str, Option<char>> {
    map(
        preceded(char('\\'), take_while_m_n(1, 3, |c: char| c.is_digit(8))),
        |oct: &str| u32::from_str_radix(oct, 8).ok().and_then(char::from_u32),
    )(input)
}

fn named_escape(input: &str) -> IResult<&str, Option<char>> {
    map(
        delimited(tag("\\N{"), take_till1(|c: char| c == '}'), char('}')),
        unicode_names2::character,
    )(input)
}

fn single_char_escape(input: &str) -> IResult<&str, Option<char>> {
    map(preceded(char('\\'), one_of("\\'\"abfnrtv")), |c| {
        Some(match c {
            'a' => '\u{7}',
            'b' => '\u{8}',
            'f' => '\u{c}',
            'n' => '\n',
            'r' => '\r',
            't' => '\t',
            'v' => '\u{b}',
            other => other,
        })
    })(input)
}
