//! Array literal parsing and rendering.
//!
//! Parses the server's textual rendering of an array into a [`Value`].
//!
//! # Grammar
//!
//! ```text
//! array   = '[' [ element { ',' element } ] ']'
//! element = array | quoted | 'NULL' | number
//! quoted  = '\'' { char | escape } '\''
//! ```
//!
//! The parse is a single pass driven by a small state machine:
//!
//! ```text
//! Outside ──'['──▶ InArray(1) ──'['──▶ InArray(d+1)
//!                     │   ▲ ◀──']'──
//!                    '\'' │'\''
//!                     ▼   │
//!                   InQuoted
//! ```
//!
//! Each open bracket holds a frame collecting its finished elements. Commas
//! end an element of the innermost frame and never count inside quotes. The
//! literal is complete when the outermost `]` closes the last frame. Nesting
//! deeper than [`MAX_DEPTH`] is rejected.

use nom::{combinator::all_consuming, number::complete::recognize_float, IResult};

use crate::error::{Error, Result};
use crate::escape::escape_sequence;
use crate::unescape::decode_escapes;
use crate::value::Value;

/// Deepest array nesting either decoding strategy accepts.
pub const MAX_DEPTH: usize = 128;

#[derive(Debug, Clone, Copy, PartialEq)]
enum State {
    Outside,
    InArray,
    InQuoted { start: usize, escaped: bool },
    Done,
}

/// What the innermost array holds since its last separator.
#[derive(Debug, Clone, Copy, PartialEq)]
enum Slot {
    Empty,
    /// A bare token starting at this byte
    Scalar(usize),
    /// A finished element waiting for `,` or `]`
    Filled,
}

/// An array whose closing bracket has not been seen yet.
struct Frame {
    start: usize,
    items: Vec<Value>,
    slot: Slot,
}

impl Frame {
    fn new(start: usize) -> Self {
        Self {
            start,
            items: Vec::new(),
            slot: Slot::Empty,
        }
    }

    fn push(&mut self, value: Value) {
        self.items.push(value);
        self.slot = Slot::Filled;
    }

    /// A bracket or quote may only open a fresh element.
    fn begin(&self, literal: &str, at: usize) -> Result<()> {
        match self.slot {
            Slot::Empty => Ok(()),
            _ => Err(Error::malformed(at, &literal[at..])),
        }
    }

    fn extend_scalar(&mut self, literal: &str, at: usize) -> Result<()> {
        match self.slot {
            Slot::Empty => self.slot = Slot::Scalar(at),
            Slot::Scalar(_) => {}
            Slot::Filled => return Err(Error::malformed(at, &literal[at..])),
        }
        Ok(())
    }

    /// Convert a bare token ending at `end`, if one is in progress.
    fn finish_scalar(&mut self, literal: &str, end: usize) -> Result<()> {
        if let Slot::Scalar(start) = self.slot {
            let text = &literal[start..end];
            let value = parse_scalar(text).ok_or_else(|| Error::malformed(start, text))?;
            self.push(value);
        }
        Ok(())
    }

    fn separator(&mut self, literal: &str, at: usize) -> Result<()> {
        self.finish_scalar(literal, at)?;
        match self.slot {
            Slot::Filled => {
                self.slot = Slot::Empty;
                Ok(())
            }
            _ => Err(Error::malformed(at, &literal[at..])),
        }
    }

    fn close(mut self, literal: &str, at: usize) -> Result<Value> {
        self.finish_scalar(literal, at)?;
        match self.slot {
            // `[]` is the only way to close an empty slot
            Slot::Empty if !self.items.is_empty() => Err(Error::malformed(at, &literal[at..])),
            _ => Ok(Value::Array(self.items)),
        }
    }
}

fn innermost<'f>(open: &'f mut [Frame], literal: &str, at: usize) -> Result<&'f mut Frame> {
    open.last_mut().ok_or_else(|| Error::malformed(at, &literal[at..]))
}

/// Parse an array literal such as `[1,2,3]` or `['a','b\'c']`.
///
/// Error positions are byte offsets into `literal`.
pub fn parse_array(literal: &str) -> Result<Value> {
    let mut state = State::Outside;
    // Innermost last
    let mut open: Vec<Frame> = Vec::new();
    let mut parsed = None;

    for (i, c) in literal.char_indices() {
        state = match state {
            State::Outside => match c {
                '[' => {
                    open.push(Frame::new(i));
                    State::InArray
                }
                c if c.is_whitespace() => State::Outside,
                _ => return Err(Error::malformed(i, &literal[i..])),
            },
            State::InArray => match c {
                '[' => {
                    innermost(&mut open, literal, i)?.begin(literal, i)?;
                    if open.len() >= MAX_DEPTH {
                        return Err(Error::malformed(i, &literal[i..]));
                    }
                    open.push(Frame::new(i));
                    State::InArray
                }
                ']' => {
                    let frame = open.pop().ok_or_else(|| Error::malformed(i, &literal[i..]))?;
                    let value = frame.close(literal, i)?;
                    match open.last_mut() {
                        Some(parent) => {
                            parent.push(value);
                            State::InArray
                        }
                        None => {
                            parsed = Some(value);
                            State::Done
                        }
                    }
                }
                ',' => {
                    innermost(&mut open, literal, i)?.separator(literal, i)?;
                    State::InArray
                }
                '\'' => {
                    innermost(&mut open, literal, i)?.begin(literal, i)?;
                    State::InQuoted {
                        start: i,
                        escaped: false,
                    }
                }
                c if c.is_whitespace() => {
                    innermost(&mut open, literal, i)?.finish_scalar(literal, i)?;
                    State::InArray
                }
                _ => {
                    innermost(&mut open, literal, i)?.extend_scalar(literal, i)?;
                    State::InArray
                }
            },
            State::InQuoted { start, escaped } => match c {
                _ if escaped => State::InQuoted {
                    start,
                    escaped: false,
                },
                '\\' => State::InQuoted {
                    start,
                    escaped: true,
                },
                '\'' => {
                    let text = decode_escapes(&literal[start + 1..i]).into_owned();
                    innermost(&mut open, literal, i)?.push(Value::Str(text));
                    State::InArray
                }
                _ => state,
            },
            State::Done => match c {
                c if c.is_whitespace() => State::Done,
                _ => return Err(Error::malformed(i, &literal[i..])),
            },
        };
    }

    match (state, parsed) {
        (State::Done, Some(value)) => Ok(value),
        (State::InQuoted { start, .. }, _) => Err(Error::malformed(start, &literal[start..])),
        (State::InArray, _) => {
            let start = open.last().map_or(0, |f| f.start);
            Err(Error::malformed(start, &literal[start..]))
        }
        _ => Err(Error::malformed(0, literal)),
    }
}

fn parse_scalar(text: &str) -> Option<Value> {
    if text == "NULL" {
        return Some(Value::Null);
    }
    parse_number(text)
}

fn float_literal(input: &str) -> IResult<&str, &str> {
    all_consuming(recognize_float)(input)
}

/// Parse a bare numeric literal. Integers that overflow `i64` widen to floats.
fn parse_number(text: &str) -> Option<Value> {
    match text {
        "inf" | "+inf" => return Some(Value::Float(f64::INFINITY)),
        "-inf" => return Some(Value::Float(f64::NEG_INFINITY)),
        "nan" | "-nan" | "+nan" => return Some(Value::Float(f64::NAN)),
        _ => {}
    }

    let (_, num) = float_literal(text).ok()?;
    let is_integer = !num.contains(['.', 'e', 'E']);
    if is_integer {
        if let Ok(n) = num.parse::<i64>() {
            return Some(Value::Int(n));
        }
        tracing::warn!("Integer literal {} exceeds i64, decoding as float", num);
    }
    num.parse::<f64>().ok().map(Value::Float)
}

impl Value {
    /// Render this value in the literal syntax [`parse_array`] reads.
    pub fn to_literal(&self) -> String {
        let mut out = String::new();
        write_literal(self, &mut out);
        out
    }
}

fn write_literal(value: &Value, out: &mut String) {
    match value {
        Value::Null => out.push_str("NULL"),
        Value::Int(n) => out.push_str(&n.to_string()),
        Value::Float(x) if x.is_nan() => out.push_str("nan"),
        Value::Float(x) if x.is_infinite() => {
            out.push_str(if *x > 0.0 { "inf" } else { "-inf" })
        }
        // Debug formatting always keeps a '.' or exponent
        Value::Float(x) => out.push_str(&format!("{:?}", x)),
        Value::Str(s) => write_quoted(s, out),
        Value::Date(_) | Value::DateTime(_) => write_quoted(&value.to_string(), out),
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_literal(item, out);
            }
            out.push(']');
        }
        Value::Map(entries) => {
            out.push('{');
            for (i, (k, v)) in entries.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_literal(k, out);
                out.push(':');
                write_literal(v, out);
            }
            out.push('}');
        }
    }
}

/// Single-quoted text with every special character escaped.
fn write_quoted(s: &str, out: &mut String) {
    out.push('\'');
    for c in s.chars() {
        match c {
            // `\0` followed by an octal digit would read back as one longer octal escape
            '\0' => out.push_str("\\x00"),
            c => match escape_sequence(c) {
                Some(seq) => out.push_str(seq),
                None => out.push(c),
            },
        }
    }
    out.push('\'');
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn ints(ns: &[i64]) -> Value {
        Value::Array(ns.iter().copied().map(Value::Int).collect())
    }

    #[test]
    fn test_numeric_array() {
        assert_eq!(parse_array("[1,2,3]").unwrap(), ints(&[1, 2, 3]));
    }

    #[test]
    fn test_string_array_with_escaped_quote() {
        let v = parse_array("['a','b\\'c']").unwrap();
        assert_eq!(v, Value::from(vec!["a", "b'c"]));
    }

    #[test]
    fn test_nested_arrays() {
        let v = parse_array("[[1,2],[3]]").unwrap();
        assert_eq!(v, Value::Array(vec![ints(&[1, 2]), ints(&[3])]));
    }

    #[test]
    fn test_empty_arrays() {
        assert_eq!(parse_array("[]").unwrap(), Value::Array(vec![]));
        assert_eq!(
            parse_array("[[],[]]").unwrap(),
            Value::Array(vec![Value::Array(vec![]), Value::Array(vec![])])
        );
    }

    #[test]
    fn test_commas_and_brackets_inside_quotes() {
        let v = parse_array("['a,b','[x]','c\\\\']").unwrap();
        assert_eq!(v, Value::from(vec!["a,b", "[x]", "c\\"]));
    }

    #[test]
    fn test_whitespace_and_mixed_numbers() {
        let v = parse_array(" [ -1 , 2.5, 1e3, NULL ] ").unwrap();
        assert_eq!(
            v,
            Value::Array(vec![
                Value::Int(-1),
                Value::Float(2.5),
                Value::Float(1000.0),
                Value::Null,
            ])
        );
    }

    #[test]
    fn test_special_floats() {
        let v = parse_array("[inf,-inf]").unwrap();
        assert_eq!(v, Value::from(vec![f64::INFINITY, f64::NEG_INFINITY]));
        let nan = parse_array("[nan]").unwrap();
        assert!(matches!(nan.as_array(), Some([Value::Float(x)]) if x.is_nan()));
    }

    #[test]
    fn test_missing_closing_bracket() {
        let err = parse_array("[1,2").unwrap_err();
        match err {
            Error::MalformedLiteral { position, fragment } => {
                assert_eq!(position, 0);
                assert_eq!(fragment, "[1,2");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_unclosed_nested_bracket_position() {
        let err = parse_array("[1,[2,3]").unwrap_err();
        assert!(matches!(err, Error::MalformedLiteral { position: 0, .. }));
        let err = parse_array("[[1,[2],3]").unwrap_err();
        assert!(matches!(err, Error::MalformedLiteral { position: 0, .. }));
    }

    #[test]
    fn test_unterminated_quote() {
        let err = parse_array("['abc]").unwrap_err();
        match err {
            Error::MalformedLiteral { position, fragment } => {
                assert_eq!(position, 1);
                assert_eq!(fragment, "'abc]");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_trailing_content() {
        let err = parse_array("[1]x").unwrap_err();
        assert!(matches!(err, Error::MalformedLiteral { position: 3, .. }));
    }

    #[test]
    fn test_empty_elements_rejected() {
        assert!(parse_array("[1,,2]").is_err());
        assert!(parse_array("[1,]").is_err());
        assert!(parse_array("[,1]").is_err());
    }

    #[test]
    fn test_junk_elements_rejected() {
        let err = parse_array("[1,abc]").unwrap_err();
        assert!(matches!(err, Error::MalformedLiteral { position: 3, ref fragment } if fragment == "abc"));
        assert!(parse_array("['a'b]").is_err());
        assert!(parse_array("1,2").is_err());
        assert!(parse_array("").is_err());
    }

    #[test]
    fn test_nested_error_position_is_absolute() {
        let err = parse_array("[[1],[2,x]]").unwrap_err();
        assert!(matches!(err, Error::MalformedLiteral { position: 8, .. }));
    }

    #[test]
    fn test_to_literal() {
        let v = Value::Array(vec![
            Value::Int(1),
            Value::Float(1.0),
            Value::Str("it's".into()),
            Value::Null,
            Value::Array(vec![]),
        ]);
        assert_eq!(v.to_literal(), "[1,1.0,'it\\'s',NULL,[]]");
    }

    #[test]
    fn test_nul_before_digit_round_trips() {
        let v = Value::Array(vec![Value::Str("a\01".into()), Value::Str("\07\0".into())]);
        assert_eq!(v.to_literal(), "['a\\x001','\\x007\\x00']");
        assert_eq!(parse_array(&v.to_literal()).unwrap(), v);
    }

    #[test]
    fn test_nesting_limit() {
        let deepest = format!("{}{}", "[".repeat(MAX_DEPTH), "]".repeat(MAX_DEPTH));
        assert!(parse_array(&deepest).is_ok());

        let too_deep = format!("{}{}", "[".repeat(MAX_DEPTH + 1), "]".repeat(MAX_DEPTH + 1));
        let err = parse_array(&too_deep).unwrap_err();
        assert!(matches!(err, Error::MalformedLiteral { position, .. } if position == MAX_DEPTH));
    }

    #[test]
    fn test_huge_nesting_is_an_error() {
        let literal = format!("{}{}", "[".repeat(200_000), "]".repeat(200_000));
        let err = parse_array(&literal).unwrap_err();
        assert!(matches!(err, Error::MalformedLiteral { position, .. } if position == MAX_DEPTH));
    }

    #[test]
    fn test_bare_tokens_need_separators() {
        let err = parse_array("[1 2]").unwrap_err();
        assert!(matches!(err, Error::MalformedLiteral { position: 3, .. }));
        let err = parse_array("['a' 'b']").unwrap_err();
        assert!(matches!(err, Error::MalformedLiteral { position: 5, .. }));
    }

    #[test]
    fn test_literal_round_trip() {
        let v = Value::Array(vec![
            Value::Str("tab\there".into()),
            Value::Str("back\\slash".into()),
            Value::Str("nul\0".into()),
            Value::Float(-0.125),
        ]);
        assert_eq!(parse_array(&v.to_literal()).unwrap(), v);
    }
}
