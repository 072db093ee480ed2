//! Native literal transcoding.
//!
//! A C-ABI routine turns a source-style literal (lists, dicts, quoted
//! strings, numbers, `NULL`) into a pickle stream written into a
//! caller-provided buffer, and [`NativeDecoder`] wraps it behind a safe API.
//!
//! ## Boundary
//! ```c
//! int32_t framehouse_literal_to_pickle(const uint8_t *input, size_t input_len,
//!                                      uint8_t *output, size_t output_cap);
//! ```
//! Returns `0` on success; the stream ends at its `STOP` opcode. Any other
//! status means the output buffer holds nothing usable.

// FFI functions check pointers before dereferencing, clippy doesn't understand this pattern
#![allow(clippy::not_unsafe_ptr_arg_deref)]

use crate::error::{Error, Result};
use crate::literal::MAX_DEPTH;
use crate::pickle::{self, PickleWriter};
use crate::value::Value;

pub const STATUS_OK: i32 = 0;
pub const STATUS_NULL_POINTER: i32 = 1;
pub const STATUS_GRAMMAR: i32 = 2;
pub const STATUS_OVERFLOW: i32 = 3;

/// Extra output room on top of the input length.
pub const DEFAULT_MARGIN: usize = 1000;

/// Signature of the transcoding routine.
pub type LiteralToPickleFn = unsafe extern "C" fn(*const u8, usize, *mut u8, usize) -> i32;

/// Transcode a literal into a pickle stream.
///
/// Stateless and reentrant: everything it touches lives on the stack or in the
/// buffers passed in.
#[unsafe(no_mangle)]
pub extern "C" fn framehouse_literal_to_pickle(
    input: *const u8,
    input_len: usize,
    output: *mut u8,
    output_cap: usize,
) -> i32 {
    if (input.is_null() && input_len > 0) || output.is_null() {
        return STATUS_NULL_POINTER;
    }

    let input: &[u8] = if input_len == 0 {
        &[]
    } else {
        unsafe { std::slice::from_raw_parts(input, input_len) }
    };
    let output = unsafe { std::slice::from_raw_parts_mut(output, output_cap) };

    transcode(input, output)
}

fn transcode(input: &[u8], output: &mut [u8]) -> i32 {
    let mut t = Transcoder {
        input,
        pos: 0,
        depth: 0,
        out: PickleWriter::new(output),
    };
    let parsed = t.full_pass();
    if t.out.overflowed() {
        return STATUS_OVERFLOW;
    }
    match parsed {
        Ok(()) => STATUS_OK,
        Err(fail) => {
            tracing::debug!("Literal grammar error: {} at byte {}", fail.context, fail.position);
            STATUS_GRAMMAR
        }
    }
}

struct GrammarFail {
    context: &'static str,
    position: usize,
}

type Step = std::result::Result<(), GrammarFail>;

struct Transcoder<'i, 'o> {
    input: &'i [u8],
    pos: usize,
    /// Containers currently open
    depth: usize,
    out: PickleWriter<'o>,
}

impl Transcoder<'_, '_> {
    fn fail(&self, context: &'static str) -> GrammarFail {
        GrammarFail {
            context,
            position: self.pos,
        }
    }

    fn peek(&self) -> Option<u8> {
        self.input.get(self.pos).copied()
    }

    fn bump(&mut self) -> Option<u8> {
        let c = self.peek()?;
        self.pos += 1;
        Some(c)
    }

    fn skip_ws(&mut self) {
        while self.peek().is_some_and(|c| c.is_ascii_whitespace()) {
            self.pos += 1;
        }
    }

    fn full_pass(&mut self) -> Step {
        self.out.start();
        self.skip_ws();
        self.value()?;
        self.skip_ws();
        if self.pos != self.input.len() {
            return Err(self.fail("trailing content after root value"));
        }
        self.out.stop();
        Ok(())
    }

    fn value(&mut self) -> Step {
        match self.peek() {
            Some(q @ (b'\'' | b'"')) => {
                self.pos += 1;
                self.string(q)
            }
            Some(b'[') => {
                self.pos += 1;
                self.list()
            }
            Some(b'{') => {
                self.pos += 1;
                self.dict()
            }
            Some(c) if c.is_ascii_digit() || matches!(c, b'+' | b'-' | b'.') => self.number(),
            Some(b'N') if self.input[self.pos..].starts_with(b"NULL") => {
                self.pos += 4;
                self.out.none();
                Ok(())
            }
            Some(_) => Err(self.fail("unexpected character")),
            None => Err(self.fail("unexpected end of input")),
        }
    }

    /// Comma-separated items up to `close`; a trailing comma is allowed.
    fn items(&mut self, close: u8, mut item: impl FnMut(&mut Self) -> Step) -> Step {
        loop {
            self.skip_ws();
            if self.peek() == Some(close) {
                self.pos += 1;
                return Ok(());
            }
            item(&mut *self)?;
            self.skip_ws();
            match self.bump() {
                Some(b',') => continue,
                Some(c) if c == close => return Ok(()),
                Some(_) => {
                    self.pos -= 1;
                    return Err(self.fail("expected separator"));
                }
                None => return Err(self.fail("unterminated container")),
            }
        }
    }

    fn enter(&mut self) -> Step {
        if self.depth >= MAX_DEPTH {
            return Err(self.fail("nesting too deep"));
        }
        self.depth += 1;
        Ok(())
    }

    fn list(&mut self) -> Step {
        self.enter()?;
        self.out.empty_list();
        self.out.mark();
        self.items(b']', Self::value)?;
        self.out.appends();
        self.depth -= 1;
        Ok(())
    }

    fn dict(&mut self) -> Step {
        self.enter()?;
        self.out.empty_dict();
        self.out.mark();
        self.items(b'}', |t| {
            t.value()?;
            t.skip_ws();
            if t.bump() != Some(b':') {
                return Err(t.fail("expected ':' after dict key"));
            }
            t.skip_ws();
            t.value()
        })?;
        self.out.setitems();
        self.depth -= 1;
        Ok(())
    }

    fn string(&mut self, quote: u8) -> Step {
        let mut buf: Vec<u8> = Vec::new();
        loop {
            let c = self.bump().ok_or_else(|| self.fail("unterminated string"))?;
            if c == quote {
                break;
            }
            if c != b'\\' {
                buf.push(c);
                continue;
            }
            let escaped = self.bump().ok_or_else(|| self.fail("unterminated escape"))?;
            match escaped {
                b'r' => buf.push(b'\r'),
                b't' => buf.push(b'\t'),
                b'n' => buf.push(b'\n'),
                b'0' => buf.push(0),
                b'b' => buf.push(0x08),
                b'f' => buf.push(0x0c),
                b'\\' | b'"' | b'\'' | b'\n' => buf.push(escaped),
                b'x' => {
                    let hi = self.hex_digit()?;
                    let lo = self.hex_digit()?;
                    let c = char::from(hi * 16 + lo);
                    let mut utf8 = [0u8; 4];
                    buf.extend_from_slice(c.encode_utf8(&mut utf8).as_bytes());
                }
                _ => {
                    self.pos -= 1;
                    return Err(self.fail("unknown string escape"));
                }
            }
        }
        if std::str::from_utf8(&buf).is_err() {
            return Err(self.fail("string is not valid UTF-8"));
        }
        self.out.unicode(&buf);
        Ok(())
    }

    fn hex_digit(&mut self) -> std::result::Result<u8, GrammarFail> {
        let c = self.bump().ok_or_else(|| self.fail("unterminated hex escape"))?;
        (c as char)
            .to_digit(16)
            .map(|d| d as u8)
            .ok_or_else(|| self.fail("invalid hex escape"))
    }

    fn number(&mut self) -> Step {
        let start = self.pos;
        while self
            .peek()
            .is_some_and(|c| c.is_ascii_digit() || matches!(c, b'+' | b'-' | b'.' | b'e' | b'E'))
        {
            self.pos += 1;
        }
        let text = std::str::from_utf8(&self.input[start..self.pos])
            .map_err(|_| self.fail("invalid number"))?;
        if text.contains(['.', 'e', 'E']) {
            let x: f64 = text.parse().map_err(|_| self.fail("invalid float"))?;
            self.out.float(x);
        } else {
            let n: i64 = text.parse().map_err(|_| self.fail("invalid integer"))?;
            self.out.int(n);
        }
        Ok(())
    }
}

/// Safe wrapper around a [`LiteralToPickleFn`].
#[derive(Clone, Copy)]
pub struct NativeDecoder {
    routine: LiteralToPickleFn,
    margin: usize,
}

impl std::fmt::Debug for NativeDecoder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NativeDecoder")
            .field("margin", &self.margin)
            .finish_non_exhaustive()
    }
}

impl Default for NativeDecoder {
    fn default() -> Self {
        Self::new()
    }
}

impl NativeDecoder {
    /// Use the routine compiled into this crate.
    pub fn new() -> Self {
        Self {
            routine: framehouse_literal_to_pickle as LiteralToPickleFn,
            margin: DEFAULT_MARGIN,
        }
    }

    /// Use a routine resolved elsewhere, e.g. from a shared library.
    ///
    /// # Safety
    /// `routine` must honor the boundary contract: read at most `input_len`
    /// bytes, write at most `output_cap` bytes, keep no state between calls.
    pub unsafe fn with_routine(routine: LiteralToPickleFn) -> Self {
        Self {
            routine,
            margin: DEFAULT_MARGIN,
        }
    }

    /// Set the output room added to the input length.
    pub fn margin(mut self, margin: usize) -> Self {
        self.margin = margin;
        self
    }

    /// Run the routine and return the pickle stream, cut at its `STOP`.
    pub fn transcode(&self, literal: &[u8]) -> Result<Vec<u8>> {
        let mut out = self.call(literal)?;
        let (_, used) = pickle::read(&out)?;
        out.truncate(used);
        Ok(out)
    }

    /// Decode a literal into a [`Value`].
    pub fn decode(&self, literal: &str) -> Result<Value> {
        let out = self.call(literal.as_bytes())?;
        let (value, _) = pickle::read(&out)?;
        Ok(value)
    }

    /// The output buffer lives only for the duration of the caller's decode.
    fn call(&self, literal: &[u8]) -> Result<Vec<u8>> {
        let mut out = vec![0u8; literal.len() + self.margin];
        let status = unsafe { (self.routine)(literal.as_ptr(), literal.len(), out.as_mut_ptr(), out.len()) };
        if status != STATUS_OK {
            tracing::error!(
                "Native literal routine failed with status {} ({} input bytes, {} output bytes)",
                status,
                literal.len(),
                out.len()
            );
            return Err(Error::NativeDecode {
                status,
                input: literal.to_vec(),
            });
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_decode_numbers_and_strings() {
        let d = NativeDecoder::new();
        assert_eq!(d.decode("[1,2,3]").unwrap(), Value::from(vec![1i64, 2, 3]));
        assert_eq!(
            d.decode("['a', \"b\\'c\"]").unwrap(),
            Value::from(vec!["a", "b'c"])
        );
    }

    #[test]
    fn test_decode_nested_and_null() {
        let d = NativeDecoder::new();
        assert_eq!(
            d.decode("[[1, 2.5], [], NULL]").unwrap(),
            Value::Array(vec![
                Value::Array(vec![Value::Int(1), Value::Float(2.5)]),
                Value::Array(vec![]),
                Value::Null,
            ])
        );
    }

    #[test]
    fn test_decode_dict() {
        let d = NativeDecoder::new();
        assert_eq!(
            d.decode("{'a': 1, 'b': [2]}").unwrap(),
            Value::Map(vec![
                (Value::Str("a".into()), Value::Int(1)),
                (Value::Str("b".into()), Value::from(vec![2i64])),
            ])
        );
    }

    #[test]
    fn test_string_escapes() {
        let d = NativeDecoder::new();
        assert_eq!(
            d.decode("['\\t\\n\\0\\x41\\xe9']").unwrap(),
            Value::from(vec!["\t\n\0Aé"])
        );
    }

    #[test]
    fn test_wide_integers_survive() {
        let d = NativeDecoder::new();
        assert_eq!(
            d.decode("[4294967296, -9223372036854775808]").unwrap(),
            Value::from(vec![4294967296i64, i64::MIN])
        );
    }

    #[test]
    fn test_grammar_error_status() {
        let err = NativeDecoder::new().decode("[1 2]").unwrap_err();
        match err {
            Error::NativeDecode { status, input } => {
                assert_eq!(status, STATUS_GRAMMAR);
                assert_eq!(input, b"[1 2]");
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert!(NativeDecoder::new().decode("['open").is_err());
        assert!(NativeDecoder::new().decode("[1]]").is_err());
    }

    #[test]
    fn test_oversized_output_is_reported() {
        // Each "1.," is 3 input bytes but 9 output bytes
        let literal = format!("[{}1.]", "1.,".repeat(500));
        let err = NativeDecoder::new().decode(&literal).unwrap_err();
        assert!(matches!(err, Error::NativeDecode { status: STATUS_OVERFLOW, .. }));

        let roomy = NativeDecoder::new().margin(10_000);
        let value = roomy.decode(&literal).unwrap();
        assert_eq!(value.as_array().map(|a| a.len()), Some(501));
    }

    #[test]
    fn test_nesting_limit() {
        let d = NativeDecoder::new();
        let deepest = format!("{}{}", "[".repeat(MAX_DEPTH), "]".repeat(MAX_DEPTH));
        assert!(d.decode(&deepest).is_ok());

        let too_deep = format!("{}{}", "[".repeat(MAX_DEPTH + 1), "]".repeat(MAX_DEPTH + 1));
        let err = d.decode(&too_deep).unwrap_err();
        assert!(matches!(err, Error::NativeDecode { status: STATUS_GRAMMAR, .. }));

        let dicts = |n: usize| format!("{}0{}", "{1:".repeat(n), "}".repeat(n));
        assert!(d.decode(&dicts(MAX_DEPTH)).is_ok());
        let err = d.decode(&dicts(MAX_DEPTH + 1)).unwrap_err();
        assert!(matches!(err, Error::NativeDecode { status: STATUS_GRAMMAR, .. }));
    }

    #[test]
    fn test_huge_nesting_is_an_error() {
        let literal = format!("{}{}", "[".repeat(200_000), "]".repeat(200_000));
        let err = NativeDecoder::new().decode(&literal).unwrap_err();
        assert!(matches!(err, Error::NativeDecode { status: STATUS_GRAMMAR, .. }));
    }

    #[test]
    fn test_null_pointers_rejected() {
        let status = framehouse_literal_to_pickle(std::ptr::null(), 3, std::ptr::null_mut(), 0);
        assert_eq!(status, STATUS_NULL_POINTER);
    }

    #[test]
    fn test_transcode_truncates_to_stream() {
        let stream = NativeDecoder::new().transcode(b"[1]").unwrap();
        assert_eq!(stream, vec![0x80, 4, b']', b'(', b'K', 1, b'e', b'.']);
    }

    #[test]
    fn test_concurrent_calls() {
        let handles: Vec<_> = (0..8)
            .map(|i| {
                std::thread::spawn(move || {
                    let literal = format!("[{i}, '{i}']");
                    NativeDecoder::new().decode(&literal).unwrap()
                })
            })
            .collect();
        for (i, h) in handles.into_iter().enumerate() {
            let value = h.join().unwrap();
            assert_eq!(
                value,
                Value::Array(vec![Value::Int(i as i64), Value::Str(i.to_string())])
            );
        }
    }
}
