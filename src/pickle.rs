//! Pickle object stream: a bounded writer and a reader.
//!
//! Covers the opcode subset needed to carry decoded literals: lists, dicts,
//! unicode strings, integers, floats and `None`. Streams start with
//! `PROTO 4` and end with `STOP`, so a reader finds the end without being
//! told the length.

use crate::error::{Error, Result};
use crate::value::Value;

pub const PROTOCOL: u8 = 4;

/// Opcodes written or understood here.
pub mod op {
    pub const MARK: u8 = b'(';
    pub const STOP: u8 = b'.';
    pub const BININT: u8 = b'J';
    pub const BININT1: u8 = b'K';
    pub const BININT2: u8 = b'M';
    pub const NONE: u8 = b'N';
    pub const BINUNICODE: u8 = b'X';
    pub const APPEND: u8 = b'a';
    pub const EMPTY_DICT: u8 = b'}';
    pub const APPENDS: u8 = b'e';
    pub const EMPTY_LIST: u8 = b']';
    pub const SETITEM: u8 = b's';
    pub const SETITEMS: u8 = b'u';
    pub const BINFLOAT: u8 = b'G';
    pub const PROTO: u8 = 0x80;
    pub const NEWTRUE: u8 = 0x88;
    pub const NEWFALSE: u8 = 0x89;
    pub const LONG1: u8 = 0x8a;
    pub const SHORT_BINUNICODE: u8 = 0x8c;
    pub const BINUNICODE8: u8 = 0x8d;
    pub const FRAME: u8 = 0x95;
}

/// Writes opcodes into a caller-owned buffer without ever growing it.
///
/// Once a write does not fit, nothing more is written and
/// [`PickleWriter::overflowed`] reports it.
pub struct PickleWriter<'a> {
    buf: &'a mut [u8],
    pos: usize,
    overflow: bool,
}

impl<'a> PickleWriter<'a> {
    pub fn new(buf: &'a mut [u8]) -> Self {
        Self {
            buf,
            pos: 0,
            overflow: false,
        }
    }

    /// Bytes written so far.
    pub fn position(&self) -> usize {
        self.pos
    }

    pub fn overflowed(&self) -> bool {
        self.overflow
    }

    fn write(&mut self, data: &[u8]) {
        if self.overflow {
            return;
        }
        let end = self.pos + data.len();
        if end > self.buf.len() {
            tracing::debug!(
                "Pickle buffer overflow (pos {}, size {}, add {})",
                self.pos,
                self.buf.len(),
                data.len()
            );
            self.overflow = true;
            return;
        }
        self.buf[self.pos..end].copy_from_slice(data);
        self.pos = end;
    }

    fn opcode(&mut self, code: u8) {
        self.write(&[code]);
    }

    pub fn start(&mut self) {
        self.write(&[op::PROTO, PROTOCOL]);
    }

    pub fn stop(&mut self) {
        self.opcode(op::STOP);
    }

    pub fn mark(&mut self) {
        self.opcode(op::MARK);
    }

    pub fn empty_list(&mut self) {
        self.opcode(op::EMPTY_LIST);
    }

    pub fn appends(&mut self) {
        self.opcode(op::APPENDS);
    }

    pub fn empty_dict(&mut self) {
        self.opcode(op::EMPTY_DICT);
    }

    pub fn setitems(&mut self) {
        self.opcode(op::SETITEMS);
    }

    pub fn none(&mut self) {
        self.opcode(op::NONE);
    }

    /// UTF-8 text with the shortest length header that fits.
    pub fn unicode(&mut self, text: &[u8]) {
        let len = text.len();
        if let Ok(short) = u8::try_from(len) {
            self.write(&[op::SHORT_BINUNICODE, short]);
        } else if let Ok(medium) = u32::try_from(len) {
            self.opcode(op::BINUNICODE);
            self.write(&medium.to_le_bytes());
        } else {
            self.opcode(op::BINUNICODE8);
            self.write(&(len as u64).to_le_bytes());
        }
        self.write(text);
    }

    pub fn int(&mut self, n: i64) {
        if let Ok(small) = u8::try_from(n) {
            self.write(&[op::BININT1, small]);
        } else if let Ok(medium) = u16::try_from(n) {
            self.opcode(op::BININT2);
            self.write(&medium.to_le_bytes());
        } else if let Ok(word) = i32::try_from(n) {
            self.opcode(op::BININT);
            self.write(&word.to_le_bytes());
        } else {
            let bytes = n.to_le_bytes();
            let len = long_len(n);
            self.write(&[op::LONG1, len as u8]);
            self.write(&bytes[..len]);
        }
    }

    pub fn float(&mut self, x: f64) {
        let mut data = [op::BINFLOAT; 9];
        data[1..].copy_from_slice(&x.to_be_bytes());
        self.write(&data);
    }
}

/// Minimal two's complement byte count for a LONG1 payload.
fn long_len(n: i64) -> usize {
    let bytes = n.to_le_bytes();
    let mut len = bytes.len();
    while len > 1 {
        let top = bytes[len - 1];
        let next_sign = bytes[len - 2] & 0x80;
        if (top == 0x00 && next_sign == 0) || (top == 0xff && next_sign != 0) {
            len -= 1;
        } else {
            break;
        }
    }
    len
}

enum Slot {
    Mark,
    Value(Value),
}

struct Cursor<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn take(&mut self, n: usize) -> Result<&'a [u8]> {
        let end = self
            .pos
            .checked_add(n)
            .filter(|end| *end <= self.bytes.len())
            .ok_or_else(|| Error::pickle(self.pos, format!("truncated, wanted {} bytes", n)))?;
        let out = &self.bytes[self.pos..end];
        self.pos = end;
        Ok(out)
    }

    fn byte(&mut self) -> Result<u8> {
        Ok(self.take(1)?[0])
    }

    fn array<const N: usize>(&mut self) -> Result<[u8; N]> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.take(N)?);
        Ok(out)
    }
}

/// Read one pickled value, returning it with the number of bytes consumed.
///
/// Bytes after `STOP` are ignored.
pub fn read(bytes: &[u8]) -> Result<(Value, usize)> {
    let mut cur = Cursor { bytes, pos: 0 };
    let mut stack: Vec<Slot> = Vec::new();

    loop {
        let at = cur.pos;
        let code = cur.byte()?;
        match code {
            op::PROTO => {
                let proto = cur.byte()?;
                if proto > 5 {
                    return Err(Error::pickle(at, format!("unsupported protocol {}", proto)));
                }
            }
            op::FRAME => {
                cur.take(8)?;
            }
            op::MARK => stack.push(Slot::Mark),
            op::EMPTY_LIST => stack.push(Slot::Value(Value::Array(Vec::new()))),
            op::EMPTY_DICT => stack.push(Slot::Value(Value::Map(Vec::new()))),
            op::NONE => stack.push(Slot::Value(Value::Null)),
            op::NEWTRUE => stack.push(Slot::Value(Value::Int(1))),
            op::NEWFALSE => stack.push(Slot::Value(Value::Int(0))),
            op::BININT1 => stack.push(Slot::Value(Value::Int(cur.byte()? as i64))),
            op::BININT2 => {
                let n = u16::from_le_bytes(cur.array()?);
                stack.push(Slot::Value(Value::Int(n as i64)));
            }
            op::BININT => {
                let n = i32::from_le_bytes(cur.array()?);
                stack.push(Slot::Value(Value::Int(n as i64)));
            }
            op::LONG1 => {
                let len = cur.byte()? as usize;
                let payload = cur.take(len)?;
                stack.push(Slot::Value(Value::Int(long_from_le(payload, at)?)));
            }
            op::BINFLOAT => {
                let x = f64::from_be_bytes(cur.array()?);
                stack.push(Slot::Value(Value::Float(x)));
            }
            op::SHORT_BINUNICODE => {
                let len = cur.byte()? as usize;
                stack.push(Slot::Value(unicode(cur.take(len)?, at)?));
            }
            op::BINUNICODE => {
                let len = u32::from_le_bytes(cur.array()?) as usize;
                stack.push(Slot::Value(unicode(cur.take(len)?, at)?));
            }
            op::BINUNICODE8 => {
                let len = usize::try_from(u64::from_le_bytes(cur.array()?))
                    .map_err(|_| Error::pickle(at, "string length exceeds address space"))?;
                stack.push(Slot::Value(unicode(cur.take(len)?, at)?));
            }
            op::APPEND => {
                let item = pop_value(&mut stack, at)?;
                target_list(&mut stack, at)?.push(item);
            }
            op::APPENDS => {
                let items = pop_to_mark(&mut stack, at)?;
                target_list(&mut stack, at)?.extend(items);
            }
            op::SETITEM => {
                let v = pop_value(&mut stack, at)?;
                let k = pop_value(&mut stack, at)?;
                target_map(&mut stack, at)?.push((k, v));
            }
            op::SETITEMS => {
                let items = pop_to_mark(&mut stack, at)?;
                if items.len() % 2 != 0 {
                    return Err(Error::pickle(at, "odd number of dict items"));
                }
                let mut items = items.into_iter();
                let map = target_map(&mut stack, at)?;
                while let (Some(k), Some(v)) = (items.next(), items.next()) {
                    map.push((k, v));
                }
            }
            op::STOP => {
                let value = pop_value(&mut stack, at)?;
                if !stack.is_empty() {
                    return Err(Error::pickle(at, "values left on stack at STOP"));
                }
                return Ok((value, cur.pos));
            }
            other => {
                return Err(Error::pickle(at, format!("unsupported opcode 0x{:02x}", other)));
            }
        }
    }
}

fn unicode(raw: &[u8], at: usize) -> Result<Value> {
    std::str::from_utf8(raw)
        .map(|s| Value::Str(s.to_string()))
        .map_err(|e| Error::pickle(at, format!("invalid UTF-8 in string: {}", e)))
}

fn long_from_le(payload: &[u8], at: usize) -> Result<i64> {
    if payload.is_empty() {
        return Ok(0);
    }
    if payload.len() > 8 {
        return Err(Error::pickle(at, "integer wider than 64 bits"));
    }
    let fill = if payload[payload.len() - 1] & 0x80 != 0 { 0xff } else { 0x00 };
    let mut bytes = [fill; 8];
    bytes[..payload.len()].copy_from_slice(payload);
    Ok(i64::from_le_bytes(bytes))
}

fn pop_value(stack: &mut Vec<Slot>, at: usize) -> Result<Value> {
    match stack.pop() {
        Some(Slot::Value(v)) => Ok(v),
        Some(Slot::Mark) => Err(Error::pickle(at, "expected value, found mark")),
        None => Err(Error::pickle(at, "stack underflow")),
    }
}

fn pop_to_mark(stack: &mut Vec<Slot>, at: usize) -> Result<Vec<Value>> {
    let mut items = Vec::new();
    loop {
        match stack.pop() {
            Some(Slot::Value(v)) => items.push(v),
            Some(Slot::Mark) => break,
            None => return Err(Error::pickle(at, "missing mark")),
        }
    }
    items.reverse();
    Ok(items)
}

fn target_list(stack: &mut [Slot], at: usize) -> Result<&mut Vec<Value>> {
    match stack.last_mut() {
        Some(Slot::Value(Value::Array(items))) => Ok(items),
        _ => Err(Error::pickle(at, "append target is not a list")),
    }
}

fn target_map(stack: &mut [Slot], at: usize) -> Result<&mut Vec<(Value, Value)>> {
    match stack.last_mut() {
        Some(Slot::Value(Value::Map(entries))) => Ok(entries),
        _ => Err(Error::pickle(at, "setitem target is not a dict")),
    }
}
