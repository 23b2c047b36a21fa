//! The order-preserving binary encoding: bytes-in / bytes-out for every
//! [`Value`] and for composite [`Key`]s, such that byte-wise comparison of
//! the encoded form always matches the logical order of the decoded form
//! (§4.1). Every higher layer -- `tree`, `catalog`, `mvcc` -- depends on
//! this property, in both ascending and descending directions.
//!
//! Type tags are laid out so that types sort in a single stable total
//! order: null < false < true < negative integers (by width, widest
//! first) < small integers (a 64-tag fixint block for `[-32, 31]`, which
//! fits entirely in the tag byte) < positive integers (by width,
//! narrowest first) < timestamp < float < text < blob < array < object.
//! A descending column bit-inverts every byte of the ascending encoding;
//! since `!tag == 255 - tag`, this is exactly the "symmetric mirror of
//! every tag" the format reserves, and it also means a tag byte alone
//! tells us whether a value was encoded ascending (tag <= TAG_MAX) or
//! descending (tag > TAG_MAX) without any out-of-band direction flag.

pub mod keycode;

use crate::error::{CResult, Error};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

// --- type tags (ascending form) ---------------------------------------

const TAG_NULL: u8 = 0;
const TAG_FALSE: u8 = 1;
const TAG_TRUE: u8 = 2;
const TAG_INT_NEG64: u8 = 3;
const TAG_INT_NEG32: u8 = 4;
const TAG_INT_NEG16: u8 = 5;
const TAG_INT_NEG8: u8 = 6;
const TAG_FIXINT_BASE: u8 = 7; // occupies 7..=70, 64 tags for [-32, 31]
const TAG_FIXINT_COUNT: u8 = 64;
const TAG_INT_POS8: u8 = 71;
const TAG_INT_POS16: u8 = 72;
const TAG_INT_POS32: u8 = 73;
const TAG_INT_POS64: u8 = 74;
const TAG_TIMESTAMP: u8 = 75;
const TAG_FLOAT: u8 = 76;
const TAG_TEXT: u8 = 77;
const TAG_BLOB: u8 = 78;
const TAG_ARRAY: u8 = 79;
const TAG_OBJECT: u8 = 80;

/// Largest tag used by the ascending encoding. Any tag byte greater than
/// this was produced by bit-inverting an ascending tag for a DESC column.
const TAG_MAX: u8 = TAG_OBJECT;

/// Per-column sort direction, carried alongside a [`Key`] by the `tree`
/// and `catalog` layers (the "sort order vector" of the glossary).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortDirection {
    Asc,
    Desc,
}

impl SortDirection {
    pub fn is_desc(self) -> bool {
        matches!(self, SortDirection::Desc)
    }
}

/// The tagged union of §3: every column value and every literal in a
/// query is one of these.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    Null,
    Boolean(bool),
    Integer(i64),
    Float(f64),
    /// Microseconds relative to 2000-01-01T00:00:00Z, truncated to
    /// microsecond resolution on ingest (§3 invariants).
    Timestamp(i64),
    Text(String),
    Blob(Vec<u8>),
    Array(Vec<Value>),
    Object(Vec<(String, Value)>),
}

impl Value {
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Boolean(_) => "boolean",
            Value::Integer(_) => "integer",
            Value::Float(_) => "float",
            Value::Timestamp(_) => "timestamp",
            Value::Text(_) => "text",
            Value::Blob(_) => "blob",
            Value::Array(_) => "array",
            Value::Object(_) => "object",
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }
}

impl std::fmt::Display for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Value::Null => write!(f, "NULL"),
            Value::Boolean(b) => write!(f, "{b}"),
            Value::Integer(i) => write!(f, "{i}"),
            Value::Float(v) => write!(f, "{v}"),
            Value::Timestamp(t) => write!(f, "{t}"),
            Value::Text(s) => write!(f, "{s}"),
            Value::Blob(b) => write!(f, "0x{}", b.iter().map(|byte| format!("{byte:02x}")).collect::<String>()),
            Value::Array(items) => {
                write!(f, "[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{item}")?;
                }
                write!(f, "]")
            }
            Value::Object(fields) => {
                write!(f, "{{")?;
                for (i, (k, v)) in fields.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{k}: {v}")?;
                }
                write!(f, "}}")
            }
        }
    }
}

// --- integer width selection -------------------------------------------

fn fixint_range() -> std::ops::RangeInclusive<i64> {
    -32..=31
}

/// Encodes `v` as a fixed-width, sign-bit-biased big-endian integer,
/// appended to `out`. The bias (`v as u{width} XOR high-bit`) makes
/// unsigned byte comparison match signed comparison.
fn push_int8(out: &mut Vec<u8>, v: i64) {
    let biased = (v as i8 as u8) ^ 0x80;
    out.push(biased);
}
fn push_int16(out: &mut Vec<u8>, v: i64) {
    let biased = (v as i16 as u16) ^ 0x8000;
    out.extend_from_slice(&biased.to_be_bytes());
}
fn push_int32(out: &mut Vec<u8>, v: i64) {
    let biased = (v as i32 as u32) ^ 0x8000_0000;
    out.extend_from_slice(&biased.to_be_bytes());
}
fn push_int64(out: &mut Vec<u8>, v: i64) {
    let biased = (v as u64) ^ 0x8000_0000_0000_0000;
    out.extend_from_slice(&biased.to_be_bytes());
}

fn read_int8(b: &[u8]) -> CResult<i64> {
    let byte = *b.first().ok_or_else(|| Error::Internal("truncated int8".into()))?;
    Ok(((byte ^ 0x80) as i8) as i64)
}
fn read_int16(b: &[u8]) -> CResult<i64> {
    let bytes: [u8; 2] = b
        .get(..2)
        .ok_or_else(|| Error::Internal("truncated int16".into()))?
        .try_into()
        .unwrap();
    let biased = u16::from_be_bytes(bytes) ^ 0x8000;
    Ok((biased as i16) as i64)
}
fn read_int32(b: &[u8]) -> CResult<i64> {
    let bytes: [u8; 4] = b
        .get(..4)
        .ok_or_else(|| Error::Internal("truncated int32".into()))?
        .try_into()
        .unwrap();
    let biased = u32::from_be_bytes(bytes) ^ 0x8000_0000;
    Ok((biased as i32) as i64)
}
fn read_int64(b: &[u8]) -> CResult<i64> {
    let bytes: [u8; 8] = b
        .get(..8)
        .ok_or_else(|| Error::Internal("truncated int64".into()))?
        .try_into()
        .unwrap();
    let biased = u64::from_be_bytes(bytes) ^ 0x8000_0000_0000_0000;
    Ok(biased as i64)
}

// --- varint (unsigned LEB128) used for text/blob/array/object lengths --

fn push_varint(out: &mut Vec<u8>, mut v: u64) {
    loop {
        let mut byte = (v & 0x7f) as u8;
        v >>= 7;
        if v != 0 {
            byte |= 0x80;
        }
        out.push(byte);
        if v == 0 {
            break;
        }
    }
}

fn read_varint(b: &[u8]) -> CResult<(u64, usize)> {
    let mut value: u64 = 0;
    let mut shift = 0;
    for (i, &byte) in b.iter().enumerate() {
        value |= ((byte & 0x7f) as u64) << shift;
        if byte & 0x80 == 0 {
            return Ok((value, i + 1));
        }
        shift += 7;
        if shift > 63 {
            return Err(Error::Internal("varint too long".into()));
        }
    }
    Err(Error::Internal("truncated varint".into()))
}

fn sortable_float_bits(f: f64) -> u64 {
    let bits = f.to_bits();
    if bits >> 63 == 1 {
        !bits
    } else {
        bits | (1u64 << 63)
    }
}

fn unsortable_float_bits(bits: u64) -> f64 {
    let orig = if bits >> 63 == 1 { bits & !(1u64 << 63) } else { !bits };
    f64::from_bits(orig)
}

/// Encodes a single value, ascending. This is the building block both
/// `Key::encode` (for composite keys, applying DESC inversion per
/// column) and nested array/object elements use.
pub fn encode_value(value: &Value, out: &mut Vec<u8>) {
    match value {
        Value::Null => out.push(TAG_NULL),
        Value::Boolean(false) => out.push(TAG_FALSE),
        Value::Boolean(true) => out.push(TAG_TRUE),
        Value::Integer(v) => encode_int(*v, out),
        Value::Timestamp(v) => {
            out.push(TAG_TIMESTAMP);
            push_int64(out, *v);
        }
        Value::Float(f) => {
            out.push(TAG_FLOAT);
            out.extend_from_slice(&sortable_float_bits(*f).to_be_bytes());
        }
        Value::Text(s) => {
            out.push(TAG_TEXT);
            push_varint(out, s.len() as u64);
            out.extend_from_slice(s.as_bytes());
        }
        Value::Blob(b) => {
            out.push(TAG_BLOB);
            push_varint(out, b.len() as u64);
            out.extend_from_slice(b);
        }
        Value::Array(items) => {
            out.push(TAG_ARRAY);
            push_varint(out, items.len() as u64);
            for item in items {
                encode_value(item, out);
            }
        }
        Value::Object(fields) => {
            out.push(TAG_OBJECT);
            push_varint(out, fields.len() as u64);
            for (name, value) in fields {
                out.push(TAG_TEXT);
                push_varint(out, name.len() as u64);
                out.extend_from_slice(name.as_bytes());
                encode_value(value, out);
            }
        }
    }
}

fn encode_int(v: i64, out: &mut Vec<u8>) {
    if fixint_range().contains(&v) {
        out.push(TAG_FIXINT_BASE + (v + 32) as u8);
    } else if v < 0 {
        if v >= i8::MIN as i64 {
            out.push(TAG_INT_NEG8);
            push_int8(out, v);
        } else if v >= i16::MIN as i64 {
            out.push(TAG_INT_NEG16);
            push_int16(out, v);
        } else if v >= i32::MIN as i64 {
            out.push(TAG_INT_NEG32);
            push_int32(out, v);
        } else {
            out.push(TAG_INT_NEG64);
            push_int64(out, v);
        }
    } else if v <= i8::MAX as i64 {
        out.push(TAG_INT_POS8);
        push_int8(out, v);
    } else if v <= i16::MAX as i64 {
        out.push(TAG_INT_POS16);
        push_int16(out, v);
    } else if v <= i32::MAX as i64 {
        out.push(TAG_INT_POS32);
        push_int32(out, v);
    } else {
        out.push(TAG_INT_POS64);
        push_int64(out, v);
    }
}

/// Encodes a standalone value (not part of a composite key).
pub fn encode(value: &Value) -> Vec<u8> {
    let mut out = Vec::new();
    encode_value(value, &mut out);
    out
}

/// Decodes one value from the front of `b`, returning the value and the
/// number of bytes consumed. Transparently un-inverts a DESC-encoded
/// value: the tag byte alone says which direction it was written in.
pub fn decode_value(b: &[u8]) -> CResult<(Value, usize)> {
    let raw_tag = *b.first().ok_or_else(|| Error::Internal("empty value".into()))?;
    let desc = raw_tag > TAG_MAX;
    let tag = if desc { !raw_tag } else { raw_tag };

    // For DESC values every remaining byte we touch must be un-inverted
    // before use; simplest is to materialize the un-inverted prefix we
    // need once we know its length, which we discover tag-by-tag below.
    let un = |n: usize| -> CResult<Vec<u8>> {
        let slice = b.get(1..1 + n).ok_or_else(|| Error::Internal("truncated value".into()))?;
        Ok(if desc { slice.iter().map(|x| !x).collect() } else { slice.to_vec() })
    };

    match tag {
        TAG_NULL => Ok((Value::Null, 1)),
        TAG_FALSE => Ok((Value::Boolean(false), 1)),
        TAG_TRUE => Ok((Value::Boolean(true), 1)),
        TAG_INT_NEG64 | TAG_INT_POS64 => {
            let bytes = un(8)?;
            Ok((Value::Integer(read_int64(&bytes)?), 9))
        }
        TAG_INT_NEG32 | TAG_INT_POS32 => {
            let bytes = un(4)?;
            Ok((Value::Integer(read_int32(&bytes)?), 5))
        }
        TAG_INT_NEG16 | TAG_INT_POS16 => {
            let bytes = un(2)?;
            Ok((Value::Integer(read_int16(&bytes)?), 3))
        }
        TAG_INT_NEG8 | TAG_INT_POS8 => {
            let bytes = un(1)?;
            Ok((Value::Integer(read_int8(&bytes)?), 2))
        }
        t if (TAG_FIXINT_BASE..TAG_FIXINT_BASE + TAG_FIXINT_COUNT).contains(&t) => {
            Ok((Value::Integer((t - TAG_FIXINT_BASE) as i64 - 32), 1))
        }
        TAG_TIMESTAMP => {
            let bytes = un(8)?;
            Ok((Value::Timestamp(read_int64(&bytes)?), 9))
        }
        TAG_FLOAT => {
            let bytes = un(8)?;
            let arr: [u8; 8] = bytes.try_into().unwrap();
            let raw = u64::from_be_bytes(arr);
            Ok((Value::Float(unsortable_float_bits(raw)), 9))
        }
        TAG_TEXT => {
            let (len, len_bytes) = read_varint_maybe_desc(b, desc)?;
            let content = un_range(b, 1 + len_bytes, len as usize, desc)?;
            let s = String::from_utf8(content)?;
            Ok((Value::Text(s), 1 + len_bytes + len as usize))
        }
        TAG_BLOB => {
            let (len, len_bytes) = read_varint_maybe_desc(b, desc)?;
            let content = un_range(b, 1 + len_bytes, len as usize, desc)?;
            Ok((Value::Blob(content), 1 + len_bytes + len as usize))
        }
        TAG_ARRAY => {
            let (count, len_bytes) = read_varint_maybe_desc(b, desc)?;
            let mut pos = 1 + len_bytes;
            let mut items = Vec::with_capacity(count as usize);
            for _ in 0..count {
                let remaining = un_from(b, pos, desc);
                let (v, consumed) = decode_value(&remaining)?;
                items.push(v);
                pos += consumed;
            }
            Ok((Value::Array(items), pos))
        }
        TAG_OBJECT => {
            let (count, len_bytes) = read_varint_maybe_desc(b, desc)?;
            let mut pos = 1 + len_bytes;
            let mut fields = Vec::with_capacity(count as usize);
            for _ in 0..count {
                let remaining = un_from(b, pos, desc);
                let (name_val, name_len) = decode_value(&remaining)?;
                pos += name_len;
                let name = match name_val {
                    Value::Text(s) => s,
                    _ => return Err(Error::Internal("object field name must be text".into())),
                };
                let remaining = un_from(b, pos, desc);
                let (v, consumed) = decode_value(&remaining)?;
                pos += consumed;
                fields.push((name, v));
            }
            Ok((Value::Object(fields), pos))
        }
        _ => Err(Error::Internal(format!("unknown value tag {}", tag))),
    }
}

/// Un-inverts (if `desc`) the `n`-byte varint starting at `b[1..]` and
/// reads it, returning `(value, bytes_consumed)`.
fn read_varint_maybe_desc(b: &[u8], desc: bool) -> CResult<(u64, usize)> {
    let tail = un_from(b, 1, desc);
    read_varint(&tail)
}

/// Returns `b[from..]`, un-inverted byte-by-byte if `desc`.
fn un_from(b: &[u8], from: usize, desc: bool) -> Vec<u8> {
    let slice = &b[from.min(b.len())..];
    if desc { slice.iter().map(|x| !x).collect() } else { slice.to_vec() }
}

/// Un-inverts (if `desc`) `len` bytes starting at `from`.
fn un_range(b: &[u8], from: usize, len: usize, desc: bool) -> CResult<Vec<u8>> {
    let slice = b
        .get(from..from + len)
        .ok_or_else(|| Error::Internal("truncated value".into()))?;
    Ok(if desc { slice.iter().map(|x| !x).collect() } else { slice.to_vec() })
}

/// A composite key: an ordered tuple of values plus the per-position
/// sort direction that was (or will be) used to encode it.
#[derive(Debug, Clone, PartialEq)]
pub struct Key(pub Vec<Value>);

impl Key {
    pub fn new(values: Vec<Value>) -> Self {
        Key(values)
    }

    /// Encodes `namespace` (an unsigned varint) followed by each value in
    /// turn, bit-inverting the n-th value's bytes when `order[n]` is
    /// `Desc`. If `order` is shorter than the key, trailing values default
    /// to `Asc`.
    pub fn encode(&self, namespace: u64, order: &[SortDirection]) -> Vec<u8> {
        let mut out = Vec::new();
        push_varint(&mut out, namespace);
        for (i, value) in self.0.iter().enumerate() {
            let dir = order.get(i).copied().unwrap_or(SortDirection::Asc);
            let mut buf = Vec::new();
            encode_value(value, &mut buf);
            if dir.is_desc() {
                for b in &mut buf {
                    *b = !*b;
                }
            }
            out.extend_from_slice(&buf);
        }
        out
    }

    /// Decodes a full key (namespace + values) previously produced by
    /// [`Key::encode`]. Each value is self-describing (tag encodes
    /// direction), so no order vector is required to decode, only to
    /// re-encode.
    pub fn decode(bytes: &[u8]) -> CResult<(u64, Key)> {
        let (namespace, mut pos) = read_varint(bytes)?;
        let mut values = Vec::new();
        while pos < bytes.len() {
            let (value, consumed) = decode_value(&bytes[pos..])?;
            values.push(value);
            pos += consumed;
        }
        Ok((namespace, Key(values)))
    }
}

/// `Compare(a, b)`: the sign of the logical ordering of two encoded
/// values/keys. Because every encoding (including DESC inversion) is
/// constructed so that plain byte-wise comparison matches logical order,
/// this is exactly `Ord::cmp` on the byte slices.
pub fn compare(a: &[u8], b: &[u8]) -> Ordering {
    a.cmp(b)
}

/// `Skip(b)`: the length in bytes of the single encoded value starting
/// at `b[0]`, without fully decoding it. Used by the engine to seek past
/// values in a composite key.
pub fn skip(b: &[u8]) -> CResult<usize> {
    decode_value(b).map(|(_, len)| len)
}

/// `Successor(ns)`: a key strictly greater than every key in namespace
/// `ns`, used to bound a namespace-wide scan. Appends an all-0xFF varint
/// continuation byte, which cannot be a valid prefix of any
/// normally-encoded namespace varint (those terminate as soon as their
/// high bit is clear).
pub fn successor(namespace: u64) -> Vec<u8> {
    let mut out = Vec::new();
    push_varint(&mut out, namespace);
    out.push(0xff);
    out
}

/// `AbbreviatedKey(k)`: a 64-bit summary for indexed-batch comparisons
/// (an optional, backend-chosen compatibility detail -- §9 Open
/// Questions). Top 16 bits: namespace; next 8 bits: first value's type
/// tag; bottom 40 bits: a value-specific prefix of its payload. Equal
/// abbreviated keys must fall back to a full [`compare`].
pub fn abbreviated_key(k: &[u8]) -> u64 {
    let (namespace, pos) = match read_varint(k) {
        Ok(v) => v,
        Err(_) => return 0,
    };
    let tag = k.get(pos).copied().unwrap_or(0);
    let mut prefix: u64 = 0;
    for i in 0..5 {
        prefix <<= 8;
        prefix |= *k.get(pos + 1 + i).unwrap_or(&0) as u64;
    }
    ((namespace & 0xffff) << 48) | ((tag as u64) << 40) | prefix
}

/// `Separator(a, b)`: a minimal byte string strictly between `a` and `b`
/// (`a < result <= b`), used by backends for block-level compaction.
/// Returns `None` when `a >= b` or no separator is needed (`a` is already
/// a prefix relationship that can't be shortened).
pub fn separator(a: &[u8], b: &[u8]) -> Option<Vec<u8>> {
    if a >= b {
        return None;
    }
    let mut common = 0;
    while common < a.len() && common < b.len() && a[common] == b[common] {
        common += 1;
    }
    if common == a.len() {
        // a is a strict prefix of b; nothing shorter than b itself works
        // except extending a by one byte of b if that's already < b.
        return Some(b[..common + 1].to_vec());
    }
    let mut sep = b[..=common].to_vec();
    if sep[common] > 0 {
        sep[common] -= 1;
        // sep is now a prefix strictly between a and b as long as it's > a,
        // which holds because a[common] < b[common] (since a < b and the
        // prefixes up to `common` matched).
        Some(sep)
    } else {
        // b[common] == 0, can't decrement; fall back to b truncated one
        // byte further in, or b itself if that's not possible.
        Some(b[..common + 1].to_vec())
    }
}

/// Compares two values by the "logical order" this encoding establishes:
/// numeric cross-type comparison for Integer/Float/Timestamp, and
/// length-then-content for Text/Blob/Array/Object (the "shared prefix
/// rule" from §4.1, a direct consequence of length-prefixing).
pub fn logical_compare(a: &Value, b: &Value) -> Option<Ordering> {
    use Value::*;
    match (a, b) {
        (Null, Null) => Some(Ordering::Equal),
        (Boolean(x), Boolean(y)) => Some(x.cmp(y)),
        (Integer(x), Integer(y)) => Some(x.cmp(y)),
        (Timestamp(x), Timestamp(y)) => Some(x.cmp(y)),
        (Integer(x), Float(y)) => (*x as f64).partial_cmp(y),
        (Float(x), Integer(y)) => x.partial_cmp(&(*y as f64)),
        (Float(x), Float(y)) => x.partial_cmp(y),
        (Text(x), Text(y)) => Some(x.len().cmp(&y.len()).then_with(|| x.cmp(y))),
        (Blob(x), Blob(y)) => Some(x.len().cmp(&y.len()).then_with(|| x.cmp(y))),
        (Array(x), Array(y)) => Some(x.len().cmp(&y.len()).then_with(|| {
            for (xi, yi) in x.iter().zip(y.iter()) {
                match logical_compare(xi, yi) {
                    Some(Ordering::Equal) => continue,
                    Some(ord) => return ord,
                    None => return Ordering::Equal,
                }
            }
            Ordering::Equal
        })),
        _ => None,
    }
}
