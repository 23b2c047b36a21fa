//! KeyCode: a narrow, order-preserving `serde` codec for the engine's own
//! internal keys (MVCC's `Key`/`KeyPrefix`, catalog row keys). Unlike
//! [`super::Value`] this only needs to support what those enums actually
//! contain -- enum variant tags, `u64` versions, and raw byte strings --
//! so it rides the derived `Serialize`/`Deserialize` impls directly
//! rather than going through a tagged-union type.
//!
//! Encoding rules, chosen so that the byte order of the encoding matches
//! the derive order of the type:
//!
//! * An enum variant is encoded as its 0-based index as a single byte,
//!   followed by the encoding of its fields in order. Because serde
//!   visits variants in declaration order, and the byte for variant N
//!   sorts before N+1, two keys with different variants compare in
//!   variant-declaration order -- exactly the "must match the enum
//!   variant index" contract `KeyPrefix` depends on.
//! * `u64`/`u32`/`u16` are encoded big-endian, fixed-width, so unsigned
//!   numeric order matches byte order.
//! * `i64`/`i32` are encoded as `u64`/`u32` with the sign bit flipped,
//!   the same bias trick as [`super::encode_value`].
//! * Byte strings are escaped (`0x00` -> `0x00 0xff`) and terminated with
//!   `0x00 0x00`, so that a byte string followed by more fields never
//!   produces a prefix collision with a shorter byte string -- the classic
//!   order-preserving escaping scheme.
//! * Strings reuse the byte-string encoding over their UTF-8 bytes.

use crate::error::{CResult, Error};
use serde::{de, ser, Deserialize, Serialize};

pub struct Serializer {
    pub output: Vec<u8>,
}

impl Serializer {
    pub fn new() -> Self {
        Serializer { output: Vec::new() }
    }
}

pub fn serialize<T: Serialize>(value: &T) -> CResult<Vec<u8>> {
    let mut serializer = Serializer::new();
    value.serialize(&mut serializer)?;
    Ok(serializer.output)
}

pub fn deserialize<'a, T: Deserialize<'a>>(input: &'a [u8]) -> CResult<T> {
    let mut deserializer = Deserializer::new(input);
    T::deserialize(&mut deserializer)
}

impl ser::Error for Error {
    fn custom<T: std::fmt::Display>(msg: T) -> Self {
        Error::Internal(msg.to_string())
    }
}

impl de::Error for Error {
    fn custom<T: std::fmt::Display>(msg: T) -> Self {
        Error::Internal(msg.to_string())
    }
}

fn escape_bytes(bytes: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(bytes.len() + 2);
    for &b in bytes {
        if b == 0x00 {
            out.push(0x00);
            out.push(0xff);
        } else {
            out.push(b);
        }
    }
    out.push(0x00);
    out.push(0x00);
    out
}

fn unescape_bytes(input: &[u8]) -> CResult<(Vec<u8>, usize)> {
    let mut out = Vec::new();
    let mut i = 0;
    while i < input.len() {
        match input[i] {
            0x00 if input.get(i + 1) == Some(&0x00) => {
                return Ok((out, i + 2));
            }
            0x00 if input.get(i + 1) == Some(&0xff) => {
                out.push(0x00);
                i += 2;
            }
            b => {
                out.push(b);
                i += 1;
            }
        }
    }
    Err(Error::Internal("unterminated keycode byte string".into()))
}

impl<'a> ser::Serializer for &'a mut Serializer {
    type Ok = ();
    type Error = Error;
    type SerializeSeq = Self;
    type SerializeTuple = Self;
    type SerializeTupleStruct = Self;
    type SerializeTupleVariant = Self;
    type SerializeMap = ser::Impossible<(), Error>;
    type SerializeStruct = ser::Impossible<(), Error>;
    type SerializeStructVariant = ser::Impossible<(), Error>;

    fn serialize_bool(self, v: bool) -> CResult<()> {
        self.output.push(if v { 1 } else { 0 });
        Ok(())
    }

    fn serialize_i8(self, v: i8) -> CResult<()> {
        self.serialize_i64(v as i64)
    }
    fn serialize_i16(self, v: i16) -> CResult<()> {
        self.serialize_i64(v as i64)
    }
    fn serialize_i32(self, v: i32) -> CResult<()> {
        self.serialize_i64(v as i64)
    }
    fn serialize_i64(self, v: i64) -> CResult<()> {
        let biased = (v as u64) ^ 0x8000_0000_0000_0000;
        self.output.extend_from_slice(&biased.to_be_bytes());
        Ok(())
    }

    fn serialize_u8(self, v: u8) -> CResult<()> {
        self.output.push(v);
        Ok(())
    }
    fn serialize_u16(self, v: u16) -> CResult<()> {
        self.output.extend_from_slice(&v.to_be_bytes());
        Ok(())
    }
    fn serialize_u32(self, v: u32) -> CResult<()> {
        self.output.extend_from_slice(&v.to_be_bytes());
        Ok(())
    }
    fn serialize_u64(self, v: u64) -> CResult<()> {
        self.output.extend_from_slice(&v.to_be_bytes());
        Ok(())
    }

    fn serialize_f32(self, v: f32) -> CResult<()> {
        self.serialize_f64(v as f64)
    }
    fn serialize_f64(self, v: f64) -> CResult<()> {
        let bits = v.to_bits();
        let sortable = if bits >> 63 == 1 { !bits } else { bits | (1u64 << 63) };
        self.output.extend_from_slice(&sortable.to_be_bytes());
        Ok(())
    }

    fn serialize_char(self, v: char) -> CResult<()> {
        self.serialize_str(&v.to_string())
    }

    fn serialize_str(self, v: &str) -> CResult<()> {
        self.serialize_bytes(v.as_bytes())
    }

    fn serialize_bytes(self, v: &[u8]) -> CResult<()> {
        self.output.extend(escape_bytes(v));
        Ok(())
    }

    fn serialize_none(self) -> CResult<()> {
        self.output.push(0);
        Ok(())
    }
    fn serialize_some<T: ?Sized + Serialize>(self, value: &T) -> CResult<()> {
        self.output.push(1);
        value.serialize(self)
    }

    fn serialize_unit(self) -> CResult<()> {
        Ok(())
    }
    fn serialize_unit_struct(self, _name: &'static str) -> CResult<()> {
        Ok(())
    }

    fn serialize_unit_variant(
        self,
        _name: &'static str,
        variant_index: u32,
        _variant: &'static str,
    ) -> CResult<()> {
        self.output.push(variant_index as u8);
        Ok(())
    }

    fn serialize_newtype_struct<T: ?Sized + Serialize>(self, _name: &'static str, value: &T) -> CResult<()> {
        value.serialize(self)
    }

    fn serialize_newtype_variant<T: ?Sized + Serialize>(
        self,
        _name: &'static str,
        variant_index: u32,
        _variant: &'static str,
        value: &T,
    ) -> CResult<()> {
        self.output.push(variant_index as u8);
        value.serialize(self)
    }

    fn serialize_seq(self, _len: Option<usize>) -> CResult<Self::SerializeSeq> {
        Ok(self)
    }
    fn serialize_tuple(self, _len: usize) -> CResult<Self::SerializeTuple> {
        Ok(self)
    }
    fn serialize_tuple_struct(self, _name: &'static str, _len: usize) -> CResult<Self::SerializeTupleStruct> {
        Ok(self)
    }
    fn serialize_tuple_variant(
        self,
        _name: &'static str,
        variant_index: u32,
        _variant: &'static str,
        _len: usize,
    ) -> CResult<Self::SerializeTupleVariant> {
        self.output.push(variant_index as u8);
        Ok(self)
    }
    fn serialize_map(self, _len: Option<usize>) -> CResult<Self::SerializeMap> {
        Err(Error::Internal("keycode does not support maps".into()))
    }
    fn serialize_struct(self, _name: &'static str, _len: usize) -> CResult<Self::SerializeStruct> {
        Err(Error::Internal("keycode does not support structs".into()))
    }
    fn serialize_struct_variant(
        self,
        _name: &'static str,
        _variant_index: u32,
        _variant: &'static str,
        _len: usize,
    ) -> CResult<Self::SerializeStructVariant> {
        Err(Error::Internal("keycode does not support struct variants".into()))
    }
}

impl<'a> ser::SerializeSeq for &'a mut Serializer {
    type Ok = ();
    type Error = Error;
    fn serialize_element<T: ?Sized + Serialize>(&mut self, value: &T) -> CResult<()> {
        value.serialize(&mut **self)
    }
    fn end(self) -> CResult<()> {
        Ok(())
    }
}
impl<'a> ser::SerializeTuple for &'a mut Serializer {
    type Ok = ();
    type Error = Error;
    fn serialize_element<T: ?Sized + Serialize>(&mut self, value: &T) -> CResult<()> {
        value.serialize(&mut **self)
    }
    fn end(self) -> CResult<()> {
        Ok(())
    }
}
impl<'a> ser::SerializeTupleStruct for &'a mut Serializer {
    type Ok = ();
    type Error = Error;
    fn serialize_field<T: ?Sized + Serialize>(&mut self, value: &T) -> CResult<()> {
        value.serialize(&mut **self)
    }
    fn end(self) -> CResult<()> {
        Ok(())
    }
}
impl<'a> ser::SerializeTupleVariant for &'a mut Serializer {
    type Ok = ();
    type Error = Error;
    fn serialize_field<T: ?Sized + Serialize>(&mut self, value: &T) -> CResult<()> {
        value.serialize(&mut **self)
    }
    fn end(self) -> CResult<()> {
        Ok(())
    }
}

pub struct Deserializer<'de> {
    input: &'de [u8],
}

impl<'de> Deserializer<'de> {
    pub fn new(input: &'de [u8]) -> Self {
        Deserializer { input }
    }

    fn take_bytes(&mut self, n: usize) -> CResult<&'de [u8]> {
        if self.input.len() < n {
            return Err(Error::Internal("truncated keycode input".into()));
        }
        let (head, tail) = self.input.split_at(n);
        self.input = tail;
        Ok(head)
    }

    fn take_escaped(&mut self) -> CResult<Vec<u8>> {
        let (bytes, consumed) = unescape_bytes(self.input)?;
        self.input = &self.input[consumed..];
        Ok(bytes)
    }
}

macro_rules! deserialize_fixed {
    ($self:ident, $n:literal, $ty:ty) => {{
        let bytes = $self.take_bytes($n)?;
        let arr: [u8; $n] = bytes.try_into().unwrap();
        <$ty>::from_be_bytes(arr)
    }};
}

impl<'de, 'a> de::Deserializer<'de> for &'a mut Deserializer<'de> {
    type Error = Error;

    fn deserialize_any<V: de::Visitor<'de>>(self, _visitor: V) -> CResult<V::Value> {
        Err(Error::Internal("keycode is not self-describing".into()))
    }

    fn deserialize_bool<V: de::Visitor<'de>>(self, visitor: V) -> CResult<V::Value> {
        let b = self.take_bytes(1)?[0];
        visitor.visit_bool(b != 0)
    }

    fn deserialize_i8<V: de::Visitor<'de>>(self, visitor: V) -> CResult<V::Value> {
        visitor.visit_i8(self.deserialize_i64_raw()? as i8)
    }
    fn deserialize_i16<V: de::Visitor<'de>>(self, visitor: V) -> CResult<V::Value> {
        visitor.visit_i16(self.deserialize_i64_raw()? as i16)
    }
    fn deserialize_i32<V: de::Visitor<'de>>(self, visitor: V) -> CResult<V::Value> {
        visitor.visit_i32(self.deserialize_i64_raw()? as i32)
    }
    fn deserialize_i64<V: de::Visitor<'de>>(self, visitor: V) -> CResult<V::Value> {
        visitor.visit_i64(self.deserialize_i64_raw()?)
    }

    fn deserialize_u8<V: de::Visitor<'de>>(self, visitor: V) -> CResult<V::Value> {
        visitor.visit_u8(self.take_bytes(1)?[0])
    }
    fn deserialize_u16<V: de::Visitor<'de>>(self, visitor: V) -> CResult<V::Value> {
        visitor.visit_u16(deserialize_fixed!(self, 2, u16))
    }
    fn deserialize_u32<V: de::Visitor<'de>>(self, visitor: V) -> CResult<V::Value> {
        visitor.visit_u32(deserialize_fixed!(self, 4, u32))
    }
    fn deserialize_u64<V: de::Visitor<'de>>(self, visitor: V) -> CResult<V::Value> {
        visitor.visit_u64(deserialize_fixed!(self, 8, u64))
    }

    fn deserialize_f32<V: de::Visitor<'de>>(self, visitor: V) -> CResult<V::Value> {
        visitor.visit_f32(self.deserialize_f64_raw()? as f32)
    }
    fn deserialize_f64<V: de::Visitor<'de>>(self, visitor: V) -> CResult<V::Value> {
        visitor.visit_f64(self.deserialize_f64_raw()?)
    }

    fn deserialize_char<V: de::Visitor<'de>>(self, visitor: V) -> CResult<V::Value> {
        let bytes = self.take_escaped()?;
        let s = String::from_utf8(bytes)?;
        visitor.visit_char(s.chars().next().ok_or_else(|| Error::Internal("empty char".into()))?)
    }

    fn deserialize_str<V: de::Visitor<'de>>(self, visitor: V) -> CResult<V::Value> {
        let bytes = self.take_escaped()?;
        visitor.visit_string(String::from_utf8(bytes)?)
    }
    fn deserialize_string<V: de::Visitor<'de>>(self, visitor: V) -> CResult<V::Value> {
        self.deserialize_str(visitor)
    }

    fn deserialize_bytes<V: de::Visitor<'de>>(self, visitor: V) -> CResult<V::Value> {
        visitor.visit_byte_buf(self.take_escaped()?)
    }
    fn deserialize_byte_buf<V: de::Visitor<'de>>(self, visitor: V) -> CResult<V::Value> {
        self.deserialize_bytes(visitor)
    }

    fn deserialize_option<V: de::Visitor<'de>>(self, visitor: V) -> CResult<V::Value> {
        match self.take_bytes(1)?[0] {
            0 => visitor.visit_none(),
            _ => visitor.visit_some(self),
        }
    }

    fn deserialize_unit<V: de::Visitor<'de>>(self, visitor: V) -> CResult<V::Value> {
        visitor.visit_unit()
    }
    fn deserialize_unit_struct<V: de::Visitor<'de>>(self, _name: &'static str, visitor: V) -> CResult<V::Value> {
        visitor.visit_unit()
    }
    fn deserialize_newtype_struct<V: de::Visitor<'de>>(self, _name: &'static str, visitor: V) -> CResult<V::Value> {
        visitor.visit_newtype_struct(self)
    }

    fn deserialize_seq<V: de::Visitor<'de>>(self, visitor: V) -> CResult<V::Value> {
        visitor.visit_seq(self)
    }
    fn deserialize_tuple<V: de::Visitor<'de>>(self, _len: usize, visitor: V) -> CResult<V::Value> {
        visitor.visit_seq(self)
    }
    fn deserialize_tuple_struct<V: de::Visitor<'de>>(
        self,
        _name: &'static str,
        _len: usize,
        visitor: V,
    ) -> CResult<V::Value> {
        visitor.visit_seq(self)
    }

    fn deserialize_map<V: de::Visitor<'de>>(self, _visitor: V) -> CResult<V::Value> {
        Err(Error::Internal("keycode does not support maps".into()))
    }
    fn deserialize_struct<V: de::Visitor<'de>>(
        self,
        _name: &'static str,
        _fields: &'static [&'static str],
        _visitor: V,
    ) -> CResult<V::Value> {
        Err(Error::Internal("keycode does not support structs".into()))
    }

    fn deserialize_enum<V: de::Visitor<'de>>(
        self,
        _name: &'static str,
        _variants: &'static [&'static str],
        visitor: V,
    ) -> CResult<V::Value> {
        visitor.visit_enum(self)
    }

    fn deserialize_identifier<V: de::Visitor<'de>>(self, visitor: V) -> CResult<V::Value> {
        visitor.visit_u32(self.take_bytes(1)?[0] as u32)
    }

    fn deserialize_ignored_any<V: de::Visitor<'de>>(self, _visitor: V) -> CResult<V::Value> {
        Err(Error::Internal("keycode cannot ignore unknown fields".into()))
    }
}

impl<'de> Deserializer<'de> {
    fn deserialize_i64_raw(&mut self) -> CResult<i64> {
        let bytes = self.take_bytes(8)?;
        let arr: [u8; 8] = bytes.try_into().unwrap();
        let biased = u64::from_be_bytes(arr);
        Ok((biased ^ 0x8000_0000_0000_0000) as i64)
    }
    fn deserialize_f64_raw(&mut self) -> CResult<f64> {
        let bytes = self.take_bytes(8)?;
        let arr: [u8; 8] = bytes.try_into().unwrap();
        let bits = u64::from_be_bytes(arr);
        let orig = if bits >> 63 == 1 { bits & !(1u64 << 63) } else { !bits };
        Ok(f64::from_bits(orig))
    }
}

impl<'de, 'a> de::SeqAccess<'de> for &'a mut Deserializer<'de> {
    type Error = Error;
    fn next_element_seed<T: de::DeserializeSeed<'de>>(&mut self, seed: T) -> CResult<Option<T::Value>> {
        if self.input.is_empty() {
            return Ok(None);
        }
        seed.deserialize(&mut **self).map(Some)
    }
}

impl<'de, 'a> de::EnumAccess<'de> for &'a mut Deserializer<'de> {
    type Error = Error;
    type Variant = Self;
    fn variant_seed<V: de::DeserializeSeed<'de>>(self, seed: V) -> CResult<(V::Value, Self::Variant)> {
        let index = self.take_bytes(1)?[0] as u32;
        let value = seed.deserialize(index.into_deserializer())?;
        Ok((value, self))
    }
}

impl<'de, 'a> de::VariantAccess<'de> for &'a mut Deserializer<'de> {
    type Error = Error;
    fn unit_variant(self) -> CResult<()> {
        Ok(())
    }
    fn newtype_variant_seed<T: de::DeserializeSeed<'de>>(self, seed: T) -> CResult<T::Value> {
        seed.deserialize(self)
    }
    fn tuple_variant<V: de::Visitor<'de>>(self, _len: usize, visitor: V) -> CResult<V::Value> {
        visitor.visit_seq(self)
    }
    fn struct_variant<V: de::Visitor<'de>>(
        self,
        _name: &'static str,
        _fields: &'static [&'static str],
        visitor: V,
    ) -> CResult<V::Value> {
        visitor.visit_seq(self)
    }
}

use serde::de::IntoDeserializer;

#[cfg(test)]
mod tests {
    use super::*;
    use serde_derive::{Deserialize, Serialize};
    use std::borrow::Cow;

    #[derive(Debug, Serialize, Deserialize, PartialEq)]
    enum TestKey<'a> {
        A,
        B(u64),
        C(#[serde(with = "serde_bytes")] Cow<'a, [u8]>, u64),
    }

    #[test]
    fn roundtrip_unit_variant() {
        let key = TestKey::A;
        let bytes = serialize(&key).unwrap();
        let decoded: TestKey = deserialize(&bytes).unwrap();
        assert_eq!(decoded, key);
    }

    #[test]
    fn roundtrip_newtype_variant() {
        let key = TestKey::B(42);
        let bytes = serialize(&key).unwrap();
        let decoded: TestKey = deserialize(&bytes).unwrap();
        assert_eq!(decoded, key);
    }

    #[test]
    fn roundtrip_tuple_variant_with_bytes() {
        let key = TestKey::C(Cow::Borrowed(b"hello"), 7);
        let bytes = serialize(&key).unwrap();
        let decoded: TestKey = deserialize(&bytes).unwrap();
        assert_eq!(decoded, key);
    }

    #[test]
    fn variant_order_matches_tag_order() {
        let a = serialize(&TestKey::A).unwrap();
        let b = serialize(&TestKey::B(0)).unwrap();
        assert!(a < b);
    }

    #[test]
    fn u64_order_matches_byte_order() {
        let a = serialize(&TestKey::B(1)).unwrap();
        let b = serialize(&TestKey::B(2)).unwrap();
        assert!(a < b);
    }

    #[test]
    fn escaped_bytes_preserve_prefix_free_property() {
        let short = serialize(&TestKey::C(Cow::Borrowed(b"ab"), 1)).unwrap();
        let long = serialize(&TestKey::C(Cow::Borrowed(b"abc"), 1)).unwrap();
        assert!(short < long);
    }
}
