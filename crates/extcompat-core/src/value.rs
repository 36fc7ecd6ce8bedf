//! # Field Values
//!
//! [`Value`] is the in-memory form of one field's contents on a
//! [`crate::DynamicMessage`]. This module also holds the per-type scalar
//! codec: zigzag for `sint*`, little-endian for fixed widths, sign-extension
//! of negative `int32` to ten bytes, as the wire format requires.

use bytes::{Buf, BufMut};
use prost::encoding::{decode_varint, encode_varint, encoded_len_varint};
use serde_json::Value as Json;

use crate::descriptor::{FieldDescriptor, FieldType};
use crate::error::{FieldError, WireError};

/// One field's value. Repeated fields hold a [`Value::List`].
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    I32(i32),
    I64(i64),
    U32(u32),
    U64(u64),
    Bool(bool),
    F32(f32),
    F64(f64),
    String(String),
    Bytes(Vec<u8>),
    List(Vec<Value>),
}

impl Value {
    /// Short kind name used in error messages.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::I32(_) => "i32",
            Self::I64(_) => "i64",
            Self::U32(_) => "u32",
            Self::U64(_) => "u64",
            Self::Bool(_) => "bool",
            Self::F32(_) => "f32",
            Self::F64(_) => "f64",
            Self::String(_) => "string",
            Self::Bytes(_) => "bytes",
            Self::List(_) => "list",
        }
    }

    /// The value an absent singular field reads as.
    pub fn default_for(field_type: FieldType) -> Self {
        match field_type {
            FieldType::Int32 | FieldType::Sint32 | FieldType::Sfixed32 => Self::I32(0),
            FieldType::Int64 | FieldType::Sint64 | FieldType::Sfixed64 => Self::I64(0),
            FieldType::Uint32 | FieldType::Fixed32 => Self::U32(0),
            FieldType::Uint64 | FieldType::Fixed64 => Self::U64(0),
            FieldType::Bool => Self::Bool(false),
            FieldType::Float => Self::F32(0.0),
            FieldType::Double => Self::F64(0.0),
            FieldType::String => Self::String(String::new()),
            FieldType::Bytes => Self::Bytes(Vec::new()),
        }
    }

    /// Whether this value is a valid scalar for `field_type`.
    pub fn matches(&self, field_type: FieldType) -> bool {
        matches!(
            (self, field_type),
            (Self::I32(_), FieldType::Int32 | FieldType::Sint32 | FieldType::Sfixed32)
                | (Self::I64(_), FieldType::Int64 | FieldType::Sint64 | FieldType::Sfixed64)
                | (Self::U32(_), FieldType::Uint32 | FieldType::Fixed32)
                | (Self::U64(_), FieldType::Uint64 | FieldType::Fixed64)
                | (Self::Bool(_), FieldType::Bool)
                | (Self::F32(_), FieldType::Float)
                | (Self::F64(_), FieldType::Double)
                | (Self::String(_), FieldType::String)
                | (Self::Bytes(_), FieldType::Bytes)
        )
    }

    /// Check that this value can be stored in `field`.
    pub fn check(&self, field: &FieldDescriptor) -> Result<(), FieldError> {
        let ok = match self {
            Self::List(items) => {
                field.is_repeated() && items.iter().all(|v| v.matches(field.field_type))
            }
            scalar => !field.is_repeated() && scalar.matches(field.field_type),
        };
        if ok {
            Ok(())
        } else {
            let expected = if field.is_repeated() {
                format!("list of {}", field.field_type)
            } else {
                field.field_type.to_string()
            };
            Err(FieldError::TypeMismatch {
                field: field.lookup_name().to_string(),
                expected,
                actual: self.kind().to_string(),
            })
        }
    }

    /// Convert a JSON or YAML literal into a value for `field`.
    ///
    /// Integers must fit the field's width. `bytes` fields take a hex string.
    /// Repeated fields take an array.
    pub fn from_json(json: &Json, field: &FieldDescriptor) -> Result<Self, FieldError> {
        if field.is_repeated() {
            let items = json.as_array().ok_or_else(|| mismatch(field, "array", json))?;
            return items
                .iter()
                .map(|item| scalar_from_json(item, field))
                .collect::<Result<Vec<_>, _>>()
                .map(Self::List);
        }
        scalar_from_json(json, field)
    }

    /// Render as JSON for reports. Bytes render as lowercase hex.
    pub fn to_json(&self) -> Json {
        match self {
            Self::I32(v) => Json::from(*v),
            Self::I64(v) => Json::from(*v),
            Self::U32(v) => Json::from(*v),
            Self::U64(v) => Json::from(*v),
            Self::Bool(v) => Json::from(*v),
            Self::F32(v) => Json::from(f64::from(*v)),
            Self::F64(v) => Json::from(*v),
            Self::String(v) => Json::from(v.as_str()),
            Self::Bytes(v) => Json::from(to_hex(v)),
            Self::List(items) => Json::Array(items.iter().map(Value::to_json).collect()),
        }
    }
}

fn mismatch(field: &FieldDescriptor, expected: &str, json: &Json) -> FieldError {
    FieldError::TypeMismatch {
        field: field.lookup_name().to_string(),
        expected: expected.to_string(),
        actual: json.to_string(),
    }
}

fn scalar_from_json(json: &Json, field: &FieldDescriptor) -> Result<Value, FieldError> {
    let ty = field.field_type;
    let bad = || mismatch(field, ty.as_str(), json);
    let value = match ty {
        FieldType::Int32 | FieldType::Sint32 | FieldType::Sfixed32 => json
            .as_i64()
            .and_then(|v| i32::try_from(v).ok())
            .map(Value::I32),
        FieldType::Int64 | FieldType::Sint64 | FieldType::Sfixed64 => {
            json.as_i64().map(Value::I64)
        }
        FieldType::Uint32 | FieldType::Fixed32 => json
            .as_u64()
            .and_then(|v| u32::try_from(v).ok())
            .map(Value::U32),
        FieldType::Uint64 | FieldType::Fixed64 => json.as_u64().map(Value::U64),
        FieldType::Bool => json.as_bool().map(Value::Bool),
        FieldType::Float => json.as_f64().map(|v| Value::F32(v as f32)),
        FieldType::Double => json.as_f64().map(Value::F64),
        FieldType::String => json.as_str().map(|s| Value::String(s.to_string())),
        FieldType::Bytes => json.as_str().and_then(from_hex).map(Value::Bytes),
    };
    value.ok_or_else(bad)
}

/// Lowercase hex rendering.
pub fn to_hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

/// Parse an even-length hex string.
pub fn from_hex(s: &str) -> Option<Vec<u8>> {
    if s.len() % 2 != 0 || !s.is_ascii() {
        return None;
    }
    (0..s.len())
        .step_by(2)
        .map(|i| u8::from_str_radix(&s[i..i + 2], 16).ok())
        .collect()
}

/// Encode one scalar (no key) in the representation of `field_type`.
///
/// The caller guarantees `value.matches(field_type)`; a mismatched value
/// writes nothing.
pub(crate) fn encode_scalar(value: &Value, field_type: FieldType, buf: &mut impl BufMut) {
    match (value, field_type) {
        // Negative int32 is sign-extended to 64 bits on the wire.
        (Value::I32(v), FieldType::Int32) => encode_varint(i64::from(*v) as u64, buf),
        (Value::I32(v), FieldType::Sint32) => encode_varint(u64::from(zigzag32(*v)), buf),
        (Value::I32(v), FieldType::Sfixed32) => buf.put_i32_le(*v),
        (Value::I64(v), FieldType::Int64) => encode_varint(*v as u64, buf),
        (Value::I64(v), FieldType::Sint64) => encode_varint(zigzag64(*v), buf),
        (Value::I64(v), FieldType::Sfixed64) => buf.put_i64_le(*v),
        (Value::U32(v), FieldType::Uint32) => encode_varint(u64::from(*v), buf),
        (Value::U32(v), FieldType::Fixed32) => buf.put_u32_le(*v),
        (Value::U64(v), FieldType::Uint64) => encode_varint(*v, buf),
        (Value::U64(v), FieldType::Fixed64) => buf.put_u64_le(*v),
        (Value::Bool(v), FieldType::Bool) => encode_varint(u64::from(*v), buf),
        (Value::F32(v), FieldType::Float) => buf.put_f32_le(*v),
        (Value::F64(v), FieldType::Double) => buf.put_f64_le(*v),
        (Value::String(v), FieldType::String) => {
            encode_varint(v.len() as u64, buf);
            buf.put_slice(v.as_bytes());
        }
        (Value::Bytes(v), FieldType::Bytes) => {
            encode_varint(v.len() as u64, buf);
            buf.put_slice(v);
        }
        _ => {}
    }
}

/// Encoded length of one scalar (no key).
pub(crate) fn scalar_len(value: &Value, field_type: FieldType) -> usize {
    match (value, field_type) {
        (Value::I32(v), FieldType::Int32) => encoded_len_varint(i64::from(*v) as u64),
        (Value::I32(v), FieldType::Sint32) => encoded_len_varint(u64::from(zigzag32(*v))),
        (Value::I64(v), FieldType::Int64) => encoded_len_varint(*v as u64),
        (Value::I64(v), FieldType::Sint64) => encoded_len_varint(zigzag64(*v)),
        (Value::U32(v), FieldType::Uint32) => encoded_len_varint(u64::from(*v)),
        (Value::U64(v), FieldType::Uint64) => encoded_len_varint(*v),
        (Value::Bool(_), FieldType::Bool) => 1,
        (Value::I32(_), FieldType::Sfixed32)
        | (Value::U32(_), FieldType::Fixed32)
        | (Value::F32(_), FieldType::Float) => 4,
        (Value::I64(_), FieldType::Sfixed64)
        | (Value::U64(_), FieldType::Fixed64)
        | (Value::F64(_), FieldType::Double) => 8,
        (Value::String(v), FieldType::String) => encoded_len_varint(v.len() as u64) + v.len(),
        (Value::Bytes(v), FieldType::Bytes) => encoded_len_varint(v.len() as u64) + v.len(),
        _ => 0,
    }
}

/// Decode one scalar (key already consumed) of `field`'s type.
pub(crate) fn decode_scalar(field: &FieldDescriptor, buf: &mut impl Buf) -> Result<Value, WireError> {
    let value = match field.field_type {
        // Truncation to 32 bits matches how int32/uint32 varints are read.
        FieldType::Int32 => Value::I32(decode_varint(buf)? as i32),
        FieldType::Int64 => Value::I64(decode_varint(buf)? as i64),
        FieldType::Uint32 => Value::U32(decode_varint(buf)? as u32),
        FieldType::Uint64 => Value::U64(decode_varint(buf)?),
        FieldType::Sint32 => Value::I32(unzigzag32(decode_varint(buf)? as u32)),
        FieldType::Sint64 => Value::I64(unzigzag64(decode_varint(buf)?)),
        FieldType::Bool => Value::Bool(decode_varint(buf)? != 0),
        FieldType::Fixed32 => Value::U32(take_fixed(field.number, 4, buf)?.get_u32_le()),
        FieldType::Sfixed32 => Value::I32(take_fixed(field.number, 4, buf)?.get_i32_le()),
        FieldType::Float => Value::F32(take_fixed(field.number, 4, buf)?.get_f32_le()),
        FieldType::Fixed64 => Value::U64(take_fixed(field.number, 8, buf)?.get_u64_le()),
        FieldType::Sfixed64 => Value::I64(take_fixed(field.number, 8, buf)?.get_i64_le()),
        FieldType::Double => Value::F64(take_fixed(field.number, 8, buf)?.get_f64_le()),
        FieldType::String => {
            let raw = take_length_delimited(field.number, buf)?;
            let s = String::from_utf8(raw).map_err(|_| WireError::InvalidUtf8 {
                field: field.lookup_name().to_string(),
            })?;
            Value::String(s)
        }
        FieldType::Bytes => Value::Bytes(take_length_delimited(field.number, buf)?),
    };
    Ok(value)
}

/// Ensure `len` bytes remain, then return the buffer for a fixed-width read.
fn take_fixed<B: Buf>(number: u32, len: usize, buf: &mut B) -> Result<&mut B, WireError> {
    if buf.remaining() < len {
        return Err(WireError::Truncated {
            number,
            needed: len,
            remaining: buf.remaining(),
        });
    }
    Ok(buf)
}

/// Read a varint length prefix and the bytes it covers.
pub(crate) fn take_length_delimited(number: u32, buf: &mut impl Buf) -> Result<Vec<u8>, WireError> {
    let len = decode_varint(buf)?;
    let remaining = buf.remaining();
    match usize::try_from(len) {
        Ok(len) if len <= remaining => {
            let mut out = vec![0u8; len];
            buf.copy_to_slice(&mut out);
            Ok(out)
        }
        _ => Err(WireError::Truncated {
            number,
            needed: usize::try_from(len).unwrap_or(usize::MAX),
            remaining,
        }),
    }
}

fn zigzag32(v: i32) -> u32 {
    ((v << 1) ^ (v >> 31)) as u32
}

fn zigzag64(v: i64) -> u64 {
    ((v << 1) ^ (v >> 63)) as u64
}

fn unzigzag32(v: u32) -> i32 {
    ((v >> 1) as i32) ^ -((v & 1) as i32)
}

fn unzigzag64(v: u64) -> i64 {
    ((v >> 1) as i64) ^ -((v & 1) as i64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::tests::field;
    use crate::descriptor::Label;

    fn encode(value: &Value, ty: FieldType) -> Vec<u8> {
        let mut buf = Vec::new();
        encode_scalar(value, ty, &mut buf);
        assert_eq!(buf.len(), scalar_len(value, ty));
        buf
    }

    #[test]
    fn test_zigzag_known_values() {
        assert_eq!(zigzag32(0), 0);
        assert_eq!(zigzag32(-1), 1);
        assert_eq!(zigzag32(1), 2);
        assert_eq!(zigzag32(i32::MIN), u32::MAX);
        assert_eq!(zigzag64(-2), 3);
        assert_eq!(unzigzag64(zigzag64(i64::MIN)), i64::MIN);
        assert_eq!(unzigzag32(3), -2);
    }

    #[test]
    fn test_negative_int32_is_ten_bytes() {
        let bytes = encode(&Value::I32(-1), FieldType::Int32);
        assert_eq!(bytes.len(), 10);
        let f = field("x", 1, FieldType::Int32, Label::Optional);
        assert_eq!(decode_scalar(&f, &mut bytes.as_slice()).unwrap(), Value::I32(-1));
    }

    #[test]
    fn test_known_encodings() {
        assert_eq!(encode(&Value::U32(150), FieldType::Uint32), vec![0x96, 0x01]);
        assert_eq!(encode(&Value::I64(-1), FieldType::Sint64), vec![0x01]);
        assert_eq!(encode(&Value::U32(1), FieldType::Fixed32), vec![1, 0, 0, 0]);
        assert_eq!(
            encode(&Value::String("x".into()), FieldType::String),
            vec![0x01, b'x']
        );
        assert_eq!(encode(&Value::Bool(true), FieldType::Bool), vec![0x01]);
    }

    #[test]
    fn test_truncated_fixed64() {
        let f = field("w", 101, FieldType::Double, Label::Optional);
        let err = decode_scalar(&f, &mut &[0u8, 1, 2][..]).unwrap_err();
        assert!(matches!(
            err,
            WireError::Truncated { number: 101, needed: 8, remaining: 3 }
        ));
    }

    #[test]
    fn test_length_prefix_past_end() {
        let f = field("name", 2, FieldType::String, Label::Optional);
        let err = decode_scalar(&f, &mut &[0x05u8, b'a'][..]).unwrap_err();
        assert!(matches!(err, WireError::Truncated { needed: 5, remaining: 1, .. }));
    }

    #[test]
    fn test_invalid_utf8() {
        let f = field("name", 2, FieldType::String, Label::Optional);
        let err = decode_scalar(&f, &mut &[0x02u8, 0xff, 0xfe][..]).unwrap_err();
        assert!(matches!(err, WireError::InvalidUtf8 { .. }));
    }

    #[test]
    fn test_from_json_ranges() {
        let f = field("id", 1, FieldType::Uint32, Label::Required);
        assert_eq!(Value::from_json(&serde_json::json!(1), &f).unwrap(), Value::U32(1));
        assert!(Value::from_json(&serde_json::json!(-1), &f).is_err());
        assert!(Value::from_json(&serde_json::json!(u64::from(u32::MAX) + 1), &f).is_err());
        assert!(Value::from_json(&serde_json::json!("1"), &f).is_err());
    }

    #[test]
    fn test_from_json_repeated_and_bytes() {
        let flags = field("flags", 3, FieldType::Sint64, Label::Repeated);
        assert_eq!(
            Value::from_json(&serde_json::json!([-1, 0, 1]), &flags).unwrap(),
            Value::List(vec![Value::I64(-1), Value::I64(0), Value::I64(1)])
        );
        assert!(Value::from_json(&serde_json::json!(1), &flags).is_err());

        let blob = field("blob", 111, FieldType::Bytes, Label::Optional);
        assert_eq!(
            Value::from_json(&serde_json::json!("cafe"), &blob).unwrap(),
            Value::Bytes(vec![0xca, 0xfe])
        );
        assert!(Value::from_json(&serde_json::json!("caf"), &blob).is_err());
        assert_eq!(Value::Bytes(vec![0xca, 0xfe]).to_json(), serde_json::json!("cafe"));
    }

    #[test]
    fn test_check_rejects_wrong_kind() {
        let f = field("id", 1, FieldType::Uint32, Label::Required);
        assert!(Value::U32(1).check(&f).is_ok());
        let err = Value::I32(1).check(&f).unwrap_err();
        assert_eq!(
            err,
            FieldError::TypeMismatch {
                field: "id".into(),
                expected: "uint32".into(),
                actual: "i32".into(),
            }
        );
        assert!(Value::List(vec![Value::U32(1)]).check(&f).is_err());
    }
}
