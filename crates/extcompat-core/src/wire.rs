//! # Unknown Fields
//!
//! Fields a reader's layout does not describe are captured here verbatim,
//! keyed by field number and wire type, and written back on encode. This is
//! the property the compatibility matrix exists to check: an `ext2` reader
//! handed an `ext1` message must neither fail nor lose the `ext1` payload.
//!
//! Groups are captured as the raw bytes between the start and end markers.
//! Nesting is bounded by [`MAX_GROUP_DEPTH`].

use bytes::{Buf, BufMut};
use prost::encoding::{
    decode_key, decode_varint, encode_key, encode_varint, encoded_len_varint, key_len, WireType,
};

use crate::error::WireError;
use crate::value::take_length_delimited;

/// Deepest group nesting the decoder follows before giving up.
pub const MAX_GROUP_DEPTH: usize = 64;

/// Payload of one unknown field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UnknownValue {
    Varint(u64),
    Fixed64(u64),
    LengthDelimited(Vec<u8>),
    /// Raw bytes between the start- and end-group keys.
    Group(Vec<u8>),
    Fixed32(u32),
}

impl UnknownValue {
    pub fn wire_type(&self) -> WireType {
        match self {
            Self::Varint(_) => WireType::Varint,
            Self::Fixed64(_) => WireType::SixtyFourBit,
            Self::LengthDelimited(_) => WireType::LengthDelimited,
            Self::Group(_) => WireType::StartGroup,
            Self::Fixed32(_) => WireType::ThirtyTwoBit,
        }
    }
}

/// One field the reader's layout did not describe.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownField {
    pub number: u32,
    pub value: UnknownValue,
}

impl UnknownField {
    /// Read the payload for a key that has already been consumed.
    pub fn decode(number: u32, wire_type: WireType, buf: &mut impl Buf) -> Result<Self, WireError> {
        let value = match wire_type {
            WireType::Varint => UnknownValue::Varint(decode_varint(buf)?),
            WireType::SixtyFourBit => {
                ensure_remaining(number, 8, &*buf)?;
                UnknownValue::Fixed64(buf.get_u64_le())
            }
            WireType::ThirtyTwoBit => {
                ensure_remaining(number, 4, &*buf)?;
                UnknownValue::Fixed32(buf.get_u32_le())
            }
            WireType::LengthDelimited => {
                UnknownValue::LengthDelimited(take_length_delimited(number, buf)?)
            }
            WireType::StartGroup => UnknownValue::Group(capture_group(number, buf, 1)?),
            WireType::EndGroup => return Err(WireError::UnexpectedEndGroup { number }),
        };
        Ok(Self { number, value })
    }

    /// Write key and payload.
    pub fn encode(&self, buf: &mut impl BufMut) {
        encode_key(self.number, self.value.wire_type(), buf);
        match &self.value {
            UnknownValue::Varint(v) => encode_varint(*v, buf),
            UnknownValue::Fixed64(v) => buf.put_u64_le(*v),
            UnknownValue::Fixed32(v) => buf.put_u32_le(*v),
            UnknownValue::LengthDelimited(bytes) => {
                encode_varint(bytes.len() as u64, buf);
                buf.put_slice(bytes);
            }
            UnknownValue::Group(raw) => {
                buf.put_slice(raw);
                encode_key(self.number, WireType::EndGroup, buf);
            }
        }
    }

    pub fn encoded_len(&self) -> usize {
        let key = key_len(self.number);
        key + match &self.value {
            UnknownValue::Varint(v) => encoded_len_varint(*v),
            UnknownValue::Fixed64(_) => 8,
            UnknownValue::Fixed32(_) => 4,
            UnknownValue::LengthDelimited(bytes) => {
                encoded_len_varint(bytes.len() as u64) + bytes.len()
            }
            UnknownValue::Group(raw) => raw.len() + key,
        }
    }
}

/// Unknown fields of one message, in the order they were read.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UnknownFieldSet {
    fields: Vec<UnknownField>,
}

impl UnknownFieldSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, field: UnknownField) {
        self.fields.push(field);
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, UnknownField> {
        self.fields.iter()
    }

    /// Distinct field numbers present, ascending.
    pub fn numbers(&self) -> Vec<u32> {
        let mut numbers: Vec<u32> = self.fields.iter().map(|f| f.number).collect();
        numbers.sort_unstable();
        numbers.dedup();
        numbers
    }

    /// Fields ordered by number; equal numbers keep their read order.
    pub fn sorted(&self) -> Vec<&UnknownField> {
        let mut sorted: Vec<&UnknownField> = self.fields.iter().collect();
        sorted.sort_by_key(|f| f.number);
        sorted
    }
}

impl<'a> IntoIterator for &'a UnknownFieldSet {
    type Item = &'a UnknownField;
    type IntoIter = std::slice::Iter<'a, UnknownField>;

    fn into_iter(self) -> Self::IntoIter {
        self.fields.iter()
    }
}

fn ensure_remaining(number: u32, needed: usize, buf: &impl Buf) -> Result<(), WireError> {
    if buf.remaining() < needed {
        return Err(WireError::Truncated {
            number,
            needed,
            remaining: buf.remaining(),
        });
    }
    Ok(())
}

/// Copy the raw bytes of a group body up to its matching end key.
///
/// The matching end key is consumed but not included in the result.
fn capture_group(number: u32, buf: &mut impl Buf, depth: usize) -> Result<Vec<u8>, WireError> {
    if depth > MAX_GROUP_DEPTH {
        return Err(WireError::RecursionLimit {
            limit: MAX_GROUP_DEPTH,
        });
    }
    let mut raw = Vec::new();
    loop {
        if !buf.has_remaining() {
            return Err(WireError::UnterminatedGroup { number });
        }
        let (inner, wire_type) = decode_key(buf)?;
        if wire_type == WireType::EndGroup {
            if inner == number {
                return Ok(raw);
            }
            return Err(WireError::UnexpectedEndGroup { number: inner });
        }
        let field = if wire_type == WireType::StartGroup {
            UnknownField {
                number: inner,
                value: UnknownValue::Group(capture_group(inner, buf, depth + 1)?),
            }
        } else {
            UnknownField::decode(inner, wire_type, buf)?
        };
        field.encode(&mut raw);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decode_one(bytes: &[u8]) -> Result<UnknownField, WireError> {
        let mut buf = bytes;
        let (number, wire_type) = decode_key(&mut buf)?;
        let field = UnknownField::decode(number, wire_type, &mut buf)?;
        assert!(buf.is_empty(), "trailing bytes after unknown field");
        Ok(field)
    }

    fn reencode(field: &UnknownField) -> Vec<u8> {
        let mut out = Vec::new();
        field.encode(&mut out);
        assert_eq!(out.len(), field.encoded_len());
        out
    }

    #[test]
    fn test_each_wire_type_reencodes_verbatim() {
        let samples: [&[u8]; 4] = [
            &[0xa0, 0x06, 0x96, 0x01],                   // 100: varint 150
            &[0xa2, 0x06, 0x01, b'x'],                   // 100: "x"
            &[0xa9, 0x06, 0, 0, 0, 0, 0, 0, 0x04, 0x40], // 101: double 2.5
            &[0xf5, 0x06, 7, 0, 0, 0],                   // 110: fixed32 7
        ];
        for sample in samples {
            let field = decode_one(sample).unwrap();
            assert_eq!(reencode(&field), sample);
        }
    }

    #[test]
    fn test_group_captured_with_nesting() {
        // 120 start, [121 varint 1, 122 start, 122 end], 120 end
        let bytes = [0xc3, 0x07, 0xc8, 0x07, 0x01, 0xd3, 0x07, 0xd4, 0x07, 0xc4, 0x07];
        let field = decode_one(&bytes).unwrap();
        assert_eq!(field.number, 120);
        assert_eq!(
            field.value,
            UnknownValue::Group(vec![0xc8, 0x07, 0x01, 0xd3, 0x07, 0xd4, 0x07])
        );
        assert_eq!(reencode(&field), bytes);
    }

    #[test]
    fn test_mismatched_end_group() {
        // 120 start, 121 end
        let err = decode_one(&[0xc3, 0x07, 0xcc, 0x07]).unwrap_err();
        assert!(matches!(err, WireError::UnexpectedEndGroup { number: 121 }));
    }

    #[test]
    fn test_unterminated_group() {
        let err = decode_one(&[0xc3, 0x07, 0xc8, 0x07, 0x01]).unwrap_err();
        assert!(matches!(err, WireError::UnterminatedGroup { number: 120 }));
    }

    #[test]
    fn test_bare_end_group_rejected() {
        let err = decode_one(&[0xc4, 0x07]).unwrap_err();
        assert!(matches!(err, WireError::UnexpectedEndGroup { number: 120 }));
    }

    #[test]
    fn test_group_depth_limit() {
        let mut bytes = Vec::new();
        for _ in 0..=MAX_GROUP_DEPTH {
            encode_key(5, WireType::StartGroup, &mut bytes);
        }
        let err = decode_one(&bytes).unwrap_err();
        assert!(matches!(err, WireError::RecursionLimit { .. }));
    }

    #[test]
    fn test_truncated_fixed32() {
        let err = decode_one(&[0xf5, 0x06, 7, 0]).unwrap_err();
        assert!(matches!(err, WireError::Truncated { number: 110, needed: 4, remaining: 2 }));
    }

    #[test]
    fn test_sorted_is_stable() {
        let mut set = UnknownFieldSet::new();
        set.push(UnknownField { number: 110, value: UnknownValue::Varint(1) });
        set.push(UnknownField { number: 100, value: UnknownValue::Varint(2) });
        set.push(UnknownField { number: 110, value: UnknownValue::Varint(3) });
        let order: Vec<(u32, UnknownValue)> = set
            .sorted()
            .into_iter()
            .map(|f| (f.number, f.value.clone()))
            .collect();
        assert_eq!(
            order,
            vec![
                (100, UnknownValue::Varint(2)),
                (110, UnknownValue::Varint(1)),
                (110, UnknownValue::Varint(3)),
            ]
        );
        assert_eq!(set.numbers(), vec![100, 110]);
        assert_eq!(set.len(), 3);
    }
}
