//! # Dynamic Messages
//!
//! A [`DynamicMessage`] is a message instance whose shape comes from a
//! [`MessageLayout`] at runtime rather than from generated structs. Writers
//! populate one and encode it; readers decode into one and inspect it.
//!
//! ## Decoding rules
//!
//! - Known number, matching wire type: singular fields keep the last value,
//!   repeated fields append. Repeated numeric fields accept packed and
//!   unpacked records interchangeably.
//! - Unknown number, or known number with the wrong wire type: the record
//!   goes to the unknown-field set untouched.
//! - After a full decode every `required` field must be present.
//!
//! ## Encoding rules
//!
//! Fields are written in ascending number order. Unknown fields are merged
//! into that order by number, after any known field with the same number.

use std::collections::BTreeMap;
use std::sync::Arc;

use bytes::{Buf, BufMut};
use prost::encoding::{decode_key, encode_key, encode_varint, encoded_len_varint, key_len, WireType};

use crate::descriptor::{FieldDescriptor, MessageLayout};
use crate::error::{FieldError, WireError};
use crate::value::{decode_scalar, encode_scalar, scalar_len, take_length_delimited, Value};
use crate::wire::{UnknownField, UnknownFieldSet};

/// A message instance backed by a runtime layout.
#[derive(Debug, Clone, PartialEq)]
pub struct DynamicMessage {
    layout: Arc<MessageLayout>,
    fields: BTreeMap<u32, Value>,
    unknown: UnknownFieldSet,
}

impl DynamicMessage {
    /// An empty message: every field absent, no unknown fields.
    pub fn new(layout: Arc<MessageLayout>) -> Self {
        Self {
            layout,
            fields: BTreeMap::new(),
            unknown: UnknownFieldSet::new(),
        }
    }

    /// Decode a complete message and check required fields.
    pub fn decode(layout: Arc<MessageLayout>, mut buf: impl Buf) -> Result<Self, WireError> {
        let mut message = Self::new(layout);
        message.merge(&mut buf)?;
        message.check_required()?;
        Ok(message)
    }

    /// Merge every record in `buf` into this message.
    ///
    /// Does not check required fields; a message may be assembled from
    /// several partial buffers.
    fn merge(&mut self, buf: &mut impl Buf) -> Result<(), WireError> {
        let layout = Arc::clone(&self.layout);
        while buf.has_remaining() {
            let (number, wire_type) = decode_key(buf)?;
            match layout.field(number) {
                Some(field) if accepts(field, wire_type) => self.merge_field(field, wire_type, buf)?,
                Some(field) => {
                    tracing::trace!(
                        field = field.lookup_name(),
                        number,
                        ?wire_type,
                        "wire type mismatch, keeping record as unknown"
                    );
                    self.unknown.push(UnknownField::decode(number, wire_type, buf)?);
                }
                None => {
                    tracing::trace!(number, ?wire_type, "preserving unknown field");
                    self.unknown.push(UnknownField::decode(number, wire_type, buf)?);
                }
            }
        }
        Ok(())
    }

    fn merge_field(
        &mut self,
        field: &FieldDescriptor,
        wire_type: WireType,
        buf: &mut impl Buf,
    ) -> Result<(), WireError> {
        if !field.is_repeated() {
            let value = decode_scalar(field, buf)?;
            self.fields.insert(field.number, value);
            return Ok(());
        }

        let mut decoded = Vec::new();
        if wire_type == WireType::LengthDelimited && field.field_type.is_packable() {
            let raw = take_length_delimited(field.number, buf)?;
            let mut packed = raw.as_slice();
            while packed.has_remaining() {
                decoded.push(decode_scalar(field, &mut packed)?);
            }
        } else {
            decoded.push(decode_scalar(field, buf)?);
        }
        // An empty packed record carries no elements; the field stays absent.
        if decoded.is_empty() {
            return Ok(());
        }

        match self
            .fields
            .entry(field.number)
            .or_insert_with(|| Value::List(Vec::new()))
        {
            Value::List(items) => items.extend(decoded),
            other => *other = Value::List(decoded),
        }
        Ok(())
    }

    /// Fail if any `required` field is absent.
    fn check_required(&self) -> Result<(), WireError> {
        match self
            .layout
            .fields()
            .find(|f| f.is_required() && !self.fields.contains_key(&f.number))
        {
            Some(missing) => Err(WireError::MissingRequired {
                message: self.layout.full_name().to_string(),
                field: missing.lookup_name().to_string(),
            }),
            None => Ok(()),
        }
    }

    pub fn layout(&self) -> &Arc<MessageLayout> {
        &self.layout
    }

    fn descriptor(&self, name: &str) -> Result<&FieldDescriptor, FieldError> {
        self.layout
            .field_by_name(name)
            .ok_or_else(|| FieldError::UnknownField {
                message: self.layout.full_name().to_string(),
                name: name.to_string(),
            })
    }

    /// Assign a field. Regular fields use their short name, extensions
    /// their full name. An empty list clears a repeated field.
    pub fn set(&mut self, name: &str, value: Value) -> Result<(), FieldError> {
        let field = self.descriptor(name)?;
        value.check(field)?;
        let number = field.number;
        match value {
            Value::List(items) if items.is_empty() => {
                self.fields.remove(&number);
            }
            value => {
                self.fields.insert(number, value);
            }
        }
        Ok(())
    }

    /// The stored value, or `None` if absent or not a known name.
    pub fn get(&self, name: &str) -> Option<&Value> {
        let field = self.layout.field_by_name(name)?;
        self.fields.get(&field.number)
    }

    /// The stored value, or the type's default (empty list for repeated).
    pub fn get_or_default(&self, name: &str) -> Result<Value, FieldError> {
        let field = self.descriptor(name)?;
        Ok(match self.fields.get(&field.number) {
            Some(value) => value.clone(),
            None if field.is_repeated() => Value::List(Vec::new()),
            None => Value::default_for(field.field_type),
        })
    }

    pub fn has(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// Present known fields with their descriptors, ascending by number.
    pub fn present_fields(&self) -> impl Iterator<Item = (&FieldDescriptor, &Value)> {
        self.fields
            .iter()
            .filter_map(|(number, value)| self.layout.field(*number).map(|f| (f, value)))
    }

    pub fn unknown_fields(&self) -> &UnknownFieldSet {
        &self.unknown
    }

    /// Write the message in canonical field order.
    pub fn encode(&self, buf: &mut impl BufMut) {
        let mut pending = self.unknown.sorted().into_iter().peekable();
        for (field, value) in self.present_fields() {
            while let Some(unknown) = pending.next_if(|u| u.number < field.number) {
                unknown.encode(buf);
            }
            encode_field(field, value, buf);
        }
        for unknown in pending {
            unknown.encode(buf);
        }
    }

    pub fn encode_to_vec(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(self.encoded_len());
        self.encode(&mut buf);
        buf
    }

    pub fn encoded_len(&self) -> usize {
        let known: usize = self
            .present_fields()
            .map(|(field, value)| field_len(field, value))
            .sum();
        let unknown: usize = self.unknown.iter().map(UnknownField::encoded_len).sum();
        known + unknown
    }
}

fn accepts(field: &FieldDescriptor, wire_type: WireType) -> bool {
    wire_type == field.field_type.wire_type()
        || (field.is_repeated()
            && field.field_type.is_packable()
            && wire_type == WireType::LengthDelimited)
}

fn encode_field(field: &FieldDescriptor, value: &Value, buf: &mut impl BufMut) {
    let ty = field.field_type;
    match value {
        Value::List(items) if field.packed => {
            if items.is_empty() {
                return;
            }
            let body: usize = items.iter().map(|v| scalar_len(v, ty)).sum();
            encode_key(field.number, WireType::LengthDelimited, buf);
            encode_varint(body as u64, buf);
            for item in items {
                encode_scalar(item, ty, buf);
            }
        }
        Value::List(items) => {
            for item in items {
                encode_key(field.number, ty.wire_type(), buf);
                encode_scalar(item, ty, buf);
            }
        }
        scalar => {
            encode_key(field.number, ty.wire_type(), buf);
            encode_scalar(scalar, ty, buf);
        }
    }
}

fn field_len(field: &FieldDescriptor, value: &Value) -> usize {
    let ty = field.field_type;
    let key = key_len(field.number);
    match value {
        Value::List(items) if field.packed => {
            if items.is_empty() {
                return 0;
            }
            let body: usize = items.iter().map(|v| scalar_len(v, ty)).sum();
            key + encoded_len_varint(body as u64) + body
        }
        Value::List(items) => items.iter().map(|v| key + scalar_len(v, ty)).sum(),
        scalar => key + scalar_len(scalar, ty),
    }
}
