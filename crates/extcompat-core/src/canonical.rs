//! # Canonical Serialization: RFC 8785 Byte Production
//!
//! `CanonicalBytes` is the only input accepted by the digest functions in
//! [`crate::digest`]. Compiled schema bindings are hashed through it, so two
//! compilations of the same sources always produce the same digest no matter
//! how serde happened to order map keys.
//!
//! ## Rules
//!
//! 1. **Reject floats.** Descriptor documents hold only integers, strings,
//!    booleans and nulls. A float signals a malformed document.
//! 2. **Sorted keys, compact separators.** Serialization goes through
//!    `serde_jcs`.

use serde::Serialize;
use serde_json::Value;

use crate::error::CanonicalizationError;

/// Bytes produced by JCS canonicalization of a float-free JSON document.
///
/// # Invariants
///
/// - The only constructor is `CanonicalBytes::new()`.
/// - Object keys are sorted; separators are compact.
/// - No float appears anywhere in the document.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CanonicalBytes(Vec<u8>);

impl CanonicalBytes {
    /// Canonicalize any serializable value.
    ///
    /// # Errors
    ///
    /// Returns `CanonicalizationError::FloatRejected` if the value contains a
    /// non-integral number, or `SerializationFailed` if serde fails.
    pub fn new(obj: &impl Serialize) -> Result<Self, CanonicalizationError> {
        let value = serde_json::to_value(obj)?;
        reject_floats(&value)?;
        let s = serde_jcs::to_string(&value)?;
        Ok(Self(s.into_bytes()))
    }

    /// Access the canonical bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Returns the length of the canonical byte sequence.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns true if the canonical byte sequence is empty.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl AsRef<[u8]> for CanonicalBytes {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

fn reject_floats(value: &Value) -> Result<(), CanonicalizationError> {
    match value {
        Value::Null | Value::Bool(_) | Value::String(_) => Ok(()),
        Value::Number(n) => {
            if n.is_f64() {
                if let Some(f) = n.as_f64() {
                    return Err(CanonicalizationError::FloatRejected(f));
                }
            }
            Ok(())
        }
        Value::Object(map) => map.values().try_for_each(reject_floats),
        Value::Array(arr) => arr.iter().try_for_each(reject_floats),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_keys_are_sorted() {
        let data = serde_json::json!({"number": 100, "name": "tag", "extendee": "xcompat.Envelope"});
        let cb = CanonicalBytes::new(&data).unwrap();
        assert_eq!(
            std::str::from_utf8(cb.as_bytes()).unwrap(),
            r#"{"extendee":"xcompat.Envelope","name":"tag","number":100}"#
        );
    }

    #[test]
    fn test_nested_descriptor_shape() {
        let data = serde_json::json!({
            "messages": [{"name": "Envelope", "ranges": [{"start": 100, "end": 199}]}],
            "package": "xcompat"
        });
        let cb = CanonicalBytes::new(&data).unwrap();
        assert_eq!(
            std::str::from_utf8(cb.as_bytes()).unwrap(),
            r#"{"messages":[{"name":"Envelope","ranges":[{"end":199,"start":100}]}],"package":"xcompat"}"#
        );
    }

    #[test]
    fn test_float_rejected_anywhere() {
        let data = serde_json::json!({"fields": [{"default": 2.5}]});
        match CanonicalBytes::new(&data) {
            Err(CanonicalizationError::FloatRejected(f)) => assert_eq!(f, 2.5),
            other => panic!("expected FloatRejected, got {other:?}"),
        }
    }

    #[test]
    fn test_large_unsigned_accepted() {
        let data = serde_json::json!({"max": u64::MAX});
        let cb = CanonicalBytes::new(&data).unwrap();
        assert_eq!(cb.as_bytes(), br#"{"max":18446744073709551615}"#);
    }

    #[test]
    fn test_empty_object() {
        let cb = CanonicalBytes::new(&serde_json::json!({})).unwrap();
        assert_eq!(cb.as_bytes(), b"{}");
        assert!(!cb.is_empty());
        assert_eq!(cb.len(), 2);
    }
}
