//! # extcompat-core: Wire Codec and Descriptor Model
//!
//! This crate is the foundation of the extcompat workspace. It owns the
//! proto2 wire codec, the descriptor model produced by the schema compiler,
//! and the dynamic message type that writers and readers build on. Every
//! other crate in the workspace depends on `extcompat-core`; it depends on
//! nothing internal.
//!
//! ## Key Design Principles
//!
//! 1. **Unknown fields are data.** A reader that does not know a field
//!    keeps its bytes in an [`UnknownFieldSet`] and writes them back out.
//!    Decoding never fails because a field number is unrecognized.
//!
//! 2. **Deterministic encoding.** [`DynamicMessage::encode_to_vec`] emits
//!    fields in ascending number order, interleaving unknown fields by
//!    number. Decode followed by encode reproduces canonical input exactly.
//!
//! 3. **Descriptors are plain data.** [`FileDescriptor`] and friends are
//!    serde types so compiled bindings can be persisted as JSON and hashed
//!    through [`CanonicalBytes`].
//!
//! ## Crate Policy
//!
//! - No dependencies on other `extcompat-*` crates.
//! - No `unsafe` code.
//! - No `panic!()` or `.unwrap()` outside tests.

pub mod canonical;
pub mod descriptor;
pub mod digest;
pub mod error;
pub mod message;
pub mod value;
pub mod wire;

// Re-export primary types for ergonomic imports.
pub use canonical::CanonicalBytes;
pub use descriptor::{
    DescriptorPool, ExtensionRange, FieldDescriptor, FieldType, FileDescriptor, Label,
    MessageDescriptor, MessageLayout,
};
pub use digest::{sha256_digest, sha256_hex, ContentDigest, DigestAlgorithm};
pub use error::{CanonicalizationError, DescriptorError, FieldError, WireError};
pub use message::DynamicMessage;
pub use value::Value;
pub use wire::{UnknownField, UnknownFieldSet, UnknownValue};
