//! # Descriptor Model
//!
//! Plain-data descriptions of messages, fields and extensions. The schema
//! compiler produces [`FileDescriptor`]s; a [`DescriptorPool`] links a file
//! closure together and hands out [`MessageLayout`]s, the resolved view of a
//! message (its own fields plus every extension the pool knows for it) that
//! [`crate::DynamicMessage`] encodes and decodes against.
//!
//! Two pools built from different closures give different layouts for the
//! same message. That difference is exactly what the compatibility matrix
//! exercises: an `ext2` reader's layout has no entry for field 100, so the
//! `ext1` tag lands in the unknown-field set instead of failing the decode.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::ops::RangeInclusive;
use std::str::FromStr;
use std::sync::Arc;

use prost::encoding::WireType;
use serde::{Deserialize, Serialize};

use crate::error::DescriptorError;

/// Largest field number the wire format can carry (2^29 - 1).
pub const MAX_FIELD_NUMBER: u32 = 536_870_911;

/// Field numbers reserved by the wire format implementation.
pub const RESERVED_NUMBERS: RangeInclusive<u32> = 19_000..=19_999;

/// Scalar type of a field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldType {
    Int32,
    Int64,
    Uint32,
    Uint64,
    Sint32,
    Sint64,
    Bool,
    Fixed32,
    Fixed64,
    Sfixed32,
    Sfixed64,
    Float,
    Double,
    String,
    Bytes,
}

impl FieldType {
    /// Every supported type, in declaration order.
    pub const ALL: [FieldType; 15] = [
        Self::Int32,
        Self::Int64,
        Self::Uint32,
        Self::Uint64,
        Self::Sint32,
        Self::Sint64,
        Self::Bool,
        Self::Fixed32,
        Self::Fixed64,
        Self::Sfixed32,
        Self::Sfixed64,
        Self::Float,
        Self::Double,
        Self::String,
        Self::Bytes,
    ];

    /// The wire type a single value of this type is encoded with.
    pub fn wire_type(self) -> WireType {
        match self {
            Self::Int32
            | Self::Int64
            | Self::Uint32
            | Self::Uint64
            | Self::Sint32
            | Self::Sint64
            | Self::Bool => WireType::Varint,
            Self::Fixed64 | Self::Sfixed64 | Self::Double => WireType::SixtyFourBit,
            Self::Fixed32 | Self::Sfixed32 | Self::Float => WireType::ThirtyTwoBit,
            Self::String | Self::Bytes => WireType::LengthDelimited,
        }
    }

    /// Whether repeated fields of this type may use packed encoding.
    pub fn is_packable(self) -> bool {
        !matches!(self, Self::String | Self::Bytes)
    }

    /// Returns the schema-language name of the type.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Int32 => "int32",
            Self::Int64 => "int64",
            Self::Uint32 => "uint32",
            Self::Uint64 => "uint64",
            Self::Sint32 => "sint32",
            Self::Sint64 => "sint64",
            Self::Bool => "bool",
            Self::Fixed32 => "fixed32",
            Self::Fixed64 => "fixed64",
            Self::Sfixed32 => "sfixed32",
            Self::Sfixed64 => "sfixed64",
            Self::Float => "float",
            Self::Double => "double",
            Self::String => "string",
            Self::Bytes => "bytes",
        }
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FieldType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| format!("unknown field type '{s}'"))
    }
}

/// Field cardinality.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Label {
    #[default]
    Optional,
    Required,
    Repeated,
}

/// A message field or an extension field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldDescriptor {
    /// Short name as declared.
    pub name: String,
    /// Fully qualified name. Extensions are addressed by this name.
    pub full_name: String,
    /// Field number on the wire.
    pub number: u32,
    /// Scalar type.
    #[serde(rename = "type")]
    pub field_type: FieldType,
    /// Cardinality.
    #[serde(default)]
    pub label: Label,
    /// Repeated numeric fields only: encode as a single packed record.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub packed: bool,
    /// Fully qualified name of the extended message, for extensions.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extendee: Option<String>,
}

impl FieldDescriptor {
    pub fn is_repeated(&self) -> bool {
        self.label == Label::Repeated
    }

    pub fn is_required(&self) -> bool {
        self.label == Label::Required
    }

    pub fn is_extension(&self) -> bool {
        self.extendee.is_some()
    }

    /// Name used to address the field on a dynamic message.
    pub fn lookup_name(&self) -> &str {
        if self.is_extension() {
            &self.full_name
        } else {
            &self.name
        }
    }
}

/// Inclusive range of field numbers reserved for extensions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtensionRange {
    pub start: u32,
    pub end: u32,
}

impl ExtensionRange {
    pub fn contains(&self, number: u32) -> bool {
        (self.start..=self.end).contains(&number)
    }

    pub fn overlaps(&self, other: &ExtensionRange) -> bool {
        self.start <= other.end && other.start <= self.end
    }
}

/// A message type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageDescriptor {
    /// Fully qualified name, e.g. `xcompat.Envelope`.
    pub full_name: String,
    #[serde(default)]
    pub fields: Vec<FieldDescriptor>,
    #[serde(default)]
    pub extension_ranges: Vec<ExtensionRange>,
}

impl MessageDescriptor {
    /// Whether `number` falls inside one of the declared extension ranges.
    pub fn accepts_extension(&self, number: u32) -> bool {
        self.extension_ranges.iter().any(|r| r.contains(number))
    }
}

/// One compiled schema source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileDescriptor {
    /// Source file name relative to its include path, e.g. `ext1.yaml`.
    pub name: String,
    pub package: String,
    /// Names of directly imported files.
    #[serde(default)]
    pub dependencies: Vec<String>,
    #[serde(default)]
    pub messages: Vec<MessageDescriptor>,
    #[serde(default)]
    pub extensions: Vec<FieldDescriptor>,
}

/// A linked set of files.
///
/// Files must be added in dependency order. Adding a file is atomic: on
/// error the pool is unchanged.
#[derive(Debug, Clone, Default)]
pub struct DescriptorPool {
    files: Vec<FileDescriptor>,
    messages: BTreeMap<String, MessageDescriptor>,
    /// extendee -> number -> extension
    extensions: BTreeMap<String, BTreeMap<u32, FieldDescriptor>>,
}

impl DescriptorPool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a pool from files given in dependency order.
    pub fn from_files(
        files: impl IntoIterator<Item = FileDescriptor>,
    ) -> Result<Self, DescriptorError> {
        let mut pool = Self::new();
        for file in files {
            pool.add_file(file)?;
        }
        Ok(pool)
    }

    /// Add a file whose dependencies are already in the pool.
    ///
    /// # Errors
    ///
    /// Fails on a duplicate file or message, a missing dependency, an
    /// unknown extendee, an extension number outside the extendee's ranges,
    /// or two extensions claiming the same number on one message.
    pub fn add_file(&mut self, file: FileDescriptor) -> Result<(), DescriptorError> {
        if self.files.iter().any(|f| f.name == file.name) {
            return Err(DescriptorError::DuplicateFile { name: file.name });
        }
        for dependency in &file.dependencies {
            if !self.files.iter().any(|f| &f.name == dependency) {
                return Err(DescriptorError::MissingDependency {
                    file: file.name.clone(),
                    dependency: dependency.clone(),
                });
            }
        }
        for (i, message) in file.messages.iter().enumerate() {
            let declared_earlier = file.messages[..i]
                .iter()
                .any(|m| m.full_name == message.full_name);
            if declared_earlier || self.messages.contains_key(&message.full_name) {
                return Err(DescriptorError::DuplicateMessage {
                    name: message.full_name.clone(),
                });
            }
        }
        for (i, extension) in file.extensions.iter().enumerate() {
            let extendee = extension.extendee.clone().unwrap_or_default();
            let target = file
                .messages
                .iter()
                .chain(self.messages.values())
                .find(|m| m.full_name == extendee)
                .ok_or_else(|| DescriptorError::UnknownExtendee {
                    extension: extension.full_name.clone(),
                    extendee: extendee.clone(),
                })?;
            if !target.accepts_extension(extension.number) {
                return Err(DescriptorError::OutOfRange {
                    extension: extension.full_name.clone(),
                    extendee,
                    number: extension.number,
                });
            }
            let existing = self
                .extensions
                .get(&extendee)
                .and_then(|by_number| by_number.get(&extension.number))
                .or_else(|| {
                    file.extensions[..i].iter().find(|e| {
                        e.extendee == extension.extendee && e.number == extension.number
                    })
                });
            if let Some(existing) = existing {
                return Err(DescriptorError::ExtensionConflict {
                    extendee,
                    number: extension.number,
                    existing: existing.full_name.clone(),
                    conflicting: extension.full_name.clone(),
                });
            }
        }

        for message in &file.messages {
            self.messages
                .insert(message.full_name.clone(), message.clone());
        }
        for extension in &file.extensions {
            let extendee = extension.extendee.clone().unwrap_or_default();
            self.extensions
                .entry(extendee)
                .or_default()
                .insert(extension.number, extension.clone());
        }
        self.files.push(file);
        Ok(())
    }

    /// Files in the order they were added.
    pub fn files(&self) -> &[FileDescriptor] {
        &self.files
    }

    pub fn message(&self, name: &str) -> Option<&MessageDescriptor> {
        self.messages.get(name)
    }

    /// Extensions registered for `extendee`, ascending by number.
    pub fn extensions_of<'a>(
        &'a self,
        extendee: &str,
    ) -> impl Iterator<Item = &'a FieldDescriptor> + 'a {
        self.extensions
            .get(extendee)
            .into_iter()
            .flat_map(|by_number| by_number.values())
    }

    /// Resolve the layout of `message`: its fields plus every known extension.
    pub fn layout(&self, message: &str) -> Result<Arc<MessageLayout>, DescriptorError> {
        let descriptor = self
            .message(message)
            .ok_or_else(|| DescriptorError::MessageNotFound {
                name: message.to_string(),
            })?;
        let fields = descriptor
            .fields
            .iter()
            .chain(self.extensions_of(message))
            .cloned();
        Ok(Arc::new(MessageLayout::new(&descriptor.full_name, fields)))
    }
}

/// Resolved field table for one message within one pool.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageLayout {
    full_name: String,
    by_number: BTreeMap<u32, FieldDescriptor>,
    by_name: HashMap<String, u32>,
}

impl MessageLayout {
    fn new(full_name: &str, fields: impl Iterator<Item = FieldDescriptor>) -> Self {
        let mut by_number = BTreeMap::new();
        let mut by_name = HashMap::new();
        for field in fields {
            by_name.insert(field.lookup_name().to_string(), field.number);
            by_number.insert(field.number, field);
        }
        Self {
            full_name: full_name.to_string(),
            by_number,
            by_name,
        }
    }

    pub fn full_name(&self) -> &str {
        &self.full_name
    }

    pub fn field(&self, number: u32) -> Option<&FieldDescriptor> {
        self.by_number.get(&number)
    }

    /// Look up a regular field by short name or an extension by full name.
    pub fn field_by_name(&self, name: &str) -> Option<&FieldDescriptor> {
        self.by_name.get(name).and_then(|n| self.by_number.get(n))
    }

    /// All fields, ascending by number.
    pub fn fields(&self) -> impl Iterator<Item = &FieldDescriptor> {
        self.by_number.values()
    }

    pub fn regular_fields(&self) -> impl Iterator<Item = &FieldDescriptor> {
        self.fields().filter(|f| !f.is_extension())
    }

    pub fn extensions(&self) -> impl Iterator<Item = &FieldDescriptor> {
        self.fields().filter(|f| f.is_extension())
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) fn field(name: &str, number: u32, field_type: FieldType, label: Label) -> FieldDescriptor {
        FieldDescriptor {
            name: name.to_string(),
            full_name: format!("xcompat.Envelope.{name}"),
            number,
            field_type,
            label,
            packed: false,
            extendee: None,
        }
    }

    pub(crate) fn extension(package: &str, name: &str, number: u32, field_type: FieldType) -> FieldDescriptor {
        FieldDescriptor {
            name: name.to_string(),
            full_name: format!("{package}.{name}"),
            number,
            field_type,
            label: Label::Optional,
            packed: false,
            extendee: Some("xcompat.Envelope".to_string()),
        }
    }

    pub(crate) fn base_file() -> FileDescriptor {
        let mut flags = field("flags", 3, FieldType::Sint64, Label::Repeated);
        flags.packed = true;
        FileDescriptor {
            name: "base.yaml".to_string(),
            package: "xcompat".to_string(),
            dependencies: vec![],
            messages: vec![MessageDescriptor {
                full_name: "xcompat.Envelope".to_string(),
                fields: vec![
                    field("id", 1, FieldType::Uint32, Label::Required),
                    field("name", 2, FieldType::String, Label::Optional),
                    flags,
                ],
                extension_ranges: vec![ExtensionRange { start: 100, end: 199 }],
            }],
            extensions: vec![],
        }
    }

    pub(crate) fn ext_file(name: &str, package: &str, extensions: Vec<FieldDescriptor>) -> FileDescriptor {
        FileDescriptor {
            name: name.to_string(),
            package: package.to_string(),
            dependencies: vec!["base.yaml".to_string()],
            messages: vec![],
            extensions,
        }
    }

    pub(crate) fn ext1_file() -> FileDescriptor {
        ext_file(
            "ext1.yaml",
            "xcompat.ext1",
            vec![
                extension("xcompat.ext1", "tag", 100, FieldType::String),
                extension("xcompat.ext1", "weight", 101, FieldType::Double),
            ],
        )
    }

    pub(crate) fn ext2_file() -> FileDescriptor {
        ext_file(
            "ext2.yaml",
            "xcompat.ext2",
            vec![
                extension("xcompat.ext2", "priority", 110, FieldType::Int32),
                extension("xcompat.ext2", "blob", 111, FieldType::Bytes),
            ],
        )
    }

    #[test]
    fn test_layout_includes_extensions() {
        let pool = DescriptorPool::from_files([base_file(), ext1_file()]).unwrap();
        let layout = pool.layout("xcompat.Envelope").unwrap();
        let numbers: Vec<u32> = layout.fields().map(|f| f.number).collect();
        assert_eq!(numbers, vec![1, 2, 3, 100, 101]);
        assert_eq!(layout.field_by_name("xcompat.ext1.tag").unwrap().number, 100);
        assert_eq!(layout.field_by_name("id").unwrap().number, 1);
        assert!(layout.field_by_name("tag").is_none());
        assert_eq!(layout.extensions().count(), 2);
    }

    #[test]
    fn test_unrelated_extensions_not_visible() {
        let pool = DescriptorPool::from_files([base_file(), ext2_file()]).unwrap();
        let layout = pool.layout("xcompat.Envelope").unwrap();
        assert!(layout.field(100).is_none());
        assert!(layout.field(110).is_some());
    }

    #[test]
    fn test_both_extensions_coexist() {
        let pool = DescriptorPool::from_files([base_file(), ext1_file(), ext2_file()]).unwrap();
        assert_eq!(pool.extensions_of("xcompat.Envelope").count(), 4);
    }

    #[test]
    fn test_extension_conflict_detected() {
        let clash = ext_file(
            "clash.yaml",
            "xcompat.clash",
            vec![extension("xcompat.clash", "other", 100, FieldType::Int64)],
        );
        let mut pool = DescriptorPool::from_files([base_file(), ext1_file()]).unwrap();
        let err = pool.add_file(clash).unwrap_err();
        assert_eq!(
            err,
            DescriptorError::ExtensionConflict {
                extendee: "xcompat.Envelope".to_string(),
                number: 100,
                existing: "xcompat.ext1.tag".to_string(),
                conflicting: "xcompat.clash.other".to_string(),
            }
        );
        // Pool unchanged after a failed add.
        assert_eq!(pool.files().len(), 2);
    }

    #[test]
    fn test_extension_out_of_range() {
        let bad = ext_file(
            "bad.yaml",
            "xcompat.bad",
            vec![extension("xcompat.bad", "late", 250, FieldType::Bool)],
        );
        let mut pool = DescriptorPool::from_files([base_file()]).unwrap();
        assert!(matches!(
            pool.add_file(bad),
            Err(DescriptorError::OutOfRange { number: 250, .. })
        ));
    }

    #[test]
    fn test_missing_dependency() {
        let mut pool = DescriptorPool::new();
        assert!(matches!(
            pool.add_file(ext1_file()),
            Err(DescriptorError::MissingDependency { .. })
        ));
    }

    #[test]
    fn test_duplicate_file_rejected() {
        let mut pool = DescriptorPool::from_files([base_file()]).unwrap();
        assert!(matches!(
            pool.add_file(base_file()),
            Err(DescriptorError::DuplicateFile { .. })
        ));
    }

    #[test]
    fn test_unknown_message_layout() {
        let pool = DescriptorPool::from_files([base_file()]).unwrap();
        assert!(matches!(
            pool.layout("xcompat.Missing"),
            Err(DescriptorError::MessageNotFound { .. })
        ));
    }

    #[test]
    fn test_field_type_parse_and_wire_type() {
        assert_eq!("sfixed64".parse::<FieldType>().unwrap(), FieldType::Sfixed64);
        assert!("message".parse::<FieldType>().is_err());
        assert_eq!(FieldType::Double.wire_type(), WireType::SixtyFourBit);
        assert_eq!(FieldType::Float.wire_type(), WireType::ThirtyTwoBit);
        assert_eq!(FieldType::Sint32.wire_type(), WireType::Varint);
        assert!(!FieldType::Bytes.is_packable());
    }

    #[test]
    fn test_descriptor_serde_shape() {
        let json = serde_json::to_value(ext1_file()).unwrap();
        assert_eq!(json["extensions"][0]["type"], "string");
        assert_eq!(json["extensions"][0]["label"], "optional");
        assert!(json["extensions"][0].get("packed").is_none());
        let back: FileDescriptor = serde_json::from_value(json).unwrap();
        assert_eq!(back, ext1_file());
    }
}
