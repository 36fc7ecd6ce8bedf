//! # Fixture Values
//!
//! The deterministic values writers populate and readers check against,
//! loaded from `schemas/fixture.yaml`. Entries are keyed by the name a
//! [`DynamicMessage`] addresses the field by: short name for regular fields,
//! full name for extensions.
//!
//! The fixture is schema-agnostic. A variant only ever looks up the fields
//! its own layout knows, so one file serves every writer and reader.

use std::collections::BTreeMap;
use std::path::Path;

use extcompat_core::{DynamicMessage, FieldDescriptor, FieldError, MessageLayout, Value};
use serde_json::Value as Json;

use crate::error::HarnessError;

#[derive(Debug, Clone, PartialEq)]
pub struct Fixture {
    entries: BTreeMap<String, Json>,
}

impl Fixture {
    pub fn load(path: &Path) -> Result<Self, HarnessError> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| HarnessError::io(format!("cannot read fixture {}", path.display()), e))?;
        Self::from_yaml_str(&text, &path.display().to_string())
    }

    pub fn from_yaml_str(text: &str, origin: &str) -> Result<Self, HarnessError> {
        let entries: BTreeMap<String, Json> =
            serde_yaml::from_str(text).map_err(|e| HarnessError::Fixture {
                path: origin.to_string(),
                reason: e.to_string(),
            })?;
        Ok(Self { entries })
    }

    /// The fixture value for `field`, converted to its declared type.
    ///
    /// `Ok(None)` means the fixture has no entry for the field.
    pub fn value_for(&self, field: &FieldDescriptor) -> Result<Option<Value>, FieldError> {
        self.entries
            .get(field.lookup_name())
            .map(|json| Value::from_json(json, field))
            .transpose()
    }

    /// Every field of `layout` with a fixture entry, ascending by number.
    pub fn expected<'l>(
        &self,
        layout: &'l MessageLayout,
    ) -> Result<Vec<(&'l FieldDescriptor, Value)>, FieldError> {
        let mut expected = Vec::new();
        for field in layout.fields() {
            if let Some(value) = self.value_for(field)? {
                expected.push((field, value));
            }
        }
        Ok(expected)
    }

    /// Set every fixture value `message`'s layout knows. Returns the names
    /// that were set.
    pub fn populate(&self, message: &mut DynamicMessage) -> Result<Vec<String>, FieldError> {
        let layout = std::sync::Arc::clone(message.layout());
        let mut set = Vec::new();
        for (field, value) in self.expected(&layout)? {
            message.set(field.lookup_name(), value)?;
            set.push(field.lookup_name().to_string());
        }
        Ok(set)
    }
}
